//! Filesystem driver.
//!
//! On-disk layout:
//! ```text
//! <root>/a/<first two hash chars>/<hash>
//! <root>/b/<first two hash chars>/<hash>
//! <root>/root            (current root hash, replaced atomically)
//! ```

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use cairn_types::ContentHash;
use tempfile::NamedTempFile;
use tracing::{debug, info, trace};

use crate::bucket::{Bucket, BucketFlag};
use crate::driver::Driver;
use crate::error::{StoreError, StoreResult};

const ROOT_FILE: &str = "root";

/// Driver storing each blob as a file.
pub struct FsDriver {
    dir: PathBuf,
    bucket: BucketFlag,
}

impl FsDriver {
    /// Open (or create) a store rooted at `dir`.
    pub fn open(dir: &Path, bucket: BucketFlag) -> StoreResult<Self> {
        for b in [Bucket::A, Bucket::B] {
            fs::create_dir_all(dir.join(b.name()))?;
        }
        info!(path = %dir.display(), "filesystem driver opened");
        Ok(Self {
            dir: dir.to_path_buf(),
            bucket,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn object_path(&self, key: &ContentHash, bucket: Bucket) -> StoreResult<PathBuf> {
        let name = key.as_str();
        if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsafe object key {name}"),
            )));
        }
        let shard: String = name.chars().take(2).collect();
        Ok(self.dir.join(bucket.name()).join(shard).join(name))
    }

    /// Write `data` to `path` through a uniquely named temporary sibling.
    ///
    /// With `replace` unset an existing `path` wins: object files are named
    /// by their content, so whoever got there first wrote the same bytes.
    fn write_atomic(path: &Path, data: &[u8], sync: bool, replace: bool) -> io::Result<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(data)?;
        if sync {
            tmp.as_file().sync_all()?;
        }
        if replace {
            tmp.persist(path).map_err(|e| e.error)?;
        } else {
            match tmp.persist_noclobber(path) {
                Ok(_) => {}
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                    trace!(path = %path.display(), "object already written");
                    return Ok(());
                }
                Err(e) => return Err(e.error),
            }
        }
        if sync {
            File::open(parent)?.sync_all()?;
        }
        Ok(())
    }
}

impl Driver for FsDriver {
    fn load_from_bucket(&self, key: &ContentHash, bucket: Bucket) -> StoreResult<Option<Vec<u8>>> {
        if key.is_blank() {
            return Ok(None);
        }
        match fs::read(self.object_path(key, bucket)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(
        &self,
        is_transaction: bool,
        key: &ContentHash,
        value: &[u8],
        bucket: Bucket,
    ) -> StoreResult<()> {
        if key.is_blank() {
            return Err(StoreError::BlankKey);
        }
        let path = self.object_path(key, bucket)?;
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::write_atomic(&path, value, is_transaction, false)?;
        Ok(())
    }

    fn current_bucket(&self) -> Bucket {
        self.bucket.get()
    }

    fn empty_bucket(&self, bucket: Bucket) -> StoreResult<()> {
        if bucket == self.current_bucket() {
            return Err(StoreError::CurrentBucket);
        }
        let dir = self.dir.join(bucket.name());
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        debug!(bucket = %bucket, path = %dir.display(), "bucket emptied");
        Ok(())
    }

    fn load_root(&self) -> StoreResult<ContentHash> {
        match fs::read_to_string(self.dir.join(ROOT_FILE)) {
            Ok(text) => Ok(ContentHash::normalize(text.trim())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ContentHash::blank()),
            Err(e) => Err(e.into()),
        }
    }

    fn store_root(&self, commit: bool, hash: &ContentHash) -> StoreResult<()> {
        Self::write_atomic(&self.dir.join(ROOT_FILE), hash.as_str().as_bytes(), commit, true)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "filesystem"
    }
}

impl std::fmt::Debug for FsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsDriver")
            .field("dir", &self.dir)
            .field("bucket", &self.bucket.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> (tempfile::TempDir, FsDriver, BucketFlag) {
        let dir = tempfile::tempdir().unwrap();
        let flag = BucketFlag::new(Bucket::A);
        let driver = FsDriver::open(dir.path(), flag.clone()).unwrap();
        (dir, driver, flag)
    }

    #[test]
    fn store_and_load() {
        let (_dir, driver, _) = open();
        let key = driver.store_value(true, b"on disk").unwrap();
        assert_eq!(driver.load(&key, false).unwrap().unwrap(), b"on disk");
        assert!(driver.load_from_bucket(&key, Bucket::B).unwrap().is_none());
    }

    #[test]
    fn concurrent_stores_of_one_object_all_succeed() {
        let (_dir, driver, _) = open();
        let value = vec![7u8; 4096];
        let keys: Vec<ContentHash> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let (driver, value) = (&driver, &value);
                    scope.spawn(move || {
                        (0..16)
                            .map(|_| driver.store_value(true, value).unwrap())
                            .last()
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(keys.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(driver.load(&keys[0], false).unwrap().unwrap(), value);
        let shard = driver.object_path(&keys[0], Bucket::A).unwrap();
        let leftovers = fs::read_dir(shard.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn concurrent_root_writes_leave_one_valid_root() {
        let (_dir, driver, _) = open();
        let keys: Vec<ContentHash> = (0..8u8).map(|i| driver.store_value(false, &[i]).unwrap()).collect();
        std::thread::scope(|scope| {
            for key in &keys {
                let driver = &driver;
                scope.spawn(move || driver.store_root(true, key).unwrap());
            }
        });
        assert!(keys.contains(&driver.load_root().unwrap()));
    }

    #[test]
    fn root_survives_reopen() {
        let (dir, driver, flag) = open();
        let key = driver.store_value(true, b"root object").unwrap();
        driver.store_root(true, &key).unwrap();
        drop(driver);

        let reopened = FsDriver::open(dir.path(), flag).unwrap();
        assert_eq!(reopened.load_root().unwrap(), key);
        assert!(reopened.load(&key, false).unwrap().is_some());
    }

    #[test]
    fn missing_root_is_blank() {
        let (_dir, driver, _) = open();
        assert!(driver.load_root().unwrap().is_blank());
    }

    #[test]
    fn empty_bucket_removes_only_that_bucket() {
        let (_dir, driver, flag) = open();
        let old = driver.store_value(false, b"old").unwrap();
        assert!(matches!(driver.empty_bucket(Bucket::A), Err(StoreError::CurrentBucket)));
        flag.flip();
        let new = driver.store_value(false, b"new").unwrap();
        driver.empty_bucket(Bucket::A).unwrap();
        assert!(driver.load(&old, true).unwrap().is_none());
        assert!(driver.load(&new, true).unwrap().is_some());
    }

    #[test]
    fn rejects_path_like_keys() {
        let (_dir, driver, _) = open();
        let key = ContentHash::normalize("../../../../etc/passwd-and-more");
        assert!(driver.store(false, &key, b"x", Bucket::A).is_err());
    }
}
