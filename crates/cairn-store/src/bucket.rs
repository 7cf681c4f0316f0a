//! The two storage buckets used for copy-on-write garbage collection.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One of the two parallel storage locations.
///
/// Persisted as the root record's `alt_location` flag: `A` is `false`,
/// `B` is `true`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bucket {
    A,
    B,
}

impl Bucket {
    pub fn from_alt(alt: bool) -> Self {
        if alt {
            Self::B
        } else {
            Self::A
        }
    }

    pub fn is_alt(self) -> bool {
        self == Self::B
    }

    /// The other bucket.
    pub fn flip(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    /// Directory/table name used by backends.
    pub fn name(self) -> &'static str {
        match self {
            Self::A => "a",
            Self::B => "b",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared selector for the bucket receiving new writes.
///
/// Every driver in a multiplex holds a clone; the root flips it at the start
/// of a garbage collection cycle.
#[derive(Clone, Debug, Default)]
pub struct BucketFlag(Arc<AtomicBool>);

impl BucketFlag {
    pub fn new(bucket: Bucket) -> Self {
        Self(Arc::new(AtomicBool::new(bucket.is_alt())))
    }

    pub fn get(&self) -> Bucket {
        Bucket::from_alt(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, bucket: Bucket) {
        self.0.store(bucket.is_alt(), Ordering::SeqCst);
    }

    /// Flip to the other bucket and return the new current bucket.
    pub fn flip(&self) -> Bucket {
        let previous = self.0.fetch_xor(true, Ordering::SeqCst);
        Bucket::from_alt(!previous)
    }
}
