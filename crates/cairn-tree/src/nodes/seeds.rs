//! HD wallet seeds and the default-seed pointer.

use cairn_store::StoreResult;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::editor::editor_methods;
use crate::node::{ItemMap, Node, NodeContext, NodeKind};

/// An encrypted seed plus the next unused derivation index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRecord {
    pub id: String,
    pub index: u32,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedIndexRecord {
    pub default_seed: Option<String>,
}

#[derive(Default)]
pub struct Seeds {
    default_seed: Option<String>,
}

impl NodeKind for Seeds {
    const NAME: &'static str = "seeds";
    const VERSION: u32 = 1;
    type Index = SeedIndexRecord;

    fn load_index(&mut self, _ctx: &NodeContext, index: SeedIndexRecord, items: &mut ItemMap) -> StoreResult<()> {
        self.default_seed = index.default_seed.filter(|id| items.contains_key(id));
        Ok(())
    }

    fn save_index(&self, _items: &ItemMap) -> SeedIndexRecord {
        SeedIndexRecord {
            default_seed: self.default_seed.clone(),
        }
    }

    fn is_empty(&self) -> bool {
        self.default_seed.is_none()
    }
}

impl Node<Seeds> {
    /// Store a seed. A record whose derivation index is lower than the
    /// stored one is ignored; the first seed stored becomes the default.
    pub(crate) fn store(&self, record: &SeedRecord, alias: &str) -> StoreResult<bool> {
        if let Some((stored, _)) = self.load_record::<SeedRecord>(&record.id, true)? {
            if record.index < stored.index {
                debug!(seed = %record.id, stored = stored.index, incoming = record.index, "stale seed index ignored");
                return Ok(true);
            }
        }
        self.store_record_with(&record.id, record, alias, |seeds, _| {
            if seeds.default_seed.is_none() {
                seeds.default_seed = Some(record.id.clone());
            }
        })
    }

    pub fn load(&self, id: &str, checking: bool) -> StoreResult<Option<SeedRecord>> {
        Ok(self.load_record(id, checking)?.map(|(record, _)| record))
    }

    pub fn default_seed(&self) -> Option<String> {
        self.lock().kind.default_seed.clone()
    }

    /// Returns `false` if `id` is not stored.
    pub(crate) fn set_default_seed(&self, id: &str) -> StoreResult<bool> {
        let mut state = self.lock();
        if !state.items.contains_key(id) {
            return Ok(false);
        }
        state.kind.default_seed = Some(id.to_string());
        self.save(&mut state)?;
        Ok(true)
    }

    /// Deleting the default seed promotes the first remaining one.
    pub(crate) fn delete(&self, id: &str) -> StoreResult<bool> {
        let mut state = self.lock();
        if state.items.remove(id).is_none() {
            return Ok(false);
        }
        if state.kind.default_seed.as_deref() == Some(id) {
            state.kind.default_seed = state.items.keys().next().cloned();
        }
        self.save(&mut state)?;
        Ok(true)
    }
}

editor_methods! {
    impl Seeds {
        fn store(&self, record: &SeedRecord, alias: &str) -> StoreResult<bool>;
        fn set_default_seed(&self, id: &str) -> StoreResult<bool>;
        fn delete(&self, id: &str) -> StoreResult<bool>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::tests::context;

    fn seed(id: &str, index: u32) -> SeedRecord {
        SeedRecord {
            id: id.into(),
            index,
            data: id.as_bytes().to_vec(),
        }
    }

    #[test]
    fn lower_index_never_overwrites() {
        let ctx = context();
        let seeds = Node::<Seeds>::blank(&ctx);
        seeds.store(&seed("s1", 10), "").unwrap();
        assert!(seeds.store(&seed("s1", 4), "").unwrap());
        assert_eq!(seeds.load("s1", false).unwrap().unwrap().index, 10);
        seeds.store(&seed("s1", 10), "renamed").unwrap();
        assert_eq!(seeds.alias("s1").as_deref(), Some("renamed"));
        seeds.store(&seed("s1", 11), "").unwrap();
        assert_eq!(seeds.load("s1", false).unwrap().unwrap().index, 11);
    }

    #[test]
    fn first_seed_is_default() {
        let ctx = context();
        let seeds = Node::<Seeds>::blank(&ctx);
        seeds.store(&seed("s1", 0), "").unwrap();
        seeds.store(&seed("s2", 0), "").unwrap();
        assert_eq!(seeds.default_seed().as_deref(), Some("s1"));
        assert!(seeds.set_default_seed("s2").unwrap());
        assert!(!seeds.set_default_seed("missing").unwrap());

        let reopened = Node::<Seeds>::open(&ctx, &seeds.root_hash()).unwrap();
        assert_eq!(reopened.default_seed().as_deref(), Some("s2"));
        reopened.delete("s2").unwrap();
        assert_eq!(reopened.default_seed().as_deref(), Some("s1"));
    }
}
