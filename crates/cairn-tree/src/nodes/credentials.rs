//! Serialized credentials, keyed by credential ID.

use std::collections::BTreeSet;

use cairn_store::StoreResult;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::editor::editor_methods;
use crate::node::{ItemMap, Node, NodeContext, NodeKind};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialIndexRecord {
    /// IDs whose stored copy includes private key material.
    pub private: BTreeSet<String>,
}

/// Credentials carry their privacy in item metadata.
#[derive(Default)]
pub struct Credentials;

impl NodeKind for Credentials {
    const NAME: &'static str = "credentials";
    const VERSION: u32 = 1;
    type Index = CredentialIndexRecord;

    fn load_index(&mut self, _ctx: &NodeContext, index: CredentialIndexRecord, items: &mut ItemMap) -> StoreResult<()> {
        for id in index.private {
            if let Some(meta) = items.get_mut(&id) {
                meta.private = true;
            }
        }
        Ok(())
    }

    fn save_index(&self, items: &ItemMap) -> CredentialIndexRecord {
        CredentialIndexRecord {
            private: items
                .iter()
                .filter(|(_, meta)| meta.private)
                .map(|(id, _)| id.clone())
                .collect(),
        }
    }
}

impl Node<Credentials> {
    /// Store a serialized credential.
    ///
    /// A public copy never replaces a stored private one; that write is a
    /// successful no-op.
    pub(crate) fn store(&self, id: &str, data: &[u8], private: bool, alias: &str) -> StoreResult<bool> {
        if !private && self.is_private(id) {
            debug!(credential = id, "keeping private copy");
            return Ok(true);
        }
        self.store_raw_with(id, data, alias, |_, meta| meta.private = private)
    }

    /// The serialized credential and whether it is the private form.
    pub fn load(&self, id: &str, checking: bool) -> StoreResult<Option<(Vec<u8>, bool)>> {
        let private = self.is_private(id);
        Ok(self.load_raw(id, checking)?.map(|(data, _)| (data, private)))
    }

    pub fn is_private(&self, id: &str) -> bool {
        self.metadata(id).is_some_and(|meta| meta.private)
    }

    pub(crate) fn delete(&self, id: &str) -> StoreResult<bool> {
        self.delete_item(id)
    }
}

editor_methods! {
    impl Credentials {
        fn store(&self, id: &str, data: &[u8], private: bool, alias: &str) -> StoreResult<bool>;
        fn delete(&self, id: &str) -> StoreResult<bool>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::tests::context;

    #[test]
    fn public_copy_never_replaces_private() {
        let ctx = context();
        let creds = Node::<Credentials>::blank(&ctx);
        creds.store("cred", b"private form", true, "").unwrap();
        assert!(creds.store("cred", b"public form", false, "").unwrap());
        assert_eq!(creds.load("cred", false).unwrap().unwrap(), (b"private form".to_vec(), true));
    }

    #[test]
    fn private_copy_replaces_public() {
        let ctx = context();
        let creds = Node::<Credentials>::blank(&ctx);
        creds.store("cred", b"public form", false, "").unwrap();
        creds.store("cred", b"private form", true, "").unwrap();
        assert!(creds.is_private("cred"));
    }

    #[test]
    fn privacy_survives_reload() {
        let ctx = context();
        let creds = Node::<Credentials>::blank(&ctx);
        creds.store("a", b"secret", true, "").unwrap();
        creds.store("b", b"public", false, "").unwrap();
        let reopened = Node::<Credentials>::open(&ctx, &creds.root_hash()).unwrap();
        assert!(reopened.is_private("a"));
        assert!(!reopened.is_private("b"));
        assert!(reopened.store("a", b"downgrade", false, "").unwrap());
        assert_eq!(reopened.load("a", false).unwrap().unwrap().0, b"secret");
    }
}
