//! Plain blob boxes.
//!
//! Issuers, contexts, mail boxes, peer boxes, servers and units carry no
//! secondary index of their own: each item is an opaque serialized object
//! with an alias. They share one node kind, distinguished by a marker type
//! that supplies the persisted name and version.

use std::marker::PhantomData;

use cairn_store::StoreResult;

use crate::editor::editor_methods;
use crate::node::{Node, NodeKind};

/// Name and version of one blob box flavour.
pub trait BoxMarker: Send + 'static {
    const NAME: &'static str;
    const VERSION: u32;
}

pub struct BlobBox<M> {
    _marker: PhantomData<fn() -> M>,
}

impl<M> Default for BlobBox<M> {
    fn default() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<M: BoxMarker> NodeKind for BlobBox<M> {
    const NAME: &'static str = M::NAME;
    const VERSION: u32 = M::VERSION;
    type Index = ();
}

macro_rules! blob_box {
    ($(#[$doc:meta])* $alias:ident, $marker:ident, $name:literal, $version:literal) => {
        $(#[$doc])*
        pub struct $marker;

        impl BoxMarker for $marker {
            const NAME: &'static str = $name;
            const VERSION: u32 = $version;
        }

        $(#[$doc])*
        pub type $alias = BlobBox<$marker>;
    };
}

blob_box!(
    /// Issuer records a nym keeps about asset issuers it deals with.
    Issuers, IssuerBox, "issuers", 1
);
blob_box!(
    /// Per-server contexts for one nym.
    Contexts, ContextBox, "contexts", 1
);
blob_box!(
    /// One direction of a nym's mail.
    Mailbox, MessageBox, "mailbox", 1
);
blob_box!(PeerRequests, PeerRequestBox, "peer-requests", 1);
blob_box!(PeerReplies, PeerReplyBox, "peer-replies", 1);
blob_box!(
    /// Server contracts.
    Servers, ServerBox, "servers", 2
);
blob_box!(
    /// Unit definitions.
    Units, UnitBox, "units", 2
);

impl<M: BoxMarker> Node<BlobBox<M>> {
    pub(crate) fn store(&self, id: &str, data: &[u8], alias: &str) -> StoreResult<bool> {
        self.store_raw(id, data, alias)
    }

    pub fn load(&self, id: &str, checking: bool) -> StoreResult<Option<(Vec<u8>, String)>> {
        self.load_raw(id, checking)
    }

    pub(crate) fn delete(&self, id: &str) -> StoreResult<bool> {
        self.delete_item(id)
    }
}

editor_methods! {
    impl<M: BoxMarker> BlobBox<M> {
        fn store(&self, id: &str, data: &[u8], alias: &str) -> StoreResult<bool>;
        fn delete(&self, id: &str) -> StoreResult<bool>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::tests::context;

    #[test]
    fn boxes_store_and_reload_blobs() {
        let ctx = context();
        let mail = Node::<Mailbox>::blank(&ctx);
        mail.store("m1", b"hello", "greeting").unwrap();
        mail.store("m2", b"again", "").unwrap();
        mail.delete("m2").unwrap();

        let reopened = Node::<Mailbox>::open(&ctx, &mail.root_hash()).unwrap();
        assert_eq!(reopened.list(), vec![("m1".to_string(), "greeting".to_string())]);
        assert_eq!(reopened.load("m1", false).unwrap().unwrap().0, b"hello");
        assert_eq!(reopened.load("m2", true).unwrap(), None);
    }

    #[test]
    fn flavours_keep_their_own_version() {
        let ctx = context();
        assert_eq!(Node::<Servers>::blank(&ctx).version(), 2);
        assert_eq!(Node::<Issuers>::blank(&ctx).version(), 1);
    }
}
