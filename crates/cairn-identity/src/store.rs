//! Persisting credentials and identities.
//!
//! Credentials are stored one record per credential ID. An identity is stored
//! as an index-mode [`SerializedNym`] that names its credentials by ID, so a
//! public copy of a credential never replaces a private one already held.

use std::collections::HashMap;

use cairn_tree::Storage;
use cairn_types::Identifier;
use parking_lot::RwLock;
use tracing::debug;

use crate::authority::AuthorityMode;
use crate::credential::SerializedCredential;
use crate::error::IdentityResult;
use crate::nym::{Nym, SerializedNym};

/// Where credentials and identity indexes live.
pub trait CredentialStore: Send + Sync {
    fn load_credential(&self, id: &Identifier) -> IdentityResult<Option<SerializedCredential>>;

    /// Store `credential`. A public form never overwrites a private one.
    fn store_credential(&self, credential: &SerializedCredential, alias: &str) -> IdentityResult<bool>;

    /// The serialized identity index and its alias.
    fn load_nym(&self, id: &Identifier) -> IdentityResult<Option<(Vec<u8>, String)>>;

    /// Store an identity index. Older revisions never replace newer ones.
    fn store_nym(&self, id: &Identifier, data: &[u8], alias: &str, revision: u64, private: bool)
        -> IdentityResult<bool>;
}

impl CredentialStore for Storage {
    fn load_credential(&self, id: &Identifier) -> IdentityResult<Option<SerializedCredential>> {
        match Storage::load_credential(self, &id.to_hex(), true)? {
            Some((data, _)) => Ok(Some(SerializedCredential::from_bytes(&data)?)),
            None => Ok(None),
        }
    }

    fn store_credential(&self, credential: &SerializedCredential, alias: &str) -> IdentityResult<bool> {
        let data = credential.to_bytes()?;
        Ok(Storage::store_credential(
            self,
            &credential.id.to_hex(),
            &data,
            credential.is_private(),
            alias,
        )?)
    }

    fn load_nym(&self, id: &Identifier) -> IdentityResult<Option<(Vec<u8>, String)>> {
        Ok(Storage::load_nym(self, &id.to_hex(), true)?)
    }

    fn store_nym(
        &self,
        id: &Identifier,
        data: &[u8],
        alias: &str,
        revision: u64,
        private: bool,
    ) -> IdentityResult<bool> {
        Ok(Storage::store_nym(self, &id.to_hex(), data, alias, revision, private)?)
    }
}

struct StoredNym {
    data: Vec<u8>,
    alias: String,
    revision: u64,
    private: bool,
}

/// In-memory credential store.
#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: RwLock<HashMap<Identifier, SerializedCredential>>,
    nyms: RwLock<HashMap<Identifier, StoredNym>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credential_count(&self) -> usize {
        self.credentials.read().len()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load_credential(&self, id: &Identifier) -> IdentityResult<Option<SerializedCredential>> {
        Ok(self.credentials.read().get(id).cloned())
    }

    fn store_credential(&self, credential: &SerializedCredential, _alias: &str) -> IdentityResult<bool> {
        let mut credentials = self.credentials.write();
        if !credential.is_private() && credentials.get(&credential.id).is_some_and(SerializedCredential::is_private) {
            debug!(credential = %credential.id, "keeping private copy");
            return Ok(true);
        }
        credentials.insert(credential.id, credential.clone());
        Ok(true)
    }

    fn load_nym(&self, id: &Identifier) -> IdentityResult<Option<(Vec<u8>, String)>> {
        Ok(self.nyms.read().get(id).map(|nym| (nym.data.clone(), nym.alias.clone())))
    }

    fn store_nym(
        &self,
        id: &Identifier,
        data: &[u8],
        alias: &str,
        revision: u64,
        private: bool,
    ) -> IdentityResult<bool> {
        let mut nyms = self.nyms.write();
        let replace = match nyms.get(id) {
            None => true,
            Some(current) => revision > current.revision || (revision == current.revision && private && !current.private),
        };
        if replace {
            nyms.insert(
                *id,
                StoredNym {
                    data: data.to_vec(),
                    alias: alias.to_string(),
                    revision,
                    private,
                },
            );
        }
        Ok(true)
    }
}

/// Store every credential of `nym`, then its index.
pub fn save_nym(store: &dyn CredentialStore, nym: &Nym) -> IdentityResult<()> {
    for authority in nym.authorities() {
        for credential in authority.credentials() {
            store.store_credential(&credential, nym.alias())?;
        }
    }
    let index = bincode::serialize(&nym.serialize(AuthorityMode::Index))?;
    store.store_nym(&nym.id(), &index, nym.alias(), nym.revision(), nym.is_private())?;
    debug!(nym = %nym.id(), revision = nym.revision(), "identity saved");
    Ok(())
}

/// Load an identity saved with [`save_nym`].
pub fn load_nym(store: &dyn CredentialStore, id: &Identifier) -> IdentityResult<Option<Nym>> {
    let Some((data, alias)) = store.load_nym(id)? else {
        return Ok(None);
    };
    let serialized: SerializedNym = bincode::deserialize(&data)?;
    Nym::load(&serialized, alias, store).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::{Authority, NymParameters};
    use crate::source::{SourceProof, SourceSecret};

    fn private_master() -> SerializedCredential {
        let secret = SourceSecret::pubkey(SourceProof::Signature);
        let authority = Authority::new(&secret, &NymParameters::default()).unwrap();
        authority.master().base().serialized().clone()
    }

    #[test]
    fn public_copy_does_not_replace_private() {
        let store = MemoryCredentialStore::new();
        let private = private_master();
        store.store_credential(&private, "").unwrap();
        store.store_credential(&private.public_form(), "").unwrap();
        assert!(store.load_credential(&private.id).unwrap().unwrap().is_private());
        assert_eq!(store.credential_count(), 1);
    }

    #[test]
    fn private_copy_replaces_public() {
        let store = MemoryCredentialStore::new();
        let private = private_master();
        store.store_credential(&private.public_form(), "").unwrap();
        store.store_credential(&private, "").unwrap();
        assert!(store.load_credential(&private.id).unwrap().unwrap().is_private());
    }

    #[test]
    fn older_nym_revision_is_ignored() {
        let store = MemoryCredentialStore::new();
        let id = Identifier::from_hash([3; 32]);
        store.store_nym(&id, b"two", "a", 2, false).unwrap();
        store.store_nym(&id, b"one", "a", 1, false).unwrap();
        assert_eq!(store.load_nym(&id).unwrap().unwrap().0, b"two".to_vec());
        store.store_nym(&id, b"two-private", "b", 2, true).unwrap();
        assert_eq!(
            store.load_nym(&id).unwrap().unwrap(),
            (b"two-private".to_vec(), "b".to_string())
        );
    }
}
