use cairn_identity::{
    load_nym, save_nym, Claim, ClaimType, CredentialStore, KeyRole, Nym, NymParameters, SectionType, SourceProof,
    SourceSecret,
};
use cairn_store::StorageConfig;
use cairn_tree::Storage;

fn config(dir: &std::path::Path) -> StorageConfig {
    StorageConfig {
        gc_enabled: false,
        ..StorageConfig::filesystem(dir)
    }
}

#[test]
fn identity_survives_storage_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let secret = SourceSecret::pubkey(SourceProof::Signature);
    let mut nym = Nym::new(&secret, &NymParameters::default(), "alice").unwrap();
    nym.add_claim(Claim::new(nym.id(), SectionType::Scope, ClaimType::Individual, "Alice"))
        .unwrap();
    let signature = nym.sign(b"hello", KeyRole::Sign).unwrap();

    {
        let storage = Storage::open(config(dir.path())).unwrap();
        save_nym(&storage, &nym).unwrap();
        assert!(storage.local_nyms().unwrap().contains(&nym.id().to_hex()));
    }

    let storage = Storage::open(config(dir.path())).unwrap();
    let loaded = load_nym(&storage, &nym.id()).unwrap().unwrap();
    loaded.verify().unwrap();
    assert_eq!(loaded.alias(), "alice");
    assert_eq!(loaded.revision(), nym.revision());
    assert!(loaded.is_private());
    assert_eq!(loaded.contact_data().unwrap().name(), Some("Alice"));
    assert!(loaded.verify_message(b"hello", &signature, KeyRole::Sign));
    let again = loaded.sign(b"hello", KeyRole::Sign).unwrap();
    assert!(nym.verify_message(b"hello", &again, KeyRole::Sign));
}

#[test]
fn stale_revision_does_not_replace_newer_identity() {
    let storage = Storage::open(StorageConfig {
        gc_enabled: false,
        ..StorageConfig::memory()
    })
    .unwrap();
    let secret = SourceSecret::pubkey(SourceProof::Signature);
    let old = Nym::new(&secret, &NymParameters::default(), "bob").unwrap();
    let mut new = old.clone();
    new.add_claim(Claim::new(new.id(), SectionType::Scope, ClaimType::Individual, "Bob"))
        .unwrap();

    save_nym(&storage, &new).unwrap();
    save_nym(&storage, &old).unwrap();

    let loaded = load_nym(&storage, &new.id()).unwrap().unwrap();
    assert_eq!(loaded.revision(), new.revision());
    assert_eq!(loaded.contact_data().unwrap().name(), Some("Bob"));
}

#[test]
fn missing_identity_is_none() {
    let storage = Storage::open(StorageConfig {
        gc_enabled: false,
        ..StorageConfig::memory()
    })
    .unwrap();
    let secret = SourceSecret::pubkey(SourceProof::Signature);
    assert!(load_nym(&storage, &secret.nym_id()).unwrap().is_none());
    assert!(CredentialStore::load_credential(&storage, &secret.nym_id()).unwrap().is_none());
}
