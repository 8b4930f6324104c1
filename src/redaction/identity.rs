//! Session-scoped identity store.
//!
//! Identities are keyed by a SHA-256 digest of their canonical form and
//! entity type, so the same original value always maps to the same
//! synthetic attributes for the lifetime of a [`Session`]. Records are
//! never mutated once created.

use super::generate::Gender;
use crate::domain::EntityType;
use crate::error::{RedactorError, RedactorResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Synthetic attributes assigned to an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdentityAttributes {
    Person {
        gender: Gender,
        name: String,
        first: String,
        last: String,
    },
    Location {
        city: String,
        state: String,
    },
    /// A day offset shared by every date under the same key.
    DateShift { days: i64 },
    /// A single generated value used verbatim.
    Value { value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub key: String,
    pub original: String,
    pub entity_type: EntityType,
    pub attributes: IdentityAttributes,
}

/// Map from identity key to identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityStore {
    identities: BTreeMap<String, Identity>,
}

impl IdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stable key for a canonical value of a given type.
    pub fn key(canonical: &str, entity_type: &EntityType) -> String {
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hasher.update([0x1f]);
        hasher.update(entity_type.as_str().as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn get(&self, canonical: &str, entity_type: &EntityType) -> Option<&Identity> {
        self.identities.get(&Self::key(canonical, entity_type))
    }

    /// Returns the existing identity or records a new one built by `create`.
    pub fn get_or_create_with(
        &mut self,
        canonical: &str,
        entity_type: &EntityType,
        create: impl FnOnce() -> IdentityAttributes,
    ) -> &Identity {
        let key = Self::key(canonical, entity_type);
        self.identities.entry(key.clone()).or_insert_with(|| {
            debug!(entity_type = %entity_type, "creating identity");
            Identity {
                key,
                original: canonical.to_string(),
                entity_type: entity_type.clone(),
                attributes: create(),
            }
        })
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.identities.values()
    }

    /// Reads a store previously written by [`IdentityStore::save`].
    pub fn load(path: &Path) -> RedactorResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| RedactorError::io(path, e))?;
        serde_json::from_str(&raw).map_err(|e| RedactorError::json("identity store", e))
    }

    pub fn save(&self, path: &Path) -> RedactorResult<()> {
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| RedactorError::json("identity store", e))?;
        std::fs::write(path, raw).map_err(|e| RedactorError::io(path, e))
    }
}

/// State that must persist across every document in one run: the identity
/// store, the random source, and the key that date shifts are tied to.
#[derive(Debug)]
pub struct Session {
    pub store: IdentityStore,
    pub rng: StdRng,
    date_key: Option<String>,
}

impl Session {
    /// A session with an empty store, seeded from `seed` or from the OS.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            store: IdentityStore::new(),
            rng,
            date_key: None,
        }
    }

    /// Continues from a previously saved store.
    pub fn with_store(mut self, store: IdentityStore) -> Self {
        self.store = store;
        self
    }

    /// Ties date shifts to a patient or document key.
    pub fn with_date_key(mut self, key: impl Into<String>) -> Self {
        self.date_key = Some(key.into());
        self
    }

    pub fn date_key(&self) -> Option<&str> {
        self.date_key.as_deref()
    }

    pub fn into_store(self) -> IdentityStore {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(v: &str) -> IdentityAttributes {
        IdentityAttributes::Value {
            value: v.to_string(),
        }
    }

    #[test]
    fn test_key_depends_on_type() {
        let a = IdentityStore::key("12345", &EntityType::ZipCode);
        let b = IdentityStore::key("12345", &EntityType::Mrn);
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(a, IdentityStore::key("12345", &EntityType::ZipCode));
    }

    #[test]
    fn test_existing_identity_is_never_replaced() {
        let mut store = IdentityStore::new();
        store.get_or_create_with("john", &EntityType::Person, || value("first"));
        let again = store.get_or_create_with("john", &EntityType::Person, || value("second"));
        assert_eq!(again.attributes, value("first"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identities.json");

        let mut store = IdentityStore::new();
        store.get_or_create_with("boston", &EntityType::Location, || {
            IdentityAttributes::Location {
                city: "Riverton".to_string(),
                state: "OH".to_string(),
            }
        });
        store.save(&path).unwrap();

        let loaded = IdentityStore::load(&path).unwrap();
        assert_eq!(loaded, store);
    }

    #[test]
    fn test_session_date_key() {
        let session = Session::new(Some(1)).with_date_key("patient-7");
        assert_eq!(session.date_key(), Some("patient-7"));
        assert!(Session::new(Some(1)).date_key().is_none());
    }
}
