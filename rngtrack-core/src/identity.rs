//! Durable contributor identity.
use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use crate::error::{Result, TrackerError};
use crate::ledger::ContributorId;

/// Storage key used by platform implementations.
pub const CONTRIBUTOR_KEY: &str = "rngtrack.contributor_id";

/// Trait for abstracting where the contributor identifier is persisted.
/// Platform-specific implementations should provide this
pub trait IdentityStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read the stored identifier, if one was ever written.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend cannot be read.
    fn load(&self) -> Result<Option<ContributorId>, Self::Error>;

    /// Overwrite the stored identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend rejects the write.
    fn save(&self, contributor: &ContributorId) -> Result<(), Self::Error>;
}

/// Fresh random identifier (UUID v4).
#[must_use]
pub fn generate_contributor_id() -> ContributorId {
    ContributorId::from(uuid::Uuid::new_v4())
}

/// Return the stored identifier, creating and persisting one on first use.
///
/// # Errors
///
/// Returns [`TrackerError::Storage`] when the store cannot be read or written.
pub fn load_or_create<S: IdentityStore>(store: &S) -> Result<ContributorId> {
    if let Some(existing) = store.load().map_err(storage_error)? {
        return Ok(existing);
    }
    let created = generate_contributor_id();
    store.save(&created).map_err(storage_error)?;
    log::debug!("created contributor id {created}");
    Ok(created)
}

pub(crate) fn storage_error(err: impl std::error::Error) -> TrackerError {
    TrackerError::Storage(err.to_string())
}

/// In-process identity store, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryIdentity {
    slot: Rc<RefCell<Option<ContributorId>>>,
}

impl MemoryIdentity {
    #[must_use]
    pub fn with_id(contributor: ContributorId) -> Self {
        Self {
            slot: Rc::new(RefCell::new(Some(contributor))),
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<ContributorId> {
        self.slot.borrow().clone()
    }
}

impl IdentityStore for MemoryIdentity {
    type Error = Infallible;

    fn load(&self) -> Result<Option<ContributorId>, Self::Error> {
        Ok(self.slot.borrow().clone())
    }

    fn save(&self, contributor: &ContributorId) -> Result<(), Self::Error> {
        *self.slot.borrow_mut() = Some(contributor.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_load_creates_and_persists_an_id() {
        let store = MemoryIdentity::default();
        let created = load_or_create(&store).unwrap();
        assert_eq!(created.as_str().len(), 36);
        assert_eq!(store.current(), Some(created.clone()));
        assert_eq!(load_or_create(&store).unwrap(), created);
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(generate_contributor_id(), generate_contributor_id());
    }

    #[derive(Debug, thiserror::Error)]
    #[error("quota exceeded")]
    struct QuotaExceeded;

    struct FullStore;

    impl IdentityStore for FullStore {
        type Error = QuotaExceeded;

        fn load(&self) -> Result<Option<ContributorId>, Self::Error> {
            Ok(None)
        }

        fn save(&self, _contributor: &ContributorId) -> Result<(), Self::Error> {
            Err(QuotaExceeded)
        }
    }

    #[test]
    fn storage_failures_surface_as_storage_errors() {
        let err = load_or_create(&FullStore).unwrap_err();
        assert!(matches!(err, TrackerError::Storage(msg) if msg == "quota exceeded"));
    }
}
