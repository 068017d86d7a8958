//! Contributor identity persisted in `localStorage`.
use rngtrack_core::{CONTRIBUTOR_KEY, ContributorId, IdentityStore};

use crate::dom;

/// Web-specific identity store using localStorage
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorageIdentity;

#[derive(Debug, thiserror::Error)]
pub enum WebStorageError {
    #[error("Storage error: {0}")]
    Storage(String),
}

impl IdentityStore for LocalStorageIdentity {
    type Error = WebStorageError;

    fn load(&self) -> Result<Option<ContributorId>, Self::Error> {
        let storage = dom::local_storage()
            .map_err(|err| WebStorageError::Storage(dom::js_error_message(&err)))?;
        let raw = storage
            .get_item(CONTRIBUTOR_KEY)
            .map_err(|err| WebStorageError::Storage(dom::js_error_message(&err)))?;
        Ok(raw.as_deref().and_then(ContributorId::parse))
    }

    fn save(&self, contributor: &ContributorId) -> Result<(), Self::Error> {
        let storage = dom::local_storage()
            .map_err(|err| WebStorageError::Storage(dom::js_error_message(&err)))?;
        storage
            .set_item(CONTRIBUTOR_KEY, contributor.as_str())
            .map_err(|err| WebStorageError::Storage(dom::js_error_message(&err)))
    }
}
