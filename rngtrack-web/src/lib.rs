#![forbid(unsafe_code)]
//! Browser adapters for the RNG Track engine.
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

pub mod api;
pub mod dom;
pub mod endpoints;
pub mod errors;
pub mod identity;

use rngtrack_core::{EngineConfig, Tracker, TrackerError};

pub use api::FetchDataSource;
pub use endpoints::Endpoints;
pub use identity::{LocalStorageIdentity, WebStorageError};

/// Tracker wired to the REST backend and `localStorage`.
pub type WebTracker = Tracker<FetchDataSource, LocalStorageIdentity>;

/// Engine configuration bundled with the web build.
///
/// # Errors
///
/// Returns [`TrackerError::Config`] if the bundled JSON is malformed.
pub fn engine_config() -> Result<EngineConfig, TrackerError> {
    let json = include_str!("../static/config/engine.json");
    Ok(EngineConfig::from_json(json)?)
}

/// Create a web-compatible tracker with `FetchDataSource` and `LocalStorageIdentity`
///
/// # Errors
///
/// Returns an error if the bundled configuration is malformed or the
/// contributor id cannot be read from or written to `localStorage`.
pub fn create_web_tracker() -> Result<WebTracker, TrackerError> {
    let tracker = Tracker::new(
        FetchDataSource::new(Endpoints::default()),
        LocalStorageIdentity,
        engine_config()?,
    );
    if let Err(err) = &tracker {
        dom::console_error(&format!("rngtrack: {err}"));
    }
    tracker
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}
