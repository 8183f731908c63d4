//! # capgate-settings
//!
//! Configuration for the capgate gateway, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`GatewaySettings::default()`]
//! 2. **Settings file**: `~/.capgate/settings.json` or an explicit path
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `CAPGATE_*` overrides (highest priority)
//!
//! Settings are loaded once by the binary and handed to each component as an
//! explicit value. There is no global settings singleton.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
