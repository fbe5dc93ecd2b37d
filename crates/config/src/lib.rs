//! Configuration loading and validation.
//!
//! Settings come from figment layers (defaults, config files, `STOW_*`
//! environment variables) and are validated up front, so a bad value fails the
//! run before anything is uploaded. Credentials are kept apart from settings:
//! they are only ever read from the environment.

mod credentials;
pub mod error;
mod settings;

pub use crate::credentials::Credentials;
pub use crate::settings::{BackendConfig, BackoffKind, Config, ManifestMode, MonitorConfig, TransferConfig};
