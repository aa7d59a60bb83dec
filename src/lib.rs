//! UpdatePulse client - self-update and license lifecycle for deployed
//! packages.
//!
//! This crate embeds inside a deployed software package and keeps it
//! current against an UpdatePulse server: it periodically asks the server
//! whether a newer version exists and, if so, downloads, stages, and swaps
//! the new version into the running installation directory while
//! preserving license state and file permissions. Alongside updates it
//! manages the package's license lifecycle (activation and deactivation of
//! a machine-bound license key) against the same server.
//!
//! # Architecture Overview
//!
//! Four components, leaves first, all sharing one persisted record:
//!
//! - [`config`] - Config Store: owns the `updatepulse.json` record
//!   (server URL, package identity, installed version, license fields) and
//!   the `.installed` marker file. Crash-safe saves via temp-file-rename.
//! - [`client`] - Update Server Client: metadata lookup, license
//!   activation/deactivation, and archive download over the server's GET
//!   API, with percent-encoded parameters and a bounded timeout. The
//!   [`client::UpdateServer`] trait is the seam tests mock.
//! - [`license`] - License Lifecycle: the
//!   install/uninstall/activate/deactivate state machine. All state is
//!   loaded from and persisted to the Config Store per operation.
//! - [`engine`] - Update Engine: the check → download → stage → swap →
//!   finalize pipeline that replaces the installation in place.
//!
//! # Concurrency model
//!
//! Single operation at a time. The engine and the license manager mutate
//! the same record and the same installation directory, so callers must
//! serialize all operations against a given installation (e.g., with a
//! lock scoped to the package directory); no internal locking is provided.
//! Independent installations may each run their own engine instance with
//! no shared state.
//!
//! # Example
//!
//! ```rust,no_run
//! use updatepulse_client::{ConfigStore, LicenseManager, UpdateEngine, UpdateServerClient};
//!
//! # async fn example() -> updatepulse_client::Result<()> {
//! let store = ConfigStore::new("/opt/packages/dummy-package");
//! let config = store.load()?;
//! let server = UpdateServerClient::new(&config.server)?;
//!
//! // License lifecycle (machine identifier derivation is caller-provided)
//! let licenses = LicenseManager::new(store.clone(), server.clone(), "machine-id");
//! licenses.install("aaa-bbb-ccc")?;
//! licenses.activate_license().await?;
//!
//! // Update check and self-replacement
//! let engine = UpdateEngine::new(store, server);
//! match engine.update().await? {
//!     updatepulse_client::UpdateOutcome::Updated { old_version, new_version } => {
//!         println!("updated {old_version} -> {new_version}");
//!     }
//!     updatepulse_client::UpdateOutcome::NoUpdateAvailable => {
//!         println!("up to date");
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Every fallible operation returns the crate [`Result`] with a typed
//! [`UpdateError`]; see [`core`] for the taxonomy. Nothing retries
//! internally and nothing is reported by process exit code - this crate
//! has no CLI surface of its own.

pub mod client;
pub mod config;
pub mod constants;
pub mod core;
pub mod engine;
pub mod license;
pub mod utils;

pub use client::{LicenseAction, UpdateMetadata, UpdateServer, UpdateServerClient};
pub use config::{ConfigStore, PackageConfig, PackageData};
pub use core::{Result, UpdateError, UpdateStage};
pub use engine::{UpdateEngine, UpdateOutcome, should_overwrite};
pub use license::LicenseManager;
