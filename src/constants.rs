//! Global constants used throughout the UpdatePulse client.
//!
//! Endpoint names, persisted file names, and timeout values that are
//! shared across modules. Defining them centrally keeps the wire and
//! on-disk contracts in one discoverable place.

use std::time::Duration;

/// File name of the persisted package record inside the installation
/// directory.
pub const CONFIG_FILE_NAME: &str = "updatepulse.json";

/// File name of the zero-byte installed marker inside the installation
/// directory. Its presence signals "installed".
pub const INSTALLED_MARKER: &str = ".installed";

/// Name prefix reserved for update-engine scripts shipped inside the
/// package. Entries with this prefix survive the swap step unless their
/// name also ends in `.json` (engine configuration, which is rewritten
/// on update).
pub const UPDATE_SCRIPT_PREFIX: &str = "updatepulse";

/// Path segment of the update (metadata) API on the server.
pub const UPDATE_API_ENDPOINT: &str = "updatepulse-server-update-api";

/// Path segment of the license API on the server.
pub const LICENSE_API_ENDPOINT: &str = "updatepulse-server-license-api";

/// The `update_type` value transmitted with every metadata request.
/// This client handles generic (non-plugin, non-theme) packages.
pub const UPDATE_TYPE: &str = "Generic";

/// Timeout applied to every request against the update server (20 seconds).
///
/// Covers metadata lookups, license calls and archive downloads; callers
/// must never block indefinitely on a stalled server.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// User agent transmitted with every request. The server accepts any
/// value; `curl` matches the reference integrations.
pub const USER_AGENT: &str = "curl";
