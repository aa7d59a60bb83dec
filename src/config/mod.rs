//! Config Store: the persisted package record and the installed marker.
//!
//! Every installation directory carries an `updatepulse.json` record (server
//! URL, installed version, optional license fields) and signals "installed"
//! through the presence of a zero-byte `.installed` marker file. The
//! [`ConfigStore`] exclusively owns both; the license lifecycle and the
//! update engine never cache record fields between operations - every read
//! goes through [`ConfigStore::load`] so stale-signature and stale-version
//! bugs cannot occur.
//!
//! # Persistence format
//!
//! The record is JSON with the server's key naming (`server`,
//! `packageData.Version`, `licenseKey`, `licenseSignature`), written with
//! stable 4-space indentation. Keys this client does not understand are
//! preserved verbatim across load→save, so a record round-trips losslessly
//! even when the package ships extra metadata.
//!
//! Saves are crash-safe: the record is written to a temporary file and
//! renamed over the target, so a crash mid-write never leaves a
//! half-written record readable as valid.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{CONFIG_FILE_NAME, INSTALLED_MARKER};
use crate::core::{Result, UpdateError};
use crate::utils::fs::atomic_write;

/// The persisted package record, as stored in `updatepulse.json`.
///
/// Invariant maintained by the license lifecycle: `license_signature` is
/// never present while `license_key` is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageConfig {
    /// Base URL of the update server. Immutable after provisioning.
    pub server: String,

    /// Package metadata block; carries the installed version.
    #[serde(rename = "packageData")]
    pub package_data: PackageData,

    /// License key, absent until `install` has run.
    #[serde(rename = "licenseKey", default, skip_serializing_if = "Option::is_none")]
    pub license_key: Option<String>,

    /// License signature issued by the server on activation; removed on
    /// deactivation or uninstall.
    #[serde(
        rename = "licenseSignature",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub license_signature: Option<String>,

    /// Unrecognized top-level keys, preserved for lossless round-trips.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The `packageData` block of the persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageData {
    /// Installed version string. Mutated only by the update engine on a
    /// successful swap.
    #[serde(rename = "Version")]
    pub version: String,

    /// Unrecognized keys inside `packageData`, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Owner of the persisted record and the installed marker for one
/// installation directory.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    package_dir: PathBuf,
}

impl ConfigStore {
    /// Create a store rooted at the given installation directory.
    pub fn new(package_dir: impl Into<PathBuf>) -> Self {
        Self {
            package_dir: package_dir.into(),
        }
    }

    /// The installation directory this store is rooted at.
    pub fn package_dir(&self) -> &Path {
        &self.package_dir
    }

    /// Package identity derived from the installation directory name.
    /// Used in all remote calls and to key staging artifacts.
    pub fn package_id(&self) -> String {
        self.package_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Path of the persisted record file.
    pub fn config_path(&self) -> PathBuf {
        self.package_dir.join(CONFIG_FILE_NAME)
    }

    fn marker_path(&self) -> PathBuf {
        self.package_dir.join(INSTALLED_MARKER)
    }

    /// Load the persisted record.
    ///
    /// # Errors
    ///
    /// [`UpdateError::ConfigCorrupt`] when the file is missing, unreadable,
    /// or not well-formed JSON of the expected shape.
    pub fn load(&self) -> Result<PackageConfig> {
        let path = self.config_path();
        let contents = fs::read_to_string(&path).map_err(|e| UpdateError::ConfigCorrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        serde_json::from_str(&contents).map_err(|e| UpdateError::ConfigCorrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Persist the record atomically (write to a temporary file, then
    /// rename over the target).
    pub fn save(&self, config: &PackageConfig) -> Result<()> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        config
            .serialize(&mut ser)
            .map_err(|e| UpdateError::Io(std::io::Error::other(e)))?;
        buf.push(b'\n');

        let path = self.config_path();
        debug!("persisting package record to {}", path.display());
        atomic_write(&path, &buf)
    }

    /// Create the installed marker. A second call is a no-op.
    pub fn mark_installed(&self) -> Result<()> {
        let marker = self.marker_path();
        if !marker.exists() {
            fs::write(&marker, b"")?;
        }
        Ok(())
    }

    /// Remove the installed marker.
    ///
    /// # Errors
    ///
    /// [`UpdateError::NotInstalled`] when the marker is already absent.
    pub fn mark_uninstalled(&self) -> Result<()> {
        let marker = self.marker_path();
        if !marker.exists() {
            return Err(UpdateError::NotInstalled);
        }
        fs::remove_file(&marker)?;
        Ok(())
    }

    /// Whether the installed marker is present. Pure read; never fails.
    pub fn is_installed(&self) -> bool {
        self.marker_path().is_file()
    }
}
