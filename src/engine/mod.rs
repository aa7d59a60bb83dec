//! Update Engine: check → download → stage → swap → finalize.
//!
//! The engine is the highest-risk component in the crate because the swap
//! step mutates the live installation directory in place. The pipeline is
//! strictly linear:
//!
//! ```text
//! CheckMetadata -> (NoUpdateAvailable | Download) -> Extract -> Swap -> Finalize
//! ```
//!
//! with a stage-tagged failure reachable from any point
//! ([`UpdateError::StageFailed`]). There is no partial-success return:
//! either the installation ends on the new version with a consistent
//! record, or it ends unchanged (best effort) with an error. A failure
//! inside Swap can leave a mixed old/new tree - the engine performs no
//! rollback; this is a documented property of the design, not something it
//! masks.
//!
//! Staging artifacts (the downloaded archive and the extracted directory,
//! both keyed by `package_id` under the staging root) are removed before
//! `update` returns, on success and on every failure path reached after
//! their creation.
//!
//! # Swap exclusion rule
//!
//! During the swap, entries whose name starts with the `updatepulse` prefix
//! are update-engine scripts and survive from the *old* tree, unless the
//! name also ends in `.json` - engine configuration, which the incoming
//! package is expected to refresh. The rule is the pure function
//! [`should_overwrite`], applied symmetrically to deletions from the live
//! tree and to moves from the staged tree, so a shipped update can carry
//! replacement update scripts without clobbering the engine mid-run.

use std::env;
use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::client::{UpdateMetadata, UpdateServer};
use crate::config::{ConfigStore, PackageConfig};
use crate::constants::{INSTALLED_MARKER, UPDATE_SCRIPT_PREFIX};
use crate::core::{Result, UpdateError, UpdateStage};
use crate::utils::fs as fs_utils;

/// Result of a completed [`UpdateEngine::update`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The server's version is not strictly newer; no filesystem change
    /// was made.
    NoUpdateAvailable,
    /// The installation was replaced with the new version.
    Updated {
        /// Version that was installed before the run.
        old_version: String,
        /// Version the installation ends on.
        new_version: String,
    },
}

/// Whether a top-level entry with this name is replaced during the swap.
///
/// Entries named with the `updatepulse` prefix are update-engine scripts
/// and are kept, unless the name also ends in `.json` (engine
/// configuration, rewritten on update). Everything else is replaced.
pub fn should_overwrite(entry_name: &str) -> bool {
    !entry_name.starts_with(UPDATE_SCRIPT_PREFIX) || entry_name.ends_with(".json")
}

/// Raw string ordering, matching the reference integrations. Not semver:
/// `"9.0.0"` compares greater than `"10.0.0"`.
fn is_newer(remote: &str, installed: &str) -> bool {
    remote > installed
}

/// Orchestrates self-replacement of one installation directory.
///
/// Holds a [`ConfigStore`] for the installation and a server handle. Not
/// safe for concurrent invocation against the same installation - callers
/// serialize operations externally (see the crate docs).
#[derive(Debug)]
pub struct UpdateEngine<S> {
    store: ConfigStore,
    server: S,
    staging_root: PathBuf,
}

impl<S: UpdateServer> UpdateEngine<S> {
    /// Create an engine staging into the system temp directory.
    pub fn new(store: ConfigStore, server: S) -> Self {
        Self {
            store,
            server,
            staging_root: env::temp_dir(),
        }
    }

    /// Override the staging root (archive and extraction target). Used by
    /// tests; production callers keep the default.
    #[must_use]
    pub fn with_staging_root(mut self, staging_root: impl Into<PathBuf>) -> Self {
        self.staging_root = staging_root.into();
        self
    }

    /// Check the server and, if a strictly newer version is offered,
    /// replace the installation with it.
    ///
    /// License key and signature held in the record before the swap are
    /// reinstated into the (possibly package-shipped) record afterwards,
    /// and the installed version is set to the remote version.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::NotInstalled`] when the installed marker is absent
    /// - [`UpdateError::ConfigCorrupt`] when the record cannot be loaded
    /// - [`UpdateError::StageFailed`] for failures inside the pipeline,
    ///   tagged with the stage they occurred in
    pub async fn update(&self) -> Result<UpdateOutcome> {
        if !self.store.is_installed() {
            return Err(UpdateError::NotInstalled);
        }

        let config = self.store.load()?;
        let package_id = self.store.package_id();
        let installed_version = config.package_data.version.clone();

        let metadata = self
            .server
            .fetch_metadata(
                &package_id,
                &installed_version,
                config.license_key.as_deref(),
                config.license_signature.as_deref(),
            )
            .await
            .map_err(|e| e.at_stage(UpdateStage::CheckMetadata))?;

        if !is_newer(&metadata.version, &installed_version) {
            debug!(
                "package '{package_id}' is up to date ({installed_version}, server offers {})",
                metadata.version
            );
            return Ok(UpdateOutcome::NoUpdateAvailable);
        }

        info!(
            "updating package '{package_id}': {installed_version} -> {}",
            metadata.version
        );

        let archive_path = self.staging_root.join(format!("{package_id}.zip"));
        let staged_dir = self.staging_root.join(&package_id);

        let result = self
            .apply_update(&config, &metadata, &package_id, &archive_path, &staged_dir)
            .await;

        // Staging artifacts never outlive the run, success or failure
        fs_utils::remove_entry_best_effort(&staged_dir);
        fs_utils::remove_entry_best_effort(&archive_path);

        result?;
        info!("package '{package_id}' updated to {}", metadata.version);

        Ok(UpdateOutcome::Updated {
            old_version: installed_version,
            new_version: metadata.version,
        })
    }

    async fn apply_update(
        &self,
        config: &PackageConfig,
        metadata: &UpdateMetadata,
        package_id: &str,
        archive_path: &Path,
        staged_dir: &Path,
    ) -> Result<()> {
        self.server
            .download_package(&metadata.download_url, archive_path)
            .await
            .map_err(|e| e.at_stage(UpdateStage::Download))?;

        self.extract(package_id, archive_path, staged_dir)
            .map_err(|e| e.at_stage(UpdateStage::Extract))?;

        self.swap(staged_dir)
            .map_err(|e| e.at_stage(UpdateStage::Swap))?;

        self.finalize(config, &metadata.version, package_id)
            .map_err(|e| e.at_stage(UpdateStage::Finalize))
    }

    /// Extract the archive into the staging root. The archive is expected
    /// to contain a single `<package_id>/` top-level directory; extraction
    /// always starts from a clean slate.
    fn extract(&self, package_id: &str, archive_path: &Path, staged_dir: &Path) -> Result<()> {
        fs_utils::remove_entry_if_exists(staged_dir)?;

        let corrupt = |reason: String| UpdateError::CorruptArchive {
            path: archive_path.display().to_string(),
            reason,
        };

        let file = File::open(archive_path)?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| corrupt(e.to_string()))?;
        archive
            .extract(&self.staging_root)
            .map_err(|e| corrupt(e.to_string()))?;

        if !staged_dir.is_dir() {
            return Err(corrupt(format!(
                "archive does not contain a '{package_id}/' directory"
            )));
        }

        debug!("extracted package archive to {}", staged_dir.display());
        Ok(())
    }

    /// Replace the live tree with the staged tree under the exclusion
    /// rule. Non-atomic: once this starts it must run to completion or
    /// leave a mixed tree.
    fn swap(&self, staged_dir: &Path) -> Result<()> {
        let install_dir = self.store.package_dir();

        for entry in std::fs::read_dir(install_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == INSTALLED_MARKER {
                continue;
            }
            if should_overwrite(&name) {
                fs_utils::remove_entry_if_exists(&entry.path())?;
            }
        }

        for entry in std::fs::read_dir(staged_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if should_overwrite(&name) {
                fs_utils::move_entry(&entry.path(), &install_dir.join(entry.file_name()))?;
            }
        }

        debug!("swapped staged tree into {}", install_dir.display());
        Ok(())
    }

    /// Normalize permissions, then merge the pre-swap license state and
    /// the new version into the (possibly package-shipped) record and
    /// persist it.
    fn finalize(
        &self,
        pre_swap: &PackageConfig,
        new_version: &str,
        package_id: &str,
    ) -> Result<()> {
        self.normalize_permissions(package_id)?;

        // The incoming package may have shipped its own record file, so
        // reload rather than reusing the in-memory copy
        let mut config = self.store.load()?;
        config.license_key = pre_swap.license_key.clone();
        config.license_signature = pre_swap.license_signature.clone();
        config.package_data.version = new_version.to_string();
        self.store.save(&config)
    }

    #[cfg(unix)]
    fn normalize_permissions(&self, package_id: &str) -> Result<()> {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;
        use walkdir::WalkDir;

        for entry in WalkDir::new(self.store.package_dir()) {
            let entry = entry.map_err(|e| UpdateError::Io(e.into()))?;
            let file_type = entry.file_type();

            let mode = if file_type.is_dir() {
                0o755
            } else if file_type.is_file() {
                // Package entry points carry the package_id prefix and
                // must stay executable
                if entry.file_name().to_string_lossy().starts_with(package_id) {
                    0o755
                } else {
                    0o644
                }
            } else {
                continue;
            };

            std::fs::set_permissions(entry.path(), Permissions::from_mode(mode))?;
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn normalize_permissions(&self, _package_id: &str) -> Result<()> {
        Ok(())
    }
}
