//! License Lifecycle: install/uninstall/activate/deactivate transitions.
//!
//! Three effective states, all derived from on-disk facts (the installed
//! marker and the persisted record) rather than from process-wide mutable
//! variables:
//!
//! - `Uninstalled` - no marker
//! - `InstalledNoLicense` - marker present, no signature persisted
//! - `LicenseActive` - marker present, signature persisted
//!
//! Transitions:
//!
//! - `install(key)`: `Uninstalled -> InstalledNoLicense`; re-running
//!   overwrites the key and leaves the marker in place
//! - `activate_license()`: `InstalledNoLicense -> LicenseActive`
//! - `deactivate_license()`: `LicenseActive -> InstalledNoLicense`
//! - `uninstall()`: `* -> Uninstalled`
//!
//! Every operation loads the record from the [`ConfigStore`] and persists
//! it back before returning; nothing is cached across operations. Server
//! rejections surface as [`UpdateError::LicenseRejected`] and are never
//! retried here.

use tracing::{debug, info};

use crate::client::{LicenseAction, UpdateServer};
use crate::config::ConfigStore;
use crate::core::{Result, UpdateError};

/// Drives license state transitions for one installation directory.
///
/// `domain` is the opaque machine-bound identifier the server binds
/// activations to; deriving it is platform-specific and left to the
/// caller.
#[derive(Debug)]
pub struct LicenseManager<S> {
    store: ConfigStore,
    server: S,
    domain: String,
}

impl<S: UpdateServer> LicenseManager<S> {
    /// Create a manager over the given store, server handle, and
    /// machine-bound identifier.
    pub fn new(store: ConfigStore, server: S, domain: impl Into<String>) -> Self {
        Self {
            store,
            server,
            domain: domain.into(),
        }
    }

    /// Whether the installed marker is present. Pure read; never fails.
    pub fn is_installed(&self) -> bool {
        self.store.is_installed()
    }

    /// Install the package: persist the license key and set the installed
    /// marker.
    ///
    /// Re-running overwrites the key; no prior-state check is performed.
    pub fn install(&self, license_key: &str) -> Result<()> {
        info!("installing package '{}'", self.store.package_id());

        let mut config = self.store.load()?;
        config.license_key = Some(license_key.to_string());
        self.store.save(&config)?;
        self.store.mark_installed()?;

        Ok(())
    }

    /// Uninstall the package: remove the marker and clear the license key
    /// and signature.
    ///
    /// # Errors
    ///
    /// [`UpdateError::NotInstalled`] when the marker is already absent.
    pub fn uninstall(&self) -> Result<()> {
        info!("uninstalling package '{}'", self.store.package_id());

        self.store.mark_uninstalled()?;

        let mut config = self.store.load()?;
        config.license_key = None;
        config.license_signature = None;
        self.store.save(&config)?;

        Ok(())
    }

    /// Activate the license against the server and persist the returned
    /// signature.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::NotInstalled`] when the marker is absent or no
    ///   license key has been installed
    /// - [`UpdateError::LicenseRejected`] when the server reports the key
    ///   invalid; local state is left unchanged
    /// - [`UpdateError::Network`] on transport failure
    pub async fn activate_license(&self) -> Result<()> {
        if !self.store.is_installed() {
            return Err(UpdateError::NotInstalled);
        }

        let mut config = self.store.load()?;
        let license_key = config
            .license_key
            .clone()
            .ok_or(UpdateError::NotInstalled)?;
        let package_id = self.store.package_id();

        let signature = self
            .server
            .set_license_state(LicenseAction::Activate, &license_key, &self.domain, &package_id)
            .await?;

        match signature {
            Some(signature) => {
                config.license_signature = Some(signature);
                self.store.save(&config)?;
                Ok(())
            }
            // The real client always returns a signature for a successful
            // activation; an empty result means the server misbehaved.
            None => Err(UpdateError::LicenseRejected {
                reason: "activation returned no signature".to_string(),
            }),
        }
    }

    /// Deactivate the license and clear the local signature.
    ///
    /// The server is called regardless of whether a signature is present
    /// locally; any server response (including "already inactive") clears
    /// the local signature. Only a transport failure leaves it in place.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::NotInstalled`] when the marker is absent or no
    ///   license key has been installed
    /// - [`UpdateError::Network`] on transport failure
    pub async fn deactivate_license(&self) -> Result<()> {
        if !self.store.is_installed() {
            return Err(UpdateError::NotInstalled);
        }

        let mut config = self.store.load()?;
        let license_key = config
            .license_key
            .clone()
            .ok_or(UpdateError::NotInstalled)?;
        let package_id = self.store.package_id();

        self.server
            .set_license_state(
                LicenseAction::Deactivate,
                &license_key,
                &self.domain,
                &package_id,
            )
            .await?;

        if config.license_signature.take().is_some() {
            debug!("cleared license signature for package '{package_id}'");
        }
        self.store.save(&config)?;

        Ok(())
    }
}
