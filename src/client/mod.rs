//! Update Server Client: the two remote operations the engine and the
//! license lifecycle need, plus archive download.
//!
//! The client talks to an UpdatePulse server over plain GET requests with
//! query-string parameters. All parameter values are percent-encoded via
//! [`reqwest::Url`]'s query serializer, so spaces and reserved characters in
//! a license key or package id cannot corrupt the query. Requests carry a
//! fixed, minimal header set (`user-agent: curl`, `accept: */*`) and a
//! bounded 20 second timeout.
//!
//! The [`UpdateServer`] trait is the seam consumed by the update engine and
//! the license manager; [`UpdateServerClient`] is its production
//! implementation, and tests substitute an in-memory mock. No operation
//! retries internally - transient failures surface as
//! [`UpdateError::Network`] for the external scheduler to handle.

use std::path::Path;

use reqwest::Url;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Deserialize;
use tracing::{debug, info};

use crate::constants::{
    LICENSE_API_ENDPOINT, REQUEST_TIMEOUT, UPDATE_API_ENDPOINT, UPDATE_TYPE, USER_AGENT,
};
use crate::core::{Result, UpdateError};

/// Server response to a metadata lookup. Transient; consumed once per
/// update check and never persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMetadata {
    /// Version offered by the server.
    pub version: String,
    /// Where to fetch the package archive from.
    pub download_url: String,
}

/// The two license operations the server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseAction {
    /// Bind the license key to this machine; returns a signature.
    Activate,
    /// Release the binding; the response body is not parsed.
    Deactivate,
}

impl LicenseAction {
    /// Wire value of the `action` query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
        }
    }
}

/// Remote operations required by the update engine and the license
/// lifecycle.
///
/// Implemented by [`UpdateServerClient`] for real servers and by in-memory
/// mocks in tests.
pub trait UpdateServer {
    /// Query the metadata endpoint for the latest available version.
    fn fetch_metadata(
        &self,
        package_id: &str,
        installed_version: &str,
        license_key: Option<&str>,
        license_signature: Option<&str>,
    ) -> impl Future<Output = Result<UpdateMetadata>>;

    /// Activate or deactivate a license binding.
    ///
    /// `Activate` yields `Some(signature)` on acceptance; `Deactivate`
    /// always yields `None`.
    fn set_license_state(
        &self,
        action: LicenseAction,
        license_key: &str,
        domain: &str,
        package_id: &str,
    ) -> impl Future<Output = Result<Option<String>>>;

    /// Download the package archive at `download_url` to `dest`,
    /// overwriting any existing file.
    fn download_package(
        &self,
        download_url: &str,
        dest: &Path,
    ) -> impl Future<Output = Result<()>>;
}

impl<T: UpdateServer> UpdateServer for &T {
    fn fetch_metadata(
        &self,
        package_id: &str,
        installed_version: &str,
        license_key: Option<&str>,
        license_signature: Option<&str>,
    ) -> impl Future<Output = Result<UpdateMetadata>> {
        (**self).fetch_metadata(package_id, installed_version, license_key, license_signature)
    }

    fn set_license_state(
        &self,
        action: LicenseAction,
        license_key: &str,
        domain: &str,
        package_id: &str,
    ) -> impl Future<Output = Result<Option<String>>> {
        (**self).set_license_state(action, license_key, domain, package_id)
    }

    fn download_package(
        &self,
        download_url: &str,
        dest: &Path,
    ) -> impl Future<Output = Result<()>> {
        (**self).download_package(download_url, dest)
    }
}

/// HTTP client against one UpdatePulse server.
#[derive(Debug, Clone)]
pub struct UpdateServerClient {
    http: reqwest::Client,
    server_url: Url,
}

impl UpdateServerClient {
    /// Build a client for the given server base URL.
    ///
    /// # Errors
    ///
    /// [`UpdateError::ConfigCorrupt`] when the persisted server URL is not
    /// a valid base URL.
    pub fn new(server_url: &str) -> Result<Self> {
        let parsed = Url::parse(server_url).map_err(|e| UpdateError::ConfigCorrupt {
            path: server_url.to_string(),
            reason: format!("invalid server URL: {e}"),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(UpdateError::ConfigCorrupt {
                path: server_url.to_string(),
                reason: "server URL cannot be used as a base".to_string(),
            });
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| UpdateError::Io(std::io::Error::other(e)))?;

        Ok(Self {
            http,
            server_url: parsed,
        })
    }

    fn endpoint_url(&self, endpoint: &str) -> Url {
        let mut url = self.server_url.clone();
        // cannot_be_a_base was rejected in new(), so path_segments_mut
        // always succeeds here
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(endpoint).push("");
        }
        url
    }

    fn metadata_url(
        &self,
        package_id: &str,
        installed_version: &str,
        license_key: Option<&str>,
        license_signature: Option<&str>,
    ) -> Url {
        let mut url = self.endpoint_url(UPDATE_API_ENDPOINT);
        url.query_pairs_mut()
            .append_pair("action", "get_metadata")
            .append_pair("package_id", package_id)
            .append_pair("installed_version", installed_version)
            .append_pair("license_key", license_key.unwrap_or(""))
            .append_pair("license_signature", license_signature.unwrap_or(""))
            .append_pair("update_type", UPDATE_TYPE);
        url
    }

    fn license_url(
        &self,
        action: LicenseAction,
        license_key: &str,
        domain: &str,
        package_id: &str,
    ) -> Url {
        let mut url = self.endpoint_url(LICENSE_API_ENDPOINT);
        url.query_pairs_mut()
            .append_pair("action", action.as_str())
            .append_pair("license_key", license_key)
            .append_pair("allowed_domains", domain)
            .append_pair("package_slug", package_id);
        url
    }
}

fn network_error(operation: &str) -> impl FnOnce(reqwest::Error) -> UpdateError {
    let operation = operation.to_string();
    move |e| UpdateError::Network {
        operation,
        reason: e.to_string(),
    }
}

impl UpdateServer for UpdateServerClient {
    async fn fetch_metadata(
        &self,
        package_id: &str,
        installed_version: &str,
        license_key: Option<&str>,
        license_signature: Option<&str>,
    ) -> Result<UpdateMetadata> {
        let url = self.metadata_url(package_id, installed_version, license_key, license_signature);
        debug!("fetching update metadata from {url}");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(network_error("fetch_metadata"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Server {
                operation: "fetch_metadata".to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        response
            .json::<UpdateMetadata>()
            .await
            .map_err(|e| UpdateError::Server {
                operation: "fetch_metadata".to_string(),
                reason: e.to_string(),
            })
    }

    async fn set_license_state(
        &self,
        action: LicenseAction,
        license_key: &str,
        domain: &str,
        package_id: &str,
    ) -> Result<Option<String>> {
        let url = self.license_url(action, license_key, domain, package_id);
        debug!("license {} request to {url}", action.as_str());

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(network_error("set_license_state"))?;

        match action {
            LicenseAction::Activate => {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .map_err(network_error("set_license_state"))?;

                if !status.is_success() {
                    return Err(UpdateError::LicenseRejected {
                        reason: format!("HTTP {status}: {body}"),
                    });
                }

                let value: serde_json::Value = serde_json::from_str(&body)
                    .map_err(|_| UpdateError::LicenseRejected {
                        reason: body.clone(),
                    })?;

                match value.get("license_signature").and_then(|v| v.as_str()) {
                    Some(signature) if !signature.is_empty() => {
                        info!("license activated for package '{package_id}'");
                        Ok(Some(signature.to_string()))
                    }
                    _ => Err(UpdateError::LicenseRejected { reason: body }),
                }
            }
            // Deactivation is best effort; any server response counts as
            // done and the body is deliberately not parsed.
            LicenseAction::Deactivate => {
                info!("license deactivation requested for package '{package_id}'");
                Ok(None)
            }
        }
    }

    async fn download_package(&self, download_url: &str, dest: &Path) -> Result<()> {
        let url = Url::parse(download_url).map_err(|e| UpdateError::Server {
            operation: "download_package".to_string(),
            reason: format!("invalid download URL '{download_url}': {e}"),
        })?;
        info!("downloading package archive from {url}");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(network_error("download_package"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Server {
                operation: "download_package".to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(network_error("download_package"))?;

        // Overwrite unconditionally so a stale partial file from a
        // previous failed run is never reused
        tokio::fs::write(dest, &bytes).await?;
        debug!("wrote {} bytes to {}", bytes.len(), dest.display());

        Ok(())
    }
}
