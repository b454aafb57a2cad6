//! Resolution of caller-supplied locators into [`Connection`]s.
//!
//! The extraction backend crashes on blob paths ending in `/`, so trailing
//! slashes are stripped before anything else looks at the path. Credentials
//! are accepted with or without their leading `?`.
//!
//! Blob names may contain spaces, either raw or percent-encoded. The resolved
//! container and blob path are always percent-decoded.

use super::{
    BlobConnection, Connection, FileConnection,
    allowlist::{Allowlist, host_of},
};
use core::{fmt, str::FromStr};
use percent_encoding::percent_decode_str;
use std::sync::Arc;
use tonic::transport::Uri;
use vds_fence_core::{Error, Result};

/// Storage backend a locator refers to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StorageProtocol {
    /// Azure blob storage, checked against the allowlist.
    #[default]
    Azure,
    /// Local filesystem. Trusted; only meant for tests and development.
    File,
}

impl fmt::Display for StorageProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Azure => f.write_str("azure"),
            Self::File => f.write_str("file"),
        }
    }
}

impl FromStr for StorageProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().trim_end_matches("://").to_ascii_lowercase();
        match name.as_str() {
            "azure" => Ok(Self::Azure),
            "file" => Ok(Self::File),
            _ => Err(Error::Configuration {
                reason: format!("unknown storage protocol '{s}', expected 'azure' or 'file'"),
            }),
        }
    }
}

/// Turns locators into validated connections.
///
/// Holds only the immutable [`Allowlist`], so a single resolver can be shared
/// by every in-flight request.
#[derive(Clone, Debug)]
pub struct ConnectionResolver {
    allowlist: Arc<Allowlist>,
}

impl ConnectionResolver {
    pub fn new(allowlist: Allowlist) -> Self {
        Self {
            allowlist: Arc::new(allowlist),
        }
    }

    pub fn allowlist(&self) -> &Allowlist {
        &self.allowlist
    }

    /// Resolves `resource_path` (absolute, or relative to `storage_root`) and
    /// `credential` into a [`Connection`] for `protocol`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidLocator`] if the locator is empty, cannot be parsed,
    ///   has no host, or does not name both a container and a blob.
    /// - [`Error::Forbidden`] if the blob host is not on the allowlist.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self, credential)))]
    pub fn resolve(
        &self,
        protocol: StorageProtocol,
        storage_root: &str,
        resource_path: &str,
        credential: &str,
    ) -> Result<Connection> {
        let locator = join_locator(storage_root, resource_path);
        let locator = locator.trim_end_matches('/');
        if locator.is_empty() {
            return Err(Error::InvalidLocator {
                reason: "empty resource path".to_string(),
            });
        }

        match protocol {
            StorageProtocol::File => Ok(Connection::File(FileConnection::new(locator.to_string()))),
            StorageProtocol::Azure => self
                .resolve_blob(locator, sanitize_sas(credential))
                .map(Connection::Blob),
        }
    }

    fn resolve_blob(&self, locator: &str, sas: &str) -> Result<BlobConnection> {
        // `Uri` rejects raw spaces, which Azure allows in blob names.
        let uri: Uri = locator
            .replace(' ', "%20")
            .parse()
            .map_err(|e| Error::InvalidLocator {
                reason: format!("'{locator}': {e}"),
            })?;

        let host = host_of(&uri).ok_or_else(|| Error::InvalidLocator {
            reason: format!("'{locator}' has no storage host"),
        })?;

        if let Err(e) = self.allowlist.check(&host) {
            #[cfg(feature = "tracing")]
            tracing::warn!(%host, "rejected storage host");
            return Err(e);
        }

        let path = percent_decode_str(uri.path())
            .decode_utf8()
            .map_err(|e| Error::InvalidLocator {
                reason: format!("'{locator}' is not valid UTF-8 once decoded: {e}"),
            })?;
        let (container, blob_path) = split_blob_path(&path);
        if container.is_empty() || blob_path.is_empty() {
            return Err(Error::InvalidLocator {
                reason: format!("'{locator}' must name both a container and a blob"),
            });
        }

        Ok(BlobConnection::new(
            container.to_string(),
            blob_path.to_string(),
            host,
            sas.to_string(),
        ))
    }
}

fn join_locator(storage_root: &str, resource_path: &str) -> String {
    if resource_path.contains("://") || storage_root.is_empty() {
        return resource_path.to_string();
    }
    format!(
        "{}/{}",
        storage_root.trim_end_matches('/'),
        resource_path.trim_start_matches('/')
    )
}

fn sanitize_sas(sas: &str) -> &str {
    sas.strip_prefix('?').unwrap_or(sas)
}

fn split_blob_path(path: &str) -> (&str, &str) {
    let path = path.trim_start_matches('/');
    path.split_once('/').unwrap_or((path, ""))
}
