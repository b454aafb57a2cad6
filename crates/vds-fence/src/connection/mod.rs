//! Storage connection descriptors and the allowlist-checked resolver.
//!
//! A [`Connection`] is built fresh for every logical request from a caller
//! supplied locator and credential, handed to the scheduler, and dropped once
//! the request completes.
//!
//! ## Structure
//!
//! - [`allowlist`] - accepted storage hosts, fixed at startup.
//! - [`resolver`] - turns a locator and credential into a [`Connection`].

pub mod allowlist;
pub mod resolver;

pub use allowlist::Allowlist;
pub use resolver::{ConnectionResolver, StorageProtocol};

/// Validated, backend-specific connection to one volume.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Connection {
    Blob(BlobConnection),
    File(FileConnection),
}

impl Connection {
    /// Canonical url understood by the extraction backend.
    pub fn url(&self) -> String {
        match self {
            Self::Blob(blob) => blob.url(),
            Self::File(file) => file.url().to_string(),
        }
    }

    /// Backend connection string; empty for local files.
    pub fn connection_string(&self) -> String {
        match self {
            Self::Blob(blob) => blob.connection_string(),
            Self::File(_) => String::new(),
        }
    }

    /// Sanitized credential forwarded to workers.
    pub fn credential(&self) -> &str {
        match self {
            Self::Blob(blob) => blob.sas(),
            Self::File(_) => "",
        }
    }
}

/// Connection to a blob in an allow-listed storage account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobConnection {
    container: String,
    blob_path: String,
    host: String,
    sas: String,
}

impl BlobConnection {
    pub(crate) const fn new(container: String, blob_path: String, host: String, sas: String) -> Self {
        Self {
            container,
            blob_path,
            host,
            sas,
        }
    }

    pub fn url(&self) -> String {
        format!("azure://{}/{}", self.container, self.blob_path)
    }

    pub fn connection_string(&self) -> String {
        format!(
            "BlobEndpoint=https://{};SharedAccessSignature=?{}",
            self.host, self.sas
        )
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn blob_path(&self) -> &str {
        &self.blob_path
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Credential with any leading `?` removed.
    pub fn sas(&self) -> &str {
        &self.sas
    }
}

/// Connection to a volume on the local filesystem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileConnection {
    path: String,
}

impl FileConnection {
    pub(crate) const fn new(path: String) -> Self {
        Self { path }
    }

    pub fn url(&self) -> &str {
        &self.path
    }
}
