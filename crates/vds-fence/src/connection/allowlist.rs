//! Process-lifetime set of storage hosts this deployment may read from.

use tonic::transport::Uri;
use vds_fence_core::{Error, Result};

/// Immutable, ordered list of accepted storage hosts.
///
/// Built once at startup. Every entry must be an absolute URL with a host,
/// e.g. `https://account.blob.core.windows.net`. Host comparison ignores ASCII
/// case; ports are part of the host.
#[derive(Clone, Debug, Default)]
pub struct Allowlist {
    hosts: Vec<String>,
}

impl Allowlist {
    /// Parses the configured storage accounts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if any entry is blank, cannot be
    /// parsed as a URL, or lacks a scheme or host.
    pub fn new<I, S>(accounts: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = accounts
            .into_iter()
            .map(|account| parse_entry(account.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { hosts })
    }

    /// Checks `host` against the list, ignoring ASCII case.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Forbidden`] naming the host if it is not listed.
    pub fn check(&self, host: &str) -> Result<()> {
        if self.contains(host) {
            Ok(())
        } else {
            Err(Error::Forbidden {
                host: host.to_string(),
            })
        }
    }

    pub fn contains(&self, host: &str) -> bool {
        self.hosts
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(host))
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

fn parse_entry(raw: &str) -> Result<String> {
    let account = raw.trim();
    if account.is_empty() {
        return Err(Error::Configuration {
            reason: "Empty storage-account not allowed".to_string(),
        });
    }

    let uri: Uri = account.parse().map_err(|e| Error::Configuration {
        reason: format!("invalid storage-account '{account}': {e}"),
    })?;

    if uri.scheme().is_none() {
        return Err(Error::Configuration {
            reason: format!("storage-account '{account}' must be an absolute url"),
        });
    }

    host_of(&uri).ok_or_else(|| Error::Configuration {
        reason: format!("storage-account '{account}' has no host"),
    })
}

/// Host of `uri` including a non-default port, without any userinfo.
pub(crate) fn host_of(uri: &Uri) -> Option<String> {
    let authority = uri.authority()?;
    let host = authority.host();
    if host.is_empty() {
        return None;
    }
    Some(match authority.port_u16() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}
