//! Process configuration for the fence scheduler.
//!
//! Everything here is read once at startup, from CLI arguments or the
//! environment (optionally populated from `.env`). Invalid values abort
//! startup; nothing in this module is consulted per request.

use crate::{
    connection::{Allowlist, StorageProtocol},
    partition::PartitionPolicy,
};
use anyhow::{Context, bail};
use clap::{Args, ValueEnum};
use core::{num::NonZeroUsize, time::Duration};
use tonic::codec::CompressionEncoding;

/// Settings shared by every fence the process schedules.
///
/// Each field can be set as a flag or through the environment variable noted
/// on it.
#[derive(Args, Debug, Clone)]
pub struct ServiceArgs {
    /// Storage accounts volumes may be read from, comma separated.
    ///
    /// Each entry must be an absolute url such as
    /// `https://account.blob.core.windows.net`. Hosts are compared without
    /// regard to case.
    ///
    /// Environment variable: `STORAGE_ACCOUNTS`
    #[arg(long, env = "STORAGE_ACCOUNTS", value_delimiter = ',')]
    pub storage_accounts: Vec<String>,

    /// Storage backend: `azure` or `file`.
    ///
    /// `file` skips the allowlist entirely and is meant for local testing.
    ///
    /// Environment variable: `STORAGE_PROTOCOL`
    #[arg(long, env = "STORAGE_PROTOCOL", default_value_t = String::from("azure"))]
    pub protocol: String,

    /// Prefix joined to relative volume paths.
    ///
    /// Environment variable: `STORAGE_ROOT`
    #[arg(long, env = "STORAGE_ROOT", default_value_t = String::new())]
    pub storage_root: String,

    /// Address of the worker pool (usually a load-balanced service).
    ///
    /// Environment variable: `WORKER_ADDR`
    #[arg(long, env = "WORKER_ADDR", default_value_t = String::from("http://127.0.0.1:50051"))]
    pub worker_addr: String,

    /// Number of parts each fence is split into.
    ///
    /// With `--target-chunk-traces` this becomes the upper bound on the part
    /// count instead.
    ///
    /// Environment variable: `VDS_JOBS`
    #[arg(long, env = "VDS_JOBS", default_value_t = 4)]
    pub jobs: usize,

    /// Size parts by coordinate count rather than using a fixed part count.
    ///
    /// Environment variable: `TARGET_CHUNK_TRACES`
    #[arg(long, env = "TARGET_CHUNK_TRACES")]
    pub target_chunk_traces: Option<usize>,

    /// Timeout for each part's RPC, in seconds.
    ///
    /// Environment variable: `RPC_TIMEOUT_SECS`
    #[arg(long, env = "RPC_TIMEOUT_SECS", default_value_t = 300)]
    pub rpc_timeout_secs: u64,

    /// Largest part response accepted from a worker, in MiB.
    ///
    /// Environment variable: `MAX_MESSAGE_MIB`
    #[arg(long, env = "MAX_MESSAGE_MIB", default_value_t = 256)]
    pub max_message_mib: usize,

    /// Compression applied to requests sent to workers.
    ///
    /// Environment variable: `SEND_COMPRESSION`
    #[arg(long, env = "SEND_COMPRESSION", value_enum, default_value_t = Compression::None)]
    pub send_compression: Compression,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Compression {
    None,
    Gzip,
    Zstd,
}

impl From<Compression> for Option<CompressionEncoding> {
    fn from(value: Compression) -> Self {
        match value {
            Compression::None => None,
            Compression::Gzip => Some(CompressionEncoding::Gzip),
            Compression::Zstd => Some(CompressionEncoding::Zstd),
        }
    }
}

/// Validated configuration derived from [`ServiceArgs`].
#[derive(Clone, Debug)]
pub struct FenceConfig {
    pub allowlist: Allowlist,
    pub protocol: StorageProtocol,
    pub storage_root: String,
    pub worker_addr: String,
    pub policy: PartitionPolicy,
    pub rpc_timeout: Duration,
    pub max_message_bytes: usize,
    pub send_compression: Option<CompressionEncoding>,
}

impl TryFrom<ServiceArgs> for FenceConfig {
    type Error = anyhow::Error;

    fn try_from(args: ServiceArgs) -> Result<Self, Self::Error> {
        let protocol: StorageProtocol = args.protocol.parse()?;

        let allowlist = Allowlist::new(&args.storage_accounts)?;
        if protocol == StorageProtocol::Azure && allowlist.is_empty() {
            bail!("STORAGE_ACCOUNTS must name at least one account for the azure protocol");
        }

        let Some(jobs) = NonZeroUsize::new(args.jobs) else {
            bail!("VDS_JOBS must be greater than 0");
        };

        let policy = match args.target_chunk_traces {
            None => PartitionPolicy::Fixed(jobs),
            Some(traces) => PartitionPolicy::TargetChunkSize {
                traces: NonZeroUsize::new(traces)
                    .context("TARGET_CHUNK_TRACES must be greater than 0")?,
                max_parts: jobs,
            },
        };

        if args.rpc_timeout_secs == 0 {
            bail!("RPC_TIMEOUT_SECS must be greater than 0");
        }

        let max_message_bytes = args
            .max_message_mib
            .checked_mul(1024 * 1024)
            .ok_or_else(|| anyhow::anyhow!("Overflow in max_message_bytes computation"))?;

        Ok(Self {
            allowlist,
            protocol,
            storage_root: args.storage_root,
            worker_addr: args.worker_addr,
            policy,
            rpc_timeout: Duration::from_secs(args.rpc_timeout_secs),
            max_message_bytes,
            send_compression: args.send_compression.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        service: ServiceArgs,
    }

    fn parse(args: &[&str]) -> anyhow::Result<FenceConfig> {
        let cli = TestCli::try_parse_from(std::iter::once("vds-fence").chain(args.iter().copied()))?;
        FenceConfig::try_from(cli.service)
    }

    #[test]
    fn defaults_use_four_fixed_parts_and_five_minute_timeout() {
        let config = parse(&["--storage-accounts", "https://foo.blob.core.windows.net"]).unwrap();

        assert_eq!(config.protocol, StorageProtocol::Azure);
        assert_eq!(
            config.policy,
            PartitionPolicy::Fixed(NonZeroUsize::new(4).unwrap())
        );
        assert_eq!(config.rpc_timeout, Duration::from_secs(300));
        assert_eq!(config.max_message_bytes, 256 * 1024 * 1024);
        assert!(config.send_compression.is_none());
        assert!(config.allowlist.contains("foo.blob.core.windows.net"));
    }

    #[test]
    fn accounts_are_comma_separated() {
        let config = parse(&[
            "--storage-accounts",
            "https://a.blob.core.windows.net,https://b.blob.core.windows.net",
        ])
        .unwrap();
        assert_eq!(config.allowlist.len(), 2);
    }

    #[test]
    fn malformed_account_aborts_startup() {
        assert!(parse(&["--storage-accounts", "https://a.blob.core.windows.net, "]).is_err());
        assert!(parse(&["--storage-accounts", "not a url"]).is_err());
    }

    #[test]
    fn azure_requires_an_allowlist() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["--protocol", "file"]).is_ok());
    }

    #[test]
    fn zero_jobs_or_timeout_is_rejected() {
        let account = "https://foo.blob.core.windows.net";
        assert!(parse(&["--storage-accounts", account, "--jobs", "0"]).is_err());
        assert!(parse(&["--storage-accounts", account, "--rpc-timeout-secs", "0"]).is_err());
        assert!(parse(&["--storage-accounts", account, "--target-chunk-traces", "0"]).is_err());
    }

    #[test]
    fn target_chunk_traces_switches_policy() {
        let config = parse(&[
            "--protocol",
            "file",
            "--jobs",
            "16",
            "--target-chunk-traces",
            "500",
        ])
        .unwrap();
        assert_eq!(
            config.policy,
            PartitionPolicy::TargetChunkSize {
                traces: NonZeroUsize::new(500).unwrap(),
                max_parts: NonZeroUsize::new(16).unwrap(),
            }
        );
    }
}
