use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio::{io::AsyncReadExt, signal};
use vds_fence::{
    ConnectionResolver, FenceQuery, Scheduler,
    config::{FenceConfig, ServiceArgs},
    request::FenceRequestBody,
    scheduler::client,
    telemetry::init_telemetry,
};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Runs one fence extraction against a live worker pool.
#[derive(Parser, Debug)]
#[command(
    name = "vds-fence",
    version,
    about = "Fan a fence request out to VDS workers and write the stitched traces"
)]
struct CliArgs {
    #[command(flatten)]
    service: ServiceArgs,

    /// JSON fence request. Read from stdin when omitted.
    #[arg(long)]
    query: Option<PathBuf>,

    /// Where to write the raw little-endian `f32` samples.
    #[arg(long, short)]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = FenceConfig::try_from(args.service)?;

    let providers = init_telemetry()?;
    log_startup_info(&config);

    let res = run(&config, args.query, &args.output).await;
    providers.shutdown();
    res
}

async fn run(
    config: &FenceConfig,
    query: Option<PathBuf>,
    output: &Path,
) -> anyhow::Result<()> {
    let body = read_body(query).await?;
    let body = FenceRequestBody::from_json(&body)?;

    let resolver = ConnectionResolver::new(config.allowlist.clone());
    let connection = resolver.resolve(config.protocol, &config.storage_root, &body.vds, &body.sas)?;

    let client = client::connect(config)
        .await
        .with_context(|| format!("failed to connect to workers at {}", config.worker_addr))?;
    let scheduler = Scheduler::from_config(client, config);

    let query = FenceQuery::new(
        &connection,
        body.coordinate_system()?,
        &body.coordinates,
        body.shape(),
    )
    .with_interpolation(body.interpolation()?);

    let data = tokio::select! {
        res = scheduler.fence(&query) => res?,
        () = shutdown_signal() => anyhow::bail!("interrupted before the fence completed"),
    };

    tokio::fs::write(output, &data)
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;

    #[cfg(feature = "tracing")]
    tracing::info!(
        bytes = data.len(),
        traces = body.coordinates.len(),
        output = %output.display(),
        "fence written"
    );
    Ok(())
}

async fn read_body(path: Option<PathBuf>) -> anyhow::Result<Vec<u8>> {
    match path {
        Some(path) => tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin().read_to_end(&mut buf).await?;
            Ok(buf)
        }
    }
}

fn log_startup_info(_config: &FenceConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!("Starting fence scheduler with full config: {:#?}", _config);
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting fence scheduler against {} with {:?}",
            _config.worker_addr,
            _config.policy
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }
}
