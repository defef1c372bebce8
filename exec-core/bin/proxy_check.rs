use anyhow::{Context, Result};
use clap::Parser;
use exec_core::{setup_logger, ExecConfig, HttpProber, ProxyPool};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Probe every proxy in a credential file", long_about = None)]
struct Args {
    /// Optional TOML config for probe URLs and timeouts
    #[arg(short, long)]
    config: Option<String>,

    /// Proxy file, overrides `proxy_file` from the config
    #[arg(short, long)]
    proxies: Option<String>,

    /// Probes per batch
    #[arg(short = 'n', long)]
    concurrency: Option<usize>,

    /// Print every working proxy
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logger("info")?;

    let config = match &args.config {
        Some(path) => ExecConfig::load(path).with_context(|| format!("Failed to load {}", path))?,
        None => ExecConfig::default(),
    };
    let proxy_file = args.proxies.unwrap_or_else(|| config.proxy_file.clone());
    let concurrency = args.concurrency.unwrap_or(config.proxy.probe_concurrency);

    let prober = Arc::new(HttpProber::from_policy(&config.proxy));
    let pool = ProxyPool::load_from_source(&proxy_file, prober, config.proxy.clone())?;
    if pool.is_empty() {
        warn!("No proxies loaded from {}", proxy_file);
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let report = pool.probe_all(concurrency, &cancel).await?;

    if args.verbose {
        for proxy in &report.working {
            info!("SUCCESS {}", proxy);
        }
    }
    for proxy in &report.broken {
        info!("FAILED {}", proxy);
    }
    println!("{}", report.summary);

    Ok(())
}
