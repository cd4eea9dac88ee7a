//! rr-proxy e2e runner
//!
//! Starts three mock origins (A, B, C) on consecutive ports, launches the
//! balancer binary pointed at them, and runs every scenario against it.
//!
//!   cargo run                        # spawn ../target/{release,debug}/rr-proxy
//!   cargo run -- --attach            # use a balancer that is already running
//!   cargo run -- -f rotation         # only scenarios whose name matches

mod backend;
mod client;
mod runner;
mod tests;
mod types;

use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::{ExitCode, Stdio};
use std::time::Duration;

use runner::{run_scenarios, TestContext};
use types::ORIGIN_NAMES;

const BALANCER_BINS: &[&str] = &["../target/release/rr-proxy", "../target/debug/rr-proxy"];

#[derive(Parser)]
#[command(name = "e2e", about = "End-to-end scenarios for rr-proxy")]
struct Cli {
    /// Balancer binary (default: release build, then debug build)
    #[arg(long)]
    proxy_bin: Option<PathBuf>,

    /// Balancer config; its upstreams must be the mock origin ports
    #[arg(long, default_value = "test_configs/three_origins.yaml")]
    config: PathBuf,

    /// Port of origin A; B and C take the next two
    #[arg(long, default_value_t = 18081)]
    origin_port: u16,

    /// Port the balancer listens on
    #[arg(long, default_value_t = 18000)]
    proxy_port: u16,

    /// Do not spawn the balancer; expect one on --proxy-port
    #[arg(long)]
    attach: bool,

    /// Only run scenarios whose name contains this string
    #[arg(long, short)]
    filter: Option<String>,

    /// Let the balancer log at info level instead of warn
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let origins = backend::start(cli.origin_port, ORIGIN_NAMES).await?;
    println!(
        "origins {} on 127.0.0.1:{}..{}",
        ORIGIN_NAMES.join(",").bright_cyan(),
        cli.origin_port,
        cli.origin_port + ORIGIN_NAMES.len() as u16 - 1
    );

    // Dropping the child handle kills the balancer.
    let _balancer = if cli.attach {
        None
    } else {
        let bin = match &cli.proxy_bin {
            Some(bin) => bin.clone(),
            None => locate_balancer()?,
        };
        Some(spawn_balancer(&bin, &cli.config, cli.verbose)?)
    };

    let proxy_addr = format!("127.0.0.1:{}", cli.proxy_port);
    wait_for_listener(&proxy_addr).await?;
    println!("balancer on {}\n", proxy_addr.bright_cyan());

    let ctx = TestContext {
        proxy_addr,
        origins,
        http_client: client::build_client(),
    };
    let report = run_scenarios(&tests::all_scenarios(), &ctx, cli.filter.as_deref()).await;
    report.print();

    Ok(if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn locate_balancer() -> anyhow::Result<PathBuf> {
    BALANCER_BINS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "no rr-proxy binary at {}; run `cargo build` in the parent directory",
                BALANCER_BINS.join(" or ")
            )
        })
}

fn spawn_balancer(bin: &Path, config: &Path, verbose: bool) -> anyhow::Result<tokio::process::Child> {
    println!("spawning {} run --config {}", bin.display(), config.display());
    tokio::process::Command::new(bin)
        .args(["--log-level", if verbose { "info" } else { "warn" }])
        .arg("run")
        .arg("--config")
        .arg(config)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| anyhow::anyhow!("cannot spawn {}: {}", bin.display(), e))
}

/// Poll with a bare TCP connect; an HTTP request would advance the rotation.
async fn wait_for_listener(addr: &str) -> anyhow::Result<()> {
    let mut delay = Duration::from_millis(50);
    for _ in 0..20 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return Ok(());
        }
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(Duration::from_secs(1));
    }
    anyhow::bail!("nothing is listening on {addr}")
}
