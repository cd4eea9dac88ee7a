//! rr-proxy: round-robin HTTP load balancer
//!
//! Accepts requests on one port and forwards each to the next live origin
//! of a fixed pool.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rr_proxy::{
    balancer::build_balancer,
    config::{AllDownPolicy, AppConfig},
    run_server,
    upstream::build_pool,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Parser)]
#[command(name = "rr-proxy")]
#[command(version = "0.1.0")]
#[command(about = "Round-robin HTTP load balancer")]
#[command(long_about = "
rr-proxy forwards every inbound HTTP request to one origin of a fixed pool,
rotating through the pool in order and skipping origins that are not live.

Without a config file it listens on port 8000 and balances across
https://www.bing.com, https://www.facebook.com and https://www.google.com.

Example usage:
  rr-proxy run --config config.yaml
  rr-proxy run --port 9000 --upstream http://127.0.0.1:9001 --upstream http://127.0.0.1:9002
  rr-proxy check-config
")]
struct Cli {
    /// Path to config file (default: config.yaml if present, else built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Set logging level (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the load balancer (default)
    Run {
        /// Override listen port
        #[arg(short, long)]
        port: Option<u16>,
        /// Replace the configured pool; repeat for each origin, in rotation order
        #[arg(long = "upstream", value_name = "URL")]
        upstreams: Vec<String>,
    },

    /// Validate configuration and print the effective settings
    CheckConfig,

    /// Send one GET to each configured origin and report the result
    TestUpstreams,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_tracing(cli.log_level, cli.log_json);

    let command = cli.command.unwrap_or(Commands::Run {
        port: None,
        upstreams: Vec::new(),
    });

    match command {
        Commands::Run { port, upstreams } => {
            run_proxy(cli.config.as_deref(), port, upstreams).await?;
        }
        Commands::CheckConfig => {
            check_config(cli.config.as_deref());
        }
        Commands::TestUpstreams => {
            test_upstreams(cli.config.as_deref()).await?;
        }
    }

    Ok(())
}

fn init_tracing(log_level: Option<LogLevel>, json: bool) {
    let level_filter = if let Some(level) = log_level {
        level.to_string()
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
            .to_string()
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&level_filter));

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Run the load balancer
async fn run_proxy(
    config_path: Option<&Path>,
    port_override: Option<u16>,
    upstreams_override: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config_or_exit(config_path);

    if let Some(port) = port_override {
        config.server.port = port;
    }
    if !upstreams_override.is_empty() {
        config.upstreams = upstreams_override;
    }

    if let Err(e) = config.validate() {
        exit_with_error(e);
    }

    let pool = build_pool(&config).unwrap_or_else(|e| exit_with_error(e));
    let balancer = build_balancer(pool, config.selection.when_all_down)
        .unwrap_or_else(|e| exit_with_error(e));

    if config.selection.when_all_down == AllDownPolicy::Spin {
        tracing::warn!(
            "selection.when_all_down = spin: requests hang while every upstream is down"
        );
    }

    run_server(config, balancer).await
}

/// Validate configuration file
fn check_config(config_path: Option<&Path>) {
    let config = load_config_or_exit(config_path);

    match config.validate() {
        Ok(()) => {
            println!("✓ Configuration is valid\n");
            println!("Server:");
            println!("  Listen: {}", config.server.listen_addr());
            println!("\nUpstreams (rotation order):");
            for (idx, address) in config.upstreams.iter().enumerate() {
                println!("  [{}] {}", idx, address);
            }
            println!("\nUpstream client:");
            match config.upstream.timeout_seconds {
                Some(secs) => println!("  Timeout: {}s", secs),
                None => println!("  Timeout: none"),
            }
            println!("\nSelection:");
            println!("  Strategy: round_robin");
            println!("  When all down: {:?}", config.selection.when_all_down);
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Probe each configured origin once
async fn test_upstreams(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config_or_exit(config_path);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .redirect(reqwest::redirect::Policy::none())
        .build()?;

    let mut unreachable = 0;
    for address in &config.upstreams {
        println!("Testing connection to upstream: {}", address);
        match client.get(address).send().await {
            Ok(resp) => {
                println!("✓ Upstream is reachable");
                println!("  Status: {}", resp.status());
            }
            Err(e) => {
                println!("✗ Failed to connect to upstream: {}", e);
                unreachable += 1;
            }
        }
    }

    if unreachable > 0 {
        std::process::exit(1);
    }

    Ok(())
}

/// Load configuration or exit with error
fn load_config_or_exit(config_path: Option<&Path>) -> AppConfig {
    match AppConfig::load_or_default(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    }
}

/// Print a fatal startup error and exit with status 1
fn exit_with_error(err: impl std::fmt::Display) -> ! {
    eprintln!("error: {}", err);
    std::process::exit(1);
}
