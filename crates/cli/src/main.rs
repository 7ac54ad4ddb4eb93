use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use crdready_core::ResourceDefinition;
use crdready_establish::{Establisher, PollConfig};
use crdready_kubehub::{DefinitionStore, KubeDefinitionStore};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "crdreadyctl", version, about = "Wait for CustomResourceDefinitions to become established")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Log at debug level unless CRDREADY_LOG says otherwise
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Block until every named CRD is established (or fails)
    Wait {
        /// CRD names, e.g. "certificates.cert-manager.io"
        #[arg(required = true)]
        names: Vec<String>,
        /// Maximum fetches per CRD (default: 5)
        #[arg(long = "max-attempts", env = "CRDREADY_MAX_ATTEMPTS")]
        max_attempts: Option<u32>,
        /// First backoff interval in milliseconds (default: 100)
        #[arg(long = "interval-ms", env = "CRDREADY_INTERVAL_MS")]
        interval_ms: Option<u64>,
        /// Backoff growth factor (default: 2.0)
        #[arg(long = "factor", env = "CRDREADY_BACKOFF_FACTOR")]
        factor: Option<f64>,
    },
    /// Show the current conditions and finalizers of a CRD
    Status {
        /// CRD name
        name: String,
    },
}

/// Log filter: `CRDREADY_LOG` wins, else `debug` with `--verbose`, else `info`.
/// Logs go to stderr so `-o json` output stays parseable.
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = std::env::var("CRDREADY_LOG")
        .ok()
        .and_then(|v| tracing_subscriber::EnvFilter::from_str(&v).ok())
        .unwrap_or_else(|| tracing_subscriber::EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("CRDREADY_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid CRDREADY_METRICS_ADDR; expected host:port");
        }
    }
}

fn poll_config(max_attempts: Option<u32>, interval_ms: Option<u64>, factor: Option<f64>) -> PollConfig {
    let mut cfg = PollConfig::default();
    if let Some(v) = max_attempts { cfg.max_attempts = v; }
    if let Some(v) = interval_ms { cfg.initial_interval = Duration::from_millis(v); }
    if let Some(v) = factor { cfg.factor = v; }
    cfg
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    init_metrics();

    match cli.command {
        Commands::Wait { names, max_attempts, interval_ms, factor } => {
            let cfg = poll_config(max_attempts, interval_ms, factor);
            info!(count = names.len(), max_attempts = cfg.max_attempts, interval_ms = cfg.initial_interval.as_millis() as u64, factor = cfg.factor, "wait invoked");
            let store = KubeDefinitionStore::try_default().await.context("building kube client")?;

            let token = CancellationToken::new();
            let ctrl_c = tokio::spawn({
                let token = token.clone();
                async move {
                    if signal::ctrl_c().await.is_ok() {
                        info!("Ctrl-C received; cancelling wait");
                        token.cancel();
                    }
                }
            });

            let defs: Vec<ResourceDefinition> = names.iter().map(ResourceDefinition::named).collect();
            let res = Establisher::new(cfg).with_cancellation(token).ensure_established_all(&store, &defs).await;
            ctrl_c.abort();

            match (res, cli.output) {
                (Ok(()), Output::Human) => {
                    for n in &names { println!("{} established", n); }
                }
                (Ok(()), Output::Json) => {
                    println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "established": names, "failures": [] }))?);
                }
                (Err(agg), Output::Human) => {
                    error!(failures = agg.len(), "not all CRDs established");
                    eprintln!("{}", agg);
                    std::process::exit(1);
                }
                (Err(agg), Output::Json) => {
                    #[derive(serde::Serialize)]
                    struct Failure<'a> { name: &'a str, error: String }
                    let failed: Vec<_> = agg.errors().iter().map(|e| Failure { name: e.name(), error: e.to_string() }).collect();
                    let established: Vec<_> = names.iter().filter(|n| !failed.iter().any(|f| f.name == n.as_str())).collect();
                    println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "established": established, "failures": failed }))?);
                    std::process::exit(1);
                }
            }
        }
        Commands::Status { name } => {
            info!(crd = %name, "status invoked");
            let store = KubeDefinitionStore::try_default().await.context("building kube client")?;
            let def = store.get(&name).await.with_context(|| format!("fetching CustomResourceDefinition {}", name))?;
            match cli.output {
                Output::Human => print_status(&def),
                Output::Json => println!("{}", serde_json::to_string_pretty(&def)?),
            }
        }
    }

    Ok(())
}

fn print_status(def: &ResourceDefinition) {
    println!("name: {}", def.name);
    if def.finalizers.is_empty() {
        println!("finalizers: (none)");
    } else {
        println!("finalizers: {}", def.finalizers.join(", "));
    }
    println!("{:<40} {:<8} {:<24} {}", "TYPE", "STATUS", "REASON", "AGE");
    let now = Utc::now();
    for c in &def.status.conditions {
        let age = c.last_transition_time.map(|t| render_age(t, now)).unwrap_or_else(|| "-".to_string());
        println!("{:<40} {:<8} {:<24} {}", c.type_.as_str(), c.status.as_str(), c.reason, age);
    }
}

/// Time since the last transition, kubectl-style (`3d4h`, `2h5m`, `7m`, `12s`).
/// Clock skew that puts `since` in the future renders as `0s`.
fn render_age(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(since).max(chrono::Duration::zero());
    let (days, hours, mins) = (age.num_days(), age.num_hours() % 24, age.num_minutes() % 60);
    if days > 0 {
        format!("{}d{}h", days, hours)
    } else if hours > 0 {
        format!("{}h{}m", hours, mins)
    } else if mins > 0 {
        format!("{}m", mins)
    } else {
        format!("{}s", age.num_seconds())
    }
}
