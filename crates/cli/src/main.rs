use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use goop_controller::{ControllerConfig, Error as ReconcileError, Reconciler, Requeue};
use goop_core::{Goop, ObjectKey};
use goop_kubehub::KubeStore;
use goop_store::ResourceStore;
use k8s_openapi::api::apps::v1::DaemonSet;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Api, Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "goopctl", version, about = "Goop operator")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Serve Prometheus metrics on host:port
    #[arg(long = "metrics-addr", env = "GOOP_METRICS_ADDR", global = true)]
    metrics_addr: Option<String>,

    /// Image of the keep-alive container in job pods
    #[arg(long = "pause-image", env = "GOOP_PAUSE_IMAGE", global = true)]
    pause_image: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller until interrupted
    Run {
        /// Watch a single namespace (default: all namespaces)
        #[arg(long = "ns")]
        namespace: Option<String>,
        /// Job image used when a Goop does not name one
        #[arg(long = "image", env = "GOOP_IMAGE")]
        image: Option<String>,
        /// Requeue delay after a failed pass, in seconds
        #[arg(long = "error-requeue-secs", default_value_t = 15)]
        error_requeue_secs: u64,
    },
    /// Print the Goop CustomResourceDefinition as YAML
    Crd,
    /// Run a single reconcile pass for NAMESPACE/NAME and print the requeue decision
    Reconcile {
        key: String,
        #[arg(long = "image", env = "GOOP_IMAGE")]
        image: Option<String>,
    },
    /// Print the condition ledger of NAMESPACE/NAME
    Status { key: String },
}

fn init_tracing() {
    let env = std::env::var("GOOP_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics(addr: Option<&str>) {
    if let Some(addr) = addr {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid metrics address; expected host:port");
        }
    }
}

fn controller_config(image: Option<String>) -> ControllerConfig {
    let mut cfg = ControllerConfig::from_env();
    if image.is_some() {
        cfg.image = image;
    }
    cfg
}

fn kube_store(client: Client, pause_image: Option<&str>) -> KubeStore {
    let store = KubeStore::new(client);
    match pause_image {
        Some(image) => store.with_pause_image(image),
        None => store,
    }
}

fn to_action(rq: Requeue) -> Action {
    match rq {
        Requeue::None => Action::await_change(),
        Requeue::Immediate => Action::requeue(Duration::ZERO),
        Requeue::After(d) => Action::requeue(d),
    }
}

fn requeue_label(rq: Requeue) -> String {
    match rq {
        Requeue::None => "done".to_string(),
        Requeue::Immediate => "requeue".to_string(),
        Requeue::After(d) => format!("requeue after {}s", d.as_secs()),
    }
}

struct Ctx {
    reconciler: Reconciler,
    shutdown: CancellationToken,
    error_requeue: Duration,
}

async fn reconcile(goop: Arc<Goop>, ctx: Arc<Ctx>) -> Result<Action, ReconcileError> {
    let key = goop.key()?;
    let rq = ctx.reconciler.reconcile(&key, ctx.shutdown.child_token()).await?;
    Ok(to_action(rq))
}

fn error_policy(goop: Arc<Goop>, err: &ReconcileError, ctx: Arc<Ctx>) -> Action {
    match err {
        ReconcileError::Cancelled => Action::await_change(),
        e if e.is_conflict() => {
            info!(name = %goop.name_any(), "conflict; retrying with a fresh read");
            Action::requeue(Duration::ZERO)
        }
        e => {
            warn!(name = %goop.name_any(), kind = e.kind(), error = %e, "reconcile failed");
            Action::requeue(ctx.error_requeue)
        }
    }
}

async fn run(namespace: Option<String>, image: Option<String>, pause_image: Option<&str>, error_requeue: Duration) -> Result<()> {
    let client = goop_kubehub::client().await?;
    let (goops, daemonsets): (Api<Goop>, Api<DaemonSet>) = match namespace.as_deref() {
        Some(ns) => (Api::namespaced(client.clone(), ns), Api::namespaced(client.clone(), ns)),
        None => (Api::all(client.clone()), Api::all(client.clone())),
    };
    let store: Arc<dyn ResourceStore> = Arc::new(kube_store(client, pause_image));
    let config = controller_config(image);
    info!(finalizer = %config.finalizer, poll = ?config.poll_interval, image = ?config.image, "starting goop controller");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received; cancelling in-flight passes");
            }
            shutdown.cancel();
        }
    });

    let ctx = Arc::new(Ctx { reconciler: Reconciler::new(store, config), shutdown, error_requeue });
    Controller::new(goops, watcher::Config::default())
        .owns(daemonsets, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => tracing::debug!(key = %obj, "reconciled"),
                Err(e) => warn!(error = %e, "controller error"),
            }
        })
        .await;
    info!("controller stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    init_metrics(cli.metrics_addr.as_deref());

    match cli.command {
        Commands::Run { namespace, image, error_requeue_secs } => {
            run(namespace, image, cli.pause_image.as_deref(), Duration::from_secs(error_requeue_secs)).await?;
        }
        Commands::Crd => {
            print!("{}", goop_kubehub::crd_yaml()?);
        }
        Commands::Reconcile { key, image } => {
            let key = ObjectKey::from_str(&key).context("expected NAMESPACE/NAME")?;
            let store = kube_store(goop_kubehub::client().await?, cli.pause_image.as_deref());
            let reconciler = Reconciler::new(Arc::new(store), controller_config(image));
            match reconciler.reconcile(&key, CancellationToken::new()).await {
                Ok(rq) => match cli.output {
                    Output::Human => println!("{}: {}", key, requeue_label(rq)),
                    Output::Json => {
                        let after = match rq {
                            Requeue::After(d) => Some(d.as_secs()),
                            _ => None,
                        };
                        let out = serde_json::json!({ "key": key.to_string(), "outcome": requeue_label(rq), "afterSecs": after });
                        println!("{}", serde_json::to_string_pretty(&out)?);
                    }
                },
                Err(e) => {
                    error!(error = %e, kind = e.kind(), "reconcile pass failed");
                    return Err(e.into());
                }
            }
        }
        Commands::Status { key } => {
            let key = ObjectKey::from_str(&key).context("expected NAMESPACE/NAME")?;
            let store = kube_store(goop_kubehub::client().await?, None);
            let goop = store.get(&key).await.with_context(|| format!("fetching goop {key}"))?;
            match cli.output {
                Output::Human => {
                    println!("TYPE         STATUS   REASON        LAST TRANSITION        MESSAGE");
                    for c in goop.ledger().iter() {
                        println!(
                            "{:<12} {:<8} {:<13} {:<22} {}",
                            c.type_.as_str(),
                            c.status.as_str(),
                            c.reason.as_str(),
                            c.last_transition_time.as_deref().unwrap_or("-"),
                            c.message
                        );
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(goop.ledger())?),
            }
        }
    }

    Ok(())
}
