use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use clique_operator::controller::{self, managed::LABEL_MANAGED_BY_VALUE, ManagementConfig};
use clique_operator::crd::{Clique, Group, ScalingGroup};
use clique_operator::leader::{holder_identity, LeaderElector};
use clique_operator::telemetry::{self, LogFormat};
use kube::api::{Api, ListParams};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the operator
    Run(RunArgs),
    /// Show version and build information
    Version,
    /// Show cluster information
    Info(InfoArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Namespace to watch; every namespace when omitted
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Namespace holding the leader election lease
    #[arg(long, env = "POD_NAMESPACE", default_value = "default")]
    lease_namespace: String,

    /// Maximum number of concurrent reconciles per controller
    #[arg(long, env = "CONCURRENCY", default_value_t = 4)]
    concurrency: u16,

    /// Expected value of the app.kubernetes.io/managed-by label
    #[arg(long, env = "MANAGED_BY", default_value = LABEL_MANAGED_BY_VALUE)]
    managed_by: String,

    /// Address of the health and metrics server
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: SocketAddr,

    /// Act as leader without taking the lease (single replica deployments)
    #[arg(long, env = "DISABLE_LEADER_ELECTION")]
    disable_leader_election: bool,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Namespace to inspect
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "default")]
    namespace: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("Clique Operator v{}", env!("CARGO_PKG_VERSION"));
            println!("Build Date: {}", env!("BUILD_DATE"));
            println!("Git SHA: {}", env!("GIT_SHA"));
            println!("Rust Version: {}", env!("RUST_VERSION"));
            Ok(())
        }
        Commands::Info(info_args) => run_info(info_args).await,
        Commands::Run(run_args) => run_operator(run_args).await,
    }
}

async fn run_info(args: InfoArgs) -> anyhow::Result<()> {
    let client = kube::Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    let params = ListParams::default();
    let groups = Api::<Group>::namespaced(client.clone(), &args.namespace)
        .list(&params)
        .await
        .context("failed to list Groups")?;
    let scaling_groups = Api::<ScalingGroup>::namespaced(client.clone(), &args.namespace)
        .list(&params)
        .await
        .context("failed to list ScalingGroups")?;
    let cliques = Api::<Clique>::namespaced(client, &args.namespace)
        .list(&params)
        .await
        .context("failed to list Cliques")?;

    println!("Namespace: {}", args.namespace);
    println!("Groups: {}", groups.items.len());
    println!("ScalingGroups: {}", scaling_groups.items.len());
    println!("Cliques: {}", cliques.items.len());
    Ok(())
}

async fn run_operator(args: RunArgs) -> anyhow::Result<()> {
    let otel_enabled = telemetry::init(args.log_format)?;
    if otel_enabled {
        info!("OpenTelemetry tracing initialized");
    } else {
        info!(
            "OpenTelemetry tracing disabled ({} not set)",
            telemetry::OTEL_ENDPOINT_ENV
        );
    }

    info!("Starting Clique Operator v{}", env!("CARGO_PKG_VERSION"));

    let client = kube::Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    info!("Connected to Kubernetes cluster");

    let is_leader = Arc::new(AtomicBool::new(args.disable_leader_election));
    if args.disable_leader_election {
        info!("Leader election disabled, acting as leader");
    } else {
        let elector = LeaderElector::new(
            client.clone(),
            &args.lease_namespace,
            holder_identity(),
            Arc::clone(&is_leader),
        );
        tokio::spawn(elector.run());
    }

    let state = Arc::new(controller::ControllerState {
        client,
        config: ManagementConfig::default().with_managed_by(args.managed_by),
        namespace: args.namespace,
        concurrency: args.concurrency,
        is_leader,
    });

    #[cfg(feature = "rest-api")]
    {
        let api_state = Arc::clone(&state);
        let addr = args.metrics_addr;
        tokio::spawn(async move {
            if let Err(e) = clique_operator::rest_api::run_server(api_state, addr).await {
                tracing::error!("REST API server error: {:?}", e);
            }
        });
    }
    #[cfg(not(feature = "rest-api"))]
    info!("REST API disabled, not serving {}", args.metrics_addr);

    let result = controller::run_controllers(state)
        .await
        .context("controller failed");

    // Flush any remaining traces
    telemetry::shutdown();

    result
}
