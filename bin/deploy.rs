//! Deploy or attach to the Frax protocol and wire it.
//!
//! Usage:
//!   cargo run --bin deploy -- run --environment local --simulate
//!   cargo run --bin deploy -- plan --environment testnet --override WETH=fresh
//!   cargo run --bin deploy -- show --environment production
//!
//! Reads `.env` when present. Live runs need `DEPLOY_LEDGER_URL` and one
//! `DEPLOY_ACTOR_*` address per actor role.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use frax_deploy_orchestrator::graph;
use frax_deploy_orchestrator::{
    Actors, AddressRegistry, DeployConfig, DeployError, LocalChain, ModePolicy, Orchestrator,
    RpcLedger, RunReport, StepStatus,
};
use frax_deploy_protocol::topology::{self, Provision, Topology};
use frax_deploy_protocol::{Environment, Ledger, ResolutionMode};

#[derive(Parser, Debug)]
#[command(name = "deploy", about = "Frax protocol deployment orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve every component, apply the wiring and persist the manifest
    Run {
        #[command(flatten)]
        target: TargetArgs,

        /// Run against an in-memory chain instead of the ledger gateway
        #[arg(long, default_value_t = false)]
        simulate: bool,
    },
    /// Print resolution and wiring order without touching the ledger
    Plan {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Print the stored manifest for an environment
    Show {
        #[command(flatten)]
        target: TargetArgs,
    },
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// local, testnet or production (defaults to DEPLOY_ENVIRONMENT)
    #[arg(long, short = 'e')]
    environment: Option<String>,

    /// Address registry file (defaults to DEPLOY_REGISTRY_PATH)
    #[arg(long)]
    registry: Option<PathBuf>,

    /// fresh or attach (defaults to the environment's mode)
    #[arg(long)]
    mode: Option<String>,

    /// Per-component mode, e.g. `--override WETH=attach` (repeatable)
    #[arg(long = "override", value_name = "COMPONENT=MODE")]
    overrides: Vec<String>,
}

/// Configuration with command line flags applied on top.
struct Target {
    config: DeployConfig,
    environment: Environment,
}

impl Target {
    fn resolve(args: &TargetArgs) -> Result<Self, DeployError> {
        let mut config = DeployConfig::from_env()?;
        if let Some(name) = &args.environment {
            config.environment = Some(name.parse()?);
        }
        if let Some(mode) = &args.mode {
            config.mode = Some(mode.parse()?);
        }
        for entry in &args.overrides {
            config.mode_overrides.extend(ModePolicy::parse_overrides(entry)?);
        }
        if let Some(path) = &args.registry {
            config.registry_path = path.clone();
        }
        let environment = config.environment.ok_or_else(|| {
            DeployError::Config("no environment selected (--environment or DEPLOY_ENVIRONMENT)".to_string())
        })?;
        Ok(Self { config, environment })
    }

    fn modes(&self) -> ModePolicy {
        self.config.mode_policy(self.environment)
    }

    fn topology(&self) -> Topology {
        topology::frax(&self.config.protocol_plan())
    }

    fn registry(&self) -> AddressRegistry {
        AddressRegistry::new(&self.config.registry_path)
    }
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    match dispatch(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            let status = err
                .downcast_ref::<DeployError>()
                .map(DeployError::exit_status)
                .unwrap_or(1);
            ExitCode::from(status)
        }
    }
}

fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Run { target, simulate } => run(&Target::resolve(&target)?, simulate),
        Command::Plan { target } => plan(&Target::resolve(&target)?),
        Command::Show { target } => show(&Target::resolve(&target)?),
    }
}

fn run(target: &Target, simulate: bool) -> Result<()> {
    let topology = target.topology();
    let registry = target.registry();

    let report = if simulate {
        let mut chain = LocalChain::new();
        let actors = chain.actors();
        orchestrate(&mut chain, &registry, &topology, &actors, target)?
    } else {
        let actors = Actors::from_env()?;
        let mut ledger = RpcLedger::from_config(&target.config)?;
        orchestrate(&mut ledger, &registry, &topology, &actors, target)?
    };

    println!("=== {} deployment ===", report.environment);
    println!();
    for component in report.resolved.iter() {
        println!("{:<32} {} ({})", component.name, component.address, component.origin);
    }
    println!();
    for outcome in &report.wiring {
        match &outcome.status {
            StepStatus::Applied { tx_hash, block } => {
                println!("{:<32} applied in block {} ({})", outcome.step, block, tx_hash)
            }
            StepStatus::AlreadyApplied => println!("{:<32} already applied", outcome.step),
        }
    }
    println!();
    println!(
        "{} wiring transactions submitted, manifest at {}",
        report.applied_count(),
        registry.path().display()
    );
    Ok(())
}

fn orchestrate<L: Ledger>(
    ledger: &mut L,
    registry: &AddressRegistry,
    topology: &Topology,
    actors: &Actors,
    target: &Target,
) -> Result<RunReport, DeployError> {
    Orchestrator::new(
        ledger,
        registry,
        topology,
        actors,
        target.environment,
        target.modes(),
    )
    .run()
}

fn plan(target: &Target) -> Result<()> {
    let topology = target.topology();
    let modes = target.modes();
    let order = graph::resolution_order(&topology).map_err(DeployError::from)?;
    let wiring = graph::wiring_order(&topology).map_err(DeployError::from)?;

    println!("=== {} resolution order ===", target.environment);
    for (position, descriptor) in order.iter().enumerate() {
        let how = match (&descriptor.provision, modes.mode_for(&descriptor.name)) {
            (Provision::Pair { .. }, ResolutionMode::Fresh) => "discover or create".to_string(),
            (Provision::Pair { .. }, ResolutionMode::Attach) => "discover".to_string(),
            (Provision::Deploy { artifact, .. }, ResolutionMode::Fresh) => format!("deploy {}", artifact),
            (Provision::Deploy { .. }, ResolutionMode::Attach) => format!("attach {}", descriptor.slot),
        };
        println!("{:>3}. {:<32} {}", position + 1, descriptor.name, how);
    }
    println!();
    println!("=== wiring order ===");
    for (position, step) in wiring.iter().enumerate() {
        println!(
            "{:>3}. {:<32} {} -> {}.{} as {}",
            position + 1,
            step.id,
            step.phase.as_str(),
            step.target,
            step.method,
            step.actor
        );
    }
    Ok(())
}

fn show(target: &Target) -> Result<()> {
    let registry = target.registry();
    let manifest = registry
        .load(target.environment)
        .map_err(DeployError::from)?;
    let rendered = serde_json::to_string_pretty(&manifest.to_json())
        .with_context(|| format!("render manifest for {}", target.environment))?;
    println!("{}", rendered);
    Ok(())
}
