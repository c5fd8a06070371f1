use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use pool_workflow::adapters::{Operation, SimulatedNetwork};
use pool_workflow::config::PoolWorkflowConfig;
use pool_workflow::workflows::{
    RetryPolicy, StepPhase, StepStatus, WorkflowCommand, WorkflowInputs, WorkflowOrchestrator,
    WorkflowSnapshot, WorkflowStatus,
};
use pool_workflow::{config, init_telemetry};

#[derive(Parser)]
#[command(name = "pool-workflow")]
#[command(about = "Create and fund a liquidity pool through a resumable workflow")]
#[command(long_about = "Drives the pool creation workflow step by step: spawn the pool, \
                       wait for it to resolve and answer, optionally register it with the index, \
                       then fund both sides and confirm settlement. Failed steps can be retried \
                       without losing progress.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the workflow against an in-memory simulated network
    Simulate(SimulateArgs),
    /// Print the effective configuration (defaults, files and environment merged)
    Config,
}

#[derive(Args)]
struct SimulateArgs {
    /// First token of the pair
    #[arg(long)]
    token_a: String,
    /// Second token of the pair
    #[arg(long)]
    token_b: String,
    /// Quantity of the first token to provide
    #[arg(long)]
    amount_a: String,
    /// Quantity of the second token to provide
    #[arg(long)]
    amount_b: String,
    /// Register the pool with the index before funding it
    #[arg(long, requires_all = ["payment_token", "payment_amount"])]
    register: bool,
    /// Token used to pay the registration fee
    #[arg(long)]
    payment_token: Option<String>,
    /// Registration fee quantity
    #[arg(long)]
    payment_amount: Option<String>,
    /// Seed the network with a live pool for the pair
    #[arg(long)]
    existing_pool: bool,
    /// Polls answered "not ready" while the new pool resolves
    #[arg(long)]
    resolve_lag: Option<u32>,
    /// Polls answered "not ready" before the pool answers
    #[arg(long)]
    live_lag: Option<u32>,
    /// Polls answered "not ready" before a transfer settles
    #[arg(long)]
    settle_lag: Option<u32>,
    /// Polls answered "pending" by the registration index
    #[arg(long)]
    registration_lag: Option<u32>,
    /// Inject failures, e.g. transfer-asset-into-pool=2 (repeatable)
    #[arg(long = "fail", value_parser = parse_failure)]
    failures: Vec<(Operation, u32)>,
    /// Override the delay between automatic retries
    #[arg(long)]
    retry_delay_ms: Option<u64>,
    /// How many times to press "retry" when a step fails
    #[arg(long, default_value = "0")]
    auto_retry: u32,
    /// Print the final snapshot as JSON
    #[arg(long)]
    json: bool,
}

fn parse_failure(raw: &str) -> Result<(Operation, u32), String> {
    let (operation, times) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected OPERATION=COUNT, got {raw:?}"))?;
    let times = times
        .parse::<u32>()
        .map_err(|_| format!("invalid failure count {times:?}"))?;
    Ok((operation.parse()?, times))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config()?;
    init_telemetry(&config.observability)?;

    match cli.command {
        Commands::Simulate(args) => {
            tokio::runtime::Runtime::new()?.block_on(async { simulate_command(args, config).await })
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn simulate_command(args: SimulateArgs, config: &PoolWorkflowConfig) -> Result<()> {
    let mut inputs =
        WorkflowInputs::new(&args.token_a, &args.token_b, &args.amount_a, &args.amount_b)?;
    if args.register {
        let token = args.payment_token.as_deref().unwrap_or_default();
        let amount = args.payment_amount.as_deref().unwrap_or_default();
        inputs = inputs.with_registration(token, amount)?;
    }

    let mut profile = config.simulation.clone();
    profile.resolve_lag = args.resolve_lag.unwrap_or(profile.resolve_lag);
    profile.live_lag = args.live_lag.unwrap_or(profile.live_lag);
    profile.settle_lag = args.settle_lag.unwrap_or(profile.settle_lag);
    profile.registration_lag = args.registration_lag.unwrap_or(profile.registration_lag);

    let mut network = SimulatedNetwork::new(profile);
    if args.existing_pool {
        let (seeded, pool_id) = network.with_existing_pool(&args.token_a, &args.token_b);
        info!(pool_id = %pool_id, "Seeded existing pool");
        network = seeded;
    }
    for (operation, times) in &args.failures {
        network.fail_next(*operation, *times);
    }
    let network = Arc::new(network);

    let mut policy = RetryPolicy::from(&config.workflow);
    if let Some(delay) = args.retry_delay_ms {
        policy = policy.with_retry_delay(Duration::from_millis(delay));
    }

    let mut workflow = WorkflowOrchestrator::new(Arc::clone(&network), policy);
    let mut snapshot = workflow.dispatch(WorkflowCommand::Start(inputs)).await;

    let mut retries_left = args.auto_retry;
    while snapshot.phase == Some(StepPhase::Failed) && retries_left > 0 {
        retries_left -= 1;
        if !args.json {
            if let Some(step) = snapshot.active_step {
                println!("🔁 Retrying {}", step.label());
            }
        }
        snapshot = workflow.dispatch(WorkflowCommand::Retry).await;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_progress(&snapshot);
        if let Some(pool_id) = &snapshot.amm_process_id {
            println!(
                "💧 Pool {}: {} {} / {} {}",
                pool_id,
                network.balance(pool_id, &args.token_a),
                args.token_a,
                network.balance(pool_id, &args.token_b),
                args.token_b
            );
        }
    }

    match snapshot.status {
        WorkflowStatus::Completed => Ok(()),
        _ => Err(anyhow!(
            "workflow did not complete: {}",
            snapshot.error.as_deref().unwrap_or("no error recorded")
        )),
    }
}

fn print_progress(snapshot: &WorkflowSnapshot) {
    for step in &snapshot.steps {
        let marker = match step.status {
            StepStatus::Done if !step.enabled => "⏭️",
            StepStatus::Done => "✅",
            StepStatus::Current => "⏳",
            StepStatus::Failed => "❌",
            StepStatus::Pending if !step.enabled => "➖",
            StepStatus::Pending => "⬜",
        };
        let retries = if step.retries > 0 {
            format!(" (retries: {})", step.retries)
        } else {
            String::new()
        };
        match &step.result {
            Some(result) => println!("{marker} {:<32} {}{retries}", step.label, result),
            None => println!("{marker} {:<32}{retries}", step.label),
        }
    }
    println!();

    match snapshot.status {
        WorkflowStatus::Completed => println!("🎯 Workflow completed"),
        WorkflowStatus::Failed => println!(
            "🛑 Workflow failed: {}",
            snapshot.error.as_deref().unwrap_or("unknown error")
        ),
        WorkflowStatus::Running if snapshot.phase == Some(StepPhase::Failed) => println!(
            "⚠️  Step failed, run again with --auto-retry to resume: {}",
            snapshot.error.as_deref().unwrap_or("unknown error")
        ),
        WorkflowStatus::Running | WorkflowStatus::Idle => {
            println!("⏳ Workflow still in progress")
        }
    }
}
