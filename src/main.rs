use std::process;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lbwire::cli::{
    format_desired_state, format_simulation, load_cloud_state, save_cloud_state, simulate,
    validate_deployment, Cli, Commands, CommandResult, SimulateArgs,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Validate(args) => validate_deployment(&args.file).map(|desired| {
            println!("{} is valid\n", args.file.display());
            print!("{}", format_desired_state(&desired));
        }),
        Commands::Simulate(args) => run_simulation(args).await,
    };

    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }
}

async fn run_simulation(args: SimulateArgs) -> CommandResult<()> {
    let desired = validate_deployment(&args.file)?;
    let state = load_cloud_state(args.state.as_deref())?;

    info!(
        load_balancer = %desired.load_balancer.name,
        target_group = %desired.target_group.name,
        "Converging deployment"
    );
    let result = simulate(&desired, state).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", format_simulation(&result));
    }

    if args.save {
        if let Some(path) = &args.state {
            save_cloud_state(path, &result.state)?;
            info!(path = %path.display(), "Saved simulated account");
        }
    }
    Ok(())
}
