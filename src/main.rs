use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use finsim::api::{Endpoint, handle_json, run_http_server};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "finsim", version, about = "Personal finance projection and stress testing")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the JSON HTTP API.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[arg(long, default_value = "0.0.0.0")]
        host: IpAddr,
    },
    /// Retirement projection for a profile.
    Project(InputArgs),
    /// Debt payoff simulation; `--compare` ranks every strategy.
    Debts {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long)]
        compare: bool,
    },
    /// Discrete life-event stress test.
    Stress(InputArgs),
    /// Randomized return trials.
    MonteCarlo(InputArgs),
    /// Solve for a contribution or income that meets a success target.
    Goal(InputArgs),
}

#[derive(Args, Debug)]
struct InputArgs {
    /// JSON request body, same shape as the HTTP API.
    #[arg(long, short)]
    input: PathBuf,
}

fn run_file(endpoint: Endpoint, input: &InputArgs) -> Result<(), String> {
    let body = fs::read_to_string(&input.input)
        .map_err(|e| format!("Failed to read {}: {e}", input.input.display()))?;
    let value = handle_json(endpoint, &body).map_err(|e| e.to_string())?;
    let rendered = serde_json::to_string_pretty(&value).map_err(|e| e.to_string())?;
    println!("{rendered}");
    Ok(())
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!(command = ?cli.command, "starting");

    let result = match cli.command {
        Command::Serve { port, host } => run_http_server(host, port)
            .await
            .map_err(|e| format!("Server error: {e}")),
        Command::Project(input) => run_file(Endpoint::Projection, &input),
        Command::Debts { input, compare } => {
            let endpoint = if compare {
                Endpoint::DebtCompare
            } else {
                Endpoint::DebtSimulate
            };
            run_file(endpoint, &input)
        }
        Command::Stress(input) => run_file(Endpoint::Stress, &input),
        Command::MonteCarlo(input) => run_file(Endpoint::MonteCarlo, &input),
        Command::Goal(input) => run_file(Endpoint::Goal, &input),
    };

    if let Err(e) = result {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
