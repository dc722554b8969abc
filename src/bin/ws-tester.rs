//! Relay Tester CLI Tool
//!
//! Command-line tool for exercising the matchmaking relay end to end,
//! in-process, with the real matching loop and a mock responder.
//!
//! Usage:
//!   cargo run --bin ws-tester -- --help
//!   cargo run --bin ws-tester run-scenario --scenario human-pair
//!   cargo run --bin ws-tester run-all-scenarios
//!   cargo run --bin ws-tester parse-frame --frame "REQUEST_MATCH|GUESSER"

use anyhow::Result;
use clap::{Parser, Subcommand};
use mimic_room::protocol::ClientCommand;

#[path = "../../tests/ws_tester.rs"]
mod ws_tester;

use ws_tester::TestScenarios;

#[derive(Parser)]
#[command(name = "ws-tester")]
#[command(about = "End-to-end relay testing tool for mimic-room matchmaking")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a predefined test scenario
    RunScenario {
        /// Scenario name (human-pair, substitution, timeout, queued-disconnect)
        #[arg(short, long)]
        scenario: String,
    },
    /// Run all test scenarios
    RunAllScenarios,
    /// Parse a frame the way the service would and print the result
    ParseFrame {
        /// Raw frame text
        #[arg(short, long)]
        frame: String,
    },
}

async fn run_scenario(name: &str) -> Result<bool> {
    match name {
        "human-pair" => TestScenarios::human_pair().await,
        "substitution" => TestScenarios::forced_substitution().await,
        "timeout" => TestScenarios::peer_wait_timeout().await,
        "queued-disconnect" => TestScenarios::queued_disconnect().await,
        _ => {
            eprintln!(
                "❌ Unknown scenario '{}'. Available: human-pair, substitution, timeout, queued-disconnect",
                name
            );
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::RunScenario { scenario } => {
            println!("🧪 Running scenario: {}", scenario);
            match run_scenario(&scenario).await {
                Ok(true) => println!("✅ Scenario completed successfully!"),
                Ok(false) => {
                    println!("❌ Scenario failed.");
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("❌ Error running scenario: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::RunAllScenarios => {
            let scenarios = [
                "human-pair",
                "substitution",
                "timeout",
                "queued-disconnect",
            ];

            let mut passed = 0;
            let mut failed = 0;

            println!("🧪 Running all test scenarios...\n");

            for name in scenarios {
                print!("Running '{}' scenario... ", name);
                match run_scenario(name).await {
                    Ok(true) => {
                        println!("✅ PASSED");
                        passed += 1;
                    }
                    Ok(false) => {
                        println!("❌ FAILED");
                        failed += 1;
                    }
                    Err(e) => {
                        println!("❌ FAILED ({})", e);
                        failed += 1;
                    }
                }
            }

            println!("\n📊 Results: {} passed, {} failed", passed, failed);
            if failed > 0 {
                std::process::exit(1);
            }
        }

        Commands::ParseFrame { frame } => match ClientCommand::parse(&frame) {
            Some(command) => println!("✅ Parsed: {:?}", command),
            None => println!("💡 Unrecognized frame - would relay if in a room, drop otherwise"),
        },
    }

    Ok(())
}
