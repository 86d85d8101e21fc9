mod client;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::DaemonClient;
use shared::ipc::{Command, ManualCommand, Response};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fusion")]
#[command(about = "Control tool for the fusiond multimodal command daemon")]
struct Cli {
    /// Control socket of a running fusiond
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Status,
    /// Stop dispatching recognized commands
    Pause,
    Resume,
    /// Inject a command as if it had been spoken
    Send {
        label: String,
        #[arg(long, default_value_t = 1.0)]
        confidence: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = DaemonClient::new(cli.socket);

    let command = match cli.command {
        Commands::Status => Command::Status,
        Commands::Pause => Command::Pause,
        Commands::Resume => Command::Resume,
        Commands::Send { label, confidence } => Command::Send(ManualCommand { label, confidence }),
    };

    match client.send_command(command).await {
        Ok(Response::Ok) => {
            println!("Success");
        }
        Ok(Response::Status(info)) => {
            println!("Status:");
            println!("  Running: {}", info.is_running);
            println!("  Paused: {}", info.is_paused);
            println!("  Hub: {}", info.hub);
            println!("  Tracking: {}", info.tracking);
            println!(
                "  Gesture: {}",
                info.active_gesture.as_deref().unwrap_or("none")
            );
            println!("  Round: {}", info.round_number);
            println!("  Bomb planted: {}", info.bomb_planted);
            println!("  Money: {}", info.money);
        }
        Ok(Response::Error(msg)) => {
            eprintln!("Error: {}", msg);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed to reach fusiond: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
