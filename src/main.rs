use clap::{Parser, Subcommand};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "parenmaren-combined")]
#[command(about = "Paren Maren dice game - combined server and client launcher")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server and multiple CLI clients
    Both {
        /// Number of clients to start
        #[arg(short, long, default_value = "2")]
        clients: u32,
        /// Port for the server
        #[arg(short, long, default_value = "9001")]
        port: u16,
    },
    /// Run only the server
    Server {
        /// Port for the server
        #[arg(short, long, default_value = "9001")]
        port: u16,
    },
    /// Run only a client
    Client,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Both { clients, port } => {
            run_both(clients, port);
        }
        Commands::Server { port } => {
            run_server(port);
        }
        Commands::Client => {
            run_client();
        }
    }
}

fn run_both(clients: u32, port: u16) {
    println!("🚀 Starting Paren Maren - server + {} clients on port {}", clients, port);

    println!("📡 Starting server on port {}...", port);
    let server_handle = thread::spawn(move || {
        run_server(port);
    });

    // Wait a moment for server to start
    thread::sleep(Duration::from_millis(1500));

    let mut client_handles = Vec::new();
    for i in 1..=clients {
        println!("🎲 Starting client {}...", i);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(500 * i as u64)); // Stagger client starts
            run_client();
        });
        client_handles.push(handle);
    }

    println!("✅ All processes started. Press Ctrl+C to stop.");

    for handle in client_handles {
        let _ = handle.join();
    }
    let _ = server_handle.join();
}

fn run_server(port: u16) {
    let status = Command::new("cargo")
        .args(["run", "-p", "parenmaren-server"])
        .env("PORT", port.to_string())
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status();

    match status {
        Ok(exit_status) => {
            if !exit_status.success() {
                eprintln!("❌ Server exited with error: {}", exit_status);
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to start server: {}", e);
            std::process::exit(1);
        }
    }
}

fn run_client() {
    let status = Command::new("cargo")
        .args(["run", "--bin", "cli_client"])
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status();

    match status {
        Ok(exit_status) => {
            if !exit_status.success() {
                eprintln!("❌ Client exited with error: {}", exit_status);
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to start client: {}", e);
            std::process::exit(1);
        }
    }
}
