//! Sentinel CLI Entry Point
//!
//! This binary provides the command-line interface for the security chat client.

use std::process;

#[tokio::main]
async fn main() {
    if let Err(e) = sentinel_interface::run_cli().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
