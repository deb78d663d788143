use std::sync::Arc;

use clap::Parser;
use cookiejwt::cli::{Args, build_policy, init_logging, load_keys};
use cookiejwt::run_server;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some((private_key, public_key)) = load_keys(&args) else {
        std::process::exit(1);
    };

    let policy = match build_policy(&args, private_key, public_key) {
        Ok(policy) => Arc::new(policy),
        Err(e) => {
            error!(error = %e, "Invalid authentication configuration");
            std::process::exit(1);
        }
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, cookie = args.cookie, "Listening"),
        Err(e) => error!(error = %e, "Failed to read local address"),
    }

    if let Err(e) = run_server(policy, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
