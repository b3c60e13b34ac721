mod config;
mod server;

use config::DaemonConfig;
use log::{error, info};
use server::Server;
use termtrack_core::Registry;

#[tokio::main]
async fn main() {
    env_logger::init();

    info!("Launching termtrackd...");

    let config = match DaemonConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let registry = match Registry::new(config.tracker) {
        Ok(reg) => reg,
        Err(e) => {
            error!("Failed to create registry: {}", e);
            std::process::exit(1);
        }
    };

    let server = match Server::bind(&config, registry.clone()).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to bind {}: {}", config.control_socket(), e);
            std::process::exit(1);
        }
    };

    tokio::select! {
        _ = server.run() => {}
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!("Signal handler failed: {}", e);
            }
        }
    }

    let dropped = registry.clear_all();
    info!("Shutting down, dropped {} terminals", dropped);
}
