//! Subcommand handlers; each returns the process exit code

use super::commands::{DetectArgs, ServeArgs};
use crate::config::DeploycConfig;
use crate::detection::detect;
use crate::fs::RealFileSystem;
use crate::server::Server;
use std::env;
use tracing::{debug, error, info};

/// Environment configuration with command-line flags applied on top
pub fn serve_config(args: &ServeArgs, log_level: Option<&str>) -> DeploycConfig {
    let default_config = DeploycConfig::default();
    DeploycConfig {
        listen_addr: args.listen.clone().unwrap_or(default_config.listen_addr),
        registry: args.registry.clone().unwrap_or(default_config.registry),
        builder: args.builder.clone().unwrap_or(default_config.builder),
        staging_dir: args
            .staging_dir
            .clone()
            .unwrap_or(default_config.staging_dir),
        log_level: log_level
            .map(str::to_lowercase)
            .unwrap_or(default_config.log_level),
    }
}

pub async fn handle_serve(args: &ServeArgs, log_level: Option<&str>) -> i32 {
    let config = serve_config(args, log_level);
    debug!("Configuration: {:?}", config);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        eprintln!("\nPlease check your environment variables and command-line arguments.");
        return 1;
    }

    let server = match Server::bind(&config).await {
        Ok(server) => server,
        Err(e) => {
            error!("{:#}", e);
            return 1;
        }
    };

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("Server stopped");
    0
}

pub fn handle_detect(args: &DetectArgs) -> i32 {
    let path = match args.path.clone().map(Ok).unwrap_or_else(env::current_dir) {
        Ok(path) => path,
        Err(e) => {
            error!("Failed to get current directory: {}", e);
            return 1;
        }
    };

    if !path.is_dir() {
        error!("Not a directory: {}", path.display());
        return 1;
    }

    match detect(&RealFileSystem::new(), &path) {
        Ok(detection) => {
            println!("{}", detection.project_type);
            if !args.type_only {
                println!();
                println!("{}", detection.descriptor);
            }
            0
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            1
        }
    }
}
