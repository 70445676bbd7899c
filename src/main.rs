use deployc::cli::commands::{CliArgs, Commands, LogFormatArg};
use deployc::cli::handlers::{handle_detect, handle_serve};
use deployc::util::logging::{init_logging, parse_level, LoggingConfig};
use deployc::VERSION;

use clap::Parser;
use std::env;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("deployc v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Serve(serve_args) => {
            handle_serve(serve_args, args.log_level.as_deref()).await
        }
        Commands::Detect(detect_args) => handle_detect(detect_args),
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let level = if let Some(level_str) = &args.log_level {
        parse_level(level_str)
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        let level_str = env::var("DEPLOYC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        parse_level(&level_str)
    };

    let config = match args.log_format {
        LogFormatArg::Json => LoggingConfig {
            level,
            ..LoggingConfig::production()
        },
        LogFormatArg::Human => LoggingConfig::with_level(level),
    };
    init_logging(config);
}
