use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Build-and-push service for uploaded project tarballs
#[derive(Parser, Debug)]
#[command(
    name = "deployc",
    about = "Build-and-push service for uploaded project tarballs",
    version,
    long_about = "deployc accepts a tar archive of a project over TCP, detects whether it is a \
                  JavaScript, Python or Go project (or uses the Dockerfile it ships), builds a \
                  container image with an external builder and pushes it to a registry. \
                  Progress and the final image reference are streamed back over the same \
                  connection."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value = "human",
        help = "Log output format"
    )]
    pub log_format: LogFormatArg,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - only log errors"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Run the build server",
        long_about = "Listens for connections, each carrying one tar archive, and builds and \
                      pushes an image per connection.\n\n\
                      Examples:\n  \
                      deployc serve\n  \
                      deployc serve --listen 127.0.0.1:9393 --registry localhost:5000"
    )]
    Serve(ServeArgs),

    #[command(
        about = "Detect the project type of a local directory",
        long_about = "Runs the same detection the server applies to uploads and prints the \
                      detected type and its build descriptor.\n\n\
                      Examples:\n  \
                      deployc detect\n  \
                      deployc detect /path/to/project"
    )]
    Detect(DetectArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    #[arg(short = 'l', long, value_name = "ADDR", help = "Address to listen on")]
    pub listen: Option<String>,

    #[arg(short = 'r', long, value_name = "HOST", help = "Registry host for image references")]
    pub registry: Option<String>,

    #[arg(short = 'b', long, value_name = "PATH", help = "Image builder executable")]
    pub builder: Option<PathBuf>,

    #[arg(long, value_name = "DIR", help = "Parent directory for staging directories")]
    pub staging_dir: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct DetectArgs {
    #[arg(value_name = "PATH", help = "Project directory (defaults to current directory)")]
    pub path: Option<PathBuf>,

    #[arg(long, help = "Only print the detected type")]
    pub type_only: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormatArg {
    Human,
    Json,
}
