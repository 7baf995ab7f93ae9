use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mediacast")]
#[command(author, version, about = "Per-device settings and URL filter engine for media streaming")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load all profiles and filters, watch the device directory until Ctrl-C
    Serve,

    /// Resolve a setting for a device
    Resolve {
        /// Stable device id (e.g. uuid:...) or network address
        id: String,

        /// Setting key
        key: String,

        /// Renderer model to bind as the middle layer
        #[arg(long)]
        model: Option<String>,
    },

    /// Show how the web filters treat a URL
    Filter {
        /// URL to classify
        url: String,
    },

    /// Validate configuration, device files, and rule file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Create a device file for an id in the device directory
    NewDevice {
        /// Stable device id or network address
        id: String,

        /// Display name, also used for the file name
        #[arg(long, default_value = "device")]
        name: String,
    },

    /// Display version information
    Version,
}
