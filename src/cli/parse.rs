//! CLI parse: clap types for Vigil. No behavior; definitions only.

use clap::{Args, Parser, Subcommand};

/// Vigil CLI - Service liveness registry operations
#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Service liveness registry backed by a replicated key-value store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,
}

/// Identity arguments shared by commands addressing one service
#[derive(Args)]
pub struct IdentityArgs {
    /// Service uuid
    #[arg(long, conflicts_with_all = ["service_type", "host"])]
    pub uuid: Option<String>,

    /// Service type (paired with --host)
    #[arg(long, requires = "host")]
    pub service_type: Option<String>,

    /// Host the service runs on (paired with --service-type)
    #[arg(long, requires = "service_type")]
    pub host: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a service or overwrite its record
    Update {
        /// Service uuid (omit to mint a new one)
        #[arg(long)]
        uuid: Option<String>,
        /// Service type, e.g. nova-compute
        #[arg(long)]
        service_type: String,
        /// Host the service runs on
        #[arg(long)]
        host: String,
        /// Region the service belongs to
        #[arg(long)]
        region: String,
        /// Register as DOWN instead of UP
        #[arg(long)]
        down: bool,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Mark a service DOWN, optionally recording a maintenance note
    Down {
        #[command(flatten)]
        identity: IdentityArgs,
        /// Note recorded with the status change
        #[arg(long)]
        note: Option<String>,
        /// Maintenance start as a unix timestamp (defaults to now)
        #[arg(long, requires = "note")]
        start: Option<i64>,
        /// Maintenance end as a unix timestamp
        #[arg(long, requires = "note")]
        end: Option<i64>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Remove a service and its index entries
    Delete {
        #[command(flatten)]
        identity: IdentityArgs,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show one service record
    Get {
        #[command(flatten)]
        identity: IdentityArgs,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List services by region, status, or service type
    List {
        /// Filter by region
        #[arg(long, conflicts_with_all = ["status", "service_type"])]
        region: Option<String>,
        /// Filter by status (UP or DOWN)
        #[arg(long, conflicts_with_all = ["region", "service_type"])]
        status: Option<String>,
        /// Filter by service type
        #[arg(long, conflicts_with_all = ["region", "status"])]
        service_type: Option<String>,
        /// Narrow a type listing to hosts starting with this prefix
        #[arg(long, requires = "service_type")]
        host_prefix: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Check whether a service is UP right now
    Status {
        #[command(flatten)]
        identity: IdentityArgs,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Re-bind a service's UP marker to a fresh lease
    Heartbeat {
        #[command(flatten)]
        identity: IdentityArgs,
        /// Keep the lease refreshed until interrupted
        #[arg(long)]
        follow: bool,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Stream changes to a service record until interrupted
    Watch {
        #[command(flatten)]
        identity: IdentityArgs,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}
