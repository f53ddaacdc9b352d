use clap::Parser;
use std::{net::SocketAddr, path::PathBuf};

// --- Configuration ---
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// The network address to bind to
    #[arg(
        short,
        long,
        value_name = "ADDR",
        default_value = "0.0.0.0:8080",
        env = "DISK_EXPLORER_BIND"
    )]
    pub bind_addr: SocketAddr,

    /// SQLite database holding the shared folder list
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "./disk-explorer.db",
        env = "DISK_EXPLORER_DB"
    )]
    pub database: PathBuf,

    /// Directory served under /static
    #[arg(
        short,
        long,
        value_name = "DIR",
        default_value = "./static",
        env = "DISK_EXPLORER_STATIC"
    )]
    pub static_dir: PathBuf,

    /// Default log filter when RUST_LOG is not set
    #[arg(long, value_name = "FILTER", default_value = "info")]
    pub log_level: String,

    /// Serve any file on the host while no folder is shared.
    /// Off by default: with an empty share list, /file refuses every path.
    #[arg(long, env = "DISK_EXPLORER_OPEN_DOWNLOADS")]
    pub allow_downloads_without_shares: bool,

    /// Let /directory browse the whole host even when folders are shared.
    #[arg(long, env = "DISK_EXPLORER_OPEN_DIRECTORY")]
    pub open_directory_browsing: bool,
}

/// Access policy knobs handed to request handlers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Policy {
    pub allow_downloads_without_shares: bool,
    pub open_directory_browsing: bool,
}

impl From<&Args> for Policy {
    fn from(args: &Args) -> Self {
        Self {
            allow_downloads_without_shares: args.allow_downloads_without_shares,
            open_directory_browsing: args.open_directory_browsing,
        }
    }
}
