use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tether::bind::Protocol;
use tether::commands::{eventually, wait_bind};
use tether::config::{TetherConfig, CONFIG_FILE_NAME};

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Wait for processes and checks to settle", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    /// Log retry attempts to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the IPv4 port a running process has bound
    WaitBind {
        /// Process to inspect
        pid: u32,

        /// Look for a UDP socket instead of TCP
        #[arg(long)]
        udp: bool,

        /// Give up after this many milliseconds (default from config: 30000)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Re-run a command until it exits successfully
    Eventually {
        /// Give up after this many milliseconds (default from config: 10000)
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Command and arguments to run
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tether::logging::init(cli.verbose);

    let config = TetherConfig::load(&cli.config)?;
    config.apply();

    match cli.command {
        Commands::WaitBind {
            pid,
            udp,
            timeout_ms,
        } => {
            let protocol = if udp { Protocol::Udp } else { Protocol::Tcp };
            wait_bind::execute(&config, pid, protocol, timeout_ms.map(Duration::from_millis))
        }
        Commands::Eventually {
            timeout_ms,
            command,
        } => eventually::execute(&config, &command, timeout_ms.map(Duration::from_millis)),
    }
}
