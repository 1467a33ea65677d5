//! canopy process entry point: serve, or run one command against a server.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use canopy::db::{DatabasePool, PoolConfig};
use canopy::server::{ServerConfig, TcpServer};
use canopy::{client, Result};

const DEFAULT_DATABASE: &str = "default";

#[derive(Parser)]
#[command(name = "canopy", version, about = "In-memory journaled path-addressable tree store")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the server (the default when no subcommand is given).
    Start(StartArgs),
    /// Run a single command against a running server and print the reply.
    Exec(ExecArgs),
}

#[derive(Args)]
struct StartArgs {
    /// TCP port to listen on.
    #[arg(long, default_value_t = 7212, env = "CANOPY_PORT")]
    port: u16,
    /// Handle connections on the accept thread instead of spawning workers.
    #[arg(long)]
    mono: bool,
    /// Do not journal mutations; existing journals are still replayed.
    #[arg(long)]
    volatile: bool,
    /// Keep retrying the bind while the port is taken.
    #[arg(long)]
    pend: bool,
    /// Directory holding the per-database journal files.
    #[arg(long, default_value = ".", env = "CANOPY_DATA_DIR")]
    data_dir: PathBuf,
    /// Databases to load before accepting connections (repeatable).
    #[arg(long = "boot")]
    boot: Vec<String>,
    /// Maximum concurrent connection workers; 0 means unbounded.
    #[arg(long, default_value_t = 20)]
    max_workers: usize,
}

#[derive(Args)]
struct ExecArgs {
    /// Server address.
    #[arg(long, default_value = "127.0.0.1:7212")]
    addr: String,
    /// Database to run against.
    #[arg(long, default_value = DEFAULT_DATABASE)]
    database: String,
    /// Operation followed by its arguments, e.g. `SET fruit apple`.
    #[arg(required = true, trailing_var_arg = true)]
    command: Vec<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Start(StartArgs {
        port: 7212,
        mono: false,
        volatile: false,
        pend: false,
        data_dir: PathBuf::from("."),
        boot: Vec::new(),
        max_workers: 20,
    }));

    let outcome = match command {
        Command::Start(args) => serve(args),
        Command::Exec(args) => exec(args),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "exiting");
            ExitCode::FAILURE
        }
    }
}

fn serve(args: StartArgs) -> Result<()> {
    let pool = Arc::new(DatabasePool::new(PoolConfig {
        data_dir: args.data_dir,
        volatile: args.volatile,
    }));
    if args.volatile {
        info!("volatile mode: mutations will not be journaled");
    }

    let boot = if args.boot.is_empty() {
        vec![DEFAULT_DATABASE.to_string()]
    } else {
        args.boot
    };
    for name in &boot {
        pool.use_database(name)?;
    }

    let server = TcpServer::new(
        pool,
        ServerConfig {
            port: args.port,
            mono: args.mono,
            max_workers: args.max_workers,
            bind_retry: args.pend,
        },
    );
    server.serve()
}

fn exec(args: ExecArgs) -> Result<()> {
    let operation = &args.command[0];
    let reply = client::request(&args.addr, &args.database, operation, &args.command[1..])?;
    println!("{reply}");
    Ok(())
}
