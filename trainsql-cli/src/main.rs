mod config;
mod rusty;
mod server;
mod session;
mod trace;

use std::io::{stdin, IsTerminal};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use trainsql::mvcc::MVCC;
use trainsql::storage::log_cask::LogCask;
use trainsql::storage::memory::Memory;

use config::{Config, EngineKind};
use session::CliSession;

#[derive(Debug, Parser)]
#[command(version, author, about = "Interactive shell and TCP line server for TrainSQL")]
struct Args {
    /// Print the parsed arguments and loaded configuration before starting.
    #[arg(short, long)]
    debug: bool,

    /// Configuration file path. Falls back to the platform config
    /// directory (app `trainsql`) when omitted.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Run the TCP line server instead of a local REPL/batch session.
    #[arg(long)]
    serve: bool,

    /// Listen address for `--serve`, overriding the configuration file.
    #[arg(long)]
    listen: Option<String>,

    /// Storage engine to use, overriding the configuration file.
    #[arg(short = 'e', long)]
    engine: Option<EngineKind>,

    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Force non-interactive (batch) mode even when stdin is a terminal.
    #[arg(short = 'n', long)]
    non_interactive: bool,

    /// Run a single query and exit, instead of reading stdin or a REPL.
    #[arg(long)]
    query: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    eprintln!();
    eprintln!("████████╗██████╗  █████╗ ██╗███╗   ██╗███████╗ ██████╗ ██╗");
    eprintln!("╚══██╔══╝██╔══██╗██╔══██╗██║████╗  ██║██╔════╝██╔═══██╗██║");
    eprintln!("   ██║   ██████╔╝███████║██║██╔██╗ ██║███████╗██║   ██║██║");
    eprintln!("   ██║   ██╔══██╗██╔══██║██║██║╚██╗██║╚════██║██║▄▄ ██║██║");
    eprintln!("   ██║   ██║  ██║██║  ██║██║██║ ╚████║███████║╚██████╔╝███████╗");
    eprintln!("   ╚═╝   ╚═╝  ╚═╝╚═╝  ╚═╝╚═╝╚═╝  ╚═══╝╚══════╝ ╚══▀▀═╝ ╚══════╝");
    eprintln!();

    let args = Args::parse();
    if args.debug {
        println!("{:?}", args);
    }

    let log_dir = format!("{}/.trainsql", std::env::var("HOME").unwrap_or_else(|_| ".".to_string()));
    let _guards = trace::init_logging(&log_dir, &args.log_level)?;
    info!("trainsql-cli starting with args: {:?}", &args);

    let mut cfg = Config::load(args.config.as_deref()).unwrap_or_else(|err| {
        info!("falling back to default configuration: {}", err);
        Config::default()
    });
    if let Some(listen) = &args.listen {
        cfg.listen_addr = listen.clone();
    }
    if let Some(engine) = args.engine {
        cfg.engine = engine;
    }
    if args.debug {
        println!("{:?}", &cfg);
        eprintln!();
    }
    info!("trainsql-cli starting with config: {:?}", &cfg);

    if args.serve {
        return run_server(&cfg).await;
    }

    let is_repl = stdin().is_terminal() && !args.non_interactive && args.query.is_none();
    run_local(cfg, is_repl, args.query).await
}

async fn run_server(cfg: &Config) -> Result<()> {
    match cfg.engine {
        EngineKind::Memory => {
            let mvcc = MVCC::new(Memory::new());
            server::serve(&cfg.listen_addr, mvcc).await
        }
        EngineKind::LogCask => {
            std::fs::create_dir_all(&cfg.data_dir)
                .with_context(|| format!("creating data directory {}", cfg.data_dir.display()))?;
            let engine = LogCask::new(cfg.data_dir.join("trainsql.log"))?;
            let mvcc = MVCC::new(engine);
            server::serve(&cfg.listen_addr, mvcc).await
        }
    }
}

async fn run_local(cfg: Config, is_repl: bool, query: Option<String>) -> Result<()> {
    match cfg.engine {
        EngineKind::Memory => {
            let mvcc = MVCC::new(Memory::new());
            run_local_session(CliSession::new(mvcc, cfg), is_repl, query)
        }
        EngineKind::LogCask => {
            std::fs::create_dir_all(&cfg.data_dir)
                .with_context(|| format!("creating data directory {}", cfg.data_dir.display()))?;
            let engine = LogCask::new(cfg.data_dir.join("trainsql.log"))?;
            let mvcc = MVCC::new(engine);
            run_local_session(CliSession::new(mvcc, cfg), is_repl, query)
        }
    }
}

fn run_local_session<E>(mut session: CliSession<E>, is_repl: bool, query: Option<String>) -> Result<()>
where
    E: trainsql::storage::engine::Engine + 'static,
{
    if is_repl {
        session.handle_repl();
        return Ok(());
    }

    match query {
        None => session.handle_reader(stdin().lock()),
        Some(query) => session.handle_reader(std::io::Cursor::new(query)),
    }
}
