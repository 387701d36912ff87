//! LedgerKV CLI
//!
//! Offline inspection of transaction logs.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use ledgerkv::wal::{self, FileTransactionLogger, SqliteTransactionLogger};
use ledgerkv::{LedgerError, Result, TransactionLogger};

/// LedgerKV CLI
#[derive(Parser, Debug)]
#[command(name = "ledgerkv-cli")]
#[command(about = "Inspect LedgerKV transaction logs")]
struct Args {
    /// Treat the path as a SQLite database instead of a text log
    #[arg(long, global = true)]
    sqlite: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a log and print replay statistics
    Verify {
        /// Path of the log
        path: PathBuf,
    },

    /// Print every event in sequence order
    Dump {
        /// Path of the log
        path: PathBuf,
    },
}

fn open(path: &Path, sqlite: bool) -> Result<Box<dyn TransactionLogger>> {
    // Opening would otherwise create an empty log
    if !path.exists() {
        return Err(LedgerError::Config(format!("{} does not exist", path.display())));
    }
    Ok(if sqlite {
        Box::new(SqliteTransactionLogger::open(path, 1)?)
    } else {
        Box::new(FileTransactionLogger::open(path, 1)?)
    })
}

fn execute(args: Args) -> Result<()> {
    match args.command {
        Commands::Verify { path } => {
            let mut logger = open(&path, args.sqlite)?;
            let result = wal::verify(logger.as_mut())?;
            println!("OK {}", path.display());
            println!("  events:        {}", result.events_replayed);
            println!("  puts:          {}", result.puts);
            println!("  deletes:       {}", result.deletes);
            println!("  last sequence: {}", result.last_sequence);
        }
        Commands::Dump { path } => {
            let mut logger = open(&path, args.sqlite)?;
            for event in logger.read_events()? {
                let event = event?;
                println!("{}\t{}\t{}\t{}", event.sequence, event.kind, event.key, event.value);
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    match execute(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
