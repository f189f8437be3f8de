use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

mod cli;
use crate::cli::{Cli, Commands};

use xbstream::create::create;
use xbstream::extract::extract;
use xbstream::stream::{StreamReader, StreamWriter};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Create {
            directory,
            parallel,
            files,
        } => run_create(directory, parallel, files),
        Commands::Extract {
            directory,
            fifo,
            timeout,
        } => run_extract(directory, fifo, timeout),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run_create(
    directory: Option<PathBuf>,
    parallel: usize,
    files: Vec<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    if let Some(dir) = directory {
        std::env::set_current_dir(&dir)?;
    }

    let stream = StreamWriter::stdout();
    create(&stream, &files, parallel.max(1))?;

    if let Some(mut sink) = stream.done() {
        sink.flush()?;
    }
    Ok(())
}

fn run_extract(
    directory: PathBuf,
    fifo: Option<PathBuf>,
    timeout: i32,
) -> Result<(), Box<dyn Error>> {
    let stats = match fifo {
        Some(path) => {
            let mut reader = StreamReader::from_fifo(&path, timeout)?;
            extract(&mut reader, &directory)?
        }
        None => {
            let mut reader = StreamReader::from_stdin();
            extract(&mut reader, &directory)?
        }
    };

    info!("extracted {} files ({} bytes)", stats.files, stats.bytes);
    Ok(())
}
