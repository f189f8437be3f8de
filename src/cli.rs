use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "xbstream")]
#[command(about = "Multiplex many files over one archive byte stream")]
#[command(author, version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pack the named files into an archive on standard output
    Create {
        /// Change to this directory before reading the files
        #[arg(short = 'C', long, value_name = "DIR")]
        directory: Option<PathBuf>,

        /// Producer threads multiplexing onto the stream
        #[arg(short, long, default_value_t = 1, value_name = "N")]
        parallel: usize,

        /// Files to pack; their paths become the archive member names
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Unpack an archive from standard input into a directory
    Extract {
        /// Directory to unpack into
        #[arg(short = 'C', long, value_name = "DIR", default_value = ".")]
        directory: PathBuf,

        /// Read the archive from this FIFO instead of standard input
        #[arg(long, value_name = "PATH")]
        fifo: Option<PathBuf>,

        /// Seconds to wait for a writer on the FIFO; 0 waits forever
        #[arg(long, default_value_t = 0, value_name = "SECS")]
        timeout: i32,
    },
}
