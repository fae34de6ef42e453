//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// Download e-books from the web and keep track of what you are reading.
#[derive(Parser, Debug)]
#[command(name = "bookshelf")]
#[command(author, version, about)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Directory holding the library database and book files
    #[arg(long, value_name = "DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Download a book from a URL into the library
    Fetch {
        /// Direct link to an EPUB, PDF, TXT, MOBI, AZW3 or FB2 file
        url: String,
    },

    /// List books in the library, newest first
    List,

    /// Remove a book and its file
    Remove {
        /// Book id as shown by `list`
        id: Uuid,
    },

    /// Record reading progress for a book
    Read {
        /// Book id as shown by `list`
        id: Uuid,

        /// Current page
        #[arg(long)]
        page: Option<u32>,

        /// Total pages
        #[arg(long)]
        total: Option<u32>,

        /// Fractional position in the book (0.0-1.0)
        #[arg(long, value_parser = parse_position)]
        position: Option<f64>,
    },

    /// Report books whose files are missing from disk
    Check,
}

fn parse_position(raw: &str) -> Result<f64, String> {
    let value: f64 = raw
        .parse()
        .map_err(|_| format!("'{raw}' is not a number"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is outside 0.0..=1.0"))
    }
}
