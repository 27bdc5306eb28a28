use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::language::Language;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start mnema as a service.
    Daemon {},

    /// Capture a new note: text, a link, or an image file.
    Add {
        /// Note text or a URL
        text: Option<String>,

        /// Path to an image file to capture
        #[clap(short, long)]
        image: Option<PathBuf>,

        /// Display language for the generated annotation (en|zh)
        #[clap(short, long)]
        language: Option<Language>,
    },

    /// Ask a natural-language question over your notes.
    Ask {
        query: String,

        /// Display language for the answer (en|zh)
        #[clap(short, long)]
        language: Option<Language>,

        /// Print the full response (answer, related ids, filters) as JSON
        #[clap(long, default_value = "false")]
        json: bool,
    },

    /// List stored notes with plain filters.
    Search {
        /// Substring to look for in content or summary
        text: Option<String>,

        /// Category name (exact, case-insensitive)
        #[clap(short, long)]
        category: Option<String>,

        /// Comma-separated tags; a note matches when it carries any of them
        #[clap(short, long)]
        tags: Option<String>,

        /// Note kind: text, image or link
        #[clap(short, long)]
        kind: Option<String>,

        #[clap(long)]
        limit: Option<usize>,

        /// Print the match count only
        #[clap(long, default_value = "false")]
        count: bool,
    },

    /// Delete a note by id.
    Delete {
        id: String,

        /// Auto confirm
        #[clap(short, long, default_value = "false")]
        yes: bool,
    },

    /// List known categories.
    Categories {},

    /// List known tags.
    Tags {},

    /// Backfill embeddings for notes that lack one.
    Reembed {},

    /// Export notes and config as a tar.gz archive.
    Backup {
        /// Output path. Defaults to mnema-backup-<timestamp>.tar.gz, or
        /// stdout when piped.
        output: Option<PathBuf>,
    },

    /// Restore a backup archive.
    Import {
        /// Archive path (or pipe the archive via stdin)
        archive: Option<PathBuf>,

        /// Auto confirm overwriting existing files
        #[clap(short, long, default_value = "false")]
        yes: bool,
    },
}
