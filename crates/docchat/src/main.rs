//! # docchat CLI
//!
//! ## Usage
//!
//! ```bash
//! docchat --config ./config/docchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat init` | Create the SQLite database and metadata tables |
//! | `docchat bootstrap` | Create the vector collection and its payload index |
//! | `docchat serve` | Start the HTTP server |
//! | `docchat ask "<question>"` | Answer one question and print it |
//!
//! ## Examples
//!
//! ```bash
//! docchat init
//! docchat serve --config ./config/docchat.toml
//! docchat ask "What does the report say about Q3?" --mode docs \
//!     --file-id 3f9a... --filename report.pdf
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use docchat::{app, config, logging, migrate, server};
use docchat_core::compose::{ChatMode, ChatRequest};
use docchat_core::store::VectorStore;

/// docchat: retrieval-augmented chat over session-scoped uploads.
#[derive(Parser)]
#[command(name = "docchat", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Ensure the vector collection and its file-id index exist. Idempotent.
    Bootstrap,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Answer a single question and print the answer.
    Ask {
        question: String,

        #[arg(long, value_enum, default_value_t = ModeArg::General)]
        mode: ModeArg,

        /// File identifier for docs / cms mode.
        #[arg(long)]
        file_id: Option<String>,

        /// Display name of the file for docs / cms mode.
        #[arg(long)]
        filename: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    #[value(alias = "chat")]
    General,
    Docs,
    Cms,
}

impl From<ModeArg> for ChatMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::General => ChatMode::General,
            ModeArg::Docs => ChatMode::Docs,
            ModeArg::Cms => ChatMode::Cms,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Bootstrap => {
            let vectors = app::build_vector_store(&cfg)?;
            vectors.ensure_collection().await?;
            println!("Vector collection '{}' is ready.", vectors.collection());
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ask {
            question,
            mode,
            file_id,
            filename,
        } => {
            if question.trim().is_empty() {
                anyhow::bail!("question must not be empty");
            }
            let vectors = app::build_vector_store(&cfg)?;
            let composer = app::build_composer(&cfg, vectors)?;
            let answer = composer
                .answer(&ChatRequest {
                    question,
                    mode: mode.into(),
                    selected_file_id: file_id,
                    selected_filename: filename,
                })
                .await;
            println!("{}", answer);
        }
    }

    Ok(())
}
