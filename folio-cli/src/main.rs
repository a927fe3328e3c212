//! # folio CLI
//!
//! Command-line interface for the folio document engine.

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "folio")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (optional)
    #[arg(long, default_value = "folio.yml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a document between Markdown, HTML and editor JSON
    Convert {
        /// Input file
        input: PathBuf,

        /// Input format (defaults to the file extension)
        #[arg(long, value_enum)]
        from: Option<DocFormat>,

        /// Output format
        #[arg(long, value_enum, default_value_t = DocFormat::Markdown)]
        to: DocFormat,

        /// Optional output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the line-number gutter of every code block
    Gutter {
        /// Input file
        input: PathBuf,

        /// Input format (defaults to the file extension)
        #[arg(long, value_enum)]
        from: Option<DocFormat>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Work with documents in a local store file
    Store {
        /// Store file
        #[arg(long, default_value = "folio-store.json")]
        path: PathBuf,

        /// Owner acting on the store
        #[arg(long, default_value = "local")]
        owner: String,

        #[command(subcommand)]
        command: StoreCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Convert {
            input,
            from,
            to,
            output,
        } => commands::convert_document(&cli.config, &input, from, to, output.as_deref()),
        Commands::Gutter { input, from, json } => {
            commands::print_gutters(&cli.config, &input, from, json)
        }
        Commands::Store {
            path,
            owner,
            command,
        } => {
            let store = commands::StoreArgs {
                path,
                owner,
                config: cli.config,
            };
            match command {
                StoreCommands::Import { input, from, title } => {
                    commands::import_document(&store, &input, from, title.as_deref()).await
                }
                StoreCommands::List {
                    offset,
                    limit,
                    order,
                    asc,
                    public,
                    json,
                } => {
                    let opts = commands::ListOptions {
                        offset,
                        limit,
                        order,
                        asc,
                        public,
                        json,
                    };
                    commands::list_documents(&store, opts).await
                }
                StoreCommands::Show { id, to } => commands::show_document(&store, &id, to).await,
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum DocFormat {
    Markdown,
    Html,
    Json,
}

#[derive(Copy, Clone, ValueEnum)]
pub enum OrderArg {
    Created,
    Updated,
    Title,
}

#[derive(Subcommand)]
pub enum StoreCommands {
    /// Import a Markdown, HTML or JSON file as a new document
    Import {
        /// Input file
        input: PathBuf,

        /// Input format (defaults to the file extension)
        #[arg(long, value_enum)]
        from: Option<DocFormat>,

        /// Document title (defaults to the first heading)
        #[arg(long)]
        title: Option<String>,
    },

    /// List the owner's documents
    List {
        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Sort field
        #[arg(long, value_enum, default_value_t = OrderArg::Created)]
        order: OrderArg,

        /// Sort ascending instead of descending
        #[arg(long)]
        asc: bool,

        /// Only public documents
        #[arg(long)]
        public: bool,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Render a stored document
    Show {
        /// Document id
        id: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = DocFormat::Markdown)]
        to: DocFormat,
    },
}
