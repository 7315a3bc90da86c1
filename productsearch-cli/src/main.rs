//! ProductSearch CLI - manage and search a visual product catalog.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use productsearch_core::{BoundingPoly, ProductCategory, SearchGrouping};
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success
  1   General error
  64  Usage error (invalid arguments, deleted handle)
  66  Input file could not be read
  69  Remote service error
  78  Missing or invalid configuration";

#[derive(Parser)]
#[command(name = "productsearch")]
#[command(author, version, about = "Visual product catalog search", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    #[command(flatten)]
    globals: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command. Each overrides its environment variable.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Cloud project id [env: PRODUCTSEARCH_PROJECT_ID]
    #[arg(long, global = true)]
    pub project: Option<String>,

    /// Compute region of the catalog [env: PRODUCTSEARCH_LOCATION]
    #[arg(long, global = true)]
    pub location: Option<String>,

    /// Bucket holding reference images [env: PRODUCTSEARCH_BUCKET]
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    /// Key prefix for uploaded reference images [env: PRODUCTSEARCH_STORAGE_PREFIX]
    #[arg(long, global = true)]
    pub prefix: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage products and their reference images
    #[command(subcommand)]
    Product(ProductCommand),

    /// Manage product sets and their membership
    #[command(subcommand)]
    Set(SetCommand),

    /// Search a product set for products similar to an image
    Search {
        /// Product set to search
        #[arg(value_name = "SET")]
        set: String,

        /// Product category to search in
        #[arg(short, long)]
        category: ProductCategory,

        /// Local image file to search with
        #[arg(short, long, value_name = "FILE")]
        file: Option<PathBuf>,

        /// gs:// or https:// URI of the image to search with
        #[arg(short, long, value_name = "URI")]
        uri: Option<String>,

        /// Label filter, e.g. "style=womens AND color=(red OR blue)"
        #[arg(long)]
        filter: Option<String>,

        /// Result shape: flat or grouped (by detected object)
        #[arg(short, long)]
        grouping: Option<SearchGrouping>,

        /// Minimum object confidence kept in grouped results (implies grouped)
        #[arg(long, value_name = "SCORE")]
        min_confidence: Option<f32>,
    },
}

#[derive(Subcommand)]
pub enum ProductCommand {
    /// Create a product
    Create {
        #[arg(value_name = "ID")]
        id: String,

        /// Product category
        #[arg(short, long)]
        category: ProductCategory,

        /// Display name (defaults to the id)
        #[arg(long)]
        display_name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Filterable label, repeatable
        #[arg(short, long = "label", value_name = "KEY=VALUE", value_parser = utils::parse_label)]
        labels: Vec<(String, String)>,
    },

    /// Show a product
    Get {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// List every product in the location
    List,

    /// Delete a product and its reference images
    Delete {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Upload an image and register it as a reference image
    AddImage {
        #[arg(value_name = "ID")]
        id: String,

        /// Image file to upload
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Normalized region of the product, "x,y;x,y;x,y;...", repeatable
        #[arg(long = "bounding-poly", value_name = "POLY", value_parser = utils::parse_bounding_poly)]
        bounding_polys: Vec<BoundingPoly>,
    },

    /// List reference images of a product
    Images {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Print the public URL of a reference image
    ImageUrl {
        #[arg(value_name = "ID")]
        id: String,

        /// Reference image id or full resource name
        #[arg(value_name = "IMAGE")]
        image: String,
    },

    /// Delete a reference image and its uploaded blob
    DeleteImage {
        #[arg(value_name = "ID")]
        id: String,

        /// Reference image id or full resource name
        #[arg(value_name = "IMAGE")]
        image: String,
    },
}

#[derive(Subcommand)]
pub enum SetCommand {
    /// Create a product set
    Create {
        #[arg(value_name = "ID")]
        id: String,

        /// Display name (defaults to the id)
        #[arg(long)]
        display_name: Option<String>,
    },

    /// Show a product set
    Get {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// List every product set in the location
    List,

    /// Delete a product set (member products are kept)
    Delete {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Add a product to a set
    Add {
        #[arg(value_name = "SET")]
        set: String,

        #[arg(value_name = "PRODUCT")]
        product: String,
    },

    /// Remove a product from a set
    Remove {
        #[arg(value_name = "SET")]
        set: String,

        #[arg(value_name = "PRODUCT")]
        product: String,
    },

    /// List products in a set
    Products {
        #[arg(value_name = "SET")]
        set: String,
    },

    /// Show when the set was last indexed
    IndexTime {
        #[arg(value_name = "SET")]
        set: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let globals = cli.globals;
    match cli.command {
        Commands::Product(command) => commands::product::execute(&globals, command).await,
        Commands::Set(command) => commands::product_set::execute(&globals, command).await,
        Commands::Search {
            set,
            category,
            file,
            uri,
            filter,
            grouping,
            min_confidence,
        } => {
            let request = commands::search::SearchRequest {
                set,
                category,
                file,
                uri,
                filter,
                grouping,
                min_confidence,
            };
            commands::search::execute(&globals, request).await
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        let exit = ExitCode::from_anyhow(&err);
        tracing::debug!(code = exit.code, error = %exit.message, "Command failed");
        eprintln!("{} {}", "Error:".red().bold(), exit.message);
        std::process::exit(exit.code);
    }
}
