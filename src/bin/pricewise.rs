//! CLI binary for pricewise.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pricewise::{PricewiseConfig, build_aggregator, logging};
use pricewise_aggregate::{Aggregator, SearchParams, SearchRequest};
use rust_decimal::Decimal;
use serde::Serialize;

/// Pricewise: compare product prices across sources.
#[derive(Parser)]
#[command(name = "pricewise", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Client identifier used for rate limiting.
    #[arg(long, default_value = "cli")]
    client: String,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Search every configured source and print merged products.
    Search {
        /// Product query.
        query: String,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        per_page: Option<u32>,
        /// price, rating or relevance.
        #[arg(long)]
        sort: Option<String>,
        /// asc or desc.
        #[arg(long)]
        order: Option<String>,
        /// Restrict to a source; repeatable.
        #[arg(long = "source")]
        sources: Vec<String>,
        #[arg(long)]
        min_price: Option<Decimal>,
        #[arg(long)]
        max_price: Option<Decimal>,
        #[arg(long)]
        min_rating: Option<f64>,
    },

    /// List configured sources.
    Sources,

    /// Look up a product page URL on the source that owns its domain.
    Lookup {
        /// Product page URL.
        url: String,
    },

    /// Look up several product page URLs concurrently.
    LookupBatch {
        /// Product page URLs; all must be valid http(s) URLs.
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Write the effective configuration to a file.
    InitConfig {
        /// Destination; defaults to the standard config path.
        #[arg(long)]
        path: Option<PathBuf>,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    logging::init(&config.logging)?;

    match cli.command {
        Command::Search {
            query,
            page,
            per_page,
            sort,
            order,
            sources,
            min_price,
            max_price,
            min_rating,
        } => {
            let request = SearchRequest::try_from(SearchParams {
                query,
                page,
                per_page,
                sort,
                order,
                sources,
                min_price,
                max_price,
                min_rating,
            })?;
            let aggregator = aggregator(&config)?;
            print_json(&aggregator.search(&cli.client, request).await?)
        }
        Command::Sources => print_json(&aggregator(&config)?.supported_sources()),
        Command::Lookup { url } => {
            let aggregator = aggregator(&config)?;
            print_json(&aggregator.lookup_url(&cli.client, &url).await?)
        }
        Command::LookupBatch { urls } => {
            let aggregator = aggregator(&config)?;
            let urls: Vec<&str> = urls.iter().map(String::as_str).collect();
            print_json(&aggregator.lookup_urls(&cli.client, &urls).await?)
        }
        Command::InitConfig { path, force } => {
            let path = path.unwrap_or_else(PricewiseConfig::default_config_path);
            if path.exists() && !force {
                anyhow::bail!("{} already exists; pass --force to overwrite", path.display());
            }
            config.save_to_file(&path)?;
            println!("wrote {}", path.display());
            Ok(())
        }
    }
}

/// Explicit path, else the default path if present, else built-in defaults.
fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<PricewiseConfig> {
    if let Some(path) = path {
        return PricewiseConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()));
    }
    let default = PricewiseConfig::default_config_path();
    if default.exists() {
        return PricewiseConfig::from_file(&default)
            .with_context(|| format!("loading {}", default.display()));
    }
    Ok(PricewiseConfig::default())
}

fn aggregator(config: &PricewiseConfig) -> anyhow::Result<Aggregator> {
    if config.sources.is_empty() {
        anyhow::bail!("no sources configured; see demos/pricewise.toml for an example");
    }
    Ok(build_aggregator(config)?)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
