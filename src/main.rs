use clap::{Parser, Subcommand};
use iv_info::{
    GLOBAL_ID_KEY, ImageItem, ImageKind, IvInfo, LookupInfo, PluginConfig, SharedConfig,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Look up release metadata from the configured catalog sources
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file (defaults to config.toml in the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable a source (and its images) for this run, on top of the configuration
    #[arg(long = "enable", value_name = "SOURCE", global = true)]
    enable: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Search all enabled sources for candidates
    Search(Lookup),
    /// Compose one metadata record from all enabled sources
    Compose(Lookup),
    /// List image URLs for an already identified release
    Images {
        /// Global id of the release, e.g. REBD-789
        #[arg(long)]
        id: String,

        /// Source id to pin, as SOURCE=ID
        #[arg(long = "source-id", value_parser = parse_key_value)]
        source_ids: Vec<(String, String)>,

        /// Only query this image kind
        #[arg(long)]
        kind: Option<ImageKind>,

        /// Image kinds the item already has
        #[arg(long, value_delimiter = ',')]
        existing: Vec<ImageKind>,
    },
    /// List registered sources with their current settings
    Sources,
}

#[derive(Debug, clap::Args)]
struct Lookup {
    /// File path of the item
    #[arg(long)]
    path: Option<String>,

    /// Display name of the item
    #[arg(long)]
    name: Option<String>,

    /// Pre-attached global id
    #[arg(long)]
    id: Option<String>,

    /// Source id to pin, as SOURCE=ID
    #[arg(long = "source-id", value_parser = parse_key_value)]
    source_ids: Vec<(String, String)>,
}

impl From<Lookup> for LookupInfo {
    fn from(lookup: Lookup) -> Self {
        let mut info = LookupInfo {
            name: lookup.name,
            path: lookup.path,
            ..LookupInfo::default()
        };
        if let Some(id) = lookup.id {
            info.provider_ids.insert(GLOBAL_ID_KEY.to_string(), id);
        }
        info.provider_ids.extend(lookup.source_ids);
        info
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected SOURCE=ID, got '{raw}'"))
}

fn load_config(cli: &Cli) -> Result<PluginConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => PluginConfig::load(path)?,
        None => {
            let path = PluginConfig::default_path()?;
            if path.exists() {
                PluginConfig::load(&path)?
            } else {
                debug!(path = %path.display(), "no configuration file, using defaults");
                PluginConfig::default()
            }
        }
    };

    for name in &cli.enable {
        let settings = config.sources.entry(name.clone()).or_default();
        settings.enabled = true;
        settings.image_enabled = true;
    }

    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&cli)?;
    let engine = IvInfo::builtin(SharedConfig::new(config))?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            trigger.cancel();
        }
    });

    match cli.command {
        Command::Search(lookup) => {
            let candidates = engine.search(&lookup.into(), &cancel).await?;
            info!(count = candidates.len(), "search finished");
            print_json(&candidates)?;
        }
        Command::Compose(lookup) => {
            let result = engine.compose(&lookup.into(), &cancel).await?;
            info!(has_metadata = result.has_metadata, "compose finished");
            print_json(&result)?;
        }
        Command::Images {
            id,
            source_ids,
            kind,
            existing,
        } => {
            let mut item = ImageItem {
                existing_image_kinds: existing.into_iter().collect(),
                ..ImageItem::default()
            };
            item.provider_ids.insert(GLOBAL_ID_KEY.to_string(), id);
            item.provider_ids.extend(source_ids);

            let images = engine.images(&item, kind, &cancel).await?;
            info!(count = images.len(), "image lookup finished");
            print_json(&images)?;
        }
        Command::Sources => print_json(&engine.sources())?,
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "iv_info=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
