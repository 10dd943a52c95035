mod cli;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::{debug, info};
use std::path::PathBuf;

use facenote::config::{ConfigSource, FacenoteConfig};

#[derive(Parser)]
#[command(name = "facenote", version, about = "Remember names and faces")]
struct Cli {
    /// Override the data directory from the config file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the background colors derived from an image
    Colors { image: PathBuf },
    /// Add a contact
    Add {
        name: String,
        #[arg(long, default_value = "")]
        notes: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Date you met, YYYY-MM-DD
        #[arg(long)]
        met: Option<NaiveDate>,
        #[arg(long)]
        photo: Option<PathBuf>,
    },
    /// List contacts
    List {
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        query: Option<String>,
    },
    /// Show one contact by id prefix or name
    Show { contact: String },
    /// Replace a contact's photo
    Photo { contact: String, image: PathBuf },
    /// Delete a contact and its photo
    Remove { contact: String },
    /// Recompute every contact's photo gradient
    RefreshGradients,
    /// Show how much disk space the store uses
    Storage,
    /// Delete photo files no contact references
    Clean {
        #[arg(long)]
        dry_run: bool,
    },
    /// Re-encode oversized photos
    Shrink {
        #[arg(long)]
        max_side: Option<u32>,
        #[arg(long)]
        quality: Option<u8>,
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (mut config, source) = FacenoteConfig::load()?;
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir.to_string_lossy().into_owned();
    }

    // RUST_LOG still wins over the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();
    match source {
        ConfigSource::File(_) => debug!("{}", source),
        ConfigSource::Defaults(_) => info!("{}", source),
    }

    match cli.command {
        Command::Colors { image } => cli::colors(&image),
        Command::Add {
            name,
            notes,
            tags,
            met,
            photo,
        } => cli::add(&config, name, notes, tags, met, photo.as_deref()),
        Command::List { tag, query } => cli::list(&config, tag.as_deref(), query.as_deref()),
        Command::Show { contact } => cli::show(&config, &contact),
        Command::Photo { contact, image } => cli::photo(&config, &contact, &image),
        Command::Remove { contact } => cli::remove(&config, &contact),
        Command::RefreshGradients => cli::refresh_gradients(&config),
        Command::Storage => cli::storage(&config),
        Command::Clean { dry_run } => cli::clean(&config, dry_run),
        Command::Shrink {
            max_side,
            quality,
            dry_run,
        } => cli::shrink(&config, max_side, quality, dry_run),
    }
}
