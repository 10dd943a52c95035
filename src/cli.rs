//! Terminal output for each subcommand.

use anyhow::Result;
use chrono::NaiveDate;
use std::path::Path;

use facenote::color_extractor::{ColorExtractor, GradientColors};
use facenote::config::FacenoteConfig;
use facenote::contact::{Contact, GradientOutcome};
use facenote::storage::{self, format_bytes};
use facenote::store::ContactStore;

fn open_store(config: &FacenoteConfig) -> Result<ContactStore> {
    ContactStore::open(config.resolved_data_dir())
}

fn print_gradient(colors: &GradientColors) {
    println!("  Base:          {}  {}", colors.base.to_hex(), colors.base.to_css());
    println!(
        "  Gradient end:  {}  {}",
        colors.gradient_end.to_hex(),
        colors.gradient_end.to_css()
    );
}

fn report_outcome(name: &str, outcome: &GradientOutcome) {
    match outcome {
        GradientOutcome::Applied(colors) => {
            println!("Photo gradient for {}:", name);
            print_gradient(colors);
        }
        GradientOutcome::Unavailable => {
            println!("No usable colors in {}'s photo; using the default background.", name);
        }
    }
}

pub fn colors(image: &Path) -> Result<()> {
    match ColorExtractor::derive_from_file(image) {
        Some(colors) => {
            println!("{}", image.display());
            print_gradient(&colors);
        }
        None => {
            println!("No usable colors in {}; default background:", image.display());
            print_gradient(&GradientColors::neutral());
        }
    }
    Ok(())
}

pub fn add(
    config: &FacenoteConfig,
    name: String,
    notes: String,
    tags: Vec<String>,
    met: Option<NaiveDate>,
    photo: Option<&Path>,
) -> Result<()> {
    let mut store = open_store(config)?;
    let mut contact = Contact::new(name).with_notes(notes).with_tags(tags);
    contact.met_date = met;
    let name = contact.name.clone();
    let id = store.add(contact);

    if let Some(photo) = photo {
        let outcome = store.import_photo(id, photo, config.jpeg_quality())?;
        report_outcome(&name, &outcome);
    }
    store.save()?;
    println!("Added {} ({})", name, id);
    Ok(())
}

pub fn list(config: &FacenoteConfig, tag: Option<&str>, query: Option<&str>) -> Result<()> {
    let store = open_store(config)?;
    let contacts: Vec<&Contact> = store
        .list()
        .into_iter()
        .filter(|c| tag.map_or(true, |t| c.matches_tag(t)))
        .filter(|c| query.map_or(true, |q| c.matches_query(q)))
        .collect();

    if contacts.is_empty() {
        println!("No contacts.");
        return Ok(());
    }
    for c in contacts {
        let short_id = &c.id.to_string()[..8];
        let met = c
            .met_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!("{}  {:<28} {:<10} {}", short_id, c.name, met, c.tags.join(", "));
    }
    Ok(())
}

pub fn show(config: &FacenoteConfig, needle: &str) -> Result<()> {
    let store = open_store(config)?;
    let id = store.find(needle)?;
    let Some(c) = store.get(id) else {
        return Ok(());
    };

    println!("{}", c.name);
    println!("{}", "=".repeat(40));
    println!("  Id:            {}", c.id);
    if let Some(met) = c.met_date {
        println!("  Met:           {}", met.format("%B %-d, %Y"));
    }
    if !c.tags.is_empty() {
        println!("  Tags:          {}", c.tags.join(", "));
    }
    if !c.notes.is_empty() {
        println!("  Notes:         {}", c.notes);
    }
    match store.photo_path(c) {
        Some(path) => println!("  Photo:         {}", path.display()),
        None => println!("  Photo:         none"),
    }
    if c.photo_gradient().is_none() {
        println!("  (default background)");
    }
    print_gradient(&c.background());
    Ok(())
}

pub fn photo(config: &FacenoteConfig, needle: &str, image: &Path) -> Result<()> {
    let mut store = open_store(config)?;
    let id = store.find(needle)?;
    let outcome = store.import_photo(id, image, config.jpeg_quality())?;
    store.save()?;
    let name = store.get(id).map(|c| c.name.clone()).unwrap_or_default();
    report_outcome(&name, &outcome);
    Ok(())
}

pub fn remove(config: &FacenoteConfig, needle: &str) -> Result<()> {
    let mut store = open_store(config)?;
    let id = store.find(needle)?;
    let removed = store.remove(id)?;
    store.save()?;
    println!("Removed {}", removed.name);
    Ok(())
}

pub fn refresh_gradients(config: &FacenoteConfig) -> Result<()> {
    let mut store = open_store(config)?;
    println!("Recomputing photo gradients...");
    let report = store.refresh_gradients();
    store.save()?;
    println!("  Updated:       {}", report.applied);
    println!("  No colors:     {}", report.unavailable);
    println!("  Missing photo: {}", report.missing);
    Ok(())
}

pub fn storage(config: &FacenoteConfig) -> Result<()> {
    let store = open_store(config)?;
    let b = storage::measure(&store)?;

    println!("Storage ({})", store.root().display());
    println!("{}", "=".repeat(40));
    println!("  Contacts:      {} ({})", store.len(), format_bytes(b.records_bytes));
    println!("  Photos:        {} ({})", b.photo_count, format_bytes(b.photo_bytes));
    println!("  Orphaned:      {} ({})", b.orphan_count, format_bytes(b.orphan_bytes));
    println!("  Other:         {}", format_bytes(b.other_bytes));
    println!("  Total:         {} ({} bytes)", format_bytes(b.total()), b.total());
    Ok(())
}

pub fn clean(config: &FacenoteConfig, dry_run: bool) -> Result<()> {
    let store = open_store(config)?;
    let report = storage::reclaim_orphans(&store, dry_run)?;

    if report.files.is_empty() {
        println!("No orphaned photos found.");
        return Ok(());
    }
    let verb = if dry_run { "Would delete" } else { "Deleted" };
    for path in &report.files {
        println!("  {}", path.display());
    }
    println!(
        "{} {} files, {}.",
        verb,
        report.files.len(),
        format_bytes(report.bytes)
    );
    Ok(())
}

pub fn shrink(
    config: &FacenoteConfig,
    max_side: Option<u32>,
    quality: Option<u8>,
    dry_run: bool,
) -> Result<()> {
    let mut store = open_store(config)?;
    let max_side = max_side.unwrap_or(config.photos.max_side);
    let quality = quality.unwrap_or_else(|| config.jpeg_quality());

    let report = storage::shrink_photos(&mut store, max_side, quality, dry_run)?;
    println!("Examined {} photos.", report.examined);
    if report.failed > 0 {
        println!("Skipped {} unreadable photos.", report.failed);
    }
    if report.shrunk == 0 {
        println!("Nothing to shrink at {} px.", max_side);
        return Ok(());
    }
    let verb = if dry_run { "Would shrink" } else { "Shrunk" };
    println!(
        "{} {} photos: {} -> {} (saves {}).",
        verb,
        report.shrunk,
        format_bytes(report.bytes_before),
        format_bytes(report.bytes_after),
        format_bytes(report.saved())
    );
    Ok(())
}
