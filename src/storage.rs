//! Byte-accurate storage accounting and space reclamation for a contact store.

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::GenericImageView;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::color_extractor::ColorExtractor;
use crate::contact::apply_derived_gradient;
use crate::store::{encode_jpeg, ContactStore, CONTACTS_FILE, PHOTOS_DIR};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct StorageBreakdown {
    pub records_bytes: u64,
    pub photo_count: usize,
    pub photo_bytes: u64,
    pub orphan_count: usize,
    pub orphan_bytes: u64,
    pub other_bytes: u64,
}

impl StorageBreakdown {
    pub fn total(&self) -> u64 {
        self.records_bytes + self.photo_bytes + self.orphan_bytes + self.other_bytes
    }
}

#[derive(Debug, Default, Clone)]
pub struct ReclaimReport {
    pub files: Vec<PathBuf>,
    pub bytes: u64,
    pub dry_run: bool,
}

#[derive(Debug, Default, Clone)]
pub struct ShrinkReport {
    pub examined: usize,
    pub shrunk: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
    /// Photos that could not be read or re-encoded; left untouched.
    pub failed: usize,
    pub dry_run: bool,
}

impl ShrinkReport {
    pub fn saved(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// Walk the store directory and attribute every file's size to a bucket.
pub fn measure(store: &ContactStore) -> Result<StorageBreakdown> {
    let mut breakdown = StorageBreakdown::default();
    let referenced = store.referenced_photos();
    let root = store.root();

    for entry in read_dir(root)? {
        let path = entry?.path();
        let meta = fs::symlink_metadata(&path)
            .with_context(|| format!("failed to stat {}", path.display()))?;

        if meta.is_dir() && path.file_name().is_some_and(|n| n == PHOTOS_DIR) {
            for photo in read_dir(&path)? {
                let photo = photo?.path();
                let meta = fs::symlink_metadata(&photo)
                    .with_context(|| format!("failed to stat {}", photo.display()))?;
                if !meta.is_file() {
                    breakdown.other_bytes += tree_size(&photo)?;
                    continue;
                }
                let name = photo.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                if referenced.contains(name) {
                    breakdown.photo_count += 1;
                    breakdown.photo_bytes += meta.len();
                } else {
                    breakdown.orphan_count += 1;
                    breakdown.orphan_bytes += meta.len();
                }
            }
        } else if meta.is_file() && path.file_name().is_some_and(|n| n == CONTACTS_FILE) {
            breakdown.records_bytes += meta.len();
        } else {
            breakdown.other_bytes += tree_size(&path)?;
        }
    }

    debug!("storage for {}: {:?}", root.display(), breakdown);
    Ok(breakdown)
}

/// Photo files no contact references.
pub fn orphaned_photos(store: &ContactStore) -> Result<Vec<(PathBuf, u64)>> {
    let referenced = store.referenced_photos();
    let mut orphans = Vec::new();
    for entry in read_dir(&store.photos_dir())? {
        let path = entry?.path();
        let meta = fs::symlink_metadata(&path)?;
        if !meta.is_file() {
            continue;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if !referenced.contains(name) {
            orphans.push((path, meta.len()));
        }
    }
    orphans.sort();
    Ok(orphans)
}

pub fn reclaim_orphans(store: &ContactStore, dry_run: bool) -> Result<ReclaimReport> {
    let mut report = ReclaimReport {
        dry_run,
        ..Default::default()
    };
    for (path, len) in orphaned_photos(store)? {
        if !dry_run {
            fs::remove_file(&path)
                .with_context(|| format!("failed to delete {}", path.display()))?;
            info!("deleted orphaned photo {}", path.display());
        }
        report.bytes += len;
        report.files.push(path);
    }
    Ok(report)
}

/// Re-encode referenced photos whose longer side exceeds `max_side`. A photo is
/// only replaced when the new encoding is smaller. Photos that fail to decode or
/// encode are skipped and counted. Gradients of replaced photos are recomputed
/// from the stored file and the store is saved.
pub fn shrink_photos(
    store: &mut ContactStore,
    max_side: u32,
    quality: u8,
    dry_run: bool,
) -> Result<ShrinkReport> {
    let mut report = ShrinkReport {
        dry_run,
        ..Default::default()
    };
    let max_side = max_side.max(1);

    let targets: Vec<_> = store
        .list()
        .iter()
        .filter_map(|c| store.photo_path(c).map(|p| (c.id, p)))
        .filter(|(_, p)| p.exists())
        .collect();

    for (id, path) in targets {
        report.examined += 1;
        let before = fs::metadata(&path)?.len();
        let img = match image::open(&path) {
            Ok(img) => img,
            Err(e) => {
                warn!("skipping {}: {}", path.display(), e);
                report.failed += 1;
                continue;
            }
        };
        let (w, h) = img.dimensions();
        if w.max(h) <= max_side {
            continue;
        }

        let resized = img.resize(max_side, max_side, FilterType::Lanczos3);
        let mut encoded = Vec::new();
        if let Err(e) = encode_jpeg(&resized, &mut encoded, quality) {
            warn!("skipping {}: {:#}", path.display(), e);
            report.failed += 1;
            continue;
        }
        let after = encoded.len() as u64;
        if after >= before {
            debug!("{} would not shrink ({} -> {} bytes)", path.display(), before, after);
            continue;
        }

        report.shrunk += 1;
        report.bytes_before += before;
        report.bytes_after += after;
        if dry_run {
            continue;
        }

        if let Err(e) = replace_file(&path, &encoded) {
            warn!("skipping {}: {:#}", path.display(), e);
            report.failed += 1;
            continue;
        }
        let derived = ColorExtractor::derive_from_file(&path);
        if let Some(contact) = store.get_mut(id) {
            apply_derived_gradient(contact, derived);
        }
        info!("shrunk {} from {}x{} ({} -> {} bytes)", path.display(), w, h, before, after);
    }

    if !dry_run && report.shrunk > 0 {
        store.save()?;
    }
    Ok(report)
}

/// Human-readable size: `512 B`, `1.5 KB`, `3.2 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

fn read_dir(path: &Path) -> Result<fs::ReadDir> {
    fs::read_dir(path).with_context(|| format!("failed to list {}", path.display()))
}

fn tree_size(path: &Path) -> Result<u64> {
    let meta = fs::symlink_metadata(path)?;
    if !meta.is_dir() {
        return Ok(meta.len());
    }
    let mut total = 0;
    for entry in read_dir(path)? {
        total += tree_size(&entry?.path())?;
    }
    Ok(total)
}

fn replace_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}
