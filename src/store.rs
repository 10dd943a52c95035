//! On-disk contact store: a `contacts.json` record file plus a `photos/` directory.

use anyhow::{bail, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::color_extractor::ColorExtractor;
use crate::contact::{apply_derived_gradient, Contact, GradientOutcome};

pub const CONTACTS_FILE: &str = "contacts.json";
pub const PHOTOS_DIR: &str = "photos";

/// Contacts processed per batch of background extraction threads.
const REFRESH_BATCH: usize = 8;

pub struct ContactStore {
    root: PathBuf,
    contacts: Vec<Contact>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RefreshReport {
    pub applied: usize,
    pub unavailable: usize,
    /// Contacts whose photo file has gone missing.
    pub missing: usize,
}

impl ContactStore {
    /// Open the store rooted at `root`, creating the directory layout if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let photos = root.join(PHOTOS_DIR);
        fs::create_dir_all(&photos)
            .with_context(|| format!("failed to create {}", photos.display()))?;

        let records = root.join(CONTACTS_FILE);
        let contacts = if records.exists() {
            let contents = fs::read_to_string(&records)
                .with_context(|| format!("failed to read {}", records.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("failed to parse {}", records.display()))?
        } else {
            Vec::new()
        };

        debug!("opened store at {} with {} contacts", root.display(), contacts.len());
        Ok(Self { root, contacts })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn contacts_path(&self) -> PathBuf {
        self.root.join(CONTACTS_FILE)
    }

    pub fn photos_dir(&self) -> PathBuf {
        self.root.join(PHOTOS_DIR)
    }

    pub fn photo_path(&self, contact: &Contact) -> Option<PathBuf> {
        contact.photo.as_ref().map(|name| self.photos_dir().join(name))
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Write the record file atomically (temp file, then rename).
    pub fn save(&self) -> Result<()> {
        let path = self.contacts_path();
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&self.contacts)?;
        {
            let mut file = File::create(&tmp)
                .with_context(|| format!("failed to create {}", tmp.display()))?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }

    pub fn add(&mut self, contact: Contact) -> Uuid {
        let id = contact.id;
        info!("added contact {} ({})", contact.name, id);
        self.contacts.push(contact);
        id
    }

    pub fn get(&self, id: Uuid) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut Contact> {
        self.contacts.iter_mut().find(|c| c.id == id)
    }

    /// Resolve a unique id prefix, or a case-insensitive exact name.
    pub fn find(&self, needle: &str) -> Result<Uuid> {
        let needle = needle.trim();
        if needle.is_empty() {
            bail!("empty contact reference");
        }

        let lowered = needle.to_lowercase();
        let by_id: Vec<&Contact> = self
            .contacts
            .iter()
            .filter(|c| c.id.to_string().starts_with(&lowered))
            .collect();
        let matches = if by_id.is_empty() {
            self.contacts
                .iter()
                .filter(|c| c.name.to_lowercase() == lowered)
                .collect::<Vec<_>>()
        } else {
            by_id
        };

        match matches.as_slice() {
            [] => bail!("no contact matches '{}'", needle),
            [only] => Ok(only.id),
            many => bail!("'{}' is ambiguous ({} contacts match)", needle, many.len()),
        }
    }

    /// Remove a contact and delete its photo file.
    pub fn remove(&mut self, id: Uuid) -> Result<Contact> {
        let Some(pos) = self.contacts.iter().position(|c| c.id == id) else {
            bail!("no contact with id {}", id);
        };
        let contact = self.contacts.remove(pos);
        if let Some(path) = self.photo_path(&contact) {
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("failed to delete {}", path.display()))?;
            }
        }
        info!("removed contact {} ({})", contact.name, id);
        Ok(contact)
    }

    /// All contacts sorted by name.
    pub fn list(&self) -> Vec<&Contact> {
        let mut all: Vec<&Contact> = self.contacts.iter().collect();
        all.sort_by_key(|c| c.name.to_lowercase());
        all
    }

    pub fn search(&self, query: &str) -> Vec<&Contact> {
        self.list().into_iter().filter(|c| c.matches_query(query)).collect()
    }

    pub fn with_tag(&self, tag: &str) -> Vec<&Contact> {
        self.list().into_iter().filter(|c| c.matches_tag(tag)).collect()
    }

    /// Photo file names referenced by any contact.
    pub fn referenced_photos(&self) -> HashSet<String> {
        self.contacts.iter().filter_map(|c| c.photo.clone()).collect()
    }

    /// Decode `source`, store it as `photos/<id>.jpg` and recompute the gradient.
    pub fn import_photo(&mut self, id: Uuid, source: &Path, quality: u8) -> Result<GradientOutcome> {
        if self.get(id).is_none() {
            bail!("no contact with id {}", id);
        }
        let img = image::open(source)
            .with_context(|| format!("failed to decode photo {}", source.display()))?;

        let file_name = format!("{}.jpg", id);
        let dest = self.photos_dir().join(&file_name);
        write_jpeg(&img, &dest, quality)?;

        let derived = ColorExtractor::derive_from_file(&dest);
        let contact = self
            .get_mut(id)
            .context("contact disappeared during photo import")?;
        contact.photo = Some(file_name);
        let outcome = apply_derived_gradient(contact, derived);
        info!("stored photo for {} at {}", contact.name, dest.display());
        Ok(outcome)
    }

    /// Drop a contact's photo and its gradient.
    pub fn remove_photo(&mut self, id: Uuid) -> Result<()> {
        let photos = self.photos_dir();
        let Some(contact) = self.get_mut(id) else {
            bail!("no contact with id {}", id);
        };
        if let Some(name) = contact.photo.take() {
            let path = photos.join(name);
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("failed to delete {}", path.display()))?;
            }
        }
        contact.clear_photo_gradient();
        Ok(())
    }

    /// Recompute every contact's gradient from its stored photo, off the calling thread.
    pub fn refresh_gradients(&mut self) -> RefreshReport {
        let mut report = RefreshReport::default();
        let mut jobs = Vec::new();

        for (index, contact) in self.contacts.iter().enumerate() {
            let Some(path) = self.photo_path(contact) else {
                continue;
            };
            jobs.push((index, path));
        }

        for batch in jobs.chunks(REFRESH_BATCH) {
            let pending: Vec<_> = batch
                .iter()
                .map(|(index, path)| {
                    let exists = path.exists();
                    let rx = exists.then(|| ColorExtractor::derive_in_background(path.clone()));
                    (*index, rx)
                })
                .collect();

            for (index, rx) in pending {
                let contact = &mut self.contacts[index];
                let Some(rx) = rx else {
                    warn!("photo for {} is missing", contact.name);
                    contact.photo = None;
                    contact.clear_photo_gradient();
                    report.missing += 1;
                    continue;
                };
                let derived = rx.recv().unwrap_or(None);
                if apply_derived_gradient(contact, derived).is_applied() {
                    report.applied += 1;
                } else {
                    report.unavailable += 1;
                }
            }
        }

        report
    }
}

/// Encode `img` as a baseline JPEG at `path`. The previous file stays in place
/// until the new one is fully written.
pub fn write_jpeg(img: &DynamicImage, path: &Path, quality: u8) -> Result<()> {
    let tmp = path.with_extension("jpg.tmp");
    let written = write_jpeg_file(img, &tmp, quality);
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
        return written;
    }
    fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

fn write_jpeg_file(img: &DynamicImage, path: &Path, quality: u8) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    encode_jpeg(img, &mut writer, quality)?;
    writer.flush()?;
    Ok(())
}

pub fn encode_jpeg<W: Write>(img: &DynamicImage, writer: &mut W, quality: u8) -> Result<()> {
    let encoder = JpegEncoder::new_with_quality(writer, quality.clamp(1, 100));
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_with_encoder(encoder)
        .context("failed to encode JPEG")?;
    Ok(())
}
