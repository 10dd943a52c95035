use chrono::{DateTime, NaiveDate, Utc};
use image::DynamicImage;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::color_extractor::{ColorExtractor, GradientColors, Rgb};

/// A person worth remembering, plus the background gradient derived from their photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub met_date: Option<NaiveDate>,
    /// File name inside the store's photo directory.
    #[serde(default)]
    pub photo: Option<String>,
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub gradient_start_r: f32,
    #[serde(default)]
    pub gradient_start_g: f32,
    #[serde(default)]
    pub gradient_start_b: f32,
    #[serde(default)]
    pub gradient_end_r: f32,
    #[serde(default)]
    pub gradient_end_g: f32,
    #[serde(default)]
    pub gradient_end_b: f32,
    #[serde(default)]
    pub has_gradient: bool,
}

/// Result of recomputing a contact's photo gradient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GradientOutcome {
    Applied(GradientColors),
    /// The photo gave no usable colors; the contact falls back to the neutral background.
    Unavailable,
}

impl GradientOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, GradientOutcome::Applied(_))
    }

    pub fn colors(&self) -> Option<GradientColors> {
        match self {
            GradientOutcome::Applied(colors) => Some(*colors),
            GradientOutcome::Unavailable => None,
        }
    }
}

impl Contact {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into().trim().to_string(),
            notes: String::new(),
            tags: Vec::new(),
            met_date: None,
            photo: None,
            created_at: Utc::now(),
            gradient_start_r: 0.0,
            gradient_start_g: 0.0,
            gradient_start_b: 0.0,
            gradient_end_r: 0.0,
            gradient_end_g: 0.0,
            gradient_end_b: 0.0,
            has_gradient: false,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn with_met_date(mut self, date: NaiveDate) -> Self {
        self.met_date = Some(date);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.set_tags(tags);
        self
    }

    /// Replace tags with a trimmed, lower-cased, sorted and de-duplicated set.
    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tags: Vec<String> = tags
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        tags.sort();
        tags.dedup();
        self.tags = tags;
    }

    pub fn add_tag(&mut self, tag: &str) {
        let mut tags = std::mem::take(&mut self.tags);
        tags.push(tag.to_string());
        self.set_tags(tags);
    }

    pub fn matches_tag(&self, tag: &str) -> bool {
        let tag = tag.trim().to_lowercase();
        self.tags.iter().any(|t| *t == tag)
    }

    /// Case-insensitive substring match on name, notes and tags.
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.name.to_lowercase().contains(&query)
            || self.notes.to_lowercase().contains(&query)
            || self.tags.iter().any(|t| t.contains(&query))
    }

    /// The stored gradient, if one was successfully derived.
    pub fn photo_gradient(&self) -> Option<GradientColors> {
        if !self.has_gradient {
            return None;
        }
        Some(GradientColors {
            base: Rgb::from_f32_triple([
                self.gradient_start_r,
                self.gradient_start_g,
                self.gradient_start_b,
            ]),
            gradient_end: Rgb::from_f32_triple([
                self.gradient_end_r,
                self.gradient_end_g,
                self.gradient_end_b,
            ]),
        })
    }

    /// Gradient to draw: the derived one, or the neutral fallback.
    pub fn background(&self) -> GradientColors {
        self.photo_gradient().unwrap_or_else(GradientColors::neutral)
    }

    pub fn clear_photo_gradient(&mut self) {
        self.gradient_start_r = 0.0;
        self.gradient_start_g = 0.0;
        self.gradient_start_b = 0.0;
        self.gradient_end_r = 0.0;
        self.gradient_end_g = 0.0;
        self.gradient_end_b = 0.0;
        self.has_gradient = false;
    }

    fn store_gradient(&mut self, colors: &GradientColors) {
        let [r, g, b] = colors.base.to_f32_triple();
        self.gradient_start_r = r;
        self.gradient_start_g = g;
        self.gradient_start_b = b;
        let [r, g, b] = colors.gradient_end.to_f32_triple();
        self.gradient_end_r = r;
        self.gradient_end_g = g;
        self.gradient_end_b = b;
        self.has_gradient = true;
    }
}

/// Derive colors from `image` and persist them onto `contact`.
pub fn update_contact_photo_gradient(contact: &mut Contact, image: &DynamicImage) -> GradientOutcome {
    apply_derived_gradient(contact, ColorExtractor::derive_colors(image))
}

/// Persist an already derived result. On `None` the flag is cleared and the
/// color fields are left as they were.
pub fn apply_derived_gradient(
    contact: &mut Contact,
    derived: Option<GradientColors>,
) -> GradientOutcome {
    match derived {
        Some(colors) => {
            contact.store_gradient(&colors);
            debug!("gradient for {} set to {}", contact.name, colors.base.to_hex());
            GradientOutcome::Applied(colors)
        }
        None => {
            contact.has_gradient = false;
            warn!("no usable photo colors for {}", contact.name);
            GradientOutcome::Unavailable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn red_photo() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, image::Rgb([255, 0, 0])))
    }

    #[test]
    fn update_persists_both_colors() {
        let mut contact = Contact::new("Ada");
        let outcome = update_contact_photo_gradient(&mut contact, &red_photo());
        let colors = outcome.colors().unwrap();

        assert!(contact.has_gradient);
        assert_eq!(contact.gradient_start_r, colors.base.r as f32);
        assert_eq!(contact.gradient_end_g, colors.gradient_end.g as f32);

        let stored = contact.photo_gradient().unwrap();
        assert!((stored.base.r - colors.base.r).abs() < 1e-6);
        assert!((stored.gradient_end.b - colors.gradient_end.b).abs() < 1e-6);
    }

    #[test]
    fn failed_update_clears_flag_only() {
        let mut contact = Contact::new("Ada");
        update_contact_photo_gradient(&mut contact, &red_photo());
        let previous_r = contact.gradient_start_r;

        let outcome = update_contact_photo_gradient(&mut contact, &DynamicImage::new_rgb8(0, 0));
        assert_eq!(outcome, GradientOutcome::Unavailable);
        assert!(!contact.has_gradient);
        assert_eq!(contact.gradient_start_r, previous_r);
        assert!(contact.photo_gradient().is_none());
        assert_eq!(contact.background(), GradientColors::neutral());
    }

    #[test]
    fn fresh_contact_has_no_gradient() {
        let contact = Contact::new("  Grace Hopper ");
        assert_eq!(contact.name, "Grace Hopper");
        assert!(contact.photo_gradient().is_none());
    }

    #[test]
    fn clear_resets_fields() {
        let mut contact = Contact::new("Ada");
        update_contact_photo_gradient(&mut contact, &red_photo());
        contact.clear_photo_gradient();
        assert!(!contact.has_gradient);
        assert_eq!(contact.gradient_start_r, 0.0);
        assert_eq!(contact.gradient_end_r, 0.0);
    }

    #[test]
    fn tags_are_normalized() {
        let mut contact = Contact::new("Linus").with_tags([" Work", "conference", "work", ""]);
        assert_eq!(contact.tags, vec!["conference", "work"]);
        contact.add_tag("Climbing");
        assert_eq!(contact.tags, vec!["climbing", "conference", "work"]);
        assert!(contact.matches_tag("WORK"));
        assert!(!contact.matches_tag("home"));
    }

    #[test]
    fn query_matches_name_notes_and_tags() {
        let contact = Contact::new("Margaret Hamilton")
            .with_notes("Met at the Apollo talk")
            .with_tags(["nasa"]);
        assert!(contact.matches_query("margaret"));
        assert!(contact.matches_query("APOLLO"));
        assert!(contact.matches_query("nas"));
        assert!(contact.matches_query(""));
        assert!(!contact.matches_query("turing"));
    }

    #[test]
    fn serde_round_trip_keeps_gradient() {
        let mut contact = Contact::new("Ada")
            .with_met_date(NaiveDate::from_ymd_opt(2024, 5, 17).unwrap());
        update_contact_photo_gradient(&mut contact, &red_photo());

        let json = serde_json::to_string(&contact).unwrap();
        let back: Contact = serde_json::from_str(&json).unwrap();
        assert_eq!(back, contact);
    }

    #[test]
    fn missing_gradient_fields_default() {
        let json = r#"{
            "id": "01890a5d-ac96-774b-bcce-b302099a8057",
            "name": "Old Record",
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let contact: Contact = serde_json::from_str(json).unwrap();
        assert!(!contact.has_gradient);
        assert!(contact.tags.is_empty());
        assert!(contact.photo.is_none());
    }
}
