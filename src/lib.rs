pub mod color_extractor;
pub mod config;
pub mod contact;
pub mod storage;
pub mod store;

pub use color_extractor::{ColorExtractor, GradientColors, Rgb};
pub use contact::{update_contact_photo_gradient, Contact, GradientOutcome};
pub use store::ContactStore;
