//! # directory-businesscard
//!
//! Business card normalization for the business directory.
//!
//! Participants publish business cards in one of several schema versions.
//! This crate reads a card in any supported version and converts it into the
//! version-independent [`NormalizedBusinessCard`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use directory_businesscard::BusinessCardNormalizer;
//!
//! let normalizer = BusinessCardNormalizer::new();
//! if let Some(card) = normalizer.parse(&payload, Some("UTF-8")) {
//!     println!("{} entities", card.entities.len());
//! }
//! ```

pub mod model;
pub mod normalizer;
pub mod promote;
pub mod schema;
pub mod xml;

pub use model::{BusinessEntity, Contact, EntityIdentifier, EntityName, NormalizedBusinessCard};
pub use normalizer::{BusinessCardNormalizer, NormalizeError};
pub use promote::PromotionError;
pub use schema::{CardVersion, StructureError};
pub use xml::{XmlElement, XmlError};
