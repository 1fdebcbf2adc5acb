//! # Bibmend Common Library
//!
//! Shared code for the bibmend tools:
//! - Bibliographic record model (entries, fields, authors)
//! - Text normalization used for matching and query building
//! - Common error types

pub mod error;
pub mod fields;
pub mod normalize;
pub mod record;

pub use error::{Error, Result};
pub use fields::FieldName;
pub use record::{Author, Entry, FieldMap};
