//! Shared PDF handling utilities
//!
//! This crate wraps `lopdf` with the pieces the signing core needs:
//! a document handle, the reserved-literal placeholder table used for
//! byte-exact in-place patching, and signature form field binding.

pub mod document;
pub mod fields;
pub mod placeholder;

pub use document::PdfDocument;
pub use fields::{Appearance, FieldLock, LockAction, SignatureFieldBinder};
pub use placeholder::{Placeholder, PlaceholderTable};

use thiserror::Error;

/// Errors raised by document handling and field binding.
#[derive(Debug, Error)]
pub enum PdfError {
    #[error(transparent)]
    Parse(#[from] lopdf::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("field names cannot contain a dot")]
    FieldNameContainsDot,

    #[error("field {0:?} is not a signature field")]
    FieldTypeNotSignature(String),

    #[error("field {0:?} is already signed")]
    FieldAlreadySigned(String),

    #[error("document has no page {0}")]
    MissingPage(u32),

    #[error("reserved length for {0:?} must be even and at least 4")]
    OddReservedLength(String),

    #[error("placeholder for {0:?} not found in serialized output")]
    PlaceholderNotFound(String),

    #[error("cannot serialize a {0} object in a reserved slot")]
    Unserializable(&'static str),
}
