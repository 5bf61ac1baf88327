//! Error type for signing operations

use shared_crypto::CryptoError;
use shared_pdf::PdfError;
use thiserror::Error;

/// Everything that can go wrong while injecting a signature.
#[derive(Debug, Error)]
pub enum SignError {
    // state machine
    #[error("this signer instance is already closed")]
    AlreadyClosed,

    #[error("the document is already pre-closed")]
    AlreadyPreClosed,

    #[error("the document must be pre-closed first")]
    MustBePreClosed,

    #[error("no signature dictionary was set before pre-close")]
    NoCryptoDictionary,

    // space and layout
    #[error("signature container of {got} bytes exceeds the reserved {reserved} bytes")]
    NotEnoughSpace { reserved: usize, got: usize },

    #[error("reserved gap of {available} bytes cannot hold {got} signature bytes")]
    InsufficientSpace { available: usize, got: usize },

    #[error("reserved gap is not a multiple of two")]
    GapNotEven,

    #[error("only a single exclusion window starting at offset 0 is supported")]
    SingleExclusionOnly,

    #[error("exclusion windows overlap")]
    OverlappingExclusions,

    // close-phase dictionary mismatches
    #[error("key {0:?} did not reserve space in pre-close")]
    KeyNotReserved(String),

    #[error("serialized value for {key:?} is {got} bytes but only {reserved} were reserved")]
    ValueTooLarge {
        key: String,
        reserved: usize,
        got: usize,
    },

    #[error("update dictionary keys do not match the reserved keys")]
    UpdateKeysMismatch,

    // deferred signing
    #[error("signature {0:?} is not the last one; it does not cover the whole document")]
    NotLastSignature(String),

    #[error("document has no signature field named {0:?}")]
    FieldMissing(String),

    // wrapped collaborators
    #[error(transparent)]
    Pdf(#[from] PdfError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
