//! PDF digital signature injection
//!
//! Produces ISO 32000 / PAdES signatures by incremental byte-exact mutation:
//! space for the signature is reserved as placeholder literals, the file is
//! serialized, the bytes outside the reserved gap are hashed, and the gap is
//! overwritten in place with the finished container. Signing back-ends,
//! digests, and revocation/timestamp clients plug in behind the traits
//! re-exported here.
//!
//! ```no_run
//! use padsign_core::{PdfSigner, SignatureStandard, StdDigestProvider};
//! # fn example(pdf: &[u8], signer: &dyn padsign_core::ExternalSignature,
//! #            chain: &[Vec<u8>]) -> Result<(), padsign_core::SignError> {
//! let mut out = Vec::new();
//! let mut pdf_signer = PdfSigner::new(pdf, &mut out)?;
//! pdf_signer.set_reason("Approved");
//! pdf_signer.sign_detached(
//!     &StdDigestProvider,
//!     signer,
//!     chain,
//!     &[],
//!     None,
//!     None,
//!     0,
//!     SignatureStandard::Cms,
//! )?;
//! # Ok(())
//! # }
//! ```

pub mod backing;
pub mod deferred;
pub mod dict;
pub mod error;
pub mod ranges;
pub mod signer;
pub mod stream;

pub use deferred::sign_deferred;
pub use dict::{
    CertificationLevel, SignatureDictionary, FILTER_ADOBE_PPKLITE, SUBFILTER_CADES,
    SUBFILTER_CMS, SUBFILTER_RFC3161,
};
pub use error::SignError;
pub use signer::{ExternalSignatureContainer, PdfSigner, SignatureEvent};

// collaborator traits and helpers from the shared crates
pub use shared_crypto::{
    CrlClient, CryptoError, ExternalDigest, ExternalSignature, MessageDigest, OcspClient,
    SignatureStandard, Sha2Digest, StdDigestProvider, TsaClient,
};
pub use shared_pdf::{Appearance, FieldLock, LockAction};
