//! Shared cryptography utilities
//!
//! This crate provides the cryptographic building blocks for PDF digital
//! signatures: DER assembly, CMS/CAdES SignedData containers, RFC 3161
//! timestamp requests, and the collaborator traits behind which digests,
//! raw signers, and revocation/timestamp clients are plugged in.

pub mod cms;
pub mod der;
pub mod digest;
pub mod external;
pub mod oids;
pub mod tsa;

pub use cms::{SignatureStandard, SignedDataBuilder};
pub use digest::{digest_stream, MessageDigest, Sha2Digest, StdDigestProvider};
pub use external::{CrlClient, ExternalDigest, ExternalSignature, OcspClient, TsaClient};

use thiserror::Error;

/// Errors surfaced by container assembly and the crypto collaborators.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("unsupported digest algorithm: {0}")]
    UnsupportedDigest(String),

    #[error("unsupported signature algorithm: {0} with {1}")]
    UnsupportedSignatureAlgorithm(String, String),

    #[error("ASN.1 structure error: {0}")]
    Asn1(String),

    #[error("empty certificate chain")]
    EmptyChain,

    #[error("timestamp error: {0}")]
    Tsa(String),

    #[error("signing error: {0}")]
    Signing(String),
}
