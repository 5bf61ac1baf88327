//! Collaborator traits for pluggable signing back-ends
//!
//! The signing core never touches a private key, an OCSP responder, or a
//! timestamp authority directly. Each of those concerns sits behind one of
//! these traits so hardware tokens, remote services, and test doubles can
//! all be plugged in. Certificates cross these boundaries as DER bytes.

use crate::digest::MessageDigest;
use crate::CryptoError;

/// A raw signature primitive, typically wrapping a private key or an HSM.
pub trait ExternalSignature {
    /// Digest algorithm this signer expects, e.g. `SHA-256`.
    fn hash_algorithm(&self) -> &str;

    /// Encryption algorithm family, `RSA` or `ECDSA`.
    fn encryption_algorithm(&self) -> &str;

    /// Sign the DER-encoded authenticated attributes.
    fn sign(&self, attrs: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Provider of message digest implementations by algorithm name.
pub trait ExternalDigest {
    fn message_digest(&self, hash_algorithm: &str) -> Result<Box<dyn MessageDigest>, CryptoError>;
}

/// Fetches CRLs for a certificate.
pub trait CrlClient {
    /// Encoded CRLs for `cert`, or `None` when this client has nothing to
    /// offer for it. `url` overrides the distribution point when given.
    fn get_encoded(&self, cert: &[u8], url: Option<&str>) -> Option<Vec<Vec<u8>>>;
}

/// Fetches an OCSP response for a certificate/issuer pair.
pub trait OcspClient {
    fn get_encoded(&self, cert: &[u8], issuer: &[u8], url: Option<&str>) -> Option<Vec<u8>>;
}

/// An RFC 3161 time-stamping authority.
pub trait TsaClient {
    /// Upper bound for the token size, used to reserve signature space.
    fn token_size_estimate(&self) -> usize;

    /// Digest used to compute the message imprint.
    fn message_digest(&self) -> Box<dyn MessageDigest>;

    /// Request a timestamp token binding `imprint` to the TSA's clock.
    fn get_time_stamp_token(&self, imprint: &[u8]) -> Result<Vec<u8>, CryptoError>;
}
