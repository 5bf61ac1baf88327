//! Message digest abstraction over the SHA family
//!
//! Container assembly streams document bytes through a [`MessageDigest`]
//! rather than holding them in memory; the concrete algorithm is picked by
//! name so hardware-backed providers can substitute their own.

use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::io::Read;

use crate::external::ExternalDigest;
use crate::{oids, CryptoError};

/// An incrementally updatable message digest.
pub trait MessageDigest {
    /// Canonical algorithm name, e.g. `SHA-256`.
    fn algorithm(&self) -> &str;

    fn update(&mut self, data: &[u8]);

    /// Finish the computation and return the digest value.
    fn finish(&mut self) -> Vec<u8>;
}

/// Software digest backed by the `sha1`/`sha2` crates.
pub enum Sha2Digest {
    Sha1(Sha1),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl Sha2Digest {
    /// Create a digest for `algorithm`. Both `SHA-256` and `SHA256`
    /// spellings are accepted.
    pub fn new(algorithm: &str) -> Result<Self, CryptoError> {
        match normalize(algorithm).as_str() {
            "SHA-1" => Ok(Sha2Digest::Sha1(Sha1::new())),
            "SHA-256" => Ok(Sha2Digest::Sha256(Sha256::new())),
            "SHA-384" => Ok(Sha2Digest::Sha384(Sha384::new())),
            "SHA-512" => Ok(Sha2Digest::Sha512(Sha512::new())),
            other => Err(CryptoError::UnsupportedDigest(other.to_string())),
        }
    }
}

impl MessageDigest for Sha2Digest {
    fn algorithm(&self) -> &str {
        match self {
            Sha2Digest::Sha1(_) => "SHA-1",
            Sha2Digest::Sha256(_) => "SHA-256",
            Sha2Digest::Sha384(_) => "SHA-384",
            Sha2Digest::Sha512(_) => "SHA-512",
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Sha2Digest::Sha1(h) => Digest::update(h, data),
            Sha2Digest::Sha256(h) => Digest::update(h, data),
            Sha2Digest::Sha384(h) => Digest::update(h, data),
            Sha2Digest::Sha512(h) => Digest::update(h, data),
        }
    }

    fn finish(&mut self) -> Vec<u8> {
        match self {
            Sha2Digest::Sha1(h) => Digest::finalize_reset(h).to_vec(),
            Sha2Digest::Sha256(h) => Digest::finalize_reset(h).to_vec(),
            Sha2Digest::Sha384(h) => Digest::finalize_reset(h).to_vec(),
            Sha2Digest::Sha512(h) => Digest::finalize_reset(h).to_vec(),
        }
    }
}

/// Default [`ExternalDigest`] provider using the software SHA implementations.
pub struct StdDigestProvider;

impl ExternalDigest for StdDigestProvider {
    fn message_digest(&self, hash_algorithm: &str) -> Result<Box<dyn MessageDigest>, CryptoError> {
        Ok(Box::new(Sha2Digest::new(hash_algorithm)?))
    }
}

/// Drain `reader` through `digest` in 4 KiB chunks and return the digest value.
pub fn digest_stream(
    reader: &mut dyn Read,
    digest: &mut dyn MessageDigest,
) -> std::io::Result<Vec<u8>> {
    let mut buf = [0u8; 4096];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        digest.update(&buf[..n]);
    }
    Ok(digest.finish())
}

/// DER content bytes of the OID for a digest algorithm name.
pub fn digest_oid(algorithm: &str) -> Result<&'static [u8], CryptoError> {
    match normalize(algorithm).as_str() {
        "SHA-1" => Ok(oids::SHA1),
        "SHA-256" => Ok(oids::SHA256),
        "SHA-384" => Ok(oids::SHA384),
        "SHA-512" => Ok(oids::SHA512),
        other => Err(CryptoError::UnsupportedDigest(other.to_string())),
    }
}

fn normalize(algorithm: &str) -> String {
    let upper = algorithm.to_ascii_uppercase();
    match upper.as_str() {
        "SHA1" => "SHA-1".to_string(),
        "SHA256" => "SHA-256".to_string(),
        "SHA384" => "SHA-384".to_string(),
        "SHA512" => "SHA-512".to_string(),
        _ => upper,
    }
}
