//! Shared fixtures: in-memory test PDFs, deterministic fake collaborators,
//! and byte-level assertions over signed output.
#![allow(dead_code)]

use lopdf::{dictionary, Dictionary, Document, Object};
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::io::Read;

use padsign_core::{
    CryptoError, ExternalSignature, ExternalSignatureContainer, MessageDigest, Sha2Digest,
    TsaClient,
};
use shared_crypto::der::{
    build_algorithm_identifier, build_bit_string, build_context_specific, build_integer,
    build_oid, build_sequence, build_set, build_utc_time, build_utf8_string,
};
use shared_crypto::oids;

/// Build a simple unsigned PDF with the given number of pages.
pub fn fixture_pdf(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids: Vec<Object> = Vec::new();
    for _ in 0..pages {
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );

    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("fixture serializes");
    bytes
}

/// A syntactically valid DER certificate chain (signer first). The key
/// material is fake; only the outer structure matters to the container.
pub fn test_chain() -> Vec<Vec<u8>> {
    vec![
        test_certificate(1, "Integration Signer"),
        test_certificate(2, "Integration CA"),
    ]
}

fn test_certificate(serial: u8, subject: &str) -> Vec<u8> {
    let name = |cn: &str| {
        let cn_oid = build_oid(&[0x55, 0x04, 0x03]);
        let attr = build_sequence(&[&cn_oid, &build_utf8_string(cn)]);
        build_sequence(&[&build_set(&attr)])
    };

    let validity = build_sequence(&[
        &build_utc_time("20240101000000Z"),
        &build_utc_time("20340101000000Z"),
    ]);
    let spki = build_sequence(&[
        &build_algorithm_identifier(oids::RSA_ENCRYPTION),
        &build_bit_string(&[0xAA; 16]),
    ]);

    let mut tbs = Vec::new();
    tbs.extend(build_context_specific(0, &build_integer(&[2])));
    tbs.extend(build_integer(&[serial]));
    tbs.extend(build_algorithm_identifier(oids::RSA_ENCRYPTION));
    tbs.extend(name("Integration CA"));
    tbs.extend(validity);
    tbs.extend(name(subject));
    tbs.extend(spki);
    let tbs_cert = build_sequence(&[&tbs]);

    let mut cert = Vec::new();
    cert.extend(&tbs_cert);
    cert.extend(build_algorithm_identifier(oids::RSA_ENCRYPTION));
    cert.extend(build_bit_string(&[0xBB; 32]));
    build_sequence(&[&cert])
}

/// Deterministic fake signer: the "signature" is SHA-256 of the attributes
/// doubled to 64 bytes.
pub struct FakeSignature;

impl ExternalSignature for FakeSignature {
    fn hash_algorithm(&self) -> &str {
        "SHA-256"
    }

    fn encryption_algorithm(&self) -> &str {
        "RSA"
    }

    fn sign(&self, attrs: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut hasher = Sha256::new();
        hasher.update(attrs);
        let digest = hasher.finalize();
        let mut signature = digest.to_vec();
        signature.extend_from_slice(&digest);
        Ok(signature)
    }
}

/// Container that reserves space without producing any bytes, leaving the
/// gap body zero-filled for deferred signing.
pub struct ZeroContainer;

impl ExternalSignatureContainer for ZeroContainer {
    fn modify_signing_dictionary(&self, dict: &mut Dictionary) {
        dict.set("Filter", "Adobe.PPKLite");
        dict.set("SubFilter", "adbe.pkcs7.detached");
    }

    fn sign(&self, content: &mut dyn Read) -> Result<Vec<u8>, CryptoError> {
        let mut sink = Vec::new();
        content
            .read_to_end(&mut sink)
            .map_err(|e| CryptoError::Signing(e.to_string()))?;
        Ok(Vec::new())
    }
}

/// Container returning fixed bytes and recording everything it was fed.
pub struct RecordingContainer {
    pub output: Vec<u8>,
    pub seen: RefCell<Vec<u8>>,
}

impl RecordingContainer {
    pub fn new(output: Vec<u8>) -> Self {
        Self {
            output,
            seen: RefCell::new(Vec::new()),
        }
    }
}

impl ExternalSignatureContainer for RecordingContainer {
    fn modify_signing_dictionary(&self, dict: &mut Dictionary) {
        dict.set("Filter", "Adobe.PPKLite");
        dict.set("SubFilter", "adbe.pkcs7.detached");
    }

    fn sign(&self, content: &mut dyn Read) -> Result<Vec<u8>, CryptoError> {
        let mut seen = self.seen.borrow_mut();
        content
            .read_to_end(&mut seen)
            .map_err(|e| CryptoError::Signing(e.to_string()))?;
        Ok(self.output.clone())
    }
}

/// Fake RFC 3161 authority answering with a canned token.
pub struct FakeTsa {
    pub estimate: usize,
    pub token: Vec<u8>,
}

impl TsaClient for FakeTsa {
    fn token_size_estimate(&self) -> usize {
        self.estimate
    }

    fn message_digest(&self) -> Box<dyn MessageDigest> {
        Box::new(Sha2Digest::new("SHA-256").expect("SHA-256 available"))
    }

    fn get_time_stamp_token(&self, imprint: &[u8]) -> Result<Vec<u8>, CryptoError> {
        assert!(!imprint.is_empty());
        Ok(self.token.clone())
    }
}

// --- byte-level assertions ---

pub fn find_last(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| &haystack[i..i + needle.len()] == needle)
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Parse the last `/ByteRange [a b c d]` array out of serialized bytes.
pub fn parse_byte_range(pdf: &[u8]) -> [i64; 4] {
    let pos = find_last(pdf, b"/ByteRange").expect("output carries /ByteRange");
    let open = pos + pdf[pos..]
        .iter()
        .position(|&b| b == b'[')
        .expect("ByteRange array opens");
    let close = open
        + pdf[open..]
            .iter()
            .position(|&b| b == b']')
            .expect("ByteRange array closes");

    let text = std::str::from_utf8(&pdf[open + 1..close]).expect("ASCII array body");
    let values: Vec<i64> = text
        .split_whitespace()
        .map(|t| t.parse().expect("integer entry"))
        .collect();
    assert_eq!(values.len(), 4, "four ByteRange entries");
    [values[0], values[1], values[2], values[3]]
}

/// The hex body of the `/Contents` value, delimiters excluded.
pub fn contents_hex_body<'a>(pdf: &'a [u8], byte_range: &[i64; 4]) -> &'a [u8] {
    assert_eq!(pdf[byte_range[1] as usize], b'<');
    assert_eq!(pdf[byte_range[2] as usize - 1], b'>');
    &pdf[byte_range[1] as usize + 1..byte_range[2] as usize - 1]
}

/// SHA-256 over the regions named by a ByteRange array.
pub fn digest_over_ranges(pdf: &[u8], byte_range: &[i64; 4]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(&pdf[byte_range[0] as usize..(byte_range[0] + byte_range[1]) as usize]);
    hasher.update(&pdf[byte_range[2] as usize..(byte_range[2] + byte_range[3]) as usize]);
    hasher.finalize().to_vec()
}
