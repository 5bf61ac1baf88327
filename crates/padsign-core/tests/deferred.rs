//! Deferred signing: reserve the gap first, inject the container later.

mod common;

use common::*;
use padsign_core::{sign_deferred, PdfSigner, SignError};
use sha2::{Digest, Sha256};

/// Reserve a zero-filled signature gap of `estimated` container bytes.
fn reserved_pdf(pages: usize, estimated: usize) -> Vec<u8> {
    let pdf = fixture_pdf(pages);
    let mut out = Vec::new();
    {
        let mut signer = PdfSigner::new(&pdf, &mut out).unwrap();
        signer.sign_external_container(&ZeroContainer, estimated).unwrap();
    }
    out
}

#[test]
fn deferred_injection_replaces_only_the_gap_body() {
    let reserved = reserved_pdf(2, 512);
    let byte_range = parse_byte_range(&reserved);

    // the reserved body is all ASCII zeros
    let body = contents_hex_body(&reserved, &byte_range);
    assert!(body.iter().all(|&b| b == b'0'));

    let container = RecordingContainer::new(vec![0xAB; 300]);
    let mut signed = Vec::new();
    sign_deferred(&reserved, "Signature1", &mut signed, &container).unwrap();

    assert_eq!(signed.len(), reserved.len());

    // bytes outside the gap are untouched, delimiters included
    let gap_start = byte_range[1] as usize;
    let gap_end = byte_range[2] as usize;
    assert_eq!(&signed[..gap_start + 1], &reserved[..gap_start + 1]);
    assert_eq!(&signed[gap_end - 1..], &reserved[gap_end - 1..]);

    // the body is the hex container followed by zero padding
    let body = &signed[gap_start + 1..gap_end - 1];
    let expected_hex = hex::encode(vec![0xAB; 300]);
    assert!(body.starts_with(expected_hex.as_bytes()));
    assert!(body[expected_hex.len()..].iter().all(|&b| b == b'0'));

    // the container consumed exactly the covered regions
    let seen = container.seen.borrow();
    let mut expected = reserved[..gap_start].to_vec();
    expected.extend(&reserved[gap_end..]);
    assert_eq!(&*seen, &expected);
}

#[test]
fn deferred_injection_is_idempotent() {
    let reserved = reserved_pdf(1, 256);

    let mut first = Vec::new();
    sign_deferred(
        &reserved,
        "Signature1",
        &mut first,
        &RecordingContainer::new(vec![0x11; 100]),
    )
    .unwrap();

    let mut second = Vec::new();
    sign_deferred(
        &reserved,
        "Signature1",
        &mut second,
        &RecordingContainer::new(vec![0x11; 100]),
    )
    .unwrap();

    assert_eq!(first, second);
}

#[test]
fn deferred_digest_matches_recomputation() {
    let reserved = reserved_pdf(3, 400);

    let container = RecordingContainer::new(vec![0x77; 128]);
    let mut signed = Vec::new();
    sign_deferred(&reserved, "Signature1", &mut signed, &container).unwrap();

    // hashing the /ByteRange regions of the final file reproduces the
    // digest of what the container was fed
    let byte_range = parse_byte_range(&signed);
    let recomputed = digest_over_ranges(&signed, &byte_range);

    let seen = container.seen.borrow();
    let mut hasher = Sha256::new();
    hasher.update(&seen[..]);
    assert_eq!(recomputed, hasher.finalize().to_vec());
}

#[test]
fn deferred_rejects_oversized_container() {
    let reserved = reserved_pdf(1, 64);

    let mut out = Vec::new();
    let err = sign_deferred(
        &reserved,
        "Signature1",
        &mut out,
        &RecordingContainer::new(vec![0xFF; 65]),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        SignError::InsufficientSpace {
            available: 64,
            got: 65
        }
    ));
}

#[test]
fn deferred_rejects_unknown_field() {
    let reserved = reserved_pdf(1, 64);

    let mut out = Vec::new();
    let err = sign_deferred(
        &reserved,
        "Nonexistent",
        &mut out,
        &RecordingContainer::new(Vec::new()),
    )
    .unwrap_err();

    assert!(matches!(err, SignError::FieldMissing(_)));
    assert!(out.is_empty());
}

#[test]
fn deferred_rejects_unsigned_document() {
    let plain = fixture_pdf(1);

    let mut out = Vec::new();
    let err = sign_deferred(
        &plain,
        "Signature1",
        &mut out,
        &RecordingContainer::new(Vec::new()),
    )
    .unwrap_err();

    assert!(matches!(err, SignError::FieldMissing(_)));
}
