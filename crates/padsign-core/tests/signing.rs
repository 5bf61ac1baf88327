//! End-to-end signing scenarios over in-memory fixture documents.

mod common;

use chrono::TimeZone;
use chrono::Utc;
use lopdf::{Dictionary, Document, Object, StringFormat};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use common::*;
use padsign_core::{
    CertificationLevel, PdfSigner, SignError, SignatureDictionary, SignatureStandard,
    StdDigestProvider,
};
use shared_pdf::PdfError;

fn sign_date() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 20, 10, 0, 0).unwrap()
}

#[test]
fn fresh_cms_signature_lays_out_byte_range() {
    let pdf = fixture_pdf(10);
    let mut out = Vec::new();
    {
        let mut signer = PdfSigner::new(&pdf, &mut out).unwrap();
        signer.set_sign_date(sign_date());
        assert_eq!(signer.field_name(), "Signature1");
        signer
            .sign_detached(
                &StdDigestProvider,
                &FakeSignature,
                &test_chain(),
                &[],
                None,
                None,
                8192,
                SignatureStandard::Cms,
            )
            .unwrap();
    }

    let byte_range = parse_byte_range(&out);
    assert_eq!(byte_range[0], 0);
    assert_eq!(byte_range[2] - byte_range[1], 16386);
    assert_eq!(byte_range[3], out.len() as i64 - byte_range[2]);

    let body = contents_hex_body(&out, &byte_range);
    assert_eq!(body.len(), 16384);
    assert!(body.iter().all(|b| b.is_ascii_hexdigit()));
    // the padding tail beyond the container is ASCII zeros
    assert!(body.ends_with(b"0000"));

    assert!(contains(&out, b"adbe.pkcs7.detached"));
    assert!(contains(&out, b"(Signature1)"));

    // the emitted file parses and carries the form wiring
    let doc = Document::load_mem(&out).unwrap();
    let catalog = doc.catalog().unwrap();
    let acro_id = catalog.get(b"AcroForm").unwrap().as_reference().unwrap();
    let acroform = doc.get_dictionary(acro_id).unwrap();
    assert_eq!(acroform.get(b"SigFlags").unwrap().as_i64().unwrap(), 3);
    assert_eq!(
        acroform.get(b"Fields").unwrap().as_array().unwrap().len(),
        1
    );
}

#[test]
fn byte_range_reservation_is_80_bytes() {
    let pdf = fixture_pdf(1);
    let mut out = Vec::new();
    {
        let mut signer = PdfSigner::new(&pdf, &mut out).unwrap();
        signer
            .sign_detached(
                &StdDigestProvider,
                &FakeSignature,
                &test_chain(),
                &[],
                None,
                None,
                1024,
                SignatureStandard::Cms,
            )
            .unwrap();
    }

    let pos = find_last(&out, b"/ByteRange").unwrap();
    let open = pos + out[pos..].iter().position(|&b| b == b'[').unwrap();
    let window = &out[open..open + 80];
    let close = window.iter().position(|&b| b == b']').unwrap();
    assert!(window[close + 1..].iter().all(|&b| b == b' '));
}

#[test]
fn estimated_size_defaults_to_8192() {
    let pdf = fixture_pdf(2);
    let mut out = Vec::new();
    {
        let mut signer = PdfSigner::new(&pdf, &mut out).unwrap();
        signer
            .sign_detached(
                &StdDigestProvider,
                &FakeSignature,
                &test_chain(),
                &[],
                None,
                None,
                0,
                SignatureStandard::Cms,
            )
            .unwrap();
    }

    let byte_range = parse_byte_range(&out);
    assert_eq!(byte_range[2] - byte_range[1], 8192 * 2 + 2);
}

#[test]
fn cades_signature_registers_developer_extension() {
    let pdf = fixture_pdf(3);
    let token = vec![0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02];
    let tsa = FakeTsa {
        estimate: 4096,
        token: token.clone(),
    };

    let mut out = Vec::new();
    {
        let mut signer = PdfSigner::new(&pdf, &mut out).unwrap();
        signer.set_sign_date(sign_date());
        signer
            .sign_detached(
                &StdDigestProvider,
                &FakeSignature,
                &test_chain(),
                &[],
                None,
                Some(&tsa),
                8192,
                SignatureStandard::Cades,
            )
            .unwrap();
    }

    assert!(contains(&out, b"ETSI.CAdES.detached"));
    // the timestamp token travels inside the hex-encoded container
    let byte_range = parse_byte_range(&out);
    let body = contents_hex_body(&out, &byte_range);
    assert!(contains(body, hex::encode(&token).as_bytes()));

    let doc = Document::load_mem(&out).unwrap();
    let catalog = doc.catalog().unwrap();
    let extensions = catalog.get(b"Extensions").unwrap().as_dict().unwrap();
    let esic = extensions.get(b"ESIC").unwrap().as_dict().unwrap();
    assert_eq!(esic.get(b"ExtensionLevel").unwrap().as_i64().unwrap(), 2);
    assert_eq!(
        esic.get(b"BaseVersion").unwrap(),
        &Object::Name(b"1.7".to_vec())
    );
}

#[test]
fn certifying_signature_writes_docmdp_and_perms() {
    let pdf = fixture_pdf(1);
    let mut out = Vec::new();
    {
        let mut signer = PdfSigner::new(&pdf, &mut out).unwrap();
        signer.set_certification_level(CertificationLevel::NoChangesAllowed);
        signer
            .sign_detached(
                &StdDigestProvider,
                &FakeSignature,
                &test_chain(),
                &[],
                None,
                None,
                8192,
                SignatureStandard::Cms,
            )
            .unwrap();
    }

    let doc = Document::load_mem(&out).unwrap();
    let catalog = doc.catalog().unwrap();

    let acro_id = catalog.get(b"AcroForm").unwrap().as_reference().unwrap();
    let acroform = doc.get_dictionary(acro_id).unwrap();
    let fields = acroform.get(b"Fields").unwrap().as_array().unwrap();
    let field = doc
        .get_dictionary(fields[0].as_reference().unwrap())
        .unwrap();
    let sig_id = field.get(b"V").unwrap().as_reference().unwrap();
    let signature = doc.get_dictionary(sig_id).unwrap();

    let references = signature.get(b"Reference").unwrap().as_array().unwrap();
    assert_eq!(references.len(), 1);
    let reference = references[0].as_dict().unwrap();
    assert_eq!(
        reference.get(b"TransformMethod").unwrap(),
        &Object::Name(b"DocMDP".to_vec())
    );
    let params = reference
        .get(b"TransformParams")
        .unwrap()
        .as_dict()
        .unwrap();
    assert_eq!(params.get(b"P").unwrap().as_i64().unwrap(), 1);

    let perms = catalog.get(b"Perms").unwrap().as_dict().unwrap();
    assert_eq!(
        perms.get(b"DocMDP").unwrap().as_reference().unwrap(),
        sig_id
    );
}

#[test]
fn document_timestamp_has_doctimestamp_shape() {
    let pdf = fixture_pdf(1);
    let token = vec![0x30, 0x08, 0x02, 0x01, 0x07, 0x04, 0x03, 0xAA, 0xBB, 0xCC];
    let tsa = FakeTsa {
        estimate: 4096,
        token: token.clone(),
    };

    let mut out = Vec::new();
    {
        let mut signer = PdfSigner::new(&pdf, &mut out).unwrap();
        signer.set_reason("should not appear");
        signer.timestamp(&tsa, None).unwrap();
    }

    assert!(contains(&out, b"DocTimeStamp"));
    assert!(contains(&out, b"ETSI.RFC3161"));
    assert!(!contains(&out, b"/Reason"));

    let byte_range = parse_byte_range(&out);
    assert_eq!(byte_range[2] - byte_range[1], 4096 * 2 + 2);
    let body = contents_hex_body(&out, &byte_range);
    assert!(body.starts_with(hex::encode(&token).as_bytes()));
    assert!(body[token.len() * 2..].iter().all(|&b| b == b'0'));

    let doc = Document::load_mem(&out).unwrap();
    let catalog = doc.catalog().unwrap();
    let extensions = catalog.get(b"Extensions").unwrap().as_dict().unwrap();
    let esic = extensions.get(b"ESIC").unwrap().as_dict().unwrap();
    assert_eq!(esic.get(b"ExtensionLevel").unwrap().as_i64().unwrap(), 5);
}

#[test]
fn over_budget_container_leaves_sink_untouched() {
    let pdf = fixture_pdf(1);
    let container = RecordingContainer::new(vec![0xCD; 300]);

    let mut out = Vec::new();
    {
        let mut signer = PdfSigner::new(&pdf, &mut out).unwrap();
        let err = signer
            .sign_external_container(&container, 256)
            .unwrap_err();
        assert!(matches!(
            err,
            SignError::NotEnoughSpace {
                reserved: 256,
                got: 300
            }
        ));
    }

    assert!(out.is_empty());
}

#[test]
fn second_signing_attempt_fails_closed() {
    let pdf = fixture_pdf(1);
    let mut out = Vec::new();
    let mut signer = PdfSigner::new(&pdf, &mut out).unwrap();
    signer
        .sign_detached(
            &StdDigestProvider,
            &FakeSignature,
            &test_chain(),
            &[],
            None,
            None,
            4096,
            SignatureStandard::Cms,
        )
        .unwrap();

    let err = signer
        .sign_detached(
            &StdDigestProvider,
            &FakeSignature,
            &test_chain(),
            &[],
            None,
            None,
            4096,
            SignatureStandard::Cms,
        )
        .unwrap_err();
    assert!(matches!(err, SignError::AlreadyClosed));

    let tsa = FakeTsa {
        estimate: 1024,
        token: vec![0x30, 0x00],
    };
    assert!(matches!(
        signer.timestamp(&tsa, None).unwrap_err(),
        SignError::AlreadyClosed
    ));
}

#[test]
fn state_machine_rejects_out_of_order_calls() {
    let pdf = fixture_pdf(1);

    // close before pre-close
    let mut out = Vec::new();
    let mut signer = PdfSigner::new(&pdf, &mut out).unwrap();
    assert!(matches!(
        signer.close(Dictionary::new()).unwrap_err(),
        SignError::MustBePreClosed
    ));
    assert!(matches!(
        signer.range_stream().unwrap_err(),
        SignError::MustBePreClosed
    ));

    // pre-close without a signature dictionary
    let mut exclusions = BTreeMap::new();
    exclusions.insert("Contents".to_string(), 100);
    assert!(matches!(
        signer.pre_close(&exclusions).unwrap_err(),
        SignError::NoCryptoDictionary
    ));
}

#[test]
fn pre_close_twice_fails() {
    let pdf = fixture_pdf(1);
    let mut out = Vec::new();
    let mut signer = PdfSigner::new(&pdf, &mut out).unwrap();
    signer.set_signature_dictionary(SignatureDictionary::external().into_dictionary());

    let mut exclusions = BTreeMap::new();
    exclusions.insert("Contents".to_string(), 100);
    signer.pre_close(&exclusions).unwrap();

    assert!(matches!(
        signer.pre_close(&exclusions).unwrap_err(),
        SignError::AlreadyPreClosed
    ));
}

#[test]
fn close_validates_update_keys() {
    let pdf = fixture_pdf(1);
    let mut exclusions = BTreeMap::new();
    exclusions.insert("Contents".to_string(), 100);

    // empty update: the reserved key is missing
    let mut out = Vec::new();
    let mut signer = PdfSigner::new(&pdf, &mut out).unwrap();
    signer.set_signature_dictionary(SignatureDictionary::external().into_dictionary());
    signer.pre_close(&exclusions).unwrap();
    assert!(matches!(
        signer.close(Dictionary::new()).unwrap_err(),
        SignError::UpdateKeysMismatch
    ));

    // unknown key
    let mut out = Vec::new();
    let mut signer = PdfSigner::new(&pdf, &mut out).unwrap();
    signer.set_signature_dictionary(SignatureDictionary::external().into_dictionary());
    signer.pre_close(&exclusions).unwrap();
    let mut update = Dictionary::new();
    update.set("Unexpected", Object::Integer(1));
    assert!(matches!(
        signer.close(update).unwrap_err(),
        SignError::KeyNotReserved(_)
    ));

    // value wider than the reservation
    let mut out = Vec::new();
    let mut signer = PdfSigner::new(&pdf, &mut out).unwrap();
    signer.set_signature_dictionary(SignatureDictionary::external().into_dictionary());
    signer.pre_close(&exclusions).unwrap();
    let mut update = Dictionary::new();
    update.set(
        "Contents",
        Object::String(vec![0u8; 60], StringFormat::Hexadecimal),
    );
    assert!(matches!(
        signer.close(update).unwrap_err(),
        SignError::ValueTooLarge { .. }
    ));
}

#[test]
fn staged_close_patches_reserved_slot() {
    let pdf = fixture_pdf(1);
    let mut out = Vec::new();
    {
        let mut signer = PdfSigner::new(&pdf, &mut out).unwrap();
        signer.set_signature_dictionary(SignatureDictionary::external().into_dictionary());

        let mut exclusions = BTreeMap::new();
        exclusions.insert("Contents".to_string(), 100);
        signer.pre_close(&exclusions).unwrap();

        let mut update = Dictionary::new();
        update.set(
            "Contents",
            Object::String(vec![0xEE; 49], StringFormat::Hexadecimal),
        );
        signer.close(update).unwrap();
    }

    let byte_range = parse_byte_range(&out);
    assert_eq!(byte_range[2] - byte_range[1], 100);
    let body = contents_hex_body(&out, &byte_range);
    assert_eq!(body, hex::encode(vec![0xEE; 49]).as_bytes());
}

#[test]
fn field_name_with_dot_rejected() {
    let pdf = fixture_pdf(1);
    let mut out = Vec::new();
    let mut signer = PdfSigner::new(&pdf, &mut out).unwrap();
    assert!(matches!(
        signer.set_field_name("form.signature").unwrap_err(),
        SignError::Pdf(PdfError::FieldNameContainsDot)
    ));
}

#[test]
fn signing_a_signed_field_fails() {
    let pdf = fixture_pdf(1);
    let mut signed = Vec::new();
    {
        let mut signer = PdfSigner::new(&pdf, &mut signed).unwrap();
        signer
            .sign_detached(
                &StdDigestProvider,
                &FakeSignature,
                &test_chain(),
                &[],
                None,
                None,
                4096,
                SignatureStandard::Cms,
            )
            .unwrap();
    }

    let mut out = Vec::new();
    let mut signer = PdfSigner::new(&signed, &mut out).unwrap();
    // the taken name is skipped by default
    assert_eq!(signer.field_name(), "Signature2");

    signer.set_field_name("Signature1").unwrap();
    let err = signer
        .sign_detached(
            &StdDigestProvider,
            &FakeSignature,
            &test_chain(),
            &[],
            None,
            None,
            4096,
            SignatureStandard::Cms,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        SignError::Pdf(PdfError::FieldAlreadySigned(_))
    ));
}

#[test]
fn external_container_digest_matches_final_bytes() {
    let pdf = fixture_pdf(4);
    let container = RecordingContainer::new(vec![0x5A; 200]);

    let mut out = Vec::new();
    {
        let mut signer = PdfSigner::new(&pdf, &mut out).unwrap();
        signer.sign_external_container(&container, 512).unwrap();
    }

    // recomputing the digest over the emitted /ByteRange regions gives the
    // digest of exactly the bytes the container consumed
    let byte_range = parse_byte_range(&out);
    let recomputed = digest_over_ranges(&out, &byte_range);

    let seen = container.seen.borrow();
    let mut hasher = Sha256::new();
    hasher.update(&seen[..]);
    let original = hasher.finalize().to_vec();

    assert_eq!(recomputed, original);
    assert_eq!(
        seen.len() as i64,
        byte_range[1] + byte_range[3],
        "container saw every covered byte"
    );
}

#[test]
fn temp_file_backing_matches_memory_backing() {
    let pdf = fixture_pdf(2);
    let date = sign_date();

    let mut from_memory = Vec::new();
    {
        let mut signer = PdfSigner::new(&pdf, &mut from_memory).unwrap();
        signer.set_sign_date(date);
        signer
            .sign_detached(
                &StdDigestProvider,
                &FakeSignature,
                &test_chain(),
                &[],
                None,
                None,
                2048,
                SignatureStandard::Cms,
            )
            .unwrap();
    }

    let mut from_file = Vec::new();
    {
        let mut signer = PdfSigner::with_temp_file(&pdf, &mut from_file).unwrap();
        signer.set_sign_date(date);
        signer
            .sign_detached(
                &StdDigestProvider,
                &FakeSignature,
                &test_chain(),
                &[],
                None,
                None,
                2048,
                SignatureStandard::Cms,
            )
            .unwrap();
    }

    assert_eq!(from_memory, from_file);
}

#[test]
fn field_lock_produces_fieldmdp_reference() {
    let pdf = fixture_pdf(1);
    let mut out = Vec::new();
    {
        let mut signer = PdfSigner::new(&pdf, &mut out).unwrap();
        signer.set_field_lock(padsign_core::FieldLock::include(vec!["Amount".into()]));
        signer
            .sign_detached(
                &StdDigestProvider,
                &FakeSignature,
                &test_chain(),
                &[],
                None,
                None,
                4096,
                SignatureStandard::Cms,
            )
            .unwrap();
    }

    let doc = Document::load_mem(&out).unwrap();
    let catalog = doc.catalog().unwrap();
    let acro_id = catalog.get(b"AcroForm").unwrap().as_reference().unwrap();
    let acroform = doc.get_dictionary(acro_id).unwrap();
    let fields = acroform.get(b"Fields").unwrap().as_array().unwrap();
    let field = doc
        .get_dictionary(fields[0].as_reference().unwrap())
        .unwrap();
    assert!(field.has(b"Lock"));

    let sig_id = field.get(b"V").unwrap().as_reference().unwrap();
    let signature = doc.get_dictionary(sig_id).unwrap();
    let references = signature.get(b"Reference").unwrap().as_array().unwrap();
    let reference = references[0].as_dict().unwrap();
    assert_eq!(
        reference.get(b"TransformMethod").unwrap(),
        &Object::Name(b"FieldMDP".to_vec())
    );
}
