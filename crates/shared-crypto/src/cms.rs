//! CMS / CAdES SignedData container assembly
//!
//! Builds the detached PKCS#7 blob that lands in a PDF `/Contents` entry.
//! The two profiles differ only in their authenticated attributes: plain CMS
//! carries a signing-time attribute and, when revocation material is
//! available, Adobe's revocationInfoArchival; CAdES instead carries the ESS
//! signing-certificate-v2 attribute required by PAdES.
//!
//! The raw signature value is produced outside this module by an
//! `ExternalSignature`; certificates are handled as opaque DER.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::der::{
    build_algorithm_identifier, build_context_specific, build_enumerated, build_integer,
    build_octet_string, build_oid, build_sequence, build_set, build_tlv, build_utc_time,
    parse_tlv, parse_tlv_raw,
};
use crate::digest::digest_oid;
use crate::tsa::timestamp_unsigned_attr;
use crate::{oids, CryptoError};

/// The cryptographic profile of the signature container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureStandard {
    /// Cryptographic Message Syntax (`adbe.pkcs7.detached`).
    Cms,
    /// CMS Advanced Electronic Signatures (`ETSI.CAdES.detached`).
    Cades,
}

/// Assembles a detached SignedData container around an externally produced
/// signature value.
pub struct SignedDataBuilder<'a> {
    chain: &'a [Vec<u8>],
    digest_algorithm_oid: &'static [u8],
    signature_algorithm_oid: &'static [u8],
    standard: SignatureStandard,
}

impl<'a> SignedDataBuilder<'a> {
    /// # Arguments
    /// * `chain` - DER certificates, signer first
    /// * `hash_algorithm` - digest name, e.g. `SHA-256`
    /// * `encryption_algorithm` - `RSA` or `ECDSA`
    pub fn new(
        chain: &'a [Vec<u8>],
        hash_algorithm: &str,
        encryption_algorithm: &str,
        standard: SignatureStandard,
    ) -> Result<Self, CryptoError> {
        if chain.is_empty() {
            return Err(CryptoError::EmptyChain);
        }

        Ok(Self {
            chain,
            digest_algorithm_oid: digest_oid(hash_algorithm)?,
            signature_algorithm_oid: signature_algorithm_oid(encryption_algorithm, hash_algorithm)?,
            standard,
        })
    }

    /// Build the DER SET of authenticated attributes. These are the bytes
    /// handed to the external signer.
    ///
    /// `signing_time` is embedded for plain CMS only; CAdES relies on the
    /// (mandatory, timestamped) signing-certificate-v2 attribute instead.
    pub fn authenticated_attributes(
        &self,
        message_digest: &[u8],
        signing_time: Option<DateTime<Utc>>,
        ocsp: Option<&[u8]>,
        crls: Option<&[Vec<u8>]>,
    ) -> Vec<u8> {
        let mut attrs = Vec::new();

        attrs.extend(build_attribute(
            oids::CONTENT_TYPE,
            &build_oid(oids::DATA),
        ));

        if self.standard == SignatureStandard::Cms {
            if let Some(time) = signing_time {
                let utc = time.format("%Y%m%d%H%M%SZ").to_string();
                attrs.extend(build_attribute(oids::SIGNING_TIME, &build_utc_time(&utc)));
            }
        }

        attrs.extend(build_attribute(
            oids::MESSAGE_DIGEST,
            &build_octet_string(message_digest),
        ));

        let has_revocation = ocsp.is_some() || crls.map_or(false, |c| !c.is_empty());
        if self.standard == SignatureStandard::Cms && has_revocation {
            attrs.extend(build_attribute(
                oids::ADBE_REVOCATION,
                &revocation_archival(crls, ocsp),
            ));
        }

        if self.standard == SignatureStandard::Cades {
            attrs.extend(signing_certificate_v2(&self.chain[0]));
        }

        build_set(&attrs)
    }

    /// Assemble the final ContentInfo around the raw signature value.
    ///
    /// `signed_attrs` must be the exact bytes returned by
    /// [`authenticated_attributes`](Self::authenticated_attributes);
    /// `timestamp_token` is embedded as an unsigned attribute when present.
    pub fn build(
        &self,
        signed_attrs: &[u8],
        signature: &[u8],
        timestamp_token: Option<&[u8]>,
    ) -> Result<Vec<u8>, CryptoError> {
        let signer_info = self.signer_info(signed_attrs, signature, timestamp_token)?;

        let mut content = Vec::new();
        content.extend(build_integer(&[1]));
        content.extend(build_set(&build_algorithm_identifier(
            self.digest_algorithm_oid,
        )));
        // detached: EncapsulatedContentInfo carries no content
        content.extend(build_sequence(&[&build_oid(oids::DATA)]));

        let mut certs = Vec::new();
        for cert in self.chain {
            certs.extend(cert.iter().copied());
        }
        content.extend(build_context_specific(0, &certs));

        content.extend(build_set(&signer_info));

        let signed_data = build_sequence(&[&content]);
        let encoded = build_sequence(&[
            &build_oid(oids::SIGNED_DATA),
            &build_context_specific(0, &signed_data),
        ]);

        debug!(
            container_len = encoded.len(),
            certs = self.chain.len(),
            timestamped = timestamp_token.is_some(),
            "assembled SignedData container"
        );
        Ok(encoded)
    }

    fn signer_info(
        &self,
        signed_attrs: &[u8],
        signature: &[u8],
        timestamp_token: Option<&[u8]>,
    ) -> Result<Vec<u8>, CryptoError> {
        let mut content = Vec::new();

        content.extend(build_integer(&[1]));
        content.extend(issuer_and_serial(&self.chain[0])?);
        content.extend(build_algorithm_identifier(self.digest_algorithm_oid));

        // signedAttrs [0] IMPLICIT: re-tag the SET without re-encoding
        let (attrs_content, _) = parse_tlv(signed_attrs)?;
        content.extend(build_context_specific(0, attrs_content));

        content.extend(build_algorithm_identifier(self.signature_algorithm_oid));
        content.extend(build_octet_string(signature));

        if let Some(token) = timestamp_token {
            let attr = timestamp_unsigned_attr(token);
            content.extend(build_context_specific(1, &attr));
        }

        Ok(build_sequence(&[&content]))
    }
}

/// Attribute ::= SEQUENCE { attrType OID, attrValues SET OF AttributeValue }
fn build_attribute(oid: &[u8], value: &[u8]) -> Vec<u8> {
    let oid_encoded = build_oid(oid);
    let value_set = build_set(value);
    build_sequence(&[&oid_encoded, &value_set])
}

/// The ESS signing-certificate-v2 attribute over the signer certificate.
///
/// SigningCertificateV2 ::= SEQUENCE { certs SEQUENCE OF ESSCertIDv2, ... }
/// ESSCertIDv2 ::= SEQUENCE { hashAlgorithm DEFAULT sha256, certHash, ... }
fn signing_certificate_v2(certificate: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(certificate);
    let cert_hash: [u8; 32] = hasher.finalize().into();

    let hash_alg = build_algorithm_identifier(oids::SHA256);
    let hash_value = build_octet_string(&cert_hash);
    let ess_cert_id = build_sequence(&[&hash_alg, &hash_value]);

    let certs = build_sequence(&[&ess_cert_id]);
    let signing_cert = build_sequence(&[&certs]);

    build_attribute(oids::SIGNING_CERTIFICATE_V2, &signing_cert)
}

/// Adobe RevocationInfoArchival ::= SEQUENCE {
///     crls  [0] EXPLICIT SEQUENCE OF CRL OPTIONAL,
///     ocsps [1] EXPLICIT SEQUENCE OF OCSPResponse OPTIONAL }
fn revocation_archival(crls: Option<&[Vec<u8>]>, ocsp: Option<&[u8]>) -> Vec<u8> {
    let mut content = Vec::new();

    if let Some(crls) = crls {
        if !crls.is_empty() {
            let mut seq = Vec::new();
            for crl in crls {
                seq.extend(crl.iter().copied());
            }
            content.extend(build_context_specific(0, &build_tlv(0x30, &seq)));
        }
    }

    if let Some(ocsp) = ocsp {
        // Wrap the BasicOCSPResponse in a successful OCSPResponse
        let response_bytes = build_sequence(&[
            &build_oid(oids::OCSP_BASIC),
            &build_octet_string(ocsp),
        ]);
        let ocsp_response = build_sequence(&[
            &build_enumerated(0),
            &build_context_specific(0, &response_bytes),
        ]);
        content.extend(build_context_specific(1, &build_tlv(0x30, &ocsp_response)));
    }

    build_sequence(&[&content])
}

/// IssuerAndSerialNumber extracted positionally from a DER certificate.
fn issuer_and_serial(cert: &[u8]) -> Result<Vec<u8>, CryptoError> {
    // Certificate ::= SEQUENCE { tbsCertificate, signatureAlgorithm, signature }
    let (cert_content, _) = parse_tlv(cert)?;
    let (tbs_raw, _) = parse_tlv_raw(cert_content)?;
    let (tbs_content, _) = parse_tlv(tbs_raw)?;

    // TBSCertificate ::= SEQUENCE { [0] version OPTIONAL, serialNumber,
    //                               signature, issuer, ... }
    let mut rest = tbs_content;
    if rest.first() == Some(&0xA0) {
        let (_, after) = parse_tlv_raw(rest)?;
        rest = after;
    }

    let (serial_raw, after_serial) = parse_tlv_raw(rest)?;
    if serial_raw.first() != Some(&0x02) {
        return Err(CryptoError::Asn1("expected certificate serial number".into()));
    }

    let (_sig_alg, after_alg) = parse_tlv_raw(after_serial)?;
    let (issuer_raw, _) = parse_tlv_raw(after_alg)?;
    if issuer_raw.first() != Some(&0x30) {
        return Err(CryptoError::Asn1("expected issuer Name".into()));
    }

    Ok(build_sequence(&[issuer_raw, serial_raw]))
}

fn signature_algorithm_oid(
    encryption_algorithm: &str,
    hash_algorithm: &str,
) -> Result<&'static [u8], CryptoError> {
    let enc = encryption_algorithm.to_ascii_uppercase();
    let hash = hash_algorithm.to_ascii_uppercase().replace('-', "");
    match (enc.as_str(), hash.as_str()) {
        ("RSA", _) => Ok(oids::RSA_ENCRYPTION),
        ("ECDSA", "SHA256") => Ok(oids::ECDSA_SHA256),
        ("ECDSA", "SHA384") => Ok(oids::ECDSA_SHA384),
        ("ECDSA", "SHA512") => Ok(oids::ECDSA_SHA512),
        _ => Err(CryptoError::UnsupportedSignatureAlgorithm(
            encryption_algorithm.to_string(),
            hash_algorithm.to_string(),
        )),
    }
}

#[cfg(test)]
pub(crate) fn test_certificate(serial: u8, subject: &str) -> Vec<u8> {
    use crate::der::{build_bit_string, build_utf8_string};

    let name = |cn: &str| {
        let cn_oid = build_oid(&[0x55, 0x04, 0x03]);
        let cn_value = build_utf8_string(cn);
        let attr = build_sequence(&[&cn_oid, &cn_value]);
        let rdn = build_set(&attr);
        build_sequence(&[&rdn])
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
    tbs.extend(name("Test Issuing CA"));
    tbs.extend(validity);
    tbs.extend(name(subject));
    tbs.extend(spki);
    let tbs_cert = build_sequence(&[&tbs]);

    let mut cert = Vec::new();
    cert.extend(&tbs_cert);
    cert.extend(build_algorithm_identifier(oids::RSA_ENCRYPTION));
    cert.extend(crate::der::build_bit_string(&[0xBB; 32]));
    build_sequence(&[&cert])
}
