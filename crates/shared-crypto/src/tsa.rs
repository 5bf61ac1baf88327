//! RFC 3161 Time-Stamp protocol plumbing
//!
//! This module builds TimeStampReq messages, checks TimeStampResp status,
//! and packages the returned TimeStampToken as the unsigned attribute that
//! carries it inside a CMS SignerInfo. The network round-trip itself lives
//! behind the `TsaClient` trait.

use crate::der::{
    build_algorithm_identifier, build_boolean, build_context_specific, build_integer,
    build_octet_string, build_oid, build_sequence, build_set, parse_length, parse_tlv,
};
use crate::{oids, CryptoError};

/// Build an RFC 3161 TimeStampReq for an already-computed message imprint.
///
/// # Arguments
/// * `imprint` - digest of the data to be timestamped
/// * `digest_oid` - OID content bytes of the imprint's digest algorithm
pub fn build_timestamp_request(imprint: &[u8], digest_oid: &[u8]) -> Vec<u8> {
    // TimeStampReq ::= SEQUENCE {
    //    version         INTEGER { v1(1) },
    //    messageImprint  MessageImprint,
    //    reqPolicy       TSAPolicyId OPTIONAL,
    //    nonce           INTEGER OPTIONAL,
    //    certReq         BOOLEAN DEFAULT FALSE,
    //    extensions      [0] IMPLICIT Extensions OPTIONAL
    // }
    let mut req_content = Vec::new();

    req_content.extend(build_integer(&[1]));
    req_content.extend(build_message_imprint(imprint, digest_oid));

    // nonce guards against replayed responses
    req_content.extend(build_integer(&generate_nonce()));

    // certReq: true, we want the TSA certificate in the response
    req_content.extend(build_boolean(true));

    build_sequence(&[&req_content])
}

/// MessageImprint ::= SEQUENCE { hashAlgorithm, hashedMessage }
fn build_message_imprint(imprint: &[u8], digest_oid: &[u8]) -> Vec<u8> {
    let alg_id = build_algorithm_identifier(digest_oid);
    let hashed_message = build_octet_string(imprint);
    build_sequence(&[&alg_id, &hashed_message])
}

/// Parse a TimeStampResp and extract the TimeStampToken.
///
/// The token is returned whole (it is a ContentInfo carrying SignedData)
/// so it can be embedded verbatim as an unsigned attribute value.
pub fn parse_timestamp_response(response: &[u8]) -> Result<Vec<u8>, CryptoError> {
    // TimeStampResp ::= SEQUENCE {
    //    status          PKIStatusInfo,
    //    timeStampToken  TimeStampToken OPTIONAL
    // }
    if response.is_empty() {
        return Err(CryptoError::Tsa("empty timestamp response".into()));
    }
    if response[0] != 0x30 {
        return Err(CryptoError::Tsa("expected SEQUENCE".into()));
    }

    let (content, _) = parse_tlv(response)?;

    if content.is_empty() || content[0] != 0x30 {
        return Err(CryptoError::Tsa("invalid PKIStatusInfo".into()));
    }
    let (status_info, remaining) = parse_tlv(content)?;

    if status_info.is_empty() || status_info[0] != 0x02 {
        return Err(CryptoError::Tsa("invalid status in PKIStatusInfo".into()));
    }
    let (status_value, _) = parse_tlv(status_info)?;

    // 0 = granted, 1 = grantedWithMods; everything else is a rejection
    let status = status_value.first().copied().unwrap_or(0xFF);
    if status > 1 {
        return Err(CryptoError::Tsa(format!(
            "timestamp request rejected with status {status}"
        )));
    }

    if remaining.is_empty() {
        return Err(CryptoError::Tsa("no TimeStampToken in response".into()));
    }

    Ok(remaining.to_vec())
}

/// Package a TimeStampToken as the id-smime-aa-timeStampToken attribute.
///
/// The result is a bare Attribute; the CMS builder wraps the attribute list
/// in the `[1]` unsignedAttrs tag.
pub fn timestamp_unsigned_attr(timestamp_token: &[u8]) -> Vec<u8> {
    let oid = build_oid(oids::TIMESTAMP_TOKEN);
    let value_set = build_set(timestamp_token);
    build_sequence(&[&oid, &value_set])
}

/// Structural sanity check on a timestamp token before embedding it.
pub fn validate_timestamp_token(token: &[u8]) -> Result<(), CryptoError> {
    if token.is_empty() {
        return Err(CryptoError::Tsa("empty timestamp token".into()));
    }
    if token[0] != 0x30 {
        return Err(CryptoError::Tsa("token is not a SEQUENCE".into()));
    }
    let (len, header_len) = parse_length(&token[1..])?;
    if token.len() < 1 + header_len + len {
        return Err(CryptoError::Tsa("timestamp token too short".into()));
    }
    Ok(())
}

fn generate_nonce() -> Vec<u8> {
    use std::time::{SystemTime, UNIX_EPOCH};

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    timestamp.to_be_bytes()[..8].to_vec()
}
