//! Minimal DER encoding and decoding helpers
//!
//! The CMS and RFC 3161 structures assembled in this crate are small and
//! fixed in shape, so they are built from these TLV primitives directly
//! rather than through an ASN.1 framework.

use crate::CryptoError;

/// Encode a tag-length-value triple. Supports lengths up to 2^24 - 1.
pub fn build_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut result = vec![tag];
    let len = content.len();

    if len < 128 {
        result.push(len as u8);
    } else if len < 256 {
        result.push(0x81);
        result.push(len as u8);
    } else if len < 65536 {
        result.push(0x82);
        result.push((len >> 8) as u8);
        result.push(len as u8);
    } else {
        result.push(0x83);
        result.push((len >> 16) as u8);
        result.push((len >> 8) as u8);
        result.push(len as u8);
    }

    result.extend(content);
    result
}

pub fn build_sequence(items: &[&[u8]]) -> Vec<u8> {
    let content: Vec<u8> = items.iter().flat_map(|i| i.iter().copied()).collect();
    build_tlv(0x30, &content)
}

pub fn build_set(content: &[u8]) -> Vec<u8> {
    build_tlv(0x31, content)
}

pub fn build_oid(oid_bytes: &[u8]) -> Vec<u8> {
    build_tlv(0x06, oid_bytes)
}

/// Encode an INTEGER, padding with a leading zero when the high bit is set.
pub fn build_integer(value: &[u8]) -> Vec<u8> {
    if !value.is_empty() && value[0] & 0x80 != 0 {
        let mut padded = vec![0];
        padded.extend(value);
        build_tlv(0x02, &padded)
    } else {
        build_tlv(0x02, value)
    }
}

pub fn build_enumerated(value: u8) -> Vec<u8> {
    build_tlv(0x0A, &[value])
}

pub fn build_octet_string(content: &[u8]) -> Vec<u8> {
    build_tlv(0x04, content)
}

pub fn build_bit_string(content: &[u8]) -> Vec<u8> {
    let mut bs = vec![0]; // no unused bits
    bs.extend(content);
    build_tlv(0x03, &bs)
}

pub fn build_boolean(value: bool) -> Vec<u8> {
    build_tlv(0x01, &[if value { 0xFF } else { 0x00 }])
}

pub fn build_utf8_string(s: &str) -> Vec<u8> {
    build_tlv(0x0C, s.as_bytes())
}

/// Encode a UTCTime value from a `YYYYMMDDHHMMSSZ` string.
pub fn build_utc_time(time: &str) -> Vec<u8> {
    // UTCTime carries a two-digit year
    let formatted = if time.len() >= 15 { &time[2..15] } else { time };
    build_tlv(0x17, formatted.as_bytes())
}

/// Encode constructed context-specific content, `[n]`.
pub fn build_context_specific(tag: u8, content: &[u8]) -> Vec<u8> {
    build_tlv(0xA0 | tag, content)
}

pub fn build_algorithm_identifier(oid: &[u8]) -> Vec<u8> {
    let oid_encoded = build_oid(oid);
    let null = vec![0x05, 0x00];
    build_sequence(&[&oid_encoded, &null])
}

// === Decoding ===

/// Split a TLV into its content and the bytes following it.
pub fn parse_tlv(data: &[u8]) -> Result<(&[u8], &[u8]), CryptoError> {
    if data.len() < 2 {
        return Err(CryptoError::Asn1("truncated TLV".into()));
    }

    let (len, header_len) = parse_length(&data[1..])?;
    let total_header = 1 + header_len;

    if data.len() < total_header + len {
        return Err(CryptoError::Asn1("TLV content exceeds input".into()));
    }

    Ok((
        &data[total_header..total_header + len],
        &data[total_header + len..],
    ))
}

/// Like [`parse_tlv`] but returns the whole encoded element (header included)
/// together with the remainder. Used when a sub-structure is re-embedded as-is.
pub fn parse_tlv_raw(data: &[u8]) -> Result<(&[u8], &[u8]), CryptoError> {
    if data.len() < 2 {
        return Err(CryptoError::Asn1("truncated TLV".into()));
    }

    let (len, header_len) = parse_length(&data[1..])?;
    let total = 1 + header_len + len;

    if data.len() < total {
        return Err(CryptoError::Asn1("TLV content exceeds input".into()));
    }

    Ok((&data[..total], &data[total..]))
}

/// Decode a DER length field, returning `(length, bytes consumed)`.
pub fn parse_length(data: &[u8]) -> Result<(usize, usize), CryptoError> {
    if data.is_empty() {
        return Err(CryptoError::Asn1("missing length byte".into()));
    }

    match data[0] {
        n if n < 128 => Ok((n as usize, 1)),
        0x81 => {
            if data.len() < 2 {
                return Err(CryptoError::Asn1("truncated length".into()));
            }
            Ok((data[1] as usize, 2))
        }
        0x82 => {
            if data.len() < 3 {
                return Err(CryptoError::Asn1("truncated length".into()));
            }
            Ok((((data[1] as usize) << 8) | data[2] as usize, 3))
        }
        0x83 => {
            if data.len() < 4 {
                return Err(CryptoError::Asn1("truncated length".into()));
            }
            Ok((
                ((data[1] as usize) << 16) | ((data[2] as usize) << 8) | data[3] as usize,
                4,
            ))
        }
        other => Err(CryptoError::Asn1(format!(
            "unsupported length encoding: 0x{other:02x}"
        ))),
    }
}
