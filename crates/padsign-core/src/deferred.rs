//! Deferred signature injection
//!
//! Fills a previously reserved `/Contents` gap in a finished PDF. The
//! reservation phase runs [`PdfSigner::sign_external_container`] with a
//! container that emits zeros; this module later streams the surrounding
//! bytes to a real container producer and overwrites the gap body, leaving
//! every other byte untouched.
//!
//! [`PdfSigner::sign_external_container`]: crate::signer::PdfSigner::sign_external_container

use lopdf::{Dictionary, Document, Object};
use std::io::{Read, Write};
use tracing::debug;

use crate::error::SignError;
use crate::signer::ExternalSignatureContainer;

/// Sign a PDF where space was already reserved.
///
/// `field_name` must name the last signature of the document: its
/// `/ByteRange` has to cover the file up to end of file, and only a single
/// exclusion window starting at offset 0 is supported. The hex body of the
/// gap is replaced by the container's output padded with ASCII zeros; the
/// `<` and `>` delimiters and all bytes outside the gap are copied verbatim.
pub fn sign_deferred<W: Write>(
    pdf: &[u8],
    field_name: &str,
    sink: &mut W,
    container: &dyn ExternalSignatureContainer,
) -> Result<(), SignError> {
    let doc = Document::load_mem(pdf).map_err(shared_pdf::PdfError::from)?;
    let signature = signature_dictionary(&doc, field_name)?
        .ok_or_else(|| SignError::FieldMissing(field_name.to_string()))?;

    let byte_range = read_byte_range(&doc, signature)
        .ok_or_else(|| SignError::FieldMissing(field_name.to_string()))?;

    let (gap_start, gap_end, capacity) =
        validate_byte_range(&byte_range, pdf.len() as u64, field_name)?;

    let signed_content = {
        let head = &pdf[..gap_start as usize];
        let tail = &pdf[gap_end as usize..];
        let mut ranges = head.chain(tail);
        container.sign(&mut ranges)?
    };

    if signed_content.len() > capacity {
        return Err(SignError::InsufficientSpace {
            available: capacity,
            got: signed_content.len(),
        });
    }

    // bytes [0 .. gap_start] inclusive, keeping the '<' delimiter
    sink.write_all(&pdf[..gap_start as usize + 1])?;
    sink.write_all(hex::encode(&signed_content).as_bytes())?;
    sink.write_all("0".repeat((capacity - signed_content.len()) * 2).as_bytes())?;
    // from the '>' delimiter to end of file
    sink.write_all(&pdf[gap_end as usize - 1..])?;
    sink.flush()?;

    debug!(
        field = field_name,
        container_len = signed_content.len(),
        capacity,
        "deferred signature injected"
    );
    Ok(())
}

/// Check the reserved layout and return `(gap_start, gap_end, capacity)`:
/// the offsets bounding the exclusion window and the number of container
/// bytes its hex body can hold.
fn validate_byte_range(
    byte_range: &[i64],
    file_len: u64,
    field_name: &str,
) -> Result<(u64, u64, usize), SignError> {
    let covered_end = byte_range
        .last()
        .zip(byte_range.get(byte_range.len().wrapping_sub(2)))
        .map(|(len, offset)| offset + len);
    if covered_end != Some(file_len as i64) {
        return Err(SignError::NotLastSignature(field_name.to_string()));
    }

    if byte_range.len() != 4 || byte_range[0] != 0 {
        return Err(SignError::SingleExclusionOnly);
    }

    let gap_start = byte_range[1];
    let gap_end = byte_range[2];
    if gap_start < 0 || gap_end <= gap_start {
        return Err(SignError::SingleExclusionOnly);
    }

    let space_available = (gap_end - gap_start - 2) as usize;
    if space_available % 2 != 0 {
        return Err(SignError::GapNotEven);
    }

    Ok((gap_start as u64, gap_end as u64, space_available / 2))
}

/// The signature dictionary at `/V` of the named form field, if any.
fn signature_dictionary<'a>(
    doc: &'a Document,
    field_name: &str,
) -> Result<Option<&'a Dictionary>, SignError> {
    let catalog = doc.catalog().map_err(shared_pdf::PdfError::from)?;
    let acroform = match catalog.get(b"AcroForm") {
        Ok(Object::Reference(id)) => doc
            .get_dictionary(*id)
            .map_err(shared_pdf::PdfError::from)?,
        Ok(Object::Dictionary(dict)) => dict,
        _ => return Ok(None),
    };
    let fields = match acroform.get(b"Fields") {
        Ok(Object::Array(fields)) => fields,
        _ => return Ok(None),
    };

    for field in fields {
        let dict = match field {
            Object::Reference(id) => match doc.get_dictionary(*id) {
                Ok(dict) => dict,
                Err(_) => continue,
            },
            Object::Dictionary(dict) => dict,
            _ => continue,
        };
        match dict.get(b"T") {
            Ok(Object::String(t, _)) if t == field_name.as_bytes() => {}
            _ => continue,
        }
        return Ok(match dict.get(b"V") {
            Ok(Object::Reference(id)) => doc.get_dictionary(*id).ok(),
            Ok(Object::Dictionary(v)) => Some(v),
            _ => None,
        });
    }
    Ok(None)
}

fn read_byte_range(doc: &Document, signature: &Dictionary) -> Option<Vec<i64>> {
    let array = match signature.get(b"ByteRange").ok()? {
        Object::Array(array) => array.clone(),
        Object::Reference(id) => doc.get_object(*id).ok()?.as_array().ok()?.clone(),
        _ => return None,
    };
    array.iter().map(|obj| obj.as_i64().ok()).collect()
}
