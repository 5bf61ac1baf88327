//! Reserved-literal placeholders for deferred byte patching
//!
//! A signature value cannot be computed before the file carrying it is
//! serialized, so the dictionary entries whose bytes arrive late are written
//! as hex strings of ASCII zeros with an exact, known width. After
//! serialization the table records where each literal landed; the final
//! bytes are then patched in place without moving anything.

use lopdf::{Object, ObjectId, StringFormat};
use std::collections::BTreeMap;

use crate::PdfError;

/// Location of one reserved literal in the serialized file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder {
    /// Byte offset of the opening `<` delimiter.
    pub offset: u64,
    /// Total width of the literal, delimiters included.
    pub len: usize,
}

/// Maps a PDF name (without the leading slash) to its reserved literal.
#[derive(Debug, Default)]
pub struct PlaceholderTable {
    entries: BTreeMap<String, Placeholder>,
}

impl PlaceholderTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, placeholder: Placeholder) {
        self.entries.insert(name.to_string(), placeholder);
    }

    pub fn get(&self, name: &str) -> Option<Placeholder> {
        self.entries.get(name).copied()
    }

    pub fn remove(&mut self, name: &str) -> Option<Placeholder> {
        self.entries.remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Placeholder)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Build the placeholder object for a reservation of `reserved` bytes.
///
/// The value serializes as `<` + zeros + `>` with exactly `reserved` bytes,
/// which requires an even reservation of at least 4.
pub fn reserved_value(name: &str, reserved: usize) -> Result<Object, PdfError> {
    if reserved < 4 || reserved % 2 != 0 {
        return Err(PdfError::OddReservedLength(name.to_string()));
    }
    Ok(Object::String(
        vec![0u8; (reserved - 2) / 2],
        StringFormat::Hexadecimal,
    ))
}

/// Find the reserved literal for `/name` in serialized output.
///
/// Returns the byte offset of the opening `<`. The scan runs from the end of
/// the buffer because the signature dictionary is the newest object and
/// serializes after everything else; candidate hits that are not followed by
/// a zero-filled literal of the exact reserved width (a page `/Contents`
/// entry, an already-signed dictionary) are skipped.
pub fn locate(serialized: &[u8], name: &str, reserved: usize) -> Option<usize> {
    let mut pattern = Vec::with_capacity(name.len() + 1);
    pattern.push(b'/');
    pattern.extend(name.as_bytes());

    let mut end = serialized.len();
    while let Some(hit) = rfind(&serialized[..end], &pattern) {
        if let Some(offset) = validate_literal(serialized, hit + pattern.len(), reserved) {
            return Some(offset);
        }
        end = hit;
    }
    None
}

fn validate_literal(serialized: &[u8], mut pos: usize, reserved: usize) -> Option<usize> {
    while pos < serialized.len() && matches!(serialized[pos], b' ' | b'\t' | b'\r' | b'\n') {
        pos += 1;
    }
    if pos + reserved > serialized.len() || serialized[pos] != b'<' {
        return None;
    }
    let body = &serialized[pos + 1..pos + reserved - 1];
    if serialized[pos + reserved - 1] == b'>' && body.iter().all(|&b| b == b'0') {
        Some(pos)
    } else {
        None
    }
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| &haystack[i..i + needle.len()] == needle)
}

/// Render a single object to the bytes that replace a reserved literal.
///
/// Streams have no place inside a reserved slot and are rejected.
pub fn serialize_object(object: &Object) -> Result<Vec<u8>, PdfError> {
    let mut out = Vec::new();
    write_object(object, &mut out)?;
    Ok(out)
}

fn write_object(object: &Object, out: &mut Vec<u8>) -> Result<(), PdfError> {
    match object {
        Object::Null => out.extend(b"null"),
        Object::Boolean(b) => out.extend(if *b { &b"true"[..] } else { &b"false"[..] }),
        Object::Integer(i) => out.extend(i.to_string().into_bytes()),
        Object::Real(r) => out.extend(format!("{r}").into_bytes()),
        Object::Name(name) => write_name(name, out),
        Object::String(bytes, StringFormat::Literal) => {
            out.push(b'(');
            for &b in bytes {
                match b {
                    b'(' => out.extend(b"\\("),
                    b')' => out.extend(b"\\)"),
                    b'\\' => out.extend(b"\\\\"),
                    b'\n' => out.extend(b"\\n"),
                    b'\r' => out.extend(b"\\r"),
                    _ => out.push(b),
                }
            }
            out.push(b')');
        }
        Object::String(bytes, StringFormat::Hexadecimal) => {
            out.push(b'<');
            out.extend(hex::encode(bytes).into_bytes());
            out.push(b'>');
        }
        Object::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_object(item, out)?;
            }
            out.push(b']');
        }
        Object::Reference(id) => write_reference(*id, out),
        Object::Dictionary(dict) => {
            out.extend(b"<<");
            for (key, value) in dict.iter() {
                write_name(key, out);
                out.push(b' ');
                write_object(value, out)?;
            }
            out.extend(b">>");
        }
        Object::Stream(_) => return Err(PdfError::Unserializable("stream")),
    }
    Ok(())
}

fn write_name(name: &[u8], out: &mut Vec<u8>) {
    out.push(b'/');
    for &b in name {
        // Delimiters and whitespace must be written as #xx escapes
        if b.is_ascii_graphic() && !b"()<>[]{}/%#".contains(&b) {
            out.push(b);
        } else {
            out.extend(format!("#{b:02X}").into_bytes());
        }
    }
}

fn write_reference((id, gen): ObjectId, out: &mut Vec<u8>) {
    out.extend(format!("{id} {gen} R").into_bytes());
}
