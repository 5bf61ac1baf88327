//! PDF document handle built on lopdf

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use std::io::Write;

use crate::PdfError;

/// Wrapper around `lopdf::Document` exposing the operations the signing
/// core needs: page lookup, catalog edits, and full serialization.
pub struct PdfDocument {
    doc: Document,
}

impl PdfDocument {
    /// Load a PDF from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PdfError> {
        let doc = Document::load_mem(bytes)?;
        Ok(Self { doc })
    }

    pub fn from_document(doc: Document) -> Self {
        Self { doc }
    }

    /// Get the number of pages.
    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Get page object ID for a given page number (1-indexed).
    pub fn page_id(&self, page_num: u32) -> Option<ObjectId> {
        self.doc.get_pages().get(&page_num).copied()
    }

    /// The PDF version as `(major, minor)`.
    ///
    /// A header that does not parse is treated as a current-generation file,
    /// so no legacy compatibility entries are emitted for it.
    pub fn version(&self) -> (u8, u8) {
        let mut parts = self.doc.version.split('.');
        let major = parts.next().and_then(|p| p.parse().ok());
        let minor = parts.next().and_then(|p| p.parse().ok());
        match (major, minor) {
            (Some(major), Some(minor)) => (major, minor),
            _ => (1, 7),
        }
    }

    /// The catalog reference from the trailer.
    pub fn root_reference(&self) -> Result<ObjectId, PdfError> {
        Ok(self.doc.trailer.get(b"Root")?.as_reference()?)
    }

    /// Register a developer extension in the catalog, keeping the highest
    /// extension level when the prefix is already registered.
    pub fn add_developer_extension(
        &mut self,
        prefix: &str,
        base_version: &str,
        extension_level: i64,
    ) -> Result<(), PdfError> {
        let extensions_ref = self
            .doc
            .catalog()?
            .get(b"Extensions")
            .ok()
            .and_then(|obj| obj.as_reference().ok());

        if let Some(id) = extensions_ref {
            let extensions = self.doc.get_dictionary_mut(id)?;
            put_extension(extensions, prefix, base_version, extension_level);
        } else {
            let catalog = self.doc.catalog_mut()?;
            if !matches!(catalog.get(b"Extensions"), Ok(Object::Dictionary(_))) {
                catalog.set("Extensions", Object::Dictionary(Dictionary::new()));
            }
            if let Ok(Object::Dictionary(extensions)) = catalog.get_mut(b"Extensions") {
                put_extension(extensions, prefix, base_version, extension_level);
            }
        }
        Ok(())
    }

    /// Install the `/Perms` entry pointing a certifying signature at the
    /// catalog.
    pub fn set_docmdp_perms(&mut self, signature: ObjectId) -> Result<(), PdfError> {
        let catalog = self.doc.catalog_mut()?;
        catalog.set(
            "Perms",
            Object::Dictionary(dictionary! { "DocMDP" => signature }),
        );
        Ok(())
    }

    /// Serialize the whole document into `target`.
    pub fn save_to<W: Write>(&mut self, target: &mut W) -> Result<(), PdfError> {
        self.doc.save_to(target)?;
        Ok(())
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn doc_mut(&mut self) -> &mut Document {
        &mut self.doc
    }
}

fn put_extension(extensions: &mut Dictionary, prefix: &str, base_version: &str, level: i64) {
    let existing_level = extensions
        .get(prefix.as_bytes())
        .ok()
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|dict| dict.get(b"ExtensionLevel").ok())
        .and_then(|obj| obj.as_i64().ok());

    if existing_level.map_or(true, |existing| level > existing) {
        extensions.set(
            prefix.as_bytes().to_vec(),
            dictionary! {
                "BaseVersion" => base_version,
                "ExtensionLevel" => level,
            },
        );
    }
}

#[cfg(test)]
pub(crate) fn fixture_document(pages: usize) -> Document {
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
    doc
}
