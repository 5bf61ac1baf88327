//! Signature form field and widget binding
//!
//! Locates or creates the AcroForm signature field that carries a signature
//! dictionary, places its widget annotation on a page, and applies field
//! lock dictionaries. An existing field keeps its widget geometry; a fresh
//! field gets a widget at the configured rectangle.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use tracing::debug;

use crate::PdfError;

/// Widget annotation flag: print the annotation.
const FLAG_PRINT: i64 = 1 << 2;
/// Widget annotation flag: do not allow deletion or property changes.
const FLAG_LOCKED: i64 = 1 << 7;
/// AcroForm `/SigFlags`: SignaturesExist | AppendOnly.
const SIG_FLAGS: i64 = 3;

/// Which form fields a signature freezes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAction {
    All,
    Include,
    Exclude,
}

/// A `/Lock` dictionary for a signature field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldLock {
    pub action: LockAction,
    pub fields: Vec<String>,
}

impl FieldLock {
    pub fn all() -> Self {
        Self {
            action: LockAction::All,
            fields: Vec::new(),
        }
    }

    pub fn include(fields: Vec<String>) -> Self {
        Self {
            action: LockAction::Include,
            fields,
        }
    }

    pub fn exclude(fields: Vec<String>) -> Self {
        Self {
            action: LockAction::Exclude,
            fields,
        }
    }

    pub fn to_dictionary(&self) -> Dictionary {
        let action = match self.action {
            LockAction::All => "All",
            LockAction::Include => "Include",
            LockAction::Exclude => "Exclude",
        };
        let mut dict = dictionary! {
            "Type" => "SigFieldLock",
            "Action" => action,
        };
        if self.action != LockAction::All {
            let fields: Vec<Object> = self
                .fields
                .iter()
                .map(|f| Object::string_literal(f.as_str()))
                .collect();
            dict.set("Fields", fields);
        }
        dict
    }

    pub fn from_dictionary(dict: &Dictionary) -> Option<Self> {
        let action = match dict.get(b"Action") {
            Ok(Object::Name(n)) if n == b"All" => LockAction::All,
            Ok(Object::Name(n)) if n == b"Include" => LockAction::Include,
            Ok(Object::Name(n)) if n == b"Exclude" => LockAction::Exclude,
            _ => return None,
        };
        let fields = match dict.get(b"Fields") {
            Ok(Object::Array(items)) => items
                .iter()
                .filter_map(|obj| match obj {
                    Object::String(bytes, _) => Some(String::from_utf8_lossy(bytes).into_owned()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        Some(Self { action, fields })
    }
}

/// Placement of the signature widget; the visual appearance stream itself is
/// produced externally and only attached here.
#[derive(Debug, Clone)]
pub struct Appearance {
    /// 1-indexed page carrying the widget.
    pub page: u32,
    /// `[x, y, width, height]` in PDF coordinates.
    pub rect: [f64; 4],
    /// Pre-built normal appearance XObject, if any.
    pub stream: Option<Object>,
}

impl Default for Appearance {
    fn default() -> Self {
        // An empty rectangle makes the signature invisible
        Self {
            page: 1,
            rect: [0.0, 0.0, 0.0, 0.0],
            stream: None,
        }
    }
}

/// Result of binding a signature dictionary to a form field.
#[derive(Debug)]
pub struct BindOutcome {
    pub field_id: ObjectId,
    /// The lock that actually applies: a pre-existing field lock wins over
    /// the caller-supplied one.
    pub effective_lock: Option<FieldLock>,
    /// 1-indexed page the widget ended up on. For a pre-existing field this
    /// is the widget's own page, not the configured one.
    pub page: u32,
    /// `[x, y, width, height]` the appearance should cover. For a
    /// pre-existing field this is the widget's own rectangle.
    pub rect: [f64; 4],
}

/// Binds a signature dictionary into the document's form layer.
pub struct SignatureFieldBinder<'a> {
    doc: &'a mut Document,
}

impl<'a> SignatureFieldBinder<'a> {
    pub fn new(doc: &'a mut Document) -> Self {
        Self { doc }
    }

    /// Locate or create the signature field `name` and attach `sig_id` as
    /// its `/V` value.
    pub fn bind(
        &mut self,
        name: &str,
        sig_id: ObjectId,
        appearance: &Appearance,
        caller_lock: Option<&FieldLock>,
    ) -> Result<BindOutcome, PdfError> {
        let acroform_id = self.acroform_id()?;

        let outcome = match find_field(self.doc, acroform_id, name)? {
            Some(field_id) => self.bind_existing(field_id, name, sig_id, appearance, caller_lock)?,
            None => self.create_field(acroform_id, name, sig_id, appearance, caller_lock)?,
        };

        let acroform = self.doc.get_dictionary_mut(acroform_id)?;
        acroform.set("SigFlags", SIG_FLAGS);

        debug!(field = name, id = ?outcome.field_id, "bound signature field");
        Ok(outcome)
    }

    fn bind_existing(
        &mut self,
        field_id: ObjectId,
        name: &str,
        sig_id: ObjectId,
        appearance: &Appearance,
        caller_lock: Option<&FieldLock>,
    ) -> Result<BindOutcome, PdfError> {
        let (existing_lock, widget_rect, widget_page_id) = {
            let field = self.doc.get_dictionary(field_id)?;

            match field.get(b"FT") {
                Ok(Object::Name(ft)) if ft == b"Sig" => {}
                _ => return Err(PdfError::FieldTypeNotSignature(name.to_string())),
            }
            if field.get(b"V").is_ok() {
                return Err(PdfError::FieldAlreadySigned(name.to_string()));
            }

            // the existing widget keeps its geometry; the configured
            // appearance rectangle is ignored for this path
            let rect = field
                .get(b"Rect")
                .ok()
                .and_then(|obj| rect_from_object(self.doc, obj));
            let page_id = match field.get(b"P") {
                Ok(Object::Reference(id)) => Some(*id),
                _ => page_containing_annotation(self.doc, field_id),
            };

            (self.resolve_lock(field)?, rect, page_id)
        };

        let effective_lock = existing_lock.or_else(|| caller_lock.cloned());

        let page = widget_page_id
            .and_then(|id| page_number_of(self.doc, id))
            .unwrap_or(appearance.page);
        let page_id = widget_page_id
            .or_else(|| self.doc.get_pages().get(&page).copied())
            .ok_or(PdfError::MissingPage(page))?;
        let rect = widget_rect.unwrap_or(appearance.rect);

        let appearance_ref = appearance
            .stream
            .clone()
            .map(|stream| self.doc.add_object(stream));

        let field = self.doc.get_dictionary_mut(field_id)?;
        field.set("V", sig_id);
        field.set("P", page_id);

        let flags = match field.get(b"F") {
            Ok(Object::Integer(f)) => *f,
            _ => 0,
        };
        field.set("F", flags | FLAG_LOCKED);

        if !field.has(b"Lock") {
            if let Some(lock) = caller_lock {
                field.set("Lock", Object::Dictionary(lock.to_dictionary()));
            }
        }
        if let Some(ap_id) = appearance_ref {
            field.set("AP", Object::Dictionary(dictionary! { "N" => ap_id }));
        }

        Ok(BindOutcome {
            field_id,
            effective_lock,
            page,
            rect,
        })
    }

    fn create_field(
        &mut self,
        acroform_id: ObjectId,
        name: &str,
        sig_id: ObjectId,
        appearance: &Appearance,
        caller_lock: Option<&FieldLock>,
    ) -> Result<BindOutcome, PdfError> {
        let page_id = self
            .doc
            .get_pages()
            .get(&appearance.page)
            .copied()
            .ok_or(PdfError::MissingPage(appearance.page))?;

        let [x, y, w, h] = appearance.rect;
        let mut field = dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => "Sig",
            "T" => Object::string_literal(name),
            "V" => sig_id,
            "Rect" => vec![
                Object::Real(x as f32),
                Object::Real(y as f32),
                Object::Real((x + w) as f32),
                Object::Real((y + h) as f32),
            ],
            "F" => FLAG_PRINT | FLAG_LOCKED,
            "P" => page_id,
        };

        if let Some(stream) = appearance.stream.clone() {
            let ap_id = self.doc.add_object(stream);
            field.set("AP", Object::Dictionary(dictionary! { "N" => ap_id }));
        }
        if let Some(lock) = caller_lock {
            field.set("Lock", Object::Dictionary(lock.to_dictionary()));
        }

        let field_id = self.doc.add_object(Object::Dictionary(field));
        self.push_page_annotation(page_id, field_id)?;

        let acroform = self.doc.get_dictionary_mut(acroform_id)?;
        if !matches!(acroform.get(b"Fields"), Ok(Object::Array(_))) {
            acroform.set("Fields", Object::Array(Vec::new()));
        }
        if let Ok(Object::Array(fields)) = acroform.get_mut(b"Fields") {
            fields.push(field_id.into());
        }

        Ok(BindOutcome {
            field_id,
            effective_lock: caller_lock.cloned(),
            page: appearance.page,
            rect: appearance.rect,
        })
    }

    /// The AcroForm dictionary's object id, creating the form or promoting
    /// an inline dictionary to an indirect object as needed.
    fn acroform_id(&mut self) -> Result<ObjectId, PdfError> {
        let existing = match self.doc.catalog()?.get(b"AcroForm") {
            Ok(Object::Reference(id)) => Some(Ok(*id)),
            Ok(Object::Dictionary(dict)) => Some(Err(dict.clone())),
            _ => None,
        };

        match existing {
            Some(Ok(id)) => Ok(id),
            Some(Err(inline)) => {
                let id = self.doc.add_object(Object::Dictionary(inline));
                self.doc.catalog_mut()?.set("AcroForm", id);
                Ok(id)
            }
            None => {
                let id = self.doc.add_object(Object::Dictionary(dictionary! {
                    "Fields" => Object::Array(Vec::new()),
                }));
                self.doc.catalog_mut()?.set("AcroForm", id);
                Ok(id)
            }
        }
    }

    fn resolve_lock(&self, field: &Dictionary) -> Result<Option<FieldLock>, PdfError> {
        match field.get(b"Lock") {
            Ok(Object::Dictionary(dict)) => Ok(FieldLock::from_dictionary(dict)),
            Ok(Object::Reference(id)) => {
                let dict = self.doc.get_dictionary(*id)?;
                Ok(FieldLock::from_dictionary(dict))
            }
            _ => Ok(None),
        }
    }

    fn push_page_annotation(&mut self, page_id: ObjectId, field_id: ObjectId) -> Result<(), PdfError> {
        let annots_ref = {
            let page = self.doc.get_dictionary(page_id)?;
            match page.get(b"Annots") {
                Ok(Object::Reference(id)) => Some(*id),
                _ => None,
            }
        };

        if let Some(annots_id) = annots_ref {
            let annots = self.doc.get_object_mut(annots_id)?.as_array_mut()?;
            annots.push(field_id.into());
        } else {
            let page = self.doc.get_dictionary_mut(page_id)?;
            if !matches!(page.get(b"Annots"), Ok(Object::Array(_))) {
                page.set("Annots", Object::Array(Vec::new()));
            }
            if let Ok(Object::Array(annots)) = page.get_mut(b"Annots") {
                annots.push(field_id.into());
            }
        }
        Ok(())
    }
}

/// Reject field names containing a dot, which would read as a hierarchy.
pub fn validate_field_name(name: &str) -> Result<(), PdfError> {
    if name.contains('.') {
        return Err(PdfError::FieldNameContainsDot);
    }
    Ok(())
}

/// Smallest `Signature<k>` not already used by a form field.
pub fn next_field_name(doc: &Document) -> String {
    let existing = field_names(doc);
    let mut k = 1usize;
    loop {
        let candidate = format!("Signature{k}");
        if !existing.iter().any(|n| n == candidate.as_bytes()) {
            return candidate;
        }
        k += 1;
    }
}

fn field_names(doc: &Document) -> Vec<Vec<u8>> {
    let mut names = Vec::new();
    let Some(fields) = acroform_fields(doc) else {
        return names;
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
        if let Ok(Object::String(name, _)) = dict.get(b"T") {
            names.push(name.clone());
        }
    }
    names
}

fn acroform_fields(doc: &Document) -> Option<&Vec<Object>> {
    let catalog = doc.catalog().ok()?;
    let acroform = match catalog.get(b"AcroForm").ok()? {
        Object::Reference(id) => doc.get_dictionary(*id).ok()?,
        Object::Dictionary(dict) => dict,
        _ => return None,
    };
    match acroform.get(b"Fields").ok()? {
        Object::Array(fields) => Some(fields),
        _ => None,
    }
}

/// Parse a widget `/Rect` into `[x, y, width, height]`.
fn rect_from_object(doc: &Document, obj: &Object) -> Option<[f64; 4]> {
    let array = match obj {
        Object::Array(array) => array,
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::Array(array) => array,
            _ => return None,
        },
        _ => return None,
    };
    if array.len() != 4 {
        return None;
    }

    let mut corners = [0.0f64; 4];
    for (slot, obj) in corners.iter_mut().zip(array) {
        *slot = number_of(doc, obj)?;
    }
    Some([
        corners[0],
        corners[1],
        corners[2] - corners[0],
        corners[3] - corners[1],
    ])
}

fn number_of(doc: &Document, obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        Object::Reference(id) => number_of(doc, doc.get_object(*id).ok()?),
        _ => None,
    }
}

/// 1-indexed page number of a page object.
fn page_number_of(doc: &Document, page_id: ObjectId) -> Option<u32> {
    doc.get_pages()
        .iter()
        .find(|(_, id)| **id == page_id)
        .map(|(number, _)| *number)
}

/// The page whose `/Annots` array carries the annotation, for widgets
/// without a `/P` entry.
fn page_containing_annotation(doc: &Document, annotation_id: ObjectId) -> Option<ObjectId> {
    for page_id in doc.get_pages().values() {
        let Ok(page) = doc.get_dictionary(*page_id) else {
            continue;
        };
        let annots = match page.get(b"Annots") {
            Ok(Object::Array(annots)) => annots,
            Ok(Object::Reference(id)) => match doc.get_object(*id) {
                Ok(Object::Array(annots)) => annots,
                _ => continue,
            },
            _ => continue,
        };
        if annots.contains(&Object::Reference(annotation_id)) {
            return Some(*page_id);
        }
    }
    None
}

fn find_field(
    doc: &Document,
    acroform_id: ObjectId,
    name: &str,
) -> Result<Option<ObjectId>, PdfError> {
    let acroform = doc.get_dictionary(acroform_id)?;
    let fields = match acroform.get(b"Fields") {
        Ok(Object::Array(fields)) => fields,
        _ => return Ok(None),
    };

    for field in fields {
        let Object::Reference(id) = field else {
            continue;
        };
        let Ok(dict) = doc.get_dictionary(*id) else {
            continue;
        };
        if let Ok(Object::String(t, _)) = dict.get(b"T") {
            if t == name.as_bytes() {
                return Ok(Some(*id));
            }
        }
    }
    Ok(None)
}
