//! Signature dictionary construction
//!
//! Builds the `/Sig` and `/DocTimeStamp` dictionaries and their `/Reference`
//! entries (DocMDP for certifying signatures, FieldMDP for field locks).

use chrono::{DateTime, Utc};
use lopdf::{dictionary, Dictionary, Object, ObjectId};
use shared_pdf::FieldLock;

pub const FILTER_ADOBE_PPKLITE: &str = "Adobe.PPKLite";
pub const SUBFILTER_CMS: &str = "adbe.pkcs7.detached";
pub const SUBFILTER_CADES: &str = "ETSI.CAdES.detached";
pub const SUBFILTER_RFC3161: &str = "ETSI.RFC3161";

/// DocMDP certification level of the document after signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificationLevel {
    /// Approval signature.
    NotCertified,
    /// Author signature, no changes allowed.
    NoChangesAllowed,
    /// Author signature, form filling allowed.
    FormFilling,
    /// Author signature, form filling and annotations allowed.
    FormFillingAndAnnotations,
}

impl CertificationLevel {
    pub fn as_i64(self) -> i64 {
        match self {
            CertificationLevel::NotCertified => 0,
            CertificationLevel::NoChangesAllowed => 1,
            CertificationLevel::FormFilling => 2,
            CertificationLevel::FormFillingAndAnnotations => 3,
        }
    }

    pub fn is_certified(self) -> bool {
        !matches!(self, CertificationLevel::NotCertified)
    }
}

/// Builder for the signature dictionary attached as a field's `/V`.
#[derive(Debug, Clone, Default)]
pub struct SignatureDictionary {
    sub_filter: Option<&'static str>,
    doc_timestamp: bool,
    reason: Option<String>,
    location: Option<String>,
    contact: Option<String>,
    name: Option<String>,
    date: Option<DateTime<Utc>>,
}

impl SignatureDictionary {
    /// A `/Sig` dictionary for the given sub-filter.
    pub fn signature(sub_filter: &'static str) -> Self {
        Self {
            sub_filter: Some(sub_filter),
            ..Self::default()
        }
    }

    /// A `/DocTimeStamp` dictionary (`ETSI.RFC3161`). Document timestamps
    /// carry no reason, location, or signing date.
    pub fn doc_timestamp() -> Self {
        Self {
            sub_filter: Some(SUBFILTER_RFC3161),
            doc_timestamp: true,
            ..Self::default()
        }
    }

    /// A bare dictionary for an external container to fill in.
    pub fn external() -> Self {
        Self::default()
    }

    pub fn reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    pub fn location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }

    pub fn contact(mut self, contact: Option<String>) -> Self {
        self.contact = contact;
        self
    }

    pub fn name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    /// Signing date for `/M`. A later timestamp token overrules this value.
    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    pub fn into_dictionary(self) -> Dictionary {
        let mut dict = dictionary! {
            "Type" => if self.doc_timestamp { "DocTimeStamp" } else { "Sig" },
        };
        if self.sub_filter.is_some() {
            dict.set("Filter", FILTER_ADOBE_PPKLITE);
        }
        if let Some(sub_filter) = self.sub_filter {
            dict.set("SubFilter", sub_filter);
        }
        if let Some(reason) = self.reason {
            dict.set("Reason", Object::string_literal(reason.as_str()));
        }
        if let Some(location) = self.location {
            dict.set("Location", Object::string_literal(location.as_str()));
        }
        if let Some(contact) = self.contact {
            dict.set("ContactInfo", Object::string_literal(contact.as_str()));
        }
        if let Some(name) = self.name {
            dict.set("Name", Object::string_literal(name.as_str()));
        }
        if let Some(date) = self.date {
            let formatted = date.format("D:%Y%m%d%H%M%S+00'00'").to_string();
            dict.set("M", Object::string_literal(formatted.as_str()));
        }
        dict
    }
}

/// Attach the DocMDP `/Reference` entry of a certifying signature.
pub fn add_doc_mdp_reference(
    dict: &mut Dictionary,
    level: CertificationLevel,
    root: ObjectId,
    version: (u8, u8),
) {
    let transform_params = dictionary! {
        "Type" => "TransformParams",
        "V" => Object::Name(b"1.2".to_vec()),
        "P" => level.as_i64(),
    };
    let mut reference = dictionary! {
        "Type" => "SigRef",
        "TransformMethod" => "DocMDP",
        "TransformParams" => transform_params,
        "Data" => root,
    };
    if version < (1, 6) {
        add_legacy_digest_entries(&mut reference);
    }

    dict.set("Reference", vec![Object::Dictionary(reference)]);
}

/// Append the FieldMDP `/Reference` entry for a field lock. Must run after
/// [`add_doc_mdp_reference`] so a DocMDP entry stays first in the array.
pub fn add_field_mdp_reference(
    dict: &mut Dictionary,
    lock: &FieldLock,
    root: ObjectId,
    version: (u8, u8),
) {
    let mut transform_params = lock.to_dictionary();
    transform_params.set("Type", "TransformParams");
    transform_params.set("V", Object::Name(b"1.2".to_vec()));

    let mut reference = dictionary! {
        "Type" => "SigRef",
        "TransformMethod" => "FieldMDP",
        "TransformParams" => transform_params,
        "Data" => root,
    };
    if version < (1, 6) {
        add_legacy_digest_entries(&mut reference);
    }

    if !matches!(dict.get(b"Reference"), Ok(Object::Array(_))) {
        dict.set("Reference", Object::Array(Vec::new()));
    }
    if let Ok(Object::Array(references)) = dict.get_mut(b"Reference") {
        references.push(Object::Dictionary(reference));
    }
}

/// Digest bookkeeping required by pre-1.6 consumers.
fn add_legacy_digest_entries(reference: &mut Dictionary) {
    reference.set("DigestValue", Object::string_literal("aa"));
    reference.set(
        "DigestLocation",
        vec![Object::Integer(0), Object::Integer(0)],
    );
    reference.set("DigestMethod", "MD5");
}
