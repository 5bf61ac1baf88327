//! Signer state machine
//!
//! Orchestrates the byte-exact signature injection: bind the signature
//! field, serialize the document with reserved placeholder literals, patch
//! the `/ByteRange` array in place, hash the exposed ranges, obtain the
//! signature container, and overwrite the `/Contents` gap. A signer is a
//! one-shot resource; its lifecycle is strictly OPEN → PRE_CLOSED → CLOSED.

use chrono::{DateTime, Utc};
use lopdf::{Dictionary, Object, StringFormat};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use shared_crypto::cms::{SignatureStandard, SignedDataBuilder};
use shared_crypto::digest::digest_stream;
use shared_crypto::{CrlClient, CryptoError, ExternalDigest, ExternalSignature, OcspClient, TsaClient};
use shared_pdf::fields::{next_field_name, validate_field_name, SignatureFieldBinder};
use shared_pdf::placeholder::{self, Placeholder, PlaceholderTable};
use shared_pdf::{Appearance, FieldLock, PdfDocument, PdfError};

use crate::backing::BackingStore;
use crate::dict::{
    add_doc_mdp_reference, add_field_mdp_reference, CertificationLevel, SignatureDictionary,
    SUBFILTER_CADES, SUBFILTER_CMS,
};
use crate::error::SignError;
use crate::ranges::{byte_range_literal, exclusion_ranges, BYTE_RANGE_RESERVATION};
use crate::stream::RangeReader;

pub const BYTE_RANGE: &str = "ByteRange";
pub const CONTENTS: &str = "Contents";

const BASE_ESTIMATE: usize = 8192;
const OCSP_ESTIMATE: usize = 4192;
const TSA_ESTIMATE: usize = 4192;

/// An opaque signature container producer. It receives the hashable byte
/// stream and returns the full encoded container.
pub trait ExternalSignatureContainer {
    /// Adjust the signature dictionary (filter, sub-filter, …) before the
    /// document is pre-closed.
    fn modify_signing_dictionary(&self, dict: &mut Dictionary);

    /// Consume the signed byte ranges and produce the container octets.
    fn sign(&self, content: &mut dyn Read) -> Result<Vec<u8>, CryptoError>;
}

/// Callback giving the caller a last look at the signature dictionary
/// during pre-close.
pub trait SignatureEvent {
    fn on_signature_dictionary(&self, dict: &mut Dictionary);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignerState {
    Open,
    PreClosed,
    Closed,
}

enum BackingMode {
    Memory,
    TempFile,
}

/// Injects one signature into a PDF document.
///
/// The signer exclusively owns the document, the output sink, and the
/// backing store; collaborators are borrowed per call. After a successful
/// `sign_*` or [`timestamp`](Self::timestamp) call the instance is closed
/// and every further operation fails.
pub struct PdfSigner<W: Write> {
    document: PdfDocument,
    sink: Option<W>,
    mode: BackingMode,
    store: Option<BackingStore>,
    state: SignerState,
    field_name: String,
    sign_date: DateTime<Utc>,
    reason: Option<String>,
    location: Option<String>,
    contact: Option<String>,
    signer_name: Option<String>,
    certification_level: CertificationLevel,
    field_lock: Option<FieldLock>,
    appearance: Appearance,
    signature_event: Option<Box<dyn SignatureEvent>>,
    crypto_dict: Option<Dictionary>,
    placeholders: PlaceholderTable,
    range: Vec<u64>,
}

impl<W: Write> PdfSigner<W> {
    /// Create a signer holding the serialized output in memory.
    pub fn new(pdf: &[u8], sink: W) -> Result<Self, SignError> {
        Self::with_mode(pdf, sink, BackingMode::Memory)
    }

    /// Create a signer that spools the serialized output through a
    /// temporary file instead of memory.
    pub fn with_temp_file(pdf: &[u8], sink: W) -> Result<Self, SignError> {
        Self::with_mode(pdf, sink, BackingMode::TempFile)
    }

    fn with_mode(pdf: &[u8], sink: W, mode: BackingMode) -> Result<Self, SignError> {
        let document = PdfDocument::from_bytes(pdf)?;
        let field_name = next_field_name(document.doc());
        Ok(Self {
            document,
            sink: Some(sink),
            mode,
            store: None,
            state: SignerState::Open,
            field_name,
            sign_date: Utc::now(),
            reason: None,
            location: None,
            contact: None,
            signer_name: None,
            certification_level: CertificationLevel::NotCertified,
            field_lock: None,
            appearance: Appearance::default(),
            signature_event: None,
            crypto_dict: None,
            placeholders: PlaceholderTable::new(),
            range: Vec::new(),
        })
    }

    // --- configuration ---

    pub fn set_field_name(&mut self, name: &str) -> Result<(), SignError> {
        validate_field_name(name)?;
        self.field_name = name.to_string();
        Ok(())
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn set_sign_date(&mut self, date: DateTime<Utc>) {
        self.sign_date = date;
    }

    pub fn set_reason(&mut self, reason: &str) {
        self.reason = Some(reason.to_string());
    }

    pub fn set_location(&mut self, location: &str) {
        self.location = Some(location.to_string());
    }

    pub fn set_contact(&mut self, contact: &str) {
        self.contact = Some(contact.to_string());
    }

    pub fn set_signer_name(&mut self, name: &str) {
        self.signer_name = Some(name.to_string());
    }

    pub fn set_certification_level(&mut self, level: CertificationLevel) {
        self.certification_level = level;
    }

    pub fn set_field_lock(&mut self, lock: FieldLock) {
        self.field_lock = Some(lock);
    }

    pub fn set_appearance(&mut self, appearance: Appearance) {
        self.appearance = appearance;
    }

    pub fn set_signature_event(&mut self, event: Box<dyn SignatureEvent>) {
        self.signature_event = Some(event);
    }

    /// Install the signature dictionary for a staged
    /// [`pre_close`](Self::pre_close) / [`close`](Self::close) sequence.
    pub fn set_signature_dictionary(&mut self, dict: Dictionary) {
        self.crypto_dict = Some(dict);
    }

    /// The `/ByteRange` offset/length alternation, available after pre-close.
    pub fn range(&self) -> &[u64] {
        &self.range
    }

    // --- signing operations ---

    /// Sign the document in detached CMS or CAdES mode.
    ///
    /// When `estimated_size` is 0 the reservation defaults to 8192 bytes
    /// plus headroom for each CRL, the OCSP response, and the timestamp
    /// token. The instance is closed afterwards.
    #[allow(clippy::too_many_arguments)]
    pub fn sign_detached(
        &mut self,
        external_digest: &dyn ExternalDigest,
        external_signature: &dyn ExternalSignature,
        chain: &[Vec<u8>],
        crl_clients: &[&dyn CrlClient],
        ocsp_client: Option<&dyn OcspClient>,
        tsa_client: Option<&dyn TsaClient>,
        estimated_size: usize,
        standard: SignatureStandard,
    ) -> Result<(), SignError> {
        if self.state != SignerState::Open {
            return Err(SignError::AlreadyClosed);
        }

        let crl_bytes = process_crls(chain, crl_clients);

        let mut estimated = estimated_size;
        if estimated == 0 {
            estimated = BASE_ESTIMATE;
            if let Some(crls) = &crl_bytes {
                for crl in crls {
                    estimated += crl.len() + 10;
                }
            }
            if ocsp_client.is_some() {
                estimated += OCSP_ESTIMATE;
            }
            if tsa_client.is_some() {
                estimated += TSA_ESTIMATE;
            }
        }

        let sub_filter = match standard {
            SignatureStandard::Cms => SUBFILTER_CMS,
            SignatureStandard::Cades => {
                self.document.add_developer_extension("ESIC", "1.7", 2)?;
                SUBFILTER_CADES
            }
        };

        let dict = SignatureDictionary::signature(sub_filter)
            .reason(self.reason.clone())
            .location(self.location.clone())
            .contact(self.contact.clone())
            .name(self.signer_name.clone())
            .date(self.sign_date)
            .into_dictionary();
        self.crypto_dict = Some(dict);

        let mut exclusions = BTreeMap::new();
        exclusions.insert(CONTENTS.to_string(), estimated * 2 + 2);
        self.pre_close(&exclusions)?;

        let builder = SignedDataBuilder::new(
            chain,
            external_signature.hash_algorithm(),
            external_signature.encryption_algorithm(),
            standard,
        )?;

        let document_hash = {
            let mut digest =
                external_digest.message_digest(external_signature.hash_algorithm())?;
            let mut stream = self.range_stream()?;
            digest_stream(&mut stream, digest.as_mut())?
        };

        let ocsp = match (chain.len() >= 2, ocsp_client) {
            (true, Some(client)) => client.get_encoded(&chain[0], &chain[1], None),
            _ => None,
        };

        let attrs = builder.authenticated_attributes(
            &document_hash,
            Some(self.sign_date),
            ocsp.as_deref(),
            crl_bytes.as_deref(),
        );
        let raw_signature = external_signature.sign(&attrs)?;

        let token = match tsa_client {
            Some(tsa) => {
                let mut imprint_digest = tsa.message_digest();
                imprint_digest.update(&raw_signature);
                let imprint = imprint_digest.finish();
                Some(tsa.get_time_stamp_token(&imprint)?)
            }
            None => None,
        };

        let container = builder.build(&attrs, &raw_signature, token.as_deref())?;
        self.embed_container(&container, estimated)
    }

    /// Sign with a fully external container producer; the core only reserves
    /// the gap and embeds whatever comes back.
    pub fn sign_external_container(
        &mut self,
        container: &dyn ExternalSignatureContainer,
        estimated_size: usize,
    ) -> Result<(), SignError> {
        if self.state != SignerState::Open {
            return Err(SignError::AlreadyClosed);
        }

        let mut dict = SignatureDictionary::external()
            .reason(self.reason.clone())
            .location(self.location.clone())
            .contact(self.contact.clone())
            .name(self.signer_name.clone())
            .date(self.sign_date)
            .into_dictionary();
        container.modify_signing_dictionary(&mut dict);
        self.crypto_dict = Some(dict);

        let mut exclusions = BTreeMap::new();
        exclusions.insert(CONTENTS.to_string(), estimated_size * 2 + 2);
        self.pre_close(&exclusions)?;

        let signed = {
            let mut stream = self.range_stream()?;
            container.sign(&mut stream)?
        };

        self.embed_container(&signed, estimated_size)
    }

    /// Produce a standalone document timestamp (`/DocTimeStamp`,
    /// `ETSI.RFC3161`). The reservation comes from the TSA's own estimate.
    pub fn timestamp(
        &mut self,
        tsa: &dyn TsaClient,
        field_name: Option<&str>,
    ) -> Result<(), SignError> {
        if self.state != SignerState::Open {
            return Err(SignError::AlreadyClosed);
        }

        let estimated = tsa.token_size_estimate();
        self.document.add_developer_extension("ESIC", "1.7", 5)?;
        if let Some(name) = field_name {
            self.set_field_name(name)?;
        }

        self.crypto_dict = Some(SignatureDictionary::doc_timestamp().into_dictionary());

        let mut exclusions = BTreeMap::new();
        exclusions.insert(CONTENTS.to_string(), estimated * 2 + 2);
        self.pre_close(&exclusions)?;

        let imprint = {
            let mut digest = tsa.message_digest();
            let mut stream = self.range_stream()?;
            digest_stream(&mut stream, digest.as_mut())?
        };
        let token = tsa.get_time_stamp_token(&imprint)?;

        self.embed_container(&token, estimated)
    }

    // --- staged signing ---

    /// Serialize the document with reserved literals and compute the byte
    /// ranges. `exclusion_sizes` maps each deferred key (at minimum
    /// `Contents`) to its reserved width; `ByteRange` is reserved
    /// implicitly.
    pub fn pre_close(
        &mut self,
        exclusion_sizes: &BTreeMap<String, usize>,
    ) -> Result<(), SignError> {
        match self.state {
            SignerState::Open => {}
            SignerState::PreClosed => return Err(SignError::AlreadyPreClosed),
            SignerState::Closed => return Err(SignError::AlreadyClosed),
        }
        self.state = SignerState::PreClosed;

        let mut dict = self.crypto_dict.take().ok_or(SignError::NoCryptoDictionary)?;

        dict.set(
            BYTE_RANGE,
            placeholder::reserved_value(BYTE_RANGE, BYTE_RANGE_RESERVATION)?,
        );
        for (name, reserved) in exclusion_sizes {
            dict.set(
                name.as_bytes().to_vec(),
                placeholder::reserved_value(name, *reserved)?,
            );
        }

        let root = self.document.root_reference()?;
        let version = self.document.version();
        if self.certification_level.is_certified() {
            add_doc_mdp_reference(&mut dict, self.certification_level, root, version);
        }

        let sig_id = self.document.doc_mut().add_object(Object::Dictionary(dict));
        let outcome = SignatureFieldBinder::new(self.document.doc_mut()).bind(
            &self.field_name,
            sig_id,
            &self.appearance,
            self.field_lock.as_ref(),
        )?;

        if let Some(lock) = &outcome.effective_lock {
            let dict = self
                .document
                .doc_mut()
                .get_dictionary_mut(sig_id)
                .map_err(shared_pdf::PdfError::from)?;
            add_field_mdp_reference(dict, lock, root, version);
        }

        if let Some(event) = &self.signature_event {
            let dict = self
                .document
                .doc_mut()
                .get_dictionary_mut(sig_id)
                .map_err(shared_pdf::PdfError::from)?;
            event.on_signature_dictionary(dict);
        }

        if self.certification_level.is_certified() {
            self.document.set_docmdp_perms(sig_id)?;
        }

        let mut store = match self.mode {
            BackingMode::Memory => {
                let mut buf = Vec::new();
                self.document.save_to(&mut buf)?;
                BackingStore::Memory(buf)
            }
            BackingMode::TempFile => {
                let mut tmp = NamedTempFile::new()?;
                self.document.save_to(tmp.as_file_mut())?;
                tmp.as_file_mut().flush()?;
                BackingStore::File(tmp)
            }
        };
        let file_len = store.len()?;

        let mut reservations: Vec<(String, usize)> =
            vec![(BYTE_RANGE.to_string(), BYTE_RANGE_RESERVATION)];
        for (name, reserved) in exclusion_sizes {
            reservations.push((name.clone(), *reserved));
        }

        let mut table = locate_placeholders(&store, &reservations, None)?;

        let windows: Vec<(u64, u64)> = table
            .iter()
            .filter(|(name, _)| *name != BYTE_RANGE)
            .map(|(_, p)| (p.offset, p.len as u64))
            .collect();
        self.range = exclusion_ranges(&windows, file_len)?;

        let byte_range_slot = table
            .remove(BYTE_RANGE)
            .ok_or_else(|| PdfError::PlaceholderNotFound(BYTE_RANGE.to_string()))?;
        let literal = byte_range_literal(&self.range)?;
        store.patch_at(byte_range_slot.offset, &literal)?;

        debug!(
            field = %self.field_name,
            file_len,
            range = ?self.range,
            "pre-closed document"
        );

        self.placeholders = table;
        self.store = Some(store);
        Ok(())
    }

    /// The hashable stream over the signed byte ranges. Only valid between
    /// pre-close and close.
    pub fn range_stream(&self) -> Result<RangeReader<'_>, SignError> {
        if self.state != SignerState::PreClosed {
            return Err(SignError::MustBePreClosed);
        }
        let store = self.store.as_ref().ok_or(SignError::MustBePreClosed)?;
        Ok(RangeReader::new(store, &self.range))
    }

    /// Patch every reserved key with its final value and ship the bytes to
    /// the output sink. `update` must carry exactly the keys reserved in
    /// [`pre_close`](Self::pre_close). The sink is consumed either way.
    pub fn close(&mut self, update: Dictionary) -> Result<(), SignError> {
        match self.state {
            SignerState::PreClosed => {}
            SignerState::Open => return Err(SignError::MustBePreClosed),
            SignerState::Closed => return Err(SignError::AlreadyClosed),
        }
        self.state = SignerState::Closed;

        let mut store = self.store.take().ok_or(SignError::MustBePreClosed)?;
        let result = self.patch_and_ship(&mut store, update);
        if result.is_err() {
            // the sink is still closed (dropped) on the error path
            self.sink.take();
        }
        result
    }

    fn patch_and_ship(
        &mut self,
        store: &mut BackingStore,
        update: Dictionary,
    ) -> Result<(), SignError> {
        for (key, value) in update.iter() {
            let name = String::from_utf8_lossy(key).into_owned();
            let slot = self
                .placeholders
                .get(&name)
                .ok_or_else(|| SignError::KeyNotReserved(name.clone()))?;

            let mut bytes = placeholder::serialize_object(value)?;
            if bytes.len() > slot.len {
                return Err(SignError::ValueTooLarge {
                    key: name,
                    reserved: slot.len,
                    got: bytes.len(),
                });
            }
            bytes.resize(slot.len, b' ');
            store.patch_at(slot.offset, &bytes)?;
        }

        if update.len() != self.placeholders.len() {
            return Err(SignError::UpdateKeysMismatch);
        }

        let mut sink = self.sink.take().ok_or(SignError::AlreadyClosed)?;
        store.stream_to(&mut sink)?;
        sink.flush()?;

        info!(bytes = store.len().unwrap_or(0), "signed document written");
        Ok(())
    }

    fn embed_container(&mut self, container: &[u8], estimated: usize) -> Result<(), SignError> {
        if container.len() > estimated {
            return Err(SignError::NotEnoughSpace {
                reserved: estimated,
                got: container.len(),
            });
        }

        let mut padded = container.to_vec();
        padded.resize(estimated, 0);

        let mut update = Dictionary::new();
        update.set(CONTENTS, Object::String(padded, StringFormat::Hexadecimal));
        self.close(update)
    }
}

/// Walk the chain until some CRL client yields revocation data.
fn process_crls(chain: &[Vec<u8>], crl_clients: &[&dyn CrlClient]) -> Option<Vec<Vec<u8>>> {
    if crl_clients.is_empty() {
        return None;
    }
    for cert in chain {
        let mut collected = Vec::new();
        for client in crl_clients {
            if let Some(mut crls) = client.get_encoded(cert, None) {
                collected.append(&mut crls);
            }
        }
        if !collected.is_empty() {
            return Some(collected);
        }
    }
    None
}

/// Locate every reserved literal in the serialized store. Scans the file
/// tail first (the signature dictionary serializes last) and falls back to
/// the whole file when a very large cross-reference section pushes a
/// literal out of the window.
fn locate_placeholders(
    store: &BackingStore,
    reservations: &[(String, usize)],
    window: Option<u64>,
) -> Result<PlaceholderTable, SignError> {
    let reserved_total: u64 = reservations.iter().map(|(_, len)| *len as u64).sum();
    let window = window.unwrap_or(reserved_total + 65536);
    let (buf, base) = store.tail(window)?;

    let mut table = PlaceholderTable::new();
    for (name, reserved) in reservations {
        match placeholder::locate(&buf, name, *reserved) {
            Some(pos) => table.insert(
                name,
                Placeholder {
                    offset: base + pos as u64,
                    len: *reserved,
                },
            ),
            None if base > 0 => {
                return locate_placeholders(store, reservations, Some(store.len()?));
            }
            None => {
                return Err(PdfError::PlaceholderNotFound(name.clone()).into());
            }
        }
    }
    Ok(table)
}
