use std::collections::HashSet;
use std::sync::Arc;
use sha2::Digest;

use crate::completion::{CompletionState, CompletionTracker};
use crate::error::Error;
use crate::files::{self, BlobStore};
use crate::models::{Document, SignatureField, SignatureImage, User};
use crate::pdf::{self, FieldEntry, SignatureMeta};
use crate::registry::{self, FieldAssignment};
use crate::signing::{self, Signer};
use crate::store::Store;
use crate::{overlay, DocumentID, FieldID, UserID};

#[derive(Serialize, Debug, Clone)]
pub struct DocumentSummary {
    pub id: DocumentID,
    pub file: String,
    pub uploaded_at: chrono::NaiveDateTime,
    pub signed: bool,
}

impl From<&Document> for DocumentSummary {
    fn from(document: &Document) -> Self {
        Self {
            id: document.id.into(),
            file: document.file.rsplit('/').next().unwrap_or(&document.file).to_string(),
            uploaded_at: document.uploaded_at,
            signed: document.signed,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct PendingDocument {
    #[serde(flatten)]
    pub document: DocumentSummary,
    pub pending_fields: usize,
}

#[derive(Serialize, Debug, Clone)]
pub struct FieldView {
    pub id: FieldID,
    pub assigned_user_id: UserID,
    pub page: i32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub field_name: String,
    pub signed: bool,
    pub signed_at: Option<chrono::NaiveDateTime>,
}

impl From<&SignatureField> for FieldView {
    fn from(field: &SignatureField) -> Self {
        Self {
            id: field.id.into(),
            assigned_user_id: field.assignee_id.into(),
            page: field.page,
            x: field.x,
            y: field.y,
            width: field.width,
            height: field.height,
            field_name: field.field_name.clone(),
            signed: field.signed,
            signed_at: field.signed_at,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct AssignedField {
    #[serde(flatten)]
    pub field: FieldView,
    pub assigned_username: String,
    pub created: bool,
}

#[derive(Serialize, Debug, Clone)]
pub struct DocumentView {
    pub document: DocumentSummary,
    pub state: CompletionState,
    pub fields: Vec<FieldView>,
    pub verification_url: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct SignOutcome {
    pub document: DocumentSummary,
    pub state: CompletionState,
    pub signed_fields: Vec<FieldView>,
    pub file_url: String,
    pub sha256: String,
    pub cryptographically_signed: bool,
    pub verification_url: Option<String>,
}

/// Ties the registry, PDF writer, overlay engine and completion tracker to user actions.
///
/// Every operation reads the stored PDF, builds the new bytes in memory and only replaces
/// the blob as the last step of the database transaction that records the change.
#[derive(Clone)]
pub struct Workflow<B: BlobStore> {
    blobs: B,
    signer: Option<Arc<dyn Signer>>,
    tracker: CompletionTracker,
}

fn load_document<S: Store>(store: &mut S, id: uuid::Uuid) -> Result<Document, Error> {
    store.document(id)?.ok_or(Error::NotFound("document"))
}

fn require_owner(document: &Document, user: &User, action: &'static str) -> Result<(), Error> {
    if document.owner_id == user.id {
        Ok(())
    } else {
        Err(Error::Forbidden(action))
    }
}

fn field_entries(fields: &[SignatureField]) -> Result<Vec<FieldEntry>, Error> {
    fields.iter().map(|f| Ok(FieldEntry {
        name: f.field_name.clone(),
        page: u32::try_from(f.page).map_err(|_| Error::Validation(format!("invalid page number {}", f.page)))?,
        rect: f.rect(),
    })).collect()
}

impl<B: BlobStore> Workflow<B> {
    pub fn new(blobs: B, signer: Option<Arc<dyn Signer>>, tracker: CompletionTracker) -> Self {
        Self {
            blobs,
            signer,
            tracker,
        }
    }

    pub fn upload<S: Store>(&self, store: &mut S, user: &User, filename: &str, bytes: &[u8]) -> Result<DocumentSummary, Error> {
        let filename = files::sanitize_filename(filename)?;
        let path = files::document_path(&user.username, filename);
        if self.blobs.exists(&path) {
            return Err(Error::Validation(format!("a document named {} already exists", filename)));
        }
        let normalized = pdf::normalize(bytes)?;

        let document = Document {
            id: uuid::Uuid::new_v4(),
            owner_id: user.id,
            file: path,
            uploaded_at: chrono::Utc::now().naive_utc(),
            signed: false,
        };
        store.transaction(|store| {
            store.insert_document(&document)?;
            self.blobs.replace(&document.file, &normalized)
        })?;

        info!("User {} uploaded document {} ({} bytes)", user.id, document.id, normalized.len());
        Ok((&document).into())
    }

    pub fn list_owned<S: Store>(&self, store: &mut S, user: &User) -> Result<Vec<DocumentSummary>, Error> {
        Ok(store.documents_owned_by(user.id)?.iter().map(Into::into).collect())
    }

    pub fn list_to_sign<S: Store>(&self, store: &mut S, user: &User) -> Result<Vec<PendingDocument>, Error> {
        store.documents_pending_for(user.id)?.iter().map(|document| {
            let pending = registry::fields_pending_for(store, document.id, user.id)?;
            Ok(PendingDocument {
                document: document.into(),
                pending_fields: pending.len(),
            })
        }).collect()
    }

    /// Current field state as visible to the caller: all fields for the owner, only their
    /// own fields for an assignee.
    pub fn document_view<S: Store>(&self, store: &mut S, user: &User, id: uuid::Uuid) -> Result<DocumentView, Error> {
        let document = load_document(store, id)?;
        let fields = store.fields(document.id)?;
        let visible = if document.owner_id == user.id {
            fields.iter().collect::<Vec<_>>()
        } else {
            let own = fields.iter().filter(|f| f.assignee_id == user.id).collect::<Vec<_>>();
            if own.is_empty() {
                return Err(Error::Forbidden("you are neither the owner nor a signer of this document"));
            }
            own
        };

        Ok(DocumentView {
            document: (&document).into(),
            state: CompletionState::of(&fields),
            fields: visible.into_iter().map(Into::into).collect(),
            verification_url: document.signed.then(|| self.tracker.verification_url(document.id)),
        })
    }

    pub fn document_file<S: Store>(&self, store: &mut S, user: &User, id: uuid::Uuid) -> Result<Vec<u8>, Error> {
        let document = load_document(store, id)?;
        if document.owner_id != user.id && !store.fields(document.id)?.iter().any(|f| f.assignee_id == user.id) {
            return Err(Error::Forbidden("you are neither the owner nor a signer of this document"));
        }
        self.blobs.read(&document.file)
    }

    /// Bulk-upserts fields and writes any new ones into the PDF form.
    ///
    /// Every entry is validated before anything is written; a failing entry leaves no trace.
    pub fn assign<S: Store>(&self, store: &mut S, user: &User, id: uuid::Uuid, entries: &[FieldAssignment]) -> Result<Vec<AssignedField>, Error> {
        let document = load_document(store, id)?;
        require_owner(&document, user, "only the document owner can assign signature fields")?;
        if entries.is_empty() {
            return Err(Error::Validation("no signature fields given".to_string()));
        }
        let requests = entries.iter().map(FieldAssignment::validate).collect::<Result<Vec<_>, _>>()?;
        if document.signed {
            return Err(Error::Validation("the document is already fully signed".to_string()));
        }

        let mut pdf = pdf::Document::load(&self.blobs.read(&document.file)?)?;
        if let Some(request) = requests.iter().find(|r| r.page as usize > pdf.page_count()) {
            return Err(Error::Validation(format!(
                "page {} does not exist, the document has {} page(s)", request.page, pdf.page_count()
            )));
        }

        let assigned = store.transaction(|store| {
            let mut assigned = Vec::with_capacity(requests.len());
            let mut fields = Vec::with_capacity(requests.len());
            for request in &requests {
                let (field, created) = registry::upsert_field(store, &document, request)?;
                let assignee = store.user(field.assignee_id)?.ok_or(Error::NotFound("assignee"))?;
                assigned.push(AssignedField {
                    field: (&field).into(),
                    assigned_username: assignee.username,
                    created,
                });
                fields.push(field);
            }

            let added = pdf.ensure_fields(&field_entries(&fields)?)?;
            if added > 0 {
                self.blobs.replace(&document.file, &pdf.finalise()?)?;
            }
            Ok(assigned)
        })?;

        info!(
            "User {} assigned {} field(s) on document {} ({} new)",
            user.id, assigned.len(), document.id, assigned.iter().filter(|a| a.created).count()
        );
        Ok(assigned)
    }

    fn signature_bitmap<S: Store>(&self, store: &mut S, user: &User) -> Result<pdf::Bitmap, Error> {
        let record = store.signature_image(user.id)?
            .ok_or_else(|| Error::MissingAsset(format!("no signature image registered for {}", user.username)))?;
        if !self.blobs.exists(&record.image_file) {
            return Err(Error::MissingAsset(format!("signature image {} not found", record.image_file)));
        }
        let png = self.blobs.read(&record.image_file)
            .map_err(|e| Error::MissingAsset(format!("unable to read {}: {}", record.image_file, e)))?;
        pdf::Bitmap::from_png(&png)
            .map_err(|e| Error::MissingAsset(format!("signature image {} is unusable: {}", record.image_file, e)))
    }

    /// Signs every pending field the caller holds on the document.
    ///
    /// The overlay, any cryptographic signatures and the completion stamp are all built
    /// before the field flags and the file are committed together.
    pub fn sign<S: Store>(&self, store: &mut S, user: &User, id: uuid::Uuid) -> Result<SignOutcome, Error> {
        let document = load_document(store, id)?;
        let fields = store.fields(document.id)?;
        if !fields.iter().any(|f| f.assignee_id == user.id) {
            return Err(Error::Forbidden("no signature fields on this document are assigned to you"));
        }
        let pending = fields.iter()
            .filter(|f| f.assignee_id == user.id && !f.signed)
            .cloned()
            .collect::<Vec<_>>();
        if pending.is_empty() {
            return Err(Error::Validation("no pending signature fields".to_string()));
        }

        let bitmap = self.signature_bitmap(store, user)?;

        let mut pdf = pdf::Document::load(&self.blobs.read(&document.file)?)?;
        pdf.ensure_fields(&field_entries(&pending)?)?;
        overlay::overlay_fields(&mut pdf, &bitmap, &pending)?;
        let mut bytes = pdf.finalise()?;

        if let Some(signer) = &self.signer {
            let meta = SignatureMeta {
                name: user.username.clone(),
                reason: format!("Signed by {}", user.username),
                date: chrono::Utc::now(),
            };
            for field in &pending {
                bytes = signing::sign_field(&bytes, &field.field_name, &meta, signer.as_ref())?;
            }
        } else {
            debug!("No signing credentials, document {} gets visual signatures only", document.id);
        }

        let signed_at = chrono::Utc::now().naive_utc();
        let pending_ids = pending.iter().map(|f| f.id).collect::<HashSet<_>>();
        let after = fields.into_iter().map(|mut f| {
            if pending_ids.contains(&f.id) {
                f.signed = true;
                f.signed_at = Some(signed_at);
            }
            f
        }).collect::<Vec<_>>();

        let state = CompletionState::of(&after);
        let stamped = self.tracker.finalize(&document, &after, &bytes)?;
        let completes = stamped.is_some();
        if let Some(stamped) = stamped {
            bytes = stamped;
        }

        let ids = pending_ids.iter().copied().collect::<Vec<_>>();
        store.transaction(|store| {
            store.mark_fields_signed(&ids, signed_at)?;
            if completes {
                store.set_document_signed(document.id, true)?;
            }
            self.blobs.replace(&document.file, &bytes)
        })?;

        info!("User {} signed {} field(s) on document {}, now {:?}", user.id, ids.len(), document.id, state);
        let mut summary = DocumentSummary::from(&document);
        summary.signed = document.signed || completes;
        Ok(SignOutcome {
            verification_url: summary.signed.then(|| self.tracker.verification_url(document.id)),
            document: summary,
            state,
            signed_fields: after.iter().filter(|f| pending_ids.contains(&f.id)).map(Into::into).collect(),
            file_url: self.tracker.verification_url(document.id),
            sha256: hex::encode(sha2::Sha256::digest(&bytes)),
            cryptographically_signed: self.signer.is_some(),
        })
    }

    /// Removes the document row, its fields and its file.
    ///
    /// The file goes only once the row deletion has committed, so a failure leaves at worst an orphaned file.
    pub fn delete<S: Store>(&self, store: &mut S, user: &User, id: uuid::Uuid) -> Result<(), Error> {
        let document = load_document(store, id)?;
        require_owner(&document, user, "only the document owner can delete it")?;
        store.transaction(|store| store.delete_document(document.id))?;
        if let Err(err) = self.blobs.remove(&document.file) {
            warn!("Unable to remove file {} of deleted document {}: {}", document.file, document.id, err);
        }
        info!("User {} deleted document {}", user.id, document.id);
        Ok(())
    }

    pub fn register_signature<S: Store>(&self, store: &mut S, user: &User, png: &[u8]) -> Result<(), Error> {
        let bitmap = pdf::Bitmap::from_png(png)?;
        let image = SignatureImage {
            user_id: user.id,
            image_file: files::signature_path(&user.username),
            uploaded_at: chrono::Utc::now().naive_utc(),
        };
        store.transaction(|store| {
            store.put_signature_image(&image)?;
            self.blobs.replace(&image.image_file, png)
        })?;
        info!("User {} registered a {}x{} signature image", user.id, bitmap.width, bitmap.height);
        Ok(())
    }
}
