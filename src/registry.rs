use crate::error::Error;
use crate::models::{Document, SignatureField};
use crate::pdf::Rect;
use crate::store::{FieldKey, Store};

pub const DEFAULT_WIDTH: f64 = 100.0;
pub const DEFAULT_HEIGHT: f64 = 50.0;

/// One entry of an assignment request body.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct FieldAssignment {
    pub assigned_user_id: crate::UserID,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    pub page: i64,
}

/// A validated assignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldRequest {
    pub assignee_id: uuid::Uuid,
    pub rect: Rect,
    pub page: i32,
}

impl FieldAssignment {
    pub fn validate(&self) -> Result<FieldRequest, Error> {
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(Error::Validation("field coordinates must be finite numbers".to_string()));
        }
        let width = self.width.unwrap_or(DEFAULT_WIDTH);
        let height = self.height.unwrap_or(DEFAULT_HEIGHT);
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(Error::Validation("field width and height must be positive".to_string()));
        }
        let page = i32::try_from(self.page).ok().filter(|p| *p >= 1)
            .ok_or_else(|| Error::Validation(format!("invalid page number {}", self.page)))?;

        Ok(FieldRequest {
            assignee_id: self.assigned_user_id.uuid,
            rect: Rect {
                x: self.x,
                y: self.y,
                width,
                height,
            },
            page,
        })
    }
}

fn coordinate(value: f64) -> String {
    // '.' separates name parts in PDF form field names
    value.to_string().replace('.', "p").replace('-', "m")
}

/// The form field name for a field, unique for every (document, assignee, x, y, page).
pub fn field_name(document_id: uuid::Uuid, assignee_id: uuid::Uuid, x: f64, y: f64, page: i32) -> String {
    format!(
        "Signature_{}_{}_{}_{}_{}",
        document_id.simple(), assignee_id.simple(), coordinate(x), coordinate(y), page
    )
}

/// Creates the field for `request`, or returns the one already registered under the same key.
///
/// An existing field is returned unchanged, including its size and signed state.
pub fn upsert_field<S: Store>(store: &mut S, document: &Document, request: &FieldRequest) -> Result<(SignatureField, bool), Error> {
    if store.user(request.assignee_id)?.is_none() {
        return Err(Error::NotFound("assignee"));
    }

    let key = FieldKey {
        document_id: document.id,
        assignee_id: request.assignee_id,
        x: request.rect.x,
        y: request.rect.y,
        page: request.page,
    };
    if let Some(existing) = store.find_field(&key)? {
        return Ok((existing, false));
    }

    let field = SignatureField {
        id: uuid::Uuid::new_v4(),
        document_id: document.id,
        assignee_id: request.assignee_id,
        page: request.page,
        x: request.rect.x,
        y: request.rect.y,
        width: request.rect.width,
        height: request.rect.height,
        field_name: field_name(document.id, request.assignee_id, request.rect.x, request.rect.y, request.page),
        signed: false,
        created_at: chrono::Utc::now().naive_utc(),
        signed_at: None,
    };
    store.insert_field(&field)?;
    Ok((field, true))
}

pub fn fields_pending_for<S: Store>(store: &mut S, document_id: uuid::Uuid, user_id: uuid::Uuid) -> Result<Vec<SignatureField>, Error> {
    Ok(store.fields(document_id)?.into_iter()
        .filter(|f| f.assignee_id == user_id && !f.signed)
        .collect())
}

pub fn fields_signed_for<S: Store>(store: &mut S, document_id: uuid::Uuid, user_id: uuid::Uuid) -> Result<Vec<SignatureField>, Error> {
    Ok(store.fields(document_id)?.into_iter()
        .filter(|f| f.assignee_id == user_id && f.signed)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn document(owner_id: uuid::Uuid) -> Document {
        Document {
            id: uuid::Uuid::new_v4(),
            owner_id,
            file: "documents/owner/d.pdf".to_string(),
            uploaded_at: chrono::Utc::now().naive_utc(),
            signed: false,
        }
    }

    fn assignment(user: uuid::Uuid, x: f64, y: f64, page: i64) -> FieldAssignment {
        FieldAssignment {
            assigned_user_id: user.into(),
            x,
            y,
            width: Some(100.0),
            height: Some(50.0),
            page,
        }
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut store = MemoryStore::default();
        let owner = store.add_user("owner");
        let alice = store.add_user("alice");
        let doc = document(owner.id);
        let request = assignment(alice.id, 10.0, 10.0, 1).validate().unwrap();

        let (first, created) = upsert_field(&mut store, &doc, &request).unwrap();
        assert!(created);
        assert!(!first.signed);
        assert_eq!(first.field_name, field_name(doc.id, alice.id, 10.0, 10.0, 1));

        let (second, created) = upsert_field(&mut store, &doc, &request).unwrap();
        assert!(!created);
        assert_eq!(first, second);
        assert_eq!(store.fields.len(), 1);
    }

    #[test]
    fn unknown_assignees_are_not_found() {
        let mut store = MemoryStore::default();
        let owner = store.add_user("owner");
        let request = assignment(uuid::Uuid::new_v4(), 10.0, 10.0, 1).validate().unwrap();
        assert!(matches!(
            upsert_field(&mut store, &document(owner.id), &request),
            Err(Error::NotFound("assignee"))
        ));
        assert!(store.fields.is_empty());
    }

    #[test]
    fn names_embed_every_key() {
        let doc = uuid::Uuid::new_v4();
        let user = uuid::Uuid::new_v4();
        let base = field_name(doc, user, 10.0, 10.0, 1);
        assert!(base.starts_with("Signature_"));
        assert!(!base.contains('.'));
        assert_ne!(base, field_name(doc, user, 10.5, 10.0, 1));
        assert_ne!(base, field_name(doc, user, 10.0, 10.0, 2));
        assert_ne!(field_name(doc, user, 1.0, 1.0, 1), field_name(doc, user, -1.0, 1.0, 1));
        assert_ne!(field_name(doc, user, 11.0, 1.0, 1), field_name(doc, user, 1.0, 11.0, 1));
    }

    #[test]
    fn validation_rejects_bad_geometry() {
        let user = uuid::Uuid::new_v4();
        assert!(assignment(user, f64::NAN, 1.0, 1).validate().is_err());
        assert!(assignment(user, 1.0, 1.0, 0).validate().is_err());
        assert!(assignment(user, 1.0, 1.0, i64::MAX).validate().is_err());

        let mut zero_width = assignment(user, 1.0, 1.0, 1);
        zero_width.width = Some(0.0);
        assert!(zero_width.validate().is_err());

        let mut defaults = assignment(user, 1.0, 1.0, 1);
        defaults.width = None;
        defaults.height = None;
        let request = defaults.validate().unwrap();
        assert_eq!((request.rect.width, request.rect.height), (DEFAULT_WIDTH, DEFAULT_HEIGHT));
    }

    #[test]
    fn request_bodies_are_strict() {
        let user = uuid::Uuid::new_v4();
        let ok = format!(r#"{{"assigned_user_id": "{}", "x": 10, "y": 10.5, "page": 1}}"#, user);
        let parsed: FieldAssignment = serde_json::from_str(&ok).unwrap();
        assert_eq!(parsed.assigned_user_id.uuid, user);
        assert_eq!(parsed.width, None);

        let missing_page = format!(r#"{{"assigned_user_id": "{}", "x": 10, "y": 10}}"#, user);
        assert!(serde_json::from_str::<FieldAssignment>(&missing_page).is_err());

        let unknown = format!(r#"{{"assigned_user_id": "{}", "x": 1, "y": 1, "page": 1, "colour": "red"}}"#, user);
        assert!(serde_json::from_str::<FieldAssignment>(&unknown).is_err());

        let null_x = format!(r#"{{"assigned_user_id": "{}", "x": null, "y": 1, "page": 1}}"#, user);
        assert!(serde_json::from_str::<FieldAssignment>(&null_x).is_err());
    }

    #[test]
    fn pending_and_signed_views_are_per_user() {
        let mut store = MemoryStore::default();
        let owner = store.add_user("owner");
        let alice = store.add_user("alice");
        let bob = store.add_user("bob");
        let doc = document(owner.id);

        let (a1, _) = upsert_field(&mut store, &doc, &assignment(alice.id, 10.0, 10.0, 2).validate().unwrap()).unwrap();
        let (a2, _) = upsert_field(&mut store, &doc, &assignment(alice.id, 10.0, 10.0, 1).validate().unwrap()).unwrap();
        upsert_field(&mut store, &doc, &assignment(bob.id, 10.0, 10.0, 1).validate().unwrap()).unwrap();
        store.mark_fields_signed(&[a1.id], chrono::Utc::now().naive_utc()).unwrap();

        let pending = fields_pending_for(&mut store, doc.id, alice.id).unwrap();
        assert_eq!(pending.iter().map(|f| f.id).collect::<Vec<_>>(), vec![a2.id]);
        let signed = fields_signed_for(&mut store, doc.id, alice.id).unwrap();
        assert_eq!(signed.iter().map(|f| f.id).collect::<Vec<_>>(), vec![a1.id]);
        assert_eq!(fields_pending_for(&mut store, doc.id, bob.id).unwrap().len(), 1);
    }
}
