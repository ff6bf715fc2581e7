use diesel::prelude::*;

use crate::error::Error;
use crate::{models, schema};

/// Identifies one field assignment; the registry upserts on this tuple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldKey {
    pub document_id: uuid::Uuid,
    pub assignee_id: uuid::Uuid,
    pub x: f64,
    pub y: f64,
    pub page: i32,
}

/// Persistence used by the registry and the orchestrator.
///
/// Field lists are always returned ordered by page, then by creation time.
pub trait Store {
    fn transaction<T, F>(&mut self, f: F) -> Result<T, Error>
        where F: FnOnce(&mut Self) -> Result<T, Error>;

    fn user(&mut self, id: uuid::Uuid) -> Result<Option<models::User>, Error>;
    fn user_by_username(&mut self, username: &str) -> Result<Option<models::User>, Error>;
    fn insert_user(&mut self, user: &models::User) -> Result<(), Error>;

    fn signature_image(&mut self, user_id: uuid::Uuid) -> Result<Option<models::SignatureImage>, Error>;
    fn put_signature_image(&mut self, image: &models::SignatureImage) -> Result<(), Error>;

    fn document(&mut self, id: uuid::Uuid) -> Result<Option<models::Document>, Error>;
    fn documents_owned_by(&mut self, owner_id: uuid::Uuid) -> Result<Vec<models::Document>, Error>;
    /// Documents where the user still has at least one unsigned field.
    fn documents_pending_for(&mut self, user_id: uuid::Uuid) -> Result<Vec<models::Document>, Error>;
    fn insert_document(&mut self, document: &models::Document) -> Result<(), Error>;
    fn set_document_signed(&mut self, id: uuid::Uuid, signed: bool) -> Result<(), Error>;
    /// Removes the document row together with its fields.
    fn delete_document(&mut self, id: uuid::Uuid) -> Result<(), Error>;

    fn fields(&mut self, document_id: uuid::Uuid) -> Result<Vec<models::SignatureField>, Error>;
    fn find_field(&mut self, key: &FieldKey) -> Result<Option<models::SignatureField>, Error>;
    fn insert_field(&mut self, field: &models::SignatureField) -> Result<(), Error>;
    fn mark_fields_signed(&mut self, ids: &[uuid::Uuid], at: chrono::NaiveDateTime) -> Result<(), Error>;
}

impl Store for diesel::PgConnection {
    fn transaction<T, F>(&mut self, f: F) -> Result<T, Error>
        where F: FnOnce(&mut Self) -> Result<T, Error> {
        diesel::Connection::transaction(self, f)
    }

    fn user(&mut self, id: uuid::Uuid) -> Result<Option<models::User>, Error> {
        Ok(schema::users::dsl::users.find(id).first::<models::User>(self).optional()?)
    }

    fn user_by_username(&mut self, username: &str) -> Result<Option<models::User>, Error> {
        Ok(schema::users::dsl::users
            .filter(schema::users::dsl::username.eq(username))
            .first::<models::User>(self).optional()?)
    }

    fn insert_user(&mut self, user: &models::User) -> Result<(), Error> {
        diesel::insert_into(schema::users::dsl::users)
            .values(user)
            .on_conflict_do_nothing()
            .execute(self)?;
        Ok(())
    }

    fn signature_image(&mut self, user_id: uuid::Uuid) -> Result<Option<models::SignatureImage>, Error> {
        Ok(schema::signature_images::dsl::signature_images
            .find(user_id)
            .first::<models::SignatureImage>(self).optional()?)
    }

    fn put_signature_image(&mut self, image: &models::SignatureImage) -> Result<(), Error> {
        diesel::insert_into(schema::signature_images::dsl::signature_images)
            .values(image)
            .on_conflict(schema::signature_images::dsl::user_id)
            .do_update()
            .set((
                schema::signature_images::dsl::image_file.eq(&image.image_file),
                schema::signature_images::dsl::uploaded_at.eq(image.uploaded_at),
            ))
            .execute(self)?;
        Ok(())
    }

    fn document(&mut self, id: uuid::Uuid) -> Result<Option<models::Document>, Error> {
        Ok(schema::documents::dsl::documents.find(id).first::<models::Document>(self).optional()?)
    }

    fn documents_owned_by(&mut self, owner_id: uuid::Uuid) -> Result<Vec<models::Document>, Error> {
        Ok(schema::documents::dsl::documents
            .filter(schema::documents::dsl::owner_id.eq(owner_id))
            .order_by(schema::documents::dsl::uploaded_at.desc())
            .load::<models::Document>(self)?)
    }

    fn documents_pending_for(&mut self, user_id: uuid::Uuid) -> Result<Vec<models::Document>, Error> {
        let pending = schema::signature_fields::dsl::signature_fields
            .select(schema::signature_fields::dsl::document_id)
            .filter(schema::signature_fields::dsl::assignee_id.eq(user_id))
            .filter(schema::signature_fields::dsl::signed.eq(false));
        Ok(schema::documents::dsl::documents
            .filter(schema::documents::dsl::id.eq_any(pending))
            .order_by(schema::documents::dsl::uploaded_at.desc())
            .load::<models::Document>(self)?)
    }

    fn insert_document(&mut self, document: &models::Document) -> Result<(), Error> {
        diesel::insert_into(schema::documents::dsl::documents)
            .values(document)
            .execute(self)?;
        Ok(())
    }

    fn set_document_signed(&mut self, id: uuid::Uuid, signed: bool) -> Result<(), Error> {
        diesel::update(schema::documents::dsl::documents.find(id))
            .set(schema::documents::dsl::signed.eq(signed))
            .execute(self)?;
        Ok(())
    }

    fn delete_document(&mut self, id: uuid::Uuid) -> Result<(), Error> {
        diesel::delete(schema::signature_fields::dsl::signature_fields.filter(
            schema::signature_fields::dsl::document_id.eq(id)
        )).execute(self)?;
        diesel::delete(schema::documents::dsl::documents.find(id)).execute(self)?;
        Ok(())
    }

    fn fields(&mut self, document_id: uuid::Uuid) -> Result<Vec<models::SignatureField>, Error> {
        Ok(schema::signature_fields::dsl::signature_fields
            .filter(schema::signature_fields::dsl::document_id.eq(document_id))
            .order_by((
                schema::signature_fields::dsl::page.asc(),
                schema::signature_fields::dsl::created_at.asc(),
            ))
            .load::<models::SignatureField>(self)?)
    }

    fn find_field(&mut self, key: &FieldKey) -> Result<Option<models::SignatureField>, Error> {
        Ok(schema::signature_fields::dsl::signature_fields
            .filter(schema::signature_fields::dsl::document_id.eq(key.document_id))
            .filter(schema::signature_fields::dsl::assignee_id.eq(key.assignee_id))
            .filter(schema::signature_fields::dsl::x.eq(key.x))
            .filter(schema::signature_fields::dsl::y.eq(key.y))
            .filter(schema::signature_fields::dsl::page.eq(key.page))
            .first::<models::SignatureField>(self).optional()?)
    }

    fn insert_field(&mut self, field: &models::SignatureField) -> Result<(), Error> {
        diesel::insert_into(schema::signature_fields::dsl::signature_fields)
            .values(field)
            .execute(self)?;
        Ok(())
    }

    fn mark_fields_signed(&mut self, ids: &[uuid::Uuid], at: chrono::NaiveDateTime) -> Result<(), Error> {
        diesel::update(schema::signature_fields::dsl::signature_fields.filter(
            schema::signature_fields::dsl::id.eq_any(ids)
        ))
            .set((
                schema::signature_fields::dsl::signed.eq(true),
                schema::signature_fields::dsl::signed_at.eq(Some(at)),
            ))
            .execute(self)?;
        Ok(())
    }
}
