use crate::schema::*;
use diesel::prelude::*;

#[derive(Insertable, Queryable, Identifiable, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[diesel(table_name = users)]
pub struct User {
    pub id: uuid::Uuid,
    pub username: String,
}

#[derive(Insertable, Queryable, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[diesel(table_name = signature_images)]
pub struct SignatureImage {
    pub user_id: uuid::Uuid,
    pub image_file: String,
    pub uploaded_at: chrono::NaiveDateTime,
}

#[derive(Insertable, Queryable, Identifiable, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[diesel(table_name = documents)]
pub struct Document {
    pub id: uuid::Uuid,
    pub owner_id: uuid::Uuid,
    pub file: String,
    pub uploaded_at: chrono::NaiveDateTime,
    /// Set once every field on the document is signed and the verification code is stamped.
    pub signed: bool,
}

#[derive(Insertable, Queryable, Identifiable, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[diesel(table_name = signature_fields)]
pub struct SignatureField {
    pub id: uuid::Uuid,
    pub document_id: uuid::Uuid,
    pub assignee_id: uuid::Uuid,
    pub page: i32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub field_name: String,
    pub signed: bool,
    pub created_at: chrono::NaiveDateTime,
    pub signed_at: Option<chrono::NaiveDateTime>,
}

impl SignatureField {
    pub fn rect(&self) -> crate::pdf::Rect {
        crate::pdf::Rect {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}
