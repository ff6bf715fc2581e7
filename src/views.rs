use rocket::data::Data;
use rocket::http::{ContentType, Status};
use rocket::response::status;
use rocket::serde::json::Json;

use crate::error::Error;
use crate::identity::AuthenticatedUser;
use crate::registry::FieldAssignment;
use crate::workflow::{AssignedField, DocumentSummary, DocumentView, PendingDocument, SignOutcome};
use crate::{Config, DbConn, DocWorkflow, DocumentID};

/// Assignment bodies are either a bare list or wrapped as `{"signatures": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum AssignBody {
    List(Vec<FieldAssignment>),
    Wrapped {
        signatures: Vec<FieldAssignment>,
    },
}

impl AssignBody {
    fn into_entries(self) -> Vec<FieldAssignment> {
        match self {
            AssignBody::List(entries) => entries,
            AssignBody::Wrapped { signatures } => signatures,
        }
    }
}

#[derive(Serialize)]
pub struct CatcherBody {
    error: &'static str,
    message: String,
}

async fn read_body(data: Data<'_>, config: &Config) -> Result<Vec<u8>, Error> {
    let body = data.open(config.max_upload).into_bytes().await?;
    if !body.is_complete() {
        return Err(Error::Validation(format!("request body exceeds {}", config.max_upload)));
    }
    Ok(body.into_inner())
}

#[post("/documents?<filename>", data = "<data>")]
pub async fn upload_document(
    filename: String, data: Data<'_>, user: AuthenticatedUser, db: DbConn,
    workflow: &rocket::State<DocWorkflow>, config: &rocket::State<Config>,
) -> Result<status::Created<Json<DocumentSummary>>, Error> {
    let bytes = read_body(data, config).await?;
    let workflow = workflow.inner().clone();
    let summary = crate::db_run(&db, move |c| {
        workflow.upload(c, &user.0, &filename, &bytes)
    }).await?;

    Ok(status::Created::new(format!("/documents/{}", summary.id)).body(Json(summary)))
}

#[get("/documents")]
pub async fn documents(
    user: AuthenticatedUser, db: DbConn, workflow: &rocket::State<DocWorkflow>,
) -> Result<Json<Vec<DocumentSummary>>, Error> {
    let workflow = workflow.inner().clone();
    Ok(Json(crate::db_run(&db, move |c| workflow.list_owned(c, &user.0)).await?))
}

#[get("/documents/to-sign")]
pub async fn documents_to_sign(
    user: AuthenticatedUser, db: DbConn, workflow: &rocket::State<DocWorkflow>,
) -> Result<Json<Vec<PendingDocument>>, Error> {
    let workflow = workflow.inner().clone();
    Ok(Json(crate::db_run(&db, move |c| workflow.list_to_sign(c, &user.0)).await?))
}

#[get("/documents/<id>")]
pub async fn document(
    id: DocumentID, user: AuthenticatedUser, db: DbConn, workflow: &rocket::State<DocWorkflow>,
) -> Result<Json<DocumentView>, Error> {
    let workflow = workflow.inner().clone();
    Ok(Json(crate::db_run(&db, move |c| workflow.document_view(c, &user.0, id.uuid)).await?))
}

#[get("/documents/<id>/file")]
pub async fn document_file(
    id: DocumentID, user: AuthenticatedUser, db: DbConn, workflow: &rocket::State<DocWorkflow>,
) -> Result<(ContentType, Vec<u8>), Error> {
    let workflow = workflow.inner().clone();
    let bytes = crate::db_run(&db, move |c| workflow.document_file(c, &user.0, id.uuid)).await?;
    Ok((ContentType::PDF, bytes))
}

#[post("/documents/<id>/fields", data = "<body>")]
pub async fn assign_fields(
    id: DocumentID, body: Result<Json<AssignBody>, rocket::serde::json::Error<'_>>,
    user: AuthenticatedUser, db: DbConn, workflow: &rocket::State<DocWorkflow>,
) -> Result<status::Custom<Json<Vec<AssignedField>>>, Error> {
    let entries = match body {
        Ok(body) => body.into_inner().into_entries(),
        Err(err) => return Err(Error::Validation(format!("malformed signature field list: {}", err)))
    };
    let workflow = workflow.inner().clone();
    let assigned = crate::db_run(&db, move |c| {
        workflow.assign(c, &user.0, id.uuid, &entries)
    }).await?;

    Ok(status::Custom(Status::Created, Json(assigned)))
}

#[post("/documents/<id>/sign")]
pub async fn sign_document(
    id: DocumentID, user: AuthenticatedUser, db: DbConn, workflow: &rocket::State<DocWorkflow>,
) -> Result<Json<SignOutcome>, Error> {
    let workflow = workflow.inner().clone();
    Ok(Json(crate::db_run(&db, move |c| workflow.sign(c, &user.0, id.uuid)).await?))
}

#[delete("/documents/<id>")]
pub async fn delete_document(
    id: DocumentID, user: AuthenticatedUser, db: DbConn, workflow: &rocket::State<DocWorkflow>,
) -> Result<Status, Error> {
    let workflow = workflow.inner().clone();
    crate::db_run(&db, move |c| workflow.delete(c, &user.0, id.uuid)).await?;
    Ok(Status::NoContent)
}

#[put("/signature", data = "<data>")]
pub async fn register_signature(
    data: Data<'_>, user: AuthenticatedUser, db: DbConn,
    workflow: &rocket::State<DocWorkflow>, config: &rocket::State<Config>,
) -> Result<Status, Error> {
    let png = read_body(data, config).await?;
    let workflow = workflow.inner().clone();
    crate::db_run(&db, move |c| workflow.register_signature(c, &user.0, &png)).await?;
    Ok(Status::NoContent)
}

/// Gives guard failures (missing identity header, bad ids) the same JSON shape as handler errors.
#[catch(default)]
pub fn default_catcher(status: Status, _request: &rocket::Request<'_>) -> (Status, Json<CatcherBody>) {
    let error = match status.code {
        401 => "unauthenticated",
        404 => "not_found",
        422 => "validation_error",
        400..=499 => "bad_request",
        _ => "internal_error",
    };
    (status, Json(CatcherBody {
        error,
        message: status.reason().unwrap_or("unknown error").to_string(),
    }))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        upload_document,
        documents,
        documents_to_sign,
        document,
        document_file,
        assign_fields,
        sign_document,
        delete_document,
        register_signature,
    ]
}

pub fn catchers() -> Vec<rocket::Catcher> {
    catchers![default_catcher]
}
