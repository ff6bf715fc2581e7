use rocket::http::Status;
use rocket::serde::json::Json;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("no authenticated user")]
    Unauthenticated,
    #[error("missing signature asset: {0}")]
    MissingAsset(String),
    #[error("malformed PDF structure: {0}")]
    PdfStructure(String),
    #[error("signing backend failure: {0}")]
    SigningBackend(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        Error::PdfStructure(err.to_string())
    }
}

impl From<openssl::error::ErrorStack> for Error {
    fn from(err: openssl::error::ErrorStack) -> Self {
        Error::SigningBackend(err.to_string())
    }
}

impl Error {
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::NotFound(_) => "not_found",
            Error::Forbidden(_) => "forbidden",
            Error::Unauthenticated => "unauthenticated",
            Error::MissingAsset(_) => "missing_asset",
            Error::PdfStructure(_) => "pdf_structure_error",
            Error::SigningBackend(_) => "signing_backend_error",
            Error::Database(_) | Error::Storage(_) | Error::Config(_) => "internal_error",
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Error::Validation(_) | Error::MissingAsset(_) => Status::BadRequest,
            Error::Unauthenticated => Status::Unauthorized,
            Error::Forbidden(_) => Status::Forbidden,
            Error::NotFound(_) => Status::NotFound,
            Error::PdfStructure(_) => Status::UnprocessableEntity,
            Error::SigningBackend(_) | Error::Database(_) | Error::Storage(_) | Error::Config(_) => {
                Status::InternalServerError
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl<'r> rocket::response::Responder<'r, 'static> for Error {
    fn respond_to(self, request: &'r rocket::Request<'_>) -> rocket::response::Result<'static> {
        let status = self.status();
        if status.code >= 500 {
            error!("{} {}: {}", request.method(), request.uri(), self);
        } else {
            debug!("{} {}: {}", request.method(), request.uri(), self);
        }

        // Internal details stay in the log.
        let message = if status.code >= 500 {
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorBody {
            error: self.kind(),
            message,
        })).respond_to(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(Error::Validation("x".into()).status(), Status::BadRequest);
        assert_eq!(Error::MissingAsset("x".into()).status(), Status::BadRequest);
        assert_eq!(Error::NotFound("document").status(), Status::NotFound);
        assert_eq!(Error::Forbidden("not owner").status(), Status::Forbidden);
        assert_eq!(Error::PdfStructure("x".into()).status(), Status::UnprocessableEntity);
        assert_eq!(Error::SigningBackend("x".into()).status(), Status::InternalServerError);
    }

    #[test]
    fn io_errors_become_storage_errors() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(err.kind(), "internal_error");
    }
}
