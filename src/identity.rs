use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};

use crate::error::Error;
use crate::models::User;
use crate::store::Store;

/// The caller, as named by the trusted upstream identity header.
pub struct AuthenticatedUser(pub User);

fn validate_username(username: &str) -> Result<(), Error> {
    let valid = !username.is_empty()
        && username.len() <= 150
        && !username.starts_with('.')
        && username.chars().all(|c| c.is_ascii_alphanumeric() || "@._+-".contains(c));
    if valid {
        Ok(())
    } else {
        Err(Error::Validation(format!("invalid username {:?}", username)))
    }
}

/// Looks up a user by name, creating the account on first sight.
pub fn resolve_user<S: Store>(store: &mut S, username: &str) -> Result<User, Error> {
    validate_username(username)?;
    if let Some(user) = store.user_by_username(username)? {
        return Ok(user);
    }

    let user = User {
        id: uuid::Uuid::new_v4(),
        username: username.to_string(),
    };
    store.insert_user(&user)?;
    info!("Provisioned user {} ({})", user.username, user.id);
    // Another request may have provisioned the same name first.
    store.user_by_username(username)?.ok_or(Error::NotFound("user"))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthenticatedUser {
    type Error = Error;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let config = match request.rocket().state::<crate::Config>() {
            Some(c) => c,
            None => return Outcome::Error((
                Status::InternalServerError, Error::Config("configuration not managed".to_string())
            ))
        };
        let username = match request.headers().get_one(&config.identity_header) {
            Some(u) => u.trim().to_string(),
            None => return Outcome::Error((Status::Unauthorized, Error::Unauthenticated))
        };
        let db = match request.guard::<crate::DbConn>().await {
            Outcome::Success(db) => db,
            Outcome::Forward(s) => return Outcome::Forward(s),
            Outcome::Error((s, _)) => return Outcome::Error((
                s, Error::Config("database unavailable".to_string())
            ))
        };

        match db.run(move |c| resolve_user(c, &username)).await {
            Ok(user) => Outcome::Success(AuthenticatedUser(user)),
            Err(err) => Outcome::Error((err.status(), err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[test]
    fn users_are_provisioned_once() {
        let mut store = MemoryStore::default();
        let first = resolve_user(&mut store, "alice@example.com").unwrap();
        let second = resolve_user(&mut store, "alice@example.com").unwrap();
        assert_eq!(first, second);
        assert_eq!(store.users.len(), 1);
    }

    #[test]
    fn usernames_cannot_carry_paths() {
        let mut store = MemoryStore::default();
        for name in ["", "../root", "a/b", ".hidden", "a b"] {
            assert!(matches!(resolve_user(&mut store, name), Err(Error::Validation(_))));
        }
        assert!(store.users.is_empty());
    }
}
