#[macro_use]
extern crate rocket;
#[macro_use]
extern crate serde;
#[macro_use]
extern crate lopdf;

use std::marker::PhantomData;
use std::sync::Arc;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use rocket_sync_db_pools::{database, Poolable};

pub mod error;
mod schema;
pub mod models;
pub mod store;
pub mod files;
pub mod identity;
pub mod registry;
pub mod pdf;
pub mod overlay;
pub mod signing;
pub mod completion;
pub mod workflow;
pub mod views;

pub use error::Error;

#[database("db")]
pub struct DbConn(diesel::PgConnection);

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

pub async fn db_run<
    T: 'static + std::marker::Send,
    F: 'static + FnOnce(&mut diesel::PgConnection) -> Result<T, Error> + std::marker::Send
>(db: &DbConn, func: F) -> Result<T, Error> {
    db.run(func).await
}

pub trait IdPrefix {
    const PREFIX: &'static str;
}

macro_rules! id_prefix {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name;

        impl IdPrefix for $name {
            const PREFIX: &'static str = $prefix;
        }
    };
}

id_prefix!(DocumentPrefix, "docsign_document");
id_prefix!(FieldPrefix, "docsign_field");
id_prefix!(UserPrefix, "docsign_user");

pub type DocumentID = TypedUUIDField<DocumentPrefix>;
pub type FieldID = TypedUUIDField<FieldPrefix>;
pub type UserID = TypedUUIDField<UserPrefix>;

/// A UUID that renders as `{prefix}_{uuid}` and accepts either form back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypedUUIDField<T: IdPrefix> {
    pub uuid: uuid::Uuid,
    prefix: PhantomData<T>,
}

impl<T: IdPrefix> TypedUUIDField<T> {
    pub fn parse(value: &str) -> Result<Self, &'static str> {
        let value = value.strip_prefix(T::PREFIX)
            .and_then(|v| v.strip_prefix('_'))
            .unwrap_or(value);
        match uuid::Uuid::parse_str(value) {
            Ok(id) => Ok(id.into()),
            Err(_) => Err("invalid UUID")
        }
    }
}

impl<T: IdPrefix> From<uuid::Uuid> for TypedUUIDField<T> {
    fn from(uuid: uuid::Uuid) -> Self {
        Self {
            uuid,
            prefix: PhantomData,
        }
    }
}

impl<T: IdPrefix> std::fmt::Display for TypedUUIDField<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", T::PREFIX, self.uuid.simple())
    }
}

impl<'a, T: IdPrefix> rocket::request::FromParam<'a> for TypedUUIDField<T> {
    type Error = &'static str;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        Self::parse(param)
    }
}

impl<T: IdPrefix> serde::Serialize for TypedUUIDField<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error> where S: serde::Serializer {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de, T: IdPrefix> serde::Deserialize<'de> for TypedUUIDField<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error> where D: serde::Deserializer<'de> {
        let value = <String as serde::Deserialize>::deserialize(deserializer)?;
        Self::parse(&value).map_err(serde::de::Error::custom)
    }
}

fn default_files_dir() -> std::path::PathBuf {
    "./files/".into()
}

fn default_identity_header() -> String {
    "X-Remote-User".to_string()
}

fn default_max_upload() -> rocket::data::ByteUnit {
    rocket::data::ByteUnit::Mebibyte(20)
}

#[derive(Deserialize)]
pub struct Config {
    pub external_uri: String,
    #[serde(default = "default_files_dir")]
    pub files_dir: std::path::PathBuf,
    #[serde(default = "default_identity_header")]
    pub identity_header: String,
    #[serde(default)]
    pub signing: Option<signing::SigningConfig>,
    #[serde(default)]
    pub stamp: completion::StampConfig,
    #[serde(default = "default_max_upload")]
    pub max_upload: rocket::data::ByteUnit,
}

pub type DocWorkflow = workflow::Workflow<files::FileStore>;

pub struct App {
    pub rocket: rocket::Rocket<rocket::Build>,
}

pub fn setup() -> Result<App, Error> {
    let figment = rocket::Config::figment()
        .merge(figment::providers::Env::prefixed("DOCSIGN_").global());
    let rocket = rocket::custom(figment);
    let config = rocket.figment().extract::<Config>()
        .map_err(|e| Error::Config(format!("unable to read config: {}", e)))?;

    let signer: Option<Arc<dyn signing::Signer>> = match &config.signing {
        Some(s) => {
            let keys = signing::SigningKeys::load(s)?;
            info!("Signing as {}", keys.subject());
            Some(Arc::new(keys))
        }
        None => {
            warn!("No signing credentials configured, signatures will be visual only");
            None
        }
    };

    let workflow: DocWorkflow = workflow::Workflow::new(
        files::FileStore::new(&config.files_dir),
        signer,
        completion::CompletionTracker::new(&config.external_uri, config.stamp.clone()),
    );

    let db_pool = diesel::PgConnection::pool("db", &rocket)
        .map_err(|e| Error::Config(format!("unable to setup database pool: {:?}", e)))?;
    let mut db = db_pool.get()
        .map_err(|e| Error::Config(format!("unable to get database connection: {}", e)))?;
    let conn: &mut diesel::PgConnection = &mut db;
    let applied = conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| Error::Config(format!("unable to run migrations: {}", e)))?;
    info!("Applied {} database migration(s)", applied.len());

    info!("Storing files under {}", config.files_dir.display());
    Ok(App {
        rocket: rocket
            .manage(workflow)
            .manage(config)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_with_or_without_prefix() {
        let uuid = uuid::Uuid::new_v4();
        let id = DocumentID::from(uuid);
        let rendered = id.to_string();
        assert!(rendered.starts_with("docsign_document_"));
        assert_eq!(DocumentID::parse(&rendered).unwrap(), id);
        assert_eq!(DocumentID::parse(&uuid.to_string()).unwrap(), id);
        assert!(DocumentID::parse("docsign_document_nope").is_err());

        let json = serde_json::to_string(&UserID::from(uuid)).unwrap();
        let back: UserID = serde_json::from_str(&json).unwrap();
        assert_eq!(back.uuid, uuid);
    }

    #[test]
    fn config_defaults() {
        let config: Config = rocket::figment::Figment::new()
            .merge(("external_uri", "https://sign.example.com"))
            .extract()
            .unwrap();
        assert_eq!(config.identity_header, "X-Remote-User");
        assert_eq!(config.files_dir, std::path::PathBuf::from("./files/"));
        assert_eq!(config.max_upload, rocket::data::ByteUnit::Mebibyte(20));
        assert!(config.signing.is_none());
        assert_eq!(config.stamp.size, 72.0);
    }
}
