use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Byte storage addressed by relative paths such as `documents/alice/lease.pdf`.
pub trait BlobStore {
    fn read(&self, path: &str) -> Result<Vec<u8>, Error>;

    /// Replaces the blob at `path` so that readers only ever observe the old or the new bytes.
    fn replace(&self, path: &str, bytes: &[u8]) -> Result<(), Error>;

    fn exists(&self, path: &str) -> bool;

    fn remove(&self, path: &str) -> Result<(), Error>;
}

#[derive(Clone, Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into()
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, Error> {
        let relative = Path::new(path);
        if relative.is_absolute() || relative.components().any(|c| !matches!(c, std::path::Component::Normal(_))) {
            return Err(Error::Validation(format!("invalid storage path: {}", path)));
        }
        Ok(self.root.join(relative))
    }
}

impl BlobStore for FileStore {
    fn read(&self, path: &str) -> Result<Vec<u8>, Error> {
        Ok(std::fs::read(self.resolve(path)?)?)
    }

    fn replace(&self, path: &str, bytes: &[u8]) -> Result<(), Error> {
        let target = self.resolve(path)?;
        let dir = target.parent().unwrap_or(self.root.as_path());
        std::fs::create_dir_all(dir)?;

        // The temporary file lives next to the target so the final rename stays on one filesystem.
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        trace!("Replaced {} ({} bytes)", path, bytes.len());
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_file()).unwrap_or(false)
    }

    fn remove(&self, path: &str) -> Result<(), Error> {
        match std::fs::remove_file(self.resolve(path)?) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Rejects anything that is not a bare `*.pdf` file name.
pub fn sanitize_filename(filename: &str) -> Result<&str, Error> {
    let filename = filename.trim();
    if filename.is_empty()
        || filename.starts_with('.')
        || filename.contains(|c| c == '/' || c == '\\' || c == '\0')
    {
        return Err(Error::Validation(format!("invalid file name: {:?}", filename)));
    }
    if !filename.to_ascii_lowercase().ends_with(".pdf") {
        return Err(Error::Validation("only PDF documents can be uploaded".to_string()));
    }
    Ok(filename)
}

pub fn document_path(username: &str, filename: &str) -> String {
    format!("documents/{}/{}", username, filename)
}

pub fn signature_path(username: &str) -> String {
    format!("signatures/{}_signature.png", username)
}
