use crate::error::Error;
use crate::models::{Document, SignatureField};
use crate::pdf::{self, Rect};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompletionState {
    Open,
    PartiallySigned,
    Complete,
}

impl CompletionState {
    /// A document with no fields is never complete.
    pub fn of(fields: &[SignatureField]) -> Self {
        let signed = fields.iter().filter(|f| f.signed).count();
        if signed == 0 {
            CompletionState::Open
        } else if signed == fields.len() {
            CompletionState::Complete
        } else {
            CompletionState::PartiallySigned
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    BottomRight,
    BottomLeft,
    TopRight,
    TopLeft,
}

impl Default for Corner {
    fn default() -> Self {
        Corner::BottomRight
    }
}

fn default_margin() -> f64 {
    24.0
}

fn default_size() -> f64 {
    72.0
}

#[derive(Deserialize, Debug, Clone)]
pub struct StampConfig {
    #[serde(default)]
    pub corner: Corner,
    #[serde(default = "default_margin")]
    pub margin: f64,
    #[serde(default = "default_size")]
    pub size: f64,
}

impl Default for StampConfig {
    fn default() -> Self {
        Self {
            corner: Corner::default(),
            margin: default_margin(),
            size: default_size(),
        }
    }
}

impl StampConfig {
    /// Lower left corner of the stamp on a page with the given media box.
    pub fn origin(&self, page: &Rect) -> (f64, f64) {
        let left = page.x + self.margin;
        let right = page.x + page.width - self.margin - self.size;
        let bottom = page.y + self.margin;
        let top = page.y + page.height - self.margin - self.size;
        match self.corner {
            Corner::BottomRight => (right, bottom),
            Corner::BottomLeft => (left, bottom),
            Corner::TopRight => (right, top),
            Corner::TopLeft => (left, top),
        }
    }
}

/// Decides when a document is complete and stamps its verification code.
#[derive(Debug, Clone)]
pub struct CompletionTracker {
    external_uri: String,
    stamp: StampConfig,
}

impl CompletionTracker {
    pub fn new(external_uri: &str, stamp: StampConfig) -> Self {
        Self {
            external_uri: external_uri.trim_end_matches('/').to_string(),
            stamp,
        }
    }

    pub fn verification_url(&self, document_id: uuid::Uuid) -> String {
        format!("{}/documents/{}/file", self.external_uri, crate::DocumentID::from(document_id))
    }

    /// Returns the stamped file when `fields` take the document to `Complete` for the first time.
    ///
    /// Runs after every per-field signature has been applied. Documents already marked
    /// signed are left alone.
    pub fn finalize(&self, document: &Document, fields: &[SignatureField], bytes: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        if document.signed || CompletionState::of(fields) != CompletionState::Complete {
            return Ok(None);
        }
        let url = self.verification_url(document.id);
        info!("Document {} complete, stamping verification code for {}", document.id, url);
        Ok(Some(self.stamp(bytes, &url)?))
    }

    fn stamp(&self, bytes: &[u8], url: &str) -> Result<Vec<u8>, Error> {
        let code = qrcode::QrCode::new(url.as_bytes())
            .map_err(|e| Error::Validation(format!("unable to encode verification URL: {}", e)))?;
        let width = code.width();
        let modules = code.to_colors().into_iter()
            .map(|c| c == qrcode::Color::Dark)
            .collect::<Vec<_>>();

        let mut doc = pdf::Document::load(bytes)?;
        let origin = self.stamp.origin(&doc.page_box(1)?);
        doc.draw_modules(1, origin, self.stamp.size, &modules, width)?;
        doc.finalise()
    }
}
