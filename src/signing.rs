use openssl::cms::{CMSOptions, CmsContentInfo};
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;

use crate::error::Error;
use crate::pdf::{self, SignatureMeta, SIGNATURE_CAPACITY};

#[derive(Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum SigningConfig {
    Pkcs12 {
        pkcs12: String,
        #[serde(default)]
        passphrase: String,
    },
    Pem {
        key: String,
        cert: String,
        #[serde(default)]
        cert_chain: Vec<String>,
    },
}

/// Produces detached CMS signatures over the signed byte ranges of a PDF.
pub trait Signer: Send + Sync {
    fn sign_detached(&self, data: &[u8]) -> Result<Vec<u8>, Error>;
}

/// Key material loaded once at startup.
#[derive(Clone)]
pub struct SigningKeys {
    pkey: PKey<Private>,
    cert: X509,
    chain: Vec<X509>,
}

fn read_file(path: &str) -> Result<Vec<u8>, Error> {
    std::fs::read(path).map_err(|e| Error::SigningBackend(format!("unable to read {}: {}", path, e)))
}

impl SigningKeys {
    pub fn new(pkey: PKey<Private>, cert: X509, chain: Vec<X509>) -> Self {
        Self {
            pkey,
            cert,
            chain,
        }
    }

    pub fn load(config: &SigningConfig) -> Result<Self, Error> {
        match config {
            SigningConfig::Pkcs12 { pkcs12, passphrase } => {
                let parsed = openssl::pkcs12::Pkcs12::from_der(&read_file(pkcs12)?)?.parse2(passphrase)?;
                let pkey = parsed.pkey.ok_or_else(|| Error::SigningBackend(format!("{} contains no private key", pkcs12)))?;
                let cert = parsed.cert.ok_or_else(|| Error::SigningBackend(format!("{} contains no certificate", pkcs12)))?;
                let chain = parsed.ca.map(|ca| ca.into_iter().collect()).unwrap_or_default();
                Ok(Self::new(pkey, cert, chain))
            }
            SigningConfig::Pem { key, cert, cert_chain } => {
                let pkey = PKey::private_key_from_pem(&read_file(key)?)?;
                let cert = X509::from_pem(&read_file(cert)?)?;
                let chain = cert_chain.iter()
                    .map(|path| Ok(X509::from_pem(&read_file(path)?)?))
                    .collect::<Result<Vec<_>, Error>>()?;
                Ok(Self::new(pkey, cert, chain))
            }
        }
    }

    pub fn subject(&self) -> String {
        self.cert.subject_name().entries()
            .map(|e| String::from_utf8_lossy(e.data().as_slice()).into_owned())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Signer for SigningKeys {
    fn sign_detached(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let mut certs = openssl::stack::Stack::new()?;
        for cert in &self.chain {
            certs.push(cert.clone())?;
        }
        let cms = CmsContentInfo::sign(
            Some(&*self.cert), Some(&*self.pkey), Some(&*certs), Some(data),
            CMSOptions::DETACHED | CMSOptions::BINARY | CMSOptions::NOSMIMECAP,
        )?;
        Ok(cms.to_der()?)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Adds a revision that signs `field_name` with `signer`.
pub fn sign_field(bytes: &[u8], field_name: &str, meta: &SignatureMeta, signer: &dyn Signer) -> Result<Vec<u8>, Error> {
    let mut doc = pdf::Document::load(bytes)?;
    doc.prepare_signature(field_name, meta)?;
    let base_len = doc.base_len();
    let out = doc.finalise()?;
    embed_signature(out, base_len, signer)
}

/// Fills the placeholder `/ByteRange` and `/Contents` written after `base_len`.
fn embed_signature(mut bytes: Vec<u8>, base_len: usize, signer: &dyn Signer) -> Result<Vec<u8>, Error> {
    let hole = format!("<{}>", "0".repeat(SIGNATURE_CAPACITY * 2));
    let start = base_len + find(&bytes[base_len..], hole.as_bytes())
        .ok_or_else(|| Error::PdfStructure("signature placeholder not found".to_string()))?;
    let end = start + hole.len();

    let range_key = base_len + find(&bytes[base_len..], b"/ByteRange")
        .ok_or_else(|| Error::PdfStructure("byte range placeholder not found".to_string()))?;
    let open = range_key + find(&bytes[range_key..], b"[")
        .ok_or_else(|| Error::PdfStructure("malformed byte range".to_string()))?;
    let close = open + find(&bytes[open..], b"]")
        .ok_or_else(|| Error::PdfStructure("malformed byte range".to_string()))?;

    let ranges = format!("0 {} {} {}", start, end, bytes.len() - end);
    let slot = close - open - 1;
    if ranges.len() > slot {
        return Err(Error::PdfStructure("byte range does not fit its placeholder".to_string()));
    }
    bytes[open + 1..close].copy_from_slice(format!("{:<width$}", ranges, width = slot).as_bytes());

    let mut signed_data = Vec::with_capacity(bytes.len() - hole.len());
    signed_data.extend_from_slice(&bytes[..start]);
    signed_data.extend_from_slice(&bytes[end..]);
    let der = signer.sign_detached(&signed_data)?;
    if der.len() > SIGNATURE_CAPACITY {
        return Err(Error::SigningBackend(format!(
            "signature is {} bytes, only {} are reserved", der.len(), SIGNATURE_CAPACITY
        )));
    }

    let signature = hex::encode_upper(&der);
    bytes[start + 1..start + 1 + signature.len()].copy_from_slice(signature.as_bytes());
    Ok(bytes)
}

#[cfg(test)]
pub(crate) mod testing {
    use openssl::asn1::Asn1Time;
    use openssl::bn::BigNum;
    use openssl::hash::MessageDigest;
    use openssl::pkey::PKey;
    use openssl::x509::{X509NameBuilder, X509};

    pub fn self_signed() -> super::SigningKeys {
        let pkey = PKey::from_rsa(openssl::rsa::Rsa::generate(2048).unwrap()).unwrap();
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "docsign test").unwrap();
        let name = name.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        builder.set_serial_number(&BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap()).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&pkey).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(1).unwrap()).unwrap();
        builder.sign(&pkey, MessageDigest::sha256()).unwrap();

        super::SigningKeys::new(pkey, builder.build(), vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::testing::sample_pdf;
    use crate::pdf::{FieldEntry, Rect};

    fn with_field() -> Vec<u8> {
        let mut doc = pdf::Document::load(&sample_pdf(1)).unwrap();
        doc.ensure_fields(&[FieldEntry {
            name: "Signature_a".to_string(),
            page: 1,
            rect: Rect {
                x: 10.0,
                y: 10.0,
                width: 100.0,
                height: 50.0,
            },
        }]).unwrap();
        doc.finalise().unwrap()
    }

    fn meta() -> SignatureMeta {
        SignatureMeta {
            name: "alice".to_string(),
            reason: "Signed".to_string(),
            date: chrono::Utc::now(),
        }
    }

    fn byte_range(bytes: &[u8], from: usize) -> Vec<usize> {
        let key = from + find(&bytes[from..], b"/ByteRange").unwrap();
        let open = key + find(&bytes[key..], b"[").unwrap();
        let close = open + find(&bytes[open..], b"]").unwrap();
        std::str::from_utf8(&bytes[open + 1..close]).unwrap()
            .split_whitespace()
            .map(|n| n.parse().unwrap())
            .collect()
    }

    #[test]
    fn subject_lists_certificate_name_entries() {
        assert_eq!(testing::self_signed().subject(), "docsign test");
    }

    #[test]
    fn signature_covers_everything_but_the_contents() {
        let base = with_field();
        let keys = testing::self_signed();
        let signed = sign_field(&base, "Signature_a", &meta(), &keys).unwrap();

        assert_eq!(&signed[..base.len()], &base[..]);
        let range = byte_range(&signed, base.len());
        assert_eq!(range.len(), 4);
        assert_eq!(range[0], 0);
        assert_eq!(range[2] + range[3], signed.len());
        assert_eq!(signed[range[1]], b'<');
        assert_eq!(signed[range[2] - 1], b'>');

        let hex_contents = std::str::from_utf8(&signed[range[1] + 1..range[2] - 1]).unwrap();
        // The DER structure is followed by zero padding up to the reserved size.
        let der = hex::decode(hex_contents).unwrap();
        assert_eq!(der.len(), SIGNATURE_CAPACITY);
        assert!(CmsContentInfo::from_der(&der).is_ok());

        let reloaded = lopdf::Document::load_mem(&signed).unwrap();
        assert_eq!(reloaded.get_pages().len(), 1);
    }

    #[test]
    fn each_field_gets_its_own_revision() {
        let base = with_field();
        let keys = testing::self_signed();
        let once = sign_field(&base, "Signature_a", &meta(), &keys).unwrap();
        let twice = sign_field(&once, "Signature_a", &meta(), &keys).unwrap();
        assert_eq!(&twice[..once.len()], &once[..]);
        assert_eq!(byte_range(&twice, once.len())[0], 0);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let keys = testing::self_signed();
        assert!(matches!(
            sign_field(&with_field(), "Signature_b", &meta(), &keys),
            Err(Error::PdfStructure(_))
        ));
    }

    struct Oversized;

    impl Signer for Oversized {
        fn sign_detached(&self, _data: &[u8]) -> Result<Vec<u8>, Error> {
            Ok(vec![1; SIGNATURE_CAPACITY + 1])
        }
    }

    #[test]
    fn oversized_signatures_fail() {
        assert!(matches!(
            sign_field(&with_field(), "Signature_a", &meta(), &Oversized),
            Err(Error::SigningBackend(_))
        ));
    }

    #[test]
    fn missing_credentials_are_a_backend_error() {
        let config = SigningConfig::Pem {
            key: "/nonexistent/key.pem".to_string(),
            cert: "/nonexistent/cert.pem".to_string(),
            cert_chain: vec![],
        };
        assert!(matches!(SigningKeys::load(&config), Err(Error::SigningBackend(_))));
    }
}
