use std::collections::{BTreeMap, HashMap, HashSet};
use lopdf::{Dictionary, Object, ObjectId, Stream, StringFormat};
use lopdf::content::{Content, Operation};

use crate::error::Error;

/// Bytes reserved for the DER encoded CMS signature inside `/Contents`.
pub const SIGNATURE_CAPACITY: usize = 8192;
/// Stand-in `/ByteRange` value; wide enough that real offsets always fit in its place.
pub const BYTE_RANGE_PLACEHOLDER: i64 = 9_999_999_999;

const MAX_FIELD_DEPTH: usize = 32;
const QUIET_ZONE: usize = 4;

/// A rectangle in PDF user space, origin at the lower left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    fn to_object(&self) -> Object {
        Object::Array(vec![
            real(self.x),
            real(self.y),
            real(self.x + self.width),
            real(self.y + self.height),
        ])
    }

    fn from_object(obj: &Object) -> Option<Rect> {
        let coords = obj.as_array().ok()?.iter().map(number).collect::<Option<Vec<_>>>()?;
        if coords.len() != 4 {
            return None;
        }
        let (llx, urx) = (coords[0].min(coords[2]), coords[0].max(coords[2]));
        let (lly, ury) = (coords[1].min(coords[3]), coords[1].max(coords[3]));
        Some(Rect {
            x: llx,
            y: lly,
            width: urx - llx,
            height: ury - lly,
        })
    }
}

/// A signature field as it is laid out in the interactive form.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEntry {
    pub name: String,
    /// 1-based; 0 when the widget has no page reference.
    pub page: u32,
    pub rect: Rect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub id: ObjectId,
    pub entry: FieldEntry,
}

/// The terminal fields of a document's `/AcroForm`, with fully qualified names.
#[derive(Debug, Clone, Default)]
pub struct FormRoot {
    pub fields: Vec<FormField>,
}

impl FormRoot {
    pub fn get(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.entry.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

pub struct SignatureMeta {
    pub name: String,
    pub reason: String,
    pub date: chrono::DateTime<chrono::Utc>,
}

/// Decoded raster image ready to become an image XObject.
#[derive(Debug, Clone)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    color_space: &'static str,
    pixels: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

impl Bitmap {
    pub fn from_png(data: &[u8]) -> Result<Self, Error> {
        let mut decoder = png::Decoder::new(data);
        decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
        let mut reader = decoder.read_info().map_err(png_error)?;
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf).map_err(png_error)?;
        let bytes = &buf[..info.buffer_size()];

        if info.bit_depth != png::BitDepth::Eight {
            return Err(Error::Validation(format!("unsupported PNG bit depth {:?}", info.bit_depth)));
        }

        let (pixels, color_space, alpha) = match info.color_type {
            png::ColorType::Grayscale => (bytes.to_vec(), "DeviceGray", None),
            png::ColorType::Rgb => (bytes.to_vec(), "DeviceRGB", None),
            png::ColorType::GrayscaleAlpha => {
                let (gray, alpha) = split_alpha(bytes, 2);
                (gray, "DeviceGray", Some(alpha))
            }
            png::ColorType::Rgba => {
                let (rgb, alpha) = split_alpha(bytes, 4);
                (rgb, "DeviceRGB", Some(alpha))
            }
            other => return Err(Error::Validation(format!("unsupported PNG color type {:?}", other)))
        };

        Ok(Bitmap {
            width: info.width,
            height: info.height,
            color_space,
            pixels,
            alpha,
        })
    }
}

fn split_alpha(bytes: &[u8], channels: usize) -> (Vec<u8>, Vec<u8>) {
    let mut color = Vec::with_capacity((bytes.len() / channels) * (channels - 1));
    let mut alpha = Vec::with_capacity(bytes.len() / channels);
    for (i, byte) in bytes.iter().enumerate() {
        if i % channels == channels - 1 {
            alpha.push(*byte);
        } else {
            color.push(*byte);
        }
    }
    (color, alpha)
}

fn png_error(err: png::DecodingError) -> Error {
    Error::Validation(format!("invalid PNG image: {}", err))
}

fn real(value: f64) -> Object {
    Object::Real(value as _)
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Scans every trailer in the file, since the parser drops `/XRefStm` from chained revisions.
fn is_hybrid(bytes: &[u8]) -> bool {
    let mut rest = bytes;
    while let Some(at) = find(rest, b"trailer") {
        let tail = &rest[at + b"trailer".len()..];
        let end = find(tail, b"startxref").unwrap_or(tail.len());
        if find(&tail[..end], b"/XRefStm").is_some() {
            return true;
        }
        rest = &tail[end..];
    }
    false
}

fn parse(bytes: &[u8]) -> Result<lopdf::Document, Error> {
    lopdf::Document::load_mem(bytes).map_err(|e| Error::PdfStructure(format!("unable to parse PDF: {}", e)))
}

/// Writes every object out again behind a single classic cross-reference table.
fn rewrite(mut doc: lopdf::Document) -> Result<Vec<u8>, Error> {
    doc.trailer.remove(b"XRefStm");
    doc.trailer.remove(b"Prev");
    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

/// Returns bytes an incremental writer can safely append to, rewriting hybrid files.
pub fn normalize(bytes: &[u8]) -> Result<Vec<u8>, Error> {
    let doc = parse(bytes)?;
    if !is_hybrid(bytes) {
        return Ok(bytes.to_vec());
    }
    warn!("Rewriting PDF with hybrid cross-reference table");
    let canonical = rewrite(doc)?;
    if is_hybrid(&canonical) {
        return Err(Error::PdfStructure("hybrid cross-reference table survived normalization".to_string()));
    }
    parse(&canonical)?;
    Ok(canonical)
}

/// A PDF open for one incremental revision.
///
/// Objects are read from the new revision first and then from the base file. Any object
/// that needs changing is copied into the new revision, so the base bytes are never touched.
pub struct Document {
    inner: lopdf::IncrementalDocument,
    pages: BTreeMap<u32, ObjectId>,
}

impl Document {
    pub fn load(bytes: &[u8]) -> Result<Self, Error> {
        let doc = parse(bytes)?;
        if !is_hybrid(bytes) {
            return Ok(Self::from_parts(bytes.to_vec(), doc));
        }

        warn!("Hybrid cross-reference table found, normalizing before incremental write");
        let canonical = rewrite(doc)?;
        if is_hybrid(&canonical) {
            return Err(Error::PdfStructure("hybrid cross-reference table survived normalization".to_string()));
        }
        let doc = parse(&canonical)?;
        Ok(Self::from_parts(canonical, doc))
    }

    fn from_parts(bytes: Vec<u8>, doc: lopdf::Document) -> Self {
        Self {
            pages: doc.get_pages(),
            inner: lopdf::IncrementalDocument::create_from(bytes, doc),
        }
    }

    /// Appends the new revision to the base bytes.
    pub fn finalise(mut self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::with_capacity(self.base_len() + 4096);
        self.inner.save_to(&mut out)?;
        Ok(out)
    }

    pub fn base_len(&self) -> usize {
        self.inner.get_prev_documents_bytes().len()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page_id(&self, page: u32) -> Result<ObjectId, Error> {
        match self.pages.get(&page) {
            Some(id) => Ok(*id),
            None => Err(Error::Validation(format!(
                "page {} does not exist, the document has {} page(s)", page, self.pages.len()
            )))
        }
    }

    fn get_object(&self, id: ObjectId) -> Result<&Object, Error> {
        match self.inner.new_document.objects.get(&id) {
            Some(obj) => Ok(obj),
            None => Ok(self.inner.get_prev_documents().get_object(id)?),
        }
    }

    fn get_dictionary(&self, id: ObjectId) -> Result<&Dictionary, Error> {
        Ok(self.get_object(id)?.as_dict()?)
    }

    fn resolve<'a>(&'a self, obj: &'a Object) -> Result<&'a Object, Error> {
        match obj {
            Object::Reference(id) => self.get_object(*id),
            other => Ok(other),
        }
    }

    fn object_mut(&mut self, id: ObjectId) -> Result<&mut Object, Error> {
        self.inner.opt_clone_object_to_new_document(id)?;
        Ok(self.inner.new_document.get_object_mut(id)?)
    }

    fn dictionary_mut(&mut self, id: ObjectId) -> Result<&mut Dictionary, Error> {
        Ok(self.object_mut(id)?.as_dict_mut()?)
    }

    fn add_object<T: Into<Object>>(&mut self, object: T) -> ObjectId {
        self.inner.new_document.add_object(object)
    }

    fn catalog_id(&self) -> Result<ObjectId, Error> {
        Ok(self.inner.get_prev_documents().trailer.get(b"Root")?.as_reference()?)
    }

    /// The array stored under `key` in `owner`, following one level of indirection and
    /// creating an empty inline array when absent.
    fn array_entry_mut(&mut self, owner: ObjectId, key: &'static str) -> Result<&mut Vec<Object>, Error> {
        let referenced = match self.get_dictionary(owner)?.get(key.as_bytes()) {
            Ok(Object::Reference(id)) => Some(*id),
            _ => None,
        };
        if let Some(id) = referenced {
            return Ok(self.object_mut(id)?.as_array_mut()?);
        }

        let dict = self.dictionary_mut(owner)?;
        if !matches!(dict.get(key.as_bytes()), Ok(Object::Array(_))) {
            dict.set(key, Vec::<Object>::new());
        }
        Ok(dict.get_mut(key.as_bytes())?.as_array_mut()?)
    }

    fn acro_form_id(&mut self) -> Result<ObjectId, Error> {
        let catalog_id = self.catalog_id()?;
        let existing = self.get_dictionary(catalog_id)?.get(b"AcroForm").ok().cloned();

        match existing {
            Some(Object::Reference(id)) => Ok(id),
            Some(Object::Dictionary(form)) => {
                // Lifted out of the catalog so later revisions only rewrite the form object.
                let id = self.add_object(form);
                self.dictionary_mut(catalog_id)?.set("AcroForm", id);
                Ok(id)
            }
            _ => {
                let id = self.add_object(dictionary! {
                    "Fields" => Vec::<Object>::new(),
                });
                self.dictionary_mut(catalog_id)?.set("AcroForm", id);
                Ok(id)
            }
        }
    }

    fn get_inherited_attr(&self, key: &[u8], page_id: ObjectId) -> Result<Option<&Object>, Error> {
        let mut node = self.get_dictionary(page_id)?;
        for _ in 0..MAX_FIELD_DEPTH {
            if let Ok(obj) = node.get(key) {
                return Ok(Some(self.resolve(obj)?));
            }
            match node.get(b"Parent").and_then(Object::as_reference) {
                Ok(parent) => node = self.get_dictionary(parent)?,
                Err(_) => return Ok(None),
            }
        }
        Ok(None)
    }

    pub fn page_box(&self, page: u32) -> Result<Rect, Error> {
        let page_id = self.page_id(page)?;
        self.get_inherited_attr(b"MediaBox", page_id)?
            .and_then(Rect::from_object)
            .ok_or_else(|| Error::PdfStructure(format!("page {} has no usable MediaBox", page)))
    }

    /// Reads the existing form fields.
    pub fn form(&self) -> Result<FormRoot, Error> {
        let catalog = self.get_dictionary(self.catalog_id()?)?;
        let form = match catalog.get(b"AcroForm") {
            Ok(obj) => self.resolve(obj)?.as_dict()?,
            Err(_) => return Ok(FormRoot::default()),
        };
        let fields = match form.get(b"Fields") {
            Ok(obj) => self.resolve(obj)?.as_array()?,
            Err(_) => return Ok(FormRoot::default()),
        };

        let page_numbers = self.pages.iter().map(|(n, id)| (*id, *n)).collect::<HashMap<_, _>>();
        let mut root = FormRoot::default();
        for field in fields {
            if let Ok(id) = field.as_reference() {
                self.collect_field(id, None, &page_numbers, &mut root, 0)?;
            }
        }
        Ok(root)
    }

    fn collect_field(
        &self, id: ObjectId, parent_name: Option<&str>, page_numbers: &HashMap<ObjectId, u32>,
        root: &mut FormRoot, depth: usize,
    ) -> Result<(), Error> {
        if depth > MAX_FIELD_DEPTH {
            return Err(Error::PdfStructure("form field hierarchy is too deep".to_string()));
        }
        let dict = self.get_dictionary(id)?;
        let partial = dict.get(b"T").and_then(Object::as_str).ok()
            .map(|t| String::from_utf8_lossy(t).into_owned());
        let name = match (parent_name, partial) {
            (Some(parent), Some(t)) => format!("{}.{}", parent, t),
            (None, Some(t)) => t,
            (Some(parent), None) => parent.to_string(),
            (None, None) => return Ok(()),
        };

        if let Ok(kids) = dict.get(b"Kids").and_then(Object::as_array) {
            for kid in kids {
                if let Ok(kid_id) = kid.as_reference() {
                    self.collect_field(kid_id, Some(&name), page_numbers, root, depth + 1)?;
                }
            }
            return Ok(());
        }

        let page = dict.get(b"P").and_then(Object::as_reference).ok()
            .and_then(|p| page_numbers.get(&p).copied())
            .unwrap_or(0);
        let rect = dict.get(b"Rect").ok().and_then(Rect::from_object).unwrap_or(Rect {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
        });
        root.fields.push(FormField {
            id,
            entry: FieldEntry {
                name,
                page,
                rect,
            },
        });
        Ok(())
    }

    /// Adds a signature widget for every entry whose name is not already in the form.
    ///
    /// Widgets are appended to the page `/Annots` and form `/Fields` in the order given.
    pub fn ensure_fields(&mut self, entries: &[FieldEntry]) -> Result<usize, Error> {
        let form = self.form()?;
        let mut seen = HashSet::new();
        let mut added = 0;

        for entry in entries {
            if form.contains(&entry.name) || !seen.insert(entry.name.as_str()) {
                continue;
            }
            let page_id = self.page_id(entry.page)?;
            let field_id = self.add_object(dictionary! {
                "FT" => "Sig",
                "Type" => "Annot",
                "Subtype" => "Widget",
                "Rect" => entry.rect.to_object(),
                "F" => 132,
                "T" => Object::String(entry.name.as_bytes().to_vec(), StringFormat::Literal),
                "P" => page_id,
            });

            self.array_entry_mut(page_id, "Annots")?.push(field_id.into());
            let form_id = self.acro_form_id()?;
            self.array_entry_mut(form_id, "Fields")?.push(field_id.into());
            added += 1;
        }

        Ok(added)
    }

    pub fn add_image(&mut self, bitmap: &Bitmap) -> ObjectId {
        let smask_id = bitmap.alpha.as_ref().map(|alpha| {
            self.add_object(Stream::new(dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "ColorSpace" => "DeviceGray",
                "Width" => bitmap.width as i64,
                "Height" => bitmap.height as i64,
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            }, deflate::deflate_bytes_zlib(alpha)).with_compression(false))
        });

        let mut img_dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "ColorSpace" => bitmap.color_space,
            "Width" => bitmap.width as i64,
            "Height" => bitmap.height as i64,
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        };
        if let Some(smask_id) = smask_id {
            img_dict.set("SMask", smask_id);
        }
        self.add_object(Stream::new(img_dict, deflate::deflate_bytes_zlib(&bitmap.pixels)).with_compression(false))
    }

    fn resources_mut(&mut self, page_id: ObjectId) -> Result<&mut Dictionary, Error> {
        let current = self.get_dictionary(page_id)?.get(b"Resources").ok().cloned();
        let inherited = match current {
            Some(Object::Reference(id)) => return self.dictionary_mut(id),
            Some(Object::Dictionary(_)) => None,
            _ => Some(match self.get_inherited_attr(b"Resources", page_id)? {
                Some(Object::Dictionary(d)) => d.clone(),
                _ => Dictionary::new(),
            }),
        };

        let page = self.dictionary_mut(page_id)?;
        if let Some(resources) = inherited {
            page.set("Resources", resources);
        }
        Ok(page.get_mut(b"Resources")?.as_dict_mut()?)
    }

    fn xobjects_mut(&mut self, page_id: ObjectId) -> Result<&mut Dictionary, Error> {
        let referenced = match self.resources_mut(page_id)?.get(b"XObject") {
            Ok(Object::Reference(id)) => Some(*id),
            _ => None,
        };
        if let Some(id) = referenced {
            return self.dictionary_mut(id);
        }

        let resources = self.resources_mut(page_id)?;
        if !matches!(resources.get(b"XObject"), Ok(Object::Dictionary(_))) {
            resources.set("XObject", Dictionary::new());
        }
        Ok(resources.get_mut(b"XObject")?.as_dict_mut()?)
    }

    /// Draws `operations` over the existing page content, isolated from its graphics state.
    fn append_content(&mut self, page_id: ObjectId, operations: Vec<Operation>) -> Result<(), Error> {
        let save_id = self.add_object(Stream::new(dictionary! {}, Content {
            operations: vec![Operation::new("q", vec![])]
        }.encode()?));
        let mut overlay = vec![Operation::new("Q", vec![])];
        overlay.extend(operations);
        let overlay_id = self.add_object(Stream::new(dictionary! {}, Content {
            operations: overlay
        }.encode()?));

        let existing = match self.get_dictionary(page_id)?.get(b"Contents") {
            Ok(Object::Reference(id)) => match self.get_object(*id)? {
                Object::Array(items) => items.clone(),
                _ => vec![Object::Reference(*id)],
            },
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![],
        };

        let mut contents = Vec::with_capacity(existing.len() + 2);
        contents.push(Object::Reference(save_id));
        contents.extend(existing);
        contents.push(Object::Reference(overlay_id));
        self.dictionary_mut(page_id)?.set("Contents", contents);
        Ok(())
    }

    /// Paints one image XObject into each rectangle on the page.
    pub fn draw_image(&mut self, page: u32, image_id: ObjectId, targets: &[Rect]) -> Result<(), Error> {
        let page_id = self.page_id(page)?;
        let img_name = format!("XSig{}", uuid::Uuid::new_v4().simple());
        self.xobjects_mut(page_id)?.set(img_name.clone(), image_id);

        let mut operations = Vec::with_capacity(targets.len() * 4);
        for target in targets {
            operations.extend(vec![
                Operation::new("q", vec![]),
                Operation::new("cm", vec![
                    real(target.width), 0.into(), 0.into(), real(target.height), real(target.x), real(target.y),
                ]),
                Operation::new("Do", vec![Object::Name(img_name.clone().into_bytes())]),
                Operation::new("Q", vec![]),
            ]);
        }
        self.append_content(page_id, operations)
    }

    /// Paints a square two-dimensional code of `size` points with its lower left corner at `origin`.
    ///
    /// `modules` is row-major, top row first, `width` modules per row. A light quiet zone
    /// of four modules surrounds the code.
    pub fn draw_modules(&mut self, page: u32, origin: (f64, f64), size: f64, modules: &[bool], width: usize) -> Result<(), Error> {
        if width == 0 || modules.len() != width * width {
            return Err(Error::Validation("module grid does not match its width".to_string()));
        }
        let page_id = self.page_id(page)?;
        let module = size / (width + 2 * QUIET_ZONE) as f64;
        let (x0, y0) = origin;

        let mut operations = vec![
            Operation::new("q", vec![]),
            Operation::new("g", vec![real(1.0)]),
            Operation::new("re", vec![real(x0), real(y0), real(size), real(size)]),
            Operation::new("f", vec![]),
            Operation::new("g", vec![real(0.0)]),
        ];
        for (i, _) in modules.iter().enumerate().filter(|(_, dark)| **dark) {
            let (row, col) = (i / width, i % width);
            operations.push(Operation::new("re", vec![
                real(x0 + (QUIET_ZONE + col) as f64 * module),
                real(y0 + size - (QUIET_ZONE + row + 1) as f64 * module),
                real(module),
                real(module),
            ]));
        }
        operations.push(Operation::new("f", vec![]));
        operations.push(Operation::new("Q", vec![]));

        self.append_content(page_id, operations)
    }

    /// Points the named field at a signature dictionary whose `/Contents` and `/ByteRange`
    /// are placeholders, to be filled in once the revision has been serialised.
    pub fn prepare_signature(&mut self, field_name: &str, meta: &SignatureMeta) -> Result<(), Error> {
        let form = self.form()?;
        let field = form.get(field_name).ok_or_else(|| {
            Error::PdfStructure(format!("signature field {} is not present in the document", field_name))
        })?;

        let sig_id = self.add_object(dictionary! {
            "Type" => "Sig",
            "Filter" => "Adobe.PPKLite",
            "SubFilter" => "adbe.pkcs7.detached",
            "Contents" => Object::String(vec![0; SIGNATURE_CAPACITY], StringFormat::Hexadecimal),
            "ByteRange" => vec![
                Object::Integer(0),
                Object::Integer(BYTE_RANGE_PLACEHOLDER),
                Object::Integer(BYTE_RANGE_PLACEHOLDER),
                Object::Integer(BYTE_RANGE_PLACEHOLDER),
            ],
            "M" => Object::String(
                meta.date.format("D:%Y%m%d%H%M%SZ").to_string().into_bytes(),
                StringFormat::Literal,
            ),
            "Name" => Object::String(meta.name.as_bytes().to_vec(), StringFormat::Literal),
            "Reason" => Object::String(meta.reason.as_bytes().to_vec(), StringFormat::Literal),
        });

        self.dictionary_mut(field.id)?.set("V", sig_id);
        let form_id = self.acro_form_id()?;
        self.dictionary_mut(form_id)?.set("SigFlags", 3);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, Stream};

    /// A plain document whose pages inherit `Resources` and `MediaBox` from the page tree.
    pub fn sample_pdf(pages: u32) -> Vec<u8> {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = vec![];
        for n in 0..pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(format!("Page {}", n + 1))]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(pages_id, Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    /// An RGBA checkerboard of the given size.
    pub fn sample_png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, width, height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            let data = (0..width * height)
                .flat_map(|i| [0u8, 0, 128, if i % 2 == 0 { 255 } else { 0 }])
                .collect::<Vec<u8>>();
            writer.write_image_data(&data).unwrap();
        }
        out
    }

    pub fn field_names(doc: &lopdf::Document) -> Vec<String> {
        let catalog = doc.catalog().unwrap();
        let form = match catalog.get(b"AcroForm") {
            Ok(Object::Reference(id)) => doc.get_dictionary(*id).unwrap(),
            Ok(Object::Dictionary(d)) => d,
            _ => return vec![],
        };
        let fields = match form.get(b"Fields").unwrap() {
            Object::Reference(id) => doc.get_object(*id).unwrap().as_array().unwrap(),
            other => other.as_array().unwrap(),
        };
        fields.iter().map(|f| {
            let field = doc.get_dictionary(f.as_reference().unwrap()).unwrap();
            String::from_utf8_lossy(field.get(b"T").unwrap().as_str().unwrap()).into_owned()
        }).collect()
    }
}
