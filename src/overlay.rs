use itertools::Itertools;

use crate::error::Error;
use crate::models::SignatureField;
use crate::pdf::{Bitmap, Document, Rect};

/// Where a signature image lands inside its field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub rect: Rect,
    pub scale: f64,
}

/// Scales an image to fit inside `target`, keeping its aspect ratio and its lower left
/// corner on the field's origin.
pub fn fit(target: &Rect, img_width: u32, img_height: u32) -> Placement {
    let scale = (target.width / img_width as f64).min(target.height / img_height as f64);
    Placement {
        rect: Rect {
            x: target.x,
            y: target.y,
            width: (img_width as f64 * scale).min(target.width),
            height: (img_height as f64 * scale).min(target.height),
        },
        scale,
    }
}

/// Composites the signature image into every field, one content stream per page.
///
/// The image is embedded once and referenced from each page it appears on.
pub fn overlay_fields(pdf: &mut Document, bitmap: &Bitmap, fields: &[SignatureField]) -> Result<Vec<Placement>, Error> {
    if fields.is_empty() {
        return Ok(vec![]);
    }

    let image_id = pdf.add_image(bitmap);
    let mut placements = Vec::with_capacity(fields.len());
    for (page, fields) in fields.iter().sorted_by_key(|f| f.page).group_by(|f| f.page).into_iter() {
        let page = u32::try_from(page)
            .map_err(|_| Error::Validation(format!("invalid page number {}", page)))?;
        let page_placements = fields.map(|f| fit(&f.rect(), bitmap.width, bitmap.height)).collect::<Vec<_>>();
        let targets = page_placements.iter().map(|p| p.rect).collect::<Vec<_>>();
        pdf.draw_image(page, image_id, &targets)?;
        debug!("Placed {} signature image(s) on page {}", targets.len(), page);
        placements.extend(page_placements);
    }
    Ok(placements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::testing::{sample_pdf, sample_png};

    fn rect(width: f64, height: f64) -> Rect {
        Rect {
            x: 10.0,
            y: 20.0,
            width,
            height,
        }
    }

    #[test]
    fn wide_images_are_limited_by_width() {
        let placement = fit(&rect(100.0, 50.0), 400, 100);
        assert_eq!(placement.scale, 0.25);
        assert_eq!(placement.rect, Rect {
            x: 10.0,
            y: 20.0,
            width: 100.0,
            height: 25.0,
        });
    }

    #[test]
    fn tall_images_are_limited_by_height() {
        let placement = fit(&rect(100.0, 50.0), 100, 200);
        assert_eq!(placement.scale, 0.25);
        assert_eq!(placement.rect.width, 25.0);
        assert_eq!(placement.rect.height, 50.0);
    }

    #[test]
    fn placement_never_exceeds_the_field_and_keeps_aspect_ratio() {
        for (w, h) in [(100.0, 50.0), (33.3, 71.9), (1.0, 1000.0), (612.0, 0.5)] {
            for (iw, ih) in [(1, 1), (3, 7), (640, 480), (17, 1023)] {
                let placement = fit(&rect(w, h), iw, ih);
                assert!(placement.rect.width <= w);
                assert!(placement.rect.height <= h);
                let expected = iw as f64 / ih as f64;
                let actual = placement.rect.width / placement.rect.height;
                assert!((expected - actual).abs() / expected < 1e-9);
            }
        }
    }

    #[test]
    fn small_images_scale_up_to_the_box() {
        let placement = fit(&rect(100.0, 50.0), 10, 10);
        assert_eq!(placement.rect.width, 50.0);
        assert_eq!(placement.rect.height, 50.0);
    }

    fn field(page: i32, x: f64) -> SignatureField {
        SignatureField {
            id: uuid::Uuid::new_v4(),
            document_id: uuid::Uuid::nil(),
            assignee_id: uuid::Uuid::nil(),
            page,
            x,
            y: 10.0,
            width: 100.0,
            height: 50.0,
            field_name: format!("Signature_{}_{}", page, x),
            signed: false,
            created_at: chrono::Utc::now().naive_utc(),
            signed_at: None,
        }
    }

    #[test]
    fn fields_are_grouped_per_page() {
        let mut pdf = Document::load(&sample_pdf(2)).unwrap();
        let bitmap = Bitmap::from_png(&sample_png(20, 10)).unwrap();
        let placements = overlay_fields(&mut pdf, &bitmap, &[field(2, 10.0), field(1, 10.0), field(2, 200.0)]).unwrap();
        assert_eq!(placements.len(), 3);

        let reloaded = lopdf::Document::load_mem(&pdf.finalise().unwrap()).unwrap();
        for (page, draws) in [(1, 1), (2, 2)] {
            let page_id = reloaded.get_pages()[&page];
            let content = lopdf::content::Content::decode(&reloaded.get_page_content(page_id).unwrap()).unwrap();
            assert_eq!(content.operations.iter().filter(|op| op.operator == "Do").count(), draws);
        }
    }

    #[test]
    fn fields_on_missing_pages_fail() {
        let mut pdf = Document::load(&sample_pdf(1)).unwrap();
        let bitmap = Bitmap::from_png(&sample_png(20, 10)).unwrap();
        assert!(matches!(overlay_fields(&mut pdf, &bitmap, &[field(4, 10.0)]), Err(Error::Validation(_))));
    }
}
