//! Assembly of rendered page images into a PDF.
//!
//! Each image becomes one page holding a single full-page image XObject.
//! Page size in points is the pixel size scaled by `72 / dpi`.

use crate::error::{RedactorError, RedactorResult};
use image::RgbImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::Path;
use tracing::info;

/// Page size in points for an image of `pixels` rendered at `dpi`.
pub fn page_size_points(pixels: (u32, u32), dpi: u32) -> (f32, f32) {
    let scale = 72.0 / dpi.max(1) as f32;
    (pixels.0 as f32 * scale, pixels.1 as f32 * scale)
}

/// Builds an in-memory PDF with one page per image.
pub fn build_pdf(images: &[RgbImage], dpi: u32) -> RedactorResult<Document> {
    if images.is_empty() {
        return Err(RedactorError::InvalidInput {
            parameter: "images".to_string(),
            reason: "no page images to assemble".to_string(),
        });
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(images.len());

    for image in images {
        let (width, height) = image.dimensions();
        let (page_w, page_h) = page_size_points((width, height), dpi);

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(width),
                "Height" => i64::from(height),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8i64,
            },
            image.as_raw().clone(),
        ));

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(page_w),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Real(page_h),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(page_w),
                Object::Real(page_h),
            ],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    Ok(doc)
}

/// Writes the images to `output` as a PDF.
pub fn assemble_pdf(images: &[RgbImage], dpi: u32, output: &Path) -> RedactorResult<()> {
    let mut doc = build_pdf(images, dpi)?;
    doc.save(output).map_err(|e| RedactorError::io(output, e))?;
    info!(pages = images.len(), path = %output.display(), "wrote PDF");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_page_size_points() {
        assert_eq!(page_size_points((2550, 3300), 300), (612.0, 792.0));
    }

    #[test]
    fn test_one_page_per_image() {
        let images = vec![
            RgbImage::from_pixel(30, 40, Rgb([255, 255, 255])),
            RgbImage::from_pixel(30, 40, Rgb([0, 0, 0])),
        ];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pdf");
        assemble_pdf(&images, 300, &path).unwrap();

        let loaded = Document::load(&path).unwrap();
        assert_eq!(loaded.get_pages().len(), 2);
    }

    #[test]
    fn test_no_images_is_an_error() {
        assert!(matches!(
            build_pdf(&[], 300),
            Err(RedactorError::InvalidInput { .. })
        ));
    }
}
