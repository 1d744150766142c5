// src/tools/img_to_pdf.rs

use image::codecs::jpeg::JpegEncoder;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use crate::error::ToolError;
use crate::models::{ImageFit, ToolOutput, UploadedFile};

pub const MAX_IMAGES: usize = 20;

/// A4 in PDF points.
pub const PAGE_WIDTH: f64 = 595.28;
pub const PAGE_HEIGHT: f64 = 841.89;

const SUPPORTED_TYPES: [&str; 4] = ["image/jpeg", "image/jpg", "image/png", "image/webp"];
const JPEG_QUALITY: u8 = 100;

/// Where an image is drawn on its page, in points from the bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Computes the drawn rectangle of an `image_w × image_h` image on a
/// `page_w × page_h` page.
///
/// `Stretch` covers the page exactly. `Fit` keeps the aspect ratio and stays
/// inside the page; `Fill` keeps the aspect ratio and covers the page, with
/// the overflow clipped by the page box. Both are centred.
pub fn place(image_w: f64, image_h: f64, page_w: f64, page_h: f64, fit: ImageFit) -> Placement {
    let image_ratio = image_w / image_h;
    let page_ratio = page_w / page_h;

    let (width, height) = match fit {
        ImageFit::Stretch => {
            return Placement {
                x: 0.0,
                y: 0.0,
                width: page_w,
                height: page_h,
            }
        }
        ImageFit::Fill => {
            if image_ratio > page_ratio {
                (page_h * image_ratio, page_h)
            } else {
                (page_w, page_w / image_ratio)
            }
        }
        ImageFit::Fit => {
            if image_ratio > page_ratio {
                (page_w, page_w / image_ratio)
            } else {
                (page_h * image_ratio, page_h)
            }
        }
    };

    Placement {
        x: (page_w - width) / 2.0,
        y: (page_h - height) / 2.0,
        width,
        height,
    }
}

struct NormalizedImage {
    jpeg: Vec<u8>,
    width: u32,
    height: u32,
}

fn is_supported(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    SUPPORTED_TYPES.contains(&ct.as_str())
}

// Decodes whatever the client sent and re-encodes it as baseline RGB JPEG,
// the one format the PDF embeds without conversion.
fn normalize(index: usize, file: &UploadedFile) -> Result<NormalizedImage, ToolError> {
    if !is_supported(&file.content_type) {
        return Err(ToolError::execution_at(
            index,
            format!(
                "unsupported image format {}. Supported formats are: JPEG, JPG, PNG, and WebP",
                file.content_type
            ),
        ));
    }

    let decoded = image::load_from_memory(&file.bytes)
        .map_err(|e| ToolError::execution_at(index, format!("could not decode image: {e}")))?;
    let rgb = decoded.to_rgb8();

    let mut jpeg = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY))
        .map_err(|e| ToolError::execution_at(index, format!("could not re-encode image: {e}")))?;

    Ok(NormalizedImage {
        jpeg,
        width: rgb.width(),
        height: rgb.height(),
    })
}

fn add_page(
    doc: &mut Document,
    pages_id: ObjectId,
    image: NormalizedImage,
    fit: ImageFit,
) -> Result<ObjectId, lopdf::Error> {
    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(image.width),
            "Height" => i64::from(image.height),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
            "Filter" => "DCTDecode",
        },
        image.jpeg,
    ));

    let p = place(
        f64::from(image.width),
        f64::from(image.height),
        PAGE_WIDTH,
        PAGE_HEIGHT,
        fit,
    );

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Real(p.width as f32),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(p.height as f32),
                    Object::Real(p.x as f32),
                    Object::Real(p.y as f32),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode()?));

    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(PAGE_WIDTH as f32),
            Object::Real(PAGE_HEIGHT as f32),
        ],
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
    }))
}

/// Builds one page per image, in the given order.
///
/// The batch size is checked before any image is decoded.
pub fn generate_pdf(images: &[UploadedFile], fit: ImageFit) -> Result<ToolOutput, ToolError> {
    if images.is_empty() {
        return Err(ToolError::execution("no valid image files provided"));
    }
    if images.len() > MAX_IMAGES {
        return Err(ToolError::execution(format!(
            "maximum number of images {MAX_IMAGES} exceeded"
        )));
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(images.len());

    for (index, file) in images.iter().enumerate() {
        let image = normalize(index, file)?;
        let page_id = add_page(&mut doc, pages_id, image, fit)
            .map_err(|e| ToolError::execution_at(index, format!("could not lay out page: {e}")))?;
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

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| ToolError::execution(format!("could not write PDF: {e}")))?;

    Ok(ToolOutput {
        bytes,
        content_type: "application/pdf",
    })
}
