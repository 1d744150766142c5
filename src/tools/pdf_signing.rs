// src/tools/pdf_signing.rs

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::error::ToolError;
use crate::models::{ToolOutput, UploadedFile};
use crate::tools::img_to_pdf::{PAGE_HEIGHT, PAGE_WIDTH};

pub const MAX_SIGNATURE_CHARS: usize = 100;

const FONT_RESOURCE: &str = "FSig";
const FONT_SIZE: f64 = 28.0;
const MARGIN: f64 = 48.0;
// Rough advance width of Times-Italic glyphs, as a fraction of the font size.
const AVG_GLYPH_WIDTH: f64 = 0.45;

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

// Looks `key` up on the page and then up the page tree.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = Some(page_id);
    while let Some(id) = current {
        let dict = doc.get_dictionary(id).ok()?;
        if let Ok(obj) = dict.get(key) {
            return resolve(doc, obj);
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

/// `[x0, y0, x1, y1]` of the page, A4 when the document does not say.
fn media_box(doc: &Document, page_id: ObjectId) -> [f64; 4] {
    inherited(doc, page_id, b"MediaBox")
        .and_then(|obj| obj.as_array().ok())
        .and_then(|arr| {
            let nums: Vec<f64> = arr.iter().filter_map(number).collect();
            (nums.len() == 4).then(|| [nums[0], nums[1], nums[2], nums[3]])
        })
        .unwrap_or([0.0, 0.0, PAGE_WIDTH, PAGE_HEIGHT])
}

// Gives the page its own Resources dictionary with the signature font added.
// Shared or inherited resources are copied, never modified in place.
fn add_font(doc: &mut Document, page_id: ObjectId, font_id: ObjectId) -> Result<(), lopdf::Error> {
    let mut resources = match inherited(doc, page_id, b"Resources") {
        Some(Object::Dictionary(d)) => d.clone(),
        _ => Dictionary::new(),
    };

    let mut fonts = match resources.get(b"Font").ok().and_then(|f| resolve(doc, f)) {
        Some(Object::Dictionary(d)) => d.clone(),
        _ => Dictionary::new(),
    };
    fonts.set(FONT_RESOURCE, font_id);
    resources.set("Font", fonts);

    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Resources", resources);
    Ok(())
}

// WinAnsi covers Latin-1; anything else becomes '?'.
fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (c as u32) < 256 { c as u8 } else { b'?' })
        .collect()
}

fn signature_operations(signature: &str, bbox: [f64; 4]) -> Vec<Operation> {
    let [x0, y0, x1, _] = bbox;
    let text_width = signature.chars().count() as f64 * FONT_SIZE * AVG_GLYPH_WIDTH;
    let x = (x1 - MARGIN - text_width).max(x0 + MARGIN);
    let y = y0 + MARGIN;

    vec![
        Operation::new("q", vec![]),
        Operation::new(
            "rg",
            vec![Object::Real(0.05), Object::Real(0.1), Object::Real(0.45)],
        ),
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![
                Object::Name(FONT_RESOURCE.as_bytes().to_vec()),
                Object::Real(FONT_SIZE as f32),
            ],
        ),
        Operation::new("Td", vec![Object::Real(x as f32), Object::Real(y as f32)]),
        Operation::new(
            "Tj",
            vec![Object::String(encode_text(signature), StringFormat::Literal)],
        ),
        Operation::new("ET", vec![]),
        Operation::new("Q", vec![]),
    ]
}

// `None` when the document has no pages.
fn stamp(bytes: &[u8], signature: &str) -> Result<Option<Vec<u8>>, lopdf::Error> {
    let mut doc = Document::load_mem(bytes)?;
    let page_id = match doc.get_pages().values().last() {
        Some(id) => *id,
        None => return Ok(None),
    };

    let bbox = media_box(&doc, page_id);
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Times-Italic",
        "Encoding" => "WinAnsiEncoding",
    });
    add_font(&mut doc, page_id, font_id)?;

    // The original drawing is isolated in q/Q so its graphics state cannot
    // leak into the signature.
    let original = doc.get_page_content(page_id)?;
    let overlay = Content {
        operations: signature_operations(signature, bbox),
    }
    .encode()?;

    let mut content = Vec::with_capacity(original.len() + overlay.len() + 8);
    content.extend_from_slice(b"q\n");
    content.extend_from_slice(&original);
    content.extend_from_slice(b"\nQ\n");
    content.extend_from_slice(&overlay);

    let content_id = doc.add_object(Stream::new(Dictionary::new(), content));
    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Contents", content_id);

    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(Some(out))
}

/// Writes `signature` in the bottom-right corner of the last page.
pub fn sign_pdf(document: &UploadedFile, signature: &str) -> Result<ToolOutput, ToolError> {
    if !document.bytes.starts_with(b"%PDF") {
        return Err(ToolError::execution("file is not a PDF document"));
    }

    let bytes = stamp(&document.bytes, signature)
        .map_err(|e| ToolError::execution(format!("could not sign document: {e}")))?
        .ok_or_else(|| ToolError::execution("document has no pages"))?;

    Ok(ToolOutput {
        bytes,
        content_type: "application/pdf",
    })
}
