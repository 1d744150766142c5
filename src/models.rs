// src/models.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Owner recorded for operations performed without a signed-in user.
pub const ANONYMOUS_OWNER: &str = "anonymous";

/// Catalog entry, read-only at request time.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub id: i32,
    pub name: String,
    pub title: String,
    /// URL slug, also the tool identifier used in requests and storage keys.
    pub url: String,
    pub color: String,
    pub description: String,
    pub logo: String,
    /// Smallest currency unit. Per minute when `duration_priced`.
    pub pricing_single: i32,
    /// Per minute when `duration_priced`.
    pub pricing_credits: i32,
    pub cta: String,
    pub stripe_price_id: Option<String>,
    pub duration_priced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum ToolKind {
    #[serde(rename = "img-to-pdf")]
    ImgToPdf,
    #[serde(rename = "audio-to-transcript")]
    AudioToTranscript,
    #[serde(rename = "pdf-signing")]
    PdfSigning,
}

impl ToolKind {
    pub fn slug(self) -> &'static str {
        match self {
            ToolKind::ImgToPdf => "img-to-pdf",
            ToolKind::AudioToTranscript => "audio-to-transcript",
            ToolKind::PdfSigning => "pdf-signing",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "img-to-pdf" => Ok(ToolKind::ImgToPdf),
            "audio-to-transcript" => Ok(ToolKind::AudioToTranscript),
            "pdf-signing" => Ok(ToolKind::PdfSigning),
            other => Err(format!("unknown tool '{other}'")),
        }
    }
}

/// How an image is placed on its PDF page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImageFit {
    #[default]
    Fit,
    Fill,
    Stretch,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub user_id: String,
    pub credits: i32,
    pub total_operations: i32,
}

/// One fulfilled tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    pub id: i32,
    pub user_id: String,
    pub name: String,
    pub tool: String,
    pub download_code: String,
    pub temporary: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOperation {
    pub owner: String,
    pub name: String,
    pub tool: ToolKind,
    pub created_at: DateTime<Utc>,
    pub temporary: bool,
}

/// A file received from the client, fully buffered.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Bytes produced by a tool executor.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_kind_slugs_round_trip_through_from_str() {
        for kind in [ToolKind::ImgToPdf, ToolKind::AudioToTranscript, ToolKind::PdfSigning] {
            assert_eq!(kind.slug().parse::<ToolKind>().unwrap(), kind);
        }
        assert!("img-converter".parse::<ToolKind>().is_err());
    }

    #[test]
    fn image_fit_uses_uppercase_names() {
        let fit: ImageFit = serde_json::from_str("\"STRETCH\"").unwrap();
        assert_eq!(fit, ImageFit::Stretch);
        assert_eq!(ImageFit::default(), ImageFit::Fit);
    }
}
