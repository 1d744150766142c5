// src/tools/mod.rs

pub mod img_to_pdf;
pub mod media;
pub mod pdf_signing;
pub mod transcript;

use std::sync::Arc;

use crate::error::ToolError;
use crate::models::{ImageFit, ToolKind, ToolOutput, UploadedFile};

use self::transcript::Transcriber;

/// Validated input for one tool run.
#[derive(Debug, Clone)]
pub enum ToolJob {
    ImgToPdf {
        images: Vec<UploadedFile>,
        fit: ImageFit,
    },
    AudioToTranscript {
        audio: UploadedFile,
        language: String,
    },
    PdfSigning {
        document: UploadedFile,
        signature: String,
    },
}

impl ToolJob {
    pub fn kind(&self) -> ToolKind {
        match self {
            ToolJob::ImgToPdf { .. } => ToolKind::ImgToPdf,
            ToolJob::AudioToTranscript { .. } => ToolKind::AudioToTranscript,
            ToolJob::PdfSigning { .. } => ToolKind::PdfSigning,
        }
    }
}

/// Dispatches a job to its transform. Keeps no state between runs.
#[derive(Clone)]
pub struct ToolExecutor {
    transcriber: Arc<dyn Transcriber>,
}

impl ToolExecutor {
    pub fn new(transcriber: Arc<dyn Transcriber>) -> Self {
        Self { transcriber }
    }

    pub async fn run(&self, job: ToolJob) -> Result<ToolOutput, ToolError> {
        match job {
            ToolJob::ImgToPdf { images, fit } => {
                blocking(move || img_to_pdf::generate_pdf(&images, fit)).await
            }
            ToolJob::AudioToTranscript { audio, language } => {
                let text = self.transcriber.transcribe(&audio, &language).await?;
                Ok(ToolOutput {
                    bytes: text.into_bytes(),
                    content_type: "text/plain",
                })
            }
            ToolJob::PdfSigning {
                document,
                signature,
            } => blocking(move || pdf_signing::sign_pdf(&document, &signature)).await,
        }
    }
}

async fn blocking<F>(f: F) -> Result<ToolOutput, ToolError>
where
    F: FnOnce() -> Result<ToolOutput, ToolError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ToolError::Internal(format!("tool task panicked: {e}")))?
}
