// src/tools/transcript.rs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;

use crate::error::ToolError;
use crate::models::UploadedFile;

const MODEL: &str = "whisper-1";
const RESPONSE_FORMAT: &str = "srt";
const PROMPT: &str = "Separate the audio into full sentences, separated by \n\n";

/// Speech-to-text collaborator.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Returns caption-style (SRT) text.
    async fn transcribe(&self, audio: &UploadedFile, language: &str) -> Result<String, ToolError>;
}

/// OpenAI `audio/transcriptions` endpoint.
#[derive(Clone)]
pub struct OpenAiTranscriber {
    client: Client,
    api_base: String,
    api_key: String,
}

impl OpenAiTranscriber {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    async fn transcribe(&self, audio: &UploadedFile, language: &str) -> Result<String, ToolError> {
        let file = Part::bytes(audio.bytes.clone())
            .file_name(audio.file_name.clone())
            .mime_str(&audio.content_type)
            .map_err(|e| ToolError::TranscriptionFailed(format!("bad content type: {e}")))?;

        let form = Form::new()
            .part("file", file)
            .text("model", MODEL)
            .text("response_format", RESPONSE_FORMAT)
            .text("language", language.to_string())
            .text("prompt", PROMPT);

        let resp = self
            .client
            .post(format!("{}/audio/transcriptions", self.api_base))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                log::error!("transcription request error: {e}");
                ToolError::TranscriptionFailed(e.to_string())
            })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ToolError::TranscriptionFailed(e.to_string()))?;

        if !status.is_success() {
            log::error!("transcription failed status={} body={}", status, body);
            return Err(ToolError::TranscriptionFailed(format!("status {status}")));
        }

        if body.trim().is_empty() {
            return Err(ToolError::TranscriptionFailed("empty transcript".to_string()));
        }

        Ok(body)
    }
}
