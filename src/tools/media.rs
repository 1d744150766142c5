// src/tools/media.rs

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::ToolError;
use crate::models::UploadedFile;

/// Measures the playing time of an uploaded media file.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    async fn duration_seconds(&self, file: &UploadedFile) -> Result<f64, ToolError>;
}

/// Runs `ffprobe` against a temporary copy of the upload.
#[derive(Clone)]
pub struct FfprobeDurationProbe {
    program: String,
}

impl FfprobeDurationProbe {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

/// Parses the output of
/// `ffprobe -show_entries format=duration -of default=noprint_wrappers=1:nokey=1`.
pub fn parse_ffprobe_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(|l| l.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}

#[async_trait]
impl DurationProbe for FfprobeDurationProbe {
    async fn duration_seconds(&self, file: &UploadedFile) -> Result<f64, ToolError> {
        let failed = || ToolError::InvalidRequest("Failed to read file duration".to_string());

        let tmp = tempfile::Builder::new()
            .prefix("upload-")
            .tempfile()
            .map_err(|e| ToolError::Internal(format!("tempfile: {e}")))?;
        tokio::fs::write(tmp.path(), &file.bytes)
            .await
            .map_err(|e| ToolError::Internal(format!("tempfile write: {e}")))?;

        let output = Command::new(&self.program)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(tmp.path())
            .output()
            .await
            .map_err(|e| {
                log::error!("ffprobe spawn failed program={} err={}", self.program, e);
                ToolError::Internal(format!("ffprobe: {e}"))
            })?;

        if !output.status.success() {
            log::warn!(
                "ffprobe rejected upload file={} stderr={}",
                file.file_name,
                String::from_utf8_lossy(&output.stderr)
            );
            return Err(failed());
        }

        parse_ffprobe_duration(&String::from_utf8_lossy(&output.stdout)).ok_or_else(failed)
    }
}
