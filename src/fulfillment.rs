// src/fulfillment.rs
//
// Payment-gated tool runs. One request walks
// Validating → Pricing → EntitlementCheck → Executing → Persisting →
// Finalizing → Done and stops at the first failure. The entitlement
// (checkout session or credits) is consumed only in Finalizing, after the
// artifact and its ledger row both exist.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::billing::{ensure_credits, CreditLedger};
use crate::error::ToolError;
use crate::ledger::OperationLedger;
use crate::models::{ImageFit, NewOperation, UploadedFile, ANONYMOUS_OWNER};
use crate::payments::{verify_payment, CheckoutGateway, VerifiedPayment};
use crate::pricing::{billable_minutes, resolve_price, Price, ToolCatalog};
use crate::storage::{ArtifactMeta, ArtifactStore, StoredArtifact};
use crate::tools::media::DurationProbe;
use crate::tools::pdf_signing::MAX_SIGNATURE_CHARS;
use crate::tools::{ToolExecutor, ToolJob};

pub const MAX_TITLE_CHARS: usize = 255;

/// Tool options as sent by the client, discriminated by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ToolOptions {
    #[serde(rename = "img-to-pdf", rename_all = "camelCase")]
    ImgToPdf {
        #[serde(default)]
        title: String,
        #[serde(default)]
        save_to_profile: bool,
        #[serde(default)]
        selected_image_fit: ImageFit,
        /// `data:<mime>;base64,<data>` URLs, for JSON submissions.
        #[serde(default)]
        images: Vec<String>,
    },
    #[serde(rename = "audio-to-transcript", rename_all = "camelCase")]
    AudioToTranscript {
        #[serde(default)]
        title: String,
        #[serde(default)]
        save_to_profile: bool,
        language: String,
    },
    #[serde(rename = "pdf-signing", rename_all = "camelCase")]
    PdfSigning {
        #[serde(default)]
        title: String,
        #[serde(default)]
        save_to_profile: bool,
        signature: String,
    },
}

/// Raw tool request, before validation.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub client_secret: Option<String>,
    pub options: ToolOptions,
    pub files: Vec<UploadedFile>,
}

#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub client_secret: Option<String>,
    pub title: Option<String>,
    pub save_to_profile: bool,
    pub job: ToolJob,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentOutcome {
    pub link: String,
    pub download_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Pricing,
    EntitlementCheck,
    Executing,
    Persisting,
    Finalizing,
    Done,
}

#[derive(Debug, Clone)]
enum Entitlement {
    Payment(VerifiedPayment),
    Credits { user_id: String, price: Price },
}

fn decode_data_url(index: usize, data_url: &str) -> Result<UploadedFile, ToolError> {
    let invalid =
        || ToolError::InvalidRequest(format!("Invalid base64 image data for image {}", index + 1));

    let rest = data_url.strip_prefix("data:").ok_or_else(invalid)?;
    let (mime, data) = rest.split_once(";base64,").ok_or_else(invalid)?;
    if mime.is_empty() || data.is_empty() {
        return Err(invalid());
    }
    let bytes = BASE64.decode(data.trim()).map_err(|_| invalid())?;

    Ok(UploadedFile {
        file_name: format!("image-{}", index + 1),
        content_type: mime.to_ascii_lowercase(),
        bytes,
    })
}

fn clean_title(title: String) -> Result<Option<String>, ToolError> {
    let title = title.trim().to_string();
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ToolError::InvalidRequest(format!(
            "title must be at most {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok((!title.is_empty()).then_some(title))
}

fn single_file(mut files: Vec<UploadedFile>, what: &str) -> Result<UploadedFile, ToolError> {
    match files.len() {
        0 => Err(ToolError::InvalidRequest(format!("no {what} file provided"))),
        1 => Ok(files.remove(0)),
        _ => Err(ToolError::InvalidRequest(format!(
            "only one {what} file can be processed at a time"
        ))),
    }
}

fn valid_language(language: &str) -> Option<String> {
    let language = language.trim().to_ascii_lowercase();
    let ok = (2..=3).contains(&language.len()) && language.bytes().all(|b| b.is_ascii_lowercase());
    ok.then_some(language)
}

impl ToolRequest {
    /// Checks the request shape and turns it into a runnable job.
    pub fn validate(self) -> Result<ValidatedRequest, ToolError> {
        let client_secret = self
            .client_secret
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let (title, save_to_profile, job) = match self.options {
            ToolOptions::ImgToPdf {
                title,
                save_to_profile,
                selected_image_fit,
                images,
            } => {
                let mut all = self.files;
                for (i, url) in images.iter().enumerate() {
                    all.push(decode_data_url(i, url)?);
                }
                if all.is_empty() {
                    return Err(ToolError::InvalidRequest("no images provided".to_string()));
                }
                (
                    title,
                    save_to_profile,
                    ToolJob::ImgToPdf {
                        images: all,
                        fit: selected_image_fit,
                    },
                )
            }
            ToolOptions::AudioToTranscript {
                title,
                save_to_profile,
                language,
            } => {
                let audio = single_file(self.files, "audio")?;
                let ct = audio.content_type.to_ascii_lowercase();
                if !(ct.starts_with("audio/") || ct.starts_with("video/")) {
                    return Err(ToolError::InvalidRequest(format!(
                        "unsupported media type {}",
                        audio.content_type
                    )));
                }
                let language = valid_language(&language).ok_or_else(|| {
                    ToolError::InvalidRequest(format!("invalid language code '{language}'"))
                })?;
                (
                    title,
                    save_to_profile,
                    ToolJob::AudioToTranscript { audio, language },
                )
            }
            ToolOptions::PdfSigning {
                title,
                save_to_profile,
                signature,
            } => {
                let document = single_file(self.files, "PDF")?;
                let is_pdf = document.content_type.eq_ignore_ascii_case("application/pdf")
                    || document.file_name.to_ascii_lowercase().ends_with(".pdf");
                if !is_pdf {
                    return Err(ToolError::InvalidRequest(
                        "only PDF files are allowed".to_string(),
                    ));
                }
                let signature = signature.trim().to_string();
                let len = signature.chars().count();
                if len == 0 || len > MAX_SIGNATURE_CHARS {
                    return Err(ToolError::InvalidRequest(format!(
                        "signature must be 1 to {MAX_SIGNATURE_CHARS} characters"
                    )));
                }
                (
                    title,
                    save_to_profile,
                    ToolJob::PdfSigning {
                        document,
                        signature,
                    },
                )
            }
        };

        Ok(ValidatedRequest {
            client_secret,
            title: clean_title(title)?,
            save_to_profile,
            job,
        })
    }
}

/// The orchestrator, borrowing its collaborators from the app state.
pub struct Fulfillment<'a> {
    pub catalog: &'a dyn ToolCatalog,
    pub credits: &'a dyn CreditLedger,
    pub operations: &'a dyn OperationLedger,
    pub artifacts: &'a dyn ArtifactStore,
    pub checkout: &'a dyn CheckoutGateway,
    pub probe: &'a dyn DurationProbe,
    pub executor: &'a ToolExecutor,
}

impl<'a> Fulfillment<'a> {
    pub async fn run(
        &self,
        request: ToolRequest,
        user_id: Option<&str>,
    ) -> Result<FulfillmentOutcome, ToolError> {
        let mut stage = Stage::Validating;
        let result = self.advance(request, user_id, &mut stage).await;

        match &result {
            Ok(outcome) => log::info!(
                "fulfillment done user_id={} code={}",
                user_id.unwrap_or(ANONYMOUS_OWNER),
                outcome.download_code
            ),
            Err(e) => log::warn!(
                "fulfillment failed stage={:?} kind={} user_id={} err={}",
                stage,
                e.kind(),
                user_id.unwrap_or(ANONYMOUS_OWNER),
                e
            ),
        }
        result
    }

    async fn advance(
        &self,
        request: ToolRequest,
        user_id: Option<&str>,
        stage: &mut Stage,
    ) -> Result<FulfillmentOutcome, ToolError> {
        let request = request.validate()?;
        let kind = request.job.kind();

        *stage = Stage::Pricing;
        let tool = self.catalog.tool(kind.slug()).await?;
        let duration = match (&request.job, tool.duration_priced) {
            (ToolJob::AudioToTranscript { audio, .. }, true) => {
                Some(billable_minutes(self.probe.duration_seconds(audio).await?))
            }
            _ => None,
        };
        let price = resolve_price(&tool, duration)?;

        *stage = Stage::EntitlementCheck;
        let entitlement = match (&request.client_secret, user_id) {
            (Some(secret), _) => {
                let expected = i64::from(price.cash);
                Entitlement::Payment(
                    verify_payment(self.checkout, secret, kind.slug(), expected).await?,
                )
            }
            (None, Some(uid)) => {
                ensure_credits(self.credits, uid, &price).await?;
                Entitlement::Credits {
                    user_id: uid.to_string(),
                    price,
                }
            }
            (None, None) => return Err(ToolError::Unauthorized),
        };

        *stage = Stage::Executing;
        let output = self.executor.run(request.job).await?;

        *stage = Stage::Persisting;
        let unique_id = Uuid::new_v4().to_string();
        let name = request.title.unwrap_or_else(|| unique_id.clone());
        let temporary = user_id.is_none() || !request.save_to_profile;
        let owner = user_id.unwrap_or(ANONYMOUS_OWNER).to_string();

        let meta = ArtifactMeta {
            owner: user_id.map(str::to_string),
            tool: kind.slug().to_string(),
            name: name.clone(),
            content_type: output.content_type.to_string(),
            temporary,
        };
        let op = NewOperation {
            owner,
            name,
            tool: kind,
            created_at: Utc::now(),
            temporary,
        };
        let usage = async {
            match user_id {
                Some(uid) => self.credits.increment_operations(uid).await,
                None => Ok(()),
            }
        };

        let (stored, code, counted) = futures_util::join!(
            self.artifacts.put(output.bytes, &meta),
            self.operations.insert(&op),
            usage
        );

        let mut errors = Vec::new();
        let stored = stored.map_err(|e| errors.push(e)).ok();
        let code = code.map_err(|e| errors.push(e)).ok();
        if let Err(e) = counted {
            errors.push(e);
        }
        let (stored, code) = match (stored, code) {
            (Some(stored), Some(code)) if errors.is_empty() => (stored, code),
            (stored, code) => {
                self.discard(&op, stored.as_ref(), code.as_deref()).await;
                return Err(errors
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| ToolError::Internal("persisting failed".to_string())));
            }
        };

        *stage = Stage::Finalizing;
        let finalized = match &entitlement {
            Entitlement::Payment(payment) => {
                self.checkout
                    .mark_fulfilled(&payment.session_id, &unique_id)
                    .await
            }
            Entitlement::Credits { user_id, price } => {
                self.credits.debit(user_id, price.credits).await.map(|_| ())
            }
        };

        if let Err(e) = finalized {
            log::error!(
                "finalize failed, withdrawing delivery entitlement={:?} key={} code={} err={}",
                entitlement,
                stored.key,
                code,
                e
            );
            self.discard(&op, Some(&stored), Some(&code)).await;
            return Err(e);
        }

        *stage = Stage::Done;
        Ok(FulfillmentOutcome {
            link: stored.url,
            download_code: code,
        })
    }

    // Best-effort removal of whatever was persisted for a run that will not
    // be billed. The row goes first; the blob only when no other row still
    // resolves to its key.
    async fn discard(
        &self,
        op: &NewOperation,
        stored: Option<&StoredArtifact>,
        code: Option<&str>,
    ) {
        if let Some(code) = code {
            if let Err(e) = self.operations.delete_by_download_code(code).await {
                log::error!("discard operation failed code={} err={}", code, e);
            }
        }
        let Some(stored) = stored else {
            return;
        };
        match self.operations.artifact_in_use(op).await {
            Ok(false) => {
                if let Err(e) = self.artifacts.delete(&stored.key).await {
                    log::error!("discard artifact failed key={} err={}", stored.key, e);
                }
            }
            Ok(true) => {
                log::warn!(
                    "discard keeps artifact shared with another operation key={}",
                    stored.key
                );
            }
            Err(e) => {
                log::error!(
                    "discard could not check artifact key={} err={}, keeping it",
                    stored.key,
                    e
                );
            }
        }
    }
}
