// src/api/tool.rs

use actix_multipart::Multipart;
use actix_web::web::{self, ReqData};
use actix_web::{post, HttpRequest, HttpResponse};
use futures_util::StreamExt;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::api::auth::{optional_user, UserId};
use crate::error::ToolError;
use crate::fulfillment::{FulfillmentOutcome, ToolOptions, ToolRequest};
use crate::models::UploadedFile;
use crate::AppState;

/// JSON form of a tool request. Images travel as base64 data URLs inside
/// `options.images`. The multipart form carries the same fields, with the
/// options as JSON text and the uploads under `files`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequestBody {
    /// Checkout client secret. Omit to pay with credits.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// `{"type": "img-to-pdf" | "audio-to-transcript" | "pdf-signing", ...}`
    #[schema(value_type = Object)]
    pub options: ToolOptions,
}

fn too_large(limit: usize) -> ToolError {
    ToolError::InvalidRequest(format!(
        "upload exceeds {} MB",
        limit / (1024 * 1024)
    ))
}

fn parse_options(raw: &[u8]) -> Result<ToolOptions, ToolError> {
    serde_json::from_slice(raw).map_err(|e| ToolError::InvalidRequest(format!("invalid options: {e}")))
}

// Fields: `clientSecret` (text), `options` (JSON text), `files` (repeated).
async fn read_multipart(mut payload: Multipart, limit: usize) -> Result<ToolRequest, ToolError> {
    let mut client_secret = None;
    let mut options = None;
    let mut files = Vec::new();
    let mut total = 0usize;

    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| ToolError::InvalidRequest(format!("invalid multipart body: {e}")))?;

        let name = field.name().to_string();
        let file_name = field.content_disposition().get_filename().map(str::to_string);
        let content_type = field
            .content_type()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let data =
                chunk.map_err(|e| ToolError::InvalidRequest(format!("upload interrupted: {e}")))?;
            total += data.len();
            if total > limit {
                return Err(too_large(limit));
            }
            bytes.extend_from_slice(&data);
        }

        match name.as_str() {
            "clientSecret" => client_secret = Some(String::from_utf8_lossy(&bytes).into_owned()),
            "options" => options = Some(parse_options(&bytes)?),
            "files" => files.push(UploadedFile {
                file_name: file_name.unwrap_or_else(|| format!("file-{}", files.len() + 1)),
                content_type,
                bytes,
            }),
            other => log::debug!("ignoring multipart field name={}", other),
        }
    }

    let options = options.ok_or_else(|| ToolError::InvalidRequest("options missing".to_string()))?;
    Ok(ToolRequest {
        client_secret,
        options,
        files,
    })
}

async fn read_json(mut payload: web::Payload, limit: usize) -> Result<ToolRequest, ToolError> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let data = chunk.map_err(|e| ToolError::InvalidRequest(format!("invalid body: {e}")))?;
        if body.len() + data.len() > limit {
            return Err(too_large(limit));
        }
        body.extend_from_slice(&data);
    }

    let parsed: ToolRequestBody = serde_json::from_slice(&body)
        .map_err(|e| ToolError::InvalidRequest(format!("invalid request body: {e}")))?;
    Ok(ToolRequest {
        client_secret: parsed.client_secret,
        options: parsed.options,
        files: Vec::new(),
    })
}

#[utoipa::path(
    post,
    path = "/api/tool",
    tag = "tools",
    request_body = ToolRequestBody,
    responses(
        (status = 200, description = "Tool ran, result stored", body = FulfillmentOutcome),
        (status = 400, description = "Rejected request, payment or tool failure"),
        (status = 401, description = "Neither a payment nor a signed-in user"),
        (status = 500, description = "Server error")
    )
)]
#[post("/tool")]
pub async fn run_tool(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<AppState>,
    user: Option<ReqData<UserId>>,
) -> Result<HttpResponse, ToolError> {
    let user_id = optional_user(user);
    let limit = state.config.max_upload_bytes;

    let is_multipart = req
        .headers()
        .get(actix_web::http::header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let request = if is_multipart {
        read_multipart(Multipart::new(req.headers(), payload), limit).await?
    } else {
        read_json(payload, limit).await?
    };

    let outcome = state.fulfillment().run(request, user_id.as_deref()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}
