// src/api/operations.rs

use actix_web::web::{self, ReqData};
use actix_web::{delete, get, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};

use crate::api::auth::{require_user, UserId};
use crate::error::ToolError;
use crate::ledger::{normalize_download_code, remove_operation};
use crate::models::{OperationRecord, ToolKind};
use crate::storage::artifact_key;
use crate::AppState;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Tool slug, e.g. `img-to-pdf`.
    pub tool: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub link: String,
    pub name: String,
    pub tool: String,
    pub created_at: DateTime<Utc>,
}

fn tool_slug(raw: &str) -> Result<ToolKind, ToolError> {
    raw.parse::<ToolKind>()
        .map_err(|_| ToolError::InvalidTool(raw.to_string()))
}

async fn signed_link(state: &AppState, record: &OperationRecord) -> Result<String, ToolError> {
    let key = artifact_key(
        Some(&record.user_id),
        &record.tool,
        &record.name,
        record.temporary,
    );
    state
        .artifacts
        .signed_url(&key, state.config.signed_url_ttl)
        .await
}

#[utoipa::path(
    get,
    path = "/api/operations",
    tag = "operations",
    params(ListQuery),
    responses(
        (status = 200, description = "Saved operations, newest first", body = [OperationRecord]),
        (status = 401, description = "Not signed in")
    )
)]
#[get("/operations")]
pub async fn list_operations(
    state: web::Data<AppState>,
    query: web::Query<ListQuery>,
    user: Option<ReqData<UserId>>,
) -> Result<HttpResponse, ToolError> {
    let user_id = require_user(user)?;
    let tool = tool_slug(&query.tool)?;

    let records = state
        .operations
        .list_by_owner_and_tool(&user_id, tool.slug())
        .await?;
    Ok(HttpResponse::Ok().json(records))
}

#[utoipa::path(
    get,
    path = "/api/operations/{tool}/{name}/link",
    tag = "operations",
    params(
        ("tool" = String, Path, description = "Tool slug"),
        ("name" = String, Path, description = "Operation name")
    ),
    responses(
        (status = 200, description = "Fresh signed link"),
        (status = 401, description = "Not signed in"),
        (status = 404, description = "No such operation")
    )
)]
#[get("/operations/{tool}/{name}/link")]
pub async fn operation_link(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    user: Option<ReqData<UserId>>,
) -> Result<HttpResponse, ToolError> {
    let user_id = require_user(user)?;
    let (tool, name) = path.into_inner();
    let tool = tool_slug(&tool)?;

    let record = state
        .operations
        .find_by_name_and_tool(&user_id, &name, tool.slug())
        .await?;
    let link = signed_link(&state, &record).await?;
    Ok(HttpResponse::Ok().json(json!({ "link": link })))
}

#[utoipa::path(
    delete,
    path = "/api/operations/{tool}/{name}",
    tag = "operations",
    params(
        ("tool" = String, Path, description = "Tool slug"),
        ("name" = String, Path, description = "Operation name")
    ),
    responses(
        (status = 200, description = "Operation and its file deleted"),
        (status = 401, description = "Not signed in"),
        (status = 404, description = "No such operation")
    )
)]
#[delete("/operations/{tool}/{name}")]
pub async fn delete_operation(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    user: Option<ReqData<UserId>>,
) -> Result<HttpResponse, ToolError> {
    let user_id = require_user(user)?;
    let (tool, name) = path.into_inner();
    let tool = tool_slug(&tool)?;

    remove_operation(
        state.operations.as_ref(),
        state.artifacts.as_ref(),
        &user_id,
        &name,
        tool.slug(),
    )
    .await?;

    log::info!("operation deleted user_id={} tool={} name={}", user_id, tool, name);
    Ok(HttpResponse::Ok().json(json!({ "deleted": true })))
}

#[utoipa::path(
    get,
    path = "/api/download/{code}",
    tag = "operations",
    params(("code" = String, Path, description = "Six character download code")),
    responses(
        (status = 200, description = "Signed link to the result", body = DownloadResponse),
        (status = 404, description = "Unknown code")
    )
)]
#[get("/download/{code}")]
pub async fn download(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ToolError> {
    let code = normalize_download_code(&path.into_inner()).ok_or(ToolError::NotFound)?;
    let record = state.operations.find_by_download_code(&code).await?;
    let link = signed_link(&state, &record).await?;

    Ok(HttpResponse::Ok().json(DownloadResponse {
        link,
        name: record.name,
        tool: record.tool,
        created_at: record.created_at,
    }))
}
