// src/api/catalog.rs

use actix_web::{get, web, HttpResponse};

use crate::error::ToolError;
use crate::models::Tool;
use crate::AppState;

#[utoipa::path(
    get,
    path = "/api/tools",
    tag = "tools",
    responses((status = 200, description = "Tool catalog", body = [Tool]))
)]
#[get("/tools")]
pub async fn list_tools(state: web::Data<AppState>) -> Result<HttpResponse, ToolError> {
    let tools = state.catalog.list_tools().await?;
    Ok(HttpResponse::Ok().json(tools))
}

#[utoipa::path(
    get,
    path = "/api/tools/{slug}",
    tag = "tools",
    params(("slug" = String, Path, description = "Tool slug")),
    responses(
        (status = 200, description = "One tool", body = Tool),
        (status = 404, description = "Unknown tool")
    )
)]
#[get("/tools/{slug}")]
pub async fn get_tool(
    state: web::Data<AppState>,
    slug: web::Path<String>,
) -> Result<HttpResponse, ToolError> {
    let tool = match state.catalog.tool(&slug).await {
        Ok(tool) => tool,
        Err(ToolError::InvalidTool(_)) => return Err(ToolError::NotFound),
        Err(e) => return Err(e),
    };
    Ok(HttpResponse::Ok().json(tool))
}
