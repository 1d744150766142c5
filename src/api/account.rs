// src/api/account.rs

use actix_web::web::{self, ReqData};
use actix_web::{get, post, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::api::auth::{optional_user, require_user, UserId};
use crate::error::ToolError;
use crate::mailer::validate_tool_request;
use crate::models::{UserAccount, ANONYMOUS_OWNER};
use crate::AppState;

#[utoipa::path(
    get,
    path = "/api/user",
    tag = "account",
    responses(
        (status = 200, description = "Credit balance and usage", body = UserAccount),
        (status = 401, description = "Not signed in"),
        (status = 400, description = "User has no account yet")
    )
)]
#[get("/user")]
pub async fn get_user(
    state: web::Data<AppState>,
    user: Option<ReqData<UserId>>,
) -> Result<HttpResponse, ToolError> {
    let user_id = require_user(user)?;
    let account = state.credits.account(&user_id).await?;
    Ok(HttpResponse::Ok().json(account))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequestInput {
    /// What tool the visitor would like, 5 to 250 characters.
    pub request_input: String,
}

#[utoipa::path(
    post,
    path = "/api/request",
    tag = "account",
    request_body = ToolRequestInput,
    responses(
        (status = 200, description = "Request forwarded"),
        (status = 400, description = "Too short or too long"),
        (status = 500, description = "Email provider error")
    )
)]
#[post("/request")]
pub async fn request_tool(
    state: web::Data<AppState>,
    payload: web::Json<ToolRequestInput>,
    user: Option<ReqData<UserId>>,
) -> Result<HttpResponse, ToolError> {
    let text = validate_tool_request(&payload.request_input)?;
    let from = optional_user(user).unwrap_or_else(|| ANONYMOUS_OWNER.to_string());

    state
        .mailer
        .send("New tool request", &format!("{text}\n\nFrom: {from}"))
        .await?;

    log::info!("tool request sent user_id={}", from);
    Ok(HttpResponse::Ok().json(json!({ "sent": true })))
}
