// src/api/checkout.rs

use actix_web::web::{self, ReqData};
use actix_web::{post, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::api::auth::{optional_user, require_user, UserId};
use crate::error::ToolError;
use crate::models::ToolKind;
use crate::payments::{CustomLineItem, NewCheckout};
use crate::pricing::resolve_price;
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOptions {
    #[serde(rename = "type")]
    pub tool: ToolKind,
    /// Required for duration-priced tools.
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// Catalog price to buy, e.g. a credits pack.
    #[serde(default)]
    pub stripe_price_id: Option<String>,
    /// Tool to pay for once.
    #[serde(default)]
    pub options: Option<CheckoutOptions>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub client_secret: String,
}

#[utoipa::path(
    post,
    path = "/api/stripe",
    tag = "payments",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Embedded checkout session created", body = CheckoutResponse),
        (status = 400, description = "Unknown tool or missing duration"),
        (status = 401, description = "Buying credits requires a signed-in user"),
        (status = 500, description = "Payment provider error")
    )
)]
#[post("/stripe")]
pub async fn create_checkout(
    state: web::Data<AppState>,
    payload: web::Json<CheckoutRequest>,
    user: Option<ReqData<UserId>>,
) -> Result<HttpResponse, ToolError> {
    let payload = payload.into_inner();

    let checkout = match (payload.options, payload.stripe_price_id) {
        (Some(options), _) => {
            let tool = state.catalog.tool(options.tool.slug()).await?;
            let price = resolve_price(&tool, options.duration_minutes)?;

            // Fixed-price tools may carry a catalog price; everything else is
            // charged the computed amount.
            let (price_id, custom) = match (&tool.stripe_price_id, tool.duration_priced) {
                (Some(id), false) => (Some(id.clone()), None),
                _ => (
                    None,
                    Some(CustomLineItem {
                        name: tool.title.clone(),
                        unit_amount: i64::from(price.cash),
                        currency: state.config.checkout_currency.clone(),
                    }),
                ),
            };

            NewCheckout {
                price_id,
                custom,
                user_id: optional_user(user),
                tool: Some(tool.url.clone()),
            }
        }
        (None, Some(price_id)) => NewCheckout {
            price_id: Some(price_id),
            custom: None,
            user_id: Some(require_user(user)?),
            tool: None,
        },
        (None, None) => {
            return Err(ToolError::InvalidRequest(
                "stripePriceId or options required".to_string(),
            ))
        }
    };

    let client_secret = state.checkout.create_session(&checkout).await?;
    Ok(HttpResponse::Ok().json(json!({ "clientSecret": client_secret })))
}
