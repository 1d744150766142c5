// src/api/webhooks.rs

use std::collections::HashMap;

use actix_web::{post, web, HttpRequest, HttpResponse};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;

use crate::billing::credits_for_amount;
use crate::error::ToolError;
use crate::payments::{METADATA_PRICE_ID, METADATA_USER_ID};
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";
/// Accepted clock skew between Stripe and us, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: i64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// HMAC-SHA256 of `"{timestamp}.{payload}"`, hex encoded.
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    // HMAC accepts keys of any length, so this cannot fail.
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Checks a `t=<ts>,v1=<sig>[,v1=<sig>...]` header against the payload.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), ToolError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        if let Some((key, value)) = part.trim().split_once('=') {
            match key {
                "t" => timestamp = value.parse().ok(),
                "v1" => signatures.push(value),
                _ => {}
            }
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| ToolError::InvalidRequest("missing webhook timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(ToolError::InvalidRequest("missing webhook signature".to_string()));
    }

    let expected = compute_signature(secret, timestamp, payload);
    if !signatures
        .iter()
        .any(|sig| constant_time_eq(sig.as_bytes(), expected.as_bytes()))
    {
        log::warn!("webhook signature verification failed");
        return Err(ToolError::InvalidRequest(
            "webhook signature verification failed".to_string(),
        ));
    }

    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        log::warn!("webhook timestamp outside tolerance ts={} now={}", timestamp, now);
        return Err(ToolError::InvalidRequest("webhook timestamp too old".to_string()));
    }

    Ok(())
}

/// Credits to grant for a succeeded payment intent: `Some((user_id, credits))`
/// when the intent bought the credits price.
pub fn credit_top_up(intent: &PaymentIntent, credits_price_id: &str) -> Option<(String, i32)> {
    let price_id = intent.metadata.get(METADATA_PRICE_ID)?;
    if price_id != credits_price_id {
        return None;
    }
    let user_id = intent
        .metadata
        .get(METADATA_USER_ID)
        .filter(|u| !u.is_empty())?;
    Some((user_id.clone(), credits_for_amount(intent.amount)))
}

#[utoipa::path(
    post,
    path = "/api/webhooks/stripe",
    tag = "webhooks",
    request_body(content = String, description = "Raw Stripe event JSON"),
    responses(
        (status = 200, description = "Event accepted"),
        (status = 400, description = "Bad signature or payload"),
        (status = 500, description = "Server error")
    )
)]
#[post("/webhooks/stripe")]
pub async fn stripe_webhook(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ToolError> {
    let header = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ToolError::InvalidRequest("missing Stripe-Signature header".to_string()))?;

    verify_signature(
        &body,
        header,
        &state.config.stripe_webhook_secret,
        Utc::now().timestamp(),
    )?;

    let event: StripeEvent = serde_json::from_slice(&body)
        .map_err(|e| ToolError::InvalidRequest(format!("invalid event: {e}")))?;

    if event.event_type != "payment_intent.succeeded" {
        log::debug!("ignoring stripe event id={} type={}", event.id, event.event_type);
        return Ok(HttpResponse::Ok().json(json!({ "received": true })));
    }

    let intent: PaymentIntent = serde_json::from_value(event.data.object)
        .map_err(|e| ToolError::InvalidRequest(format!("invalid payment intent: {e}")))?;

    let Some(credits_price_id) = state.config.credits_price_id.as_deref() else {
        log::warn!("CREDITS_PRICE_ID not set, ignoring payment intent id={}", intent.id);
        return Ok(HttpResponse::Ok().json(json!({ "received": true })));
    };

    if let Some((user_id, credits)) = credit_top_up(&intent, credits_price_id) {
        let balance = state.credits.add_credits(&user_id, credits).await?;
        log::info!(
            "credits added event_id={} intent={} user_id={} credits={} balance={}",
            event.id,
            intent.id,
            user_id,
            credits,
            balance
        );
    }

    Ok(HttpResponse::Ok().json(json!({ "received": true })))
}
