// src/payments.rs

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ToolError;

pub const METADATA_FULFILLED: &str = "fulfilled";
pub const METADATA_UNIQUE_ID: &str = "uniqueMetadataId";
pub const METADATA_USER_ID: &str = "userId";
pub const METADATA_PRICE_ID: &str = "priceId";
pub const METADATA_TOOL: &str = "tool";

/// The parts of a checkout session the service cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub payment_status: String,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    pub fn is_fulfilled(&self) -> bool {
        self.metadata.get(METADATA_FULFILLED).map(String::as_str) == Some("true")
    }

    /// Tool slug the session was opened for. Credit purchases carry none.
    pub fn tool(&self) -> Option<&str> {
        self.metadata
            .get(METADATA_TOOL)
            .map(String::as_str)
            .filter(|t| !t.is_empty())
    }
}

/// Ad-hoc priced line item, used for duration-priced tools.
#[derive(Debug, Clone)]
pub struct CustomLineItem {
    pub name: String,
    pub unit_amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewCheckout {
    pub price_id: Option<String>,
    pub custom: Option<CustomLineItem>,
    pub user_id: Option<String>,
    pub tool: Option<String>,
}

/// Payment processor as seen by the service.
#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, ToolError>;

    /// Flags the session as paid out. Called once, after delivery exists.
    async fn mark_fulfilled(&self, session_id: &str, unique_id: &str) -> Result<(), ToolError>;

    /// Creates an embedded checkout session and returns its client secret.
    async fn create_session(&self, checkout: &NewCheckout) -> Result<String, ToolError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    pub session_id: String,
    pub amount: i64,
}

/// Extracts the session id from a `<sessionId>_secret_<nonce>` client secret.
pub fn session_id_from_secret(client_secret: &str) -> Result<&str, ToolError> {
    match client_secret.split_once("_secret_") {
        Some((id, nonce)) if !id.is_empty() && !nonce.is_empty() => Ok(id),
        _ => Err(ToolError::InvalidRequest(
            "malformed checkout client secret".to_string(),
        )),
    }
}

/// Confirms that the session behind `client_secret` was opened for `tool`,
/// is paid, not yet used, and covers `expected_amount`. Read-only.
///
/// A used session is `AlreadyFulfilled` whatever its payment status.
pub async fn verify_payment(
    gateway: &dyn CheckoutGateway,
    client_secret: &str,
    tool: &str,
    expected_amount: i64,
) -> Result<VerifiedPayment, ToolError> {
    let session_id = session_id_from_secret(client_secret)?;
    let session = gateway.retrieve_session(session_id).await?;

    if session.is_fulfilled() {
        log::warn!("checkout session reused session_id={}", session_id);
        return Err(ToolError::AlreadyFulfilled);
    }

    if session.tool() != Some(tool) {
        log::warn!(
            "checkout session tool mismatch session_id={} session_tool={:?} tool={}",
            session_id,
            session.tool(),
            tool
        );
        return Err(ToolError::InvalidRequest(format!(
            "checkout session was not opened for {tool}"
        )));
    }

    if session.payment_status != "paid" {
        return Err(ToolError::PaymentNotReceived);
    }

    let charged = session.amount_total.unwrap_or(0);
    if charged < expected_amount {
        log::warn!(
            "checkout amount too low session_id={} charged={} expected={}",
            session_id,
            charged,
            expected_amount
        );
        return Err(ToolError::PriceMismatch {
            charged,
            expected: expected_amount,
        });
    }

    Ok(VerifiedPayment {
        session_id: session.id,
        amount: charged,
    })
}
