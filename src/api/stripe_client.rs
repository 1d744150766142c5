// src/api/stripe_client.rs
//
// Minimal client for the Stripe REST API. Auth: secret key as basic-auth
// user, form-encoded bodies.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::error::ToolError;
use crate::payments::{
    CheckoutGateway, CheckoutSession, NewCheckout, METADATA_FULFILLED, METADATA_PRICE_ID,
    METADATA_TOOL, METADATA_UNIQUE_ID, METADATA_USER_ID,
};

#[derive(Debug, Error)]
pub enum StripeError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("stripe api error status={status} body={body}")]
    Api { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    api_base: String,
    secret_key: String,
}

impl StripeClient {
    pub fn new(
        api_base: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        form: Option<&[(String, String)]>,
    ) -> Result<T, StripeError> {
        let mut req = self
            .client
            .request(method, format!("{}{}", self.api_base, path))
            .basic_auth(&self.secret_key, Option::<&str>::None);

        if let Some(form) = form {
            req = req.form(form);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(StripeError::Api {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str::<T>(&body)
            .map_err(|e| StripeError::InvalidResponse(format!("{e}; body={body}")))
    }

    pub async fn get_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, StripeError> {
        self.request(Method::GET, &format!("/checkout/sessions/{session_id}"), None)
            .await
    }

    pub async fn update_checkout_metadata(
        &self,
        session_id: &str,
        metadata: &[(&str, &str)],
    ) -> Result<CheckoutSession, StripeError> {
        let form: Vec<(String, String)> = metadata
            .iter()
            .map(|(k, v)| (format!("metadata[{k}]"), v.to_string()))
            .collect();
        self.request(
            Method::POST,
            &format!("/checkout/sessions/{session_id}"),
            Some(&form),
        )
        .await
    }

    pub async fn create_checkout_session(
        &self,
        checkout: &NewCheckout,
    ) -> Result<CheckoutSession, StripeError> {
        let form = checkout_form(checkout);
        self.request(Method::POST, "/checkout/sessions", Some(&form))
            .await
    }
}

/// Form body for an embedded, one-off payment session.
pub fn checkout_form(checkout: &NewCheckout) -> Vec<(String, String)> {
    let user_id = checkout.user_id.clone().unwrap_or_default();
    let mut form: Vec<(String, String)> = vec![
        ("mode".into(), "payment".into()),
        ("ui_mode".into(), "embedded".into()),
        ("redirect_on_completion".into(), "never".into()),
        ("line_items[0][quantity]".into(), "1".into()),
        (format!("metadata[{METADATA_USER_ID}]"), user_id.clone()),
        (format!("metadata[{METADATA_FULFILLED}]"), "false".into()),
        (
            format!("payment_intent_data[metadata][{METADATA_USER_ID}]"),
            user_id,
        ),
    ];

    if let Some(custom) = &checkout.custom {
        form.push((
            "line_items[0][price_data][currency]".into(),
            custom.currency.clone(),
        ));
        form.push((
            "line_items[0][price_data][unit_amount]".into(),
            custom.unit_amount.to_string(),
        ));
        form.push((
            "line_items[0][price_data][product_data][name]".into(),
            custom.name.clone(),
        ));
    } else if let Some(price_id) = &checkout.price_id {
        form.push(("line_items[0][price]".into(), price_id.clone()));
        form.push((
            format!("payment_intent_data[metadata][{METADATA_PRICE_ID}]"),
            price_id.clone(),
        ));
    }

    if let Some(tool) = &checkout.tool {
        form.push((format!("metadata[{METADATA_TOOL}]"), tool.clone()));
    }

    form
}

#[async_trait]
impl CheckoutGateway for StripeClient {
    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, ToolError> {
        self.get_checkout_session(session_id).await.map_err(|e| {
            log::error!("stripe retrieve session failed session_id={} err={}", session_id, e);
            ToolError::PaymentVerificationFailed(e.to_string())
        })
    }

    async fn mark_fulfilled(&self, session_id: &str, unique_id: &str) -> Result<(), ToolError> {
        self.update_checkout_metadata(
            session_id,
            &[(METADATA_FULFILLED, "true"), (METADATA_UNIQUE_ID, unique_id)],
        )
        .await
        .map_err(|e| {
            log::error!("stripe mark fulfilled failed session_id={} err={}", session_id, e);
            ToolError::FinalizeFailed(e.to_string())
        })?;
        Ok(())
    }

    async fn create_session(&self, checkout: &NewCheckout) -> Result<String, ToolError> {
        let session = self.create_checkout_session(checkout).await.map_err(|e| {
            log::error!("stripe create session failed err={}", e);
            ToolError::Internal("Failed to create checkout session".to_string())
        })?;

        session.client_secret.ok_or_else(|| {
            ToolError::Internal("checkout session has no client secret".to_string())
        })
    }
}
