use std::collections::HashMap;

use toolsite::api::webhooks::{compute_signature, credit_top_up, verify_signature, PaymentIntent};

const SECRET: &str = "whsec_test";
const PAYLOAD: &[u8] = br#"{"id":"evt_1","type":"payment_intent.succeeded"}"#;

fn header(ts: i64) -> String {
    format!("t={},v1={}", ts, compute_signature(SECRET, ts, PAYLOAD))
}

#[test]
fn valid_signature_is_accepted() {
    let now = 1_700_000_000;
    assert!(verify_signature(PAYLOAD, &header(now), SECRET, now).is_ok());
    // Within tolerance either side.
    assert!(verify_signature(PAYLOAD, &header(now - 299), SECRET, now).is_ok());
}

#[test]
fn any_of_several_v1_signatures_may_match() {
    let now = 1_700_000_000;
    let h = format!(
        "t={},v1=0000,v1={},v0=ignored",
        now,
        compute_signature(SECRET, now, PAYLOAD)
    );
    assert!(verify_signature(PAYLOAD, &h, SECRET, now).is_ok());
}

#[test]
fn tampered_payload_or_wrong_secret_is_rejected() {
    let now = 1_700_000_000;
    let h = header(now);
    assert!(verify_signature(b"{}", &h, SECRET, now).is_err());
    assert!(verify_signature(PAYLOAD, &h, "whsec_other", now).is_err());
}

#[test]
fn stale_or_malformed_header_is_rejected() {
    let now = 1_700_000_000;
    assert!(verify_signature(PAYLOAD, &header(now - 301), SECRET, now).is_err());
    assert!(verify_signature(PAYLOAD, "v1=abc", SECRET, now).is_err());
    assert!(verify_signature(PAYLOAD, &format!("t={now}"), SECRET, now).is_err());
    assert!(verify_signature(PAYLOAD, "", SECRET, now).is_err());
}

fn intent(amount: i64, price_id: Option<&str>, user_id: Option<&str>) -> PaymentIntent {
    let mut metadata = HashMap::new();
    if let Some(p) = price_id {
        metadata.insert("priceId".to_string(), p.to_string());
    }
    if let Some(u) = user_id {
        metadata.insert("userId".to_string(), u.to_string());
    }
    PaymentIntent {
        id: "pi_1".to_string(),
        amount,
        metadata,
    }
}

#[test]
fn only_credit_purchases_top_up() {
    assert_eq!(
        credit_top_up(&intent(1000, Some("price_credits"), Some("user_1")), "price_credits"),
        Some(("user_1".to_string(), 100))
    );
    assert_eq!(
        credit_top_up(&intent(995, Some("price_credits"), Some("user_1")), "price_credits"),
        Some(("user_1".to_string(), 99))
    );
    assert_eq!(
        credit_top_up(&intent(1000, Some("price_other"), Some("user_1")), "price_credits"),
        None
    );
    assert_eq!(credit_top_up(&intent(1000, None, Some("user_1")), "price_credits"), None);
    assert_eq!(
        credit_top_up(&intent(1000, Some("price_credits"), Some("")), "price_credits"),
        None
    );
}
