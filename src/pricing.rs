// src/pricing.rs

use async_trait::async_trait;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::ToolError;
use crate::models::Tool;

/// Smallest credit charge for a duration-priced tool.
pub const MIN_CREDIT_CHARGE: i32 = 5;
/// Smallest cash charge, in cents. Stripe refuses anything below 50 cents.
pub const MIN_CASH_CHARGE: i32 = 50;

/// Read-only tool catalog.
#[async_trait]
pub trait ToolCatalog: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<Tool>, ToolError>;

    /// Fails with `InvalidTool` when no tool has this slug.
    async fn tool(&self, slug: &str) -> Result<Tool, ToolError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    pub credits: i32,
    /// Smallest currency unit.
    pub cash: i32,
}

/// Computes what an invocation of `tool` costs.
///
/// Fixed-price tools return their catalog prices whatever the duration.
/// Duration-priced tools multiply their per-minute rates by the duration
/// and never go below the credit and cash floors; such a tool without a
/// duration is rejected instead of being charged a flat rate.
pub fn resolve_price(tool: &Tool, duration_minutes: Option<u32>) -> Result<Price, ToolError> {
    if !tool.duration_priced {
        return Ok(Price {
            credits: tool.pricing_credits,
            cash: tool.pricing_single,
        });
    }

    let minutes = match duration_minutes {
        Some(m) if m > 0 => i32::try_from(m)
            .map_err(|_| ToolError::InvalidRequest("file is too long".to_string()))?,
        _ => {
            return Err(ToolError::InvalidRequest(format!(
                "{} requires the input duration",
                tool.url
            )))
        }
    };

    let credits = tool
        .pricing_credits
        .checked_mul(minutes)
        .ok_or_else(|| ToolError::InvalidRequest("file is too long".to_string()))?;
    let cash = tool
        .pricing_single
        .checked_mul(minutes)
        .ok_or_else(|| ToolError::InvalidRequest("file is too long".to_string()))?;

    Ok(Price {
        credits: credits.max(MIN_CREDIT_CHARGE),
        cash: cash.max(MIN_CASH_CHARGE),
    })
}

/// Rounds a duration in seconds up to whole minutes, at least one.
pub fn billable_minutes(seconds: f64) -> u32 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 1;
    }
    let minutes = (seconds / 60.0).ceil();
    if minutes >= u32::MAX as f64 {
        u32::MAX
    } else {
        (minutes as u32).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(duration_priced: bool, cash: i32, credits: i32) -> Tool {
        Tool {
            id: 1,
            name: "Tool".into(),
            title: "Tool".into(),
            url: "audio-to-transcript".into(),
            color: "#000000".into(),
            description: "d".into(),
            logo: String::new(),
            pricing_single: cash,
            pricing_credits: credits,
            cta: "Go".into(),
            stripe_price_id: None,
            duration_priced,
        }
    }

    #[test]
    fn fixed_price_ignores_duration() {
        let t = tool(false, 100, 7);
        let expected = Price { credits: 7, cash: 100 };
        assert_eq!(resolve_price(&t, None).unwrap(), expected);
        assert_eq!(resolve_price(&t, Some(1)).unwrap(), expected);
        assert_eq!(resolve_price(&t, Some(500)).unwrap(), expected);
    }

    #[test]
    fn duration_price_has_floors() {
        let t = tool(true, 10, 1);
        assert_eq!(
            resolve_price(&t, Some(1)).unwrap(),
            Price { credits: MIN_CREDIT_CHARGE, cash: MIN_CASH_CHARGE }
        );
        assert_eq!(
            resolve_price(&t, Some(12)).unwrap(),
            Price { credits: 12, cash: 120 }
        );
    }

    #[test]
    fn duration_price_is_monotonic() {
        let t = tool(true, 7, 2);
        let mut last = resolve_price(&t, Some(1)).unwrap();
        for minutes in 2..300 {
            let p = resolve_price(&t, Some(minutes)).unwrap();
            assert!(p.credits >= last.credits && p.cash >= last.cash);
            assert!(p.credits >= MIN_CREDIT_CHARGE && p.cash >= MIN_CASH_CHARGE);
            last = p;
        }
    }

    #[test]
    fn missing_duration_is_rejected() {
        let t = tool(true, 10, 1);
        assert!(matches!(resolve_price(&t, None), Err(ToolError::InvalidRequest(_))));
        assert!(matches!(resolve_price(&t, Some(0)), Err(ToolError::InvalidRequest(_))));
    }

    #[test]
    fn minutes_round_up() {
        assert_eq!(billable_minutes(0.0), 1);
        assert_eq!(billable_minutes(59.0), 1);
        assert_eq!(billable_minutes(60.0), 1);
        assert_eq!(billable_minutes(60.5), 2);
        assert_eq!(billable_minutes(f64::NAN), 1);
    }
}
