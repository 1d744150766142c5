// src/billing.rs

use async_trait::async_trait;

use crate::error::ToolError;
use crate::models::UserAccount;
use crate::pricing::Price;

/// Per-user credit balance and usage counter.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Fails with `UserNotFound` when the user has no row yet.
    async fn balance(&self, user_id: &str) -> Result<i32, ToolError>;

    /// Takes `amount` credits in a single conditional write and returns the
    /// new balance. Fails with `InsufficientCredits` and leaves the balance
    /// untouched when it is lower than `amount`.
    async fn debit(&self, user_id: &str, amount: i32) -> Result<i32, ToolError>;

    /// Adds credits, creating the user row when needed.
    async fn add_credits(&self, user_id: &str, amount: i32) -> Result<i32, ToolError>;

    async fn increment_operations(&self, user_id: &str) -> Result<(), ToolError>;

    async fn account(&self, user_id: &str) -> Result<UserAccount, ToolError>;
}

/// Checks that `user_id` can pay `price` in credits. Nothing is written.
pub async fn ensure_credits(
    ledger: &dyn CreditLedger,
    user_id: &str,
    price: &Price,
) -> Result<i32, ToolError> {
    let balance = ledger.balance(user_id).await?;
    if balance < price.credits {
        log::info!(
            "insufficient credits user_id={} balance={} required={}",
            user_id,
            balance,
            price.credits
        );
        return Err(ToolError::InsufficientCredits {
            balance,
            required: price.credits,
        });
    }
    Ok(balance)
}

/// Credits granted for a top-up payment: one credit per 10 cents.
pub fn credits_for_amount(amount_cents: i64) -> i32 {
    let credits = amount_cents.max(0) / 10;
    i32::try_from(credits).unwrap_or(i32::MAX)
}
