// src/db.rs

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::billing::CreditLedger;
use crate::error::ToolError;
use crate::ledger::{generate_download_code, OperationLedger};
use crate::models::{NewOperation, OperationRecord, Tool, UserAccount};
use crate::pricing::ToolCatalog;
use crate::storage::sanitize;

// A fresh code colliding five times in a row means the code space is
// nearly exhausted, not bad luck.
const DOWNLOAD_CODE_ATTEMPTS: usize = 5;

const TOOL_COLUMNS: &str = "id, name, title, url, color, description, logo, pricing_single, \
     pricing_credits, cta, stripe_price_id, duration_priced";

const OPERATION_COLUMNS: &str = "id, user_id, name, tool, download_code, temporary, created_at";

/// Postgres-backed catalog and ledgers.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn tool_from_row(r: &PgRow) -> Tool {
    Tool {
        id: r.get("id"),
        name: r.get("name"),
        title: r.get("title"),
        url: r.get("url"),
        color: r.get("color"),
        description: r.get("description"),
        logo: r.get("logo"),
        pricing_single: r.get("pricing_single"),
        pricing_credits: r.get("pricing_credits"),
        cta: r.get("cta"),
        stripe_price_id: r.get("stripe_price_id"),
        duration_priced: r.get("duration_priced"),
    }
}

fn operation_from_row(r: &PgRow) -> OperationRecord {
    OperationRecord {
        id: r.get("id"),
        user_id: r.get("user_id"),
        name: r.get("name"),
        tool: r.get("tool"),
        download_code: r.get("download_code"),
        temporary: r.get("temporary"),
        created_at: r.get("created_at"),
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[async_trait]
impl ToolCatalog for PgStore {
    async fn list_tools(&self) -> Result<Vec<Tool>, ToolError> {
        let rows = sqlx::query(&format!("SELECT {TOOL_COLUMNS} FROM tools ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(tool_from_row).collect())
    }

    async fn tool(&self, slug: &str) -> Result<Tool, ToolError> {
        let row = sqlx::query(&format!("SELECT {TOOL_COLUMNS} FROM tools WHERE url = $1"))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref()
            .map(tool_from_row)
            .ok_or_else(|| ToolError::InvalidTool(slug.to_string()))
    }
}

#[async_trait]
impl CreditLedger for PgStore {
    async fn balance(&self, user_id: &str) -> Result<i32, ToolError> {
        let row = sqlx::query("SELECT credits FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.get("credits")).ok_or(ToolError::UserNotFound)
    }

    async fn debit(&self, user_id: &str, amount: i32) -> Result<i32, ToolError> {
        let row = sqlx::query(
            r#"UPDATE users
               SET credits = credits - $1
               WHERE user_id = $2 AND credits >= $1
               RETURNING credits"#,
        )
        .bind(amount)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            log::error!("debit failed user_id={} amount={} err={}", user_id, amount, e);
            ToolError::FinalizeFailed(e.to_string())
        })?;

        match row {
            Some(r) => Ok(r.get("credits")),
            // Either the user vanished or a concurrent debit got there first.
            None => {
                let balance = self.balance(user_id).await?;
                Err(ToolError::InsufficientCredits {
                    balance,
                    required: amount,
                })
            }
        }
    }

    async fn add_credits(&self, user_id: &str, amount: i32) -> Result<i32, ToolError> {
        let row = sqlx::query(
            r#"INSERT INTO users (user_id, credits, total_operations)
               VALUES ($1, $2, 0)
               ON CONFLICT (user_id)
               DO UPDATE SET credits = users.credits + EXCLUDED.credits
               RETURNING credits"#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("credits"))
    }

    async fn increment_operations(&self, user_id: &str) -> Result<(), ToolError> {
        sqlx::query(
            r#"INSERT INTO users (user_id, credits, total_operations)
               VALUES ($1, 0, 1)
               ON CONFLICT (user_id)
               DO UPDATE SET total_operations = users.total_operations + 1"#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            log::error!("usage counter update failed user_id={} err={}", user_id, e);
            ToolError::LedgerWriteFailed(e.to_string())
        })?;

        Ok(())
    }

    async fn account(&self, user_id: &str) -> Result<UserAccount, ToolError> {
        let row = sqlx::query(
            "SELECT user_id, credits, total_operations FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| UserAccount {
            user_id: r.get("user_id"),
            credits: r.get("credits"),
            total_operations: r.get("total_operations"),
        })
        .ok_or(ToolError::UserNotFound)
    }
}

#[async_trait]
impl OperationLedger for PgStore {
    async fn insert(&self, op: &NewOperation) -> Result<String, ToolError> {
        for _ in 0..DOWNLOAD_CODE_ATTEMPTS {
            let code = generate_download_code();
            let res = sqlx::query(
                r#"INSERT INTO user_operations (user_id, name, tool, download_code, temporary, created_at)
                   VALUES ($1, $2, $3, $4, $5, $6)"#,
            )
            .bind(&op.owner)
            .bind(&op.name)
            .bind(op.tool.slug())
            .bind(&code)
            .bind(op.temporary)
            .bind(op.created_at)
            .execute(&self.pool)
            .await;

            match res {
                Ok(_) => return Ok(code),
                Err(e) if is_unique_violation(&e) => {
                    log::warn!("download code collision code={}, retrying", code);
                }
                Err(e) => {
                    log::error!(
                        "insert operation failed owner={} tool={} err={}",
                        op.owner,
                        op.tool,
                        e
                    );
                    return Err(ToolError::LedgerWriteFailed(e.to_string()));
                }
            }
        }

        Err(ToolError::LedgerWriteFailed(
            "could not allocate a unique download code".to_string(),
        ))
    }

    async fn find_by_download_code(&self, code: &str) -> Result<OperationRecord, ToolError> {
        let row = sqlx::query(&format!(
            "SELECT {OPERATION_COLUMNS} FROM user_operations WHERE download_code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(operation_from_row).ok_or(ToolError::NotFound)
    }

    async fn list_by_owner_and_tool(
        &self,
        owner: &str,
        tool: &str,
    ) -> Result<Vec<OperationRecord>, ToolError> {
        let rows = sqlx::query(&format!(
            r#"SELECT {OPERATION_COLUMNS} FROM user_operations
               WHERE user_id = $1 AND tool = $2 AND temporary = false
               ORDER BY created_at DESC"#
        ))
        .bind(owner)
        .bind(tool)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(operation_from_row).collect())
    }

    async fn find_by_name_and_tool(
        &self,
        owner: &str,
        name: &str,
        tool: &str,
    ) -> Result<OperationRecord, ToolError> {
        let row = sqlx::query(&format!(
            r#"SELECT {OPERATION_COLUMNS} FROM user_operations
               WHERE user_id = $1 AND name = $2 AND tool = $3
               ORDER BY created_at DESC
               LIMIT 1"#
        ))
        .bind(owner)
        .bind(name)
        .bind(tool)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(operation_from_row).ok_or(ToolError::NotFound)
    }

    async fn delete_by_name_and_tool(
        &self,
        owner: &str,
        name: &str,
        tool: &str,
    ) -> Result<bool, ToolError> {
        let res = sqlx::query(
            "DELETE FROM user_operations WHERE user_id = $1 AND name = $2 AND tool = $3",
        )
        .bind(owner)
        .bind(name)
        .bind(tool)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() > 0)
    }

    async fn delete_by_download_code(&self, code: &str) -> Result<bool, ToolError> {
        let res = sqlx::query("DELETE FROM user_operations WHERE download_code = $1")
            .bind(code)
            .execute(&self.pool)
            .await?;

        Ok(res.rows_affected() > 0)
    }

    async fn artifact_in_use(&self, op: &NewOperation) -> Result<bool, ToolError> {
        // Same replacement as `storage::sanitize`, so names that map to one
        // key match each other.
        let row = sqlx::query(
            r#"SELECT EXISTS (
                   SELECT 1 FROM user_operations
                   WHERE temporary = $1
                     AND regexp_replace(name, '[^A-Za-z0-9.-]', '_', 'g') = $2
                     AND ($1 OR (user_id = $3 AND tool = $4))
               ) AS in_use"#,
        )
        .bind(op.temporary)
        .bind(sanitize(&op.name))
        .bind(&op.owner)
        .bind(op.tool.slug())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("in_use"))
    }
}
