// src/ledger.rs

use async_trait::async_trait;
use rand::Rng;

use crate::error::ToolError;
use crate::models::{NewOperation, OperationRecord};
use crate::storage::{artifact_key, ArtifactStore};

pub const DOWNLOAD_CODE_LEN: usize = 6;
const DOWNLOAD_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Record of fulfilled operations, keyed for retrieval by download code.
#[async_trait]
pub trait OperationLedger: Send + Sync {
    /// Stores the record and returns its download code.
    async fn insert(&self, op: &NewOperation) -> Result<String, ToolError>;

    /// Fails with `NotFound` for unknown codes.
    async fn find_by_download_code(&self, code: &str) -> Result<OperationRecord, ToolError>;

    async fn list_by_owner_and_tool(
        &self,
        owner: &str,
        tool: &str,
    ) -> Result<Vec<OperationRecord>, ToolError>;

    async fn find_by_name_and_tool(
        &self,
        owner: &str,
        name: &str,
        tool: &str,
    ) -> Result<OperationRecord, ToolError>;

    /// Returns false when no row matched.
    async fn delete_by_name_and_tool(
        &self,
        owner: &str,
        name: &str,
        tool: &str,
    ) -> Result<bool, ToolError>;

    async fn delete_by_download_code(&self, code: &str) -> Result<bool, ToolError>;

    /// True when a stored row resolves to the same artifact key as `op`.
    /// Keys are not unique per operation: saved runs share
    /// `<tool>/<owner>/<name>` and temporary runs share `temp/<name>`.
    async fn artifact_in_use(&self, op: &NewOperation) -> Result<bool, ToolError>;
}

/// Six independent uniform draws from `[A-Z0-9]`.
pub fn generate_download_code() -> String {
    let mut rng = rand::thread_rng();
    (0..DOWNLOAD_CODE_LEN)
        .map(|_| DOWNLOAD_CODE_ALPHABET[rng.gen_range(0..DOWNLOAD_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Normalises user input: trims and uppercases, `None` if it cannot be a code.
pub fn normalize_download_code(input: &str) -> Option<String> {
    let code = input.trim().to_ascii_uppercase();
    let valid = code.len() == DOWNLOAD_CODE_LEN
        && code.bytes().all(|b| DOWNLOAD_CODE_ALPHABET.contains(&b));
    valid.then_some(code)
}

/// Deletes an operation and its stored artifact.
///
/// Both deletes are attempted even when the first fails; the first error
/// is returned.
pub async fn remove_operation(
    ledger: &dyn OperationLedger,
    store: &dyn ArtifactStore,
    owner: &str,
    name: &str,
    tool: &str,
) -> Result<(), ToolError> {
    let record = ledger.find_by_name_and_tool(owner, name, tool).await?;
    let key = artifact_key(Some(owner), tool, &record.name, record.temporary);

    let blob = store.delete(&key).await;
    if let Err(e) = &blob {
        log::error!("delete artifact failed key={} err={}", key, e);
    }

    let row = ledger.delete_by_name_and_tool(owner, name, tool).await;
    if let Err(e) = &row {
        log::error!("delete operation row failed owner={} name={} err={}", owner, name, e);
    }

    blob?;
    row?;
    Ok(())
}
