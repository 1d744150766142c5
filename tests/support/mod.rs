#![allow(dead_code)]

use std::collections::HashMap;
use std::env;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use image::{ImageBuffer, ImageFormat, Rgb};
use jsonwebtoken::{encode, EncodingKey, Header};
use sqlx::PgPool;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use toolsite::api::auth::Claims;
use toolsite::billing::CreditLedger;
use toolsite::config::Config;
use toolsite::error::ToolError;
use toolsite::ledger::{generate_download_code, OperationLedger};
use toolsite::mailer::Mailer;
use toolsite::models::{NewOperation, OperationRecord, Tool, UploadedFile, UserAccount};
use toolsite::payments::{CheckoutGateway, CheckoutSession, NewCheckout};
use toolsite::pricing::ToolCatalog;
use toolsite::storage::{artifact_key, ArtifactMeta, ArtifactStore, StoredArtifact};
use toolsite::tools::img_to_pdf::generate_pdf;
use toolsite::tools::media::DurationProbe;
use toolsite::tools::transcript::Transcriber;
use toolsite::tools::ToolExecutor;
use toolsite::AppState;

pub const SAMPLE_SRT: &str = "1\n00:00:00,000 --> 00:00:02,000\nHello there.\n";

// ---------------------------------------------------------------------------
// catalog

pub fn tool(id: i32, url: &str, single: i32, credits: i32, duration_priced: bool) -> Tool {
    Tool {
        id,
        name: url.to_string(),
        title: url.to_string(),
        url: url.to_string(),
        color: "#000000".to_string(),
        description: String::new(),
        logo: String::new(),
        pricing_single: single,
        pricing_credits: credits,
        cta: "Go".to_string(),
        stripe_price_id: None,
        duration_priced,
    }
}

/// Same rows as the seed migration.
pub struct FakeCatalog {
    pub tools: Vec<Tool>,
}

impl Default for FakeCatalog {
    fn default() -> Self {
        Self {
            tools: vec![
                tool(1, "img-to-pdf", 100, 7, false),
                tool(2, "audio-to-transcript", 10, 1, true),
                tool(3, "pdf-signing", 100, 5, false),
            ],
        }
    }
}

#[async_trait]
impl ToolCatalog for FakeCatalog {
    async fn list_tools(&self) -> Result<Vec<Tool>, ToolError> {
        Ok(self.tools.clone())
    }

    async fn tool(&self, slug: &str) -> Result<Tool, ToolError> {
        self.tools
            .iter()
            .find(|t| t.url == slug)
            .cloned()
            .ok_or_else(|| ToolError::InvalidTool(slug.to_string()))
    }
}

// ---------------------------------------------------------------------------
// credits

#[derive(Default)]
pub struct FakeCredits {
    /// user_id -> (credits, total_operations)
    pub users: Mutex<HashMap<String, (i32, i32)>>,
    pub fail_debit: AtomicBool,
    pub fail_increment: AtomicBool,
}

impl FakeCredits {
    pub fn set_balance(&self, user_id: &str, credits: i32) {
        self.users
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_insert((0, 0))
            .0 = credits;
    }

    pub fn get(&self, user_id: &str) -> Option<(i32, i32)> {
        self.users.lock().unwrap().get(user_id).copied()
    }
}

#[async_trait]
impl CreditLedger for FakeCredits {
    async fn balance(&self, user_id: &str) -> Result<i32, ToolError> {
        self.get(user_id).map(|u| u.0).ok_or(ToolError::UserNotFound)
    }

    async fn debit(&self, user_id: &str, amount: i32) -> Result<i32, ToolError> {
        if self.fail_debit.load(Ordering::SeqCst) {
            return Err(ToolError::FinalizeFailed("debit refused".to_string()));
        }
        let mut users = self.users.lock().unwrap();
        let entry = users.get_mut(user_id).ok_or(ToolError::UserNotFound)?;
        if entry.0 < amount {
            return Err(ToolError::InsufficientCredits {
                balance: entry.0,
                required: amount,
            });
        }
        entry.0 -= amount;
        Ok(entry.0)
    }

    async fn add_credits(&self, user_id: &str, amount: i32) -> Result<i32, ToolError> {
        let mut users = self.users.lock().unwrap();
        let entry = users.entry(user_id.to_string()).or_insert((0, 0));
        entry.0 += amount;
        Ok(entry.0)
    }

    async fn increment_operations(&self, user_id: &str) -> Result<(), ToolError> {
        if self.fail_increment.load(Ordering::SeqCst) {
            return Err(ToolError::LedgerWriteFailed("counter down".to_string()));
        }
        let mut users = self.users.lock().unwrap();
        users.entry(user_id.to_string()).or_insert((0, 0)).1 += 1;
        Ok(())
    }

    async fn account(&self, user_id: &str) -> Result<UserAccount, ToolError> {
        let (credits, total_operations) = self.get(user_id).ok_or(ToolError::UserNotFound)?;
        Ok(UserAccount {
            user_id: user_id.to_string(),
            credits,
            total_operations,
        })
    }
}

// ---------------------------------------------------------------------------
// operation ledger

#[derive(Default)]
pub struct FakeOperations {
    pub records: Mutex<Vec<OperationRecord>>,
    pub fail_insert: AtomicBool,
    next_id: AtomicUsize,
}

impl FakeOperations {
    pub fn all(&self) -> Vec<OperationRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl OperationLedger for FakeOperations {
    async fn insert(&self, op: &NewOperation) -> Result<String, ToolError> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(ToolError::LedgerWriteFailed("ledger down".to_string()));
        }
        let mut records = self.records.lock().unwrap();
        let code = loop {
            let code = generate_download_code();
            if !records.iter().any(|r| r.download_code == code) {
                break code;
            }
        };
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i32 + 1;
        records.push(OperationRecord {
            id,
            user_id: op.owner.clone(),
            name: op.name.clone(),
            tool: op.tool.slug().to_string(),
            download_code: code.clone(),
            temporary: op.temporary,
            created_at: op.created_at,
        });
        Ok(code)
    }

    async fn find_by_download_code(&self, code: &str) -> Result<OperationRecord, ToolError> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.download_code == code)
            .cloned()
            .ok_or(ToolError::NotFound)
    }

    async fn list_by_owner_and_tool(
        &self,
        owner: &str,
        tool: &str,
    ) -> Result<Vec<OperationRecord>, ToolError> {
        let mut found: Vec<OperationRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == owner && r.tool == tool && !r.temporary)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn find_by_name_and_tool(
        &self,
        owner: &str,
        name: &str,
        tool: &str,
    ) -> Result<OperationRecord, ToolError> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.user_id == owner && r.name == name && r.tool == tool)
            .cloned()
            .ok_or(ToolError::NotFound)
    }

    async fn delete_by_name_and_tool(
        &self,
        owner: &str,
        name: &str,
        tool: &str,
    ) -> Result<bool, ToolError> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| !(r.user_id == owner && r.name == name && r.tool == tool));
        Ok(records.len() != before)
    }

    async fn delete_by_download_code(&self, code: &str) -> Result<bool, ToolError> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.download_code != code);
        Ok(records.len() != before)
    }

    async fn artifact_in_use(&self, op: &NewOperation) -> Result<bool, ToolError> {
        let key = artifact_key(Some(&op.owner), op.tool.slug(), &op.name, op.temporary);
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .any(|r| artifact_key(Some(&r.user_id), &r.tool, &r.name, r.temporary) == key))
    }
}

// ---------------------------------------------------------------------------
// artifact store

#[derive(Default)]
pub struct FakeArtifacts {
    pub objects: Mutex<HashMap<String, (String, Vec<u8>)>>,
    pub fail_put: AtomicBool,
    pub puts: AtomicUsize,
}

impl FakeArtifacts {
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn get(&self, key: &str) -> Option<(String, Vec<u8>)> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

pub fn fake_url(key: &str) -> String {
    format!("https://files.test/{key}?signature=abc")
}

#[async_trait]
impl ArtifactStore for FakeArtifacts {
    async fn put(&self, bytes: Vec<u8>, meta: &ArtifactMeta) -> Result<StoredArtifact, ToolError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(ToolError::StorageWriteFailed("bucket gone".to_string()));
        }
        let key = artifact_key(meta.owner.as_deref(), &meta.tool, &meta.name, meta.temporary);
        self.objects
            .lock()
            .unwrap()
            .insert(key.clone(), (meta.content_type.clone(), bytes));
        Ok(StoredArtifact {
            url: fake_url(&key),
            key,
        })
    }

    async fn signed_url(&self, key: &str, _expires_in: Duration) -> Result<String, ToolError> {
        Ok(fake_url(key))
    }

    async fn delete(&self, key: &str) -> Result<(), ToolError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// checkout

#[derive(Default)]
pub struct FakeCheckout {
    pub sessions: Mutex<HashMap<String, CheckoutSession>>,
    pub marked: Mutex<Vec<(String, String)>>,
    pub created: Mutex<Vec<NewCheckout>>,
    pub fail_mark: AtomicBool,
}

impl FakeCheckout {
    /// Adds a session opened for `tool` and returns its client secret.
    pub fn add_session(
        &self,
        id: &str,
        tool: &str,
        payment_status: &str,
        amount: i64,
        fulfilled: bool,
    ) -> String {
        let secret = self.add_credit_session(id, payment_status, amount, fulfilled);
        if let Some(session) = self.sessions.lock().unwrap().get_mut(id) {
            session.metadata.insert("tool".to_string(), tool.to_string());
        }
        secret
    }

    /// Adds a credit-pack session, which names no tool.
    pub fn add_credit_session(
        &self,
        id: &str,
        payment_status: &str,
        amount: i64,
        fulfilled: bool,
    ) -> String {
        let mut metadata = HashMap::new();
        metadata.insert("fulfilled".to_string(), fulfilled.to_string());
        self.sessions.lock().unwrap().insert(
            id.to_string(),
            CheckoutSession {
                id: id.to_string(),
                payment_status: payment_status.to_string(),
                amount_total: Some(amount),
                client_secret: Some(format!("{id}_secret_test")),
                metadata,
            },
        );
        format!("{id}_secret_test")
    }

    pub fn is_fulfilled(&self, id: &str) -> bool {
        self.sessions
            .lock()
            .unwrap()
            .get(id)
            .map(|s| s.is_fulfilled())
            .unwrap_or(false)
    }
}

#[async_trait]
impl CheckoutGateway for FakeCheckout {
    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, ToolError> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| ToolError::PaymentVerificationFailed("no such session".to_string()))
    }

    async fn mark_fulfilled(&self, session_id: &str, unique_id: &str) -> Result<(), ToolError> {
        if self.fail_mark.load(Ordering::SeqCst) {
            return Err(ToolError::FinalizeFailed("stripe down".to_string()));
        }
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| ToolError::FinalizeFailed("no such session".to_string()))?;
        session
            .metadata
            .insert("fulfilled".to_string(), "true".to_string());
        session
            .metadata
            .insert("uniqueMetadataId".to_string(), unique_id.to_string());
        self.marked
            .lock()
            .unwrap()
            .push((session_id.to_string(), unique_id.to_string()));
        Ok(())
    }

    async fn create_session(&self, checkout: &NewCheckout) -> Result<String, ToolError> {
        self.created.lock().unwrap().push(checkout.clone());
        Ok("cs_test_new_secret_abc".to_string())
    }
}

// ---------------------------------------------------------------------------
// transcription, duration, email

#[derive(Default)]
pub struct FakeTranscriber {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, _audio: &UploadedFile, _language: &str) -> Result<String, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ToolError::TranscriptionFailed("model unavailable".to_string()));
        }
        Ok(SAMPLE_SRT.to_string())
    }
}

pub struct FakeProbe {
    pub seconds: Mutex<f64>,
}

impl Default for FakeProbe {
    fn default() -> Self {
        Self {
            seconds: Mutex::new(60.0),
        }
    }
}

#[async_trait]
impl DurationProbe for FakeProbe {
    async fn duration_seconds(&self, _file: &UploadedFile) -> Result<f64, ToolError> {
        Ok(*self.seconds.lock().unwrap())
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, subject: &str, text: &str) -> Result<(), ToolError> {
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), text.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// harness

/// Every collaborator as a fake, kept around so tests can inspect them.
#[derive(Default)]
pub struct Harness {
    pub catalog: Arc<FakeCatalog>,
    pub credits: Arc<FakeCredits>,
    pub operations: Arc<FakeOperations>,
    pub artifacts: Arc<FakeArtifacts>,
    pub checkout: Arc<FakeCheckout>,
    pub transcriber: Arc<FakeTranscriber>,
    pub probe: Arc<FakeProbe>,
    pub mailer: Arc<RecordingMailer>,
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AppState {
        AppState {
            config: Arc::new(Config::for_tests()),
            catalog: self.catalog.clone(),
            credits: self.credits.clone(),
            operations: self.operations.clone(),
            artifacts: self.artifacts.clone(),
            checkout: self.checkout.clone(),
            probe: self.probe.clone(),
            executor: ToolExecutor::new(self.transcriber.clone()),
            mailer: self.mailer.clone(),
        }
    }
}

/// `Authorization` header value for `user_id`, signed with the test secret.
pub fn bearer(user_id: &str) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (Utc::now().timestamp() + 3600) as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(Config::for_tests().jwt_secret.as_bytes()),
    )
    .expect("encode jwt");
    format!("Bearer {token}")
}

// ---------------------------------------------------------------------------
// sample files

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(width, height, Rgb([200, 30, 30]));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .expect("encode png");
    out
}

pub fn png_file(name: &str) -> UploadedFile {
    UploadedFile {
        file_name: name.to_string(),
        content_type: "image/png".to_string(),
        bytes: png_bytes(16, 24),
    }
}

pub fn audio_file() -> UploadedFile {
    UploadedFile {
        file_name: "memo.mp3".to_string(),
        content_type: "audio/mpeg".to_string(),
        bytes: vec![0xFF, 0xFB, 0x90, 0x00],
    }
}

pub fn pdf_file() -> UploadedFile {
    let out = generate_pdf(&[png_file("page.png")], Default::default()).expect("sample pdf");
    UploadedFile {
        file_name: "contract.pdf".to_string(),
        content_type: "application/pdf".to_string(),
        bytes: out.bytes,
    }
}

// ---------------------------------------------------------------------------
// Postgres

fn split_db_url(url: &str) -> Result<(String, String), String> {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base.to_string(), Some(query)),
        None => (url.to_string(), None),
    };

    let db_start = base
        .rfind('/')
        .ok_or_else(|| "invalid database url".to_string())?;
    if db_start + 1 >= base.len() {
        return Err("database name is empty".to_string());
    }

    let db_name = base[db_start + 1..].to_string();
    let mut admin_url = format!("{}postgres", &base[..db_start + 1]);
    if let Some(query) = query {
        admin_url = format!("{admin_url}?{query}");
    }

    Ok((admin_url, db_name))
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

static TEST_DB_LOCK: OnceLock<AsyncMutex<()>> = OnceLock::new();

pub struct TestDb {
    pub pool: PgPool,
    _guard: MutexGuard<'static, ()>,
}

/// Recreates the database named by `TEST_DATABASE_URL` and migrates it.
pub async fn init_test_db() -> TestDb {
    dotenvy::dotenv().ok();
    let test_url = env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let (admin_url, db_name) = split_db_url(&test_url).expect("invalid TEST_DATABASE_URL format");

    let lock = TEST_DB_LOCK.get_or_init(|| AsyncMutex::new(()));
    let guard = lock.lock().await;

    let admin_pool = PgPool::connect(&admin_url).await.expect("connect admin db");

    let quoted_name = quote_identifier(&db_name);
    let _ = sqlx::query(&format!("DROP DATABASE IF EXISTS {quoted_name} WITH (FORCE)"))
        .execute(&admin_pool)
        .await;
    sqlx::query(&format!("CREATE DATABASE {quoted_name}"))
        .execute(&admin_pool)
        .await
        .expect("create test db");
    admin_pool.close().await;

    let pool = PgPool::connect(&test_url).await.expect("connect test db");
    sqlx::migrate!().run(&pool).await.expect("migrations");
    TestDb { pool, _guard: guard }
}
