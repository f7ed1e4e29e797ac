//! Waitlist signups
//!
//! Signups go to the database. If that write fails they are kept in a
//! bounded in-memory list instead, and the caller is told the signup is not
//! durable.

use async_trait::async_trait;
use feedlens_common::time;
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::ApiError;

/// Entries kept by the in-memory store before the oldest is evicted
pub const EPHEMERAL_CAPACITY: usize = 1000;

const MAX_EMAIL_CHARS: usize = 254;

#[derive(Debug, Error)]
pub enum WaitlistError {
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Waitlist store error: {0}")]
    Store(String),
}

impl From<WaitlistError> for ApiError {
    fn from(err: WaitlistError) -> Self {
        match err {
            WaitlistError::InvalidEmail(_) => ApiError::BadRequest(err.to_string()),
            WaitlistError::Store(msg) => ApiError::Internal(msg),
        }
    }
}

/// Trim, lowercase and sanity-check an email address
pub fn normalize_email(raw: &str) -> Result<String, WaitlistError> {
    let email = raw.trim().to_lowercase();
    let invalid = || WaitlistError::InvalidEmail(raw.trim().to_string());

    if email.is_empty() || email.chars().count() > MAX_EMAIL_CHARS {
        return Err(invalid());
    }
    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(invalid());
    }

    Ok(email)
}

/// Somewhere to record signups
#[async_trait]
pub trait WaitlistStore: Send + Sync {
    /// Record `email`; recording an existing address succeeds
    async fn add(&self, email: &str) -> Result<(), WaitlistError>;
}

/// Durable store backed by the `waitlist` table
pub struct SqliteWaitlist {
    pool: SqlitePool,
}

impl SqliteWaitlist {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WaitlistStore for SqliteWaitlist {
    async fn add(&self, email: &str) -> Result<(), WaitlistError> {
        sqlx::query(
            "INSERT INTO waitlist (email, created_at) VALUES (?, ?) ON CONFLICT(email) DO NOTHING",
        )
        .bind(email)
        .bind(time::to_db_string(&time::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| WaitlistError::Store(e.to_string()))?;
        Ok(())
    }
}

/// Bounded in-memory store; contents are lost on restart
pub struct EphemeralWaitlist {
    entries: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl EphemeralWaitlist {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn contains(&self, email: &str) -> bool {
        self.entries.lock().await.iter().any(|e| e == email)
    }
}

impl Default for EphemeralWaitlist {
    fn default() -> Self {
        Self::new(EPHEMERAL_CAPACITY)
    }
}

#[async_trait]
impl WaitlistStore for EphemeralWaitlist {
    async fn add(&self, email: &str) -> Result<(), WaitlistError> {
        let mut entries = self.entries.lock().await;
        if entries.iter().any(|e| e == email) {
            return Ok(());
        }
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(email.to_string());
        Ok(())
    }
}

/// Where a signup ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    pub durable: bool,
}

/// Durable store first, ephemeral store when the durable write fails
pub struct FallbackWaitlist {
    durable: Arc<dyn WaitlistStore>,
    ephemeral: EphemeralWaitlist,
}

impl FallbackWaitlist {
    pub fn new(durable: Arc<dyn WaitlistStore>, ephemeral: EphemeralWaitlist) -> Self {
        Self { durable, ephemeral }
    }

    pub fn ephemeral(&self) -> &EphemeralWaitlist {
        &self.ephemeral
    }

    /// Validate and record a signup
    pub async fn join(&self, raw_email: &str) -> Result<JoinOutcome, WaitlistError> {
        let email = normalize_email(raw_email)?;

        match self.durable.add(&email).await {
            Ok(()) => {
                info!("Waitlist signup recorded");
                Ok(JoinOutcome { durable: true })
            }
            Err(e) => {
                warn!("Durable waitlist write failed, keeping signup in memory: {}", e);
                self.ephemeral.add(&email).await?;
                Ok(JoinOutcome { durable: false })
            }
        }
    }
}
