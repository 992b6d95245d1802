//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `receipts` - Receipt registration and status
//! - `transactions` - Transaction and transaction-group operations
//! - `matches` - Match records and review-queue queries
//! - `matching` - Candidate window queries for the finder
//! - `runs` - Auto-match run history

use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use tracing::info;

use crate::error::{Error, Result};

mod matches;
mod matching;
mod receipts;
mod runs;
mod transactions;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "CHIT_DB_KEY";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path. This allows moving/renaming/restoring the database freely.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Fixed application salt - changing this would invalidate all existing encrypted databases
    const APP_SALT: &[u8; 16] = b"chit-salt-v1-fix";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Parse a SQLite date string into a NaiveDate
pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `CHIT_DB_KEY` environment variable to be set.
    /// The database will be encrypted using SQLCipher with a key derived
    /// from the passphrase via Argon2.
    ///
    /// Returns an error if `CHIT_DB_KEY` is not set. Use `new_unencrypted()`
    /// for development/testing without encryption.
    pub fn new(path: &str) -> Result<Self> {
        let encryption_key = std::env::var(DB_KEY_ENV).ok();
        match encryption_key {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    ///
    /// WARNING: This creates an unencrypted database. Only use for development
    /// or testing. For production, use `new()` with `CHIT_DB_KEY` set.
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);

        let pool = if let Some(pass) = passphrase {
            let key = derive_key(pass)?;
            let key_pragma = format!("PRAGMA key = 'x\"{}\"';", key);

            // Use with_init to set the key on every new connection
            let manager = manager.with_init(move |conn| {
                conn.execute_batch(&key_pragma)?;
                Ok(())
            });

            Pool::builder().max_size(10).build(manager)?
        } else {
            Pool::builder().max_size(10).build(manager)?
        };

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because SQLCipher
    /// has issues with in-memory databases in the connection pool.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = format!("/tmp/chit_test_{}_{}.db", std::process::id(), id);

        // Remove any existing file
        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Check if the database is encrypted
    pub fn is_encrypted(&self) -> Result<bool> {
        let conn = self.conn()?;
        // SQLCipher sets cipher_version if encryption is active
        let result: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(result.is_ok() && std::env::var(DB_KEY_ENV).is_ok())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Owners with at least one record, for the all-owners auto-match sweep
    pub fn distinct_owners(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT DISTINCT owner FROM receipts
            UNION
            SELECT DISTINCT owner FROM transactions
            ORDER BY 1
            "#,
        )?;

        let owners = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(owners)
    }

    /// Log an audit event
    pub fn log_audit(
        &self,
        actor: &str,
        action: &str,
        entity_type: Option<&str>,
        entity_id: Option<i64>,
        details: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO audit_log (actor, action, entity_type, entity_id, details)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![actor, action, entity_type, entity_id, details],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// List audit log entries
    pub fn list_audit_log(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, timestamp, actor, action, entity_type, entity_id, details
            FROM audit_log
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )?;

        let entries = stmt
            .query_map(params![limit], |row| {
                let timestamp_str: String = row.get(1)?;
                Ok(AuditEntry {
                    id: row.get(0)?,
                    timestamp: timestamp_str,
                    actor: row.get(2)?,
                    action: row.get(3)?,
                    entity_type: row.get(4)?,
                    entity_id: row.get(5)?,
                    details: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- WAL mode: better concurrency, readers don't block writers
            PRAGMA journal_mode = WAL;

            -- Synchronous NORMAL: good balance of safety and performance
            PRAGMA synchronous = NORMAL;

            -- Store temp tables in memory (faster for the window queries)
            PRAGMA temp_store = MEMORY;

            -- Receipts (fields extracted by the upstream upload/OCR pipeline)
            CREATE TABLE IF NOT EXISTS receipts (
                id INTEGER PRIMARY KEY,
                owner TEXT NOT NULL,
                amount REAL,                               -- extracted total, NULL if extraction failed
                receipt_date DATE,                         -- extracted purchase date
                vendor TEXT,                               -- extracted vendor name
                match_status TEXT NOT NULL DEFAULT 'unmatched',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_receipts_owner_status ON receipts(owner, match_status);
            CREATE INDEX IF NOT EXISTS idx_receipts_date ON receipts(receipt_date);

            -- Transaction groups (several statement lines, one matchable unit)
            -- Defined before transactions because transactions references groups
            CREATE TABLE IF NOT EXISTS transaction_groups (
                id INTEGER PRIMARY KEY,
                owner TEXT NOT NULL,
                description TEXT NOT NULL,                 -- representative member description
                combined_amount REAL NOT NULL,             -- sum of member magnitudes
                display_date DATE NOT NULL,                -- latest member date
                transaction_count INTEGER NOT NULL,
                match_status TEXT NOT NULL DEFAULT 'unmatched',
                matched_receipt_id INTEGER REFERENCES receipts(id),
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_groups_owner_status ON transaction_groups(owner, match_status);
            CREATE INDEX IF NOT EXISTS idx_groups_date ON transaction_groups(display_date);

            -- Transactions (statement lines from the import pipeline)
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY,
                owner TEXT NOT NULL,
                amount REAL NOT NULL,                      -- negative = charge, positive = refund
                transaction_date DATE NOT NULL,
                description TEXT NOT NULL,
                group_id INTEGER REFERENCES transaction_groups(id),
                match_status TEXT NOT NULL DEFAULT 'unmatched',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_owner_date ON transactions(owner, transaction_date);
            CREATE INDEX IF NOT EXISTS idx_transactions_owner_status ON transactions(owner, match_status);
            CREATE INDEX IF NOT EXISTS idx_transactions_group ON transactions(group_id);

            -- Matches (proposed/confirmed/rejected links)
            -- The CHECK mirrors the MatchTarget enum: exactly one target.
            CREATE TABLE IF NOT EXISTS matches (
                id INTEGER PRIMARY KEY,
                owner TEXT NOT NULL,
                receipt_id INTEGER NOT NULL REFERENCES receipts(id),
                transaction_id INTEGER REFERENCES transactions(id),
                transaction_group_id INTEGER REFERENCES transaction_groups(id),
                state TEXT NOT NULL DEFAULT 'proposed',
                amount_score REAL NOT NULL DEFAULT 0,
                date_score REAL NOT NULL DEFAULT 0,
                vendor_score REAL NOT NULL DEFAULT 0,
                confidence_score REAL NOT NULL DEFAULT 0,
                match_reason TEXT NOT NULL DEFAULT '',
                is_manual BOOLEAN NOT NULL DEFAULT 0,
                confirmed_at DATETIME,
                confirmed_by TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                CHECK ((transaction_id IS NULL) != (transaction_group_id IS NULL))
            );

            CREATE INDEX IF NOT EXISTS idx_matches_receipt ON matches(receipt_id, state);
            CREATE INDEX IF NOT EXISTS idx_matches_transaction ON matches(transaction_id, state);
            CREATE INDEX IF NOT EXISTS idx_matches_group ON matches(transaction_group_id, state);
            CREATE INDEX IF NOT EXISTS idx_matches_owner_state ON matches(owner, state);

            -- Auto-match runs (one row per sweep, for history/observability)
            CREATE TABLE IF NOT EXISTS match_runs (
                id INTEGER PRIMARY KEY,
                owner TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'running',    -- running, completed, cancelled
                processed INTEGER NOT NULL DEFAULT 0,
                proposed INTEGER NOT NULL DEFAULT 0,
                transaction_matches INTEGER NOT NULL DEFAULT 0,
                group_matches INTEGER NOT NULL DEFAULT 0,
                ambiguous INTEGER NOT NULL DEFAULT 0,
                failed INTEGER NOT NULL DEFAULT 0,
                duration_ms INTEGER NOT NULL DEFAULT 0,
                started_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                finished_at DATETIME
            );

            CREATE INDEX IF NOT EXISTS idx_match_runs_owner ON match_runs(owner, started_at);

            -- Audit log (tracks API mutations and lifecycle transitions)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                actor TEXT NOT NULL,
                action TEXT NOT NULL,
                entity_type TEXT,
                entity_id INTEGER,
                details TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_audit_log_actor ON audit_log(actor);
            CREATE INDEX IF NOT EXISTS idx_audit_log_timestamp ON audit_log(timestamp);
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}

/// Audit log entry
#[derive(Debug, Clone, serde::Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub actor: String,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub details: Option<String>,
}

#[cfg(test)]
mod tests;
