//! SQLite connection, schema bootstrap and per-call timeouts
//!
//! All statements run on tokio-rusqlite's single background thread, which
//! serializes writes. Every call is one transaction bounded by the configured
//! timeout: a call that overruns surfaces as [`VaultError::Unavailable`] and
//! its work is rolled back, never committed behind the caller's back.

use std::path::Path;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::InterruptHandle;
use tokio_rusqlite::Connection;
use tracing::{debug, error, warn};

use crate::error::{Result, VaultError};

/// Default per-call timeout
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(3);

const PRAGMAS: &str = "
    PRAGMA foreign_keys = ON;
    PRAGMA journal_mode = WAL;
    PRAGMA busy_timeout = 2000;
";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        created_at    TEXT    NOT NULL,
        name          TEXT    NOT NULL,
        email         TEXT    NOT NULL UNIQUE COLLATE NOCASE,
        password_hash TEXT    NOT NULL,
        activated     INTEGER NOT NULL DEFAULT 0,
        version       INTEGER NOT NULL DEFAULT 1
    );

    CREATE TABLE IF NOT EXISTS credentials (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at TEXT    NOT NULL,
        name       TEXT    NOT NULL,
        username   TEXT    NOT NULL,
        password   TEXT    NOT NULL,
        website    TEXT,
        version    INTEGER NOT NULL DEFAULT 1
    );
    CREATE INDEX IF NOT EXISTS credentials_owner_idx ON credentials(owner_id);

    CREATE TABLE IF NOT EXISTS tokens (
        hash    BLOB    PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        expiry  INTEGER NOT NULL,
        scope   TEXT    NOT NULL
    ) WITHOUT ROWID;
    CREATE INDEX IF NOT EXISTS tokens_user_idx ON tokens(user_id);
    CREATE INDEX IF NOT EXISTS tokens_expiry_idx ON tokens(expiry);

    CREATE TABLE IF NOT EXISTS permissions (
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        code    TEXT    NOT NULL,
        PRIMARY KEY (user_id, code)
    ) WITHOUT ROWID;
";

/// Shared handle to the vault database.
///
/// Cheap to clone; all clones talk to the same background connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Connection>,
    interrupt: Arc<InterruptHandle>,
    timeout: Duration,
}

impl Database {
    /// Open (creating if needed) the database file and apply the schema
    pub async fn open(path: &Path, timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .await
            .map_err(|e| VaultError::Unavailable(format!("failed to open database: {}", e)))?;

        let db = Self::bootstrap(conn, timeout).await?;
        debug!("Opened vault database at {:?}", path);
        Ok(db)
    }

    /// Open a private in-memory database (tests, ephemeral deployments)
    pub async fn open_in_memory(timeout: Duration) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| VaultError::Unavailable(format!("failed to open database: {}", e)))?;

        Self::bootstrap(conn, timeout).await
    }

    async fn bootstrap(conn: Connection, timeout: Duration) -> Result<Self> {
        // Pragmas cannot run inside a transaction, so setup bypasses `call`
        let setup = conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            conn.execute_batch(SCHEMA)?;
            Ok::<_, rusqlite::Error>(conn.get_interrupt_handle())
        });

        let interrupt = match tokio::time::timeout(timeout, setup).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                return Err(VaultError::Unavailable(format!(
                    "failed to prepare database: {}",
                    e
                )))
            }
            Err(_) => return Err(timed_out(timeout)),
        };

        Ok(Self {
            conn: Arc::new(conn),
            interrupt: Arc::new(interrupt),
            timeout,
        })
    }

    /// The per-call timeout in effect
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `f` in its own transaction on the connection thread. SQLite
    /// errors become [`VaultError::Unavailable`].
    ///
    /// `f` must not open a transaction of its own.
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> std::result::Result<R, rusqlite::Error>
            + Send
            + 'static,
        R: Send + 'static,
    {
        match self.call_raw(f).await? {
            Ok(value) => Ok(value),
            Err(e) => {
                error!("Database statement failed: {}", e);
                Err(VaultError::Unavailable(e.to_string()))
            }
        }
    }

    /// Like [`Database::call`] but hands SQLite errors back so the caller
    /// can inspect constraint violations. Timeouts and a closed connection
    /// are still reported as [`VaultError::Unavailable`].
    ///
    /// When the timeout fires before `f` reaches its commit, the call is
    /// cancelled: a queued `f` never runs, a running one is interrupted and
    /// its transaction rolled back. Once the commit has started the caller
    /// waits for it, so a reported timeout always means nothing was written.
    pub async fn call_raw<F, R>(&self, f: F) -> Result<std::result::Result<R, rusqlite::Error>>
    where
        F: FnOnce(&mut rusqlite::Connection) -> std::result::Result<R, rusqlite::Error>
            + Send
            + 'static,
        R: Send + 'static,
    {
        let guard = Arc::new(CallGuard::new());
        let worker = Arc::clone(&guard);
        let mut call = pin!(self.conn.call(move |conn| run_guarded(conn, &worker, f)));

        let outcome = match tokio::time::timeout(self.timeout, call.as_mut()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                if guard.cancel(&self.interrupt) {
                    error!("Database call exceeded {:?}, cancelled", self.timeout);
                    return Err(timed_out(self.timeout));
                }
                // Commit already under way; its outcome is authoritative
                call.await
            }
        };

        match outcome {
            Ok(value) => Ok(Ok(value)),
            Err(tokio_rusqlite::Error::Error(e)) => Ok(Err(e)),
            Err(e) => {
                error!("Database connection failure: {}", e);
                Err(VaultError::Unavailable(e.to_string()))
            }
        }
    }
}

fn timed_out(timeout: Duration) -> VaultError {
    VaultError::Unavailable(format!(
        "database call timed out after {}ms",
        timeout.as_millis()
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallState {
    Queued,
    Running,
    Committing,
    Cancelled,
    Done,
}

/// Hand-off between a caller and its closure on the connection thread
struct CallGuard {
    state: Mutex<CallState>,
}

impl CallGuard {
    fn new() -> Self {
        Self {
            state: Mutex::new(CallState::Queued),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CallState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advance(&self, from: CallState, to: CallState) -> bool {
        let mut state = self.lock();
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    }

    /// Called by the caller on timeout. False once the commit has begun.
    fn cancel(&self, interrupt: &InterruptHandle) -> bool {
        let mut state = self.lock();
        match *state {
            CallState::Queued => {
                *state = CallState::Cancelled;
                true
            }
            CallState::Running => {
                *state = CallState::Cancelled;
                // Still holding the lock, so the closure cannot finish and
                // let the next call's statement catch this interrupt
                interrupt.interrupt();
                true
            }
            CallState::Committing | CallState::Cancelled | CallState::Done => false,
        }
    }
}

/// Marks the call finished however the closure exits
struct Finished<'a>(&'a CallGuard);

impl Drop for Finished<'_> {
    fn drop(&mut self) {
        *self.0.lock() = CallState::Done;
    }
}

fn cancelled() -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_INTERRUPT),
        Some("database call cancelled after timeout".to_string()),
    )
}

fn run_guarded<F, R>(
    conn: &mut rusqlite::Connection,
    guard: &CallGuard,
    f: F,
) -> std::result::Result<R, rusqlite::Error>
where
    F: FnOnce(&mut rusqlite::Connection) -> std::result::Result<R, rusqlite::Error>,
{
    if !guard.advance(CallState::Queued, CallState::Running) {
        return Err(cancelled());
    }
    let _finished = Finished(guard);

    conn.execute_batch("BEGIN")?;
    let result = f(conn).and_then(|value| {
        if guard.advance(CallState::Running, CallState::Committing) {
            conn.execute_batch("COMMIT").map(|()| value)
        } else {
            Err(cancelled())
        }
    });

    // An interrupted write may already have ended the transaction
    if result.is_err() && !conn.is_autocommit() {
        if let Err(e) = conn.execute_batch("ROLLBACK") {
            warn!("Rollback failed: {}", e);
        }
    }
    result
}

/// Whether `err` is a UNIQUE constraint violation
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

/// Whether `err` is a FOREIGN KEY constraint violation
pub fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}
