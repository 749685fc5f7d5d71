//! Lifecycle of the single local database handle.
//!
//! The engine opens the SQLite file lazily, creates the schema on first use,
//! validates it on every `handle()` call and recovers when tables go missing
//! or the file stops being a database. Opening and rebuilding are shared
//! futures: callers that arrive while one is in flight await the same
//! outcome instead of starting their own.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::Connection;

use super::schema::{REQUIRED_TABLES, SCHEMA, SCHEMA_VERSION};
use super::{StoreError, StoreResult};

const PROBE_FILE: &str = ".story-reader-probe";

/// What to do when an opened database is missing tables or is unreadable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryPolicy {
    /// Delete the database file and recreate it. Local data is lost.
    #[default]
    Rebuild,
    /// Recreate missing tables in place, keeping whatever rows survive.
    Migrate,
}

/// Lifecycle of the local store. A handle that fails validation goes
/// straight from `Ready` to `Rebuilding`; there is no separate state for
/// an incomplete schema because recovery starts in the same call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    Uninitialized,
    Initializing,
    Ready,
    Rebuilding,
    Unsupported,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub path: PathBuf,
    pub enabled: bool,
    pub recovery: RecoveryPolicy,
}

#[derive(Clone)]
struct Opened {
    conn: Connection,
    version: i64,
}

type PendingOpen = Shared<BoxFuture<'static, StoreResult<Opened>>>;

enum EngineState {
    Uninitialized,
    Initializing { generation: u64, pending: PendingOpen },
    Ready { generation: u64, opened: Opened },
    Rebuilding { generation: u64, pending: PendingOpen },
    Unsupported(String),
}

#[derive(Default)]
struct StoreStats {
    opens: AtomicU32,
    rebuilds: AtomicU32,
}

pub struct LocalStore {
    settings: Arc<StoreSettings>,
    state: Mutex<EngineState>,
    generation: AtomicU64,
    stats: Arc<StoreStats>,
}

impl LocalStore {
    pub fn new(settings: StoreSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            state: Mutex::new(EngineState::Uninitialized),
            generation: AtomicU64::new(0),
            stats: Arc::new(StoreStats::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.settings.path
    }

    pub fn recovery_policy(&self) -> RecoveryPolicy {
        self.settings.recovery
    }

    pub fn status(&self) -> StoreStatus {
        match &*self.lock_state() {
            EngineState::Uninitialized => StoreStatus::Uninitialized,
            EngineState::Initializing { .. } => StoreStatus::Initializing,
            EngineState::Ready { .. } => StoreStatus::Ready,
            EngineState::Rebuilding { .. } => StoreStatus::Rebuilding,
            EngineState::Unsupported(_) => StoreStatus::Unsupported,
        }
    }

    /// Number of times the database file has been opened.
    pub fn opens(&self) -> u32 {
        self.stats.opens.load(Ordering::SeqCst)
    }

    /// Number of recoveries run after a failed schema validation.
    pub fn rebuilds(&self) -> u32 {
        self.stats.rebuilds.load(Ordering::SeqCst)
    }

    /// Open the database, creating the schema if needed. Safe to call
    /// concurrently; only one open happens at a time.
    pub async fn initialize(&self) -> StoreResult<Connection> {
        let (_, opened) = self.ready().await?;
        Ok(opened.conn)
    }

    /// Return a validated handle, recovering or reopening as needed.
    pub async fn handle(&self) -> StoreResult<Connection> {
        let (generation, opened) = self.ready().await?;

        let inspection = match inspect(&opened.conn).await {
            Ok(inspection) => inspection,
            Err(e) if !self.is_current(generation) => {
                // The handle was replaced while we were validating it.
                tracing::debug!("Validation raced with a reopen: {}", e);
                let (_, opened) = self.ready().await?;
                return Ok(opened.conn);
            }
            Err(e) => return Err(e),
        };

        if !inspection.is_complete() {
            tracing::warn!(
                missing = ?inspection.missing,
                corrupt = inspection.corrupt,
                "Local store schema is incomplete, recovering with policy {:?}",
                self.settings.recovery
            );
            let (_, recovered) = self.recover(generation, opened).await?;
            return Ok(recovered.conn);
        }

        if inspection.version != opened.version {
            tracing::info!(
                "Local store schema version changed from {} to {}, reopening",
                opened.version,
                inspection.version
            );
            self.invalidate(generation);
            let (_, reopened) = self.ready().await?;
            return Ok(reopened.conn);
        }

        Ok(opened.conn)
    }

    /// Names of the required tables currently present.
    pub async fn collections(&self) -> StoreResult<Vec<String>> {
        let conn = self.handle().await?;
        let present = conn.call(|conn| Ok(present_tables(conn)?)).await?;
        Ok(REQUIRED_TABLES
            .iter()
            .filter(|table| present.iter().any(|p| p == *table))
            .map(|table| table.to_string())
            .collect())
    }

    async fn ready(&self) -> StoreResult<(u64, Opened)> {
        let (generation, pending) = {
            let mut state = self.lock_state();
            if matches!(*state, EngineState::Uninitialized) {
                let generation = self.next_generation();
                let pending = open_store(Arc::clone(&self.settings), Arc::clone(&self.stats))
                    .boxed()
                    .shared();
                *state = EngineState::Initializing {
                    generation,
                    pending,
                };
            }

            match &*state {
                EngineState::Ready { generation, opened } => {
                    return Ok((*generation, opened.clone()));
                }
                EngineState::Unsupported(reason) => {
                    return Err(StoreError::Unsupported(reason.clone()));
                }
                EngineState::Initializing {
                    generation,
                    pending,
                }
                | EngineState::Rebuilding {
                    generation,
                    pending,
                } => (*generation, pending.clone()),
                EngineState::Uninitialized => {
                    return Err(StoreError::Transient(
                        "local store failed to start initializing".to_string(),
                    ));
                }
            }
        };

        let outcome = pending.await;
        self.settle(generation, &outcome);
        outcome.map(|opened| (generation, opened))
    }

    async fn recover(&self, generation: u64, broken: Opened) -> StoreResult<(u64, Opened)> {
        {
            let mut state = self.lock_state();
            let still_broken =
                matches!(&*state, EngineState::Ready { generation: g, .. } if *g == generation);
            if still_broken {
                let pending = recover_store(
                    Arc::clone(&self.settings),
                    broken,
                    Arc::clone(&self.stats),
                )
                .boxed()
                .shared();
                *state = EngineState::Rebuilding {
                    generation: self.next_generation(),
                    pending,
                };
            }
        }
        // Joins the rebuild above, or one another caller already started.
        self.ready().await
    }

    fn settle(&self, generation: u64, outcome: &StoreResult<Opened>) {
        let mut state = self.lock_state();
        let in_flight = matches!(
            &*state,
            EngineState::Initializing { generation: g, .. }
                | EngineState::Rebuilding { generation: g, .. } if *g == generation
        );
        if !in_flight {
            return;
        }

        *state = match outcome {
            Ok(opened) => {
                tracing::debug!("Local store ready at {}", self.settings.path.display());
                EngineState::Ready {
                    generation,
                    opened: opened.clone(),
                }
            }
            Err(StoreError::Unsupported(reason)) => {
                tracing::warn!("Local store unavailable: {}", reason);
                EngineState::Unsupported(reason.clone())
            }
            Err(e) => {
                tracing::warn!("Local store failed to open: {}", e);
                EngineState::Uninitialized
            }
        };
    }

    fn invalidate(&self, generation: u64) {
        let mut state = self.lock_state();
        if matches!(&*state, EngineState::Ready { generation: g, .. } if *g == generation) {
            *state = EngineState::Uninitialized;
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        matches!(&*self.lock_state(), EngineState::Ready { generation: g, .. } if *g == generation)
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Clone)]
struct Inspection {
    version: i64,
    missing: Vec<String>,
    corrupt: bool,
}

impl Inspection {
    fn corrupt() -> Self {
        Self {
            version: 0,
            missing: REQUIRED_TABLES.iter().map(|t| t.to_string()).collect(),
            corrupt: true,
        }
    }

    fn is_fresh(&self) -> bool {
        !self.corrupt && self.version == 0
    }

    fn is_complete(&self) -> bool {
        !self.corrupt && self.missing.is_empty()
    }
}

async fn open_store(settings: Arc<StoreSettings>, stats: Arc<StoreStats>) -> StoreResult<Opened> {
    probe(&settings).await?;

    stats.opens.fetch_add(1, Ordering::SeqCst);
    tracing::debug!("Opening local store at {}", settings.path.display());
    let conn = Connection::open(&settings.path).await?;
    let inspection = inspect(&conn).await?;

    if inspection.is_fresh() {
        create_schema(&conn).await?;
        tracing::info!("Created local store schema v{}", SCHEMA_VERSION);
        return Ok(Opened {
            conn,
            version: SCHEMA_VERSION,
        });
    }

    if inspection.is_complete() {
        if inspection.version != SCHEMA_VERSION {
            tracing::info!(
                "Local store is at schema v{}, expected v{}",
                inspection.version,
                SCHEMA_VERSION
            );
        }
        return Ok(Opened {
            conn,
            version: inspection.version,
        });
    }

    tracing::warn!(
        missing = ?inspection.missing,
        corrupt = inspection.corrupt,
        "Opened an incomplete local store"
    );
    let broken = Opened {
        conn,
        version: inspection.version,
    };
    recover_store(settings, broken, stats).await
}

async fn recover_store(
    settings: Arc<StoreSettings>,
    broken: Opened,
    stats: Arc<StoreStats>,
) -> StoreResult<Opened> {
    stats.rebuilds.fetch_add(1, Ordering::SeqCst);

    if settings.recovery == RecoveryPolicy::Migrate {
        match create_schema(&broken.conn).await {
            Ok(()) => {
                let inspection = inspect(&broken.conn).await?;
                if inspection.is_complete() {
                    tracing::info!("Recreated missing tables in place");
                    return Ok(Opened {
                        conn: broken.conn,
                        version: inspection.version,
                    });
                }
            }
            Err(e) => {
                tracing::warn!("In-place migration failed, rebuilding instead: {}", e);
            }
        }
    }

    if let Err(e) = broken.conn.close().await {
        tracing::debug!("Closing broken local store handle failed: {}", e);
    }
    remove_database_files(&settings.path).await?;

    let conn = Connection::open(&settings.path).await?;
    create_schema(&conn).await?;
    let inspection = inspect(&conn).await?;
    if !inspection.is_complete() {
        return Err(StoreError::SchemaIncomplete(inspection.missing));
    }
    tracing::warn!(
        "Rebuilt local store at {}; previous local data was discarded",
        settings.path.display()
    );

    Ok(Opened {
        conn,
        version: SCHEMA_VERSION,
    })
}

/// Cheap check that the database location is usable before opening it.
async fn probe(settings: &StoreSettings) -> StoreResult<()> {
    if !settings.enabled {
        return Err(StoreError::Unsupported(
            "local persistence is disabled in the configuration".to_string(),
        ));
    }

    let dir = match settings.path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    tokio::fs::create_dir_all(&dir).await.map_err(|e| {
        StoreError::Unsupported(format!("cannot create {}: {}", dir.display(), e))
    })?;

    let marker = dir.join(PROBE_FILE);
    tokio::fs::write(&marker, b"ok").await.map_err(|e| {
        StoreError::Unsupported(format!("{} is not writable: {}", dir.display(), e))
    })?;
    tokio::fs::remove_file(&marker).await.ok();

    Ok(())
}

async fn inspect(conn: &Connection) -> StoreResult<Inspection> {
    let inspection = conn
        .call(|conn| {
            let version =
                match conn.pragma_query_value(None, "user_version", |row| row.get::<_, i64>(0)) {
                    Ok(version) => version,
                    Err(e) if is_corruption(&e) => return Ok(Inspection::corrupt()),
                    Err(e) => return Err(e.into()),
                };

            let present = match present_tables(conn) {
                Ok(present) => present,
                Err(e) if is_corruption(&e) => return Ok(Inspection::corrupt()),
                Err(e) => return Err(e.into()),
            };

            let missing = REQUIRED_TABLES
                .iter()
                .filter(|table| !present.iter().any(|p| p == *table))
                .map(|table| table.to_string())
                .collect();

            Ok(Inspection {
                version,
                missing,
                corrupt: false,
            })
        })
        .await?;
    Ok(inspection)
}

async fn create_schema(conn: &Connection) -> StoreResult<()> {
    conn.call(|conn| {
        let tx = conn.transaction()?;
        tx.execute_batch(SCHEMA)?;
        // Never downgrade a version stamped by a newer build.
        let current: i64 = tx.pragma_query_value(None, "user_version", |row| row.get(0))?;
        if current < SCHEMA_VERSION {
            tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }
        tx.commit()?;
        Ok(())
    })
    .await?;
    Ok(())
}

fn present_tables(conn: &rusqlite::Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table'")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

fn is_corruption(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, rusqlite::ErrorCode::NotADatabase | rusqlite::ErrorCode::DatabaseCorrupt)
    )
}

async fn remove_database_files(path: &Path) -> StoreResult<()> {
    for suffix in ["", "-wal", "-shm", "-journal"] {
        let mut name = OsString::from(path.as_os_str());
        name.push(suffix);
        match tokio::fs::remove_file(PathBuf::from(name)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(StoreError::Transient(format!(
                    "failed to delete {}{}: {}",
                    path.display(),
                    suffix,
                    e
                )))
            }
        }
    }
    Ok(())
}
