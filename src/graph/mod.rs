//! Property graph stored in SQLite.
//!
//! Nodes and edges live in two tables; labels are kept as `:A:B:` strings
//! and properties as JSON documents. Traversals are recursive CTEs bounded by
//! `max_traversal_depth`. Every transaction opens its own connection (its
//! session); the store itself only keeps a driver connection for schema work
//! and shutdown.

mod auth;
mod classify;
mod node;
pub mod schema;
mod share;
pub mod transaction;
mod user;

use crate::config::{Edition, PersistenceConfig};
use crate::error::{PersistenceError, Result};
use crate::mapping::schema::SchemaRegistry;
use crate::mapping::{decode_properties, encode_properties, PropertyMap};
use crate::persistence::{
    AuthPersistenceController, AuthReadTransaction, AuthReadWriteTransaction,
    NodePersistenceController, NodeReadTransaction, NodeReadWriteTransaction, PersistenceBackend,
    PluginLifecycle, SharePersistenceController, ShareReadTransaction, ShareReadWriteTransaction,
    UserPersistenceController, UserReadTransaction, UserReadWriteTransaction,
};
use classify::SqliteResultExt;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub use transaction::{AccessMode, GraphTx, Read, ReadWrite, TxState};
use transaction::TxLimits;

/// Registry key of this backend.
pub const BACKEND_NAME: &str = "sqlite";

/// Handle to an on-disk graph. Cheap to clone.
#[derive(Clone)]
pub struct GraphStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    path: PathBuf,
    busy_timeout: Duration,
    limits: TxLimits,
    edition: Edition,
    driver: Mutex<Option<Connection>>,
    next_tx: AtomicU64,
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("path", &self.inner.path)
            .field("edition", &self.inner.edition)
            .finish()
    }
}

impl GraphStore {
    /// Opens (creating if needed) the graph at the configured path and
    /// ensures the base tables exist.
    pub fn open(config: &PersistenceConfig) -> Result<Self> {
        let path = config
            .database_path()
            .map_err(|err| PersistenceError::invalid(err.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let busy_timeout = config.busy_timeout();
        let driver = open_connection(&path, busy_timeout)?;
        driver
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .write()?;
        driver.execute_batch(schema::BASE_SCHEMA).write()?;
        info!(path = %path.display(), "graph store opened");
        Ok(Self {
            inner: Arc::new(StoreInner {
                path,
                busy_timeout,
                limits: TxLimits {
                    timeout: config.transaction_timeout(),
                    max_depth: config.max_traversal_depth,
                },
                edition: config.edition,
                driver: Mutex::new(Some(driver)),
                next_tx: AtomicU64::new(1),
            }),
        })
    }

    /// Database file backing the store.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Configured backend edition.
    pub fn edition(&self) -> Edition {
        self.inner.edition
    }

    fn with_driver<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.inner.driver.lock();
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(store_closed()),
        }
    }

    /// Round-trips a trivial query through the driver connection.
    pub fn verify_connectivity(&self) -> Result<()> {
        self.with_driver(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .read()
                .map(|_| ())
        })
    }

    /// Installs the constraints derived from `registry` for this edition.
    pub fn install_schema(&self, registry: &SchemaRegistry) -> Result<usize> {
        let edition = self.inner.edition;
        self.with_driver(|conn| schema::install(conn, registry, edition))
    }

    /// Opens a read transaction on a fresh session.
    pub fn begin_read(&self) -> Result<GraphTx<Read>> {
        let conn = self.open_session()?;
        conn.pragma_update(None, "query_only", true).read()?;
        GraphTx::begin(conn, self.next_tx_id(), self.inner.limits)
    }

    /// Opens a read-write transaction on a fresh session.
    pub fn begin_read_write(&self) -> Result<GraphTx<ReadWrite>> {
        let conn = self.open_session()?;
        GraphTx::begin(conn, self.next_tx_id(), self.inner.limits)
    }

    fn open_session(&self) -> Result<Connection> {
        if self.inner.driver.lock().is_none() {
            return Err(store_closed());
        }
        open_connection(&self.inner.path, self.inner.busy_timeout)
    }

    fn next_tx_id(&self) -> u64 {
        self.inner.next_tx.fetch_add(1, Ordering::Relaxed)
    }

    /// Checkpoints the log and drops the driver connection. Transactions
    /// started afterwards fail as unavailable.
    pub fn close(&self) -> Result<()> {
        let Some(conn) = self.inner.driver.lock().take() else {
            return Ok(());
        };
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE)").write()?;
        conn.close().map_err(|(_, err)| PersistenceError::CloseSession {
            source: Box::new(err),
        })?;
        info!(path = %self.inner.path.display(), "graph store closed");
        Ok(())
    }
}

fn store_closed() -> PersistenceError {
    PersistenceError::Unavailable {
        source: "graph store is closed".into(),
    }
}

fn open_connection(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
        | OpenFlags::SQLITE_OPEN_URI;
    let conn = Connection::open_with_flags(path, flags).map_err(|err| {
        match classify::classify(err, store_closed(), classify::Access::Read) {
            PersistenceError::Read { source } => PersistenceError::Unavailable { source },
            other => other,
        }
    })?;
    conn.busy_timeout(busy_timeout).read()?;
    conn.pragma_update(None, "foreign_keys", true).read()?;
    Ok(conn)
}

/// `:A:B:` label encoding; membership tests use `instr(labels, ':A:')`.
pub(crate) fn encode_labels(labels: &[&str]) -> String {
    let mut out = String::from(":");
    for label in labels {
        out.push_str(label);
        out.push(':');
    }
    out
}

pub(crate) fn has_label(encoded: &str, label: &str) -> bool {
    encoded.contains(&format!(":{label}:"))
}

pub(crate) fn insert_node(conn: &Connection, labels: &[&str], props: &PropertyMap) -> Result<i64> {
    conn.execute(
        "INSERT INTO nodes (labels, properties) VALUES (?1, ?2)",
        params![encode_labels(labels), encode_properties(props)],
    )
    .write()?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn insert_edge(
    conn: &Connection,
    source: i64,
    target: i64,
    edge_type: &str,
    props: &PropertyMap,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO edges (source_id, target_id, type_name, properties) VALUES (?1, ?2, ?3, ?4)",
        params![source, target, edge_type, encode_properties(props)],
    )
    .write()?;
    Ok(conn.last_insert_rowid())
}

/// Row id of the node labelled `label` whose `id` property is `id`.
pub(crate) fn find_node_row(conn: &Connection, label: &str, id: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM nodes
         WHERE instr(labels, ?1) > 0 AND json_extract(properties, '$.id') = ?2",
        params![format!(":{label}:"), id],
        |row| row.get(0),
    )
    .optional()
    .read()
}

/// Labels and properties of a node row.
pub(crate) fn load_node_row(
    conn: &Connection,
    model: &'static str,
    row: i64,
) -> Result<(String, PropertyMap)> {
    let (labels, json): (String, String) = conn
        .query_row(
            "SELECT labels, properties FROM nodes WHERE id = ?1",
            [row],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .read_or(PersistenceError::NodeNotFound)?;
    Ok((labels, decode_properties(model, &json)?))
}

macro_rules! sqlite_controller {
    ($(#[$meta:meta])* $name:ident: $controller:ident => $read:ident, $write:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            store: GraphStore,
        }

        impl $name {
            /// Controller over `store`.
            pub fn new(store: GraphStore) -> Self {
                Self { store }
            }
        }

        impl $controller for $name {
            fn start_read(&self) -> Result<Box<dyn $read>> {
                Ok(Box::new(self.store.begin_read()?))
            }

            fn start_read_write(&self) -> Result<Box<dyn $write>> {
                Ok(Box::new(self.store.begin_read_write()?))
            }
        }
    };
}

sqlite_controller!(
    /// Node transactions on a [`GraphStore`].
    NodePersistence: NodePersistenceController => NodeReadTransaction, NodeReadWriteTransaction
);
sqlite_controller!(
    /// Share transactions on a [`GraphStore`].
    SharePersistence: SharePersistenceController => ShareReadTransaction, ShareReadWriteTransaction
);
sqlite_controller!(
    /// User transactions on a [`GraphStore`].
    UserPersistence: UserPersistenceController => UserReadTransaction, UserReadWriteTransaction
);
sqlite_controller!(
    /// Session transactions on a [`GraphStore`].
    AuthPersistence: AuthPersistenceController => AuthReadTransaction, AuthReadWriteTransaction
);

/// The SQLite backend as seen through the registry.
#[derive(Debug)]
pub struct SqliteBackend {
    store: GraphStore,
}

impl SqliteBackend {
    /// Opens the store, checks it answers, and installs the schema.
    pub fn initialize(config: &PersistenceConfig) -> Result<Self> {
        let store = GraphStore::open(config)?;
        store.verify_connectivity()?;
        store.install_schema(crate::mapping::schema::default_registry())?;
        debug!(path = %store.path().display(), "sqlite backend ready");
        Ok(Self { store })
    }

    /// Underlying store.
    pub fn store(&self) -> &GraphStore {
        &self.store
    }
}

impl PersistenceBackend for SqliteBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn nodes(&self) -> Arc<dyn NodePersistenceController> {
        Arc::new(NodePersistence::new(self.store.clone()))
    }

    fn shares(&self) -> Arc<dyn SharePersistenceController> {
        Arc::new(SharePersistence::new(self.store.clone()))
    }

    fn users(&self) -> Arc<dyn UserPersistenceController> {
        Arc::new(UserPersistence::new(self.store.clone()))
    }

    fn auth(&self) -> Arc<dyn AuthPersistenceController> {
        Arc::new(AuthPersistence::new(self.store.clone()))
    }

    fn close(&self) -> Result<()> {
        self.store.close()
    }
}

/// Registry hooks for [`SqliteBackend`].
pub fn lifecycle() -> PluginLifecycle {
    PluginLifecycle::new(|config| {
        let backend: Arc<dyn PersistenceBackend> = Arc::new(SqliteBackend::initialize(config)?);
        Ok(backend)
    })
}
