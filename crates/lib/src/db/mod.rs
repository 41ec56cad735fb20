//! The build metadata store.
//!
//! A single SQLite file inside the build output directory records, for every
//! output artifact, the literal command that produced it and the modification
//! time of every input the toolchain reported consuming. The staleness oracle
//! in [`crate::deps`] reads this store to decide whether an artifact can be
//! reused.
//!
//! The store is shared across executor workers; a mutex serializes access and
//! every multi-statement update runs inside one SQLite transaction, so a
//! reader observes either the full prior record or the full new record,
//! never a mix.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use thiserror::Error;
use tracing::{debug, warn};

/// Well-known name of the database file within the build output directory.
pub const DB_FILE_NAME: &str = ".kiln.db";

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS compilations (
  output_path TEXT PRIMARY KEY,
  command     TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS deps (
  output_path    TEXT NOT NULL,
  input_path     TEXT NOT NULL,
  input_mtime_ns INTEGER
);
CREATE INDEX IF NOT EXISTS deps_by_output ON deps (output_path);
";

/// Errors from the metadata store. These are fatal to a build: when the
/// store cannot be read or written, reuse decisions cannot be trusted.
#[derive(Debug, Error)]
pub enum DbError {
  #[error("database error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("io error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("database schema version {found} is not supported")]
  SchemaMismatch { found: i64 },
}

/// One recorded input of an output artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFileInfo {
  pub path: PathBuf,
  /// Modification time observed when the record was written, in nanoseconds
  /// since the Unix epoch. `None` when the input could not be stat'ed at
  /// record time; such an input always reads as changed.
  pub last_mtime: Option<i64>,
}

/// Handle to the build metadata store. Cheap to clone; clones share one
/// connection.
#[derive(Clone)]
pub struct Database {
  conn: Arc<Mutex<Connection>>,
}

impl Database {
  /// Open (or create) the store at `path`.
  ///
  /// A corrupt file or an unsupported schema version is not an error: the
  /// file is discarded and recreated empty, which makes every output stale.
  pub fn open(path: &Path) -> Result<Self, DbError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(|e| DbError::Io {
        path: parent.to_path_buf(),
        source: e,
      })?;
    }

    match Self::try_open(path) {
      Ok(db) => Ok(db),
      Err(e) => {
        warn!(
          path = %path.display(),
          error = %e,
          "build database is unusable, discarding it; everything will rebuild"
        );
        std::fs::remove_file(path).map_err(|e| DbError::Io {
          path: path.to_path_buf(),
          source: e,
        })?;
        Self::try_open(path)
      }
    }
  }

  /// Open an in-memory store.
  pub fn open_in_memory() -> Result<Self, DbError> {
    Self::initialize(Connection::open_in_memory()?)
  }

  fn try_open(path: &Path) -> Result<Self, DbError> {
    Self::initialize(Connection::open(path)?)
  }

  fn initialize(conn: Connection) -> Result<Self, DbError> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version == 0 {
      conn.execute_batch(SCHEMA)?;
      conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
      debug!("initialized build database schema");
    } else if version != SCHEMA_VERSION {
      return Err(DbError::SchemaMismatch { found: version });
    }
    // Probe the tables so a truncated or corrupt file surfaces here rather
    // than mid-build.
    conn.query_row("SELECT count(*) FROM compilations", [], |row| row.get::<_, i64>(0))?;

    Ok(Self {
      conn: Arc::new(Mutex::new(conn)),
    })
  }

  /// Run `f` inside a single transaction.
  ///
  /// Both the update protocol and the staleness oracle go through here: the
  /// oracle's `(command_of, inputs_of)` pair must observe one consistent
  /// snapshot, and the update protocol must commit as one atomic unit.
  pub fn transact<T>(&self, f: impl FnOnce(&DbTxn<'_>) -> Result<T, DbError>) -> Result<T, DbError> {
    let mut conn = self.conn.lock().expect("database lock poisoned");
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let txn = DbTxn { tx };
    let value = f(&txn)?;
    txn.tx.commit()?;
    Ok(value)
  }

  /// Record (or replace) the command that produced `output`.
  pub fn record_compilation(&self, output: &Path, command: &str) -> Result<(), DbError> {
    self.transact(|tx| tx.record_compilation(output, command))
  }

  /// Delete every recorded input of `output`.
  pub fn forget_inputs_of(&self, output: &Path) -> Result<(), DbError> {
    self.transact(|tx| tx.forget_inputs_of(output))
  }

  /// Record one `(input, mtime)` pair for `output`.
  pub fn record_dep(&self, input: &Path, output: &Path, mtime_ns: Option<i64>) -> Result<(), DbError> {
    self.transact(|tx| tx.record_dep(input, output, mtime_ns))
  }

  /// The stored command for `output`, if any.
  pub fn command_of(&self, output: &Path) -> Result<Option<String>, DbError> {
    self.transact(|tx| tx.command_of(output))
  }

  /// All recorded inputs of `output` with their recorded mtimes; `None` iff
  /// no row exists.
  pub fn inputs_of(&self, output: &Path) -> Result<Option<Vec<InputFileInfo>>, DbError> {
    self.transact(|tx| tx.inputs_of(output))
  }
}

/// The store operations, scoped to one open transaction.
pub struct DbTxn<'a> {
  tx: rusqlite::Transaction<'a>,
}

impl DbTxn<'_> {
  pub fn record_compilation(&self, output: &Path, command: &str) -> Result<(), DbError> {
    self.tx.execute(
      "INSERT INTO compilations (output_path, command) VALUES (?1, ?2)
       ON CONFLICT (output_path) DO UPDATE SET command = excluded.command",
      params![path_key(output), command],
    )?;
    Ok(())
  }

  pub fn forget_inputs_of(&self, output: &Path) -> Result<(), DbError> {
    self.tx.execute("DELETE FROM deps WHERE output_path = ?1", params![path_key(output)])?;
    Ok(())
  }

  pub fn record_dep(&self, input: &Path, output: &Path, mtime_ns: Option<i64>) -> Result<(), DbError> {
    self.tx.execute(
      "INSERT INTO deps (output_path, input_path, input_mtime_ns) VALUES (?1, ?2, ?3)",
      params![path_key(output), path_key(input), mtime_ns],
    )?;
    Ok(())
  }

  pub fn command_of(&self, output: &Path) -> Result<Option<String>, DbError> {
    let command = self
      .tx
      .query_row(
        "SELECT command FROM compilations WHERE output_path = ?1",
        params![path_key(output)],
        |row| row.get(0),
      )
      .optional()?;
    Ok(command)
  }

  pub fn inputs_of(&self, output: &Path) -> Result<Option<Vec<InputFileInfo>>, DbError> {
    let mut stmt = self
      .tx
      .prepare("SELECT input_path, input_mtime_ns FROM deps WHERE output_path = ?1 ORDER BY rowid")?;
    let mut rows = stmt.query(params![path_key(output)])?;
    let mut inputs = Vec::new();
    while let Some(row) = rows.next()? {
      let path: String = row.get(0)?;
      let last_mtime: Option<i64> = row.get(1)?;
      inputs.push(InputFileInfo {
        path: PathBuf::from(path),
        last_mtime,
      });
    }
    Ok(if inputs.is_empty() { None } else { Some(inputs) })
  }
}

fn path_key(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn command_round_trip_and_upsert() {
    let db = Database::open_in_memory().unwrap();
    let out = Path::new("obj/foo.o");

    assert_eq!(db.command_of(out).unwrap(), None);

    db.record_compilation(out, "cc -c foo.c").unwrap();
    assert_eq!(db.command_of(out).unwrap().as_deref(), Some("cc -c foo.c"));

    db.record_compilation(out, "cc -c -O2 foo.c").unwrap();
    assert_eq!(db.command_of(out).unwrap().as_deref(), Some("cc -c -O2 foo.c"));
  }

  #[test]
  fn inputs_absent_until_recorded_and_ordered() {
    let db = Database::open_in_memory().unwrap();
    let out = Path::new("obj/foo.o");

    assert_eq!(db.inputs_of(out).unwrap(), None);

    db.record_dep(Path::new("foo.c"), out, Some(1000)).unwrap();
    db.record_dep(Path::new("foo.h"), out, Some(2000)).unwrap();

    let inputs = db.inputs_of(out).unwrap().unwrap();
    assert_eq!(inputs.len(), 2);
    assert_eq!(inputs[0].path, PathBuf::from("foo.c"));
    assert_eq!(inputs[0].last_mtime, Some(1000));
    assert_eq!(inputs[1].path, PathBuf::from("foo.h"));
  }

  #[test]
  fn forget_removes_only_the_named_output() {
    let db = Database::open_in_memory().unwrap();
    let a = Path::new("a.o");
    let b = Path::new("b.o");
    db.record_dep(Path::new("a.c"), a, Some(1)).unwrap();
    db.record_dep(Path::new("b.c"), b, Some(2)).unwrap();

    db.forget_inputs_of(a).unwrap();

    assert_eq!(db.inputs_of(a).unwrap(), None);
    assert!(db.inputs_of(b).unwrap().is_some());
  }

  #[test]
  fn failed_transaction_rolls_back_whole_update() {
    let db = Database::open_in_memory().unwrap();
    let out = Path::new("obj/foo.o");
    db.record_compilation(out, "old command").unwrap();
    db.record_dep(Path::new("old.h"), out, Some(1)).unwrap();

    let result: Result<(), DbError> = db.transact(|tx| {
      tx.record_compilation(out, "new command")?;
      tx.forget_inputs_of(out)?;
      tx.record_dep(Path::new("new.h"), out, Some(2))?;
      Err(DbError::SchemaMismatch { found: -1 })
    });
    assert!(result.is_err());

    // The full prior record is still intact.
    assert_eq!(db.command_of(out).unwrap().as_deref(), Some("old command"));
    let inputs = db.inputs_of(out).unwrap().unwrap();
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].path, PathBuf::from("old.h"));
  }

  #[test]
  fn persists_across_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(DB_FILE_NAME);

    {
      let db = Database::open(&path).unwrap();
      db.record_compilation(Path::new("x.o"), "cc -c x.c").unwrap();
    }

    let db = Database::open(&path).unwrap();
    assert_eq!(db.command_of(Path::new("x.o")).unwrap().as_deref(), Some("cc -c x.c"));
  }

  #[test]
  fn corrupt_file_is_discarded_and_recreated() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(DB_FILE_NAME);
    std::fs::write(&path, "this is not a sqlite database, not even close").unwrap();

    let db = Database::open(&path).unwrap();
    assert_eq!(db.command_of(Path::new("x.o")).unwrap(), None);
  }

  #[test]
  fn schema_mismatch_is_discarded_and_recreated() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(DB_FILE_NAME);

    {
      let db = Database::open(&path).unwrap();
      db.record_compilation(Path::new("x.o"), "cc -c x.c").unwrap();
    }
    {
      let conn = Connection::open(&path).unwrap();
      conn.pragma_update(None, "user_version", 99).unwrap();
    }

    let db = Database::open(&path).unwrap();
    assert_eq!(db.command_of(Path::new("x.o")).unwrap(), None);
  }
}
