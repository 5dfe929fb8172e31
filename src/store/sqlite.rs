//! SQLite implementation of [`TargetStore`]
//!
//! The database name from the configuration is used as the database file
//! path (`:memory:` opens a private in-memory database). Host, user and
//! password are not used by this backend.

use rusqlite::{Connection, ErrorCode, params};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::{
    DiagnosticClass, StoreError, StoreResult, TargetStore, WriteMode, create_table_statement,
};
use crate::config::DatabaseConfig;

const IN_MEMORY: &str = ":memory:";
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                StoreError::IntegrityViolation {
                    message: err.to_string(),
                }
            }
            _ => StoreError::fatal(err.to_string()),
        }
    }
}

/// Target store backed by a single SQLite connection
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        info!("Opened SQLite database {}", path.display());
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Underlying connection, for queries outside the load path
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl TargetStore for SqliteStore {
    fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        if config.name.is_empty() {
            return Err(StoreError::fatal("database name must not be empty"));
        }
        if config.name == IN_MEMORY {
            return Self::open_in_memory();
        }
        if !config.host.is_empty() && config.host != "localhost" {
            debug!("Ignoring database host {} for SQLite", config.host);
        }
        Self::open(&config.name)
    }

    fn execute(&mut self, statement: &str) -> StoreResult<usize> {
        Ok(self.conn.execute(statement, [])?)
    }

    fn table_exists(&mut self, name: &str) -> StoreResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn column_count(&mut self, name: &str) -> StoreResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pragma_table_info(?1)",
            params![name],
            |row| row.get(0),
        )?;
        if count == 0 {
            return Err(StoreError::Warning {
                class: DiagnosticClass::UnknownTable,
                message: format!("no such table: {}", name),
            });
        }
        Ok(count as usize)
    }

    fn escape_literal(&self, bytes: &[u8]) -> String {
        match std::str::from_utf8(bytes) {
            Ok(text) if !text.contains('\0') => format!("'{}'", text.replace('\'', "''")),
            _ => format!("CAST(X'{}' AS TEXT)", hex::encode_upper(bytes)),
        }
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn write_verb(&self, mode: WriteMode) -> &'static str {
        match mode {
            WriteMode::Insert => "INSERT INTO",
            WriteMode::InsertIgnore => "INSERT OR IGNORE INTO",
            WriteMode::Upsert => "INSERT OR REPLACE INTO",
        }
    }

    fn drop_table_if_exists(&mut self, name: &str) -> StoreResult<()> {
        if !self.table_exists(name)? {
            return Err(StoreError::Warning {
                class: DiagnosticClass::UnknownTable,
                message: format!("unknown table '{}'", name),
            });
        }
        self.conn.execute(
            &format!("DROP TABLE IF EXISTS {}", self.quote_identifier(name)),
            [],
        )?;
        Ok(())
    }

    /// SQLite cannot add a primary key to an existing table, so the table is
    /// rebuilt with the constraint inside one transaction.
    fn apply_primary_key(
        &mut self,
        name: &str,
        columns: &[String],
        types: &[String],
        primary_key: &[String],
    ) -> StoreResult<()> {
        if primary_key.is_empty() {
            return Ok(());
        }

        let rebuilt = format!("{}__pk", name);
        let drop_stale = format!("DROP TABLE IF EXISTS {}", self.quote_identifier(&rebuilt));
        let create = create_table_statement(&*self, &rebuilt, columns, types, primary_key);
        let copy = format!(
            "INSERT INTO {} SELECT * FROM {}",
            self.quote_identifier(&rebuilt),
            self.quote_identifier(name)
        );
        let drop = format!("DROP TABLE {}", self.quote_identifier(name));
        let rename = format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_identifier(&rebuilt),
            self.quote_identifier(name)
        );

        let tx = self.conn.transaction()?;
        tx.execute(&drop_stale, [])?;
        tx.execute(&create, [])?;
        tx.execute(&copy, [])?;
        tx.execute(&drop, [])?;
        tx.execute(&rename, [])?;
        tx.commit()?;

        debug!("Applied primary key ({}) to {}", primary_key.join(", "), name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn store_with_table() -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .create_table(
                "app",
                &names(&["id", "name"]),
                &names(&["INT", "VARCHAR(100)"]),
                &names(&["id"]),
            )
            .unwrap();
        store
    }

    #[test]
    fn test_table_introspection() {
        let mut store = store_with_table();
        assert!(store.table_exists("app").unwrap());
        assert!(!store.table_exists("missing").unwrap());
        assert_eq!(store.column_count("app").unwrap(), 2);
        assert!(matches!(
            store.column_count("missing"),
            Err(StoreError::Warning {
                class: DiagnosticClass::UnknownTable,
                ..
            })
        ));
    }

    #[test]
    fn test_escape_literal() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.escape_literal(b"it's"), "'it''s'");
        assert_eq!(store.escape_literal(b"a\0b"), "CAST(X'610062' AS TEXT)");
        assert_eq!(store.escape_literal(&[0xff, 0x41]), "CAST(X'FF41' AS TEXT)");
        assert_eq!(store.quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_escaped_bytes_round_trip() {
        let mut store = store_with_table();
        let payload: Vec<u8> = (0u8..=255).collect();
        let statement = format!(
            "INSERT INTO app VALUES (1, {})",
            store.escape_literal(&payload)
        );
        store.execute(&statement).unwrap();

        let stored: Vec<u8> = store
            .connection()
            .query_row("SELECT name FROM app WHERE id = 1", [], |row| {
                Ok(row.get_ref(0)?.as_bytes().unwrap().to_vec())
            })
            .unwrap();
        assert_eq!(stored, payload);
    }

    #[test]
    fn test_constraint_violation_classified() {
        let mut store = store_with_table();
        store.execute("INSERT INTO app VALUES (1, 'a')").unwrap();
        let err = store.execute("INSERT INTO app VALUES (1, 'b')").unwrap_err();
        assert!(err.is_integrity_violation());

        let err = store.execute("INSERT INTO nowhere VALUES (1)").unwrap_err();
        assert!(matches!(err, StoreError::Fatal { .. }));
    }

    #[test]
    fn test_drop_missing_table_is_warning() {
        let mut store = store_with_table();
        assert!(matches!(
            store.drop_table_if_exists("missing"),
            Err(StoreError::Warning { .. })
        ));
        store.drop_table_if_exists("app").unwrap();
        assert!(!store.table_exists("app").unwrap());
    }

    #[test]
    fn test_apply_primary_key_rebuilds_table() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let columns = names(&["id", "name"]);
        let types = names(&["INT", "TEXT"]);
        store.create_table("un", &columns, &types, &[]).unwrap();
        store.execute("INSERT INTO un VALUES (1, 'a'), (2, 'b')").unwrap();

        store
            .apply_primary_key("un", &columns, &types, &names(&["id"]))
            .unwrap();

        let count: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM un", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
        assert!(
            store
                .execute("INSERT INTO un VALUES (1, 'dup')")
                .unwrap_err()
                .is_integrity_violation()
        );
        assert!(!store.table_exists("un__pk").unwrap());
    }

    #[test]
    fn test_apply_primary_key_rejects_duplicates() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let columns = names(&["id"]);
        let types = names(&["INT"]);
        store.create_table("un", &columns, &types, &[]).unwrap();
        store.execute("INSERT INTO un VALUES (1), (1)").unwrap();

        let err = store
            .apply_primary_key("un", &columns, &types, &columns)
            .unwrap_err();
        assert!(err.is_integrity_violation());
        assert_eq!(store.column_count("un").unwrap(), 1);
    }

    #[test]
    fn test_rename_table() {
        let mut store = store_with_table();
        store.rename_table("app", "app_old").unwrap();
        assert!(store.table_exists("app_old").unwrap());
        assert!(!store.table_exists("app").unwrap());
    }
}
