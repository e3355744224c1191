//! SQLite-backed [`Repository`].

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::{NewLogEntry, Repository, StoreError};
use crate::model::{
    AccessGrant, Account, AccountId, AccountRecord, LogEntry, LogEntryId, LogEntryRecord,
    PersonId, Plugin, PluginId, Token, TokenId,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS plugins (
    id          TEXT PRIMARY KEY,
    type        TEXT NOT NULL,
    name        TEXT NOT NULL,
    config      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS accounts (
    id          TEXT PRIMARY KEY,
    person_id   TEXT NOT NULL,
    plugin_id   TEXT NOT NULL REFERENCES plugins(id),
    native_id   TEXT NOT NULL,
    UNIQUE (plugin_id, native_id)
);
CREATE INDEX IF NOT EXISTS accounts_person_id ON accounts(person_id);

CREATE TABLE IF NOT EXISTS log_entries (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id      TEXT NOT NULL REFERENCES accounts(id),
    native_location TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    UNIQUE (account_id, native_location)
);
CREATE INDEX IF NOT EXISTS log_entries_created_at ON log_entries(created_at);

CREATE TABLE IF NOT EXISTS tokens (
    id          TEXT PRIMARY KEY,
    secret_hash TEXT NOT NULL,
    description TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS access_grants (
    token_id    TEXT NOT NULL REFERENCES tokens(id) ON DELETE CASCADE,
    plugin_id   TEXT NOT NULL REFERENCES plugins(id) ON DELETE CASCADE,
    PRIMARY KEY (token_id, plugin_id)
);
"#;

const ACCOUNT_RECORD_COLUMNS: &str =
    "a.id, a.person_id, a.plugin_id, a.native_id, p.type, p.name, p.config";

const LOG_RECORD_COLUMNS: &str =
    "l.id, l.account_id, l.native_location, l.created_at, p.id, p.type, p.name, p.config";

/// Repository over a single SQLite connection.
///
/// Calls are short and never held across an await point, so one guarded
/// connection serves concurrent redaction groups.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Database(e.to_string()))?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Fresh in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Map a uniqueness violation on insert to [`StoreError::Conflict`].
fn insert_error(what: &str) -> impl Fn(rusqlite::Error) -> StoreError + '_ {
    move |e| match &e {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            StoreError::Conflict(what.to_string())
        }
        _ => StoreError::from(e),
    }
}

fn placeholders(n: usize) -> String {
    (1..=n)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn timestamp(at: DateTime<Utc>) -> String {
    // Fixed width so lexical order matches chronological order.
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_id<T: FromStr>(raw: &str, column: &str) -> Result<T, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::Corrupt(format!("{column}={raw}")))
}

fn parse_json(raw: &str, column: &str) -> Result<serde_json::Value, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

fn parse_time(raw: &str, column: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

fn to_json(value: &serde_json::Value) -> String {
    // serde_json::Value has no failing Display path.
    value.to_string()
}

struct PluginRow {
    id: String,
    plugin_type: String,
    name: String,
    config: String,
}

impl PluginRow {
    fn into_plugin(self) -> Result<Plugin, StoreError> {
        Ok(Plugin {
            id: parse_id(&self.id, "plugins.id")?,
            plugin_type: self.plugin_type,
            name: self.name,
            config: parse_json(&self.config, "plugins.config")?,
        })
    }
}

struct AccountRow {
    id: String,
    person_id: String,
    plugin_id: String,
    native_id: String,
}

impl AccountRow {
    fn into_account(self) -> Result<Account, StoreError> {
        Ok(Account {
            id: parse_id(&self.id, "accounts.id")?,
            person_id: parse_id(&self.person_id, "accounts.person_id")?,
            plugin_id: parse_id(&self.plugin_id, "accounts.plugin_id")?,
            native_id: parse_json(&self.native_id, "accounts.native_id")?,
        })
    }
}

struct LogRow {
    id: i64,
    account_id: String,
    native_location: String,
    created_at: String,
}

impl LogRow {
    fn into_entry(self) -> Result<LogEntry, StoreError> {
        Ok(LogEntry {
            id: LogEntryId(self.id),
            account_id: parse_id(&self.account_id, "log_entries.account_id")?,
            native_location: parse_json(&self.native_location, "log_entries.native_location")?,
            created_at: parse_time(&self.created_at, "log_entries.created_at")?,
        })
    }
}

fn account_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(AccountRow, PluginRow)> {
    let plugin_id: String = row.get(2)?;
    Ok((
        AccountRow {
            id: row.get(0)?,
            person_id: row.get(1)?,
            plugin_id: plugin_id.clone(),
            native_id: row.get(3)?,
        },
        PluginRow {
            id: plugin_id,
            plugin_type: row.get(4)?,
            name: row.get(5)?,
            config: row.get(6)?,
        },
    ))
}

fn log_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(LogRow, PluginRow)> {
    Ok((
        LogRow {
            id: row.get(0)?,
            account_id: row.get(1)?,
            native_location: row.get(2)?,
            created_at: row.get(3)?,
        },
        PluginRow {
            id: row.get(4)?,
            plugin_type: row.get(5)?,
            name: row.get(6)?,
            config: row.get(7)?,
        },
    ))
}

fn into_account_records(
    rows: Vec<(AccountRow, PluginRow)>,
) -> Result<Vec<AccountRecord>, StoreError> {
    rows.into_iter()
        .map(|(account, plugin)| {
            Ok::<_, StoreError>(AccountRecord {
                account: account.into_account()?,
                plugin: plugin.into_plugin()?,
            })
        })
        .collect()
}

impl SqliteRepository {
    fn query_account_records(
        &self,
        filter_column: &str,
        keys: Vec<String>,
    ) -> Result<Vec<AccountRecord>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {ACCOUNT_RECORD_COLUMNS} FROM accounts a \
             JOIN plugins p ON p.id = a.plugin_id \
             WHERE a.{filter_column} IN ({})",
            placeholders(keys.len())
        );
        let rows = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(keys.iter()), account_record_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        into_account_records(rows)
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn insert_plugin(&self, plugin: &Plugin) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO plugins (id, type, name, config) VALUES (?1, ?2, ?3, ?4)",
            params![
                plugin.id.to_string(),
                plugin.plugin_type,
                plugin.name,
                to_json(&plugin.config),
            ],
        )
        .map_err(insert_error("plugin"))?;
        Ok(())
    }

    async fn get_plugin(&self, id: PluginId) -> Result<Option<Plugin>, StoreError> {
        let row = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT id, type, name, config FROM plugins WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok(PluginRow {
                        id: row.get(0)?,
                        plugin_type: row.get(1)?,
                        name: row.get(2)?,
                        config: row.get(3)?,
                    })
                },
            )
            .optional()?
        };
        row.map(PluginRow::into_plugin).transpose()
    }

    async fn list_plugins(&self) -> Result<Vec<Plugin>, StoreError> {
        let rows = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare("SELECT id, type, name, config FROM plugins ORDER BY name")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(PluginRow {
                        id: row.get(0)?,
                        plugin_type: row.get(1)?,
                        name: row.get(2)?,
                        config: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        rows.into_iter().map(PluginRow::into_plugin).collect()
    }

    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO accounts (id, person_id, plugin_id, native_id) VALUES (?1, ?2, ?3, ?4)",
            params![
                account.id.to_string(),
                account.person_id.to_string(),
                account.plugin_id.to_string(),
                to_json(&account.native_id),
            ],
        )
        .map_err(insert_error("account with this native id"))?;
        Ok(())
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let row = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT id, person_id, plugin_id, native_id FROM accounts WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok(AccountRow {
                        id: row.get(0)?,
                        person_id: row.get(1)?,
                        plugin_id: row.get(2)?,
                        native_id: row.get(3)?,
                    })
                },
            )
            .optional()?
        };
        row.map(AccountRow::into_account).transpose()
    }

    async fn find_accounts(&self, ids: &[AccountId]) -> Result<Vec<AccountRecord>, StoreError> {
        self.query_account_records("id", ids.iter().map(ToString::to_string).collect())
    }

    async fn find_accounts_by_persons(
        &self,
        persons: &[PersonId],
    ) -> Result<Vec<AccountRecord>, StoreError> {
        self.query_account_records("person_id", persons.iter().map(ToString::to_string).collect())
    }

    async fn insert_log_entry(&self, entry: NewLogEntry) -> Result<LogEntry, StoreError> {
        let created_at = Utc::now();
        let id = {
            let conn = self.conn.lock();
            conn.execute(
                "INSERT INTO log_entries (account_id, native_location, created_at) VALUES (?1, ?2, ?3)",
                params![
                    entry.account_id.to_string(),
                    to_json(&entry.native_location),
                    timestamp(created_at),
                ],
            )
            .map_err(insert_error("log entry with this native location"))?;
            conn.last_insert_rowid()
        };
        // Round-trip through the stored precision.
        let created_at = parse_time(&timestamp(created_at), "log_entries.created_at")?;
        Ok(LogEntry {
            id: LogEntryId(id),
            account_id: entry.account_id,
            native_location: entry.native_location,
            created_at,
        })
    }

    async fn find_log_entries(
        &self,
        ids: &[LogEntryId],
    ) -> Result<Vec<LogEntryRecord>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {LOG_RECORD_COLUMNS} FROM log_entries l \
             JOIN accounts a ON a.id = l.account_id \
             JOIN plugins p ON p.id = a.plugin_id \
             WHERE l.id IN ({})",
            placeholders(ids.len())
        );
        let rows = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(ids.iter().map(|id| id.0)), log_record_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        rows.into_iter()
            .map(|(entry, plugin)| {
                Ok::<_, StoreError>(LogEntryRecord {
                    entry: entry.into_entry()?,
                    plugin: plugin.into_plugin()?,
                })
            })
            .collect()
    }

    async fn log_entries_for_accounts(
        &self,
        accounts: &[AccountId],
    ) -> Result<Vec<LogEntry>, StoreError> {
        if accounts.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, account_id, native_location, created_at FROM log_entries \
             WHERE account_id IN ({}) ORDER BY created_at DESC, id DESC",
            placeholders(accounts.len())
        );
        let rows = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params_from_iter(accounts.iter().map(ToString::to_string)),
                    |row| {
                        Ok(LogRow {
                            id: row.get(0)?,
                            account_id: row.get(1)?,
                            native_location: row.get(2)?,
                            created_at: row.get(3)?,
                        })
                    },
                )?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        rows.into_iter().map(LogRow::into_entry).collect()
    }

    async fn delete_rows(
        &self,
        entries: &[LogEntryId],
        accounts: &[AccountId],
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        if !entries.is_empty() {
            let sql = format!(
                "DELETE FROM log_entries WHERE id IN ({})",
                placeholders(entries.len())
            );
            let deleted = tx.execute(&sql, params_from_iter(entries.iter().map(|id| id.0)))?;
            if deleted != entries.len() {
                return Err(StoreError::DeleteMismatch {
                    what: "log entries",
                    expected: entries.len(),
                    deleted,
                });
            }
        }

        if !accounts.is_empty() {
            let sql = format!(
                "DELETE FROM accounts WHERE id IN ({})",
                placeholders(accounts.len())
            );
            let deleted = tx.execute(&sql, params_from_iter(accounts.iter().map(ToString::to_string)))?;
            if deleted != accounts.len() {
                return Err(StoreError::DeleteMismatch {
                    what: "accounts",
                    expected: accounts.len(),
                    deleted,
                });
            }
        }

        tx.commit()?;
        Ok(())
    }

    async fn insert_token(&self, token: &Token) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO tokens (id, secret_hash, description, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                token.id.to_string(),
                token.secret_hash,
                token.description,
                timestamp(token.created_at),
            ],
        )
        .map_err(insert_error("token"))?;
        Ok(())
    }

    async fn get_token(&self, id: TokenId) -> Result<Option<Token>, StoreError> {
        let row = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT id, secret_hash, description, created_at FROM tokens WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?
        };
        row.map(|(id, secret_hash, description, created_at)| {
            Ok::<_, StoreError>(Token {
                id: parse_id(&id, "tokens.id")?,
                secret_hash,
                description,
                created_at: parse_time(&created_at, "tokens.created_at")?,
            })
        })
        .transpose()
    }

    async fn insert_grant(&self, grant: AccessGrant) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO access_grants (token_id, plugin_id) VALUES (?1, ?2)",
            params![grant.token_id.to_string(), grant.plugin_id.to_string()],
        )
        .map_err(insert_error("access grant"))?;
        Ok(())
    }

    async fn grants_for_token(&self, token_id: TokenId) -> Result<Vec<PluginId>, StoreError> {
        let rows = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare("SELECT plugin_id FROM access_grants WHERE token_id = ?1")?;
            let rows = stmt
                .query_map(params![token_id.to_string()], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        rows.iter()
            .map(|raw| parse_id(raw, "access_grants.plugin_id"))
            .collect()
    }
}
