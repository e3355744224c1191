//! Central store access.
//!
//! The orchestrator and the gate only talk to [`Repository`]; the SQLite
//! implementation lives in [`sqlite`].

pub mod sqlite;

use async_trait::async_trait;

use crate::model::{
    AccessGrant, Account, AccountId, AccountRecord, LogEntry, LogEntryId, LogEntryRecord,
    PersonId, Plugin, PluginId, Token, TokenId,
};

pub use sqlite::SqliteRepository;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("{0} already exists")]
    Conflict(String),
    #[error("expected to delete {expected} {what}, deleted {deleted}")]
    DeleteMismatch {
        what: &'static str,
        expected: usize,
        deleted: usize,
    },
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// New log entry; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub account_id: AccountId,
    pub native_location: serde_json::Value,
}

/// CRUD and bulk access to the central records.
///
/// Bulk lookups return only the rows that exist; callers compare against
/// what they asked for.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn insert_plugin(&self, plugin: &Plugin) -> Result<(), StoreError>;

    async fn get_plugin(&self, id: PluginId) -> Result<Option<Plugin>, StoreError>;

    async fn list_plugins(&self) -> Result<Vec<Plugin>, StoreError>;

    async fn insert_account(&self, account: &Account) -> Result<(), StoreError>;

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Accounts with the given ids, each joined with its plugin.
    async fn find_accounts(&self, ids: &[AccountId]) -> Result<Vec<AccountRecord>, StoreError>;

    /// All accounts owned by any of the given persons, across plugins.
    async fn find_accounts_by_persons(
        &self,
        persons: &[PersonId],
    ) -> Result<Vec<AccountRecord>, StoreError>;

    async fn insert_log_entry(&self, entry: NewLogEntry) -> Result<LogEntry, StoreError>;

    /// Log entries with the given ids, each joined with its account's plugin.
    async fn find_log_entries(
        &self,
        ids: &[LogEntryId],
    ) -> Result<Vec<LogEntryRecord>, StoreError>;

    /// Every log entry of the given accounts, newest first.
    async fn log_entries_for_accounts(
        &self,
        accounts: &[AccountId],
    ) -> Result<Vec<LogEntry>, StoreError>;

    /// Delete the given log entries, then the given accounts, in one
    /// transaction. Fails without deleting anything unless every row exists.
    async fn delete_rows(
        &self,
        entries: &[LogEntryId],
        accounts: &[AccountId],
    ) -> Result<(), StoreError>;

    async fn insert_token(&self, token: &Token) -> Result<(), StoreError>;

    async fn get_token(&self, id: TokenId) -> Result<Option<Token>, StoreError>;

    async fn insert_grant(&self, grant: AccessGrant) -> Result<(), StoreError>;

    /// Plugin ids the token may act on.
    async fn grants_for_token(&self, token_id: TokenId) -> Result<Vec<PluginId>, StoreError>;
}
