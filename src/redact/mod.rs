//! Redaction orchestrator.
//!
//! Every entry point follows the same shape:
//!
//! 1. resolve the requested rows with their owning plugin; any missing id
//!    rejects the call,
//! 2. group the rows by plugin and check access for every group before
//!    any plugin is contacted,
//! 3. build each group's capability object and dispatch the groups as
//!    independent tasks,
//! 4. inside a group, call the plugin and delete the local rows only
//!    after it succeeded.
//!
//! Within an account group, log entries are always redacted (newest first)
//! before the accounts themselves. Groups are not atomic with respect to
//! each other; the [`RedactionReport`] says which ones went through.

pub mod group;
pub mod report;

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::auth::{AccessError, AuthContext};
use crate::metrics::Metrics;
use crate::model::{
    Account, AccountId, AccountRecord, LogEntry, LogEntryId, ParseModeError, PersonId, PluginId,
    RedactionMode,
};
use crate::plugins::{Capability, CapabilityRegistry, RegistryError};
use crate::store::{Repository, StoreError};
use group::PluginGroup;

pub use report::{FailureStage, GroupFailure, GroupSummary, RedactionReport};

#[derive(Debug, thiserror::Error)]
pub enum RedactError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{kind} not found: {}", .ids.join(", "))]
    NotFound { kind: &'static str, ids: Vec<String> },
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("plugin {plugin_id} cannot be loaded: {source}")]
    Plugin {
        plugin_id: PluginId,
        #[source]
        source: RegistryError,
    },
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl From<ParseModeError> for RedactError {
    fn from(err: ParseModeError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl RedactError {
    fn not_found<T: Display>(kind: &'static str, ids: &[T]) -> Self {
        Self::NotFound {
            kind,
            ids: ids.iter().map(ToString::to_string).collect(),
        }
    }

    /// Caller errors are rejected before anything is touched.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_) | Self::NotFound { .. } | Self::Access(_)
        )
    }
}

/// Parse a `mode` as received from a caller.
pub fn parse_mode(raw: &str) -> Result<RedactionMode, RedactError> {
    Ok(raw.parse::<RedactionMode>()?)
}

#[derive(Debug, Clone)]
pub struct RedactorOptions {
    /// Per-group deadline; `None` waits indefinitely.
    pub group_timeout: Option<Duration>,
    /// Plugin groups of one call that may run at the same time.
    pub max_concurrent_groups: usize,
}

impl Default for RedactorOptions {
    fn default() -> Self {
        Self {
            group_timeout: Some(Duration::from_secs(60)),
            max_concurrent_groups: 8,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum EntryPoint {
    Accounts,
    Persons,
    Entries,
}

impl EntryPoint {
    fn as_str(self) -> &'static str {
        match self {
            Self::Accounts => "accounts",
            Self::Persons => "persons",
            Self::Entries => "entries",
        }
    }
}

type GroupOutcome = Result<GroupSummary, GroupFailure>;

/// A dispatched group: what it covers, and the task doing the work.
struct Pending {
    summary: GroupSummary,
    handle: JoinHandle<GroupOutcome>,
}

/// Coordinates redaction across plugins.
pub struct Redactor {
    repo: Arc<dyn Repository>,
    registry: Arc<CapabilityRegistry>,
    options: RedactorOptions,
    metrics: Option<Metrics>,
}

impl Redactor {
    pub fn new(
        repo: Arc<dyn Repository>,
        registry: Arc<CapabilityRegistry>,
        options: RedactorOptions,
    ) -> Self {
        Self {
            repo,
            registry,
            options,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn options(&self) -> &RedactorOptions {
        &self.options
    }

    /// Redact accounts, each after all of its log entries.
    pub async fn redact_accounts(
        &self,
        ctx: &AuthContext,
        ids: &[AccountId],
        mode: RedactionMode,
    ) -> Result<RedactionReport, RedactError> {
        let result = self.accounts(ctx, ids, mode).await;
        self.finish(EntryPoint::Accounts, result)
    }

    /// Redact every account, across all plugins, owned by the given persons.
    pub async fn redact_persons(
        &self,
        ctx: &AuthContext,
        persons: &[PersonId],
        mode: RedactionMode,
    ) -> Result<RedactionReport, RedactError> {
        let result = self.persons(ctx, persons, mode).await;
        self.finish(EntryPoint::Persons, result)
    }

    /// Redact individual log entries; their accounts are left alone.
    pub async fn redact_entries(
        &self,
        ctx: &AuthContext,
        ids: &[LogEntryId],
        mode: RedactionMode,
    ) -> Result<RedactionReport, RedactError> {
        let result = self.entries(ctx, ids, mode).await;
        self.finish(EntryPoint::Entries, result)
    }

    async fn accounts(
        &self,
        ctx: &AuthContext,
        ids: &[AccountId],
        mode: RedactionMode,
    ) -> Result<RedactionReport, RedactError> {
        let ids = group::dedup(ids);
        tracing::info!(%mode, accounts = ids.len(), "Redacting accounts");
        if ids.is_empty() {
            return Ok(RedactionReport::new(mode));
        }

        let records = self.repo.find_accounts(&ids).await?;
        let missing = group::missing(&ids, records.iter().map(|r| r.account.id));
        if !missing.is_empty() {
            return Err(RedactError::not_found("accounts", &missing));
        }
        self.redact_account_records(ctx, records, mode).await
    }

    async fn persons(
        &self,
        ctx: &AuthContext,
        persons: &[PersonId],
        mode: RedactionMode,
    ) -> Result<RedactionReport, RedactError> {
        let persons = group::dedup(persons);
        tracing::info!(%mode, persons = persons.len(), "Redacting persons");
        if persons.is_empty() {
            return Ok(RedactionReport::new(mode));
        }

        let records = self.repo.find_accounts_by_persons(&persons).await?;
        let missing = group::missing(&persons, records.iter().map(|r| r.account.person_id));
        if !missing.is_empty() {
            return Err(RedactError::not_found("persons", &missing));
        }
        self.redact_account_records(ctx, records, mode).await
    }

    async fn redact_account_records(
        &self,
        ctx: &AuthContext,
        records: Vec<AccountRecord>,
        mode: RedactionMode,
    ) -> Result<RedactionReport, RedactError> {
        let groups = group::group_by_plugin(records.into_iter().map(|r| (r.plugin, r.account)));
        let prepared = self.prepare(ctx, groups)?;

        // One lookup for every group's remaining entries, already newest first.
        let mut owner: HashMap<AccountId, usize> = HashMap::new();
        for (i, (group, _)) in prepared.iter().enumerate() {
            owner.extend(group.items.iter().map(|account| (account.id, i)));
        }
        let account_ids: Vec<AccountId> = owner.keys().copied().collect();
        let mut entries: Vec<Vec<LogEntry>> = vec![Vec::new(); prepared.len()];
        for entry in self.repo.log_entries_for_accounts(&account_ids).await? {
            if let Some(&i) = owner.get(&entry.account_id) {
                entries[i].push(entry);
            }
        }

        let limit = self.limiter();
        let pending = prepared
            .into_iter()
            .zip(entries)
            .map(|((group, capability), entries)| {
                let summary = GroupSummary {
                    plugin_id: group.plugin.id,
                    plugin_name: group.plugin.name.clone(),
                    accounts: group.items.iter().map(|a| a.id).collect(),
                    entries: entries.iter().map(|e| e.id).collect(),
                };
                let work = redact_account_group(
                    self.repo.clone(),
                    capability,
                    group.items,
                    entries,
                    mode,
                    summary.clone(),
                );
                self.dispatch(&limit, summary, work)
            })
            .collect();

        Ok(self.join(mode, pending).await)
    }

    async fn entries(
        &self,
        ctx: &AuthContext,
        ids: &[LogEntryId],
        mode: RedactionMode,
    ) -> Result<RedactionReport, RedactError> {
        let ids = group::dedup(ids);
        tracing::info!(%mode, entries = ids.len(), "Redacting log entries");
        if ids.is_empty() {
            return Ok(RedactionReport::new(mode));
        }

        let records = self.repo.find_log_entries(&ids).await?;
        let missing = group::missing(&ids, records.iter().map(|r| r.entry.id));
        if !missing.is_empty() {
            return Err(RedactError::not_found("log entries", &missing));
        }

        let groups = group::group_by_plugin(records.into_iter().map(|r| (r.plugin, r.entry)));
        let prepared = self.prepare(ctx, groups)?;

        let limit = self.limiter();
        let pending = prepared
            .into_iter()
            .map(|(group, capability)| {
                let mut entries = group.items;
                entries.sort_by(|a, b| {
                    b.created_at
                        .cmp(&a.created_at)
                        .then_with(|| b.id.cmp(&a.id))
                });
                let summary = GroupSummary {
                    plugin_id: group.plugin.id,
                    plugin_name: group.plugin.name.clone(),
                    accounts: Vec::new(),
                    entries: entries.iter().map(|e| e.id).collect(),
                };
                let work = redact_entry_group(
                    self.repo.clone(),
                    capability,
                    entries,
                    mode,
                    summary.clone(),
                );
                self.dispatch(&limit, summary, work)
            })
            .collect();

        Ok(self.join(mode, pending).await)
    }

    /// Authorize every group, then build every capability. Nothing has been
    /// sent to any plugin if this fails.
    fn prepare<T>(
        &self,
        ctx: &AuthContext,
        groups: Vec<PluginGroup<T>>,
    ) -> Result<Vec<(PluginGroup<T>, Box<dyn Capability>)>, RedactError> {
        for group in &groups {
            if let Err(err) = ctx.require_access(group.plugin.id) {
                tracing::warn!(
                    plugin_id = %group.plugin.id,
                    token_id = ?ctx.token_id(),
                    error = %err,
                    "Redaction rejected"
                );
                return Err(err.into());
            }
        }

        groups
            .into_iter()
            .map(|group| match self.registry.instantiate(&group.plugin) {
                Ok(capability) => Ok((group, capability)),
                Err(source) => Err(RedactError::Plugin {
                    plugin_id: group.plugin.id,
                    source,
                }),
            })
            .collect()
    }

    fn limiter(&self) -> Arc<Semaphore> {
        Arc::new(Semaphore::new(self.options.max_concurrent_groups.max(1)))
    }

    /// Run one group as its own task, under the call's concurrency limit and
    /// the group deadline.
    fn dispatch<F>(&self, limit: &Arc<Semaphore>, summary: GroupSummary, work: F) -> Pending
    where
        F: Future<Output = GroupOutcome> + Send + 'static,
    {
        let limit = limit.clone();
        let deadline = self.options.group_timeout;
        let span = tracing::info_span!(
            "redact_group",
            plugin_id = %summary.plugin_id,
            plugin = %summary.plugin_name
        );
        let group = summary.clone();

        let handle = tokio::spawn(
            async move {
                // The semaphore is never closed.
                let _permit = limit.acquire_owned().await.ok();
                match deadline {
                    Some(deadline) => match tokio::time::timeout(deadline, work).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(failed(
                            group,
                            FailureStage::Timeout,
                            format!("no result within {}s", deadline.as_secs_f64()),
                        )),
                    },
                    None => work.await,
                }
            }
            .instrument(span),
        );

        Pending { summary, handle }
    }

    async fn join(&self, mode: RedactionMode, pending: Vec<Pending>) -> RedactionReport {
        let mut report = RedactionReport::new(mode);
        for Pending { summary, handle } in pending {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(err) => Err(failed(summary, FailureStage::Aborted, err)),
            };

            match &outcome {
                Ok(group) => {
                    tracing::info!(
                        plugin_id = %group.plugin_id,
                        accounts = group.accounts.len(),
                        entries = group.entries.len(),
                        "Plugin group redacted"
                    );
                    self.record_group("succeeded");
                }
                Err(failure) => {
                    tracing::warn!(
                        plugin_id = %failure.group.plugin_id,
                        stage = failure.stage.as_str(),
                        error = %failure.error,
                        "Plugin group failed"
                    );
                    self.record_group(failure.stage.as_str());
                }
            }
            report.push(outcome);
        }
        report.sort();
        report
    }

    fn record_group(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_group(outcome);
        }
    }

    fn finish(
        &self,
        entry_point: EntryPoint,
        result: Result<RedactionReport, RedactError>,
    ) -> Result<RedactionReport, RedactError> {
        let label = match &result {
            Ok(report) if report.is_complete() => "ok",
            Ok(_) => "partial",
            Err(err) if err.is_rejection() => "rejected",
            Err(err) => {
                tracing::error!(entry_point = entry_point.as_str(), error = %err, "Redaction failed");
                "error"
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_call(entry_point.as_str(), label);
        }
        result
    }
}

impl std::fmt::Debug for Redactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redactor")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn failed(group: GroupSummary, stage: FailureStage, error: impl Display) -> GroupFailure {
    GroupFailure {
        group,
        stage,
        error: format!("{error:#}"),
    }
}

/// Entries first, then accounts, then the local rows in one transaction.
/// A failed entries call skips the accounts call.
async fn redact_account_group(
    repo: Arc<dyn Repository>,
    capability: Box<dyn Capability>,
    accounts: Vec<Account>,
    entries: Vec<LogEntry>,
    mode: RedactionMode,
    summary: GroupSummary,
) -> GroupOutcome {
    if !entries.is_empty() {
        let locations: Vec<_> = entries.iter().map(|e| e.native_location.clone()).collect();
        if let Err(err) = capability.redact_entries(&locations, mode).await {
            return Err(failed(summary, FailureStage::Entries, err));
        }
    }

    let native_ids: Vec<_> = accounts.iter().map(|a| a.native_id.clone()).collect();
    if let Err(err) = capability.redact_accounts(&native_ids, mode).await {
        return Err(failed(summary, FailureStage::Accounts, err));
    }

    if let Err(err) = repo.delete_rows(&summary.entries, &summary.accounts).await {
        return Err(failed(summary, FailureStage::Cleanup, err));
    }
    Ok(summary)
}

/// `entries` must already be newest first.
async fn redact_entry_group(
    repo: Arc<dyn Repository>,
    capability: Box<dyn Capability>,
    entries: Vec<LogEntry>,
    mode: RedactionMode,
    summary: GroupSummary,
) -> GroupOutcome {
    let locations: Vec<_> = entries.iter().map(|e| e.native_location.clone()).collect();
    if let Err(err) = capability.redact_entries(&locations, mode).await {
        return Err(failed(summary, FailureStage::Entries, err));
    }

    if let Err(err) = repo.delete_rows(&summary.entries, &[]).await {
        return Err(failed(summary, FailureStage::Cleanup, err));
    }
    Ok(summary)
}
