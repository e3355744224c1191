//! Structured outcome of a redaction call.

use serde::Serialize;

use crate::model::{AccountId, LogEntryId, PluginId, RedactionMode};

/// The rows one plugin group covered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub plugin_id: PluginId,
    pub plugin_name: String,
    pub accounts: Vec<AccountId>,
    pub entries: Vec<LogEntryId>,
}

/// Where a group stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// The plugin's `redact_entries` call.
    Entries,
    /// The plugin's `redact_accounts` call.
    Accounts,
    /// Deleting the group's rows after the plugin succeeded.
    Cleanup,
    /// The group did not finish within the configured timeout.
    Timeout,
    /// The group's task panicked.
    Aborted,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entries => "entries",
            Self::Accounts => "accounts",
            Self::Cleanup => "cleanup",
            Self::Timeout => "timeout",
            Self::Aborted => "aborted",
        }
    }

    /// Whether the plugin may already have applied the redaction.
    pub fn plugin_may_have_applied(&self) -> bool {
        matches!(self, Self::Accounts | Self::Cleanup | Self::Timeout | Self::Aborted)
    }
}

/// A group whose rows were left in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupFailure {
    #[serde(flatten)]
    pub group: GroupSummary,
    pub stage: FailureStage,
    pub error: String,
}

/// Per-group results of one redaction call. Not atomic across groups:
/// everything in `succeeded` has been applied and its rows deleted,
/// nothing in `failed` has had rows deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionReport {
    pub mode: RedactionMode,
    pub succeeded: Vec<GroupSummary>,
    pub failed: Vec<GroupFailure>,
}

impl RedactionReport {
    pub fn new(mode: RedactionMode) -> Self {
        Self {
            mode,
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn push(&mut self, outcome: Result<GroupSummary, GroupFailure>) {
        match outcome {
            Ok(summary) => self.succeeded.push(summary),
            Err(failure) => self.failed.push(failure),
        }
    }

    /// Order groups by plugin name so reports are stable.
    pub(crate) fn sort(&mut self) {
        self.succeeded
            .sort_by(|a, b| (&a.plugin_name, a.plugin_id).cmp(&(&b.plugin_name, b.plugin_id)));
        self.failed.sort_by(|a, b| {
            (&a.group.plugin_name, a.group.plugin_id)
                .cmp(&(&b.group.plugin_name, b.group.plugin_id))
        });
    }

    pub fn redacted_accounts(&self) -> impl Iterator<Item = AccountId> + '_ {
        self.succeeded.iter().flat_map(|g| g.accounts.iter().copied())
    }

    pub fn redacted_entries(&self) -> impl Iterator<Item = LogEntryId> + '_ {
        self.succeeded.iter().flat_map(|g| g.entries.iter().copied())
    }

    /// Human-readable one-liner for API responses.
    pub fn message(&self, what: &str) -> String {
        if self.is_complete() {
            format!("{what} were redacted successfully.")
        } else {
            format!(
                "{what} were only partially redacted: {} of {} plugin groups failed.",
                self.failed.len(),
                self.failed.len() + self.succeeded.len()
            )
        }
    }
}
