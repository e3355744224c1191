#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};

use redactor::auth::AuthContext;
use redactor::model::{
    Account, AccountId, LogEntry, PersonId, Plugin, PluginId, RedactionMode, TokenId,
};
use redactor::plugins::{Capability, CapabilityRegistry, PluginFactory, ValidationError};
use redactor::store::{NewLogEntry, Repository, SqliteRepository};
use redactor::{Redactor, RedactorOptions};

pub const MOCK_TYPE: &str = "Mock";

/// What a mock plugin saw, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    EntriesStarted { label: String, locations: Vec<Value> },
    EntriesDone { label: String },
    AccountsStarted { label: String, ids: Vec<Value> },
    AccountsDone { label: String },
}

impl Call {
    pub fn label(&self) -> &str {
        match self {
            Call::EntriesStarted { label, .. }
            | Call::EntriesDone { label }
            | Call::AccountsStarted { label, .. }
            | Call::AccountsDone { label } => label,
        }
    }
}

#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn push(&self, call: Call) {
        self.0.lock().push(call);
    }

    pub fn all(&self) -> Vec<Call> {
        self.0.lock().clone()
    }

    pub fn for_label(&self, label: &str) -> Vec<Call> {
        self.all()
            .into_iter()
            .filter(|c| c.label() == label)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct MockConfig {
    label: String,
    #[serde(default)]
    fail_entries: bool,
    #[serde(default)]
    fail_accounts: bool,
    #[serde(default)]
    delay_ms: u64,
}

pub struct MockFactory {
    pub calls: CallLog,
}

impl PluginFactory for MockFactory {
    fn type_name(&self) -> &'static str {
        MOCK_TYPE
    }

    fn validate_config(&self, config: &Value) -> Result<(), ValidationError> {
        serde_json::from_value::<MockConfig>(config.clone())?;
        Ok(())
    }

    fn instantiate(&self, config: &Value) -> Result<Box<dyn Capability>, ValidationError> {
        let config: MockConfig = serde_json::from_value(config.clone())?;
        Ok(Box::new(MockPlugin {
            config,
            calls: self.calls.clone(),
        }))
    }
}

struct MockPlugin {
    config: MockConfig,
    calls: CallLog,
}

#[async_trait]
impl Capability for MockPlugin {
    fn validate_native_id(&self, _id: &Value) -> Result<(), ValidationError> {
        Ok(())
    }

    fn validate_native_location(&self, _location: &Value) -> Result<(), ValidationError> {
        Ok(())
    }

    async fn redact_accounts(&self, native_ids: &[Value], _mode: RedactionMode) -> anyhow::Result<()> {
        let label = self.config.label.clone();
        self.calls.push(Call::AccountsStarted {
            label: label.clone(),
            ids: native_ids.to_vec(),
        });
        tokio::time::sleep(Duration::from_millis(self.config.delay_ms)).await;
        if self.config.fail_accounts {
            anyhow::bail!("{label} refused to redact accounts");
        }
        self.calls.push(Call::AccountsDone { label });
        Ok(())
    }

    async fn redact_entries(
        &self,
        native_locations: &[Value],
        _mode: RedactionMode,
    ) -> anyhow::Result<()> {
        let label = self.config.label.clone();
        self.calls.push(Call::EntriesStarted {
            label: label.clone(),
            locations: native_locations.to_vec(),
        });
        // Give a wrongly ordered accounts call a chance to overtake.
        tokio::time::sleep(Duration::from_millis(self.config.delay_ms.max(10))).await;
        if self.config.fail_entries {
            anyhow::bail!("{label} refused to redact entries");
        }
        self.calls.push(Call::EntriesDone { label });
        Ok(())
    }
}

pub struct Fixture {
    pub repo: Arc<SqliteRepository>,
    pub registry: Arc<CapabilityRegistry>,
    pub calls: CallLog,
    pub redactor: Redactor,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_options(RedactorOptions::default())
    }

    pub fn with_options(options: RedactorOptions) -> Self {
        let repo = Arc::new(SqliteRepository::in_memory().unwrap());
        let calls = CallLog::default();
        let registry = Arc::new(CapabilityRegistry::with_builtins());
        registry.register(Arc::new(MockFactory {
            calls: calls.clone(),
        }));
        let redactor = Redactor::new(repo.clone(), registry.clone(), options);
        Self {
            repo,
            registry,
            calls,
            redactor,
        }
    }

    /// A mock plugin. `extra` is merged into its config.
    pub async fn plugin(&self, label: &str, extra: Value) -> Plugin {
        let mut config = json!({ "label": label });
        if let (Some(config), Value::Object(extra)) = (config.as_object_mut(), extra) {
            config.extend(extra);
        }
        let plugin = Plugin {
            id: PluginId::new(),
            plugin_type: MOCK_TYPE.to_string(),
            name: label.to_string(),
            config,
        };
        self.repo.insert_plugin(&plugin).await.unwrap();
        plugin
    }

    pub async fn account(&self, plugin: &Plugin, person: PersonId, native_id: &str) -> Account {
        let account = Account {
            id: AccountId::new(),
            person_id: person,
            plugin_id: plugin.id,
            native_id: json!(native_id),
        };
        self.repo.insert_account(&account).await.unwrap();
        account
    }

    pub async fn entry(&self, account: &Account, location: i64) -> LogEntry {
        self.repo
            .insert_log_entry(NewLogEntry {
                account_id: account.id,
                native_location: json!(location),
            })
            .await
            .unwrap()
    }

    pub async fn account_exists(&self, id: AccountId) -> bool {
        self.repo.get_account(id).await.unwrap().is_some()
    }

    pub async fn entry_count(&self, account: AccountId) -> usize {
        self.repo
            .log_entries_for_accounts(&[account])
            .await
            .unwrap()
            .len()
    }
}

/// An authenticated context granted exactly `plugins`.
pub fn granted(plugins: &[&Plugin]) -> AuthContext {
    AuthContext::authenticated(TokenId::new(), plugins.iter().map(|p| p.id))
}
