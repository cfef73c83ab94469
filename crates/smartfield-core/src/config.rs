//! Provider/task configuration store.
//!
//! Configuration is loaded once at bootstrap from a directory holding an
//! index document (`configs.json`) and one file per configured provider:
//!
//! ```json
//! // configs.json
//! { "OPAI": { "configs": "openai.json" }, "STBAI": {} }
//!
//! // openai.json
//! { "default": { "model": "gpt-3.5-turbo",
//!                "tasks": { "translate": { "system": "...", "user": "...",
//!                                          "result_format_rules": "...",
//!                                          "default_result_key": "..." } } } }
//! ```
//!
//! Each top-level entry of a provider file becomes one [`ProviderConfig`].
//! Templates are looked up by `(provider, task name)`, so a task name may be
//! declared by at most one configuration per provider.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{ConfigError, Provider};

/// Name of the index document inside a configuration directory.
pub const INDEX_FILE: &str = "configs.json";

/// Prompt templates and result rules for one task under one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskTemplate {
    pub model: String,
    pub system: String,
    pub user: String,
    /// Appended verbatim to every rendered system prompt.
    pub result_format_rules: String,
    /// Substring marking a placeholder/refusal answer.
    pub default_result_key: String,
}

/// A named group of task templates under one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderConfig {
    pub name: String,
    pub provider: Provider,
    pub model: String,
    pub tasks: BTreeMap<String, TaskTemplate>,
}

// ── File formats ──

#[derive(Deserialize)]
struct IndexEntry {
    #[serde(default)]
    configs: Option<String>,
}

#[derive(Deserialize)]
struct ConfigEntry {
    model: String,
    tasks: BTreeMap<String, TaskEntry>,
}

#[derive(Deserialize)]
struct TaskEntry {
    system: String,
    user: String,
    #[serde(default)]
    result_format_rules: String,
    #[serde(default)]
    default_result_key: String,
}

/// Parse one provider configuration file into its [`ProviderConfig`]s.
///
/// Entries are returned in key order. `path` is only used in error messages.
pub fn parse_provider_file(
    provider: Provider,
    json: &str,
    path: &Path,
) -> Result<Vec<ProviderConfig>, ConfigError> {
    let entries: BTreeMap<String, ConfigEntry> =
        serde_json::from_str(json).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(entries
        .into_iter()
        .map(|(key, entry)| {
            let tasks = entry
                .tasks
                .into_iter()
                .map(|(task, t)| {
                    let template = TaskTemplate {
                        model: entry.model.clone(),
                        system: t.system,
                        user: t.user,
                        result_format_rules: t.result_format_rules,
                        default_result_key: t.default_result_key,
                    };
                    (task, template)
                })
                .collect();
            ProviderConfig {
                name: format!("{key}-{}", provider.display_name()),
                provider,
                model: entry.model,
                tasks,
            }
        })
        .collect())
}

// ── Store ──

/// Read-only (after bootstrap) store of provider configurations.
///
/// Share it as `Arc<ConfigStore>`; lookups need no locking.
#[derive(Debug, Default)]
pub struct ConfigStore {
    configs: Vec<ProviderConfig>,
    /// `(provider, task)` → index into `configs`.
    index: HashMap<(Provider, String), usize>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every provider configuration referenced by `<dir>/configs.json`.
    pub fn load_dir(dir: &Path) -> Result<Self, ConfigError> {
        let index_path = dir.join(INDEX_FILE);
        let index_json = read_file(&index_path)?;
        let index: BTreeMap<String, IndexEntry> =
            serde_json::from_str(&index_json).map_err(|source| ConfigError::Json {
                path: index_path.clone(),
                source,
            })?;

        let mut files: BTreeMap<Provider, PathBuf> = BTreeMap::new();
        for (code, entry) in index {
            let provider: Provider = code
                .parse()
                .map_err(|_| ConfigError::UnknownProvider(code.clone()))?;
            match entry.configs {
                Some(file) => {
                    files.insert(provider, dir.join(file));
                }
                None => debug!(%provider, "no configuration file listed, skipping"),
            }
        }

        let mut store = Self::new();
        for (provider, path) in files {
            let json = read_file(&path)?;
            for config in parse_provider_file(provider, &json, &path)? {
                store.insert(config)?;
            }
        }

        info!(
            dir = %dir.display(),
            configs = store.configs.len(),
            templates = store.index.len(),
            "loaded provider configurations"
        );
        Ok(store)
    }

    /// Add a provider configuration.
    ///
    /// Rejected as a whole if any of its tasks is already declared for the
    /// same provider.
    pub fn insert(&mut self, config: ProviderConfig) -> Result<(), ConfigError> {
        for task in config.tasks.keys() {
            if let Some(&existing) = self.index.get(&(config.provider, task.clone())) {
                return Err(ConfigError::DuplicateTask {
                    provider: config.provider,
                    task: task.clone(),
                    existing: self.configs[existing].name.clone(),
                    incoming: config.name.clone(),
                });
            }
        }

        let slot = self.configs.len();
        for task in config.tasks.keys() {
            self.index.insert((config.provider, task.clone()), slot);
        }
        debug!(name = %config.name, provider = %config.provider, "registered provider configuration");
        self.configs.push(config);
        Ok(())
    }

    /// Template bundle for `task` under `provider`.
    pub fn resolve(&self, task: &str, provider: Provider) -> Result<&TaskTemplate, ConfigError> {
        self.index
            .get(&(provider, task.to_string()))
            .and_then(|&slot| self.configs[slot].tasks.get(task))
            .ok_or_else(|| ConfigError::ConfigNotFound {
                provider,
                task: task.to_string(),
            })
    }

    /// All configurations, in registration order.
    pub fn provider_configs(&self) -> &[ProviderConfig] {
        &self.configs
    }

    /// Task names resolvable for `provider`, sorted.
    pub fn tasks_for(&self, provider: Provider) -> Vec<&str> {
        let mut tasks: Vec<&str> = self
            .index
            .keys()
            .filter(|(p, _)| *p == provider)
            .map(|(_, t)| t.as_str())
            .collect();
        tasks.sort_unstable();
        tasks
    }

    /// Number of provider configurations.
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
