// EnrolSift - app/repository.rs
//
// Saved filter configurations: named `FilterState` snapshots scoped by owner.
//
// Store layout:
//   /<ownerNamespace>/<ownerId>/savedFilterConfigs/<datasetKey>/<configId>
//       -> { name, timestamp, filters }
//   /<ownerDirectory>/<ownerId> -> display name
//
// Ownership is structural: every write and delete path is built from the
// caller's own id, so a caller can never touch another owner's node. Shared
// (team-wide) visibility is read-only and applies to every configuration;
// there is no per-item sharing flag.

use crate::app::store::{is_valid_segment, Backend, StorePath, Subscription};
use crate::core::filter::FilterState;
use crate::core::snapshot::FilterSnapshot;
use crate::util::constants::{
    DEFAULT_DATASET_KEY, DEFAULT_OWNER_DIRECTORY, DEFAULT_OWNER_NAMESPACE, MAX_CONFIG_NAME_CHARS,
    SAVED_CONFIGS_SEGMENT,
};
use crate::util::error::{PersistenceError, RepositoryError, ValidationError};
use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

// =============================================================================
// Types
// =============================================================================

/// A persisted, named filter snapshot with owner attribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedConfiguration {
    pub id: String,
    pub name: String,

    /// Save time in epoch milliseconds.
    pub timestamp: i64,

    pub filters: FilterSnapshot,

    /// Owner id.
    pub owner: String,

    /// Owner's display name from the owner directory, when known.
    pub owner_name: Option<String>,

    /// True when listed for its owner; false in shared listings.
    pub is_owner: bool,
}

/// The node stored under each configuration id.
#[derive(Debug, Serialize, Deserialize)]
struct StoredConfig {
    name: String,
    timestamp: i64,
    #[serde(default)]
    filters: FilterSnapshot,
}

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,

    /// The caller does not own a configuration with that id. Nothing changed.
    NotOwned,
}

/// Names of the store nodes the repository reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    pub owner_namespace: String,
    pub dataset_key: String,
    pub owner_directory: String,
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self {
            owner_namespace: DEFAULT_OWNER_NAMESPACE.to_string(),
            dataset_key: DEFAULT_DATASET_KEY.to_string(),
            owner_directory: DEFAULT_OWNER_DIRECTORY.to_string(),
        }
    }
}

impl StoreLayout {
    fn configs_path(&self, owner_id: &str) -> Result<StorePath, PersistenceError> {
        StorePath::root()
            .child(&self.owner_namespace)?
            .child(owner_id)?
            .child(SAVED_CONFIGS_SEGMENT)?
            .child(&self.dataset_key)
    }

    fn directory_path(&self) -> Result<StorePath, PersistenceError> {
        StorePath::root().child(&self.owner_directory)
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Persists and retrieves saved configurations through a `Backend`.
pub struct ConfigRepository {
    backend: Arc<dyn Backend>,
    layout: StoreLayout,
}

impl ConfigRepository {
    pub fn new(backend: Arc<dyn Backend>, layout: StoreLayout) -> Self {
        Self { backend, layout }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Configurations owned by `owner_id`, newest first.
    pub fn list(&self, owner_id: &str) -> Result<Vec<SavedConfiguration>, RepositoryError> {
        let owner_id = validate_id("owner id", owner_id)?;
        Ok(self.list_for(owner_id, None, true)?)
    }

    /// Configurations of every other team member, newest first.
    ///
    /// Members come from the owner directory and are fetched in parallel.
    /// A member whose listing fails is skipped; only when every fetch fails
    /// is an error returned.
    pub fn list_shared(
        &self,
        exclude_owner_id: &str,
    ) -> Result<Vec<SavedConfiguration>, RepositoryError> {
        let members: Vec<(String, String)> = self
            .members()?
            .into_iter()
            .filter(|(id, _)| id != exclude_owner_id)
            .collect();

        if members.is_empty() {
            return Ok(Vec::new());
        }

        let results: Vec<(String, Result<Vec<SavedConfiguration>, PersistenceError>)> = members
            .par_iter()
            .map(|(id, name)| (id.clone(), self.list_for(id, Some(name.as_str()), false)))
            .collect();

        let mut shared = Vec::new();
        let mut failures = 0usize;
        let mut last_error = None;
        for (member, result) in results {
            match result {
                Ok(configs) => shared.extend(configs),
                Err(e) => {
                    tracing::warn!(
                        member = %member,
                        error = %e,
                        "Skipping member in shared listing"
                    );
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        if let Some(last) = last_error {
            if failures == members.len() {
                return Err(RepositoryError::SharedListingFailed {
                    members: members.len(),
                    last,
                });
            }
        }

        sort_newest_first(&mut shared);
        tracing::debug!(
            members = members.len(),
            failed = failures,
            configs = shared.len(),
            "Shared configurations listed"
        );
        Ok(shared)
    }

    /// Save `state` under `name` for `owner_id`. Returns the new id.
    ///
    /// The name is trimmed; an empty or over-long name is rejected before any
    /// backend call. The owner's namespace is created on first use.
    pub fn save(
        &self,
        owner_id: &str,
        name: &str,
        state: &FilterState,
    ) -> Result<String, RepositoryError> {
        let name = validate_name(name)?;
        let owner_id = validate_id("owner id", owner_id)?;

        let configs = self.layout.configs_path(owner_id)?;
        self.ensure_namespace(&configs)?;

        let id = Uuid::now_v7().to_string();
        let stored = StoredConfig {
            name: name.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            filters: FilterSnapshot::from(state),
        };
        let value = serde_json::to_value(&stored).map_err(|e| PersistenceError::Unavailable {
            path: configs.to_string(),
            operation: "serialise",
            reason: e.to_string(),
        })?;
        self.backend.write(&configs.child(&id)?, value)?;

        tracing::info!(
            owner = %owner_id,
            config_id = %id,
            active_facets = state.active_count(),
            "Filter configuration saved"
        );
        Ok(id)
    }

    /// Delete one of the caller's configurations.
    ///
    /// The id is resolved inside the caller's own namespace, so an id
    /// belonging to anyone else is a silent no-op.
    pub fn delete(
        &self,
        caller_id: &str,
        config_id: &str,
    ) -> Result<DeleteOutcome, RepositoryError> {
        let caller_id = validate_id("owner id", caller_id)?;
        if !is_valid_segment(config_id) {
            return Ok(DeleteOutcome::NotOwned);
        }
        let path = self.layout.configs_path(caller_id)?.child(config_id)?;

        if self.backend.read(&path)?.is_none() {
            tracing::debug!(
                caller = %caller_id,
                config_id = %config_id,
                "Delete denied: not owned"
            );
            return Ok(DeleteOutcome::NotOwned);
        }

        self.backend.delete(&path)?;
        tracing::info!(owner = %caller_id, config_id = %config_id, "Filter configuration deleted");
        Ok(DeleteOutcome::Deleted)
    }

    /// Delete a listed configuration, refusing up front when it is not the
    /// caller's.
    pub fn delete_saved(
        &self,
        caller_id: &str,
        config: &SavedConfiguration,
    ) -> Result<DeleteOutcome, RepositoryError> {
        if config.owner != caller_id {
            tracing::debug!(
                caller = %caller_id,
                owner = %config.owner,
                config_id = %config.id,
                "Delete denied: caller is not the owner"
            );
            return Ok(DeleteOutcome::NotOwned);
        }
        self.delete(caller_id, &config.id)
    }

    /// Find a configuration visible to `caller_id`: their own first, then
    /// the team's.
    pub fn find(
        &self,
        caller_id: &str,
        config_id: &str,
    ) -> Result<SavedConfiguration, RepositoryError> {
        if let Some(config) = self.list(caller_id)?.into_iter().find(|c| c.id == config_id) {
            return Ok(config);
        }
        self.list_shared(caller_id)?
            .into_iter()
            .find(|c| c.id == config_id)
            .ok_or_else(|| RepositoryError::NotFound {
                id: config_id.to_string(),
            })
    }

    /// Rebuild the filter state of a saved configuration. Anyone may load
    /// any configuration they can see.
    pub fn load(&self, config: &SavedConfiguration) -> FilterState {
        config.filters.clone().into_state()
    }

    /// Push full snapshots of `owner_id`'s configurations to `on_change`:
    /// once immediately, then after every change. Drop or cancel the handle
    /// to stop.
    pub fn subscribe<F>(
        &self,
        owner_id: &str,
        on_change: F,
    ) -> Result<Subscription, RepositoryError>
    where
        F: Fn(Vec<SavedConfiguration>) + Send + Sync + 'static,
    {
        let owner_id = validate_id("owner id", owner_id)?.to_string();
        let path = self.layout.configs_path(&owner_id)?;
        let subscription = self.backend.subscribe(
            &path,
            Box::new(move |snapshot| on_change(parse_configs(&owner_id, None, true, snapshot))),
        )?;
        Ok(subscription)
    }

    /// Record `display_name` for `owner_id` in the owner directory.
    pub fn register_member(
        &self,
        owner_id: &str,
        display_name: &str,
    ) -> Result<(), RepositoryError> {
        let owner_id = validate_id("owner id", owner_id)?;
        let path = self.layout.directory_path()?.child(owner_id)?;
        self.backend
            .write(&path, Value::String(display_name.trim().to_string()))?;
        tracing::info!(owner = %owner_id, "Team member registered");
        Ok(())
    }

    /// Owner directory as `ownerId -> display name`.
    ///
    /// Entries may be a plain string or an object with `displayName`/`name`;
    /// anything else falls back to the id.
    pub fn members(&self) -> Result<BTreeMap<String, String>, RepositoryError> {
        let directory = self.backend.read(&self.layout.directory_path()?)?;
        let Some(Value::Object(entries)) = directory else {
            return Ok(BTreeMap::new());
        };
        Ok(entries
            .into_iter()
            .map(|(id, entry)| {
                let name = match &entry {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(o) => o
                        .get("displayName")
                        .or_else(|| o.get("name"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                }
                .unwrap_or_else(|| id.clone());
                (id, name)
            })
            .collect())
    }

    /// Create the owner's configuration node if it does not exist yet.
    fn ensure_namespace(&self, configs: &StorePath) -> Result<(), PersistenceError> {
        if self.backend.read(configs)?.is_none() {
            self.backend
                .write(configs, Value::Object(serde_json::Map::new()))?;
            tracing::info!(path = %configs, "Initialised saved configuration namespace");
        }
        Ok(())
    }

    fn list_for(
        &self,
        owner_id: &str,
        owner_name: Option<&str>,
        is_owner: bool,
    ) -> Result<Vec<SavedConfiguration>, PersistenceError> {
        let path = self.layout.configs_path(owner_id)?;
        let snapshot = self.backend.read(&path)?;
        Ok(parse_configs(owner_id, owner_name, is_owner, snapshot.as_ref()))
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Turn the node under a configs path into configurations, newest first.
/// Malformed entries are skipped with a warning.
fn parse_configs(
    owner_id: &str,
    owner_name: Option<&str>,
    is_owner: bool,
    snapshot: Option<&Value>,
) -> Vec<SavedConfiguration> {
    let Some(Value::Object(entries)) = snapshot else {
        return Vec::new();
    };

    let mut configs: Vec<SavedConfiguration> = entries
        .iter()
        .filter_map(|(id, node)| match StoredConfig::deserialize(node) {
            Ok(stored) => Some(SavedConfiguration {
                id: id.clone(),
                name: stored.name,
                timestamp: stored.timestamp,
                filters: stored.filters,
                owner: owner_id.to_string(),
                owner_name: owner_name.map(str::to_string),
                is_owner,
            }),
            Err(e) => {
                tracing::warn!(
                    owner = %owner_id,
                    config_id = %id,
                    error = %e,
                    "Skipping malformed saved configuration"
                );
                None
            }
        })
        .collect();

    sort_newest_first(&mut configs);
    configs
}

fn sort_newest_first(configs: &mut [SavedConfiguration]) {
    configs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
}

fn validate_name(name: &str) -> Result<&str, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    let length = name.chars().count();
    if length > MAX_CONFIG_NAME_CHARS {
        return Err(ValidationError::NameTooLong {
            length,
            max: MAX_CONFIG_NAME_CHARS,
        });
    }
    Ok(name)
}

fn validate_id<'a>(field: &'static str, id: &'a str) -> Result<&'a str, ValidationError> {
    if is_valid_segment(id) {
        Ok(id)
    } else {
        Err(ValidationError::InvalidIdentifier {
            field,
            value: id.to_string(),
        })
    }
}
