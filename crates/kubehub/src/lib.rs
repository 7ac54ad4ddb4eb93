//! crdready kubehub – read access to CustomResourceDefinitions.
//!
//! [`DefinitionStore`] is the only seam the poller depends on. The kube-backed
//! implementation talks to the API server; [`MemoryStore`] serves scripted
//! snapshots for tests and offline runs.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::anyhow;
use crdready_core::{Condition, ConditionStatus, ConditionType, DefinitionStatus, ResourceDefinition};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1 as apiextv1;
use kube::{Api, Client};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not_found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Fetches the current snapshot of a definition by name.
#[async_trait::async_trait]
pub trait DefinitionStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<ResourceDefinition, StoreError>;
}

#[async_trait::async_trait]
impl<S: DefinitionStore + ?Sized> DefinitionStore for std::sync::Arc<S> {
    async fn get(&self, name: &str) -> Result<ResourceDefinition, StoreError> {
        (**self).get(name).await
    }
}

/// Store backed by the cluster's `apiextensions.k8s.io/v1` API.
#[derive(Clone)]
pub struct KubeDefinitionStore {
    api: Api<apiextv1::CustomResourceDefinition>,
}

impl KubeDefinitionStore {
    pub fn new(client: Client) -> Self {
        Self { api: Api::all(client) }
    }

    /// Build a client from the ambient kubeconfig / in-cluster config.
    pub async fn try_default() -> anyhow::Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }
}

#[async_trait::async_trait]
impl DefinitionStore for KubeDefinitionStore {
    async fn get(&self, name: &str) -> Result<ResourceDefinition, StoreError> {
        debug!(crd = %name, "fetching CustomResourceDefinition");
        match self.api.get(name).await {
            Ok(crd) => Ok(definition_from(&crd)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(StoreError::NotFound(name.to_string())),
            Err(e) => Err(StoreError::Backend(anyhow!(e))),
        }
    }
}

fn condition_from(c: &apiextv1::CustomResourceDefinitionCondition) -> Option<Condition> {
    let Some(type_) = ConditionType::from_wire(&c.type_) else {
        debug!(condition = %c.type_, "skipping untracked condition type");
        return None;
    };
    Some(Condition {
        type_,
        status: ConditionStatus::from_wire(&c.status),
        reason: c.reason.clone().unwrap_or_default(),
        message: c.message.clone().unwrap_or_default(),
        last_transition_time: c.last_transition_time.as_ref().map(|t| t.0),
    })
}

/// Shape a k8s-openapi CRD into the poller's snapshot type.
pub fn definition_from(crd: &apiextv1::CustomResourceDefinition) -> ResourceDefinition {
    let conditions: Vec<Condition> = crd
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|cs| cs.iter().filter_map(condition_from).collect())
        .unwrap_or_default();
    ResourceDefinition {
        name: crd.metadata.name.clone().unwrap_or_default(),
        finalizers: crd.metadata.finalizers.clone().unwrap_or_default(),
        status: DefinitionStatus { conditions },
    }
}

#[derive(Default)]
struct Scripted {
    snapshots: Vec<ResourceDefinition>,
    failure: Option<String>,
    fetches: u32,
}

/// In-memory store. Each name holds a script of snapshots; every fetch
/// advances one step and the last snapshot repeats forever.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Scripted>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `def` on every fetch of its name.
    pub fn insert(&self, def: ResourceDefinition) {
        let name = def.name.clone();
        self.script(&name, vec![def]);
    }

    /// Serve `snapshots` in order on successive fetches of `name`.
    pub fn script(&self, name: &str, snapshots: Vec<ResourceDefinition>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.entry(name.to_string()).or_default();
        entry.snapshots = snapshots;
        entry.failure = None;
    }

    /// Make every fetch of `name` fail with a backend error.
    pub fn fail(&self, name: &str, message: impl Into<String>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.entry(name.to_string()).or_default().failure = Some(message.into());
    }

    /// Number of fetches served (or refused) for `name`.
    pub fn fetches(&self, name: &str) -> u32 {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(name).map(|e| e.fetches).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl DefinitionStore for MemoryStore {
    async fn get(&self, name: &str) -> Result<ResourceDefinition, StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.entry(name.to_string()).or_default();
        let step = entry.fetches as usize;
        entry.fetches = entry.fetches.saturating_add(1);
        if let Some(msg) = &entry.failure {
            return Err(StoreError::Backend(anyhow!(msg.clone())));
        }
        match entry.snapshots.len() {
            0 => Err(StoreError::NotFound(name.to_string())),
            n => Ok(entry.snapshots[step.min(n - 1)].clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};

    fn crd_condition(type_: &str, status: &str, reason: Option<&str>) -> apiextv1::CustomResourceDefinitionCondition {
        apiextv1::CustomResourceDefinitionCondition {
            type_: type_.to_string(),
            status: status.to_string(),
            reason: reason.map(|s| s.to_string()),
            message: None,
            last_transition_time: Some(Time(Utc.timestamp_opt(1_600_000_000, 0).single().expect("ts"))),
        }
    }

    #[test]
    fn converts_conditions_and_finalizers() {
        let crd = apiextv1::CustomResourceDefinition {
            metadata: ObjectMeta {
                name: Some("foos.bar.io".to_string()),
                finalizers: Some(vec!["customresourcecleanup.apiextensions.k8s.io".to_string()]),
                ..Default::default()
            },
            status: Some(apiextv1::CustomResourceDefinitionStatus {
                conditions: Some(vec![
                    crd_condition("NamesAccepted", "True", Some("NoConflicts")),
                    crd_condition("SomethingNew", "True", None),
                    crd_condition("Established", "Maybe", Some("Installing")),
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let def = definition_from(&crd);
        assert_eq!(def.name, "foos.bar.io");
        assert!(def.has_finalizer("customresourcecleanup.apiextensions.k8s.io"));
        assert_eq!(def.status.conditions.len(), 2, "untracked type dropped");
        assert!(def.is_condition_true(ConditionType::NamesAccepted));
        let est = def.condition(ConditionType::Established).expect("established present");
        assert_eq!(est.status, ConditionStatus::Unknown);
        assert_eq!(est.reason, "Installing");
        assert_eq!(est.message, "");
        assert_eq!(est.last_transition_time.map(|t| t.timestamp()), Some(1_600_000_000));
    }

    #[test]
    fn converts_missing_status_to_empty() {
        let crd = apiextv1::CustomResourceDefinition {
            metadata: ObjectMeta { name: Some("bars.foo.io".to_string()), ..Default::default() },
            ..Default::default()
        };
        let def = definition_from(&crd);
        assert!(def.status.conditions.is_empty());
        assert!(def.finalizers.is_empty());
    }

    #[tokio::test]
    async fn memory_store_walks_script_and_counts() {
        let store = MemoryStore::new();
        let pending = ResourceDefinition::named("foos.bar.io");
        let ready = ResourceDefinition::named("foos.bar.io").with_condition(Condition::new(
            ConditionType::Established,
            ConditionStatus::True,
            "InitialNamesAccepted",
            "",
        ));
        store.script("foos.bar.io", vec![pending.clone(), ready.clone()]);

        assert_eq!(store.get("foos.bar.io").await.expect("first"), pending);
        assert_eq!(store.get("foos.bar.io").await.expect("second"), ready);
        assert_eq!(store.get("foos.bar.io").await.expect("sticky"), ready);
        assert_eq!(store.fetches("foos.bar.io"), 3);
    }

    #[tokio::test]
    async fn memory_store_reports_missing_and_failures() {
        let store = MemoryStore::new();
        let err = store.get("nope.example.io").await.expect_err("missing");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "not_found: nope.example.io");

        store.fail("foos.bar.io", "connection refused");
        let err = store.get("foos.bar.io").await.expect_err("failing");
        assert!(!err.is_not_found());
        assert_eq!(err.to_string(), "connection refused");
        assert_eq!(store.fetches("foos.bar.io"), 1);
    }
}
