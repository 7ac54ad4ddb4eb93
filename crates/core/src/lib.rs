//! crdready core types: resource definitions and their status conditions.
//!
//! The types here are snapshots of what the cluster reports; nothing in this
//! crate talks to the network. Condition and finalizer editing lives in
//! [`conditions`] and [`finalizers`].

#![forbid(unsafe_code)]

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod conditions;
pub mod finalizers;

pub use conditions::conditions_equivalent;

/// Condition types reported on a CustomResourceDefinition status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConditionType {
    Established,
    NamesAccepted,
    NonStructuralSchema,
    Terminating,
    #[serde(rename = "KubernetesAPIApprovalPolicyConformant")]
    ApiApprovalPolicyConformant,
}

impl ConditionType {
    pub const ALL: [ConditionType; 5] = [
        ConditionType::Established,
        ConditionType::NamesAccepted,
        ConditionType::NonStructuralSchema,
        ConditionType::Terminating,
        ConditionType::ApiApprovalPolicyConformant,
    ];

    /// Wire name as it appears in `status.conditions[].type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::Established => "Established",
            ConditionType::NamesAccepted => "NamesAccepted",
            ConditionType::NonStructuralSchema => "NonStructuralSchema",
            ConditionType::Terminating => "Terminating",
            ConditionType::ApiApprovalPolicyConformant => "KubernetesAPIApprovalPolicyConformant",
        }
    }

    /// Parse a wire name; `None` for types this crate does not track.
    pub fn from_wire(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl ConditionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }

    /// Anything other than the exact strings "True"/"False" is `Unknown`.
    pub fn from_wire(s: &str) -> Self {
        match s {
            "True" => ConditionStatus::True,
            "False" => ConditionStatus::False,
            _ => ConditionStatus::Unknown,
        }
    }
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single typed status fact attached to a definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    pub fn new(type_: ConditionType, status: ConditionStatus, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self { type_, status, reason: reason.into(), message: message.into(), last_transition_time: None }
    }

    pub fn at(mut self, ts: DateTime<Utc>) -> Self {
        self.last_transition_time = Some(ts);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DefinitionStatus {
    /// At most one entry per [`ConditionType`]; maintained by [`ResourceDefinition::set_condition`].
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Snapshot of a CustomResourceDefinition as seen by the poller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    /// Cluster-unique name, `<plural>.<group>`.
    pub name: String,
    #[serde(default)]
    pub finalizers: Vec<String>,
    #[serde(default)]
    pub status: DefinitionStatus,
}

impl ResourceDefinition {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    /// Builder-style append; bypasses transition tracking so fixtures keep their timestamps.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.status.conditions.push(condition);
        self
    }

    pub fn with_finalizer(mut self, token: impl Into<String>) -> Self {
        self.add_finalizer(token);
        self
    }
}

pub mod prelude {
    pub use super::{Condition, ConditionStatus, ConditionType, DefinitionStatus, ResourceDefinition};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_type_wire_names_roundtrip() {
        for t in ConditionType::ALL {
            assert_eq!(ConditionType::from_wire(t.as_str()), Some(t));
        }
        assert_eq!(ConditionType::from_wire("Ready"), None);
    }

    #[test]
    fn status_from_wire_defaults_to_unknown() {
        assert_eq!(ConditionStatus::from_wire("True"), ConditionStatus::True);
        assert_eq!(ConditionStatus::from_wire("False"), ConditionStatus::False);
        assert_eq!(ConditionStatus::from_wire("true"), ConditionStatus::Unknown);
        assert_eq!(ConditionStatus::from_wire(""), ConditionStatus::Unknown);
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let def = ResourceDefinition::named("foos.bar.io").with_condition(Condition::new(
            ConditionType::ApiApprovalPolicyConformant,
            ConditionStatus::True,
            "ApprovedAnnotation",
            "approved in https://example.invalid/pr/1",
        ));
        let v = serde_json::to_value(&def).expect("serialize");
        assert_eq!(v["status"]["conditions"][0]["type"], "KubernetesAPIApprovalPolicyConformant");
        assert_eq!(v["status"]["conditions"][0]["status"], "True");
        assert!(v["status"]["conditions"][0].get("lastTransitionTime").is_none());
    }
}
