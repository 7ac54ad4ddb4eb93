//! Status condition ledger.
//!
//! Invariant: a definition never carries two conditions of the same type.
//! Every mutation goes through [`ResourceDefinition::set_condition`] or
//! [`ResourceDefinition::remove_condition`], which keep it that way.

use chrono::Utc;

use crate::{Condition, ConditionStatus, ConditionType, ResourceDefinition};

impl ResourceDefinition {
    /// The condition of the given type, if reported.
    pub fn condition(&self, type_: ConditionType) -> Option<&Condition> {
        self.status.conditions.iter().find(|c| c.type_ == type_)
    }

    fn condition_mut(&mut self, type_: ConditionType) -> Option<&mut Condition> {
        self.status.conditions.iter_mut().find(|c| c.type_ == type_)
    }

    /// Insert or update a condition.
    ///
    /// A new type is appended and stamped with the current time. For an
    /// existing type the status and transition time only move when the
    /// status actually changes; reason and message are always refreshed.
    pub fn set_condition(&mut self, mut new: Condition) {
        let Some(existing) = self.condition_mut(new.type_) else {
            new.last_transition_time = Some(Utc::now());
            self.status.conditions.push(new);
            return;
        };

        if existing.status != new.status {
            existing.status = new.status;
            existing.last_transition_time = new.last_transition_time;
        }
        existing.reason = new.reason;
        existing.message = new.message;
    }

    /// Drop the condition of the given type, keeping the others in order.
    pub fn remove_condition(&mut self, type_: ConditionType) {
        self.status.conditions.retain(|c| c.type_ != type_);
    }

    /// Present and exactly `status`.
    pub fn is_condition_present_and_equal(&self, type_: ConditionType, status: ConditionStatus) -> bool {
        self.condition(type_).is_some_and(|c| c.status == status)
    }

    pub fn is_condition_true(&self, type_: ConditionType) -> bool {
        self.is_condition_present_and_equal(type_, ConditionStatus::True)
    }

    pub fn is_condition_false(&self, type_: ConditionType) -> bool {
        self.is_condition_present_and_equal(type_, ConditionStatus::False)
    }
}

/// Compare two optional conditions ignoring `last_transition_time`.
///
/// Two absent conditions are equivalent; absent vs present never is.
pub fn conditions_equivalent(lhs: Option<&Condition>, rhs: Option<&Condition>) -> bool {
    match (lhs, rhs) {
        (None, None) => true,
        (Some(l), Some(r)) => l.type_ == r.type_ && l.status == r.status && l.reason == r.reason && l.message == r.message,
        _ => false,
    }
}
