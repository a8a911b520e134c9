//! Status conditions and phase

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use k8s_openapi::chrono::Utc;
use std::fmt;

use super::GitLabAdapter;

pub const PHASE_PREPARING: &str = "Preparing";
pub const PHASE_RUNNING: &str = "Running";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionType {
    Initialized,
    Upgrading,
    Available,
}

impl ConditionType {
    pub fn name(&self) -> &'static str {
        match self {
            ConditionType::Initialized => "Initialized",
            ConditionType::Upgrading => "Upgrading",
            ConditionType::Available => "Available",
        }
    }

    /// A condition of this type, stamped with the current time
    pub fn with_status(&self, status: bool, reason: &str, message: impl Into<String>) -> Condition {
        Condition {
            type_: self.name().to_string(),
            status: if status { "True" } else { "False" }.to_string(),
            reason: reason.to_string(),
            message: message.into(),
            last_transition_time: Time(Utc::now()),
            observed_generation: None,
        }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl GitLabAdapter {
    /// Merge a condition into the status
    ///
    /// `Available=True` moves the phase to `Running`; any other condition type
    /// moves it to `Preparing`.
    pub fn set_condition(&mut self, mut condition: Condition) {
        condition.observed_generation = self.resource.metadata.generation;

        let status = self.resource.status.get_or_insert_with(Default::default);
        if condition.type_ == ConditionType::Available.name() {
            if condition.status == "True" {
                status.phase = PHASE_RUNNING.to_string();
            }
        } else {
            status.phase = PHASE_PREPARING.to_string();
        }

        set_status_condition(&mut status.conditions, condition);
    }

    /// Record the desired version as the deployed one
    pub fn record_version(&mut self) {
        let version = self.desired_version().to_string();
        self.resource.status.get_or_insert_with(Default::default).version = version;
    }
}

/// Insert or update the condition of the same type
///
/// The transition time only moves when the status changes.
fn set_status_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.status != condition.status {
                existing.status = condition.status;
                existing.last_transition_time = condition.last_transition_time;
            }
            existing.reason = condition.reason;
            existing.message = condition.message;
            existing.observed_generation = condition.observed_generation;
        }
        None => conditions.push(condition),
    }
}
