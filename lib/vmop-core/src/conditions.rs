//! Condition helpers for resources implementing [`Conditioned`]

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use vmop_api::{Condition, ConditionSeverity, ConditionStatus, Conditioned};

pub fn get<'a, T: Conditioned>(obj: &'a T, type_: &str) -> Option<&'a Condition> {
    obj.conditions().iter().find(|c| c.type_ == type_)
}

pub fn is_true<T: Conditioned>(obj: &T, type_: &str) -> bool {
    get(obj, type_).is_some_and(Condition::is_true)
}

pub fn mark_true<T: Conditioned>(obj: &mut T, type_: &str) {
    set(
        obj,
        Condition {
            type_: type_.to_string(),
            status: ConditionStatus::True,
            ..Default::default()
        },
    );
}

pub fn mark_false<T: Conditioned>(
    obj: &mut T,
    type_: &str,
    reason: &str,
    severity: ConditionSeverity,
    message: impl Into<String>,
) {
    set(
        obj,
        Condition {
            type_: type_.to_string(),
            status: ConditionStatus::False,
            severity: Some(severity),
            reason: reason.to_string(),
            message: message.into(),
            last_transition_time: None,
        },
    );
}

/// Insert or replace a condition; the transition time only moves when the status changes
pub fn set<T: Conditioned>(obj: &mut T, mut condition: Condition) {
    let conditions = obj.conditions_mut();
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            condition.last_transition_time = if existing.status == condition.status {
                existing.last_transition_time.clone()
            } else {
                Some(Time(Utc::now()))
            };
            *existing = condition;
        }
        None => {
            condition.last_transition_time = Some(Time(Utc::now()));
            conditions.push(condition);
        }
    }
}
