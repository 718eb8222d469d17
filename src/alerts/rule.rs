//! Alert rules — a topic filter plus an optional field condition, with a
//! per-rule rate-limiting clock.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use crate::alerts::condition::{self, Condition};
use crate::alerts::store::RuleRecord;
use crate::error::AlertError;
use crate::transport::TopicMessage;

/// Outcome of evaluating one rule against one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// Topic filter did not match; rule state untouched.
    NoMatch,
    /// Topic matched but the minimum interval has not yet elapsed.
    Suppressed,
    /// Topic matched and the rule has no condition — topic-only rules
    /// fire on any matching message, rate-limited.
    NoCondition,
    /// Condition evaluated and was not satisfied.
    ConditionNotMet,
    /// Condition satisfied.
    Triggered { field: String, value: String },
}

/// One alerting condition over a topic's message stream.
///
/// Immutable after construction apart from its two timestamps, which
/// advance as matching messages arrive. Construction validates the topic
/// filter, condition string, and recipient up front; a rule is never
/// built in a partially-valid state.
#[derive(Debug, Clone)]
pub struct Rule {
    topic_filter: Option<String>,
    condition: Option<Condition>,
    notify_address: Option<String>,
    /// Minimum interval between evaluations that may fire.
    min_suppress: TimeDelta,
    /// Maximum expected gap between matching messages. Recorded and
    /// persisted, not currently enforced.
    max_silence: TimeDelta,
    /// Most recent message that matched the filter, suppressed or not.
    last_received_at: Option<DateTime<Utc>>,
    /// Most recent evaluation that was not suppressed.
    last_evaluated_at: Option<DateTime<Utc>>,
}

impl Rule {
    /// Create a rule. Empty strings for the filter, condition, or address
    /// are treated as absent. Intervals default to 60 minutes and 24 hours.
    pub fn new(
        topic_filter: Option<&str>,
        condition: Option<&str>,
        notify_address: Option<&str>,
        min_suppress: Option<TimeDelta>,
        max_silence: Option<TimeDelta>,
    ) -> Result<Self, AlertError> {
        let topic_filter = topic_filter.filter(|s| !s.is_empty());
        let condition = condition.filter(|s| !s.is_empty());
        let notify_address = notify_address.filter(|s| !s.is_empty());

        if let Some(filter) = topic_filter {
            validate_topic_filter(filter)?;
        }
        let condition = condition.map(Condition::parse).transpose()?;
        if let Some(address) = notify_address {
            if address.chars().any(char::is_whitespace) {
                return Err(AlertError::InvalidRecipient {
                    address: address.to_string(),
                    reason: "recipient must not contain whitespace".to_string(),
                });
            }
        }

        Ok(Self {
            topic_filter: topic_filter.map(String::from),
            condition,
            notify_address: notify_address.map(String::from),
            min_suppress: min_suppress.unwrap_or_else(|| TimeDelta::minutes(60)),
            max_silence: max_silence.unwrap_or_else(|| TimeDelta::hours(24)),
            last_received_at: None,
            last_evaluated_at: None,
        })
    }

    pub fn topic_filter(&self) -> Option<&str> {
        self.topic_filter.as_deref()
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    pub fn notify_address(&self) -> Option<&str> {
        self.notify_address.as_deref()
    }

    pub fn min_suppress(&self) -> TimeDelta {
        self.min_suppress
    }

    pub fn max_silence(&self) -> TimeDelta {
        self.max_silence
    }

    /// When a message last matched the topic filter, suppression aside.
    pub fn last_received_at(&self) -> Option<DateTime<Utc>> {
        self.last_received_at
    }

    /// When an evaluation last ran to completion (fired or not).
    pub fn last_evaluated_at(&self) -> Option<DateTime<Utc>> {
        self.last_evaluated_at
    }

    /// Evaluate one message against this rule.
    ///
    /// Side effects are confined to the two timestamps; no I/O happens
    /// here. A missing condition field is a configuration error surfaced
    /// to the caller rather than swallowed — it usually means a typo in
    /// the rule.
    pub fn evaluate(&mut self, message: &TopicMessage) -> Result<Evaluation, AlertError> {
        if let Some(filter) = &self.topic_filter {
            if !topic_matches(filter, &message.topic) {
                return Ok(Evaluation::NoMatch);
            }
        }

        // Liveness tracking is independent of suppression.
        self.last_received_at = Some(message.received_at);

        if let Some(prev) = self.last_evaluated_at {
            if message.received_at - prev < self.min_suppress {
                debug!(topic = %message.topic, rule = %self, "evaluation suppressed within minimum interval");
                return Ok(Evaluation::Suppressed);
            }
        }

        // The attempt counts against the window even if the condition
        // turns out false.
        self.last_evaluated_at = Some(message.received_at);

        let Some(cond) = &self.condition else {
            return Ok(Evaluation::NoCondition);
        };

        let Some(observed) = message.fields.get(cond.field()) else {
            return Err(AlertError::MissingField {
                field: cond.field().to_string(),
                topic: message.topic.clone(),
            });
        };

        if cond.is_met(observed) {
            Ok(Evaluation::Triggered {
                field: cond.field().to_string(),
                value: condition::value_text(observed),
            })
        } else {
            Ok(Evaluation::ConditionNotMet)
        }
    }

    /// Export the rule's definition. Timestamp state is not part of the
    /// record.
    pub fn to_record(&self) -> RuleRecord {
        RuleRecord {
            topic_filter: self.topic_filter.clone(),
            condition: self.condition.as_ref().map(Condition::to_string),
            notify_address: self.notify_address.clone(),
            min_suppress_secs: self.min_suppress.num_seconds().max(0) as u64,
            max_silence_secs: self.max_silence.num_seconds().max(0) as u64,
        }
    }

    /// Rebuild a rule from its record, with a fresh clock.
    pub fn from_record(record: &RuleRecord) -> Result<Self, AlertError> {
        let min_suppress = interval_from_secs("min_suppress_secs", record.min_suppress_secs)?;
        let max_silence = interval_from_secs("max_silence_secs", record.max_silence_secs)?;
        Self::new(
            record.topic_filter.as_deref(),
            record.condition.as_deref(),
            record.notify_address.as_deref(),
            Some(min_suppress),
            Some(max_silence),
        )
    }
}

/// Checked conversion of a record's seconds field. A value that does not
/// fit in a `TimeDelta` is a bad record, not a wrapped-around (and
/// possibly negative) suppression window.
fn interval_from_secs(field: &'static str, secs: u64) -> Result<TimeDelta, AlertError> {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or(AlertError::InvalidInterval { field, secs })
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.topic_filter, &self.condition) {
            (Some(filter), Some(cond)) => write!(f, "'{filter}', '{cond}'"),
            (Some(filter), None) => write!(f, "'{filter}'"),
            (None, Some(cond)) => write!(f, "'{cond}'"),
            (None, None) => f.write_str("(all topics)"),
        }
    }
}

/// Match a topic against a filter: exact, or prefix up to a trailing `#`
/// segment. `device/#` matches `device` and everything under `device/`.
fn topic_matches(filter: &str, topic: &str) -> bool {
    if filter == "#" {
        return true;
    }
    if let Some(prefix) = filter.strip_suffix("/#") {
        return topic == prefix
            || topic
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'));
    }
    filter == topic
}

/// `#` is only valid as the final standalone segment (`device/#`, `#`).
fn validate_topic_filter(filter: &str) -> Result<(), AlertError> {
    let invalid = |reason: &str| AlertError::InvalidTopicFilter {
        filter: filter.to_string(),
        reason: reason.to_string(),
    };

    if let Some(idx) = filter.find('#') {
        if idx != filter.len() - 1 {
            return Err(invalid("'#' must be the last character"));
        }
        if filter != "#" && !filter.ends_with("/#") {
            return Err(invalid("'#' must occupy a whole segment"));
        }
    }
    Ok(())
}
