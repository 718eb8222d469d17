//! Alert manager — fans each inbound message out to every rule and
//! forwards firing rules to the notification sink.
//!
//! Messages arrive one at a time from the transport listener, so rule
//! state needs no synchronization; dispatch happens after the evaluation
//! pass so a slow sink never stalls rule bookkeeping.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::alerts::rule::{Evaluation, Rule};
use crate::alerts::store::RuleRecord;
use crate::error::{AlertError, NotifyError};
use crate::notify::NotificationSink;
use crate::transport::TopicMessage;

/// Manager-assigned rule identity. Duplicate rule definitions get
/// distinct ids; removal is by id, never by field equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId(u64);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule-{}", self.0)
    }
}

/// Per-message evaluation summary, enough for an operator to see which
/// rules matched, which were suppressed, and which errored.
#[derive(Debug, Default)]
pub struct HandleSummary {
    /// Rules that fired (condition met, or topic-only rule).
    pub fired: Vec<RuleId>,
    /// Rules suppressed by their minimum interval.
    pub suppressed: Vec<RuleId>,
    /// Per-rule evaluation failures (e.g. missing field).
    pub errors: Vec<(RuleId, AlertError)>,
    /// Notifications that could not be delivered.
    pub dispatch_failures: Vec<(RuleId, NotifyError)>,
}

impl HandleSummary {
    pub fn is_empty(&self) -> bool {
        self.fired.is_empty()
            && self.suppressed.is_empty()
            && self.errors.is_empty()
            && self.dispatch_failures.is_empty()
    }
}

struct Entry {
    id: RuleId,
    rule: Rule,
}

/// A notification request bound for the sink.
struct Notification {
    to: String,
    subject: String,
    body: String,
}

/// Owns the rule collection (insertion-ordered) and the notification
/// sink.
pub struct AlertManager {
    entries: Vec<Entry>,
    sink: Option<Arc<dyn NotificationSink>>,
    dispatch_timeout: Duration,
    next_id: u64,
}

impl AlertManager {
    pub fn new(sink: Option<Arc<dyn NotificationSink>>) -> Self {
        Self {
            entries: Vec::new(),
            sink,
            dispatch_timeout: Duration::from_secs(30),
            next_id: 0,
        }
    }

    /// Timeout applied around each sink call.
    pub fn set_dispatch_timeout(&mut self, timeout: Duration) {
        self.dispatch_timeout = timeout;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn rule(&self, id: RuleId) -> Option<&Rule> {
        self.entries.iter().find(|e| e.id == id).map(|e| &e.rule)
    }

    /// Add a rule; evaluation order is insertion order.
    pub fn add(&mut self, rule: Rule) -> RuleId {
        let id = RuleId(self.next_id);
        self.next_id += 1;
        info!(%id, rule = %rule, "adding alert rule");
        self.entries.push(Entry { id, rule });
        id
    }

    /// Remove a rule by id. Removing an id that is not present is an
    /// error, not a no-op.
    pub fn remove(&mut self, id: RuleId) -> Result<Rule, AlertError> {
        match self.entries.iter().position(|e| e.id == id) {
            Some(idx) => {
                let entry = self.entries.remove(idx);
                info!(%id, rule = %entry.rule, "removed alert rule");
                Ok(entry.rule)
            }
            None => Err(AlertError::RuleNotFound(id)),
        }
    }

    /// Evaluate one message against every rule, then dispatch any
    /// resulting notifications.
    ///
    /// One rule's evaluation error never stops the pass; sink failures
    /// are logged and recorded in the summary, never raised. Rules
    /// without a recipient (or a manager without a sink) still evaluate
    /// so their suppression clocks advance.
    pub async fn handle(&mut self, message: &TopicMessage) -> HandleSummary {
        let mut summary = HandleSummary::default();
        let mut pending: Vec<(RuleId, Notification)> = Vec::new();

        for entry in &mut self.entries {
            match entry.rule.evaluate(message) {
                Ok(Evaluation::NoMatch | Evaluation::ConditionNotMet) => {}
                Ok(Evaluation::Suppressed) => summary.suppressed.push(entry.id),
                Ok(outcome @ (Evaluation::NoCondition | Evaluation::Triggered { .. })) => {
                    info!(id = %entry.id, rule = %entry.rule, topic = %message.topic, "alert fired");
                    summary.fired.push(entry.id);
                    if let Some(notification) = build_notification(&entry.rule, &outcome, message) {
                        pending.push((entry.id, notification));
                    }
                }
                Err(e) => {
                    warn!(id = %entry.id, rule = %entry.rule, error = %e, "rule evaluation failed");
                    summary.errors.push((entry.id, e));
                }
            }
        }

        if let Some(sink) = self.sink.clone() {
            for (id, notification) in pending {
                self.dispatch(&sink, id, notification, &mut summary).await;
            }
        }

        summary
    }

    async fn dispatch(
        &self,
        sink: &Arc<dyn NotificationSink>,
        id: RuleId,
        notification: Notification,
        summary: &mut HandleSummary,
    ) {
        let send = sink.send(&notification.to, &notification.subject, &notification.body);
        match tokio::time::timeout(self.dispatch_timeout, send).await {
            Ok(Ok(())) => {
                info!(%id, to = %notification.to, subject = %notification.subject, "notification sent");
            }
            Ok(Err(e)) => {
                error!(%id, to = %notification.to, error = %e, "notification failed");
                summary.dispatch_failures.push((id, e));
            }
            Err(_) => {
                let e = NotifyError::Timeout {
                    name: sink.name().to_string(),
                    timeout: self.dispatch_timeout,
                };
                error!(%id, to = %notification.to, error = %e, "notification timed out");
                summary.dispatch_failures.push((id, e));
            }
        }
    }

    /// Export the rule set as records, in insertion order.
    pub fn to_records(&self) -> Vec<RuleRecord> {
        self.entries.iter().map(|e| e.rule.to_record()).collect()
    }

    /// Append rules rebuilt from records. All records are validated
    /// before any rule is added, so a bad record leaves the manager
    /// untouched.
    pub fn from_records(&mut self, records: &[RuleRecord]) -> Result<Vec<RuleId>, AlertError> {
        let rules = records
            .iter()
            .map(Rule::from_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rules.into_iter().map(|rule| self.add(rule)).collect())
    }
}

/// Derive the notification request for a firing rule. `None` when the
/// rule has no recipient — it still evaluated, it just has nowhere to go.
///
/// The body names the concrete message topic because wildcard filters
/// can match many topics.
fn build_notification(
    rule: &Rule,
    outcome: &Evaluation,
    message: &TopicMessage,
) -> Option<Notification> {
    let to = rule.notify_address()?.to_string();
    let subject = format!("Alert: {rule}");
    let body = match outcome {
        Evaluation::Triggered { field, value } => format!(
            "Alert on: {}.\nVariable: {field} = {value}.\nSatisfies alert condition: {}",
            message.topic,
            rule.condition().map(ToString::to_string).unwrap_or_default(),
        ),
        _ => format!("Alert on: {}.", message.topic),
    };
    Some(Notification { to, subject, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use serde_json::{Value, json};

    /// Sink test double that records every send.
    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl NotificationSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), NotifyError> {
            Err(NotifyError::SendFailed {
                name: "failing".to_string(),
                reason: "destination unreachable".to_string(),
            })
        }
    }

    struct StallingSink;

    #[async_trait]
    impl NotificationSink for StallingSink {
        fn name(&self) -> &str {
            "stalling"
        }

        async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), NotifyError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + TimeDelta::minutes(minutes)
    }

    fn msg(topic: &str, fields: Value) -> TopicMessage {
        let Value::Object(fields) = fields else {
            panic!("fields must be a JSON object");
        };
        TopicMessage {
            topic: topic.to_string(),
            fields,
            received_at: at(0),
        }
    }

    fn rule(filter: &str, condition: &str, address: &str) -> Rule {
        Rule::new(
            Some(filter),
            Some(condition),
            Some(address),
            Some(TimeDelta::zero()),
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn triggered_rule_sends_notification() {
        let sink = Arc::new(RecordingSink::default());
        let mut manager = AlertManager::new(Some(sink.clone()));
        let id = manager.add(rule("device/#", "status==ok", "ops@example.com"));

        let summary = manager.handle(&msg("device/x", json!({"status": "ok"}))).await;
        assert_eq!(summary.fired, vec![id]);
        assert!(summary.errors.is_empty());

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (to, subject, body) = &sent[0];
        assert_eq!(to, "ops@example.com");
        assert_eq!(subject, "Alert: 'device/#', 'status==ok'");
        assert!(body.contains("Alert on: device/x"));
        assert!(body.contains("status = ok"));
        assert!(body.contains("status==ok"));
    }

    #[tokio::test]
    async fn one_rule_error_does_not_stop_the_pass() {
        let sink = Arc::new(RecordingSink::default());
        let mut manager = AlertManager::new(Some(sink.clone()));
        let bad = manager.add(rule("device/#", "temperature<33", "ops@example.com"));
        let good = manager.add(rule("device/#", "status==ok", "ops@example.com"));

        let summary = manager.handle(&msg("device/x", json!({"status": "ok"}))).await;
        assert_eq!(summary.fired, vec![good]);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].0, bad);
        assert!(matches!(
            summary.errors[0].1,
            AlertError::MissingField { .. }
        ));
        assert_eq!(sink.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rule_without_recipient_evaluates_but_sends_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let mut manager = AlertManager::new(Some(sink.clone()));
        let id = manager.add(
            Rule::new(
                Some("device/#"),
                Some("status==ok"),
                None,
                Some(TimeDelta::zero()),
                None,
            )
            .unwrap(),
        );

        let summary = manager.handle(&msg("device/x", json!({"status": "ok"}))).await;
        assert_eq!(summary.fired, vec![id]);
        assert!(sink.sent.lock().unwrap().is_empty());
        // The suppression clock advanced regardless.
        assert!(manager.rule(id).unwrap().last_evaluated_at().is_some());
    }

    #[tokio::test]
    async fn no_sink_still_advances_rule_state() {
        let mut manager = AlertManager::new(None);
        let id = manager.add(rule("device/#", "status==ok", "ops@example.com"));

        let summary = manager.handle(&msg("device/x", json!({"status": "ok"}))).await;
        assert_eq!(summary.fired, vec![id]);
        assert!(summary.dispatch_failures.is_empty());
        assert!(manager.rule(id).unwrap().last_evaluated_at().is_some());
    }

    #[tokio::test]
    async fn suppressed_rules_are_reported() {
        let sink = Arc::new(RecordingSink::default());
        let mut manager = AlertManager::new(Some(sink.clone()));
        let id = manager.add(
            Rule::new(
                Some("device/#"),
                Some("status==ok"),
                Some("ops@example.com"),
                Some(TimeDelta::hours(1)),
                None,
            )
            .unwrap(),
        );

        let first = manager.handle(&msg("device/x", json!({"status": "ok"}))).await;
        assert_eq!(first.fired, vec![id]);

        let second = manager.handle(&msg("device/x", json!({"status": "ok"}))).await;
        assert_eq!(second.suppressed, vec![id]);
        assert!(second.fired.is_empty());
        assert_eq!(sink.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn topic_only_rule_notifies() {
        let sink = Arc::new(RecordingSink::default());
        let mut manager = AlertManager::new(Some(sink.clone()));
        manager.add(
            Rule::new(
                Some("device/#"),
                None,
                Some("ops@example.com"),
                Some(TimeDelta::zero()),
                None,
            )
            .unwrap(),
        );

        manager.handle(&msg("device/x", json!({}))).await;
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "Alert: 'device/#'");
        assert_eq!(sent[0].2, "Alert on: device/x.");
    }

    #[tokio::test]
    async fn notifications_follow_insertion_order() {
        let sink = Arc::new(RecordingSink::default());
        let mut manager = AlertManager::new(Some(sink.clone()));
        manager.add(rule("device/#", "status==ok", "first@example.com"));
        manager.add(rule("device/#", "status==ok", "second@example.com"));

        manager.handle(&msg("device/x", json!({"status": "ok"}))).await;
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent[0].0, "first@example.com");
        assert_eq!(sent[1].0, "second@example.com");
    }

    #[tokio::test]
    async fn duplicate_rules_get_distinct_ids_and_both_fire() {
        let sink = Arc::new(RecordingSink::default());
        let mut manager = AlertManager::new(Some(sink.clone()));
        let a = manager.add(rule("device/#", "status==ok", "ops@example.com"));
        let b = manager.add(rule("device/#", "status==ok", "ops@example.com"));
        assert_ne!(a, b);

        let summary = manager.handle(&msg("device/x", json!({"status": "ok"}))).await;
        assert_eq!(summary.fired, vec![a, b]);
        assert_eq!(sink.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn sink_failure_is_recorded_and_later_sends_still_run() {
        let mut manager = AlertManager::new(Some(Arc::new(FailingSink)));
        let a = manager.add(rule("device/#", "status==ok", "first@example.com"));
        let b = manager.add(rule("device/#", "status==ok", "second@example.com"));

        let summary = manager.handle(&msg("device/x", json!({"status": "ok"}))).await;
        assert_eq!(summary.fired, vec![a, b]);
        assert_eq!(summary.dispatch_failures.len(), 2);
        assert!(matches!(
            summary.dispatch_failures[0].1,
            NotifyError::SendFailed { .. }
        ));
    }

    #[tokio::test]
    async fn slow_sink_hits_the_dispatch_timeout() {
        let mut manager = AlertManager::new(Some(Arc::new(StallingSink)));
        manager.set_dispatch_timeout(Duration::from_millis(10));
        let id = manager.add(rule("device/#", "status==ok", "ops@example.com"));

        let summary = manager.handle(&msg("device/x", json!({"status": "ok"}))).await;
        assert_eq!(summary.dispatch_failures.len(), 1);
        assert_eq!(summary.dispatch_failures[0].0, id);
        assert!(matches!(
            summary.dispatch_failures[0].1,
            NotifyError::Timeout { .. }
        ));
    }

    #[tokio::test]
    async fn remove_present_and_absent() {
        let mut manager = AlertManager::new(None);
        let id = manager.add(rule("device/#", "status==ok", "ops@example.com"));

        assert!(manager.remove(id).is_ok());
        assert!(manager.is_empty());
        assert!(matches!(
            manager.remove(id),
            Err(AlertError::RuleNotFound(_))
        ));

        // A removed rule no longer evaluates.
        let summary = manager.handle(&msg("device/x", json!({"status": "ok"}))).await;
        assert!(summary.is_empty());
    }

    #[tokio::test]
    async fn record_round_trip_reproduces_the_rule_set() {
        let mut manager = AlertManager::new(None);
        manager.add(rule("device/#", "temperature<33", "ops@example.com"));
        manager.add(
            Rule::new(None, None, None, Some(TimeDelta::minutes(5)), None).unwrap(),
        );

        let records = manager.to_records();
        let mut fresh = AlertManager::new(None);
        fresh.from_records(&records).unwrap();

        assert_eq!(fresh.to_records(), records);
    }

    #[tokio::test]
    async fn bad_record_leaves_manager_untouched() {
        let mut manager = AlertManager::new(None);
        let records = vec![
            Rule::new(Some("device/#"), None, None, None, None)
                .unwrap()
                .to_record(),
            RuleRecord {
                topic_filter: None,
                condition: Some("<33".to_string()),
                notify_address: None,
                min_suppress_secs: 0,
                max_silence_secs: 0,
            },
        ];

        assert!(manager.from_records(&records).is_err());
        assert!(manager.is_empty());
    }
}
