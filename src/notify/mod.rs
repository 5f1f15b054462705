//! Operator notification
//!
//! Delivery is a capability behind the `Notifier` trait: subject and body in,
//! best-effort delivery out. A failed delivery is recorded on the run and
//! never escalates to a pipeline failure. The transport (email, chat, etc.)
//! is an implementation detail outside this crate's core.

pub mod report;

pub use report::render_report;

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub delivered: bool,
    pub detail: Option<String>,
}

impl DeliveryResult {
    pub fn delivered() -> Self {
        Self {
            delivered: true,
            detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            delivered: false,
            detail: Some(detail.into()),
        }
    }
}

/// Notification capability: subject and body in, best-effort delivery out
pub trait Notifier {
    fn send(&self, subject: &str, body: &str) -> DeliveryResult;
}

/// Writes notifications to standard output
#[derive(Debug, Clone, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn send(&self, subject: &str, body: &str) -> DeliveryResult {
        println!("{subject}");
        println!("{body}");
        DeliveryResult::delivered()
    }
}

/// Captures notifications in memory; used in tests
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, subject: &str, body: &str) -> DeliveryResult {
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((subject.to_string(), body.to_string()));
        DeliveryResult::delivered()
    }
}

/// Always fails delivery; used to test that notification failures never
/// change a run's terminal classification
#[derive(Debug, Clone, Default)]
pub struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn send(&self, _subject: &str, _body: &str) -> DeliveryResult {
        DeliveryResult::failed("transport unavailable")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_result_constructors() {
        assert!(DeliveryResult::delivered().delivered);
        let failed = DeliveryResult::failed("smtp timeout");
        assert!(!failed.delivered);
        assert_eq!(failed.detail.as_deref(), Some("smtp timeout"));
    }

    #[test]
    fn test_recording_notifier_captures() {
        let notifier = RecordingNotifier::new();
        let result = notifier.send("subject", "body");
        assert!(result.delivered);
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "subject");
    }

    #[test]
    fn test_failing_notifier() {
        let result = FailingNotifier.send("s", "b");
        assert!(!result.delivered);
    }
}
