use crossbeam_channel::{Receiver, Sender};
use fnv::FnvHashSet;

// Diagnostics past this many undrained entries are logged but not queued
const MAX_QUEUED_DIAGNOSTICS: usize = 1024;

// Once this many distinct messages were deduplicated, the set starts over
const MAX_REPORTED_ONCE: usize = 4096;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RafxDiagnosticLevel {
    Warning,
    Error,
}

/// A report about a recoverable problem: a skipped draw, a failed copy, a misused render pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RafxDiagnostic {
    pub level: RafxDiagnosticLevel,
    pub message: String,
}

/// Logs diagnostics and forwards them to any number of receivers
pub struct RafxDiagnostics {
    sender: Sender<RafxDiagnostic>,
    receiver: Receiver<RafxDiagnostic>,
    reported_once: FnvHashSet<String>,
}

impl Default for RafxDiagnostics {
    fn default() -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(MAX_QUEUED_DIAGNOSTICS);
        RafxDiagnostics {
            sender,
            receiver,
            reported_once: Default::default(),
        }
    }
}

impl RafxDiagnostics {
    /// Receivers share one queue, each diagnostic is delivered to a single receiver
    pub fn receiver(&self) -> Receiver<RafxDiagnostic> {
        self.receiver.clone()
    }

    pub fn report<S: Into<String>>(
        &self,
        level: RafxDiagnosticLevel,
        message: S,
    ) {
        let message = message.into();
        match level {
            RafxDiagnosticLevel::Warning => log::warn!("{}", message),
            RafxDiagnosticLevel::Error => log::error!("{}", message),
        }

        let _ = self.sender.try_send(RafxDiagnostic { level, message });
    }

    /// Reports the message unless an identical message was reported before. Returns true if it
    /// was reported.
    pub fn report_once<S: Into<String>>(
        &mut self,
        level: RafxDiagnosticLevel,
        message: S,
    ) -> bool {
        let message = message.into();
        if self.reported_once.contains(&message) {
            return false;
        }

        if self.reported_once.len() >= MAX_REPORTED_ONCE {
            log::debug!("Forgetting {} deduplicated diagnostics", self.reported_once.len());
            self.reported_once.clear();
        }

        self.reported_once.insert(message.clone());
        self.report(level, message);
        true
    }

    /// Allows every message to be reported once more
    pub fn forget_reported(&mut self) {
        self.reported_once.clear();
    }

    pub fn reported_once_count(&self) -> usize {
        self.reported_once.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_once_deduplicates() {
        let mut diagnostics = RafxDiagnostics::default();
        let receiver = diagnostics.receiver();

        assert!(diagnostics.report_once(RafxDiagnosticLevel::Error, "missing sampler"));
        assert!(!diagnostics.report_once(RafxDiagnosticLevel::Error, "missing sampler"));
        diagnostics.report(RafxDiagnosticLevel::Warning, "missing sampler");

        let received: Vec<_> = receiver.try_iter().collect();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].level, RafxDiagnosticLevel::Error);
        assert_eq!(received[1].level, RafxDiagnosticLevel::Warning);
    }

    #[test]
    fn deduplication_set_is_bounded() {
        let mut diagnostics = RafxDiagnostics::default();
        for i in 0..MAX_REPORTED_ONCE + 10 {
            diagnostics.report_once(RafxDiagnosticLevel::Warning, format!("message {}", i));
        }
        assert!(diagnostics.reported_once_count() <= MAX_REPORTED_ONCE);

        diagnostics.forget_reported();
        assert_eq!(diagnostics.reported_once_count(), 0);
        assert!(diagnostics.report_once(RafxDiagnosticLevel::Warning, "message 0"));
    }
}
