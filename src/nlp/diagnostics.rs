//! Observable record of faults that extraction swallowed.

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::{error::FaultKind, nlp::Tier};

const RECENT_FAULTS: usize = 64;

/// A single swallowed failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fault {
    pub tier: Tier,
    pub kind: FaultKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticsSnapshot {
    pub fallbacks: u64,
    pub load_failures: u64,
    pub extraction_failures: u64,
    pub configuration_errors: u64,
    pub recent: Vec<Fault>,
}

/// Fault counters plus a bounded ring of recent faults.
#[derive(Debug, Default)]
pub struct Diagnostics {
    recent: Mutex<VecDeque<Fault>>,
    fallbacks: AtomicU64,
    load_failures: AtomicU64,
    extraction_failures: AtomicU64,
    configuration_errors: AtomicU64,
}

impl Diagnostics {
    pub fn record(&self, tier: Tier, kind: FaultKind, message: impl Into<String>) {
        let message = message.into();
        warn!(%tier, ?kind, %message, "tier fault");
        let counter = match kind {
            FaultKind::LoadFailure => &self.load_failures,
            FaultKind::ExtractionFailure => &self.extraction_failures,
            FaultKind::ConfigurationError => &self.configuration_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let mut recent = self.recent.lock();
        if recent.len() == RECENT_FAULTS {
            recent.pop_front();
        }
        recent.push_back(Fault {
            tier,
            kind,
            message,
            at: Utc::now(),
        });
    }

    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Most recent fault for `tier`, if any.
    pub fn last_fault(&self, tier: Tier) -> Option<Fault> {
        self.recent
            .lock()
            .iter()
            .rev()
            .find(|fault| fault.tier == tier)
            .cloned()
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            extraction_failures: self.extraction_failures.load(Ordering::Relaxed),
            configuration_errors: self.configuration_errors.load(Ordering::Relaxed),
            recent: self.recent.lock().iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_keeps_latest_faults() {
        let diagnostics = Diagnostics::default();
        for idx in 0..(RECENT_FAULTS + 5) {
            diagnostics.record(Tier::Full, FaultKind::ExtractionFailure, format!("fault {idx}"));
        }
        let snapshot = diagnostics.snapshot();
        assert_eq!(snapshot.recent.len(), RECENT_FAULTS);
        assert_eq!(snapshot.extraction_failures, (RECENT_FAULTS + 5) as u64);
        assert_eq!(
            diagnostics.last_fault(Tier::Full).unwrap().message,
            format!("fault {}", RECENT_FAULTS + 4)
        );
        assert!(diagnostics.last_fault(Tier::Partial).is_none());
    }
}
