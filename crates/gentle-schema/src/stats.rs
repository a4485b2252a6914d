//! Per-field diagnostics: how often each top-level checker ran and how
//! long it took in total.

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

/// Counters for one top-level field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldStats {
    pub count: u64,
    pub total_nanos: u64,
}

impl FieldStats {
    pub fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.total_nanos = self.total_nanos.saturating_add(nanos);
    }

    pub fn total(&self) -> Duration {
        Duration::from_nanos(self.total_nanos)
    }

    /// Mean time per run; zero when the field never ran.
    pub fn average(&self) -> Duration {
        match self.count {
            0 => Duration::ZERO,
            n => Duration::from_nanos(self.total_nanos / n),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsTable(Mutex<BTreeMap<String, FieldStats>>);

impl StatsTable {
    pub(crate) fn record(&self, field: &str, elapsed: Duration) {
        let mut table = self.0.lock();
        match table.get_mut(field) {
            Some(stats) => stats.record(elapsed),
            None => {
                let mut stats = FieldStats::default();
                stats.record(elapsed);
                table.insert(field.to_string(), stats);
            }
        }
    }

    pub(crate) fn snapshot(&self) -> BTreeMap<String, FieldStats> {
        self.0.lock().clone()
    }

    pub(crate) fn reset(&self) {
        self.0.lock().clear();
    }
}
