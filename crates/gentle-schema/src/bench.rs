//! Timing helpers around the validation entry points.

use std::time::{Duration, Instant};

use gentle_core::Value;
use serde::Serialize;

use crate::batch::{BatchAction, BatchItem};
use crate::engine::Schema;
use crate::error::Error;
use crate::options::CallOptions;

#[derive(Debug, Clone)]
pub struct BenchOptions {
    pub iterations: u32,
    pub action: BatchAction,
    pub call: CallOptions,
}

impl Default for BenchOptions {
    fn default() -> Self {
        Self {
            iterations: 1000,
            action: BatchAction::Validate,
            call: CallOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchReport {
    pub iterations: u32,
    pub total_ms: f64,
    pub avg_ms: f64,
    /// Outcome of the final iteration; `None` when no iteration ran.
    pub last: Option<BatchItem>,
}

#[derive(Debug, Clone)]
pub struct ProfileOptions {
    pub action: BatchAction,
    /// Untimed runs over the leading items before measuring.
    pub warmup: usize,
    pub call: CallOptions,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            action: BatchAction::Validate,
            warmup: 10,
            call: CallOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSample {
    pub index: usize,
    pub nanos: u64,
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileReport {
    pub items: usize,
    pub total_ms: f64,
    pub avg_ms: f64,
    pub results: Vec<ProfileSample>,
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1_000.0
}

impl Schema {
    /// Run one action on the same input `iterations` times.
    pub fn benchmark(&self, input: &Value, opts: &BenchOptions) -> Result<BenchReport, Error> {
        let options = self.options().overlay(&opts.call);
        let mut last = None;
        let started = Instant::now();
        for _ in 0..opts.iterations {
            last = Some(self.run_action(input, opts.action, &options)?);
        }
        let total_ms = millis(started.elapsed());
        Ok(BenchReport {
            iterations: opts.iterations,
            total_ms,
            avg_ms: total_ms / f64::from(opts.iterations.max(1)),
            last,
        })
    }

    /// Time one action per item after a warmup pass.
    pub fn profile(&self, items: &[Value], opts: &ProfileOptions) -> Result<ProfileReport, Error> {
        let options = self.options().overlay(&opts.call);
        for item in items.iter().take(opts.warmup) {
            self.run_action(item, opts.action, &options)?;
        }

        let mut results = Vec::with_capacity(items.len());
        let mut total = Duration::ZERO;
        for (index, item) in items.iter().enumerate() {
            let started = Instant::now();
            let outcome = self.run_action(item, opts.action, &options)?;
            let elapsed = started.elapsed();
            total += elapsed;
            results.push(ProfileSample {
                index,
                nanos: u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX),
                ok: outcome.is_valid(),
            });
        }

        let total_ms = millis(total);
        Ok(ProfileReport {
            items: items.len(),
            total_ms,
            avg_ms: total_ms / items.len().max(1) as f64,
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::SchemaOptions;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::from_json(json!({"n": "number"}), SchemaOptions::default()).unwrap()
    }

    #[test]
    fn test_benchmark_runs_every_iteration() {
        let s = schema();
        let opts = BenchOptions {
            iterations: 25,
            action: BatchAction::Check,
            ..Default::default()
        };
        let report = s.benchmark(&Value::from(json!({"n": 1})), &opts).unwrap();
        assert_eq!(report.iterations, 25);
        assert_eq!(report.last, Some(BatchItem::Checked(true)));
        assert!(report.total_ms >= 0.0);
        assert_eq!(s.stats()["n"].count, 25);
    }

    #[test]
    fn test_zero_iterations() {
        let opts = BenchOptions {
            iterations: 0,
            ..Default::default()
        };
        let report = schema().benchmark(&Value::from(json!({})), &opts).unwrap();
        assert!(report.last.is_none());
        assert!(report.avg_ms.is_finite());
    }

    #[test]
    fn test_profile_reports_each_item() {
        let items = vec![Value::from(json!({"n": 1})), Value::from(json!({"n": "x"}))];
        let report = schema().profile(&items, &ProfileOptions::default()).unwrap();
        assert_eq!(report.items, 2);
        let ok: Vec<bool> = report.results.iter().map(|s| s.ok).collect();
        assert_eq!(ok, vec![true, false]);
        assert_eq!(report.results[1].index, 1);
    }
}
