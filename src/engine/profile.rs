//! Per-stage pipeline counters.
//!
//! Counters are collected when [`EngineConfig::profile`] is set or the
//! `GRAVEL_PROFILE` environment variable is present. Each stage owns one
//! [`StageStats`]; a [`PipelineProfile`] groups them for one execution.
//!
//! [`EngineConfig::profile`]: crate::config::EngineConfig::profile
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

static PROFILE_ENABLED: OnceLock<bool> = OnceLock::new();

/// True when `GRAVEL_PROFILE` was set when first checked.
pub fn profiling_enabled() -> bool {
    *PROFILE_ENABLED.get_or_init(|| std::env::var_os("GRAVEL_PROFILE").is_some())
}

fn nanos(elapsed: Duration) -> u64 {
    elapsed.as_nanos().min(u64::MAX as u128) as u64
}

/// Live counters of one stage.
#[derive(Debug)]
pub struct StageStats {
    stage: &'static str,
    started: Instant,
    emitted: AtomicU64,
    first_emit_ns: AtomicU64,
    total_ns: AtomicU64,
}

impl StageStats {
    /// Starts the clock for a stage.
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            started: Instant::now(),
            emitted: AtomicU64::new(0),
            first_emit_ns: AtomicU64::new(0),
            total_ns: AtomicU64::new(0),
        }
    }

    /// Counts one traveler handed downstream.
    pub fn record_emit(&self) {
        if self.emitted.fetch_add(1, Ordering::Relaxed) == 0 {
            let elapsed = nanos(self.started.elapsed()).max(1);
            let _ = self.first_emit_ns.compare_exchange(
                0,
                elapsed,
                Ordering::Relaxed,
                Ordering::Relaxed,
            );
        }
    }

    /// Stops the clock.
    pub fn finish(&self) {
        self.total_ns
            .store(nanos(self.started.elapsed()).max(1), Ordering::Relaxed);
    }

    /// Current values.
    pub fn snapshot(&self) -> StageProfile {
        let first = self.first_emit_ns.load(Ordering::Relaxed);
        let total = self.total_ns.load(Ordering::Relaxed);
        StageProfile {
            stage: self.stage,
            emitted: self.emitted.load(Ordering::Relaxed),
            first_emit: (first > 0).then(|| Duration::from_nanos(first)),
            total: (total > 0).then(|| Duration::from_nanos(total)),
        }
    }
}

/// Point-in-time copy of a stage's counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StageProfile {
    /// Stage name.
    pub stage: &'static str,
    /// Travelers emitted.
    pub emitted: u64,
    /// Time from stage start to its first emit.
    pub first_emit: Option<Duration>,
    /// Stage run time, once it has finished.
    pub total: Option<Duration>,
}

/// Counters of every stage of one pipeline execution, in stage order.
#[derive(Clone, Debug, Default)]
pub struct PipelineProfile {
    stages: Vec<Arc<StageStats>>,
}

impl PipelineProfile {
    /// Registers a stage and returns its counters.
    pub fn stage(&mut self, name: &'static str) -> Arc<StageStats> {
        let stats = Arc::new(StageStats::new(name));
        self.stages.push(Arc::clone(&stats));
        stats
    }

    /// Snapshots every stage.
    pub fn snapshot(&self) -> Vec<StageProfile> {
        self.stages.iter().map(|s| s.snapshot()).collect()
    }

    /// Logs every stage at debug level.
    pub fn log(&self) {
        for (index, stage) in self.snapshot().into_iter().enumerate() {
            debug!(
                index,
                stage = stage.stage,
                emitted = stage.emitted,
                first_emit_us = stage.first_emit.map(|d| d.as_micros() as u64),
                total_us = stage.total.map(|d| d.as_micros() as u64),
                "engine.pipeline.stage_profile"
            );
        }
    }
}
