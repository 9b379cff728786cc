//! Parameter sweeps: one independent replay per configuration.
//!
//! Every point builds its own engine, resolver and cost model; only the
//! candle and signal slices are shared, read-only, across rayon workers.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::HashMap;

use exitlab_core::domain::{Candle, Signal};

use crate::config::RunConfig;
use crate::runner::{run_replay, RunReport};

/// Grid of overrides applied to every `[[profiles]]` row of a base config.
///
/// Empty axes leave the base value untouched.
#[derive(Debug, Clone, Default)]
pub struct ParamGrid {
    /// Trailing distances to test.
    pub trailing_distances: Vec<f64>,

    /// Multipliers applied to all three TP distances.
    pub tp_scales: Vec<f64>,

    /// Timeouts to test, in hours.
    pub timeout_hours: Vec<f64>,

    /// Spreads to test.
    pub spreads: Vec<f64>,
}

impl ParamGrid {
    /// Returns the total number of configurations in this grid.
    pub fn size(&self) -> usize {
        [
            self.trailing_distances.len(),
            self.tp_scales.len(),
            self.timeout_hours.len(),
            self.spreads.len(),
        ]
        .iter()
        .map(|&n| n.max(1))
        .product()
    }

    /// Generates all configurations in the grid, in axis order.
    pub fn generate_configs(&self, base: &RunConfig) -> Vec<RunConfig> {
        let mut configs = Vec::with_capacity(self.size());

        for trailing in axis(&self.trailing_distances) {
            for scale in axis(&self.tp_scales) {
                for timeout in axis(&self.timeout_hours) {
                    for spread in axis(&self.spreads) {
                        let mut config = base.clone();
                        for row in &mut config.profiles {
                            if let Some(t) = trailing {
                                row.trailing_distance = t;
                            }
                            if let Some(s) = scale {
                                row.tp_distances = row.tp_distances.map(|d| d * s);
                            }
                            if let Some(h) = timeout {
                                row.timeout_hours = h;
                            }
                        }
                        if let Some(s) = spread {
                            config.engine.spread = s;
                        }
                        configs.push(config);
                    }
                }
            }
        }

        configs
    }
}

fn axis(values: &[f64]) -> Vec<Option<f64>> {
    if values.is_empty() {
        vec![None]
    } else {
        values.iter().copied().map(Some).collect()
    }
}

/// Run every configuration against the same candles and signals.
///
/// Results come back in input order whether or not `parallel` is set. The
/// first failing point aborts the sweep, naming its index.
pub fn sweep(
    points: &[RunConfig],
    candles: &[Candle],
    signals: &[Signal],
    parallel: bool,
) -> Result<SweepResults> {
    let run_point = |(idx, config): (usize, &RunConfig)| {
        run_replay(config, candles, signals).with_context(|| format!("sweep point {idx} failed"))
    };

    let reports = if parallel {
        points
            .par_iter()
            .enumerate()
            .map(run_point)
            .collect::<Result<Vec<_>>>()?
    } else {
        points
            .iter()
            .enumerate()
            .map(run_point)
            .collect::<Result<Vec<_>>>()?
    };

    Ok(SweepResults::new(reports))
}

/// Results from a parameter sweep.
#[derive(Debug)]
pub struct SweepResults {
    reports: Vec<RunReport>,
    by_run_id: HashMap<String, usize>,
}

impl SweepResults {
    fn new(reports: Vec<RunReport>) -> Self {
        let by_run_id = reports
            .iter()
            .enumerate()
            .map(|(idx, r)| (r.run_id.clone(), idx))
            .collect();

        Self { reports, by_run_id }
    }

    /// Returns all reports in input order.
    pub fn all(&self) -> &[RunReport] {
        &self.reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Looks up a report by its configuration's RunId.
    pub fn get(&self, run_id: &str) -> Option<&RunReport> {
        self.by_run_id.get(run_id).map(|&idx| &self.reports[idx])
    }

    /// Report with the highest total net points. Ties keep the earliest.
    pub fn best_by_net_points(&self) -> Option<&RunReport> {
        self.reports.iter().fold(None, |best: Option<&RunReport>, r| match best {
            Some(b) if b.summary.total_net_points >= r.summary.total_net_points => Some(b),
            _ => Some(r),
        })
    }

    pub fn into_reports(self) -> Vec<RunReport> {
        self.reports
    }
}
