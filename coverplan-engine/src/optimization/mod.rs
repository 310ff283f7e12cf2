mod branch_and_bound;
mod greedy;
mod local_search;
mod model;

pub use branch_and_bound::BranchAndBound;
pub use greedy::Greedy;
pub use local_search::SwapSearch;
pub use model::{Constraint, Problem};

use crate::{coverage::compute_coverage, metrics::compute_metrics, metrics::MetricsSummary};
use coverplan_structs::{
    config::{OptimizerConfig, SolveLimits},
    core::{AreaUnit, PopulationWeights, ServiceSite, Threshold, TravelTimes},
    CoverageError, Result,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, time::Duration};
use tracing::{debug, info, warn};

/// Worst-case share of the optimum the greedy heuristic is guaranteed to reach.
pub const GREEDY_APPROXIMATION_RATIO: f64 = 1.0 - 1.0 / std::f64::consts::E;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    TimeLimit,
    NodeLimit,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::TimeLimit => write!(f, "time_limit"),
            FallbackReason::NodeLimit => write!(f, "node_limit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    Optimal,
    LimitReached(FallbackReason),
    Heuristic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutput {
    /// Problem site indices, in the order the solver chose them.
    pub selected: Vec<usize>,
    pub value: f64,
    pub status: SolverStatus,
    pub nodes_explored: u64,
}

/// A strategy for choosing at most `problem.budget()` sites.
pub trait Solver {
    fn name(&self) -> &'static str;
    fn solve(&self, problem: &Problem) -> Result<SolverOutput>;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimalityStatus {
    Exact,
    HeuristicApproximate {
        approximation_ratio: f64,
        fallback_reason: FallbackReason,
        solver: String,
    },
    Infeasible {
        message: String,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OptimizationResult {
    /// Ascending site ids.
    pub selected_sites: Vec<String>,
    pub budget: i64,
    pub threshold: f64,
    pub weighted_coverage: f64,
    pub total_weight: f64,
    pub weighted_coverage_pct: f64,
    pub uncovered_areas: Vec<String>,
    /// Areas no candidate reaches within the threshold.
    pub unreachable_areas: Vec<String>,
    pub status: OptimalityStatus,
    pub metrics: Option<MetricsSummary>,
}

impl OptimizationResult {
    pub fn infeasible(budget: i64, threshold: f64, message: impl Into<String>) -> Self {
        Self {
            selected_sites: Vec::new(),
            budget,
            threshold,
            weighted_coverage: 0.0,
            total_weight: 0.0,
            weighted_coverage_pct: 0.0,
            uncovered_areas: Vec::new(),
            unreachable_areas: Vec::new(),
            status: OptimalityStatus::Infeasible {
                message: message.into(),
            },
            metrics: None,
        }
    }

    pub fn is_exact(&self) -> bool {
        self.status == OptimalityStatus::Exact
    }
}

#[derive(Debug, Clone, Default)]
pub struct OptimizationEngine {
    config: OptimizerConfig,
}

impl OptimizationEngine {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    fn fallback_solver(&self) -> Box<dyn Solver> {
        if self.config.local_search_enabled() {
            Box::new(SwapSearch::new(self.config.swap_iterations()))
        } else {
            Box::new(Greedy)
        }
    }

    /// Selects at most `k` enabled candidates maximizing covered weight.
    ///
    /// Runs the exact search within `limits`; if a limit is hit the configured
    /// heuristic answers instead and the status says so.
    #[allow(clippy::too_many_arguments)]
    pub fn optimize(
        &self,
        areas: &[AreaUnit],
        candidate_sites: &[ServiceSite],
        travel_times: &TravelTimes,
        weights: &PopulationWeights,
        k: i64,
        threshold: f64,
        limits: SolveLimits,
    ) -> Result<OptimizationResult> {
        if k < 0 {
            return Err(CoverageError::infeasible(format!(
                "Site budget must be non-negative, got {}",
                k
            )));
        }
        let threshold = Threshold::new(threshold)
            .map_err(|_| {
                CoverageError::infeasible(format!(
                    "Threshold must be a finite positive number, got {}",
                    threshold
                ))
            })?
            .minutes();
        if candidate_sites.is_empty() && k > 0 {
            return Err(CoverageError::infeasible(
                "No candidate sites to select from",
            ));
        }

        let problem = Problem::build(
            areas,
            candidate_sites,
            travel_times,
            weights,
            k as usize,
            threshold,
        )?;
        let (output, status) = self.solve(&problem, limits)?;
        problem.check_selection(&output.selected)?;

        let selected: BTreeSet<&str> = output
            .selected
            .iter()
            .map(|&site| problem.site_id(site))
            .collect();
        let result_sites: Vec<ServiceSite> = candidate_sites
            .iter()
            .map(|site| site.with_enabled(selected.contains(site.id())))
            .collect();
        let relation = compute_coverage(areas, &result_sites, travel_times, threshold)?;
        let metrics = compute_metrics(&relation, weights)?;

        info!(
            "Selected {}/{} sites covering {:.2}% of weight ({:?})",
            selected.len(),
            k,
            metrics.weighted_coverage_pct,
            status
        );
        Ok(OptimizationResult {
            selected_sites: selected.iter().map(|id| id.to_string()).collect(),
            budget: k,
            threshold,
            weighted_coverage: metrics.covered_population,
            total_weight: metrics.total_population,
            weighted_coverage_pct: metrics.weighted_coverage_pct,
            uncovered_areas: metrics
                .uncovered_area_ids()
                .into_iter()
                .map(String::from)
                .collect(),
            unreachable_areas: problem
                .unreachable_areas()
                .into_iter()
                .map(|area| problem.area_id(area).to_string())
                .collect(),
            status,
            metrics: Some(metrics),
        })
    }

    fn solve(
        &self,
        problem: &Problem,
        limits: SolveLimits,
    ) -> Result<(SolverOutput, OptimalityStatus)> {
        let budget = problem.budget();
        if budget == 0 || budget >= problem.num_sites() {
            let selected: Vec<usize> = (0..problem.num_sites().min(budget)).collect();
            let value = problem.evaluate(&selected);
            let output = SolverOutput {
                selected,
                value,
                status: SolverStatus::Optimal,
                nodes_explored: 0,
            };
            return Ok((output, OptimalityStatus::Exact));
        }

        let exact = BranchAndBound::new(limits).solve(problem)?;
        match exact.status {
            SolverStatus::LimitReached(reason) => {
                let fallback = self.fallback_solver();
                warn!(
                    "Exact search hit its {} after {} nodes, falling back to {}",
                    reason,
                    exact.nodes_explored,
                    fallback.name()
                );
                let output = fallback.solve(problem)?;
                let status = OptimalityStatus::HeuristicApproximate {
                    approximation_ratio: GREEDY_APPROXIMATION_RATIO,
                    fallback_reason: reason,
                    solver: fallback.name().to_string(),
                };
                Ok((output, status))
            }
            SolverStatus::Optimal | SolverStatus::Heuristic => {
                debug!("Exact search proved optimality");
                Ok((exact, OptimalityStatus::Exact))
            }
        }
    }
}

/// Convenience entry point using the default engine and node limit.
#[allow(clippy::too_many_arguments)]
pub fn optimize(
    areas: &[AreaUnit],
    candidate_sites: &[ServiceSite],
    travel_times: &TravelTimes,
    weights: &PopulationWeights,
    k: i64,
    threshold: f64,
    time_limit: Duration,
) -> Result<OptimizationResult> {
    OptimizationEngine::default().optimize(
        areas,
        candidate_sites,
        travel_times,
        weights,
        k,
        threshold,
        SolveLimits::new(time_limit),
    )
}
