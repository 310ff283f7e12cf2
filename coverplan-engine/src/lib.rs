pub mod coverage;
pub mod metrics;
pub mod optimization;
pub mod scenario;
pub mod synthetic;

pub use coverage::{compute_coverage, AreaStatus, CoverageEntry, CoverageRelation, CoverageSummary};
pub use coverplan_structs::{
    config::{EngineConfig, OptimizerConfig, SolveLimits},
    core::{
        AreaUnit, Coordinates, PlanningInput, PopulationWeights, Scenario, ServiceSite, Threshold,
        TravelTimeEntry, TravelTimes,
    },
    CoverageError, Result,
};
pub use metrics::{
    compare, compute_metrics, coverage_curve, site_contributions, ComparisonSummary, CurvePoint,
    EquityGroup, GapArea, MetricsSummary, SiteContribution,
};
pub use optimization::{
    optimize, FallbackReason, OptimalityStatus, OptimizationEngine, OptimizationResult,
    GREEDY_APPROXIMATION_RATIO,
};
pub use scenario::{compare_scenarios, evaluate_scenario, ScenarioComparison, ScenarioReport};
pub use synthetic::{generate_instance, Track};
