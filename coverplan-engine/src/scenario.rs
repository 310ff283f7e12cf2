use crate::{
    coverage::{compute_coverage, CoverageRelation},
    metrics::{compare, compute_metrics, ComparisonSummary, MetricsSummary},
};
use coverplan_structs::{
    core::{AreaUnit, PopulationWeights, Scenario, ServiceSite, TravelTimes},
    CoverageError, Result,
};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ScenarioReport {
    pub name: String,
    pub relation: CoverageRelation,
    pub metrics: MetricsSummary,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ScenarioComparison {
    pub baseline: String,
    pub alternative: String,
    pub comparison: ComparisonSummary,
}

/// Runs one scenario. `sites` is left untouched; the scenario's enabled set is
/// applied to copies.
pub fn evaluate_scenario(
    scenario: &Scenario,
    areas: &[AreaUnit],
    sites: &[ServiceSite],
    travel_times: &TravelTimes,
    weights: &PopulationWeights,
) -> Result<ScenarioReport> {
    let known: HashSet<&str> = sites.iter().map(ServiceSite::id).collect();
    if let Some(unknown) = scenario
        .enabled_sites()
        .iter()
        .find(|id| !known.contains(id.as_str()))
    {
        return Err(CoverageError::validation(format!(
            "Scenario '{}' enables unknown site '{}'",
            scenario.name(),
            unknown
        )));
    }

    let scenario_sites: Vec<ServiceSite> = sites
        .iter()
        .map(|site| site.with_enabled(scenario.enables(site.id())))
        .collect();
    let relation = compute_coverage(
        areas,
        &scenario_sites,
        travel_times,
        scenario.threshold().minutes(),
    )?;
    let metrics = compute_metrics(&relation, weights)?;
    Ok(ScenarioReport {
        name: scenario.name().to_string(),
        relation,
        metrics,
    })
}

/// Evaluates both scenarios independently and compares their metrics.
pub fn compare_scenarios(
    baseline: &Scenario,
    alternative: &Scenario,
    areas: &[AreaUnit],
    sites: &[ServiceSite],
    travel_times: &TravelTimes,
    weights: &PopulationWeights,
) -> Result<ScenarioComparison> {
    let before = evaluate_scenario(baseline, areas, sites, travel_times, weights)?;
    let after = evaluate_scenario(alternative, areas, sites, travel_times, weights)?;
    Ok(ScenarioComparison {
        baseline: before.name,
        alternative: after.name,
        comparison: compare(&before.metrics, &after.metrics)?,
    })
}
