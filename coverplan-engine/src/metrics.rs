use crate::coverage::{compute_coverage, AreaStatus, CoverageRelation};
use coverplan_structs::{
    core::{AreaUnit, PopulationWeights, ServiceSite, Threshold, TravelTimes},
    CoverageError, Result,
};
use coverplan_utils::{cmp_desc_then, fraction, percentage};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GapArea {
    pub area_id: String,
    pub population: f64,
    pub best_travel_time: Option<f64>,
    pub status: AreaStatus,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EquityGroup {
    pub group: String,
    pub areas: usize,
    pub covered_areas: usize,
    pub population: f64,
    pub covered_population: f64,
    /// Population-weighted share of the group that is covered, in [0, 1].
    pub covered_fraction: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MetricsSummary {
    pub threshold: f64,
    pub total_areas: usize,
    pub covered_areas: usize,
    pub area_coverage_pct: f64,
    pub total_population: f64,
    pub covered_population: f64,
    pub weighted_coverage_pct: f64,
    /// Population-weighted mean of the best response time over covered areas.
    pub mean_response_time: Option<f64>,
    pub covered_area_ids: Vec<String>,
    /// Uncovered areas, largest population first, then by area id.
    pub gap_list: Vec<GapArea>,
    pub missing_data: Vec<String>,
    /// Attribute name -> groups ordered by group value.
    pub equity: BTreeMap<String, Vec<EquityGroup>>,
}

impl MetricsSummary {
    pub fn uncovered_area_ids(&self) -> Vec<&str> {
        self.gap_list.iter().map(|g| g.area_id.as_str()).collect()
    }

    /// Every area the summary was computed over.
    pub fn area_universe(&self) -> BTreeSet<&str> {
        self.covered_area_ids
            .iter()
            .map(String::as_str)
            .chain(self.gap_list.iter().map(|g| g.area_id.as_str()))
            .collect()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ComparisonSummary {
    pub area_coverage_pct_delta: f64,
    pub weighted_coverage_pct_delta: f64,
    pub covered_areas_delta: i64,
    pub covered_population_delta: f64,
    pub newly_covered: Vec<String>,
    pub newly_uncovered: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SiteContribution {
    pub site_id: String,
    pub covered_areas: usize,
    pub covered_population: f64,
    /// Areas no other enabled site covers; lost if this site closes.
    pub unique_areas: usize,
    pub unique_population: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CurvePoint {
    pub threshold: f64,
    pub covered_areas: usize,
    pub area_coverage_pct: f64,
    pub covered_population: f64,
    pub weighted_coverage_pct: f64,
}

fn area_weight(weights: &PopulationWeights, area_id: &str) -> Result<f64> {
    weights.weight(area_id).ok_or_else(|| {
        CoverageError::validation(format!("No population weight for area '{}'", area_id))
    })
}

#[derive(Default)]
struct GroupTally {
    areas: usize,
    covered_areas: usize,
    population: f64,
    covered_population: f64,
}

pub fn compute_metrics(
    relation: &CoverageRelation,
    weights: &PopulationWeights,
) -> Result<MetricsSummary> {
    let mut covered_areas = 0;
    let mut total_population = 0.0;
    let mut covered_population = 0.0;
    let mut weighted_response = 0.0;
    let mut covered_area_ids = Vec::new();
    let mut gap_list = Vec::new();
    let mut missing_data = Vec::new();
    let mut tallies: BTreeMap<&str, BTreeMap<&str, GroupTally>> = BTreeMap::new();

    for summary in relation.summaries() {
        let population = area_weight(weights, &summary.area_id)?;
        total_population += population;
        if summary.is_covered {
            covered_areas += 1;
            covered_population += population;
            weighted_response += population * summary.best_travel_time.unwrap_or(0.0);
            covered_area_ids.push(summary.area_id.clone());
        } else {
            gap_list.push(GapArea {
                area_id: summary.area_id.clone(),
                population,
                best_travel_time: summary.best_travel_time,
                status: summary.status,
            });
        }
        if summary.status == AreaStatus::MissingData {
            missing_data.push(summary.area_id.clone());
        }
        for (attribute, group) in weights.attributes(&summary.area_id).into_iter().flatten() {
            let tally = tallies
                .entry(attribute.as_str())
                .or_default()
                .entry(group.as_str())
                .or_default();
            tally.areas += 1;
            tally.population += population;
            if summary.is_covered {
                tally.covered_areas += 1;
                tally.covered_population += population;
            }
        }
    }

    gap_list.sort_by(|a, b| cmp_desc_then(a.population, b.population, a.area_id.cmp(&b.area_id)));

    let equity = tallies
        .into_iter()
        .map(|(attribute, groups)| {
            let groups = groups
                .into_iter()
                .map(|(group, tally)| EquityGroup {
                    group: group.to_string(),
                    areas: tally.areas,
                    covered_areas: tally.covered_areas,
                    population: tally.population,
                    covered_population: tally.covered_population,
                    covered_fraction: fraction(tally.covered_population, tally.population),
                })
                .collect();
            (attribute.to_string(), groups)
        })
        .collect();

    let total_areas = relation.summaries().len();
    Ok(MetricsSummary {
        threshold: relation.threshold(),
        total_areas,
        covered_areas,
        area_coverage_pct: percentage(covered_areas as f64, total_areas as f64),
        total_population,
        covered_population,
        weighted_coverage_pct: percentage(covered_population, total_population),
        mean_response_time: (covered_population > 0.0)
            .then(|| weighted_response / covered_population),
        covered_area_ids,
        gap_list,
        missing_data,
        equity,
    })
}

/// Difference going from `baseline` to `alternative`.
pub fn compare(baseline: &MetricsSummary, alternative: &MetricsSummary) -> Result<ComparisonSummary> {
    let baseline_universe = baseline.area_universe();
    let alternative_universe = alternative.area_universe();
    if baseline_universe != alternative_universe {
        let only_baseline = baseline_universe.difference(&alternative_universe).count();
        let only_alternative = alternative_universe.difference(&baseline_universe).count();
        return Err(CoverageError::scenario_mismatch(format!(
            "Area universes differ: {} area(s) only in baseline, {} only in alternative",
            only_baseline, only_alternative
        )));
    }

    let covered_before: BTreeSet<&str> =
        baseline.covered_area_ids.iter().map(String::as_str).collect();
    let covered_after: BTreeSet<&str> = alternative
        .covered_area_ids
        .iter()
        .map(String::as_str)
        .collect();

    Ok(ComparisonSummary {
        area_coverage_pct_delta: alternative.area_coverage_pct - baseline.area_coverage_pct,
        weighted_coverage_pct_delta: alternative.weighted_coverage_pct
            - baseline.weighted_coverage_pct,
        covered_areas_delta: alternative.covered_areas as i64 - baseline.covered_areas as i64,
        covered_population_delta: alternative.covered_population - baseline.covered_population,
        newly_covered: covered_after
            .difference(&covered_before)
            .map(|id| id.to_string())
            .collect(),
        newly_uncovered: covered_before
            .difference(&covered_after)
            .map(|id| id.to_string())
            .collect(),
    })
}

pub fn site_contributions(
    relation: &CoverageRelation,
    weights: &PopulationWeights,
) -> Result<Vec<SiteContribution>> {
    let mut contributions: BTreeMap<&str, SiteContribution> = BTreeMap::new();
    for summary in relation.summaries().iter().filter(|s| s.is_covered) {
        let population = area_weight(weights, &summary.area_id)?;
        let unique = summary.covering_sites == 1;
        for site_id in relation.covering_sites(&summary.area_id) {
            let contribution = contributions
                .entry(site_id)
                .or_insert_with(|| SiteContribution {
                    site_id: site_id.to_string(),
                    covered_areas: 0,
                    covered_population: 0.0,
                    unique_areas: 0,
                    unique_population: 0.0,
                });
            contribution.covered_areas += 1;
            contribution.covered_population += population;
            if unique {
                contribution.unique_areas += 1;
                contribution.unique_population += population;
            }
        }
    }
    Ok(contributions.into_values().collect())
}

/// Coverage at each threshold, ascending. Duplicate thresholds are collapsed.
pub fn coverage_curve(
    areas: &[AreaUnit],
    sites: &[ServiceSite],
    travel_times: &TravelTimes,
    weights: &PopulationWeights,
    thresholds: &[f64],
) -> Result<Vec<CurvePoint>> {
    let mut thresholds = thresholds
        .iter()
        .map(|&t| Threshold::new(t).map(|t| t.minutes()))
        .collect::<Result<Vec<_>>>()?;
    thresholds.sort_by(f64::total_cmp);
    thresholds.dedup();
    let Some(&widest) = thresholds.last() else {
        return Ok(Vec::new());
    };

    // Best travel times do not depend on the threshold, so one relation
    // answers every point of the curve.
    let relation = compute_coverage(areas, sites, travel_times, widest)?;
    let mut points = Vec::with_capacity(thresholds.len());
    let total_areas = relation.summaries().len();
    let mut total_population = 0.0;
    for summary in relation.summaries() {
        total_population += area_weight(weights, &summary.area_id)?;
    }
    for threshold in thresholds {
        let mut covered_areas = 0;
        let mut covered_population = 0.0;
        for summary in relation.summaries() {
            if summary.best_travel_time.is_some_and(|t| t <= threshold) {
                covered_areas += 1;
                covered_population += area_weight(weights, &summary.area_id)?;
            }
        }
        points.push(CurvePoint {
            threshold,
            covered_areas,
            area_coverage_pct: percentage(covered_areas as f64, total_areas as f64),
            covered_population,
            weighted_coverage_pct: percentage(covered_population, total_population),
        });
    }
    Ok(points)
}
