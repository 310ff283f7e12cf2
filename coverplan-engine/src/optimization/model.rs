use coverplan_structs::{
    core::{ensure_unique_ids, AreaUnit, PopulationWeights, ServiceSite, TravelTimes},
    CoverageError, Result,
};
use coverplan_utils::approx_eq;
use std::collections::{HashMap, HashSet};

/// One row of the integer program.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// `covered[area] <= sum(select[s] for s in sites)`
    Coverage { area: usize, sites: Vec<usize> },
    /// `sum(select[s]) <= max_selected`
    Cardinality { max_selected: usize },
}

/// Maximal covering location problem over the enabled candidates.
///
/// Sites and areas are indexed in ascending id order, which is the fixed total
/// order every solver uses for iteration and tie-breaks.
#[derive(Debug, Clone)]
pub struct Problem {
    site_ids: Vec<String>,
    area_ids: Vec<String>,
    weights: Vec<f64>,
    site_areas: Vec<Vec<usize>>,
    area_sites: Vec<Vec<usize>>,
    budget: usize,
    threshold: f64,
}

impl Problem {
    pub fn build(
        areas: &[AreaUnit],
        candidate_sites: &[ServiceSite],
        travel_times: &TravelTimes,
        weights: &PopulationWeights,
        budget: usize,
        threshold: f64,
    ) -> Result<Self> {
        ensure_unique_ids("area", areas.iter().map(AreaUnit::id))?;
        ensure_unique_ids("site", candidate_sites.iter().map(ServiceSite::id))?;

        let mut site_ids: Vec<String> = candidate_sites
            .iter()
            .filter(|site| site.is_enabled())
            .map(|site| site.id().to_string())
            .collect();
        site_ids.sort();
        let site_index: HashMap<&str, usize> = site_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut sorted_areas: Vec<&AreaUnit> = areas.iter().collect();
        sorted_areas.sort_by(|a, b| a.id().cmp(b.id()));

        let mut area_ids = Vec::with_capacity(sorted_areas.len());
        let mut area_weights = Vec::with_capacity(sorted_areas.len());
        let mut site_areas = vec![Vec::new(); site_ids.len()];
        let mut area_sites = Vec::with_capacity(sorted_areas.len());
        for (area, area_unit) in sorted_areas.into_iter().enumerate() {
            let weight = weights.weight(area_unit.id()).ok_or_else(|| {
                CoverageError::validation(format!(
                    "No population weight for area '{}'",
                    area_unit.id()
                ))
            })?;
            let mut reaching = Vec::new();
            for (site_id, minutes) in travel_times.sites_for(area_unit.id()) {
                if minutes > threshold {
                    continue;
                }
                if let Some(&site) = site_index.get(site_id) {
                    reaching.push(site);
                    site_areas[site].push(area);
                }
            }
            area_ids.push(area_unit.id().to_string());
            area_weights.push(weight);
            area_sites.push(reaching);
        }

        Ok(Self {
            site_ids,
            area_ids,
            weights: area_weights,
            site_areas,
            area_sites,
            budget,
            threshold,
        })
    }

    pub fn num_sites(&self) -> usize {
        self.site_ids.len()
    }

    pub fn num_areas(&self) -> usize {
        self.area_ids.len()
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn site_id(&self, site: usize) -> &str {
        &self.site_ids[site]
    }

    pub fn area_id(&self, area: usize) -> &str {
        &self.area_ids[area]
    }

    pub fn weight(&self, area: usize) -> f64 {
        self.weights[area]
    }

    /// Areas `site` reaches within the threshold, ascending.
    pub fn areas_of(&self, site: usize) -> &[usize] {
        &self.site_areas[site]
    }

    pub fn sites_of(&self, area: usize) -> &[usize] {
        &self.area_sites[area]
    }

    /// Areas no candidate reaches; they stay uncovered under every selection.
    pub fn unreachable_areas(&self) -> Vec<usize> {
        (0..self.num_areas())
            .filter(|&area| self.area_sites[area].is_empty())
            .collect()
    }

    /// Rows of the integer program: one coverage row per area in area order,
    /// then the cardinality row.
    pub fn constraints(&self) -> Vec<Constraint> {
        let mut constraints: Vec<Constraint> = (0..self.num_areas())
            .map(|area| Constraint::Coverage {
                area,
                sites: self.sites_of(area).to_vec(),
            })
            .collect();
        constraints.push(Constraint::Cardinality {
            max_selected: self.budget,
        });
        constraints
    }

    /// Objective value of `selection`, summed in area order.
    pub fn evaluate(&self, selection: &[usize]) -> f64 {
        let mut covered = vec![false; self.num_areas()];
        for &site in selection {
            for &area in &self.site_areas[site] {
                covered[area] = true;
            }
        }
        self.weights
            .iter()
            .zip(&covered)
            .filter(|(_, is_covered)| **is_covered)
            .fold(0.0, |total, (weight, _)| total + weight)
    }

    /// Checks `selection` against every constraint row and returns its
    /// objective, with each area counted only when its coverage row is met.
    pub fn check_selection(&self, selection: &[usize]) -> Result<f64> {
        let unique: HashSet<usize> = selection.iter().copied().collect();
        if unique.len() != selection.len() {
            return Err(CoverageError::validation("Duplicate sites selected."));
        }
        if let Some(&site) = selection.iter().find(|&&site| site >= self.num_sites()) {
            return Err(CoverageError::validation(format!(
                "Site index ({}) is out of bounds",
                site
            )));
        }

        let mut value = 0.0;
        for constraint in self.constraints() {
            match constraint {
                Constraint::Coverage { area, sites } => {
                    if sites.iter().any(|site| unique.contains(site)) {
                        value += self.weight(area);
                    }
                }
                Constraint::Cardinality { max_selected } => {
                    if selection.len() > max_selected {
                        return Err(CoverageError::validation(format!(
                            "Selected {} sites, budget is {}",
                            selection.len(),
                            max_selected
                        )));
                    }
                }
            }
        }

        let objective = self.evaluate(selection);
        if !approx_eq(value, objective) {
            return Err(CoverageError::validation(format!(
                "Coverage rows give {} but the objective is {}",
                value, objective
            )));
        }
        Ok(objective)
    }
}
