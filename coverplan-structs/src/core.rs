use crate::{
    error::{CoverageError, Result},
    serializable_struct_with_getters,
};
use coverplan_utils::is_non_negative;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

fn checked_id(kind: &str, id: String) -> Result<String> {
    if id.trim().is_empty() {
        Err(CoverageError::validation(format!(
            "{} identifier must not be empty",
            kind
        )))
    } else {
        Ok(id)
    }
}

/// Rejects the first identifier that appears twice.
pub fn ensure_unique_ids<'a, I>(kind: &str, ids: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(CoverageError::validation(format!(
                "Duplicate {} id '{}'",
                kind, id
            )));
        }
    }
    Ok(())
}

// AreaUnit

#[derive(Deserialize)]
struct AreaUnitData {
    id: String,
    population: f64,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
}

/// A small census-style geographic unit with the population it represents.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "AreaUnitData")]
pub struct AreaUnit {
    id: String,
    population: f64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, String>,
}

impl AreaUnit {
    pub fn new(id: impl Into<String>, population: f64) -> Result<Self> {
        let id = checked_id("Area", id.into())?;
        if !is_non_negative(population) {
            return Err(CoverageError::validation(format!(
                "Area '{}' has invalid population {}",
                id, population
            )));
        }
        Ok(Self {
            id,
            population,
            attributes: BTreeMap::new(),
        })
    }

    /// Attaches an equity attribute such as `deprivation_decile = "3"`.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn population(&self) -> f64 {
        self.population
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

impl TryFrom<AreaUnitData> for AreaUnit {
    type Error = CoverageError;

    fn try_from(data: AreaUnitData) -> Result<Self> {
        let mut area = AreaUnit::new(data.id, data.population)?;
        area.attributes = data.attributes;
        Ok(area)
    }
}

// ServiceSite

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
}

impl Coordinates {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

fn default_enabled() -> bool {
    true
}

#[derive(Deserialize)]
struct ServiceSiteData {
    id: String,
    coordinates: Coordinates,
    #[serde(default)]
    capacity: u32,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

/// A candidate or existing service location. `capacity` is advisory and never
/// constrains coverage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "ServiceSiteData")]
pub struct ServiceSite {
    id: String,
    coordinates: Coordinates,
    capacity: u32,
    enabled: bool,
}

impl ServiceSite {
    pub fn new(
        id: impl Into<String>,
        coordinates: Coordinates,
        capacity: u32,
        enabled: bool,
    ) -> Result<Self> {
        let id = checked_id("Site", id.into())?;
        if !coordinates.x.is_finite() || !coordinates.y.is_finite() {
            return Err(CoverageError::validation(format!(
                "Site '{}' has non-finite coordinates",
                id
            )));
        }
        Ok(Self {
            id,
            coordinates,
            capacity,
            enabled,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn coordinates(&self) -> Coordinates {
        self.coordinates
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Copy of this site with the scenario toggle set to `enabled`.
    pub fn with_enabled(&self, enabled: bool) -> Self {
        Self {
            enabled,
            ..self.clone()
        }
    }
}

impl TryFrom<ServiceSiteData> for ServiceSite {
    type Error = CoverageError;

    fn try_from(data: ServiceSiteData) -> Result<Self> {
        ServiceSite::new(data.id, data.coordinates, data.capacity, data.enabled)
    }
}

// Travel times

#[derive(Deserialize)]
struct TravelTimeEntryData {
    area_id: String,
    site_id: String,
    minutes: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "TravelTimeEntryData")]
pub struct TravelTimeEntry {
    area_id: String,
    site_id: String,
    minutes: f64,
}

impl TravelTimeEntry {
    pub fn new(area_id: impl Into<String>, site_id: impl Into<String>, minutes: f64) -> Result<Self> {
        let area_id = checked_id("Area", area_id.into())?;
        let site_id = checked_id("Site", site_id.into())?;
        if !is_non_negative(minutes) {
            return Err(CoverageError::validation(format!(
                "Travel time from site '{}' to area '{}' is invalid: {}",
                site_id, area_id, minutes
            )));
        }
        Ok(Self {
            area_id,
            site_id,
            minutes,
        })
    }

    pub fn area_id(&self) -> &str {
        &self.area_id
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn minutes(&self) -> f64 {
        self.minutes
    }
}

impl TryFrom<TravelTimeEntryData> for TravelTimeEntry {
    type Error = CoverageError;

    fn try_from(data: TravelTimeEntryData) -> Result<Self> {
        TravelTimeEntry::new(data.area_id, data.site_id, data.minutes)
    }
}

/// Sparse (area, site) -> minutes lookup. An absent pair means unreachable.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(try_from = "Vec<TravelTimeEntry>", into = "Vec<TravelTimeEntry>")]
pub struct TravelTimes {
    by_area: BTreeMap<String, BTreeMap<String, f64>>,
}

impl TravelTimes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = TravelTimeEntry>,
    {
        let mut travel_times = Self::new();
        for entry in entries {
            travel_times.insert(entry)?;
        }
        Ok(travel_times)
    }

    pub fn insert(&mut self, entry: TravelTimeEntry) -> Result<()> {
        if self.get(&entry.area_id, &entry.site_id).is_some() {
            return Err(CoverageError::validation(format!(
                "Duplicate travel time for area '{}' and site '{}'",
                entry.area_id, entry.site_id
            )));
        }
        self.by_area
            .entry(entry.area_id)
            .or_default()
            .insert(entry.site_id, entry.minutes);
        Ok(())
    }

    pub fn get(&self, area_id: &str, site_id: &str) -> Option<f64> {
        self.by_area
            .get(area_id)
            .and_then(|sites| sites.get(site_id))
            .copied()
    }

    /// Measured sites for `area_id`, in ascending site id order.
    pub fn sites_for<'a>(&'a self, area_id: &str) -> impl Iterator<Item = (&'a str, f64)> + 'a {
        self.by_area
            .get(area_id)
            .into_iter()
            .flat_map(|sites| sites.iter().map(|(site_id, &minutes)| (site_id.as_str(), minutes)))
    }

    /// All entries as (area_id, site_id, minutes), ordered by area then site.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, f64)> + '_ {
        self.by_area.iter().flat_map(|(area_id, sites)| {
            sites
                .iter()
                .map(move |(site_id, &minutes)| (area_id.as_str(), site_id.as_str(), minutes))
        })
    }

    pub fn len(&self) -> usize {
        self.by_area.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TryFrom<Vec<TravelTimeEntry>> for TravelTimes {
    type Error = CoverageError;

    fn try_from(entries: Vec<TravelTimeEntry>) -> Result<Self> {
        TravelTimes::from_entries(entries)
    }
}

impl From<TravelTimes> for Vec<TravelTimeEntry> {
    fn from(travel_times: TravelTimes) -> Self {
        travel_times
            .by_area
            .into_iter()
            .flat_map(|(area_id, sites)| {
                sites.into_iter().map(move |(site_id, minutes)| TravelTimeEntry {
                    area_id: area_id.clone(),
                    site_id,
                    minutes,
                })
            })
            .collect()
    }
}

// Threshold & scenarios

/// Maximum response time, in minutes, that still counts as covered.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, PartialOrd)]
#[serde(try_from = "f64", into = "f64")]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(minutes: f64) -> Result<Self> {
        if minutes.is_finite() && minutes > 0.0 {
            Ok(Self(minutes))
        } else {
            Err(CoverageError::validation(format!(
                "Threshold must be a finite positive number of minutes, got {}",
                minutes
            )))
        }
    }

    pub fn minutes(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Threshold {
    type Error = CoverageError;

    fn try_from(minutes: f64) -> Result<Self> {
        Threshold::new(minutes)
    }
}

impl From<Threshold> for f64 {
    fn from(threshold: Threshold) -> Self {
        threshold.0
    }
}

#[derive(Deserialize)]
struct ScenarioData {
    name: String,
    enabled_sites: BTreeSet<String>,
    threshold: Threshold,
}

/// Named, immutable combination of enabled sites and threshold.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "ScenarioData")]
pub struct Scenario {
    name: String,
    enabled_sites: BTreeSet<String>,
    threshold: Threshold,
}

impl Scenario {
    pub fn new<I, S>(name: impl Into<String>, enabled_sites: I, threshold: f64) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CoverageError::validation("Scenario name must not be empty"));
        }
        Ok(Self {
            name,
            enabled_sites: enabled_sites.into_iter().map(Into::into).collect(),
            threshold: Threshold::new(threshold)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enabled_sites(&self) -> &BTreeSet<String> {
        &self.enabled_sites
    }

    pub fn enables(&self, site_id: &str) -> bool {
        self.enabled_sites.contains(site_id)
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }
}

impl TryFrom<ScenarioData> for Scenario {
    type Error = CoverageError;

    fn try_from(data: ScenarioData) -> Result<Self> {
        Scenario::new(data.name, data.enabled_sites, data.threshold.minutes())
    }
}

// Weights

/// Demand weight per area plus the equity attributes used for breakdowns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PopulationWeights {
    weights: BTreeMap<String, f64>,
    attributes: BTreeMap<String, BTreeMap<String, String>>,
}

impl PopulationWeights {
    pub fn new(weights: BTreeMap<String, f64>) -> Result<Self> {
        if let Some((area_id, weight)) = weights.iter().find(|(_, w)| !is_non_negative(**w)) {
            return Err(CoverageError::validation(format!(
                "Area '{}' has invalid weight {}",
                area_id, weight
            )));
        }
        Ok(Self {
            weights,
            attributes: BTreeMap::new(),
        })
    }

    /// Weights every area by its population and keeps its equity attributes.
    pub fn from_areas(areas: &[AreaUnit]) -> Self {
        Self {
            weights: areas
                .iter()
                .map(|area| (area.id.clone(), area.population))
                .collect(),
            attributes: BTreeMap::new(),
        }
        .with_area_attributes(areas)
    }

    pub fn with_area_attributes(mut self, areas: &[AreaUnit]) -> Self {
        for area in areas.iter().filter(|a| !a.attributes.is_empty()) {
            self.attributes
                .insert(area.id.clone(), area.attributes.clone());
        }
        self
    }

    pub fn weight(&self, area_id: &str) -> Option<f64> {
        self.weights.get(area_id).copied()
    }

    pub fn attributes(&self, area_id: &str) -> Option<&BTreeMap<String, String>> {
        self.attributes.get(area_id)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

// Planning input bundle handed over by loaders

serializable_struct_with_getters! {
    PlanningInput {
        areas: Vec<AreaUnit>,
        sites: Vec<ServiceSite>,
        travel_times: TravelTimes,
        threshold: f64,
        scenarios: Option<Vec<Scenario>>,
    }
}

impl PlanningInput {
    /// Cross-collection checks that single-value constructors cannot make.
    pub fn validate(&self) -> Result<()> {
        Threshold::new(self.threshold)?;
        ensure_unique_ids("area", self.areas.iter().map(AreaUnit::id))?;
        ensure_unique_ids("site", self.sites.iter().map(ServiceSite::id))?;
        let area_ids: HashSet<&str> = self.areas.iter().map(AreaUnit::id).collect();
        let site_ids: HashSet<&str> = self.sites.iter().map(ServiceSite::id).collect();
        for (area_id, site_id, _) in self.travel_times.entries() {
            if !area_ids.contains(area_id) {
                return Err(CoverageError::validation(format!(
                    "Travel time references unknown area '{}'",
                    area_id
                )));
            }
            if !site_ids.contains(site_id) {
                return Err(CoverageError::validation(format!(
                    "Travel time references unknown site '{}'",
                    site_id
                )));
            }
        }
        if let Some(scenarios) = &self.scenarios {
            ensure_unique_ids("scenario", scenarios.iter().map(Scenario::name))?;
            for scenario in scenarios {
                if let Some(unknown) = scenario
                    .enabled_sites()
                    .iter()
                    .find(|id| !site_ids.contains(id.as_str()))
                {
                    return Err(CoverageError::validation(format!(
                        "Scenario '{}' enables unknown site '{}'",
                        scenario.name(),
                        unknown
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn weights(&self) -> PopulationWeights {
        PopulationWeights::from_areas(&self.areas)
    }

    pub fn scenario(&self, name: &str) -> Result<&Scenario> {
        self.scenarios
            .iter()
            .flatten()
            .find(|s| s.name() == name)
            .ok_or_else(|| CoverageError::validation(format!("Unknown scenario '{}'", name)))
    }
}
