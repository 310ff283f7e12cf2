use coverplan_structs::{
    core::{ensure_unique_ids, AreaUnit, ServiceSite, Threshold, TravelTimes},
    CoverageError, Result,
};
use coverplan_utils::fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AreaStatus {
    Covered,
    /// Reachable from an enabled site, but not within the threshold.
    OverThreshold,
    /// No matrix entry for any enabled site.
    MissingData,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CoverageEntry {
    pub area_id: String,
    pub site_id: String,
    pub travel_time: f64,
    pub site_enabled: bool,
    pub is_covered: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CoverageSummary {
    pub area_id: String,
    /// Fastest response among enabled sites, covered or not.
    pub best_travel_time: Option<f64>,
    /// Enabled site achieving `best_travel_time`, smallest id on ties. For an
    /// `OverThreshold` area this site does not cover it.
    pub best_site: Option<String>,
    pub covering_sites: usize,
    pub is_covered: bool,
    pub status: AreaStatus,
}

/// Coverage of every area for one enabled-site set and threshold.
///
/// Entries are ordered by area id then site id and summaries by area id, so two
/// relations built from the same inputs serialize to the same bytes.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CoverageRelation {
    threshold: f64,
    entries: Vec<CoverageEntry>,
    summaries: Vec<CoverageSummary>,
}

impl CoverageRelation {
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn entries(&self) -> &[CoverageEntry] {
        &self.entries
    }

    pub fn summaries(&self) -> &[CoverageSummary] {
        &self.summaries
    }

    pub fn summary(&self, area_id: &str) -> Option<&CoverageSummary> {
        self.summaries
            .binary_search_by(|s| s.area_id.as_str().cmp(area_id))
            .ok()
            .map(|i| &self.summaries[i])
    }

    /// `None` when the area is not part of the relation.
    pub fn is_area_covered(&self, area_id: &str) -> Option<bool> {
        self.summary(area_id).map(|s| s.is_covered)
    }

    pub fn entries_for<'a>(&'a self, area_id: &'a str) -> impl Iterator<Item = &'a CoverageEntry> + 'a {
        let start = self
            .entries
            .partition_point(|e| e.area_id.as_str() < area_id);
        self.entries[start..]
            .iter()
            .take_while(move |e| e.area_id == area_id)
    }

    pub fn covering_sites<'a>(&'a self, area_id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries_for(area_id)
            .filter(|e| e.is_covered)
            .map(|e| e.site_id.as_str())
    }

    pub fn covered_area_ids(&self) -> Vec<&str> {
        self.summaries
            .iter()
            .filter(|s| s.is_covered)
            .map(|s| s.area_id.as_str())
            .collect()
    }

    pub fn missing_data(&self) -> Vec<&str> {
        self.summaries
            .iter()
            .filter(|s| s.status == AreaStatus::MissingData)
            .map(|s| s.area_id.as_str())
            .collect()
    }

    /// Fails with `MissingData` if any area has no entry for an enabled site.
    pub fn ensure_complete(&self) -> Result<()> {
        let missing = self.missing_data();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CoverageError::MissingData {
                area_ids: missing.into_iter().map(String::from).collect(),
            })
        }
    }

    pub fn fingerprint(&self) -> serde_json::Result<String> {
        fingerprint(self)
    }
}

/// Classifies every area against the enabled sites and `threshold`.
///
/// Matrix entries for sites absent from `sites` are ignored. Missing entries
/// never count as zero minutes; an area without any entry for an enabled site
/// is flagged [`AreaStatus::MissingData`] instead of failing the whole run.
pub fn compute_coverage(
    areas: &[AreaUnit],
    sites: &[ServiceSite],
    travel_times: &TravelTimes,
    threshold: f64,
) -> Result<CoverageRelation> {
    let threshold = Threshold::new(threshold)?.minutes();
    ensure_unique_ids("area", areas.iter().map(AreaUnit::id))?;
    ensure_unique_ids("site", sites.iter().map(ServiceSite::id))?;

    let site_enabled: HashMap<&str, bool> = sites
        .iter()
        .map(|site| (site.id(), site.is_enabled()))
        .collect();
    let mut sorted_areas: Vec<&AreaUnit> = areas.iter().collect();
    sorted_areas.sort_by(|a, b| a.id().cmp(b.id()));

    let mut entries = Vec::with_capacity(travel_times.len());
    let mut summaries = Vec::with_capacity(sorted_areas.len());
    for area in sorted_areas {
        let mut best: Option<(f64, &str)> = None;
        let mut covering_sites = 0;
        // sites_for yields ascending site ids, so keeping the first strict
        // minimum gives the lexicographically smallest site on ties.
        for (site_id, minutes) in travel_times.sites_for(area.id()) {
            let Some(&enabled) = site_enabled.get(site_id) else {
                continue;
            };
            let is_covered = enabled && minutes <= threshold;
            if enabled && best.map_or(true, |(best_minutes, _)| minutes < best_minutes) {
                best = Some((minutes, site_id));
            }
            if is_covered {
                covering_sites += 1;
            }
            entries.push(CoverageEntry {
                area_id: area.id().to_string(),
                site_id: site_id.to_string(),
                travel_time: minutes,
                site_enabled: enabled,
                is_covered,
            });
        }
        let status = match best {
            None => AreaStatus::MissingData,
            Some((minutes, _)) if minutes <= threshold => AreaStatus::Covered,
            Some(_) => AreaStatus::OverThreshold,
        };
        summaries.push(CoverageSummary {
            area_id: area.id().to_string(),
            best_travel_time: best.map(|(minutes, _)| minutes),
            best_site: best.map(|(_, site_id)| site_id.to_string()),
            covering_sites,
            is_covered: status == AreaStatus::Covered,
            status,
        });
    }

    let relation = CoverageRelation {
        threshold,
        entries,
        summaries,
    };
    let missing = relation.missing_data();
    if !missing.is_empty() {
        warn!(
            "{} area(s) have no travel time to any enabled site",
            missing.len()
        );
    }
    debug!(
        "Coverage at {} min: {}/{} areas covered from {} entries",
        threshold,
        relation.covered_area_ids().len(),
        relation.summaries.len(),
        relation.entries.len()
    );
    Ok(relation)
}
