use coverplan_structs::{
    core::{AreaUnit, Coordinates, PlanningInput, Scenario, ServiceSite, TravelTimeEntry, TravelTimes},
    CoverageError, Result,
};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Side length of the square the generator scatters areas and sites over.
pub const REGION_SIZE: f64 = 100.0;
/// Minutes of travel per unit of straight-line distance.
pub const MINUTES_PER_UNIT: f64 = 0.5;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Track {
    pub num_areas: usize,
    pub num_sites: usize,
    pub threshold: f64,
    /// Share of (area, site) pairs left unmeasured.
    #[serde(default)]
    pub missing_rate: f64,
}

impl Default for Track {
    fn default() -> Self {
        Self {
            num_areas: 200,
            num_sites: 30,
            threshold: 15.0,
            missing_rate: 0.0,
        }
    }
}

fn padded_id(prefix: &str, index: usize, count: usize) -> String {
    let width = count.max(1).to_string().len();
    format!("{}{:0width$}", prefix, index, width = width)
}

/// Builds a reproducible planning input from `seed`.
///
/// Travel time is scaled Euclidean distance plus up to five minutes of noise.
/// Two scenarios are attached: `baseline` enables every other site and
/// `expanded` enables them all.
pub fn generate_instance(seed: &[u8; 32], track: &Track) -> Result<PlanningInput> {
    if !(0.0..1.0).contains(&track.missing_rate) {
        return Err(CoverageError::validation(format!(
            "Missing rate must be in [0, 1), got {}",
            track.missing_rate
        )));
    }
    let mut rng = SmallRng::from_seed(*seed);

    let mut areas = Vec::with_capacity(track.num_areas);
    let mut area_points = Vec::with_capacity(track.num_areas);
    for i in 0..track.num_areas {
        let point = Coordinates::new(
            rng.gen_range(0.0..REGION_SIZE),
            rng.gen_range(0.0..REGION_SIZE),
        );
        let population = rng.gen_range(100..=5000) as f64;
        let decile: u32 = rng.gen_range(1..=10);
        areas.push(
            AreaUnit::new(padded_id("A", i, track.num_areas), population)?
                .with_attribute("deprivation_decile", decile.to_string()),
        );
        area_points.push(point);
    }

    let sites = (0..track.num_sites)
        .map(|i| {
            let point = Coordinates::new(
                rng.gen_range(0.0..REGION_SIZE),
                rng.gen_range(0.0..REGION_SIZE),
            );
            ServiceSite::new(
                padded_id("S", i, track.num_sites),
                point,
                rng.gen_range(1..=20),
                true,
            )
        })
        .collect::<Result<Vec<ServiceSite>>>()?;

    let mut travel_times = TravelTimes::new();
    for (area, area_point) in areas.iter().zip(&area_points) {
        for site in &sites {
            if track.missing_rate > 0.0 && rng.gen_bool(track.missing_rate) {
                continue;
            }
            let site_point = site.coordinates();
            let distance = (area_point.x - site_point.x).hypot(area_point.y - site_point.y);
            let minutes = distance * MINUTES_PER_UNIT + rng.gen_range(0.0..5.0);
            travel_times.insert(TravelTimeEntry::new(area.id(), site.id(), minutes)?)?;
        }
    }

    let baseline = Scenario::new(
        "baseline",
        sites.iter().step_by(2).map(|site| site.id().to_string()),
        track.threshold,
    )?;
    let expanded = Scenario::new(
        "expanded",
        sites.iter().map(|site| site.id().to_string()),
        track.threshold,
    )?;

    let input = PlanningInput {
        areas,
        sites,
        travel_times,
        threshold: track.threshold,
        scenarios: Some(vec![baseline, expanded]),
    };
    input.validate()?;
    Ok(input)
}
