use coverplan_structs::config::{EngineConfig, OptimizerConfig, SolveLimits};
use coverplan_structs::core::*;
use coverplan_structs::CoverageError;
use coverplan_utils::{dejsonify, jsonify};
use serde_json::json;
use std::time::Duration;

fn site(id: &str) -> ServiceSite {
    ServiceSite::new(id, Coordinates::new(0.0, 0.0), 4, true).unwrap()
}

#[test]
fn test_area_unit_rejects_negative_population() {
    assert!(matches!(
        AreaUnit::new("E01000001", -1.0),
        Err(CoverageError::Validation { .. })
    ));
    assert!(AreaUnit::new("", 10.0).is_err());
    assert!(AreaUnit::new("E01000001", f64::NAN).is_err());
    let area = AreaUnit::new("E01000001", 0.0)
        .unwrap()
        .with_attribute("deprivation_decile", "2");
    assert_eq!(area.attribute("deprivation_decile"), Some("2"));
}

#[test]
fn test_area_unit_deserialization_is_validated() {
    let ok: AreaUnit = dejsonify(r#"{"id":"A1","population":120.5}"#).unwrap();
    assert_eq!(ok.population(), 120.5);
    assert!(ok.attributes().is_empty());
    assert!(dejsonify::<AreaUnit>(r#"{"id":"A1","population":-3}"#).is_err());
}

#[test]
fn test_service_site_defaults() {
    let parsed: ServiceSite =
        dejsonify(r#"{"id":"S1","coordinates":{"x":1.5,"y":-2.0}}"#).unwrap();
    assert!(parsed.is_enabled());
    assert_eq!(parsed.capacity(), 0);
    assert!(!parsed.with_enabled(false).is_enabled());
    assert_eq!(parsed.with_enabled(false).id(), "S1");
    assert!(ServiceSite::new("S2", Coordinates::new(f64::INFINITY, 0.0), 1, true).is_err());
}

#[test]
fn test_travel_times_reject_duplicates_and_negatives() {
    let entries = vec![
        TravelTimeEntry::new("A1", "S1", 4.0).unwrap(),
        TravelTimeEntry::new("A1", "S1", 6.0).unwrap(),
    ];
    assert!(matches!(
        TravelTimes::from_entries(entries),
        Err(CoverageError::Validation { .. })
    ));
    assert!(TravelTimeEntry::new("A1", "S1", -0.5).is_err());
}

#[test]
fn test_travel_times_lookup() {
    let travel_times = TravelTimes::from_entries(vec![
        TravelTimeEntry::new("A1", "S2", 9.0).unwrap(),
        TravelTimeEntry::new("A1", "S1", 4.0).unwrap(),
        TravelTimeEntry::new("A2", "S1", 0.0).unwrap(),
    ])
    .unwrap();
    assert_eq!(travel_times.len(), 3);
    assert_eq!(travel_times.get("A1", "S2"), Some(9.0));
    assert_eq!(travel_times.get("A2", "S2"), None);
    assert_eq!(
        travel_times.sites_for("A1").collect::<Vec<_>>(),
        vec![("S1", 4.0), ("S2", 9.0)]
    );
    assert_eq!(travel_times.sites_for("A3").count(), 0);

    let json = jsonify(&travel_times).unwrap();
    let parsed: TravelTimes = dejsonify(&json).unwrap();
    assert_eq!(parsed, travel_times);
    assert!(dejsonify::<TravelTimes>(
        r#"[{"area_id":"A1","site_id":"S1","minutes":1},{"area_id":"A1","site_id":"S1","minutes":2}]"#
    )
    .is_err());
}

#[test]
fn test_threshold_and_scenario() {
    assert!(Threshold::new(0.0).is_err());
    assert!(Threshold::new(-8.0).is_err());
    assert!(Threshold::new(f64::INFINITY).is_err());
    assert_eq!(Threshold::new(8.0).unwrap().minutes(), 8.0);

    let scenario = Scenario::new("baseline", ["S2", "S1"], 8.0).unwrap();
    assert!(scenario.enables("S1"));
    assert!(!scenario.enables("S3"));
    assert_eq!(
        scenario.enabled_sites().iter().cloned().collect::<Vec<_>>(),
        vec!["S1".to_string(), "S2".to_string()]
    );
    assert!(Scenario::new("bad", ["S1"], 0.0).is_err());
    assert!(dejsonify::<Scenario>(r#"{"name":"x","enabled_sites":[],"threshold":-1}"#).is_err());
}

#[test]
fn test_population_weights() {
    let areas = vec![
        AreaUnit::new("A1", 100.0)
            .unwrap()
            .with_attribute("decile", "1"),
        AreaUnit::new("A2", 50.0).unwrap(),
    ];
    let weights = PopulationWeights::from_areas(&areas);
    assert_eq!(weights.len(), 2);
    assert_eq!(weights.weight("A1"), Some(100.0));
    assert_eq!(
        weights.attributes("A1").and_then(|a| a.get("decile")).cloned(),
        Some("1".to_string())
    );
    assert!(weights.attributes("A2").is_none());
    assert!(PopulationWeights::new([("A1".to_string(), -2.0)].into_iter().collect()).is_err());
}

#[test]
fn test_planning_input_validate() {
    let input: PlanningInput = serde_json::from_value(json!({
        "areas": [{"id": "A1", "population": 10}, {"id": "A2", "population": 5}],
        "sites": [{"id": "S1", "coordinates": {"x": 0, "y": 0}}],
        "travel_times": [{"area_id": "A1", "site_id": "S1", "minutes": 3}],
        "threshold": 8,
        "scenarios": [{"name": "all", "enabled_sites": ["S1"], "threshold": 8}]
    }))
    .unwrap();
    assert!(input.validate().is_ok());
    assert_eq!(input.scenario("all").unwrap().name(), "all");
    assert!(input.scenario("missing").is_err());

    let mut unknown_site = input.clone();
    unknown_site.travel_times =
        TravelTimes::from_entries(vec![TravelTimeEntry::new("A1", "S9", 3.0).unwrap()]).unwrap();
    assert!(unknown_site.validate().is_err());

    let mut duplicate_area = input.clone();
    duplicate_area.areas.push(AreaUnit::new("A1", 1.0).unwrap());
    assert!(duplicate_area.validate().is_err());

    let mut bad_threshold = input.clone();
    bad_threshold.threshold = 0.0;
    assert!(bad_threshold.validate().is_err());

    let mut bad_scenario = input;
    bad_scenario.scenarios = Some(vec![Scenario::new("x", ["S7"], 5.0).unwrap()]);
    assert!(bad_scenario.validate().is_err());
}

#[test]
fn test_ensure_unique_ids() {
    assert!(ensure_unique_ids("site", ["S1", "S2"]).is_ok());
    assert!(ensure_unique_ids("site", ["S1", "S2", "S1"]).is_err());
    assert!(site("S1").capacity() == 4);
}

#[test]
fn test_optimizer_config_defaults() {
    let config: EngineConfig = dejsonify("{}").unwrap();
    assert_eq!(config, EngineConfig::default());
    let optimizer = config.optimizer().cloned().unwrap_or_default();
    assert_eq!(
        optimizer.limits(),
        SolveLimits {
            time_limit: Duration::from_millis(OptimizerConfig::DEFAULT_TIME_LIMIT_MS),
            node_limit: OptimizerConfig::DEFAULT_NODE_LIMIT,
        }
    );
    assert!(!optimizer.local_search_enabled());

    let config: EngineConfig =
        dejsonify(r#"{"optimizer":{"time_limit_ms":250,"local_search":true}}"#).unwrap();
    let optimizer = config.optimizer().unwrap();
    assert_eq!(optimizer.limits().time_limit, Duration::from_millis(250));
    assert!(optimizer.local_search_enabled());
    assert_eq!(optimizer.swap_iterations(), 100);
}
