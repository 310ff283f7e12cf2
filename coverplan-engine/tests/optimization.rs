use coverplan_engine::{
    generate_instance, optimize, AreaUnit, Coordinates, CoverageError, FallbackReason,
    OptimalityStatus, OptimizationEngine, OptimizerConfig, PlanningInput, PopulationWeights,
    ServiceSite, SolveLimits, Track, TravelTimeEntry, TravelTimes, GREEDY_APPROXIMATION_RATIO,
};
use coverplan_engine::optimization::{Constraint, Problem};
use coverplan_utils::{approx_eq, jsonify};
use std::time::Duration;

const GENEROUS: Duration = Duration::from_secs(60);

fn area(id: &str, population: f64) -> AreaUnit {
    AreaUnit::new(id, population).unwrap()
}

fn site(id: &str) -> ServiceSite {
    ServiceSite::new(id, Coordinates::new(0.0, 0.0), 1, true).unwrap()
}

fn matrix(entries: &[(&str, &str, f64)]) -> TravelTimes {
    TravelTimes::from_entries(
        entries
            .iter()
            .map(|&(a, s, m)| TravelTimeEntry::new(a, s, m).unwrap()),
    )
    .unwrap()
}

// Greedy takes the overlapping S3 first and ends at 32; {S1, S2} reaches 42.
fn greedy_trap() -> (Vec<AreaUnit>, Vec<ServiceSite>, TravelTimes) {
    let areas = vec![
        area("A1", 10.0),
        area("A2", 11.0),
        area("A3", 11.0),
        area("A4", 10.0),
    ];
    let sites = vec![site("S1"), site("S2"), site("S3")];
    let travel_times = matrix(&[
        ("A1", "S1", 5.0),
        ("A2", "S1", 5.0),
        ("A3", "S2", 5.0),
        ("A4", "S2", 5.0),
        ("A2", "S3", 5.0),
        ("A3", "S3", 5.0),
        ("A1", "S3", 25.0),
        ("A4", "S3", 25.0),
    ]);
    (areas, sites, travel_times)
}

fn covering(input: &PlanningInput, threshold: f64) -> Vec<(String, Vec<usize>)> {
    let mut sites: Vec<&ServiceSite> = input.sites.iter().filter(|s| s.is_enabled()).collect();
    sites.sort_by(|a, b| a.id().cmp(b.id()));
    let mut areas: Vec<&AreaUnit> = input.areas.iter().collect();
    areas.sort_by(|a, b| a.id().cmp(b.id()));
    sites
        .iter()
        .map(|s| {
            let reached = areas
                .iter()
                .enumerate()
                .filter(|(_, a)| {
                    input
                        .travel_times
                        .get(a.id(), s.id())
                        .is_some_and(|m| m <= threshold)
                })
                .map(|(i, _)| i)
                .collect();
            (s.id().to_string(), reached)
        })
        .collect()
}

fn sorted_populations(input: &PlanningInput) -> Vec<f64> {
    let mut areas: Vec<&AreaUnit> = input.areas.iter().collect();
    areas.sort_by(|a, b| a.id().cmp(b.id()));
    areas.iter().map(|a| a.population()).collect()
}

fn value_of(chosen: &[usize], cover: &[(String, Vec<usize>)], populations: &[f64]) -> f64 {
    let mut covered = vec![false; populations.len()];
    for &s in chosen {
        for &a in &cover[s].1 {
            covered[a] = true;
        }
    }
    populations
        .iter()
        .zip(&covered)
        .filter(|(_, c)| **c)
        .fold(0.0, |total, (p, _)| total + p)
}

fn brute_force(cover: &[(String, Vec<usize>)], populations: &[f64], k: usize) -> f64 {
    let n = cover.len();
    let mut best = 0.0f64;
    for mask in 0u32..(1 << n) {
        if mask.count_ones() as usize > k {
            continue;
        }
        let chosen: Vec<usize> = (0..n).filter(|i| mask & (1 << i) != 0).collect();
        best = best.max(value_of(&chosen, cover, populations));
    }
    best
}

// Re-scores every candidate each round; ties go to the smallest site id.
fn plain_greedy(cover: &[(String, Vec<usize>)], populations: &[f64], k: usize) -> Vec<String> {
    let mut covered = vec![false; populations.len()];
    let mut chosen = Vec::new();
    let mut taken = vec![false; cover.len()];
    while chosen.len() < k {
        let mut best: Option<(f64, usize)> = None;
        for (s, (_, areas)) in cover.iter().enumerate().filter(|(s, _)| !taken[*s]) {
            let gain = areas
                .iter()
                .filter(|&&a| !covered[a])
                .fold(0.0, |g, &a| g + populations[a]);
            if best.map_or(true, |(g, _)| gain > g) {
                best = Some((gain, s));
            }
        }
        match best {
            Some((gain, s)) if gain > 0.0 => {
                taken[s] = true;
                for &a in &cover[s].1 {
                    covered[a] = true;
                }
                chosen.push(cover[s].0.clone());
            }
            _ => break,
        }
    }
    chosen.sort();
    chosen
}

#[test]
fn test_picks_site_covering_larger_population() {
    let areas = vec![area("A1", 100.0), area("A2", 50.0)];
    let sites = vec![site("S1"), site("S2")];
    let travel_times = matrix(&[("A1", "S1", 4.0), ("A2", "S2", 4.0)]);
    let weights = PopulationWeights::from_areas(&areas);

    let result = optimize(&areas, &sites, &travel_times, &weights, 1, 8.0, GENEROUS).unwrap();
    assert_eq!(result.selected_sites, vec!["S1"]);
    assert!(approx_eq(result.weighted_coverage, 100.0));
    assert!(approx_eq(result.total_weight, 150.0));
    assert_eq!(result.uncovered_areas, vec!["A2"]);
    assert!(result.is_exact());
    assert!(result.unreachable_areas.is_empty());
}

#[test]
fn test_zero_budget_selects_nothing() {
    let (areas, sites, travel_times) = greedy_trap();
    let weights = PopulationWeights::from_areas(&areas);
    let result = optimize(&areas, &sites, &travel_times, &weights, 0, 10.0, GENEROUS).unwrap();
    assert!(result.selected_sites.is_empty());
    assert_eq!(result.weighted_coverage, 0.0);
    assert_eq!(result.status, OptimalityStatus::Exact);
    assert_eq!(result.uncovered_areas.len(), 4);
}

#[test]
fn test_budget_covering_every_candidate_selects_all_enabled() {
    let (areas, mut sites, travel_times) = greedy_trap();
    sites.push(
        ServiceSite::new("S0", Coordinates::new(1.0, 1.0), 1, false).unwrap(),
    );
    let weights = PopulationWeights::from_areas(&areas);
    for k in [3, 4, 100] {
        let result =
            optimize(&areas, &sites, &travel_times, &weights, k, 10.0, Duration::ZERO).unwrap();
        assert_eq!(result.selected_sites, vec!["S1", "S2", "S3"]);
        assert!(result.is_exact());
        assert!(approx_eq(result.weighted_coverage, 42.0));
    }
}

#[test]
fn test_malformed_inputs_are_infeasible() {
    let (areas, sites, travel_times) = greedy_trap();
    let weights = PopulationWeights::from_areas(&areas);
    let run = |candidates: &[ServiceSite], k: i64, threshold: f64| {
        optimize(&areas, candidates, &travel_times, &weights, k, threshold, GENEROUS)
    };
    assert!(matches!(run(&sites, -1, 10.0), Err(CoverageError::Infeasible { .. })));
    assert!(matches!(run(&sites, 1, 0.0), Err(CoverageError::Infeasible { .. })));
    assert!(matches!(run(&sites, 1, -3.0), Err(CoverageError::Infeasible { .. })));
    assert!(matches!(run(&[], 1, 10.0), Err(CoverageError::Infeasible { .. })));

    let empty = run(&[], 0, 10.0).unwrap();
    assert!(empty.selected_sites.is_empty());
    assert!(empty.is_exact());
}

#[test]
fn test_exact_search_beats_greedy_trap() {
    let (areas, sites, travel_times) = greedy_trap();
    let weights = PopulationWeights::from_areas(&areas);
    let result = optimize(&areas, &sites, &travel_times, &weights, 2, 10.0, GENEROUS).unwrap();
    assert_eq!(result.selected_sites, vec!["S1", "S2"]);
    assert!(approx_eq(result.weighted_coverage, 42.0));
    assert!(approx_eq(result.weighted_coverage_pct, 100.0));
    assert!(result.is_exact());
    assert!(result.uncovered_areas.is_empty());
}

#[test]
fn test_zero_time_limit_falls_back_to_greedy() {
    let (areas, sites, travel_times) = greedy_trap();
    let weights = PopulationWeights::from_areas(&areas);
    let result =
        optimize(&areas, &sites, &travel_times, &weights, 2, 10.0, Duration::ZERO).unwrap();

    assert_eq!(result.selected_sites, vec!["S1", "S3"]);
    assert!(approx_eq(result.weighted_coverage, 32.0));
    assert_eq!(result.uncovered_areas, vec!["A4"]);
    match &result.status {
        OptimalityStatus::HeuristicApproximate {
            approximation_ratio,
            fallback_reason,
            solver,
        } => {
            assert!(approx_eq(*approximation_ratio, 1.0 - 1.0 / std::f64::consts::E));
            assert_eq!(*fallback_reason, FallbackReason::TimeLimit);
            assert_eq!(solver, "greedy");
        }
        other => panic!("unexpected status {:?}", other),
    }
    assert!(result.weighted_coverage >= GREEDY_APPROXIMATION_RATIO * 42.0);
    assert!(result.metrics.is_some());
}

#[test]
fn test_node_limit_falls_back() {
    let (areas, sites, travel_times) = greedy_trap();
    let weights = PopulationWeights::from_areas(&areas);
    let limits = SolveLimits::new(GENEROUS).with_node_limit(1);
    let result = OptimizationEngine::default()
        .optimize(&areas, &sites, &travel_times, &weights, 2, 10.0, limits)
        .unwrap();
    assert!(matches!(
        result.status,
        OptimalityStatus::HeuristicApproximate {
            fallback_reason: FallbackReason::NodeLimit,
            ..
        }
    ));
}

#[test]
fn test_swap_search_fallback_escapes_greedy_trap() {
    let (areas, sites, travel_times) = greedy_trap();
    let weights = PopulationWeights::from_areas(&areas);
    let config = OptimizerConfig {
        local_search: Some(true),
        ..OptimizerConfig::default()
    };
    let result = OptimizationEngine::new(config)
        .optimize(
            &areas,
            &sites,
            &travel_times,
            &weights,
            2,
            10.0,
            SolveLimits::new(Duration::ZERO),
        )
        .unwrap();
    assert_eq!(result.selected_sites, vec!["S1", "S2"]);
    assert!(approx_eq(result.weighted_coverage, 42.0));
    match &result.status {
        OptimalityStatus::HeuristicApproximate { solver, .. } => {
            assert_eq!(solver, "greedy_swap_search")
        }
        other => panic!("unexpected status {:?}", other),
    }
}

#[test]
fn test_unreachable_areas_stay_in_gap_list() {
    let (mut areas, sites, travel_times) = greedy_trap();
    areas.push(area("A9", 500.0));
    let weights = PopulationWeights::from_areas(&areas);
    let result = optimize(&areas, &sites, &travel_times, &weights, 2, 10.0, GENEROUS).unwrap();
    assert_eq!(result.unreachable_areas, vec!["A9"]);
    assert_eq!(result.uncovered_areas, vec!["A9"]);
    assert!(result.is_exact());
}

#[test]
fn test_exact_and_greedy_on_synthetic_instances() {
    let track = Track {
        num_areas: 40,
        num_sites: 10,
        threshold: 15.0,
        missing_rate: 0.1,
    };
    for seed in 0u8..6 {
        let input = generate_instance(&[seed; 32], &track).unwrap();
        let weights = input.weights();
        let cover = covering(&input, track.threshold);
        let populations = sorted_populations(&input);
        for k in [1usize, 2, 3] {
            let optimum = brute_force(&cover, &populations, k);
            let exact = optimize(
                &input.areas,
                &input.sites,
                &input.travel_times,
                &weights,
                k as i64,
                track.threshold,
                GENEROUS,
            )
            .unwrap();
            assert!(exact.is_exact());
            assert!(approx_eq(exact.weighted_coverage, optimum));

            let greedy = optimize(
                &input.areas,
                &input.sites,
                &input.travel_times,
                &weights,
                k as i64,
                track.threshold,
                Duration::ZERO,
            )
            .unwrap();
            assert_eq!(greedy.selected_sites, plain_greedy(&cover, &populations, k));
            assert!(greedy.weighted_coverage >= GREEDY_APPROXIMATION_RATIO * optimum - 1e-6);
            assert!(greedy.weighted_coverage <= exact.weighted_coverage + 1e-6);
        }
    }
}

#[test]
fn test_repeated_runs_are_identical() {
    let track = Track {
        num_areas: 80,
        num_sites: 15,
        ..Track::default()
    };
    let input = generate_instance(&[42u8; 32], &track).unwrap();
    let weights = input.weights();
    let run = |limit: Duration| {
        let result = optimize(
            &input.areas,
            &input.sites,
            &input.travel_times,
            &weights,
            5,
            input.threshold,
            limit,
        )
        .unwrap();
        jsonify(&result).unwrap()
    };
    assert_eq!(run(Duration::ZERO), run(Duration::ZERO));
    assert_eq!(run(GENEROUS), run(GENEROUS));
}

#[test]
fn test_constraint_rows_match_selection_checks() {
    let (areas, sites, travel_times) = greedy_trap();
    let weights = PopulationWeights::from_areas(&areas);
    let problem = Problem::build(&areas, &sites, &travel_times, &weights, 2, 10.0).unwrap();

    assert_eq!(
        problem.constraints(),
        vec![
            Constraint::Coverage { area: 0, sites: vec![0] },
            Constraint::Coverage { area: 1, sites: vec![0, 2] },
            Constraint::Coverage { area: 2, sites: vec![1, 2] },
            Constraint::Coverage { area: 3, sites: vec![1] },
            Constraint::Cardinality { max_selected: 2 },
        ]
    );
    assert_eq!(problem.sites_of(1), &[0, 2]);

    assert!(approx_eq(problem.check_selection(&[0, 1]).unwrap(), 42.0));
    assert!(approx_eq(problem.check_selection(&[2, 0]).unwrap(), 32.0));
    assert!(approx_eq(problem.check_selection(&[]).unwrap(), 0.0));
    assert!(matches!(
        problem.check_selection(&[0, 1, 2]),
        Err(CoverageError::Validation { .. })
    ));
    assert!(problem.check_selection(&[0, 0]).is_err());
    assert!(problem.check_selection(&[3]).is_err());
}
