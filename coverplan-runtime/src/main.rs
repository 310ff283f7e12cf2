use anyhow::{anyhow, Result};
use clap::{arg, ArgAction, ArgMatches, Command};
use coverplan_engine::{
    compare_scenarios, compute_coverage, compute_metrics, coverage_curve, generate_instance,
    site_contributions, CoverageError, CoverageRelation, MetricsSummary, OptimizationEngine,
    OptimizationResult, SiteContribution, Track,
};
use coverplan_structs::{
    config::EngineConfig,
    core::{PlanningInput, ServiceSite},
};
use coverplan_utils::{compress_obj, dejsonify, jsonify, jsonify_pretty, u8s_from_str};
use serde::Serialize;
use std::{fs, io::Read, path::PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Serialize)]
struct CoverageOutput<'a> {
    fingerprint: String,
    relation: &'a CoverageRelation,
}

#[derive(Serialize)]
struct MetricsOutput<'a> {
    metrics: &'a MetricsSummary,
    site_contributions: Vec<SiteContribution>,
}

fn output_args(command: Command) -> Command {
    command
        .arg(
            arg!(--output [OUTPUT_FILE] "If set, the result will be saved to this file path (default json)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            arg!(--compress "If output file is set, the result will be compressed as zlib")
                .action(ArgAction::SetTrue),
        )
        .arg(arg!(--pretty "Indents uncompressed json output").action(ArgAction::SetTrue))
}

fn input_arg() -> clap::Arg {
    arg!(<INPUT> "Planning input json string, path to json file, or '-' for stdin")
        .value_parser(clap::value_parser!(String))
}

fn threshold_arg() -> clap::Arg {
    arg!(--threshold [MINUTES] "Overrides the threshold of the planning input")
        .value_parser(clap::value_parser!(f64))
}

fn scenario_arg() -> clap::Arg {
    arg!(--scenario [NAME] "Applies a named scenario's site set and threshold")
        .value_parser(clap::value_parser!(String))
}

fn cli() -> Command {
    Command::new("coverplan")
        .about("Evaluates coverage of service sites and optimizes site selection")
        .arg_required_else_help(true)
        .arg(
            arg!(-v --verbose "Log solver and coverage statistics to stderr")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(output_args(
            Command::new("coverage")
                .about("Computes the area/site coverage relation")
                .arg(input_arg())
                .arg(threshold_arg())
                .arg(scenario_arg())
                .arg(
                    arg!(--strict "Fails if any area has no travel time to an enabled site")
                        .action(ArgAction::SetTrue),
                ),
        ))
        .subcommand(output_args(
            Command::new("metrics")
                .about("Computes coverage metrics, gap list and equity breakdown")
                .arg(input_arg())
                .arg(threshold_arg())
                .arg(scenario_arg())
                .arg(
                    arg!(--contributions "Adds per-site covered and unique population")
                        .action(ArgAction::SetTrue),
                ),
        ))
        .subcommand(output_args(
            Command::new("compare")
                .about("Compares two named scenarios of the planning input")
                .arg(input_arg())
                .arg(arg!(<BASELINE> "Baseline scenario name").value_parser(clap::value_parser!(String)))
                .arg(
                    arg!(<ALTERNATIVE> "Alternative scenario name")
                        .value_parser(clap::value_parser!(String)),
                ),
        ))
        .subcommand(output_args(
            Command::new("optimize")
                .about("Selects at most BUDGET enabled sites maximizing weighted coverage")
                .arg(input_arg())
                .arg(
                    arg!(--budget <K> "Maximum number of sites to select")
                        .value_parser(clap::value_parser!(i64))
                        .allow_negative_numbers(true),
                )
                .arg(threshold_arg())
                .arg(
                    arg!(--"time-limit" [MILLISECONDS] "Time limit of the exact search")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(--config [CONFIG] "Engine config json string or path to json file")
                        .value_parser(clap::value_parser!(String)),
                ),
        ))
        .subcommand(output_args(
            Command::new("sweep")
                .about("Computes the coverage curve over several thresholds")
                .arg(input_arg())
                .arg(
                    arg!(--thresholds <MINUTES> "Comma separated thresholds")
                        .value_parser(clap::value_parser!(String)),
                ),
        ))
        .subcommand(output_args(
            Command::new("generate")
                .about("Generates a synthetic planning input")
                .arg(
                    arg!(<SEED> "A string used in seed generation")
                        .value_parser(clap::value_parser!(String)),
                )
                .arg(
                    arg!(--areas [NUM_AREAS] "Number of areas")
                        .default_value("200")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--sites [NUM_SITES] "Number of candidate sites")
                        .default_value("30")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--threshold [MINUTES] "Threshold stored in the planning input")
                        .default_value("15")
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    arg!(--"missing-rate" [RATE] "Share of unmeasured area/site pairs")
                        .default_value("0")
                        .value_parser(clap::value_parser!(f64)),
                ),
        ))
}

fn init_logger(verbose: bool) {
    let default_filter = if verbose {
        "coverplan_engine=debug,coverplan=debug,info"
    } else {
        "coverplan_engine=info,coverplan=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}

fn main() {
    let matches = cli().get_matches();
    init_logger(matches.get_flag("verbose"));

    if let Err(e) = match matches.subcommand() {
        Some(("coverage", sub_m)) => run_coverage(sub_m),
        Some(("metrics", sub_m)) => run_metrics(sub_m),
        Some(("compare", sub_m)) => run_compare(sub_m),
        Some(("optimize", sub_m)) => run_optimize(sub_m),
        Some(("sweep", sub_m)) => run_sweep(sub_m),
        Some(("generate", sub_m)) => run_generate(sub_m),
        _ => Err(anyhow!("Invalid subcommand")),
    } {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn required<'a, T: Clone + Send + Sync + 'static>(sub_m: &'a ArgMatches, id: &str) -> Result<&'a T> {
    sub_m
        .get_one::<T>(id)
        .ok_or_else(|| anyhow!("Missing argument {}", id))
}

fn read_source(source: &str, what: &str) -> Result<String> {
    if source == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|e| anyhow!("Failed to read {} from stdin: {}", what, e))?;
        Ok(buffer)
    } else if source.ends_with(".json") {
        fs::read_to_string(source).map_err(|e| anyhow!("Failed to read {} file {}: {}", what, source, e))
    } else {
        Ok(source.to_string())
    }
}

fn load_input(source: &str) -> Result<PlanningInput> {
    let input: PlanningInput = dejsonify(&read_source(source, "planning input")?)
        .map_err(|e| anyhow!("Failed to parse planning input: {}", e))?;
    input.validate()?;
    Ok(input)
}

fn load_config(source: Option<&String>) -> Result<EngineConfig> {
    match source {
        Some(source) => dejsonify(&read_source(source, "config")?)
            .map_err(|e| anyhow!("Failed to parse config: {}", e)),
        None => Ok(EngineConfig::default()),
    }
}

fn render<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    Ok(if pretty {
        jsonify_pretty(value)?
    } else {
        jsonify(value)?
    })
}

fn write_output<T: Serialize>(value: &T, sub_m: &ArgMatches) -> Result<()> {
    let pretty = sub_m.get_flag("pretty");
    match sub_m.get_one::<PathBuf>("output") {
        Some(path) => {
            if sub_m.get_flag("compress") {
                fs::write(path, compress_obj(value)?)?;
            } else {
                fs::write(path, render(value, pretty)?)?;
            }
            info!("Result written to: {:?}", path);
        }
        None => println!("{}", render(value, pretty)?),
    }
    Ok(())
}

/// Sites and threshold after applying `--scenario` and `--threshold`.
fn effective_view(input: &PlanningInput, sub_m: &ArgMatches) -> Result<(Vec<ServiceSite>, f64)> {
    let (sites, threshold) = match sub_m.get_one::<String>("scenario") {
        Some(name) => {
            let scenario = input.scenario(name)?;
            let sites = input
                .sites
                .iter()
                .map(|site| site.with_enabled(scenario.enables(site.id())))
                .collect();
            (sites, scenario.threshold().minutes())
        }
        None => (input.sites.clone(), input.threshold),
    };
    Ok((
        sites,
        sub_m.get_one::<f64>("threshold").copied().unwrap_or(threshold),
    ))
}

fn run_coverage(sub_m: &ArgMatches) -> Result<()> {
    let input = load_input(required::<String>(sub_m, "INPUT")?)?;
    let (sites, threshold) = effective_view(&input, sub_m)?;
    let relation = compute_coverage(&input.areas, &sites, &input.travel_times, threshold)?;
    if sub_m.get_flag("strict") {
        relation.ensure_complete()?;
    }
    write_output(
        &CoverageOutput {
            fingerprint: relation.fingerprint()?,
            relation: &relation,
        },
        sub_m,
    )
}

fn run_metrics(sub_m: &ArgMatches) -> Result<()> {
    let input = load_input(required::<String>(sub_m, "INPUT")?)?;
    let (sites, threshold) = effective_view(&input, sub_m)?;
    let weights = input.weights();
    let relation = compute_coverage(&input.areas, &sites, &input.travel_times, threshold)?;
    let metrics = compute_metrics(&relation, &weights)?;
    if sub_m.get_flag("contributions") {
        write_output(
            &MetricsOutput {
                metrics: &metrics,
                site_contributions: site_contributions(&relation, &weights)?,
            },
            sub_m,
        )
    } else {
        write_output(&metrics, sub_m)
    }
}

fn run_compare(sub_m: &ArgMatches) -> Result<()> {
    let input = load_input(required::<String>(sub_m, "INPUT")?)?;
    let baseline = input.scenario(required::<String>(sub_m, "BASELINE")?)?;
    let alternative = input.scenario(required::<String>(sub_m, "ALTERNATIVE")?)?;
    let comparison = compare_scenarios(
        baseline,
        alternative,
        &input.areas,
        &input.sites,
        &input.travel_times,
        &input.weights(),
    )?;
    info!(
        "'{}' -> '{}': {:+.2} weighted coverage points",
        comparison.baseline, comparison.alternative, comparison.comparison.weighted_coverage_pct_delta
    );
    write_output(&comparison, sub_m)
}

fn run_optimize(sub_m: &ArgMatches) -> Result<()> {
    let input = load_input(required::<String>(sub_m, "INPUT")?)?;
    let budget = *required::<i64>(sub_m, "budget")?;
    let threshold = sub_m
        .get_one::<f64>("threshold")
        .copied()
        .unwrap_or(input.threshold);

    let config = load_config(sub_m.get_one::<String>("config"))?;
    let mut optimizer = config.optimizer.unwrap_or_default();
    if let Some(time_limit_ms) = sub_m.get_one::<u64>("time-limit") {
        optimizer.time_limit_ms = Some(*time_limit_ms);
    }
    let limits = optimizer.limits();

    let result = match OptimizationEngine::new(optimizer).optimize(
        &input.areas,
        &input.sites,
        &input.travel_times,
        &input.weights(),
        budget,
        threshold,
        limits,
    ) {
        Ok(result) => result,
        Err(CoverageError::Infeasible { message }) => {
            warn!("Infeasible request: {}", message);
            OptimizationResult::infeasible(budget, threshold, message)
        }
        Err(e) => return Err(e.into()),
    };
    write_output(&result, sub_m)
}

fn parse_thresholds(thresholds: &str) -> Result<Vec<f64>> {
    thresholds
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.parse::<f64>()
                .map_err(|_| anyhow!("Invalid threshold '{}'", t))
        })
        .collect()
}

fn run_sweep(sub_m: &ArgMatches) -> Result<()> {
    let input = load_input(required::<String>(sub_m, "INPUT")?)?;
    let thresholds = parse_thresholds(required::<String>(sub_m, "thresholds")?)?;
    if thresholds.is_empty() {
        return Err(anyhow!("At least one threshold is required"));
    }
    let curve = coverage_curve(
        &input.areas,
        &input.sites,
        &input.travel_times,
        &input.weights(),
        &thresholds,
    )?;
    write_output(&curve, sub_m)
}

fn run_generate(sub_m: &ArgMatches) -> Result<()> {
    let seed = u8s_from_str(required::<String>(sub_m, "SEED")?);
    let track = Track {
        num_areas: *required::<usize>(sub_m, "areas")?,
        num_sites: *required::<usize>(sub_m, "sites")?,
        threshold: *required::<f64>(sub_m, "threshold")?,
        missing_rate: *required::<f64>(sub_m, "missing-rate")?,
    };
    let input = generate_instance(&seed, &track)?;
    info!(
        "Generated {} areas, {} sites, {} travel times",
        input.areas.len(),
        input.sites.len(),
        input.travel_times.len()
    );
    write_output(&input, sub_m)
}
