//! `bess-sizing` entry point: argument parsing, input loading and report output.

mod cli;

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bess_sizing::battery::BatterySpec;
use bess_sizing::config::EngineConfig;
use bess_sizing::io::catalog::{load_catalog, load_schedule};
use bess_sizing::io::export::export_csv;
use bess_sizing::io::import::import_profile_csv;
use bess_sizing::profile::{FacilityLoad, LoadProfile};
use bess_sizing::sim::kpi::DispatchKpi;
use bess_sizing::sim::simulate;
use bess_sizing::sizing::{
    NpvGrader, compute_cap_discovery_across_months, optimize_threshold_for_value,
    select_optimal_batteries,
};
use bess_sizing::tariff::compare_dispatch_paths;

use cli::{
    BatteryArgs, CapsArgs, Cli, Command, ConfigSource, OptimizeArgs, OptionSArgs, ProfileSource,
    SelectArgs, SimulateArgs, SyntheticArgs,
};

fn init_tracing() {
    // Logs go to stderr so reports on stdout stay clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_profile(source: &ProfileSource, synthetic: &SyntheticArgs) -> Result<LoadProfile> {
    if let Some(path) = &source.profile {
        let profile = import_profile_csv(path)
            .with_context(|| format!("failed to load profile from {}", path.display()))?;
        info!(intervals = profile.len(), path = %path.display(), "profile loaded");
        return Ok(profile);
    }
    let days = source.synthetic.unwrap_or(1);
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .context("invalid synthetic start date")?;
    let profile = FacilityLoad::default()
        .generate(start, days, synthetic.step_minutes, synthetic.seed)
        .context("failed to generate synthetic profile")?;
    info!(days, seed = synthetic.seed, intervals = profile.len(), "synthetic profile generated");
    Ok(profile)
}

fn load_config(source: &ConfigSource) -> Result<EngineConfig> {
    // --config takes priority, then --preset, then defaults
    let config = if let Some(path) = &source.config {
        EngineConfig::from_toml_file(path)?
    } else if let Some(name) = &source.preset {
        EngineConfig::from_preset(name)?
    } else {
        EngineConfig::default()
    };

    let errors = config.validate();
    if !errors.is_empty() {
        let lines: Vec<String> = errors.iter().map(ToString::to_string).collect();
        bail!("invalid configuration:\n{}", lines.join("\n"));
    }
    Ok(config)
}

fn battery_spec(args: &BatteryArgs) -> BatterySpec {
    BatterySpec::new(args.capacity_kwh, args.power_kw, args.efficiency)
}

fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("failed to write JSON to {}", path.display()))?;
    eprintln!("Result written to {}", path.display());
    Ok(())
}

fn run_simulate(args: &SimulateArgs) -> Result<()> {
    let profile = load_profile(&args.source, &args.synthetic)?;
    let spec = battery_spec(&args.battery);
    let result = simulate(&profile, &spec, args.threshold_kw)?;
    let loads: Vec<f64> = profile.kw().collect();
    let kpi = DispatchKpi::from_result(&result, &loads, &spec);

    println!("{result}");
    println!("\n{kpi}");

    if let Some(path) = &args.telemetry_out {
        export_csv(&profile, &result.net_load_kw, &result.soc_history_kwh, path)
            .with_context(|| format!("failed to write CSV to {}", path.display()))?;
        eprintln!("Telemetry written to {}", path.display());
    }
    write_json(args.output.json.as_deref(), &result)
}

fn run_caps(args: &CapsArgs) -> Result<()> {
    let profile = load_profile(&args.source, &args.synthetic)?;
    let config = load_config(&args.config)?;
    let result = compute_cap_discovery_across_months(
        &profile,
        &battery_spec(&args.battery),
        args.demand_rate,
        &config.search,
    )?;
    println!("{result}");
    write_json(args.output.json.as_deref(), &result)
}

fn run_optimize(args: &OptimizeArgs) -> Result<()> {
    let profile = load_profile(&args.source, &args.synthetic)?;
    let config = load_config(&args.config)?;
    let result = optimize_threshold_for_value(
        &profile,
        &battery_spec(&args.battery),
        args.demand_rate,
        args.system_cost,
        config.threshold,
        &config.search,
    )?;
    println!("{result}");
    write_json(args.output.json.as_deref(), &result)
}

fn run_select(args: &SelectArgs) -> Result<()> {
    let profile = load_profile(&args.source, &args.synthetic)?;
    let config = load_config(&args.config)?;
    let catalog = load_catalog(&args.catalog)?;
    let grader = NpvGrader;

    let result = select_optimal_batteries(
        &profile,
        &catalog,
        args.demand_rate,
        args.target,
        &config,
        &grader,
    )?;
    println!("{result}");

    if args.verbose {
        println!("--- Marginal Analysis ---");
        for analysis in &result.marginal_analysis {
            println!("{analysis}");
        }
    }
    if let Some(fallback) = result.best_effort(&grader, &config) {
        println!("\n{fallback}");
    }
    write_json(args.output.json.as_deref(), &result)
}

fn run_option_s(args: &OptionSArgs) -> Result<()> {
    let profile = load_profile(&args.source, &args.synthetic)?;
    let schedule = load_schedule(&args.schedule)?;
    let comparison = compare_dispatch_paths(
        &profile,
        &battery_spec(&args.battery),
        args.threshold_kw,
        &schedule,
        args.mode,
    )?;
    println!("{comparison}");

    if let Some(path) = &args.telemetry_out {
        let dispatch = &comparison.option_s;
        export_csv(&profile, &dispatch.net_load_kw, &dispatch.soc_history_kwh, path)
            .with_context(|| format!("failed to write CSV to {}", path.display()))?;
        eprintln!("Telemetry written to {}", path.display());
    }
    write_json(args.output.json.as_deref(), &comparison)
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match &cli.command {
        Command::Simulate(args) => run_simulate(args),
        Command::Caps(args) => run_caps(args),
        Command::Optimize(args) => run_optimize(args),
        Command::Select(args) => run_select(args),
        Command::OptionS(args) => run_option_s(args),
    }
}
