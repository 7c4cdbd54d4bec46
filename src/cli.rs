//! Command-line arguments for the `bess-sizing` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use bess_sizing::tariff::{DispatchMode, OPTION_S};

#[derive(Debug, Parser)]
#[command(name = "bess-sizing")]
#[command(author, version, about = "Battery dispatch simulator and peak-shaving sizing engine")]
#[command(
    long_about = "Simulates threshold dispatch of a battery against a facility load \
    profile and sizes battery portfolios against monthly demand charges.\n\
    \nExamples:\n  \
    bess-sizing simulate --synthetic 30 --capacity-kwh 500 --power-kw 250 --threshold-kw 700\n  \
    bess-sizing select --profile load.csv --catalog catalog.toml --demand-rate 20 --target 20\n  \
    bess-sizing option-s --profile load.csv --capacity-kwh 500 --power-kw 250 --threshold-kw 700"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run flat-threshold dispatch for one battery
    Simulate(SimulateArgs),

    /// Find the guaranteed monthly demand cap for one battery
    Caps(CapsArgs),

    /// Search for the threshold with the best value inside a payback band
    Optimize(OptimizeArgs),

    /// Rank catalog batteries by marginal analysis and economics
    Select(SelectArgs),

    /// Run window dispatch under a time-of-use schedule and compare bills
    #[command(name = "option-s")]
    OptionS(OptionSArgs),
}

/// Where the load profile comes from.
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct ProfileSource {
    /// CSV file with `timestamp,kw` columns
    #[arg(long, value_name = "CSV")]
    pub profile: Option<PathBuf>,

    /// Generate this many days of synthetic facility load instead
    #[arg(long, value_name = "DAYS")]
    pub synthetic: Option<usize>,
}

#[derive(Debug, Args)]
pub struct SyntheticArgs {
    /// Seed for the synthetic generator
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Synthetic interval length in minutes
    #[arg(long, default_value_t = 15)]
    pub step_minutes: i64,
}

/// Engine configuration source.
#[derive(Debug, Args)]
pub struct ConfigSource {
    /// Engine configuration TOML file
    #[arg(long, value_name = "TOML", conflicts_with = "preset")]
    pub config: Option<PathBuf>,

    /// Built-in configuration preset (default, strict, lenient)
    #[arg(long)]
    pub preset: Option<String>,
}

#[derive(Debug, Args)]
pub struct BatteryArgs {
    #[arg(long)]
    pub capacity_kwh: f64,

    #[arg(long)]
    pub power_kw: f64,

    #[arg(long, default_value_t = 0.9)]
    pub efficiency: f64,
}

#[derive(Debug, Args)]
pub struct OutputArgs {
    /// Write the result as JSON to this path
    #[arg(long, value_name = "PATH")]
    pub json: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub source: ProfileSource,
    #[command(flatten)]
    pub synthetic: SyntheticArgs,
    #[command(flatten)]
    pub battery: BatteryArgs,

    /// Net load the battery tries to hold
    #[arg(long)]
    pub threshold_kw: f64,

    /// Export the dispatched series as CSV
    #[arg(long, value_name = "PATH")]
    pub telemetry_out: Option<PathBuf>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct CapsArgs {
    #[command(flatten)]
    pub source: ProfileSource,
    #[command(flatten)]
    pub synthetic: SyntheticArgs,
    #[command(flatten)]
    pub config: ConfigSource,
    #[command(flatten)]
    pub battery: BatteryArgs,

    /// Demand charge in $/kW-month
    #[arg(long)]
    pub demand_rate: f64,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct OptimizeArgs {
    #[command(flatten)]
    pub source: ProfileSource,
    #[command(flatten)]
    pub synthetic: SyntheticArgs,
    #[command(flatten)]
    pub config: ConfigSource,
    #[command(flatten)]
    pub battery: BatteryArgs,

    #[arg(long)]
    pub demand_rate: f64,

    /// Installed cost of the battery in dollars
    #[arg(long)]
    pub system_cost: f64,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct SelectArgs {
    #[command(flatten)]
    pub source: ProfileSource,
    #[command(flatten)]
    pub synthetic: SyntheticArgs,
    #[command(flatten)]
    pub config: ConfigSource,

    /// Battery catalog TOML file
    #[arg(long, value_name = "TOML")]
    pub catalog: PathBuf,

    #[arg(long)]
    pub demand_rate: f64,

    /// Target peak reduction in percent
    #[arg(long, default_value_t = 20.0)]
    pub target: f64,

    /// Print the marginal analysis of every evaluated battery
    #[arg(long, default_value_t = false)]
    pub verbose: bool,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct OptionSArgs {
    #[command(flatten)]
    pub source: ProfileSource,
    #[command(flatten)]
    pub synthetic: SyntheticArgs,
    #[command(flatten)]
    pub battery: BatteryArgs,

    #[arg(long)]
    pub threshold_kw: f64,

    /// Bundled schedule name or a schedule TOML file
    #[arg(long, default_value = OPTION_S)]
    pub schedule: String,

    /// Dispatch mode (auto, window-threshold, window-flatten)
    #[arg(long, default_value = "auto")]
    pub mode: DispatchMode,

    /// Export the window-dispatched series as CSV
    #[arg(long, value_name = "PATH")]
    pub telemetry_out: Option<PathBuf>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("bess-sizing").chain(args.iter().copied()))
    }

    #[test]
    fn supports_simulate_with_profile() {
        let cli = parse(&[
            "simulate",
            "--profile",
            "load.csv",
            "--capacity-kwh",
            "100",
            "--power-kw",
            "50",
            "--threshold-kw",
            "80",
        ])
        .expect("parse should succeed");
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(
            args.source.profile.as_deref().and_then(|p| p.to_str()),
            Some("load.csv")
        );
        assert_eq!(args.battery.efficiency, 0.9);
        assert_eq!(args.threshold_kw, 80.0);
    }

    #[test]
    fn supports_synthetic_select_with_preset() {
        let cli = parse(&[
            "select",
            "--synthetic",
            "30",
            "--seed",
            "7",
            "--preset",
            "strict",
            "--catalog",
            "catalog.toml",
            "--demand-rate",
            "20",
        ])
        .expect("parse should succeed");
        let Command::Select(args) = cli.command else {
            panic!("expected select");
        };
        assert_eq!(args.source.synthetic, Some(30));
        assert_eq!(args.synthetic.seed, 7);
        assert_eq!(args.config.preset.as_deref(), Some("strict"));
        assert_eq!(args.target, 20.0);
    }

    #[test]
    fn profile_sources_are_mutually_exclusive() {
        let err = parse(&[
            "caps",
            "--profile",
            "load.csv",
            "--synthetic",
            "7",
            "--capacity-kwh",
            "100",
            "--power-kw",
            "50",
            "--demand-rate",
            "20",
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn profile_source_is_required() {
        assert!(parse(&["caps", "--capacity-kwh", "1", "--power-kw", "1", "--demand-rate", "1"]).is_err());
    }

    #[test]
    fn option_s_parses_dispatch_mode() {
        let cli = parse(&[
            "option-s",
            "--synthetic",
            "7",
            "--capacity-kwh",
            "100",
            "--power-kw",
            "50",
            "--threshold-kw",
            "500",
            "--mode",
            "window-flatten",
        ])
        .expect("parse should succeed");
        let Command::OptionS(args) = cli.command else {
            panic!("expected option-s");
        };
        assert_eq!(args.mode, DispatchMode::WindowFlatten);
        assert_eq!(args.schedule, OPTION_S);
    }

    #[test]
    fn rejects_unknown_dispatch_mode() {
        assert!(
            parse(&[
                "option-s",
                "--synthetic",
                "7",
                "--capacity-kwh",
                "1",
                "--power-kw",
                "1",
                "--threshold-kw",
                "1",
                "--mode",
                "sideways",
            ])
            .is_err()
        );
    }
}
