//! # mzcalc
//!
//! Command-line access to formula masses, isotope patterns and averagine estimates.
//!
//! ```bash
//! mzcalc mass C6H12O6 --charge 1
//! mzcalc pattern C50H80N10O12 --charge 2 --fwhm 0.05
//! mzcalc averagine 1200.5 --charge 2
//! ```

use clap::{Parser, Subcommand};
use log::info;

use mzcalc::algorithm::peak_picking::averagine;
use mzcalc::chemistry::constants::{AVERAGE_AMINO, AVERAGE_BASE};
use mzcalc::{pattern, Agent, Compound, PatternConfig, Result};

/// Mass calculations for chemical formulas
#[derive(Parser)]
#[command(name = "mzcalc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the masses of a formula and the m/z of its ion
    Mass {
        #[arg(value_name = "FORMULA")]
        formula: String,

        #[arg(short = 'z', long, default_value_t = 0, allow_hyphen_values = true)]
        charge: i32,

        /// Charging agent formula, `e` for electrons
        #[arg(short, long, default_value = "H")]
        agent: String,
    },

    /// Print the isotope pattern of a formula
    Pattern {
        #[arg(value_name = "FORMULA")]
        formula: String,

        #[arg(short = 'z', long, default_value_t = 0, allow_hyphen_values = true)]
        charge: i32,

        #[arg(short, long, default_value_t = 0.1)]
        fwhm: f64,

        /// Relative abundance cutoff
        #[arg(short, long, default_value_t = 0.01)]
        threshold: f64,
    },

    /// Print the averagine formula for an m/z value
    Averagine {
        #[arg(value_name = "MZ")]
        mz: f64,

        #[arg(short = 'z', long, default_value_t = 1, allow_hyphen_values = true)]
        charge: i32,

        /// Use nucleotide building blocks instead of amino acids
        #[arg(long)]
        nucleic: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Mass { formula, charge, agent } => run_mass(&formula, charge, &agent),
        Commands::Pattern {
            formula,
            charge,
            fwhm,
            threshold,
        } => run_pattern(&formula, charge, fwhm, threshold),
        Commands::Averagine { mz, charge, nucleic } => run_averagine(mz, charge, nucleic),
    }
}

fn run_mass(formula: &str, charge: i32, agent: &str) -> Result<()> {
    let compound = Compound::new(formula)?;
    let (mono, average) = compound.mass();

    println!("formula:   {}", compound.formula());
    println!("mono:      {:.6}", mono);
    println!("average:   {:.6}", average);
    println!("nominal:   {}", compound.nominal_mass());

    if charge != 0 {
        let agent = Agent::parse(agent)?;
        let agent_charge = if agent == Agent::Electron { -1 } else { 1 };
        let (mono_mz, average_mz) = compound.mz(charge, &agent, agent_charge);
        println!("mono m/z:  {:.6}", mono_mz);
        println!("avg m/z:   {:.6}", average_mz);
    }
    Ok(())
}

fn run_pattern(formula: &str, charge: i32, fwhm: f64, threshold: f64) -> Result<()> {
    let compound = Compound::new(formula)?;
    let config = PatternConfig {
        fwhm,
        threshold,
        charge,
        ..PatternConfig::default()
    };
    let isotopes = pattern(&compound, &config)?;
    info!("{} isotopes above {}", isotopes.len(), threshold);

    for &(mz, abundance) in isotopes.iter() {
        println!("{:.6}\t{:.4}", mz, abundance * 100.0);
    }
    Ok(())
}

fn run_averagine(mz: f64, charge: i32, nucleic: bool) -> Result<()> {
    let composition: &[(&str, f64)] = if nucleic { &AVERAGE_BASE } else { &AVERAGE_AMINO };
    let compound = averagine(mz, charge, composition)?;

    println!("formula:   {}", compound.formula());
    println!("mono:      {:.6}", compound.mono_mass());
    Ok(())
}
