use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

use mzqual::config::{ConfigFile, MetricsType, QualConfig};
use mzqual::discover::discover;
use mzqual::orchestrate::run_all;

/// mzQual - QC metric panels for LC-MS proteomics runs
#[derive(Parser)]
#[command(name = "mzqual")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Change the working directory before doing anything else
    #[arg(long, value_name = "DIR")]
    workdir: Option<PathBuf>,

    /// Worker count (default: logical processors)
    #[arg(long, value_name = "N")]
    cpus: Option<usize>,

    /// Load settings from a TOML config file
    #[arg(long, value_name = "FILE")]
    cfg: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    dump: bool,

    /// Metric family to compute for matched inputs
    #[arg(long, value_enum, value_name = "TYPE")]
    metrics_type: Option<MetricsTypeArg>,

    /// Raw-file extension used to locate the run next to its database
    #[arg(long, value_name = "EXT")]
    raw_data_format: Option<String>,

    /// Directory holding the raw files (default: beside the database)
    #[arg(long, value_name = "DIR")]
    raw_data_path: Option<PathBuf>,

    /// Also emit extracted chromatograms as an mzML file per run
    #[arg(long)]
    chromatogram_output: bool,

    /// Spectrum filter rule, e.g. "msLevel 1,2" (repeatable)
    #[arg(long = "filter", value_name = "RULE")]
    filters: Vec<String>,

    /// Identification-database file masks
    #[arg(value_name = "MASK", required_unless_present = "dump")]
    masks: Vec<String>,
}

/// Metric family selector.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum MetricsTypeArg {
    /// NIST MS QC panel from an idpDB + raw pair
    Nistms,
    /// ScanRanker score summaries
    Scanranker,
    /// Pepitome library-search summaries
    Pepitome,
}

impl From<MetricsTypeArg> for MetricsType {
    fn from(arg: MetricsTypeArg) -> Self {
        match arg {
            MetricsTypeArg::Nistms => MetricsType::NistMs,
            MetricsTypeArg::Scanranker => MetricsType::ScanRanker,
            MetricsTypeArg::Pepitome => MetricsType::Pepitome,
        }
    }
}

impl Cli {
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }
}

pub fn init_logging(verbosity: u8) {
    let log_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();
}

pub fn dispatch(cli: Cli) -> Result<()> {
    if let Some(ref dir) = cli.workdir {
        std::env::set_current_dir(dir)
            .with_context(|| format!("Failed to change directory to {}", dir.display()))?;
    }

    let config = effective_config(&cli)?;

    if cli.dump {
        print!("{}", config.dump());
        return Ok(());
    }

    let filters = config.parsed_filters()?;
    let inputs = discover(&cli.masks, &config)?;
    let failures = run_all(&config, inputs, filters);
    if failures > 0 {
        bail!("{failures} run(s) failed; see the log for details");
    }
    Ok(())
}

/// Defaults, then the config file, then command-line overrides.
fn effective_config(cli: &Cli) -> Result<QualConfig> {
    let mut config = QualConfig::default();
    if let Some(ref path) = cli.cfg {
        let file = ConfigFile::from_file(path)?;
        config.apply_file(&file)?;
    }
    if let Some(mt) = cli.metrics_type {
        config.metrics_type = mt.into();
    }
    if let Some(ref fmt) = cli.raw_data_format {
        config.raw_data_format = fmt.clone();
    }
    if let Some(ref dir) = cli.raw_data_path {
        config.raw_data_path = Some(dir.clone());
    }
    if cli.chromatogram_output {
        config.chromatogram_output = true;
    }
    if !cli.filters.is_empty() {
        config.spectrum_filters = cli.filters.clone();
    }
    if let Some(cpus) = cli.cpus {
        config.cpus = Some(cpus);
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let cli = Cli::try_parse_from(["mzqual", "*.idpDB"]).unwrap();
        assert_eq!(cli.masks, vec!["*.idpDB"]);
        assert!(!cli.dump);
    }

    #[test]
    fn test_masks_required_unless_dump() {
        assert!(Cli::try_parse_from(["mzqual"]).is_err());
        assert!(Cli::try_parse_from(["mzqual", "--dump"]).is_ok());
    }

    #[test]
    fn test_overrides_apply_over_defaults() {
        let cli = Cli::try_parse_from([
            "mzqual",
            "--cpus",
            "3",
            "--raw-data-format",
            "mzML",
            "--chromatogram-output",
            "--filter",
            "msLevel 1,2",
            "--metrics-type",
            "nistms",
            "in.idpDB",
        ])
        .unwrap();
        let config = effective_config(&cli).unwrap();
        assert_eq!(config.cpus, Some(3));
        assert!(config.chromatogram_output);
        assert_eq!(config.spectrum_filters, vec!["msLevel 1,2"]);
        assert_eq!(config.metrics_type, MetricsType::NistMs);
    }

    #[test]
    fn test_bad_filter_is_fatal_before_discovery() {
        let cli = Cli::try_parse_from(["mzqual", "--filter", "bogus 1", "in.idpDB"]).unwrap();
        let config = effective_config(&cli).unwrap();
        assert!(config.parsed_filters().is_err());
    }
}
