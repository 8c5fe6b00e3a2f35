//! Runtime configuration.
//!
//! Three layers, later ones winning: built-in defaults, an optional TOML
//! configuration file, and command-line flags. A malformed file is fatal;
//! unknown keys in the file are warned about and ignored.
//!
//! ```toml
//! # mzqual.toml
//! metrics_type = "nistms"
//! raw_data_format = "mzML"
//! raw_data_path = "/data/raw"
//! chromatogram_output = false
//! spectrum_filters = ["msLevel 1,2"]
//! cpus = 8
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use log::warn;
use serde::Deserialize;

use crate::filter::FilterRule;

/// Which metric family an input file feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetricsType {
    /// The NIST MS QC panel computed from an idpDB + raw pair.
    #[default]
    NistMs,
    /// ScanRanker score summaries (recognized, not computed).
    ScanRanker,
    /// Pepitome library-search summaries (recognized, not computed).
    Pepitome,
}

impl FromStr for MetricsType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nistms" => Ok(MetricsType::NistMs),
            "scanranker" => Ok(MetricsType::ScanRanker),
            "pepitome" => Ok(MetricsType::Pepitome),
            other => bail!("unknown metrics type '{other}' (expected nistms, scanranker or pepitome)"),
        }
    }
}

impl fmt::Display for MetricsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricsType::NistMs => "nistms",
            MetricsType::ScanRanker => "scanranker",
            MetricsType::Pepitome => "pepitome",
        };
        f.write_str(name)
    }
}

/// Effective configuration handed to discovery and the worker pool.
#[derive(Debug, Clone)]
pub struct QualConfig {
    pub metrics_type: MetricsType,
    /// Extension used to find the raw file next to an id database.
    pub raw_data_format: String,
    /// When set, raw files are looked up in this directory instead.
    pub raw_data_path: Option<PathBuf>,
    /// Also emit the XICs as a chromatogram mzML per run.
    pub chromatogram_output: bool,
    /// Spectrum filter rules, unparsed.
    pub spectrum_filters: Vec<String>,
    /// Worker count override; defaults to the logical CPU count.
    pub cpus: Option<usize>,
}

impl Default for QualConfig {
    fn default() -> Self {
        Self {
            metrics_type: MetricsType::NistMs,
            raw_data_format: "mzML".to_string(),
            raw_data_path: None,
            chromatogram_output: false,
            spectrum_filters: Vec::new(),
            cpus: None,
        }
    }
}

impl QualConfig {
    /// Worker count to use.
    pub fn effective_cpus(&self) -> usize {
        self.cpus.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Validate and parse the filter rule strings.
    pub fn parsed_filters(&self) -> Result<Vec<FilterRule>> {
        FilterRule::parse_all(self.spectrum_filters.iter().map(String::as_str))
            .context("invalid spectrum filter")
    }

    /// Fold a configuration file into this configuration.
    pub fn apply_file(&mut self, file: &ConfigFile) -> Result<()> {
        if let Some(ref mt) = file.metrics_type {
            self.metrics_type = mt.parse()?;
        }
        if let Some(ref fmt) = file.raw_data_format {
            self.raw_data_format = fmt.clone();
        }
        if let Some(ref path) = file.raw_data_path {
            self.raw_data_path = Some(path.clone());
        }
        if let Some(chrom) = file.chromatogram_output {
            self.chromatogram_output = chrom;
        }
        if let Some(ref filters) = file.spectrum_filters {
            self.spectrum_filters = filters.clone();
        }
        if let Some(cpus) = file.cpus {
            self.cpus = Some(cpus);
        }
        Ok(())
    }

    /// Effective configuration, one `key = value` per line (`--dump`).
    pub fn dump(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("metrics_type = \"{}\"\n", self.metrics_type));
        out.push_str(&format!("raw_data_format = \"{}\"\n", self.raw_data_format));
        match &self.raw_data_path {
            Some(p) => out.push_str(&format!("raw_data_path = \"{}\"\n", p.display())),
            None => out.push_str("raw_data_path = \"\"\n"),
        }
        out.push_str(&format!(
            "chromatogram_output = {}\n",
            self.chromatogram_output
        ));
        out.push_str(&format!("spectrum_filters = {:?}\n", self.spectrum_filters));
        out.push_str(&format!("cpus = {}\n", self.effective_cpus()));
        out
    }
}

/// Keys a configuration file may set; everything is optional.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    pub metrics_type: Option<String>,
    pub raw_data_format: Option<String>,
    pub raw_data_path: Option<PathBuf>,
    pub chromatogram_output: Option<bool>,
    pub spectrum_filters: Option<Vec<String>>,
    pub cpus: Option<usize>,
}

const KNOWN_KEYS: &[&str] = &[
    "metrics_type",
    "raw_data_format",
    "raw_data_path",
    "chromatogram_output",
    "spectrum_filters",
    "cpus",
];

impl ConfigFile {
    /// Load a configuration file; malformed TOML is fatal.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        let value: toml::Value =
            toml::from_str(content).context("Failed to parse TOML configuration")?;
        if let Some(table) = value.as_table() {
            for key in table.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    warn!("ignoring unrecognized configuration key \"{key}\"");
                }
            }
        }
        value
            .try_into()
            .context("Failed to parse TOML configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QualConfig::default();
        assert_eq!(config.metrics_type, MetricsType::NistMs);
        assert_eq!(config.raw_data_format, "mzML");
        assert!(!config.chromatogram_output);
        assert!(config.effective_cpus() >= 1);
    }

    #[test]
    fn test_parse_full_file() {
        let file = ConfigFile::from_str(
            r#"
            metrics_type = "nistms"
            raw_data_format = "mzML"
            raw_data_path = "/data/raw"
            chromatogram_output = true
            spectrum_filters = ["msLevel 1,2", "scanTime [0,3600]"]
            cpus = 4
            "#,
        )
        .unwrap();
        let mut config = QualConfig::default();
        config.apply_file(&file).unwrap();
        assert!(config.chromatogram_output);
        assert_eq!(config.cpus, Some(4));
        assert_eq!(config.raw_data_path.as_deref(), Some(Path::new("/data/raw")));
        assert_eq!(config.parsed_filters().unwrap().len(), 2);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = ConfigFile::from_str("cpus = 2").unwrap();
        let mut config = QualConfig::default();
        config.apply_file(&file).unwrap();
        assert_eq!(config.cpus, Some(2));
        assert_eq!(config.raw_data_format, "mzML");
    }

    #[test]
    fn test_malformed_file_is_fatal() {
        assert!(ConfigFile::from_str("cpus = ").is_err());
    }

    #[test]
    fn test_unknown_key_is_tolerated() {
        let file = ConfigFile::from_str("SomeFutureKey = 3\ncpus = 2").unwrap();
        assert_eq!(file.cpus, Some(2));
    }

    #[test]
    fn test_bad_metrics_type_is_fatal() {
        let file = ConfigFile::from_str("metrics_type = \"bogus\"").unwrap();
        let mut config = QualConfig::default();
        assert!(config.apply_file(&file).is_err());
    }

    #[test]
    fn test_bad_filter_rule_fails_validation() {
        let config = QualConfig {
            spectrum_filters: vec!["bogus 1".to_string()],
            ..Default::default()
        };
        assert!(config.parsed_filters().is_err());
    }

    #[test]
    fn test_dump_lists_effective_values() {
        let config = QualConfig {
            raw_data_path: Some(PathBuf::from("/data")),
            cpus: Some(3),
            ..Default::default()
        };
        let dumped = config.dump();
        assert!(dumped.contains("metrics_type = \"nistms\""));
        assert!(dumped.contains("cpus = 3"));
    }
}
