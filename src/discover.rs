//! Input discovery.
//!
//! Each command-line mask names an identification database directly or
//! through a single-directory `*`/`?` pattern. Every source recorded in
//! a matched database becomes one work unit, provided its raw file can
//! be found: first by source name, then by the database filename stem,
//! inside `raw_data_path` when configured, else beside the database.
//! Databases without a usable raw file are skipped quietly; masks that
//! match nothing at all are fatal.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::{MetricsType, QualConfig};
use crate::iddb::IdDatabase;

/// Identification-database extension accepted for the QC panel.
const IDDB_EXTENSION: &str = "idpDB";

/// One work unit: a raw run joined with one source of an id database.
#[derive(Debug, Clone)]
pub struct RunInput {
    pub raw_path: PathBuf,
    pub iddb_path: PathBuf,
    pub source_id: i64,
    pub source_name: String,
}

/// Errors that abort discovery.
#[derive(Debug, thiserror::Error)]
pub enum DiscoverError {
    #[error("no data sources found with the given file masks")]
    NoInputs,

    #[error("I/O error scanning {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Expand all masks and build the immutable work list.
pub fn discover(masks: &[String], config: &QualConfig) -> Result<Vec<RunInput>, DiscoverError> {
    let mut matched = Vec::new();
    for mask in masks {
        matched.extend(expand_mask(Path::new(mask))?);
    }
    if matched.is_empty() {
        return Err(DiscoverError::NoInputs);
    }
    matched.sort();
    matched.dedup();

    let mut inputs = Vec::new();
    for path in matched {
        if config.metrics_type != MetricsType::NistMs {
            warn!(
                "{}: metrics type '{}' is not computed by this tool; skipped",
                path.display(),
                config.metrics_type
            );
            continue;
        }
        let is_iddb = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(IDDB_EXTENSION))
            .unwrap_or(false);
        if !is_iddb {
            warn!("{}: not an identification database; skipped", path.display());
            continue;
        }
        inputs.extend(sources_of(&path, config));
    }
    Ok(inputs)
}

/// Work units for every source of one database.
fn sources_of(iddb_path: &Path, config: &QualConfig) -> Vec<RunInput> {
    let db = match IdDatabase::open(iddb_path) {
        Ok(db) => db,
        Err(e) => {
            warn!("{e}; file skipped");
            return Vec::new();
        }
    };
    let sources = match db.sources() {
        Ok(s) => s,
        Err(e) => {
            warn!("{e}; file skipped");
            return Vec::new();
        }
    };

    let raw_dir = config
        .raw_data_path
        .clone()
        .or_else(|| iddb_path.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    let db_stem = iddb_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut inputs = Vec::new();
    for source in sources {
        let candidates = [
            raw_dir.join(format!("{}.{}", source.name, config.raw_data_format)),
            raw_dir.join(format!("{}.{}", db_stem, config.raw_data_format)),
        ];
        match candidates.iter().find(|p| p.exists()) {
            Some(raw_path) => {
                info!(
                    "queueing {} (source '{}')",
                    raw_path.display(),
                    source.name
                );
                inputs.push(RunInput {
                    raw_path: raw_path.clone(),
                    iddb_path: iddb_path.to_path_buf(),
                    source_id: source.id,
                    source_name: source.name,
                });
            }
            None => {
                warn!(
                    "{}: no raw file for source '{}'; skipped",
                    iddb_path.display(),
                    source.name
                );
            }
        }
    }
    inputs
}

/// Expand one mask into existing paths.
fn expand_mask(mask: &Path) -> Result<Vec<PathBuf>, DiscoverError> {
    let name = mask
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !name.contains('*') && !name.contains('?') {
        return Ok(if mask.exists() {
            vec![mask.to_path_buf()]
        } else {
            Vec::new()
        });
    }

    let dir = match mask.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut matches = Vec::new();
    let entries = std::fs::read_dir(&dir).map_err(|source| DiscoverError::Io {
        path: dir.clone(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| DiscoverError::Io {
            path: dir.clone(),
            source,
        })?;
        let entry_name = entry.file_name().to_string_lossy().into_owned();
        if mask_matches(&name, &entry_name) {
            matches.push(entry.path());
        }
    }
    Ok(matches)
}

/// `*`/`?` wildcard match over a file name.
fn mask_matches(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    // pos in name reachable at each pattern position
    let mut reachable = vec![false; n.len() + 1];
    reachable[0] = true;
    for &pc in &p {
        let mut next = vec![false; n.len() + 1];
        match pc {
            '*' => {
                let mut seen = false;
                for (i, slot) in next.iter_mut().enumerate() {
                    seen = seen || reachable[i];
                    *slot = seen;
                }
            }
            '?' => {
                for i in 0..n.len() {
                    if reachable[i] {
                        next[i + 1] = true;
                    }
                }
            }
            c => {
                for i in 0..n.len() {
                    if reachable[i] && n[i] == c {
                        next[i + 1] = true;
                    }
                }
            }
        }
        reachable = next;
    }
    reachable[n.len()]
}
