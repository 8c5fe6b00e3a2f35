//! Identification database reader.
//!
//! Peptide identifications arrive as a SQLite database, one row per
//! peptide-spectrum match (PSM). The layout this reader consumes:
//!
//! ```sql
//! CREATE TABLE sources (
//!     id INTEGER PRIMARY KEY,
//!     name TEXT NOT NULL
//! );
//! CREATE TABLE peptides (
//!     id INTEGER PRIMARY KEY,
//!     sequence TEXT NOT NULL,
//!     specificity INTEGER NOT NULL   -- 2 = fully tryptic, 1 = semi-tryptic
//! );
//! CREATE TABLE psms (
//!     id INTEGER PRIMARY KEY,
//!     source_id INTEGER NOT NULL REFERENCES sources(id),
//!     peptide_id INTEGER NOT NULL REFERENCES peptides(id),
//!     native_id TEXT NOT NULL,       -- MS2 spectrum native ID
//!     precursor_mz REAL NOT NULL,
//!     charge INTEGER NOT NULL,
//!     score REAL NOT NULL,
//!     mass_error REAL NOT NULL,      -- observed - theoretical, Da
//!     mass_error_ppm REAL NOT NULL
//! );
//! ```
//!
//! All queries are scoped to one source id; a database may carry several
//! runs. Every aggregate the metric panel delegates here (charge
//! histogram, sampling rates, mass-error stats, tryptic counts, median
//! score / precursor m/z) is computed in this module so the pipeline
//! never touches SQL.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use rusqlite::Connection;

use crate::stats::{first_quartile, median_sorted, sorted, third_quartile};

/// Schema consumed by [`IdDatabase`], exposed for writers and tests.
pub const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS sources (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS peptides (
    id INTEGER PRIMARY KEY,
    sequence TEXT NOT NULL,
    specificity INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS psms (
    id INTEGER PRIMARY KEY,
    source_id INTEGER NOT NULL REFERENCES sources(id),
    peptide_id INTEGER NOT NULL REFERENCES peptides(id),
    native_id TEXT NOT NULL,
    precursor_mz REAL NOT NULL,
    charge INTEGER NOT NULL,
    score REAL NOT NULL,
    mass_error REAL NOT NULL,
    mass_error_ppm REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_psms_source ON psms(source_id);
";

/// Errors from the identification database.
#[derive(Debug, thiserror::Error)]
pub enum IdDbError {
    #[error("SQLite error in {path}: {source}")]
    Sqlite {
        path: PathBuf,
        source: rusqlite::Error,
    },
}

/// One run recorded in the database.
#[derive(Debug, Clone)]
pub struct SourceEntry {
    pub id: i64,
    pub name: String,
}

/// Identified ion data for one peptide, input to XIC window construction.
#[derive(Debug, Clone)]
pub struct PeptideIons {
    pub peptide_id: i64,
    /// Distinct precursor m/z values observed for this peptide.
    pub precursor_mzs: Vec<f64>,
    /// Native IDs of the MS2 spectra that identified it, in PSM order.
    pub native_ids: Vec<String>,
}

/// Peptides binned by how often they were sampled.
#[derive(Debug, Clone, Copy, Default)]
pub struct SamplingRates {
    pub once: usize,
    pub twice: usize,
    pub thrice: usize,
}

/// Precursor mass-error aggregates (MS1-5A..D).
#[derive(Debug, Clone, Copy)]
pub struct MassErrorStats {
    pub median_error: f64,
    pub mean_abs_error: f64,
    pub median_ppm_error: f64,
    pub ppm_error_iqr: f64,
}

/// Digestion-specificity aggregates (P-2A..C, P-3 numerator/denominator).
#[derive(Debug, Clone, Copy, Default)]
pub struct TrypticCounts {
    /// MS2 spectra matched to fully tryptic peptides.
    pub tryptic_spectra: usize,
    /// Distinct fully tryptic peptide ions (peptide x charge).
    pub tryptic_ions: usize,
    /// Distinct fully tryptic peptide sequences.
    pub unique_fully_tryptic: usize,
    /// Distinct semi-tryptic peptide sequences.
    pub unique_semi_tryptic: usize,
}

/// Read-only handle on an identification database.
pub struct IdDatabase {
    conn: Connection,
    path: PathBuf,
}

impl IdDatabase {
    /// Open an existing database read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IdDbError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(
            &path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        )
        .map_err(|source| IdDbError::Sqlite {
            path: path.clone(),
            source,
        })?;
        Ok(Self { conn, path })
    }

    fn wrap<T>(&self, r: rusqlite::Result<T>) -> Result<T, IdDbError> {
        r.map_err(|source| IdDbError::Sqlite {
            path: self.path.clone(),
            source,
        })
    }

    /// All runs recorded in this database.
    pub fn sources(&self) -> Result<Vec<SourceEntry>, IdDbError> {
        let run = || -> rusqlite::Result<Vec<SourceEntry>> {
            let mut stmt = self.conn.prepare("SELECT id, name FROM sources ORDER BY id")?;
            let rows = stmt.query_map([], |row| {
                Ok(SourceEntry {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?;
            rows.collect()
        };
        self.wrap(run())
    }

    /// Native IDs of every identified MS2 spectrum for the source.
    pub fn native_ids(&self, source_id: i64) -> Result<HashSet<String>, IdDbError> {
        let run = || -> rusqlite::Result<HashSet<String>> {
            let mut stmt = self
                .conn
                .prepare("SELECT DISTINCT native_id FROM psms WHERE source_id = ?1")?;
            let rows = stmt.query_map([source_id], |row| row.get::<_, String>(0))?;
            rows.collect()
        };
        self.wrap(run())
    }

    /// Per-peptide ion data for XIC window construction, in peptide order.
    pub fn peptide_ions(&self, source_id: i64) -> Result<Vec<PeptideIons>, IdDbError> {
        let run = || -> rusqlite::Result<Vec<PeptideIons>> {
            let mut stmt = self.conn.prepare(
                "SELECT peptide_id, precursor_mz, native_id FROM psms \
                 WHERE source_id = ?1 ORDER BY peptide_id, id",
            )?;
            let mut by_peptide: BTreeMap<i64, PeptideIons> = BTreeMap::new();
            let rows = stmt.query_map([source_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            for row in rows {
                let (peptide_id, mz, native_id) = row?;
                let entry = by_peptide.entry(peptide_id).or_insert_with(|| PeptideIons {
                    peptide_id,
                    precursor_mzs: Vec::new(),
                    native_ids: Vec::new(),
                });
                if !entry.precursor_mzs.iter().any(|m| (m - mz).abs() < 1e-6) {
                    entry.precursor_mzs.push(mz);
                }
                entry.native_ids.push(native_id);
            }
            Ok(by_peptide.into_values().collect())
        };
        self.wrap(run())
    }

    /// Peptide -> native-ID list for peptides identified at least twice.
    pub fn duplicate_ids(&self, source_id: i64) -> Result<Vec<(i64, Vec<String>)>, IdDbError> {
        let ions = self.peptide_ions(source_id)?;
        Ok(ions
            .into_iter()
            .filter(|p| p.native_ids.len() >= 2)
            .map(|p| (p.peptide_id, p.native_ids))
            .collect())
    }

    /// Histogram of peptides identified exactly once / twice / three times.
    pub fn sampling_rates(&self, source_id: i64) -> Result<SamplingRates, IdDbError> {
        let run = || -> rusqlite::Result<SamplingRates> {
            let mut stmt = self.conn.prepare(
                "SELECT COUNT(*) AS n FROM psms WHERE source_id = ?1 GROUP BY peptide_id",
            )?;
            let rows = stmt.query_map([source_id], |row| row.get::<_, i64>(0))?;
            let mut rates = SamplingRates::default();
            for n in rows {
                match n? {
                    1 => rates.once += 1,
                    2 => rates.twice += 1,
                    3 => rates.thrice += 1,
                    _ => {}
                }
            }
            Ok(rates)
        };
        self.wrap(run())
    }

    /// Distinct peptide-ion count per precursor charge state.
    pub fn charge_counts(&self, source_id: i64) -> Result<BTreeMap<i64, usize>, IdDbError> {
        let run = || -> rusqlite::Result<BTreeMap<i64, usize>> {
            let mut stmt = self.conn.prepare(
                "SELECT charge, COUNT(*) FROM \
                 (SELECT DISTINCT peptide_id, charge FROM psms WHERE source_id = ?1) \
                 GROUP BY charge",
            )?;
            let rows = stmt.query_map([source_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? as usize))
            })?;
            rows.collect()
        };
        self.wrap(run())
    }

    /// Precursor mass-error aggregates; `None` when the source has no PSMs.
    pub fn mass_error_stats(&self, source_id: i64) -> Result<Option<MassErrorStats>, IdDbError> {
        let run = || -> rusqlite::Result<(Vec<f64>, Vec<f64>)> {
            let mut stmt = self.conn.prepare(
                "SELECT mass_error, mass_error_ppm FROM psms WHERE source_id = ?1",
            )?;
            let rows = stmt.query_map([source_id], |row| {
                Ok((row.get::<_, f64>(0)?, row.get::<_, f64>(1)?))
            })?;
            let mut errors = Vec::new();
            let mut ppm = Vec::new();
            for row in rows {
                let (e, p) = row?;
                errors.push(e);
                ppm.push(p);
            }
            Ok((errors, ppm))
        };
        let (errors, ppm) = self.wrap(run())?;
        if errors.is_empty() {
            return Ok(None);
        }

        let sorted_errors = sorted(&errors);
        let sorted_ppm = sorted(&ppm);
        let mean_abs = errors.iter().map(|e| e.abs()).sum::<f64>() / errors.len() as f64;
        let iqr = match (first_quartile(&sorted_ppm), third_quartile(&sorted_ppm)) {
            (Some(q1), Some(q3)) => q3.value - q1.value,
            _ => f64::NAN,
        };
        Ok(Some(MassErrorStats {
            median_error: median_sorted(&sorted_errors).unwrap_or(f64::NAN),
            mean_abs_error: mean_abs,
            median_ppm_error: median_sorted(&sorted_ppm).unwrap_or(f64::NAN),
            ppm_error_iqr: iqr,
        }))
    }

    /// Digestion-specificity aggregates.
    pub fn tryptic_counts(&self, source_id: i64) -> Result<TrypticCounts, IdDbError> {
        let run = || -> rusqlite::Result<TrypticCounts> {
            let spectra: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM psms p JOIN peptides pep ON pep.id = p.peptide_id \
                 WHERE p.source_id = ?1 AND pep.specificity = 2",
                [source_id],
                |row| row.get(0),
            )?;
            let ions: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM \
                 (SELECT DISTINCT p.peptide_id, p.charge FROM psms p \
                  JOIN peptides pep ON pep.id = p.peptide_id \
                  WHERE p.source_id = ?1 AND pep.specificity = 2)",
                [source_id],
                |row| row.get(0),
            )?;
            let fully: i64 = self.conn.query_row(
                "SELECT COUNT(DISTINCT p.peptide_id) FROM psms p \
                 JOIN peptides pep ON pep.id = p.peptide_id \
                 WHERE p.source_id = ?1 AND pep.specificity = 2",
                [source_id],
                |row| row.get(0),
            )?;
            let semi: i64 = self.conn.query_row(
                "SELECT COUNT(DISTINCT p.peptide_id) FROM psms p \
                 JOIN peptides pep ON pep.id = p.peptide_id \
                 WHERE p.source_id = ?1 AND pep.specificity = 1",
                [source_id],
                |row| row.get(0),
            )?;
            Ok(TrypticCounts {
                tryptic_spectra: spectra as usize,
                tryptic_ions: ions as usize,
                unique_fully_tryptic: fully as usize,
                unique_semi_tryptic: semi as usize,
            })
        };
        self.wrap(run())
    }

    /// Median PSM score (P-1); `None` without PSMs.
    pub fn median_id_score(&self, source_id: i64) -> Result<Option<f64>, IdDbError> {
        let run = || -> rusqlite::Result<Vec<f64>> {
            let mut stmt = self
                .conn
                .prepare("SELECT score FROM psms WHERE source_id = ?1")?;
            let rows = stmt.query_map([source_id], |row| row.get::<_, f64>(0))?;
            rows.collect()
        };
        let scores = self.wrap(run())?;
        Ok(median_sorted(&sorted(&scores)))
    }

    /// Median precursor m/z over distinct peptide ions (IS-2).
    pub fn median_precursor_mz(&self, source_id: i64) -> Result<Option<f64>, IdDbError> {
        let run = || -> rusqlite::Result<Vec<f64>> {
            let mut stmt = self.conn.prepare(
                "SELECT AVG(precursor_mz) FROM psms WHERE source_id = ?1 \
                 GROUP BY peptide_id, charge",
            )?;
            let rows = stmt.query_map([source_id], |row| row.get::<_, f64>(0))?;
            rows.collect()
        };
        let mzs = self.wrap(run())?;
        Ok(median_sorted(&sorted(&mzs)))
    }
}
