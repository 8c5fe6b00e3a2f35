//! The per-run metric pipeline.
//!
//! Ties the stages together for one (raw file, id source) pair: survey
//! the spectra, fix the identification-time quartiles, extract the XICs
//! on a second pass, pick one peak per window and derive the panel. The
//! caller owns reader opening and report writing; nothing is written
//! here except the optional chromatogram file.

use crate::chromatogram::{write_chromatograms, ChromatogramError};
use crate::iddb::{IdDatabase, IdDbError};
use crate::metrics::{
    derive_metrics, id_time_quartiles, select_window_peaks, IdAggregates, MetricsError,
    MetricsPanel,
};
use crate::reader::{ReaderError, SpectrumSource};
use crate::survey::{survey_run, SurveyError};
use crate::xic::build_xics;

/// Any failure that aborts one run. Other runs are unaffected.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Survey(#[from] SurveyError),

    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error(transparent)]
    IdDb(#[from] IdDbError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error(transparent)]
    Chromatogram(#[from] ChromatogramError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Compute the full metric panel for one run.
pub fn compute_panel(
    source: &dyn SpectrumSource,
    db: &IdDatabase,
    source_id: i64,
    chromatogram_output: bool,
) -> Result<MetricsPanel, RunError> {
    let identified_ids = db.native_ids(source_id)?;

    let survey = survey_run(source, &identified_ids)?;
    let (_, q3) = id_time_quartiles(&survey).ok_or(MetricsError::NoIdentifiedSpectra)?;

    let peptides = db.peptide_ions(source_id)?;
    let xics = build_xics(source, &peptides, &survey, &identified_ids, q3.value)?;

    if chromatogram_output {
        let run_id = source
            .path()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "run".to_string());
        write_chromatograms(&xics, source.path(), &run_id)?;
    }

    let peaks = select_window_peaks(&xics);
    let aggregates = IdAggregates {
        duplicates: db.duplicate_ids(source_id)?,
        sampling: db.sampling_rates(source_id)?,
        charges: db.charge_counts(source_id)?,
        mass_errors: db.mass_error_stats(source_id)?,
        tryptic: db.tryptic_counts(source_id)?,
        median_id_score: db.median_id_score(source_id)?,
        median_precursor_mz: db.median_precursor_mz(source_id)?,
    };

    let filename = source.path().display().to_string();
    Ok(derive_metrics(
        &filename, &survey, &xics, &peaks, &aggregates,
    )?)
}
