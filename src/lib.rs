//! # mzQual - QC Metrics for LC-MS Proteomics Runs
//!
//! `mzqual` computes a fixed panel of ~40 quality-assurance indicators
//! for a mass-spectrometry run: chromatographic stability, duty cycle,
//! dynamic range, identification quality, precursor mass accuracy,
//! sampling efficiency, charge-state balance and digestion statistics.
//!
//! A run is a raw mzML file joined with one source of a peptide
//! identification database (SQLite). The pipeline makes two streaming
//! passes over the spectrum list:
//!
//! 1. **Survey** ([`survey`]): classify spectra by MS level, record
//!    retention times, TICs and injection times, stamp each MS2 with its
//!    parent MS1, and split MS2s into identified and unidentified
//!    populations against the database.
//! 2. **Extraction** ([`xic`]): build extracted-ion chromatograms for
//!    peptide windows and per-scan precursor windows, plus the MS1/MS2
//!    signal-to-noise accumulators.
//!
//! Each window is then reduced to its best chromatographic peak
//! ([`peaks`]) and the panel is derived ([`metrics`]) and written as a
//! tab-separated `.qual.txt` ([`report`]). A worker pool processes many
//! runs concurrently ([`orchestrate`]), serializing only the raw-file
//! open calls.
//!
//! ## Library example
//!
//! ```rust,no_run
//! use mzqual::iddb::IdDatabase;
//! use mzqual::pipeline::compute_panel;
//! use mzqual::reader::open_raw;
//! use mzqual::report::write_panel;
//!
//! let db = IdDatabase::open("run01.idpDB")?;
//! let source = open_raw("run01.mzML".as_ref())?;
//! let panel = compute_panel(&source, &db, 1, false)?;
//! write_panel(&panel, "run01.mzML".as_ref())?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Modules
//!
//! - [`stats`]: streaming accumulators and quartile/decile selection
//! - [`mzml`]: streaming mzML spectrum parser
//! - [`reader`]: spectrum-source abstraction consumed by both passes
//! - [`filter`]: spectrum filter rules applied in front of the reader
//! - [`iddb`]: identification database queries
//! - [`survey`], [`xic`], [`peaks`], [`metrics`]: the metric pipeline
//! - [`report`], [`chromatogram`]: per-run outputs
//! - [`discover`], [`config`], [`orchestrate`]: the batch layer

pub mod chromatogram;
pub mod config;
pub mod discover;
pub mod filter;
pub mod iddb;
pub mod metrics;
pub mod mzml;
pub mod orchestrate;
pub mod peaks;
pub mod pipeline;
pub mod reader;
pub mod report;
pub mod stats;
pub mod survey;
pub mod xic;

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::{MetricsType, QualConfig};
    pub use crate::discover::{discover, RunInput};
    pub use crate::filter::{FilterDecision, FilterRule};
    pub use crate::iddb::{IdDatabase, MassErrorStats, SamplingRates, TrypticCounts};
    pub use crate::metrics::{derive_metrics, IdAggregates, MetricsPanel, WindowPeaks};
    pub use crate::mzml::{MzmlStreamer, RawSpectrum};
    pub use crate::orchestrate::run_all;
    pub use crate::peaks::{find_peaks, pick_closest_peak, ChromPeak, PickedPeak};
    pub use crate::pipeline::{compute_panel, RunError};
    pub use crate::reader::{open_raw, MemorySource, MzmlSource, SpectrumSource};
    pub use crate::report::{render, write_panel};
    pub use crate::stats::Accumulator;
    pub use crate::survey::{survey_run, RunSurvey};
    pub use crate::xic::{build_xics, XicOutcome, XicWindow};
}
