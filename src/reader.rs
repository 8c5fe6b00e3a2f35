//! Raw-data source abstraction consumed by the two QC passes.
//!
//! Both passes traverse the spectrum list in native file order; Pass 1
//! asks for headers only, Pass 2 for full arrays. A source hands out a
//! fresh iterator per pass so the two traversals observe identical
//! order and content. Opening a source is not re-entrant across the
//! process (vendor readers behind the same boundary are not), so the
//! orchestrator serializes calls to [`open_raw`]; reading an opened
//! source is private to its worker.

use std::path::{Path, PathBuf};

use crate::filter::{evaluate_all, FilterDecision, FilterRule};
use crate::mzml::{MzmlError, MzmlStreamer, RawSpectrum};

/// Errors surfaced while reading a raw data source.
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("mzML error in {path}: {source}")]
    Mzml { path: PathBuf, source: MzmlError },

    #[error("unsupported raw data format: {0}")]
    UnsupportedFormat(String),
}

/// A stream of spectra in native file order.
pub type SpectrumStream<'a> = Box<dyn Iterator<Item = Result<RawSpectrum, ReaderError>> + 'a>;

/// Sequential view of one raw run.
pub trait SpectrumSource: Send + Sync {
    /// Display path of the underlying run.
    fn path(&self) -> &Path;

    /// Stream all spectra; `with_arrays` controls binary-array decoding.
    fn spectra(&self, with_arrays: bool) -> Result<SpectrumStream<'_>, ReaderError>;
}

/// Open a raw file by extension. mzML is the one wired-in format; the
/// dispatch point exists so vendor formats can slot in behind the same
/// open mutex. The file is probed here so an unreadable path fails
/// inside the serialized open instead of mid-pass.
pub fn open_raw(path: &Path) -> Result<MzmlSource, ReaderError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("mzml") => {
            std::fs::File::open(path).map_err(|e| ReaderError::Mzml {
                path: path.to_path_buf(),
                source: MzmlError::Io(e),
            })?;
            Ok(MzmlSource::new(path))
        }
        other => Err(ReaderError::UnsupportedFormat(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

/// mzML-backed source; re-opens the file for every traversal.
pub struct MzmlSource {
    path: PathBuf,
}

impl MzmlSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl SpectrumSource for MzmlSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn spectra(&self, with_arrays: bool) -> Result<SpectrumStream<'_>, ReaderError> {
        let mut streamer = MzmlStreamer::open(&self.path).map_err(|source| ReaderError::Mzml {
            path: self.path.clone(),
            source,
        })?;
        let path = self.path.clone();
        Ok(Box::new(std::iter::from_fn(move || {
            match streamer.next_spectrum(with_arrays) {
                Ok(Some(s)) => Some(Ok(s)),
                Ok(None) => None,
                Err(source) => Some(Err(ReaderError::Mzml {
                    path: path.clone(),
                    source,
                })),
            }
        })))
    }
}

/// In-memory source for synthetic runs (tests, demos).
pub struct MemorySource {
    path: PathBuf,
    spectra: Vec<RawSpectrum>,
}

impl MemorySource {
    pub fn new<P: Into<PathBuf>>(path: P, spectra: Vec<RawSpectrum>) -> Self {
        Self {
            path: path.into(),
            spectra,
        }
    }
}

impl SpectrumSource for MemorySource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn spectra(&self, with_arrays: bool) -> Result<SpectrumStream<'_>, ReaderError> {
        Ok(Box::new(self.spectra.iter().map(move |s| {
            let mut s = s.clone();
            if !with_arrays {
                s.mz_array.clear();
                s.intensity_array.clear();
            }
            Ok(s)
        })))
    }
}

/// A source with a filter rule set applied in front of it.
///
/// Rules that need the binary arrays force array decoding on the inner
/// stream even for header-only passes, so both passes see the same
/// filtered view; the arrays are stripped again before yielding when the
/// caller did not ask for them.
pub struct FilteredSource<S> {
    inner: S,
    rules: Vec<FilterRule>,
}

impl<S: SpectrumSource> FilteredSource<S> {
    pub fn new(inner: S, rules: Vec<FilterRule>) -> Self {
        Self { inner, rules }
    }
}

impl<S: SpectrumSource> SpectrumSource for FilteredSource<S> {
    fn path(&self) -> &Path {
        self.inner.path()
    }

    fn spectra(&self, with_arrays: bool) -> Result<SpectrumStream<'_>, ReaderError> {
        let needs_arrays = self.rules.iter().any(|r| r.needs_arrays());
        let load_arrays = with_arrays || needs_arrays;
        let stream = self.inner.spectra(load_arrays)?;
        let rules = self.rules.clone();
        Ok(Box::new(stream.filter_map(move |item| {
            let mut spectrum = match item {
                Ok(s) => s,
                Err(e) => return Some(Err(e)),
            };
            match evaluate_all(&rules, &spectrum, load_arrays) {
                FilterDecision::Accept => {
                    if !with_arrays {
                        spectrum.mz_array.clear();
                        spectrum.intensity_array.clear();
                    }
                    Some(Ok(spectrum))
                }
                // NeedsArrays cannot come back once arrays are loaded.
                FilterDecision::Reject | FilterDecision::NeedsArrays => None,
            }
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(n: usize) -> Vec<RawSpectrum> {
        (0..n)
            .map(|i| RawSpectrum {
                index: i as i64,
                native_id: format!("scan={}", i + 1),
                ms_level: if i % 3 == 0 { 1 } else { 2 },
                rt_seconds: Some(10.0 * i as f64),
                mz_array: vec![100.0, 200.0],
                intensity_array: vec![1.0, 2.0],
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_memory_source_strips_arrays_on_header_pass() {
        let source = MemorySource::new("run.mzML", run(4));
        let headers: Vec<_> = source.spectra(false).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(headers.len(), 4);
        assert!(headers.iter().all(|s| s.mz_array.is_empty()));
        let full: Vec<_> = source.spectra(true).unwrap().map(|r| r.unwrap()).collect();
        assert!(full.iter().all(|s| s.mz_array.len() == 2));
    }

    #[test]
    fn test_two_passes_identical_order() {
        let source = MemorySource::new("run.mzML", run(6));
        let first: Vec<String> = source
            .spectra(false)
            .unwrap()
            .map(|r| r.unwrap().native_id)
            .collect();
        let second: Vec<String> = source
            .spectra(true)
            .unwrap()
            .map(|r| r.unwrap().native_id)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_filtered_source_consistent_across_passes() {
        let rules = FilterRule::parse_all(["msLevel 2"]).unwrap();
        let source = FilteredSource::new(MemorySource::new("run.mzML", run(6)), rules);
        let first: Vec<String> = source
            .spectra(false)
            .unwrap()
            .map(|r| r.unwrap().native_id)
            .collect();
        let second: Vec<String> = source
            .spectra(true)
            .unwrap()
            .map(|r| r.unwrap().native_id)
            .collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn test_array_rule_forces_decode_but_strips_output() {
        let rules = FilterRule::parse_all(["arrayLength 2-2"]).unwrap();
        let source = FilteredSource::new(MemorySource::new("run.mzML", run(3)), rules);
        let headers: Vec<_> = source.spectra(false).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(headers.len(), 3);
        assert!(headers.iter().all(|s| s.intensity_array.is_empty()));
    }

    #[test]
    fn test_open_rejects_unknown_extension() {
        assert!(matches!(
            open_raw(Path::new("run.raw")),
            Err(ReaderError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_open_probes_readability() {
        assert!(open_raw(Path::new("/nonexistent/run.mzML")).is_err());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.mzML");
        std::fs::write(&path, "<mzML/>").unwrap();
        assert!(open_raw(&path).is_ok());
    }
}
