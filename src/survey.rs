//! Pass 1: the spectrum survey.
//!
//! One streaming traversal in native file order. MS1 spectra contribute
//! retention time, TIC and injection time; MS2 spectra are stamped with
//! the most recent MS1 as their parent and partitioned into identified
//! and unidentified lists against the identification database's
//! native-ID set. Spectra that are neither MS1 nor MS2 are ignored.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use log::warn;

use crate::reader::{ReaderError, SpectrumSource};
use crate::stats::Accumulator;

/// Errors from the survey pass.
#[derive(Debug, thiserror::Error)]
pub enum SurveyError {
    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error("no spectra in {path}")]
    EmptyRun { path: PathBuf },
}

/// One MS1 spectrum, in file order.
#[derive(Debug, Clone)]
pub struct Ms1Record {
    pub native_id: String,
    pub rt_seconds: f64,
    pub tic: f64,
}

/// One MS2 spectrum joined to its parent MS1.
#[derive(Debug, Clone)]
pub struct Ms2ScanInfo {
    pub native_id: String,
    pub rt_seconds: f64,
    pub precursor_native_id: String,
    /// RT of the parent MS1, anchor for the scan's XIC window.
    pub precursor_rt: f64,
    pub precursor_mz: f64,
    pub precursor_intensity: f64,
}

/// Everything Pass 1 learns about a run.
#[derive(Debug, Default)]
pub struct RunSurvey {
    pub ms1_count: usize,
    pub ms2_count: usize,

    /// MS1 spectra in file order.
    pub ms1_scans: Vec<Ms1Record>,
    /// MS1 native ID -> position in `ms1_scans`.
    pub ms1_index: HashMap<String, usize>,

    /// Retention times of every MS2 seen (file order).
    pub ms2_times: Vec<f64>,

    /// MS2 scans found in the identification set, file order.
    pub identified: Vec<Ms2ScanInfo>,
    /// MS2 native ID -> position in `identified`.
    pub identified_index: HashMap<String, usize>,
    /// MS2 scans not found in the identification set, file order.
    pub unidentified: Vec<Ms2ScanInfo>,

    pub injection_time_ms1: Accumulator,
    pub injection_time_ms2: Accumulator,
    pub ms2_peak_counts: Accumulator,
}

impl RunSurvey {
    /// TIC of the MS1 with the given native ID.
    pub fn tic_of(&self, ms1_native_id: &str) -> Option<f64> {
        self.ms1_index
            .get(ms1_native_id)
            .map(|&i| self.ms1_scans[i].tic)
    }
}

/// Run the survey over one source.
pub fn survey_run(
    source: &dyn SpectrumSource,
    identified_ids: &HashSet<String>,
) -> Result<RunSurvey, SurveyError> {
    let mut survey = RunSurvey::default();
    let mut total_seen = 0usize;
    // File order defines parentage: an MS2 belongs to the last MS1 before it.
    let mut last_ms1: Option<(String, f64)> = None;

    for item in source.spectra(false)? {
        let spectrum = item?;
        total_seen += 1;

        if spectrum.ms_level != 1 && spectrum.ms_level != 2 {
            continue;
        }

        let rt = match spectrum.rt_seconds {
            Some(rt) => rt,
            None => {
                warn!(
                    "{}: no scan start time for {}; spectrum skipped",
                    source.path().display(),
                    spectrum.native_id
                );
                continue;
            }
        };

        if spectrum.ms_level == 1 {
            if let Some(it) = spectrum.injection_time_ms {
                survey.injection_time_ms1.add(it);
            }
            survey
                .ms1_index
                .insert(spectrum.native_id.clone(), survey.ms1_scans.len());
            survey.ms1_scans.push(Ms1Record {
                native_id: spectrum.native_id.clone(),
                rt_seconds: rt,
                tic: spectrum.total_ion_current.unwrap_or(0.0),
            });
            last_ms1 = Some((spectrum.native_id, rt));
            survey.ms1_count += 1;
        } else {
            if let Some(it) = spectrum.injection_time_ms {
                survey.injection_time_ms2.add(it);
            }
            survey.ms2_peak_counts.add(spectrum.peak_count as f64);
            survey.ms2_times.push(rt);
            survey.ms2_count += 1;

            let Some((parent_id, parent_rt)) = last_ms1.clone() else {
                // No parent to anchor a window on; counted above, listed nowhere.
                warn!(
                    "{}: MS2 {} precedes any MS1; excluded from chromatogram extraction",
                    source.path().display(),
                    spectrum.native_id
                );
                continue;
            };

            let info = Ms2ScanInfo {
                native_id: spectrum.native_id.clone(),
                rt_seconds: rt,
                precursor_native_id: parent_id,
                precursor_rt: parent_rt,
                precursor_mz: spectrum.precursor_mz().unwrap_or(0.0),
                precursor_intensity: spectrum.precursor_intensity().unwrap_or(0.0),
            };
            if identified_ids.contains(&info.native_id) {
                survey
                    .identified_index
                    .insert(info.native_id.clone(), survey.identified.len());
                survey.identified.push(info);
            } else {
                survey.unidentified.push(info);
            }
        }
    }

    if total_seen == 0 {
        return Err(SurveyError::EmptyRun {
            path: source.path().to_path_buf(),
        });
    }

    Ok(survey)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mzml::{PrecursorInfo, RawSpectrum};
    use crate::reader::MemorySource;

    fn ms1(id: &str, rt: f64, tic: f64) -> RawSpectrum {
        RawSpectrum {
            native_id: id.to_string(),
            ms_level: 1,
            rt_seconds: Some(rt),
            total_ion_current: Some(tic),
            ..Default::default()
        }
    }

    fn ms2(id: &str, rt: f64, parent: &str, mz: f64, intensity: f64) -> RawSpectrum {
        RawSpectrum {
            native_id: id.to_string(),
            ms_level: 2,
            rt_seconds: Some(rt),
            peak_count: 50,
            precursor: Some(PrecursorInfo {
                spectrum_ref: Some(parent.to_string()),
                selected_ion_mz: Some(mz),
                selected_ion_intensity: Some(intensity),
                charge: Some(2),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_partition_and_parent_stamping() {
        let spectra = vec![
            ms1("scan=1", 10.0, 100.0),
            ms2("scan=2", 11.0, "scan=1", 500.0, 10.0),
            ms2("scan=3", 12.0, "scan=1", 501.0, 11.0),
            ms1("scan=4", 20.0, 1000.0),
            ms2("scan=5", 21.0, "scan=4", 502.0, 12.0),
        ];
        let ids: HashSet<String> = ["scan=2", "scan=5"].iter().map(|s| s.to_string()).collect();
        let source = MemorySource::new("run.mzML", spectra);
        let survey = survey_run(&source, &ids).unwrap();

        assert_eq!(survey.ms1_count, 2);
        assert_eq!(survey.ms2_count, 3);
        assert_eq!(survey.identified.len(), 2);
        assert_eq!(survey.unidentified.len(), 1);
        assert_eq!(survey.identified[0].precursor_native_id, "scan=1");
        assert_eq!(survey.identified[0].precursor_rt, 10.0);
        assert_eq!(survey.identified[1].precursor_native_id, "scan=4");
        assert_eq!(survey.tic_of("scan=4"), Some(1000.0));
        assert_eq!(survey.identified_index["scan=5"], 1);
        assert_eq!(survey.ms2_times, vec![11.0, 12.0, 21.0]);
    }

    #[test]
    fn test_orphan_ms2_counts_but_joins_no_list() {
        let spectra = vec![
            ms2("scan=1", 5.0, "", 500.0, 10.0),
            ms1("scan=2", 10.0, 100.0),
        ];
        let ids: HashSet<String> = ["scan=1".to_string()].into_iter().collect();
        let source = MemorySource::new("run.mzML", spectra);
        let survey = survey_run(&source, &ids).unwrap();
        assert_eq!(survey.ms2_count, 1);
        assert!(survey.identified.is_empty());
        assert!(survey.unidentified.is_empty());
    }

    #[test]
    fn test_missing_rt_skips_spectrum() {
        let mut bad = ms1("scan=1", 0.0, 50.0);
        bad.rt_seconds = None;
        let spectra = vec![bad, ms1("scan=2", 10.0, 100.0)];
        let source = MemorySource::new("run.mzML", spectra);
        let survey = survey_run(&source, &HashSet::new()).unwrap();
        assert_eq!(survey.ms1_count, 1);
        assert_eq!(survey.ms1_scans[0].native_id, "scan=2");
    }

    #[test]
    fn test_empty_run_is_fatal() {
        let source = MemorySource::new("empty.mzML", Vec::new());
        let err = survey_run(&source, &HashSet::new());
        assert!(matches!(err, Err(SurveyError::EmptyRun { .. })));
    }

    #[test]
    fn test_injection_time_accumulators_stay_empty() {
        let spectra = vec![
            ms1("scan=1", 10.0, 100.0),
            ms2("scan=2", 11.0, "scan=1", 500.0, 10.0),
        ];
        let source = MemorySource::new("run.mzML", spectra);
        let survey = survey_run(&source, &HashSet::new()).unwrap();
        assert!(survey.injection_time_ms1.is_empty());
        assert!(survey.injection_time_ms2.is_empty());
    }
}
