//! Pass 2: extracted-ion chromatogram construction.
//!
//! Windows come from three places: one per identified peptide (built from
//! the identification database joined with Pass-1 MS2 retention times),
//! one per identified MS2 scan, and one per unidentified MS2 scan. The
//! second streaming traversal walks MS1 spectra in file order and appends
//! `(rt, summed intensity)` to every window the spectrum falls into; MS2
//! spectra feed the MS2 signal-to-noise accumulator.

use std::collections::HashSet;

use crate::iddb::PeptideIons;
use crate::reader::{ReaderError, SpectrumSource};
use crate::stats::{median_sorted, sorted, Accumulator};
use crate::survey::{Ms2ScanInfo, RunSurvey};

/// Half-width of the retention-time window around an anchor, seconds.
const RT_WINDOW_HALF_WIDTH: f64 = 300.0;
/// m/z window below the precursor.
const MZ_WINDOW_BELOW: f64 = 0.5;
/// m/z window above the precursor (wider to catch isotope peaks).
const MZ_WINDOW_ABOVE: f64 = 1.0;

/// A closed interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub lo: f64,
    pub hi: f64,
}

impl Interval {
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    pub fn contains(&self, x: f64) -> bool {
        x >= self.lo && x <= self.hi
    }
}

/// One XIC window and its accumulated MS1 series.
#[derive(Debug, Clone)]
pub struct XicWindow {
    pub rt: Interval,
    /// One or more closed m/z intervals.
    pub mz: Vec<Interval>,
    /// Retention time the peak selector measures distance from.
    pub anchor_rt: f64,
    /// MS1 retention times, appended in file order.
    pub rt_list: Vec<f64>,
    /// Summed intensities parallel to `rt_list`.
    pub intensity_list: Vec<f64>,
}

impl XicWindow {
    fn new(rt: Interval, mz: Vec<Interval>, anchor_rt: f64) -> Self {
        Self {
            rt,
            mz,
            anchor_rt,
            rt_list: Vec::new(),
            intensity_list: Vec::new(),
        }
    }

    /// Outer m/z bounds across all intervals.
    fn mz_bounds(&self) -> (f64, f64) {
        let lo = self.mz.iter().map(|i| i.lo).fold(f64::INFINITY, f64::min);
        let hi = self.mz.iter().map(|i| i.hi).fold(f64::NEG_INFINITY, f64::max);
        (lo, hi)
    }

    fn mz_contains(&self, mz: f64) -> bool {
        self.mz.iter().any(|i| i.contains(mz))
    }
}

/// Build one window per identified peptide.
///
/// The peptide's retention span is taken from its identified MS2 scans;
/// peptides whose PSMs all reference scans missing from the survey (for
/// example orphan MS2s) get no window.
pub fn peptide_windows(peptides: &[PeptideIons], survey: &RunSurvey) -> Vec<XicWindow> {
    let mut windows = Vec::new();
    for peptide in peptides {
        let mut rts: Vec<f64> = peptide
            .native_ids
            .iter()
            .filter_map(|nid| survey.identified_index.get(nid))
            .map(|&i| survey.identified[i].rt_seconds)
            .collect();
        if rts.is_empty() {
            continue;
        }
        rts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let rt = Interval::new(
            rts[0] - RT_WINDOW_HALF_WIDTH,
            rts[rts.len() - 1] + RT_WINDOW_HALF_WIDTH,
        );
        let mut mz: Vec<Interval> = peptide
            .precursor_mzs
            .iter()
            .map(|&m| Interval::new(m - MZ_WINDOW_BELOW, m + MZ_WINDOW_ABOVE))
            .collect();
        mz.sort_by(|a, b| a.lo.partial_cmp(&b.lo).unwrap_or(std::cmp::Ordering::Equal));
        windows.push(XicWindow::new(rt, mz, rts[0]));
    }
    windows
}

/// Build one window per MS2 scan, anchored at its precursor's RT.
pub fn scan_windows(scans: &[Ms2ScanInfo]) -> Vec<XicWindow> {
    scans
        .iter()
        .map(|scan| {
            let anchor = scan.precursor_rt;
            XicWindow::new(
                Interval::new(anchor - RT_WINDOW_HALF_WIDTH, anchor + RT_WINDOW_HALF_WIDTH),
                vec![Interval::new(
                    scan.precursor_mz - MZ_WINDOW_BELOW,
                    scan.precursor_mz + MZ_WINDOW_ABOVE,
                )],
                anchor,
            )
        })
        .collect()
}

/// Output of the second pass.
#[derive(Debug)]
pub struct XicOutcome {
    /// Windows per identified peptide, in peptide order.
    pub peptide_windows: Vec<XicWindow>,
    /// Windows parallel to `survey.identified`.
    pub identified_windows: Vec<XicWindow>,
    /// Windows parallel to `survey.unidentified`.
    pub unidentified_windows: Vec<XicWindow>,
    /// MS1 max/median intensity ratios up to the third ID-time quartile.
    pub sig_noise_ms1: Accumulator,
    /// MS2 max/median intensity ratios over identified scans.
    pub sig_noise_ms2: Accumulator,
}

/// Stream the file a second time and populate every window.
///
/// `third_quartile_id_time` gates the MS1 signal-to-noise contribution.
pub fn build_xics(
    source: &dyn SpectrumSource,
    peptides: &[PeptideIons],
    survey: &RunSurvey,
    identified_ids: &HashSet<String>,
    third_quartile_id_time: f64,
) -> Result<XicOutcome, ReaderError> {
    let mut outcome = XicOutcome {
        peptide_windows: peptide_windows(peptides, survey),
        identified_windows: scan_windows(&survey.identified),
        unidentified_windows: scan_windows(&survey.unidentified),
        sig_noise_ms1: Accumulator::new(),
        sig_noise_ms2: Accumulator::new(),
    };

    for item in source.spectra(true)? {
        let spectrum = item?;
        let Some(rt) = spectrum.rt_seconds else {
            continue;
        };

        if spectrum.ms_level == 1 {
            if spectrum.mz_array.is_empty() || spectrum.intensity_array.is_empty() {
                continue;
            }
            let mz_min = spectrum.mz_array.iter().cloned().fold(f64::INFINITY, f64::min);
            let mz_max = spectrum
                .mz_array
                .iter()
                .cloned()
                .fold(f64::NEG_INFINITY, f64::max);

            if rt <= third_quartile_id_time {
                if let Some(ratio) = signal_to_noise(&spectrum.intensity_array) {
                    outcome.sig_noise_ms1.add(ratio);
                }
            }

            for window in outcome
                .peptide_windows
                .iter_mut()
                .chain(outcome.identified_windows.iter_mut())
                .chain(outcome.unidentified_windows.iter_mut())
            {
                accumulate(window, rt, mz_min, mz_max, &spectrum.mz_array, &spectrum.intensity_array);
            }
        } else if spectrum.ms_level == 2 && identified_ids.contains(&spectrum.native_id) {
            if let Some(ratio) = signal_to_noise(&spectrum.intensity_array) {
                outcome.sig_noise_ms2.add(ratio);
            }
        }
    }

    Ok(outcome)
}

fn accumulate(
    window: &mut XicWindow,
    rt: f64,
    mz_min: f64,
    mz_max: f64,
    mz_array: &[f64],
    intensity_array: &[f64],
) {
    if !window.rt.contains(rt) {
        return;
    }
    let (window_lo, window_hi) = window.mz_bounds();
    if window_hi < mz_min || window_lo > mz_max {
        return;
    }
    let mut sum = 0.0;
    for (mz, intensity) in mz_array.iter().zip(intensity_array) {
        if window.mz_contains(*mz) {
            sum += intensity;
        }
    }
    if sum > 0.0 {
        window.rt_list.push(rt);
        window.intensity_list.push(sum);
    }
}

/// Max over median of a peak intensity array.
///
/// A zero median leaves the ratio ill-defined; such spectra contribute
/// nothing rather than a guessed value. Empty arrays likewise.
fn signal_to_noise(intensities: &[f64]) -> Option<f64> {
    if intensities.is_empty() {
        return None;
    }
    let max = intensities.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let median = median_sorted(&sorted(intensities))?;
    if median == 0.0 {
        return None;
    }
    Some(max / median)
}
