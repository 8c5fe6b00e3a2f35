//! Derivation of the QC metric panel.
//!
//! Every formula here is positional: quartiles and deciles follow the
//! straddling-element convention in [`crate::stats`], and any ratio with
//! a zero denominator surfaces as NaN instead of failing the run.

use std::collections::BTreeMap;

use crate::iddb::{MassErrorStats, SamplingRates, TrypticCounts};
use crate::peaks::{pick_closest_peak, PickedPeak};
use crate::stats::{
    first_decile_end, first_quartile, last_decile_start, median_sorted, sorted, third_quartile,
    QuartileCut,
};
use crate::survey::RunSurvey;
use crate::xic::XicOutcome;

/// RT distance beyond which a scan counts as tailing or bleeding, seconds.
const TAILING_THRESHOLD_SECONDS: f64 = 240.0;
/// Fold change in TIC between consecutive MS1 scans that counts as a
/// drop or a jump.
const TIC_FOLD_CHANGE: f64 = 10.0;

/// Errors that abort metric derivation for a run.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("no identified MS2 spectra; retention-time quartiles are undefined")]
    NoIdentifiedSpectra,
}

/// Aggregates delegated to the identification database.
#[derive(Debug, Default)]
pub struct IdAggregates {
    /// Peptide -> native IDs, peptides identified at least twice.
    pub duplicates: Vec<(i64, Vec<String>)>,
    pub sampling: SamplingRates,
    /// Distinct peptide-ion count per charge state.
    pub charges: BTreeMap<i64, usize>,
    pub mass_errors: Option<MassErrorStats>,
    pub tryptic: TrypticCounts,
    pub median_id_score: Option<f64>,
    pub median_precursor_mz: Option<f64>,
}

/// Picked peaks for the three window families.
#[derive(Debug, Default)]
pub struct WindowPeaks {
    /// `(anchor rt, pick)` per peptide window that produced a peak.
    pub peptide: Vec<(f64, PickedPeak)>,
    /// Parallel to `survey.identified`; `None` when the finder came up dry.
    pub identified: Vec<Option<PickedPeak>>,
    /// Picks for unidentified-scan windows that produced a peak.
    pub unidentified: Vec<PickedPeak>,
}

/// Run the peak finder over every window and keep the closest-to-anchor
/// pick per window.
pub fn select_window_peaks(xics: &XicOutcome) -> WindowPeaks {
    WindowPeaks {
        peptide: xics
            .peptide_windows
            .iter()
            .filter_map(|w| {
                pick_closest_peak(&w.rt_list, &w.intensity_list, w.anchor_rt)
                    .map(|p| (w.anchor_rt, p))
            })
            .collect(),
        identified: xics
            .identified_windows
            .iter()
            .map(|w| pick_closest_peak(&w.rt_list, &w.intensity_list, w.anchor_rt))
            .collect(),
        unidentified: xics
            .unidentified_windows
            .iter()
            .filter_map(|w| pick_closest_peak(&w.rt_list, &w.intensity_list, w.anchor_rt))
            .collect(),
    }
}

/// The full metric panel for one run.
#[derive(Debug, Clone)]
pub struct MetricsPanel {
    pub filename: String,

    // Chromatography
    pub c_1a: f64,
    pub c_1b: f64,
    pub c_2a: f64,
    pub c_2b: f64,
    pub c_3a: f64,
    pub c_3b: f64,
    pub c_4a: f64,
    pub c_4b: f64,
    pub c_4c: f64,

    // Dynamic sampling
    pub ds_1a: f64,
    pub ds_1b: f64,
    pub ds_2a: usize,
    pub ds_2b: usize,
    pub ds_3a: f64,
    pub ds_3b: f64,

    // Ion source
    pub is_1a: usize,
    pub is_1b: usize,
    pub is_2: f64,
    pub is_3a: f64,
    pub is_3b: f64,
    pub is_3c: f64,

    // MS1
    pub ms1_1: f64,
    pub ms1_2a: f64,
    pub ms1_2b: f64,
    pub ms1_3a: f64,
    pub ms1_3b: f64,
    pub ms1_5a: f64,
    pub ms1_5b: f64,
    pub ms1_5c: f64,
    pub ms1_5d: f64,

    // MS2
    pub ms2_1: f64,
    pub ms2_2: f64,
    pub ms2_3: f64,
    pub ms2_4a: f64,
    pub ms2_4b: f64,
    pub ms2_4c: f64,
    pub ms2_4d: f64,

    // Peptide identification
    pub p_1: f64,
    pub p_2a: usize,
    pub p_2b: usize,
    pub p_2c: usize,
    pub p_3: f64,
}

/// Retention-time quartiles of the identified MS2 population.
///
/// Needed ahead of Pass 2 (the MS1 signal-to-noise gate) as well as by
/// the panel itself. `None` when nothing was identified.
pub fn id_time_quartiles(survey: &RunSurvey) -> Option<(QuartileCut, QuartileCut)> {
    let times = sorted(
        &survey
            .identified
            .iter()
            .map(|s| s.rt_seconds)
            .collect::<Vec<_>>(),
    );
    Some((first_quartile(&times)?, third_quartile(&times)?))
}

/// Derive the whole panel.
pub fn derive_metrics(
    filename: &str,
    survey: &RunSurvey,
    xics: &XicOutcome,
    peaks: &WindowPeaks,
    id: &IdAggregates,
) -> Result<MetricsPanel, MetricsError> {
    let (q1, q3) = id_time_quartiles(survey).ok_or(MetricsError::NoIdentifiedSpectra)?;

    // C-2A / C-2B: interquartile identification time and rate.
    let c_2a = (q3.value - q1.value) / 60.0;
    let c_2b = ratio((q3.index - q1.index) as f64, c_2a);

    // C-1A / C-1B: tailing and bleeding over repeat identifications.
    let mut tailing = 0usize;
    let mut bleeding = 0usize;
    let mut duplicate_entries = 0usize;
    for (_, native_ids) in &id.duplicates {
        duplicate_entries += native_ids.len();
        for nid in native_ids {
            let Some(&idx) = survey.identified_index.get(nid) else {
                continue;
            };
            let Some(pick) = peaks.identified[idx] else {
                continue;
            };
            let scan_rt = survey.identified[idx].rt_seconds;
            if scan_rt - pick.rt > TAILING_THRESHOLD_SECONDS {
                tailing += 1;
            } else if pick.rt - scan_rt > TAILING_THRESHOLD_SECONDS {
                bleeding += 1;
            }
        }
    }
    let c_1a = ratio(tailing as f64, duplicate_entries as f64);
    let c_1b = ratio(bleeding as f64, duplicate_entries as f64);

    // C-3 / C-4: peak-width statistics over identified peptides. The
    // C-4 family selects positionally from the series in elution order;
    // C-3 sorts by width first.
    let mut by_rt = peaks.peptide.clone();
    by_rt.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    let fwhm_by_rt: Vec<f64> = by_rt.iter().map(|(_, p)| p.fwhm).collect();
    let n_fwhm = fwhm_by_rt.len();
    let (c_4a, c_4b, c_4c) = if n_fwhm == 0 {
        (f64::NAN, f64::NAN, f64::NAN)
    } else if n_fwhm < 10 {
        // Deciles are meaningless this small; fall back to the ends.
        (
            fwhm_by_rt[n_fwhm - 1],
            fwhm_by_rt[0],
            median_sorted(&fwhm_by_rt).unwrap_or(f64::NAN),
        )
    } else {
        (
            median_sorted(&fwhm_by_rt[last_decile_start(n_fwhm)..]).unwrap_or(f64::NAN),
            median_sorted(&fwhm_by_rt[..first_decile_end(n_fwhm)]).unwrap_or(f64::NAN),
            median_sorted(&fwhm_by_rt).unwrap_or(f64::NAN),
        )
    };
    let fwhm_sorted = sorted(&fwhm_by_rt);
    let c_3a = median_sorted(&fwhm_sorted).unwrap_or(f64::NAN);
    let c_3b = match (first_quartile(&fwhm_sorted), third_quartile(&fwhm_sorted)) {
        (Some(lo), Some(hi)) => hi.value - lo.value,
        _ => f64::NAN,
    };

    // DS-1: sampling-rate ratios.
    let ds_1a = ratio(id.sampling.once as f64, id.sampling.twice as f64);
    let ds_1b = ratio(id.sampling.twice as f64, id.sampling.thrice as f64);

    // DS-2: scans inside the interquartile identification window.
    let ds_2a = survey
        .ms1_scans
        .iter()
        .filter(|s| s.rt_seconds >= q1.value && s.rt_seconds <= q3.value)
        .count();
    let ds_2b = survey
        .ms2_times
        .iter()
        .filter(|&&rt| rt >= q1.value && rt <= q3.value)
        .count();

    // DS-3: peak over sampled precursor intensity, sorted by peak height.
    let mut sampling_pairs: Vec<(f64, f64)> = survey
        .identified
        .iter()
        .zip(&peaks.identified)
        .filter_map(|(scan, pick)| pick.map(|p| (p.intensity, scan.precursor_intensity)))
        .collect();
    sampling_pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    let sampling_ratios: Vec<f64> = sampling_pairs
        .iter()
        .map(|&(peak, precursor)| ratio(peak, precursor))
        .collect();
    let n_pairs = sampling_ratios.len();
    let ds_3a = if n_pairs == 0 {
        f64::NAN
    } else if n_pairs % 2 == 0 {
        (sampling_ratios[n_pairs / 2 - 1] + sampling_ratios[n_pairs / 2]) / 2.0
    } else {
        sampling_ratios[n_pairs / 2]
    };
    let ds_3b = if n_pairs == 0 {
        f64::NAN
    } else if n_pairs % 4 == 0 {
        (sampling_ratios[n_pairs / 4 - 1] + sampling_ratios[n_pairs / 4]) / 2.0
    } else {
        sampling_ratios[n_pairs / 4]
    };

    // IS-1: TIC stability while identifications are still arriving.
    let mut is_1a = 0usize;
    let mut is_1b = 0usize;
    let mut last_tic: Option<f64> = None;
    for scan in &survey.ms1_scans {
        if scan.rt_seconds > q3.value {
            continue;
        }
        if let Some(prev) = last_tic {
            if TIC_FOLD_CHANGE * scan.tic < prev {
                is_1a += 1;
            } else if scan.tic >= TIC_FOLD_CHANGE * prev {
                is_1b += 1;
            }
        }
        last_tic = Some(scan.tic);
    }

    // IS-2 / IS-3: precursor m/z and charge-state balance.
    let is_2 = id.median_precursor_mz.unwrap_or(f64::NAN);
    let charge = |z: i64| id.charges.get(&z).copied().unwrap_or(0) as f64;
    let is_3a = ratio(charge(1), charge(2));
    let is_3b = ratio(charge(3), charge(2));
    let is_3c = ratio(charge(4), charge(2));

    // MS1-1 / MS1-2A.
    let ms1_1 = survey.injection_time_ms1.median().unwrap_or(f64::NAN);
    let ms1_2a = xics.sig_noise_ms1.median().unwrap_or(f64::NAN);

    // MS1-2B: median precursor TIC over the identifications before the
    // third RT-quartile cut, scaled down by 1000.
    let mut early_tics = Vec::new();
    for scan in survey.identified.iter().take(q3.index) {
        if let Some(tic) = survey.tic_of(&scan.precursor_native_id) {
            early_tics.push(tic);
        }
    }
    let ms1_2b = median_sorted(&sorted(&early_tics))
        .map(|m| m / 1000.0)
        .unwrap_or(f64::NAN);

    // MS1-3: dynamic range of identified-peptide peak heights.
    let peptide_heights = sorted(
        &peaks
            .peptide
            .iter()
            .map(|(_, p)| p.intensity)
            .collect::<Vec<_>>(),
    );
    let (ms1_3a, ms1_3b) = if peptide_heights.is_empty() {
        (f64::NAN, f64::NAN)
    } else {
        let p95 = peptide_heights[percentile_index(0.95, peptide_heights.len())];
        let p5 = peptide_heights[percentile_index(0.05, peptide_heights.len())];
        (
            ratio(p95, p5),
            median_sorted(&peptide_heights).unwrap_or(f64::NAN),
        )
    };

    // MS1-5: precursor mass-error statistics.
    let (ms1_5a, ms1_5b, ms1_5c, ms1_5d) = match id.mass_errors {
        Some(e) => (
            e.median_error,
            e.mean_abs_error,
            e.median_ppm_error,
            e.ppm_error_iqr,
        ),
        None => (f64::NAN, f64::NAN, f64::NAN, f64::NAN),
    };

    // MS2-1..3.
    let ms2_1 = survey.injection_time_ms2.median().unwrap_or(f64::NAN);
    let ms2_2 = xics.sig_noise_ms2.median().unwrap_or(f64::NAN);
    let ms2_3 = survey.ms2_peak_counts.median().unwrap_or(f64::NAN);

    // MS2-4: identified fraction per quartile of all MS2 peak heights.
    let identified_heights: Vec<f64> = peaks
        .identified
        .iter()
        .flatten()
        .map(|p| p.intensity)
        .collect();
    let unidentified_heights: Vec<f64> = peaks.unidentified.iter().map(|p| p.intensity).collect();
    let mut all_heights = identified_heights.clone();
    all_heights.extend(&unidentified_heights);
    let all_heights = sorted(&all_heights);

    let (ms2_4a, ms2_4b, ms2_4c, ms2_4d) = match (
        first_quartile(&all_heights),
        median_sorted(&all_heights),
        third_quartile(&all_heights),
    ) {
        (Some(h_q1), Some(h_q2), Some(h_q3)) => {
            // Ties land in the lower bucket.
            let bucket = |v: f64| {
                if v <= h_q1.value {
                    0
                } else if v <= h_q2 {
                    1
                } else if v <= h_q3.value {
                    2
                } else {
                    3
                }
            };
            let mut id_buckets = [0usize; 4];
            let mut total_buckets = [0usize; 4];
            for &h in &identified_heights {
                id_buckets[bucket(h)] += 1;
                total_buckets[bucket(h)] += 1;
            }
            for &h in &unidentified_heights {
                total_buckets[bucket(h)] += 1;
            }
            (
                ratio(id_buckets[0] as f64, total_buckets[0] as f64),
                ratio(id_buckets[1] as f64, total_buckets[1] as f64),
                ratio(id_buckets[2] as f64, total_buckets[2] as f64),
                ratio(id_buckets[3] as f64, total_buckets[3] as f64),
            )
        }
        _ => (f64::NAN, f64::NAN, f64::NAN, f64::NAN),
    };

    // P family: delegated digestion and scoring aggregates.
    let p_1 = id.median_id_score.unwrap_or(f64::NAN);
    let p_3 = ratio(
        id.tryptic.unique_semi_tryptic as f64,
        id.tryptic.unique_fully_tryptic as f64,
    );

    Ok(MetricsPanel {
        filename: filename.to_string(),
        c_1a,
        c_1b,
        c_2a,
        c_2b,
        c_3a,
        c_3b,
        c_4a,
        c_4b,
        c_4c,
        ds_1a,
        ds_1b,
        ds_2a,
        ds_2b,
        ds_3a,
        ds_3b,
        is_1a,
        is_1b,
        is_2,
        is_3a,
        is_3b,
        is_3c,
        ms1_1,
        ms1_2a,
        ms1_2b,
        ms1_3a,
        ms1_3b,
        ms1_5a,
        ms1_5b,
        ms1_5c,
        ms1_5d,
        ms2_1,
        ms2_2,
        ms2_3,
        ms2_4a,
        ms2_4b,
        ms2_4c,
        ms2_4d,
        p_1,
        p_2a: id.tryptic.tryptic_spectra,
        p_2b: id.tryptic.tryptic_ions,
        p_2c: id.tryptic.unique_fully_tryptic,
        p_3,
    })
}

/// Zero-based index of the `p` percentile: `⌊p·n + 0.5⌋ − 1`, clamped.
fn percentile_index(p: f64, n: usize) -> usize {
    let idx = (p * n as f64 + 0.5) as i64 - 1;
    idx.clamp(0, n as i64 - 1) as usize
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        f64::NAN
    } else {
        numerator / denominator
    }
}
