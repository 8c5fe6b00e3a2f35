//! Property tests for the statistical and pipeline invariants.

use std::collections::HashSet;

use proptest::prelude::*;

use mzqual::metrics::{derive_metrics, IdAggregates, WindowPeaks};
use mzqual::mzml::{PrecursorInfo, RawSpectrum};
use mzqual::peaks::PickedPeak;
use mzqual::reader::MemorySource;
use mzqual::report::render;
use mzqual::stats::{first_quartile, median_sorted, sorted, third_quartile, Accumulator};
use mzqual::survey::{survey_run, Ms2ScanInfo, RunSurvey};
use mzqual::xic::{build_xics, XicOutcome};

fn survey_of(times: &[f64]) -> RunSurvey {
    let mut survey = RunSurvey::default();
    for (i, &rt) in times.iter().enumerate() {
        let id = format!("scan={}", i + 1);
        survey.identified_index.insert(id.clone(), i);
        survey.identified.push(Ms2ScanInfo {
            native_id: id,
            rt_seconds: rt,
            precursor_native_id: "ms1=1".to_string(),
            precursor_rt: rt - 1.0,
            precursor_mz: 500.0,
            precursor_intensity: 10.0,
        });
        survey.ms2_times.push(rt);
    }
    survey.ms2_count = times.len();
    survey
}

fn empty_xics() -> XicOutcome {
    XicOutcome {
        peptide_windows: Vec::new(),
        identified_windows: Vec::new(),
        unidentified_windows: Vec::new(),
        sig_noise_ms1: Accumulator::new(),
        sig_noise_ms2: Accumulator::new(),
    }
}

fn pick(rt: f64, intensity: f64) -> PickedPeak {
    PickedPeak {
        rt,
        intensity,
        fwhm: 5.0,
    }
}

proptest! {
    #[test]
    fn quartiles_are_ordered(values in prop::collection::vec(0.0f64..1e9, 1..200)) {
        let s = sorted(&values);
        let q1 = first_quartile(&s).unwrap().value;
        let q2 = median_sorted(&s).unwrap();
        let q3 = third_quartile(&s).unwrap().value;
        prop_assert!(q1 <= q2);
        prop_assert!(q2 <= q3);
    }

    #[test]
    fn interquartile_time_is_nonnegative(deltas in prop::collection::vec(0.0f64..1e4, 4..100)) {
        // Cumulative sums keep the series non-decreasing, like real RTs.
        let mut rt = 0.0;
        let times: Vec<f64> = deltas.iter().map(|d| { rt += d; rt }).collect();
        let survey = survey_of(&times);
        let panel = derive_metrics(
            "run.mzML",
            &survey,
            &empty_xics(),
            &WindowPeaks {
                peptide: Vec::new(),
                identified: vec![None; times.len()],
                unidentified: Vec::new(),
            },
            &IdAggregates::default(),
        ).unwrap();
        prop_assert!(panel.c_2a >= 0.0);
        // With strictly increasing times the quartile cuts cannot touch.
        if deltas.iter().all(|&d| d > 0.0) {
            prop_assert!(panel.c_2a > 0.0);
        }
    }

    #[test]
    fn accumulator_median_is_exact(values in prop::collection::vec(-1e6f64..1e6, 1..100)) {
        let mut acc = Accumulator::new();
        for &v in &values {
            acc.add(v);
        }
        let expected = median_sorted(&sorted(&values)).unwrap();
        prop_assert_eq!(acc.median().unwrap(), expected);
        prop_assert_eq!(acc.count(), values.len());
    }

    #[test]
    fn survey_counts_are_bounded(
        levels in prop::collection::vec(0u8..4, 1..80),
        identify_every in 1usize..4,
    ) {
        let mut spectra = Vec::new();
        let mut identified_ids = HashSet::new();
        for (i, &level) in levels.iter().enumerate() {
            let native_id = format!("scan={}", i + 1);
            let mut s = RawSpectrum {
                native_id: native_id.clone(),
                ms_level: level,
                rt_seconds: Some(i as f64),
                ..Default::default()
            };
            if level == 2 {
                s.precursor = Some(PrecursorInfo {
                    spectrum_ref: None,
                    selected_ion_mz: Some(500.0),
                    selected_ion_intensity: Some(10.0),
                    charge: Some(2),
                });
                if i % identify_every == 0 {
                    identified_ids.insert(native_id);
                }
            }
            spectra.push(s);
        }
        let source = MemorySource::new("run.mzML", spectra);
        let survey = survey_run(&source, &identified_ids).unwrap();

        prop_assert!(survey.ms1_count + survey.ms2_count <= levels.len());
        prop_assert!(survey.identified.len() <= survey.ms2_count);
        prop_assert!(survey.identified.len() <= identified_ids.len());
        prop_assert!(survey.unidentified.len() <= survey.ms2_count);
    }

    #[test]
    fn ms2_4_buckets_conserve_populations(
        id_heights in prop::collection::vec(1.0f64..1e6, 1..40),
        unid_heights in prop::collection::vec(1.0f64..1e6, 0..40),
    ) {
        let times: Vec<f64> = (0..id_heights.len()).map(|i| 10.0 * (i + 1) as f64).collect();
        let survey = survey_of(&times);
        let peaks = WindowPeaks {
            peptide: Vec::new(),
            identified: id_heights
                .iter()
                .enumerate()
                .map(|(i, &h)| Some(pick(times[i], h)))
                .collect(),
            unidentified: unid_heights.iter().map(|&h| pick(0.0, h)).collect(),
        };
        let panel = derive_metrics(
            "run.mzML",
            &survey,
            &empty_xics(),
            &peaks,
            &IdAggregates::default(),
        ).unwrap();

        // Recompute the cascade independently from the public quartile API.
        let mut all = id_heights.clone();
        all.extend(&unid_heights);
        let all = sorted(&all);
        let q1 = first_quartile(&all).unwrap().value;
        let q2 = median_sorted(&all).unwrap();
        let q3 = third_quartile(&all).unwrap().value;
        let bucket = |v: f64| {
            if v <= q1 { 0 } else if v <= q2 { 1 } else if v <= q3 { 2 } else { 3 }
        };
        let mut id_counts = [0usize; 4];
        let mut total_counts = [0usize; 4];
        for &h in &id_heights {
            id_counts[bucket(h)] += 1;
            total_counts[bucket(h)] += 1;
        }
        for &h in &unid_heights {
            total_counts[bucket(h)] += 1;
        }
        prop_assert_eq!(id_counts.iter().sum::<usize>(), id_heights.len());
        prop_assert_eq!(total_counts.iter().sum::<usize>(), id_heights.len() + unid_heights.len());

        for (k, &fraction) in [panel.ms2_4a, panel.ms2_4b, panel.ms2_4c, panel.ms2_4d]
            .iter()
            .enumerate()
        {
            if total_counts[k] == 0 {
                prop_assert!(fraction.is_nan());
            } else {
                let implied = fraction * total_counts[k] as f64;
                prop_assert!((implied - id_counts[k] as f64).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn window_order_does_not_change_the_panel(swap in any::<bool>()) {
        let spectra = vec![
            RawSpectrum {
                native_id: "scan=1".to_string(),
                ms_level: 1,
                rt_seconds: Some(10.0),
                total_ion_current: Some(100.0),
                mz_array: vec![399.8, 500.2],
                intensity_array: vec![70.0, 30.0],
                ..Default::default()
            },
            RawSpectrum {
                native_id: "scan=2".to_string(),
                ms_level: 2,
                rt_seconds: Some(11.0),
                peak_count: 2,
                mz_array: vec![100.0, 200.0],
                intensity_array: vec![5.0, 50.0],
                precursor: Some(PrecursorInfo {
                    spectrum_ref: None,
                    selected_ion_mz: Some(500.0),
                    selected_ion_intensity: Some(10.0),
                    charge: Some(2),
                }),
                ..Default::default()
            },
            RawSpectrum {
                native_id: "scan=3".to_string(),
                ms_level: 2,
                rt_seconds: Some(12.0),
                peak_count: 2,
                mz_array: vec![100.0, 200.0],
                intensity_array: vec![5.0, 50.0],
                precursor: Some(PrecursorInfo {
                    spectrum_ref: None,
                    selected_ion_mz: Some(400.0),
                    selected_ion_intensity: Some(10.0),
                    charge: Some(2),
                }),
                ..Default::default()
            },
        ];
        let source = MemorySource::new("run.mzML", spectra);
        let ids: HashSet<String> = ["scan=2", "scan=3"].iter().map(|s| s.to_string()).collect();
        let survey = survey_run(&source, &ids).unwrap();

        let mut peptides = vec![
            mzqual::iddb::PeptideIons {
                peptide_id: 1,
                precursor_mzs: vec![500.0],
                native_ids: vec!["scan=2".to_string()],
            },
            mzqual::iddb::PeptideIons {
                peptide_id: 2,
                precursor_mzs: vec![400.0],
                native_ids: vec!["scan=3".to_string()],
            },
        ];
        if swap {
            peptides.reverse();
        }

        let xics = build_xics(&source, &peptides, &survey, &ids, 1e9).unwrap();
        let peaks = mzqual::metrics::select_window_peaks(&xics);
        let panel = derive_metrics("run.mzML", &survey, &xics, &peaks, &IdAggregates::default())
            .unwrap();
        let text = render(&panel);

        // Reference order.
        let peptides_fixed = vec![
            mzqual::iddb::PeptideIons {
                peptide_id: 1,
                precursor_mzs: vec![500.0],
                native_ids: vec!["scan=2".to_string()],
            },
            mzqual::iddb::PeptideIons {
                peptide_id: 2,
                precursor_mzs: vec![400.0],
                native_ids: vec!["scan=3".to_string()],
            },
        ];
        let xics_fixed = build_xics(&source, &peptides_fixed, &survey, &ids, 1e9).unwrap();
        let peaks_fixed = mzqual::metrics::select_window_peaks(&xics_fixed);
        let panel_fixed =
            derive_metrics("run.mzML", &survey, &xics_fixed, &peaks_fixed, &IdAggregates::default())
                .unwrap();
        prop_assert_eq!(text, render(&panel_fixed));
    }
}
