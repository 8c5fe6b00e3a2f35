//! Chromatographic peak finding and selection.
//!
//! The finder walks a `(time, intensity)` series and reports every local
//! maximum above a noise floor, measuring full-width-at-half-maximum by
//! interpolating the half-height crossings on both flanks. The selector
//! reduces a window to the single peak nearest its anchor retention time.

/// Fraction of the series maximum below which candidates are ignored.
const HEIGHT_FLOOR_FRACTION: f64 = 0.01;

/// One detected peak, indexed into the series it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChromPeak {
    pub time_index: usize,
    pub height: f64,
    pub fwhm: f64,
}

/// The peak chosen for a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickedPeak {
    pub rt: f64,
    pub intensity: f64,
    pub fwhm: f64,
}

/// Find all peaks in a chromatogram series.
///
/// `times` and `intensities` are parallel and in ascending time order.
/// Endpoints count as candidates so short series still yield their apex.
pub fn find_peaks(times: &[f64], intensities: &[f64]) -> Vec<ChromPeak> {
    let n = intensities.len().min(times.len());
    if n == 0 {
        return Vec::new();
    }

    let max_val = intensities[..n].iter().cloned().fold(f64::MIN, f64::max);
    if max_val <= 0.0 {
        return Vec::new();
    }
    let floor = max_val * HEIGHT_FLOOR_FRACTION;

    let mut peaks = Vec::new();
    for i in 0..n {
        let v = intensities[i];
        if v <= floor || v <= 0.0 {
            continue;
        }
        let left_ok = i == 0 || intensities[i - 1] <= v;
        let right_ok = i + 1 == n || intensities[i + 1] < v;
        if left_ok && right_ok {
            peaks.push(ChromPeak {
                time_index: i,
                height: v,
                fwhm: fwhm_at(times, &intensities[..n], i),
            });
        }
    }
    peaks
}

/// Interpolated full width at half maximum around the apex at `idx`.
fn fwhm_at(times: &[f64], intensities: &[f64], idx: usize) -> f64 {
    let half = intensities[idx] / 2.0;
    let n = intensities.len();

    let mut left_t = times[0];
    for j in (0..idx).rev() {
        if intensities[j] <= half {
            let span = intensities[j + 1] - intensities[j];
            let frac = if span > 0.0 {
                (half - intensities[j]) / span
            } else {
                0.0
            };
            left_t = times[j] + frac * (times[j + 1] - times[j]);
            break;
        }
    }

    let mut right_t = times[n - 1];
    for j in idx + 1..n {
        if intensities[j] <= half {
            let span = intensities[j - 1] - intensities[j];
            let frac = if span > 0.0 {
                (intensities[j - 1] - half) / span
            } else {
                0.0
            };
            right_t = times[j - 1] + frac * (times[j] - times[j - 1]);
            break;
        }
    }

    (right_t - left_t).max(0.0)
}

/// Pick the peak whose retention time is closest to `anchor_rt`.
///
/// Ties keep the first peak encountered. Returns `None` when the finder
/// reports nothing for the series.
pub fn pick_closest_peak(times: &[f64], intensities: &[f64], anchor_rt: f64) -> Option<PickedPeak> {
    let peaks = find_peaks(times, intensities);
    let mut best: Option<(f64, &ChromPeak)> = None;
    for peak in &peaks {
        let distance = (times[peak.time_index] - anchor_rt).abs();
        match best {
            Some((best_distance, _)) if distance >= best_distance => {}
            _ => best = Some((distance, peak)),
        }
    }
    best.map(|(_, peak)| PickedPeak {
        rt: times[peak.time_index],
        intensity: peak.height,
        fwhm: peak.fwhm,
    })
}
