//! Spectrum model produced by the streamer.

/// Precursor ion information carried by MS2+ spectra.
#[derive(Debug, Clone, Default)]
pub struct PrecursorInfo {
    /// Native ID of the spectrum the precursor was selected from.
    pub spectrum_ref: Option<String>,

    /// Selected ion m/z.
    pub selected_ion_mz: Option<f64>,

    /// Selected ion intensity.
    pub selected_ion_intensity: Option<f64>,

    /// Selected ion charge state.
    pub charge: Option<i32>,
}

/// One spectrum as parsed from the file, in native order.
#[derive(Debug, Clone, Default)]
pub struct RawSpectrum {
    /// Zero-based position in the spectrum list.
    pub index: i64,

    /// Native spectrum ID, stable across the file.
    pub native_id: String,

    /// MS level; 0 when the file does not state one.
    pub ms_level: u8,

    /// Scan start time normalized to seconds.
    pub rt_seconds: Option<f64>,

    /// Ion injection time in milliseconds.
    pub injection_time_ms: Option<f64>,

    /// Total ion current.
    pub total_ion_current: Option<f64>,

    /// Declared array length (peak count even when arrays are skipped).
    pub peak_count: usize,

    /// Precursor of an MS2+ spectrum.
    pub precursor: Option<PrecursorInfo>,

    /// m/z array; empty on a header-only read.
    pub mz_array: Vec<f64>,

    /// Intensity array; empty on a header-only read.
    pub intensity_array: Vec<f64>,
}

impl RawSpectrum {
    /// Selected-ion m/z of the first precursor, if any.
    pub fn precursor_mz(&self) -> Option<f64> {
        self.precursor.as_ref().and_then(|p| p.selected_ion_mz)
    }

    /// Selected-ion intensity of the first precursor, if any.
    pub fn precursor_intensity(&self) -> Option<f64> {
        self.precursor.as_ref().and_then(|p| p.selected_ion_intensity)
    }
}
