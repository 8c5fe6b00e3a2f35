//! Pull-based mzML streamer.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::binary::{decode_binary, BinaryDecodeError, BinaryEncoding, Compression};
use super::spectrum::{PrecursorInfo, RawSpectrum};

// PSI-MS accessions the streamer dispatches on.
const ACC_MS_LEVEL: &str = "MS:1000511";
const ACC_SCAN_START_TIME: &str = "MS:1000016";
const ACC_ION_INJECTION_TIME: &str = "MS:1000927";
const ACC_TOTAL_ION_CURRENT: &str = "MS:1000285";
const ACC_SELECTED_ION_MZ: &str = "MS:1000744";
const ACC_MZ: &str = "MS:1000040";
const ACC_PEAK_INTENSITY: &str = "MS:1000042";
const ACC_CHARGE_STATE: &str = "MS:1000041";
const ACC_FLOAT_32: &str = "MS:1000521";
const ACC_FLOAT_64: &str = "MS:1000523";
const ACC_ZLIB: &str = "MS:1000574";
const ACC_NO_COMPRESSION: &str = "MS:1000576";
const ACC_MZ_ARRAY: &str = "MS:1000514";
const ACC_INTENSITY_ARRAY: &str = "MS:1000515";
const UNIT_MINUTE: &str = "UO:0000031";

/// Errors raised while walking an mzML document.
#[derive(Debug, thiserror::Error)]
pub enum MzmlError {
    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Binary decode error: {0}")]
    Binary(#[from] BinaryDecodeError),

    #[error("Invalid mzML structure: {0}")]
    InvalidStructure(String),
}

/// Streaming parser yielding spectra in native file order.
pub struct MzmlStreamer<R: BufRead> {
    reader: Reader<R>,
    in_spectrum_list: bool,
    current_index: i64,
}

impl MzmlStreamer<BufReader<File>> {
    /// Open an mzML file for streaming.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MzmlError> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(BufReader::with_capacity(64 * 1024, file)))
    }
}

impl<R: BufRead> MzmlStreamer<R> {
    pub fn new(reader: R) -> Self {
        let mut xml_reader = Reader::from_reader(reader);
        xml_reader.config_mut().trim_text(true);
        Self {
            reader: xml_reader,
            in_spectrum_list: false,
            current_index: 0,
        }
    }

    /// Read the next spectrum, or `None` past the end of the list.
    ///
    /// With `with_arrays` false the binary data arrays are skipped and the
    /// spectrum carries only header fields; the declared array length is
    /// still reported as `peak_count`.
    pub fn next_spectrum(&mut self, with_arrays: bool) -> Result<Option<RawSpectrum>, MzmlError> {
        let mut buf = Vec::new();
        loop {
            match self.reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => match e.name().as_ref() {
                    b"spectrumList" => {
                        self.in_spectrum_list = true;
                    }
                    b"spectrum" if self.in_spectrum_list => {
                        let spectrum = self.parse_spectrum(e, with_arrays)?;
                        self.current_index += 1;
                        return Ok(Some(spectrum));
                    }
                    _ => {}
                },
                Ok(Event::End(ref e)) => {
                    if e.name().as_ref() == b"spectrumList" {
                        self.in_spectrum_list = false;
                        return Ok(None);
                    }
                }
                Ok(Event::Eof) => return Ok(None),
                Err(e) => return Err(MzmlError::Xml(e)),
                _ => {}
            }
            buf.clear();
        }
    }

    fn parse_spectrum(
        &mut self,
        start: &BytesStart,
        with_arrays: bool,
    ) -> Result<RawSpectrum, MzmlError> {
        let mut spectrum = RawSpectrum {
            index: attribute(start, "index")?
                .and_then(|s| s.parse().ok())
                .unwrap_or(self.current_index),
            native_id: attribute(start, "id")?.unwrap_or_default(),
            peak_count: attribute(start, "defaultArrayLength")?
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            ..Default::default()
        };

        let mut depth = 1usize;
        let mut in_scan = false;
        let mut in_precursor = false;
        let mut precursor: Option<PrecursorInfo> = None;
        let mut array: Option<ArrayContext> = None;
        let mut buf = Vec::new();

        loop {
            match self.reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    depth += 1;
                    match e.name().as_ref() {
                        b"scanList" => in_scan = true,
                        b"precursorList" => in_precursor = true,
                        b"precursor" => {
                            precursor = Some(PrecursorInfo {
                                spectrum_ref: attribute(e, "spectrumRef")?,
                                ..Default::default()
                            });
                        }
                        b"binaryDataArray" => array = Some(ArrayContext::default()),
                        // Some writers emit cvParams as non-empty elements.
                        b"cvParam" => {
                            let cv = parse_cv_param(e)?;
                            dispatch_cv(&mut spectrum, &mut array, &mut precursor, in_precursor, in_scan, &cv);
                        }
                        _ => {}
                    }
                }
                Ok(Event::Empty(ref e)) => {
                    if e.name().as_ref() == b"cvParam" {
                        let cv = parse_cv_param(e)?;
                        dispatch_cv(&mut spectrum, &mut array, &mut precursor, in_precursor, in_scan, &cv);
                    }
                }
                Ok(Event::Text(ref t)) => {
                    if let Some(ref mut ctx) = array {
                        if with_arrays {
                            ctx.base64_data = t.unescape()?.into_owned();
                        }
                    }
                }
                Ok(Event::End(ref e)) => {
                    depth = depth.saturating_sub(1);
                    match e.name().as_ref() {
                        b"spectrum" if depth == 0 => break,
                        b"scanList" => in_scan = false,
                        b"precursorList" => in_precursor = false,
                        b"precursor" => {
                            // Only the first precursor is kept.
                            if let Some(prec) = precursor.take() {
                                if spectrum.precursor.is_none() {
                                    spectrum.precursor = Some(prec);
                                }
                            }
                        }
                        b"binaryDataArray" => {
                            if let Some(ctx) = array.take() {
                                if with_arrays {
                                    ctx.decode_into(&mut spectrum)?;
                                }
                            }
                        }
                        _ => {}
                    }
                }
                Ok(Event::Eof) => {
                    return Err(MzmlError::InvalidStructure(
                        "unexpected EOF inside <spectrum>".to_string(),
                    ));
                }
                Err(e) => return Err(MzmlError::Xml(e)),
                _ => {}
            }
            buf.clear();
        }

        Ok(spectrum)
    }
}

fn dispatch_cv(
    spectrum: &mut RawSpectrum,
    array: &mut Option<ArrayContext>,
    precursor: &mut Option<PrecursorInfo>,
    in_precursor: bool,
    in_scan: bool,
    cv: &CvParam,
) {
    if let Some(ctx) = array {
        ctx.apply(cv);
    } else if in_precursor {
        if let Some(prec) = precursor {
            apply_precursor_cv(prec, cv);
        }
    } else if in_scan {
        apply_scan_cv(spectrum, cv);
    } else {
        apply_spectrum_cv(spectrum, cv);
    }
}

#[derive(Debug, Default)]
struct ArrayContext {
    base64_data: String,
    encoding: BinaryEncoding,
    compression: Compression,
    is_mz: bool,
    is_intensity: bool,
}

impl ArrayContext {
    fn apply(&mut self, cv: &CvParam) {
        match cv.accession.as_str() {
            ACC_FLOAT_32 => self.encoding = BinaryEncoding::Float32,
            ACC_FLOAT_64 => self.encoding = BinaryEncoding::Float64,
            ACC_ZLIB => self.compression = Compression::Zlib,
            ACC_NO_COMPRESSION => self.compression = Compression::None,
            ACC_MZ_ARRAY => self.is_mz = true,
            ACC_INTENSITY_ARRAY => self.is_intensity = true,
            _ => {}
        }
    }

    fn decode_into(self, spectrum: &mut RawSpectrum) -> Result<(), MzmlError> {
        if self.base64_data.is_empty() {
            return Ok(());
        }
        let values = decode_binary(&self.base64_data, self.encoding, self.compression)?;
        if self.is_mz {
            spectrum.mz_array = values;
        } else if self.is_intensity {
            spectrum.intensity_array = values;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CvParam {
    accession: String,
    value: Option<String>,
    unit_accession: Option<String>,
}

impl CvParam {
    fn value_as_f64(&self) -> Option<f64> {
        self.value.as_ref()?.parse().ok()
    }
}

fn parse_cv_param(e: &BytesStart) -> Result<CvParam, MzmlError> {
    Ok(CvParam {
        accession: attribute(e, "accession")?.unwrap_or_default(),
        value: attribute(e, "value")?,
        unit_accession: attribute(e, "unitAccession")?,
    })
}

fn apply_spectrum_cv(spectrum: &mut RawSpectrum, cv: &CvParam) {
    match cv.accession.as_str() {
        ACC_MS_LEVEL => {
            spectrum.ms_level = cv
                .value
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
        }
        ACC_TOTAL_ION_CURRENT => spectrum.total_ion_current = cv.value_as_f64(),
        _ => {}
    }
}

fn apply_scan_cv(spectrum: &mut RawSpectrum, cv: &CvParam) {
    match cv.accession.as_str() {
        ACC_SCAN_START_TIME => {
            if let Some(val) = cv.value_as_f64() {
                let seconds = if cv.unit_accession.as_deref() == Some(UNIT_MINUTE) {
                    val * 60.0
                } else {
                    val
                };
                spectrum.rt_seconds = Some(seconds);
            }
        }
        ACC_ION_INJECTION_TIME => spectrum.injection_time_ms = cv.value_as_f64(),
        _ => apply_spectrum_cv(spectrum, cv),
    }
}

fn apply_precursor_cv(precursor: &mut PrecursorInfo, cv: &CvParam) {
    match cv.accession.as_str() {
        // Some writers use the legacy m/z accession on the selected ion.
        ACC_SELECTED_ION_MZ | ACC_MZ => {
            if precursor.selected_ion_mz.is_none() || cv.accession == ACC_SELECTED_ION_MZ {
                precursor.selected_ion_mz = cv.value_as_f64();
            }
        }
        ACC_PEAK_INTENSITY => precursor.selected_ion_intensity = cv.value_as_f64(),
        ACC_CHARGE_STATE => {
            precursor.charge = cv.value.as_deref().and_then(|s| s.parse().ok());
        }
        _ => {}
    }
}

fn attribute(e: &BytesStart, name: &str) -> Result<Option<String>, MzmlError> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name.as_bytes() {
            return Ok(Some(String::from_utf8_lossy(&attr.value).into_owned()));
        }
    }
    Ok(None)
}
