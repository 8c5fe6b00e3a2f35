//! Optional XIC chromatogram output.
//!
//! When enabled, the extracted chromatograms are written next to the raw
//! file as `<raw-stem>-quameter_chromatograms.mzML`: a minimal mzML
//! document holding one chromatogram per XIC window, peptide windows
//! first, then identified-scan windows, then unidentified-scan windows.
//! Time is in seconds, intensities in counts, arrays uncompressed
//! little-endian 64-bit floats.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::mzml::encode_binary_f64;
use crate::xic::{XicOutcome, XicWindow};

const ACC_TIME_ARRAY: &str = "MS:1000595";
const ACC_INTENSITY_ARRAY: &str = "MS:1000515";
const ACC_XIC: &str = "MS:1000627";
const ACC_FLOAT_64: &str = "MS:1000523";
const ACC_NO_COMPRESSION: &str = "MS:1000576";

/// Errors from chromatogram output.
#[derive(Debug, thiserror::Error)]
pub enum ChromatogramError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Output path: `<raw-stem>-quameter_chromatograms.mzML` beside the raw file.
pub fn chromatogram_output_path(raw_path: &Path) -> PathBuf {
    let stem = raw_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    raw_path.with_file_name(format!("{stem}-quameter_chromatograms.mzML"))
}

/// Write every extracted chromatogram for a run.
pub fn write_chromatograms(
    xics: &XicOutcome,
    raw_path: &Path,
    run_id: &str,
) -> Result<PathBuf, ChromatogramError> {
    let path = chromatogram_output_path(raw_path);
    let file = BufWriter::new(File::create(&path)?);
    let mut writer = Writer::new_with_indent(file, b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut mzml = BytesStart::new("mzML");
    mzml.push_attribute(("xmlns", "http://psi.hupo.org/ms/mzml"));
    mzml.push_attribute(("version", "1.1.0"));
    writer.write_event(Event::Start(mzml))?;

    let mut run = BytesStart::new("run");
    run.push_attribute(("id", run_id));
    writer.write_event(Event::Start(run))?;

    let total = xics.peptide_windows.len()
        + xics.identified_windows.len()
        + xics.unidentified_windows.len();
    let mut list = BytesStart::new("chromatogramList");
    list.push_attribute(("count", total.to_string().as_str()));
    writer.write_event(Event::Start(list))?;

    let mut index = 0usize;
    for window in &xics.peptide_windows {
        write_chromatogram(&mut writer, "unique identified peptide", index, window)?;
        index += 1;
    }
    for window in &xics.identified_windows {
        write_chromatogram(&mut writer, "identified MS2 scan", index, window)?;
        index += 1;
    }
    for window in &xics.unidentified_windows {
        write_chromatogram(&mut writer, "unidentified MS2 scan", index, window)?;
        index += 1;
    }

    writer.write_event(Event::End(BytesEnd::new("chromatogramList")))?;
    writer.write_event(Event::End(BytesEnd::new("run")))?;
    writer.write_event(Event::End(BytesEnd::new("mzML")))?;
    writer.into_inner().flush()?;
    Ok(path)
}

fn write_chromatogram<W: Write>(
    writer: &mut Writer<W>,
    id: &str,
    index: usize,
    window: &XicWindow,
) -> Result<(), ChromatogramError> {
    let mut chrom = BytesStart::new("chromatogram");
    chrom.push_attribute(("index", index.to_string().as_str()));
    chrom.push_attribute(("id", id));
    chrom.push_attribute(("defaultArrayLength", window.rt_list.len().to_string().as_str()));
    writer.write_event(Event::Start(chrom))?;

    write_cv_param(writer, ACC_XIC, "extracted ion chromatogram")?;

    let mut bdal = BytesStart::new("binaryDataArrayList");
    bdal.push_attribute(("count", "2"));
    writer.write_event(Event::Start(bdal))?;
    write_binary_array(writer, &window.rt_list, ACC_TIME_ARRAY, "time array")?;
    write_binary_array(writer, &window.intensity_list, ACC_INTENSITY_ARRAY, "intensity array")?;
    writer.write_event(Event::End(BytesEnd::new("binaryDataArrayList")))?;

    writer.write_event(Event::End(BytesEnd::new("chromatogram")))?;
    Ok(())
}

fn write_binary_array<W: Write>(
    writer: &mut Writer<W>,
    values: &[f64],
    type_accession: &str,
    type_name: &str,
) -> Result<(), ChromatogramError> {
    let encoded = encode_binary_f64(values);
    let mut bda = BytesStart::new("binaryDataArray");
    bda.push_attribute(("encodedLength", encoded.len().to_string().as_str()));
    writer.write_event(Event::Start(bda))?;

    write_cv_param(writer, ACC_FLOAT_64, "64-bit float")?;
    write_cv_param(writer, ACC_NO_COMPRESSION, "no compression")?;
    write_cv_param(writer, type_accession, type_name)?;

    writer.write_event(Event::Start(BytesStart::new("binary")))?;
    writer.write_event(Event::Text(BytesText::new(&encoded)))?;
    writer.write_event(Event::End(BytesEnd::new("binary")))?;

    writer.write_event(Event::End(BytesEnd::new("binaryDataArray")))?;
    Ok(())
}

fn write_cv_param<W: Write>(
    writer: &mut Writer<W>,
    accession: &str,
    name: &str,
) -> Result<(), ChromatogramError> {
    let mut cv = BytesStart::new("cvParam");
    cv.push_attribute(("cvRef", "MS"));
    cv.push_attribute(("accession", accession));
    cv.push_attribute(("name", name));
    writer.write_event(Event::Empty(cv))?;
    Ok(())
}
