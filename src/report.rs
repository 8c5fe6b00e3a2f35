//! `.qual.txt` output.
//!
//! One header line and one tab-separated value line per run. The column
//! order is fixed and matches downstream consumers of the historical
//! format, `IS1-B` spelling included. Missing values are the literal
//! string `NaN`. The file is created only once the panel exists, so a
//! failed run leaves nothing behind.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::metrics::MetricsPanel;

/// Fixed header line.
pub const HEADER: &str = "Filename\tC-1A\tC-1B\tC-2A\tC-2B\tC-3A\tC-3B\tC-4A\tC-4B\tC-4C\
\tDS-1A\tDS-1B\tDS-2A\tDS-2B\tDS-3A\tDS-3B\
\tIS-1A\tIS1-B\tIS-2\tIS-3A\tIS-3B\tIS-3C\
\tMS1-1\tMS1-2A\tMS1-2B\tMS1-3A\tMS1-3B\tMS1-5A\tMS1-5B\tMS1-5C\tMS1-5D\
\tMS2-1\tMS2-2\tMS2-3\tMS2-4A\tMS2-4B\tMS2-4C\tMS2-4D\
\tP-1\tP-2A\tP-2B\tP-2C\tP-3";

/// Output path for a raw file: `<raw-stem>.qual.txt` beside it.
pub fn qual_output_path(raw_path: &Path) -> PathBuf {
    raw_path.with_extension("qual.txt")
}

/// Render header plus value line.
pub fn render(panel: &MetricsPanel) -> String {
    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');
    out.push_str(&panel.filename);
    for v in [
        panel.c_1a, panel.c_1b, panel.c_2a, panel.c_2b, panel.c_3a, panel.c_3b, panel.c_4a,
        panel.c_4b, panel.c_4c, panel.ds_1a, panel.ds_1b,
    ] {
        push_value(&mut out, v);
    }
    push_count(&mut out, panel.ds_2a);
    push_count(&mut out, panel.ds_2b);
    push_value(&mut out, panel.ds_3a);
    push_value(&mut out, panel.ds_3b);
    push_count(&mut out, panel.is_1a);
    push_count(&mut out, panel.is_1b);
    for v in [
        panel.is_2, panel.is_3a, panel.is_3b, panel.is_3c, panel.ms1_1, panel.ms1_2a,
        panel.ms1_2b, panel.ms1_3a, panel.ms1_3b, panel.ms1_5a, panel.ms1_5b, panel.ms1_5c,
        panel.ms1_5d, panel.ms2_1, panel.ms2_2, panel.ms2_3, panel.ms2_4a, panel.ms2_4b,
        panel.ms2_4c, panel.ms2_4d, panel.p_1,
    ] {
        push_value(&mut out, v);
    }
    push_count(&mut out, panel.p_2a);
    push_count(&mut out, panel.p_2b);
    push_count(&mut out, panel.p_2c);
    push_value(&mut out, panel.p_3);
    out.push('\n');
    out
}

/// Write the panel beside the raw file it describes.
pub fn write_panel(panel: &MetricsPanel, raw_path: &Path) -> io::Result<PathBuf> {
    let path = qual_output_path(raw_path);
    fs::write(&path, render(panel))?;
    Ok(path)
}

fn push_value(out: &mut String, v: f64) {
    if v.is_nan() {
        out.push_str("\tNaN");
    } else {
        let _ = write!(out, "\t{v}");
    }
}

fn push_count(out: &mut String, v: usize) {
    let _ = write!(out, "\t{v}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nan_panel() -> MetricsPanel {
        MetricsPanel {
            filename: "run.mzML".to_string(),
            c_1a: f64::NAN,
            c_1b: f64::NAN,
            c_2a: 0.5,
            c_2b: 12.0,
            c_3a: f64::NAN,
            c_3b: f64::NAN,
            c_4a: f64::NAN,
            c_4b: f64::NAN,
            c_4c: f64::NAN,
            ds_1a: 2.0,
            ds_1b: f64::NAN,
            ds_2a: 10,
            ds_2b: 40,
            ds_3a: f64::NAN,
            ds_3b: f64::NAN,
            is_1a: 0,
            is_1b: 1,
            is_2: 550.5,
            is_3a: 0.25,
            is_3b: 0.5,
            is_3c: f64::NAN,
            ms1_1: f64::NAN,
            ms1_2a: 3.5,
            ms1_2b: 12.25,
            ms1_3a: f64::NAN,
            ms1_3b: f64::NAN,
            ms1_5a: 0.001,
            ms1_5b: 0.002,
            ms1_5c: 2.0,
            ms1_5d: 4.0,
            ms2_1: f64::NAN,
            ms2_2: 8.0,
            ms2_3: 120.0,
            ms2_4a: 0.25,
            ms2_4b: 0.5,
            ms2_4c: 0.75,
            ms2_4d: 1.0,
            p_1: 25.0,
            p_2a: 100,
            p_2b: 80,
            p_2c: 60,
            p_3: 0.1,
        }
    }

    #[test]
    fn test_header_has_42_metric_columns() {
        assert_eq!(HEADER.split('\t').count(), 43);
        assert!(HEADER.starts_with("Filename\tC-1A"));
        // Historical spelling of the second ion-source column.
        assert!(HEADER.contains("\tIS-1A\tIS1-B\t"));
    }

    #[test]
    fn test_render_shape_and_nan() {
        let text = render(&nan_panel());
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        let values = lines.next().unwrap();
        assert!(lines.next().is_none());
        assert_eq!(header.split('\t').count(), values.split('\t').count());

        let cells: Vec<&str> = values.split('\t').collect();
        assert_eq!(cells[0], "run.mzML");
        // C-1A and C-1B are NaN in this panel.
        assert_eq!(cells[1], "NaN");
        assert_eq!(cells[2], "NaN");
        // counts print as integers
        assert_eq!(cells[12], "10");
        assert_eq!(cells[13], "40");
        assert_eq!(cells[16], "0");
        assert_eq!(cells[17], "1");
        // MS1-1 and MS2-1 carry the NaN marker
        assert_eq!(cells[22], "NaN");
        assert_eq!(cells[31], "NaN");
    }

    #[test]
    fn test_output_path() {
        assert_eq!(
            qual_output_path(Path::new("/data/run01.mzML")),
            PathBuf::from("/data/run01.qual.txt")
        );
    }

    #[test]
    fn test_write_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("run01.mzML");
        let written = write_panel(&nan_panel(), &raw).unwrap();
        assert_eq!(written, dir.path().join("run01.qual.txt"));
        let body = fs::read_to_string(written).unwrap();
        assert!(body.starts_with("Filename\t"));
        assert!(body.ends_with('\n'));
    }
}
