//! # mzQual
//!
//! A command-line tool computing quality-assurance metric panels for
//! LC-MS proteomics runs: one raw file plus its peptide-identification
//! database in, one `.qual.txt` metric row out.
//!
//! ## Usage
//!
//! ```bash
//! # All identification databases in a directory, default settings
//! mzqual '/data/batch/*.idpDB'
//!
//! # Explicit raw-file location, 4 workers, with XIC chromatograms
//! mzqual --raw-data-path /data/raw --cpus 4 --chromatogram-output run01.idpDB
//! ```

mod cli;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::Parser;

fn main() -> Result<()> {
    let cli = match cli::Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit();
        }
        Err(e) => {
            // Usage errors exit 1, not clap's default 2.
            let _ = e.print();
            std::process::exit(1);
        }
    };
    cli::init_logging(cli.verbosity());
    cli::dispatch(cli)
}
