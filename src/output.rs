use std::io::{self, Write};

use serde::Serialize;

use crate::app::RunReport;
use crate::mirbase::MirnaReport;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(report: &RunReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_mirna(report: &MirnaReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub fn print_run_summary(report: &RunReport) {
    println!(
        "{} {} release {} ({})",
        report.provider, report.species, report.version, report.genome_assembly
    );
    println!("  bundle: {}", report.base_dir);
    match &report.fetched {
        Some(fetched) => println!(
            "  downloaded: {} file(s), {} bytes",
            fetched.files.len(),
            fetched.total_bytes()
        ),
        None => println!("  downloaded: skipped (existing directory)"),
    }
    if let Some(decompressed) = &report.decompressed {
        println!("  decompressed: {} file(s)", decompressed.files.len());
    }
    for index in &report.indices {
        for dir in &index.index_dirs {
            println!("  {}: {dir}", index.algorithm);
        }
    }
    println!("  elapsed: {:.1}s", report.elapsed_ms as f64 / 1000.0);
}

pub fn print_mirna_summary(report: &MirnaReport) {
    println!("miRBase release {} in {}", report.release, report.base_dir);
    for species in &report.species {
        println!(
            "  {}: {} record(s) -> {}",
            species.species, species.records, species.path
        );
    }
}
