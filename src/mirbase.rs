//! Mature miRNA sequences from miRBase, split per species.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Serialize;
use tracing::info;

use crate::config::Settings;
use crate::decompress::decompress;
use crate::domain::{DownloadTask, RemoteFileRef, Species};
use crate::error::SeqidxError;
use crate::fetch::Downloader;
use crate::fs_util;
use crate::remote::Fetcher;
use crate::source::gz_task;

const HOST: &str = "mirbase.org";
pub const MATURE_FILE: &str = "mature.fa";

#[derive(Debug, Clone)]
pub struct MirnaRequest {
    pub release: String,
    pub species: Vec<Species>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpeciesFile {
    pub species: String,
    pub path: Utf8PathBuf,
    pub records: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MirnaReport {
    pub release: String,
    pub base_dir: Utf8PathBuf,
    pub species: Vec<SpeciesFile>,
}

/// Directory of a release on the miRBase server; point releases live under
/// their full number.
pub fn release_dir(release: &str) -> Option<&'static str> {
    match release {
        "21" => Some("21"),
        "22" => Some("22.1"),
        _ => None,
    }
}

pub fn base_dir_name(release: &str) -> String {
    format!("mirbase_v{release}")
}

/// Downloads `mature.fa.gz` for the release, unpacks it and writes one
/// `<species>.fa` per requested species.
pub fn prepare<F: Fetcher>(
    downloader: &Downloader<F>,
    settings: &Settings,
    request: &MirnaRequest,
) -> Result<MirnaReport, SeqidxError> {
    let dir = release_dir(&request.release).ok_or_else(|| SeqidxError::UnknownRelease {
        provider: "mirbase".to_string(),
        release: request.release.clone(),
    })?;
    let base_dir = settings.output_root.join(base_dir_name(&request.release));
    let gz = gz_task(&base_dir, MATURE_FILE);

    let file = RemoteFileRef::new(
        settings.transport,
        HOST,
        format!("pub/mirbase/{dir}"),
        format!("{MATURE_FILE}.gz"),
    );
    downloader.download(
        &base_dir,
        vec![DownloadTask {
            file,
            destination: gz.source.clone(),
        }],
    )?;

    let pairs = BTreeMap::from([(gz.source, gz.destination.clone())]);
    decompress(&pairs, settings.decompress_workers)?;

    let mut species_files = Vec::with_capacity(request.species.len());
    for species in &request.species {
        let path = base_dir.join(format!("{}.fa", species.code()));
        info!(species = %species, "extracting mature miRNAs");
        let records = extract_species(&gz.destination, &path, *species)?;
        species_files.push(SpeciesFile {
            species: species.code().to_string(),
            path,
            records,
        });
    }

    Ok(MirnaReport {
        release: request.release.clone(),
        base_dir,
        species: species_files,
    })
}

/// Copies the records of `species` from a miRBase FASTA file, rewriting RNA
/// `U` to DNA `T` in sequence lines. Returns the number of records written.
pub fn extract_species(
    mature: &Utf8Path,
    destination: &Utf8Path,
    species: Species,
) -> Result<usize, SeqidxError> {
    // >hsa-let-7a-5p MIMAT0000062 Homo sapiens let-7a-5p
    let header = Regex::new(r"^>\S+\s+\S+\s+(\S+ \S+)")
        .map_err(|err| SeqidxError::InvalidArgument(err.to_string()))?;
    let wanted = species.binomial().replace('_', " ");

    let input = File::open(mature).map_err(|err| SeqidxError::filesystem(mature, err))?;
    let reader = BufReader::new(input);

    fs_util::write_atomically(destination, |writer| {
        let mut records = 0;
        let mut keep = false;
        for line in reader.lines() {
            let line = line.map_err(|err| SeqidxError::filesystem(mature, err))?;
            let out = if line.starts_with('>') {
                keep = header
                    .captures(&line)
                    .and_then(|caps| caps.get(1))
                    .is_some_and(|name| name.as_str() == wanted);
                if keep {
                    records += 1;
                }
                line
            } else {
                line.replace('U', "T")
            };
            if keep {
                writeln!(writer, "{out}").map_err(|err| SeqidxError::filesystem(destination, err))?;
            }
        }
        Ok(records)
    })
}
