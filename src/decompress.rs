use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::MultiGzDecoder;
use serde::Serialize;
use tracing::info;

use crate::domain::DecompressTask;
use crate::error::{SeqidxError, Stage};
use crate::fs_util;
use crate::pool::{CancelFlag, Cancellable, FailurePolicy, run_pool};

pub const DEFAULT_DECOMPRESS_WORKERS: usize = 3;
/// Decompression is CPU and disk bound; more workers than this only thrash.
pub const MAX_DECOMPRESS_WORKERS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct DecompressedFile {
    pub source: Utf8PathBuf,
    pub destination: Utf8PathBuf,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DecompressReport {
    pub files: Vec<DecompressedFile>,
}

/// Gunzips every `compressed → plain` pair with at most
/// [`MAX_DECOMPRESS_WORKERS`] threads.
pub fn decompress(
    pairs: &BTreeMap<Utf8PathBuf, Utf8PathBuf>,
    max_concurrency: usize,
) -> Result<DecompressReport, SeqidxError> {
    let workers = max_concurrency.clamp(1, MAX_DECOMPRESS_WORKERS);
    let tasks = pairs
        .iter()
        .map(|(source, destination)| DecompressTask {
            source: source.clone(),
            destination: destination.clone(),
        })
        .collect::<Vec<_>>();

    info!(files = tasks.len(), workers, "starting decompression");
    let outcome = run_pool(tasks, workers, FailurePolicy::CancelSiblings, |task, cancel| {
        decompress_one(task, cancel)
    });
    let completed = outcome.into_result(Stage::Decompress, |task| task.source.to_string())?;

    let files = completed
        .into_iter()
        .map(|(task, bytes)| DecompressedFile {
            source: task.source,
            destination: task.destination,
            bytes,
        })
        .collect();
    Ok(DecompressReport { files })
}

fn decompress_one(task: &DecompressTask, cancel: &CancelFlag) -> Result<u64, SeqidxError> {
    info!(file = %task.source, "decompressing");
    let bytes = gunzip(&task.source, &task.destination, cancel).map_err(|err| cancel.classify(err))?;
    info!(file = %task.destination, bytes, "decompressed");
    Ok(bytes)
}

/// Streams `source` through a gzip decoder into `destination`.
pub fn gunzip(
    source: &Utf8Path,
    destination: &Utf8Path,
    cancel: &CancelFlag,
) -> Result<u64, SeqidxError> {
    let file = File::open(source).map_err(|err| decompression_error(source, err))?;
    let mut decoder = MultiGzDecoder::new(BufReader::new(file));
    fs_util::write_atomically(destination, |writer| {
        let mut sink = Cancellable::new(writer, cancel);
        io::copy(&mut decoder, &mut sink).map_err(|err| decompression_error(source, err))
    })
}

fn decompression_error(path: &Utf8Path, err: io::Error) -> SeqidxError {
    SeqidxError::Decompression {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
