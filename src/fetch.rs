use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::info;

use crate::domain::DownloadTask;
use crate::error::{SeqidxError, Stage};
use crate::fs_util;
use crate::pool::{CancelFlag, Cancellable, FailurePolicy, run_pool};
use crate::remote::Fetcher;

pub const DEFAULT_CONNECTIONS: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct FetchedFile {
    pub file_name: String,
    pub url: String,
    pub destination: Utf8PathBuf,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchReport {
    pub files: Vec<FetchedFile>,
}

impl FetchReport {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|file| file.bytes).sum()
    }
}

/// Downloads a batch of remote files with a fixed number of connections.
pub struct Downloader<F> {
    fetcher: F,
    max_concurrency: usize,
}

impl<F: Fetcher> Downloader<F> {
    pub fn new(fetcher: F, max_concurrency: usize) -> Self {
        Self {
            fetcher,
            max_concurrency,
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Fetches every task into `dest_dir`, which must not exist yet.
    ///
    /// The first failed transfer cancels the rest: queued tasks are skipped and
    /// running transfers stop at their next write. The error then lists every
    /// failure and every file left unfinished.
    pub fn download(
        &self,
        dest_dir: &Utf8Path,
        tasks: Vec<DownloadTask>,
    ) -> Result<FetchReport, SeqidxError> {
        if self.max_concurrency == 0 {
            return Err(SeqidxError::InvalidArgument(
                "download concurrency must be at least 1".to_string(),
            ));
        }
        fs_util::create_fresh_dir(dest_dir)?;

        info!(
            files = tasks.len(),
            connections = self.max_concurrency,
            dir = %dest_dir,
            "starting downloads"
        );
        let outcome = run_pool(
            tasks,
            self.max_concurrency,
            FailurePolicy::CancelSiblings,
            |task, cancel| self.fetch_one(task, cancel),
        );
        let completed = outcome.into_result(Stage::Fetch, |task| task.file.file_name.clone())?;

        let files = completed
            .into_iter()
            .map(|(task, bytes)| FetchedFile {
                url: task.file.url(),
                file_name: task.file.file_name,
                destination: task.destination,
                bytes,
            })
            .collect();
        Ok(FetchReport { files })
    }

    fn fetch_one(&self, task: &DownloadTask, cancel: &CancelFlag) -> Result<u64, SeqidxError> {
        info!(file = %task.file.file_name, "downloading");
        let bytes = fs_util::write_atomically(&task.destination, |writer| {
            let mut sink = Cancellable::new(writer, cancel);
            self.fetcher.retrieve(&task.file, &mut sink)
        })
        .map_err(|err| cancel.classify(err))?;
        info!(file = %task.file.file_name, bytes, "downloaded");
        Ok(bytes)
    }
}
