use std::fmt;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::algorithm::{Algorithm, IndexReport, ToolRunner};
use crate::config::Settings;
use crate::decompress::{DecompressReport, decompress};
use crate::domain::Provider;
use crate::error::{SeqidxError, Stage};
use crate::fetch::{Downloader, FetchReport};
use crate::fs_util;
use crate::pool::{FailurePolicy, run_pool};
use crate::remote::Fetcher;
use crate::source::{AnnotationSource, GenomeFiles, SourceOptions};

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    ResolvingSource,
    Fetching,
    Decompressing,
    Indexing,
    Done,
    Aborted,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::ResolvingSource => "resolve",
            PipelineState::Fetching => "fetch",
            PipelineState::Decompressing => "decompress",
            PipelineState::Indexing => "index",
            PipelineState::Done => "done",
            PipelineState::Aborted => "aborted",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub state: PipelineState,
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Forwards progress events to the tracing subscriber.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        let elapsed_ms = event.elapsed.map(|elapsed| elapsed.as_millis());
        match event.state {
            PipelineState::Aborted => warn!(phase = %event.state, ?elapsed_ms, "{}", event.message),
            _ => info!(phase = %event.state, ?elapsed_ms, "{}", event.message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexRequest {
    pub provider: Provider,
    pub species: String,
    pub version: String,
    pub existing_base_dir: Option<Utf8PathBuf>,
    pub algorithms: Vec<Algorithm>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub provider: Provider,
    pub species: String,
    pub version: String,
    pub genome_assembly: String,
    pub base_dir: Utf8PathBuf,
    pub fetched: Option<FetchReport>,
    pub decompressed: Option<DecompressReport>,
    pub indices: Vec<IndexReport>,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct BundleManifest {
    pub provider: Provider,
    pub species: String,
    pub version: String,
    pub genome_assembly: String,
    pub fa_file: String,
    pub gtf_file: String,
    pub tx_fa_file: String,
    pub sources: Vec<String>,
    pub prepared_at: DateTime<Utc>,
}

/// Resolve → fetch → decompress → index, stopping at the first failed stage.
pub struct Pipeline<F, R> {
    downloader: Downloader<F>,
    runner: R,
    settings: Settings,
}

impl<F: Fetcher, R: ToolRunner> Pipeline<F, R> {
    pub fn new(fetcher: F, runner: R, settings: Settings) -> Self {
        Self {
            downloader: Downloader::new(fetcher, settings.connections),
            runner,
            settings,
        }
    }

    pub fn fetcher(&self) -> &F {
        self.downloader.fetcher()
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn run(
        &self,
        request: &IndexRequest,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, SeqidxError> {
        let start = Instant::now();
        let result = self.run_stages(request, sink, start);
        if let Err(err) = &result {
            sink.event(ProgressEvent {
                state: PipelineState::Aborted,
                message: err.to_string(),
                elapsed: Some(start.elapsed()),
            });
        }
        result
    }

    fn run_stages(
        &self,
        request: &IndexRequest,
        sink: &dyn ProgressSink,
        start: Instant,
    ) -> Result<RunReport, SeqidxError> {
        let transition = |state: PipelineState, message: String| {
            sink.event(ProgressEvent {
                state,
                message,
                elapsed: Some(start.elapsed()),
            })
        };

        transition(
            PipelineState::ResolvingSource,
            format!(
                "{} {} release {}",
                request.provider, request.species, request.version
            ),
        );
        let source = AnnotationSource::new(
            request.provider,
            &request.species,
            &request.version,
            SourceOptions {
                output_root: self.settings.output_root.clone(),
                existing_base_dir: request.existing_base_dir.clone(),
                transport: self.settings.transport,
            },
        )?;
        let base_dir = source.base_dir();

        let (fetched, decompressed) = if source.is_prepared() {
            if !base_dir.is_dir() {
                return Err(SeqidxError::InvalidArgument(format!(
                    "existing bundle directory not found: {base_dir}"
                )));
            }
            (None, None)
        } else {
            let tasks = source.download_tasks();
            transition(
                PipelineState::Fetching,
                format!(
                    "{} file(s) for {} into {base_dir}",
                    tasks.len(),
                    source.genome_assembly()
                ),
            );
            let fetched = self.downloader.download(&base_dir, tasks)?;

            let pairs = source.decompress_tasks();
            transition(
                PipelineState::Decompressing,
                format!("{} file(s)", pairs.len()),
            );
            let decompressed = decompress(&pairs, self.settings.decompress_workers)?;
            write_manifest(&source)?;
            (Some(fetched), Some(decompressed))
        };

        transition(
            PipelineState::Indexing,
            request
                .algorithms
                .iter()
                .map(Algorithm::name)
                .collect::<Vec<_>>()
                .join(", "),
        );
        let indices = self.build_indices(&source, &request.algorithms)?;

        transition(PipelineState::Done, format!("bundle ready in {base_dir}"));
        Ok(RunReport {
            provider: source.provider(),
            species: source.species().to_string(),
            version: source.version().to_string(),
            genome_assembly: source.genome_assembly().to_string(),
            base_dir,
            fetched,
            decompressed,
            indices,
            elapsed_ms: start.elapsed().as_millis(),
        })
    }

    /// Checks every requested tool before building any index, then builds all
    /// of them concurrently and reports every failure.
    pub fn build_indices(
        &self,
        files: &dyn GenomeFiles,
        algorithms: &[Algorithm],
    ) -> Result<Vec<IndexReport>, SeqidxError> {
        let mut missing = algorithms
            .iter()
            .filter_map(|algorithm| algorithm.check_availability(&self.runner).err())
            .collect::<Vec<_>>();
        match missing.len() {
            0 => {}
            1 => return Err(missing.remove(0)),
            _ => {
                return Err(SeqidxError::StageFailed {
                    stage: Stage::Index,
                    failures: missing,
                    incomplete: algorithms.iter().map(|a| a.name().to_string()).collect(),
                });
            }
        }

        let outcome = run_pool(
            algorithms.to_vec(),
            algorithms.len(),
            FailurePolicy::RunToCompletion,
            |algorithm, _| algorithm.build_index(files, &self.runner),
        );
        let built = outcome.into_result(Stage::Index, |algorithm| algorithm.name().to_string())?;
        Ok(built.into_iter().map(|(_, report)| report).collect())
    }
}

fn write_manifest(source: &AnnotationSource) -> Result<(), SeqidxError> {
    let manifest = BundleManifest {
        provider: source.provider(),
        species: source.species().to_string(),
        version: source.version().to_string(),
        genome_assembly: source.genome_assembly().to_string(),
        fa_file: source.fa_file(),
        gtf_file: source.gtf_file(),
        tx_fa_file: source.tx_fa_file(),
        sources: source.remote_files().iter().map(|file| file.url()).collect(),
        prepared_at: Utc::now(),
    };
    let content = serde_json::to_vec_pretty(&manifest)
        .map_err(|err| SeqidxError::Filesystem(err.to_string()))?;
    fs_util::write_bytes_atomic(&source.base_dir().join(MANIFEST_FILE_NAME), &content)
}
