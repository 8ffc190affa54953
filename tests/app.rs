use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;

use seqidx::algorithm::{Algorithm, StarOptions, ToolRunner};
use seqidx::app::{
    IndexRequest, MANIFEST_FILE_NAME, Pipeline, PipelineState, ProgressEvent, ProgressSink,
};
use seqidx::config::Settings;
use seqidx::domain::{Provider, RemoteFileRef, SeqType};
use seqidx::error::{SeqidxError, Stage};
use seqidx::remote::Fetcher;

/// Serves every file as a small gzip member naming the file.
#[derive(Default)]
struct MockFetcher {
    calls: Mutex<usize>,
}

impl Fetcher for MockFetcher {
    fn retrieve(&self, file: &RemoteFileRef, sink: &mut dyn Write) -> Result<u64, SeqidxError> {
        *self.calls.lock().unwrap() += 1;
        let plain = file.file_name.trim_end_matches(".gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder
            .write_all(format!(">{plain}\nACGT\n").as_bytes())
            .unwrap();
        let body = encoder.finish().unwrap();
        sink.write_all(&body).unwrap();
        Ok(body.len() as u64)
    }
}

struct MockRunner {
    installed: Vec<&'static str>,
    runs: Mutex<Vec<(String, Vec<String>)>>,
}

impl MockRunner {
    fn with(installed: &[&'static str]) -> Self {
        Self {
            installed: installed.to_vec(),
            runs: Mutex::new(Vec::new()),
        }
    }

    fn everything() -> Self {
        Self::with(&["STAR", "salmon", "bwa", "bowtie-build", "bowtie2-build"])
    }

    fn runs(&self) -> Vec<(String, Vec<String>)> {
        self.runs.lock().unwrap().clone()
    }
}

impl ToolRunner for MockRunner {
    fn locate(&self, binary: &str) -> Option<PathBuf> {
        self.installed
            .iter()
            .any(|name| *name == binary)
            .then(|| PathBuf::from("/usr/bin").join(binary))
    }

    fn run(&self, program: &str, args: &[String]) -> Result<(), SeqidxError> {
        self.runs
            .lock()
            .unwrap()
            .push((program.to_string(), args.to_vec()));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    states: Mutex<Vec<PipelineState>>,
}

impl RecordingSink {
    fn states(&self) -> Vec<PipelineState> {
        self.states.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.states.lock().unwrap().push(event.state);
    }
}

fn scratch() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

fn settings(root: &Utf8PathBuf) -> Settings {
    Settings {
        output_root: root.clone(),
        ..Settings::default()
    }
}

fn human_rna(existing_base_dir: Option<Utf8PathBuf>) -> IndexRequest {
    IndexRequest {
        provider: Provider::Gencode,
        species: "hs".to_string(),
        version: "30".to_string(),
        existing_base_dir,
        algorithms: Algorithm::preset(SeqType::Rna, StarOptions::default()),
    }
}

#[test]
fn gencode_human_end_to_end() {
    let (_temp, root) = scratch();
    let pipeline = Pipeline::new(MockFetcher::default(), MockRunner::everything(), settings(&root));
    let sink = RecordingSink::default();

    let report = pipeline.run(&human_rna(None), &sink).unwrap();

    assert_eq!(
        sink.states(),
        vec![
            PipelineState::ResolvingSource,
            PipelineState::Fetching,
            PipelineState::Decompressing,
            PipelineState::Indexing,
            PipelineState::Done,
        ]
    );
    let base_dir = root.join("gencode_hs_30");
    assert_eq!(report.base_dir, base_dir);
    assert_eq!(*pipeline.fetcher().calls.lock().unwrap(), 6);
    assert_eq!(report.fetched.as_ref().unwrap().files.len(), 6);
    assert_eq!(report.decompressed.as_ref().unwrap().files.len(), 3);

    for name in [
        "GRCh38.primary_assembly.genome.fa",
        "gencode.v30.primary_assembly.annotation.gtf",
        "gencode.v30.transcripts.fa",
    ] {
        let content = std::fs::read_to_string(base_dir.join(name)).unwrap();
        assert_eq!(content, format!(">{name}\nACGT\n"));
    }
    assert!(base_dir.join(MANIFEST_FILE_NAME).exists());
    assert!(base_dir.join("star_idx").is_dir());

    // One STAR build plus one salmon build per k-mer.
    let runs = pipeline.runner().runs();
    assert_eq!(runs.len(), 7);
    assert_eq!(runs.iter().filter(|(program, _)| program == "salmon").count(), 6);
    assert_eq!(report.indices.len(), 2);
}

#[test]
fn manifest_records_bundle_files() {
    let (_temp, root) = scratch();
    let pipeline = Pipeline::new(MockFetcher::default(), MockRunner::everything(), settings(&root));
    let mut request = human_rna(None);
    request.algorithms = vec![Algorithm::Bwa];

    pipeline.run(&request, &RecordingSink::default()).unwrap();

    let raw = std::fs::read_to_string(root.join("gencode_hs_30").join(MANIFEST_FILE_NAME)).unwrap();
    let manifest: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(manifest["provider"], "gencode");
    assert_eq!(manifest["genome_assembly"], "GRCh38");
    assert_eq!(manifest["fa_file"], "GRCh38.primary_assembly.genome.fa");
    assert_eq!(manifest["sources"].as_array().unwrap().len(), 6);
}

#[test]
fn missing_tool_aborts_before_any_build() {
    let (_temp, root) = scratch();
    let pipeline = Pipeline::new(
        MockFetcher::default(),
        MockRunner::with(&["STAR"]),
        settings(&root),
    );
    let sink = RecordingSink::default();

    let err = pipeline.run(&human_rna(None), &sink).unwrap_err();

    assert_matches!(err, SeqidxError::BinaryNotFound(binary) if binary == "salmon");
    assert_eq!(sink.states().last(), Some(&PipelineState::Aborted));
    assert!(!sink.states().contains(&PipelineState::Done));
    assert!(pipeline.runner().runs().is_empty());
    assert!(!root.join("gencode_hs_30").join("star_idx").exists());
}

#[test]
fn several_missing_tools_are_reported_together() {
    let (_temp, root) = scratch();
    let pipeline = Pipeline::new(MockFetcher::default(), MockRunner::with(&[]), settings(&root));
    let mut request = human_rna(None);
    request.algorithms = Algorithm::preset(SeqType::Chip, StarOptions::default());

    let err = pipeline.run(&request, &RecordingSink::default()).unwrap_err();

    assert_matches!(
        err,
        SeqidxError::StageFailed { stage: Stage::Index, ref failures, .. } if failures.len() == 3
    );
    assert_eq!(err.exit_code(), 3);
    assert!(pipeline.runner().runs().is_empty());
}

#[test]
fn existing_directory_skips_fetch_and_decompress() {
    let (_temp, root) = scratch();
    let existing = root.join("my_human");
    std::fs::create_dir(&existing).unwrap();
    let pipeline = Pipeline::new(MockFetcher::default(), MockRunner::everything(), settings(&root));
    let sink = RecordingSink::default();

    let report = pipeline.run(&human_rna(Some(existing.clone())), &sink).unwrap();

    assert_eq!(*pipeline.fetcher().calls.lock().unwrap(), 0);
    assert_eq!(
        sink.states(),
        vec![
            PipelineState::ResolvingSource,
            PipelineState::Indexing,
            PipelineState::Done,
        ]
    );
    assert_eq!(report.base_dir, existing);
    assert!(report.fetched.is_none());

    let runs = pipeline.runner().runs();
    let (_, star_args) = runs
        .iter()
        .find(|(program, _)| program == "STAR")
        .unwrap();
    assert!(star_args.contains(&existing.join("GRCh38.primary_assembly.genome.fa").to_string()));
}

#[test]
fn missing_existing_directory_aborts_before_indexing() {
    let (_temp, root) = scratch();
    let missing = root.join("does").join("not").join("exist");
    let pipeline = Pipeline::new(MockFetcher::default(), MockRunner::everything(), settings(&root));
    let sink = RecordingSink::default();

    let err = pipeline.run(&human_rna(Some(missing.clone())), &sink).unwrap_err();

    assert_matches!(err, SeqidxError::InvalidArgument(_));
    assert_eq!(
        sink.states(),
        vec![PipelineState::ResolvingSource, PipelineState::Aborted]
    );
    assert!(pipeline.runner().runs().is_empty());
    assert_eq!(*pipeline.fetcher().calls.lock().unwrap(), 0);
    assert!(!missing.exists());
    assert!(!root.join("does").exists());
}

#[test]
fn existing_bundle_directory_is_not_overwritten() {
    let (_temp, root) = scratch();
    std::fs::create_dir(root.join("gencode_hs_30")).unwrap();
    let pipeline = Pipeline::new(MockFetcher::default(), MockRunner::everything(), settings(&root));
    let sink = RecordingSink::default();

    let err = pipeline.run(&human_rna(None), &sink).unwrap_err();

    assert_matches!(err, SeqidxError::DestinationExists(_));
    assert_eq!(*pipeline.fetcher().calls.lock().unwrap(), 0);
    assert_eq!(sink.states().last(), Some(&PipelineState::Aborted));
}

#[test]
fn existing_index_directory_fails_only_that_algorithm() {
    let (_temp, root) = scratch();
    let existing = root.join("bundle");
    std::fs::create_dir_all(existing.join("star_idx")).unwrap();
    let pipeline = Pipeline::new(MockFetcher::default(), MockRunner::everything(), settings(&root));

    let err = pipeline
        .run(&human_rna(Some(existing)), &RecordingSink::default())
        .unwrap_err();

    assert_matches!(
        err,
        SeqidxError::StageFailed { stage: Stage::Index, ref failures, ref incomplete }
            if incomplete.is_empty()
                && matches!(&failures[..], [SeqidxError::IndexDirExists(_)])
    );
    let runs = pipeline.runner().runs();
    assert_eq!(runs.len(), 6);
    assert!(runs.iter().all(|(program, _)| program == "salmon"));
}

#[test]
fn unknown_release_aborts_without_touching_disk() {
    let (_temp, root) = scratch();
    let pipeline = Pipeline::new(MockFetcher::default(), MockRunner::everything(), settings(&root));
    let mut request = human_rna(None);
    request.version = "31".to_string();
    let sink = RecordingSink::default();

    let err = pipeline.run(&request, &sink).unwrap_err();

    assert_matches!(err, SeqidxError::Resolution { .. });
    assert_eq!(
        sink.states(),
        vec![PipelineState::ResolvingSource, PipelineState::Aborted]
    );
    assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
}
