//! External indexers and the argument vectors they are driven with.

use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::SeqType;
use crate::error::{SeqidxError, Stage};
use crate::fs_util;
use crate::pool::{FailurePolicy, run_pool};
use crate::source::GenomeFiles;

/// Salmon builds one index per k-mer length.
pub const SALMON_KMERS: [u32; 6] = [21, 23, 25, 27, 29, 31];

/// Locates and runs external programs.
pub trait ToolRunner: Send + Sync {
    fn locate(&self, binary: &str) -> Option<PathBuf>;

    /// Runs `program` to completion with inherited stdout/stderr.
    fn run(&self, program: &str, args: &[String]) -> Result<(), SeqidxError>;
}

/// Runs tools found on `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemToolRunner;

impl ToolRunner for SystemToolRunner {
    fn locate(&self, binary: &str) -> Option<PathBuf> {
        which::which(binary).ok()
    }

    fn run(&self, program: &str, args: &[String]) -> Result<(), SeqidxError> {
        let path = self
            .locate(program)
            .ok_or_else(|| SeqidxError::BinaryNotFound(program.to_string()))?;
        info!(program, args = %args.join(" "), "running indexer");
        let status = Command::new(&path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|err| SeqidxError::IndexBuild {
                algorithm: program.to_string(),
                message: err.to_string(),
            })?;
        if status.success() {
            return Ok(());
        }
        Err(SeqidxError::IndexBuild {
            algorithm: program.to_string(),
            message: format!("{} exited with {status}", path.display()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarOptions {
    pub threads: u32,
    /// `--genomeSAindexNbases`; scales with genome size (min(14, log2(len)/2 - 1)).
    pub sa_index_nbases: u32,
}

impl Default for StarOptions {
    fn default() -> Self {
        Self {
            threads: 4,
            sa_index_nbases: 13,
        }
    }
}

/// Algorithm names accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AlgorithmKind {
    Star,
    Salmon,
    Bwa,
    Bowtie,
    Bowtie2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum Algorithm {
    Star(StarOptions),
    Salmon,
    Bwa,
    Bowtie,
    Bowtie2,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub algorithm: String,
    pub index_dirs: Vec<Utf8PathBuf>,
}

impl Algorithm {
    pub fn from_kind(kind: AlgorithmKind, star: StarOptions) -> Self {
        match kind {
            AlgorithmKind::Star => Algorithm::Star(star),
            AlgorithmKind::Salmon => Algorithm::Salmon,
            AlgorithmKind::Bwa => Algorithm::Bwa,
            AlgorithmKind::Bowtie => Algorithm::Bowtie,
            AlgorithmKind::Bowtie2 => Algorithm::Bowtie2,
        }
    }

    /// Indexers built by default for a sequencing type.
    pub fn preset(seq_type: SeqType, star: StarOptions) -> Vec<Self> {
        match seq_type {
            SeqType::Rna => vec![Algorithm::Star(star), Algorithm::Salmon],
            SeqType::Chip => vec![Algorithm::Bowtie, Algorithm::Bowtie2, Algorithm::Bwa],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Star(_) => "STAR",
            Algorithm::Salmon => "Salmon",
            Algorithm::Bwa => "BWA",
            Algorithm::Bowtie => "Bowtie",
            Algorithm::Bowtie2 => "Bowtie2",
        }
    }

    pub fn binary(&self) -> &'static str {
        match self {
            Algorithm::Star(_) => "STAR",
            Algorithm::Salmon => "salmon",
            Algorithm::Bwa => "bwa",
            Algorithm::Bowtie => "bowtie-build",
            Algorithm::Bowtie2 => "bowtie2-build",
        }
    }

    /// Short tool name used for index directory names.
    fn dir_stem(&self) -> &'static str {
        match self {
            Algorithm::Star(_) => "star",
            Algorithm::Salmon => "salmon",
            Algorithm::Bwa => "bwa",
            Algorithm::Bowtie => "bowtie",
            Algorithm::Bowtie2 => "bowtie2",
        }
    }

    pub fn check_availability(&self, runner: &dyn ToolRunner) -> Result<(), SeqidxError> {
        runner
            .locate(self.binary())
            .map(|_| ())
            .ok_or_else(|| SeqidxError::BinaryNotFound(self.binary().to_string()))
    }

    /// Builds this algorithm's index from `files`. Refuses to run if any of
    /// its output directories already exists.
    pub fn build_index(
        &self,
        files: &dyn GenomeFiles,
        runner: &dyn ToolRunner,
    ) -> Result<IndexReport, SeqidxError> {
        let base_dir = files.base_dir();
        let commands = self.commands(files);
        if let Some((existing, _)) = commands.iter().find(|(dir, _)| dir.exists()) {
            return Err(SeqidxError::IndexDirExists(existing.clone()));
        }

        info!(algorithm = self.name(), dir = %base_dir, "building index");
        match self {
            // One salmon process per k-mer, all at once; salmon creates its own output dir.
            Algorithm::Salmon => {
                let outcome = run_pool(
                    commands.clone(),
                    commands.len(),
                    FailurePolicy::RunToCompletion,
                    |(_, args), _| {
                        info!(args = %args.join(" "), "salmon indexing");
                        runner.run(self.binary(), args)
                    },
                );
                outcome.into_result(Stage::Index, |(dir, _)| dir.to_string())?;
            }
            _ => {
                for (index_dir, args) in &commands {
                    fs_util::create_fresh_dir(index_dir).map_err(|err| match err {
                        SeqidxError::DestinationExists(dir) => SeqidxError::IndexDirExists(dir),
                        other => other,
                    })?;
                    runner.run(self.binary(), args)?;
                }
            }
        }
        info!(algorithm = self.name(), "finished index");

        Ok(IndexReport {
            algorithm: self.name().to_string(),
            index_dirs: commands.into_iter().map(|(dir, _)| dir).collect(),
        })
    }

    /// Every tool invocation this algorithm needs, paired with the index
    /// directory it writes. Salmon has one per k-mer; the rest have one.
    pub fn commands(&self, files: &dyn GenomeFiles) -> Vec<(Utf8PathBuf, Vec<String>)> {
        let base_dir = files.base_dir();
        let fa = files.fa_path().to_string();
        let index_dir = base_dir.join(format!("{}_idx", self.dir_stem()));
        let args = match self {
            Algorithm::Salmon => {
                return SALMON_KMERS
                    .iter()
                    .map(|kmer| (salmon_index_dir(&base_dir, *kmer), salmon_args(files, *kmer)))
                    .collect();
            }
            Algorithm::Star(options) => vec![
                "--runThreadN".to_string(),
                options.threads.to_string(),
                "--runMode".to_string(),
                "genomeGenerate".to_string(),
                "--genomeDir".to_string(),
                index_dir.to_string(),
                "--genomeSAindexNbases".to_string(),
                options.sa_index_nbases.to_string(),
                "--genomeFastaFiles".to_string(),
                fa,
                "--sjdbGTFfile".to_string(),
                files.gtf_path().to_string(),
            ],
            Algorithm::Bwa => vec![
                "index".to_string(),
                "-a".to_string(),
                "bwtsw".to_string(),
                "-p".to_string(),
                index_dir.join("bwa_idx").to_string(),
                fa,
            ],
            Algorithm::Bowtie | Algorithm::Bowtie2 => vec![
                "-f".to_string(),
                fa,
                index_dir.join(format!("{}_idx", self.dir_stem())).to_string(),
            ],
        };
        vec![(index_dir, args)]
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn salmon_index_dir(base_dir: &Utf8Path, kmer: u32) -> Utf8PathBuf {
    base_dir.join(format!("salmon_k{kmer}_idx"))
}

pub fn salmon_args(files: &dyn GenomeFiles, kmer: u32) -> Vec<String> {
    vec![
        "index".to_string(),
        "-t".to_string(),
        files.tx_fa_path().to_string(),
        "-i".to_string(),
        salmon_index_dir(&files.base_dir(), kmer).to_string(),
        "--type".to_string(),
        "quasi".to_string(),
        "-k".to_string(),
        kmer.to_string(),
    ]
}
