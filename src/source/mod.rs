//! Annotation providers and the file layout each one publishes.
//!
//! A source is resolved once from a species code and a release string. Every
//! name it hands out afterwards is a pure function of that pair, so two runs
//! with the same inputs fetch the same remote paths into the same local files.

mod ensembl;
mod gencode;

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{DecompressTask, DownloadTask, Protocol, Provider, RemoteFileRef, Species};
use crate::error::SeqidxError;

pub use ensembl::EnsemblSource;
pub use gencode::GencodeSource;

pub const GZ_SUFFIX: &str = ".gz";

/// The part of a bundle an indexer needs: where the files are and what they are called.
pub trait GenomeFiles: Sync {
    fn base_dir(&self) -> Utf8PathBuf;
    fn fa_file(&self) -> String;
    fn gtf_file(&self) -> String;
    fn tx_fa_file(&self) -> String;

    fn fa_path(&self) -> Utf8PathBuf {
        self.base_dir().join(self.fa_file())
    }

    fn gtf_path(&self) -> Utf8PathBuf {
        self.base_dir().join(self.gtf_file())
    }

    fn tx_fa_path(&self) -> Utf8PathBuf {
        self.base_dir().join(self.tx_fa_file())
    }
}

/// Where a source lives locally and how it is reached remotely.
#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub output_root: Utf8PathBuf,
    pub existing_base_dir: Option<Utf8PathBuf>,
    pub transport: Protocol,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            output_root: Utf8PathBuf::from("."),
            existing_base_dir: None,
            transport: Protocol::Ftp,
        }
    }
}

impl SourceOptions {
    fn base_dir(&self, dir_name: &str) -> Utf8PathBuf {
        match &self.existing_base_dir {
            Some(dir) => dir.clone(),
            None => self.output_root.join(dir_name),
        }
    }

    fn remote(&self, host: &str, remote_dir: String, file_name: String) -> RemoteFileRef {
        RemoteFileRef::new(self.transport, host, remote_dir, file_name)
    }
}

#[derive(Debug, Clone)]
pub enum AnnotationSource {
    Gencode(GencodeSource),
    Ensembl(EnsemblSource),
}

impl AnnotationSource {
    pub fn new(
        provider: Provider,
        species: &str,
        version: &str,
        options: SourceOptions,
    ) -> Result<Self, SeqidxError> {
        match provider {
            Provider::Gencode => GencodeSource::new(species, version, options).map(Self::Gencode),
            Provider::Ensembl => EnsemblSource::new(species, version, options).map(Self::Ensembl),
        }
    }

    pub fn provider(&self) -> Provider {
        match self {
            AnnotationSource::Gencode(_) => Provider::Gencode,
            AnnotationSource::Ensembl(_) => Provider::Ensembl,
        }
    }

    pub fn species(&self) -> Species {
        match self {
            AnnotationSource::Gencode(source) => source.species(),
            AnnotationSource::Ensembl(source) => source.species(),
        }
    }

    pub fn version(&self) -> &str {
        match self {
            AnnotationSource::Gencode(source) => source.version(),
            AnnotationSource::Ensembl(source) => source.version(),
        }
    }

    pub fn genome_assembly(&self) -> &'static str {
        match self {
            AnnotationSource::Gencode(source) => source.genome_assembly(),
            AnnotationSource::Ensembl(source) => source.genome_assembly(),
        }
    }

    /// Directory name used when the bundle is fetched by this run.
    pub fn base_dir_name(&self) -> String {
        match self {
            AnnotationSource::Gencode(source) => source.base_dir_name(),
            AnnotationSource::Ensembl(source) => source.base_dir_name(),
        }
    }

    fn options(&self) -> &SourceOptions {
        match self {
            AnnotationSource::Gencode(source) => source.options(),
            AnnotationSource::Ensembl(source) => source.options(),
        }
    }

    /// True when the files are expected to be present already.
    pub fn is_prepared(&self) -> bool {
        self.options().existing_base_dir.is_some()
    }

    /// Every file the provider publishes for this bundle, auxiliary files included.
    pub fn remote_files(&self) -> Vec<RemoteFileRef> {
        match self {
            AnnotationSource::Gencode(source) => source.remote_files(),
            AnnotationSource::Ensembl(source) => source.remote_files(),
        }
    }

    pub fn download_tasks(&self) -> Vec<DownloadTask> {
        if self.is_prepared() {
            return Vec::new();
        }
        let base_dir = self.base_dir();
        self.remote_files()
            .into_iter()
            .map(|file| DownloadTask {
                destination: base_dir.join(&file.file_name),
                file,
            })
            .collect()
    }

    /// Compressed → plain path for the three files indexers read.
    pub fn decompress_tasks(&self) -> BTreeMap<Utf8PathBuf, Utf8PathBuf> {
        if self.is_prepared() {
            return BTreeMap::new();
        }
        let base_dir = self.base_dir();
        [self.fa_file(), self.gtf_file(), self.tx_fa_file()]
            .into_iter()
            .map(|name| {
                let task = gz_task(&base_dir, &name);
                (task.source, task.destination)
            })
            .collect()
    }
}

impl GenomeFiles for AnnotationSource {
    fn base_dir(&self) -> Utf8PathBuf {
        self.options().base_dir(&self.base_dir_name())
    }

    fn fa_file(&self) -> String {
        match self {
            AnnotationSource::Gencode(source) => source.fa_file(),
            AnnotationSource::Ensembl(source) => source.fa_file(),
        }
    }

    fn gtf_file(&self) -> String {
        match self {
            AnnotationSource::Gencode(source) => source.gtf_file(),
            AnnotationSource::Ensembl(source) => source.gtf_file(),
        }
    }

    fn tx_fa_file(&self) -> String {
        match self {
            AnnotationSource::Gencode(source) => source.tx_fa_file(),
            AnnotationSource::Ensembl(source) => source.tx_fa_file(),
        }
    }
}

pub(crate) fn gz_task(dir: &Utf8Path, plain_name: &str) -> DecompressTask {
    DecompressTask {
        source: dir.join(format!("{plain_name}{GZ_SUFFIX}")),
        destination: dir.join(plain_name),
    }
}

fn resolution_error(provider: Provider, species: &str, version: &str) -> SeqidxError {
    SeqidxError::Resolution {
        provider: provider.to_string(),
        species: species.to_string(),
        version: version.to_string(),
    }
}
