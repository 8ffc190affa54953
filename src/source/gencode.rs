use crate::domain::{Provider, RemoteFileRef, Species};
use crate::error::SeqidxError;

use super::{GZ_SUFFIX, SourceOptions, resolution_error};

const HOST: &str = "ftp.ebi.ac.uk";

#[derive(Debug, Clone)]
pub struct GencodeSource {
    species: Species,
    version: String,
    assembly: &'static str,
    options: SourceOptions,
}

impl GencodeSource {
    pub fn new(species: &str, version: &str, options: SourceOptions) -> Result<Self, SeqidxError> {
        let (species, assembly) = Species::from_code(species)
            .and_then(|sp| genome_assembly(sp, version).map(|assembly| (sp, assembly)))
            .ok_or_else(|| resolution_error(Provider::Gencode, species, version))?;
        Ok(Self {
            species,
            version: version.to_string(),
            assembly,
            options,
        })
    }

    pub fn species(&self) -> Species {
        self.species
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn genome_assembly(&self) -> &'static str {
        self.assembly
    }

    pub(super) fn options(&self) -> &SourceOptions {
        &self.options
    }

    pub fn base_dir_name(&self) -> String {
        format!("gencode_{}_{}", self.species, self.version)
    }

    pub fn file_prefix(&self) -> String {
        format!("gencode.v{}", self.version)
    }

    pub fn fa_file(&self) -> String {
        format!("{}.primary_assembly.genome.fa", self.assembly)
    }

    pub fn gtf_file(&self) -> String {
        format!("{}.primary_assembly.annotation.gtf", self.file_prefix())
    }

    pub fn tx_fa_file(&self) -> String {
        format!("{}.transcripts.fa", self.file_prefix())
    }

    /// Annotation tracks fetched with the bundle but not needed by any indexer.
    pub fn auxiliary_files(&self) -> Vec<String> {
        let prefix = self.file_prefix();
        ["polyAs", "2wayconspseudos", "tRNAs"]
            .iter()
            .map(|track| format!("{prefix}.{track}.gtf{GZ_SUFFIX}"))
            .collect()
    }

    pub fn remote_dir(&self) -> String {
        format!(
            "pub/databases/gencode/Gencode_{}/release_{}",
            self.species.common_name(),
            self.version.to_uppercase()
        )
    }

    pub fn remote_files(&self) -> Vec<RemoteFileRef> {
        let mut names = vec![format!("{}{GZ_SUFFIX}", self.gtf_file())];
        names.extend(self.auxiliary_files());
        names.push(format!("{}{GZ_SUFFIX}", self.tx_fa_file()));
        names.push(format!("{}{GZ_SUFFIX}", self.fa_file()));

        names
            .into_iter()
            .map(|name| self.options.remote(HOST, self.remote_dir(), name))
            .collect()
    }
}

fn genome_assembly(species: Species, version: &str) -> Option<&'static str> {
    match (species, version) {
        (Species::Hs, "30") => Some("GRCh38"),
        (Species::Mm, "M22") => Some("GRCm38"),
        _ => None,
    }
}
