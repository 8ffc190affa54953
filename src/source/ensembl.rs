use crate::domain::{Provider, RemoteFileRef, Species};
use crate::error::SeqidxError;

use super::{GZ_SUFFIX, SourceOptions, resolution_error};

const HOST: &str = "ftp.ensembl.org";

#[derive(Debug, Clone)]
pub struct EnsemblSource {
    species: Species,
    version: String,
    assembly: &'static str,
    options: SourceOptions,
}

impl EnsemblSource {
    pub fn new(species: &str, version: &str, options: SourceOptions) -> Result<Self, SeqidxError> {
        let (species, assembly) = Species::from_code(species)
            .and_then(|sp| genome_assembly(sp, version).map(|assembly| (sp, assembly)))
            .ok_or_else(|| resolution_error(Provider::Ensembl, species, version))?;
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
        format!("ensembl_{}_{}", self.species, self.version)
    }

    // Rat and fruit fly have no primary assembly build.
    fn fa_type(&self) -> &'static str {
        match self.species {
            Species::Rn | Species::Dm => "toplevel",
            _ => "primary_assembly",
        }
    }

    pub fn fa_file(&self) -> String {
        format!(
            "{}.{}.dna.{}.fa",
            self.species.binomial(),
            self.assembly,
            self.fa_type()
        )
    }

    pub fn gtf_file(&self) -> String {
        format!(
            "{}.{}.{}.gtf",
            self.species.binomial(),
            self.assembly,
            self.version
        )
    }

    pub fn tx_fa_file(&self) -> String {
        format!("{}.{}.cdna.all.fa", self.species.binomial(), self.assembly)
    }

    pub fn release_dir(&self) -> String {
        format!("pub/release-{}", self.version)
    }

    pub fn remote_files(&self) -> Vec<RemoteFileRef> {
        let release = self.release_dir();
        let species_dir = self.species.binomial().to_lowercase();
        vec![
            self.options.remote(
                HOST,
                format!("{release}/fasta/{species_dir}/dna"),
                format!("{}{GZ_SUFFIX}", self.fa_file()),
            ),
            self.options.remote(
                HOST,
                format!("{release}/fasta/{species_dir}/cdna"),
                format!("{}{GZ_SUFFIX}", self.tx_fa_file()),
            ),
            self.options.remote(
                HOST,
                format!("{release}/gtf/{species_dir}"),
                format!("{}{GZ_SUFFIX}", self.gtf_file()),
            ),
        ]
    }
}

fn genome_assembly(species: Species, version: &str) -> Option<&'static str> {
    if !matches!(version, "96" | "97") {
        return None;
    }
    let assembly = match species {
        Species::Hs => "GRCh38",
        Species::Mm => "GRCm38",
        Species::Rn => "Rnor_6.0",
        Species::Dr => "GRCz11",
        Species::Dm => "BDGP6.22",
    };
    Some(assembly)
}
