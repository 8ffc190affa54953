use std::fmt;
use std::str::FromStr;

use camino::Utf8PathBuf;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::SeqidxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gencode,
    Ensembl,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Gencode => write!(f, "gencode"),
            Provider::Ensembl => write!(f, "ensembl"),
        }
    }
}

/// Species short codes accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Species {
    Hs,
    Mm,
    Rn,
    Dr,
    Dm,
}

impl Species {
    pub const ALL: [Species; 5] = [
        Species::Hs,
        Species::Mm,
        Species::Rn,
        Species::Dr,
        Species::Dm,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Species::Hs => "hs",
            Species::Mm => "mm",
            Species::Rn => "rn",
            Species::Dr => "dr",
            Species::Dm => "dm",
        }
    }

    /// Binomial name as Ensembl spells it in file names.
    pub fn binomial(&self) -> &'static str {
        match self {
            Species::Hs => "Homo_sapiens",
            Species::Mm => "Mus_musculus",
            Species::Rn => "Rattus_norvegicus",
            Species::Dr => "Danio_rerio",
            Species::Dm => "Drosophila_melanogaster",
        }
    }

    pub fn common_name(&self) -> &'static str {
        match self {
            Species::Hs => "human",
            Species::Mm => "mouse",
            Species::Rn => "rat",
            Species::Dr => "zebrafish",
            Species::Dm => "fruitfly",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Species::ALL
            .into_iter()
            .find(|species| species.code() == code.trim())
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Species {
    type Err = SeqidxError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Species::from_code(value).ok_or_else(|| SeqidxError::UnsupportedSpecies(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SeqType {
    Rna,
    Chip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Ftp,
    Http,
}

impl Protocol {
    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Ftp => 21,
            Protocol::Http => 80,
        }
    }

    fn scheme(&self) -> &'static str {
        match self {
            Protocol::Ftp => "ftp",
            Protocol::Http => "http",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.scheme())
    }
}

/// One file on a remote server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RemoteFileRef {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub remote_dir: String,
    pub file_name: String,
}

impl RemoteFileRef {
    pub fn new(
        protocol: Protocol,
        host: impl Into<String>,
        remote_dir: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            protocol,
            host: host.into(),
            port: protocol.default_port(),
            remote_dir: remote_dir.into(),
            file_name: file_name.into(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Path of the file relative to the server root, without a leading slash.
    pub fn remote_path(&self) -> String {
        let dir = self.remote_dir.trim_matches('/');
        if dir.is_empty() {
            self.file_name.clone()
        } else {
            format!("{dir}/{}", self.file_name)
        }
    }

    pub fn url(&self) -> String {
        format!(
            "{}://{}:{}/{}",
            self.protocol,
            self.host,
            self.port,
            self.remote_path()
        )
    }
}

impl fmt::Display for RemoteFileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub file: RemoteFileRef,
    pub destination: Utf8PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompressTask {
    pub source: Utf8PathBuf,
    pub destination: Utf8PathBuf,
}
