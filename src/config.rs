use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::algorithm::StarOptions;
use crate::decompress::DEFAULT_DECOMPRESS_WORKERS;
use crate::domain::Protocol;
use crate::error::SeqidxError;
use crate::fetch::DEFAULT_CONNECTIONS;

pub const CONFIG_FILE_NAME: &str = "seqidx.json";

/// On-disk configuration; every field may be omitted.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub output_root: Option<Utf8PathBuf>,
    #[serde(default)]
    pub fetch: FetchSection,
    #[serde(default)]
    pub decompress: DecompressSection,
    #[serde(default)]
    pub star: StarSection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FetchSection {
    #[serde(default)]
    pub connections: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub transport: Option<Protocol>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DecompressSection {
    #[serde(default)]
    pub workers: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct StarSection {
    #[serde(default)]
    pub threads: Option<u32>,
    #[serde(default)]
    pub sa_index_nbases: Option<u32>,
}

/// Fully resolved run settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub output_root: Utf8PathBuf,
    pub connections: usize,
    pub timeout: Duration,
    pub transport: Protocol,
    pub decompress_workers: usize,
    pub star: StarOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_root: Utf8PathBuf::from("."),
            connections: DEFAULT_CONNECTIONS,
            timeout: Duration::from_secs(5),
            transport: Protocol::Ftp,
            decompress_workers: DEFAULT_DECOMPRESS_WORKERS,
            star: StarOptions::default(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads settings from `path`, else `./seqidx.json`, else the user config
    /// directory, else built-in defaults.
    pub fn resolve(path: Option<&str>) -> Result<Settings, SeqidxError> {
        let config_path = match path {
            Some(path) => Some(PathBuf::from(path)),
            None => Self::discover(),
        };

        let Some(config_path) = config_path else {
            return Ok(Settings::default());
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| SeqidxError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| SeqidxError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        ProjectDirs::from("", "", "seqidx")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    }

    pub fn resolve_config(config: Config) -> Result<Settings, SeqidxError> {
        let defaults = Settings::default();

        let connections = config.fetch.connections.unwrap_or(defaults.connections);
        if connections == 0 {
            return Err(SeqidxError::ConfigParse(
                "fetch.connections must be at least 1".to_string(),
            ));
        }
        let decompress_workers = config
            .decompress
            .workers
            .unwrap_or(defaults.decompress_workers);
        if decompress_workers == 0 {
            return Err(SeqidxError::ConfigParse(
                "decompress.workers must be at least 1".to_string(),
            ));
        }

        Ok(Settings {
            output_root: config.output_root.unwrap_or(defaults.output_root),
            connections,
            timeout: config
                .fetch
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            transport: config.fetch.transport.unwrap_or(defaults.transport),
            decompress_workers,
            star: StarOptions {
                threads: config.star.threads.unwrap_or(defaults.star.threads),
                sa_index_nbases: config
                    .star
                    .sa_index_nbases
                    .unwrap_or(defaults.star.sa_index_nbases),
            },
        })
    }
}
