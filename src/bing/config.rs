//! Run configuration handed to the download routine.
//!
//! Base values may come from an optional `config.toml` in the working directory; whatever the user
//! entered in the form is laid over them before a run starts.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bing::io::{DEFAULT_PATTERN, SourceMethod};
use crate::bing::limits::SystemLimits;
use crate::bing::validation::DownloadRequest;

/// Name of the optional base configuration file.
pub(crate) const BASE_CONFIG_NAME: &str = "config.toml";

/// Name of the log file written by the downloader.
pub(crate) const LOG_FILE_NAME: &str = "bing_image_creator.log";

#[derive(Error, Debug)]
pub(crate) enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub(crate) type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub(crate) struct FilenameSection {
    pub(crate) filename_pattern: String,
    pub(crate) use_local_time_zone: bool,
}

impl Default for FilenameSection {
    fn default() -> Self {
        Self {
            filename_pattern: String::from(DEFAULT_PATTERN),
            use_local_time_zone: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub(crate) struct DeleteAfterDownload {
    pub(crate) toggle: bool,
    pub(crate) mode: String,
}

impl Default for DeleteAfterDownload {
    fn default() -> Self {
        Self {
            toggle: false,
            mode: String::from("safest"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub(crate) struct CollectionSection {
    pub(crate) collections_to_include: Vec<String>,
    pub(crate) delete_collection_after_download: DeleteAfterDownload,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub(crate) struct ImageSourceSection {
    pub(crate) method: String,
}

impl Default for ImageSourceSection {
    fn default() -> Self {
        Self { method: String::from("api") }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub(crate) struct DebugSection {
    pub(crate) debug: bool,
    pub(crate) use_log_file: bool,
    pub(crate) debug_filename: String,
    pub(crate) detailed_statistics: bool,
}

impl Default for DebugSection {
    fn default() -> Self {
        Self {
            debug: false,
            use_log_file: false,
            debug_filename: String::from(LOG_FILE_NAME),
            detailed_statistics: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub(crate) struct DetailApiSection {
    pub(crate) max_attempts: u32,
}

impl Default for DetailApiSection {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

/// The settings map the download routine reads.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub(crate) struct RunConfig {
    pub(crate) filename: FilenameSection,
    pub(crate) collection: CollectionSection,
    pub(crate) image_source: ImageSourceSection,
    pub(crate) debug: DebugSection,
    pub(crate) detail_api: DetailApiSection,
}

impl RunConfig {
    /// Loads `config.toml` from the working directory, or the defaults when there is none.
    pub(crate) fn load_base() -> Self {
        let path = Path::new(BASE_CONFIG_NAME);
        if !path.exists() {
            return Self::default();
        }

        match Self::from_file(path) {
            Ok(config) => {
                info!("Loaded base configuration from {}", BASE_CONFIG_NAME);
                config
            }
            Err(e) => {
                warn!("Ignoring {}: {}", BASE_CONFIG_NAME, e);
                Self::default()
            }
        }
    }

    pub(crate) fn from_file(path: &Path) -> ConfigResult<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Lays the values of a validated request over this configuration.
    pub(crate) fn apply_request(mut self, request: &DownloadRequest) -> Self {
        self.filename.filename_pattern = request.pattern.clone();
        self.filename.use_local_time_zone = request.use_local_time;
        self.collection.collections_to_include = request.collections.clone();
        self.collection.delete_collection_after_download.toggle = request.delete_collection;
        self.collection.delete_collection_after_download.mode = String::from("safest");
        self.image_source.method = String::from(request.source.method_name());
        self.debug.debug = true;
        self.debug.use_log_file = true;
        self.debug.debug_filename = String::from(LOG_FILE_NAME);
        self.debug.detailed_statistics = request.detailed_stats;
        self
    }

    pub(crate) fn source_method(&self) -> SourceMethod {
        match self.image_source.method.to_lowercase().as_str() {
            "file" => SourceMethod::File,
            _ => SourceMethod::Api,
        }
    }

    /// Whether collections should be removed from the account once downloaded.
    pub(crate) fn delete_after_download(&self) -> bool {
        self.collection.delete_collection_after_download.toggle
    }
}

/// Everything a download run needs besides the settings map.
#[derive(Debug, Clone)]
pub(crate) struct RunContext {
    pub(crate) config: RunConfig,
    /// Normalized session cookie, present for the API method.
    pub(crate) cookie: Option<String>,
    pub(crate) destination: PathBuf,
    pub(crate) limits: SystemLimits,
}
