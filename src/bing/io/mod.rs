use std::fmt;
use std::fs::{read_to_string, write};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{from_str, to_string_pretty};

use crate::bing::limits::SystemLimits;

pub(crate) mod messages;

/// Name of the preferences file, stored in the user's home directory.
pub(crate) const PREFERENCES_NAME: &str = ".bing_image_downloader_config.json";

/// Filename pattern used when the user has not picked one.
pub(crate) const DEFAULT_PATTERN: &str = "$date$sep$index$sep$prompt";

/// Full path of the preferences file. Falls back to the working directory when no home is known.
pub(crate) static PREFERENCES_PATH: Lazy<PathBuf> = Lazy::new(|| {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(PREFERENCES_NAME)
});

/// Where image URLs come from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum SourceMethod {
    /// Collections are listed through the authenticated API.
    #[default]
    #[serde(rename = "API")]
    Api,
    /// Image URLs are read from a local file.
    #[serde(rename = "File")]
    File,
}

impl SourceMethod {
    pub(crate) fn variants() -> &'static [SourceMethod] {
        &[SourceMethod::Api, SourceMethod::File]
    }

    /// Lowercase name used by the run configuration.
    pub(crate) fn method_name(&self) -> &'static str {
        match self {
            SourceMethod::Api => "api",
            SourceMethod::File => "file",
        }
    }
}

impl fmt::Display for SourceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceMethod::Api => write!(f, "API"),
            SourceMethod::File => write!(f, "File"),
        }
    }
}

/// Everything the user entered in the form, restored on the next start.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub(crate) struct Preferences {
    #[serde(default)]
    pub(crate) source: SourceMethod,
    #[serde(default)]
    pub(crate) cookie: String,
    /// Comma-separated collection names, exactly as typed.
    #[serde(default)]
    pub(crate) collections: String,
    #[serde(default)]
    pub(crate) destination_folder: String,
    #[serde(default = "default_pattern")]
    pub(crate) pattern: String,
    #[serde(default = "default_use_local_time")]
    pub(crate) use_local_time: bool,
    #[serde(default)]
    pub(crate) delete_collection: bool,
    #[serde(default)]
    pub(crate) detailed_stats: bool,
    /// Max open connections. Absent from the file means no limit was picked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) connection_limit: Option<u32>,
    /// Memory cap in MB. Absent from the file means no limit was picked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) memory_limit: Option<u32>,
}

fn default_pattern() -> String { String::from(DEFAULT_PATTERN) }
fn default_use_local_time() -> bool { true }
fn default_connection_limit() -> Option<u32> {
    SystemLimits::platform_supported().then_some(SystemLimits::DEFAULT_CONNECTIONS)
}
fn default_memory_limit() -> Option<u32> {
    SystemLimits::platform_supported().then_some(SystemLimits::DEFAULT_MEMORY_MB)
}

impl Preferences {
    /// Loads the preferences at `path`.
    ///
    /// A missing file yields the defaults. A file that can't be read or parsed is logged and the
    /// defaults are used instead.
    pub(crate) fn load_from(path: &Path) -> Self {
        if !path.exists() {
            trace!("{}: does not exist, using defaults...", path.display());
            return Self::default();
        }

        match Self::read(path) {
            Ok(preferences) => {
                trace!("Preferences loaded from {}", path.display());
                preferences
            }
            Err(e) => {
                error!("Error loading configuration: {:#}", e);
                Self::default()
            }
        }
    }

    fn read(path: &Path) -> Result<Self, Error> {
        let contents = read_to_string(path)
            .with_context(|| format!("Failed to read preferences file: {}", path.display()))?;
        let preferences = from_str(&contents)
            .with_context(|| format!("Failed to parse preferences file: {}", path.display()))?;
        Ok(preferences)
    }

    /// Writes the preferences to `path` as pretty JSON.
    pub(crate) fn save_to(&self, path: &Path) -> Result<(), Error> {
        let json = to_string_pretty(self)?;
        write(path, json)
            .with_context(|| format!("Failed to write preferences file: {}", path.display()))?;
        trace!("Preferences saved to {}", path.display());
        Ok(())
    }

    /// The system limits the user picked, if the platform has any.
    pub(crate) fn system_limits(&self) -> Option<SystemLimits> {
        match (self.connection_limit, self.memory_limit) {
            (None, None) => None,
            (connections, memory) => Some(SystemLimits::new(
                connections.unwrap_or(SystemLimits::DEFAULT_CONNECTIONS),
                memory.unwrap_or(SystemLimits::DEFAULT_MEMORY_MB),
            )),
        }
    }
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            source: SourceMethod::Api,
            cookie: String::new(),
            collections: String::new(),
            destination_folder: String::new(),
            pattern: default_pattern(),
            use_local_time: default_use_local_time(),
            delete_collection: false,
            detailed_stats: false,
            connection_limit: default_connection_limit(),
            memory_limit: default_memory_limit(),
        }
    }
}

/// The preferences of a running program, written back to disk when dropped.
pub(crate) struct PreferencesSession {
    preferences: Preferences,
    path: PathBuf,
}

impl PreferencesSession {
    /// Opens the preferences in the user's home.
    pub(crate) fn open() -> Self {
        Self::open_at(PREFERENCES_PATH.clone())
    }

    pub(crate) fn open_at(path: PathBuf) -> Self {
        PreferencesSession {
            preferences: Preferences::load_from(&path),
            path,
        }
    }

    /// Saves now and only logs on failure.
    pub(crate) fn save_or_log(&self) {
        if let Err(e) = self.preferences.save_to(&self.path) {
            error!("Error saving configuration: {:#}", e);
        }
    }
}

impl Deref for PreferencesSession {
    type Target = Preferences;

    fn deref(&self) -> &Preferences {
        &self.preferences
    }
}

impl DerefMut for PreferencesSession {
    fn deref_mut(&mut self) -> &mut Preferences {
        &mut self.preferences
    }
}

impl Drop for PreferencesSession {
    fn drop(&mut self) {
        self.save_or_log();
    }
}
