use std::fs::create_dir_all;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::bing::io::messages::Language;
use crate::bing::io::{Preferences, SourceMethod};
use crate::bing::limits::SystemLimits;

/// Token every API cookie has to start with.
pub(crate) const COOKIE_PREFIX: &str = "_U=";

/// Reasons a download can't start.
#[derive(Error, Debug)]
pub(crate) enum ValidationError {
    #[error("no cookie given for the API method")]
    NoCookie,

    #[error("no collection names given")]
    NoCollections,

    #[error("no destination folder given")]
    NoFolder,

    #[error("could not create destination folder: {0}")]
    CreateFolder(#[source] io::Error),
}

impl ValidationError {
    /// The message shown to the user, in their language.
    pub(crate) fn user_message(&self, language: Language) -> String {
        match self {
            ValidationError::NoCookie => language.error_no_cookie().to_string(),
            ValidationError::NoCollections => language.error_no_collections().to_string(),
            ValidationError::NoFolder => language.error_no_folder().to_string(),
            ValidationError::CreateFolder(e) => language.error_create_folder(&e.to_string()),
        }
    }
}

/// Form input that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DownloadRequest {
    pub(crate) source: SourceMethod,
    /// Normalized cookie, only set for the API method.
    pub(crate) cookie: Option<String>,
    pub(crate) collections: Vec<String>,
    pub(crate) destination: PathBuf,
    pub(crate) pattern: String,
    pub(crate) use_local_time: bool,
    pub(crate) delete_collection: bool,
    pub(crate) detailed_stats: bool,
    pub(crate) limits: Option<SystemLimits>,
}

/// Checks the form before a download starts, creating the destination folder if needed.
pub(crate) fn validate(preferences: &Preferences) -> Result<DownloadRequest, ValidationError> {
    if preferences.source == SourceMethod::Api && preferences.cookie.trim().is_empty() {
        return Err(ValidationError::NoCookie);
    }

    let collections = split_collections(&preferences.collections);
    if collections.is_empty() {
        return Err(ValidationError::NoCollections);
    }

    let destination = preferences.destination_folder.trim();
    if destination.is_empty() {
        return Err(ValidationError::NoFolder);
    }

    let destination = PathBuf::from(destination);
    if !destination.exists() {
        info!("Creating destination folder {}", destination.display());
        create_dir_all(&destination).map_err(ValidationError::CreateFolder)?;
    }

    let cookie = match preferences.source {
        SourceMethod::Api => Some(normalize_cookie(&preferences.cookie)),
        SourceMethod::File => None,
    };

    Ok(DownloadRequest {
        source: preferences.source,
        cookie,
        collections,
        destination,
        pattern: preferences.pattern.clone(),
        use_local_time: preferences.use_local_time,
        delete_collection: preferences.delete_collection,
        detailed_stats: preferences.detailed_stats,
        limits: preferences.system_limits(),
    })
}

/// Splits the comma-separated collection field, dropping blank names.
pub(crate) fn split_collections(collections: &str) -> Vec<String> {
    collections
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

/// Makes sure the cookie starts with `_U=`.
pub(crate) fn normalize_cookie(cookie: &str) -> String {
    let cookie = cookie.trim();
    if cookie.starts_with(COOKIE_PREFIX) {
        cookie.to_string()
    } else {
        format!("{}{}", COOKIE_PREFIX, cookie)
    }
}

/// A shortened cookie that is safe to print.
pub(crate) fn cookie_preview(cookie: &str) -> String {
    let shown: String = cookie.chars().take(COOKIE_PREFIX.len() + 4).collect();
    format!("{}{}", shown, "*".repeat(8))
}
