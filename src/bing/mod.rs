pub(crate) mod config;
pub(crate) mod downloader;
pub(crate) mod filename;
pub(crate) mod io;
pub(crate) mod limits;
pub(crate) mod sender;
pub(crate) mod source;
pub(crate) mod stats;
pub(crate) mod tui;
pub(crate) mod validation;
pub(crate) mod worker;
