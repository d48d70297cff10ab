use std::env::{self, current_dir};
use std::io;
use std::process::exit;
use std::sync::{Arc, Mutex};

use anyhow::Error;
use console::Term;

use crate::bing::config::{RunConfig, RunContext};
use crate::bing::io::{Preferences, PreferencesSession};
use crate::bing::io::messages::Language;
use crate::bing::tui::download_progress_bar;
use crate::bing::tui::form::ConfigForm;
use crate::bing::validation::{self, DownloadRequest, cookie_preview};
use crate::bing::worker::{CancellationFlag, DownloadWorker, WorkerEvent};

/// The name of the cargo package.
const NAME: &str = env!("CARGO_PKG_NAME");

/// The version of the cargo package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The authors who created the package.
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

/// Environment variable offered as the cookie when none is saved.
const COOKIE_VAR: &str = "COOKIE";

/// Exit code used when Ctrl-C is pressed outside a download.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// A program class that handles the flow of the downloader user experience and steps of execution.
pub(crate) struct Program {
    language: Language,
    /// Flag of the download currently running, if any.
    active: Arc<Mutex<Option<CancellationFlag>>>,
}

impl Program {
    /// Creates a new instance of the program.
    pub(crate) fn new() -> Self {
        Program {
            language: Language::system(),
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Runs the downloader program.
    pub(crate) fn run(&self) -> Result<(), Error> {
        Term::stdout().set_title(self.language.window_title());
        trace!("Starting bing image downloader...");
        trace!("Program Name: {}", NAME);
        trace!("Program Version: {}", VERSION);
        trace!("Program Authors: {}", AUTHORS);
        match current_dir() {
            Ok(dir) => trace!("Program Working Directory: {}", dir.display()),
            Err(e) => warn!("Unable to get working directory: {}", e),
        }

        self.install_interrupt_handler()?;

        // Dropping the session saves it, whichever way the program leaves.
        let mut session = PreferencesSession::open();
        if session.cookie.trim().is_empty() {
            if let Ok(cookie) = env::var(COOKIE_VAR) {
                trace!("Using cookie from the {} environment variable", COOKIE_VAR);
                session.cookie = cookie;
            }
        }

        if !console::user_attended() {
            info!("No terminal attached, downloading with the saved configuration...");
            return self.run_unattended(&session);
        }

        match self.run_interactive(&mut session) {
            Err(e) if closed_by_user(&e) => {
                trace!("Form closed by the user");
                Ok(())
            }
            result => result,
        }
    }

    fn run_interactive(&self, session: &mut PreferencesSession) -> Result<(), Error> {
        let form = ConfigForm::new(self.language);
        loop {
            **session = form.edit(session)?;
            if !form.confirm(self.language.start_download(), true)? {
                return Ok(());
            }

            let request = match validation::validate(session) {
                Ok(request) => request,
                Err(e) => {
                    error!("{}", e.user_message(self.language));
                    continue;
                }
            };

            session.save_or_log();
            self.download(&request)?;

            if !form.confirm(self.language.download_again(), false)? {
                return Ok(());
            }
        }
    }

    /// Ctrl-C cancels the running download, or exits when nothing is running.
    fn install_interrupt_handler(&self) -> Result<(), Error> {
        let active = Arc::clone(&self.active);
        ctrlc::set_handler(move || {
            let running = match active.lock() {
                Ok(guard) => guard.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            };
            match running {
                Some(cancel) => cancel.cancel(),
                None => exit(INTERRUPTED_EXIT_CODE),
            }
        })?;
        Ok(())
    }

    fn run_unattended(&self, preferences: &Preferences) -> Result<(), Error> {
        match validation::validate(preferences) {
            Ok(request) => self.download(&request),
            Err(e) => {
                error!("{}", e.user_message(self.language));
                Ok(())
            }
        }
    }

    fn set_active(&self, cancel: Option<CancellationFlag>) {
        match self.active.lock() {
            Ok(mut guard) => *guard = cancel,
            Err(poisoned) => *poisoned.into_inner() = cancel,
        }
    }

    /// Runs one download on a background thread and renders its events until it ends.
    fn download(&self, request: &DownloadRequest) -> Result<(), Error> {
        let lang = self.language;
        let config = RunConfig::load_base().apply_request(request);

        if let Some(cookie) = &request.cookie {
            info!("Using cookie: {}", cookie_preview(cookie));
        }
        info!("Starting download with configuration:");
        info!("Method: {}", config.image_source.method);
        info!("Collections: {}", request.collections.join(", "));
        info!("Destination folder: {}", request.destination.display());
        info!("Filename pattern: {}", config.filename.filename_pattern);

        let limits = request.limits.map(|limits| limits.resolve());
        if let Some(limits) = &limits {
            info!("System limits:");
            info!("Max connections: {}", limits.max_connections());
            info!("Memory limit: {} MB", limits.memory_mb());
        }
        debug!("Run configuration: {:?}", config);

        let context = RunContext {
            config,
            cookie: request.cookie.clone(),
            destination: request.destination.clone(),
            limits: limits.unwrap_or_default(),
        };

        let cancel = CancellationFlag::new();
        self.set_active(Some(cancel.clone()));
        let worker = match DownloadWorker::spawn(context, cancel) {
            Ok(worker) => worker,
            Err(e) => {
                self.set_active(None);
                return Err(e);
            }
        };
        info!("{} ({})", lang.starting_download(), lang.cancel_hint());

        let progress_bar = download_progress_bar();
        for event in worker.events().iter() {
            match event {
                WorkerEvent::Log(line) => {
                    debug!("{}", line);
                    progress_bar.println(line);
                }
                WorkerEvent::Total(total) => progress_bar.set_length(total as u64),
                WorkerEvent::Progress { completed, total } => {
                    progress_bar.set_length(total as u64);
                    progress_bar.set_position(completed as u64);
                }
                WorkerEvent::Finished(summary) => {
                    progress_bar.finish_and_clear();
                    for line in summary.message(lang).lines() {
                        info!("{}", line);
                    }
                }
                WorkerEvent::Cancelled(summary) => {
                    progress_bar.abandon();
                    warn!("{}", lang.download_cancelled());
                    info!("{}", lang.successful_downloads(summary.successful, summary.total));
                }
                WorkerEvent::Failed(message) => {
                    progress_bar.abandon();
                    error!("Error: {}", message);
                }
            }
        }

        worker.join();
        self.set_active(None);
        Ok(())
    }
}

/// Whether `error` is a prompt interrupted by Ctrl-C, which closes the form like any other exit.
fn closed_by_user(error: &Error) -> bool {
    matches!(
        error.downcast_ref::<dialoguer::Error>(),
        Some(dialoguer::Error::IO(e)) if e.kind() == io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupted_prompt_closes_normally() {
        let error = Error::from(dialoguer::Error::IO(io::Error::from(io::ErrorKind::Interrupted)));
        assert!(closed_by_user(&error));
    }

    #[test]
    fn test_other_errors_are_reported() {
        let error = Error::from(dialoguer::Error::IO(io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(!closed_by_user(&error));
        assert!(!closed_by_user(&anyhow::anyhow!("Failed to start download thread")));
    }
}
