//! Background runner for a download.
//!
//! The download routine runs on its own thread and reports back over a channel, so the front end
//! stays free to draw progress and react to Ctrl-C. Cancellation is cooperative: the routine
//! checks a shared [`CancellationFlag`] between steps.

use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::Context;
use flume::{Receiver, Sender};

use crate::bing::config::RunContext;
use crate::bing::downloader::{DownloadSummary, ImageClient, ImageDownload};
use crate::bing::sender::RequestSender;

/// Shared flag asking a running download to stop.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Wraps a reader so reading fails once the flag is set.
    pub(crate) fn wrap<R: Read>(&self, inner: R) -> CancellableReader<R> {
        CancellableReader {
            inner,
            cancel: self.clone(),
        }
    }
}

/// A reader that fails every read once its flag is set.
pub(crate) struct CancellableReader<R> {
    inner: R,
    cancel: CancellationFlag,
}

impl<R: Read> Read for CancellableReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(io::Error::other("download cancelled"));
        }
        self.inner.read(buf)
    }
}

/// What the worker tells the front end.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WorkerEvent {
    /// A line for the log pane.
    Log(String),
    /// The number of images the run will go through is known.
    Total(usize),
    /// `completed` of the images have been handled.
    Progress { completed: usize, total: usize },
    /// The run finished.
    Finished(DownloadSummary),
    /// The run stopped on request.
    Cancelled(DownloadSummary),
    /// The run failed.
    Failed(String),
}

/// Sends events from inside the download routine. Sending never fails the run.
#[derive(Clone)]
pub(crate) struct EventSink(Sender<WorkerEvent>);

impl EventSink {
    pub(crate) fn new(sender: Sender<WorkerEvent>) -> Self {
        Self(sender)
    }

    pub(crate) fn send(&self, event: WorkerEvent) {
        if self.0.send(event).is_err() {
            trace!("Event receiver dropped");
        }
    }

    pub(crate) fn log(&self, line: impl Into<String>) {
        self.send(WorkerEvent::Log(line.into()));
    }
}

/// A download running on a background thread.
pub(crate) struct DownloadWorker {
    handle: Option<JoinHandle<()>>,
    events: Receiver<WorkerEvent>,
}

impl DownloadWorker {
    /// Starts the download described by `context` on a new thread.
    pub(crate) fn spawn(context: RunContext, cancel: CancellationFlag) -> anyhow::Result<Self> {
        let (tx, rx) = flume::unbounded();
        let sink = EventSink::new(tx);
        let handle = thread::Builder::new()
            .name(String::from("download-worker"))
            .spawn(move || run(context, cancel, sink))
            .context("Failed to start download thread")?;

        Ok(DownloadWorker {
            handle: Some(handle),
            events: rx,
        })
    }

    pub(crate) fn events(&self) -> &Receiver<WorkerEvent> {
        &self.events
    }

    /// Waits for the thread to end.
    pub(crate) fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Download thread panicked");
            }
        }
    }
}

fn run(context: RunContext, cancel: CancellationFlag, sink: EventSink) {
    let client = match RequestSender::new(context.cookie.clone(), context.limits) {
        Ok(client) => client,
        Err(e) => {
            sink.send(WorkerEvent::Failed(e.to_string()));
            return;
        }
    };

    let event = run_with(&context, &client, &cancel, &sink);
    sink.send(event);
}

/// Runs the download against `client` and turns its outcome into the final event.
fn run_with(context: &RunContext, client: &dyn ImageClient, cancel: &CancellationFlag, sink: &EventSink) -> WorkerEvent {
    let mut download = ImageDownload::new(context, client, cancel.clone(), sink.clone());
    match download.run() {
        Ok(summary) if cancel.is_cancelled() => WorkerEvent::Cancelled(summary),
        Ok(summary) => WorkerEvent::Finished(summary),
        Err(e) if e.is_cancelled() => WorkerEvent::Cancelled(download.summary()),
        Err(e) => {
            error!("Download failed: {}", e);
            WorkerEvent::Failed(e.to_string())
        }
    }
}
