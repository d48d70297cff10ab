//! The download routine: lists collections, writes their images to disk and counts the results.

use std::collections::HashSet;
use std::fs::{self, File, create_dir_all, read_dir};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;

use crate::bing::config::{RunConfig, RunContext};
use crate::bing::filename::{FilenamePattern, NameContext, extension_for, sanitize};
use crate::bing::io::SourceMethod;
use crate::bing::io::messages::Language;
use crate::bing::source::{self, Collection, CollectionItem};
use crate::bing::stats::{CollectionStats, Statistics};
use crate::bing::worker::{CancellationFlag, EventSink, WorkerEvent};

/// Suffix of files that are still being written.
const PART_EXTENSION: &str = "part";

#[derive(Error, Debug)]
pub(crate) enum DownloadError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Image source error: {0}")]
    Source(String),

    #[error("No cookie available for the API method")]
    MissingCookie,

    #[error("Image {url} is larger than the {limit_mb} MB memory limit")]
    TooLarge { url: String, limit_mb: u32 },

    #[error("Download cancelled")]
    Cancelled,
}

impl DownloadError {
    pub(crate) fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled)
    }
}

pub(crate) type DownloadResult<T> = Result<T, DownloadError>;

/// What a finished image request produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ImageBody {
    pub(crate) bytes: u64,
    pub(crate) content_type: Option<String>,
}

/// The remote side the download routine talks to.
pub(crate) trait ImageClient {
    /// Lists every collection of the session.
    fn collections(&self) -> DownloadResult<Vec<Collection>>;

    /// Streams the image at `url` into `sink`, stopping when `cancel` is set.
    fn download(&self, url: &str, sink: &mut dyn Write, cancel: &CancellationFlag) -> DownloadResult<ImageBody>;

    /// Removes `items` from `collection` on the account.
    fn delete_items(&self, collection: &Collection, items: &[&CollectionItem]) -> DownloadResult<()>;
}

/// The outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct DownloadSummary {
    pub(crate) successful: usize,
    pub(crate) total: usize,
    pub(crate) elapsed: Duration,
}

impl DownloadSummary {
    /// The summary shown once a run completes.
    pub(crate) fn message(&self, language: Language) -> String {
        format!(
            "{}\n{}\n{}",
            language.download_completed(),
            language.successful_downloads(self.successful, self.total),
            language.time_elapsed(self.elapsed.as_secs_f64())
        )
    }
}

/// Downloads the selected collections of one run.
pub(crate) struct ImageDownload<'a> {
    config: &'a RunConfig,
    destination: &'a Path,
    client: &'a dyn ImageClient,
    cancel: CancellationFlag,
    events: EventSink,
    pattern: FilenamePattern,
    started: Instant,
    collection_stats: Vec<CollectionStats>,
    completed: usize,
    successful_image_count: usize,
    total_image_count: usize,
}

impl<'a> ImageDownload<'a> {
    pub(crate) fn new(
        context: &'a RunContext,
        client: &'a dyn ImageClient,
        cancel: CancellationFlag,
        events: EventSink,
    ) -> Self {
        let filename = &context.config.filename;
        ImageDownload {
            config: &context.config,
            destination: &context.destination,
            client,
            cancel,
            events,
            pattern: FilenamePattern::new(&filename.filename_pattern, filename.use_local_time_zone),
            started: Instant::now(),
            collection_stats: Vec::new(),
            completed: 0,
            successful_image_count: 0,
            total_image_count: 0,
        }
    }

    pub(crate) fn successful_image_count(&self) -> usize {
        self.successful_image_count
    }

    pub(crate) fn total_image_count(&self) -> usize {
        self.total_image_count
    }

    /// Counts so far, usable after a cancelled or failed run.
    pub(crate) fn summary(&self) -> DownloadSummary {
        DownloadSummary {
            successful: self.successful_image_count(),
            total: self.total_image_count(),
            elapsed: self.started.elapsed(),
        }
    }

    /// Runs the download to completion.
    pub(crate) fn run(&mut self) -> DownloadResult<DownloadSummary> {
        self.started = Instant::now();

        let available = self.list_collections()?;
        let selected = source::select_collections(available, &self.config.collection.collections_to_include);

        self.total_image_count = selected.iter().map(|c| c.items.len()).sum();
        info!(
            "Downloading {} images from {} collections",
            self.total_image_count,
            selected.len()
        );
        self.events.send(WorkerEvent::Total(self.total_image_count));

        for collection in &selected {
            self.check_cancelled()?;
            self.download_collection(collection)?;
        }

        if self.config.debug.detailed_statistics {
            self.report_statistics();
        }

        Ok(self.summary())
    }

    fn check_cancelled(&self) -> DownloadResult<()> {
        if self.cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        Ok(())
    }

    fn list_collections(&self) -> DownloadResult<Vec<Collection>> {
        match self.config.source_method() {
            SourceMethod::File => {
                self.events.log("Reading image list from the destination folder...");
                source::read_collection_file(self.destination).map_err(|e| DownloadError::Source(e.to_string()))
            }
            SourceMethod::Api => {
                self.events.log("Fetching collections...");
                let attempts = self.config.detail_api.max_attempts.max(1);
                let mut attempt = 1;
                loop {
                    self.check_cancelled()?;
                    match self.client.collections() {
                        Ok(collections) => return Ok(collections),
                        Err(e) if attempt < attempts => {
                            warn!("Fetching collections failed (attempt {}/{}): {}", attempt, attempts, e);
                            attempt += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }

    fn download_collection(&mut self, collection: &Collection) -> DownloadResult<()> {
        let folder_name = match sanitize(&collection.name) {
            name if name.is_empty() => String::from("collection"),
            name => name,
        };
        let directory = self.destination.join(folder_name);
        create_dir_all(&directory)?;

        self.events.log(format!(
            "Collection \"{}\": {} images",
            collection.name,
            collection.items.len()
        ));

        let existing = existing_stems(&directory)?;
        let mut claimed = HashSet::new();
        let mut stats = CollectionStats::new(&collection.name, collection.items.len());
        let run_date = Utc::now();

        for (position, item) in collection.items.iter().enumerate() {
            self.check_cancelled()?;

            let stem = self.pattern.render(&NameContext {
                item,
                collection: &collection.name,
                index: position + 1,
                count: collection.items.len(),
                fallback_date: run_date,
            });
            let stem = claim_stem(stem, &mut claimed);

            if existing.contains(&stem) {
                trace!("{} already exists, skipping", stem);
                stats.successful += 1;
                stats.skipped += 1;
                self.successful_image_count += 1;
            } else {
                match self.download_item(&directory, &stem, item) {
                    Ok(bytes) => {
                        stats.successful += 1;
                        stats.bytes += bytes;
                        self.successful_image_count += 1;
                    }
                    Err(DownloadError::Cancelled) => {
                        self.collection_stats.push(stats);
                        return Err(DownloadError::Cancelled);
                    }
                    Err(e) => {
                        warn!("Failed to download {}: {}", item.url, e);
                        self.events.log(format!("Failed to download \"{}\": {}", stem, e));
                        stats.failed += 1;
                    }
                }
            }

            self.completed += 1;
            self.events.send(WorkerEvent::Progress {
                completed: self.completed,
                total: self.total_image_count,
            });
        }

        if self.config.delete_after_download() {
            self.delete_collection(collection, &mut stats);
        }

        self.collection_stats.push(stats);
        Ok(())
    }

    /// Writes one image to `directory`, returning the number of bytes written.
    fn download_item(&self, directory: &Path, stem: &str, item: &CollectionItem) -> DownloadResult<u64> {
        let part_path = directory.join(format!("{}.{}", stem, PART_EXTENSION));
        let result = self.write_part(&part_path, item);

        match result {
            Ok(body) => {
                let extension = extension_for(body.content_type.as_deref(), &item.url);
                let final_path = directory.join(format!("{}.{}", stem, extension));
                fs::rename(&part_path, &final_path)?;
                debug!("Saved {}", final_path.display());
                Ok(body.bytes)
            }
            Err(e) => {
                if part_path.exists() {
                    if let Err(remove_error) = fs::remove_file(&part_path) {
                        warn!("Unable to remove {}: {}", part_path.display(), remove_error);
                    }
                }
                Err(e)
            }
        }
    }

    fn write_part(&self, part_path: &Path, item: &CollectionItem) -> DownloadResult<ImageBody> {
        let mut writer = BufWriter::new(File::create(part_path)?);
        let body = self.client.download(&item.url, &mut writer, &self.cancel)?;
        writer.flush()?;
        Ok(body)
    }

    /// Removes a fully downloaded collection from the account.
    fn delete_collection(&self, collection: &Collection, stats: &mut CollectionStats) {
        if self.config.source_method() == SourceMethod::File {
            self.events.log(format!(
                "Not deleting \"{}\": collections read from a file can't be deleted",
                collection.name
            ));
            return;
        }

        if !stats.is_complete() {
            self.events.log(format!(
                "Not deleting \"{}\": {} images failed to download",
                collection.name, stats.failed
            ));
            return;
        }

        let items: Vec<&CollectionItem> = collection.items.iter().collect();
        match self.client.delete_items(collection, &items) {
            Ok(()) => {
                stats.deleted_from_account = true;
                self.events.log(format!("Deleted collection \"{}\" from the account", collection.name));
            }
            Err(e) => {
                warn!("Failed to delete collection {}: {}", collection.name, e);
                self.events.log(format!("Could not delete \"{}\": {}", collection.name, e));
            }
        }
    }

    fn report_statistics(&self) {
        let statistics = Statistics::new(self.collection_stats.clone(), self.started.elapsed().as_secs_f64());
        for line in statistics.lines() {
            self.events.log(line);
        }
        if let Err(e) = statistics.write_to(self.destination) {
            warn!("Unable to write statistics: {}", e);
        }
    }
}

/// File stems already present in `directory`, ignoring unfinished downloads.
fn existing_stems(directory: &Path) -> io::Result<HashSet<String>> {
    let mut stems = HashSet::new();
    for entry in read_dir(directory)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().is_some_and(|ext| ext == PART_EXTENSION) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            stems.insert(stem.to_string());
        }
    }
    Ok(stems)
}

/// Makes `stem` unique within this run by appending ` (n)`.
fn claim_stem(stem: String, claimed: &mut HashSet<String>) -> String {
    if claimed.insert(stem.clone()) {
        return stem;
    }

    let mut counter = 2;
    loop {
        let candidate = format!("{} ({})", stem, counter);
        if claimed.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::TimeZone;
    use flume::Receiver;
    use tempfile::tempdir;

    use crate::bing::limits::SystemLimits;
    use crate::bing::source::CLIPBOARD_FILE_NAME;
    use crate::bing::stats::STATISTICS_FILE_NAME;

    #[derive(Default)]
    struct FakeClient {
        collections: Vec<Collection>,
        /// Remaining listing failures before it succeeds.
        listing_failures: Mutex<u32>,
        images: HashMap<String, Vec<u8>>,
        /// Cancel when this URL is requested.
        cancel_on: Option<String>,
        downloads: Mutex<Vec<String>>,
        deleted: Mutex<Vec<String>>,
    }

    impl ImageClient for FakeClient {
        fn collections(&self) -> DownloadResult<Vec<Collection>> {
            let mut failures = self.listing_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(DownloadError::Api(String::from("unavailable")));
            }
            Ok(self.collections.clone())
        }

        fn download(&self, url: &str, sink: &mut dyn Write, cancel: &CancellationFlag) -> DownloadResult<ImageBody> {
            self.downloads.lock().unwrap().push(url.to_string());
            if self.cancel_on.as_deref() == Some(url) {
                sink.write_all(b"partial")?;
                cancel.cancel();
                return Err(DownloadError::Cancelled);
            }
            let bytes = self
                .images
                .get(url)
                .ok_or_else(|| DownloadError::Api(String::from("404 Not Found")))?;
            sink.write_all(bytes)?;
            Ok(ImageBody {
                bytes: bytes.len() as u64,
                content_type: Some(String::from("image/png")),
            })
        }

        fn delete_items(&self, collection: &Collection, items: &[&CollectionItem]) -> DownloadResult<()> {
            assert_eq!(items.len(), collection.items.len());
            self.deleted.lock().unwrap().push(collection.name.clone());
            Ok(())
        }
    }

    fn item(id: &str, prompt: &str) -> CollectionItem {
        CollectionItem {
            id: id.to_string(),
            url: format!("https://th.bing.com/{}.jpg", id),
            prompt: prompt.to_string(),
            created: Some(Utc.with_ymd_and_hms(2024, 5, 4, 12, 0, 0).unwrap()),
        }
    }

    fn collection(name: &str, items: Vec<CollectionItem>) -> Collection {
        Collection {
            id: Some(format!("id-{}", name)),
            name: name.to_string(),
            items,
        }
    }

    fn client(collections: Vec<Collection>) -> FakeClient {
        let images = collections
            .iter()
            .flat_map(|c| c.items.iter())
            .map(|i| (i.url.clone(), i.id.as_bytes().to_vec()))
            .collect();
        FakeClient {
            collections,
            images,
            ..FakeClient::default()
        }
    }

    fn context(destination: &Path, collections: &[&str]) -> RunContext {
        let mut config = RunConfig::default();
        config.filename.filename_pattern = String::from("$index$sep$prompt");
        config.filename.use_local_time_zone = false;
        config.collection.collections_to_include = collections.iter().map(|c| c.to_string()).collect();
        RunContext {
            config,
            cookie: Some(String::from("_U=abc")),
            destination: destination.to_path_buf(),
            limits: SystemLimits::default(),
        }
    }

    fn run(context: &RunContext, client: &FakeClient) -> (DownloadResult<DownloadSummary>, DownloadSummary, Receiver<WorkerEvent>) {
        let (tx, rx) = flume::unbounded();
        let mut download = ImageDownload::new(context, client, CancellationFlag::new(), EventSink::new(tx));
        let result = download.run();
        (result, download.summary(), rx)
    }

    #[test]
    fn test_downloads_requested_collections() {
        let dir = tempdir().unwrap();
        let client = client(vec![
            collection("Cats", vec![item("c1", "a cat"), item("c2", "another cat")]),
            collection("Dogs", vec![item("d1", "a dog")]),
        ]);
        let context = context(dir.path(), &["cats"]);

        let (result, _, rx) = run(&context, &client);
        let summary = result.unwrap();
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.total, 2);

        let cats = dir.path().join("Cats");
        assert_eq!(fs::read(cats.join("1 - a cat.png")).unwrap(), b"c1");
        assert_eq!(fs::read(cats.join("2 - another cat.png")).unwrap(), b"c2");
        assert!(!dir.path().join("Dogs").exists());

        let events: Vec<WorkerEvent> = rx.drain().collect();
        assert!(events.contains(&WorkerEvent::Total(2)));
        assert!(events.contains(&WorkerEvent::Progress { completed: 2, total: 2 }));
    }

    #[test]
    fn test_failed_image_is_counted_and_blocks_delete() {
        let dir = tempdir().unwrap();
        let mut client = client(vec![
            collection("Cats", vec![item("c1", "a cat"), item("c2", "missing")]),
            collection("Dogs", vec![item("d1", "a dog")]),
        ]);
        client.images.remove("https://th.bing.com/c2.jpg");
        let mut context = context(dir.path(), &["Cats", "Dogs"]);
        context.config.collection.delete_collection_after_download.toggle = true;

        let (result, _, _) = run(&context, &client);
        let summary = result.unwrap();
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.total, 3);
        assert!(!dir.path().join("Cats").join("2 - missing.part").exists());
        assert_eq!(*client.deleted.lock().unwrap(), vec![String::from("Dogs")]);
    }

    #[test]
    fn test_existing_files_are_skipped() {
        let dir = tempdir().unwrap();
        let cats = dir.path().join("Cats");
        create_dir_all(&cats).unwrap();
        fs::write(cats.join("1 - a cat.jpg"), b"old").unwrap();

        let client = client(vec![collection("Cats", vec![item("c1", "a cat"), item("c2", "new cat")])]);
        let context = context(dir.path(), &["Cats"]);

        let (result, _, _) = run(&context, &client);
        assert_eq!(result.unwrap().successful, 2);
        assert_eq!(*client.downloads.lock().unwrap(), vec![String::from("https://th.bing.com/c2.jpg")]);
        assert_eq!(fs::read(cats.join("1 - a cat.jpg")).unwrap(), b"old");
    }

    #[test]
    fn test_same_name_gets_a_counter() {
        let dir = tempdir().unwrap();
        let client = client(vec![collection("Cats", vec![item("c1", "cat"), item("c2", "cat")])]);
        let mut context = context(dir.path(), &["Cats"]);
        context.config.filename.filename_pattern = String::from("$prompt");

        let (result, _, _) = run(&context, &client);
        assert_eq!(result.unwrap().successful, 2);
        assert!(dir.path().join("Cats").join("cat.png").exists());
        assert!(dir.path().join("Cats").join("cat (2).png").exists());
    }

    #[test]
    fn test_cancel_stops_and_removes_partial_file() {
        let dir = tempdir().unwrap();
        let mut client = client(vec![collection(
            "Cats",
            vec![item("c1", "one"), item("c2", "two"), item("c3", "three")],
        )]);
        client.cancel_on = Some(String::from("https://th.bing.com/c2.jpg"));
        let context = context(dir.path(), &["Cats"]);

        let (result, summary, _) = run(&context, &client);
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.total, 3);
        assert_eq!(client.downloads.lock().unwrap().len(), 2);

        let cats = dir.path().join("Cats");
        assert!(cats.join("1 - one.png").exists());
        assert!(!cats.join("2 - two.part").exists());
    }

    #[test]
    fn test_listing_is_attempted_up_to_max_attempts() {
        let dir = tempdir().unwrap();
        let client = client(vec![collection("Cats", vec![item("c1", "a cat")])]);
        *client.listing_failures.lock().unwrap() = 2;
        let mut context = context(dir.path(), &["Cats"]);
        context.config.detail_api.max_attempts = 3;

        let (result, _, _) = run(&context, &client);
        assert_eq!(result.unwrap().successful, 1);

        *client.listing_failures.lock().unwrap() = 2;
        context.config.detail_api.max_attempts = 2;
        let (result, _, _) = run(&context, &client);
        assert!(matches!(result, Err(DownloadError::Api(_))));
    }

    #[test]
    fn test_file_method_reads_image_list() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CLIPBOARD_FILE_NAME),
            "https://th.bing.com/f1.jpg first\n[Cats]\nhttps://th.bing.com/f2.jpg second\n",
        )
        .unwrap();

        let mut client = FakeClient::default();
        client.images.insert(String::from("https://th.bing.com/f1.jpg"), b"f1".to_vec());
        client.images.insert(String::from("https://th.bing.com/f2.jpg"), b"f2".to_vec());

        let mut context = context(dir.path(), &["Cats"]);
        context.config.image_source.method = String::from("file");
        context.config.collection.delete_collection_after_download.toggle = true;
        context.config.debug.detailed_statistics = true;

        let (result, _, _) = run(&context, &client);
        let summary = result.unwrap();
        assert_eq!(summary.successful, 2);
        assert!(dir.path().join("images_clipboard").join("1 - first.png").exists());
        assert!(dir.path().join("Cats").join("1 - second.png").exists());
        assert!(client.deleted.lock().unwrap().is_empty());

        let statistics = fs::read_to_string(dir.path().join(STATISTICS_FILE_NAME)).unwrap();
        assert!(statistics.contains("\"successful\": 2"));
    }

    #[test]
    fn test_summary_message() {
        let summary = DownloadSummary {
            successful: 8,
            total: 10,
            elapsed: Duration::from_secs_f64(3.21),
        };
        let message = summary.message(Language::EnUs);
        assert!(message.contains("Download completed!"));
        assert!(message.contains("Successfully downloaded 8 of 10 images"));
        assert!(message.contains("3.21"));
    }
}
