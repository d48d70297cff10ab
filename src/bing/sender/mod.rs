use std::io::{Read, Write, copy};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, COOKIE, HeaderMap, HeaderValue};
use serde_json::json;

use crate::bing::downloader::{DownloadError, DownloadResult, ImageBody, ImageClient};
use crate::bing::limits::SystemLimits;
use crate::bing::source::{Collection, CollectionItem};
use crate::bing::worker::CancellationFlag;

pub(crate) mod entries;

use entries::CollectionsResponse;

/// The name of the cargo package.
const NAME: &str = env!("CARGO_PKG_NAME");

/// The version of the cargo package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

const COLLECTIONS_URL: &str = "https://www.bing.com/mysaves/collections/get?sid=0";
const DELETE_ITEMS_URL: &str = "https://www.bing.com/mysaves/collections/items/delete?sid=0";

/// Upper bound on how many items one listing request returns.
const MAX_ITEMS_TO_FETCH: u32 = 10_000;

/// Sends every request the downloader makes.
#[derive(Clone)]
pub(crate) struct RequestSender {
    client: Client,
    /// Normalized `_U=` cookie. Only attached to API calls.
    cookie: Option<String>,
    limits: SystemLimits,
    /// Largest image body accepted, from the memory limit.
    max_body_bytes: u64,
}

impl RequestSender {
    pub(crate) fn new(cookie: Option<String>, limits: SystemLimits) -> DownloadResult<Self> {
        let client = Client::builder()
            .user_agent(format!("{}/{}", NAME, VERSION))
            .pool_max_idle_per_host(limits.max_connections() as usize)
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(300))
            .build()?;

        trace!(
            "Request sender created with {} max connections and {} MB body limit",
            limits.max_connections(),
            limits.memory_mb()
        );

        Ok(RequestSender {
            client,
            cookie,
            limits,
            max_body_bytes: limits.max_body_bytes(),
        })
    }

    fn api_headers(&self) -> DownloadResult<HeaderMap> {
        let cookie = self.cookie.as_deref().ok_or(DownloadError::MissingCookie)?;
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(cookie).map_err(|e| DownloadError::Api(format!("invalid cookie: {}", e)))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

impl ImageClient for RequestSender {
    fn collections(&self) -> DownloadResult<Vec<Collection>> {
        let body = json!({
            "collectionItemType": "all",
            "maxItemsToFetch": MAX_ITEMS_TO_FETCH,
            "shouldFetchMetadata": true,
        });

        let response = self
            .client
            .post(COLLECTIONS_URL)
            .headers(self.api_headers()?)
            .json(&body)
            .send()?
            .error_for_status()?;

        let text = response.text()?;
        let parsed: CollectionsResponse = serde_json::from_str(&text).map_err(|e| {
            debug!("Unexpected collections response: {}", text.chars().take(500).collect::<String>());
            DownloadError::Api(format!("unexpected collections response: {}", e))
        })?;

        Ok(parsed.into())
    }

    fn download(&self, url: &str, sink: &mut dyn Write, cancel: &CancellationFlag) -> DownloadResult<ImageBody> {
        let max_bytes = self.max_body_bytes;
        let response = self.client.get(url).send()?.error_for_status()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if response.content_length().is_some_and(|len| len > max_bytes) {
            return Err(DownloadError::TooLarge {
                url: url.to_string(),
                limit_mb: self.limits.memory_mb(),
            });
        }

        let mut reader = cancel.wrap(response.take(max_bytes + 1));
        let bytes = copy(&mut reader, sink).map_err(|e| {
            if cancel.is_cancelled() { DownloadError::Cancelled } else { DownloadError::Io(e) }
        })?;

        if bytes > max_bytes {
            return Err(DownloadError::TooLarge {
                url: url.to_string(),
                limit_mb: self.limits.memory_mb(),
            });
        }

        Ok(ImageBody { bytes, content_type })
    }

    fn delete_items(&self, collection: &Collection, items: &[&CollectionItem]) -> DownloadResult<()> {
        let collection_id = collection
            .id
            .as_deref()
            .ok_or_else(|| DownloadError::Api(format!("collection \"{}\" has no id", collection.name)))?;
        let item_ids: Vec<&str> = items.iter().map(|item| item.id.as_str()).collect();

        self.client
            .post(DELETE_ITEMS_URL)
            .headers(self.api_headers()?)
            .json(&json!({ "collectionId": collection_id, "itemIds": item_ids }))
            .send()?
            .error_for_status()?;

        Ok(())
    }
}
