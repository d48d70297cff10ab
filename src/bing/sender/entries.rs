use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bing::source::{Collection, CollectionItem};

/// Title the service gives the collection without a name.
pub(crate) const DEFAULT_COLLECTION_TITLE: &str = "Saved Images";

/// Response of the collections listing.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub(crate) struct CollectionsResponse {
    #[serde(default)]
    pub(crate) collections: Vec<CollectionEntry>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub(crate) struct CollectionEntry {
    #[serde(default)]
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) title: String,
    #[serde(rename = "collectionPage", default)]
    pub(crate) collection_page: CollectionPage,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub(crate) struct CollectionPage {
    #[serde(default)]
    pub(crate) items: Vec<ItemEntry>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub(crate) struct ItemEntry {
    #[serde(default)]
    pub(crate) id: String,
    #[serde(rename = "dateModified", default)]
    pub(crate) date_modified: Option<String>,
    #[serde(default)]
    pub(crate) content: Option<ContentEntry>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub(crate) struct ContentEntry {
    #[serde(rename = "contentUrl", default)]
    pub(crate) content_url: Option<String>,
    #[serde(default)]
    pub(crate) title: Option<String>,
    /// A JSON document embedded as a string, which may carry the prompt.
    #[serde(rename = "customData", default)]
    pub(crate) custom_data: Option<String>,
}

impl ContentEntry {
    /// The prompt of the image, from the title or the embedded custom data.
    fn prompt(&self) -> String {
        if let Some(title) = self.title.as_deref().filter(|t| !t.trim().is_empty()) {
            return title.trim().to_string();
        }

        self.custom_data
            .as_deref()
            .and_then(|data| serde_json::from_str::<serde_json::Value>(data).ok())
            .and_then(|value| {
                ["prompt", "Prompt", "title"]
                    .iter()
                    .find_map(|key| value.get(*key).and_then(|v| v.as_str()).map(str::to_string))
            })
            .unwrap_or_default()
    }
}

fn parse_date(date: Option<&str>) -> Option<DateTime<Utc>> {
    let date = date?;
    match DateTime::parse_from_rfc3339(date) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(e) => {
            debug!("Unrecognised item date \"{}\": {}", date, e);
            None
        }
    }
}

impl From<CollectionsResponse> for Vec<Collection> {
    fn from(response: CollectionsResponse) -> Self {
        response.collections.into_iter().map(Collection::from).collect()
    }
}

impl From<CollectionEntry> for Collection {
    fn from(entry: CollectionEntry) -> Self {
        let name = if entry.title.trim().is_empty() {
            String::from(DEFAULT_COLLECTION_TITLE)
        } else {
            entry.title.trim().to_string()
        };

        let items = entry
            .collection_page
            .items
            .into_iter()
            .filter_map(|item| {
                let content = item.content?;
                let url = content.content_url.clone().filter(|u| !u.is_empty())?;
                Some(CollectionItem {
                    id: item.id,
                    url,
                    prompt: content.prompt(),
                    created: parse_date(item.date_modified.as_deref()),
                })
            })
            .collect();

        Collection {
            id: Some(entry.id).filter(|id| !id.is_empty()),
            name,
            items,
        }
    }
}
