//! Where image URLs come from and which collections get downloaded.

use std::fs::read_to_string;
use std::path::Path;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::bing::sender::entries::CollectionsResponse;

/// Plain list of image URLs read by the file method.
pub(crate) const CLIPBOARD_FILE_NAME: &str = "images_clipboard.txt";

/// A saved collections response, preferred over the plain list when present.
pub(crate) const COLLECTIONS_FILE_NAME: &str = "collections.json";

/// Collection holding the URLs listed before any header. Always downloaded.
pub(crate) const CLIPBOARD_COLLECTION: &str = "images_clipboard";

static HEADER_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[(?P<name>[^\]]+)\]$").unwrap());

/// A named group of generated images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Collection {
    /// Server-side id, unknown for collections read from a plain list.
    pub(crate) id: Option<String>,
    pub(crate) name: String,
    pub(crate) items: Vec<CollectionItem>,
}

/// A single image of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CollectionItem {
    pub(crate) id: String,
    pub(crate) url: String,
    pub(crate) prompt: String,
    pub(crate) created: Option<DateTime<Utc>>,
}

impl Collection {
    fn new(name: &str) -> Self {
        Collection {
            id: None,
            name: name.to_string(),
            items: Vec::new(),
        }
    }

    /// Whether this collection was asked for by name.
    fn matches(&self, requested: &str) -> bool {
        self.name.trim().eq_ignore_ascii_case(requested.trim())
    }
}

/// Reads the collections the file method downloads from `directory`.
pub(crate) fn read_collection_file(directory: &Path) -> anyhow::Result<Vec<Collection>> {
    let json_path = directory.join(COLLECTIONS_FILE_NAME);
    if json_path.exists() {
        trace!("Reading saved collections from {}", json_path.display());
        let response: CollectionsResponse = serde_json::from_str(&read_to_string(&json_path)?)?;
        return Ok(response.into());
    }

    let list_path = directory.join(CLIPBOARD_FILE_NAME);
    trace!("Reading image list from {}", list_path.display());
    let contents = read_to_string(&list_path).map_err(|e| {
        anyhow::anyhow!("Unable to read {}: {}", list_path.display(), e)
    })?;
    Ok(parse_image_list(&contents))
}

/// Parses a list of image URLs, one per line.
///
/// Text after the URL is taken as the prompt. `[Name]` lines start a new collection; lines before
/// the first header belong to [`CLIPBOARD_COLLECTION`].
pub(crate) fn parse_image_list(contents: &str) -> Vec<Collection> {
    let mut collections = vec![Collection::new(CLIPBOARD_COLLECTION)];
    let mut current = 0;

    for line in contents.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(captures) = HEADER_REGEX.captures(line) {
            let name = captures["name"].trim();
            // A repeated header continues the collection it names.
            current = match collections.iter().position(|c| c.matches(name)) {
                Some(index) => index,
                None => {
                    collections.push(Collection::new(name));
                    collections.len() - 1
                }
            };
            continue;
        }

        let (url, prompt) = match line.split_once(char::is_whitespace) {
            Some((url, prompt)) => (url, prompt.trim()),
            None => (line, ""),
        };
        if !url.starts_with("http://") && !url.starts_with("https://") {
            warn!("Skipping line that is not an image URL: {}", line);
            continue;
        }

        let collection = &mut collections[current];
        let index = collection.items.len() + 1;
        collection.items.push(CollectionItem {
            id: format!("{}-{}", collection.name, index),
            url: url.to_string(),
            prompt: prompt.to_string(),
            created: None,
        });
    }

    collections.retain(|c| !c.items.is_empty());
    collections
}

/// Keeps the collections the user asked for, in the order they were asked for.
///
/// The clipboard collection is always kept. Requested names that match nothing are logged.
pub(crate) fn select_collections(available: Vec<Collection>, requested: &[String]) -> Vec<Collection> {
    let mut selected = Vec::new();
    let mut remaining = available;

    if let Some(index) = remaining.iter().position(|c| c.name == CLIPBOARD_COLLECTION) {
        selected.push(remaining.remove(index));
    }

    for name in requested {
        match remaining.iter().position(|c| c.matches(name)) {
            Some(index) => selected.push(remaining.remove(index)),
            None if selected.iter().any(|c| c.matches(name)) => {}
            None => warn!("Collection \"{}\" was not found", name),
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::write;
    use tempfile::tempdir;

    const LIST: &str = "
# copied from the browser
https://th.bing.com/one.jpg
https://th.bing.com/two.jpg a cat in space

[Dogs]
https://th.bing.com/three.jpg   good boy
not-a-url
[Empty]
[dogs]
https://th.bing.com/four.jpg
";

    #[test]
    fn test_parse_image_list() {
        let collections = parse_image_list(LIST);
        assert_eq!(collections.len(), 2);

        assert_eq!(collections[0].name, CLIPBOARD_COLLECTION);
        assert_eq!(collections[0].items.len(), 2);
        assert_eq!(collections[0].items[0].prompt, "");
        assert_eq!(collections[0].items[1].prompt, "a cat in space");

        assert_eq!(collections[1].name, "Dogs");
        assert_eq!(collections[1].items.len(), 2);
        assert_eq!(collections[1].items[0].prompt, "good boy");
        assert_eq!(collections[1].items[1].url, "https://th.bing.com/four.jpg");
    }

    #[test]
    fn test_select_collections_by_name() {
        let collections = parse_image_list(LIST);
        let selected = select_collections(collections, &[String::from(" dogs "), String::from("Missing")]);
        let names: Vec<&str> = selected.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec![CLIPBOARD_COLLECTION, "Dogs"]);
    }

    #[test]
    fn test_select_skips_unrequested() {
        let available = vec![Collection::new("Cats"), Collection::new("Dogs")];
        let selected = select_collections(available, &[String::from("Dogs")]);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "Dogs");
    }

    #[test]
    fn test_read_collection_file_prefers_json() {
        let dir = tempdir().unwrap();
        write(dir.path().join(CLIPBOARD_FILE_NAME), "https://th.bing.com/one.jpg").unwrap();
        write(
            dir.path().join(COLLECTIONS_FILE_NAME),
            r#"{"collections":[{"id":"c","title":"Cats","collectionPage":{"items":[{"id":"1","content":{"contentUrl":"https://th.bing.com/c.jpg"}}]}}]}"#,
        )
        .unwrap();

        let collections = read_collection_file(dir.path()).unwrap();
        assert_eq!(collections.len(), 1);
        assert_eq!(collections[0].name, "Cats");
    }

    #[test]
    fn test_read_collection_file_missing() {
        let dir = tempdir().unwrap();
        let err = read_collection_file(dir.path()).unwrap_err();
        assert!(err.to_string().contains(CLIPBOARD_FILE_NAME));
    }
}
