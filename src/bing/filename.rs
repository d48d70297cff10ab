use chrono::{DateTime, Local, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::bing::source::CollectionItem;

/// Text `$sep` expands to.
pub(crate) const SEPARATOR: &str = " - ";

/// Longest file stem that gets written.
const MAX_STEM_CHARS: usize = 200;

const DATE_FORMAT: &str = "%Y-%m-%d";

static WHITESPACE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static TOKEN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$(date|index|collection|id|sep|prompt)").unwrap());

/// Turns a filename pattern into file stems for collection items.
#[derive(Debug, Clone)]
pub(crate) struct FilenamePattern {
    pattern: String,
    use_local_time_zone: bool,
}

/// Values a single item contributes to its name.
pub(crate) struct NameContext<'a> {
    pub(crate) item: &'a CollectionItem,
    pub(crate) collection: &'a str,
    /// 1-based position within the collection.
    pub(crate) index: usize,
    /// Number of items in the collection, used for padding the index.
    pub(crate) count: usize,
    /// Used when the item carries no creation date.
    pub(crate) fallback_date: DateTime<Utc>,
}

impl FilenamePattern {
    pub(crate) fn new(pattern: &str, use_local_time_zone: bool) -> Self {
        FilenamePattern {
            pattern: pattern.to_string(),
            use_local_time_zone,
        }
    }

    /// Renders the stem (without extension) for one item.
    pub(crate) fn render(&self, context: &NameContext<'_>) -> String {
        let width = context.count.max(1).to_string().len();
        let index = format!("{:0width$}", context.index, width = width);
        let date = self.format_date(context.item.created.unwrap_or(context.fallback_date));

        // Substituted values are never scanned for tokens again.
        let rendered = TOKEN_REGEX.replace_all(&self.pattern, |caps: &Captures<'_>| match &caps[1] {
            "date" => date.clone(),
            "index" => index.clone(),
            "collection" => context.collection.to_string(),
            "id" => context.item.id.clone(),
            "sep" => SEPARATOR.to_string(),
            _ => context.item.prompt.clone(),
        });

        let stem = sanitize(&rendered);
        if stem.is_empty() { index } else { stem }
    }

    fn format_date(&self, date: DateTime<Utc>) -> String {
        if self.use_local_time_zone {
            date.with_timezone(&Local).format(DATE_FORMAT).to_string()
        } else {
            date.format(DATE_FORMAT).to_string()
        }
    }
}

/// Replaces characters that aren't allowed in file names on any platform.
pub(crate) fn remove_invalid_chars(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '?' | ':' | '*' | '<' | '>' | '"' | '|' | '/' | '\\' => '_',
            c if c.is_control() => ' ',
            _ => c,
        })
        .collect()
}

/// Cleans a rendered name so it can be used as a file or folder name.
pub(crate) fn sanitize(text: &str) -> String {
    let cleaned = remove_invalid_chars(text);
    let collapsed = WHITESPACE_REGEX.replace_all(&cleaned, " ");
    let capped: String = collapsed.trim().chars().take(MAX_STEM_CHARS).collect();
    capped.trim().trim_end_matches('.').to_string()
}

/// Picks a file extension from the response content type, then the URL, then `jpg`.
pub(crate) fn extension_for(content_type: Option<&str>, url: &str) -> &'static str {
    let from_type = content_type
        .map(|t| t.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
        .and_then(|t| match t.as_str() {
            "image/jpeg" | "image/jpg" => Some("jpg"),
            "image/png" => Some("png"),
            "image/webp" => Some("webp"),
            "image/gif" => Some("gif"),
            _ => None,
        });
    if let Some(extension) = from_type {
        return extension;
    }

    let path = url.split(['?', '#']).next().unwrap_or_default();
    let last = path.rsplit('/').next().unwrap_or_default();
    match last.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "png" => "png",
        Some(ext) if ext == "webp" => "webp",
        Some(ext) if ext == "gif" => "gif",
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(prompt: &str) -> CollectionItem {
        CollectionItem {
            id: String::from("abc"),
            url: String::from("https://th.bing.com/a.jpg"),
            prompt: prompt.to_string(),
            created: Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()),
        }
    }

    fn render(pattern: &str, item: &CollectionItem, index: usize, count: usize) -> String {
        FilenamePattern::new(pattern, false).render(&NameContext {
            item,
            collection: "Cats",
            index,
            count,
            fallback_date: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        })
    }

    #[test]
    fn test_default_pattern() {
        let name = render("$date$sep$index$sep$prompt", &item("a red fox"), 3, 12);
        assert_eq!(name, "2024-03-01 - 03 - a red fox");
    }

    #[test]
    fn test_extra_tokens() {
        let name = render("$collection_$id", &item(""), 1, 1);
        assert_eq!(name, "Cats_abc");
    }

    #[test]
    fn test_tokens_inside_values_are_kept() {
        let name = FilenamePattern::new("$collection$sep$prompt", false).render(&NameContext {
            item: &item("$index fox $id"),
            collection: "Price $sep $prompt",
            index: 1,
            count: 1,
            fallback_date: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        });
        assert_eq!(name, "Price $sep $prompt - $index fox $id");
    }

    #[test]
    fn test_unknown_tokens_are_left_alone() {
        assert_eq!(render("$idx$sep$foo", &item(""), 1, 1), "abcx - $foo");
    }

    #[test]
    fn test_missing_date_uses_fallback() {
        let mut undated = item("x");
        undated.created = None;
        assert_eq!(render("$date", &undated, 1, 1), "2020-01-01");
    }

    #[test]
    fn test_invalid_chars_are_replaced() {
        let name = render("$prompt", &item("what/is: this?\n  \"thing\""), 1, 1);
        assert_eq!(name, "what_is_ this_ _thing_");
    }

    #[test]
    fn test_empty_name_falls_back_to_index() {
        assert_eq!(render("$prompt", &item("   "), 7, 10), "07");
    }

    #[test]
    fn test_long_prompt_is_capped() {
        let name = render("$prompt", &item(&"a".repeat(500)), 1, 1);
        assert_eq!(name.chars().count(), 200);
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for(Some("image/png"), "https://x/y"), "png");
        assert_eq!(extension_for(Some("image/jpeg; charset=binary"), "https://x/y.png"), "jpg");
        assert_eq!(extension_for(None, "https://x/y.webp?w=10"), "webp");
        assert_eq!(extension_for(Some("application/octet-stream"), "https://x/y"), "jpg");
    }
}
