use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Base for thumbnail-by-id links; `sz` selects the rendered width.
const THUMBNAIL_BY_ID_BASE: &str = "https://drive.google.com/thumbnail";

/// Base for direct content links served from the image CDN.
const CONTENT_BASE: &str = "https://lh3.googleusercontent.com/d";

/// Base for direct download links.
const DOWNLOAD_BASE: &str = "https://drive.google.com/uc";

/// Width requested for grid thumbnails.
pub const THUMBNAIL_WIDTH: u32 = 400;

/// Width requested for the high-resolution preview.
pub const PREVIEW_WIDTH: u32 = 1920;

/// Size suffix the provider appends to `thumbnailLink` by default.
const PROVIDER_THUMB_SUFFIX: &str = "=s220";

/// The set of display URLs derived for a photo.
///
/// None of these are authoritative: the provider's link formats fail to
/// render cross-origin from time to time, so consumers walk a
/// [`UrlFallback`] instead of picking one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUrls {
    pub thumbnail: String,
    pub preview: String,
    pub full: String,
    pub download: String,
    pub fallback_thumbnail: String,
}

impl PhotoUrls {
    /// Derives every URL from the id alone.
    #[cfg(test)]
    pub fn from_id(id: &str) -> Self {
        Self::derive(id, None, None)
    }

    /// Derives URLs, preferring provider-supplied links where present.
    pub fn derive(id: &str, thumbnail_link: Option<&str>, web_content_link: Option<&str>) -> Self {
        let fallback_thumbnail = format!("{THUMBNAIL_BY_ID_BASE}?id={id}&sz=w{THUMBNAIL_WIDTH}");

        let thumbnail = match thumbnail_link.filter(|l| !l.is_empty()) {
            Some(link) if link.ends_with(PROVIDER_THUMB_SUFFIX) => {
                let base = &link[..link.len() - PROVIDER_THUMB_SUFFIX.len()];
                format!("{base}=s{THUMBNAIL_WIDTH}")
            }
            Some(link) => link.to_string(),
            None => fallback_thumbnail.clone(),
        };

        let download = web_content_link
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{DOWNLOAD_BASE}?export=download&id={id}"));

        Self {
            thumbnail,
            preview: format!("{THUMBNAIL_BY_ID_BASE}?id={id}&sz=w{PREVIEW_WIDTH}"),
            full: format!("{CONTENT_BASE}/{id}"),
            download,
            fallback_thumbnail,
        }
    }
}

/// One image in the remote folder.
///
/// `id` is the only identity. Every other field may change between fetches
/// (rename, re-edit) without the record becoming a different photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRecord {
    pub id: String,
    pub name: String,
    pub mime_type: Option<String>,
    /// ISO-8601, as reported by the provider.
    pub created_time: Option<String>,
    /// ISO-8601, as reported by the provider.
    pub modified_time: Option<String>,
    pub size: Option<u64>,
    pub urls: PhotoUrls,
}

#[cfg(test)]
impl PhotoRecord {
    /// Create a record with just an id and name; URLs are derived from the id.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        let urls = PhotoUrls::from_id(&id);
        Self {
            id,
            name: name.into(),
            mime_type: None,
            created_time: None,
            modified_time: None,
            size: None,
            urls,
        }
    }

    pub fn with_created_time(mut self, created_time: impl Into<String>) -> Self {
        self.created_time = Some(created_time.into());
        self
    }

    pub fn with_modified_time(mut self, modified_time: impl Into<String>) -> Self {
        self.modified_time = Some(modified_time.into());
        self
    }
}

impl PhotoRecord {
    /// Parsed creation instant, `None` when absent or unparseable.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_time.as_deref().and_then(parse_timestamp)
    }

    /// Parsed modification instant, `None` when absent or unparseable.
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified_time.as_deref().and_then(parse_timestamp)
    }

    /// Candidates for the full-size viewer, best first.
    pub fn display_candidates(&self) -> UrlFallback {
        UrlFallback::new([
            &self.urls.preview,
            &self.urls.full,
            &self.urls.thumbnail,
            &self.urls.fallback_thumbnail,
        ])
    }

    /// Candidates for a grid tile, cheapest first.
    pub fn thumbnail_candidates(&self) -> UrlFallback {
        UrlFallback::new([
            &self.urls.thumbnail,
            &self.urls.fallback_thumbnail,
            &self.urls.preview,
        ])
    }
}

/// Parses the timestamp shapes the provider (and hand-edited fixtures) use:
/// RFC 3339, a zone-less date-time, or a bare date.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// An ordered list of candidate URLs with a cursor.
///
/// The presentation side renders `current()`, and on a load error calls
/// `advance()` to move on. Once every candidate has failed, `advance()`
/// returns `None` and `current()` stays `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlFallback {
    urls: Vec<String>,
    cursor: usize,
}

impl UrlFallback {
    pub fn new<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut urls: Vec<String> = Vec::new();
        for candidate in candidates {
            let candidate = candidate.as_ref();
            if !candidate.is_empty() && !urls.iter().any(|u| u == candidate) {
                urls.push(candidate.to_string());
            }
        }
        Self { urls, cursor: 0 }
    }

    /// The candidate to try now.
    pub fn current(&self) -> Option<&str> {
        self.urls.get(self.cursor).map(String::as_str)
    }

    /// Marks the current candidate as failed and returns the next one.
    pub fn advance(&mut self) -> Option<&str> {
        if self.cursor < self.urls.len() {
            self.cursor += 1;
        }
        self.current()
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.urls.len()
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

impl Iterator for UrlFallback {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let item = self.current().map(str::to_string);
        if item.is_some() {
            self.cursor += 1;
        }
        item
    }
}
