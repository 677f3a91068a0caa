#![forbid(unsafe_code)]

//! YouTube Data API access: paging through a channel's uploads and looking up
//! view counts in batches.

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Service, SyncError, SyncResult};
use crate::model::{DEFAULT_VIEW_COUNT, VideoRecord, ViewCountMap, image_formula, watch_url};

pub const SEARCH_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/search";
pub const VIDEOS_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/videos";
/// Largest page the search endpoint serves and the largest id batch the
/// videos endpoint accepts.
pub const MAX_RESULTS: usize = 50;

// --- API models ---

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchListResponse {
    #[serde(default)]
    pub items: Vec<SearchResult>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResult {
    pub id: SearchResultId,
    pub snippet: SearchSnippet,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultId {
    pub video_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSnippet {
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub thumbnails: Thumbnails,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thumbnails {
    pub high: Thumbnail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thumbnail {
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct VideoListResponse {
    #[serde(default)]
    pub items: Vec<VideoStatisticsItem>,
}

#[derive(Debug, Deserialize)]
pub struct VideoStatisticsItem {
    pub id: String,
    #[serde(default)]
    pub statistics: VideoStatistics,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatistics {
    pub view_count: Option<String>,
}

/// Filter for the upload listing.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub channel_id: String,
    pub published_after: DateTime<Utc>,
}

/// The two remote calls the sync needs. [`YouTubeClient`] talks to the real
/// API; tests script their own pages.
pub trait VideoCatalog {
    fn search_page(
        &self,
        query: &SearchQuery,
        page_token: Option<&str>,
    ) -> SyncResult<SearchListResponse>;

    /// `ids` holds at most [`MAX_RESULTS`] entries.
    fn statistics(&self, ids: &[String]) -> SyncResult<VideoListResponse>;
}

/// Blocking Data API client authenticated by API key.
pub struct YouTubeClient {
    agent: ureq::Agent,
    api_key: String,
}

impl YouTubeClient {
    pub fn new(agent: ureq::Agent, api_key: impl Into<String>) -> Self {
        Self {
            agent,
            api_key: api_key.into(),
        }
    }
}

impl VideoCatalog for YouTubeClient {
    fn search_page(
        &self,
        query: &SearchQuery,
        page_token: Option<&str>,
    ) -> SyncResult<SearchListResponse> {
        let published_after = query
            .published_after
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        let max_results = MAX_RESULTS.to_string();
        let mut request = self
            .agent
            .get(SEARCH_ENDPOINT)
            .query("key", &self.api_key)
            .query("channelId", &query.channel_id)
            .query("part", "snippet")
            .query("order", "date")
            .query("maxResults", &max_results)
            .query("type", "video")
            .query("publishedAfter", &published_after);
        if let Some(token) = page_token {
            request = request.query("pageToken", token);
        }
        let response = request
            .call()
            .map_err(|err| SyncError::from_http(Service::Search, err))?;
        response
            .into_json()
            .map_err(|err| SyncError::api(Service::Search, format!("decoding response: {err}")))
    }

    fn statistics(&self, ids: &[String]) -> SyncResult<VideoListResponse> {
        let joined = ids.join(",");
        let response = self
            .agent
            .get(VIDEOS_ENDPOINT)
            .query("key", &self.api_key)
            .query("part", "statistics")
            .query("id", &joined)
            .call()
            .map_err(|err| SyncError::from_http(Service::Statistics, err))?;
        response.into_json().map_err(|err| {
            SyncError::api(Service::Statistics, format!("decoding response: {err}"))
        })
    }
}

/// Pages through the channel's uploads until a page comes back empty or
/// without a continuation token, normalizing every item on the way.
pub fn fetch_videos(
    catalog: &impl VideoCatalog,
    query: &SearchQuery,
    timezone: Tz,
) -> SyncResult<Vec<VideoRecord>> {
    let mut videos = Vec::new();
    let mut page_token: Option<String> = None;
    let mut page = 0usize;

    loop {
        page += 1;
        let response = catalog.search_page(query, page_token.as_deref())?;
        if response.items.is_empty() {
            debug!(page, "search page empty, stopping");
            break;
        }
        debug!(page, items = response.items.len(), "fetched search page");

        videos.extend(
            response
                .items
                .into_iter()
                .map(|item| normalize(item, timezone)),
        );

        match response.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    info!(count = videos.len(), channel = %query.channel_id, "fetched videos");
    Ok(videos)
}

/// Looks up view counts in batches of [`MAX_RESULTS`]. Items without a
/// `viewCount` (hidden statistics) map to `"0"`; ids the API does not return
/// are simply absent from the map.
pub fn fetch_view_counts(catalog: &impl VideoCatalog, ids: &[String]) -> SyncResult<ViewCountMap> {
    let mut views = ViewCountMap::new();
    for batch in ids.chunks(MAX_RESULTS) {
        let response = catalog.statistics(batch)?;
        for item in response.items {
            let count = item
                .statistics
                .view_count
                .unwrap_or_else(|| DEFAULT_VIEW_COUNT.to_string());
            views.insert(item.id, count);
        }
    }
    info!(count = views.len(), "fetched view statistics");
    Ok(views)
}

fn normalize(item: SearchResult, timezone: Tz) -> VideoRecord {
    let SearchResult { id, snippet } = item;
    let (published_date, published_time) = localize(snippet.published_at, timezone);
    VideoRecord {
        url: watch_url(&id.video_id),
        id: id.video_id,
        title: decode_html_entities(&snippet.title),
        published_date,
        published_time,
        thumbnail_formula: image_formula(&snippet.thumbnails.high.url),
    }
}

/// Renders a UTC timestamp as `(YYYY-MM-DD, HH:MM:SS)` in the given zone.
pub fn localize(published_at: DateTime<Utc>, timezone: Tz) -> (String, String) {
    let local = published_at.with_timezone(&timezone);
    (
        local.format("%Y-%m-%d").to_string(),
        local.format("%H:%M:%S").to_string(),
    )
}

/// The search endpoint HTML-escapes titles. Decodes `&amp;`, `&lt;`, `&gt;`,
/// `&quot;`, `&apos;`, `&nbsp;` and semicolon-terminated numeric references.
/// This is narrower than a full HTML5 unescape: other named entities such as
/// `&hellip;` and references missing their `;` are left verbatim.
pub fn decode_html_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        let decoded = candidate
            .find(';')
            .filter(|end| *end <= 10)
            .and_then(|end| decode_entity(&candidate[1..end]).map(|ch| (ch, end)));
        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &candidate[end + 1..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}
