//! YouTube adapter (Data API v3 search).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};

use super::types::{FetchOutcome, RawItem, SourceType};
use super::{http_client, FeedAdapter};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3/search";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: VideoId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct VideoId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
    #[serde(rename = "channelTitle")]
    channel_title: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<DateTime<Utc>>,
}

pub struct YoutubeAdapter {
    client: Client,
    api_key: Option<String>,
}

impl YoutubeAdapter {
    pub fn new(timeout_secs: u64, api_key: Option<String>) -> Self {
        Self {
            client: http_client(timeout_secs),
            api_key,
        }
    }

    async fn fetch_inner(&self) -> Result<FetchOutcome> {
        let Some(api_key) = &self.api_key else {
            warn!(source = "youtube", "credentials missing, skipping fetch");
            return Ok(FetchOutcome::failed("YOUTUBE_API_KEY not configured"));
        };

        let url = format!(
            "{API_BASE}?part=snippet&q={}&type=video&order=date&maxResults=25&key={api_key}",
            urlencoding::encode("AI news LLM")
        );
        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::feed("youtube", e.to_string()))?
            .text()
            .await?;

        Ok(FetchOutcome::items(parse_search(&body)?))
    }
}

fn parse_search(body: &str) -> Result<Vec<RawItem>> {
    let response: SearchResponse = serde_json::from_str(body)?;
    Ok(response
        .items
        .into_iter()
        .filter_map(|item| {
            let video_id = item.id.video_id?;
            Some(RawItem {
                source_type: SourceType::Youtube,
                external_id: video_id.clone(),
                url: format!("https://www.youtube.com/watch?v={video_id}"),
                title: item.snippet.title,
                author: item.snippet.channel_title,
                published_at: item.snippet.published_at,
                score: None,
                tags: Vec::new(),
            })
        })
        .collect())
}

#[async_trait]
impl FeedAdapter for YoutubeAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Youtube
    }

    async fn fetch(&self) -> FetchOutcome {
        match self.fetch_inner().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(source = "youtube", error = %e, "feed fetch failed");
                FetchOutcome::failed(e.to_string())
            }
        }
    }
}
