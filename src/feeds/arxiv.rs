//! arXiv adapter: Atom feed over the cs.AI / cs.CL / cs.LG categories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use tracing::warn;

use crate::error::{Error, Result};

use super::types::{FetchOutcome, RawItem, SourceType};
use super::{http_client, FeedAdapter};

const API_BASE: &str = "https://export.arxiv.org/api/query";
const MAX_RESULTS: usize = 25;

pub struct ArxivAdapter {
    client: Client,
}

impl ArxivAdapter {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            client: http_client(timeout_secs),
        }
    }

    async fn fetch_inner(&self) -> Result<FetchOutcome> {
        let query = "cat:cs.AI OR cat:cs.CL OR cat:cs.LG";
        let url = format!(
            "{API_BASE}?search_query={}&sortBy=submittedDate&sortOrder=descending&max_results={MAX_RESULTS}",
            urlencoding::encode(query)
        );

        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::feed("arxiv", e.to_string()))?
            .text()
            .await?;

        Ok(FetchOutcome::items(parse_atom(&body)?))
    }
}

#[derive(Debug, Default)]
struct Entry {
    id: String,
    title: String,
    published: String,
    authors: Vec<String>,
}

/// Parse the arXiv Atom response with the event reader; entries with a
/// missing id or title are dropped.
fn parse_atom(xml: &str) -> Result<Vec<RawItem>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<Entry> = None;
    let mut in_author = false;
    let mut text_buffer = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "entry" {
                    current = Some(Entry::default());
                } else if name == "author" && current.is_some() {
                    in_author = true;
                }
            }
            Ok(Event::Text(e)) => {
                text_buffer = e.unescape().unwrap_or_default().to_string();
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "entry" {
                    if let Some(entry) = current.take() {
                        if let Some(item) = normalize(entry) {
                            items.push(item);
                        }
                    }
                } else if name == "author" {
                    in_author = false;
                } else if let Some(entry) = current.as_mut() {
                    match name.as_str() {
                        "id" => entry.id = text_buffer.clone(),
                        "title" => entry.title = text_buffer.clone(),
                        "published" => entry.published = text_buffer.clone(),
                        "name" if in_author => entry.authors.push(text_buffer.clone()),
                        _ => {}
                    }
                }
                text_buffer.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::feed("arxiv", format!("XML parsing error: {e}"))),
            _ => {}
        }
    }

    Ok(items)
}

fn normalize(entry: Entry) -> Option<RawItem> {
    if entry.id.is_empty() || entry.title.is_empty() {
        return None;
    }
    let title = entry.title.split_whitespace().collect::<Vec<_>>().join(" ");
    let published_at = DateTime::parse_from_rfc3339(&entry.published)
        .ok()
        .map(|t| t.with_timezone(&Utc));
    let external_id = entry
        .id
        .rsplit('/')
        .next()
        .unwrap_or(&entry.id)
        .to_string();
    Some(RawItem {
        source_type: SourceType::Arxiv,
        external_id,
        url: entry.id,
        title,
        author: entry.authors.first().cloned(),
        published_at,
        score: None,
        tags: Vec::new(),
    })
}

#[async_trait]
impl FeedAdapter for ArxivAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Arxiv
    }

    async fn fetch(&self) -> FetchOutcome {
        match self.fetch_inner().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(source = "arxiv", error = %e, "feed fetch failed");
                FetchOutcome::failed(e.to_string())
            }
        }
    }
}
