//! Hugging Face adapter: models trending over the last 7 days.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};

use super::types::{FetchOutcome, RawItem, SourceType};
use super::{http_client, FeedAdapter};

const API_URL: &str = "https://huggingface.co/api/models?sort=likes7d&limit=25";

#[derive(Debug, Deserialize)]
struct Model {
    id: String,
    likes: Option<i64>,
    #[serde(rename = "lastModified")]
    last_modified: Option<DateTime<Utc>>,
    #[serde(rename = "pipeline_tag")]
    pipeline_tag: Option<String>,
}

pub struct HuggingFaceAdapter {
    client: Client,
}

impl HuggingFaceAdapter {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            client: http_client(timeout_secs),
        }
    }

    async fn fetch_inner(&self) -> Result<FetchOutcome> {
        let body = self
            .client
            .get(API_URL)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::feed("huggingface", e.to_string()))?
            .text()
            .await?;
        Ok(FetchOutcome::items(parse_models(&body)?))
    }
}

fn parse_models(body: &str) -> Result<Vec<RawItem>> {
    let models: Vec<Model> = serde_json::from_str(body)?;
    Ok(models
        .into_iter()
        .map(|model| {
            let author = model.id.split('/').next().map(String::from);
            RawItem {
                source_type: SourceType::HuggingFace,
                external_id: model.id.clone(),
                url: format!("https://huggingface.co/{}", model.id),
                title: format!("{} trending on Hugging Face", model.id),
                author,
                published_at: model.last_modified,
                score: model.likes,
                tags: model.pipeline_tag.into_iter().collect(),
            }
        })
        .collect())
}

#[async_trait]
impl FeedAdapter for HuggingFaceAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::HuggingFace
    }

    async fn fetch(&self) -> FetchOutcome {
        match self.fetch_inner().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(source = "huggingface", error = %e, "feed fetch failed");
                FetchOutcome::failed(e.to_string())
            }
        }
    }
}
