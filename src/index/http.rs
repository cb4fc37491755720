//! HTTP client for a hosted nearest-neighbor service.
//!
//! Speaks a dense-index REST dialect: search and upsert against a named
//! namespace, with optional server-side reranking of the hit list.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{IndexRecord, SearchHit, SimilarityIndex};

/// Configuration for the hosted index backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpIndexConfig {
    /// Base URL of the index service
    pub url: String,

    /// API key sent as a bearer token
    #[serde(default)]
    pub api_key: Option<String>,

    /// Optional reranking model applied server-side to the hit list
    #[serde(default)]
    pub rerank_model: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_timeout() -> u64 {
    10
}

/// Hosted similarity index client
pub struct HttpIndex {
    config: HttpIndexConfig,
    client: reqwest::Client,
}

/// Response envelope from the search endpoint
#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: SearchResult,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_score")]
    score: f64,

    fields: IndexRecord,
}

impl HttpIndex {
    pub fn new(config: HttpIndexConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build HTTP client for similarity index")?;

        Ok(Self { config, client })
    }

    fn endpoint(&self, namespace: &str, operation: &str) -> String {
        format!(
            "{}/records/namespaces/{}/{}",
            self.config.url.trim_end_matches('/'),
            namespace,
            operation
        )
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.post(url);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }
        req
    }
}

#[async_trait]
impl SimilarityIndex for HttpIndex {
    async fn search(
        &self,
        namespace: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        let url = self.endpoint(namespace, "search");

        let mut body = json!({
            "query": {
                "top_k": top_k,
                "inputs": { "text": query },
            },
        });

        if let Some(model) = &self.config.rerank_model {
            body["rerank"] = json!({
                "model": model,
                "top_n": top_k,
                "rank_fields": ["description"],
            });
        }

        let response = self
            .request(&url)
            .json(&body)
            .send()
            .await
            .context("Similarity index search request failed")?
            .error_for_status()
            .context("Similarity index returned an error status")?;

        let parsed: SearchResponse = response
            .json()
            .await
            .context("Failed to parse similarity index response")?;

        Ok(parsed
            .result
            .hits
            .into_iter()
            .map(|hit| SearchHit {
                record: hit.fields,
                score: hit.score,
            })
            .collect())
    }

    async fn upsert(&self, namespace: &str, records: &[IndexRecord]) -> Result<()> {
        let url = self.endpoint(namespace, "upsert");

        self.request(&url)
            .json(&json!({ "records": records }))
            .send()
            .await
            .context("Similarity index upsert request failed")?
            .error_for_status()
            .context("Similarity index rejected upsert")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_building() {
        let index = HttpIndex::new(HttpIndexConfig {
            url: "https://index.example.com/".to_string(),
            api_key: None,
            rerank_model: None,
            timeout_seconds: 5,
        })
        .unwrap();

        assert_eq!(
            index.endpoint("incidents", "search"),
            "https://index.example.com/records/namespaces/incidents/search"
        );
    }

    #[test]
    fn test_search_response_parsing() {
        let raw = serde_json::json!({
            "result": {
                "hits": [{
                    "_id": "01HZX5T9GQRS8F4N2V6B7C8D9E",
                    "_score": 0.91,
                    "fields": {
                        "id": "01HZX5T9GQRS8F4N2V6B7C8D9E",
                        "description": "structure fire at warehouse",
                        "incident_type": "Fire",
                        "location": "M5H2N2",
                        "date": "1/10/2026",
                        "time": "14:00"
                    }
                }]
            }
        });

        let parsed: SearchResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.result.hits.len(), 1);
        assert!((parsed.result.hits[0].score - 0.91).abs() < 1e-9);
        assert_eq!(
            parsed.result.hits[0].fields.description,
            "structure fire at warehouse"
        );
    }
}
