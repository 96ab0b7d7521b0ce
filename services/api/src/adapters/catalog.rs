//! services/api/src/adapters/catalog.rs
//!
//! This module contains the adapter for the Open Library catalog.
//! It implements the `CatalogService` port from the `core` crate over plain HTTP.

use async_trait::async_trait;
use marginalia_core::domain::CatalogSearchResult;
use marginalia_core::ports::{CatalogService, PortError, PortResult};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

const SEARCH_LIMIT: &str = "10";
const SEARCH_FIELDS: &str =
    "key,title,author_name,first_publish_year,cover_edition_key,edition_key";
const UNKNOWN_AUTHOR: &str = "Unknown";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `CatalogService` against the Open Library HTTP API.
#[derive(Clone)]
pub struct OpenLibraryAdapter {
    http: reqwest::Client,
    base_url: String,
    covers_base_url: String,
}

impl OpenLibraryAdapter {
    /// Creates a new `OpenLibraryAdapter`. Base URLs are given without a trailing slash.
    pub fn new(http: reqwest::Client, base_url: String, covers_base_url: String) -> Self {
        Self {
            http,
            base_url,
            covers_base_url,
        }
    }
}

//=========================================================================================
// Wire Format
//=========================================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    key: Option<String>,
    title: Option<String>,
    #[serde(default)]
    author_name: Vec<String>,
    first_publish_year: Option<i64>,
    cover_edition_key: Option<String>,
    #[serde(default)]
    edition_key: Vec<String>,
}

impl SearchDoc {
    /// Docs without a key or title cannot be saved, so they are dropped.
    fn into_result(self, covers_base_url: &str) -> Option<CatalogSearchResult> {
        let key = self.key?;
        let title = self.title?;
        let work_id = key.strip_prefix("/works/").unwrap_or(&key).to_string();
        let edition_id = self
            .cover_edition_key
            .or_else(|| self.edition_key.into_iter().next());
        let cover_url = edition_id
            .as_ref()
            .map(|edition| format!("{}/b/olid/{}-M.jpg", covers_base_url, edition));

        Some(CatalogSearchResult {
            work_id,
            title,
            author: self
                .author_name
                .into_iter()
                .next()
                .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            publish_year: self.first_publish_year,
            cover_url,
            edition_id,
        })
    }
}

/// Works carry their description either as a bare string or as `{"type", "value"}`.
fn extract_description(work: &Value) -> Option<String> {
    match work.get("description")? {
        Value::String(text) => Some(text.clone()),
        Value::Object(typed) => typed.get("value")?.as_str().map(str::to_string),
        _ => None,
    }
}

fn upstream(e: reqwest::Error) -> PortError {
    PortError::Upstream(e.to_string())
}

//=========================================================================================
// `CatalogService` Trait Implementation
//=========================================================================================

#[async_trait]
impl CatalogService for OpenLibraryAdapter {
    async fn search_books(&self, query: &str) -> PortResult<Vec<CatalogSearchResult>> {
        let url = format!("{}/search.json", self.base_url);
        debug!("Searching catalog for '{}'", query);

        let response: SearchResponse = self
            .http
            .get(&url)
            .query(&[
                ("title", query),
                ("limit", SEARCH_LIMIT),
                ("fields", SEARCH_FIELDS),
            ])
            .send()
            .await
            .map_err(upstream)?
            .error_for_status()
            .map_err(upstream)?
            .json()
            .await
            .map_err(upstream)?;

        Ok(response
            .docs
            .into_iter()
            .filter_map(|doc| doc.into_result(&self.covers_base_url))
            .collect())
    }

    async fn work_description(&self, work_id: &str) -> PortResult<Option<String>> {
        let url = format!("{}/works/{}.json", self.base_url, work_id);

        let work: Value = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(upstream)?
            .error_for_status()
            .map_err(upstream)?
            .json()
            .await
            .map_err(upstream)?;

        Ok(extract_description(&work))
    }
}
