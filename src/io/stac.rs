//! STAC Item Search: serde models and a blocking client
//!
//! Covers the subset needed here: collection/bbox/datetime filters, the `query`
//! extension for cloud cover, `next`-link pagination and Planetary Computer
//! asset signing.

use crate::types::{BoundingBox, FuseError, FuseResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Catalog search port
pub trait Catalog {
    /// Run a search and return up to `request.max_items` items (all pages)
    fn search(&self, request: &SearchRequest) -> FuseResult<Vec<StacItem>>;
}

/// Body for `POST /search`
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    /// STAC query extension filter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<serde_json::Value>,

    /// Page size
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    /// Total item cap across pages, not sent to the server
    #[serde(skip)]
    pub max_items: Option<usize>,
}

impl SearchRequest {
    pub fn new(collection: &str) -> Self {
        Self {
            collections: Some(vec![collection.to_string()]),
            ..Self::default()
        }
    }

    pub fn bbox(mut self, bbox: &BoundingBox) -> Self {
        self.bbox = Some(bbox.as_array());
        self
    }

    /// Datetime or interval, e.g. `"2021-01-01/2021-03-01"` or `"2021/2021"`
    pub fn datetime(mut self, datetime: impl Into<String>) -> Self {
        self.datetime = Some(datetime.into());
        self
    }

    /// Only items with `eo:cloud_cover` strictly below `percent`
    pub fn cloud_cover_below(mut self, percent: u8) -> Self {
        self.query = Some(serde_json::json!({ "eo:cloud_cover": { "lt": percent } }));
        self
    }

    pub fn max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self.limit = Some(max_items.min(1000) as u32);
        self
    }

    pub fn collection(&self) -> Option<&str> {
        self.collections.as_ref().and_then(|c| c.first()).map(|c| c.as_str())
    }
}

/// A STAC Item Collection (GeoJSON FeatureCollection)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemCollection {
    #[serde(default)]
    pub features: Vec<StacItem>,

    #[serde(default)]
    pub links: Vec<StacLink>,
}

impl StacItemCollection {
    pub fn next_link(&self) -> Option<&StacLink> {
        self.links.iter().find(|l| l.rel == "next")
    }
}

/// A single STAC Item (GeoJSON Feature)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItem {
    pub id: String,

    /// Footprint as raw GeoJSON, WGS84
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<serde_json::Value>,

    /// `[west, south, east, north]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    pub properties: StacItemProperties,

    #[serde(default)]
    pub assets: HashMap<String, StacAsset>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

impl StacItem {
    pub fn asset(&self, key: &str) -> Option<&StacAsset> {
        self.assets.get(key)
    }

    pub fn cloud_cover(&self) -> Option<f64> {
        self.properties.eo_cloud_cover
    }
}

/// STAC Item properties
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StacItemProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    #[serde(rename = "eo:cloud_cover", skip_serializing_if = "Option::is_none")]
    pub eo_cloud_cover: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A single STAC Asset (file reference)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacAsset {
    pub href: String,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

/// A STAC Link, used here for pagination
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacLink {
    pub rel: String,
    pub href: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct SasToken {
    token: String,
}

/// Blocking STAC API client
pub struct StacClient {
    root_url: String,
    sign_assets: bool,
    client: reqwest::blocking::Client,
}

impl StacClient {
    pub fn new(root_url: &str, sign_assets: bool) -> FuseResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(concat!("canopyfuse/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            root_url: root_url.trim_end_matches('/').to_string(),
            sign_assets,
            client,
        })
    }

    /// Full `/search` URL
    pub fn search_url(&self) -> String {
        if self.root_url.ends_with("/search") {
            self.root_url.clone()
        } else {
            format!("{}/search", self.root_url)
        }
    }

    fn post_search(&self, url: &str, body: &serde_json::Value) -> FuseResult<StacItemCollection> {
        log::debug!("STAC POST {} {}", url, body);
        let response = self.client.post(url).json(body).send()?.error_for_status()?;
        Ok(response.json()?)
    }

    fn get_page(&self, url: &str) -> FuseResult<StacItemCollection> {
        log::debug!("STAC GET {}", url);
        let response = self.client.get(url).send()?.error_for_status()?;
        Ok(response.json()?)
    }

    fn follow_next(&self, link: &StacLink, previous: &serde_json::Value) -> FuseResult<StacItemCollection> {
        let is_post = link
            .method
            .as_deref()
            .map(|m| m.eq_ignore_ascii_case("POST"))
            .unwrap_or(false);

        if !is_post {
            return self.get_page(&link.href);
        }

        let body = match &link.body {
            Some(next_body) if link.merge.unwrap_or(false) => merge_json(previous, next_body),
            Some(next_body) => next_body.clone(),
            None => previous.clone(),
        };
        self.post_search(&link.href, &body)
    }

    /// Fetch a short-lived read token for a Planetary Computer collection
    fn sas_token(&self, collection: &str) -> FuseResult<String> {
        let url = format!("{}/{}", crate::config::PLANETARY_COMPUTER_SAS, collection);
        log::debug!("Requesting SAS token: {}", url);
        let token: SasToken = self.client.get(&url).send()?.error_for_status()?.json()?;
        Ok(token.token)
    }

    fn sign_items(&self, items: &mut [StacItem], collection: &str) -> FuseResult<()> {
        let needs_token = items
            .iter()
            .flat_map(|i| i.assets.values())
            .any(|a| is_blob_storage(&a.href));
        if !needs_token {
            return Ok(());
        }

        let token = self.sas_token(collection)?;
        for asset in items.iter_mut().flat_map(|i| i.assets.values_mut()) {
            if is_blob_storage(&asset.href) {
                asset.href = append_token(&asset.href, &token);
            }
        }
        Ok(())
    }
}

impl Catalog for StacClient {
    fn search(&self, request: &SearchRequest) -> FuseResult<Vec<StacItem>> {
        let max = request.max_items.unwrap_or(usize::MAX);
        let body = serde_json::to_value(request)?;

        let mut items: Vec<StacItem> = Vec::new();
        let mut previous = body.clone();
        let mut page = self.post_search(&self.search_url(), &body)?;

        loop {
            let next = page.next_link().cloned();
            let fetched = page.features.len();
            items.extend(page.features.drain(..));

            if items.len() >= max || fetched == 0 {
                break;
            }

            match next {
                Some(link) => {
                    if let Some(next_body) = &link.body {
                        previous = merge_json(&previous, next_body);
                    }
                    page = self.follow_next(&link, &previous)?;
                }
                None => break,
            }
        }

        items.truncate(max);
        log::debug!("STAC search returned {} items", items.len());

        if self.sign_assets {
            if let Some(collection) = request.collection() {
                self.sign_items(&mut items, collection)?;
            }
        }

        Ok(items)
    }
}

/// Azure blob hrefs are the only ones Planetary Computer requires a token for
fn is_blob_storage(href: &str) -> bool {
    href.contains(".blob.core.windows.net")
}

fn append_token(href: &str, token: &str) -> String {
    if href.contains('?') {
        format!("{}&{}", href, token)
    } else {
        format!("{}?{}", href, token)
    }
}

/// Shallow merge of two JSON objects, `overlay` wins
fn merge_json(base: &serde_json::Value, overlay: &serde_json::Value) -> serde_json::Value {
    match (base, overlay) {
        (serde_json::Value::Object(b), serde_json::Value::Object(o)) => {
            let mut merged = b.clone();
            for (k, v) in o {
                merged.insert(k.clone(), v.clone());
            }
            serde_json::Value::Object(merged)
        }
        (_, overlay) => overlay.clone(),
    }
}
