//! Catalog client: paginated resource listing and resource types.
//!
//! The catalog answers `GET {server}/api/v1/resources/?collection_id=...`
//! with pages of `{ "results": [...], "next": "<url>" | null }`. Pages are
//! followed until `next` is empty, and items are accumulated in arrival
//! order.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Query parameter that restricts a listing to one resource type.
pub const TYPE_FILTER_PARAM: &str = "resource_type_abbreviation";

/// One downloadable item returned by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResourceRef {
    /// Opaque resource identifier.
    #[serde(rename = "resource_id")]
    pub id: String,
    /// Direct download URL.
    #[serde(rename = "resource")]
    pub url: String,
}

impl ResourceRef {
    /// Creates a resource reference.
    #[must_use]
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

/// One page of listing results.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogPage {
    /// Resources on this page, in listing order.
    #[serde(rename = "results", default)]
    pub items: Vec<ResourceRef>,
    #[serde(default)]
    next: Option<String>,
}

impl CatalogPage {
    /// Returns the continuation URL, or `None` on the last page.
    #[must_use]
    pub fn next_cursor(&self) -> Option<&str> {
        self.next
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Filter column a resource type is shown in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(from = "Option<String>")]
pub enum ResourceCategory {
    /// Aerial and satellite imagery.
    Imagery,
    /// Elevation and lidar products.
    Elevation,
    /// Everything else.
    #[default]
    Other,
}

impl ResourceCategory {
    /// Maps a catalog category label onto a filter column.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "IMAGERY" => Self::Imagery,
            "ELEVATION" | "LIDAR" => Self::Elevation,
            _ => Self::Other,
        }
    }

    /// Human-readable column heading.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Imagery => "Imagery",
            Self::Elevation => "Elevation",
            Self::Other => "Other",
        }
    }
}

impl From<Option<String>> for ResourceCategory {
    fn from(label: Option<String>) -> Self {
        label.as_deref().map_or(Self::Other, Self::from_label)
    }
}

/// A resource type that can be used as a listing filter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResourceType {
    /// Display name.
    #[serde(rename = "resource_type_name")]
    pub name: String,
    /// Abbreviation passed as the listing filter.
    #[serde(rename = "resource_type_abbreviation")]
    pub abbreviation: String,
    /// Filter column.
    #[serde(rename = "resource_type_category", default)]
    pub category: ResourceCategory,
}

#[derive(Debug, Deserialize)]
struct ResourceTypePage {
    #[serde(default)]
    results: Vec<ResourceType>,
}

/// Resource types split into the three filter columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceTypeGroups {
    /// Elevation and lidar types.
    pub elevation: Vec<ResourceType>,
    /// Imagery types.
    pub imagery: Vec<ResourceType>,
    /// Remaining types.
    pub other: Vec<ResourceType>,
}

/// Splits resource types by category, preserving catalog order within each group.
#[must_use]
pub fn group_by_category(types: Vec<ResourceType>) -> ResourceTypeGroups {
    let mut groups = ResourceTypeGroups::default();
    for ty in types {
        match ty.category {
            ResourceCategory::Elevation => groups.elevation.push(ty),
            ResourceCategory::Imagery => groups.imagery.push(ty),
            ResourceCategory::Other => groups.other.push(ty),
        }
    }
    groups
}

/// Source of resource listings.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Lists every resource in a collection, draining pagination.
    ///
    /// An empty vector means the collection has nothing to download. A
    /// failure part-way through is reported as [`Error::Listing`].
    async fn list_resources(
        &self,
        collection_id: &str,
        type_filter: Option<&str>,
    ) -> Result<Vec<ResourceRef>>;
}

/// HTTP client for the catalog service.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    server: String,
}

impl CatalogClient {
    /// Creates a client for `server` (e.g. `https://api.tnris.org`).
    #[must_use]
    pub fn new(http: reqwest::Client, server: impl Into<String>) -> Self {
        let server = server.into().trim_end_matches('/').to_string();
        Self { http, server }
    }

    /// Returns the catalog base URL.
    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Builds the first listing URL for a collection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the server URL is malformed.
    pub fn resources_url(&self, collection_id: &str, type_filter: Option<&str>) -> Result<Url> {
        let base = format!("{}/api/v1/resources/", self.server);
        let mut url = Url::parse(&base).map_err(|_| Error::InvalidUrl(base.clone()))?;
        url.query_pairs_mut()
            .append_pair("collection_id", collection_id);
        apply_filter(&mut url, type_filter);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Fetches and decodes a single listing page.
    ///
    /// # Errors
    ///
    /// Returns a network, status or decode error.
    pub async fn fetch_page(&self, url: Url) -> Result<CatalogPage> {
        log::debug!("Fetching catalog page {url}");
        self.get_json(url).await
    }

    /// Lists the resource types offered as filters.
    ///
    /// # Errors
    ///
    /// Returns a network, status or decode error.
    pub async fn list_resource_types(&self) -> Result<Vec<ResourceType>> {
        let base = format!("{}/api/v1/resource_types/", self.server);
        let url = Url::parse(&base).map_err(|_| Error::InvalidUrl(base.clone()))?;
        let page: ResourceTypePage = self.get_json(url).await?;
        Ok(page.results)
    }
}

#[async_trait]
impl Catalog for CatalogClient {
    async fn list_resources(
        &self,
        collection_id: &str,
        type_filter: Option<&str>,
    ) -> Result<Vec<ResourceRef>> {
        let mut url = self.resources_url(collection_id, type_filter)?;
        let mut items = Vec::new();
        let mut visited = HashSet::new();

        loop {
            visited.insert(url.to_string());
            let page = match self.fetch_page(url).await {
                Ok(page) => page,
                Err(e) => {
                    return Err(Error::Listing {
                        partial: items,
                        source: Box::new(e),
                    });
                }
            };

            let next = page.next_cursor().map(str::to_owned);
            items.extend(page.items);

            let Some(next) = next else { break };
            url = match Url::parse(&next) {
                Ok(next_url) => next_url,
                Err(_) => {
                    return Err(Error::Listing {
                        partial: items,
                        source: Box::new(Error::InvalidUrl(next)),
                    });
                }
            };
            apply_filter(&mut url, type_filter);

            if visited.contains(url.as_str()) {
                log::warn!("Catalog cursor {url} repeats an earlier page, stopping pagination");
                break;
            }
        }

        log::info!(
            "Collection {collection_id} lists {} resource(s)",
            items.len()
        );
        Ok(items)
    }
}

/// Adds the type filter to `url` unless it is already present.
fn apply_filter(url: &mut Url, type_filter: Option<&str>) {
    let Some(filter) = type_filter.filter(|f| !f.is_empty()) else {
        return;
    };
    if url.query_pairs().any(|(key, _)| key == TYPE_FILTER_PARAM) {
        return;
    }
    url.query_pairs_mut().append_pair(TYPE_FILTER_PARAM, filter);
}
