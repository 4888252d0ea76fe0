//! Page resolution: which pages exist and where they live.
//!
//! The evaluator only needs to know whether a redirect target is a live,
//! published destination; the request layer additionally needs its permalink.

use crate::config::PageConfig;
use crate::types::PageId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

/// Lookup service for content pages.
pub trait PageResolver: Send + Sync {
    /// `true` only for pages that exist and are published.
    fn page_exists(&self, id: PageId) -> bool;

    /// Public URL of a published page.
    fn permalink_of(&self, id: PageId) -> Option<Url>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    #[default]
    Published,
    Draft,
    Trashed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub title: String,
    pub permalink: Url,
    #[serde(default)]
    pub status: PageStatus,
}

/// Thread-safe in-memory page directory backed by `DashMap`.
pub struct PageDirectory {
    pages: DashMap<PageId, Page>,
}

impl PageDirectory {
    pub fn new() -> Self {
        Self {
            pages: DashMap::new(),
        }
    }

    /// Build a directory from configured pages. Entries with an unparsable
    /// permalink are skipped.
    pub fn from_config(pages: &[PageConfig]) -> Self {
        let directory = Self::new();
        for page in pages {
            match Url::parse(&page.permalink) {
                Ok(permalink) => directory.upsert(Page {
                    id: PageId(page.id),
                    title: page.title.clone(),
                    permalink,
                    status: page.status,
                }),
                Err(e) => {
                    tracing::warn!(page_id = page.id, error = %e, "Skipping page with invalid permalink");
                }
            }
        }
        info!(pages = directory.len(), "Page directory loaded");
        directory
    }

    /// Insert or replace a page. Page id zero is ignored.
    pub fn upsert(&self, page: Page) {
        if page.id.is_unset() {
            return;
        }
        self.pages.insert(page.id, page);
    }

    pub fn get(&self, id: PageId) -> Option<Page> {
        self.pages.get(&id).map(|r| r.value().clone())
    }

    /// Published pages ordered by id, as offered to rule authors.
    pub fn list_published(&self) -> Vec<Page> {
        let mut pages: Vec<Page> = self
            .pages
            .iter()
            .filter(|r| r.value().status == PageStatus::Published)
            .map(|r| r.value().clone())
            .collect();
        pages.sort_by_key(|p| p.id);
        pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl Default for PageDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl PageResolver for PageDirectory {
    fn page_exists(&self, id: PageId) -> bool {
        self.pages
            .get(&id)
            .is_some_and(|p| p.status == PageStatus::Published)
    }

    fn permalink_of(&self, id: PageId) -> Option<Url> {
        self.pages
            .get(&id)
            .filter(|p| p.status == PageStatus::Published)
            .map(|p| p.permalink.clone())
    }
}
