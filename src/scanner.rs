use anyhow::{Context, Result};
use regex::Regex;

use crate::page::{ElementHandle, Page};
use crate::registry::ItemId;

/// A post found on the page.
#[derive(Debug, Clone)]
pub struct Item {
    pub id: ItemId,
    pub author: String,
    pub element: ElementHandle,
}

/// Finds posts by looking for permalinks inside container elements.
#[derive(Debug, Clone)]
pub struct Scanner {
    container: String,
    permalink: Regex,
}

impl Scanner {
    pub fn new(host: &str, container: &str) -> Result<Self> {
        anyhow::ensure!(!host.trim().is_empty(), "scanner: permalink host is required");
        anyhow::ensure!(
            !container.trim().is_empty(),
            "scanner: container tag is required"
        );
        let pattern = format!(
            r"^https://{}/([a-zA-Z0-9_]+)/status/([0-9]+)/?$",
            regex::escape(host.trim())
        );
        let permalink = Regex::new(&pattern).context("scanner: build permalink pattern")?;
        Ok(Self {
            container: container.trim().to_ascii_lowercase(),
            permalink,
        })
    }

    /// Snapshot of every post currently on the page, in document order.
    ///
    /// When a container holds several permalinks the last one wins.
    pub fn scan(&self, page: &Page) -> Vec<Item> {
        page.select(&self.container)
            .into_iter()
            .filter_map(|container| {
                let mut matched = None;
                for link in container.descendants("a") {
                    let Some(href) = link.attr("href") else {
                        continue;
                    };
                    let Some(url) = page.resolve(&href) else {
                        continue;
                    };
                    if let Some(caps) = self.permalink.captures(url.as_str()) {
                        matched = Some((caps[1].to_string(), caps[2].to_string()));
                    }
                }
                let (author, id) = matched?;
                Some(Item {
                    id: ItemId::new(id),
                    author,
                    element: container.handle(),
                })
            })
            .collect()
    }
}
