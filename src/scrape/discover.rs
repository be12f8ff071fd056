use std::collections::{HashSet, VecDeque};

use anyhow::{Context, Result, anyhow};
use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use super::fetch::PageSource;

/// Collect every question-page link on the category index. Each one is the
/// seed of an independent category walk.
pub fn category_seed_urls(document: &Html, index_url: &str) -> Result<Vec<String>> {
    let anchors = Selector::parse("a[href]").map_err(|err| anyhow!("invalid selector: {err:?}"))?;
    let base = Url::parse(index_url)
        .with_context(|| format!("failed to parse index url: {index_url}"))?;

    let mut seeds = Vec::new();
    for anchor in document.select(&anchors) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !href.contains("/question/") {
            continue;
        }
        if let Ok(resolved) = base.join(href) {
            seeds.push(resolved.to_string());
        }
    }

    Ok(seeds)
}

/// Find the link whose visible text equals "next" (case-insensitive,
/// trimmed), resolved against the current page URL.
pub fn next_link(document: &Html, page_url: &str) -> Option<String> {
    let anchors = Selector::parse("a[href]").ok()?;
    let base = Url::parse(page_url).ok()?;

    for anchor in document.select(&anchors) {
        let text = anchor.text().collect::<String>();
        if !text.trim().eq_ignore_ascii_case("next") {
            continue;
        }
        let href = anchor.value().attr("href")?;
        return base.join(href).ok().map(|url| url.to_string());
    }

    None
}

/// Lazy, finite sequence of every question URL reachable from the category
/// index. Not restartable: re-invoke `question_urls` to walk again.
pub struct QuestionUrls<'a, P: PageSource> {
    source: &'a P,
    seeds: VecDeque<String>,
    current: Option<String>,
    visited: HashSet<String>,
}

/// Fetch the category index and prepare the walk. An unreachable index is
/// fatal here; failures on individual question pages are not.
pub fn question_urls<'a, P: PageSource>(
    source: &'a P,
    index_url: &str,
) -> Result<QuestionUrls<'a, P>> {
    let index = source
        .page(index_url)
        .with_context(|| format!("failed to fetch category index: {index_url}"))?;
    let seeds = category_seed_urls(&index, index_url)?;

    info!(seed_count = seeds.len(), "collected category seeds");

    Ok(QuestionUrls {
        source,
        seeds: seeds.into(),
        current: None,
        visited: HashSet::new(),
    })
}

impl<P: PageSource> Iterator for QuestionUrls<'_, P> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if let Some(url) = self.current.take() {
                self.visited.insert(url.clone());
                self.advance(&url);
                return Some(url);
            }

            // Start the next category. The visited set is per-walk: the same
            // URL may legitimately reappear in a different category's chain.
            let seed = self.seeds.pop_front()?;
            self.visited.clear();
            self.current = Some(seed);
        }
    }
}

impl<P: PageSource> QuestionUrls<'_, P> {
    /// Follow the page's "next" link, ending the walk on a fetch failure, a
    /// missing link, or a cycle back into this walk.
    fn advance(&mut self, url: &str) {
        let document = match self.source.page(url) {
            Ok(document) => document,
            Err(err) => {
                warn!(url = %url, error = %err, "walk ended early: page unreachable");
                return;
            }
        };

        match next_link(&document, url) {
            Some(next) if !self.visited.contains(&next) => {
                self.current = Some(next);
            }
            Some(next) => {
                debug!(url = %next, "next link already visited in this walk");
            }
            None => {}
        }
    }
}
