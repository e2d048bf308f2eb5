use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Client;
use reqwest::cookie::Jar;
use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::config::Config;
use crate::error::PoolError;
use crate::messenger::USER_AGENT;
use crate::models::Candidate;

/// Like list under a topic's first post
pub const LIKE_LIST_SELECTOR: &str = "ul.likelist";

/// Group class the forum puts on banned accounts' profile links
const EXCLUDED_GROUP_CLASS: &str = "usergroup-6";

/// Fetches forum pages with the configured session
#[derive(Clone)]
pub struct Scraper {
    client: Client,
}

impl Scraper {
    /// `jar` is the run's session jar, shared with the messenger.
    pub fn new(config: &Config, jar: Arc<Jar>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .cookie_provider(jar)
            .build()?;

        Ok(Self { client })
    }

    pub async fn fetch_page(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Failed to fetch {}: {}",
                url,
                response.status()
            ));
        }

        Ok(response.text().await?)
    }

    /// Candidate pool from a live topic page.
    pub async fn fetch_topic_pool(&self, topic_url: &str) -> Result<Vec<Candidate>> {
        info!("Fetching like list from {}", topic_url);

        let html = self.fetch_page(topic_url).await?;
        let pool = parse_like_list(&html, LIKE_LIST_SELECTOR)?;

        info!("Found {} eligible candidates", pool.len());
        Ok(pool)
    }

    /// CSRF token from the private-message compose page.
    pub async fn fetch_csrf_token(&self, compose_url: &str) -> Result<String> {
        let html = self.fetch_page(compose_url).await?;
        Ok(parse_csrf_token(&html)?)
    }
}

/// Candidate pool from a saved copy of a topic page.
pub fn load_pool_file(path: &Path) -> Result<Vec<Candidate>> {
    let html = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let pool = parse_like_list(&html, LIKE_LIST_SELECTOR)?;

    info!("Found {} eligible candidates in {}", pool.len(), path.display());
    Ok(pool)
}

/// Extracts eligible candidates from a like list.
///
/// Anchors in the excluded group, anchors without a positive `id=` in their
/// link and repeated ids are skipped. An absent list is an error; a present
/// but empty one yields an empty pool.
pub fn parse_like_list(html: &str, list_selector: &str) -> Result<Vec<Candidate>, PoolError> {
    let container = parse_selector(list_selector)?;
    let anchor_selector = parse_selector("li a")?;

    let document = Html::parse_document(html);
    let list = document
        .select(&container)
        .next()
        .ok_or_else(|| PoolError::ElementNotFound(list_selector.to_string()))?;

    let mut pool: Vec<Candidate> = Vec::new();

    for anchor in list.select(&anchor_selector) {
        let element = anchor.value();

        if element.classes().any(|class| class == EXCLUDED_GROUP_CLASS) {
            continue;
        }

        let Some(id) = element.attr("href").and_then(user_id_from_href) else {
            continue;
        };

        let username = anchor.text().collect::<String>();
        let Some(candidate) = Candidate::new(&username, id) else {
            continue;
        };

        if pool.iter().any(|c| c.id == candidate.id) {
            debug!(id = candidate.id, "Skipping repeated like");
            continue;
        }

        pool.push(candidate);
    }

    Ok(pool)
}

/// Reads the `csrf_hash` hidden input of the compose form.
pub fn parse_csrf_token(html: &str) -> Result<String, PoolError> {
    let selector = parse_selector(r#"input[name="csrf_hash"]"#)?;
    let document = Html::parse_document(html);

    document
        .select(&selector)
        .next()
        .and_then(|input| input.value().attr("value"))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| PoolError::ElementNotFound("input[name=\"csrf_hash\"]".to_string()))
}

/// User id from a profile link such as `profile.php?id=123`.
pub fn user_id_from_href(href: &str) -> Option<u64> {
    let base = Url::parse("https://forum.invalid/").ok()?;
    let url = base.join(href).ok()?;

    url.query_pairs()
        .find(|(key, _)| key == "id")
        .and_then(|(_, value)| value.parse::<u64>().ok())
        .filter(|id| *id > 0)
}

fn parse_selector(selector: &str) -> Result<Selector, PoolError> {
    Selector::parse(selector).map_err(|e| PoolError::InvalidSelector {
        selector: selector.to_string(),
        reason: format!("{e:?}"),
    })
}
