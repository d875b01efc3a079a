use std::cmp::Reverse;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, warn};

pub const DEFAULT_CLEARSKY_BASE: &str = "https://public.api.clearsky.services/api/v1/anon";

#[derive(Debug, Deserialize)]
struct BlocklistItem {
    did: String,
    #[serde(default)]
    blocked_date: String,
}

#[derive(Debug, Default, Deserialize)]
struct BlocklistData {
    #[serde(default)]
    blocklist: Vec<BlocklistItem>,
}

#[derive(Debug, Deserialize)]
struct BlocklistResponse {
    #[serde(default)]
    data: BlocklistData,
}

pub struct BlocklistClient {
    http: Client,
    base_url: String,
}

impl BlocklistClient {
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent.to_string())
            .build()
            .context("blocklist: build http client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Actors blocking `did`, most recent block first. A non-success status
    /// is logged and yields an empty list; transport and decode failures
    /// propagate.
    pub fn fetch_blocked_by_users(&self, did: &str) -> Result<Vec<String>> {
        let url = format!("{}/single-blocklist/{did}", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .context("blocklist: request single-blocklist")?;

        if !response.status().is_success() {
            warn!(status = response.status().as_u16(), "failed to fetch blocked-by users");
            return Ok(Vec::new());
        }

        let body: BlocklistResponse = response
            .json()
            .context("blocklist: decode single-blocklist response")?;
        let mut items = body.data.blocklist;
        items.sort_by_key(|item| Reverse(parse_blocked_date(&item.blocked_date)));
        debug!(did, count = items.len(), "blocked-by users");
        Ok(items.into_iter().map(|item| item.did).collect())
    }
}

fn parse_blocked_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}
