use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::blocklist::BlocklistClient;
use crate::cache::MemoryCache;
use crate::config::{self, Config};
use crate::data::{FeedDescriptor, FeedPreferences, FeedServices};
use crate::moderation::{
    filter_blocked_by_causes, is_blocked_by_user, is_blocked_or_blocking, is_blocking_user, is_muted,
    ModerationUi,
};
use crate::session::FeedSession;
use crate::slice::{FeedSlice, SliceItem};
use crate::types::{AuthorFeedFilter, PostView};
use crate::xrpc::{AuthorFeedApi, ClientConfig, PublicClient, StaticToken, XrpcClient, MAX_POSTS_PER_REQUEST};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Author {
        actor: String,
        filter: Option<AuthorFeedFilter>,
        limit: Option<usize>,
        pages: usize,
        hide_reposts: bool,
    },
    BlockedBy {
        did: String,
        limit: Option<usize>,
        pages: usize,
    },
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config_file: Option<PathBuf>,
    pub hide_reposts_from: Vec<String>,
    pub command: Command,
}

pub fn run(options: RunOptions) -> Result<()> {
    let cfg = config::load(config::LoadOptions {
        config_file: options.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;
    let (services, public) = build_services(&cfg)?;
    let hidden_reposters: HashSet<String> = cfg
        .preferences
        .hidden_reposts
        .iter()
        .chain(&options.hide_reposts_from)
        .cloned()
        .collect();
    let printer = FeedPrinter {
        services: &services,
        public: public.as_ref(),
        hidden_reposters,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match options.command {
        Command::Author {
            actor,
            filter,
            limit,
            pages,
            hide_reposts,
        } => {
            let descriptor = FeedDescriptor::Author { actor, filter };
            printer.print(&descriptor, hide_reposts, pages, limit, &mut out)
        }
        Command::BlockedBy { did, limit, pages } => {
            let blocklist = BlocklistClient::new(
                &cfg.blocklist.base_url,
                &cfg.service.user_agent,
                cfg.service.timeout,
            )?;
            let mut actors = blocklist
                .fetch_blocked_by_users(&did)
                .with_context(|| format!("fetch accounts blocking {did}"))?;
            if let Some(limit) = limit {
                actors.truncate(limit);
            }
            info!(did = %did, actors = actors.len(), "merging feeds of blocking accounts");
            if actors.is_empty() {
                writeln!(out, "no accounts block {did}")?;
                return Ok(());
            }
            let descriptor = FeedDescriptor::BlockedBy { actors };
            printer.print(&descriptor, false, pages, None, &mut out)
        }
    }
}

fn build_services(cfg: &Config) -> Result<(FeedServices, Arc<PublicClient>)> {
    let user_agent = if cfg.service.user_agent.trim().is_empty() {
        format!("feedmux/{}", crate::VERSION)
    } else {
        cfg.service.user_agent.clone()
    };

    let public = Arc::new(
        PublicClient::new(ClientConfig {
            user_agent: user_agent.clone(),
            base_url: Some(cfg.public_api.base_url.clone()),
            labelers: cfg.public_api.labelers.clone(),
            timeout: Some(cfg.service.timeout),
            http_client: None,
        })
        .context("create public client")?,
    );
    let public_api: Arc<dyn AuthorFeedApi> = public.clone();

    let agent: Arc<dyn AuthorFeedApi> = match config::access_token() {
        Some(token) => Arc::new(
            XrpcClient::new(
                Arc::new(StaticToken(token)),
                ClientConfig {
                    user_agent,
                    base_url: Some(cfg.service.url.clone()),
                    labelers: Vec::new(),
                    timeout: Some(cfg.service.timeout),
                    http_client: None,
                },
            )
            .context("create authenticated client")?,
        ),
        None => {
            info!("{} not set, reading through the public endpoint", config::ACCESS_TOKEN_ENV);
            public_api.clone()
        }
    };

    Ok((FeedServices::new(agent, public_api), public))
}

struct FeedPrinter<'a> {
    services: &'a FeedServices,
    public: &'a PublicClient,
    hidden_reposters: HashSet<String>,
}

impl FeedPrinter<'_> {
    fn print(
        &self,
        descriptor: &FeedDescriptor,
        hide_reposts: bool,
        pages: usize,
        limit: Option<usize>,
        out: &mut impl Write,
    ) -> Result<()> {
        let prefs = FeedPreferences {
            hide_reposts,
            hidden_reposters: self.hidden_reposters.clone(),
        };
        let session = FeedSession::new(
            self.services.build_source(descriptor),
            descriptor.query_key(),
            Arc::new(MemoryCache::new()),
            descriptor.tuner(&prefs),
        );

        let mut remaining = limit.unwrap_or(usize::MAX);
        for _ in 0..pages.max(1) {
            let Some(slices) = session.fetch_next_page()? else {
                break;
            };
            let shown = &slices[..slices.len().min(remaining)];
            let parents = hydrate_blocked_parents(self.public, shown);
            for slice in shown {
                write!(out, "{}", format_slice(slice, &parents))?;
            }
            remaining -= shown.len();
            if remaining == 0 {
                break;
            }
        }
        out.flush()?;
        Ok(())
    }
}

pub fn hydrate_blocked_parents(public: &PublicClient, slices: &[FeedSlice]) -> HashMap<String, PostView> {
    let mut uris: Vec<String> = Vec::new();
    for item in slices.iter().flat_map(|slice| &slice.items) {
        if let Some(uri) = item.parent_uri.as_ref().filter(|_| item.is_parent_blocked) {
            if !uris.contains(uri) {
                uris.push(uri.clone());
            }
        }
    }
    uris.chunks(MAX_POSTS_PER_REQUEST)
        .filter_map(|chunk| public.fetch_posts(chunk))
        .flatten()
        .map(|post| (post.uri.clone(), post))
        .collect()
}

pub fn format_slice(slice: &FeedSlice, parents: &HashMap<String, PostView>) -> String {
    let mut text = String::new();
    if let Some(by) = slice.reposted_by() {
        text.push_str(&format!("~ reposted by {by}\n"));
    } else if slice.is_pin() {
        text.push_str("~ pinned\n");
    }
    let last = slice.items.len() - 1;
    for (idx, item) in slice.items.iter().enumerate() {
        if idx > 0 && idx == last && slice.is_incomplete_thread {
            text.push_str("  ...\n");
        }
        text.push_str(&format_item(item, idx > 0, parents));
    }
    text.push('\n');
    text
}

fn format_item(item: &SliceItem, nested: bool, parents: &HashMap<String, PostView>) -> String {
    let indent = if nested { "  " } else { "" };
    let author = &item.post.author;
    let name = if author.handle.is_empty() { &author.did } else { &author.handle };
    let mut text = format!(
        "{indent}@{name} {}\n",
        item.post.indexed_at.format("%Y-%m-%d %H:%M")
    );
    let hydrated = item.parent_uri.as_ref().and_then(|uri| parents.get(uri));
    if let (true, Some(parent)) = (item.is_parent_blocked, hydrated) {
        let first_line = parent.record_text().lines().next().unwrap_or_default().to_string();
        text.push_str(&format!(
            "{indent}  (reply to a blocked post by @{}: {first_line})\n",
            parent.author.handle
        ));
    } else if item.is_parent_blocked {
        let who = item.parent_did.as_deref().unwrap_or("unknown");
        text.push_str(&format!("{indent}  (reply to a blocked post by {who})\n"));
    } else if item.is_parent_not_found {
        text.push_str(&format!("{indent}  (reply to a deleted post)\n"));
    } else if let Some(parent) = item.parent_author.as_ref() {
        if is_blocked_or_blocking(parent) {
            text.push_str(&format!("{indent}  (reply to a blocked account)\n"));
        } else {
            text.push_str(&format!("{indent}  (reply to @{})\n", parent.handle));
        }
    }

    let decision = ModerationUi::for_author(author);
    let shown = filter_blocked_by_causes(&decision);
    if shown.filter() {
        let why = if is_blocking_user(author) {
            "you block this account"
        } else if is_muted(author) {
            "muted"
        } else {
            "moderation"
        };
        text.push_str(&format!("{indent}  [hidden: {why}]\n"));
        return text;
    }
    if is_blocked_by_user(author) {
        text.push_str(&format!("{indent}  [this account blocks you]\n"));
    }
    for line in item.post.record_text().lines() {
        text.push_str(&format!("{indent}  {line}\n"));
    }
    text
}
