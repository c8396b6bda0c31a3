//! AniDB anime title catalog.
//!
//! AniDB publishes every known title as a single dump, one line per title:
//!
//! ```text
//! # comment
//! <aid>|<type>|<language>|<title>
//! ```
//!
//! Types are 1 (primary), 2 (synonym), 3 (short) and 4 (official). The dump
//! has no server-side search, so it is cached and queried through a
//! [`LocalSearch`] snapshot.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use flate2::read::GzDecoder;
use metacache_core::{AppConfig, CacheKey, CacheStore, LogicalKey};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::fetch::RevalidatingFetcher;
use crate::resource::{CachedResource, ResourceDescriptor, ResourceError, ResourceOptions};
use crate::search::{LocalSearch, Scored};

pub const PROVIDER: &str = "anidb";

/// Preferred title types, best first.
const TYPE_ORDER: [u8; 4] = [1, 4, 2, 3];

/// Preferred title languages, best first.
const LANGUAGE_ORDER: [&str; 3] = ["x-jat", "en", "ja"];

const SHORT_TITLE: u8 = 3;

static TITLE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\|(\d)\|([\w-]+)\|(.+)$").expect("valid title line pattern"));

static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("valid entity pattern"));

/// One anime with its names, best name first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleRecord {
    pub id: u32,
    pub name: String,
    pub aliases: Vec<String>,
}

impl TitleRecord {
    /// Primary name followed by all aliases.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Parse a title dump, gzip-compressed or plain.
pub fn parse_titles(bytes: &[u8]) -> Result<Vec<TitleRecord>, ResourceError> {
    let text = if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut raw = Vec::with_capacity(bytes.len() * 4);
        GzDecoder::new(bytes)
            .read_to_end(&mut raw)
            .map_err(|e| ResourceError::Parse(format!("invalid gzip stream: {e}")))?;
        String::from_utf8_lossy(&raw).into_owned()
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    };

    let mut by_anime: BTreeMap<u32, Vec<(usize, usize, String)>> = BTreeMap::new();

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with('#') {
            continue;
        }
        let Some(caps) = TITLE_LINE.captures(line) else {
            continue;
        };

        let Ok(aid) = caps[1].parse::<u32>() else {
            continue;
        };
        let Ok(kind) = caps[2].parse::<u8>() else {
            continue;
        };
        let Some(type_rank) = TYPE_ORDER.iter().position(|t| *t == kind) else {
            continue;
        };
        let Some(lang_rank) = LANGUAGE_ORDER.iter().position(|l| *l == &caps[3]) else {
            continue;
        };
        if aid == 0 {
            continue;
        }

        let title = decode_entities(&caps[4]);
        if title.is_empty() || (kind == SHORT_TITLE && !is_useful_short_title(&title)) {
            continue;
        }

        by_anime
            .entry(aid)
            .or_default()
            .push((type_rank, lang_rank, title));
    }

    let records: Vec<TitleRecord> = by_anime
        .into_iter()
        .filter_map(|(id, mut names)| {
            names.sort();
            let mut names = names.into_iter().map(|(_, _, title)| title);
            let name = names.next()?;
            Some(TitleRecord { id, name, aliases: names.collect() })
        })
        .collect();

    if records.is_empty() {
        return Err(ResourceError::Parse("no titles in catalog".into()));
    }

    tracing::debug!("parsed {} anime titles", records.len());
    Ok(records)
}

/// Short titles are mostly noise; keep those that look like real names.
fn is_useful_short_title(title: &str) -> bool {
    let mut chars = title.chars();
    let first = chars.next();
    let last = chars.next_back();

    title.chars().count() >= 5
        && first.is_some_and(char::is_uppercase)
        && !last.is_some_and(char::is_uppercase)
}

/// Decode HTML character references and collapse whitespace.
fn decode_entities(raw: &str) -> String {
    let decoded = ENTITY.replace_all(raw, |caps: &Captures| {
        let entity = &caps[1];
        let resolved = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
            u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
        } else if let Some(dec) = entity.strip_prefix('#') {
            dec.parse::<u32>().ok().and_then(char::from_u32)
        } else {
            match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => None,
            }
        };
        resolved.map_or_else(|| caps[0].to_string(), String::from)
    });

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The AniDB title dump as a cached resource.
#[derive(Debug, Clone)]
pub struct AnimeTitlesResource {
    locator: String,
}

impl AnimeTitlesResource {
    pub fn new(locator: impl Into<String>) -> Self {
        Self { locator: locator.into() }
    }
}

impl ResourceDescriptor for AnimeTitlesResource {
    type Key = ();
    type Value = Vec<TitleRecord>;

    fn cache_key(&self, _key: &()) -> CacheKey {
        CacheKey::new(PROVIDER, "root", None, LogicalKey::id("anime-titles.dat.gz"))
    }

    fn locator(&self, _key: &()) -> Result<String, ResourceError> {
        Ok(self.locator.clone())
    }

    fn parse(&self, bytes: Bytes) -> Result<Vec<TitleRecord>, ResourceError> {
        parse_titles(&bytes)
    }
}

#[derive(Clone)]
struct Snapshot {
    index: Arc<LocalSearch<TitleRecord>>,
    built_at: Instant,
}

/// Searchable view of the title dump.
///
/// The search index is a snapshot rebuilt wholesale once it is older than
/// the catalog TTL; it is never mutated in place. While one caller rebuilds
/// an expired snapshot, everyone else keeps searching the previous one.
pub struct TitleCatalog {
    resource: CachedResource<AnimeTitlesResource>,
    snapshot: RwLock<Option<Snapshot>>,
    rebuild: Mutex<()>,
    ttl: Duration,
    min_similarity: f32,
    result_limit: usize,
}

impl std::fmt::Debug for TitleCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TitleCatalog")
            .field("ttl", &self.ttl)
            .field("min_similarity", &self.min_similarity)
            .field("result_limit", &self.result_limit)
            .finish_non_exhaustive()
    }
}

impl TitleCatalog {
    pub fn new(resource: CachedResource<AnimeTitlesResource>, min_similarity: f32, result_limit: usize) -> Self {
        let ttl = resource.ttl();
        Self { resource, snapshot: RwLock::new(None), rebuild: Mutex::new(()), ttl, min_similarity, result_limit }
    }

    pub fn from_app_config(
        config: &AppConfig, store: Arc<dyn CacheStore>, fetcher: Arc<dyn RevalidatingFetcher>,
    ) -> Self {
        let resource = CachedResource::new(
            AnimeTitlesResource::new(config.anidb_titles_url.clone()),
            store,
            fetcher,
            ResourceOptions::from_app_config(config, config.catalog_ttl()),
        );
        Self::new(resource, config.search_min_similarity, config.search_result_limit)
    }

    /// Current index, rebuilding it from the cached dump when it has expired.
    pub async fn index(&self) -> Result<Arc<LocalSearch<TitleRecord>>, ResourceError> {
        let current = self.current();
        if let Some(fresh) = self.fresh(current.as_ref()) {
            return Ok(fresh);
        }

        let _rebuild = match &current {
            Some(stale) => match self.rebuild.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    tracing::debug!("title index rebuild in progress, serving previous snapshot");
                    return Ok(Arc::clone(&stale.index));
                }
            },
            None => self.rebuild.lock().await,
        };

        // another caller may have finished a rebuild while we waited
        let current = self.current();
        if let Some(fresh) = self.fresh(current.as_ref()) {
            return Ok(fresh);
        }

        let records = match self.resource.get(()).await {
            Ok(records) => records,
            Err(e) => match current {
                Some(current) => {
                    tracing::warn!("keeping previous title index: {}", e);
                    return Ok(Arc::clone(&current.index));
                }
                None => return Err(e),
            },
        };

        let (min_similarity, result_limit) = (self.min_similarity, self.result_limit);
        let index = tokio::task::spawn_blocking(move || {
            LocalSearch::build(records, |r: &TitleRecord| r.names().map(str::to_string).collect::<Vec<_>>())
                .with_min_similarity(min_similarity)
                .with_result_limit(result_limit)
        })
        .await
        .map_err(|e| ResourceError::Parse(format!("index build failed: {e}")))?;

        tracing::debug!("built title index with {} records", index.len());
        let index = Arc::new(index);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) =
            Some(Snapshot { index: Arc::clone(&index), built_at: Instant::now() });
        Ok(index)
    }

    fn current(&self) -> Option<Snapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn fresh(&self, snapshot: Option<&Snapshot>) -> Option<Arc<LocalSearch<TitleRecord>>> {
        snapshot
            .filter(|s| s.built_at.elapsed() < self.ttl)
            .map(|s| Arc::clone(&s.index))
    }

    /// Ranked titles for a free-text query.
    pub async fn search(&self, query: &str) -> Result<Vec<Scored<TitleRecord>>, metacache_core::Error> {
        let index = self.index().await?;
        Ok(index.search_async(query.to_string()).await?)
    }
}
