//! Offline fuzzy search over an in-memory catalog.
//!
//! A [`LocalSearch`] is built once per catalog snapshot. Each record
//! contributes a set of normalized fields (its names and aliases) with
//! precomputed trigram profiles; queries fan out over the records on the
//! rayon pool.
//!
//! A record matches when any field contains the normalized query, or when
//! the best field similarity exceeds the threshold. Matches are ordered by
//! similarity, ties kept in catalog order, and capped at the result limit.

pub mod normalize;
pub mod qgram;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

pub use normalize::normalize;
pub use qgram::{QGramProfile, similarity};

pub const DEFAULT_MIN_SIMILARITY: f32 = 0.5;
pub const DEFAULT_RESULT_LIMIT: usize = 20;

/// The caller abandoned the search before it finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("search cancelled")]
pub struct Cancelled;

impl From<Cancelled> for metacache_core::Error {
    fn from(_: Cancelled) -> Self {
        metacache_core::Error::Cancelled
    }
}

/// Cooperative cancellation shared between a caller and a running search.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Sets the flag when dropped.
struct CancelOnDrop(CancelFlag);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// A ranked match.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored<R> {
    pub record: R,
    /// Best field similarity in `[0, 1]`.
    pub score: f32,
}

#[derive(Debug, Clone)]
struct Field {
    text: String,
    profile: QGramProfile,
}

#[derive(Debug, Clone)]
pub struct LocalSearch<T> {
    records: Vec<T>,
    fields: Vec<Vec<Field>>,
    min_similarity: f32,
    result_limit: usize,
}

impl<T: Send + Sync> LocalSearch<T> {
    /// Index `records`, taking candidate texts from `extract`.
    ///
    /// Fields are normalized and de-duplicated per record; fields that
    /// normalize to nothing are dropped.
    pub fn build<F, I, S>(records: impl IntoIterator<Item = T>, extract: F) -> Self
    where
        F: Fn(&T) -> I + Sync,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let records: Vec<T> = records.into_iter().collect();
        let fields = records
            .par_iter()
            .map(|record| {
                let mut texts: Vec<String> = extract(record)
                    .into_iter()
                    .map(|s| normalize(s.as_ref()))
                    .filter(|s| !s.is_empty())
                    .collect();
                texts.sort_unstable();
                texts.dedup();
                texts
                    .into_iter()
                    .map(|text| Field { profile: QGramProfile::new(&text), text })
                    .collect()
            })
            .collect();

        Self { records, fields, min_similarity: DEFAULT_MIN_SIMILARITY, result_limit: DEFAULT_RESULT_LIMIT }
    }

    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    pub fn with_result_limit(mut self, result_limit: usize) -> Self {
        self.result_limit = result_limit;
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    /// Matching records, best first.
    pub fn search(&self, query: &str) -> Vec<&T> {
        self.search_scored(query)
            .into_iter()
            .map(|hit| hit.record)
            .collect()
    }

    pub fn search_scored(&self, query: &str) -> Vec<Scored<&T>> {
        // a fresh flag is never set
        self.search_cancellable(query, &CancelFlag::new())
            .unwrap_or_default()
    }

    /// Like [`search_scored`](Self::search_scored), but gives up with
    /// [`Cancelled`] as soon as `cancel` is set. A cancelled search never
    /// returns a partial list.
    pub fn search_cancellable(&self, query: &str, cancel: &CancelFlag) -> Result<Vec<Scored<&T>>, Cancelled> {
        let query = normalize(query);
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let profile = QGramProfile::new(&query);

        let scores: Vec<Option<f32>> = self
            .fields
            .par_iter()
            .map(|fields| {
                if cancel.is_cancelled() {
                    return Err(Cancelled);
                }
                Ok(self.score(fields, &query, &profile))
            })
            .collect::<Result<_, _>>()?;

        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let mut hits: Vec<Scored<&T>> = scores
            .into_iter()
            .zip(&self.records)
            .filter_map(|(score, record)| score.map(|score| Scored { record, score }))
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(self.result_limit);
        Ok(hits)
    }

    /// Score one record; `None` when it does not match.
    fn score(&self, fields: &[Field], query: &str, profile: &QGramProfile) -> Option<f32> {
        let contains = fields.iter().any(|f| f.text.contains(query));
        let best = fields
            .iter()
            .map(|f| profile.similarity(&f.profile))
            .fold(0.0f32, f32::max);

        (contains || best > self.min_similarity).then_some(best)
    }
}

impl<T: Clone + Send + Sync + 'static> LocalSearch<T> {
    /// Run a search on the blocking pool. Dropping the returned future
    /// cancels the fan-out.
    pub async fn search_async(self: Arc<Self>, query: String) -> Result<Vec<Scored<T>>, Cancelled> {
        let cancel = CancelFlag::new();
        let _on_drop = CancelOnDrop(cancel.clone());

        let task = tokio::task::spawn_blocking(move || {
            self.search_cancellable(&query, &cancel).map(|hits| {
                hits.into_iter()
                    .map(|hit| Scored { record: hit.record.clone(), score: hit.score })
                    .collect()
            })
        });

        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                tracing::error!("search task panicked");
                std::panic::resume_unwind(e.into_panic())
            }
            Err(_) => Err(Cancelled),
        }
    }
}
