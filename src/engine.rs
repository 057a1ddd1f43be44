//! Per-protein retrieval: tiered search, candidate fetch, metadata, cache.
//!
//! Each protein walks `Lookup -> Searching(tier) -> Found -> Fetching -> Done`.
//! `Lookup` checks the cache key of every tier, strictest first, before
//! any remote call; a fresh entry goes straight to `Done`. An exhausted
//! tier list or a failed sequence fetch ends in `NotFound`.

use std::fmt;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStore, CachedRetrieval, search_cache_key};
use crate::domain::{RetrievalRequest, RetrievalResult, SequenceMetadata, protein_url};
use crate::error::RefProtError;
use crate::fasta::FastaRecord;
use crate::ncbi::{DocSummary, EntrezClient};
use crate::presets::canonical_organism;
use crate::query::{SearchQuery, build_queries};

/// Minimum gap between two E-utilities calls.
pub const REQUEST_SPACING: Duration = Duration::from_millis(350);

/// Only the top-ranked hit of a tier is ever used.
pub const SEARCH_RETMAX: usize = 1;

pub const UNKNOWN_STRAIN: &str = "N/A";

/// What to do when the summary fetch fails after the sequence arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MetadataPolicy {
    /// Keep the sequence with default metadata; the result is not cached.
    #[default]
    Degrade,
    /// Discard the candidate and report the protein as not found.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultSource {
    Cache { tier: usize },
    Remote { tier: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotFound {
    TiersExhausted,
    SequenceUnavailable { uid: String, message: String },
    MetadataUnavailable { uid: String, message: String },
}

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFound::TiersExhausted => write!(f, "no hit in any query tier"),
            NotFound::SequenceUnavailable { uid, message } => {
                write!(f, "sequence fetch for {uid} failed: {message}")
            }
            NotFound::MetadataUnavailable { uid, message } => {
                write!(f, "summary fetch for {uid} failed: {message}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalOutcome {
    Found {
        result: RetrievalResult,
        source: ResultSource,
    },
    NotFound(NotFound),
}

impl RetrievalOutcome {
    pub fn result(&self) -> Option<&RetrievalResult> {
        match self {
            RetrievalOutcome::Found { result, .. } => Some(result),
            RetrievalOutcome::NotFound(_) => None,
        }
    }
}

/// Top-ranked identifier of the first tier that produced a hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub tier: usize,
    pub uid: String,
    pub cache_key: String,
}

enum RetrievalState {
    Lookup,
    Searching {
        tier: usize,
    },
    Found(Candidate),
    Fetching {
        candidate: Candidate,
        fasta: String,
        record: FastaRecord,
    },
    Done(RetrievalOutcome),
}

/// Serializes remote calls so consecutive calls are at least `spacing`
/// apart, measured from the end of one call to the start of the next.
#[derive(Debug)]
pub struct Throttle {
    spacing: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last_call: Mutex::new(None),
        }
    }

    pub fn call<T>(&self, remote: impl FnOnce() -> T) -> T {
        let mut last_call = self
            .last_call
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.spacing {
                thread::sleep(self.spacing - elapsed);
            }
        }
        let output = remote();
        *last_call = Some(Instant::now());
        output
    }
}

pub struct Retriever<E: EntrezClient, S: CacheStore> {
    entrez: E,
    cache: S,
    throttle: Throttle,
    policy: MetadataPolicy,
}

impl<E: EntrezClient, S: CacheStore> Retriever<E, S> {
    pub fn new(entrez: E, cache: S) -> Self {
        Self {
            entrez,
            cache,
            throttle: Throttle::new(REQUEST_SPACING),
            policy: MetadataPolicy::default(),
        }
    }

    pub fn with_spacing(mut self, spacing: Duration) -> Self {
        self.throttle = Throttle::new(spacing);
        self
    }

    pub fn with_policy(mut self, policy: MetadataPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> MetadataPolicy {
        self.policy
    }

    pub fn retrieve(&self, request: &RetrievalRequest) -> RetrievalOutcome {
        let queries = build_queries(request);
        info!(protein = %request.protein_name, "constructed {} query tiers", queries.len());
        for query in &queries {
            debug!(protein = %request.protein_name, tier = query.tier, term = %query.term);
        }

        let mut state = RetrievalState::Lookup;
        loop {
            state = match state {
                RetrievalState::Lookup => self.lookup(request, &queries),
                RetrievalState::Searching { tier } => self.search(request, &queries, tier),
                RetrievalState::Found(candidate) => self.fetch_sequence(request, candidate),
                RetrievalState::Fetching {
                    candidate,
                    fasta,
                    record,
                } => self.fetch_metadata(request, candidate, fasta, record),
                RetrievalState::Done(outcome) => return outcome,
            };
        }
    }

    // A run that hit at a relaxed tier must not re-search the stricter
    // tiers on the next run, so every tier key is consulted up front.
    fn lookup(&self, request: &RetrievalRequest, queries: &[SearchQuery]) -> RetrievalState {
        for query in queries {
            let cache_key = search_cache_key(&query.term);
            if let Some(result) = self.cached(request, &cache_key) {
                info!(protein = %request.protein_name, tier = query.tier, key = %cache_key, "using cached result");
                return RetrievalState::Done(RetrievalOutcome::Found {
                    result,
                    source: ResultSource::Cache { tier: query.tier },
                });
            }
        }
        debug!(protein = %request.protein_name, "no cached result for any tier");
        RetrievalState::Searching { tier: 0 }
    }

    fn search(
        &self,
        request: &RetrievalRequest,
        queries: &[SearchQuery],
        tier: usize,
    ) -> RetrievalState {
        let protein = request.protein_name.as_str();
        let Some(query) = queries.get(tier) else {
            warn!(protein, "all search tiers exhausted, no entry found");
            return RetrievalState::Done(RetrievalOutcome::NotFound(NotFound::TiersExhausted));
        };

        let cache_key = search_cache_key(&query.term);
        info!(protein, tier, "searching NCBI protein");
        match self
            .throttle
            .call(|| self.entrez.search(&query.term, SEARCH_RETMAX))
        {
            Ok(ids) => match ids.into_iter().next() {
                Some(uid) => {
                    info!(protein, tier, uid = %uid, "found candidate");
                    RetrievalState::Found(Candidate {
                        tier,
                        uid,
                        cache_key,
                    })
                }
                None => {
                    info!(protein, tier, "no hits, relaxing query");
                    RetrievalState::Searching { tier: tier + 1 }
                }
            },
            Err(err) => {
                error!(protein, tier, error = %err, "search attempt failed");
                RetrievalState::Searching { tier: tier + 1 }
            }
        }
    }

    fn fetch_sequence(&self, request: &RetrievalRequest, candidate: Candidate) -> RetrievalState {
        let protein = request.protein_name.as_str();
        let fetched = self
            .throttle
            .call(|| self.entrez.fetch_fasta(&candidate.uid))
            .and_then(|fasta| FastaRecord::parse(&fasta).map(|record| (fasta, record)));
        match fetched {
            Ok((fasta, record)) => RetrievalState::Fetching {
                candidate,
                fasta,
                record,
            },
            Err(err) => {
                error!(protein, uid = %candidate.uid, error = %err, "found candidate but failed to fetch its sequence");
                RetrievalState::Done(RetrievalOutcome::NotFound(NotFound::SequenceUnavailable {
                    uid: candidate.uid,
                    message: err.to_string(),
                }))
            }
        }
    }

    fn fetch_metadata(
        &self,
        request: &RetrievalRequest,
        candidate: Candidate,
        fasta: String,
        record: FastaRecord,
    ) -> RetrievalState {
        let protein = request.protein_name.as_str();
        let summary = match self
            .throttle
            .call(|| self.entrez.fetch_summary(&candidate.uid))
        {
            Ok(summary) => summary,
            Err(err) => return self.metadata_failed(request, candidate, fasta, record, err),
        };

        let result = build_result(request, &candidate.uid, fasta, &record, Some(&summary));
        info!(protein, accession = %result.accession, tier = candidate.tier, "retrieved");

        let cached = CachedRetrieval {
            accession: result.accession.clone(),
            fasta: result.raw_sequence_record.clone(),
            metadata: result.metadata(),
        };
        if let Err(err) = cached
            .to_value()
            .and_then(|value| self.cache.put(&candidate.cache_key, value))
        {
            warn!(protein, error = %err, "failed to cache result, continuing uncached");
        }

        RetrievalState::Done(RetrievalOutcome::Found {
            result,
            source: ResultSource::Remote {
                tier: candidate.tier,
            },
        })
    }

    fn metadata_failed(
        &self,
        request: &RetrievalRequest,
        candidate: Candidate,
        fasta: String,
        record: FastaRecord,
        err: RefProtError,
    ) -> RetrievalState {
        let protein = request.protein_name.as_str();
        match self.policy {
            MetadataPolicy::Strict => {
                error!(protein, uid = %candidate.uid, error = %err, "summary fetch failed, discarding candidate");
                RetrievalState::Done(RetrievalOutcome::NotFound(NotFound::MetadataUnavailable {
                    uid: candidate.uid,
                    message: err.to_string(),
                }))
            }
            MetadataPolicy::Degrade => {
                warn!(protein, uid = %candidate.uid, error = %err, "summary fetch failed, keeping sequence with default metadata");
                let result = build_result(request, &candidate.uid, fasta, &record, None);
                RetrievalState::Done(RetrievalOutcome::Found {
                    result,
                    source: ResultSource::Remote {
                        tier: candidate.tier,
                    },
                })
            }
        }
    }

    fn cached(&self, request: &RetrievalRequest, key: &str) -> Option<RetrievalResult> {
        let value = self.cache.get(key)?;
        match CachedRetrieval::from_value(value) {
            Some(cached) => Some(result_from_cache(request, cached)),
            None => {
                warn!(key, "ignoring cache entry with unknown layout");
                None
            }
        }
    }
}

fn build_result(
    request: &RetrievalRequest,
    uid: &str,
    fasta: String,
    record: &FastaRecord,
    summary: Option<&DocSummary>,
) -> RetrievalResult {
    let organism = canonical_organism(&request.organism);
    RetrievalResult {
        protein_name: request.protein_name.clone(),
        accession: record.id.clone(),
        raw_sequence_record: fasta,
        sequence_length: record.len(),
        source_strain: summary
            .and_then(|summary| summary.caption.clone())
            .unwrap_or_else(|| UNKNOWN_STRAIN.to_string()),
        ncbi_url: protein_url(uid),
        title: summary
            .and_then(|summary| summary.title.clone())
            .unwrap_or_default(),
        organism_label: summary
            .and_then(|summary| summary.organism.clone())
            .unwrap_or(organism),
        metadata_complete: summary.is_some(),
    }
}

fn result_from_cache(request: &RetrievalRequest, cached: CachedRetrieval) -> RetrievalResult {
    let CachedRetrieval {
        accession,
        fasta,
        metadata,
    } = cached;
    let metadata_complete = metadata != SequenceMetadata::default();
    let sequence_length = metadata.protein_length.unwrap_or_else(|| {
        FastaRecord::parse(&fasta)
            .map(|record| record.len())
            .unwrap_or(0)
    });
    RetrievalResult {
        protein_name: request.protein_name.clone(),
        ncbi_url: metadata
            .ncbi_url
            .unwrap_or_else(|| protein_url(&accession)),
        accession,
        raw_sequence_record: fasta,
        sequence_length,
        source_strain: metadata
            .source_strain
            .unwrap_or_else(|| UNKNOWN_STRAIN.to_string()),
        title: metadata.title.unwrap_or_default(),
        organism_label: metadata
            .organism
            .unwrap_or_else(|| canonical_organism(&request.organism)),
        metadata_complete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_spaces_consecutive_calls() {
        let throttle = Throttle::new(Duration::from_millis(30));
        let first_end = throttle.call(Instant::now);
        let second_start = throttle.call(Instant::now);
        assert!(second_start.duration_since(first_end) >= Duration::from_millis(30));
    }

    #[test]
    fn first_call_is_not_delayed() {
        let throttle = Throttle::new(Duration::from_secs(5));
        let start = Instant::now();
        throttle.call(|| ());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn cached_legacy_entry_without_metadata_falls_back() {
        let request = RetrievalRequest {
            protein_name: "OqxA".to_string(),
            organism: "klebsiella".to_string(),
            assembly_level: None,
            biosample_query: None,
            contact_email: "user@example.com".to_string(),
        };
        let cached = CachedRetrieval {
            accession: "WP_002914169.1".to_string(),
            fasta: ">WP_002914169.1 OqxA\nMSLQ\n".to_string(),
            metadata: SequenceMetadata::default(),
        };
        let result = result_from_cache(&request, cached);
        assert_eq!(result.sequence_length, 4);
        assert_eq!(result.source_strain, UNKNOWN_STRAIN);
        assert_eq!(result.organism_label, "Klebsiella pneumoniae");
        assert!(!result.metadata_complete);
    }
}
