use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;

use kira_refprot::cache::{CacheStore, CachedRetrieval, MemoryCache, search_cache_key};
use kira_refprot::domain::{RetrievalRequest, SequenceMetadata};
use kira_refprot::engine::{
    MetadataPolicy, NotFound, ResultSource, RetrievalOutcome, Retriever, UNKNOWN_STRAIN,
};
use kira_refprot::error::RefProtError;
use kira_refprot::ncbi::{DocSummary, EntrezClient};
use kira_refprot::query::build_queries;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Search(String),
    Fasta(String),
    Summary(String),
}

/// Entrez stand-in: tiers whose term is in `hits` return that uid; every
/// other search returns nothing.
#[derive(Default)]
struct MockEntrez {
    hits: HashMap<String, String>,
    failing_search: Option<String>,
    fasta_fails: bool,
    summary_fails: bool,
    calls: Mutex<Vec<(Call, Instant)>>,
}

impl MockEntrez {
    fn with_hit(term: &str, uid: &str) -> Self {
        let mut hits = HashMap::new();
        hits.insert(term.to_string(), uid.to_string());
        Self {
            hits,
            ..Self::default()
        }
    }

    fn log(&self, call: Call) {
        self.calls.lock().unwrap().push((call, Instant::now()));
    }

    fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(call, _)| call.clone())
            .collect()
    }

    fn searches(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Search(_)))
            .count()
    }
}

impl EntrezClient for MockEntrez {
    fn search(&self, term: &str, retmax: usize) -> Result<Vec<String>, RefProtError> {
        assert_eq!(retmax, 1);
        self.log(Call::Search(term.to_string()));
        if self.failing_search.as_deref() == Some(term) {
            return Err(RefProtError::EntrezStatus {
                status: 500,
                message: "backend failure".to_string(),
            });
        }
        Ok(self.hits.get(term).cloned().into_iter().collect())
    }

    fn fetch_fasta(&self, uid: &str) -> Result<String, RefProtError> {
        self.log(Call::Fasta(uid.to_string()));
        if self.fasta_fails {
            return Err(RefProtError::EntrezHttp("connection reset".to_string()));
        }
        Ok(format!(">WP_{uid}.1 efflux protein\nMNKNRG\nFTPLAV\n"))
    }

    fn fetch_summary(&self, uid: &str) -> Result<DocSummary, RefProtError> {
        self.log(Call::Summary(uid.to_string()));
        if self.summary_fails {
            return Err(RefProtError::EntrezParse("truncated response".to_string()));
        }
        Ok(DocSummary {
            caption: Some("K-12 substr. MG1655".to_string()),
            title: Some(format!("protein {uid}")),
            organism: Some("Escherichia coli str. K-12".to_string()),
        })
    }
}

struct FailingCache;

impl CacheStore for FailingCache {
    fn get(&self, _key: &str) -> Option<serde_json::Value> {
        None
    }

    fn put(&self, _key: &str, _value: serde_json::Value) -> Result<(), RefProtError> {
        Err(RefProtError::Cache("read-only".to_string()))
    }
}

fn request(protein: &str) -> RetrievalRequest {
    RetrievalRequest {
        protein_name: protein.to_string(),
        organism: "ecoli".to_string(),
        assembly_level: None,
        biosample_query: None,
        contact_email: "user@example.com".to_string(),
    }
}

fn tier_term(protein: &str, tier: usize) -> String {
    build_queries(&request(protein))[tier].term.clone()
}

#[test]
fn first_tier_hit_skips_relaxed_tiers() {
    let entrez = MockEntrez::with_hit(&tier_term("TolC", 0), "12345");
    let retriever = Retriever::new(&entrez, MemoryCache::new()).with_spacing(Duration::ZERO);

    let outcome = retriever.retrieve(&request("TolC"));
    let result = outcome.result().unwrap();
    assert_eq!(result.accession, "WP_12345.1");
    assert_eq!(result.sequence_length, 12);
    assert_eq!(result.source_strain, "K-12 substr. MG1655");
    assert_eq!(result.ncbi_url, "https://www.ncbi.nlm.nih.gov/protein/12345");
    assert!(result.metadata_complete);
    assert_matches!(
        outcome,
        RetrievalOutcome::Found {
            source: ResultSource::Remote { tier: 0 },
            ..
        }
    );
    assert_eq!(
        entrez.calls(),
        vec![
            Call::Search(tier_term("TolC", 0)),
            Call::Fasta("12345".to_string()),
            Call::Summary("12345".to_string()),
        ]
    );
}

#[test]
fn relaxes_until_a_tier_hits() {
    let entrez = MockEntrez::with_hit(&tier_term("AcrZ", 2), "777");
    let retriever = Retriever::new(&entrez, MemoryCache::new()).with_spacing(Duration::ZERO);

    let outcome = retriever.retrieve(&request("AcrZ"));
    assert_matches!(
        outcome,
        RetrievalOutcome::Found {
            source: ResultSource::Remote { tier: 2 },
            ..
        }
    );
    assert_eq!(entrez.searches(), 3);
}

#[test]
fn search_error_falls_through_to_next_tier() {
    let mut entrez = MockEntrez::with_hit(&tier_term("MarA", 1), "555");
    entrez.failing_search = Some(tier_term("MarA", 0));
    let retriever = Retriever::new(&entrez, MemoryCache::new()).with_spacing(Duration::ZERO);

    let outcome = retriever.retrieve(&request("MarA"));
    assert_matches!(
        outcome,
        RetrievalOutcome::Found {
            source: ResultSource::Remote { tier: 1 },
            ..
        }
    );
}

#[test]
fn no_hits_in_any_tier_is_not_found() {
    let entrez = MockEntrez::default();
    let retriever = Retriever::new(&entrez, MemoryCache::new()).with_spacing(Duration::ZERO);

    let outcome = retriever.retrieve(&request("Unknown1"));
    assert_eq!(outcome, RetrievalOutcome::NotFound(NotFound::TiersExhausted));
    assert_eq!(entrez.searches(), 4);
    assert!(
        entrez
            .calls()
            .iter()
            .all(|call| matches!(call, Call::Search(_)))
    );
}

#[test]
fn repeated_request_is_served_from_cache() {
    let entrez = MockEntrez::with_hit(&tier_term("AcrB", 0), "999");
    let cache = MemoryCache::new();
    let retriever = Retriever::new(&entrez, &cache).with_spacing(Duration::ZERO);

    let first = retriever.retrieve(&request("AcrB"));
    let calls_after_first = entrez.calls().len();
    let second = retriever.retrieve(&request("AcrB"));

    assert_eq!(entrez.calls().len(), calls_after_first);
    assert_eq!(cache.len(), 1);
    assert_matches!(
        &second,
        RetrievalOutcome::Found {
            source: ResultSource::Cache { tier: 0 },
            ..
        }
    );
    assert_eq!(first.result(), second.result());
}

#[test]
fn remote_calls_respect_spacing() {
    let entrez = MockEntrez::with_hit(&tier_term("RamA", 1), "31");
    let spacing = Duration::from_millis(40);
    let retriever = Retriever::new(&entrez, MemoryCache::new()).with_spacing(spacing);

    retriever.retrieve(&request("RamA"));
    let calls = entrez.calls.lock().unwrap();
    assert_eq!(calls.len(), 4);
    for pair in calls.windows(2) {
        assert!(pair[1].1.duration_since(pair[0].1) >= spacing);
    }
}

#[test]
fn strict_policy_discards_candidate_without_metadata() {
    let mut entrez = MockEntrez::with_hit(&tier_term("SoxS", 0), "42");
    entrez.summary_fails = true;
    let cache = MemoryCache::new();
    let retriever = Retriever::new(&entrez, &cache)
        .with_spacing(Duration::ZERO)
        .with_policy(MetadataPolicy::Strict);

    let outcome = retriever.retrieve(&request("SoxS"));
    assert_matches!(
        outcome,
        RetrievalOutcome::NotFound(NotFound::MetadataUnavailable { ref uid, .. }) if uid == "42"
    );
    assert!(cache.is_empty());
}

#[test]
fn degrade_policy_keeps_sequence_uncached() {
    let mut entrez = MockEntrez::with_hit(&tier_term("SoxS", 0), "42");
    entrez.summary_fails = true;
    let cache = MemoryCache::new();
    let retriever = Retriever::new(&entrez, &cache).with_spacing(Duration::ZERO);
    assert_eq!(retriever.policy(), MetadataPolicy::Degrade);

    let outcome = retriever.retrieve(&request("SoxS"));
    let result = outcome.result().unwrap();
    assert_eq!(result.accession, "WP_42.1");
    assert_eq!(result.source_strain, UNKNOWN_STRAIN);
    assert_eq!(result.organism_label, "Escherichia coli");
    assert!(!result.metadata_complete);
    assert!(cache.is_empty());
}

#[test]
fn sequence_fetch_failure_is_not_found() {
    let mut entrez = MockEntrez::with_hit(&tier_term("Rob", 0), "8");
    entrez.fasta_fails = true;
    let retriever = Retriever::new(&entrez, MemoryCache::new()).with_spacing(Duration::ZERO);

    let outcome = retriever.retrieve(&request("Rob"));
    assert_matches!(
        outcome,
        RetrievalOutcome::NotFound(NotFound::SequenceUnavailable { .. })
    );
    assert_eq!(entrez.searches(), 1);
}

#[test]
fn cache_write_failure_still_returns_result() {
    let entrez = MockEntrez::with_hit(&tier_term("EnvR", 0), "64");
    let retriever = Retriever::new(&entrez, FailingCache).with_spacing(Duration::ZERO);

    let outcome = retriever.retrieve(&request("EnvR"));
    assert_eq!(outcome.result().unwrap().accession, "WP_64.1");
}

#[test]
fn repeated_request_after_relaxed_hit_skips_all_searches() {
    let entrez = MockEntrez::with_hit(&tier_term("AcrD", 2), "303");
    let cache = MemoryCache::new();
    let retriever = Retriever::new(&entrez, &cache).with_spacing(Duration::ZERO);

    let first = retriever.retrieve(&request("AcrD"));
    assert_eq!(entrez.searches(), 3);
    let calls_after_first = entrez.calls().len();

    let second = retriever.retrieve(&request("AcrD"));
    assert_eq!(entrez.searches(), 3);
    assert_eq!(entrez.calls().len(), calls_after_first);
    assert_matches!(
        &second,
        RetrievalOutcome::Found {
            source: ResultSource::Cache { tier: 2 },
            ..
        }
    );
    assert_eq!(first.result(), second.result());
}

#[test]
fn strictest_cached_tier_wins() {
    let cache = MemoryCache::new();
    for (tier, accession) in [(3, "WP_3.1"), (1, "WP_1.1")] {
        let cached = CachedRetrieval {
            accession: accession.to_string(),
            fasta: format!(">{accession} efflux protein\nMNK\n"),
            metadata: SequenceMetadata::default(),
        };
        cache
            .put(&search_cache_key(&tier_term("AcrE", tier)), cached.to_value().unwrap())
            .unwrap();
    }
    let entrez = MockEntrez::default();
    let retriever = Retriever::new(&entrez, &cache).with_spacing(Duration::ZERO);

    let outcome = retriever.retrieve(&request("AcrE"));
    assert_eq!(outcome.result().unwrap().accession, "WP_1.1");
    assert_matches!(
        outcome,
        RetrievalOutcome::Found {
            source: ResultSource::Cache { tier: 1 },
            ..
        }
    );
    assert!(entrez.calls().is_empty());
}
