use assert_matches::assert_matches;
use serde_json::json;

use kira_refprot::error::RefProtError;
use kira_refprot::ncbi::{parse_search_ids, parse_summary};

#[test]
fn search_ids_in_rank_order() {
    let payload = json!({
        "header": {"type": "esearch", "version": "0.3"},
        "esearchresult": {
            "count": "2",
            "retmax": "2",
            "idlist": ["16128443", "446813436"]
        }
    });
    assert_eq!(
        parse_search_ids(&payload).unwrap(),
        vec!["16128443", "446813436"]
    );
}

#[test]
fn empty_search_is_not_an_error() {
    let payload = json!({"esearchresult": {"count": "0", "idlist": []}});
    assert!(parse_search_ids(&payload).unwrap().is_empty());
}

#[test]
fn search_error_payloads() {
    let payload = json!({"esearchresult": {"ERROR": "Invalid query"}});
    assert_matches!(parse_search_ids(&payload), Err(RefProtError::EntrezParse(msg)) if msg == "Invalid query");

    let payload = json!({"error": "API rate limit exceeded"});
    assert_matches!(
        parse_search_ids(&payload),
        Err(RefProtError::EntrezParse(msg)) if msg.contains("rate limit")
    );
}

#[test]
fn summary_fields() {
    let payload = json!({
        "result": {
            "uids": ["16128443"],
            "16128443": {
                "uid": "16128443",
                "caption": "NP_414995",
                "title": "multidrug efflux pump membrane fusion lipoprotein AcrA [Escherichia coli str. K-12 substr. MG1655]",
                "organism": "Escherichia coli str. K-12 substr. MG1655"
            }
        }
    });
    let summary = parse_summary(&payload, "16128443").unwrap();
    assert_eq!(summary.caption.as_deref(), Some("NP_414995"));
    assert!(summary.title.unwrap().contains("AcrA"));
    assert_eq!(
        summary.organism.as_deref(),
        Some("Escherichia coli str. K-12 substr. MG1655")
    );
}

#[test]
fn summary_falls_back_to_first_uid() {
    let payload = json!({
        "result": {
            "uids": ["99"],
            "99": {"caption": "WP_000001"}
        }
    });
    let summary = parse_summary(&payload, "NP_414995.1").unwrap();
    assert_eq!(summary.caption.as_deref(), Some("WP_000001"));
    assert_eq!(summary.title, None);
}

#[test]
fn summary_document_errors() {
    let payload = json!({"result": {"uids": []}});
    assert_matches!(parse_summary(&payload, "1"), Err(RefProtError::EntrezParse(_)));

    let payload = json!({"result": {"uids": ["1"], "1": {"error": "cannot get document summary"}}});
    assert_matches!(parse_summary(&payload, "1"), Err(RefProtError::EntrezParse(_)));
}
