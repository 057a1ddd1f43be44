use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde_json::Value;

use crate::error::RefProtError;

pub const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
pub const PROTEIN_DB: &str = "protein";
const TOOL_NAME: &str = "kira-refprot";

/// Fields of an esummary document the retrieval uses. NCBI may omit any
/// of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocSummary {
    pub caption: Option<String>,
    pub title: Option<String>,
    pub organism: Option<String>,
}

pub trait EntrezClient: Send + Sync {
    /// Ranked identifiers for `term`, at most `retmax` of them.
    fn search(&self, term: &str, retmax: usize) -> Result<Vec<String>, RefProtError>;
    fn fetch_fasta(&self, uid: &str) -> Result<String, RefProtError>;
    fn fetch_summary(&self, uid: &str) -> Result<DocSummary, RefProtError>;
}

impl<T: EntrezClient + ?Sized> EntrezClient for &T {
    fn search(&self, term: &str, retmax: usize) -> Result<Vec<String>, RefProtError> {
        (**self).search(term, retmax)
    }

    fn fetch_fasta(&self, uid: &str) -> Result<String, RefProtError> {
        (**self).fetch_fasta(uid)
    }

    fn fetch_summary(&self, uid: &str) -> Result<DocSummary, RefProtError> {
        (**self).fetch_summary(uid)
    }
}

#[derive(Clone)]
pub struct EntrezHttpClient {
    client: Client,
    base_url: String,
    email: String,
    api_key: Option<String>,
}

impl EntrezHttpClient {
    pub fn new(email: &str) -> Result<Self, RefProtError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("{TOOL_NAME}/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| RefProtError::EntrezHttp(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| RefProtError::EntrezHttp(err.to_string()))?;

        let api_key = std::env::var("NCBI_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        Ok(Self {
            client,
            base_url: EUTILS_BASE.to_string(),
            email: email.trim().to_string(),
            api_key,
        })
    }

    fn request(&self, endpoint: &str, params: &[(&str, &str)]) -> RequestBuilder {
        let mut request = self
            .client
            .get(format!("{}/{endpoint}", self.base_url))
            .query(params)
            .query(&[("tool", TOOL_NAME), ("email", self.email.as_str())]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("api_key", key.as_str())]);
        }
        request
    }

    fn handle_status(response: Response) -> Result<Response, RefProtError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "NCBI request failed".to_string());
        Err(RefProtError::EntrezStatus { status, message })
    }

    // Back-off never drops below the E-utilities request spacing.
    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, RefProtError>
    where
        F: FnMut() -> RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 350;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Self::handle_status(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(RefProtError::EntrezHttp(err.to_string()));
                }
            }
        }
    }

    fn get_json(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value, RefProtError> {
        let response = self.send_with_retries(|| self.request(endpoint, params))?;
        response
            .json()
            .map_err(|err| RefProtError::EntrezParse(err.to_string()))
    }
}

impl EntrezClient for EntrezHttpClient {
    fn search(&self, term: &str, retmax: usize) -> Result<Vec<String>, RefProtError> {
        let retmax = retmax.to_string();
        let payload = self.get_json(
            "esearch.fcgi",
            &[
                ("db", PROTEIN_DB),
                ("term", term),
                ("retmax", retmax.as_str()),
                ("retmode", "json"),
            ],
        )?;
        parse_search_ids(&payload)
    }

    fn fetch_fasta(&self, uid: &str) -> Result<String, RefProtError> {
        let response = self.send_with_retries(|| {
            self.request(
                "efetch.fcgi",
                &[
                    ("db", PROTEIN_DB),
                    ("id", uid),
                    ("rettype", "fasta"),
                    ("retmode", "text"),
                ],
            )
        })?;
        response
            .text()
            .map_err(|err| RefProtError::EntrezHttp(err.to_string()))
    }

    fn fetch_summary(&self, uid: &str) -> Result<DocSummary, RefProtError> {
        let payload = self.get_json(
            "esummary.fcgi",
            &[("db", PROTEIN_DB), ("id", uid), ("retmode", "json")],
        )?;
        parse_summary(&payload, uid)
    }
}

pub fn parse_search_ids(payload: &Value) -> Result<Vec<String>, RefProtError> {
    let result = payload
        .get("esearchresult")
        .ok_or_else(|| RefProtError::EntrezParse(describe_error(payload, "esearchresult")))?;
    if let Some(error) = result.get("ERROR").and_then(Value::as_str) {
        return Err(RefProtError::EntrezParse(error.to_string()));
    }
    let ids = result["idlist"]
        .as_array()
        .ok_or_else(|| RefProtError::EntrezParse("esearch response without idlist".to_string()))?;
    Ok(ids
        .iter()
        .filter_map(|id| match id {
            Value::String(value) => Some(value.clone()),
            Value::Number(value) => Some(value.to_string()),
            _ => None,
        })
        .collect())
}

pub fn parse_summary(payload: &Value, uid: &str) -> Result<DocSummary, RefProtError> {
    let result = payload
        .get("result")
        .ok_or_else(|| RefProtError::EntrezParse(describe_error(payload, "result")))?;
    let doc = result.get(uid).or_else(|| {
        result["uids"]
            .as_array()
            .and_then(|uids| uids.first())
            .and_then(Value::as_str)
            .and_then(|first| result.get(first))
    });
    let Some(doc) = doc else {
        return Err(RefProtError::EntrezParse(format!(
            "esummary response has no document for {uid}"
        )));
    };
    if let Some(error) = doc.get("error").and_then(Value::as_str) {
        return Err(RefProtError::EntrezParse(error.to_string()));
    }

    Ok(DocSummary {
        caption: non_empty(doc, "caption"),
        title: non_empty(doc, "title"),
        organism: non_empty(doc, "organism"),
    })
}

fn non_empty(doc: &Value, field: &str) -> Option<String> {
    doc.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn describe_error(payload: &Value, expected: &str) -> String {
    payload
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("response missing `{expected}`"))
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(404));
    }

    #[test]
    fn empty_summary_fields_are_absent() {
        let payload = serde_json::json!({
            "result": {
                "uids": ["42"],
                "42": { "caption": "", "title": "  ", "organism": "Escherichia coli" }
            }
        });
        let summary = parse_summary(&payload, "42").unwrap();
        assert_eq!(summary.caption, None);
        assert_eq!(summary.title, None);
        assert_eq!(summary.organism.as_deref(), Some("Escherichia coli"));
    }
}
