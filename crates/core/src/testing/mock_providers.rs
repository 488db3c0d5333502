//! Mock metadata and search providers for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::providers::{
    CitationGraph, LookupError, OaLookup, PdfLocator, RepositorySearch, TitleSearch,
};

/// `LookupError` wraps `reqwest::Error`, which is not `Clone`; HTTP errors
/// are replayed as a 503 API error.
fn replay(error: &LookupError) -> LookupError {
    match error {
        LookupError::Http(e) => LookupError::Api {
            status: 503,
            message: e.to_string(),
        },
        LookupError::RateLimited(m) => LookupError::RateLimited(m.clone()),
        LookupError::Api { status, message } => LookupError::Api {
            status: *status,
            message: message.clone(),
        },
        LookupError::Parse(m) => LookupError::Parse(m.clone()),
        LookupError::NotConfigured(m) => LookupError::NotConfigured(m.clone()),
    }
}

fn replay_result<T: Clone>(result: &Result<T, LookupError>) -> Result<T, LookupError> {
    match result {
        Ok(value) => Ok(value.clone()),
        Err(e) => Err(replay(e)),
    }
}

/// Mock citation graph. Known identifiers are answered from a fixed table.
#[derive(Debug, Default)]
pub struct MockCitationGraph {
    dois: Mutex<HashMap<String, String>>,
    error: Mutex<Option<LookupError>>,
    batches: Mutex<Vec<Vec<String>>>,
}

impl MockCitationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, record_id: &str, doi: &str) {
        self.dois
            .lock()
            .unwrap()
            .insert(record_id.to_string(), doi.to_string());
    }

    /// Fail every batch with `error`.
    pub fn fail_with(&self, error: LookupError) {
        *self.error.lock().unwrap() = Some(error);
    }

    /// Batches requested so far.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl CitationGraph for MockCitationGraph {
    async fn lookup_identifiers(
        &self,
        record_ids: &[String],
    ) -> Result<HashMap<String, String>, LookupError> {
        self.batches.lock().unwrap().push(record_ids.to_vec());
        if let Some(error) = self.error.lock().unwrap().as_ref() {
            return Err(replay(error));
        }
        let dois = self.dois.lock().unwrap();
        Ok(record_ids
            .iter()
            .filter_map(|id| dois.get(id).map(|doi| (id.clone(), doi.clone())))
            .collect())
    }
}

/// Mock legal open-access lookup. Unknown DOIs have no copy.
#[derive(Debug, Default)]
pub struct MockOaLookup {
    responses: Mutex<HashMap<String, Result<Option<String>, LookupError>>>,
    calls: Mutex<Vec<String>>,
}

impl MockOaLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, doi: &str, response: Result<Option<String>, LookupError>) {
        self.responses
            .lock()
            .unwrap()
            .insert(doi.to_string(), response);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OaLookup for MockOaLookup {
    async fn lookup(&self, doi: &str) -> Result<Option<String>, LookupError> {
        self.calls.lock().unwrap().push(doi.to_string());
        self.responses
            .lock()
            .unwrap()
            .get(doi)
            .map(replay_result)
            .unwrap_or(Ok(None))
    }
}

/// Mock title search.
///
/// Queued responses are consumed first, then the standing response for the
/// title, then `Ok(None)`.
#[derive(Debug, Default)]
pub struct MockTitleSearch {
    responses: Mutex<HashMap<String, Result<Option<String>, LookupError>>>,
    queued: Mutex<HashMap<String, VecDeque<Result<Option<String>, LookupError>>>>,
    default: Mutex<Option<Result<Option<String>, LookupError>>>,
    calls: Mutex<Vec<String>>,
}

impl MockTitleSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, title: &str, response: Result<Option<String>, LookupError>) {
        self.responses
            .lock()
            .unwrap()
            .insert(title.to_string(), response);
    }

    pub fn queue(&self, title: &str, response: Result<Option<String>, LookupError>) {
        self.queued
            .lock()
            .unwrap()
            .entry(title.to_string())
            .or_default()
            .push_back(response);
    }

    /// Response for titles with nothing registered.
    pub fn set_default(&self, response: Result<Option<String>, LookupError>) {
        *self.default.lock().unwrap() = Some(response);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TitleSearch for MockTitleSearch {
    async fn search(&self, title: &str) -> Result<Option<String>, LookupError> {
        self.calls.lock().unwrap().push(title.to_string());

        if let Some(response) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(title)
            .and_then(VecDeque::pop_front)
        {
            return response;
        }
        if let Some(response) = self.responses.lock().unwrap().get(title) {
            return replay_result(response);
        }
        self.default
            .lock()
            .unwrap()
            .as_ref()
            .map(replay_result)
            .unwrap_or(Ok(None))
    }
}

/// Mock publisher metadata lookup.
#[derive(Debug, Default)]
pub struct MockPdfLocator {
    responses: Mutex<HashMap<String, Result<Vec<String>, LookupError>>>,
    calls: Mutex<Vec<String>>,
}

impl MockPdfLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, doi: &str, response: Result<Vec<String>, LookupError>) {
        self.responses
            .lock()
            .unwrap()
            .insert(doi.to_string(), response);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PdfLocator for MockPdfLocator {
    async fn locate(&self, doi: &str) -> Result<Vec<String>, LookupError> {
        self.calls.lock().unwrap().push(doi.to_string());
        self.responses
            .lock()
            .unwrap()
            .get(doi)
            .map(replay_result)
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Mock open repository search. Answers by title; unknown titles have no copy.
#[derive(Debug, Default)]
pub struct MockRepositorySearch {
    responses: Mutex<HashMap<String, Result<Option<String>, LookupError>>>,
    calls: Mutex<Vec<(Option<String>, String)>>,
}

impl MockRepositorySearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, title: &str, response: Result<Option<String>, LookupError>) {
        self.responses
            .lock()
            .unwrap()
            .insert(title.to_string(), response);
    }

    /// `(doi, title)` of every call, in order.
    pub fn calls(&self) -> Vec<(Option<String>, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RepositorySearch for MockRepositorySearch {
    async fn find_pdf(
        &self,
        doi: Option<&str>,
        title: &str,
    ) -> Result<Option<String>, LookupError> {
        self.calls
            .lock()
            .unwrap()
            .push((doi.map(str::to_string), title.to_string()));
        self.responses
            .lock()
            .unwrap()
            .get(title)
            .map(replay_result)
            .unwrap_or(Ok(None))
    }
}
