//! Scripted in-memory collaborators for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::client::{RemoteReader, RemoteWriter, TokenRefresher};
use super::types::{ListPage, ListQuery};
use crate::error::RemoteError;
use crate::models::{EntitySnapshot, EntityType};

/// Reader that replays scripted pages in order, then empty pages.
#[derive(Default)]
pub struct FakeReader {
    responses: Mutex<VecDeque<Result<ListPage, RemoteError>>>,
    calls: Mutex<Vec<(ListQuery, Option<String>)>>,
}

impl FakeReader {
    pub fn push_page(&self, page: ListPage) {
        self.responses.lock().unwrap().push_back(Ok(page));
    }

    pub fn push_error(&self, err: RemoteError) {
        self.responses.lock().unwrap().push_back(Err(err));
    }

    pub fn calls(&self) -> Vec<(ListQuery, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteReader for FakeReader {
    async fn list(
        &self,
        query: &ListQuery,
        if_none_match: Option<&str>,
    ) -> Result<ListPage, RemoteError> {
        self.calls
            .lock()
            .unwrap()
            .push((query.clone(), if_none_match.map(String::from)));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ListPage::default()))
    }
}

/// Writer that records calls and fails per entity id on demand.
#[derive(Default)]
pub struct FakeWriter {
    failures: Mutex<HashMap<String, VecDeque<RemoteError>>>,
    calls: Mutex<Vec<(String, EntityType, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeWriter {
    /// Fail the next calls for `id` with `errors`, one per call.
    pub fn fail(&self, id: &str, errors: Vec<RemoteError>) {
        self.failures
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .extend(errors);
    }

    /// `(verb, entity_type, id)` for every call, in call order.
    pub fn calls(&self) -> Vec<(String, EntityType, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn record(&self, verb: &str, entity_type: EntityType, id: &str) -> Result<(), RemoteError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls
            .lock()
            .unwrap()
            .push((verb.to_string(), entity_type, id.to_string()));

        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(id)
            .and_then(VecDeque::pop_front);
        failure.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl RemoteWriter for FakeWriter {
    async fn create(
        &self,
        entity_type: EntityType,
        id: &str,
        _payload: &EntitySnapshot,
    ) -> Result<(), RemoteError> {
        self.record("create", entity_type, id).await
    }

    async fn update(
        &self,
        entity_type: EntityType,
        id: &str,
        _payload: &EntitySnapshot,
    ) -> Result<(), RemoteError> {
        self.record("update", entity_type, id).await
    }

    async fn delete(&self, entity_type: EntityType, id: &str) -> Result<(), RemoteError> {
        self.record("delete", entity_type, id).await
    }
}

/// Refresher that counts calls.
pub struct FakeRefresher {
    calls: AtomicUsize,
    succeed: bool,
}

impl FakeRefresher {
    pub const fn new(succeed: bool) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            succeed,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for FakeRefresher {
    async fn refresh(&self) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.succeed {
            Ok(())
        } else {
            Err(RemoteError::AuthInvalid)
        }
    }
}
