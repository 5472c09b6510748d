use crate::error::FetchError;
use crate::store::{DocumentStore, RawDocument};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum MockResponse {
    Documents(Vec<RawDocument>),
    Status(u16),
    Malformed(String),
    /// Waits before answering with the inner response.
    Delayed(Duration, Box<MockResponse>),
    /// Never completes; models a fetch still in flight.
    Pending,
}

/// Scripted store: answers each fetch with the next queued response and
/// keeps repeating the last one once the script is exhausted.
#[derive(Debug)]
pub struct MockStore {
    script: Mutex<VecDeque<MockResponse>>,
    last: Mutex<Option<MockResponse>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Tracks a running fetch; dropping it also covers fetches abandoned mid-way.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockStore {
    pub fn new(script: Vec<MockResponse>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_documents(documents: Vec<RawDocument>) -> Self {
        Self::new(vec![MockResponse::Documents(documents)])
    }

    pub fn push(&self, response: MockResponse) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(response);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> MockResponse {
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(_) => return MockResponse::Status(500),
        };
        match next {
            Some(response) => {
                *last = Some(response.clone());
                response
            }
            None => last
                .clone()
                .unwrap_or_else(|| MockResponse::Documents(Vec::new())),
        }
    }
}

#[async_trait]
impl DocumentStore for MockStore {
    async fn fetch_all(&self) -> Result<Vec<RawDocument>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        let mut response = self.next_response();
        loop {
            match response {
                MockResponse::Documents(documents) => return Ok(documents),
                MockResponse::Status(status) => return Err(FetchError::Status { status }),
                MockResponse::Malformed(reason) => {
                    return Err(FetchError::MalformedResponse(reason));
                }
                MockResponse::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    response = *inner;
                }
                MockResponse::Pending => std::future::pending::<()>().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn script_is_replayed_in_order_then_repeats_last() {
        let store = MockStore::new(vec![
            MockResponse::Status(503),
            MockResponse::Documents(Vec::new()),
        ]);

        assert!(matches!(
            store.fetch_all().await,
            Err(FetchError::Status { status: 503 })
        ));
        assert!(matches!(store.fetch_all().await, Ok(ref docs) if docs.is_empty()));
        assert!(matches!(store.fetch_all().await, Ok(ref docs) if docs.is_empty()));
        assert_eq!(store.calls(), 3);
    }

    #[tokio::test]
    async fn empty_script_returns_no_documents() {
        let store = MockStore::new(Vec::new());
        assert!(matches!(store.fetch_all().await, Ok(ref docs) if docs.is_empty()));
    }
}
