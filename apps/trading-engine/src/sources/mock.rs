//! Scripted quote source for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use super::{QuoteSource, SourceError};
use crate::models::{QuoteSourceId, SourceQuote};

/// A [`QuoteSource`] that replays a scripted sequence of responses.
///
/// Each `fetch` pops the next scripted response; once the script is
/// exhausted, further calls fail with a transport error. Useful for
/// exercising the gateway's retry/breaker/fallback paths without a
/// network.
#[derive(Debug)]
pub struct MockQuoteSource {
    id: QuoteSourceId,
    responses: Mutex<VecDeque<Result<Vec<SourceQuote>, SourceError>>>,
    calls: AtomicU32,
}

impl MockQuoteSource {
    /// Create an empty-scripted source.
    #[must_use]
    pub fn new(id: QuoteSourceId) -> Self {
        Self {
            id,
            responses: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// Script a successful response.
    pub fn push_quotes(&self, quotes: Vec<SourceQuote>) {
        self.lock().push_back(Ok(quotes));
    }

    /// Script a failure.
    pub fn push_error(&self, error: SourceError) {
        self.lock().push_back(Err(error));
    }

    /// Number of fetch calls observed.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    #[allow(clippy::type_complexity)]
    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, VecDeque<Result<Vec<SourceQuote>, SourceError>>> {
        self.responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl QuoteSource for MockQuoteSource {
    fn id(&self) -> QuoteSourceId {
        self.id
    }

    async fn fetch(&self, _symbols: &[String]) -> Result<Vec<SourceQuote>, SourceError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .pop_front()
            .unwrap_or_else(|| Err(SourceError::Transport("script exhausted".to_string())))
    }
}
