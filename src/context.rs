use crate::config::ConsolidationConfig;
use crate::period::ElementaryPeriod;
use crate::schema::StatementKind;
use crate::summation::RawStatementRecord;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub type FetchedRows = Arc<Vec<RawStatementRecord>>;

/// State private to one consolidation request: cancellation, deadline and the fetch cache.
///
/// Nothing in here is shared between requests.
#[derive(Debug)]
pub struct RequestContext {
    cancellation: CancellationToken,
    deadline: Option<(Instant, Duration)>,
    cache: Option<HashMap<(StatementKind, ElementaryPeriod), FetchedRows>>,
}

impl RequestContext {
    pub fn new(config: &ConsolidationConfig) -> Self {
        Self {
            cancellation: CancellationToken::new(),
            deadline: config
                .request_deadline()
                .map(|budget| (Instant::now() + budget, budget)),
            cache: config.cache_fetches.then(HashMap::new),
        }
    }

    /// Ties this request to an externally owned token, e.g. a client disconnect.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub(crate) async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    /// Resolves once the request deadline has passed; never resolves without one.
    pub(crate) async fn deadline_reached(&self) {
        match self.deadline {
            Some((at, _)) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    }

    pub(crate) fn deadline_budget(&self) -> Option<Duration> {
        self.deadline.map(|(_, budget)| budget)
    }

    pub(crate) fn cached(&self, kind: StatementKind, period: ElementaryPeriod) -> Option<FetchedRows> {
        self.cache.as_ref()?.get(&(kind, period)).cloned()
    }

    pub(crate) fn remember(&mut self, kind: StatementKind, period: ElementaryPeriod, rows: FetchedRows) {
        if let Some(cache) = self.cache.as_mut() {
            cache.insert((kind, period), rows);
        }
    }
}
