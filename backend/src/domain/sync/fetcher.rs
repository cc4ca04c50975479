//! Paginated collection fetching with bounded, jittered retry.
//!
//! Each page is retried independently: transient upstream failures back off
//! exponentially (with jitter) up to a fixed attempt budget, while
//! non-retryable failures abort the entity immediately. A rate-limit
//! response with a server-advertised wait extends the backoff to honour it.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::domain::ports::{
    BackoffJitter, PageRequest, ResourcePageSource, RetrySleeper, SourceError,
};
use crate::domain::registry::EntityDescriptor;
use crate::domain::resource::ResourceObject;

/// Retry budget and backoff bounds for one page fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per page before giving up, including the first.
    pub max_attempts: u32,
    /// Backoff after the first failed attempt.
    pub initial_backoff: Duration,
    /// Upper bound on any single wait.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Exponential base delay for the given failed attempt (1-based),
    /// saturating at [`RetryPolicy::max_backoff`].
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self
            .initial_backoff
            .saturating_mul(2_u32.saturating_pow(exponent));
        delay.min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Terminal fetch failures for one entity collection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// A non-retryable upstream failure.
    #[error("fetching {resource_type} page {page} failed permanently: {source}")]
    Fatal {
        /// Upstream resource type being fetched.
        resource_type: &'static str,
        /// Page that failed.
        page: u32,
        /// Underlying source error.
        source: SourceError,
    },
    /// The retry budget ran out on one page.
    #[error("gave up fetching {resource_type} page {page} after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Upstream resource type being fetched.
        resource_type: &'static str,
        /// Page that failed.
        page: u32,
        /// Attempts consumed.
        attempts: u32,
        /// Last error observed.
        source: SourceError,
    },
    /// The run deadline passed between pages.
    #[error("run deadline reached while fetching {resource_type} at page {page}")]
    DeadlineExceeded {
        /// Upstream resource type being fetched.
        resource_type: &'static str,
        /// Next page that would have been requested.
        page: u32,
    },
}

impl FetchError {
    /// Whether the failure was the run deadline rather than the upstream.
    pub fn is_deadline(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }
}

/// Everything gathered while walking one entity's collection: the
/// concatenated `data` arrays plus every sideloaded `included` resource.
#[derive(Debug, Default, Clone)]
pub struct FetchedCollection {
    /// Primary resources of the requested type.
    pub data: Vec<ResourceObject>,
    /// Sideloaded resources of related types, in arrival order.
    pub included: Vec<ResourceObject>,
}

/// Walks an entity's collection page by page through the source port.
pub struct PageFetcher {
    source: Arc<dyn ResourcePageSource>,
    sleeper: Arc<dyn RetrySleeper>,
    jitter: Arc<dyn BackoffJitter>,
    policy: RetryPolicy,
}

impl PageFetcher {
    /// Build a fetcher over the given source and retry collaborators.
    pub fn new(
        source: Arc<dyn ResourcePageSource>,
        sleeper: Arc<dyn RetrySleeper>,
        jitter: Arc<dyn BackoffJitter>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            source,
            sleeper,
            jitter,
            policy,
        }
    }

    /// Fetch every page of the descriptor's collection, accumulating both
    /// the primary resources and the sideloaded includes.
    ///
    /// `deadline_exceeded` is consulted before each page so a long-running
    /// run can stop cleanly between requests.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when a page fails permanently, the retry
    /// budget runs out, or the deadline passes.
    pub async fn fetch_collection<F>(
        &self,
        descriptor: &EntityDescriptor,
        deadline_exceeded: F,
    ) -> Result<FetchedCollection, FetchError>
    where
        F: Fn() -> bool,
    {
        let mut collection = FetchedCollection::default();
        let mut page = 1_u32;
        loop {
            if deadline_exceeded() {
                return Err(FetchError::DeadlineExceeded {
                    resource_type: descriptor.resource_type,
                    page,
                });
            }
            let request = PageRequest {
                number: page,
                size: descriptor.page_size,
            };
            let fetched = self.fetch_page_with_retry(descriptor, request).await?;
            let is_empty = fetched.data.is_empty();
            let total_pages = fetched.meta.total_pages;
            collection.data.extend(fetched.data);
            collection.included.extend(fetched.included);
            if is_empty || page >= total_pages {
                return Ok(collection);
            }
            page += 1;
        }
    }

    async fn fetch_page_with_retry(
        &self,
        descriptor: &EntityDescriptor,
        request: PageRequest,
    ) -> Result<crate::domain::resource::ResourcePage, FetchError> {
        let mut attempt = 1_u32;
        loop {
            match self.source.fetch_page(descriptor, request).await {
                Ok(page) => return Ok(page),
                Err(error) if !error.is_retryable() => {
                    return Err(FetchError::Fatal {
                        resource_type: descriptor.resource_type,
                        page: request.number,
                        source: error,
                    });
                }
                Err(error) if attempt >= self.policy.max_attempts => {
                    return Err(FetchError::RetriesExhausted {
                        resource_type: descriptor.resource_type,
                        page: request.number,
                        attempts: attempt,
                        source: error,
                    });
                }
                Err(error) => {
                    let delay = self.delay_for(&error, attempt);
                    warn!(
                        resource_type = descriptor.resource_type,
                        page = request.number,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "transient fetch failure; backing off"
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn delay_for(&self, error: &SourceError, attempt: u32) -> Duration {
        let base = self.policy.base_delay(attempt);
        let mut delay = self.jitter.jittered_delay(base, attempt);
        if let SourceError::RateLimited {
            retry_after: Some(retry_after),
            ..
        } = error
        {
            delay = delay.max(*retry_after);
        }
        delay.min(self.policy.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::domain::registry::EntityKind;
    use crate::domain::resource::{PageMeta, ResourcePage};

    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<ResourcePage, SourceError>>>,
        requests: Mutex<Vec<PageRequest>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<ResourcePage, SourceError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<PageRequest> {
            self.requests.lock().expect("requests lock").clone()
        }
    }

    #[async_trait]
    impl ResourcePageSource for ScriptedSource {
        async fn fetch_page(
            &self,
            _descriptor: &EntityDescriptor,
            page: PageRequest,
        ) -> Result<ResourcePage, SourceError> {
            self.requests.lock().expect("requests lock").push(page);
            self.responses
                .lock()
                .expect("responses lock")
                .pop_front()
                .unwrap_or_else(|| Ok(empty_page(page.number, page.number)))
        }
    }

    struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        fn new() -> Self {
            Self {
                slept: Mutex::new(Vec::new()),
            }
        }

        fn slept(&self) -> Vec<Duration> {
            self.slept.lock().expect("slept lock").clone()
        }
    }

    #[async_trait]
    impl RetrySleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().expect("slept lock").push(duration);
        }
    }

    struct NoJitter;

    impl BackoffJitter for NoJitter {
        fn jittered_delay(&self, base: Duration, _attempt: u32) -> Duration {
            base
        }
    }

    fn empty_page(current_page: u32, total_pages: u32) -> ResourcePage {
        ResourcePage {
            data: Vec::new(),
            included: Vec::new(),
            meta: PageMeta {
                current_page,
                total_pages,
            },
        }
    }

    fn page_of(ids: &[i64], current_page: u32, total_pages: u32) -> ResourcePage {
        ResourcePage {
            data: ids
                .iter()
                .map(|id| ResourceObject::new(*id, "companies"))
                .collect(),
            included: Vec::new(),
            meta: PageMeta {
                current_page,
                total_pages,
            },
        }
    }

    fn fetcher(source: Arc<ScriptedSource>, sleeper: Arc<RecordingSleeper>) -> PageFetcher {
        PageFetcher::new(
            source,
            sleeper,
            Arc::new(NoJitter),
            RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(100),
                max_backoff: Duration::from_secs(5),
            },
        )
    }

    fn descriptor() -> &'static EntityDescriptor {
        EntityKind::Companies.descriptor()
    }

    #[tokio::test]
    async fn walks_every_page_and_concatenates_resources() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(page_of(&[1, 2], 1, 3)),
            Ok(page_of(&[3], 2, 3)),
            Ok(page_of(&[4], 3, 3)),
        ]));
        let sleeper = Arc::new(RecordingSleeper::new());
        let fetcher = fetcher(Arc::clone(&source), Arc::clone(&sleeper));

        let collection = fetcher
            .fetch_collection(descriptor(), || false)
            .await
            .expect("fetch should succeed");

        let ids: Vec<i64> = collection.data.iter().map(|resource| resource.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        let pages: Vec<u32> = source.requests().iter().map(|request| request.number).collect();
        assert_eq!(pages, vec![1, 2, 3]);
        assert!(sleeper.slept().is_empty());
    }

    #[tokio::test]
    async fn retries_the_same_page_with_exponential_backoff() {
        let source = Arc::new(ScriptedSource::new(vec![
            Err(SourceError::upstream("boom")),
            Err(SourceError::timeout("slow")),
            Ok(page_of(&[1], 1, 1)),
        ]));
        let sleeper = Arc::new(RecordingSleeper::new());
        let fetcher = fetcher(Arc::clone(&source), Arc::clone(&sleeper));

        let collection = fetcher
            .fetch_collection(descriptor(), || false)
            .await
            .expect("third attempt should succeed");

        assert_eq!(collection.data.len(), 1);
        let pages: Vec<u32> = source.requests().iter().map(|request| request.number).collect();
        assert_eq!(pages, vec![1, 1, 1]);
        assert_eq!(
            sleeper.slept(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[tokio::test]
    async fn authentication_failures_abort_without_retrying() {
        let source = Arc::new(ScriptedSource::new(vec![Err(SourceError::auth("bad token"))]));
        let sleeper = Arc::new(RecordingSleeper::new());
        let fetcher = fetcher(Arc::clone(&source), Arc::clone(&sleeper));

        let error = fetcher
            .fetch_collection(descriptor(), || false)
            .await
            .expect_err("auth failure should be fatal");

        assert!(matches!(error, FetchError::Fatal { page: 1, .. }));
        assert_eq!(source.requests().len(), 1);
        assert!(sleeper.slept().is_empty());
    }

    #[tokio::test]
    async fn exhausting_the_retry_budget_reports_the_last_error() {
        let source = Arc::new(ScriptedSource::new(vec![
            Err(SourceError::upstream("one")),
            Err(SourceError::upstream("two")),
            Err(SourceError::upstream("three")),
        ]));
        let sleeper = Arc::new(RecordingSleeper::new());
        let fetcher = fetcher(Arc::clone(&source), Arc::clone(&sleeper));

        let error = fetcher
            .fetch_collection(descriptor(), || false)
            .await
            .expect_err("budget should run out");

        match error {
            FetchError::RetriesExhausted {
                attempts, source, ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(source, SourceError::upstream("three"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(sleeper.slept().len(), 2);
    }

    #[tokio::test]
    async fn rate_limit_waits_honour_the_advertised_retry_after() {
        let source = Arc::new(ScriptedSource::new(vec![
            Err(SourceError::rate_limited(
                "slow down",
                Some(Duration::from_secs(2)),
            )),
            Ok(page_of(&[1], 1, 1)),
        ]));
        let sleeper = Arc::new(RecordingSleeper::new());
        let fetcher = fetcher(Arc::clone(&source), Arc::clone(&sleeper));

        fetcher
            .fetch_collection(descriptor(), || false)
            .await
            .expect("second attempt should succeed");

        assert_eq!(sleeper.slept(), vec![Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn deadline_stops_the_walk_before_the_next_page() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(page_of(&[1], 1, 5))]));
        let sleeper = Arc::new(RecordingSleeper::new());
        let fetcher = fetcher(Arc::clone(&source), Arc::clone(&sleeper));

        let calls = Mutex::new(0_u32);
        let error = fetcher
            .fetch_collection(descriptor(), || {
                let mut calls = calls.lock().expect("calls lock");
                *calls += 1;
                *calls > 1
            })
            .await
            .expect_err("deadline should trip before page 2");

        assert!(matches!(
            error,
            FetchError::DeadlineExceeded { page: 2, .. }
        ));
        assert_eq!(source.requests().len(), 1);
    }

    #[tokio::test]
    async fn empty_page_ends_the_walk_even_with_more_pages_advertised() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(empty_page(1, 4))]));
        let sleeper = Arc::new(RecordingSleeper::new());
        let fetcher = fetcher(Arc::clone(&source), Arc::clone(&sleeper));

        let collection = fetcher
            .fetch_collection(descriptor(), || false)
            .await
            .expect("empty collection is not an error");
        assert!(collection.data.is_empty());
        assert_eq!(source.requests().len(), 1);
    }

    #[tokio::test]
    async fn sideloaded_resources_are_gathered_across_pages() {
        let mut first = page_of(&[1], 1, 2);
        first.included.push(ResourceObject::new(100, "organizations"));
        let mut second = page_of(&[2], 2, 2);
        second.included.push(ResourceObject::new(101, "organizations"));
        let source = Arc::new(ScriptedSource::new(vec![Ok(first), Ok(second)]));
        let sleeper = Arc::new(RecordingSleeper::new());
        let fetcher = fetcher(Arc::clone(&source), sleeper);

        let collection = fetcher
            .fetch_collection(descriptor(), || false)
            .await
            .expect("fetch should succeed");

        assert_eq!(collection.data.len(), 2);
        let included: Vec<i64> = collection
            .included
            .iter()
            .map(|resource| resource.id)
            .collect();
        assert_eq!(included, vec![100, 101]);
    }

    #[test]
    fn base_delay_doubles_and_saturates() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(2),
        };
        assert_eq!(policy.base_delay(1), Duration::from_millis(250));
        assert_eq!(policy.base_delay(2), Duration::from_millis(500));
        assert_eq!(policy.base_delay(3), Duration::from_secs(1));
        assert_eq!(policy.base_delay(4), Duration::from_secs(2));
        assert_eq!(policy.base_delay(9), Duration::from_secs(2));
    }
}
