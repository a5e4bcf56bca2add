use std::time::Duration;

use async_trait::async_trait;
use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use thiserror::Error;

use crate::{
    client::{MatchApi, RequestError},
    scheduler::TickHandler,
    sink::MatchSink,
    store::{CursorStore, StoreError},
};

#[derive(Error, Debug)]
pub enum TickError {
    #[error("Failed to load cursor: {0}")]
    Load(#[source] StoreError),
    #[error("Failed to fetch match history: {0}")]
    History(#[source] RequestError),
    #[error("Failed to fetch details of match {0}: {1}")]
    Details(u64, #[source] RequestError),
    #[error("Failed to deliver match {0}: {1:#}")]
    Deliver(u64, anyhow::Error),
    #[error("Failed to save cursor {0}: {1}")]
    Save(u64, #[source] StoreError),
}

impl TickError {
    pub fn is_transient(&self) -> bool {
        match self {
            TickError::History(err) | TickError::Details(_, err) => err.is_transient(),
            _ => false,
        }
    }

    fn request_error(&self) -> Option<&RequestError> {
        match self {
            TickError::History(err) | TickError::Details(_, err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The newest match is the one already processed.
    Unchanged(u64),
    /// A new match was delivered and the cursor moved to it.
    Processed { previous: Option<u64>, current: u64 },
}

/// Extra pause after repeated transient request failures, off unless configured.
pub struct NetworkBackoff {
    period: Duration,
    current: Option<ExponentialBackoff>,
}

impl NetworkBackoff {
    const MAX_FACTOR: u32 = 16;

    pub fn new(period: Duration) -> Self {
        Self {
            period,
            current: None,
        }
    }

    fn builder(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.period)
            .with_max_delay(self.period * Self::MAX_FACTOR)
            .with_factor(2.0)
            .with_max_times(8)
    }

    pub fn record(&mut self, transient: bool) -> Option<Duration> {
        if !transient {
            self.current = None;
            return None;
        }
        let max = self.period * Self::MAX_FACTOR;
        let builder = self.builder();
        let delay = self
            .current
            .get_or_insert_with(|| builder.build())
            .next()
            .unwrap_or(max);
        Some(delay)
    }
}

/// Poll-and-dedup loop body for a single tracked account.
pub struct Engine<A, S, K> {
    api: A,
    store: S,
    sink: K,
    account_id: u64,
    backoff: Option<NetworkBackoff>,
}

impl<A, S, K> Engine<A, S, K>
where
    A: MatchApi,
    S: CursorStore,
    K: MatchSink,
{
    pub fn new(api: A, store: S, sink: K, account_id: u64) -> Self {
        Self {
            api,
            store,
            sink,
            account_id,
            backoff: None,
        }
    }

    pub fn with_backoff(mut self, backoff: NetworkBackoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Runs the fetch chain once.
    ///
    /// The cursor is only written after the details of the newest match were fetched and
    /// delivered, so a failure anywhere leaves that match to be picked up by the next tick.
    pub async fn tick(&self) -> Result<TickOutcome, TickError> {
        let cursor = match self.store.load().await {
            Ok(cursor) => cursor,
            Err(StoreError::Corrupt(content)) => {
                log::warn!(
                    "cursor record {:?} is not a match id, treating it as empty",
                    content
                );
                None
            }
            Err(err) => return Err(TickError::Load(err)),
        };

        let summary = self
            .api
            .fetch_history(self.account_id)
            .await
            .map_err(TickError::History)?;
        let Some(newest) = summary.newest().map(|mat| mat.match_id) else {
            return Err(TickError::History(RequestError::EmptyResult));
        };

        // any other id is new, including one below the cursor
        if cursor == Some(newest) {
            return Ok(TickOutcome::Unchanged(newest));
        }

        let detail = self
            .api
            .fetch_details(newest)
            .await
            .map_err(|err| TickError::Details(newest, err))?;
        self.sink
            .deliver(&summary, &detail)
            .await
            .map_err(|err| TickError::Deliver(newest, err))?;
        self.store
            .save(newest)
            .await
            .map_err(|err| TickError::Save(newest, err))?;

        Ok(TickOutcome::Processed {
            previous: cursor,
            current: newest,
        })
    }
}

fn report(result: &Result<TickOutcome, TickError>) {
    match result {
        Ok(TickOutcome::Unchanged(id)) => log::info!("no change, newest match is still {}", id),
        Ok(TickOutcome::Processed {
            previous: Some(previous),
            current,
        }) => log::info!("processed match {} (previous {})", current, previous),
        Ok(TickOutcome::Processed {
            previous: None,
            current,
        }) => log::info!("processed match {} (first one seen)", current),
        Err(err @ (TickError::Load(_) | TickError::Save(..))) => log::error!("{}", err),
        Err(err) => {
            log::warn!("{}", err);
            if let Some(RequestError::DecodeError(_, content)) = err.request_error() {
                // maybe valve have changed the json response format
                log::debug!("undecodable response: {}", content);
            }
        }
    }
}

#[async_trait]
impl<A, S, K> TickHandler for Engine<A, S, K>
where
    A: MatchApi,
    S: CursorStore,
    K: MatchSink,
{
    async fn on_tick(&mut self) -> Option<Duration> {
        let result = self.tick().await;
        report(&result);
        let transient = matches!(&result, Err(err) if err.is_transient());
        self.backoff
            .as_mut()
            .and_then(|backoff| backoff.record(transient))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use tokio::{sync::watch, time::Instant};

    use super::*;
    use crate::{
        client::check_history,
        dota2::{full, partial},
        scheduler,
    };

    #[derive(Default)]
    struct FakeApi {
        history: Mutex<Vec<u64>>,
        history_error: Mutex<Option<fn() -> RequestError>>,
        details_error: Mutex<Option<fn() -> RequestError>>,
        delay: Duration,
        history_calls: AtomicUsize,
        details_calls: Mutex<Vec<u64>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        spans: Mutex<Vec<(Instant, Instant)>>,
    }

    impl FakeApi {
        fn with_history(ids: &[u64]) -> Arc<Self> {
            Arc::new(Self {
                history: Mutex::new(ids.to_vec()),
                ..Default::default()
            })
        }

        fn fail_history(&self, err: fn() -> RequestError) {
            *self.history_error.lock().unwrap() = Some(err);
        }

        fn fail_details(&self, err: Option<fn() -> RequestError>) {
            *self.details_error.lock().unwrap() = err;
        }

        fn details_calls(&self) -> Vec<u64> {
            self.details_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MatchApi for Arc<FakeApi> {
        async fn fetch_history(
            &self,
            account_id: u64,
        ) -> Result<partial::MatchHistory, RequestError> {
            assert_eq!(account_id, ACCOUNT);
            let start = Instant::now();
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);
            self.history_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.spans.lock().unwrap().push((start, Instant::now()));

            if let Some(err) = *self.history_error.lock().unwrap() {
                return Err(err());
            }
            let matches: Vec<_> = self
                .history
                .lock()
                .unwrap()
                .iter()
                .map(|&match_id| partial::Match {
                    match_id,
                    ..Default::default()
                })
                .collect();
            check_history(partial::MatchHistory {
                status: partial::MatchHistory::STATUS_OK,
                num_results: matches.len() as u16,
                matches,
                ..Default::default()
            })
        }

        async fn fetch_details(&self, match_id: u64) -> Result<full::Match, RequestError> {
            self.details_calls.lock().unwrap().push(match_id);
            if let Some(err) = *self.details_error.lock().unwrap() {
                return Err(err());
            }
            Ok(full::Match {
                match_id,
                ..Default::default()
            })
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        cursor: Mutex<Option<u64>>,
        corrupt: Mutex<Option<String>>,
        fail_load: AtomicBool,
        fail_save: AtomicBool,
        saves: Mutex<Vec<u64>>,
    }

    impl MemoryStore {
        fn with_cursor(cursor: Option<u64>) -> Arc<Self> {
            Arc::new(Self {
                cursor: Mutex::new(cursor),
                ..Default::default()
            })
        }

        fn cursor(&self) -> Option<u64> {
            *self.cursor.lock().unwrap()
        }

        fn saves(&self) -> Vec<u64> {
            self.saves.lock().unwrap().clone()
        }
    }

    fn io_error() -> StoreError {
        std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into()
    }

    #[async_trait]
    impl CursorStore for Arc<MemoryStore> {
        async fn load(&self) -> Result<Option<u64>, StoreError> {
            if self.fail_load.load(Ordering::SeqCst) {
                return Err(io_error());
            }
            if let Some(content) = self.corrupt.lock().unwrap().clone() {
                return Err(StoreError::Corrupt(content));
            }
            Ok(self.cursor())
        }

        async fn save(&self, match_id: u64) -> Result<(), StoreError> {
            if self.fail_save.load(Ordering::SeqCst) {
                return Err(io_error());
            }
            self.saves.lock().unwrap().push(match_id);
            *self.corrupt.lock().unwrap() = None;
            *self.cursor.lock().unwrap() = Some(match_id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct CollectSink {
        delivered: Mutex<Vec<u64>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl MatchSink for Arc<CollectSink> {
        async fn deliver(
            &self,
            summary: &partial::MatchHistory,
            detail: &full::Match,
        ) -> anyhow::Result<()> {
            assert_eq!(summary.matches[0].match_id, detail.match_id);
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("sink is down");
            }
            self.delivered.lock().unwrap().push(detail.match_id);
            Ok(())
        }
    }

    const ACCOUNT: u64 = 86745912;
    const OLD: u64 = 7962094871;
    const NEW: u64 = 7962153400;

    type TestEngine = Engine<Arc<FakeApi>, Arc<MemoryStore>, Arc<CollectSink>>;

    fn engine(api: &Arc<FakeApi>, store: &Arc<MemoryStore>) -> (TestEngine, Arc<CollectSink>) {
        let sink = Arc::new(CollectSink::default());
        let engine = Engine::new(api.clone(), store.clone(), sink.clone(), ACCOUNT);
        (engine, sink)
    }

    fn decode_error() -> RequestError {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        RequestError::DecodeError(err, "{".to_string())
    }

    #[tokio::test]
    async fn same_match_is_not_fetched_again() {
        let api = FakeApi::with_history(&[NEW, OLD]);
        let store = MemoryStore::with_cursor(Some(NEW));
        let (engine, sink) = engine(&api, &store);

        for _ in 0..3 {
            assert_eq!(engine.tick().await.unwrap(), TickOutcome::Unchanged(NEW));
        }

        assert!(api.details_calls().is_empty());
        assert!(store.saves().is_empty());
        assert!(sink.delivered.lock().unwrap().is_empty());
        assert_eq!(store.cursor(), Some(NEW));
    }

    #[tokio::test]
    async fn new_match_moves_cursor() {
        let api = FakeApi::with_history(&[NEW, OLD]);
        let store = MemoryStore::with_cursor(Some(OLD));
        let (engine, sink) = engine(&api, &store);

        assert_eq!(
            engine.tick().await.unwrap(),
            TickOutcome::Processed {
                previous: Some(OLD),
                current: NEW
            }
        );
        assert_eq!(api.details_calls(), vec![NEW]);
        assert_eq!(store.cursor(), Some(NEW));
        assert_eq!(*sink.delivered.lock().unwrap(), vec![NEW]);

        // and it is not processed twice
        assert_eq!(engine.tick().await.unwrap(), TickOutcome::Unchanged(NEW));
        assert_eq!(api.details_calls(), vec![NEW]);
    }

    #[tokio::test]
    async fn details_failure_keeps_cursor_and_retries() {
        let api = FakeApi::with_history(&[NEW, OLD]);
        api.fail_details(Some(|| {
            RequestError::OtherResponse(reqwest::StatusCode::BAD_GATEWAY)
        }));
        let store = MemoryStore::with_cursor(Some(OLD));
        let (engine, sink) = engine(&api, &store);

        let err = engine.tick().await.unwrap_err();
        assert!(matches!(err, TickError::Details(NEW, _)));
        assert_eq!(store.cursor(), Some(OLD));
        assert!(store.saves().is_empty());
        assert!(sink.delivered.lock().unwrap().is_empty());

        api.fail_details(None);
        assert_eq!(
            engine.tick().await.unwrap(),
            TickOutcome::Processed {
                previous: Some(OLD),
                current: NEW
            }
        );
        assert_eq!(api.details_calls(), vec![NEW, NEW]);
        assert_eq!(store.cursor(), Some(NEW));
    }

    #[tokio::test]
    async fn first_run_processes_newest() {
        let api = FakeApi::with_history(&[42]);
        let store = MemoryStore::with_cursor(None);
        let (engine, _sink) = engine(&api, &store);

        assert_eq!(
            engine.tick().await.unwrap(),
            TickOutcome::Processed {
                previous: None,
                current: 42
            }
        );
        assert_eq!(api.details_calls(), vec![42]);
        assert_eq!(store.cursor(), Some(42));
    }

    #[tokio::test]
    async fn empty_history_aborts_cleanly() {
        let api = FakeApi::with_history(&[]);
        let store = MemoryStore::with_cursor(Some(OLD));
        let (engine, _sink) = engine(&api, &store);

        let err = engine.tick().await.unwrap_err();
        assert!(matches!(err, TickError::History(RequestError::EmptyResult)));
        assert!(api.details_calls().is_empty());
        assert!(store.saves().is_empty());
    }

    #[tokio::test]
    async fn history_failure_skips_tick() {
        let api = FakeApi::with_history(&[NEW]);
        api.fail_history(decode_error);
        let store = MemoryStore::with_cursor(Some(OLD));
        let (engine, _sink) = engine(&api, &store);

        let err = engine.tick().await.unwrap_err();
        assert!(matches!(err, TickError::History(RequestError::DecodeError(_, _))));
        assert!(!err.is_transient());
        assert!(api.details_calls().is_empty());
        assert_eq!(store.cursor(), Some(OLD));
    }

    #[tokio::test]
    async fn unreadable_cursor_skips_tick() {
        let api = FakeApi::with_history(&[NEW]);
        let store = MemoryStore::with_cursor(Some(OLD));
        store.fail_load.store(true, Ordering::SeqCst);
        let (engine, _sink) = engine(&api, &store);

        assert!(matches!(engine.tick().await, Err(TickError::Load(_))));
        assert_eq!(api.history_calls.load(Ordering::SeqCst), 0);
        assert!(api.details_calls().is_empty());
    }

    #[tokio::test]
    async fn corrupt_cursor_counts_as_first_run() {
        let api = FakeApi::with_history(&[NEW]);
        let store = MemoryStore::with_cursor(None);
        *store.corrupt.lock().unwrap() = Some("79621534oo".to_string());
        let (engine, _sink) = engine(&api, &store);

        assert_eq!(
            engine.tick().await.unwrap(),
            TickOutcome::Processed {
                previous: None,
                current: NEW
            }
        );
        assert_eq!(store.cursor(), Some(NEW));
    }

    #[tokio::test]
    async fn sink_failure_keeps_cursor() {
        let api = FakeApi::with_history(&[NEW]);
        let store = MemoryStore::with_cursor(Some(OLD));
        let (engine, sink) = engine(&api, &store);
        sink.fail.store(true, Ordering::SeqCst);

        assert!(matches!(engine.tick().await, Err(TickError::Deliver(NEW, _))));
        assert_eq!(store.cursor(), Some(OLD));
    }

    #[tokio::test]
    async fn save_failure_is_reported() {
        let api = FakeApi::with_history(&[NEW]);
        let store = MemoryStore::with_cursor(Some(OLD));
        store.fail_save.store(true, Ordering::SeqCst);
        let (engine, _sink) = engine(&api, &store);

        assert!(matches!(engine.tick().await, Err(TickError::Save(NEW, _))));
        assert_eq!(store.cursor(), Some(OLD));
    }

    #[tokio::test]
    async fn cursor_ahead_of_history_is_replaced() {
        let api = FakeApi::with_history(&[OLD]);
        let store = MemoryStore::with_cursor(Some(NEW));
        let (engine, _sink) = engine(&api, &store);

        assert_eq!(
            engine.tick().await.unwrap(),
            TickOutcome::Processed {
                previous: Some(NEW),
                current: OLD
            }
        );
        assert_eq!(api.details_calls(), vec![OLD]);
        assert_eq!(store.cursor(), Some(OLD));

        // from here on the usual dedup applies again
        assert_eq!(engine.tick().await.unwrap(), TickOutcome::Unchanged(OLD));
        assert_eq!(api.details_calls(), vec![OLD]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tick_is_never_overlapped() {
        let period = Duration::from_secs(10);
        let api = Arc::new(FakeApi {
            history: Mutex::new(vec![NEW]),
            delay: period * 5 / 2,
            ..Default::default()
        });
        let store = MemoryStore::with_cursor(None);
        let (engine, _sink) = engine(&api, &store);
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(scheduler::run(period, engine, rx));

        tokio::time::sleep(period * 10).await;
        tx.send(true).unwrap();
        task.await.unwrap();

        assert!(api.history_calls.load(Ordering::SeqCst) >= 3);
        assert_eq!(api.max_in_flight.load(Ordering::SeqCst), 1);
        let spans = api.spans.lock().unwrap();
        for pair in spans.windows(2) {
            assert!(pair[1].0 >= pair[0].1, "ticks overlapped: {:?}", pair);
        }
        assert_eq!(api.details_calls(), vec![NEW]);
        assert_eq!(store.cursor(), Some(NEW));
    }

    #[tokio::test]
    async fn backoff_only_when_enabled() {
        let api = FakeApi::with_history(&[NEW]);
        api.fail_history(|| RequestError::TooManyRequests);
        let store = MemoryStore::with_cursor(None);

        let (mut plain, _sink) = engine(&api, &store);
        assert_eq!(plain.on_tick().await, None);

        let period = Duration::from_secs(60);
        let (engine, _sink) = engine(&api, &store);
        let mut engine = engine.with_backoff(NetworkBackoff::new(period));
        assert_eq!(engine.on_tick().await, Some(period));
        assert_eq!(engine.on_tick().await, Some(period * 2));

        // a decode error is not transient and resets the pause
        api.fail_history(decode_error);
        assert_eq!(engine.on_tick().await, None);
        api.fail_history(|| RequestError::TooManyRequests);
        assert_eq!(engine.on_tick().await, Some(period));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let period = Duration::from_secs(10);
        let mut backoff = NetworkBackoff::new(period);
        let delays: Vec<_> = (0..12)
            .map(|_| backoff.record(true).unwrap().as_secs())
            .collect();
        assert_eq!(delays, vec![10, 20, 40, 80, 160, 160, 160, 160, 160, 160, 160, 160]);
        assert_eq!(backoff.record(false), None);
        assert_eq!(backoff.record(true), Some(period));
    }
}
