use std::collections::HashSet;
use std::sync::Arc;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use crate::config::feed::PollingConfig;
use crate::error::{Error, Result};
use crate::events::feed::{FailureReason, FeedEvent};
use crate::observability::metrics::{POLL_CYCLES, POLL_LATENCY, TICKS_RECEIVED};
use crate::observability::tracing::trace_poll_cycle;
use crate::price_infra::connectors::QuoteFetcher;
use crate::price_infra::enricher::TickEnricher;
use crate::price_infra::RawQuote;
use crate::types::symbol::Symbol;
use crate::types::tick::TickSource;
use crate::types::timestamp::Timestamp;

/// `GET {url}?symbols=A,B` returning either a JSON array of quotes or
/// `{"quotes": [...]}`.
pub struct HttpQuoteFetcher {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QuoteResponse {
    List(Vec<RawQuote>),
    Wrapped { quotes: Vec<RawQuote> },
}

impl HttpQuoteFetcher {
    pub fn new(config: &PollingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::ConfigError(format!("HTTP client: {}", e)))?;
        Ok(HttpQuoteFetcher {
            client,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl QuoteFetcher for HttpQuoteFetcher {
    async fn fetch_quotes(&self, symbols: &[Symbol]) -> Result<Vec<RawQuote>> {
        let joined = symbols.iter().map(Symbol::as_str).collect::<Vec<_>>().join(",");
        let mut request = self.client.get(&self.url).query(&[("symbols", joined)]);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::AuthenticationError(format!("quote endpoint returned {}", status)));
        }
        if !status.is_success() {
            return Err(Error::UpstreamStatus(status.as_u16()));
        }

        let body = response.bytes().await?;
        let quotes = match serde_json::from_slice::<QuoteResponse>(&body)? {
            QuoteResponse::List(quotes) => quotes,
            QuoteResponse::Wrapped { quotes } => quotes,
        };
        Ok(quotes)
    }
}

/// Secondary source worker: polls current quotes on a fixed interval and
/// keeps running regardless of which source is active.
pub struct PollingFallbackSource {
    config: PollingConfig,
    fetcher: Arc<dyn QuoteFetcher>,
    events: mpsc::Sender<FeedEvent>,
    symbols: watch::Receiver<Vec<Symbol>>,
    enricher: TickEnricher,
}

impl PollingFallbackSource {
    pub fn new(
        config: PollingConfig,
        fetcher: Arc<dyn QuoteFetcher>,
        events: mpsc::Sender<FeedEvent>,
        symbols: watch::Receiver<Vec<Symbol>>,
        enricher: TickEnricher,
    ) -> Self {
        PollingFallbackSource {
            config,
            fetcher,
            events,
            symbols,
            enricher,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycle: u64 = 0;
        info!(interval_ms = self.config.interval_ms, "Polling source started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Polling source stopping");
                    return;
                }
                _ = ticker.tick() => {
                    cycle += 1;
                    let symbols = self.symbols.borrow().clone();
                    let span = trace_poll_cycle(cycle, symbols.len());
                    let outcome = tokio::select! {
                        _ = cancel.cancelled() => return,
                        outcome = self.poll_once(&symbols).instrument(span) => outcome,
                    };
                    match outcome {
                        Ok(emitted) => {
                            POLL_CYCLES.with_label_values(&["success"]).inc();
                            debug!(cycle, emitted, "Poll cycle complete");
                        }
                        Err(Error::ChannelClosed) => {
                            warn!("Event channel closed, polling source stopping");
                            return;
                        }
                        Err(e) => {
                            POLL_CYCLES.with_label_values(&["failure"]).inc();
                            warn!(cycle, error = %e, "Poll cycle failed");
                            let reason = match e {
                                Error::AuthenticationError(msg) => FailureReason::AuthFailed(msg),
                                other => FailureReason::FetchFailed(other.to_string()),
                            };
                            if self.events.send(FeedEvent::failure(TickSource::Secondary, reason)).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        }
    }

    /// One fetch for the tracked set. Returns the number of ticks emitted;
    /// an error means the whole cycle failed.
    pub async fn poll_once(&self, symbols: &[Symbol]) -> Result<usize> {
        if symbols.is_empty() {
            return Ok(0);
        }

        let started = std::time::Instant::now();
        let fetched = tokio::time::timeout(self.config.request_timeout(), self.fetcher.fetch_quotes(symbols))
            .await
            .map_err(|_| Error::Timeout("fetching quotes"))?;
        POLL_LATENCY.observe(started.elapsed().as_secs_f64());
        let quotes = fetched?;

        let tracked: HashSet<&Symbol> = symbols.iter().collect();
        let received_at = Timestamp::now();
        let mut ticks = Vec::with_capacity(quotes.len());
        for quote in quotes {
            match quote.into_tick(TickSource::Secondary, received_at) {
                Ok(tick) if tracked.contains(tick.symbol()) => ticks.push(tick),
                Ok(tick) => debug!(symbol = %tick.symbol(), "Ignoring quote for untracked symbol"),
                Err(e) => warn!(error = %e, "Unusable quote from polling source"),
            }
        }

        if ticks.is_empty() {
            return Err(Error::EmptyQuoteResponse(symbols.len()));
        }

        let emitted = ticks.len();
        for tick in ticks {
            TICKS_RECEIVED.with_label_values(&[TickSource::Secondary.as_str()]).inc();
            let tick = self.enricher.enrich(tick).await;
            self.events
                .send(FeedEvent::tick(tick, received_at))
                .await
                .map_err(|_| Error::ChannelClosed)?;
        }
        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::price_infra::connectors::MockQuoteFetcher;
    use crate::types::price::Price;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn symbols(raw: &[&str]) -> Vec<Symbol> {
        raw.iter().map(|s| Symbol::new(s).unwrap()).collect()
    }

    fn quote(symbol: &str, price: f64) -> RawQuote {
        RawQuote {
            symbol: symbol.into(),
            price: Price::from_f64(price),
            volume: None,
            change: None,
            change_percent: None,
            timestamp: None,
        }
    }

    fn source(fetcher: MockQuoteFetcher, tracked: &[&str]) -> (PollingFallbackSource, mpsc::Receiver<FeedEvent>, watch::Sender<Vec<Symbol>>) {
        let (tx, rx) = mpsc::channel(64);
        let (symbols_tx, symbols_rx) = watch::channel(symbols(tracked));
        let source = PollingFallbackSource::new(
            PollingConfig::default(),
            Arc::new(fetcher),
            tx,
            symbols_rx,
            TickEnricher::disabled(),
        );
        (source, rx, symbols_tx)
    }

    #[tokio::test]
    async fn emits_secondary_ticks_for_tracked_symbols_only() {
        let mut fetcher = MockQuoteFetcher::new();
        fetcher
            .expect_fetch_quotes()
            .returning(|_| Ok(vec![quote("AAPL", 150.0), quote("TSLA", 200.0)]));
        let (source, mut rx, _symbols) = source(fetcher, &["AAPL", "MSFT"]);

        let emitted = source.poll_once(&symbols(&["AAPL", "MSFT"])).await.unwrap();
        assert_eq!(emitted, 1);
        match rx.recv().await.unwrap() {
            FeedEvent::TickReceived { tick, .. } => {
                assert_eq!(tick.symbol().as_str(), "AAPL");
                assert_eq!(tick.source(), TickSource::Secondary);
                assert!(!tick.is_real_time());
                assert_eq!(tick.quality_score(), 50);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_response_is_a_cycle_failure() {
        let mut fetcher = MockQuoteFetcher::new();
        fetcher.expect_fetch_quotes().returning(|_| Ok(Vec::new()));
        let (source, _rx, _symbols) = source(fetcher, &["AAPL"]);

        match source.poll_once(&symbols(&["AAPL"])).await {
            Err(Error::EmptyQuoteResponse(1)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn failed_cycle_emits_exactly_one_failure() {
        let mut fetcher = MockQuoteFetcher::new();
        fetcher
            .expect_fetch_quotes()
            .returning(|_| Err(Error::UpstreamStatus(503)));
        let (source, mut rx, _symbols) = source(fetcher, &["AAPL", "MSFT"]);

        let cancel = CancellationToken::new();
        let worker = tokio::spawn(source.run(cancel.clone()));

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        match event {
            FeedEvent::SourceFailure { source, reason: FailureReason::FetchFailed(_), .. } => {
                assert_eq!(source, TickSource::Secondary);
            }
            other => panic!("unexpected {:?}", other),
        }
        // Next cycle is 5s away.
        assert!(tokio::time::timeout(Duration::from_millis(200), rx.recv()).await.is_err());

        cancel.cancel();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn no_tracked_symbols_skips_fetch() {
        let fetcher = MockQuoteFetcher::new();
        let (source, _rx, _symbols) = source(fetcher, &[]);
        assert_eq!(source.poll_once(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn http_fetcher_decodes_both_shapes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quotes"))
            .and(query_param("symbols", "AAPL,MSFT"))
            .and(header("X-API-Key", "k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"symbol": "AAPL", "price": "150.10", "volume": 1000},
                {"symbol": "MSFT", "price": 410.5}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wrapped"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "quotes": [{"symbol": "AAPL", "price": 150.1}]
            })))
            .mount(&server)
            .await;

        let mut config = PollingConfig::default();
        config.url = format!("{}/quotes", server.uri());
        config.api_key = Some("k".into());
        let fetcher = HttpQuoteFetcher::new(&config).unwrap();
        let quotes = fetcher.fetch_quotes(&symbols(&["AAPL", "MSFT"])).await.unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].price, Price::from_f64(150.1));

        config.url = format!("{}/wrapped", server.uri());
        config.api_key = None;
        let fetcher = HttpQuoteFetcher::new(&config).unwrap();
        assert_eq!(fetcher.fetch_quotes(&symbols(&["AAPL"])).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn http_fetcher_maps_status_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/denied"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let mut config = PollingConfig::default();
        config.url = format!("{}/down", server.uri());
        let err = HttpQuoteFetcher::new(&config).unwrap().fetch_quotes(&symbols(&["AAPL"])).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamStatus(503)));

        config.url = format!("{}/denied", server.uri());
        let err = HttpQuoteFetcher::new(&config).unwrap().fetch_quotes(&symbols(&["AAPL"])).await.unwrap_err();
        assert!(matches!(err, Error::AuthenticationError(_)));
    }
}
