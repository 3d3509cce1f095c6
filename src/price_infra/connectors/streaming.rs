use std::collections::HashSet;
use std::sync::Arc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use crate::config::feed::StreamingConfig;
use crate::error::{Error, ErrorClass};
use crate::events::feed::{ConnectionStatus, FailureReason, FeedEvent};
use crate::observability::metrics::{RECONNECT_ATTEMPTS, TICKS_RECEIVED};
use crate::observability::tracing::trace_connection_attempt;
use crate::price_infra::backoff::Backoff;
use crate::price_infra::connectors::{Frame, StreamProtocol};
use crate::price_infra::enricher::TickEnricher;
use crate::types::ids::ConnectionId;
use crate::types::symbol::Symbol;
use crate::types::tick::TickSource;
use crate::types::timestamp::Timestamp;
use crate::utils::helper::alert_operations_team_warning;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// Asks the streaming worker to drop its connection and reconnect at once.
/// Requests made while one is pending collapse into one.
#[derive(Clone, Default)]
pub struct ReconnectSignal(Arc<Notify>);

impl ReconnectSignal {
    pub fn new() -> Self {
        ReconnectSignal::default()
    }

    pub fn request(&self) {
        self.0.notify_one();
    }

    pub(crate) async fn requested(&self) {
        self.0.notified().await;
    }
}

enum SessionEnd {
    Cancelled,
    ReconnectRequested,
    Failed(FailureReason),
}

/// Primary source worker: one WebSocket connection, reconnected forever.
pub struct StreamingIngestionClient<P> {
    config: StreamingConfig,
    protocol: P,
    events: mpsc::Sender<FeedEvent>,
    symbols: watch::Receiver<Vec<Symbol>>,
    enricher: TickEnricher,
    reconnect: ReconnectSignal,
}

impl<P: StreamProtocol> StreamingIngestionClient<P> {
    pub fn new(
        config: StreamingConfig,
        protocol: P,
        events: mpsc::Sender<FeedEvent>,
        symbols: watch::Receiver<Vec<Symbol>>,
        enricher: TickEnricher,
        reconnect: ReconnectSignal,
    ) -> Self {
        StreamingIngestionClient {
            config,
            protocol,
            events,
            symbols,
            enricher,
            reconnect,
        }
    }

    /// Runs until `cancel` fires or the router stops listening.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut backoff = Backoff::new(self.config.backoff.clone());
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return;
            }
            attempt = attempt.saturating_add(1);
            if attempt > 1 {
                RECONNECT_ATTEMPTS.inc();
            }

            let span = trace_connection_attempt(TickSource::Primary, attempt);
            let end = self.session(&cancel, &mut backoff).instrument(span).await;

            match end {
                SessionEnd::Cancelled => return,
                SessionEnd::ReconnectRequested => {
                    info!("Reconnecting primary feed on request");
                    backoff.reset();
                    continue;
                }
                SessionEnd::Failed(reason) => {
                    if !self.emit(FeedEvent::failure(TickSource::Primary, reason)).await {
                        return;
                    }
                }
            }

            let delay = backoff.next_delay();
            debug!(delay_ms = delay.as_millis() as u64, attempt = backoff.attempt(), "Waiting before reconnect");
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
                _ = self.reconnect.requested() => {
                    info!("Reconnect requested during backoff");
                    backoff.reset();
                }
            }
        }
    }

    /// Sends an event to the router. False when the router is gone.
    async fn emit(&self, event: FeedEvent) -> bool {
        if self.events.send(event).await.is_err() {
            warn!("Event channel closed, streaming worker stopping");
            return false;
        }
        true
    }

    async fn session(&mut self, cancel: &CancellationToken, backoff: &mut Backoff) -> SessionEnd {
        let ws = tokio::select! {
            _ = cancel.cancelled() => return SessionEnd::Cancelled,
            result = tokio::time::timeout(self.config.connect_timeout(), connect_async(self.config.url.as_str())) => {
                match result {
                    Err(_) => return self.connect_failed(Error::Timeout("connecting")).await,
                    Ok(Err(e)) => return self.connect_failed(e.into()).await,
                    Ok(Ok((ws, _))) => ws,
                }
            }
        };

        let (mut write, mut read) = ws.split();

        if let Err(e) = write.send(Message::Text(self.protocol.auth_frame(&self.config.api_key))).await {
            return SessionEnd::Failed(FailureReason::ConnectFailed(Error::from(e).to_string()));
        }

        match self.await_auth(cancel, &mut read).await {
            Ok(()) => {}
            Err(end) => return end,
        }

        let connection = ConnectionId::new();
        info!(url = %self.config.url, connection = %connection, "Primary feed connected");
        backoff.reset();
        if !self.emit(FeedEvent::health(TickSource::Primary, ConnectionStatus::Connected)).await {
            return SessionEnd::Cancelled;
        }

        let mut subscribed = self.desired_symbols();
        if !subscribed.is_empty() {
            let frame = self.protocol.subscribe_frame(&subscribed);
            if let Err(e) = write.send(Message::Text(frame)).await {
                return self.disconnected(Error::from(e).to_string()).await;
            }
            info!(count = subscribed.len(), "Subscribed to primary feed");
        }

        let end = self.receive(cancel, &mut write, &mut read, &mut subscribed).await;
        if matches!(end, SessionEnd::Cancelled | SessionEnd::ReconnectRequested) {
            let _ = write.send(Message::Close(None)).await;
        }
        end
    }

    async fn connect_failed(&self, e: Error) -> SessionEnd {
        if e.class() == ErrorClass::Authentication {
            error!(error = %e, "Primary feed rejected credentials");
            let _ = self
                .events
                .send(FeedEvent::health(TickSource::Primary, ConnectionStatus::AuthFailed { reason: e.to_string() }))
                .await;
            return SessionEnd::Failed(FailureReason::AuthFailed(e.to_string()));
        }
        warn!(error = %e, "Primary feed connect failed");
        SessionEnd::Failed(FailureReason::ConnectFailed(e.to_string()))
    }

    async fn disconnected(&self, reason: String) -> SessionEnd {
        let _ = self
            .events
            .send(FeedEvent::health(TickSource::Primary, ConnectionStatus::Disconnected { reason: reason.clone() }))
            .await;
        SessionEnd::Failed(FailureReason::Disconnected(reason))
    }

    async fn await_auth(&self, cancel: &CancellationToken, read: &mut WsRead) -> Result<(), SessionEnd> {
        let deadline = tokio::time::sleep(self.config.auth_timeout());
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(SessionEnd::Cancelled),
                _ = &mut deadline => {
                    warn!("No authentication acknowledgement from primary feed");
                    return Err(SessionEnd::Failed(FailureReason::AuthFailed(
                        Error::Timeout("waiting for authentication").to_string(),
                    )));
                }
                msg = read.next() => {
                    let text = match msg {
                        None => return Err(SessionEnd::Failed(FailureReason::Disconnected("closed during authentication".into()))),
                        Some(Err(e)) => return Err(SessionEnd::Failed(FailureReason::Disconnected(Error::from(e).to_string()))),
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(_)) => continue,
                    };
                    match self.protocol.parse(&text) {
                        Ok(Frame::AuthOk) => return Ok(()),
                        Ok(Frame::AuthRejected(reason)) => {
                            error!(reason = %reason, "Primary feed authentication failed");
                            alert_operations_team_warning(format!("Primary feed authentication failed: {}", reason));
                            let _ = self
                                .events
                                .send(FeedEvent::health(TickSource::Primary, ConnectionStatus::AuthFailed { reason: reason.clone() }))
                                .await;
                            return Err(SessionEnd::Failed(FailureReason::AuthFailed(reason)));
                        }
                        Ok(_) => continue,
                        Err(e) => debug!(error = %e, "Unparseable message before authentication"),
                    }
                }
            }
        }
    }

    /// Current tracked set, capped at `max_symbols`.
    fn desired_symbols(&mut self) -> Vec<Symbol> {
        let mut symbols = self.symbols.borrow_and_update().clone();
        if symbols.len() > self.config.max_symbols {
            let dropped: Vec<String> = symbols
                .drain(self.config.max_symbols..)
                .map(String::from)
                .collect();
            warn!(
                max_symbols = self.config.max_symbols,
                dropped = ?dropped,
                "Symbol set exceeds streaming limit, excess not subscribed"
            );
        }
        symbols
    }

    async fn resubscribe(&mut self, write: &mut WsWrite, subscribed: &mut Vec<Symbol>) -> Result<(), Error> {
        let desired = self.desired_symbols();
        let (removed, added) = {
            let current: HashSet<&Symbol> = subscribed.iter().collect();
            let wanted: HashSet<&Symbol> = desired.iter().collect();
            let removed: Vec<Symbol> = subscribed.iter().filter(|s| !wanted.contains(s)).cloned().collect();
            let added: Vec<Symbol> = desired.iter().filter(|s| !current.contains(s)).cloned().collect();
            (removed, added)
        };

        if !removed.is_empty() {
            write.send(Message::Text(self.protocol.unsubscribe_frame(&removed))).await?;
        }
        if !added.is_empty() {
            write.send(Message::Text(self.protocol.subscribe_frame(&added))).await?;
        }
        if !removed.is_empty() || !added.is_empty() {
            info!(added = added.len(), removed = removed.len(), "Primary subscription updated");
        }
        *subscribed = desired;
        Ok(())
    }

    async fn receive(
        &mut self,
        cancel: &CancellationToken,
        write: &mut WsWrite,
        read: &mut WsRead,
        subscribed: &mut Vec<Symbol>,
    ) -> SessionEnd {
        let silence_timeout = self.config.silence_timeout();
        let silence = tokio::time::sleep(silence_timeout);
        tokio::pin!(silence);
        let mut last_message = Instant::now();
        let mut symbols_open = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                _ = self.reconnect.requested() => {
                    let _ = self
                        .events
                        .send(FeedEvent::health(TickSource::Primary, ConnectionStatus::Disconnected { reason: "manual reconnect".into() }))
                        .await;
                    return SessionEnd::ReconnectRequested;
                }
                changed = self.symbols.changed(), if symbols_open => {
                    if changed.is_err() {
                        symbols_open = false;
                        continue;
                    }
                    if let Err(e) = self.resubscribe(write, subscribed).await {
                        return self.disconnected(e.to_string()).await;
                    }
                }
                _ = &mut silence => {
                    let silent_ms = last_message.elapsed().as_millis() as u64;
                    warn!(silent_ms, "Primary feed silent, dropping connection");
                    let _ = self
                        .events
                        .send(FeedEvent::health(TickSource::Primary, ConnectionStatus::Disconnected {
                            reason: Error::SilenceTimeout { silent_ms }.to_string(),
                        }))
                        .await;
                    return SessionEnd::Failed(FailureReason::Silence { silent_ms });
                }
                msg = read.next() => {
                    last_message = Instant::now();
                    silence.as_mut().reset(last_message + silence_timeout);

                    match msg {
                        None => return self.disconnected("stream ended".into()).await,
                        Some(Err(e)) => return self.disconnected(Error::from(e).to_string()).await,
                        Some(Ok(Message::Text(text))) => {
                            if !self.handle_text(&text).await {
                                return SessionEnd::Cancelled;
                            }
                        }
                        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                            Ok(text) => {
                                if !self.handle_text(&text).await {
                                    return SessionEnd::Cancelled;
                                }
                            }
                            Err(_) => debug!("Ignoring non UTF-8 binary frame"),
                        },
                        Some(Ok(Message::Ping(payload))) => {
                            if let Err(e) = write.send(Message::Pong(payload)).await {
                                return self.disconnected(Error::from(e).to_string()).await;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "Primary feed closed by server");
                            return self.disconnected("closed by server".into()).await;
                        }
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    }

    /// Returns false when the router is gone.
    async fn handle_text(&self, text: &str) -> bool {
        let received_at = Timestamp::now();
        let event = match self.protocol.parse(text) {
            Ok(Frame::Quote(quote)) => match quote.into_tick(TickSource::Primary, received_at) {
                Ok(tick) => {
                    TICKS_RECEIVED.with_label_values(&[TickSource::Primary.as_str()]).inc();
                    let tick = self.enricher.enrich(tick).await;
                    FeedEvent::tick(tick, received_at)
                }
                Err(e) => {
                    warn!(error = %e, "Unusable quote from primary feed");
                    FeedEvent::failure(TickSource::Primary, FailureReason::InvalidData(e.to_string()))
                }
            },
            Ok(_) => return true,
            Err(e) => {
                warn!(error = %e, "Malformed message from primary feed");
                FeedEvent::failure(TickSource::Primary, FailureReason::ParseError(e.to_string()))
            }
        };
        self.emit(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use crate::config::feed::BackoffConfig;
    use crate::price_infra::connectors::JsonStreamProtocol;

    fn config(url: String) -> StreamingConfig {
        StreamingConfig {
            url,
            api_key: "secret".into(),
            max_symbols: 1,
            connect_timeout_ms: 1_000,
            auth_timeout_ms: 1_000,
            silence_timeout_ms: 5_000,
            backoff: BackoffConfig {
                initial_ms: 50,
                max_ms: 100,
                multiplier: 2.0,
                jitter: 0.0,
            },
        }
    }

    async fn next_event(rx: &mut mpsc::Receiver<FeedEvent>) -> FeedEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    async fn next_frame(rx: &mut mpsc::UnboundedReceiver<serde_json::Value>) -> serde_json::Value {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("server stopped")
    }

    #[tokio::test]
    async fn authenticates_subscribes_and_emits_ticks() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            let auth = ws.next().await.unwrap().unwrap().into_text().unwrap();
            assert!(auth.contains("secret"));
            ws.send(Message::Text(r#"{"type":"auth","status":"ok"}"#.into())).await.unwrap();

            let sub = ws.next().await.unwrap().unwrap().into_text().unwrap();
            let sub: serde_json::Value = serde_json::from_str(&sub).unwrap();
            assert_eq!(sub["symbols"], serde_json::json!(["AAPL"]));

            ws.send(Message::Text("garbage".into())).await.unwrap();
            ws.send(Message::Text(
                r#"{"type":"quote","symbol":"AAPL","price":150.25,"volume":10,"timestamp":1}"#.into(),
            ))
            .await
            .unwrap();
            // Hold the connection open until the client goes away.
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (events_tx, mut events_rx) = mpsc::channel(16);
        let symbols = vec![Symbol::new("AAPL").unwrap(), Symbol::new("MSFT").unwrap()];
        let (_symbols_tx, symbols_rx) = watch::channel(symbols);
        let client = StreamingIngestionClient::new(
            config(url),
            JsonStreamProtocol,
            events_tx,
            symbols_rx,
            TickEnricher::disabled(),
            ReconnectSignal::new(),
        );
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(client.run(cancel.clone()));

        match next_event(&mut events_rx).await {
            FeedEvent::HealthChanged { status: ConnectionStatus::Connected, .. } => {}
            other => panic!("expected connected, got {:?}", other),
        }
        match next_event(&mut events_rx).await {
            FeedEvent::SourceFailure { reason: FailureReason::ParseError(_), .. } => {}
            other => panic!("expected parse failure, got {:?}", other),
        }
        match next_event(&mut events_rx).await {
            FeedEvent::TickReceived { tick, .. } => {
                assert_eq!(tick.symbol().as_str(), "AAPL");
                assert_eq!(tick.source(), TickSource::Primary);
                assert!(tick.is_real_time());
            }
            other => panic!("expected tick, got {:?}", other),
        }

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), worker).await.unwrap().unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn auth_rejection_reports_failure_and_retries() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = accept_async(stream).await.unwrap();
                let _ = ws.next().await;
                let _ = ws
                    .send(Message::Text(r#"{"type":"auth","status":"error","message":"bad key"}"#.into()))
                    .await;
            }
        });

        let (events_tx, mut events_rx) = mpsc::channel(16);
        let (_symbols_tx, symbols_rx) = watch::channel(Vec::new());
        let client = StreamingIngestionClient::new(
            config(url),
            JsonStreamProtocol,
            events_tx,
            symbols_rx,
            TickEnricher::disabled(),
            ReconnectSignal::new(),
        );
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(client.run(cancel.clone()));

        let mut auth_failures = 0;
        while auth_failures < 2 {
            if let FeedEvent::SourceFailure { reason: FailureReason::AuthFailed(msg), .. } = next_event(&mut events_rx).await {
                assert_eq!(msg, "bad key");
                auth_failures += 1;
            }
        }

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), worker).await.unwrap().unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn connect_failure_is_reported() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        let (events_tx, mut events_rx) = mpsc::channel(16);
        let (_symbols_tx, symbols_rx) = watch::channel(Vec::new());
        let client = StreamingIngestionClient::new(
            config(url),
            JsonStreamProtocol,
            events_tx,
            symbols_rx,
            TickEnricher::disabled(),
            ReconnectSignal::new(),
        );
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(client.run(cancel.clone()));

        match next_event(&mut events_rx).await {
            FeedEvent::SourceFailure { reason: FailureReason::ConnectFailed(_), source, .. } => {
                assert_eq!(source, TickSource::Primary);
            }
            other => panic!("expected connect failure, got {:?}", other),
        }

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), worker).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn manual_reconnect_drops_live_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let mut ws = accept_async(stream).await.unwrap();
                    let _ = ws.next().await;
                    let _ = ws.send(Message::Text(r#"{"type":"auth","status":"ok"}"#.into())).await;
                    while let Some(Ok(_)) = ws.next().await {}
                });
            }
        });

        let (events_tx, mut events_rx) = mpsc::channel(16);
        let (_symbols_tx, symbols_rx) = watch::channel(Vec::new());
        let reconnect = ReconnectSignal::new();
        let client = StreamingIngestionClient::new(
            config(url),
            JsonStreamProtocol,
            events_tx,
            symbols_rx,
            TickEnricher::disabled(),
            reconnect.clone(),
        );
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(client.run(cancel.clone()));

        assert!(matches!(
            next_event(&mut events_rx).await,
            FeedEvent::HealthChanged { status: ConnectionStatus::Connected, .. }
        ));
        reconnect.request();
        assert!(matches!(
            next_event(&mut events_rx).await,
            FeedEvent::HealthChanged { status: ConnectionStatus::Disconnected { .. }, .. }
        ));
        assert!(matches!(
            next_event(&mut events_rx).await,
            FeedEvent::HealthChanged { status: ConnectionStatus::Connected, .. }
        ));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), worker).await.unwrap().unwrap();
        server.abort();
    }
    #[tokio::test]
    async fn silent_connection_is_dropped_and_retried() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        // Authenticates, then never sends another message.
        let server = tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let mut ws = accept_async(stream).await.unwrap();
                    let _ = ws.next().await;
                    let _ = ws.send(Message::Text(r#"{"type":"auth","status":"ok"}"#.into())).await;
                    while let Some(Ok(_)) = ws.next().await {}
                });
            }
        });

        let (events_tx, mut events_rx) = mpsc::channel(16);
        let (_symbols_tx, symbols_rx) = watch::channel(vec![Symbol::new("AAPL").unwrap()]);
        let mut cfg = config(url);
        cfg.silence_timeout_ms = 200;
        let client = StreamingIngestionClient::new(
            cfg,
            JsonStreamProtocol,
            events_tx,
            symbols_rx,
            TickEnricher::disabled(),
            ReconnectSignal::new(),
        );
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(client.run(cancel.clone()));

        assert!(matches!(
            next_event(&mut events_rx).await,
            FeedEvent::HealthChanged { status: ConnectionStatus::Connected, .. }
        ));
        assert!(matches!(
            next_event(&mut events_rx).await,
            FeedEvent::HealthChanged { status: ConnectionStatus::Disconnected { .. }, .. }
        ));
        match next_event(&mut events_rx).await {
            FeedEvent::SourceFailure { reason: FailureReason::Silence { silent_ms }, source, .. } => {
                assert_eq!(source, TickSource::Primary);
                assert!(silent_ms >= 200);
            }
            other => panic!("expected silence failure, got {:?}", other),
        }
        assert!(matches!(
            next_event(&mut events_rx).await,
            FeedEvent::HealthChanged { status: ConnectionStatus::Connected, .. }
        ));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), worker).await.unwrap().unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn symbol_change_updates_live_subscription() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<serde_json::Value>();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _ = ws.next().await;
            ws.send(Message::Text(r#"{"type":"auth","status":"ok"}"#.into())).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if let Ok(text) = msg.into_text() {
                    if let Ok(frame) = serde_json::from_str(&text) {
                        let _ = frames_tx.send(frame);
                    }
                }
            }
        });

        let (events_tx, mut events_rx) = mpsc::channel(16);
        let (symbols_tx, symbols_rx) = watch::channel(vec![Symbol::new("AAPL").unwrap()]);
        let client = StreamingIngestionClient::new(
            config(url),
            JsonStreamProtocol,
            events_tx,
            symbols_rx,
            TickEnricher::disabled(),
            ReconnectSignal::new(),
        );
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(client.run(cancel.clone()));

        assert!(matches!(
            next_event(&mut events_rx).await,
            FeedEvent::HealthChanged { status: ConnectionStatus::Connected, .. }
        ));
        let initial = next_frame(&mut frames_rx).await;
        assert_eq!(initial["action"], "subscribe");
        assert_eq!(initial["symbols"], serde_json::json!(["AAPL"]));

        symbols_tx.send(vec![Symbol::new("MSFT").unwrap()]).unwrap();
        let unsubscribe = next_frame(&mut frames_rx).await;
        assert_eq!(unsubscribe["action"], "unsubscribe");
        assert_eq!(unsubscribe["symbols"], serde_json::json!(["AAPL"]));
        let subscribe = next_frame(&mut frames_rx).await;
        assert_eq!(subscribe["action"], "subscribe");
        assert_eq!(subscribe["symbols"], serde_json::json!(["MSFT"]));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), worker).await.unwrap().unwrap();
        server.abort();
    }
}
