// =============================================================================
// WebSocket Handler: push-only candle + analysis stream
// =============================================================================
//
// Clients connect to `/ws` and receive, every cycle:
//   {"type":"kline","data":{...}}
//   {"type":"llm_analysis","data":{...}}
//
// Nothing the client sends is interpreted; inbound frames only matter for
// detecting that the peer went away. Each connection:
//   1. registers a listener with the broadcast hub,
//   2. forwards queued messages to the socket, each send bounded by
//      `send_timeout`,
//   3. unregisters on Close, read error, send failure/timeout, or when the
//      hub has already dropped it for falling behind.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::app_state::AppState;

/// Axum handler for the WebSocket upgrade request.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Why a connection loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    ClientClosed,
    ReadError,
    SendFailed,
    SendTimedOut,
    DroppedByHub,
}

/// Manages a single WebSocket connection lifecycle.
async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>) {
    let mut listener = state.hub.register();
    let id = listener.id();
    let (mut sender, mut receiver) = socket.split();
    info!(listener = %id, "WebSocket connection opened");

    let reason = loop {
        tokio::select! {
            // ── Outbound: forward hub messages ──────────────────────────
            outbound = listener.recv() => {
                let Some(payload) = outbound else {
                    break CloseReason::DroppedByHub;
                };
                match timeout(state.send_timeout, sender.send(Message::Text(payload.to_string()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!(listener = %id, error = %e, "WebSocket send failed");
                        break CloseReason::SendFailed;
                    }
                    Err(_) => {
                        warn!(
                            listener = %id,
                            timeout_ms = state.send_timeout.as_millis() as u64,
                            "WebSocket send timed out"
                        );
                        break CloseReason::SendTimedOut;
                    }
                }
            }

            // ── Inbound: only used to detect disconnects ────────────────
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => break CloseReason::ClientClosed,
                    Some(Ok(_)) => {
                        // Text/Binary are ignored; Ping is answered by axum.
                    }
                    Some(Err(e)) => {
                        debug!(listener = %id, error = %e, "WebSocket receive error");
                        break CloseReason::ReadError;
                    }
                }
            }
        }
    };

    state.hub.unregister(id);
    let _ = timeout(state.send_timeout, sender.close()).await;
    info!(listener = %id, reason = ?reason, "WebSocket connection closed");
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::NaiveDate;
    use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

    use crate::api::rest::router;
    use crate::market_data::RandomWalkGenerator;
    use crate::runtime_config::RuntimeConfig;
    use crate::scheduler::{CycleReport, UpdateScheduler};
    use crate::signals::SimulatedAnalyst;
    use crate::types::StreamMessage;

    async fn serve(state: Arc<AppState>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("ws://{addr}/ws")
    }

    fn seeded_state() -> Arc<AppState> {
        seeded_state_with(RuntimeConfig::default())
    }

    fn seeded_state_with(config: RuntimeConfig) -> Arc<AppState> {
        let state = Arc::new(AppState::new(&config));
        let anchor = NaiveDate::from_ymd_opt(2025, 6, 30)
            .unwrap()
            .and_hms_opt(10, 2, 0)
            .unwrap();
        let generator = RandomWalkGenerator::with_seed(31).anchored_at(anchor);
        state.series.seed(&generator, 3).unwrap();
        state
    }

    async fn wait_for_listeners(state: &AppState, n: usize) {
        for _ in 0..200 {
            if state.hub.listener_count() == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {n} listeners, have {}",
            state.hub.listener_count()
        );
    }

    async fn next_stream_message<S>(stream: &mut S) -> StreamMessage
    where
        S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), stream.next())
                .await
                .expect("timed out waiting for frame")
                .expect("stream ended")
                .expect("read error");
            if let WsMessage::Text(text) = frame {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn client_receives_kline_then_analysis() {
        let state = seeded_state();
        let url = serve(state.clone()).await;

        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
        wait_for_listeners(&state, 1).await;

        let scheduler = UpdateScheduler::new(
            state.series.clone(),
            state.hub.clone(),
            Arc::new(RandomWalkGenerator::with_seed(32)),
            Arc::new(SimulatedAnalyst::with_seed(32)),
            Duration::from_secs(5),
            20,
        );
        assert!(matches!(
            scheduler.run_cycle(),
            CycleReport::Published {
                kline_receivers: 1,
                analysis_receivers: 1
            }
        ));

        let first = next_stream_message(&mut ws).await;
        let second = next_stream_message(&mut ws).await;
        let last = state.series.last().unwrap();
        assert_eq!(first, StreamMessage::Kline(last.clone()));
        match second {
            StreamMessage::LlmAnalysis(result) => assert_eq!(result.timestamp, last.time),
            other => panic!("expected analysis, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn inbound_text_is_ignored() {
        let state = seeded_state();
        let url = serve(state.clone()).await;

        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
        wait_for_listeners(&state, 1).await;

        ws.send(WsMessage::Text("hello".into())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(state.hub.listener_count(), 1);
    }

    #[tokio::test]
    async fn close_unregisters_listener() {
        let state = seeded_state();
        let url = serve(state.clone()).await;

        let (mut a, _) = connect_async(url.as_str()).await.unwrap();
        let (mut b, _) = connect_async(url.as_str()).await.unwrap();
        wait_for_listeners(&state, 2).await;

        a.close(None).await.unwrap();
        wait_for_listeners(&state, 1).await;

        // The remaining client still gets the stream.
        state.hub.publish(&StreamMessage::Kline(state.series.last().unwrap()));
        assert!(matches!(
            next_stream_message(&mut b).await,
            StreamMessage::Kline(_)
        ));
    }

    #[tokio::test]
    async fn abrupt_drop_unregisters_listener() {
        let state = seeded_state();
        let url = serve(state.clone()).await;

        let (ws, _) = connect_async(url.as_str()).await.unwrap();
        wait_for_listeners(&state, 1).await;

        drop(ws);
        wait_for_listeners(&state, 0).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stalled_client_is_dropped_after_send_timeout() {
        // Deep queue so the socket write, not the hub, is what gives out.
        let state = seeded_state_with(RuntimeConfig {
            send_timeout_ms: 50,
            listener_queue_depth: 1 << 16,
            ..RuntimeConfig::default()
        });
        let url = serve(state.clone()).await;

        // Never polled: its socket buffers fill up and server writes stall.
        let (_stalled, _) = connect_async(url.as_str()).await.unwrap();
        wait_for_listeners(&state, 1).await;

        let (mut healthy, _) = connect_async(url.as_str()).await.unwrap();
        wait_for_listeners(&state, 2).await;
        let expected = StreamMessage::Kline(state.series.last().unwrap());
        let reader = tokio::spawn(async move {
            loop {
                let frame = healthy.next().await.expect("stream ended").expect("read error");
                if let WsMessage::Text(text) = frame {
                    if let Ok(msg) = serde_json::from_str::<StreamMessage>(&text) {
                        return msg;
                    }
                }
            }
        });

        let filler: Arc<str> = Arc::from("x".repeat(128 * 1024));
        let mut flooded = 0;
        while state.hub.listener_count() == 2 {
            assert!(flooded < 3_000, "stalled client was never dropped");
            state.hub.publish_raw(filler.clone());
            flooded += 1;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(state.hub.listener_count(), 1);

        // The healthy client is unaffected and still receives the stream.
        assert_eq!(state.hub.publish(&expected), 1);
        let got = tokio::time::timeout(Duration::from_secs(10), reader)
            .await
            .expect("healthy client timed out")
            .unwrap();
        assert_eq!(got, expected);
    }
}
