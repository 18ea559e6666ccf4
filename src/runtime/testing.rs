//! Mock implementations for testing
//!
//! These mocks enable integration testing of the runtime without a socket.

use super::traits::MessageSink;
use super::{ConversationHandle, ConversationRuntime};
use crate::protocol::OutboundMessage;
use crate::state_machine::{ConvContext, Conversation};
use crate::transport::{ConnectionState, Delivery, TransportError, TransportEvent};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// Recording Sink
// ============================================================================

/// Sink that records every prompt it is handed
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<OutboundMessage>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send(&self, message: OutboundMessage) -> Result<Delivery, TransportError> {
        self.sent.lock().unwrap().push(message);
        Ok(Delivery::Sent)
    }
}

// ============================================================================
// Test Runtime
// ============================================================================

/// Runtime whose transport side is driven by the test
pub struct TestRuntime {
    pub handle: ConversationHandle,
    pub sink: Arc<RecordingSink>,
    transport_tx: mpsc::Sender<TransportEvent>,
}

#[allow(dead_code)]
impl TestRuntime {
    pub fn new() -> Self {
        Self::with_context(ConvContext::default())
    }

    pub fn with_context(context: ConvContext) -> Self {
        let sink = Arc::new(RecordingSink::new());
        let (transport_tx, transport_rx) = mpsc::channel(64);
        let runtime = ConversationRuntime::new(context, sink.clone(), transport_rx);
        let handle = runtime.handle(None);
        tokio::spawn(runtime.run());

        Self {
            handle,
            sink,
            transport_tx,
        }
    }

    /// Report a fresh connection and wait for it to be applied
    pub async fn connect(&self) {
        self.status(ConnectionState::Connecting).await;
        self.status(ConnectionState::Connected).await;
        assert!(
            self.wait_until(|c| c.connection().is_connected()).await,
            "Runtime never saw the connection"
        );
    }

    pub async fn status(&self, status: ConnectionState) {
        self.transport_tx
            .send(TransportEvent::Status(status))
            .await
            .expect("Runtime stopped");
    }

    /// Deliver one raw frame as if read from the socket
    pub async fn frame(&self, raw: &str) {
        self.transport_tx
            .send(TransportEvent::Frame(raw.to_string()))
            .await
            .expect("Runtime stopped");
    }

    /// Send a prompt and wait until its placeholder is in the transcript
    pub async fn send(&self, text: &str) -> String {
        let id = self.handle.send_message(text).await.expect("Runtime stopped");
        let target = id.clone();
        assert!(
            self.wait_until(move |c| c
                .transcript()
                .iter()
                .any(|e| e.correlation_id.as_deref() == Some(target.as_str())))
                .await,
            "Prompt never reached the transcript"
        );
        id
    }

    /// Push a marker frame and wait for it, so every earlier frame is applied
    pub async fn flush(&self) {
        let marker = format!("marker-{}", uuid::Uuid::new_v4());
        self.frame(&format!(r#"{{"type":"agent_start","agent_type":"{marker}"}}"#))
            .await;
        assert!(
            self.wait_until(|c| c.agents().contains_key(&marker)).await,
            "Marker frame was never applied"
        );
        self.frame(&format!(r#"{{"type":"agent_complete","agent_type":"{marker}"}}"#))
            .await;
        assert!(self.wait_until(|c| !c.agents().contains_key(&marker)).await);
    }

    /// Wait up to two seconds for the snapshot to satisfy `predicate`
    pub async fn wait_until(&self, predicate: impl Fn(&Conversation) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while tokio::time::Instant::now() < deadline {
            if predicate(&self.handle.snapshot()) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        predicate(&self.handle.snapshot())
    }

    pub fn snapshot(&self) -> Conversation {
        self.handle.snapshot()
    }
}

impl Default for TestRuntime {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DedupStrategy, SessionContext};
    use crate::state_machine::{
        ConvState, EntryKind, CONNECTED_NOTICE, DISCONNECTED_NOTICE, PLACEHOLDER_TEXT,
    };
    use crate::transport::testing::{MockConnector, MockPeer};
    use crate::transport::{TransportConfig, TransportManager};

    fn texts(conv: &Conversation) -> Vec<String> {
        conv.transcript().iter().map(|e| e.text.clone()).collect()
    }

    #[tokio::test]
    async fn test_streamed_reply_fills_placeholder() {
        let rt = TestRuntime::new();
        rt.connect().await;

        let id = rt.send("hello").await;
        let conv = rt.snapshot();
        assert_eq!(texts(&conv), vec![CONNECTED_NOTICE, "hello", PLACEHOLDER_TEXT]);
        assert_eq!(conv.active_correlation_id(), Some(id.as_str()));
        assert!(id.starts_with("ai-response-"));

        rt.frame(r#"{"type":"stream","content":"Hi"}"#).await;
        rt.frame(r#"{"type":"stream","content":" there"}"#).await;
        rt.frame(r#"{"type":"complete"}"#).await;
        assert!(rt.wait_until(|c| c.state() == &ConvState::Idle).await);

        let conv = rt.snapshot();
        assert_eq!(conv.streaming(), "");
        assert_eq!(conv.transcript()[2].text, "Hi there");
        assert_eq!(rt.sink.sent().len(), 1);
        assert_eq!(rt.sink.sent()[0].prompt, "hello");
    }

    #[tokio::test]
    async fn test_failure_clears_agents() {
        let rt = TestRuntime::new();
        rt.connect().await;
        rt.send("q").await;

        rt.frame(r#"{"type":"agent_start","agent_type":"sql","content":""}"#)
            .await;
        assert!(rt.wait_until(|c| c.agents().contains_key("sql")).await);
        assert_eq!(rt.snapshot().agents()["sql"].content, "Processing...");

        rt.frame(r#"{"success":false,"message":"boom"}"#).await;
        assert!(rt.wait_until(|c| c.transcript().last().is_some_and(|e| e.text == "boom")).await);

        let conv = rt.snapshot();
        assert_eq!(conv.transcript().last().unwrap().kind, EntryKind::Error);
        assert!(conv.agents().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_success_within_window_appends_once() {
        let rt = TestRuntime::new();
        rt.connect().await;
        rt.send("q").await;

        let frame = r#"{"success":true,"response":"A, B, A, C","steps":[{"agent":"sql"},{"agent":"end"}]}"#;
        rt.frame(frame).await;
        rt.frame(frame).await;
        rt.flush().await;

        let answers = rt
            .snapshot()
            .transcript()
            .iter()
            .filter(|e| e.text == "A\n\nB\n\nC")
            .count();
        assert_eq!(answers, 1);
    }

    async fn late_duplicate_count(dedup: DedupStrategy) -> usize {
        let rt = TestRuntime::with_context(ConvContext {
            dedup,
            debounce: Duration::from_millis(20),
            ..ConvContext::default()
        });
        rt.connect().await;
        rt.send("q").await;

        let frame = r#"{"success":true,"response":"answer","steps":[]}"#;
        rt.frame(frame).await;
        assert!(rt.wait_until(|c| c.state() == &ConvState::Idle).await);
        assert!(rt.wait_until(|c| !c.is_finalizing()).await);

        rt.frame(frame).await;
        rt.flush().await;
        rt.snapshot()
            .transcript()
            .iter()
            .filter(|e| e.text == "answer")
            .count()
    }

    #[tokio::test]
    async fn test_late_duplicate_depends_on_dedup_strategy() {
        // The timed guard lets a duplicate through once the window passes
        assert_eq!(late_duplicate_count(DedupStrategy::Debounce).await, 2);
        // Retiring the exchange rejects it regardless of timing
        assert_eq!(late_duplicate_count(DedupStrategy::ActiveExchange).await, 1);
    }

    #[tokio::test]
    async fn test_malformed_frame_reports_parse_failure() {
        let rt = TestRuntime::new();
        rt.connect().await;
        rt.send("q").await;
        rt.frame(r#"{"type":"stream","content":"part"}"#).await;
        rt.frame("{not json").await;
        assert!(rt
            .wait_until(|c| c
                .transcript()
                .last()
                .is_some_and(|e| e.text == "Failed to parse server message"))
            .await);

        let conv = rt.snapshot();
        assert_eq!(conv.streaming(), "part");
        assert!(conv.active_correlation_id().is_some());
    }

    #[tokio::test]
    async fn test_prompts_carry_session_context() {
        let session = SessionContext {
            company_id: "673744c2".to_string(),
            chat_room_id: "679397c7".to_string(),
            company_name: "acme".to_string(),
            user_id: "673744c3".to_string(),
        };
        let rt = TestRuntime::with_context(ConvContext {
            session: session.clone(),
            ..ConvContext::default()
        });
        rt.connect().await;
        rt.send("how many orders?").await;

        assert_eq!(rt.sink.sent(), vec![session.outbound("how many orders?")]);
    }

    #[tokio::test]
    async fn test_empty_prompt_is_rejected() {
        let rt = TestRuntime::new();
        rt.connect().await;
        rt.handle.send_message("   ").await.unwrap();
        rt.send("real").await;

        assert_eq!(texts(&rt.snapshot()), vec![CONNECTED_NOTICE, "real", PLACEHOLDER_TEXT]);
        assert_eq!(rt.sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_notices_per_transition_not_per_retry() {
        let rt = TestRuntime::new();
        rt.connect().await;
        rt.status(ConnectionState::Disconnected).await;
        for _ in 0..3 {
            rt.status(ConnectionState::Connecting).await;
            rt.status(ConnectionState::Disconnected).await;
        }
        rt.connect().await;

        assert_eq!(
            texts(&rt.snapshot()),
            vec![CONNECTED_NOTICE, DISCONNECTED_NOTICE, CONNECTED_NOTICE]
        );
    }

    #[tokio::test]
    async fn test_full_stack_reconnect() {
        let connector = MockConnector::new();
        let mut first = connector.queue_accept();
        let second = connector.queue_accept();
        let (transport, transport_rx) = TransportManager::open(
            TransportConfig::new("ws://test.invalid/ws").with_retry_interval(Duration::from_millis(20)),
            connector.clone(),
        );
        let runtime = ConversationRuntime::new(
            ConvContext::default(),
            transport.clone(),
            transport_rx,
        );
        let handle = runtime.handle(Some(transport.clone()));
        tokio::spawn(runtime.run());

        transport.connect().await.unwrap();
        first.push(r#"{"type":"stream","content":"ignored"}"#);
        first.hang_up();

        let mut rx = handle.subscribe();
        let reconnected = tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|c| c.transcript().len() == 3),
        )
        .await
        .is_ok_and(|seen| seen.is_ok());
        assert!(reconnected, "Never reconnected");
        assert_eq!(
            texts(&handle.snapshot()),
            vec![CONNECTED_NOTICE, DISCONNECTED_NOTICE, CONNECTED_NOTICE]
        );
        assert_eq!(connector.attempts(), 2);

        handle.send_message("hello").await.unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while second.sent().is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let sent: serde_json::Value = serde_json::from_str(&second.sent()[0]).unwrap();
        assert_eq!(sent["prompt"], "hello");
        assert_eq!(sent["company_name"], "demo");

        handle.close();
        handle.close();
        let closed = tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|c| !c.connection().is_connected()),
        )
        .await
        .is_ok_and(|seen| seen.is_ok());
        assert!(closed, "Close never reached the runtime");
    }

    async fn wait_for_sent(peer: &MockPeer) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while peer.sent().is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        peer.sent()
    }

    #[tokio::test]
    async fn test_reply_lands_when_prompt_outruns_connected_status() {
        let connector = MockConnector::new();
        let peer = connector.queue_accept();
        let (transport, transport_rx) = TransportManager::open(
            TransportConfig::new("ws://test.invalid/ws"),
            connector.clone(),
        );
        transport.connect().await.unwrap();
        let mut status = transport.watch_status();
        let connected = tokio::time::timeout(
            Duration::from_secs(2),
            status.wait_for(|s| s.is_connected()),
        )
        .await
        .is_ok_and(|seen| seen.is_ok());
        assert!(connected);

        // The prompt is queued before the runtime has seen any status change
        let runtime = ConversationRuntime::new(
            ConvContext::default(),
            transport.clone(),
            transport_rx,
        );
        let handle = runtime.handle(Some(transport.clone()));
        let id = handle.send_message("hello").await.unwrap();
        tokio::spawn(runtime.run());

        assert_eq!(wait_for_sent(&peer).await.len(), 1);
        peer.push(r#"{"type":"stream","content":"Hi"}"#);
        peer.push(r#"{"type":"complete"}"#);

        let mut rx = handle.subscribe();
        let target = id.clone();
        let answered = tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(move |c| {
                c.state() == &ConvState::Idle
                    && c.transcript()
                        .iter()
                        .any(|e| e.correlation_id.as_deref() == Some(target.as_str()) && e.text == "Hi")
            }),
        )
        .await
        .is_ok_and(|seen| seen.is_ok());
        assert!(answered, "Reply never reached the placeholder");

        let conv = handle.snapshot();
        let placeholder = conv
            .transcript()
            .iter()
            .find(|e| e.correlation_id.as_deref() == Some(id.as_str()))
            .unwrap();
        assert!(!placeholder.interrupted);
        assert!(conv.transcript().iter().any(|e| e.text == CONNECTED_NOTICE));
        handle.close();
    }

    #[tokio::test]
    async fn test_prompt_dropped_by_transport_is_interrupted() {
        // No queued outcome: the connector refuses every dial
        let connector = MockConnector::new();
        let (transport, transport_rx) = TransportManager::open(
            TransportConfig::new("ws://test.invalid/ws"),
            connector.clone(),
        );
        let runtime = ConversationRuntime::new(
            ConvContext::default(),
            transport.clone(),
            transport_rx,
        );
        let handle = runtime.handle(Some(transport.clone()));
        tokio::spawn(runtime.run());

        let id = handle.send_message("hello").await.unwrap();
        let mut rx = handle.subscribe();
        let target = id.clone();
        let interrupted = tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(move |c| {
                c.transcript()
                    .iter()
                    .any(|e| e.correlation_id.as_deref() == Some(target.as_str()) && e.interrupted)
            }),
        )
        .await
        .is_ok_and(|seen| seen.is_ok());
        assert!(interrupted, "Dropped prompt was never flagged");

        let conv = handle.snapshot();
        assert_eq!(conv.state(), &ConvState::Idle);
        assert_eq!(texts(&conv), vec!["hello", PLACEHOLDER_TEXT]);
        assert!(connector.wait_for_attempts(1, Duration::from_secs(2)).await);
        handle.close();
    }
}
