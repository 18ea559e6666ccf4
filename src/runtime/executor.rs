//! Conversation runtime executor

use super::traits::MessageSink;
use super::ConversationHandle;
use crate::protocol::decode;
use crate::state_machine::{transition, ConvContext, Conversation, Effect, Event};
use crate::transport::{Delivery, TransportEvent, TransportHandle};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Single task that owns the conversation and applies events in order
pub struct ConversationRuntime<S>
where
    S: MessageSink + 'static,
{
    context: ConvContext,
    sink: Arc<S>,
    /// User messages and timer events
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    transport_rx: mpsc::Receiver<TransportEvent>,
    snapshot_tx: watch::Sender<Conversation>,
}

impl<S> ConversationRuntime<S>
where
    S: MessageSink + 'static,
{
    pub fn new(context: ConvContext, sink: S, transport_rx: mpsc::Receiver<TransportEvent>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(32);
        let (snapshot_tx, _) = watch::channel(Conversation::new());
        Self {
            context,
            sink: Arc::new(sink),
            event_rx,
            event_tx,
            transport_rx,
            snapshot_tx,
        }
    }

    /// Handle for callers; `transport` is closed by [`ConversationHandle::close`]
    pub fn handle(&self, transport: Option<TransportHandle>) -> ConversationHandle {
        ConversationHandle {
            event_tx: self.event_tx.clone(),
            snapshot_rx: self.snapshot_tx.subscribe(),
            transport,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(dedup = ?self.context.dedup, "Starting conversation runtime");

        // Process events in a loop, one at a time
        loop {
            tokio::select! {
                Some(event) = self.event_rx.recv() => self.process_event(event).await,
                transport_event = self.transport_rx.recv() => match transport_event {
                    Some(TransportEvent::Frame(raw)) => {
                        self.process_event(Event::Server(decode(&raw))).await;
                    }
                    Some(TransportEvent::Status(status)) => {
                        self.process_event(Event::Connection(status)).await;
                    }
                    None => break,
                },
            }
        }

        tracing::info!("Conversation runtime stopped");
    }

    async fn process_event(&mut self, event: Event) {
        // Effects may generate follow-up events; handle them before the next input
        let mut events_to_process = vec![event];

        while let Some(current_event) = events_to_process.pop() {
            // Exchange a terminal frame will retire, for the log line below
            let finishing = match &current_event {
                Event::Server(server) if server.is_terminal() => self
                    .snapshot_tx
                    .borrow()
                    .active_correlation_id()
                    .map(str::to_owned),
                _ => None,
            };

            // Pure state transition; the snapshot only changes on success
            let mut outcome = None;
            self.snapshot_tx.send_if_modified(|conv| {
                let result = transition(conv, &self.context, current_event);
                let applied = result.is_ok();
                outcome = Some(result);
                applied
            });

            let result = match outcome {
                Some(Ok(result)) => result,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Rejected event");
                    continue;
                }
                None => continue,
            };

            if let Some(correlation_id) = finishing {
                tracing::debug!(%correlation_id, "Exchange finished");
            }

            for effect in result.effects {
                if let Some(generated_event) = self.execute_effect(effect).await {
                    events_to_process.push(generated_event);
                }
            }
        }
    }

    async fn execute_effect(&self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::Send {
                correlation_id,
                message,
            } => match self.sink.send(message).await {
                Ok(Delivery::Sent) => None,
                Ok(Delivery::Dropped) => {
                    tracing::warn!(%correlation_id, "Prompt dropped, not connected");
                    Some(Event::SendDropped { correlation_id })
                }
                Err(e) => {
                    tracing::error!(error = %e, %correlation_id, "Failed to dispatch prompt");
                    Some(Event::SendDropped { correlation_id })
                }
            },

            Effect::ScheduleGuardReset { delay, generation } => {
                let event_tx = self.event_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = event_tx.send(Event::GuardElapsed { generation }).await;
                });
                None
            }
        }
    }
}
