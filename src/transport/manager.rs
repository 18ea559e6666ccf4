//! Transport task and its handle

use super::traits::{Connection, Connector};
use super::{ConnectionState, Delivery, TransportError, TransportEvent};
use crate::protocol::OutboundMessage;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Flat delay between reconnect attempts
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Where to connect and how often to retry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub url: String,
    pub retry_interval: Duration,
}

impl TransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }
}

/// Reconnect bookkeeping, owned and mutated only by the transport task.
///
/// Once armed the timer repeats every interval until a connection succeeds
/// or the transport closes.
#[derive(Debug, Default)]
struct RetryState {
    deadline: Option<Instant>,
    attempts: u32,
}

impl RetryState {
    fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Arm the timer unless it is already armed
    fn schedule(&mut self, interval: Duration) -> bool {
        if self.is_pending() {
            return false;
        }
        self.deadline = Some(Instant::now() + interval);
        true
    }

    /// Count a firing and re-arm for the next interval
    fn fire(&mut self, interval: Duration) -> u32 {
        self.attempts += 1;
        self.deadline = Some(Instant::now() + interval);
        self.attempts
    }

    fn reset(&mut self) {
        self.deadline = None;
        self.attempts = 0;
    }
}

#[derive(Debug)]
enum Command {
    Connect,
    Send(OutboundMessage, oneshot::Sender<Delivery>),
}

type PendingConnect<T> = BoxFuture<'static, Result<T, TransportError>>;

/// Cloneable handle to a running transport
#[derive(Debug, Clone)]
pub struct TransportHandle {
    command_tx: mpsc::Sender<Command>,
    status_rx: watch::Receiver<ConnectionState>,
    shutdown: CancellationToken,
}

impl TransportHandle {
    /// Open a connection unless one is already open or being opened
    pub async fn connect(&self) -> Result<(), TransportError> {
        self.command(Command::Connect).await
    }

    /// Serialize and transmit `message` if connected.
    ///
    /// While disconnected the message is dropped and, unless a reconnect is
    /// already scheduled, a connection attempt starts. The outcome is
    /// reported once the transport task has handled the message; the only
    /// error is [`TransportError::Closed`].
    pub async fn send(&self, message: OutboundMessage) -> Result<Delivery, TransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(Command::Send(message, reply_tx)).await?;
        reply_rx.await.map_err(|_| TransportError::Closed)
    }

    pub fn status(&self) -> ConnectionState {
        *self.status_rx.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionState> {
        self.status_rx.clone()
    }

    /// Release the connection and cancel pending timers. Idempotent.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    async fn command(&self, command: Command) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.command_tx
            .send(command)
            .await
            .map_err(|_| TransportError::Closed)
    }
}

/// The transport task
pub struct TransportManager<C: Connector> {
    config: TransportConfig,
    connector: Arc<C>,
    command_rx: mpsc::Receiver<Command>,
    events_tx: mpsc::Sender<TransportEvent>,
    status_tx: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
    retry: RetryState,
}

impl<C: Connector> TransportManager<C> {
    /// Spawn the transport task.
    ///
    /// Nothing is dialed until [`TransportHandle::connect`] or
    /// [`TransportHandle::send`] is called.
    pub fn open(
        config: TransportConfig,
        connector: C,
    ) -> (TransportHandle, mpsc::Receiver<TransportEvent>) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (events_tx, events_rx) = mpsc::channel(256);
        let (status_tx, status_rx) = watch::channel(ConnectionState::Disconnected);
        let shutdown = CancellationToken::new();

        let manager = Self {
            config,
            connector: Arc::new(connector),
            command_rx,
            events_tx,
            status_tx,
            shutdown: shutdown.clone(),
            retry: RetryState::default(),
        };
        tokio::spawn(manager.run());

        let handle = TransportHandle {
            command_tx,
            status_rx,
            shutdown,
        };
        (handle, events_rx)
    }

    async fn run(mut self) {
        tracing::info!(url = %self.config.url, "Starting transport");

        let mut link: Option<C::Connection> = None;
        let mut pending: Option<PendingConnect<C::Connection>> = None;

        loop {
            let retry_at = self.retry.deadline;
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                command = self.command_rx.recv() => match command {
                    Some(Command::Connect) => self.connect(link.is_some(), &mut pending).await,
                    Some(Command::Send(message, reply)) => {
                        let delivery = self.send(&mut link, &mut pending, message).await;
                        let _ = reply.send(delivery);
                    }
                    None => break,
                },
                result = poll_pending(&mut pending), if pending.is_some() => {
                    pending = None;
                    match result {
                        Ok(connection) => {
                            link = Some(connection);
                            self.retry.reset();
                            tracing::info!(url = %self.config.url, "Connection established");
                            self.set_status(ConnectionState::Connected).await;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Connection attempt failed");
                            self.connection_lost().await;
                        }
                    }
                }
                frame = next_frame(&mut link), if link.is_some() => match frame {
                    Some(Ok(text)) => self.emit(TransportEvent::Frame(text)).await,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Connection error");
                        link = None;
                        self.connection_lost().await;
                    }
                    None => {
                        tracing::info!("Connection closed by peer");
                        link = None;
                        self.connection_lost().await;
                    }
                },
                () = sleep_until(retry_at), if retry_at.is_some() => {
                    let attempt = self.retry.fire(self.config.retry_interval);
                    tracing::info!(attempt, "Attempting to reconnect");
                    self.connect(link.is_some(), &mut pending).await;
                }
            }
        }

        if let Some(mut connection) = link.take() {
            connection.close().await;
        }
        drop(pending);
        self.retry.reset();
        self.set_status(ConnectionState::Disconnected).await;
        tracing::info!(url = %self.config.url, "Transport closed");
    }

    async fn connect(&self, has_link: bool, pending: &mut Option<PendingConnect<C::Connection>>) {
        if has_link || pending.is_some() {
            tracing::debug!("Connection already open or in progress");
            return;
        }

        self.set_status(ConnectionState::Connecting).await;
        let connector = Arc::clone(&self.connector);
        let url = self.config.url.clone();
        *pending = Some(Box::pin(async move { connector.connect(&url).await }));
    }

    async fn send(
        &mut self,
        link: &mut Option<C::Connection>,
        pending: &mut Option<PendingConnect<C::Connection>>,
        message: OutboundMessage,
    ) -> Delivery {
        let Some(connection) = link.as_mut() else {
            tracing::error!("Cannot send message, socket not connected");
            if !self.retry.is_pending() {
                self.connect(false, pending).await;
            }
            return Delivery::Dropped;
        };

        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %TransportError::from(e), "Dropping outbound message");
                return Delivery::Dropped;
            }
        };

        if let Err(e) = connection.send_text(text).await {
            tracing::warn!(error = %e, "Send failed, dropping connection");
            *link = None;
            self.connection_lost().await;
            return Delivery::Dropped;
        }
        Delivery::Sent
    }

    async fn connection_lost(&mut self) {
        self.set_status(ConnectionState::Disconnected).await;
        if self.retry.schedule(self.config.retry_interval) {
            tracing::info!(
                interval_ms = u64::try_from(self.config.retry_interval.as_millis()).unwrap_or(u64::MAX),
                "Scheduling reconnect"
            );
        }
    }

    /// Publish a status change; repeated states are swallowed
    async fn set_status(&self, status: ConnectionState) {
        if *self.status_tx.borrow() == status {
            return;
        }
        self.status_tx.send_replace(status);
        self.emit(TransportEvent::Status(status)).await;
    }

    async fn emit(&self, event: TransportEvent) {
        if self.events_tx.send(event).await.is_err() {
            tracing::debug!("Transport event receiver dropped");
        }
    }
}

async fn poll_pending<T>(pending: &mut Option<PendingConnect<T>>) -> Result<T, TransportError> {
    match pending.as_mut() {
        Some(connect) => connect.await,
        None => std::future::pending().await,
    }
}

async fn next_frame<T: Connection>(link: &mut Option<T>) -> Option<Result<String, TransportError>> {
    match link.as_mut() {
        Some(connection) => connection.next_frame().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
