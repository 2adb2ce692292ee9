//! The per-account session task.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_core::{
    AccountSender, AccountStatus, DeliverError, DeliveryAck, Event, EventBus, Repository,
};
use tokio::sync::{broadcast::error::RecvError, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use transport::{CloseReason, PairingKind, Transport, TransportEvent};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::policy::{close_action, CloseAction};

/// Whether the event loop keeps going after handling an event.
#[derive(PartialEq)]
enum Flow {
    Continue,
    Stop,
}

/// Connection lifecycle manager for one account.
///
/// Owns the account's transport, consumes its event stream in a background
/// task, and turns connection events into status transitions: pairing
/// challenges, going online, and the per-close-reason reconnect policy in
/// [`crate::policy`]. Every transition is published on the event bus and,
/// unless the policy says otherwise, persisted through the repository.
///
/// Dispatchers reach the session through [`AccountSender`]; sends are
/// refused while the account is not `Online`.
pub struct Session {
    address: String,
    transport: Arc<dyn Transport>,
    repo: Arc<dyn Repository>,
    bus: EventBus,
    config: SessionConfig,
    status: RwLock<AccountStatus>,
    connected_at: RwLock<Option<DateTime<Utc>>>,
    reconnect_attempts: AtomicU32,
    unauthorized_strikes: AtomicU32,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Create a session with explicit timing configuration.
    pub fn new(
        address: impl Into<String>,
        transport: Arc<dyn Transport>,
        repo: Arc<dyn Repository>,
        bus: EventBus,
        config: SessionConfig,
    ) -> Self {
        Self {
            address: address.into(),
            transport,
            repo,
            bus,
            config,
            status: RwLock::new(AccountStatus::Offline),
            connected_at: RwLock::new(None),
            reconnect_attempts: AtomicU32::new(0),
            unauthorized_strikes: AtomicU32::new(0),
            shutdown: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Create a session with default timings.
    pub fn with_defaults(
        address: impl Into<String>,
        transport: Arc<dyn Transport>,
        repo: Arc<dyn Repository>,
        bus: EventBus,
    ) -> Self {
        Self::new(address, transport, repo, bus, SessionConfig::default())
    }

    /// Adopt a persisted status when the session is rebuilt after a process
    /// restart. Connection-scoped statuses collapse to `Offline` (nothing is
    /// connected yet); a ban survives as-is so [`Session::start`] keeps
    /// refusing it.
    pub fn restore_status(&self, persisted: AccountStatus) {
        let status = match persisted {
            AccountStatus::Banned => AccountStatus::Banned,
            _ => AccountStatus::Offline,
        };
        *self.status.write().expect("status lock poisoned") = status;
    }

    /// The account address this session manages.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Current in-memory connection status.
    pub fn status(&self) -> AccountStatus {
        *self.status.read().expect("status lock poisoned")
    }

    /// When the account last reached `Online`, if it has this run.
    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        *self.connected_at.read().expect("connected_at lock poisoned")
    }

    /// Start the lifecycle task and begin connecting.
    ///
    /// No-op if the task is already running. Refused for banned accounts;
    /// a ban is terminal until the account record itself is replaced.
    pub fn start(self: &Arc<Self>) {
        if self.status() == AccountStatus::Banned {
            warn!(account = %self.address, "not starting session for banned account");
            return;
        }
        let mut task = self.task.lock().expect("task lock poisoned");
        if let Some(handle) = task.as_ref() {
            if !handle.is_finished() {
                debug!(account = %self.address, "session already running");
                return;
            }
        }
        let (tx, rx) = watch::channel(false);
        *self.shutdown.lock().expect("shutdown lock poisoned") = Some(tx);
        let session = Arc::clone(self);
        *task = Some(tokio::spawn(session.run(rx)));
        info!(account = %self.address, "session started");
    }

    /// Stop the lifecycle task, close the transport and go `Offline`.
    ///
    /// A banned account stays `Banned`.
    pub async fn stop(&self) {
        let tx = self.shutdown.lock().expect("shutdown lock poisoned").take();
        if let Some(tx) = tx {
            let _ = tx.send(true);
        }
        let task = self.task.lock().expect("task lock poisoned").take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(account = %self.address, error = %e, "session task join failed");
            }
        }
        if let Err(e) = self.transport.disconnect().await {
            debug!(account = %self.address, error = %e, "disconnect failed");
        }
        if self.status() != AccountStatus::Banned {
            self.transition(AccountStatus::Offline, true).await;
        }
        info!(account = %self.address, "session stopped");
    }

    /// Deliver a text message through this account.
    pub async fn send_message(
        &self,
        target: &str,
        text: &str,
    ) -> Result<DeliveryAck, SessionError> {
        if self.status() != AccountStatus::Online {
            return Err(SessionError::NotOnline(self.address.clone()));
        }
        let ack = self.transport.send_text(target, text).await?;
        debug!(account = %self.address, target, id = %ack.id, "message delivered");
        Ok(ack)
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        // Subscribe before connecting so no connection event is missed.
        let mut events = self.transport.subscribe();
        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.heartbeat_interval,
            self.config.heartbeat_interval,
        );

        self.transition(AccountStatus::Initializing, true).await;

        if let Err(e) = self.transport.connect().await {
            warn!(account = %self.address, error = %e, "connect failed");
            let attempts = self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
            let delay = self.config.backoff(attempts);
            if self.reconnect_after(delay, &mut shutdown).await == Flow::Stop {
                return;
            }
        }

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    debug!(account = %self.address, "session task stopping");
                    break;
                }

                event = events.recv() => match event {
                    Ok(event) => {
                        if self.handle_event(event, &mut shutdown).await == Flow::Stop {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(account = %self.address, skipped, "transport event stream lagged");
                    }
                    Err(RecvError::Closed) => {
                        debug!(account = %self.address, "transport event stream closed");
                        break;
                    }
                },

                _ = heartbeat.tick() => self.heartbeat().await,
            }
        }
    }

    async fn handle_event(
        &self,
        event: TransportEvent,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Flow {
        match event {
            TransportEvent::PairingChallenge { kind, data } => {
                let status = match kind {
                    PairingKind::Qr => AccountStatus::QrPending,
                    PairingKind::Code => AccountStatus::PairingPending,
                };
                self.transition(status, true).await;
                self.bus.publish(Event::PairingChallenge {
                    account: self.address.clone(),
                    data,
                });
                Flow::Continue
            }

            TransportEvent::Established => {
                self.reconnect_attempts.store(0, Ordering::SeqCst);
                self.unauthorized_strikes.store(0, Ordering::SeqCst);
                *self
                    .connected_at
                    .write()
                    .expect("connected_at lock poisoned") = Some(Utc::now());
                self.transition(AccountStatus::Online, false).await;
                self.persist_online().await;
                Flow::Continue
            }

            TransportEvent::Closed { reason } => self.handle_close(reason, shutdown).await,

            // Inbound traffic and contact syncs are routed by the
            // orchestrator's own subscription; the lifecycle task only
            // watches the connection.
            TransportEvent::Inbound { .. } | TransportEvent::ContactSync { .. } => Flow::Continue,
        }
    }

    async fn handle_close(
        &self,
        reason: CloseReason,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Flow {
        let strikes = match reason {
            CloseReason::Unauthorized => {
                self.unauthorized_strikes.fetch_add(1, Ordering::SeqCst) + 1
            }
            _ => {
                self.unauthorized_strikes.store(0, Ordering::SeqCst);
                0
            }
        };
        let attempts = match reason {
            CloseReason::Other { .. } => self.reconnect_attempts.fetch_add(1, Ordering::SeqCst),
            _ => self.reconnect_attempts.load(Ordering::SeqCst),
        };

        let action = close_action(reason, strikes, attempts, &self.config);
        info!(
            account = %self.address,
            code = reason.code(),
            action = ?action,
            "transport closed"
        );

        match action {
            CloseAction::Settle {
                status,
                clear_credentials,
            } => {
                if clear_credentials {
                    warn!(account = %self.address, "credentials rejected twice, clearing");
                    if let Err(e) = self.repo.clear_account_credentials(&self.address).await {
                        warn!(account = %self.address, error = %e, "failed to clear credentials");
                    }
                }
                self.transition(status, true).await;
                Flow::Stop
            }
            CloseAction::Reconnect {
                delay,
                persist_status,
            } => {
                self.transition(AccountStatus::Initializing, persist_status)
                    .await;
                self.reconnect_after(delay, shutdown).await
            }
        }
    }

    /// Wait out the delay (abandoning it on shutdown) and reconnect. Connect
    /// errors keep retrying with growing backoff; give-up decisions are made
    /// only from close events.
    async fn reconnect_after(
        &self,
        delay: Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Flow {
        let mut delay = delay;
        loop {
            debug!(
                account = %self.address,
                delay_ms = delay.as_millis() as u64,
                "reconnecting after delay"
            );
            if wait_or_shutdown(delay, shutdown).await {
                return Flow::Stop;
            }
            match self.transport.connect().await {
                Ok(()) => return Flow::Continue,
                Err(e) => {
                    warn!(account = %self.address, error = %e, "reconnect failed");
                    let attempts = self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
                    delay = self.config.backoff(attempts);
                }
            }
        }
    }

    async fn heartbeat(&self) {
        if self.status() != AccountStatus::Online {
            return;
        }
        // A failed ping never changes state; the next tick retries.
        if let Err(e) = self.transport.send_presence().await {
            debug!(account = %self.address, error = %e, "presence ping failed");
        }
    }

    /// Move to `status`, publish the change, and optionally write it through.
    /// Re-entering the current status is not a transition and does nothing.
    async fn transition(&self, status: AccountStatus, persist: bool) {
        let changed = {
            let mut current = self.status.write().expect("status lock poisoned");
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        };
        if !changed {
            return;
        }
        info!(account = %self.address, status = status.as_str(), "account status");
        self.bus.publish(Event::AccountStatus {
            account: self.address.clone(),
            status,
        });
        if persist {
            if let Err(e) = self.repo.update_account_status(&self.address, status).await {
                warn!(account = %self.address, error = %e, "failed to persist account status");
            }
        }
    }

    /// Write the full online record: status, connect time, reset attempts.
    async fn persist_online(&self) {
        match self.repo.account(&self.address).await {
            Ok(mut account) => {
                account.status = AccountStatus::Online;
                account.connected_at = self.connected_at();
                account.reconnect_attempts = 0;
                if let Err(e) = self.repo.upsert_account(&account).await {
                    warn!(account = %self.address, error = %e, "failed to persist online state");
                }
            }
            Err(e) => {
                warn!(account = %self.address, error = %e, "failed to load account record");
            }
        }
    }
}

#[async_trait]
impl AccountSender for Session {
    fn address(&self) -> &str {
        &self.address
    }

    fn is_online(&self) -> bool {
        self.status() == AccountStatus::Online
    }

    async fn send(&self, target: &str, text: &str) -> Result<DeliveryAck, DeliverError> {
        self.send_message(target, text).await.map_err(Into::into)
    }

    async fn send_typing(&self, target: &str, started: bool) -> Result<(), DeliverError> {
        if self.status() != AccountStatus::Online {
            return Err(DeliverError::NotOnline(self.address.clone()));
        }
        self.transport
            .send_typing(target, started)
            .await
            .map_err(|e| DeliverError::Transport(e.to_string()))
    }
}

/// Sleep for `delay`, returning early with `true` when shutdown is signalled
/// (or the session dropped its sender).
async fn wait_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.changed() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
