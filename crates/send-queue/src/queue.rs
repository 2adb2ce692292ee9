//! The per-account dispatch loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use herald_core::{
    AccountSender, CampaignStatus, ConversationMessage, DailyLedger, Event, EventBus, QueueItem,
    QueueState, Repository,
};
use rand::seq::SliceRandom;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;

/// Outcome of a checkpointed wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wait {
    /// The full duration elapsed.
    Done,
    /// The queue was paused part-way through.
    Paused,
    /// The queue was stopped part-way through.
    Stopped,
}

/// FIFO dispatcher for one account's campaign sends.
///
/// Items are dispatched strictly in order with a human-shaped pacing delay
/// before each send. The loop is pausable and stoppable at ≤ one
/// checkpoint's latency; `stop` keeps queued items so a campaign can be
/// resumed without re-importing leads, while [`SendQueue::clear`] drops
/// them. Individual send failures are recorded on the lead and never stop
/// the loop.
pub struct SendQueue {
    account: String,
    sender: Arc<dyn AccountSender>,
    repo: Arc<dyn Repository>,
    bus: EventBus,
    ledger: Arc<DailyLedger>,
    config: QueueConfig,
    items: Mutex<VecDeque<QueueItem>>,
    state: RwLock<QueueState>,
    /// Sends attempted over this queue's lifetime, drives the pacing curve.
    sent_index: AtomicUsize,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SendQueue {
    /// Create a stopped, empty queue for the sender's account.
    pub fn new(
        sender: Arc<dyn AccountSender>,
        repo: Arc<dyn Repository>,
        bus: EventBus,
        ledger: Arc<DailyLedger>,
        config: QueueConfig,
    ) -> Self {
        Self {
            account: sender.address().to_string(),
            sender,
            repo,
            bus,
            ledger,
            config,
            items: Mutex::new(VecDeque::new()),
            state: RwLock::new(QueueState::Stopped),
            sent_index: AtomicUsize::new(0),
            task: Mutex::new(None),
        }
    }

    /// Account address this queue dispatches for.
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Current queue state.
    pub fn state(&self) -> QueueState {
        *self.state.read().expect("queue state lock poisoned")
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.items.lock().expect("queue items lock poisoned").len()
    }

    /// Whether the queue holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append an item to the tail.
    pub fn add(&self, item: QueueItem) {
        self.items
            .lock()
            .expect("queue items lock poisoned")
            .push_back(item);
    }

    /// Drop all queued items without touching their leads.
    pub fn clear(&self) {
        let dropped = {
            let mut items = self.items.lock().expect("queue items lock poisoned");
            let dropped = items.len();
            items.clear();
            dropped
        };
        if dropped > 0 {
            info!(account = %self.account, dropped, "queue cleared");
        }
    }

    /// Launch the processing loop. No-op while a loop is already running
    /// (including paused).
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().expect("queue task lock poisoned");
        if let Some(handle) = task.as_ref() {
            if !handle.is_finished() {
                debug!(account = %self.account, "queue already running");
                return;
            }
        }

        self.set_state(QueueState::Running);
        let queue = Arc::clone(self);
        *task = Some(tokio::spawn(queue.run()));
        info!(account = %self.account, "queue started");
    }

    /// Hold the loop before the next send. Items keep accumulating.
    pub fn pause(&self) {
        let changed = {
            let mut state = self.state.write().expect("queue state lock poisoned");
            if *state == QueueState::Running {
                *state = QueueState::Paused;
                true
            } else {
                false
            }
        };
        if changed {
            info!(account = %self.account, "queue paused");
            self.bus.publish(Event::QueueChanged {
                account: self.account.clone(),
                state: QueueState::Paused,
            });
        }
    }

    /// Resume a paused loop.
    pub fn resume(&self) {
        let changed = {
            let mut state = self.state.write().expect("queue state lock poisoned");
            if *state == QueueState::Paused {
                *state = QueueState::Running;
                true
            } else {
                false
            }
        };
        if changed {
            info!(account = %self.account, "queue resumed");
            self.bus.publish(Event::QueueChanged {
                account: self.account.clone(),
                state: QueueState::Running,
            });
        }
    }

    /// Stop the loop and wait for it to exit. Queued items are kept; pair
    /// with [`SendQueue::clear`] to drop them.
    pub async fn stop(&self) {
        self.set_state(QueueState::Stopped);
        let task = self.task.lock().expect("queue task lock poisoned").take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(account = %self.account, error = %e, "queue task join failed");
            }
        }
        info!(account = %self.account, "queue stopped");
    }

    fn peek(&self) -> Option<QueueItem> {
        self.items
            .lock()
            .expect("queue items lock poisoned")
            .front()
            .cloned()
    }

    fn pop(&self) -> Option<QueueItem> {
        self.items
            .lock()
            .expect("queue items lock poisoned")
            .pop_front()
    }

    fn set_state(&self, next: QueueState) {
        {
            let mut state = self.state.write().expect("queue state lock poisoned");
            if *state == next {
                return;
            }
            *state = next;
        }
        debug!(account = %self.account, state = ?next, "queue state");
        self.bus.publish(Event::QueueChanged {
            account: self.account.clone(),
            state: next,
        });
    }

    async fn run(self: Arc<Self>) {
        debug!(account = %self.account, "queue loop running");
        loop {
            match self.state() {
                QueueState::Stopped => break,
                QueueState::Paused => {
                    sleep(self.config.checkpoint).await;
                    continue;
                }
                QueueState::Running => {}
            }

            let Some(head) = self.peek() else {
                debug!(account = %self.account, "queue drained");
                self.set_state(QueueState::Stopped);
                break;
            };

            // An offline account holds its whole queue; the item is not
            // dequeued and nothing is marked failed.
            if !self.sender.is_online() {
                debug!(account = %self.account, "account not online, holding queue");
                match self.hold(self.config.offline_hold).await {
                    Wait::Stopped => break,
                    Wait::Paused | Wait::Done => continue,
                }
            }

            let index = self.sent_index.load(Ordering::Relaxed);
            let in_secs = pacing::send_delay_secs(
                head.delay_min_secs,
                head.delay_max_secs,
                index,
                self.len(),
            );
            debug!(account = %self.account, contact = %head.contact, in_secs, "next send scheduled");
            self.bus.publish(Event::NextSend {
                account: self.account.clone(),
                contact: head.contact.clone(),
                in_secs,
            });
            match self.hold(Duration::from_secs(in_secs)).await {
                Wait::Stopped => break,
                Wait::Paused => continue,
                Wait::Done => {}
            }

            // Dequeue before the attempt: a process death mid-send leaves
            // the lead Pending for reconciliation, never a duplicate send.
            let Some(item) = self.pop() else { continue };
            self.dispatch(item).await;
        }
        debug!(account = %self.account, "queue loop exited");
    }

    /// Sleep for `total`, re-checking the stop/pause flags every
    /// checkpoint so control actions take effect within one checkpoint.
    async fn hold(&self, total: Duration) -> Wait {
        let mut remaining = total;
        loop {
            match self.state() {
                QueueState::Stopped => return Wait::Stopped,
                QueueState::Paused => return Wait::Paused,
                QueueState::Running => {}
            }
            if remaining.is_zero() {
                return Wait::Done;
            }
            let slice = remaining.min(self.config.checkpoint);
            sleep(slice).await;
            remaining = remaining.saturating_sub(slice);
        }
    }

    async fn dispatch(&self, item: QueueItem) {
        if !self
            .ledger
            .try_consume(&self.account, self.config.daily_cap)
        {
            // Deliberate policy: the lead stays Pending so a future day
            // can retry it, rather than burning it as failed.
            warn!(
                account = %self.account,
                contact = %item.contact,
                cap = self.config.daily_cap,
                "daily send cap reached, skipping send"
            );
            self.bus.publish(Event::SendSkipped {
                account: self.account.clone(),
                contact: item.contact.clone(),
                reason: "daily send cap reached".to_string(),
            });
            return;
        }

        let text = {
            let mut rng = rand::thread_rng();
            item.template.variants.choose(&mut rng).cloned()
        };
        let Some(text) = text else {
            warn!(account = %self.account, lead = %item.lead_id, "empty template, skipping lead");
            if let Err(e) = self
                .repo
                .mark_lead_skipped(&item.lead_id, "empty template")
                .await
            {
                warn!(account = %self.account, error = %e, "failed to mark lead skipped");
            }
            self.bus.publish(Event::SendSkipped {
                account: self.account.clone(),
                contact: item.contact.clone(),
                reason: "empty template".to_string(),
            });
            return;
        };

        self.sent_index.fetch_add(1, Ordering::Relaxed);
        match self.sender.send(&item.contact, &text).await {
            Ok(ack) => {
                info!(
                    account = %self.account,
                    contact = %item.contact,
                    id = %ack.id,
                    "campaign message delivered"
                );
                if let Err(e) = self.repo.mark_lead_sent(&item.lead_id).await {
                    warn!(account = %self.account, error = %e, "failed to mark lead sent");
                }
                let message =
                    ConversationMessage::outbound(&item.contact, &self.account, &text, true);
                if let Err(e) = self.repo.append_message(&message).await {
                    warn!(account = %self.account, error = %e, "failed to record outbound message");
                }
                self.bump_counters(&item.campaign_id, true).await;
            }
            Err(e) => {
                warn!(
                    account = %self.account,
                    contact = %item.contact,
                    error = %e,
                    "campaign send failed"
                );
                if let Err(e2) = self
                    .repo
                    .mark_lead_failed(&item.lead_id, &e.to_string())
                    .await
                {
                    warn!(account = %self.account, error = %e2, "failed to mark lead failed");
                }
                self.bump_counters(&item.campaign_id, false).await;
            }
        }
    }

    async fn bump_counters(&self, campaign_id: &str, delivered: bool) {
        let result = if delivered {
            self.repo.increment_sent(campaign_id).await
        } else {
            self.repo.increment_errors(campaign_id).await
        };
        let counters = match result {
            Ok(counters) => counters,
            Err(e) => {
                warn!(campaign = %campaign_id, error = %e, "failed to update campaign counters");
                return;
            }
        };

        self.bus.publish(Event::CampaignStats {
            campaign_id: campaign_id.to_string(),
            sent: counters.sent,
            errors: counters.errors,
            total: counters.total,
        });

        if counters.finished() {
            info!(
                campaign = %campaign_id,
                sent = counters.sent,
                errors = counters.errors,
                "campaign finished"
            );
            if let Err(e) = self
                .repo
                .set_campaign_status(campaign_id, CampaignStatus::Completed)
                .await
            {
                warn!(campaign = %campaign_id, error = %e, "failed to mark campaign completed");
            }
            self.bus.publish(Event::CampaignStatus {
                campaign_id: campaign_id.to_string(),
                status: CampaignStatus::Completed,
            });
        }
    }
}
