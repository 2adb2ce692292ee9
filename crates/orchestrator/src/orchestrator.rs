//! The account registry and campaign control plane.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use continuation::ContinuationEngine;
use herald_core::{
    Account, AccountSender, AccountStatus, Advisor, Campaign, CampaignStatus, DailyLedger, Event,
    EventBus, Lead, QueueItem, QueueState, Repository,
};
use rand::Rng;
use resolver::Resolver;
use send_queue::SendQueue;
use session::Session;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use transport::TransportFactory;

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::inbound::spawn_inbound_pump;

/// Everything the orchestrator runs for one account.
struct AccountHandle {
    session: Arc<Session>,
    queue: Arc<SendQueue>,
    pump: JoinHandle<()>,
}

/// Aggregated status of one account, for UIs and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountOverview {
    /// Stable contact address.
    pub address: String,
    /// Live connection status.
    pub status: AccountStatus,
    /// Send-queue state.
    pub queue: QueueState,
    /// Items waiting in the send queue.
    pub queued: usize,
    /// Sends counted against today's cap.
    pub sent_today: u32,
}

/// Owns every session and send queue and drives campaigns across them.
///
/// All shared state - repository, event bus, alias resolver, daily ledger,
/// continuation engine - is constructed here and handed down by reference;
/// no component reaches for ambient globals. Campaign work is round-robined
/// across the queues of currently online accounts; inbound traffic flows
/// back per account through an inbound pump into the resolver, the lead
/// bookkeeping and the continuation engine.
pub struct Orchestrator {
    repo: Arc<dyn Repository>,
    factory: Arc<dyn TransportFactory>,
    bus: EventBus,
    resolver: Arc<Resolver>,
    ledger: Arc<DailyLedger>,
    continuation: Arc<ContinuationEngine>,
    config: OrchestratorConfig,
    handles: RwLock<HashMap<String, AccountHandle>>,
}

impl Orchestrator {
    /// Create an orchestrator over the given collaborators.
    pub fn new(
        repo: Arc<dyn Repository>,
        factory: Arc<dyn TransportFactory>,
        advisor: Arc<dyn Advisor>,
        bus: EventBus,
        config: OrchestratorConfig,
    ) -> Self {
        let resolver = Arc::new(Resolver::new(repo.clone()));
        let continuation = Arc::new(ContinuationEngine::new(
            repo.clone(),
            advisor,
            bus.clone(),
            config.continuation.clone(),
        ));
        Self {
            repo,
            factory,
            bus,
            resolver,
            ledger: Arc::new(DailyLedger::new()),
            continuation,
            config,
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to the engine's broadcast events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// The shared alias resolver.
    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// Launch the continuation engine's periodic reconciliation sweep.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        self.continuation.spawn_sweeper()
    }

    // --- accounts ---

    /// Register a new account and build its runtime (session, queue,
    /// inbound pump). The account starts `Offline`; call
    /// [`Orchestrator::connect_account`] to bring it up.
    pub async fn register_account(
        &self,
        address: &str,
        label: &str,
    ) -> Result<(), OrchestratorError> {
        if self.handles.read().expect("handles lock poisoned").contains_key(address) {
            return Err(OrchestratorError::AccountExists(address.to_string()));
        }
        let account = Account::new(address).with_label(label);
        self.repo.upsert_account(&account).await?;
        self.install(&account);
        info!(account = %address, "account registered");
        Ok(())
    }

    /// Start the account's session (idempotent while running).
    pub async fn connect_account(&self, address: &str) -> Result<(), OrchestratorError> {
        let stored = self.repo.account(address).await?;
        if stored.status == AccountStatus::Banned {
            return Err(OrchestratorError::AccountBanned(address.to_string()));
        }
        let session = self
            .session_for(address)
            .ok_or_else(|| OrchestratorError::UnknownAccount(address.to_string()))?;
        session.start();
        Ok(())
    }

    /// Stop the account's session; its queue and queued items survive.
    pub async fn disconnect_account(&self, address: &str) -> Result<(), OrchestratorError> {
        let session = self
            .session_for(address)
            .ok_or_else(|| OrchestratorError::UnknownAccount(address.to_string()))?;
        session.stop().await;
        Ok(())
    }

    /// Tear an account down completely and delete its record.
    pub async fn remove_account(&self, address: &str) -> Result<(), OrchestratorError> {
        let handle = self
            .handles
            .write()
            .expect("handles lock poisoned")
            .remove(address)
            .ok_or_else(|| OrchestratorError::UnknownAccount(address.to_string()))?;

        handle.queue.stop().await;
        handle.queue.clear();
        handle.session.stop().await;
        handle.pump.abort();
        self.continuation.deregister_sender(address);
        self.repo.remove_account(address).await?;
        info!(account = %address, "account removed");
        Ok(())
    }

    /// Aggregated per-account status, sorted by address.
    pub fn accounts_overview(&self) -> Vec<AccountOverview> {
        let handles = self.handles.read().expect("handles lock poisoned");
        let mut overview: Vec<AccountOverview> = handles
            .iter()
            .map(|(address, handle)| AccountOverview {
                address: address.clone(),
                status: handle.session.status(),
                queue: handle.queue.state(),
                queued: handle.queue.len(),
                sent_today: self.ledger.count_today(address),
            })
            .collect();
        overview.sort_by(|a, b| a.address.cmp(&b.address));
        overview
    }

    // --- campaigns ---

    /// Create a draft campaign.
    pub async fn create_campaign(&self, campaign: &Campaign) -> Result<(), OrchestratorError> {
        self.repo.create_campaign(campaign).await?;
        Ok(())
    }

    /// Import target contacts as pending leads for a campaign.
    pub async fn import_leads(
        &self,
        campaign_id: &str,
        contacts: &[String],
    ) -> Result<usize, OrchestratorError> {
        let leads: Vec<Lead> = contacts
            .iter()
            .map(|contact| Lead::new(campaign_id, contact))
            .collect();
        self.repo.add_leads(&leads).await?;
        info!(campaign = %campaign_id, count = leads.len(), "leads imported");
        Ok(leads.len())
    }

    /// Start a campaign: round-robin its pending leads across the queues of
    /// currently online accounts (optionally a single pinned account), mark
    /// it `Running` and start the queues. Returns how many items were
    /// queued.
    pub async fn start_campaign(
        &self,
        campaign_id: &str,
        pinned: Option<&str>,
    ) -> Result<usize, OrchestratorError> {
        let campaign = self.repo.campaign(campaign_id).await?;
        let queues = self.online_queues(pinned);
        if queues.is_empty() {
            return Err(OrchestratorError::NoAccountsOnline);
        }

        let leads = self.repo.pending_leads(campaign_id).await?;
        for (i, lead) in leads.iter().enumerate() {
            let (account, queue) = &queues[i % queues.len()];
            queue.add(QueueItem::for_lead(lead, &campaign, account.clone()));
        }

        self.set_campaign_status(campaign_id, CampaignStatus::Running)
            .await?;
        for (_, queue) in &queues {
            queue.start();
        }
        info!(
            campaign = %campaign_id,
            leads = leads.len(),
            accounts = queues.len(),
            "campaign started"
        );
        Ok(leads.len())
    }

    /// Pause every queue; queued items stay put.
    pub async fn pause_campaign(&self, campaign_id: &str) -> Result<(), OrchestratorError> {
        for queue in self.all_queues() {
            queue.pause();
        }
        self.set_campaign_status(campaign_id, CampaignStatus::Paused)
            .await?;
        info!(campaign = %campaign_id, "campaign paused");
        Ok(())
    }

    /// Resume paused queues and mark the campaign `Running` again.
    pub async fn resume_campaign(&self, campaign_id: &str) -> Result<(), OrchestratorError> {
        for queue in self.all_queues() {
            queue.resume();
        }
        self.set_campaign_status(campaign_id, CampaignStatus::Running)
            .await?;
        info!(campaign = %campaign_id, "campaign resumed");
        Ok(())
    }

    /// Stop every queue, drop queued items and mark the campaign `Stopped`.
    pub async fn stop_campaign(&self, campaign_id: &str) -> Result<(), OrchestratorError> {
        for queue in self.all_queues() {
            queue.stop().await;
            queue.clear();
        }
        self.set_campaign_status(campaign_id, CampaignStatus::Stopped)
            .await?;
        info!(campaign = %campaign_id, "campaign stopped");
        Ok(())
    }

    // --- restart recovery ---

    /// Rebuild runtime state from the repository after a process restart.
    ///
    /// Every persisted account gets its session, queue and pump back. Only
    /// accounts whose persisted status was `Online` are reconnected, each
    /// delayed by a growing random stagger so the platform never sees a
    /// burst of logins. After the settle delay a background task re-scans
    /// campaigns still marked `Running` and requeues their remaining
    /// pending leads (queues are in-memory and died with the old process).
    /// Returns how many accounts were scheduled to reconnect.
    pub async fn recover(self: &Arc<Self>) -> Result<usize, OrchestratorError> {
        let accounts = self.repo.accounts().await?;
        let mut offset = Duration::ZERO;
        let mut reconnecting = 0usize;

        for account in &accounts {
            if self
                .handles
                .read()
                .expect("handles lock poisoned")
                .contains_key(&account.address)
            {
                continue;
            }
            self.install(account);

            if account.status == AccountStatus::Online {
                let session = self
                    .session_for(&account.address)
                    .expect("handle just installed");
                let delay = offset;
                debug!(
                    account = %account.address,
                    delay_ms = delay.as_millis() as u64,
                    "scheduling recovery reconnect"
                );
                tokio::spawn(async move {
                    sleep(delay).await;
                    session.start();
                });
                offset += self.stagger();
                reconnecting += 1;
            } else {
                debug!(
                    account = %account.address,
                    status = account.status.as_str(),
                    "not auto-reconnecting"
                );
            }
        }

        info!(
            accounts = accounts.len(),
            reconnecting, "restart recovery begun"
        );

        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            sleep(orchestrator.config.settle_delay).await;
            orchestrator.requeue_running_campaigns().await;
        });

        Ok(reconnecting)
    }

    /// Requeue pending leads of campaigns that were `Running` when the
    /// process died.
    async fn requeue_running_campaigns(&self) {
        let campaigns = match self.repo.campaigns().await {
            Ok(campaigns) => campaigns,
            Err(e) => {
                warn!(error = %e, "recovery campaign scan failed");
                return;
            }
        };
        for campaign in campaigns
            .iter()
            .filter(|c| c.status == CampaignStatus::Running)
        {
            match self.start_campaign(&campaign.id, None).await {
                Ok(requeued) => {
                    info!(campaign = %campaign.id, requeued, "campaign requeued after restart");
                }
                Err(e) => {
                    warn!(campaign = %campaign.id, error = %e, "campaign requeue failed");
                }
            }
        }
    }

    // --- internals ---

    /// Build and register the runtime for one account. The handles lock is
    /// never held across an await.
    fn install(&self, account: &Account) {
        let transport = self.factory.create(account);
        let session = Arc::new(Session::new(
            &account.address,
            transport.clone(),
            self.repo.clone(),
            self.bus.clone(),
            self.config.session.clone(),
        ));
        session.restore_status(account.status);
        let queue = Arc::new(SendQueue::new(
            session.clone() as Arc<dyn AccountSender>,
            self.repo.clone(),
            self.bus.clone(),
            self.ledger.clone(),
            self.config.queue.clone(),
        ));
        self.continuation.register_sender(session.clone());
        let pump = spawn_inbound_pump(
            account.address.clone(),
            transport,
            self.resolver.clone(),
            self.repo.clone(),
            self.bus.clone(),
            self.continuation.clone(),
        );
        self.handles.write().expect("handles lock poisoned").insert(
            account.address.clone(),
            AccountHandle {
                session,
                queue,
                pump,
            },
        );
    }

    fn session_for(&self, address: &str) -> Option<Arc<Session>> {
        self.handles
            .read()
            .expect("handles lock poisoned")
            .get(address)
            .map(|handle| handle.session.clone())
    }

    /// Queues of online accounts, sorted by address for a stable
    /// round-robin order.
    fn online_queues(&self, pinned: Option<&str>) -> Vec<(String, Arc<SendQueue>)> {
        let handles = self.handles.read().expect("handles lock poisoned");
        let mut queues: Vec<(String, Arc<SendQueue>)> = handles
            .iter()
            .filter(|(address, handle)| {
                pinned.map_or(true, |p| p == address.as_str()) && handle.session.is_online()
            })
            .map(|(address, handle)| (address.clone(), handle.queue.clone()))
            .collect();
        queues.sort_by(|a, b| a.0.cmp(&b.0));
        queues
    }

    fn all_queues(&self) -> Vec<Arc<SendQueue>> {
        self.handles
            .read()
            .expect("handles lock poisoned")
            .values()
            .map(|handle| handle.queue.clone())
            .collect()
    }

    async fn set_campaign_status(
        &self,
        campaign_id: &str,
        status: CampaignStatus,
    ) -> Result<(), OrchestratorError> {
        self.repo.set_campaign_status(campaign_id, status).await?;
        self.bus.publish(Event::CampaignStatus {
            campaign_id: campaign_id.to_string(),
            status,
        });
        Ok(())
    }

    fn stagger(&self) -> Duration {
        let min = self.config.stagger_min.min(self.config.stagger_max);
        let max = self.config.stagger_min.max(self.config.stagger_max);
        if min == max {
            return min;
        }
        let millis = rand::thread_rng().gen_range(min.as_millis() as u64..=max.as_millis() as u64);
        Duration::from_millis(millis)
    }
}
