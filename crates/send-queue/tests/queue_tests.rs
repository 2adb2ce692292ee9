//! End-to-end queue behavior against an in-memory repository.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use herald_core::{
    AccountSender, Campaign, CampaignStatus, DailyLedger, DeliverError, DeliveryAck, Event,
    EventBus, Lead, LeadStatus, MessageTemplate, QueueItem, QueueState, Repository,
};
use send_queue::{QueueConfig, SendQueue};
use store::MemoryRepository;
use tokio::time::{sleep, Instant};

const ACCOUNT: &str = "+15551112222";

/// Test sender that records deliveries and can go offline or fail sends.
struct RecordingSender {
    address: String,
    online: AtomicBool,
    fail_remaining: AtomicU32,
    attempts: AtomicU32,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSender {
    fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            online: AtomicBool::new(true),
            fail_remaining: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Fail the next `n` send attempts.
    fn fail_next(&self, n: u32) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccountSender for RecordingSender {
    fn address(&self) -> &str {
        &self.address
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    async fn send(&self, target: &str, text: &str) -> Result<DeliveryAck, DeliverError> {
        if !self.is_online() {
            return Err(DeliverError::NotOnline(self.address.clone()));
        }
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
            .is_ok()
        {
            return Err(DeliverError::Transport("injected failure".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((target.to_string(), text.to_string()));
        Ok(DeliveryAck::new(format!("ack-{}", n)))
    }

    async fn send_typing(&self, _target: &str, _started: bool) -> Result<(), DeliverError> {
        Ok(())
    }
}

struct Ctx {
    queue: Arc<SendQueue>,
    sender: Arc<RecordingSender>,
    repo: Arc<MemoryRepository>,
    bus: EventBus,
    ledger: Arc<DailyLedger>,
    campaign: Campaign,
    leads: Vec<Lead>,
}

async fn setup(
    n_leads: usize,
    delay: (u64, u64),
    template: MessageTemplate,
    config: QueueConfig,
) -> Ctx {
    let repo = Arc::new(MemoryRepository::new());
    let campaign = Campaign::new("queue test", template, delay.0, delay.1);
    repo.create_campaign(&campaign).await.unwrap();

    let leads: Vec<Lead> = (0..n_leads)
        .map(|i| Lead::new(&campaign.id, format!("+1555000{:04}", i)))
        .collect();
    repo.add_leads(&leads).await.unwrap();

    let sender = Arc::new(RecordingSender::new(ACCOUNT));
    let bus = EventBus::new();
    let ledger = Arc::new(DailyLedger::new());
    let queue = Arc::new(SendQueue::new(
        sender.clone(),
        repo.clone(),
        bus.clone(),
        ledger.clone(),
        config,
    ));
    for lead in &leads {
        queue.add(QueueItem::for_lead(lead, &campaign, ACCOUNT));
    }

    Ctx {
        queue,
        sender,
        repo,
        bus,
        ledger,
        campaign,
        leads,
    }
}

fn fast_config() -> QueueConfig {
    QueueConfig {
        checkpoint: Duration::from_millis(50),
        ..QueueConfig::default()
    }
}

/// Poll `cond` until it holds or `deadline` passes.
async fn wait_for(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if cond() {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    cond()
}

#[tokio::test]
async fn test_dispatches_in_fifo_order_and_completes_campaign() {
    let ctx = setup(3, (0, 0), MessageTemplate::single("Hello!"), fast_config()).await;
    let mut events = ctx.bus.subscribe();

    ctx.queue.start();
    let sender = ctx.sender.clone();
    assert!(wait_for(Duration::from_secs(20), || sender.sent().len() == 3).await);

    let targets: Vec<String> = ctx.sender.sent().into_iter().map(|(t, _)| t).collect();
    let expected: Vec<String> = ctx.leads.iter().map(|l| l.contact.clone()).collect();
    assert_eq!(targets, expected);

    // Drained queue settles to Stopped on its own.
    let queue = ctx.queue.clone();
    assert!(wait_for(Duration::from_secs(5), || queue.state() == QueueState::Stopped).await);
    assert!(ctx.queue.is_empty());

    for lead in &ctx.leads {
        let stored = ctx.repo.lead_for_contact(&lead.contact).await.unwrap().unwrap();
        assert_eq!(stored.status, LeadStatus::Sent);
    }
    let campaign = ctx.repo.campaign(&ctx.campaign.id).await.unwrap();
    assert_eq!((campaign.sent, campaign.errors), (3, 0));
    assert_eq!(campaign.status, CampaignStatus::Completed);

    // Sends land in the conversation log as automated outbound messages.
    let thread = ctx.repo.conversation(&ctx.leads[0].contact).await.unwrap();
    assert_eq!(thread.len(), 1);
    assert!(thread[0].automated);

    let mut saw_next_send = false;
    let mut saw_completed = false;
    while let Ok(event) = events.try_recv() {
        match event {
            Event::NextSend { in_secs, .. } => {
                assert!(in_secs >= 1);
                saw_next_send = true;
            }
            Event::CampaignStatus {
                status: CampaignStatus::Completed,
                ..
            } => saw_completed = true,
            _ => {}
        }
    }
    assert!(saw_next_send);
    assert!(saw_completed);
}

#[tokio::test]
async fn test_pause_blocks_sends_and_keeps_items() {
    let ctx = setup(2, (0, 0), MessageTemplate::single("Hello!"), fast_config()).await;

    ctx.queue.start();
    ctx.queue.pause();
    assert_eq!(ctx.queue.state(), QueueState::Paused);

    // Longer than any pacing delay for these bounds: nothing moves.
    sleep(Duration::from_millis(2500)).await;
    assert!(ctx.sender.sent().is_empty());
    assert_eq!(ctx.queue.len(), 2);

    ctx.queue.resume();
    let sender = ctx.sender.clone();
    assert!(wait_for(Duration::from_secs(20), || sender.sent().len() == 2).await);
}

#[tokio::test]
async fn test_stop_keeps_items_and_clear_drops_them() {
    // Wide pacing bounds keep the loop inside its first delay.
    let ctx = setup(2, (8, 8), MessageTemplate::single("Hello!"), fast_config()).await;

    ctx.queue.start();
    sleep(Duration::from_millis(500)).await;
    ctx.queue.stop().await;

    assert_eq!(ctx.queue.state(), QueueState::Stopped);
    assert!(ctx.sender.sent().is_empty());
    assert_eq!(ctx.queue.len(), 2);

    ctx.queue.clear();
    assert!(ctx.queue.is_empty());
}

#[tokio::test]
async fn test_offline_account_holds_items_without_failing_them() {
    let config = QueueConfig {
        checkpoint: Duration::from_millis(50),
        offline_hold: Duration::from_millis(200),
        ..QueueConfig::default()
    };
    let ctx = setup(1, (0, 0), MessageTemplate::single("Hello!"), config).await;
    ctx.sender.set_online(false);

    ctx.queue.start();
    sleep(Duration::from_millis(1500)).await;
    assert!(ctx.sender.sent().is_empty());
    assert_eq!(ctx.queue.len(), 1);
    assert_eq!(ctx.queue.state(), QueueState::Running);

    ctx.sender.set_online(true);
    let sender = ctx.sender.clone();
    assert!(wait_for(Duration::from_secs(20), || sender.sent().len() == 1).await);

    let lead = ctx.repo.lead_for_contact(&ctx.leads[0].contact).await.unwrap().unwrap();
    assert_eq!(lead.status, LeadStatus::Sent);
}

#[tokio::test]
async fn test_daily_cap_skip_leaves_lead_pending() {
    let config = QueueConfig {
        daily_cap: 1,
        checkpoint: Duration::from_millis(50),
        ..QueueConfig::default()
    };
    let ctx = setup(2, (0, 0), MessageTemplate::single("Hello!"), config).await;
    let mut events = ctx.bus.subscribe();

    ctx.queue.start();
    let queue = ctx.queue.clone();
    assert!(wait_for(Duration::from_secs(20), || queue.state() == QueueState::Stopped).await);

    assert_eq!(ctx.sender.sent().len(), 1);
    assert_eq!(ctx.ledger.count_today(ACCOUNT), 1);

    let first = ctx.repo.lead_for_contact(&ctx.leads[0].contact).await.unwrap().unwrap();
    assert_eq!(first.status, LeadStatus::Sent);

    // The capped lead is untouched, not failed: a future day can retry it.
    let second = ctx.repo.lead_for_contact(&ctx.leads[1].contact).await.unwrap().unwrap();
    assert_eq!(second.status, LeadStatus::Pending);
    assert_eq!(second.error, None);

    let campaign = ctx.repo.campaign(&ctx.campaign.id).await.unwrap();
    assert_eq!((campaign.sent, campaign.errors), (1, 0));
    assert_ne!(campaign.status, CampaignStatus::Completed);

    let mut saw_skip = false;
    while let Ok(event) = events.try_recv() {
        if let Event::SendSkipped { reason, .. } = event {
            assert_eq!(reason, "daily send cap reached");
            saw_skip = true;
        }
    }
    assert!(saw_skip);
}

#[tokio::test]
async fn test_send_failure_records_error_and_continues() {
    let ctx = setup(2, (0, 0), MessageTemplate::single("Hello!"), fast_config()).await;
    ctx.sender.fail_next(1);

    ctx.queue.start();
    let queue = ctx.queue.clone();
    assert!(wait_for(Duration::from_secs(20), || queue.state() == QueueState::Stopped).await);

    assert_eq!(ctx.sender.attempts(), 2);
    assert_eq!(ctx.sender.sent().len(), 1);

    let failed = ctx.repo.lead_for_contact(&ctx.leads[0].contact).await.unwrap().unwrap();
    assert_eq!(failed.status, LeadStatus::Failed);
    assert!(failed.error.unwrap().contains("injected failure"));

    let sent = ctx.repo.lead_for_contact(&ctx.leads[1].contact).await.unwrap().unwrap();
    assert_eq!(sent.status, LeadStatus::Sent);

    // Errors count toward completion.
    let campaign = ctx.repo.campaign(&ctx.campaign.id).await.unwrap();
    assert_eq!((campaign.sent, campaign.errors), (1, 1));
    assert_eq!(campaign.status, CampaignStatus::Completed);
}

#[tokio::test]
async fn test_empty_template_skips_lead_without_attempt() {
    let ctx = setup(1, (0, 0), MessageTemplate::new(vec![]), fast_config()).await;
    let mut events = ctx.bus.subscribe();

    ctx.queue.start();
    let queue = ctx.queue.clone();
    assert!(wait_for(Duration::from_secs(20), || queue.state() == QueueState::Stopped).await);

    assert_eq!(ctx.sender.attempts(), 0);
    let lead = ctx.repo.lead_for_contact(&ctx.leads[0].contact).await.unwrap().unwrap();
    assert_eq!(lead.status, LeadStatus::Skipped);
    assert_eq!(lead.error.as_deref(), Some("empty template"));

    let campaign = ctx.repo.campaign(&ctx.campaign.id).await.unwrap();
    assert_eq!((campaign.sent, campaign.errors), (0, 0));

    let mut saw_skip = false;
    while let Ok(event) = events.try_recv() {
        if let Event::SendSkipped { reason, .. } = event {
            assert_eq!(reason, "empty template");
            saw_skip = true;
        }
    }
    assert!(saw_skip);
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let ctx = setup(1, (0, 0), MessageTemplate::single("Hello!"), fast_config()).await;

    ctx.queue.start();
    ctx.queue.start();

    let queue = ctx.queue.clone();
    assert!(wait_for(Duration::from_secs(20), || queue.state() == QueueState::Stopped).await);
    assert_eq!(ctx.sender.sent().len(), 1);
}
