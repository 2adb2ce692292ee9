//! End-to-end orchestration scenarios over the mock transport and the
//! in-memory repository.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use continuation::ContinuationConfig;
use herald_core::{
    Account, AccountStatus, Advice, Advisor, AdvisorError, Campaign, CampaignStatus,
    ConversationMessage, Event, EventBus, LeadStatus, MessageTemplate, QueueState, Repository,
    TranscriptEntry,
};
use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorError};
use send_queue::QueueConfig;
use session::SessionConfig;
use store::MemoryRepository;
use tokio::time::{sleep, Instant};
use transport::{MockFactory, TransportEvent};

const ACCOUNT_A: &str = "+15550000001";
const ACCOUNT_B: &str = "+15550000002";

/// Advisor that always ends the conversation; these scenarios exercise the
/// orchestration plumbing, not the continuation decisions.
struct StopAdvisor;

#[async_trait]
impl Advisor for StopAdvisor {
    async fn advise(&self, _transcript: &[TranscriptEntry]) -> Result<Advice, AdvisorError> {
        Ok(Advice::stop())
    }

    fn name(&self) -> &str {
        "stop"
    }
}

/// Production timings shrunk so scenarios finish in milliseconds.
fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        stagger_min: Duration::from_millis(10),
        stagger_max: Duration::from_millis(20),
        settle_delay: Duration::from_millis(150),
        session: SessionConfig {
            unauthorized_retry: Duration::from_millis(20),
            restart_delay: Duration::from_millis(10),
            backoff_base: Duration::from_millis(10),
            backoff_cap: Duration::from_millis(40),
            heartbeat_interval: Duration::from_secs(60),
        },
        queue: QueueConfig {
            checkpoint: Duration::from_millis(50),
            ..QueueConfig::default()
        },
        continuation: ContinuationConfig {
            sweep_interval: Duration::from_secs(600),
            ..ContinuationConfig::default()
        },
    }
}

struct Ctx {
    orchestrator: Arc<Orchestrator>,
    repo: Arc<MemoryRepository>,
    factory: Arc<MockFactory>,
    bus: EventBus,
}

fn setup() -> Ctx {
    let repo = Arc::new(MemoryRepository::new());
    let factory = Arc::new(MockFactory::new());
    let bus = EventBus::new();
    let orchestrator = Arc::new(Orchestrator::new(
        repo.clone(),
        factory.clone(),
        Arc::new(StopAdvisor),
        bus.clone(),
        fast_config(),
    ));
    Ctx {
        orchestrator,
        repo,
        factory,
        bus,
    }
}

/// Poll `cond` until it holds or `deadline` passes.
async fn wait_for(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if cond() {
            return true;
        }
        sleep(Duration::from_millis(25)).await;
    }
    cond()
}

async fn bring_online(ctx: &Ctx, address: &str) {
    ctx.orchestrator
        .register_account(address, "test")
        .await
        .unwrap();
    ctx.orchestrator.connect_account(address).await.unwrap();
    let orchestrator = ctx.orchestrator.clone();
    let address = address.to_string();
    assert!(
        wait_for(Duration::from_secs(5), || {
            orchestrator
                .accounts_overview()
                .iter()
                .any(|a| a.address == address && a.status == AccountStatus::Online)
        })
        .await,
        "account {} never came online",
        address
    );
}

/// Campaign with wide pacing bounds: queues hold items in their first
/// pacing delay for at least 15 seconds, so tests can inspect them.
async fn slow_campaign(ctx: &Ctx, n_leads: usize) -> Campaign {
    let campaign = Campaign::new("launch", MessageTemplate::single("Hello there!"), 30, 90);
    ctx.orchestrator.create_campaign(&campaign).await.unwrap();
    let contacts: Vec<String> = (0..n_leads).map(|i| format!("+1555777{:04}", i)).collect();
    ctx.orchestrator
        .import_leads(&campaign.id, &contacts)
        .await
        .unwrap();
    campaign
}

#[tokio::test]
async fn test_register_is_exclusive_per_address() {
    let ctx = setup();
    ctx.orchestrator
        .register_account(ACCOUNT_A, "first")
        .await
        .unwrap();

    let result = ctx.orchestrator.register_account(ACCOUNT_A, "again").await;
    assert!(matches!(result, Err(OrchestratorError::AccountExists(_))));
}

#[tokio::test]
async fn test_start_campaign_without_online_accounts_fails() {
    let ctx = setup();
    let campaign = slow_campaign(&ctx, 3).await;

    let result = ctx.orchestrator.start_campaign(&campaign.id, None).await;
    assert!(matches!(result, Err(OrchestratorError::NoAccountsOnline)));

    // Nothing was marked Running.
    let stored = ctx.repo.campaign(&campaign.id).await.unwrap();
    assert_eq!(stored.status, CampaignStatus::Draft);
}

#[tokio::test]
async fn test_round_robin_split_pause_and_stop() {
    let ctx = setup();
    bring_online(&ctx, ACCOUNT_A).await;
    bring_online(&ctx, ACCOUNT_B).await;
    let campaign = slow_campaign(&ctx, 10).await;

    let queued = ctx
        .orchestrator
        .start_campaign(&campaign.id, None)
        .await
        .unwrap();
    assert_eq!(queued, 10);

    // Even round-robin split, both queues running.
    let overview = ctx.orchestrator.accounts_overview();
    assert_eq!(overview.len(), 2);
    for account in &overview {
        assert_eq!(account.queued, 5, "uneven split for {}", account.address);
        assert_eq!(account.queue, QueueState::Running);
    }
    let stored = ctx.repo.campaign(&campaign.id).await.unwrap();
    assert_eq!(stored.status, CampaignStatus::Running);

    // Pause holds the queues without losing items.
    ctx.orchestrator.pause_campaign(&campaign.id).await.unwrap();
    let overview = ctx.orchestrator.accounts_overview();
    for account in &overview {
        assert_eq!(account.queue, QueueState::Paused);
        assert_eq!(account.queued, 5);
    }
    assert_eq!(
        ctx.repo.campaign(&campaign.id).await.unwrap().status,
        CampaignStatus::Paused
    );

    // Stop empties both queues and settles the campaign.
    ctx.orchestrator.stop_campaign(&campaign.id).await.unwrap();
    let overview = ctx.orchestrator.accounts_overview();
    for account in &overview {
        assert_eq!(account.queue, QueueState::Stopped);
        assert_eq!(account.queued, 0);
    }
    assert_eq!(
        ctx.repo.campaign(&campaign.id).await.unwrap().status,
        CampaignStatus::Stopped
    );

    // No send ever went out: the pacing delay was never allowed to elapse.
    let transport = ctx.factory.transport_for(ACCOUNT_A).unwrap();
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_pinned_account_takes_all_leads() {
    let ctx = setup();
    bring_online(&ctx, ACCOUNT_A).await;
    bring_online(&ctx, ACCOUNT_B).await;
    let campaign = slow_campaign(&ctx, 4).await;

    ctx.orchestrator
        .start_campaign(&campaign.id, Some(ACCOUNT_A))
        .await
        .unwrap();

    let overview = ctx.orchestrator.accounts_overview();
    let a = overview.iter().find(|a| a.address == ACCOUNT_A).unwrap();
    let b = overview.iter().find(|a| a.address == ACCOUNT_B).unwrap();
    assert_eq!(a.queued, 4);
    assert_eq!(b.queued, 0);
}

#[tokio::test]
async fn test_pinning_an_offline_account_fails() {
    let ctx = setup();
    bring_online(&ctx, ACCOUNT_A).await;
    ctx.orchestrator
        .register_account(ACCOUNT_B, "cold")
        .await
        .unwrap();
    let campaign = slow_campaign(&ctx, 2).await;

    let result = ctx
        .orchestrator
        .start_campaign(&campaign.id, Some(ACCOUNT_B))
        .await;
    assert!(matches!(result, Err(OrchestratorError::NoAccountsOnline)));
}

#[tokio::test]
async fn test_aliased_reply_resolves_and_marks_lead_replied() {
    let ctx = setup();
    let mut events = ctx.bus.subscribe();
    bring_online(&ctx, ACCOUNT_A).await;

    let campaign = slow_campaign(&ctx, 1).await;
    let contact = "+15557770000";

    // The campaign message went out and is still unanswered.
    ctx.repo
        .append_message(&ConversationMessage::outbound(
            contact, ACCOUNT_A, "Hello there!", true,
        ))
        .await
        .unwrap();

    // The reply arrives under a transport-internal alias.
    let transport = ctx.factory.transport_for(ACCOUNT_A).unwrap();
    transport.emit(TransportEvent::Inbound {
        from: "alias-42".to_string(),
        text: "who is this?".to_string(),
        self_sent: false,
    });

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(Some(lead)) = ctx.repo.lead_for_contact(contact).await {
            if lead.status == LeadStatus::Replied {
                break;
            }
        }
        assert!(Instant::now() < deadline, "lead never marked replied");
        sleep(Duration::from_millis(25)).await;
    }

    // The inbound landed in the contact's thread, not under the alias.
    let thread = ctx.repo.conversation(contact).await.unwrap();
    assert_eq!(thread.len(), 2);
    assert_eq!(thread[1].text, "who is this?");
    assert!(ctx.repo.conversation("alias-42").await.unwrap().is_empty());

    let lead = ctx.repo.lead_for_contact(contact).await.unwrap().unwrap();
    assert_eq!(lead.status, LeadStatus::Replied);
    assert_eq!(lead.campaign_id, campaign.id);

    let mut saw_replied = false;
    while let Ok(event) = events.try_recv() {
        if let Event::LeadReplied {
            contact: replied, ..
        } = event
        {
            assert_eq!(replied, contact);
            saw_replied = true;
        }
    }
    assert!(saw_replied);
}

#[tokio::test]
async fn test_self_sent_echo_is_recorded_not_replied() {
    let ctx = setup();
    bring_online(&ctx, ACCOUNT_A).await;
    slow_campaign(&ctx, 1).await;
    let contact = "+15557770000";

    let transport = ctx.factory.transport_for(ACCOUNT_A).unwrap();
    transport.emit(TransportEvent::Inbound {
        from: contact.to_string(),
        text: "sent from my other device".to_string(),
        self_sent: true,
    });
    sleep(Duration::from_millis(300)).await;

    let thread = ctx.repo.conversation(contact).await.unwrap();
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].direction, herald_core::Direction::Outbound);
    assert!(!thread[0].automated);

    // The lead is untouched: an echo is not a reply.
    let lead = ctx.repo.lead_for_contact(contact).await.unwrap().unwrap();
    assert_eq!(lead.status, LeadStatus::Pending);
}

#[tokio::test]
async fn test_recovery_reconnects_only_online_accounts_and_requeues() {
    let ctx = setup();

    // Persisted state from the previous process: A was online, B offline,
    // and a running campaign still has pending leads.
    let mut online = Account::new(ACCOUNT_A).with_credentials("cred-a");
    online.status = AccountStatus::Online;
    ctx.repo.upsert_account(&online).await.unwrap();
    let offline = Account::new(ACCOUNT_B).with_credentials("cred-b");
    ctx.repo.upsert_account(&offline).await.unwrap();

    let mut campaign = Campaign::new("resumed", MessageTemplate::single("Hello there!"), 60, 120);
    campaign.status = CampaignStatus::Running;
    ctx.repo.create_campaign(&campaign).await.unwrap();
    ctx.orchestrator
        .import_leads(
            &campaign.id,
            &[
                "+15557770001".to_string(),
                "+15557770002".to_string(),
                "+15557770003".to_string(),
                "+15557770004".to_string(),
            ],
        )
        .await
        .unwrap();

    let reconnecting = ctx.orchestrator.recover().await.unwrap();
    assert_eq!(reconnecting, 1);

    // After the settle delay the campaign's leads land on the one account
    // that came back online.
    let orchestrator = ctx.orchestrator.clone();
    assert!(
        wait_for(Duration::from_secs(5), || {
            orchestrator
                .accounts_overview()
                .iter()
                .find(|a| a.address == ACCOUNT_A)
                .map_or(false, |a| a.queued == 4)
        })
        .await
    );

    let transport_a = ctx.factory.transport_for(ACCOUNT_A).unwrap();
    let transport_b = ctx.factory.transport_for(ACCOUNT_B).unwrap();
    assert!(transport_a.connect_count() >= 1);
    assert_eq!(transport_b.connect_count(), 0);

    let overview = ctx.orchestrator.accounts_overview();
    let b = overview.iter().find(|a| a.address == ACCOUNT_B).unwrap();
    assert_eq!(b.status, AccountStatus::Offline);
    assert_eq!(b.queued, 0);

    assert_eq!(
        ctx.repo.campaign(&campaign.id).await.unwrap().status,
        CampaignStatus::Running
    );
}

#[tokio::test]
async fn test_recovery_never_reconnects_banned_accounts() {
    let ctx = setup();
    let mut banned = Account::new(ACCOUNT_A);
    banned.status = AccountStatus::Banned;
    ctx.repo.upsert_account(&banned).await.unwrap();

    ctx.orchestrator.recover().await.unwrap();
    sleep(Duration::from_millis(300)).await;

    let transport = ctx.factory.transport_for(ACCOUNT_A).unwrap();
    assert_eq!(transport.connect_count(), 0);

    // The rebuilt session adopts the persisted ban, so the overview shows
    // it instead of a fresh Offline.
    let overview = ctx.orchestrator.accounts_overview();
    let a = overview.iter().find(|a| a.address == ACCOUNT_A).unwrap();
    assert_eq!(a.status, AccountStatus::Banned);

    // Manual connect attempts are refused too.
    let result = ctx.orchestrator.connect_account(ACCOUNT_A).await;
    assert!(matches!(result, Err(OrchestratorError::AccountBanned(_))));
}

#[tokio::test]
async fn test_remove_account_tears_everything_down() {
    let ctx = setup();
    bring_online(&ctx, ACCOUNT_A).await;

    ctx.orchestrator.remove_account(ACCOUNT_A).await.unwrap();

    assert!(ctx.orchestrator.accounts_overview().is_empty());
    assert!(ctx.repo.account(ACCOUNT_A).await.is_err());
    assert!(ctx.orchestrator.connect_account(ACCOUNT_A).await.is_err());

    let result = ctx.orchestrator.remove_account(ACCOUNT_A).await;
    assert!(matches!(result, Err(OrchestratorError::UnknownAccount(_))));
}
