//! End-to-end demo: two mock accounts run a small campaign, one contact
//! replies, and the continuation engine follows up until its question is
//! answered.
//!
//! Run with: `cargo run --example campaign_demo`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use continuation::ContinuationConfig;
use herald_core::{
    Advice, Advisor, AdvisorError, Campaign, ContinuationCriteria, Direction, EventBus,
    MessageTemplate, Repository, TranscriptEntry,
};
use orchestrator::{Orchestrator, OrchestratorConfig};
use send_queue::QueueConfig;
use store::MemoryRepository;
use tokio::time::sleep;
use transport::{MockFactory, TransportEvent};

/// Toy advisor: asks for a budget until one shows up in the transcript,
/// then extracts it and stops.
struct BudgetAdvisor;

#[async_trait]
impl Advisor for BudgetAdvisor {
    async fn advise(&self, transcript: &[TranscriptEntry]) -> Result<Advice, AdvisorError> {
        let budget = transcript
            .iter()
            .filter(|entry| entry.direction == Direction::Inbound)
            .find(|entry| entry.text.contains('$'))
            .map(|entry| entry.text.clone());

        match budget {
            Some(budget) => {
                let mut advice = Advice::stop();
                advice.analysis.insert("budget".to_string(), Some(budget));
                advice.filled_count = 1;
                Ok(advice)
            }
            None => Ok(Advice::reply(
                "Good to hear from you! What budget did you have in mind?",
            )),
        }
    }

    fn name(&self) -> &str {
        "budget-demo"
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let repo = Arc::new(MemoryRepository::new());
    let factory = Arc::new(MockFactory::new());
    let bus = EventBus::new();

    let config = OrchestratorConfig {
        queue: QueueConfig {
            daily_cap: 50,
            ..QueueConfig::default()
        },
        // Short cooldown so the second reply gets a pass too.
        continuation: ContinuationConfig {
            cooldown: Duration::from_secs(2),
            ..ContinuationConfig::default()
        },
        ..OrchestratorConfig::default()
    };
    let orchestrator = Arc::new(Orchestrator::new(
        repo.clone(),
        factory.clone(),
        Arc::new(BudgetAdvisor),
        bus.clone(),
        config,
    ));
    orchestrator.spawn_sweeper();

    // Print everything the engine broadcasts.
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("event: {}", event.description());
        }
    });

    for address in ["+15550000001", "+15550000002"] {
        orchestrator.register_account(address, "demo").await?;
        orchestrator.connect_account(address).await?;
    }
    sleep(Duration::from_millis(500)).await;

    // Tight pacing bounds so the demo finishes quickly.
    let campaign = Campaign::new(
        "demo launch",
        MessageTemplate::new(vec![
            "Hi! We just opened bookings for spring.".to_string(),
            "Hello! Spring bookings are open now.".to_string(),
        ]),
        1,
        3,
    )
    .with_continuation(ContinuationCriteria::new(vec!["budget".to_string()]));
    orchestrator.create_campaign(&campaign).await?;

    let contacts: Vec<String> = (0..4).map(|i| format!("+1555777000{}", i)).collect();
    orchestrator.import_leads(&campaign.id, &contacts).await?;
    orchestrator.start_campaign(&campaign.id, None).await?;

    // Let the queues work through their (short) pacing delays.
    sleep(Duration::from_secs(12)).await;

    // One contact writes back through the first account.
    let transport = factory
        .transport_for("+15550000001")
        .expect("transport exists");
    transport.emit(TransportEvent::Inbound {
        from: contacts[0].clone(),
        text: "hey, what is this about?".to_string(),
        self_sent: false,
    });

    // Read pause + typing simulation precede the follow-up.
    sleep(Duration::from_secs(10)).await;
    transport.emit(TransportEvent::Inbound {
        from: contacts[0].clone(),
        text: "around $2000 I think".to_string(),
        self_sent: false,
    });
    sleep(Duration::from_secs(3)).await;

    println!("\naccounts:");
    for account in orchestrator.accounts_overview() {
        println!(
            "  {} {:?} queued={} sent_today={}",
            account.address, account.status, account.queued, account.sent_today
        );
    }

    let lead = repo.lead_for_contact(&contacts[0]).await?.expect("lead");
    println!("\nlead {}: {:?}", lead.contact, lead.status);
    if let Some(analysis) = repo.lead_analysis(&lead.id).await? {
        println!("extracted: {}", analysis);
    }
    for message in repo.conversation(&contacts[0]).await? {
        println!(
            "  [{}] {}: {}",
            message.direction.as_str(),
            message.account,
            message.text
        );
    }

    Ok(())
}
