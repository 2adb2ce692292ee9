//! Per-account inbound pump.
//!
//! One task per account consumes the transport event stream and routes
//! traffic the session's lifecycle loop does not care about: contact syncs
//! feed the alias resolver, inbound messages are resolved, appended to their
//! conversation, matched against leads and handed to the continuation
//! engine. Connection events are ignored here; the session owns those.

use std::sync::Arc;

use continuation::ContinuationEngine;
use herald_core::{ConversationMessage, Event, EventBus, Repository};
use resolver::Resolver;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use transport::{Transport, TransportEvent};

pub(crate) fn spawn_inbound_pump(
    account: String,
    transport: Arc<dyn Transport>,
    resolver: Arc<Resolver>,
    repo: Arc<dyn Repository>,
    bus: EventBus,
    continuation: Arc<ContinuationEngine>,
) -> JoinHandle<()> {
    let mut events = transport.subscribe();
    tokio::spawn(async move {
        debug!(account = %account, "inbound pump running");
        loop {
            match events.recv().await {
                Ok(TransportEvent::ContactSync { alias, contact }) => {
                    resolver.learn(&account, &alias, &contact).await;
                }
                Ok(TransportEvent::Inbound {
                    from,
                    text,
                    self_sent,
                }) => {
                    handle_inbound(
                        &account,
                        &from,
                        &text,
                        self_sent,
                        &resolver,
                        &repo,
                        &bus,
                        &continuation,
                    )
                    .await;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(account = %account, skipped, "inbound pump lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!(account = %account, "inbound pump exited");
    })
}

#[allow(clippy::too_many_arguments)]
async fn handle_inbound(
    account: &str,
    from: &str,
    text: &str,
    self_sent: bool,
    resolver: &Arc<Resolver>,
    repo: &Arc<dyn Repository>,
    bus: &EventBus,
    continuation: &Arc<ContinuationEngine>,
) {
    // A sender address we already hold a lead for is a stable contact, not
    // an alias; only unknown addresses go through resolution.
    let contact = match repo.lead_for_contact(from).await {
        Ok(Some(_)) => from.to_string(),
        _ => match resolver.resolve(from, account).await {
            Some(contact) => contact,
            None => {
                // Best-effort: keep the message under the alias so nothing
                // is lost; a later resolution migrates it.
                warn!(
                    account = %account,
                    alias = %from,
                    "inbound from unresolved alias, storing under alias"
                );
                from.to_string()
            }
        },
    };

    if self_sent {
        // Echo of our own message synced from another device. Recorded so
        // the thread stays complete, never treated as a reply.
        let message = ConversationMessage::outbound(&contact, account, text, false);
        if let Err(e) = repo.append_message(&message).await {
            warn!(account = %account, error = %e, "failed to record self-sent echo");
        }
        return;
    }

    let message = ConversationMessage::inbound(&contact, account, text);
    if let Err(e) = repo.append_message(&message).await {
        warn!(account = %account, error = %e, "failed to record inbound message");
    }

    match repo.mark_lead_replied(&contact).await {
        Ok(Some(lead)) => {
            info!(
                account = %account,
                contact = %contact,
                campaign = %lead.campaign_id,
                "lead replied"
            );
            bus.publish(Event::LeadReplied {
                campaign_id: lead.campaign_id,
                contact: contact.clone(),
            });
        }
        Ok(None) => {}
        Err(e) => {
            warn!(account = %account, contact = %contact, error = %e, "failed to mark lead replied");
        }
    }

    // Follow-up decisions involve read and typing pauses; run them off the
    // pump so a slow pass cannot hold up the event stream.
    let engine = continuation.clone();
    tokio::spawn(async move {
        engine.handle_inbound(&contact).await;
    });
}
