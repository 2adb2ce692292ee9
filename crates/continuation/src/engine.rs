//! Decides and sends automated follow-ups for conversations with replies.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use herald_core::{
    AccountSender, Advice, Advisor, ConversationMessage, Direction, Event, EventBus, Lead,
    Repository, TranscriptEntry,
};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ContinuationConfig;
use crate::error::ContinuationError;
use crate::similarity;

/// Per-contact follow-up loop: *awaiting decision → sent follow-up →
/// awaiting decision → … → terminated*.
///
/// Each inbound reply triggers at most one pass. A pass asks the advisor for
/// the next message, applies the engine's own safeguards (follow-up cap,
/// fill target, duplicate rejection, cooldown) and either sends a follow-up
/// through the owning account or terminates the conversation, storing the
/// extraction result against the lead. Conversations on campaigns without
/// continuation criteria are never touched.
pub struct ContinuationEngine {
    repo: Arc<dyn Repository>,
    advisor: Arc<dyn Advisor>,
    bus: EventBus,
    config: ContinuationConfig,
    senders: RwLock<HashMap<String, Arc<dyn AccountSender>>>,
    /// Contacts with a pass currently in flight.
    in_flight: Mutex<HashSet<String>>,
    /// Last automated follow-up per contact.
    cooldowns: Mutex<HashMap<String, Instant>>,
}

/// Releases the per-contact claim on every exit path, including panics.
struct InFlightGuard<'a> {
    engine: &'a ContinuationEngine,
    contact: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.engine
            .in_flight
            .lock()
            .expect("in-flight set lock poisoned")
            .remove(&self.contact);
    }
}

impl ContinuationEngine {
    /// Create an engine over the shared repository, advisor and event bus.
    pub fn new(
        repo: Arc<dyn Repository>,
        advisor: Arc<dyn Advisor>,
        bus: EventBus,
        config: ContinuationConfig,
    ) -> Self {
        Self {
            repo,
            advisor,
            bus,
            config,
            senders: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            cooldowns: Mutex::new(HashMap::new()),
        }
    }

    /// Make an account's sender available for follow-ups.
    pub fn register_sender(&self, sender: Arc<dyn AccountSender>) {
        let address = sender.address().to_string();
        self.senders
            .write()
            .expect("sender registry lock poisoned")
            .insert(address, sender);
    }

    /// Forget an account's sender, e.g. when the account is removed.
    pub fn deregister_sender(&self, account: &str) {
        self.senders
            .write()
            .expect("sender registry lock poisoned")
            .remove(account);
    }

    fn sender_for(&self, account: &str) -> Option<Arc<dyn AccountSender>> {
        self.senders
            .read()
            .expect("sender registry lock poisoned")
            .get(account)
            .cloned()
    }

    /// Claim the contact for one pass. `None` when a pass is already running.
    /// Check and insert happen under one lock acquisition.
    fn try_claim(&self, contact: &str) -> Option<InFlightGuard<'_>> {
        let mut held = self
            .in_flight
            .lock()
            .expect("in-flight set lock poisoned");
        if !held.insert(contact.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            engine: self,
            contact: contact.to_string(),
        })
    }

    fn inside_cooldown(&self, contact: &str) -> bool {
        self.cooldowns
            .lock()
            .expect("cooldown map lock poisoned")
            .get(contact)
            .map_or(false, |last| last.elapsed() < self.config.cooldown)
    }

    fn stamp_cooldown(&self, contact: &str) {
        self.cooldowns
            .lock()
            .expect("cooldown map lock poisoned")
            .insert(contact.to_string(), Instant::now());
    }

    /// React to a fresh inbound message from a contact.
    ///
    /// Skips silently when another pass for the contact is already in flight
    /// or the cooldown window is still open. Everything else is logged and
    /// swallowed so a continuation failure cannot take the caller down.
    pub async fn handle_inbound(&self, contact: &str) {
        let Some(_guard) = self.try_claim(contact) else {
            debug!(contact = %contact, "continuation pass already in flight");
            return;
        };
        if let Err(e) = self.drive(contact).await {
            warn!(contact = %contact, error = %e, "continuation pass failed");
        }
    }

    async fn drive(&self, contact: &str) -> Result<(), ContinuationError> {
        if self.repo.is_conversation_closed(contact).await? {
            debug!(contact = %contact, "conversation already terminated");
            return Ok(());
        }
        let Some(lead) = self.repo.lead_for_contact(contact).await? else {
            debug!(contact = %contact, "no lead for contact");
            return Ok(());
        };
        let campaign = self.repo.campaign(&lead.campaign_id).await?;
        let Some(criteria) = campaign.continuation else {
            debug!(contact = %contact, "campaign has no continuation criteria");
            return Ok(());
        };
        if self.inside_cooldown(contact) {
            debug!(contact = %contact, "inside cooldown window");
            return Ok(());
        }

        let thread = self.repo.conversation(contact).await?;
        let Some(last) = thread.last() else {
            return Ok(());
        };
        if last.direction != Direction::Inbound {
            debug!(contact = %contact, "nothing awaiting a reply");
            return Ok(());
        }
        let account = last.account.clone();
        let Some(sender) = self.sender_for(&account) else {
            return Err(ContinuationError::NoSender(account));
        };

        let transcript: Vec<TranscriptEntry> = thread
            .iter()
            .map(|m| TranscriptEntry {
                direction: m.direction,
                text: m.text.clone(),
            })
            .collect();

        // Advisor failures are an implicit stop, not an error.
        let advice = match self.advisor.advise(&transcript).await {
            Ok(advice) => advice,
            Err(e) => {
                warn!(
                    contact = %contact,
                    advisor = %self.advisor.name(),
                    error = %e,
                    "advisor failed"
                );
                return self.terminate(contact, &lead, None, "advisor unavailable").await;
            }
        };

        if follow_up_count(&thread) >= criteria.max_replies {
            return self
                .terminate(contact, &lead, Some(&advice), "follow-up cap reached")
                .await;
        }
        if advice.duplicates_found {
            return self
                .terminate(contact, &lead, Some(&advice), "advisor flagged repetition")
                .await;
        }
        // Recount filled categories from the analysis itself; the reported
        // count is not trusted.
        let filled = criteria
            .categories
            .iter()
            .filter(|c| advice.analysis.get(c.as_str()).map_or(false, Option::is_some))
            .count();
        if !criteria.categories.is_empty() && filled >= criteria.categories.len() {
            return self
                .terminate(contact, &lead, Some(&advice), "all data categories filled")
                .await;
        }
        let reply = match advice.reply.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() && !advice.should_stop => text.to_string(),
            _ => {
                return self
                    .terminate(contact, &lead, Some(&advice), "advisor ended the conversation")
                    .await;
            }
        };

        let own = thread
            .iter()
            .filter(|m| m.direction == Direction::Outbound && m.account == account)
            .map(|m| m.text.as_str());
        if similarity::find_repeat(&reply, own).is_some() {
            warn!(contact = %contact, "proposed reply repeats an earlier message");
            return self
                .terminate(contact, &lead, Some(&advice), "reply repeats an earlier message")
                .await;
        }

        self.deliver(&sender, contact, &reply).await
    }

    /// Send one follow-up: read pause, typing simulation, direct transport
    /// send. Reactive sends bypass the campaign queue's scheduling.
    async fn deliver(
        &self,
        sender: &Arc<dyn AccountSender>,
        contact: &str,
        reply: &str,
    ) -> Result<(), ContinuationError> {
        sleep(pacing::read_delay()).await;
        if let Err(e) = sender.send_typing(contact, true).await {
            debug!(contact = %contact, error = %e, "typing indicator failed");
        }
        sleep(pacing::typing_duration(reply.len())).await;
        if let Err(e) = sender.send_typing(contact, false).await {
            debug!(contact = %contact, error = %e, "typing indicator failed");
        }

        let ack = sender.send(contact, reply).await?;
        self.stamp_cooldown(contact);

        let message = ConversationMessage::outbound(contact, sender.address(), reply, true);
        if let Err(e) = self.repo.append_message(&message).await {
            warn!(contact = %contact, error = %e, "failed to record follow-up");
        }
        self.bus.publish(Event::AutoReply {
            account: sender.address().to_string(),
            contact: contact.to_string(),
        });
        info!(
            account = %sender.address(),
            contact = %contact,
            id = %ack.id,
            "sent automated follow-up"
        );
        Ok(())
    }

    /// Close the conversation, storing the extraction result when one came
    /// back with the final advice.
    async fn terminate(
        &self,
        contact: &str,
        lead: &Lead,
        advice: Option<&Advice>,
        reason: &str,
    ) -> Result<(), ContinuationError> {
        if let Some(advice) = advice {
            if !advice.analysis.is_empty() {
                let analysis = serde_json::to_value(&advice.analysis)?;
                if let Err(e) = self.repo.store_lead_analysis(&lead.id, &analysis).await {
                    warn!(contact = %contact, error = %e, "failed to store extraction result");
                }
            }
        }
        self.repo.set_conversation_closed(contact).await?;
        self.bus.publish(Event::ConversationClosed {
            contact: contact.to_string(),
        });
        info!(contact = %contact, reason = %reason, "conversation terminated");
        Ok(())
    }

    /// One reconciliation pass over conversations whose last message is
    /// inbound: re-drives each as if the inbound had just arrived. Covers
    /// replies whose resolution landed late and decisions lost to a restart.
    pub async fn sweep(&self) {
        let contacts = match self.repo.conversations_awaiting_reply().await {
            Ok(contacts) => contacts,
            Err(e) => {
                warn!(error = %e, "awaiting-reply scan failed");
                return;
            }
        };
        if contacts.is_empty() {
            return;
        }
        debug!(count = contacts.len(), "reconciliation sweep");
        for (i, contact) in contacts.iter().enumerate() {
            if i > 0 {
                sleep(self.config.sweep_spacing).await;
            }
            self.handle_inbound(contact).await;
        }
    }

    /// Run the reconciliation sweep forever at the configured interval.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            loop {
                sleep(engine.config.sweep_interval).await;
                engine.sweep().await;
            }
        })
    }
}

/// Automated outbound messages sent after the contact first wrote back.
/// The campaign opener itself does not count against the follow-up cap.
fn follow_up_count(thread: &[ConversationMessage]) -> u32 {
    let mut seen_inbound = false;
    let mut count = 0;
    for message in thread {
        match message.direction {
            Direction::Inbound => seen_inbound = true,
            Direction::Outbound if message.automated && seen_inbound => count += 1,
            Direction::Outbound => {}
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follow_up_count_ignores_the_opener() {
        let thread = vec![
            ConversationMessage::outbound("+1c", "+1a", "opener", true),
            ConversationMessage::inbound("+1c", "+1a", "hi"),
            ConversationMessage::outbound("+1c", "+1a", "follow-up", true),
            ConversationMessage::outbound("+1c", "+1a", "manual note", false),
            ConversationMessage::inbound("+1c", "+1a", "more"),
        ];
        assert_eq!(follow_up_count(&thread), 1);
    }

    #[test]
    fn test_follow_up_count_on_empty_thread() {
        assert_eq!(follow_up_count(&[]), 0);
    }
}
