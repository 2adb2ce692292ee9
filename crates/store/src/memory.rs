//! In-memory [`Repository`] for tests and examples.
//!
//! Mirrors the SQLite implementation's observable behavior (ordering,
//! duplicate handling, not-found errors) so either backend can sit behind
//! the engine interchangeably.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use herald_core::{CampaignCounters, RepoError, RepoResult, Repository};
use herald_core::{
    Account, AccountStatus, Campaign, CampaignStatus, ConversationMessage, Direction, Lead,
    LeadStatus,
};

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, Account>,
    campaigns: Vec<Campaign>,
    leads: Vec<Lead>,
    analyses: HashMap<String, serde_json::Value>,
    messages: Vec<ConversationMessage>,
    closed: HashSet<String>,
}

/// A [`Repository`] that keeps everything in process memory.
#[derive(Default)]
pub struct MemoryRepository {
    inner: Mutex<Inner>,
}

impl MemoryRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store lock poisoned")
    }
}

fn not_found(entity: &'static str, id: &str) -> RepoError {
    RepoError::NotFound {
        entity,
        id: id.to_string(),
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn upsert_account(&self, account: &Account) -> RepoResult<()> {
        self.lock()
            .accounts
            .insert(account.address.clone(), account.clone());
        Ok(())
    }

    async fn account(&self, address: &str) -> RepoResult<Account> {
        self.lock()
            .accounts
            .get(address)
            .cloned()
            .ok_or_else(|| not_found("Account", address))
    }

    async fn accounts(&self) -> RepoResult<Vec<Account>> {
        let mut accounts: Vec<Account> = self.lock().accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(accounts)
    }

    async fn update_account_status(&self, address: &str, status: AccountStatus) -> RepoResult<()> {
        let mut inner = self.lock();
        let account = inner
            .accounts
            .get_mut(address)
            .ok_or_else(|| not_found("Account", address))?;
        account.status = status;
        Ok(())
    }

    async fn clear_account_credentials(&self, address: &str) -> RepoResult<()> {
        let mut inner = self.lock();
        let account = inner
            .accounts
            .get_mut(address)
            .ok_or_else(|| not_found("Account", address))?;
        account.credentials_ref = None;
        Ok(())
    }

    async fn remove_account(&self, address: &str) -> RepoResult<()> {
        self.lock()
            .accounts
            .remove(address)
            .map(|_| ())
            .ok_or_else(|| not_found("Account", address))
    }

    async fn create_campaign(&self, campaign: &Campaign) -> RepoResult<()> {
        let mut inner = self.lock();
        if inner.campaigns.iter().any(|c| c.id == campaign.id) {
            return Err(RepoError::AlreadyExists {
                entity: "Campaign",
                id: campaign.id.clone(),
            });
        }
        inner.campaigns.push(campaign.clone());
        Ok(())
    }

    async fn campaign(&self, id: &str) -> RepoResult<Campaign> {
        self.lock()
            .campaigns
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| not_found("Campaign", id))
    }

    async fn campaigns(&self) -> RepoResult<Vec<Campaign>> {
        Ok(self.lock().campaigns.clone())
    }

    async fn set_campaign_status(&self, id: &str, status: CampaignStatus) -> RepoResult<()> {
        let mut inner = self.lock();
        let campaign = inner
            .campaigns
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| not_found("Campaign", id))?;
        campaign.status = status;
        Ok(())
    }

    async fn increment_sent(&self, id: &str) -> RepoResult<CampaignCounters> {
        let mut inner = self.lock();
        let campaign = inner
            .campaigns
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| not_found("Campaign", id))?;
        campaign.sent += 1;
        Ok(CampaignCounters {
            sent: campaign.sent,
            errors: campaign.errors,
            total: campaign.total,
        })
    }

    async fn increment_errors(&self, id: &str) -> RepoResult<CampaignCounters> {
        let mut inner = self.lock();
        let campaign = inner
            .campaigns
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| not_found("Campaign", id))?;
        campaign.errors += 1;
        Ok(CampaignCounters {
            sent: campaign.sent,
            errors: campaign.errors,
            total: campaign.total,
        })
    }

    async fn add_leads(&self, leads: &[Lead]) -> RepoResult<()> {
        let mut inner = self.lock();

        // Reject the whole batch on any duplicate id, like the SQL
        // transaction does.
        let mut batch_ids = HashSet::new();
        for lead in leads {
            if inner.leads.iter().any(|l| l.id == lead.id) || !batch_ids.insert(&lead.id) {
                return Err(RepoError::AlreadyExists {
                    entity: "Lead",
                    id: lead.id.clone(),
                });
            }
        }

        let mut per_campaign: HashMap<&str, u64> = HashMap::new();
        for lead in leads {
            *per_campaign.entry(lead.campaign_id.as_str()).or_default() += 1;
        }
        for (campaign_id, count) in per_campaign {
            if let Some(campaign) = inner.campaigns.iter_mut().find(|c| c.id == campaign_id) {
                campaign.total += count;
            }
        }

        inner.leads.extend(leads.iter().cloned());
        Ok(())
    }

    async fn pending_leads(&self, campaign_id: &str) -> RepoResult<Vec<Lead>> {
        Ok(self
            .lock()
            .leads
            .iter()
            .filter(|l| l.campaign_id == campaign_id && l.status == LeadStatus::Pending)
            .cloned()
            .collect())
    }

    async fn mark_lead_sent(&self, lead_id: &str) -> RepoResult<()> {
        let mut inner = self.lock();
        let lead = inner
            .leads
            .iter_mut()
            .find(|l| l.id == lead_id)
            .ok_or_else(|| not_found("Lead", lead_id))?;
        lead.status = LeadStatus::Sent;
        lead.sent_at = Some(Utc::now());
        lead.error = None;
        Ok(())
    }

    async fn mark_lead_failed(&self, lead_id: &str, error: &str) -> RepoResult<()> {
        let mut inner = self.lock();
        let lead = inner
            .leads
            .iter_mut()
            .find(|l| l.id == lead_id)
            .ok_or_else(|| not_found("Lead", lead_id))?;
        lead.status = LeadStatus::Failed;
        lead.error = Some(error.to_string());
        Ok(())
    }

    async fn mark_lead_skipped(&self, lead_id: &str, reason: &str) -> RepoResult<()> {
        let mut inner = self.lock();
        let lead = inner
            .leads
            .iter_mut()
            .find(|l| l.id == lead_id)
            .ok_or_else(|| not_found("Lead", lead_id))?;
        lead.status = LeadStatus::Skipped;
        lead.error = Some(reason.to_string());
        Ok(())
    }

    async fn mark_lead_replied(&self, contact: &str) -> RepoResult<Option<Lead>> {
        let mut inner = self.lock();
        let lead = inner
            .leads
            .iter_mut()
            .rev()
            .find(|l| l.contact == contact && l.status != LeadStatus::Replied);
        match lead {
            Some(lead) => {
                lead.status = LeadStatus::Replied;
                lead.replied_at = Some(Utc::now());
                Ok(Some(lead.clone()))
            }
            None => Ok(None),
        }
    }

    async fn lead_for_contact(&self, contact: &str) -> RepoResult<Option<Lead>> {
        Ok(self
            .lock()
            .leads
            .iter()
            .rev()
            .find(|l| l.contact == contact)
            .cloned())
    }

    async fn store_lead_analysis(
        &self,
        lead_id: &str,
        analysis: &serde_json::Value,
    ) -> RepoResult<()> {
        let mut inner = self.lock();
        if !inner.leads.iter().any(|l| l.id == lead_id) {
            return Err(not_found("Lead", lead_id));
        }
        inner.analyses.insert(lead_id.to_string(), analysis.clone());
        Ok(())
    }

    async fn lead_analysis(&self, lead_id: &str) -> RepoResult<Option<serde_json::Value>> {
        let inner = self.lock();
        if !inner.leads.iter().any(|l| l.id == lead_id) {
            return Err(not_found("Lead", lead_id));
        }
        Ok(inner.analyses.get(lead_id).cloned())
    }

    async fn append_message(&self, message: &ConversationMessage) -> RepoResult<()> {
        self.lock().messages.push(message.clone());
        Ok(())
    }

    async fn conversation(&self, contact: &str) -> RepoResult<Vec<ConversationMessage>> {
        Ok(self
            .lock()
            .messages
            .iter()
            .filter(|m| m.contact == contact)
            .cloned()
            .collect())
    }

    async fn migrate_conversation(&self, from_alias: &str, to_contact: &str) -> RepoResult<u64> {
        let mut moved = 0u64;
        for message in &mut self.lock().messages {
            if message.contact == from_alias {
                message.contact = to_contact.to_string();
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn latest_unanswered_outbound(&self, account: &str) -> RepoResult<Option<String>> {
        let inner = self.lock();
        for (i, message) in inner.messages.iter().enumerate().rev() {
            if message.account != account || message.direction != Direction::Outbound {
                continue;
            }
            let answered = inner.messages[i + 1..]
                .iter()
                .any(|m| m.contact == message.contact && m.direction == Direction::Inbound);
            if !answered {
                return Ok(Some(message.contact.clone()));
            }
        }
        Ok(None)
    }

    async fn conversations_awaiting_reply(&self) -> RepoResult<Vec<String>> {
        let inner = self.lock();
        let mut last_index: HashMap<&str, usize> = HashMap::new();
        for (i, message) in inner.messages.iter().enumerate() {
            last_index.insert(message.contact.as_str(), i);
        }

        let mut pending: Vec<(usize, String)> = Vec::new();
        for (contact, i) in last_index {
            if inner.messages[i].direction == Direction::Inbound && !inner.closed.contains(contact)
            {
                pending.push((i, contact.to_string()));
            }
        }
        pending.sort_by_key(|(i, _)| *i);
        Ok(pending.into_iter().map(|(_, contact)| contact).collect())
    }

    async fn set_conversation_closed(&self, contact: &str) -> RepoResult<()> {
        self.lock().closed.insert(contact.to_string());
        Ok(())
    }

    async fn is_conversation_closed(&self, contact: &str) -> RepoResult<bool> {
        Ok(self.lock().closed.contains(contact))
    }
}
