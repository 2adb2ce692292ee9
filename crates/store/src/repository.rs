//! [`Repository`] implementation backed by SQLite.

use async_trait::async_trait;
use herald_core::{CampaignCounters, RepoResult, Repository};
use herald_core::{
    Account, AccountStatus, Campaign, CampaignStatus, ConversationMessage, Lead,
};

use crate::{account, campaign, conversation, lead, Store};

#[async_trait]
impl Repository for Store {
    async fn upsert_account(&self, account: &Account) -> RepoResult<()> {
        Ok(account::upsert_account(&self.pool, account).await?)
    }

    async fn account(&self, address: &str) -> RepoResult<Account> {
        Ok(account::get_account(&self.pool, address).await?)
    }

    async fn accounts(&self) -> RepoResult<Vec<Account>> {
        Ok(account::list_accounts(&self.pool).await?)
    }

    async fn update_account_status(&self, address: &str, status: AccountStatus) -> RepoResult<()> {
        Ok(account::update_status(&self.pool, address, status).await?)
    }

    async fn clear_account_credentials(&self, address: &str) -> RepoResult<()> {
        Ok(account::clear_credentials(&self.pool, address).await?)
    }

    async fn remove_account(&self, address: &str) -> RepoResult<()> {
        Ok(account::delete_account(&self.pool, address).await?)
    }

    async fn create_campaign(&self, campaign: &Campaign) -> RepoResult<()> {
        Ok(campaign::create_campaign(&self.pool, campaign).await?)
    }

    async fn campaign(&self, id: &str) -> RepoResult<Campaign> {
        Ok(campaign::get_campaign(&self.pool, id).await?)
    }

    async fn campaigns(&self) -> RepoResult<Vec<Campaign>> {
        Ok(campaign::list_campaigns(&self.pool).await?)
    }

    async fn set_campaign_status(&self, id: &str, status: CampaignStatus) -> RepoResult<()> {
        Ok(campaign::set_status(&self.pool, id, status).await?)
    }

    async fn increment_sent(&self, id: &str) -> RepoResult<CampaignCounters> {
        Ok(campaign::increment_sent(&self.pool, id).await?)
    }

    async fn increment_errors(&self, id: &str) -> RepoResult<CampaignCounters> {
        Ok(campaign::increment_errors(&self.pool, id).await?)
    }

    async fn add_leads(&self, leads: &[Lead]) -> RepoResult<()> {
        Ok(lead::add_leads(&self.pool, leads).await?)
    }

    async fn pending_leads(&self, campaign_id: &str) -> RepoResult<Vec<Lead>> {
        Ok(lead::pending_leads(&self.pool, campaign_id).await?)
    }

    async fn mark_lead_sent(&self, lead_id: &str) -> RepoResult<()> {
        Ok(lead::mark_sent(&self.pool, lead_id).await?)
    }

    async fn mark_lead_failed(&self, lead_id: &str, error: &str) -> RepoResult<()> {
        Ok(lead::mark_failed(&self.pool, lead_id, error).await?)
    }

    async fn mark_lead_skipped(&self, lead_id: &str, reason: &str) -> RepoResult<()> {
        Ok(lead::mark_skipped(&self.pool, lead_id, reason).await?)
    }

    async fn mark_lead_replied(&self, contact: &str) -> RepoResult<Option<Lead>> {
        Ok(lead::mark_replied(&self.pool, contact).await?)
    }

    async fn lead_for_contact(&self, contact: &str) -> RepoResult<Option<Lead>> {
        Ok(lead::latest_for_contact(&self.pool, contact).await?)
    }

    async fn store_lead_analysis(
        &self,
        lead_id: &str,
        analysis: &serde_json::Value,
    ) -> RepoResult<()> {
        Ok(lead::store_analysis(&self.pool, lead_id, analysis).await?)
    }

    async fn lead_analysis(&self, lead_id: &str) -> RepoResult<Option<serde_json::Value>> {
        Ok(lead::get_analysis(&self.pool, lead_id).await?)
    }

    async fn append_message(&self, message: &ConversationMessage) -> RepoResult<()> {
        Ok(conversation::append_message(&self.pool, message).await?)
    }

    async fn conversation(&self, contact: &str) -> RepoResult<Vec<ConversationMessage>> {
        Ok(conversation::thread(&self.pool, contact).await?)
    }

    async fn migrate_conversation(&self, from_alias: &str, to_contact: &str) -> RepoResult<u64> {
        Ok(conversation::migrate_thread(&self.pool, from_alias, to_contact).await?)
    }

    async fn latest_unanswered_outbound(&self, account: &str) -> RepoResult<Option<String>> {
        Ok(conversation::latest_unanswered_outbound(&self.pool, account).await?)
    }

    async fn conversations_awaiting_reply(&self) -> RepoResult<Vec<String>> {
        Ok(conversation::awaiting_reply(&self.pool).await?)
    }

    async fn set_conversation_closed(&self, contact: &str) -> RepoResult<()> {
        Ok(conversation::close(&self.pool, contact).await?)
    }

    async fn is_conversation_closed(&self, contact: &str) -> RepoResult<bool> {
        Ok(conversation::is_closed(&self.pool, contact).await?)
    }
}
