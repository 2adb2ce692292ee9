//! Alias resolution for inbound replies.
//!
//! Replies do not always arrive under the contact address a campaign
//! message was sent to; some transports hand back an opaque per-device
//! alias instead. The [`Resolver`] maps aliases back to contact addresses
//! through three layers, cheapest first:
//!
//! 1. a global alias→contact cache shared across accounts,
//! 2. the owning account's learned map, fed by transport contact-sync
//!    events,
//! 3. historical inference: the most recent outbound send from this
//!    account that has not yet received a reply under the contact's own
//!    address is assumed to be what the aliased reply answers.
//!
//! A hit in a lower layer populates the layers above it, and the first
//! resolution of an alias migrates any conversation history stored under
//! it to the resolved contact so follow-up handling sees one thread.
//!
//! Layer 3 is a heuristic, not a guarantee: when one account has several
//! concurrently unanswered sends, the reply may be attributed to the
//! wrong contact. Callers must treat inferred resolutions as best-effort.

use std::collections::HashMap;
use std::sync::Arc;

use herald_core::Repository;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Maps transport aliases to contact addresses.
pub struct Resolver {
    repo: Arc<dyn Repository>,
    /// alias → contact, shared across accounts.
    global: RwLock<HashMap<String, String>>,
    /// account → (alias → contact), from contact-sync events.
    learned: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl Resolver {
    /// Create a resolver with empty caches.
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self {
            repo,
            global: RwLock::new(HashMap::new()),
            learned: RwLock::new(HashMap::new()),
        }
    }

    /// Record an alias→contact pairing from a contact-sync event.
    ///
    /// The first mapping for an alias wins; later repeats are ignored.
    pub async fn learn(&self, account: &str, alias: &str, contact: &str) {
        let mut learned = self.learned.write().await;
        let map = learned.entry(account.to_string()).or_default();
        if !map.contains_key(alias) {
            debug!(account, alias, contact, "learned alias mapping");
            map.insert(alias.to_string(), contact.to_string());
        }
    }

    /// Resolve an alias to a contact address, or `None` if every layer
    /// misses.
    ///
    /// The inference layer can misattribute a reply when the account has
    /// more than one unanswered outbound send; see the crate docs.
    pub async fn resolve(&self, alias: &str, account: &str) -> Option<String> {
        if let Some(contact) = self.global.read().await.get(alias).cloned() {
            return Some(contact);
        }

        if let Some(contact) = self.lookup_learned(account, alias).await {
            self.global
                .write()
                .await
                .insert(alias.to_string(), contact.clone());
            self.migrate_history(alias, &contact).await;
            return Some(contact);
        }

        match self.repo.latest_unanswered_outbound(account).await {
            Ok(Some(contact)) => {
                info!(
                    account,
                    alias,
                    contact = %contact,
                    "inferred alias from latest unanswered outbound"
                );
                self.learn(account, alias, &contact).await;
                self.global
                    .write()
                    .await
                    .insert(alias.to_string(), contact.clone());
                self.migrate_history(alias, &contact).await;
                Some(contact)
            }
            Ok(None) => {
                debug!(account, alias, "alias unresolved");
                None
            }
            Err(e) => {
                warn!(account, alias, error = %e, "alias inference lookup failed");
                None
            }
        }
    }

    async fn lookup_learned(&self, account: &str, alias: &str) -> Option<String> {
        self.learned
            .read()
            .await
            .get(account)
            .and_then(|map| map.get(alias).cloned())
    }

    /// Move any history stored under the alias to the resolved contact.
    /// Resolution already succeeded at this point, so a migration failure
    /// is logged and otherwise ignored.
    async fn migrate_history(&self, alias: &str, contact: &str) {
        match self.repo.migrate_conversation(alias, contact).await {
            Ok(0) => {}
            Ok(moved) => {
                info!(alias, contact, moved, "migrated alias-keyed history");
            }
            Err(e) => {
                warn!(alias, contact, error = %e, "history migration failed");
            }
        }
    }
}
