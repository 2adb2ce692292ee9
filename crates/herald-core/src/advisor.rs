//! The AI conversation-continuation capability.
//!
//! Only the contract lives here: an ordered transcript goes in, a structured
//! [`Advice`] comes out. Prompting, provider selection and retries belong to
//! implementations. The continuation engine treats `reply == None` the same
//! as `should_stop == true`, and re-validates the fill count against its own
//! caps rather than trusting the capability.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Direction;

/// One transcript line handed to the advisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Who wrote the line.
    pub direction: Direction,
    /// The text.
    pub text: String,
}

impl TranscriptEntry {
    /// A line the contact wrote.
    pub fn inbound(text: impl Into<String>) -> Self {
        Self {
            direction: Direction::Inbound,
            text: text.into(),
        }
    }

    /// A line one of our accounts wrote.
    pub fn outbound(text: impl Into<String>) -> Self {
        Self {
            direction: Direction::Outbound,
            text: text.into(),
        }
    }
}

/// An ordered conversation transcript, oldest first.
pub type Transcript = Vec<TranscriptEntry>;

/// Structured advisor response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Advice {
    /// Extraction state per data category; `None` means not yet learned.
    #[serde(default)]
    pub analysis: BTreeMap<String, Option<String>>,
    /// How many categories the advisor believes are filled. Informational;
    /// the engine recounts from `analysis`.
    #[serde(default)]
    pub filled_count: u32,
    /// The advisor noticed it was about to repeat itself.
    #[serde(default)]
    pub duplicates_found: bool,
    /// The advisor wants the conversation terminated.
    #[serde(default)]
    pub should_stop: bool,
    /// Proposed next message; `None` is equivalent to `should_stop`.
    #[serde(default)]
    pub reply: Option<String>,
}

impl Advice {
    /// A terminating advice with no reply.
    pub fn stop() -> Self {
        Self {
            analysis: BTreeMap::new(),
            filled_count: 0,
            duplicates_found: false,
            should_stop: true,
            reply: None,
        }
    }

    /// A continuing advice proposing the given reply.
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            analysis: BTreeMap::new(),
            filled_count: 0,
            duplicates_found: false,
            should_stop: false,
            reply: Some(text.into()),
        }
    }

    /// Categories actually filled in `analysis`, ignoring the reported count.
    pub fn filled(&self) -> usize {
        self.analysis.values().filter(|v| v.is_some()).count()
    }

    /// Whether this advice terminates the conversation.
    pub fn is_stop(&self) -> bool {
        self.should_stop || self.reply.is_none()
    }
}

/// Errors from the advisor capability.
#[derive(Debug, Error)]
pub enum AdvisorError {
    /// The capability did not answer in time.
    #[error("advisor timed out")]
    Timeout,

    /// The capability answered with something unparseable.
    #[error("malformed advisor response: {0}")]
    Malformed(String),

    /// The capability is unreachable or misconfigured.
    #[error("advisor unavailable: {0}")]
    Unavailable(String),
}

/// The conversation-continuation capability.
///
/// Object-safe; engines hold `Arc<dyn Advisor>`.
#[async_trait]
pub trait Advisor: Send + Sync {
    /// Decide the next step for a conversation given its full transcript.
    async fn advise(&self, transcript: &[TranscriptEntry]) -> Result<Advice, AdvisorError>;

    /// Human-readable name for logs.
    fn name(&self) -> &str;
}
