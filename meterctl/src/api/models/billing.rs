//! API request/response models for the inlet and outlet hooks called by the gateway.

use crate::billing::Identity;
use crate::billing::inlet::InletOutcome;
use crate::billing::outlet::OutletOutcome;
use crate::tokenizer::{TokenUsage, Tokenizer};
use crate::types::{ModelId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn default_role() -> String {
    "user".to_string()
}

/// User identity as forwarded by the gateway
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct UserIdentity {
    pub id: UserId,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_role")]
    pub role: String,
}

impl From<UserIdentity> for Identity {
    fn from(user: UserIdentity) -> Self {
        Identity {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
        }
    }
}

/// The part of the chat request the inlet needs
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct InletBody {
    pub model: ModelId,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct InletRequest {
    pub user: UserIdentity,
    pub body: InletBody,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct InletResponse {
    pub success: bool,
    /// Remaining balance, `-1` for deleted users
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub balance: Decimal,
    /// Pre-charge debited by this call, omitted when nothing was charged
    #[serde(default, skip_serializing_if = "Option::is_none", with = "rust_decimal::serde::float_option")]
    #[schema(value_type = Option<f64>)]
    pub inlet_cost: Option<Decimal>,
    pub message: String,
}

impl From<InletOutcome> for InletResponse {
    fn from(outcome: InletOutcome) -> Self {
        let message = match outcome {
            InletOutcome::Deleted => "User is deleted, request passed through without charge".to_string(),
            InletOutcome::Authorized { pre_charge, .. } if pre_charge.is_zero() => "Request authorized".to_string(),
            InletOutcome::Authorized { pre_charge, .. } => format!("Request authorized, pre-charged {pre_charge}"),
        };

        InletResponse {
            success: true,
            balance: outcome.balance(),
            inlet_cost: Some(outcome.pre_charge()).filter(|cost| !cost.is_zero()),
            message,
        }
    }
}

/// One piece of multi-part message content
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Message content is either plain text or a list of typed parts
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Text that is billed: the string itself, or the `text` parts joined by newlines
    pub fn billable_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter(|part| part.kind == "text")
                .filter_map(|part| part.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<MessageContent>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct OutletBody {
    pub model: ModelId,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Token counts reported by the upstream, preferred over local counting when present
#[derive(Debug, Clone, Copy, Deserialize, Serialize, ToSchema)]
pub struct ReportedUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct OutletRequest {
    pub user: UserIdentity,
    pub body: OutletBody,
    #[serde(default)]
    pub usage: Option<ReportedUsage>,
}

impl OutletRequest {
    /// Reported usage if the upstream sent it, otherwise a local count of the conversation
    pub fn token_usage(&self, tokenizer: &Tokenizer) -> TokenUsage {
        if let Some(usage) = self.usage {
            return TokenUsage {
                input_tokens: usize::try_from(usage.input_tokens).unwrap_or(usize::MAX),
                output_tokens: usize::try_from(usage.output_tokens).unwrap_or(usize::MAX),
            };
        }

        let texts: Vec<String> = self
            .body
            .messages
            .iter()
            .map(|message| message.content.as_ref().map(MessageContent::billable_text).unwrap_or_default())
            .collect();
        tokenizer.count_conversation(&texts)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct OutletResponse {
    pub success: bool,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub cost: Decimal,
    /// Balance after settlement, `-1` for deleted users
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub balance: Decimal,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub message: String,
}

impl OutletResponse {
    pub fn new(outcome: &OutletOutcome, usage: TokenUsage) -> Self {
        let message = match outcome {
            OutletOutcome::Deleted => "User is deleted, nothing was charged".to_string(),
            OutletOutcome::Settled(_) => "Usage settled".to_string(),
        };

        OutletResponse {
            success: true,
            cost: outcome.cost(),
            balance: outcome.balance(),
            input_tokens: usage.input_tokens as u64,
            output_tokens: usage.output_tokens as u64,
            message,
        }
    }
}
