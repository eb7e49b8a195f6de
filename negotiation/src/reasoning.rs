//! The reasoning collaborator.
//!
//! Produces the agents' prose (`lastThought`) and extracts a purchase intent
//! from free text. Its output is opaque except for [`parse_intent`], and a
//! failing reasoner never fails a node.

use async_trait::async_trait;
use escrowflow_compliance::{ComplianceStatus, Credentials};
use escrowflow_core::synapse::Synapse;
use escrowflow_ledger::Money;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use std::collections::VecDeque;
use std::time::Duration;

use crate::state::{Agent, EscrowTerms};

/// What a node asks the reasoner for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    ExtractIntent {
        request: String,
    },
    AnalyzeIntent {
        item: String,
        amount: Money,
        credentials: Credentials,
    },
    EvaluateCompliance {
        amount: Money,
        credentials: Credentials,
        status: ComplianceStatus,
    },
    ProposeEscrow {
        amount: Money,
        terms: EscrowTerms,
    },
    AcceptProposal {
        terms: EscrowTerms,
    },
    ExecuteEscrow {
        terms: EscrowTerms,
    },
    FinalizeSettlement {
        released: Money,
    },
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "a" } else { "NO" }
}

impl Prompt {
    /// The agent speaking.
    pub fn agent(&self) -> Agent {
        match self {
            Prompt::ExtractIntent { .. }
            | Prompt::AnalyzeIntent { .. }
            | Prompt::AcceptProposal { .. } => Agent::Buyer,
            Prompt::EvaluateCompliance { .. }
            | Prompt::ProposeEscrow { .. }
            | Prompt::FinalizeSettlement { .. } => Agent::Compliance,
            Prompt::ExecuteEscrow { .. } => Agent::Ledger,
        }
    }

    /// Instruction text for a language model.
    pub fn render(&self) -> String {
        match self {
            Prompt::ExtractIntent { request } => format!(
                "Extract the item and amount from this request: '{request}'. \
                 Return JSON with keys 'item' (string) and 'amount' (number). \
                 If unsure, default to item='Unknown' and amount=0."
            ),
            Prompt::AnalyzeIntent {
                item,
                amount,
                credentials,
            } => format!(
                "You are a Buyer Agent. You processed a request for '{item}' at ${amount}. \
                 You have {} Sanctions VC and {} Source of Funds VC. \
                 Think aloud about your current status and what you are submitting.",
                yes_no(credentials.sanctions_verified),
                yes_no(credentials.source_of_funds_verified),
            ),
            Prompt::EvaluateCompliance {
                amount,
                credentials,
                status,
            } => format!(
                "You are a Compliance Agent. The verdict for this transaction is {status}. \
                 Transaction: Amount=${amount}, SoF_VC={}, Sanctions_VC={}. \
                 Explain the verdict concisely.",
                credentials.source_of_funds_verified, credentials.sanctions_verified,
            ),
            Prompt::ProposeEscrow { amount, terms } => format!(
                "You are a Compliance Agent. The transaction amount ${amount} is high risk. \
                 Propose a split payment: ${} upfront and ${} in smart escrow until Source \
                 of Funds is provided. Write a professional proposal message.",
                terms.upfront, terms.escrowed,
            ),
            Prompt::AcceptProposal { terms } => format!(
                "You are a Buyer Agent. You have been offered an escrow split (${} now, ${} \
                 later). You value privacy but want the item. Decide to accept the proposal \
                 to move forward. Explain your reasoning (accepting the trade-off).",
                terms.upfront, terms.escrowed,
            ),
            Prompt::ExecuteEscrow { terms } => format!(
                "Summarize for the ledger: seller received ${} upfront and escrow now holds ${}.",
                terms.upfront, terms.escrowed,
            ),
            Prompt::FinalizeSettlement { released } => format!(
                "You are a Compliance Agent. The Source of Funds document has been provided \
                 and verified. Release ${released} from escrow to the seller. State that the \
                 transaction is now fully compliant."
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReasoningError {
    #[error("Reasoner unreachable: {0}")]
    Transport(String),

    #[error("Reasoner returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Reasoner response malformed: {0}")]
    Malformed(String),

    #[error("Reasoner has no answer for {0}")]
    Exhausted(String),
}

/// The reasoning collaborator as the nodes see it.
pub type Reasoner = dyn Synapse<Input = Prompt, Output = String, Error = ReasoningError>;

/// Returned text could not be decoded as `{item, amount}`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("intent extraction failed: {reason}")]
pub struct ExtractionFailure {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
struct RawIntent {
    item: Option<String>,
    amount: Option<serde_json::Value>,
}

/// Decode the first `{` .. last `}` slice of `text` as `{item, amount}`.
///
/// `amount` may be a JSON number or a decimal string; it must not be negative.
pub fn parse_intent(text: &str) -> Result<(String, Money), ExtractionFailure> {
    let fail = |reason: String| ExtractionFailure { reason };

    let start = text
        .find('{')
        .ok_or_else(|| fail("no JSON object in response".into()))?;
    let end = text
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| fail("unterminated JSON object".into()))?;

    let raw: RawIntent =
        serde_json::from_str(&text[start..=end]).map_err(|e| fail(e.to_string()))?;

    let item = raw
        .item
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .ok_or_else(|| fail("missing item".into()))?;

    let amount = match raw.amount {
        Some(serde_json::Value::Number(n)) => n
            .as_f64()
            .and_then(Money::from_f64)
            .ok_or_else(|| fail(format!("amount {n} out of range")))?,
        Some(serde_json::Value::String(s)) => s.parse().map_err(|e| fail(format!("{e}")))?,
        Some(other) => return Err(fail(format!("amount has unexpected type: {other}"))),
        None => return Err(fail("missing amount".into())),
    };
    if amount.is_negative() {
        return Err(fail(format!("negative amount {amount}")));
    }
    Ok((item, amount))
}

/// Offline, deterministic reasoner. Speaks in fixed templates and extracts
/// intents with a token scan instead of a model.
#[derive(Debug, Default, Clone)]
pub struct TemplateReasoner;

impl TemplateReasoner {
    pub fn new() -> Self {
        Self
    }

    fn extract(request: &str) -> String {
        let words: Vec<&str> = request.split_whitespace().collect();
        let found = words.iter().enumerate().find_map(|(i, word)| {
            let cleaned: String = word
                .trim_matches(|c: char| !c.is_ascii_digit() && c != '.')
                .chars()
                .filter(|c| *c != ',')
                .collect();
            let amount = cleaned.parse::<Money>().ok()?;
            word.chars().any(|c| c.is_ascii_digit()).then_some((i, amount))
        });

        match found {
            Some((i, amount)) => {
                let after = words[i + 1..].join(" ");
                let item = if after.is_empty() {
                    "Unknown".to_string()
                } else {
                    after
                };
                json!({ "item": item, "amount": amount.to_string() }).to_string()
            }
            None => "I could not find an amount in that request.".to_string(),
        }
    }
}

#[async_trait]
impl Synapse for TemplateReasoner {
    type Input = Prompt;
    type Output = String;
    type Error = ReasoningError;

    fn name(&self) -> &str {
        "template"
    }

    async fn call(&self, prompt: Prompt) -> Result<String, ReasoningError> {
        Ok(match prompt {
            Prompt::ExtractIntent { request } => Self::extract(&request),
            Prompt::AnalyzeIntent {
                item,
                amount,
                credentials,
            } => format!(
                "Submitting a purchase of '{item}' for ${amount} with {} sanctions credential \
                 and {} source-of-funds credential.",
                if credentials.sanctions_verified { "a" } else { "no" },
                if credentials.source_of_funds_verified { "a" } else { "no" },
            ),
            Prompt::EvaluateCompliance { amount, status, .. } => match status {
                ComplianceStatus::Pending => format!(
                    "${amount} is above the threshold without source of funds; escrow is required."
                ),
                ComplianceStatus::Fail => format!("${amount} cannot be cleared; rejecting."),
                _ => format!("${amount} clears policy; settling directly."),
            },
            Prompt::ProposeEscrow { terms, .. } => format!(
                "Proposing ${} upfront to the seller and ${} held in escrow until source of \
                 funds is verified.",
                terms.upfront, terms.escrowed
            ),
            Prompt::AcceptProposal { .. } => {
                "The split costs some privacy but gets the item moving. Accepting.".to_string()
            }
            Prompt::ExecuteEscrow { terms } => format!(
                "Smart Contract Executed. Seller received ${}. Escrow holding ${}.",
                terms.upfront, terms.escrowed
            ),
            Prompt::FinalizeSettlement { released } => format!(
                "Source of funds verified. Released ${released} to the seller; the transaction \
                 is fully compliant."
            ),
        })
    }
}

/// Replays queued answers in order, then fails with
/// [`ReasoningError::Exhausted`]. For tests and demos.
#[derive(Debug, Default)]
pub struct ScriptedReasoner {
    answers: Mutex<VecDeque<Result<String, ReasoningError>>>,
    seen: Mutex<Vec<Prompt>>,
}

impl ScriptedReasoner {
    pub fn new<I, T>(answers: I) -> Self
    where
        I: IntoIterator<Item = Result<T, ReasoningError>>,
        T: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(|a| a.map(Into::into)).collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Every prompt received so far.
    pub fn prompts(&self) -> Vec<Prompt> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Synapse for ScriptedReasoner {
    type Input = Prompt;
    type Output = String;
    type Error = ReasoningError;

    fn name(&self) -> &str {
        "scripted"
    }

    async fn call(&self, prompt: Prompt) -> Result<String, ReasoningError> {
        let label = format!("{:?}", prompt.agent());
        self.seen.lock().push(prompt);
        self.answers
            .lock()
            .pop_front()
            .unwrap_or(Err(ReasoningError::Exhausted(label)))
    }
}

/// Ollama `/api/generate` client (non-streaming).
#[derive(Debug, Clone)]
pub struct OllamaReasoner {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaReasoner {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ReasoningError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReasoningError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/generate", base_url.trim_end_matches('/')),
            model: model.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Synapse for OllamaReasoner {
    type Input = Prompt;
    type Output = String;
    type Error = ReasoningError;

    fn name(&self) -> &str {
        "ollama"
    }

    async fn call(&self, prompt: Prompt) -> Result<String, ReasoningError> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt.render(),
            "stream": false,
            "options": { "temperature": 0 },
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ReasoningError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReasoningError::Status {
                status: status.as_u16(),
                body: body.chars().take(320).collect(),
            });
        }

        let body: OllamaResponse = response
            .json()
            .await
            .map_err(|e| ReasoningError::Malformed(e.to_string()))?;
        Ok(body.response.trim().to_string())
    }
}
