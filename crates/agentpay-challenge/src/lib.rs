//! AgentPay OTP Challenge Controller
//!
//! Issues a numeric challenge bound to a mandate and payment method,
//! enforces expiry and bounded verification attempts, and finalizes the
//! transaction on success (token consumption + ledger record).
//!
//! # State machine
//!
//! `Issued -> {Verified, Expired, Exhausted}`. The verification order is
//! fixed: terminal-state check, then expiry, then code comparison. An
//! expired challenge never consumes an attempt; a failed comparison
//! consumes exactly one. Terminal states absorb every later attempt.

use std::collections::HashMap;
use std::sync::Arc;

use agentpay_crypto::generate_otp;
use agentpay_ledger::TransactionLedger;
use agentpay_tokens::{ConsumedToken, TokenIssuer};
use agentpay_types::{
    AgentPayError, Amount, ChallengeId, ChallengeState, CredentialId, MandateId, OtpChallenge,
    Result, TokenId, Transaction, UserId,
};
use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Challenge policy knobs
#[derive(Debug, Clone)]
pub struct ChallengeConfig {
    /// Verification attempts before the challenge exhausts
    pub max_attempts: u32,
    /// Window between issuance and expiry
    pub expiry: Duration,
    /// Width of the numeric code
    pub code_length: usize,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            expiry: Duration::minutes(5),
            code_length: 6,
        }
    }
}

/// Everything bound to a challenge at issuance, so verification can
/// finalize settlement without further lookups
struct ChallengeBinding {
    challenge: OtpChallenge,
    token_id: TokenId,
    user_id: UserId,
    amount: Amount,
}

/// Result of a successful verification
#[derive(Debug)]
pub struct VerificationSuccess {
    pub challenge_id: ChallengeId,
    pub transaction: Transaction,
    pub consumed_token: ConsumedToken,
}

/// The AgentPay challenge controller
pub struct ChallengeController {
    config: ChallengeConfig,
    tokens: Arc<TokenIssuer>,
    ledger: Arc<TransactionLedger>,
    challenges: Arc<RwLock<HashMap<MandateId, ChallengeBinding>>>,
}

impl ChallengeController {
    /// Create a controller finalizing through the given issuer and ledger
    pub fn new(
        config: ChallengeConfig,
        tokens: Arc<TokenIssuer>,
        ledger: Arc<TransactionLedger>,
    ) -> Self {
        Self {
            config,
            tokens,
            ledger,
            challenges: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Issue a challenge for a mandate, replacing any prior one
    ///
    /// The code is fixed-width numeric from the OS CSPRNG. Settlement
    /// context (token, user, amount) is bound here so a later verify can
    /// finalize without re-resolving state.
    pub async fn issue(
        &self,
        mandate_id: &MandateId,
        method_ref: &CredentialId,
        token_id: TokenId,
        user_id: UserId,
        amount: Amount,
    ) -> OtpChallenge {
        let now = Utc::now();
        let challenge = OtpChallenge {
            id: ChallengeId::new(),
            code: generate_otp(self.config.code_length),
            mandate_id: mandate_id.clone(),
            method_ref: method_ref.clone(),
            issued_at: now,
            expires_at: now + self.config.expiry,
            attempts_remaining: self.config.max_attempts,
            state: ChallengeState::Issued,
        };

        let mut challenges = self.challenges.write().await;
        challenges.insert(
            mandate_id.clone(),
            ChallengeBinding {
                challenge: challenge.clone(),
                token_id,
                user_id,
                amount,
            },
        );

        info!(
            "Challenge {} issued for mandate {} (expires {})",
            challenge.id, mandate_id, challenge.expires_at
        );
        challenge
    }

    /// Verify a submitted code
    ///
    /// Check order is fixed and the check-and-mutate section is atomic
    /// per challenge: terminal state, then expiry (no attempt consumed),
    /// then exact comparison. Malformed input is just a failed
    /// comparison and costs an attempt. On success the bound token is
    /// consumed and the transaction recorded.
    pub async fn verify(
        &self,
        mandate_id: &MandateId,
        submitted_code: &str,
    ) -> Result<VerificationSuccess> {
        let mut challenges = self.challenges.write().await;
        let binding = challenges
            .get_mut(mandate_id)
            .ok_or_else(|| AgentPayError::not_found("Challenge", mandate_id.to_string()))?;

        let challenge = &mut binding.challenge;

        if challenge.state.is_terminal() {
            return Err(AgentPayError::ChallengeClosed {
                state: challenge.state.as_str().to_string(),
            });
        }

        if challenge.is_expired() {
            challenge.state = ChallengeState::Expired;
            info!("Challenge {} expired for mandate {}", challenge.id, mandate_id);
            return Err(AgentPayError::Expired {
                entity: "Challenge",
                id: challenge.id.to_string(),
            });
        }

        if challenge.code == submitted_code {
            challenge.state = ChallengeState::Verified;
            let challenge_id = challenge.id.clone();
            let method_ref = challenge.method_ref.clone();

            let consumed_token = self.tokens.consume(&binding.token_id).await?;
            let transaction = self
                .ledger
                .record(
                    mandate_id.clone(),
                    binding.user_id.clone(),
                    binding.amount,
                    method_ref,
                )
                .await?;

            info!(
                "Challenge {} verified; transaction {} recorded",
                challenge_id, transaction.id
            );
            return Ok(VerificationSuccess {
                challenge_id,
                transaction,
                consumed_token,
            });
        }

        // Wrong code: exactly one decrement per failed check
        challenge.attempts_remaining = challenge.attempts_remaining.saturating_sub(1);
        if challenge.attempts_remaining == 0 {
            challenge.state = ChallengeState::Exhausted;
            warn!(
                "Challenge {} exhausted for mandate {}",
                challenge.id, mandate_id
            );
            return Err(AgentPayError::AttemptsExceeded {
                mandate_id: mandate_id.to_string(),
            });
        }

        warn!(
            "Invalid code for mandate {}; {} attempt(s) remaining",
            mandate_id, challenge.attempts_remaining
        );
        Err(AgentPayError::InvalidCode {
            attempts_remaining: challenge.attempts_remaining,
        })
    }

    /// Current state of a mandate's challenge
    pub async fn challenge_state(&self, mandate_id: &MandateId) -> Option<ChallengeState> {
        self.challenges
            .read()
            .await
            .get(mandate_id)
            .map(|b| b.challenge.state)
    }

    /// Snapshot of a mandate's challenge without the code
    pub async fn challenge_meta(&self, mandate_id: &MandateId) -> Option<(ChallengeState, u32)> {
        self.challenges
            .read()
            .await
            .get(mandate_id)
            .map(|b| (b.challenge.state, b.challenge.attempts_remaining))
    }

    /// The raw code, for demo-mode exposure only
    pub async fn peek_code(&self, mandate_id: &MandateId) -> Option<String> {
        self.challenges
            .read()
            .await
            .get(mandate_id)
            .map(|b| b.challenge.code.clone())
    }

    /// Drop expired and terminal challenges; returns the number removed
    pub async fn cleanup_expired(&self) -> usize {
        let mut challenges = self.challenges.write().await;
        let before = challenges.len();
        challenges
            .retain(|_, b| b.challenge.state == ChallengeState::Issued && !b.challenge.is_expired());
        let removed = before - challenges.len();
        if removed > 0 {
            info!("Cleaned up {} closed challenges", removed);
        }
        removed
    }
}
