//! Provisioning state machine.
//!
//! ```text
//! Unstarted -> AddressPredicted -> RequestBuilt -> Signed -> Submitted -> Confirmed
//!                                                     \            \-> Failed (retryable: re-submit)
//!                                                      \-> Failed (terminal)
//! ```
//!
//! A [`Provisioner`] holds only read-only state (config + chain handle) and is cheap to clone,
//! so attempts for different owners/salts can run concurrently. Each attempt owns its own
//! [`ProvisioningAttempt`].

use std::{fmt, future::Future, sync::Arc, time::Duration};

use alloy_primitives::{Address, B256};
use serde::Serialize;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use wallet_factory_types::{
    ChainCollaborator, ChainError, SubmissionPayload, TransactionReceipt, TxHandle,
};

use crate::{
    config::ProvisioningConfig,
    digest::build_digest,
    encoder::encode_policy,
    errors::{AddressMismatchError, MismatchOrigin, ProvisionError, SigningError, SubmissionError},
    factory::{created_wallet, submission_payload},
    signer::{recover_signer, AuthorizationSigner},
    types::EncodedPolicy,
    WalletCreationRequest, WalletPolicy,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ProvisioningState {
    Unstarted,
    AddressPredicted,
    RequestBuilt,
    Signed,
    Submitted,
    Confirmed,
    Failed,
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProvisioningState::Unstarted => "unstarted",
            ProvisioningState::AddressPredicted => "address-predicted",
            ProvisioningState::RequestBuilt => "request-built",
            ProvisioningState::Signed => "signed",
            ProvisioningState::Submitted => "submitted",
            ProvisioningState::Confirmed => "confirmed",
            ProvisioningState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One attempt to create one wallet.
#[derive(Debug)]
pub struct ProvisioningAttempt {
    policy: WalletPolicy,
    state: ProvisioningState,
    predicted: Option<Address>,
    encoded: Option<EncodedPolicy>,
    digest: Option<B256>,
    request: Option<WalletCreationRequest>,
    payload: Option<SubmissionPayload>,
    handle: Option<TxHandle>,
    receipt: Option<TransactionReceipt>,
    submissions: u32,
    failure: Option<ProvisionError>,
}

impl ProvisioningAttempt {
    pub fn new(policy: WalletPolicy) -> Self {
        Self {
            policy,
            state: ProvisioningState::Unstarted,
            predicted: None,
            encoded: None,
            digest: None,
            request: None,
            payload: None,
            handle: None,
            receipt: None,
            submissions: 0,
            failure: None,
        }
    }

    pub fn policy(&self) -> &WalletPolicy {
        &self.policy
    }

    pub fn state(&self) -> ProvisioningState {
        self.state
    }

    pub fn predicted_address(&self) -> Option<Address> {
        self.predicted
    }

    pub fn encoded_policy(&self) -> Option<&EncodedPolicy> {
        self.encoded.as_ref()
    }

    pub fn digest(&self) -> Option<B256> {
        self.digest
    }

    pub fn request(&self) -> Option<&WalletCreationRequest> {
        self.request.as_ref()
    }

    pub fn payload(&self) -> Option<&SubmissionPayload> {
        self.payload.as_ref()
    }

    /// Handle of the latest submission (kept even when its receipt never arrived).
    pub fn tx_handle(&self) -> Option<&TxHandle> {
        self.handle.as_ref()
    }

    pub fn receipt(&self) -> Option<&TransactionReceipt> {
        self.receipt.as_ref()
    }

    pub fn submissions(&self) -> u32 {
        self.submissions
    }

    pub fn failure(&self) -> Option<&ProvisionError> {
        self.failure.as_ref()
    }

    /// `true` when the attempt failed on the chain side and may be submitted again.
    pub fn can_resubmit(&self) -> bool {
        self.state == ProvisioningState::Failed
            && self.request.is_some()
            && self.failure.as_ref().is_some_and(ProvisionError::is_retryable)
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == ProvisioningState::Confirmed
    }

    fn fail(&mut self, err: ProvisionError) -> ProvisionError {
        self.state = ProvisioningState::Failed;
        self.failure = Some(err.clone());
        err
    }

    fn require(&self, expected: ProvisioningState, action: &'static str) -> Result<(), ProvisionError> {
        if self.state != expected {
            return Err(ProvisionError::InvalidTransition {
                state: self.state,
                action,
            });
        }
        Ok(())
    }
}

/// Drives provisioning attempts against one factory through a chain collaborator.
pub struct Provisioner<C> {
    config: Arc<ProvisioningConfig>,
    chain: Arc<C>,
}

impl<C> Clone for Provisioner<C> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            chain: Arc::clone(&self.chain),
        }
    }
}

impl<C: ChainCollaborator> Provisioner<C> {
    pub fn new(config: Arc<ProvisioningConfig>, chain: Arc<C>) -> Self {
        Self { config, chain }
    }

    pub fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn begin(&self, policy: WalletPolicy) -> ProvisioningAttempt {
        ProvisioningAttempt::new(policy)
    }

    /// `Unstarted -> AddressPredicted`.
    ///
    /// The local CREATE2 prediction is cross-checked against the factory's own
    /// `computeWalletAddress` when the collaborator offers it. A disagreement is terminal. A
    /// chain fault leaves the attempt `Unstarted` so the caller can simply try again.
    pub async fn predict_address(&self, attempt: &mut ProvisioningAttempt) -> Result<Address, ProvisionError> {
        attempt.require(ProvisioningState::Unstarted, "predict the wallet address")?;
        let owner = attempt.policy.owner;
        let salt = attempt.policy.salt;
        let predicted = self.config.predict_wallet_address(owner, salt);

        match self.chain.deterministic_address(owner, salt).await {
            Ok(reported) if reported != predicted => {
                error!(%owner, %salt, %predicted, %reported, "factory disagrees with local wallet address derivation");
                return Err(attempt.fail(
                    AddressMismatchError {
                        predicted,
                        reported,
                        origin: MismatchOrigin::Oracle,
                    }
                    .into(),
                ));
            }
            Ok(_) => debug!(%owner, %salt, "factory oracle agrees with predicted address"),
            Err(ChainError::NotImplemented) => {
                debug!(%owner, %salt, "no factory oracle available; skipping cross-check")
            }
            Err(err) => {
                warn!(%owner, %salt, error = %err, "factory oracle unavailable");
                return Err(SubmissionError::Chain(err).into());
            }
        }

        attempt.predicted = Some(predicted);
        attempt.state = ProvisioningState::AddressPredicted;
        info!(%owner, %salt, %predicted, state = %attempt.state, "predicted wallet address");
        Ok(predicted)
    }

    /// `AddressPredicted -> RequestBuilt -> Signed`.
    ///
    /// The signer must be the policy owner, and its signature is verified by recovery before the
    /// request is accepted. Encoding and signing failures are terminal for this attempt.
    pub fn build_request(
        &self,
        attempt: &mut ProvisioningAttempt,
        signer: &dyn AuthorizationSigner,
    ) -> Result<WalletCreationRequest, ProvisionError> {
        attempt.require(ProvisioningState::AddressPredicted, "build the creation request")?;
        let owner = attempt.policy.owner;

        let encoded = encode_policy(&attempt.policy).map_err(|e| attempt.fail(e.into()))?;
        let digest = build_digest(&self.config.domain(), &encoded).map_err(|e| attempt.fail(e.into()))?;
        attempt.encoded = Some(encoded);
        attempt.digest = Some(digest);
        attempt.state = ProvisioningState::RequestBuilt;
        debug!(%owner, %digest, state = %attempt.state, "built creation request");

        if signer.address() != owner {
            return Err(attempt.fail(
                SigningError::SignerMismatch {
                    expected: owner,
                    recovered: signer.address(),
                }
                .into(),
            ));
        }
        let signature = signer.sign_digest(&digest).map_err(|e| attempt.fail(e.into()))?;
        let recovered = recover_signer(&digest, signature.as_bytes()).map_err(|e| attempt.fail(e.into()))?;
        if recovered != owner {
            return Err(attempt.fail(
                SigningError::SignerMismatch {
                    expected: owner,
                    recovered,
                }
                .into(),
            ));
        }

        let request = WalletCreationRequest::new(attempt.policy.clone(), signature);
        attempt.payload = Some(submission_payload(&self.config, &request));
        attempt.request = Some(request.clone());
        attempt.state = ProvisioningState::Signed;
        info!(%owner, state = %attempt.state, "signed creation request");
        Ok(request)
    }

    /// `Signed -> Submitted -> Confirmed | Failed`, also re-entered from a retryable failure.
    ///
    /// Submission and the receipt wait share one deadline of `timeout`. Nothing is retried here;
    /// a retryable failure leaves the attempt resubmittable for the caller to decide.
    pub async fn submit(
        &self,
        attempt: &mut ProvisioningAttempt,
        timeout: Duration,
    ) -> Result<Address, ProvisionError> {
        if attempt.state != ProvisioningState::Signed && !attempt.can_resubmit() {
            return Err(ProvisionError::InvalidTransition {
                state: attempt.state,
                action: "submit the creation request",
            });
        }
        let (Some(request), Some(payload), Some(predicted)) =
            (attempt.request.clone(), attempt.payload.clone(), attempt.predicted)
        else {
            return Err(ProvisionError::InvalidTransition {
                state: attempt.state,
                action: "submit the creation request",
            });
        };

        // `None` when `timeout` is too large to land on the clock.
        let deadline = Instant::now().checked_add(timeout);

        attempt.state = ProvisioningState::Submitted;
        attempt.failure = None;
        attempt.receipt = None;
        attempt.submissions += 1;
        let owner = request.owner();
        info!(%owner, submission = attempt.submissions, state = %attempt.state, "submitting wallet creation");

        let handle = match before(deadline, self.chain.submit_creation(&request, &payload)).await {
            None => return Err(retryable(attempt, SubmissionError::Timeout(timeout))),
            Some(Err(err)) => return Err(retryable(attempt, err.into())),
            Some(Ok(handle)) => handle,
        };
        debug!(%owner, tx_hash = %handle.tx_hash, nonce = handle.nonce, "creation transaction accepted");
        attempt.handle = Some(handle.clone());

        let receipt = match before(deadline, self.chain.await_receipt(&handle)).await {
            None => return Err(retryable(attempt, SubmissionError::Timeout(timeout))),
            Some(Err(err)) => return Err(retryable(attempt, err.into())),
            Some(Ok(receipt)) => receipt,
        };
        let tx_hash = receipt.tx_hash;
        let success = receipt.success;
        let reported = created_wallet(self.config.factory, owner, &receipt.logs);
        attempt.receipt = Some(receipt);

        if !success {
            return Err(retryable(attempt, SubmissionError::Reverted(tx_hash)));
        }
        let Some(reported) = reported else {
            return Err(retryable(attempt, SubmissionError::MissingCreationEvent(tx_hash)));
        };
        if reported != predicted {
            error!(%owner, %predicted, %reported, %tx_hash, "factory created the wallet at an unexpected address");
            return Err(attempt.fail(
                AddressMismatchError {
                    predicted,
                    reported,
                    origin: MismatchOrigin::Receipt,
                }
                .into(),
            ));
        }

        attempt.state = ProvisioningState::Confirmed;
        info!(%owner, wallet = %reported, %tx_hash, state = %attempt.state, "wallet created");
        Ok(reported)
    }

    /// Run every remaining step of `attempt` once.
    ///
    /// Picks up where the attempt stands, so a caller's retry loop can hand the same attempt
    /// back after a retryable failure.
    pub async fn provision(
        &self,
        attempt: &mut ProvisioningAttempt,
        signer: &dyn AuthorizationSigner,
        timeout: Duration,
    ) -> Result<Address, ProvisionError> {
        if attempt.state == ProvisioningState::Unstarted {
            self.predict_address(attempt).await?;
        }
        if attempt.state == ProvisioningState::AddressPredicted {
            self.build_request(attempt, signer)?;
        }
        self.submit(attempt, timeout).await
    }
}

/// Await `fut` until `deadline`; `None` if the deadline passed first.
async fn before<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}

fn retryable(attempt: &mut ProvisioningAttempt, err: SubmissionError) -> ProvisionError {
    warn!(
        owner = %attempt.policy.owner,
        submission = attempt.submissions,
        error = %err,
        "wallet creation submission failed"
    );
    attempt.fail(err.into())
}
