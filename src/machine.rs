use std::fmt;

use tracing::{debug, info, warn};

use crate::amount::DonationAmount;
use crate::interfaces::{
    ContractEvent, FailureKind, TokenId, TransactionFailure, TxStatus, WalletError, Wei,
};
use crate::ownership::OwnershipRecord;

/// Stage of the single in-flight donation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TransactionState {
    #[default]
    Idle,
    AwaitingWalletSignature,
    Mining,
    Success,
    Exception,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Success | TransactionState::Exception)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransactionState::Idle => "idle",
            TransactionState::AwaitingWalletSignature => "awaiting-signature",
            TransactionState::Mining => "mining",
            TransactionState::Success => "success",
            TransactionState::Exception => "exception",
        };
        f.write_str(label)
    }
}

/// Sequence number of a submitted invocation. Statuses are only applied to
/// the invocation they were reported for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct InvocationId(pub u64);

/// Everything outside the machine that gates a submission.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DonationInputs {
    pub network_ok: bool,
    pub account_present: bool,
    pub amount: Option<DonationAmount>,
    pub balance: Option<Wei>,
    pub ownership: OwnershipRecord,
}

impl DonationInputs {
    /// An unknown balance never counts as insufficient.
    pub fn insufficient_balance(&self) -> bool {
        match (self.amount, self.balance) {
            (Some(amount), Some(balance)) => match amount.to_wei() {
                Ok(value) => value > balance,
                Err(_) => true,
            },
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitBlock {
    NetworkMismatch,
    AmountUnset,
    AlreadyDonated,
    InsufficientBalance,
    InvalidAmount,
    Busy(TransactionState),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// No account is connected; the wallet's connect flow should be opened.
    ConnectWallet,
    /// The wallet should be asked to sign a donation carrying `value`.
    Invoke { invocation: InvocationId, value: Wei },
    Blocked(SubmitBlock),
}

/// Token minted by a successful invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MintedToken {
    pub invocation: InvocationId,
    pub token_id: TokenId,
}

#[derive(Clone, Debug)]
pub struct DonationMachine {
    state: TransactionState,
    wallet_prompt_open: bool,
    connecting: bool,
    invocation: InvocationId,
    minted: Option<MintedToken>,
    last_failure: Option<TransactionFailure>,
    mint_event: String,
}

impl DonationMachine {
    pub fn new(mint_event: impl Into<String>) -> Self {
        Self {
            state: TransactionState::Idle,
            wallet_prompt_open: false,
            connecting: false,
            invocation: InvocationId::default(),
            minted: None,
            last_failure: None,
            mint_event: mint_event.into(),
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn wallet_prompt_open(&self) -> bool {
        self.wallet_prompt_open
    }

    pub fn connecting(&self) -> bool {
        self.connecting
    }

    pub fn invocation(&self) -> InvocationId {
        self.invocation
    }

    pub fn minted(&self) -> Option<MintedToken> {
        self.minted
    }

    pub fn last_failure(&self) -> Option<&TransactionFailure> {
        self.last_failure.as_ref()
    }

    pub fn loading(&self) -> bool {
        self.wallet_prompt_open || self.state == TransactionState::Mining
    }

    pub fn already_donated(&self, ownership: &OwnershipRecord) -> bool {
        self.state == TransactionState::Success || ownership.holds_token()
    }

    /// Checks evaluated in the same order as the submit button's label.
    pub fn submit(&mut self, inputs: &DonationInputs) -> SubmitOutcome {
        if !inputs.network_ok {
            return SubmitOutcome::Blocked(SubmitBlock::NetworkMismatch);
        }
        if !inputs.account_present {
            self.connecting = true;
            return SubmitOutcome::ConnectWallet;
        }
        if self.already_donated(&inputs.ownership) {
            return SubmitOutcome::Blocked(SubmitBlock::AlreadyDonated);
        }
        if inputs.insufficient_balance() {
            return SubmitOutcome::Blocked(SubmitBlock::InsufficientBalance);
        }
        let Some(amount) = inputs.amount else {
            return SubmitOutcome::Blocked(SubmitBlock::AmountUnset);
        };
        if self.state != TransactionState::Idle {
            return SubmitOutcome::Blocked(SubmitBlock::Busy(self.state));
        }
        let value = match amount.to_wei() {
            Ok(value) => value,
            Err(error) => {
                warn!(%error, "donation amount cannot be converted");
                return SubmitOutcome::Blocked(SubmitBlock::InvalidAmount);
            }
        };

        self.invocation = InvocationId(self.invocation.0 + 1);
        self.state = TransactionState::AwaitingWalletSignature;
        self.wallet_prompt_open = true;
        self.last_failure = None;
        SubmitOutcome::Invoke {
            invocation: self.invocation,
            value,
        }
    }

    pub fn account_changed(&mut self, present: bool) {
        if present {
            self.connecting = false;
        }
    }

    pub fn connection_failed(&mut self) {
        self.connecting = false;
    }

    /// The wallet refused the invocation, or its status stream ended before
    /// a terminal status.
    pub fn invoke_failed(&mut self, invocation: InvocationId, error: &WalletError) {
        if invocation != self.invocation
            || !matches!(
                self.state,
                TransactionState::AwaitingWalletSignature | TransactionState::Mining
            )
        {
            return;
        }
        let kind = match error {
            WalletError::Rejected(_) => FailureKind::UserRejected,
            _ => FailureKind::Client,
        };
        self.fail(TransactionFailure::new(kind, error.to_string()));
    }

    /// Applies a status from the wallet. Returns the minted token when the
    /// invocation completed with the expected mint event.
    pub fn apply_status(
        &mut self,
        invocation: InvocationId,
        status: TxStatus,
    ) -> Option<MintedToken> {
        if invocation != self.invocation {
            debug!(
                invocation = invocation.0,
                current = self.invocation.0,
                "ignoring status of superseded invocation"
            );
            return None;
        }

        match (self.state, status) {
            (TransactionState::AwaitingWalletSignature, TxStatus::Mining { tx_hash }) => {
                info!(%tx_hash, "donation accepted into the pending pool");
                self.state = TransactionState::Mining;
                self.wallet_prompt_open = false;
                None
            }
            (
                TransactionState::AwaitingWalletSignature | TransactionState::Mining,
                TxStatus::Exception(failure),
            ) => {
                self.fail(failure);
                None
            }
            (TransactionState::Mining, TxStatus::Success { events }) => {
                self.state = TransactionState::Success;
                self.wallet_prompt_open = false;
                let minted = self
                    .minted_token_id(&events)
                    .map(|token_id| MintedToken {
                        invocation,
                        token_id,
                    });
                match minted {
                    Some(minted) => {
                        info!(token_id = %minted.token_id, "donation NFT minted");
                        self.minted = Some(minted);
                    }
                    None => warn!(
                        event = %self.mint_event,
                        "donation succeeded without a decodable mint event"
                    ),
                }
                minted
            }
            (state, status) => {
                debug!(%state, ?status, "ignoring status without transition");
                None
            }
        }
    }

    /// Leaves a failed attempt so the inputs can be re-evaluated.
    pub fn reset(&mut self) -> bool {
        if self.state != TransactionState::Exception {
            return false;
        }
        self.state = TransactionState::Idle;
        self.last_failure = None;
        true
    }

    fn fail(&mut self, failure: TransactionFailure) {
        warn!(kind = %failure.kind, message = %failure.message, "donation failed");
        self.state = TransactionState::Exception;
        self.wallet_prompt_open = false;
        self.last_failure = Some(failure);
    }

    fn minted_token_id(&self, events: &[ContractEvent]) -> Option<TokenId> {
        let event = events.iter().find(|event| event.name == self.mint_event)?;
        let raw = event.args.get(2)?.as_uint()?;
        u64::try_from(raw).ok().map(TokenId)
    }
}
