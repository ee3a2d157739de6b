//! Interfaces consumed from the wallet, the ownership indexer and the
//! navigation layer.
//!
//! The wallet reports account, chain and connection changes as
//! [`WalletSignal`] messages; everything else is a request/response call on
//! [`WalletClient`], [`OwnershipQuery`] or [`Navigator`]. A contract
//! invocation hands back a [`TransactionStream`] on which the wallet reports
//! the transaction's progress.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::network::ChainId;

/// Opaque account identity as reported by the wallet.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Account(String);

impl Account {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Smallest unit of the native currency.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Wei(pub u128);

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} wei", self.0)
    }
}

/// Identifier of a minted NFT.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub u64);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payable contract call handed to the wallet for signing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractCall {
    /// Account expected to sign the call.
    pub from: Account,
    pub contract: String,
    pub method: String,
    pub value: Wei,
}

/// Positional event argument decoded by the wallet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventArg {
    Address(String),
    Uint(u128),
}

impl EventArg {
    pub fn as_uint(&self) -> Option<u128> {
        match self {
            EventArg::Uint(value) => Some(*value),
            EventArg::Address(_) => None,
        }
    }
}

/// Event emitted by a mined transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractEvent {
    pub name: String,
    pub args: Vec<EventArg>,
}

impl ContractEvent {
    pub fn new(name: impl Into<String>, args: Vec<EventArg>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// The user declined the signature request.
    UserRejected,
    /// The transaction was mined but reverted.
    Reverted,
    /// The wallet or provider failed before the transaction was mined.
    Client,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::UserRejected => write!(f, "user rejected"),
            FailureKind::Reverted => write!(f, "reverted"),
            FailureKind::Client => write!(f, "client error"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TransactionFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransactionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Progress of a single contract invocation as reported by the wallet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxStatus {
    /// The transaction was signed and accepted into the pending pool.
    Mining { tx_hash: String },
    /// The transaction was mined successfully.
    Success { events: Vec<ContractEvent> },
    Exception(TransactionFailure),
}

pub type TransactionStream = mpsc::UnboundedReceiver<TxStatus>;

/// Changes pushed by the wallet provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletSignal {
    AccountChanged(Option<Account>),
    ChainChanged(Option<ChainId>),
    ConnectionError(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WalletError {
    #[error("wallet is not connected")]
    NotConnected,
    #[error("wallet provider unavailable: {0}")]
    Unavailable(String),
    #[error("wallet request rejected: {0}")]
    Rejected(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OwnershipError {
    #[error("ownership query failed: {0}")]
    Query(String),
    #[error("no token owned at index {index}")]
    IndexOutOfRange { index: u64 },
}

#[async_trait]
pub trait WalletClient: Send + Sync {
    /// Opens the wallet's connect flow. The resulting account arrives later
    /// as a [`WalletSignal::AccountChanged`].
    async fn request_connection(&self) -> Result<(), WalletError>;

    async fn balance(&self, account: &Account) -> Result<Wei, WalletError>;

    async fn invoke(&self, call: ContractCall) -> Result<TransactionStream, WalletError>;
}

#[async_trait]
pub trait OwnershipQuery: Send + Sync {
    async fn balance_of(&self, account: &Account) -> Result<u64, OwnershipError>;

    async fn token_of_owner_by_index(
        &self,
        account: &Account,
        index: u64,
    ) -> Result<TokenId, OwnershipError>;
}

pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}
