//! In-memory stand-ins for the wallet, the ownership indexer and navigation.
//!
//! The devnet wallet plays a scripted transaction for every invocation and
//! reports provider changes through the same [`WalletSignal`] channel a real
//! provider integration would use. It backs the `simulate` command and the
//! test suites.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::debug;

use crate::interfaces::{
    Account, ContractCall, ContractEvent, EventArg, FailureKind, Navigator, OwnershipError,
    OwnershipQuery, TokenId, TransactionFailure, TransactionStream, TxStatus, WalletClient,
    WalletError, WalletSignal, Wei,
};

/// Outcome the devnet plays back for an invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxScript {
    Mint { token_id: TokenId },
    Reject,
    Revert,
    Unavailable,
}

pub struct DevnetWallet {
    signals: mpsc::UnboundedSender<WalletSignal>,
    balances: Mutex<HashMap<Account, Wei>>,
    connect_account: Mutex<Option<Account>>,
    script: Mutex<TxScript>,
    ownership: Option<Arc<DevnetOwnership>>,
    step_delay: Duration,
    calls: Mutex<Vec<ContractCall>>,
    connect_requests: AtomicUsize,
}

impl DevnetWallet {
    /// Creates a wallet together with the receiving end of its signal channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WalletSignal>) {
        let (signals, receiver) = mpsc::unbounded_channel();
        let wallet = Self {
            signals,
            balances: Mutex::new(HashMap::new()),
            connect_account: Mutex::new(None),
            script: Mutex::new(TxScript::Mint {
                token_id: TokenId(1),
            }),
            ownership: None,
            step_delay: Duration::from_millis(50),
            calls: Mutex::new(Vec::new()),
            connect_requests: AtomicUsize::new(0),
        };
        (wallet, receiver)
    }

    /// Successful mints are recorded on `ownership`.
    pub fn with_ownership(mut self, ownership: Arc<DevnetOwnership>) -> Self {
        self.ownership = Some(ownership);
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    pub fn set_balance(&self, account: &Account, balance: Wei) {
        self.balances.lock().insert(account.clone(), balance);
    }

    /// Account announced when the connect flow is opened.
    pub fn set_connect_account(&self, account: Option<Account>) {
        *self.connect_account.lock() = account;
    }

    pub fn set_script(&self, script: TxScript) {
        *self.script.lock() = script;
    }

    pub fn emit(&self, signal: WalletSignal) {
        if self.signals.send(signal).is_err() {
            debug!("devnet wallet signal dropped; no session is listening");
        }
    }

    pub fn calls(&self) -> Vec<ContractCall> {
        self.calls.lock().clone()
    }

    pub fn connect_requests(&self) -> usize {
        self.connect_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletClient for DevnetWallet {
    async fn request_connection(&self) -> Result<(), WalletError> {
        self.connect_requests.fetch_add(1, Ordering::SeqCst);
        let account = self.connect_account.lock().clone();
        match account {
            Some(account) => {
                self.emit(WalletSignal::AccountChanged(Some(account)));
                Ok(())
            }
            None => {
                self.emit(WalletSignal::ConnectionError(
                    "no account authorised".to_string(),
                ));
                Err(WalletError::NotConnected)
            }
        }
    }

    async fn balance(&self, account: &Account) -> Result<Wei, WalletError> {
        Ok(self
            .balances
            .lock()
            .get(account)
            .copied()
            .unwrap_or_default())
    }

    async fn invoke(&self, call: ContractCall) -> Result<TransactionStream, WalletError> {
        self.calls.lock().push(call.clone());
        debug!(from = %call.from, value = %call.value, "devnet invocation");
        let script = self.script.lock().clone();
        if script == TxScript::Unavailable {
            return Err(WalletError::Unavailable("devnet provider offline".to_string()));
        }

        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let ownership = self.ownership.clone();
        let step_delay = self.step_delay;
        let sequence = self.calls.lock().len();
        let account = call.from;
        tokio::spawn(async move {
            sleep(step_delay).await;
            if script == TxScript::Reject {
                let failure =
                    TransactionFailure::new(FailureKind::UserRejected, "user denied signature");
                let _ = status_tx.send(TxStatus::Exception(failure));
                return;
            }
            let _ = status_tx.send(TxStatus::Mining {
                tx_hash: format!("0x{sequence:064x}"),
            });
            sleep(step_delay).await;
            match script {
                TxScript::Mint { token_id } => {
                    if let Some(ownership) = ownership {
                        ownership.grant(&account, token_id);
                    }
                    let event = ContractEvent::new(
                        "Transfer",
                        vec![
                            EventArg::Address(format!("0x{:040x}", 0)),
                            EventArg::Address(account.to_string()),
                            EventArg::Uint(u128::from(token_id.0)),
                        ],
                    );
                    let _ = status_tx.send(TxStatus::Success {
                        events: vec![event],
                    });
                }
                _ => {
                    let failure =
                        TransactionFailure::new(FailureKind::Reverted, "execution reverted");
                    let _ = status_tx.send(TxStatus::Exception(failure));
                }
            }
        });
        Ok(status_rx)
    }
}

#[derive(Default)]
pub struct DevnetOwnership {
    tokens: Mutex<HashMap<Account, Vec<TokenId>>>,
    latency: Mutex<HashMap<Account, Duration>>,
    queries: AtomicUsize,
}

impl DevnetOwnership {
    pub fn grant(&self, account: &Account, token_id: TokenId) {
        self.tokens
            .lock()
            .entry(account.clone())
            .or_default()
            .push(token_id);
    }

    /// Delays every lookup for `account`.
    pub fn set_latency(&self, account: &Account, latency: Duration) {
        self.latency.lock().insert(account.clone(), latency);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self, account: &Account) {
        let latency = self.latency.lock().get(account).copied();
        if let Some(latency) = latency {
            sleep(latency).await;
        }
    }
}

#[async_trait]
impl OwnershipQuery for DevnetOwnership {
    async fn balance_of(&self, account: &Account) -> Result<u64, OwnershipError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency(account).await;
        let count = self
            .tokens
            .lock()
            .get(account)
            .map(|tokens| tokens.len())
            .unwrap_or_default();
        Ok(count as u64)
    }

    async fn token_of_owner_by_index(
        &self,
        account: &Account,
        index: u64,
    ) -> Result<TokenId, OwnershipError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency(account).await;
        self.tokens
            .lock()
            .get(account)
            .and_then(|tokens| tokens.get(index as usize).copied())
            .ok_or(OwnershipError::IndexOutOfRange { index })
    }
}

/// Navigator remembering every requested path.
#[derive(Default)]
pub struct RecordingNavigator {
    paths: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        self.paths.lock().push(path.to_string());
    }
}
