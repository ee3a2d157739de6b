//! The donation session: a single task owning the workflow state.
//!
//! Every input reaches the session as a message. User actions arrive on the
//! command channel and provider changes on the wallet signal channel.
//! Progress of the in-flight invocation arrives on the status channel, and
//! answers to balance/ownership lookups or connect requests on the reply
//! channel. After each message the session derives a fresh
//! [`DonationSnapshot`] and publishes it on a `watch` channel for the
//! presentation layer.

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::amount::{display_amount, AmountBounds, DonationAmount};
use crate::config::DonationConfig;
use crate::errors::{DonationError, DonationResult};
use crate::interfaces::{
    Account, ContractCall, Navigator, OwnershipError, OwnershipQuery, TokenId,
    TransactionFailure, TxStatus, WalletClient, WalletError, WalletSignal, Wei,
};
use crate::machine::{
    DonationInputs, DonationMachine, InvocationId, SubmitOutcome, TransactionState,
};
use crate::messages::MessageCatalog;
use crate::network::{ChainId, NetworkGuard};
use crate::ownership::{reconcile, OwnershipReconciler, OwnershipRecord, QueryTicket};
use crate::redirect::MintRedirectTrigger;
use crate::view::{DonationView, ViewContext};

/// User actions accepted by the session.
#[derive(Clone, Debug, PartialEq)]
pub enum DonationCommand {
    /// Raw text typed into the amount input.
    SetAmount(String),
    /// Value picked on the slider.
    SetSliderAmount(f64),
    Submit,
    /// Leaves a failed attempt.
    Reset,
}

/// Collaborators the session talks to.
#[derive(Clone)]
pub struct SessionPorts {
    pub wallet: Arc<dyn WalletClient>,
    pub ownership: Arc<dyn OwnershipQuery>,
    pub navigator: Arc<dyn Navigator>,
}

/// Everything derived from the session state after the latest message.
#[derive(Clone, Debug, PartialEq)]
pub struct DonationSnapshot {
    pub account: Option<Account>,
    pub chain: Option<ChainId>,
    pub network_ok: bool,
    pub amount: Option<DonationAmount>,
    pub balance: Option<Wei>,
    pub ownership: OwnershipRecord,
    pub transaction: TransactionState,
    pub wallet_prompt_open: bool,
    pub connecting: bool,
    pub already_donated: bool,
    pub minted: Option<TokenId>,
    pub last_failure: Option<TransactionFailure>,
    pub view: DonationView,
}

pub struct DonationSession {
    command_tx: mpsc::UnboundedSender<DonationCommand>,
    shutdown_tx: watch::Sender<bool>,
    snapshots: watch::Receiver<DonationSnapshot>,
    task: AsyncMutex<Option<JoinHandle<()>>>,
}

impl DonationSession {
    /// Spawns the session loop. Must be called inside a tokio runtime.
    pub fn start(
        config: DonationConfig,
        catalog: MessageCatalog,
        ports: SessionPorts,
        signals: mpsc::UnboundedReceiver<WalletSignal>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        let bounds = config.amount_bounds();
        let state = SessionState {
            guard: NetworkGuard::new(config.network.chain_id),
            amount: bounds.validate_value(bounds.min()),
            bounds,
            account: None,
            chain: None,
            balance: None,
            machine: DonationMachine::new(config.contract.mint_event.clone()),
            reconciler: OwnershipReconciler::new(Arc::clone(&ports.ownership)),
            redirect: MintRedirectTrigger::new(Arc::clone(&ports.navigator), &config.redirect),
            wallet: Arc::clone(&ports.wallet),
            status_tx,
            reply_tx,
            catalog,
            config,
        };
        let (snapshot_tx, snapshots) = watch::channel(state.snapshot());

        let channels = LoopChannels {
            commands: command_rx,
            signals,
            statuses: status_rx,
            replies: reply_rx,
            shutdown: shutdown_rx,
        };
        let task = tokio::spawn(run_loop(state, channels, snapshot_tx));

        Self {
            command_tx,
            shutdown_tx,
            snapshots,
            task: AsyncMutex::new(Some(task)),
        }
    }

    pub fn send(&self, command: DonationCommand) -> DonationResult<()> {
        self.command_tx
            .send(command)
            .map_err(|_| DonationError::SessionStopped)
    }

    pub fn set_amount(&self, raw: impl Into<String>) -> DonationResult<()> {
        self.send(DonationCommand::SetAmount(raw.into()))
    }

    pub fn set_slider_amount(&self, value: f64) -> DonationResult<()> {
        self.send(DonationCommand::SetSliderAmount(value))
    }

    pub fn submit(&self) -> DonationResult<()> {
        self.send(DonationCommand::Submit)
    }

    pub fn reset(&self) -> DonationResult<()> {
        self.send(DonationCommand::Reset)
    }

    pub fn snapshot(&self) -> DonationSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DonationSnapshot> {
        self.snapshots.clone()
    }

    /// Waits until a published snapshot satisfies `predicate`.
    pub async fn wait_for<F>(&self, mut predicate: F) -> DonationResult<DonationSnapshot>
    where
        F: FnMut(&DonationSnapshot) -> bool,
    {
        let mut receiver = self.snapshots.clone();
        let snapshot = receiver
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| DonationError::SessionStopped)?;
        Ok(snapshot.clone())
    }

    pub async fn shutdown(&self) -> DonationResult<()> {
        let _ = self.shutdown_tx.send(true);
        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            handle.await.map_err(|_| DonationError::SessionStopped)?;
        }
        Ok(())
    }
}

enum InvocationEvent {
    Status(TxStatus),
    Failed(WalletError),
}

enum WalletReply {
    Balance {
        ticket: QueryTicket,
        result: Result<Wei, WalletError>,
    },
    Ownership {
        ticket: QueryTicket,
        result: Result<OwnershipRecord, OwnershipError>,
    },
    ConnectFailed(WalletError),
}

struct LoopChannels {
    commands: mpsc::UnboundedReceiver<DonationCommand>,
    signals: mpsc::UnboundedReceiver<WalletSignal>,
    statuses: mpsc::UnboundedReceiver<(InvocationId, InvocationEvent)>,
    replies: mpsc::UnboundedReceiver<WalletReply>,
    shutdown: watch::Receiver<bool>,
}

struct SessionState {
    config: DonationConfig,
    catalog: MessageCatalog,
    guard: NetworkGuard,
    bounds: AmountBounds,
    account: Option<Account>,
    chain: Option<ChainId>,
    amount: Option<DonationAmount>,
    balance: Option<Wei>,
    machine: DonationMachine,
    reconciler: OwnershipReconciler,
    redirect: MintRedirectTrigger,
    wallet: Arc<dyn WalletClient>,
    status_tx: mpsc::UnboundedSender<(InvocationId, InvocationEvent)>,
    reply_tx: mpsc::UnboundedSender<WalletReply>,
}

async fn run_loop(
    mut state: SessionState,
    mut channels: LoopChannels,
    snapshots: watch::Sender<DonationSnapshot>,
) {
    loop {
        tokio::select! {
            biased;
            changed = channels.shutdown.changed() => {
                if changed.is_err() || *channels.shutdown.borrow() {
                    break;
                }
                continue;
            }
            Some(signal) = channels.signals.recv() => state.handle_signal(signal),
            Some((invocation, event)) = channels.statuses.recv() => {
                state.handle_invocation(invocation, event)
            }
            Some(reply) = channels.replies.recv() => state.handle_reply(reply),
            Some(command) = channels.commands.recv() => state.handle_command(command),
            else => break,
        }

        // Every published success is offered to the trigger; it only arms once per token.
        if let Some(minted) = state.machine.minted() {
            state.redirect.observe(minted);
        }
        let snapshot = state.snapshot();
        snapshots.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
    debug!("donation session loop stopped");
}

impl SessionState {
    fn inputs(&self) -> DonationInputs {
        DonationInputs {
            network_ok: self.guard.check(self.chain),
            account_present: self.account.is_some(),
            amount: self.amount,
            balance: self.balance,
            ownership: self.reconciler.record(),
        }
    }

    fn snapshot(&self) -> DonationSnapshot {
        let inputs = self.inputs();
        let view = DonationView::derive(
            &self.machine,
            &inputs,
            &ViewContext {
                catalog: &self.catalog,
                network_name: &self.config.network.network_name,
                pricing: &self.config.estimate,
            },
        );
        DonationSnapshot {
            account: self.account.clone(),
            chain: self.chain,
            network_ok: inputs.network_ok,
            amount: self.amount,
            balance: self.balance,
            ownership: inputs.ownership,
            transaction: self.machine.state(),
            wallet_prompt_open: self.machine.wallet_prompt_open(),
            connecting: self.machine.connecting(),
            already_donated: self.machine.already_donated(&inputs.ownership),
            minted: self.machine.minted().map(|minted| minted.token_id),
            last_failure: self.machine.last_failure().cloned(),
            view,
        }
    }

    fn handle_command(&mut self, command: DonationCommand) {
        match command {
            DonationCommand::SetAmount(raw) => {
                if self.inputs_locked() {
                    debug!("amount input locked after donation");
                    return;
                }
                self.amount = self.bounds.validate(&raw);
            }
            DonationCommand::SetSliderAmount(value) => {
                if self.inputs_locked() {
                    debug!("amount slider locked after donation");
                    return;
                }
                self.amount = self.bounds.validate_value(value);
            }
            DonationCommand::Submit => self.submit(),
            DonationCommand::Reset => {
                if self.machine.reset() {
                    info!("failed donation acknowledged");
                }
            }
        }
    }

    fn inputs_locked(&self) -> bool {
        self.machine.already_donated(&self.reconciler.record())
    }

    fn submit(&mut self) {
        let inputs = self.inputs();
        match self.machine.submit(&inputs) {
            SubmitOutcome::ConnectWallet => {
                info!("no account connected, opening wallet connection");
                let wallet = Arc::clone(&self.wallet);
                let replies = self.reply_tx.clone();
                tokio::spawn(async move {
                    if let Err(error) = wallet.request_connection().await {
                        let _ = replies.send(WalletReply::ConnectFailed(error));
                    }
                });
            }
            SubmitOutcome::Invoke { invocation, value } => {
                let Some(from) = self.account.clone() else {
                    return;
                };
                info!(
                    account = %from,
                    amount = %display_amount(self.amount),
                    %value,
                    "account is about to donate"
                );
                let call = ContractCall {
                    from,
                    contract: self.config.contract.address.clone(),
                    method: self.config.contract.method.clone(),
                    value,
                };
                let wallet = Arc::clone(&self.wallet);
                let statuses = self.status_tx.clone();
                tokio::spawn(async move {
                    match wallet.invoke(call).await {
                        Ok(mut stream) => {
                            let mut finished = false;
                            while let Some(status) = stream.recv().await {
                                finished = matches!(
                                    status,
                                    TxStatus::Success { .. } | TxStatus::Exception(_)
                                );
                                if statuses
                                    .send((invocation, InvocationEvent::Status(status)))
                                    .is_err()
                                    || finished
                                {
                                    break;
                                }
                            }
                            if !finished {
                                let error =
                                    WalletError::Unavailable("status stream closed".to_string());
                                let _ = statuses.send((invocation, InvocationEvent::Failed(error)));
                            }
                        }
                        Err(error) => {
                            let _ = statuses.send((invocation, InvocationEvent::Failed(error)));
                        }
                    }
                });
            }
            SubmitOutcome::Blocked(reason) => {
                debug!(?reason, "donation submit blocked");
            }
        }
    }

    fn handle_signal(&mut self, signal: WalletSignal) {
        match signal {
            WalletSignal::AccountChanged(account) => {
                if account == self.account {
                    return;
                }
                match &account {
                    Some(account) => info!(%account, "wallet account changed"),
                    None => info!("wallet disconnected"),
                }
                self.machine.account_changed(account.is_some());
                self.account = account.clone();
                self.balance = None;
                let ticket = self.reconciler.track(account);
                self.spawn_reads(ticket);
            }
            WalletSignal::ChainChanged(chain) => {
                if chain == self.chain {
                    return;
                }
                self.chain = chain;
                if !self.guard.check(chain) {
                    warn!(
                        current = ?chain,
                        expected = %self.guard.expected(),
                        "wallet connected to an unexpected network"
                    );
                }
                let ticket = self.reconciler.refresh();
                self.spawn_reads(ticket);
            }
            WalletSignal::ConnectionError(error) => {
                warn!(%error, "wallet connection error");
                self.machine.connection_failed();
            }
        }
    }

    fn handle_invocation(&mut self, invocation: InvocationId, event: InvocationEvent) {
        match event {
            InvocationEvent::Status(status) => {
                let succeeded = matches!(status, TxStatus::Success { .. });
                self.machine.apply_status(invocation, status);
                if succeeded && self.machine.state() == TransactionState::Success {
                    let ticket = self.reconciler.refresh();
                    self.spawn_reads(ticket);
                }
            }
            InvocationEvent::Failed(error) => self.machine.invoke_failed(invocation, &error),
        }
    }

    fn handle_reply(&mut self, reply: WalletReply) {
        match reply {
            WalletReply::Balance { ticket, result } => {
                if !self.reconciler.is_current(&ticket) {
                    debug!(account = %ticket.account, "discarding stale balance");
                    return;
                }
                match result {
                    Ok(balance) => self.balance = Some(balance),
                    Err(error) => warn!(account = %ticket.account, %error, "balance lookup failed"),
                }
            }
            WalletReply::Ownership { ticket, result } => match result {
                Ok(record) => {
                    self.reconciler.accept(&ticket, record);
                }
                Err(error) => {
                    warn!(account = %ticket.account, %error, "ownership lookup failed");
                }
            },
            WalletReply::ConnectFailed(error) => {
                warn!(%error, "wallet connection request failed");
                self.machine.connection_failed();
            }
        }
    }

    fn spawn_reads(&self, ticket: Option<QueryTicket>) {
        let Some(ticket) = ticket else {
            return;
        };

        let wallet = Arc::clone(&self.wallet);
        let replies = self.reply_tx.clone();
        let balance_ticket = ticket.clone();
        tokio::spawn(async move {
            let result = wallet.balance(&balance_ticket.account).await;
            let _ = replies.send(WalletReply::Balance {
                ticket: balance_ticket,
                result,
            });
        });

        let query = self.reconciler.query();
        let replies = self.reply_tx.clone();
        tokio::spawn(async move {
            let result = reconcile(query.as_ref(), Some(&ticket.account)).await;
            let _ = replies.send(WalletReply::Ownership { ticket, result });
        });
    }
}
