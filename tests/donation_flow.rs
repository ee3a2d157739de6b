use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::sleep;

use rewilder_donation::config::DonationConfig;
use rewilder_donation::devnet::{DevnetOwnership, DevnetWallet, RecordingNavigator, TxScript};
use rewilder_donation::interfaces::{
    Account, ContractCall, FailureKind, TokenId, TransactionStream, WalletClient, WalletError,
    WalletSignal, Wei,
};
use rewilder_donation::machine::TransactionState;
use rewilder_donation::messages::MessageCatalog;
use rewilder_donation::network::ChainId;
use rewilder_donation::session::{DonationSession, SessionPorts};

const ETHER: u128 = 1_000_000_000_000_000_000;
const CHAIN: ChainId = ChainId(4);

struct Harness {
    session: DonationSession,
    wallet: Arc<DevnetWallet>,
    ownership: Arc<DevnetOwnership>,
    navigator: Arc<RecordingNavigator>,
}

/// Wallet whose status stream closes before reporting anything.
struct SilentWallet {
    inner: Arc<DevnetWallet>,
}

#[async_trait]
impl WalletClient for SilentWallet {
    async fn request_connection(&self) -> Result<(), WalletError> {
        self.inner.request_connection().await
    }

    async fn balance(&self, account: &Account) -> Result<Wei, WalletError> {
        self.inner.balance(account).await
    }

    async fn invoke(&self, _call: ContractCall) -> Result<TransactionStream, WalletError> {
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        drop(status_tx);
        Ok(status_rx)
    }
}

impl Harness {
    fn start() -> Self {
        Self::start_with(|wallet| wallet as Arc<dyn WalletClient>)
    }

    /// Starts a session whose wallet port is built from the devnet wallet.
    fn start_with<F>(port: F) -> Self
    where
        F: FnOnce(Arc<DevnetWallet>) -> Arc<dyn WalletClient>,
    {
        let _ = tracing_subscriber::fmt::try_init();
        let mut config = DonationConfig::default();
        config.network.chain_id = CHAIN;
        config.network.network_name = "Rinkeby".to_string();

        let ownership = Arc::new(DevnetOwnership::default());
        let (wallet, signals) = DevnetWallet::channel();
        let wallet = Arc::new(wallet.with_ownership(Arc::clone(&ownership)));
        let navigator = Arc::new(RecordingNavigator::default());
        let session = DonationSession::start(
            config,
            MessageCatalog::default(),
            SessionPorts {
                wallet: port(Arc::clone(&wallet)),
                ownership: ownership.clone(),
                navigator: navigator.clone(),
            },
            signals,
        );
        Self {
            session,
            wallet,
            ownership,
            navigator,
        }
    }

    /// Connects `account` holding `balance` ether on the expected chain and
    /// waits until the balance has been read.
    async fn connect(&self, account: &Account, balance: u128) {
        self.wallet.set_balance(account, Wei(balance * ETHER));
        self.wallet.emit(WalletSignal::ChainChanged(Some(CHAIN)));
        self.wallet
            .emit(WalletSignal::AccountChanged(Some(account.clone())));
        self.session
            .wait_for(|snapshot| snapshot.account.as_ref() == Some(account) && snapshot.balance.is_some())
            .await
            .expect("account connected");
    }
}

async fn settle() {
    sleep(Duration::from_millis(5)).await;
}

#[tokio::test(start_paused = true)]
async fn successful_donation_redirects_once_to_minted_token() {
    let harness = Harness::start();
    let account = Account::new("0xA");
    harness.wallet.set_script(TxScript::Mint {
        token_id: TokenId(42),
    });
    harness.connect(&account, 10).await;
    harness.session.set_amount("5").expect("set amount");

    let ready = harness
        .session
        .wait_for(|snapshot| snapshot.amount.map(|amount| amount.value()) == Some(5.0))
        .await
        .expect("amount applied");
    assert_eq!(ready.view.button_label, "Donate and mint your NFT");
    assert!(!ready.view.submit_disabled);
    assert!(!ready.already_donated);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut updates = harness.session.subscribe();
    let recorder = {
        let seen = Arc::clone(&seen);
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let state = updates.borrow_and_update().transaction;
                let mut seen = seen.lock();
                if seen.last() != Some(&state) {
                    seen.push(state);
                }
            }
        })
    };

    harness.session.submit().expect("submit");
    let done = harness
        .session
        .wait_for(|snapshot| snapshot.transaction == TransactionState::Success)
        .await
        .expect("donation mined");
    assert_eq!(done.minted, Some(TokenId(42)));
    assert_eq!(done.view.button_label, "Thanks for donating!");
    assert!(done.view.submit_disabled);
    assert!(!done.view.loading);
    assert!(harness.navigator.paths().is_empty());

    let calls = harness.wallet.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, "donate");
    assert_eq!(calls[0].value, Wei(5 * ETHER));
    assert_eq!(calls[0].from, account);

    sleep(Duration::from_millis(2_100)).await;
    assert_eq!(harness.navigator.paths(), vec!["/donation/42".to_string()]);

    // Further updates referencing the same success never re-arm the redirect.
    harness.session.set_amount("7").expect("set amount");
    harness.wallet.emit(WalletSignal::ChainChanged(Some(CHAIN)));
    sleep(Duration::from_millis(5_000)).await;
    assert_eq!(harness.navigator.paths(), vec!["/donation/42".to_string()]);

    let snapshot = harness.session.snapshot();
    assert_eq!(snapshot.amount.map(|amount| amount.value()), Some(5.0));
    assert_eq!(snapshot.ownership.token_id, Some(TokenId(42)));

    harness.session.shutdown().await.expect("shutdown");
    recorder.await.expect("recorder");
    let seen = seen.lock().clone();
    let progression: Vec<_> = seen
        .into_iter()
        .filter(|state| *state != TransactionState::Idle)
        .collect();
    assert_eq!(
        progression,
        vec![
            TransactionState::AwaitingWalletSignature,
            TransactionState::Mining,
            TransactionState::Success,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn missing_account_requests_connection_and_stays_idle() {
    let harness = Harness::start();
    harness.wallet.emit(WalletSignal::ChainChanged(Some(CHAIN)));
    settle().await;

    let snapshot = harness.session.snapshot();
    assert_eq!(snapshot.view.button_label, "Connect Wallet");
    assert_eq!(snapshot.view.loading_label, "Connecting Wallet");

    harness.session.submit().expect("submit");
    settle().await;

    let snapshot = harness.session.snapshot();
    assert_eq!(harness.wallet.connect_requests(), 1);
    assert!(harness.wallet.calls().is_empty());
    assert_eq!(snapshot.transaction, TransactionState::Idle);
    assert!(!snapshot.connecting);
    assert_eq!(snapshot.view.button_label, "Connect Wallet");

    harness.session.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn connect_flow_delivers_account_and_enables_donation() {
    let harness = Harness::start();
    let account = Account::new("0xC");
    harness.wallet.set_balance(&account, Wei(3 * ETHER));
    harness.wallet.set_connect_account(Some(account.clone()));
    harness.wallet.emit(WalletSignal::ChainChanged(Some(CHAIN)));

    harness.session.submit().expect("submit");
    let snapshot = harness
        .session
        .wait_for(|snapshot| snapshot.account.is_some() && snapshot.balance.is_some())
        .await
        .expect("connected");
    assert_eq!(snapshot.transaction, TransactionState::Idle);
    assert!(!snapshot.connecting);
    assert_eq!(snapshot.view.button_label, "Donate and mint your NFT");
    assert_eq!(snapshot.view.loading_label, "Sign Transaction in Wallet");
    assert!(harness.wallet.calls().is_empty());

    harness.session.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn wrong_network_prompt_wins_over_everything() {
    let harness = Harness::start();
    let account = Account::new("0xA");
    harness.ownership.grant(&account, TokenId(5));
    harness.wallet.set_balance(&account, Wei(0));
    harness.wallet.emit(WalletSignal::ChainChanged(Some(ChainId(1))));
    harness
        .wallet
        .emit(WalletSignal::AccountChanged(Some(account.clone())));
    let snapshot = harness
        .session
        .wait_for(|snapshot| snapshot.ownership.token_id.is_some() && snapshot.balance.is_some())
        .await
        .expect("ownership resolved");

    assert!(!snapshot.network_ok);
    assert!(snapshot.already_donated);
    assert_eq!(
        snapshot.view.button_label,
        "Change wallet network to Rinkeby to donate"
    );
    assert!(snapshot.view.submit_disabled);

    harness.session.submit().expect("submit");
    settle().await;
    assert!(harness.wallet.calls().is_empty());
    assert_eq!(harness.wallet.connect_requests(), 0);

    harness.session.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn insufficient_balance_blocks_submission() {
    let harness = Harness::start();
    let account = Account::new("0xA");
    harness.connect(&account, 1).await;
    harness.session.set_amount("5").expect("set amount");
    let snapshot = harness
        .session
        .wait_for(|snapshot| snapshot.amount.map(|amount| amount.value()) == Some(5.0))
        .await
        .expect("amount applied");
    assert_eq!(snapshot.view.button_label, "Insufficient Balance");
    assert!(snapshot.view.submit_disabled);

    harness.session.submit().expect("submit");
    settle().await;
    assert!(harness.wallet.calls().is_empty());
    assert_eq!(harness.session.snapshot().transaction, TransactionState::Idle);

    harness.session.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn unset_amount_displays_empty_and_blocks_submission() {
    let harness = Harness::start();
    let account = Account::new("0xA");
    harness.connect(&account, 10).await;
    harness.session.set_amount("").expect("clear amount");
    let snapshot = harness
        .session
        .wait_for(|snapshot| snapshot.amount.is_none())
        .await
        .expect("amount cleared");
    assert_eq!(snapshot.view.amount_text, "");
    assert!(snapshot.view.submit_disabled);
    assert!(snapshot.view.tier.is_none());

    harness.session.submit().expect("submit");
    settle().await;
    assert!(harness.wallet.calls().is_empty());

    harness.session.set_slider_amount(250.0).expect("slider");
    let snapshot = harness
        .session
        .wait_for(|snapshot| snapshot.amount.is_some())
        .await
        .expect("slider applied");
    assert_eq!(snapshot.view.amount_text, "100");

    harness.session.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn existing_token_marks_account_as_donated() {
    let harness = Harness::start();
    let account = Account::new("0xA");
    harness.ownership.grant(&account, TokenId(17));
    harness.connect(&account, 10).await;
    let snapshot = harness
        .session
        .wait_for(|snapshot| snapshot.ownership.token_id.is_some())
        .await
        .expect("ownership resolved");

    assert!(snapshot.already_donated);
    assert_eq!(snapshot.view.button_label, "Thanks for donating!");
    assert!(snapshot.view.inputs_locked);
    assert_eq!(snapshot.view.thanks_token, Some(TokenId(17)));

    harness.session.set_amount("50").expect("set amount");
    harness.session.submit().expect("submit");
    settle().await;
    assert!(harness.wallet.calls().is_empty());
    assert_eq!(
        harness.session.snapshot().amount.map(|amount| amount.value()),
        Some(1.0)
    );
    assert!(harness.navigator.paths().is_empty());

    harness.session.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn stale_ownership_result_is_discarded_after_account_switch() {
    let harness = Harness::start();
    let slow = Account::new("0xA");
    let current = Account::new("0xB");
    harness.ownership.grant(&slow, TokenId(3));
    harness.ownership.set_latency(&slow, Duration::from_millis(500));
    harness.wallet.set_balance(&current, Wei(10 * ETHER));

    harness.wallet.emit(WalletSignal::ChainChanged(Some(CHAIN)));
    harness
        .wallet
        .emit(WalletSignal::AccountChanged(Some(slow.clone())));
    settle().await;
    harness
        .wallet
        .emit(WalletSignal::AccountChanged(Some(current.clone())));

    sleep(Duration::from_millis(1_000)).await;
    let snapshot = harness.session.snapshot();
    assert_eq!(snapshot.account, Some(current));
    assert_eq!(snapshot.ownership.token_id, None);
    assert!(!snapshot.already_donated);
    assert_eq!(snapshot.view.button_label, "Donate and mint your NFT");

    harness.session.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn rejected_signature_requires_reset_before_retry() {
    let harness = Harness::start();
    let account = Account::new("0xA");
    harness.wallet.set_script(TxScript::Reject);
    harness.connect(&account, 10).await;

    harness.session.submit().expect("submit");
    let failed = harness
        .session
        .wait_for(|snapshot| snapshot.transaction == TransactionState::Exception)
        .await
        .expect("rejection observed");
    assert!(!failed.wallet_prompt_open);
    assert!(!failed.view.loading);
    assert_eq!(
        failed.last_failure.as_ref().map(|failure| failure.kind),
        Some(FailureKind::UserRejected)
    );

    harness.wallet.set_script(TxScript::Mint {
        token_id: TokenId(8),
    });
    harness.session.submit().expect("submit while failed");
    settle().await;
    assert_eq!(harness.wallet.calls().len(), 1);
    assert_eq!(
        harness.session.snapshot().transaction,
        TransactionState::Exception
    );

    harness.session.reset().expect("reset");
    harness
        .session
        .wait_for(|snapshot| snapshot.transaction == TransactionState::Idle)
        .await
        .expect("reset applied");
    harness.session.submit().expect("retry");
    let done = harness
        .session
        .wait_for(|snapshot| snapshot.transaction == TransactionState::Success)
        .await
        .expect("retry mined");
    assert_eq!(done.minted, Some(TokenId(8)));
    assert_eq!(harness.wallet.calls().len(), 2);

    sleep(Duration::from_millis(2_100)).await;
    assert_eq!(harness.navigator.paths(), vec!["/donation/8".to_string()]);

    harness.session.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn unavailable_provider_fails_the_invocation() {
    let harness = Harness::start();
    let account = Account::new("0xA");
    harness.wallet.set_script(TxScript::Unavailable);
    harness.connect(&account, 10).await;

    harness.session.submit().expect("submit");
    let failed = harness
        .session
        .wait_for(|snapshot| snapshot.transaction == TransactionState::Exception)
        .await
        .expect("failure observed");
    assert_eq!(
        failed.last_failure.as_ref().map(|failure| failure.kind),
        Some(FailureKind::Client)
    );
    assert!(!failed.view.loading);

    harness.session.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn reverted_transaction_ends_in_exception() {
    let harness = Harness::start();
    let account = Account::new("0xA");
    harness.wallet.set_script(TxScript::Revert);
    harness.connect(&account, 10).await;

    harness.session.submit().expect("submit");
    let failed = harness
        .session
        .wait_for(|snapshot| snapshot.transaction == TransactionState::Exception)
        .await
        .expect("revert observed");
    assert_eq!(
        failed.last_failure.as_ref().map(|failure| failure.kind),
        Some(FailureKind::Reverted)
    );
    assert!(!failed.already_donated);
    assert_eq!(failed.view.button_label, "Donate and mint your NFT");
    assert!(failed.view.submit_disabled);
    sleep(Duration::from_millis(3_000)).await;
    assert!(harness.navigator.paths().is_empty());

    harness.session.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn closed_status_stream_fails_the_donation() {
    let harness =
        Harness::start_with(|inner| Arc::new(SilentWallet { inner }) as Arc<dyn WalletClient>);
    let account = Account::new("0xA");
    harness.connect(&account, 10).await;

    harness.session.submit().expect("submit");
    sleep(Duration::from_secs(60)).await;

    let failed = harness.session.snapshot();
    assert_eq!(failed.transaction, TransactionState::Exception);
    assert_eq!(
        failed.last_failure.as_ref().map(|failure| failure.kind),
        Some(FailureKind::Client)
    );
    assert!(!failed.wallet_prompt_open);
    assert!(!failed.view.loading);

    harness.session.reset().expect("reset");
    let reset = harness
        .session
        .wait_for(|snapshot| snapshot.transaction == TransactionState::Idle)
        .await
        .expect("reset applied");
    assert!(!reset.view.submit_disabled);
    assert!(harness.navigator.paths().is_empty());

    harness.session.shutdown().await.expect("shutdown");
}
