use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tokio::time::sleep;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rewilder_donation::amount::{parse_units, NATIVE_DECIMALS};
use rewilder_donation::config::DonationConfig;
use rewilder_donation::devnet::{DevnetOwnership, DevnetWallet, RecordingNavigator, TxScript};
use rewilder_donation::interfaces::{Account, TokenId, WalletSignal};
use rewilder_donation::machine::TransactionState;
use rewilder_donation::messages::MessageCatalog;
use rewilder_donation::network::ChainId;
use rewilder_donation::session::{DonationSession, DonationSnapshot, SessionPorts};

#[derive(Parser)]
#[command(author, version, about = "Rewilder donation workflow")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default donation configuration
    GenerateConfig {
        #[arg(short, long, default_value = "config/donation.toml")]
        path: PathBuf,
    },
    /// Run a donation against the in-memory devnet wallet
    Simulate {
        #[arg(short, long, default_value = "config/donation.toml")]
        config: PathBuf,
        #[arg(long, default_value = "0x00000000000000000000000000000000000000a1")]
        account: String,
        /// Wallet balance in the native currency
        #[arg(long, default_value = "10")]
        balance: String,
        /// Amount typed into the donation input
        #[arg(long, default_value = "5")]
        amount: String,
        #[arg(long, default_value_t = 42)]
        token_id: u64,
        /// Decline the signature request
        #[arg(long, default_value_t = false)]
        reject: bool,
        /// Revert the transaction after it was mined
        #[arg(long, default_value_t = false)]
        revert: bool,
        /// Connect the wallet to a different chain than the contract's
        #[arg(long, default_value_t = false)]
        wrong_network: bool,
    },
}

struct SimulateArgs {
    config: PathBuf,
    account: String,
    balance: String,
    amount: String,
    script: TxScript,
    wrong_network: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::GenerateConfig { path } => generate_config(path)?,
        Commands::Simulate {
            config,
            account,
            balance,
            amount,
            token_id,
            reject,
            revert,
            wrong_network,
        } => {
            let script = if reject {
                TxScript::Reject
            } else if revert {
                TxScript::Revert
            } else {
                TxScript::Mint {
                    token_id: TokenId(token_id),
                }
            };
            simulate(SimulateArgs {
                config,
                account,
                balance,
                amount,
                script,
                wrong_network,
            })
            .await?
        }
    }

    Ok(())
}

fn generate_config(path: PathBuf) -> Result<()> {
    DonationConfig::default()
        .save(&path)
        .with_context(|| format!("unable to write config {}", path.display()))?;
    info!(?path, "wrote default configuration");
    Ok(())
}

fn load_config(path: &Path) -> Result<DonationConfig> {
    if path.exists() {
        DonationConfig::load(path)
            .with_context(|| format!("unable to load config {}", path.display()))
    } else {
        info!(?path, "config not found, using defaults");
        Ok(DonationConfig::default())
    }
}

async fn simulate(args: SimulateArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let catalog = MessageCatalog::resolve(config.messages_path.as_deref());

    let account = Account::new(args.account);
    let balance = parse_units(&args.balance, NATIVE_DECIMALS)
        .map_err(|err| anyhow!("invalid --balance: {err}"))?;

    let ownership = Arc::new(DevnetOwnership::default());
    let (wallet, signals) = DevnetWallet::channel();
    let wallet = Arc::new(wallet.with_ownership(Arc::clone(&ownership)));
    wallet.set_balance(&account, balance);
    wallet.set_connect_account(Some(account.clone()));
    wallet.set_script(args.script);
    let navigator = Arc::new(RecordingNavigator::default());

    let session = DonationSession::start(
        config.clone(),
        catalog,
        SessionPorts {
            wallet: wallet.clone(),
            ownership,
            navigator: navigator.clone(),
        },
        signals,
    );
    let printer = tokio::spawn(print_changes(session.subscribe()));

    let expected = config.network.chain_id;
    let chain = if args.wrong_network {
        ChainId(expected.0.wrapping_add(1))
    } else {
        expected
    };
    wallet.emit(WalletSignal::ChainChanged(Some(chain)));
    session.set_amount(args.amount)?;
    let snapshot = session.wait_for(|snapshot| snapshot.chain.is_some()).await?;
    if !snapshot.network_ok {
        info!(label = %snapshot.view.button_label, "donation unavailable");
        return finish(&session, printer).await;
    }

    session.submit()?;
    let snapshot = session
        .wait_for(|snapshot| snapshot.account.is_some() && snapshot.balance.is_some())
        .await?;
    if snapshot.view.submit_disabled {
        info!(label = %snapshot.view.button_label, "donation unavailable");
        return finish(&session, printer).await;
    }

    session.submit()?;
    let snapshot = session
        .wait_for(|snapshot| snapshot.transaction.is_terminal())
        .await?;
    if snapshot.transaction == TransactionState::Success {
        sleep(config.redirect.delay() + Duration::from_millis(100)).await;
        for path in navigator.paths() {
            info!(%path, "navigated");
        }
    } else if let Some(failure) = &snapshot.last_failure {
        info!(%failure, "donation did not complete");
    }

    finish(&session, printer).await
}

async fn finish(
    session: &DonationSession,
    printer: tokio::task::JoinHandle<()>,
) -> Result<()> {
    session.shutdown().await?;
    printer.abort();
    Ok(())
}

async fn print_changes(mut snapshots: tokio::sync::watch::Receiver<DonationSnapshot>) {
    let mut last: Option<(TransactionState, String, bool)> = None;
    loop {
        let current = {
            let snapshot = snapshots.borrow_and_update();
            (
                snapshot.transaction,
                snapshot.view.button_label.clone(),
                snapshot.view.loading,
            )
        };
        if last.as_ref() != Some(&current) {
            let (state, label, loading) = &current;
            info!(%state, %label, loading, "donation form updated");
            last = Some(current);
        }
        if snapshots.changed().await.is_err() {
            break;
        }
    }
}
