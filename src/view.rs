//! Texts and flags rendered for the donation form.
//!
//! The submit button's label is decided by [`ButtonPrompt::decide`], an
//! ordered guard list: the first matching guard wins, so a wrong network
//! hides every other reason the button might be disabled.

use crate::amount::display_amount;
use crate::config::EstimateConfig;
use crate::interfaces::TokenId;
use crate::machine::{DonationInputs, DonationMachine, TransactionState};
use crate::messages::MessageCatalog;
use crate::tier::{estimate, HectareEstimate, Tier};

/// Facts the submit button label is derived from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ButtonContext {
    pub network_ok: bool,
    pub account_present: bool,
    pub already_donated: bool,
    pub insufficient_balance: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonPrompt {
    SwitchNetwork,
    ConnectWallet,
    ThanksForDonating,
    InsufficientBalance,
    Donate,
}

type Guard = (fn(&ButtonContext) -> bool, ButtonPrompt);

const BUTTON_GUARDS: [Guard; 4] = [
    (|ctx: &ButtonContext| !ctx.network_ok, ButtonPrompt::SwitchNetwork),
    (|ctx: &ButtonContext| !ctx.account_present, ButtonPrompt::ConnectWallet),
    (|ctx: &ButtonContext| ctx.already_donated, ButtonPrompt::ThanksForDonating),
    (|ctx: &ButtonContext| ctx.insufficient_balance, ButtonPrompt::InsufficientBalance),
];

impl ButtonPrompt {
    pub fn decide(ctx: &ButtonContext) -> ButtonPrompt {
        BUTTON_GUARDS
            .iter()
            .find(|(matches, _)| matches(ctx))
            .map(|(_, prompt)| *prompt)
            .unwrap_or(ButtonPrompt::Donate)
    }

    pub fn text(self, catalog: &MessageCatalog, network_name: &str) -> String {
        match self {
            ButtonPrompt::SwitchNetwork => {
                catalog.render("button.switch_network", [("network", network_name)])
            }
            ButtonPrompt::ConnectWallet => catalog.text("button.connect_wallet"),
            ButtonPrompt::ThanksForDonating => catalog.text("button.thanks"),
            ButtonPrompt::InsufficientBalance => catalog.text("button.insufficient_balance"),
            ButtonPrompt::Donate => catalog.text("button.donate"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadingPrompt {
    ConnectingWallet,
    SignTransaction,
}

impl LoadingPrompt {
    pub fn decide(account_present: bool) -> LoadingPrompt {
        if account_present {
            LoadingPrompt::SignTransaction
        } else {
            LoadingPrompt::ConnectingWallet
        }
    }

    pub fn text(self, catalog: &MessageCatalog) -> String {
        match self {
            LoadingPrompt::ConnectingWallet => catalog.text("loading.connecting"),
            LoadingPrompt::SignTransaction => catalog.text("loading.sign"),
        }
    }
}

/// Everything the presentation layer needs to draw the donation form.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DonationView {
    pub amount_text: String,
    pub tier: Option<Tier>,
    pub flavor_text: Option<String>,
    pub hectares: Option<HectareEstimate>,
    pub estimate_text: Option<String>,
    pub button_label: String,
    pub loading_label: String,
    pub loading: bool,
    pub submit_disabled: bool,
    /// Amount inputs are locked once the account has donated.
    pub inputs_locked: bool,
    /// Token shown on the thank-you card.
    pub thanks_token: Option<TokenId>,
    pub thanks_text: Option<String>,
}

pub struct ViewContext<'a> {
    pub catalog: &'a MessageCatalog,
    pub network_name: &'a str,
    pub pricing: &'a EstimateConfig,
}

impl DonationView {
    pub fn derive(
        machine: &DonationMachine,
        inputs: &DonationInputs,
        ctx: &ViewContext<'_>,
    ) -> DonationView {
        let already_donated = machine.already_donated(&inputs.ownership);
        let insufficient_balance = inputs.insufficient_balance();
        let button = ButtonPrompt::decide(&ButtonContext {
            network_ok: inputs.network_ok,
            account_present: inputs.account_present,
            already_donated,
            insufficient_balance,
        });
        let loading_prompt = LoadingPrompt::decide(inputs.account_present);
        let loading = machine.loading();

        let tier = inputs.amount.map(Tier::classify);
        let hectares = inputs
            .amount
            .map(|amount| estimate(amount, ctx.pricing));
        let thanks_token = if already_donated {
            machine
                .minted()
                .map(|minted| minted.token_id)
                .or(inputs.ownership.token_id)
        } else {
            None
        };

        DonationView {
            amount_text: display_amount(inputs.amount),
            tier,
            flavor_text: tier.map(|tier| ctx.catalog.text(tier.flavor_key())),
            hectares,
            estimate_text: hectares.map(|hectares| {
                ctx.catalog
                    .render("estimate.hectares", [("hectares", hectares.to_string())])
            }),
            button_label: button.text(ctx.catalog, ctx.network_name),
            loading_label: loading_prompt.text(ctx.catalog),
            loading,
            submit_disabled: !inputs.network_ok
                || already_donated
                || insufficient_balance
                || inputs.amount.is_none()
                || machine.state() != TransactionState::Idle,
            inputs_locked: already_donated,
            thanks_token,
            thanks_text: thanks_token.map(|token_id| {
                ctx.catalog
                    .render("thanks.minted", [("token_id", token_id.to_string())])
            }),
        }
    }
}
