//! Client-side workflow for the Rewilder donation campaign.
//!
//! A donor picks an amount, the amount is validated and classified into a
//! tier, and the campaign contract's `donate` method is invoked through the
//! connected wallet. The transaction is followed until it is mined, and the
//! donor is redirected to the page of the minted NFT once it succeeds.
//!
//! [`session::DonationSession`] owns the workflow and is the usual entry
//! point. It is built from a [`config::DonationConfig`], a
//! [`messages::MessageCatalog`] and the collaborators in
//! [`session::SessionPorts`]. The pure building blocks live in `amount`,
//! `tier`, `network`, `ownership`, `machine`, `view` and `redirect`, and
//! [`devnet`] offers in-memory collaborators for simulations and tests.

pub mod amount;
pub mod config;
pub mod devnet;
pub mod errors;
pub mod interfaces;
pub mod machine;
pub mod messages;
pub mod network;
pub mod ownership;
pub mod redirect;
pub mod session;
pub mod tier;
pub mod view;
