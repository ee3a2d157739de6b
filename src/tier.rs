use std::fmt;

use serde::{Deserialize, Serialize};

use crate::amount::DonationAmount;
use crate::config::EstimateConfig;

/// Lower bound of the [`Tier::Araucaria`] bucket.
pub const ARAUCARIA_THRESHOLD: f64 = 33.0;
/// Lower bound of the [`Tier::Sequoia`] bucket.
pub const SEQUOIA_THRESHOLD: f64 = 66.0;

/// Positions of the slider marks, one per tier start.
pub const SLIDER_MARKS: [f64; 3] = [1.0, ARAUCARIA_THRESHOLD, SEQUOIA_THRESHOLD];

/// Display bucket of a donation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Cypress,
    Araucaria,
    Sequoia,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Cypress, Tier::Araucaria, Tier::Sequoia];

    pub fn classify(amount: DonationAmount) -> Tier {
        let value = amount.value();
        if value < ARAUCARIA_THRESHOLD {
            Tier::Cypress
        } else if value < SEQUOIA_THRESHOLD {
            Tier::Araucaria
        } else {
            Tier::Sequoia
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tier::Cypress => "Cypress",
            Tier::Araucaria => "Araucaria",
            Tier::Sequoia => "Sequoia",
        }
    }

    /// Key of the tier's narrative text in the message catalog.
    pub fn flavor_key(&self) -> &'static str {
        match self {
            Tier::Cypress => "tier.cypress.flavor",
            Tier::Araucaria => "tier.araucaria.flavor",
            Tier::Sequoia => "tier.sequoia.flavor",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Estimated hectares a donation helps to buy. Rounded only when displayed.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct HectareEstimate(pub f64);

impl fmt::Display for HectareEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

pub fn estimate(amount: DonationAmount, pricing: &EstimateConfig) -> HectareEstimate {
    HectareEstimate(amount.value() * pricing.price_per_unit / pricing.conversion_factor)
}
