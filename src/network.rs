use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric chain identifier reported by the wallet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Checks whether the wallet is connected to the chain the contract lives on.
#[derive(Clone, Debug)]
pub struct NetworkGuard {
    expected: ChainId,
}

impl NetworkGuard {
    pub fn new(expected: ChainId) -> Self {
        Self { expected }
    }

    pub fn expected(&self) -> ChainId {
        self.expected
    }

    /// An unknown chain never matches.
    pub fn check(&self, current: Option<ChainId>) -> bool {
        current == Some(self.expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_expected_chain_matches() {
        let guard = NetworkGuard::new(ChainId(4));
        assert!(guard.check(Some(ChainId(4))));
        assert!(!guard.check(Some(ChainId(1))));
        assert!(!guard.check(None));
    }
}
