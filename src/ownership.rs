//! On-chain ownership lookups backing the "already donated" check.
//!
//! The indexer may lag the chain, so a record is advisory: callers combine it
//! with the live transaction state instead of trusting either alone. Each
//! lookup is issued under a [`QueryTicket`]; results carrying a ticket that is
//! no longer current belong to a previous account and are dropped.

use std::sync::Arc;

use tracing::debug;

use crate::interfaces::{Account, OwnershipError, OwnershipQuery, TokenId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OwnershipRecord {
    pub count: u64,
    pub token_id: Option<TokenId>,
}

impl OwnershipRecord {
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when the account is known to hold a minted token.
    pub fn holds_token(&self) -> bool {
        matches!(self.token_id, Some(TokenId(id)) if id > 0)
    }
}

/// Correlates an ownership lookup with the account it was issued for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryTicket {
    pub account: Account,
    pub generation: u64,
}

pub struct OwnershipReconciler {
    query: Arc<dyn OwnershipQuery>,
    account: Option<Account>,
    generation: u64,
    record: OwnershipRecord,
}

impl OwnershipReconciler {
    pub fn new(query: Arc<dyn OwnershipQuery>) -> Self {
        Self {
            query,
            account: None,
            generation: 0,
            record: OwnershipRecord::empty(),
        }
    }

    pub fn record(&self) -> OwnershipRecord {
        self.record
    }

    pub fn query(&self) -> Arc<dyn OwnershipQuery> {
        Arc::clone(&self.query)
    }

    /// Switches to a new account, clearing the record. Returns the ticket to
    /// issue a lookup under, or `None` when no account is connected.
    pub fn track(&mut self, account: Option<Account>) -> Option<QueryTicket> {
        self.generation += 1;
        self.record = OwnershipRecord::empty();
        self.account = account;
        self.current_ticket()
    }

    /// Ticket for re-querying the current account without clearing the record.
    pub fn refresh(&mut self) -> Option<QueryTicket> {
        self.generation += 1;
        self.current_ticket()
    }

    /// Applies a lookup result. Returns false when the ticket is stale.
    pub fn accept(&mut self, ticket: &QueryTicket, record: OwnershipRecord) -> bool {
        if !self.is_current(ticket) {
            debug!(
                account = %ticket.account,
                generation = ticket.generation,
                "discarding stale ownership result"
            );
            return false;
        }
        self.record = record;
        true
    }

    pub fn is_current(&self, ticket: &QueryTicket) -> bool {
        ticket.generation == self.generation && self.account.as_ref() == Some(&ticket.account)
    }

    fn current_ticket(&self) -> Option<QueryTicket> {
        self.account.clone().map(|account| QueryTicket {
            account,
            generation: self.generation,
        })
    }
}

/// Reads the token count and, if positive, the first owned token id.
pub async fn reconcile(
    query: &dyn OwnershipQuery,
    account: Option<&Account>,
) -> Result<OwnershipRecord, OwnershipError> {
    let Some(account) = account else {
        return Ok(OwnershipRecord::empty());
    };
    let count = query.balance_of(account).await?;
    if count == 0 {
        return Ok(OwnershipRecord { count, token_id: None });
    }
    let token_id = query.token_of_owner_by_index(account, 0).await?;
    Ok(OwnershipRecord {
        count,
        token_id: Some(token_id),
    })
}
