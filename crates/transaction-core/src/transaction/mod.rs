//! SIP transaction model
//!
//! A transaction is a request plus its responses, correlated by
//! [`TransactionKey`]. It moves from [`TransactionState::Created`] to
//! [`TransactionState::Established`] on the first provisional response and to
//! [`TransactionState::Terminated`] on the final one. Nothing ever removes it but
//! the engine's expiration sweep.

pub mod key;
pub mod sip_transaction;
pub mod state;

pub use key::TransactionKey;
pub use sip_transaction::{SipTransaction, TransactionAttributes};
pub use state::{TransactionOutcome, TransactionState};
