//! Per-session state: the session identifier and the session's transaction state.

use crate::transactions::LogSequenceNumber;

/// The transaction-ID value meaning "no transaction is in progress".
pub const NO_TRANSACTION_ID: i32 = -1;

/// The transaction state carried by each session.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionState {
    /// The active transaction's ID, or [`NO_TRANSACTION_ID`].
    pub transaction_id: i32,
    /// Whether the user started the transaction explicitly with `BEGIN`; implicit transactions
    /// auto-commit when their statement completes.
    pub user_started_txn: bool,
    /// The LSN of the most recent WAL record emitted by this transaction. Threading these
    /// through the records forms the per-transaction undo chain.
    pub last_lsn: Option<LogSequenceNumber>,
    /// Whether the transaction's `START_TXN` record has been written yet. The record is only
    /// emitted when the transaction first modifies a page, so read-only transactions log
    /// nothing.
    pub logged_txn_start: bool,
}

impl Default for TransactionState {
    fn default() -> Self {
        TransactionState {
            transaction_id: NO_TRANSACTION_ID,
            user_started_txn: false,
            last_lsn: None,
            logged_txn_start: false,
        }
    }
}

impl TransactionState {
    /// Whether a transaction is currently in progress.
    pub fn is_txn_in_progress(&self) -> bool {
        self.transaction_id != NO_TRANSACTION_ID
    }

    /// Resets the state to "no transaction".
    pub fn clear(&mut self) {
        *self = TransactionState::default();
    }
}

/// Per-session state. Each client session executes one command at a time against its own
/// state; the storage and transaction managers are shared.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    /// The session's identifier.
    pub session_id: u32,
    /// The session's transaction state.
    pub txn_state: TransactionState,
}

impl SessionState {
    /// Creates the state for a new session.
    pub fn new(session_id: u32) -> SessionState {
        SessionState {
            session_id,
            txn_state: TransactionState::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = TransactionState::default();
        assert!(!state.is_txn_in_progress());
        assert_eq!(state.transaction_id, NO_TRANSACTION_ID);
        assert!(state.last_lsn.is_none());
        assert!(!state.logged_txn_start);
    }

    #[test]
    fn test_clear() {
        let mut state = TransactionState {
            transaction_id: 42,
            user_started_txn: true,
            last_lsn: Some(LogSequenceNumber::new(0, 100)),
            logged_txn_start: true,
        };
        assert!(state.is_txn_in_progress());
        state.clear();
        assert_eq!(state, TransactionState::default());
    }
}
