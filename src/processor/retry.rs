//! Error classification for the write protocol
//!
//! A safelist over Postgres SQLSTATE codes decides whether a failed attempt
//! may be redelivered. Anything not on the list fails fast as non-retryable;
//! nothing here inspects error message text.

use tokio_postgres::error::SqlState;

/// SQLSTATE codes that indicate a transient infrastructure condition
const RETRYABLE_STATES: &[SqlState] = &[
    // Class 08: connection exceptions
    SqlState::CONNECTION_EXCEPTION,
    SqlState::CONNECTION_FAILURE,
    SqlState::CONNECTION_DOES_NOT_EXIST,
    SqlState::SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION,
    SqlState::SQLSERVER_REJECTED_ESTABLISHMENT_OF_SQLCONNECTION,
    // Class 57: operator intervention
    SqlState::ADMIN_SHUTDOWN,
    SqlState::CRASH_SHUTDOWN,
    SqlState::CANNOT_CONNECT_NOW,
    // Class 40: transaction rollback
    SqlState::T_R_SERIALIZATION_FAILURE,
    SqlState::T_R_DEADLOCK_DETECTED,
    // Class 53: insufficient resources
    SqlState::TOO_MANY_CONNECTIONS,
];

/// Whether a SQLSTATE code is on the retryable safelist
pub fn is_retryable_state(code: &SqlState) -> bool {
    RETRYABLE_STATES.contains(code)
}

/// Whether the attempt that raised this error may be redelivered.
///
/// Errors without an attached server error never carried SQL semantics
/// (socket closed mid-call, broken pipe) and are treated as transient.
pub fn is_retryable(err: &tokio_postgres::Error) -> bool {
    match err.code() {
        Some(code) => is_retryable_state(code),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_infrastructure_states_are_retryable() {
        assert!(is_retryable_state(&SqlState::CONNECTION_FAILURE));
        assert!(is_retryable_state(&SqlState::ADMIN_SHUTDOWN));
        assert!(is_retryable_state(&SqlState::CANNOT_CONNECT_NOW));
        assert!(is_retryable_state(&SqlState::T_R_SERIALIZATION_FAILURE));
        assert!(is_retryable_state(&SqlState::T_R_DEADLOCK_DETECTED));
        assert!(is_retryable_state(&SqlState::TOO_MANY_CONNECTIONS));
    }

    #[test]
    fn test_domain_violations_are_terminal() {
        assert!(!is_retryable_state(&SqlState::UNIQUE_VIOLATION));
        assert!(!is_retryable_state(&SqlState::FOREIGN_KEY_VIOLATION));
        assert!(!is_retryable_state(&SqlState::CHECK_VIOLATION));
        assert!(!is_retryable_state(&SqlState::NOT_NULL_VIOLATION));
    }

    #[test]
    fn test_unknown_states_fail_fast() {
        assert!(!is_retryable_state(&SqlState::SYNTAX_ERROR));
        assert!(!is_retryable_state(&SqlState::UNDEFINED_TABLE));
        assert!(!is_retryable_state(&SqlState::INSUFFICIENT_PRIVILEGE));
    }
}
