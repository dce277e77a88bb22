use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    /// An action name with no reducer branch.
    #[error("Unhandled action type: {0}")]
    UnhandledAction(String),

    #[error("Malformed action: {0}")]
    MalformedAction(String),

    #[error("wallet is not connected")]
    NotConnected,
}
