//! Wallet connection session for the Ethernauts dapp.
//!
//! [`WalletSession`] owns the connection state (address, balance, chain id and
//! the provider handles) behind a single reducer, and keeps it in sync with
//! the events the connected wallet emits.

pub mod connector;
pub mod error;
pub mod provider;
pub mod session;
pub mod state;
pub mod storage;

pub use connector::{HttpConnector, WalletConnector, CACHED_PROVIDER_KEY};
pub use error::WalletError;
pub use provider::{Eip1193Provider, HttpProvider, Network, ProviderEvent, Signer, Web3Provider};
pub use session::{WalletSession, WALLETCONNECT_STORAGE_KEY};
pub use state::{reduce, ActionType, WalletAction, WalletState};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
