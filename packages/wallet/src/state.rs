//! Wallet connection state and its reducer.

use std::{fmt, str::FromStr, sync::Arc};

use serde_json::Value;

use crate::{
    error::WalletError,
    provider::{Eip1193Provider, Signer, Web3Provider},
};

/// Everything the session knows about the connected wallet.
///
/// `provider` is only ever set together with `address`; the default value is
/// the disconnected state.
#[derive(Clone, Default)]
pub struct WalletState {
    pub address: Option<String>,
    /// Balance in wei.
    pub balance: Option<u128>,
    pub chain_id: Option<u64>,
    pub provider: Option<Arc<dyn Eip1193Provider>>,
    pub web3_provider: Option<Web3Provider>,
    pub signer: Option<Signer>,
}

impl WalletState {
    pub fn is_connected(&self) -> bool {
        self.provider.is_some()
    }

    pub(crate) fn same_provider(&self, other: &WalletState) -> bool {
        match (&self.provider, &other.provider) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl PartialEq for WalletState {
    /// Handles compare by identity of the underlying provider.
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
            && self.balance == other.balance
            && self.chain_id == other.chain_id
            && self.same_provider(other)
            && self.web3_provider.is_some() == other.web3_provider.is_some()
            && self.signer.is_some() == other.signer.is_some()
    }
}

impl fmt::Debug for WalletState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletState")
            .field("address", &self.address)
            .field("balance", &self.balance)
            .field("chain_id", &self.chain_id)
            .field("provider", &self.provider.is_some())
            .field("web3_provider", &self.web3_provider.is_some())
            .field("signer", &self.signer.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    SetProvider,
    SetBalance,
    SetAddress,
    ResetProvider,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::SetProvider => "SET_PROVIDER",
            ActionType::SetBalance => "SET_BALANCE",
            ActionType::SetAddress => "SET_ADDRESS",
            ActionType::ResetProvider => "RESET_PROVIDER",
        }
    }
}

impl FromStr for ActionType {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SET_PROVIDER" => Ok(ActionType::SetProvider),
            "SET_BALANCE" => Ok(ActionType::SetBalance),
            "SET_ADDRESS" => Ok(ActionType::SetAddress),
            "RESET_PROVIDER" => Ok(ActionType::ResetProvider),
            other => Err(WalletError::UnhandledAction(other.to_string())),
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub enum WalletAction {
    SetProvider {
        provider: Arc<dyn Eip1193Provider>,
        web3_provider: Web3Provider,
        signer: Signer,
        address: String,
        balance: u128,
        chain_id: u64,
    },
    SetBalance {
        balance: u128,
    },
    SetAddress {
        address: String,
        balance: u128,
    },
    ResetProvider,
}

impl WalletAction {
    pub fn action_type(&self) -> ActionType {
        match self {
            WalletAction::SetProvider { .. } => ActionType::SetProvider,
            WalletAction::SetBalance { .. } => ActionType::SetBalance,
            WalletAction::SetAddress { .. } => ActionType::SetAddress,
            WalletAction::ResetProvider => ActionType::ResetProvider,
        }
    }

    /// Parse a `{"type": ..., ...}` message. Balances are decimal wei strings.
    ///
    /// `SET_PROVIDER` carries live handles and cannot arrive as a message.
    pub fn from_message(message: &Value) -> Result<Self, WalletError> {
        let name = message
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| WalletError::MalformedAction("missing \"type\"".into()))?;

        match name.parse::<ActionType>()? {
            ActionType::SetProvider => Err(WalletError::MalformedAction(
                "SET_PROVIDER requires a connected provider".into(),
            )),
            ActionType::SetBalance => Ok(WalletAction::SetBalance {
                balance: balance_field(message)?,
            }),
            ActionType::SetAddress => {
                let address = message
                    .get("address")
                    .and_then(Value::as_str)
                    .ok_or_else(|| WalletError::MalformedAction("missing \"address\"".into()))?;
                Ok(WalletAction::SetAddress {
                    address: address.to_string(),
                    balance: balance_field(message)?,
                })
            }
            ActionType::ResetProvider => Ok(WalletAction::ResetProvider),
        }
    }
}

impl fmt::Debug for WalletAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletAction::SetProvider {
                address,
                balance,
                chain_id,
                ..
            } => f
                .debug_struct("SetProvider")
                .field("address", address)
                .field("balance", balance)
                .field("chain_id", chain_id)
                .finish_non_exhaustive(),
            WalletAction::SetBalance { balance } => {
                f.debug_struct("SetBalance").field("balance", balance).finish()
            }
            WalletAction::SetAddress { address, balance } => f
                .debug_struct("SetAddress")
                .field("address", address)
                .field("balance", balance)
                .finish(),
            WalletAction::ResetProvider => f.write_str("ResetProvider"),
        }
    }
}

fn balance_field(message: &Value) -> Result<u128, WalletError> {
    match message.get("balance") {
        Some(Value::String(s)) => s
            .parse()
            .map_err(|_| WalletError::MalformedAction(format!("invalid balance {:?}", s))),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| WalletError::MalformedAction(format!("invalid balance {}", n))),
        _ => Err(WalletError::MalformedAction("missing \"balance\"".into())),
    }
}

pub fn reduce(state: &WalletState, action: WalletAction) -> WalletState {
    match action {
        WalletAction::SetProvider {
            provider,
            web3_provider,
            signer,
            address,
            balance,
            chain_id,
        } => WalletState {
            address: Some(address),
            balance: Some(balance),
            chain_id: Some(chain_id),
            provider: Some(provider),
            web3_provider: Some(web3_provider),
            signer: Some(signer),
        },
        WalletAction::SetBalance { balance } => WalletState {
            balance: Some(balance),
            ..state.clone()
        },
        WalletAction::SetAddress { address, balance } => WalletState {
            address: Some(address),
            balance: Some(balance),
            ..state.clone()
        },
        WalletAction::ResetProvider => WalletState::default(),
    }
}
