use std::sync::{Arc, Mutex, Weak};

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};

use crate::{
    connector::WalletConnector,
    error::WalletError,
    provider::{Network, ProviderEvent, Web3Provider},
    state::{reduce, WalletAction, WalletState},
    storage::KeyValueStore,
};

/// Key under which WalletConnect keeps its pairing; removed on disconnect.
pub const WALLETCONNECT_STORAGE_KEY: &str = "walletconnect";

type ChainChangedHook = Arc<dyn Fn(&str) + Send + Sync>;

/// A connected (or connectable) wallet.
///
/// Cloning is cheap and every clone drives the same state.
#[derive(Clone)]
pub struct WalletSession {
    inner: Arc<Inner>,
}

struct Inner {
    connector: Arc<dyn WalletConnector>,
    store: Arc<dyn KeyValueStore>,
    state: watch::Sender<WalletState>,
    subscription: Mutex<Option<Subscription>>,
    on_chain_changed: ChainChangedHook,
}

impl WalletSession {
    pub fn new(connector: Arc<dyn WalletConnector>, store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_reload(connector, store, |chain_id| {
            tracing::info!(chain_id, "chain changed, reload required");
        })
    }

    /// Like [`WalletSession::new`], with a hook run when the wallet switches
    /// chains. State is not updated in place on a chain switch.
    pub fn with_reload(
        connector: Arc<dyn WalletConnector>,
        store: Arc<dyn KeyValueStore>,
        on_chain_changed: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        let (state, _) = watch::channel(WalletState::default());
        Self {
            inner: Arc::new(Inner {
                connector,
                store,
                state,
                subscription: Mutex::new(None),
                on_chain_changed: Arc::new(on_chain_changed),
            }),
        }
    }

    pub fn state(&self) -> WalletState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WalletState> {
        self.inner.state.subscribe()
    }

    /// The connected provider, for issuing calls on behalf of the user.
    pub fn web3_provider(&self) -> Result<Web3Provider, WalletError> {
        self.inner
            .state
            .borrow()
            .web3_provider
            .clone()
            .ok_or(WalletError::NotConnected)
    }

    /// Apply an action. Event wiring follows the provider it leaves behind.
    pub fn dispatch(&self, action: WalletAction) {
        let action_type = action.action_type();
        let mut provider_changed = false;
        self.inner.state.send_modify(|state| {
            let next = reduce(state, action);
            provider_changed = !next.same_provider(state);
            *state = next;
        });
        tracing::debug!(action = %action_type, "wallet action");

        if provider_changed {
            self.rewire();
        }
    }

    /// Apply an action received as a JSON message.
    pub fn dispatch_message(&self, message: &Value) -> Result<(), WalletError> {
        let action = WalletAction::from_message(message)?;
        self.dispatch(action);
        Ok(())
    }

    pub async fn connect(&self) -> Result<()> {
        let provider = self.inner.connector.connect().await?;
        let web3_provider = Web3Provider::new(provider.clone(), Network::Any);
        let signer = web3_provider.get_signer();
        let address = signer.get_address().await?;
        let balance = web3_provider.get_balance(&address).await?;
        let network = web3_provider.get_network().await?;

        tracing::info!(%address, chain_id = network.chain_id, "wallet connected");
        self.dispatch(WalletAction::SetProvider {
            provider,
            web3_provider,
            signer,
            address,
            balance,
            chain_id: network.chain_id,
        });
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<()> {
        let web3_provider = self.inner.state.borrow().web3_provider.clone();
        if let Some(web3_provider) = web3_provider {
            if web3_provider.is_closable() {
                web3_provider.close().await.context("failed to close provider")?;
            }
        }

        self.inner.connector.clear_cached_provider()?;
        self.inner.store.remove(WALLETCONNECT_STORAGE_KEY)?;
        self.dispatch(WalletAction::ResetProvider);
        Ok(())
    }

    /// Re-read the balance of the current address. Does nothing when disconnected.
    pub async fn refresh_balance(&self) -> Result<()> {
        let (web3_provider, address) = {
            let state = self.inner.state.borrow();
            match (&state.web3_provider, &state.address) {
                (Some(w), Some(a)) => (w.clone(), a.clone()),
                _ => return Ok(()),
            }
        };

        let balance = web3_provider.get_balance(&address).await?;
        self.dispatch(WalletAction::SetBalance { balance });
        Ok(())
    }

    /// Reconnect when a previous session left a cached provider marker.
    /// Returns whether a connection was made.
    pub async fn start(&self) -> Result<bool> {
        match self.inner.connector.cached_provider() {
            Some(cached) => {
                tracing::debug!(provider = %cached, "reconnecting cached provider");
                self.connect().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn rewire(&self) {
        let mut slot = self.inner.subscription.lock().unwrap();
        // Read under the slot lock so the listener matches the latest provider.
        let provider = self.inner.state.borrow().provider.clone();
        *slot = None;

        if let Some(events) = provider.and_then(|p| p.subscribe()) {
            *slot = Some(Subscription::spawn(Arc::downgrade(&self.inner), events));
        }
    }

    async fn handle_event(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(accounts) => {
                let Some(address) = accounts.into_iter().next() else {
                    tracing::info!("wallet exposes no accounts, disconnecting");
                    if let Err(e) = self.disconnect().await {
                        tracing::error!(error = %e, "disconnect failed");
                    }
                    return;
                };
                if let Err(e) = self.switch_account(address).await {
                    tracing::error!(error = %e, "failed to switch account");
                }
            }
            ProviderEvent::ChainChanged(chain_id) => {
                (self.inner.on_chain_changed)(&chain_id);
            }
            ProviderEvent::Disconnect(reason) => {
                tracing::info!(reason = reason.as_deref().unwrap_or(""), "wallet disconnected");
                if let Err(e) = self.disconnect().await {
                    tracing::error!(error = %e, "disconnect failed");
                }
            }
        }
    }

    async fn switch_account(&self, address: String) -> Result<()> {
        let web3_provider = self.web3_provider()?;
        let balance = web3_provider.get_balance(&address).await?;
        self.dispatch(WalletAction::SetAddress { address, balance });
        Ok(())
    }
}

/// Listener for one provider's events. Dropping it stops the listener.
struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    fn spawn(session: Weak<Inner>, mut events: broadcast::Receiver<ProviderEvent>) -> Self {
        let task = tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "provider events lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(inner) = session.upgrade() else {
                    break;
                };
                WalletSession { inner }.handle_event(event).await;
            }
        });
        Self { task }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
