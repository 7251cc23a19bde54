//! Hydra Head client implementation.

use std::sync::Arc;

use hydra_core::utxo::decode_utxo_set;
use hydra_core::{
    ConnectionStatus, HeadCommand, HydraError, ProtocolMessage, ProtocolParameters, Result,
    Transaction, TransactionId, TxType, Utxo, WireUtxoSet,
};
use serde_json::Value as Json;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::connection::ConnectionManager;
use crate::events::{EventBus, SubscriptionId};
use crate::http::HttpChannel;

/// Client for one Hydra node.
///
/// Cloning is cheap; clones share the connection and event bus.
#[derive(Clone)]
pub struct HeadClient {
    config: ClientConfig,
    events: Arc<EventBus>,
    connection: Arc<ConnectionManager>,
    http: HttpChannel,
}

impl HeadClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let events = Arc::new(EventBus::new());
        let connection = Arc::new(ConnectionManager::new(&config, events.clone()));
        let http = HttpChannel::new(&config)?;
        Ok(Self {
            config,
            events,
            connection,
            http,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Open the message stream. A no-op while already connected.
    pub fn connect(&self) -> Result<()> {
        self.connection.connect()
    }

    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.status_watch()
    }

    /// Observe every inbound message, including unrecognized tags.
    pub fn on_message<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ProtocolMessage) + Send + Sync + 'static,
    {
        self.events.messages.subscribe(callback)
    }

    /// Observe only the message kinds this client models.
    pub fn on_protocol_message<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ProtocolMessage) + Send + Sync + 'static,
    {
        self.events.messages.subscribe(move |message: &ProtocolMessage| {
            if message.is_recognized() {
                callback(message);
            }
        })
    }

    pub fn on_status_change<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        self.events.status.subscribe(callback)
    }

    /// Remove a subscription from whichever channel holds it.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.messages.unsubscribe(id) || self.events.status.unsubscribe(id)
    }

    // Lifecycle commands

    /// Initialize a new head.
    pub async fn init(&self) -> Result<()> {
        self.connection.send(&HeadCommand::Init).await
    }

    /// Abort a head before it opens.
    pub async fn abort(&self) -> Result<()> {
        self.connection.send(&HeadCommand::Abort).await
    }

    /// Close the head and start the contestation period.
    pub async fn close(&self) -> Result<()> {
        self.connection.send(&HeadCommand::Close).await
    }

    /// Contest a closed head with the latest local snapshot.
    pub async fn contest(&self) -> Result<()> {
        self.connection.send(&HeadCommand::Contest).await
    }

    /// Distribute the final head state to layer 1.
    pub async fn fanout(&self) -> Result<()> {
        self.connection.send(&HeadCommand::Fanout).await
    }

    /// Ask for the current UTxO set; the answer arrives as `GetUTxOResponse`.
    pub async fn get_utxo(&self) -> Result<()> {
        self.connection.send(&HeadCommand::GetUtxo).await
    }

    // Transactions

    /// Relay a transaction without waiting for the verdict.
    pub async fn new_tx(&self, transaction: Transaction) -> Result<()> {
        self.connection
            .send(&HeadCommand::NewTx { transaction })
            .await
    }

    /// Submit a witnessed transaction and wait for the node's verdict.
    ///
    /// Resolves with the transaction id on `TxValid`. Two in-flight
    /// submissions of the same bytes cannot be told apart.
    pub async fn submit_tx(&self, cbor_hex: &str) -> Result<String> {
        let target = cbor_hex.to_string();
        let (message_id, verdict) = self.events.messages.once(move |message: &ProtocolMessage| {
            match message {
                ProtocolMessage::TxValid(valid) => valid.transaction.same_bytes(&target),
                ProtocolMessage::TxInvalid(invalid) => invalid.transaction.same_bytes(&target),
                _ => false,
            }
        });
        let (status_id, lost) = self.events.status.once(|status: &ConnectionStatus| {
            matches!(status, ConnectionStatus::Disconnected | ConnectionStatus::Idle)
        });
        let _guard = SubscriptionGuard {
            events: self.events.clone(),
            ids: [message_id, status_id],
        };

        self.new_tx(Transaction::new(TxType::Witnessed, cbor_hex))
            .await?;
        debug!(bytes = cbor_hex.len() / 2, "Awaiting transaction verdict");

        tokio::select! {
            message = verdict => match message {
                Ok(ProtocolMessage::TxValid(valid)) => {
                    let tx_id = valid
                        .tx_id()
                        .ok_or_else(|| HydraError::decode("TxValid", "missing transaction id"))?;
                    info!(tx_id, "Transaction accepted by head");
                    Ok(tx_id.to_string())
                }
                Ok(ProtocolMessage::TxInvalid(invalid)) => Err(HydraError::ProtocolValidation {
                    validation_error: invalid.validation_error,
                }),
                Ok(other) => Err(HydraError::Internal(format!(
                    "unexpected {} while awaiting a verdict",
                    other.tag()
                ))),
                Err(_) => Err(HydraError::ConnectionLost { status: self.status() }),
            },
            status = lost => Err(HydraError::ConnectionLost {
                status: status.unwrap_or_else(|_| self.status()),
            }),
        }
    }

    /// Request a decommit over the message stream.
    ///
    /// The outcome is only published as `Decommit*` messages.
    pub async fn decommit(&self, transaction: Transaction) -> Result<()> {
        self.connection
            .send(&HeadCommand::Decommit {
                decommit_tx: transaction,
            })
            .await
    }

    // HTTP endpoints

    /// Draft a commit transaction for layer 1.
    pub async fn build_commit(&self, payload: &Json) -> Result<Json> {
        self.build_commit_with_headers(payload, &[]).await
    }

    pub async fn build_commit_with_headers(
        &self,
        payload: &Json,
        headers: &[(&str, &str)],
    ) -> Result<Json> {
        self.http.post_with_headers("commit", payload, headers).await
    }

    /// Submit a decommit transaction over HTTP.
    pub async fn publish_decommit(&self, payload: &Json) -> Result<Json> {
        self.publish_decommit_with_headers(payload, &[]).await
    }

    pub async fn publish_decommit_with_headers(
        &self,
        payload: &Json,
        headers: &[(&str, &str)],
    ) -> Result<Json> {
        self.http.post_with_headers("decommit", payload, headers).await
    }

    /// Fetch and decode the confirmed snapshot UTxO set.
    pub async fn fetch_snapshot_utxos(&self) -> Result<Vec<Utxo>> {
        let body = self.http.get("snapshot/utxo").await?;
        let set: WireUtxoSet =
            serde_json::from_value(body).map_err(|e| HydraError::decode("snapshot/utxo", e))?;
        decode_utxo_set(&set)
    }

    /// Snapshot UTxOs, optionally filtered by transaction id and output index.
    pub async fn fetch_utxos(&self, tx_id: Option<&str>, index: Option<u32>) -> Result<Vec<Utxo>> {
        let tx_id = tx_id.map(str::parse::<TransactionId>).transpose()?;
        let utxos = self.fetch_snapshot_utxos().await?;
        Ok(utxos
            .into_iter()
            .filter(|utxo| tx_id.map_or(true, |id| utxo.input.transaction_id == id))
            .filter(|utxo| index.map_or(true, |index| utxo.input.index == index))
            .collect())
    }

    /// Snapshot UTxOs held at `address`.
    pub async fn fetch_address_utxos(&self, address: &str) -> Result<Vec<Utxo>> {
        let utxos = self.fetch_snapshot_utxos().await?;
        Ok(utxos
            .into_iter()
            .filter(|utxo| utxo.output.address == address)
            .collect())
    }

    pub async fn fetch_protocol_parameters(&self) -> Result<ProtocolParameters> {
        let body = self.http.get("protocol-parameters").await?;
        ProtocolParameters::from_node_json(&body)
    }
}

/// Removes the verdict subscriptions however `submit_tx` exits.
struct SubscriptionGuard {
    events: Arc<EventBus>,
    ids: [SubscriptionId; 2],
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        let [message_id, status_id] = self.ids;
        self.events.messages.unsubscribe(message_id);
        self.events.status.unsubscribe(status_id);
    }
}
