//! Layer-1 collaborators and the commit/decommit workflow.

use async_trait::async_trait;
use hydra_core::{HydraError, Result, Transaction, Utxo, UtxoRecord, UtxoRef};
use serde_json::{Map, Value as Json};
use tracing::info;

use crate::client::HeadClient;

/// Source of UTxOs, typically a layer-1 chain indexer.
#[async_trait]
pub trait UtxoFetcher: Send + Sync {
    /// UTxOs created by `tx_id`, optionally only the one at `index`.
    async fn fetch_utxos(&self, tx_id: &str, index: Option<u32>) -> Result<Vec<Utxo>>;
}

/// Sink for signed transactions.
#[async_trait]
pub trait TxSubmitter: Send + Sync {
    /// Submit `cbor_hex` and return the transaction id.
    async fn submit_tx(&self, cbor_hex: &str) -> Result<String>;
}

#[async_trait]
impl UtxoFetcher for HeadClient {
    async fn fetch_utxos(&self, tx_id: &str, index: Option<u32>) -> Result<Vec<Utxo>> {
        HeadClient::fetch_utxos(self, Some(tx_id), index).await
    }
}

#[async_trait]
impl TxSubmitter for HeadClient {
    async fn submit_tx(&self, cbor_hex: &str) -> Result<String> {
        HeadClient::submit_tx(self, cbor_hex).await
    }
}

/// A head client paired with a layer-1 fetcher.
pub struct HeadInstance<F> {
    client: HeadClient,
    fetcher: F,
}

impl<F: UtxoFetcher> HeadInstance<F> {
    pub fn new(client: HeadClient, fetcher: F) -> Self {
        Self { client, fetcher }
    }

    pub fn client(&self) -> &HeadClient {
        &self.client
    }

    /// Draft a commit of the layer-1 UTxO at `tx_id#index`.
    ///
    /// Returns the draft transaction's CBOR hex, ready for signing.
    pub async fn commit_funds(&self, tx_id: &str, index: u32) -> Result<String> {
        let utxo = self.layer_one_utxo(tx_id, index).await?;
        let payload = Json::Object(commit_entry(&utxo)?);
        let draft = self.client.build_commit(&payload).await?;
        info!(reference = %UtxoRef::from(utxo.input), "Commit drafted");
        draft_cbor(&draft)
    }

    /// Draft a commit that spends `tx_id#index` through a blueprint transaction.
    pub async fn commit_blueprint(
        &self,
        tx_id: &str,
        index: u32,
        blueprint: Transaction,
    ) -> Result<String> {
        let utxo = self.layer_one_utxo(tx_id, index).await?;
        let mut payload = Map::new();
        payload.insert("blueprintTx".to_string(), serde_json::to_value(&blueprint)?);
        payload.insert("utxo".to_string(), Json::Object(commit_entry(&utxo)?));
        let draft = self.client.build_commit(&Json::Object(payload)).await?;
        draft_cbor(&draft)
    }

    /// Request a decommit over HTTP.
    pub async fn decommit(&self, transaction: &Transaction) -> Result<Json> {
        self.client
            .publish_decommit(&serde_json::to_value(transaction)?)
            .await
    }

    async fn layer_one_utxo(&self, tx_id: &str, index: u32) -> Result<Utxo> {
        let reference = UtxoRef::new(tx_id.parse()?, index);
        self.fetcher
            .fetch_utxos(tx_id, Some(index))
            .await?
            .into_iter()
            .find(|utxo| UtxoRef::from(utxo.input) == reference)
            .ok_or_else(|| HydraError::UtxoNotFound {
                reference: reference.to_string(),
            })
    }
}

/// `{ "txHash#index": <wire utxo> }`
fn commit_entry(utxo: &Utxo) -> Result<Map<String, Json>> {
    let (reference, record) = UtxoRecord::from_ledger(utxo)?;
    let mut entry = Map::new();
    entry.insert(reference.to_string(), serde_json::to_value(record.to_wire()?)?);
    Ok(entry)
}

fn draft_cbor(draft: &Json) -> Result<String> {
    draft
        .get("cborHex")
        .and_then(Json::as_str)
        .map(str::to_string)
        .ok_or_else(|| HydraError::decode("commit response", "missing cborHex"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::routing::post;
    use axum::{extract::State, Json as AxumJson, Router};
    use hydra_core::{TransactionId, TransactionInput, TransactionOutput, TxType, Value};
    use serde_json::json;
    use tokio::net::TcpListener;

    use crate::config::ClientConfig;

    const ADDRESS: &str = "addr_test1vz3ppzmmzuz0nlsjeyrqjm4pvdxl3cyfe8x06eg6htj2gwgv02qjt";

    struct FixedFetcher(Vec<Utxo>);

    #[async_trait]
    impl UtxoFetcher for FixedFetcher {
        async fn fetch_utxos(&self, _tx_id: &str, _index: Option<u32>) -> Result<Vec<Utxo>> {
            Ok(self.0.clone())
        }
    }

    fn layer_one_utxo() -> Utxo {
        Utxo {
            input: TransactionInput {
                transaction_id: TransactionId::new([0xab; 32]),
                index: 1,
            },
            output: TransactionOutput {
                address: ADDRESS.to_string(),
                amount: Value::lovelace(50_000_000),
                datum: None,
                script_ref: None,
            },
        }
    }

    /// Serves `/commit` and `/decommit`, recording the bodies it receives.
    async fn recording_node() -> (HeadClient, Arc<Mutex<Vec<Json>>>) {
        let bodies: Arc<Mutex<Vec<Json>>> = Arc::default();
        let record = |State(bodies): State<Arc<Mutex<Vec<Json>>>>, AxumJson(body): AxumJson<Json>| async move {
            bodies.lock().unwrap().push(body);
            AxumJson(json!({ "cborHex": "84a4", "type": "Tx ConwayEra", "description": "" }))
        };
        let router = Router::new()
            .route("/commit", post(record))
            .route("/decommit", post(record))
            .with_state(bodies.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        let client = HeadClient::new(ClientConfig::new(format!("http://{addr}"))).unwrap();
        (client, bodies)
    }

    #[tokio::test]
    async fn test_commit_funds_posts_wire_utxo() {
        let (client, bodies) = recording_node().await;
        let instance = HeadInstance::new(client, FixedFetcher(vec![layer_one_utxo()]));

        let tx_id = "ab".repeat(32);
        let draft = instance.commit_funds(&tx_id, 1).await.unwrap();
        assert_eq!(draft, "84a4");

        let bodies = bodies.lock().unwrap();
        let entry = &bodies[0][format!("{tx_id}#1")];
        assert_eq!(entry["address"], ADDRESS);
        assert_eq!(entry["value"], json!({ "lovelace": 50_000_000 }));
        assert_eq!(entry["inlineDatum"], Json::Null);
        assert_eq!(entry["referenceScript"], Json::Null);
    }

    #[tokio::test]
    async fn test_commit_blueprint_payload() {
        let (client, bodies) = recording_node().await;
        let instance = HeadInstance::new(client, FixedFetcher(vec![layer_one_utxo()]));

        let blueprint = Transaction::new(TxType::Unwitnessed, "84a0").with_description("blueprint");
        let tx_id = "ab".repeat(32);
        instance.commit_blueprint(&tx_id, 1, blueprint).await.unwrap();

        let bodies = bodies.lock().unwrap();
        assert_eq!(bodies[0]["blueprintTx"]["type"], "Unwitnessed Tx ConwayEra");
        assert_eq!(bodies[0]["blueprintTx"]["cborHex"], "84a0");
        assert!(bodies[0]["utxo"].get(format!("{tx_id}#1")).is_some());
    }

    #[tokio::test]
    async fn test_missing_utxo() {
        let (client, bodies) = recording_node().await;
        let instance = HeadInstance::new(client, FixedFetcher(vec![]));

        let err = instance.commit_funds(&"ab".repeat(32), 1).await.unwrap_err();
        assert!(matches!(err, HydraError::UtxoNotFound { .. }));

        // A UTxO at another index does not count.
        let instance = HeadInstance::new(instance.client().clone(), FixedFetcher(vec![layer_one_utxo()]));
        assert!(instance.commit_funds(&"ab".repeat(32), 0).await.is_err());
        assert!(bodies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decommit_posts_transaction() {
        let (client, bodies) = recording_node().await;
        let instance = HeadInstance::new(client, FixedFetcher(vec![]));

        let tx = Transaction::new(TxType::Tx, "84a1");
        let response = instance.decommit(&tx).await.unwrap();
        assert_eq!(response["cborHex"], "84a4");
        assert_eq!(bodies.lock().unwrap()[0]["cborHex"], "84a1");
    }
}
