//! JSON-RPC 2.0 client for an external signing gateway.
//!
//! The gateway holds the actors' keys and exposes four methods:
//!
//! | Method | Params | Result |
//! |---|---|---|
//! | `deploy_instantiate` | `{artifact, args, from}` | transaction hash |
//! | `deploy_sendTransaction` | `{to, method, args, from}` | transaction hash |
//! | `deploy_getReceipt` | `[hash]` | receipt or `null` while pending |
//! | `deploy_call` | `{to, method, args}` | encoded value |
//!
//! Values travel as `{"type": "address" | "uint" | "bool" | "string", "value": ...}`
//! with unsigned integers as decimal strings.

use std::cell::Cell;
use std::thread;
use std::time::{Duration, Instant};

use frax_deploy_protocol::{Address, Ledger, LedgerError, Receipt, Value};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value as Json};
use tracing::{debug, warn};

use crate::config::DeployConfig;
use crate::errors::DeployError;

/// JSON-RPC error code for execution reverted.
const REVERTED_CODE: i64 = 3;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcSettings {
    /// How long to wait for a receipt before giving up
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
}

impl From<&DeployConfig> for RpcSettings {
    fn from(config: &DeployConfig) -> Self {
        Self {
            confirmation_timeout: config.confirmation_timeout,
            poll_interval: config.poll_interval,
            request_timeout: config.request_timeout,
        }
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Json,
}

#[derive(Deserialize)]
struct RpcResponse {
    /// `None` when the field is absent, `Some(Json::Null)` for `"result": null`
    #[serde(default, deserialize_with = "present")]
    result: Option<Json>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Json>, D::Error>
where
    D: Deserializer<'de>,
{
    Json::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: String,
    block_number: u64,
    status: bool,
    #[serde(default)]
    contract_address: Option<String>,
    #[serde(default)]
    revert_reason: Option<String>,
}

impl RpcReceipt {
    fn into_receipt(self) -> Result<(Receipt, Option<String>), LedgerError> {
        if !self.status {
            return Err(LedgerError::Reverted {
                reason: self
                    .revert_reason
                    .unwrap_or_else(|| format!("transaction {} failed", self.transaction_hash)),
            });
        }
        Ok((
            Receipt {
                tx_hash: self.transaction_hash,
                block: self.block_number,
            },
            self.contract_address,
        ))
    }
}

pub struct RpcLedger {
    endpoint: String,
    agent: ureq::Agent,
    settings: RpcSettings,
    next_id: Cell<u64>,
}

impl RpcLedger {
    pub fn new(endpoint: impl Into<String>, settings: RpcSettings) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(settings.request_timeout)
            .timeout_connect(CONNECT_TIMEOUT.min(settings.request_timeout))
            .build();
        Self {
            endpoint: endpoint.into(),
            agent,
            settings,
            next_id: Cell::new(1),
        }
    }

    /// Client for the gateway configured in `DEPLOY_LEDGER_URL`.
    pub fn from_config(config: &DeployConfig) -> Result<Self, DeployError> {
        let endpoint = config.ledger_url.as_deref().ok_or_else(|| {
            DeployError::Config(
                "DEPLOY_LEDGER_URL is not set (use --simulate for a local chain)".to_string(),
            )
        })?;
        Ok(Self::new(endpoint, RpcSettings::from(config)))
    }

    fn request(&self, method: &str, params: Json) -> Result<Json, LedgerError> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let body = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        debug!(method, id, "rpc request");

        let response: RpcResponse = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json")
            .send_json(&body)
            .map_err(|e| LedgerError::Transport(format!("{} failed: {}", method, e)))?
            .into_json()
            .map_err(|e| LedgerError::Decode(format!("{} response: {}", method, e)))?;

        if let Some(error) = response.error {
            return Err(rpc_error(error));
        }
        response
            .result
            .ok_or_else(|| LedgerError::Decode(format!("{} response has no result", method)))
    }

    fn submit(&self, method: &str, params: Json) -> Result<(Receipt, Option<String>), LedgerError> {
        let hash = self.request(method, params)?;
        let hash = hash
            .as_str()
            .ok_or_else(|| LedgerError::Decode(format!("{} returned `{}` instead of a hash", method, hash)))?
            .to_string();
        self.wait_for_receipt(&hash)
    }

    /// Poll for the receipt of `hash` until it is mined or the bounded wait
    /// elapses.
    fn wait_for_receipt(&self, hash: &str) -> Result<(Receipt, Option<String>), LedgerError> {
        let started = Instant::now();
        loop {
            let result = self.request("deploy_getReceipt", json!([hash]))?;
            if !result.is_null() {
                let receipt: RpcReceipt = serde_json::from_value(result)
                    .map_err(|e| LedgerError::Decode(format!("receipt for {}: {}", hash, e)))?;
                return receipt.into_receipt();
            }
            let waited = started.elapsed();
            if waited >= self.settings.confirmation_timeout {
                warn!(tx_hash = hash, waited = ?waited, "transaction not confirmed");
                return Err(LedgerError::Timeout { waited });
            }
            thread::sleep(self.settings.poll_interval);
        }
    }
}

impl Ledger for RpcLedger {
    fn instantiate(
        &mut self,
        artifact: &str,
        args: &[Value],
        actor: &Address,
    ) -> Result<Address, LedgerError> {
        let params = json!({
            "artifact": artifact,
            "args": encode_values(args),
            "from": actor.as_str(),
        });
        let (receipt, created) = self.submit("deploy_instantiate", params)?;
        let created = created.ok_or_else(|| {
            LedgerError::Decode(format!("receipt {} has no contract address", receipt.tx_hash))
        })?;
        Address::parse(&created).map_err(|e| LedgerError::Decode(e.to_string()))
    }

    fn call(
        &mut self,
        target: &Address,
        method: &str,
        args: &[Value],
        actor: &Address,
    ) -> Result<Receipt, LedgerError> {
        let params = json!({
            "to": target.as_str(),
            "method": method,
            "args": encode_values(args),
            "from": actor.as_str(),
        });
        self.submit("deploy_sendTransaction", params)
            .map(|(receipt, _)| receipt)
    }

    fn read(&self, target: &Address, method: &str, args: &[Value]) -> Result<Value, LedgerError> {
        let params = json!({
            "to": target.as_str(),
            "method": method,
            "args": encode_values(args),
        });
        decode_value(&self.request("deploy_call", params)?)
    }
}

fn rpc_error(error: RpcErrorObject) -> LedgerError {
    if error.code == REVERTED_CODE {
        LedgerError::Reverted {
            reason: error.message,
        }
    } else {
        LedgerError::Transport(format!("gateway error {}: {}", error.code, error.message))
    }
}

fn encode_values(values: &[Value]) -> Json {
    Json::Array(values.iter().map(encode_value).collect())
}

pub fn encode_value(value: &Value) -> Json {
    match value {
        Value::Address(address) => json!({ "type": "address", "value": address.as_str() }),
        Value::Uint(amount) => json!({ "type": "uint", "value": amount.to_string() }),
        Value::Bool(flag) => json!({ "type": "bool", "value": flag }),
        Value::Text(text) => json!({ "type": "string", "value": text }),
    }
}

pub fn decode_value(json: &Json) -> Result<Value, LedgerError> {
    let malformed = || LedgerError::Decode(format!("unrecognised value `{}`", json));
    let kind = json.get("type").and_then(Json::as_str).ok_or_else(malformed)?;
    let value = json.get("value").ok_or_else(malformed)?;
    match kind {
        "address" => {
            let text = value.as_str().ok_or_else(malformed)?;
            Address::parse(text)
                .map(Value::Address)
                .map_err(|e| LedgerError::Decode(e.to_string()))
        }
        "uint" => value
            .as_str()
            .and_then(|text| text.parse::<u128>().ok())
            .map(Value::Uint)
            .ok_or_else(malformed),
        "bool" => value.as_bool().map(Value::Bool).ok_or_else(malformed),
        "string" => value
            .as_str()
            .map(|text| Value::Text(text.to_string()))
            .ok_or_else(malformed),
        _ => Err(malformed()),
    }
}
