use std::time::Duration;

use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::api::{WORK_DATA_LEN, Work, WorkSource};

/// Typed failures from the getwork node.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// HTTP 401: credentials missing or wrong. Never retried.
    #[error("node rejected RPC credentials (http 401)")]
    Unauthorized,
    /// The node answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },
    /// Neither `result` nor `error` was present.
    #[error("rpc response has no result")]
    MissingResult,
    /// A hex field did not decode to the expected length.
    #[error("invalid hex in `{field}`")]
    Hex {
        /// Response field name.
        field: &'static str,
        /// Decoder error.
        #[source]
        source: hex::FromHexError,
    },
}

impl BackendError {
    /// Whether retrying the same request cannot help.
    pub fn is_permanent(&self) -> bool {
        matches!(self, BackendError::Unauthorized)
    }
}

const FETCH_ID: u64 = 0;
const SUBMIT_ID: u64 = 1;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    method: &'static str,
    params: &'a [String],
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
struct RpcResponse<T> {
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

// `midstate` and `hash1` are also sent by nodes; the evaluator recomputes the midstate itself.
#[derive(Debug, Deserialize)]
struct GetworkResult {
    data: String,
    target: String,
}

fn decode_hex<const N: usize>(field: &'static str, value: &str) -> Result<[u8; N], BackendError> {
    let mut out = [0u8; N];
    hex::decode_to_slice(value.trim(), &mut out)
        .map_err(|source| BackendError::Hex { field, source })?;
    Ok(out)
}

fn decode_work(result: GetworkResult) -> Result<Work, BackendError> {
    Ok(Work {
        data: decode_hex::<WORK_DATA_LEN>("data", &result.data)?,
        target: decode_hex::<32>("target", &result.target)?,
    })
}

fn decode_response<T: DeserializeOwned>(
    status: reqwest::StatusCode,
    body: &str,
) -> anyhow::Result<T> {
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(BackendError::Unauthorized.into());
    }
    // bitcoind reports RPC errors with http 500 and a JSON body; prefer the error object.
    let parsed = match serde_json::from_str::<RpcResponse<T>>(body) {
        Ok(parsed) => parsed,
        Err(err) => {
            if !status.is_success() {
                anyhow::bail!("http {status}: {body}");
            }
            return Err(anyhow::Error::new(err).context("decode rpc response"));
        }
    };
    if let Some(err) = parsed.error {
        return Err(BackendError::Rpc {
            code: err.code,
            message: err.message,
        }
        .into());
    }
    if !status.is_success() {
        anyhow::bail!("http {status}: {body}");
    }
    parsed
        .result
        .ok_or_else(|| BackendError::MissingResult.into())
}

/// JSON-RPC 1.0 `getwork` client.
#[derive(Debug, Clone)]
pub struct GetworkClient {
    http: reqwest::Client,
    url: Url,
    user: Option<String>,
    password: Option<String>,
}

impl GetworkClient {
    /// Client for `url` with optional basic-auth credentials.
    pub fn new(url: Url, user: Option<String>, password: Option<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            url,
            user,
            password,
        })
    }

    async fn call<T: DeserializeOwned>(&self, params: &[String], id: u64) -> anyhow::Result<T> {
        let mut req = self.http.post(self.url.clone()).json(&RpcRequest {
            method: "getwork",
            params,
            id,
        });
        if let Some(user) = &self.user {
            req = req.basic_auth(user, self.password.as_ref());
        }

        let res = req.send().await?;
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        decode_response(status, &body)
    }
}

impl WorkSource for GetworkClient {
    async fn fetch_work(&self) -> anyhow::Result<Work> {
        tracing::debug!(url = %self.url, "getwork fetch");
        let result: GetworkResult = self.call(&[], FETCH_ID).await?;
        Ok(decode_work(result)?)
    }

    async fn submit_work(&self, work: &Work) -> anyhow::Result<bool> {
        tracing::debug!(url = %self.url, "getwork submit");
        self.call(&[hex::encode(work.data)], SUBMIT_ID).await
    }
}
