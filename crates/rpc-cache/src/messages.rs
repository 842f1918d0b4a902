//! Wire messages for the cache service, encoded via `rpc-core`'s
//! `Message` blanket impl (JSON over the length-prefixed frame).

use serde::{Deserialize, Serialize};

/// Shared result envelope: `0` is success, any other code names a
/// specific outcome (e.g. `1` for "key not found" on a read).
///
/// - Why: a cache miss or an expired key is an expected outcome, not a
///   transport failure — it belongs in the response body as application
///   state, not as an `RpcError`. Every cache operation's response embeds
///   (or aliases to) this type so callers check one field consistently.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResultCode {
    pub errcode: i32,
    pub errmsg: String,
}

impl ResultCode {
    pub fn ok() -> Self {
        Self { errcode: 0, errmsg: "Success".into() }
    }

    pub fn miss(errmsg: impl Into<String>) -> Self {
        Self { errcode: 1, errmsg: errmsg.into() }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SetRequest {
    pub key: String,
    pub value: String,
    /// Seconds until expiry; `0` means never expires.
    pub expire_seconds: u32,
}

pub type SetResponse = ResultCode;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GetRequest {
    pub key: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GetResponse {
    pub result: ResultCode,
    pub value: String,
    pub exists: bool,
    pub expire_time: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DeleteRequest {
    pub key: String,
}

pub type DeleteResponse = ResultCode;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExistsRequest {
    pub key: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExistsResponse {
    pub result: ResultCode,
    pub exists: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BatchGetRequest {
    pub keys: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BatchGetItem {
    pub key: String,
    pub value: String,
    pub exists: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BatchGetResponse {
    pub result: ResultCode,
    pub items: Vec<BatchGetItem>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct StatsRequest;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StatsResponse {
    pub result: ResultCode,
    pub total_keys: u64,
    pub memory_usage: i64,
    pub hit_count: i64,
    pub miss_count: i64,
    pub hit_rate: f64,
}
