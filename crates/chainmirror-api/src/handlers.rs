//! Route handlers. Write requests carry base64 values; reads of the mirror
//! never touch the ledger.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use chainmirror_core::{auth, Message, MirrorFilter, MirrorRecord, Pagination, ValueRecord};

use crate::error::ApiError;
use crate::state::ApiState;

const DEFAULT_PAGE_SIZE: u64 = 10;

/// Key/value body shared by the write, read and verify routes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub index: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    /// Base64 of the JSON-encoded [`Message`].
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyStatus {
    pub status: bool,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct AccountQuery {
    #[serde(default)]
    pub account: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    pub from: u64,
    pub size: Option<u64>,
    pub name: Option<String>,
    pub kid: Option<String>,
    pub content_name: Option<String>,
    /// Unix seconds; `0` means unbounded.
    #[serde(default)]
    pub start_time: i64,
    #[serde(default)]
    pub end_time: i64,
}

impl ListQuery {
    fn into_parts(self) -> (MirrorFilter, Pagination) {
        let bound = |t: i64| (t != 0).then_some(t);
        let filter = MirrorFilter {
            kid: self.kid,
            name: self.name,
            content_name: self.content_name,
            start_time: bound(self.start_time),
            end_time: bound(self.end_time),
        };
        (filter, Pagination::new(self.from, self.size.unwrap_or(DEFAULT_PAGE_SIZE)))
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub data: Vec<MirrorRecord>,
    pub count: u64,
}

fn validate_value(value: &str) -> Result<ValueRecord, ApiError> {
    if value.is_empty() {
        return Err(ApiError::bad_request("value cannot be empty"));
    }
    Ok(ValueRecord::from_base64(value)?)
}

pub async fn current_nonce(
    State(state): State<ApiState>,
    Query(q): Query<AccountQuery>,
) -> Result<Json<Value>, ApiError> {
    let nonce = state.contract.current_nonce(&q.account).await?;
    Ok(Json(json!({ "nonce": nonce })))
}

pub async fn total(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let total = state.contract.total().await?;
    Ok(Json(json!({ "total": total })))
}

pub async fn put_value(
    State(state): State<ApiState>,
    Json(kv): Json<KeyValue>,
) -> Result<Json<KeyValue>, ApiError> {
    validate_value(&kv.value)?;
    if kv.message.is_empty() {
        return Err(ApiError::bad_request("message cannot be empty"));
    }
    let msg = Message::from_base64_str(&kv.message)?;
    let sender = auth::verify(&msg, &[kv.value.as_str()])?;

    let kid = state.contract.put_value(&msg, &kv.value).await?;
    tracing::info!(%kid, %sender, nonce = msg.nonce, "trusted value submitted");
    Ok(Json(KeyValue {
        kid,
        ..Default::default()
    }))
}

pub async fn put_untrust_value(
    State(state): State<ApiState>,
    Json(kv): Json<KeyValue>,
) -> Result<Json<KeyValue>, ApiError> {
    validate_value(&kv.value)?;
    let kid = state.contract.put_untrust_value(&kv.value).await?;
    tracing::info!(%kid, "untrusted value submitted");
    Ok(Json(KeyValue {
        kid,
        ..Default::default()
    }))
}

pub async fn get_value(
    State(state): State<ApiState>,
    Query(arg): Query<KeyValue>,
) -> Result<Json<KeyValue>, ApiError> {
    if arg.index.is_empty() && arg.kid.is_empty() {
        return Err(ApiError::bad_request("must provide depository index or kid"));
    }
    Ok(Json(read_value(&state, arg).await?))
}

pub async fn verify_value(
    State(state): State<ApiState>,
    Json(arg): Json<KeyValue>,
) -> Result<Json<VerifyStatus>, ApiError> {
    if arg.index.is_empty() && arg.kid.is_empty() {
        return Err(ApiError::bad_request("must provide depository index or kid"));
    }
    let expected = arg.value.clone();
    let stored = read_value(&state, arg).await?;
    let status = if stored.value == expected {
        VerifyStatus { status: true, reason: "value match".into() }
    } else {
        VerifyStatus { status: false, reason: "value mismatch".into() }
    };
    Ok(Json(status))
}

/// Index takes precedence over kid when both are given.
async fn read_value(state: &ApiState, mut kv: KeyValue) -> Result<KeyValue, ApiError> {
    kv.value = if !kv.index.is_empty() {
        let index: u64 = kv
            .index
            .parse()
            .map_err(|_| ApiError::bad_request(format!("invalid index {:?}", kv.index)))?;
        state.contract.get_value_by_index(index).await?
    } else {
        state.contract.get_value_by_kid(&kv.kid).await?
    };
    kv.message.clear();
    Ok(kv)
}

pub async fn list_depositories(
    State(state): State<ApiState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    let (filter, page) = q.into_parts();
    let (data, count) = state.projector.list(&filter, &page).await?;
    Ok(Json(ListResponse { data, count }))
}

pub async fn get_depository(
    State(state): State<ApiState>,
    Path(kid): Path<String>,
) -> Result<Json<MirrorRecord>, ApiError> {
    state
        .projector
        .get(&MirrorFilter::by_kid(kid.as_str()))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("depository {kid} not found")))
}

pub async fn metadata(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.contract.metadata().await?))
}
