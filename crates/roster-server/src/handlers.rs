use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use roster::record::opaque_string;
use roster::{DenyReason, Membership, PartitionKey, RecordStatus, UpsertRequest};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RecordsQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub name: Option<String>,
    #[serde(alias = "guild_id")]
    pub partition: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertBody {
    pub name: Option<String>,
    #[serde(default, alias = "guild_id")]
    pub partition: Option<PartitionKey>,
    #[serde(default, alias = "guild_name")]
    pub partition_name: Option<String>,
    #[serde(default, alias = "discordId", deserialize_with = "opaque_string")]
    pub external_id: Option<String>,
    #[serde(default, alias = "discordTag", deserialize_with = "opaque_string")]
    pub external_tag: Option<String>,
    pub status: Option<String>,
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub no_expiration: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchBody {
    pub name: Option<String>,
    #[serde(default, alias = "guild_id")]
    pub partition: Option<PartitionKey>,
    pub status: Option<String>,
    #[serde(default)]
    pub no_expiration: bool,
}

#[derive(Deserialize)]
pub struct DeleteBody {
    pub name: Option<String>,
    #[serde(default, alias = "guild_id")]
    pub partition: Option<PartitionKey>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipResponse {
    pub whitelisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    pub name: String,
    pub status: RecordStatus,
    pub expires_at: Option<i64>,
    pub partition: PartitionKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_tag: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertResponse {
    pub success: bool,
    pub created: bool,
    pub message: String,
    pub expires_at: Option<i64>,
    pub no_expiration: bool,
    pub partition: PartitionKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchResponse {
    pub success: bool,
    pub message: String,
    pub status: RecordStatus,
    pub expires_at: Option<i64>,
    pub no_expiration: bool,
    pub partition: PartitionKey,
}

#[derive(Serialize)]
pub struct SimpleResponse {
    pub success: bool,
    pub message: String,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "message": "roster is running",
        "backend": state.config.get_string("store.backend"),
    }))
}

pub async fn method_not_allowed() -> AppError {
    AppError::method_not_allowed()
}

pub async fn not_found() -> AppError {
    AppError::not_found("Not Found")
}

pub async fn get_records(
    State(state): State<Arc<AppState>>,
    query: Result<Query<RecordsQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(query) = query?;
    let partition = query.partition.as_deref().and_then(PartitionKey::parse);

    if query.kind.as_deref() == Some("all") {
        let partition = partition
            .ok_or_else(|| AppError::bad_request("missing required query parameter: partition"))?;
        let records = state.service.list_partition(&partition).await?;
        return Ok(Json(records).into_response());
    }

    let name = query
        .name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("missing required query parameter: name"))?;
    let partition = partition
        .ok_or_else(|| AppError::bad_request("missing required query parameter: partition"))?;
    let membership = state.service.query_membership(&partition, &name).await?;
    Ok(membership_response(membership))
}

pub async fn upsert_record(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UpsertBody>, JsonRejection>,
) -> Result<Json<UpsertResponse>, AppError> {
    let Json(body) = payload?;
    let name = required_name(body.name)?;
    let partition = required_partition(body.partition)?;
    let status = body.status.as_deref().map(parse_status).transpose()?;

    let upserted = state
        .service
        .upsert(UpsertRequest {
            partition: partition.clone(),
            name,
            partition_name: body.partition_name,
            external_id: body.external_id,
            external_tag: body.external_tag,
            status,
            expires_at: body.expires_at,
            no_expiration: body.no_expiration,
        })
        .await?;

    let record = upserted.record;
    let verb = if upserted.created { "added" } else { "updated" };
    Ok(Json(UpsertResponse {
        success: true,
        created: upserted.created,
        message: format!("{} {verb} in partition {partition}", record.name),
        expires_at: record.expires_at,
        no_expiration: record.expires_at.is_none(),
        partition,
        partition_name: record.partition_name,
    }))
}

pub async fn patch_record(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PatchBody>, JsonRejection>,
) -> Result<Json<PatchResponse>, AppError> {
    let Json(body) = payload?;
    let name = required_name(body.name)?;
    let partition = required_partition(body.partition)?;
    let status = body
        .status
        .ok_or_else(|| AppError::bad_request("missing required field: status"))?;
    let status = parse_status(&status)?;

    let record = state
        .service
        .patch_status(&partition, &name, status, body.no_expiration)
        .await?;

    Ok(Json(PatchResponse {
        success: true,
        message: format!("{} status updated to {status} in partition {partition}", record.name),
        status: record.status,
        expires_at: record.expires_at,
        no_expiration: record.expires_at.is_none(),
        partition,
    }))
}

pub async fn delete_record(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DeleteBody>, JsonRejection>,
) -> Result<Json<SimpleResponse>, AppError> {
    let Json(body) = payload?;
    let name = required_name(body.name)?;
    let partition = required_partition(body.partition)?;

    state.service.remove(&partition, &name).await?;
    Ok(Json(SimpleResponse {
        success: true,
        message: format!("{name} removed from partition {partition}"),
    }))
}

fn membership_response(membership: Membership) -> Response {
    let Some(record) = membership.record else {
        let body = json!({
            "whitelisted": false,
            "reason": DenyReason::NotFound,
            "name": membership.name,
            "partition": membership.partition,
        });
        return (StatusCode::NOT_FOUND, Json(body)).into_response();
    };

    Json(MembershipResponse {
        whitelisted: membership.verdict.whitelisted,
        reason: membership.verdict.reason,
        name: record.name,
        status: record.status,
        expires_at: record.expires_at,
        partition: membership.partition,
        partition_name: record.partition_name,
        external_id: record.external_id,
        external_tag: record.external_tag,
    })
    .into_response()
}

fn required_name(name: Option<String>) -> Result<String, AppError> {
    name.filter(|name| !name.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("missing required field: name"))
}

fn required_partition(partition: Option<PartitionKey>) -> Result<PartitionKey, AppError> {
    partition
        .filter(|partition| !partition.is_empty())
        .ok_or_else(|| AppError::bad_request("missing required field: partition"))
}

fn parse_status(status: &str) -> Result<RecordStatus, AppError> {
    status
        .parse::<RecordStatus>()
        .map_err(|err| AppError::bad_request(err.to_string()))
}
