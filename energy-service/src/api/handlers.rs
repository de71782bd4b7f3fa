use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio_util::sync::CancellationToken;

use super::{error::ApiError, AppState, AuthenticatedOwner};
use crate::aggregation::{Period, SeriesPoint};

const DEFAULT_FILE_NAME: &str = "upload.csv";

#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub period: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SeriesRow {
    Named { name: String, consumption: f64 },
    Hourly { hour: String, consumption: f64 },
}

impl SeriesRow {
    fn new(period: Period, point: SeriesPoint) -> Self {
        match period {
            Period::Monthly | Period::Daily => SeriesRow::Named {
                name: point.label,
                consumption: point.value,
            },
            Period::Hourly => SeriesRow::Hourly {
                hour: point.label,
                consumption: point.value,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PeakBody {
    pub value: f64,
    pub timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatisticsBody {
    pub total_consumption: f64,
    pub average_daily: f64,
    pub peak_consumption: PeakBody,
    pub estimated_cost: f64,
}

#[derive(Debug, Serialize)]
pub struct UploadBody {
    pub id: i64,
    pub file: String,
    pub uploaded_at: String,
    pub processed: bool,
}

fn rfc3339(ts: OffsetDateTime) -> Result<String, ApiError> {
    ts.format(&Rfc3339)
        .map_err(|e| ApiError::Internal(format!("failed to format timestamp: {e}")))
}

pub async fn upload_csv(
    State(state): State<AppState>,
    AuthenticatedOwner(owner): AuthenticatedOwner,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<MessageBody>), ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or(DEFAULT_FILE_NAME).to_string();
        let bytes = field.bytes().await?;
        upload = Some((file_name, bytes));
    }
    let (file_name, bytes) = upload.ok_or_else(|| ApiError::BadRequest("missing file field".to_string()))?;

    // Parsing runs on its own task; the guard aborts it between rows if the
    // client goes away.
    let cancel = CancellationToken::new();
    let _abort_on_disconnect = cancel.clone().drop_guard();
    let pipeline = state.ingest.clone();
    let outcome = tokio::spawn(async move { pipeline.ingest_upload(&owner, &file_name, bytes.to_vec(), &cancel).await })
        .await
        .map_err(|e| ApiError::Internal(format!("ingest task failed: {e}")))??;

    Ok((
        StatusCode::CREATED,
        Json(MessageBody {
            message: format!("Successfully processed {} records", outcome.records),
        }),
    ))
}

pub async fn energy_data(
    State(state): State<AppState>,
    AuthenticatedOwner(owner): AuthenticatedOwner,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<Vec<SeriesRow>>, ApiError> {
    let period = match query.period.as_deref() {
        Some(p) => p.parse::<Period>()?,
        None => Period::default(),
    };

    let points = state.aggregation.aggregate_period(&owner, period).await?;
    Ok(Json(points.into_iter().map(|p| SeriesRow::new(period, p)).collect()))
}

pub async fn statistics(
    State(state): State<AppState>,
    AuthenticatedOwner(owner): AuthenticatedOwner,
) -> Result<Json<StatisticsBody>, ApiError> {
    let stats = state.statistics.statistics(&owner).await?;

    Ok(Json(StatisticsBody {
        total_consumption: stats.total_consumption,
        average_daily: stats.average_daily,
        peak_consumption: PeakBody {
            value: stats.peak.value,
            timestamp: stats.peak.timestamp.map(rfc3339).transpose()?,
        },
        estimated_cost: stats.estimated_cost,
    }))
}

pub async fn uploads(
    State(state): State<AppState>,
    AuthenticatedOwner(owner): AuthenticatedOwner,
) -> Result<Json<Vec<UploadBody>>, ApiError> {
    let batches = state.store.batches_for_owner(&owner).await?;

    let body = batches
        .into_iter()
        .map(|b| {
            Ok(UploadBody {
                id: b.id,
                file: b.payload,
                uploaded_at: rfc3339(b.submitted_at)?,
                processed: b.processed,
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    Ok(Json(body))
}
