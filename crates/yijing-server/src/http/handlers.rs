use super::AppState;
use crate::{
    Error, Result,
    interpret::{InterpretRequest, Interpretation},
    service::{Generated, JobResult, ServiceStats},
    sink::DivinationRecord,
    store::JobId,
};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use yijing::{Line, Reading};

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub matter: String,
}

/// Lines arrive as raw tokens so an unknown token is reported by name.
#[derive(Debug, Deserialize)]
pub struct InterpretBody {
    pub matter: String,
    pub hexagram: String,
    pub lines: Vec<String>,
}

impl TryFrom<InterpretBody> for InterpretRequest {
    type Error = Error;

    fn try_from(body: InterpretBody) -> Result<Self> {
        let lines = body
            .lines
            .iter()
            .map(|token| token.parse::<Line>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            matter: body.matter,
            hexagram: body.hexagram,
            lines: Reading::try_from(lines)?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: &'static str,
    #[serde(flatten)]
    pub stats: ServiceStats,
}

fn json_body<T>(payload: core::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| Error::InvalidRequest {
            reason: rejection.body_text(),
        })
}

pub async fn generate(
    State(state): State<AppState>,
    payload: core::result::Result<Json<GenerateBody>, JsonRejection>,
) -> Result<Json<Generated>> {
    let body = json_body(payload)?;
    Ok(Json(state.service.generate(body.matter)))
}

pub async fn result(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<JobResult>> {
    let id: JobId = raw_id
        .parse()
        .map_err(|_| Error::NotFound { id: raw_id.clone() })?;
    state.service.poll_result(&id).map(Json)
}

pub async fn interpret(
    State(state): State<AppState>,
    payload: core::result::Result<Json<InterpretBody>, JsonRejection>,
) -> Result<Json<Interpretation>> {
    let request = InterpretRequest::try_from(json_body(payload)?)?;
    Ok(Json(state.service.interpret_sync(request).await))
}

pub async fn history(State(state): State<AppState>) -> Result<Json<Vec<DivinationRecord>>> {
    state.service.history().await.map(Json)
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthBody>) {
    let serving = state.health.is_serving() && state.service.is_accepting();
    let (status, label) = if serving {
        (StatusCode::OK, "serving")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not serving")
    };
    (
        status,
        Json(HealthBody {
            status: label,
            stats: state.service.stats(),
        }),
    )
}
