// POST /moderate/text, /moderate/image, /moderate/batch: synchronous moderation.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::RequestOptions;
use crate::fingerprint::{Content, ContentType};
use crate::pipeline::{decode_image, parse_batch, BatchItem, ModerateOptions};
use crate::verdict::Verdict;
use crate::web::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
    #[serde(flatten)]
    pub options: RequestOptions,
}

#[derive(Debug, Deserialize)]
pub struct ImageRequest {
    /// Standard base64
    pub image: String,
    #[serde(flatten)]
    pub options: RequestOptions,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub items: Vec<BatchItem>,
    #[serde(flatten)]
    pub options: RequestOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationResponse {
    pub content_type: ContentType,
    pub fingerprint: String,
    pub result: Verdict,
}

/// One batch slot: either a result or the error for that item.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BatchEntry {
    Ok(ModerationResponse),
    Err { error: ErrorBody },
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub results: Vec<BatchEntry>,
}

pub async fn moderate_text(
    State(state): State<AppState>,
    Json(req): Json<TextRequest>,
) -> Result<Json<ModerationResponse>, ApiError> {
    let content = Content::Text(req.text);
    run(&state, content, req.options.into()).await.map(Json)
}

pub async fn moderate_image(
    State(state): State<AppState>,
    Json(req): Json<ImageRequest>,
) -> Result<Json<ModerationResponse>, ApiError> {
    let content = Content::Image(decode_image(&req.image)?);
    run(&state, content, req.options.into()).await.map(Json)
}

pub async fn moderate_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, ApiError> {
    let items = parse_batch(req.items)?;
    let fingerprints: Vec<String> = items.iter().map(|c| c.fingerprint().to_hex()).collect();
    let options: ModerateOptions = req.options.into();

    let outcomes = state.moderator.moderate_batch(items, &options).await?;

    let results = outcomes
        .into_iter()
        .zip(fingerprints)
        .map(|(outcome, fingerprint)| match outcome {
            Ok(result) => BatchEntry::Ok(ModerationResponse {
                content_type: result.content_type(),
                fingerprint,
                result,
            }),
            Err(e) => BatchEntry::Err {
                error: ErrorBody {
                    code: e.code().to_string(),
                    message: e.to_string(),
                },
            },
        })
        .collect();

    Ok(Json(BatchResponse { results }))
}

async fn run(
    state: &AppState,
    content: Content,
    options: ModerateOptions,
) -> Result<ModerationResponse, ApiError> {
    let result = state.moderator.moderate(content.clone(), &options).await?;
    Ok(ModerationResponse {
        content_type: content.content_type(),
        fingerprint: content.fingerprint().to_hex(),
        result,
    })
}
