use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use pricing_core::{FeatureRecord, PricePrediction};

use crate::{pricing_err, AppError, AppState};

// ─── Router ─────────────────────────────────────────────────────────────────

pub fn pricing_routes() -> Router<AppState> {
    Router::new().route("/predict", post(predict))
}

// ─── Handlers ───────────────────────────────────────────────────────────────

/// Suggest a price and confidence score for one product.
///
/// Recognized fields that are absent or not numeric are imputed; unknown
/// fields are ignored.
#[utoipa::path(
    post,
    path = "/predict",
    request_body(
        content = HashMap<String, f64>,
        description = "Flat map of pricing features, e.g. {\"cost\": 5.0, \"priceFactors.stockLevel\": 40}",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Suggested price and confidence score", body = PricePrediction),
        (status = 400, description = "Body is not valid JSON"),
        (status = 415, description = "Missing JSON content type"),
        (status = 422, description = "Body is not a JSON object"),
        (status = 500, description = "Inference failed")
    ),
    tag = "Pricing"
)]
pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<FeatureRecord>, JsonRejection>,
) -> Result<Json<PricePrediction>, AppError> {
    let Json(record) = payload.map_err(|rejection| {
        AppError::with_status(rejection.status(), anyhow::anyhow!(rejection.body_text()))
    })?;

    let missing = record.missing_count();
    let prediction = state
        .suggester
        .suggest(record)
        .await
        .map_err(|e| pricing_err("Price prediction failed", e))?;

    tracing::info!(
        "Suggested price {:.2} (ml_score={:.3}, imputed {} fields)",
        prediction.suggested_price,
        prediction.ml_score,
        missing
    );

    Ok(Json(prediction))
}
