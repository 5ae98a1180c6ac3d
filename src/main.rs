//! Online-Store Back Office - Coupon Service

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use std::collections::HashSet;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use validator::Validate;

use commerce_backoffice::{
    Coupon, CouponEngine, CouponError, CouponScope, CouponType, CouponUsage, PgStore,
    RedemptionResult, UsageTicket,
};

#[derive(Clone)]
pub struct AppState {
    pub engine: CouponEngine,
    pub store: Arc<PgStore>,
    pub nats: Option<async_nats::Client>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&std::env::var("DATABASE_URL")?)
        .await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let nats = match std::env::var("NATS_URL") {
        Ok(url) => async_nats::connect(&url).await.ok(),
        Err(_) => None,
    };

    let store = Arc::new(PgStore::new(db));
    let engine = CouponEngine::new(store.clone(), store.clone(), store.clone(), store.clone());
    let state = AppState { engine, store, nats };

    let app = Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "commerce-backoffice"})) }))
        .route("/api/v1/coupons", get(list_coupons).post(create_coupon))
        .route("/api/v1/coupons/:id", get(get_coupon).delete(delete_coupon))
        .route("/api/v1/coupons/:id/usages", get(list_coupon_usages))
        .route("/api/v1/coupons/:id/activate", post(activate_coupon))
        .route("/api/v1/coupons/:id/deactivate", post(deactivate_coupon))
        .route("/api/v1/coupons/code/:code/validity", get(coupon_validity))
        .route("/api/v1/orders/:id/coupon", post(apply_coupon))
        .route("/api/v1/redemptions/:ticket", delete(release_redemption))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "8083".to_string());
    tracing::info!("commerce-backoffice listening on 0.0.0.0:{}", port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?, app).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

async fn list_coupons(
    State(s): State<AppState>,
    Query(p): Query<ListParams>,
) -> Result<Json<Vec<Coupon>>, CouponError> {
    let page = p.page.unwrap_or(1).max(1);
    let per_page = p.per_page.unwrap_or(20).min(100);
    Ok(Json(s.store.list_coupons(page, per_page).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCouponRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    pub kind: CouponType,
    pub value: Decimal,
    pub description: Option<String>,
    pub min_order_amount: Option<Decimal>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub usage_limit: Option<u32>,
    /// Missing field defaults to 1 redemption per user; explicit null means
    /// unlimited.
    #[serde(default = "default_per_user_limit")]
    pub usage_limit_per_user: Option<u32>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub applicable_product_ids: HashSet<Uuid>,
    #[serde(default)]
    pub applicable_category_ids: HashSet<Uuid>,
    #[serde(default)]
    pub excluded_product_ids: HashSet<Uuid>,
    #[serde(default)]
    pub excluded_category_ids: HashSet<Uuid>,
}

fn default_per_user_limit() -> Option<u32> {
    Some(1)
}

fn default_active() -> bool {
    true
}

async fn create_coupon(
    State(s): State<AppState>,
    Json(r): Json<CreateCouponRequest>,
) -> Result<(StatusCode, Json<Coupon>), (StatusCode, String)> {
    r.validate()
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    if r.starts_at >= r.ends_at {
        return Err((StatusCode::UNPROCESSABLE_ENTITY, "starts_at must precede ends_at".into()));
    }
    if r.value < Decimal::ZERO {
        return Err((StatusCode::UNPROCESSABLE_ENTITY, "value must not be negative".into()));
    }
    if r.kind == CouponType::Percent && r.value > Decimal::ONE_HUNDRED {
        return Err((StatusCode::UNPROCESSABLE_ENTITY, "percent value must be at most 100".into()));
    }

    let coupon = Coupon {
        id: Uuid::now_v7(),
        code: r.code,
        kind: r.kind,
        value: r.value,
        description: r.description,
        min_order_amount: r.min_order_amount,
        starts_at: r.starts_at,
        ends_at: r.ends_at,
        usage_limit: r.usage_limit,
        used_count: 0,
        usage_limit_per_user: r.usage_limit_per_user,
        active: r.active,
        scope: CouponScope {
            applicable_products: r.applicable_product_ids,
            applicable_categories: r.applicable_category_ids,
            excluded_products: r.excluded_product_ids,
            excluded_categories: r.excluded_category_ids,
        },
        created_at: Utc::now(),
    };
    s.store
        .create_coupon(&coupon)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

async fn get_coupon(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Coupon>, CouponError> {
    s.store
        .get_coupon(id)
        .await?
        .map(Json)
        .ok_or(CouponError::CouponNotFound)
}

async fn delete_coupon(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CouponError> {
    if s.store.delete_coupon(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(CouponError::CouponNotFound)
    }
}

async fn list_coupon_usages(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CouponUsage>>, CouponError> {
    Ok(Json(s.store.list_usages(id).await?))
}

async fn activate_coupon(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CouponError> {
    set_active(&s, id, true).await
}

async fn deactivate_coupon(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CouponError> {
    set_active(&s, id, false).await
}

async fn set_active(s: &AppState, id: Uuid, active: bool) -> Result<StatusCode, CouponError> {
    if s.store.set_active(id, active).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(CouponError::CouponNotFound)
    }
}

async fn coupon_validity(
    State(s): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<serde_json::Value>, CouponError> {
    let valid = s.engine.is_coupon_valid_now(&code).await?;
    Ok(Json(serde_json::json!({ "valid": valid })))
}

#[derive(Debug, Deserialize)]
pub struct ApplyCouponRequest {
    pub code: String,
    pub user_id: Uuid,
}

async fn apply_coupon(
    State(s): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(r): Json<ApplyCouponRequest>,
) -> Result<Json<RedemptionResult>, CouponError> {
    let result = s.engine.apply_coupon(&r.code, order_id, r.user_id).await?;
    publish_event(&s, "coupons.redeemed", serde_json::json!({
        "coupon_id": result.coupon_id,
        "order_id": order_id,
        "user_id": r.user_id,
        "discount_amount": result.discount_amount,
        "usage_ticket": result.usage_ticket,
    }))
    .await;
    Ok(Json(result))
}

async fn release_redemption(
    State(s): State<AppState>,
    Path(ticket): Path<Uuid>,
) -> Result<StatusCode, CouponError> {
    let ticket = UsageTicket(ticket);
    s.engine.release_redemption(ticket).await?;
    publish_event(&s, "coupons.released", serde_json::json!({ "usage_ticket": ticket })).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn publish_event(s: &AppState, subject: &str, payload: serde_json::Value) {
    if let Some(nats) = &s.nats {
        let bytes = match serde_json::to_vec(&payload) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!("failed to encode {subject} event: {e}");
                return;
            }
        };
        if let Err(e) = nats.publish(subject.to_string(), bytes.into()).await {
            tracing::warn!("failed to publish {subject} event: {e}");
        }
    }
}
