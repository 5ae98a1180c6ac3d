//! Error Types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_decimal::Decimal;
use thiserror::Error;

/// Discriminated outcomes of coupon validation and redemption.
///
/// Every way a coupon can fail to apply is its own variant so callers can
/// surface a precise message ("coupon expired" vs "usage limit reached")
/// instead of a generic rejection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CouponError {
    #[error("Coupon not found")]
    CouponNotFound,

    #[error("Order not found")]
    OrderNotFound,

    #[error("Coupon is not active")]
    CouponInactive,

    #[error("Coupon is not valid yet")]
    CouponNotYetStarted,

    #[error("Coupon has expired")]
    CouponExpired,

    #[error("Order total {actual} is below the minimum {required}")]
    MinOrderNotMet { required: Decimal, actual: Decimal },

    #[error("Coupon usage limit reached")]
    GlobalLimitReached,

    #[error("Per-user usage limit reached")]
    PerUserLimitReached,

    #[error("No order items are eligible for this coupon")]
    NoEligibleItems,

    #[error("Coupon already applied to this order")]
    AlreadyApplied,

    #[error("Redemption ticket not found")]
    TicketNotFound,

    /// A write conflict that may succeed on retry. Retried internally by the
    /// engine before it ever reaches a caller.
    #[error("Concurrent redemption conflict, retry")]
    TransientConflict,

    #[error("Storage error: {0}")]
    StorageUnavailable(String),
}

impl CouponError {
    /// Whether a caller may meaningfully retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientConflict)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::CouponNotFound | Self::OrderNotFound | Self::TicketNotFound => {
                StatusCode::NOT_FOUND
            }
            Self::AlreadyApplied => StatusCode::CONFLICT,
            Self::TransientConflict => StatusCode::SERVICE_UNAVAILABLE,
            Self::StorageUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for CouponError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, CouponError>;
