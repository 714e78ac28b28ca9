pub mod admin;
pub mod auth;
pub mod bookings;
pub mod catalog;
pub mod dashboard;
pub mod finances;
pub mod inventory;
pub mod users;

use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": env!("CARGO_PKG_NAME") }))
}
