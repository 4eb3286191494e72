//! Liveness endpoints; they sit outside the authorization gate.

use rocket::get;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};

/// Basic response payload describing API health.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

fn ok() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[get("/")]
pub fn root_status() -> Json<HealthResponse> {
    ok()
}

#[get("/status")]
pub fn status() -> Json<HealthResponse> {
    ok()
}
