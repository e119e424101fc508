//! Anonymous health probe.

use axum::extract::State;
use axum::response::Json;
use diesel_async::RunQueryDsl;
use serde::Serialize;

use crate::routes::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub name: &'static str,
    pub healthy: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub components: Vec<ComponentHealth>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match state.pool.get().await {
        Ok(mut conn) => diesel::sql_query("SELECT 1")
            .execute(&mut conn)
            .await
            .is_ok(),
        Err(_) => false,
    };

    let cluster = state.resolver.probe().await.is_ok();
    let storage = state.storage.list("").await.is_ok();

    let components = vec![
        ComponentHealth {
            name: "database",
            healthy: database,
        },
        ComponentHealth {
            name: "cluster",
            healthy: cluster,
        },
        ComponentHealth {
            name: "storage",
            healthy: storage,
        },
    ];

    let status = if components.iter().all(|c| c.healthy) {
        "Healthy"
    } else {
        "Degraded"
    };

    Json(HealthResponse { status, components })
}
