use {axum::response::Json, serde::Serialize};

#[derive(Serialize)]
pub(crate) struct Version {
    version: &'static str,
}

pub async fn version_handler() -> Json<Version> {
    Json(Version {
        version: env!("CARGO_PKG_VERSION"),
    })
}
