use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};

/// Build the CORS layer. `TRIAGE_CORS_ALLOWED_ORIGINS` is a comma-separated
/// allowlist; unset means permissive (dev default).
pub fn build_cors_layer() -> CorsLayer {
    match std::env::var("TRIAGE_CORS_ALLOWED_ORIGINS") {
        Ok(origins) if !origins.trim().is_empty() => {
            let origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
        _ => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    }
}
