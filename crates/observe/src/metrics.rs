use {
    axum::{Router, routing::get},
    prometheus::Encoder,
    std::{collections::HashMap, net::SocketAddr, sync::Arc, sync::OnceLock},
    tokio::task::{self, JoinHandle},
};

/// Global metrics registry used by all components.
static REGISTRY: OnceLock<prometheus_metric_storage::StorageRegistry> = OnceLock::new();

/// Configure global metrics registry.
///
/// This function allows specifying a common prefix that will be added
/// to all metric names, as well as common labels.
///
/// This function can be called at most once, and it should be done before
/// any call to [`get_registry`], ideally in the very beginning of the `main`
/// function.
///
/// # Panics
///
/// This function panics if it's called twice, or if it's called after any
/// call to [`get_registry`]. This function also panics if registry
/// configuration is invalid.
pub fn setup_registry(prefix: Option<String>, labels: Option<HashMap<String, String>>) {
    let registry = prometheus::Registry::new_custom(prefix, labels).unwrap();
    let storage_registry = prometheus_metric_storage::StorageRegistry::new(registry);
    REGISTRY.set(storage_registry).unwrap();
}

/// Like [`setup_registry`], but can be called multiple times in a row.
/// Later calls are ignored.
///
/// Useful for tests.
pub fn setup_registry_reentrant(prefix: Option<String>, labels: Option<HashMap<String, String>>) {
    let registry = prometheus::Registry::new_custom(prefix, labels).unwrap();
    let storage_registry = prometheus_metric_storage::StorageRegistry::new(registry);
    REGISTRY.set(storage_registry).ok();
}

/// Get the global instance of the metrics registry.
pub fn get_registry() -> &'static prometheus::Registry {
    get_storage_registry().registry()
}

/// Get the global instance of the metric storage registry.
///
/// # Implementation notice
///
/// If the global metrics registry was not configured with
/// [`setup_registry`], it will be initialized using a default value. We
/// could've panicked instead, but panicking creates troubles for unit tests:
/// there is no way to set up a hook that calls [`setup_registry`] before
/// each test, so we'd have to initialize it manually before every test.
pub fn get_storage_registry() -> &'static prometheus_metric_storage::StorageRegistry {
    REGISTRY.get_or_init(prometheus_metric_storage::StorageRegistry::default)
}

pub fn encode(registry: &prometheus::Registry) -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

pub const DEFAULT_METRICS_PORT: u16 = 9586;

#[async_trait::async_trait]
pub trait LivenessChecking: Send + Sync {
    async fn is_alive(&self) -> bool;
}

/// Serves `/metrics` and `/liveness` on the given address until the process
/// exits.
pub fn serve_metrics(liveness: Arc<dyn LivenessChecking>, address: SocketAddr) -> JoinHandle<()> {
    let app = Router::new()
        .route("/metrics", get(|| async { encode(get_registry()) }))
        .route(
            "/liveness",
            get(move || {
                let liveness = liveness.clone();
                async move {
                    if liveness.is_alive().await {
                        axum::http::StatusCode::OK
                    } else {
                        axum::http::StatusCode::SERVICE_UNAVAILABLE
                    }
                }
            }),
        );
    tracing::info!(%address, "serving metrics");
    task::spawn(async move {
        let listener = tokio::net::TcpListener::bind(address)
            .await
            .expect("failed to bind metrics server");
        axum::serve(listener, app)
            .await
            .expect("metrics server died");
    })
}
