use {
    bidboard::{
        api::AppState,
        arguments::Arguments,
        database::Postgres,
        fanout::EventBus,
        finalizer::{
            LogOnlyPaymentCapture, PaymentCapturing, WebhookPaymentCapture, WinnerFinalizer,
        },
        locks::LotLocks,
        resolution::Resolver,
        storage::BidStorage,
        validation::BidValidator,
    },
    clap::Parser,
    observe::metrics::DEFAULT_METRICS_PORT,
    std::{sync::Arc, time::Duration},
};

#[tokio::main]
async fn main() {
    let args = Arguments::parse();
    observe::tracing::initialize(&args.log_filter, args.log_stderr_threshold);
    tracing::info!("running bidboard with validated arguments:\n{}", args);
    observe::metrics::setup_registry(Some("bidboard".into()), None);

    let postgres = Postgres::new(args.db_url.as_str()).expect("failed to create database");
    if args.db_ensure_schema {
        postgres
            .ensure_schema()
            .await
            .expect("failed to ensure database schema");
    }
    postgres
        .check_connection()
        .await
        .expect("failed to connect to database");

    let storage: Arc<dyn BidStorage> = Arc::new(postgres.clone());
    let locks = LotLocks::new(args.lot_lock_timeout);
    let events = EventBus::new(args.event_buffer_size);
    let payment: Arc<dyn PaymentCapturing> = match &args.payment_capture_url {
        Some(url) => Arc::new(
            WebhookPaymentCapture::new(url.clone(), args.payment_capture_timeout)
                .expect("failed to create payment capture client"),
        ),
        None => Arc::new(LogOnlyPaymentCapture),
    };

    let resolver = Arc::new(Resolver::new(
        storage.clone(),
        Arc::new(BidValidator),
        locks.clone(),
        events.clone(),
        args.max_cascade_depth,
    ));
    let finalizer = Arc::new(WinnerFinalizer::new(
        storage.clone(),
        locks,
        events.clone(),
        payment,
    ));
    let state = Arc::new(AppState {
        storage,
        resolver,
        finalizer,
        events,
    });

    let (shutdown_sender, shutdown_receiver) = tokio::sync::oneshot::channel();
    let serve_api = bidboard::serve_api(state, args.bind_address, async {
        let _ = shutdown_receiver.await;
    });

    let mut metrics_address = args.bind_address;
    metrics_address.set_port(DEFAULT_METRICS_PORT);
    let metrics_task = observe::metrics::serve_metrics(Arc::new(postgres), metrics_address);

    futures::pin_mut!(serve_api);
    tokio::select! {
        result = &mut serve_api => tracing::error!(?result, "API task exited"),
        result = metrics_task => tracing::error!(?result, "metrics task exited"),
        _ = shutdown_signal() => {
            tracing::info!("Gracefully shutting down API");
            shutdown_sender.send(()).expect("failed to send shutdown signal");
            match tokio::time::timeout(Duration::from_secs(10), serve_api).await {
                Ok(inner) => inner.expect("API failed during shutdown"),
                Err(_) => tracing::error!("API shutdown exceeded timeout"),
            }
        }
    };
}

#[cfg(unix)]
async fn shutdown_signal() {
    // Intercept main signals for graceful shutdown. Kubernetes sends
    // sigterm, whereas locally sigint (ctrl-c) is most common.
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .unwrap()
            .recv()
            .await
    };
    let sigint = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .unwrap()
            .recv()
            .await;
    };
    futures::pin_mut!(sigint);
    futures::pin_mut!(sigterm);
    futures::future::select(sigterm, sigint).await;
}

#[cfg(windows)]
async fn shutdown_signal() {
    // We don't support signal handling on windows.
    std::future::pending().await
}
