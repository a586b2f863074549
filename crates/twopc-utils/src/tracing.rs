#[inline(never)]
pub fn setup_tracing() {
    use tracing_subscriber::fmt::time::UtcTime;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_timer(UtcTime::rfc_3339())
        .with_target(true)
        .finish()
        .try_init();
}
