use metrics_exporter_statsd::StatsdBuilder;

const QUEUE_SIZE: usize = 5000;
const BUFFER_SIZE: usize = 1024;

#[derive(thiserror::Error, Debug)]
pub enum MetricsError {
    #[error("could not build statsd recorder: {0}")]
    Build(#[from] metrics_exporter_statsd::StatsdError),
    #[error("could not install recorder: {0}")]
    Install(String),
}

/// Install a statsd recorder as the global `metrics` recorder.
/// Until this is called every metric emitted through the facade is discarded.
pub fn init_statsd(host: &str, port: u16, prefix: &str) -> Result<(), MetricsError> {
    let recorder = StatsdBuilder::from(host, port)
        .with_queue_size(QUEUE_SIZE)
        .with_buffer_size(BUFFER_SIZE)
        .build(Some(prefix))?;

    metrics::set_global_recorder(recorder).map_err(|e| MetricsError::Install(e.to_string()))?;

    tracing::info!(host, port, prefix, "statsd metrics exporter installed");
    Ok(())
}
