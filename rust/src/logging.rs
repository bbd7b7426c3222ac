/// Logging initialization.
///
/// Installs a `tracing-subscriber` fmt layer on stderr, filtered by
/// `RUST_LOG` (default `teamwork_chat_core=debug,info`), plus an append-only
/// file layer at `<data_dir>/teamwork.log` when the file can be opened.
///
/// Called once at the start of `FfiApp::new()`. Later calls are no-ops.
pub fn init_logging(data_dir: &str) {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "teamwork_chat_core=debug,info".into());

    let log_path = std::path::Path::new(data_dir).join("teamwork.log");
    let _ = std::fs::create_dir_all(data_dir);
    let file_layer = if let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .with_target(true),
        )
    } else {
        None
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();
}
