use tracing::subscriber::set_global_default;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};
use std::path::Path;

/// Initialize structured logging: JSON to a daily-rolling file, plain text to the console.
pub fn init_logging(log_dir: impl AsRef<Path>, log_level: &str) -> anyhow::Result<()> {
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir.as_ref(), "service.log");

    // JSON for log shippers
    let file_layer = fmt::layer()
        .json()
        .with_writer(file_appender)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true);

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = Registry::default()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer);

    set_global_default(subscriber)?;

    tracing::info!("Logging initialized with level: {}", log_level);

    Ok(())
}

/// Structured authentication event. `$username` is a `&str`; pass
/// `ANONYMOUS` when the request carried no usable credentials.
/// Never pass passwords or patient fields here.
pub const ANONYMOUS: &str = "-";

#[macro_export]
macro_rules! audit_log {
    ($event_type:expr, $endpoint:expr, $username:expr, $success:expr) => {
        tracing::info!(
            event_type = $event_type,
            endpoint = %$endpoint,
            username = %$username,
            success = $success,
            timestamp = %::chrono::Utc::now().to_rfc3339(),
            "AUDIT_EVENT"
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_audit_event_logs_plain_username() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            crate::audit_log!("authentication", "/records", "admin", true);
            crate::audit_log!("authentication", "/audit", ANONYMOUS, false);
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("username=admin"));
        assert!(output.contains("username=-"));
        assert!(output.contains("endpoint=/records"));
        assert!(!output.contains("Some("));
    }

    #[test]
    fn test_logging_initialization() {
        let temp_dir = tempdir().unwrap();
        let result = init_logging(temp_dir.path(), "info");
        assert!(result.is_ok());
        assert!(temp_dir.path().exists());
    }
}
