use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    db::CatStore,
    error::AppError,
    models::{LogLevel, NewLogEntry},
};

/// Append-only diagnostic trail kept in the `log_entries` table.
///
/// Writes never fail the caller; a sink failure is reported through tracing
/// and dropped.
#[derive(Clone)]
pub struct LogSink {
    store: Arc<dyn CatStore>,
}

impl LogSink {
    pub fn new(store: Arc<dyn CatStore>) -> Self {
        Self { store }
    }

    pub async fn info(&self, message: &str, context: Value, fid: Option<i64>) {
        self.write(LogLevel::Info, message, context, fid).await;
    }

    pub async fn warn(&self, message: &str, context: Value, fid: Option<i64>) {
        self.write(LogLevel::Warn, message, context, fid).await;
    }

    pub async fn error(&self, message: &str, context: Value, fid: Option<i64>) {
        self.write(LogLevel::Error, message, context, fid).await;
    }

    /// Records server-class failures only; client errors are not diagnostic.
    pub async fn record_failure(&self, message: &str, err: &AppError, fid: Option<i64>) {
        if !err.is_server_error() {
            return;
        }
        self.error(message, json!({ "error": err.to_string() }), fid)
            .await;
    }

    async fn write(&self, level: LogLevel, message: &str, context: Value, fid: Option<i64>) {
        match level {
            LogLevel::Info => tracing::info!(fid = ?fid, context = %context, "{}", message),
            LogLevel::Warn => tracing::warn!(fid = ?fid, context = %context, "{}", message),
            LogLevel::Error => tracing::error!(fid = ?fid, context = %context, "{}", message),
        }

        let entry = NewLogEntry {
            level,
            message: message.to_string(),
            context,
            fid,
        };
        if let Err(e) = self.store.insert_log_entry(&entry).await {
            tracing::error!("Failed to write log entry: {}", e);
        }
    }
}
