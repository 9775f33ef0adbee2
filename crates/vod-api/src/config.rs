//! API server configuration.

use std::time::Duration;

use vod_config::AppConfig;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Per-request deadline; expiry cancels in-flight storage and
    /// database calls for that request
    pub request_timeout: Duration,
    /// Expiry for presigned download URLs
    pub presign_expiry: Duration,
    /// Max accepted request body (uploads)
    pub max_body_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8888,
            request_timeout: Duration::from_secs(30),
            presign_expiry: Duration::from_secs(3600),
            max_body_size: 1024 * 1024 * 1024,
        }
    }
}

impl ApiConfig {
    /// Derive from the application config document.
    pub fn from_app(app: &AppConfig) -> Self {
        Self {
            host: std::env::var("VOD_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("VOD_API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8888),
            request_timeout: Duration::from_secs(app.timeout.request_secs),
            presign_expiry: Duration::from_secs(app.timeout.presign_expiry_secs),
            max_body_size: std::env::var("VOD_API_MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024 * 1024),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_come_from_the_config_document() {
        let mut app = AppConfig::default();
        app.timeout.request_secs = 12;
        app.timeout.presign_expiry_secs = 60;

        let config = ApiConfig::from_app(&app);
        assert_eq!(config.request_timeout, Duration::from_secs(12));
        assert_eq!(config.presign_expiry, Duration::from_secs(60));
    }
}
