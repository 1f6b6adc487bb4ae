//! Operator configuration
//!
//! Read once at startup from flags with environment fallbacks. Handlers only
//! ever see an immutable [`OperatorConfig`].

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Args, ValueEnum};

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Process-wide settings
#[derive(Args, Clone, Debug)]
pub struct OperatorConfig {
    /// Ingress domain used when a portal doesn't set one
    #[arg(long, env = "INGRESS_DOMAIN", default_value = "training.eduk8s.io")]
    pub ingress_domain: String,

    /// URL scheme for portal and session URLs
    #[arg(long, env = "INGRESS_PROTOCOL", default_value = "http")]
    pub ingress_protocol: String,

    /// Ingress class set on generated ingresses
    #[arg(long, env = "INGRESS_CLASS")]
    pub ingress_class: Option<String>,

    /// TLS secret referenced by generated ingresses
    #[arg(long, env = "INGRESS_SECRET")]
    pub ingress_secret: Option<String>,

    /// Storage class of the portal volume claim
    #[arg(long, env = "STORAGE_CLASS")]
    pub storage_class: Option<String>,

    /// Registry prefix for portal and default workshop images
    #[arg(long, env = "IMAGE_REGISTRY", default_value = "quay.io/eduk8s")]
    pub image_registry: String,

    /// Capacity used when neither the workshop entry nor the portal sets one
    #[arg(long, env = "DEFAULT_CAPACITY", default_value_t = 0)]
    pub default_capacity: i64,

    /// Reserved count used when neither the workshop entry nor the portal sets one
    #[arg(long, env = "DEFAULT_RESERVED")]
    pub default_reserved: Option<i64>,

    /// Lifetime of an allocated session in seconds, unless the workshop sets one
    #[arg(long, env = "SESSION_DURATION", default_value_t = 3600)]
    pub session_duration_secs: u64,

    /// Environment resync period in seconds
    #[arg(long, env = "RESYNC_INTERVAL", default_value_t = 30)]
    pub resync_interval_secs: u64,

    /// Timeout for each cluster API call in seconds
    #[arg(long, env = "API_TIMEOUT", default_value_t = 10)]
    pub api_timeout_secs: u64,

    /// Listen address of the allocation API
    #[arg(long, env = "ALLOCATION_ADDR", default_value = "0.0.0.0:8080")]
    pub allocation_addr: SocketAddr,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            ingress_domain: "training.eduk8s.io".to_string(),
            ingress_protocol: "http".to_string(),
            ingress_class: None,
            ingress_secret: None,
            storage_class: None,
            image_registry: "quay.io/eduk8s".to_string(),
            default_capacity: 0,
            default_reserved: None,
            session_duration_secs: 3600,
            resync_interval_secs: 30,
            api_timeout_secs: 10,
            allocation_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_format: LogFormat::Text,
        }
    }
}

impl OperatorConfig {
    /// Default lifetime of an allocated session
    pub fn session_duration(&self) -> Duration {
        Duration::from_secs(self.session_duration_secs)
    }

    /// Period between environment resyncs
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    /// Per-call gateway timeout
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    /// Image of the portal UI
    pub fn portal_image(&self) -> String {
        format!("{}/eduk8s-portal:latest", self.registry())
    }

    /// Image for a workshop that doesn't name one
    pub fn workshop_image(&self, workshop: &str) -> String {
        format!("{}/{workshop}:latest", self.registry())
    }

    fn registry(&self) -> &str {
        self.image_registry.trim_end_matches('/')
    }
}
