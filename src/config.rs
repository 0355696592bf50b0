use std::time::Duration;

use crate::limiter::RateLimiter;

mod class;
pub use class::{ClassFilter, CLASS_ANNOTATION};

/// Process-wide settings of the controller.
///
/// Built once through [`Configuration::builder`] and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    cluster_name: String,
    alb_name_prefix: String,
    restrict_scheme: bool,
    restrict_scheme_namespace: String,
    aws_sync_period: Duration,
    aws_api_max_retries: u32,
    aws_api_debug: bool,
    enable_profiling: bool,
    sync_rate_limit: f32,
    election_id: String,
    namespace: Option<String>,
    resync_period: Duration,
    healthz_port: u16,
    default_healthz_url: Option<String>,
    default_ssl_certificate: Option<String>,
    config_map_name: Option<String>,
    class_filter: ClassFilter,
}

impl Configuration {
    /// Starts a builder with defaults for everything except the cluster name.
    pub fn builder(cluster_name: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder {
            cfg: Configuration {
                cluster_name: cluster_name.into(),
                alb_name_prefix: String::new(),
                restrict_scheme: false,
                restrict_scheme_namespace: "default".to_owned(),
                aws_sync_period: Duration::from_secs(60 * 60),
                aws_api_max_retries: 20,
                aws_api_debug: false,
                enable_profiling: false,
                sync_rate_limit: 0.3,
                election_id: "ingress-controller-leader".to_owned(),
                namespace: None,
                resync_period: Duration::from_secs(30),
                healthz_port: 10254,
                default_healthz_url: None,
                default_ssl_certificate: None,
                config_map_name: None,
                class_filter: ClassFilter::default(),
            },
        }
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// The prefix of generated load balancer names; the cluster name when unset.
    pub fn name_prefix(&self) -> &str {
        if self.alb_name_prefix.is_empty() {
            &self.cluster_name
        } else {
            &self.alb_name_prefix
        }
    }

    /// Whether internet-facing load balancers are confined to [`Self::restrict_scheme_namespace`].
    pub fn restrict_scheme(&self) -> bool {
        self.restrict_scheme
    }

    pub fn restrict_scheme_namespace(&self) -> &str {
        &self.restrict_scheme_namespace
    }

    /// How long an applied state is trusted before the load balancer is described again.
    pub fn aws_sync_period(&self) -> Duration {
        self.aws_sync_period
    }

    pub fn aws_api_max_retries(&self) -> u32 {
        self.aws_api_max_retries
    }

    pub fn aws_api_debug(&self) -> bool {
        self.aws_api_debug
    }

    pub fn enable_profiling(&self) -> bool {
        self.enable_profiling
    }

    /// Permitted sync passes per second. Zero disables rate limiting.
    pub fn sync_rate_limit(&self) -> f32 {
        self.sync_rate_limit
    }

    pub fn election_id(&self) -> &str {
        &self.election_id
    }

    /// The only namespace whose ingresses are managed, if restricted.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn resync_period(&self) -> Duration {
        self.resync_period
    }

    pub fn healthz_port(&self) -> u16 {
        self.healthz_port
    }

    pub fn default_healthz_url(&self) -> Option<&str> {
        self.default_healthz_url.as_deref()
    }

    /// Certificate attached to HTTPS listeners that do not name their own.
    pub fn default_ssl_certificate(&self) -> Option<&str> {
        self.default_ssl_certificate.as_deref()
    }

    pub fn config_map_name(&self) -> Option<&str> {
        self.config_map_name.as_deref()
    }

    pub fn class_filter(&self) -> &ClassFilter {
        &self.class_filter
    }
}

/// Builder for [`Configuration`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    cfg: Configuration,
}

impl ConfigBuilder {
    pub fn alb_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cfg.alb_name_prefix = prefix.into();
        self
    }

    /// Confines internet-facing schemes to ingresses in `namespace`.
    pub fn restrict_scheme(mut self, namespace: impl Into<String>) -> Self {
        self.cfg.restrict_scheme = true;
        self.cfg.restrict_scheme_namespace = namespace.into();
        self
    }

    pub fn aws_sync_period(mut self, period: Duration) -> Self {
        self.cfg.aws_sync_period = period;
        self
    }

    pub fn aws_api_max_retries(mut self, retries: u32) -> Self {
        self.cfg.aws_api_max_retries = retries;
        self
    }

    pub fn aws_api_debug(mut self, debug: bool) -> Self {
        self.cfg.aws_api_debug = debug;
        self
    }

    pub fn enable_profiling(mut self, enable: bool) -> Self {
        self.cfg.enable_profiling = enable;
        self
    }

    pub fn sync_rate_limit(mut self, qps: f32) -> Self {
        self.cfg.sync_rate_limit = qps;
        self
    }

    pub fn election_id(mut self, id: impl Into<String>) -> Self {
        self.cfg.election_id = id.into();
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.cfg.namespace = Some(namespace.into()).filter(|ns| !ns.is_empty());
        self
    }

    pub fn resync_period(mut self, period: Duration) -> Self {
        self.cfg.resync_period = period;
        self
    }

    pub fn healthz_port(mut self, port: u16) -> Self {
        self.cfg.healthz_port = port;
        self
    }

    pub fn default_healthz_url(mut self, url: impl Into<String>) -> Self {
        self.cfg.default_healthz_url = Some(url.into());
        self
    }

    pub fn default_ssl_certificate(mut self, certificate: impl Into<String>) -> Self {
        self.cfg.default_ssl_certificate = Some(certificate.into());
        self
    }

    pub fn config_map_name(mut self, name: impl Into<String>) -> Self {
        self.cfg.config_map_name = Some(name.into());
        self
    }

    pub fn class_filter(mut self, filter: ClassFilter) -> Self {
        self.cfg.class_filter = filter;
        self
    }

    /// Validates the settings and freezes them.
    pub fn build(self) -> Result<Configuration, ConfigError> {
        let cfg = self.cfg;

        if cfg.cluster_name.is_empty() {
            return Err(ConfigError::EmptyClusterName);
        }
        if cfg.alb_name_prefix.len() > MAX_PREFIX_LEN
            || !cfg
                .alb_name_prefix
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
            || cfg.alb_name_prefix.starts_with('-')
            || cfg.alb_name_prefix.ends_with('-')
        {
            return Err(ConfigError::InvalidPrefix(cfg.alb_name_prefix));
        }
        if !RateLimiter::supports(cfg.sync_rate_limit) {
            return Err(ConfigError::InvalidRateLimit(cfg.sync_rate_limit));
        }
        if cfg.resync_period.is_zero() {
            return Err(ConfigError::ZeroResyncPeriod);
        }

        Ok(cfg)
    }
}

const MAX_PREFIX_LEN: usize = 12;

/// The error type returned by [`ConfigBuilder::build`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cluster name must not be empty")]
    EmptyClusterName,
    #[error("name prefix {0:?} must be at most 12 characters of [a-z0-9-], not starting or ending with '-'")]
    InvalidPrefix(String),
    #[error("sync rate limit {0} must be zero or at least one pass per day")]
    InvalidRateLimit(f32),
    #[error("resync period must be non-zero")]
    ZeroResyncPeriod,
}
