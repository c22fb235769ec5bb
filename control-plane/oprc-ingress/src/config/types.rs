use std::time::Duration;

use envconfig::Envconfig;

use crate::queue::{
    BucketRateLimiter, ItemExponentialFailureRateLimiter, MaxOfRateLimiter,
};

#[derive(Envconfig, Clone, Debug)]
pub struct IngressCtrlConfig {
    #[envconfig(from = "HTTP_PORT", default = "8088")]
    pub http_port: u16,

    /// Only Services and Ingresses in this namespace are watched.
    #[envconfig(from = "OPRC_INGRESS_K8S_NAMESPACE", default = "default")]
    pub k8s_namespace: String,

    #[envconfig(from = "OPRC_INGRESS_WORKERS", default = "5")]
    pub workers: usize,

    /// Consecutive failures of one key before it is dropped.
    #[envconfig(from = "OPRC_INGRESS_MAX_RETRIES", default = "10")]
    pub max_retries: u32,

    /// Presence of this annotation on a Service requests an Ingress; its value
    /// is ignored.
    #[envconfig(from = "OPRC_INGRESS_MARKER_ANNOTATION", default = "ingress/http")]
    pub marker_annotation: String,

    /// Also reconcile when a Service is deleted, instead of relying on the
    /// Ingress deletion or a resync.
    #[envconfig(from = "OPRC_INGRESS_ENQUEUE_ON_SOURCE_DELETE", default = "true")]
    pub enqueue_on_source_delete: bool,

    /// Re-enqueue everything in the cache at this interval; 0 disables.
    #[envconfig(from = "OPRC_INGRESS_RESYNC_SECS", default = "0")]
    pub resync_secs: u64,

    /// Delay before a crashed worker is started again.
    #[envconfig(from = "OPRC_INGRESS_WORKER_RESTART_SECS", default = "60")]
    pub worker_restart_secs: u64,

    #[envconfig(nested)]
    pub rate_limit: RateLimitConfig,

    #[envconfig(nested)]
    pub template: IngressTemplateConfig,
}

#[derive(Envconfig, Clone, Debug)]
pub struct RateLimitConfig {
    #[envconfig(from = "OPRC_INGRESS_BACKOFF_BASE_MS", default = "5")]
    pub backoff_base_ms: u64,
    #[envconfig(from = "OPRC_INGRESS_BACKOFF_MAX_SECS", default = "1000")]
    pub backoff_max_secs: u64,
    #[envconfig(from = "OPRC_INGRESS_QPS", default = "10")]
    pub qps: f64,
    #[envconfig(from = "OPRC_INGRESS_BURST", default = "100")]
    pub burst: u32,
}

#[derive(Envconfig, Clone, Debug)]
pub struct IngressTemplateConfig {
    #[envconfig(from = "OPRC_INGRESS_HOST", default = "example.com")]
    pub host: String,
    #[envconfig(from = "OPRC_INGRESS_PATH", default = "/")]
    pub path: String,
    /// Prefix | Exact | ImplementationSpecific
    #[envconfig(from = "OPRC_INGRESS_PATH_TYPE", default = "Prefix")]
    pub path_type: String,
    #[envconfig(from = "OPRC_INGRESS_CLASS", default = "nginx")]
    pub ingress_class: String,
    #[envconfig(from = "OPRC_INGRESS_BACKEND_PORT", default = "80")]
    pub backend_port: i32,
}

impl IngressCtrlConfig {
    /// Clamp values that would stall the controller.
    pub fn normalize(mut self) -> Self {
        if self.workers == 0 {
            self.workers = 1;
        }
        if self.rate_limit.backoff_max_secs.saturating_mul(1000)
            < self.rate_limit.backoff_base_ms
        {
            self.rate_limit.backoff_max_secs =
                self.rate_limit.backoff_base_ms.div_ceil(1000);
        }
        self
    }

    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_secs > 0).then(|| Duration::from_secs(self.resync_secs))
    }

    pub fn worker_restart_delay(&self) -> Duration {
        Duration::from_secs(self.worker_restart_secs)
    }
}

impl RateLimitConfig {
    /// Per-key exponential backoff bounded by an overall token bucket.
    pub fn build(&self) -> MaxOfRateLimiter {
        MaxOfRateLimiter::new(vec![
            Box::new(ItemExponentialFailureRateLimiter::new(
                Duration::from_millis(self.backoff_base_ms),
                Duration::from_secs(self.backoff_max_secs),
            )),
            Box::new(BucketRateLimiter::new(self.qps, self.burst)),
        ])
    }
}
