mod types;

pub use types::{IngressCtrlConfig, IngressTemplateConfig, RateLimitConfig};
