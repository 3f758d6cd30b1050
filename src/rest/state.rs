//! API state management for the REST server.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::RateLimitConfig;
use crate::pipeline::Pipeline;
use crate::rate_limit::{RateLimitDecision, RateLimiter};

/// Shared state for the REST API
#[derive(Clone)]
pub struct ApiState {
    /// The one in-memory pipeline session served by this process
    pub pipeline: Pipeline,
    limiter: RateLimiter,
    rate_limit: RateLimitConfig,
}

impl ApiState {
    pub fn new(pipeline: Pipeline) -> Self {
        let rate_limit = pipeline.config().rate_limit.clone();
        Self {
            pipeline,
            limiter: RateLimiter::new(),
            rate_limit,
        }
    }

    /// Count a request from `client`; `None` when limiting is disabled
    pub fn check_rate_limit(&self, client: &str) -> Option<RateLimitDecision> {
        if !self.rate_limit.enabled {
            return None;
        }
        Some(self.limiter.check(
            client,
            self.rate_limit.requests,
            self.window(),
        ))
    }

    /// Whether `X-Forwarded-For` may identify the client
    pub fn trusts_forwarded_for(&self) -> bool {
        self.rate_limit.trust_forwarded_for
    }

    /// Start reclaiming idle client windows; `None` when limiting is disabled
    pub fn spawn_rate_limit_pruner(&self) -> Option<JoinHandle<()>> {
        self.rate_limit
            .enabled
            .then(|| self.limiter.spawn_pruner(self.window()))
    }

    fn window(&self) -> Duration {
        Duration::from_millis(self.rate_limit.window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::pipeline::Collaborators;
    use crate::prompts::PromptSet;
    use std::sync::Arc;

    fn state(config: Config) -> ApiState {
        let pipeline = Pipeline::new(
            Arc::new(config),
            Arc::new(PromptSet::builtin().unwrap()),
            Collaborators::default(),
        );
        ApiState::new(pipeline)
    }

    #[test]
    fn test_rate_limit_follows_config() {
        let mut config = Config::default();
        config.rate_limit.requests = 1;
        let limited = state(config);
        assert!(limited.check_rate_limit("c").unwrap().allowed);
        assert!(!limited.check_rate_limit("c").unwrap().allowed);

        let mut config = Config::default();
        config.rate_limit.enabled = false;
        let disabled = state(config);
        assert!(disabled.check_rate_limit("c").is_none());
        assert!(disabled.spawn_rate_limit_pruner().is_none());
    }
}
