use crate::serializable_struct_with_getters;
use serde::{Deserialize, Serialize};
use std::time::Duration;

serializable_struct_with_getters! {
    EngineConfig {
        optimizer: Option<OptimizerConfig>,
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { optimizer: None }
    }
}

serializable_struct_with_getters! {
    OptimizerConfig {
        time_limit_ms: Option<u64>,
        node_limit: Option<u64>,
        local_search: Option<bool>,
        max_swap_iterations: Option<usize>,
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            time_limit_ms: None,
            node_limit: None,
            local_search: None,
            max_swap_iterations: None,
        }
    }
}

impl OptimizerConfig {
    pub const DEFAULT_TIME_LIMIT_MS: u64 = 10_000;
    pub const DEFAULT_NODE_LIMIT: u64 = 5_000_000;
    pub const DEFAULT_MAX_SWAP_ITERATIONS: usize = 100;

    pub fn limits(&self) -> SolveLimits {
        SolveLimits {
            time_limit: Duration::from_millis(
                self.time_limit_ms.unwrap_or(Self::DEFAULT_TIME_LIMIT_MS),
            ),
            node_limit: self.node_limit.unwrap_or(Self::DEFAULT_NODE_LIMIT),
        }
    }

    pub fn local_search_enabled(&self) -> bool {
        self.local_search.unwrap_or(false)
    }

    pub fn swap_iterations(&self) -> usize {
        self.max_swap_iterations
            .unwrap_or(Self::DEFAULT_MAX_SWAP_ITERATIONS)
    }
}

/// Bounds on the exact search. Whichever is hit first ends it.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct SolveLimits {
    pub time_limit: Duration,
    pub node_limit: u64,
}

impl SolveLimits {
    pub fn new(time_limit: Duration) -> Self {
        Self {
            time_limit,
            node_limit: OptimizerConfig::DEFAULT_NODE_LIMIT,
        }
    }

    pub fn with_node_limit(mut self, node_limit: u64) -> Self {
        self.node_limit = node_limit;
        self
    }
}

impl Default for SolveLimits {
    fn default() -> Self {
        OptimizerConfig::default().limits()
    }
}
