use std::time::Duration;

/// Streaming configuration: memory ceiling, window size and descriptor limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Tracked asset memory (bytes) above which pending segments are evicted.
    pub target_memory: usize,
    /// Radius (in segments) of the square window kept loaded around the viewpoint.
    pub window_radius: i32,
    /// Maximum include nesting below a segment descriptor.
    pub max_include_depth: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            target_memory: 64 * 1024 * 1024,
            window_radius: 1,
            max_include_depth: 16,
        }
    }
}

impl StreamConfig {
    pub fn with_target_memory(mut self, bytes: usize) -> Self {
        self.target_memory = bytes;
        self
    }

    pub fn with_window_radius(mut self, radius: i32) -> Self {
        self.window_radius = radius;
        self
    }
}

/// Per-tick streaming statistics for instrumentation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamStats {
    pub segments_loaded: usize,
    pub segments_failed: usize,
    pub segments_scheduled: usize,
    pub segments_restored: usize,
    pub segments_evicted: usize,
    pub assets_created: usize,
    pub assets_freed: usize,
    pub resident_segments: usize,
    pub pending_unloads: usize,
    pub resident_assets: usize,
    pub memory_usage: usize,
    pub target_memory: usize,
    pub update_time: Duration,
}

impl StreamStats {
    /// Tracked memory relative to the budget; above 1.0 means over budget.
    pub fn memory_pressure(&self) -> f32 {
        if self.target_memory == 0 {
            return 0.0;
        }
        self.memory_usage as f32 / self.target_memory as f32
    }

    pub fn over_budget(&self) -> bool {
        self.memory_usage > self.target_memory
    }
}
