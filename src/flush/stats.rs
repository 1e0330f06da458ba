/// Counters for the work a context has recorded.
///
/// Draw counters count calls; `instances` sums instance counts over all
/// instanced draws.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub flushes: u64,
    pub render_passes: u64,
    pub draws: u64,
    pub indexed_draws: u64,
    pub instanced_draws: u64,
    pub indexed_instanced_draws: u64,
    pub instances: u64,
    pub pipeline_binds: u64,
    pub failed_pipeline_binds: u64,
    /// Uniform binds the backend refused; their draws were skipped.
    pub failed_uniform_binds: u64,
    pub buffer_uploads: u64,
}

impl Stats {
    /// Total draw calls of every kind.
    pub fn total_draws(&self) -> u64 {
        self.draws + self.indexed_draws + self.instanced_draws + self.indexed_instanced_draws
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
