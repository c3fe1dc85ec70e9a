//! Isolate configuration.

/// Default external-memory pressure threshold (64 MiB).
pub const DEFAULT_EXTERNAL_MEMORY_THRESHOLD: i64 = 64 * 1024 * 1024;

/// Default upper bound on array length (16 Mi elements).
pub const DEFAULT_MAX_ARRAY_LENGTH: usize = 1 << 24;

/// Settings applied when an isolate is created.
///
/// ```ignore
/// let isolate = Isolate::with_config(
///     IsolateConfig::default()
///         .with_name("game")
///         .with_external_memory_threshold(1 << 20),
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolateConfig {
    /// Name used in log output.
    pub name: String,
    /// Bytes of externally held native memory above which
    /// `Isolate::memory_pressure` reports true.
    pub external_memory_threshold: i64,
    /// Longest array a host write may grow. Writes past it throw a
    /// `RangeError`.
    pub max_array_length: usize,
}

impl IsolateConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_external_memory_threshold(mut self, bytes: i64) -> Self {
        self.external_memory_threshold = bytes;
        self
    }

    pub fn with_max_array_length(mut self, elements: usize) -> Self {
        self.max_array_length = elements;
        self
    }
}

impl Default for IsolateConfig {
    fn default() -> Self {
        Self {
            name: "isolate".to_string(),
            external_memory_threshold: DEFAULT_EXTERNAL_MEMORY_THRESHOLD,
            max_array_length: DEFAULT_MAX_ARRAY_LENGTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = IsolateConfig::default()
            .with_name("worker")
            .with_external_memory_threshold(10)
            .with_max_array_length(4);
        assert_eq!(config.name, "worker");
        assert_eq!(config.external_memory_threshold, 10);
        assert_eq!(config.max_array_length, 4);
        assert_eq!(
            IsolateConfig::default().external_memory_threshold,
            DEFAULT_EXTERNAL_MEMORY_THRESHOLD
        );
    }
}
