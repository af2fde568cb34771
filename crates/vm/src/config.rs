//! Machine configuration.

/// Slots reserved for the root frame's local variables.
///
/// Internal to the machine: not part of the module format.
pub const ROOT_FRAME_SLOTS: usize = 256;

/// Default initial stack capacity in words.
pub const DEFAULT_STACK_CAPACITY: usize = 1024;

/// Default upper bound on stack slots (16 Mi words).
pub const DEFAULT_MAX_STACK_SLOTS: usize = 1 << 24;

/// Tunables for a single machine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    /// Words allocated up front. Raised to [`ROOT_FRAME_SLOTS`] if smaller.
    pub initial_stack_capacity: usize,
    /// Pushing past this many slots is a `StackOverflow` fault.
    pub max_stack_slots: usize,
    /// Skip unknown opcodes as one-byte no-ops instead of faulting.
    pub lenient_opcodes: bool,
    /// Fault with `StepLimitExceeded` after this many instructions.
    pub step_limit: Option<u64>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            initial_stack_capacity: DEFAULT_STACK_CAPACITY,
            max_stack_slots: DEFAULT_MAX_STACK_SLOTS,
            lenient_opcodes: false,
            step_limit: None,
        }
    }
}

impl MachineConfig {
    pub fn with_initial_stack_capacity(mut self, words: usize) -> Self {
        self.initial_stack_capacity = words;
        self
    }

    pub fn with_max_stack_slots(mut self, slots: usize) -> Self {
        self.max_stack_slots = slots;
        self
    }

    pub fn with_lenient_opcodes(mut self, lenient: bool) -> Self {
        self.lenient_opcodes = lenient;
        self
    }

    pub fn with_step_limit(mut self, limit: Option<u64>) -> Self {
        self.step_limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = MachineConfig::default();
        assert_eq!(config.initial_stack_capacity, 1024);
        assert!(!config.lenient_opcodes);
        assert_eq!(config.step_limit, None);
    }

    #[test]
    fn builder_methods() {
        let config = MachineConfig::default()
            .with_initial_stack_capacity(8)
            .with_max_stack_slots(512)
            .with_lenient_opcodes(true)
            .with_step_limit(Some(10));
        assert_eq!(config.initial_stack_capacity, 8);
        assert_eq!(config.max_stack_slots, 512);
        assert!(config.lenient_opcodes);
        assert_eq!(config.step_limit, Some(10));
    }
}
