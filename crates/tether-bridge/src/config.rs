//! Reference host configuration

/// Resource limits for a [`crate::Runtime`]. `None` means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Maximum number of stack slots across all frames
    pub max_stack_slots: Option<usize>,

    /// Maximum nesting of native calls
    pub max_call_depth: Option<usize>,

    /// Maximum number of live handles
    pub max_handles: Option<usize>,
}

impl ResourceLimits {
    /// No limits
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Limit the stack to `slots` values
    pub fn with_stack_limit(slots: usize) -> Self {
        Self {
            max_stack_slots: Some(slots),
            ..Default::default()
        }
    }

    /// Limit call nesting to `depth` frames
    pub fn with_call_depth_limit(depth: usize) -> Self {
        Self {
            max_call_depth: Some(depth),
            ..Default::default()
        }
    }

    /// Limit the number of live handles
    pub fn with_handle_limit(handles: usize) -> Self {
        Self {
            max_handles: Some(handles),
            ..Default::default()
        }
    }
}

/// Options for creating a [`crate::Runtime`]
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// Resource limits
    pub limits: ResourceLimits,
}

impl RuntimeOptions {
    /// Options with the given limits
    pub fn with_limits(limits: ResourceLimits) -> Self {
        Self { limits }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unlimited() {
        let limits = ResourceLimits::default();
        assert_eq!(limits, ResourceLimits::unlimited());
        assert!(limits.max_stack_slots.is_none());
        assert!(limits.max_handles.is_none());
    }

    #[test]
    fn test_named_constructors() {
        assert_eq!(ResourceLimits::with_stack_limit(8).max_stack_slots, Some(8));
        assert_eq!(ResourceLimits::with_call_depth_limit(4).max_call_depth, Some(4));
        assert_eq!(ResourceLimits::with_handle_limit(2).max_handles, Some(2));

        let options = RuntimeOptions::with_limits(ResourceLimits::with_handle_limit(2));
        assert_eq!(options.limits.max_handles, Some(2));
    }
}
