//! Worker pool sizing.
//!
//! Image conversions are many short-lived child processes, so the pool is as
//! wide as the machine unless the operator asks otherwise. The result is
//! always clamped to `[1, MAX_PARALLELISM]`.

/// Upper bound on concurrent conversions, regardless of core count.
pub const MAX_PARALLELISM: usize = 32;

/// Pool width for a batch: the explicit request when given, otherwise the
/// number of logical CPUs.
pub fn resolve_parallelism(requested: Option<usize>) -> usize {
    let raw = requested.unwrap_or_else(num_cpus::get);
    let resolved = raw.clamp(1, MAX_PARALLELISM);
    if resolved != raw {
        tracing::debug!(requested = raw, resolved, "Parallelism clamped");
    }
    resolved
}

/// Never spin up more workers than there is work for.
pub fn effective_workers(parallelism: usize, candidates: usize) -> usize {
    parallelism.min(candidates).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_uses_cpu_count() {
        let n = resolve_parallelism(None);
        assert_eq!(n, num_cpus::get().clamp(1, MAX_PARALLELISM));
    }

    #[test]
    fn test_explicit_request_is_clamped() {
        assert_eq!(resolve_parallelism(Some(0)), 1);
        assert_eq!(resolve_parallelism(Some(4)), 4);
        assert_eq!(resolve_parallelism(Some(1000)), MAX_PARALLELISM);
    }

    #[test]
    fn test_effective_workers() {
        assert_eq!(effective_workers(8, 3), 3);
        assert_eq!(effective_workers(8, 0), 1);
        assert_eq!(effective_workers(2, 50), 2);
    }

    proptest! {
        #[test]
        fn prop_parallelism_always_in_bounds(requested in proptest::option::of(0usize..10_000)) {
            let n = resolve_parallelism(requested);
            prop_assert!((1..=MAX_PARALLELISM).contains(&n));
        }
    }
}
