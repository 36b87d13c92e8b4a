//! Property-based tests for pgfleet-common.

use pgfleet_common::{Counter, ErrorClass, Gauge};
use proptest::prelude::*;

fn class_strategy() -> impl Strategy<Value = ErrorClass> {
    prop_oneof![
        Just(ErrorClass::NotFound),
        Just(ErrorClass::Validation),
        Just(ErrorClass::Conflict),
        Just(ErrorClass::Upstream),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Only upstream failures are fatal; everything else is answered to the caller.
    #[test]
    fn prop_only_upstream_is_fatal(class in class_strategy()) {
        prop_assert_eq!(class.is_caller_error(), class != ErrorClass::Upstream);
    }

    /// A counter equals the sum of its increments.
    #[test]
    fn prop_counter_sums_increments(steps in prop::collection::vec(0u64..1_000, 0..50)) {
        let counter = Counter::new("c_total", "c");
        for step in &steps {
            counter.inc_by(*step);
        }
        prop_assert_eq!(counter.get(), steps.iter().sum::<u64>());
    }

    /// Decrements never wrap below zero.
    #[test]
    fn prop_gauge_never_underflows(incs in 0usize..20, decs in 0usize..40) {
        let gauge = Gauge::new("g", "g");
        for _ in 0..incs {
            gauge.inc();
        }
        for _ in 0..decs {
            gauge.dec();
        }
        prop_assert_eq!(gauge.get(), incs.saturating_sub(decs) as u64);
    }
}
