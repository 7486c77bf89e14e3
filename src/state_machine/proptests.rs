//! Property-based tests for the AI state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::*;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_state() -> impl Strategy<Value = AiState> {
    proptest::sample::select(AiState::ALL.to_vec())
}

#[derive(Debug, Clone)]
enum Op {
    Transition(AiState, Option<String>),
    ClearError,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (arb_state(), proptest::option::of("[a-zA-Z ]{1,30}"))
            .prop_map(|(state, detail)| Op::Transition(state, detail)),
        1 => Just(Op::ClearError),
    ]
}

fn apply(machine: &mut AiStateMachine, op: Op) {
    match op {
        Op::Transition(state, detail) => machine.transition(state, detail),
        Op::ClearError => machine.clear_error(),
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Detail is only ever present in the error state
    #[test]
    fn prop_detail_only_in_error(ops in proptest::collection::vec(arb_op(), 0..30)) {
        let mut machine = AiStateMachine::new("conv");
        for op in ops {
            apply(&mut machine, op);
            if machine.current() != AiState::Error {
                prop_assert!(machine.error().is_none(), "detail leaked into {:?}", machine.current());
            }
        }
    }

    // Any transition lands exactly where it was asked to
    #[test]
    fn prop_transition_is_unconditional(from in arb_state(), to in arb_state()) {
        let mut machine = AiStateMachine::new("conv");
        machine.transition(from, None);
        machine.transition(to, None);
        prop_assert_eq!(machine.current(), to);
    }

    // Error is always recoverable, either by clear or by the next prompt
    #[test]
    fn prop_error_always_recoverable(detail in "[a-zA-Z ]{1,30}", next in arb_state()) {
        let mut machine = AiStateMachine::new("conv");
        machine.transition(AiState::Error, Some(detail.clone()));
        prop_assert_eq!(machine.status_text(), Some(detail));

        let mut cleared = machine.clone();
        cleared.clear_error();
        prop_assert_eq!(cleared.current(), AiState::Idle);
        prop_assert!(cleared.error().is_none());

        machine.transition(next, None);
        prop_assert_eq!(machine.current(), next);
    }

    // Status text is absent exactly when idle
    #[test]
    fn prop_status_text_absent_only_when_idle(state in arb_state()) {
        let mut machine = AiStateMachine::new("conv");
        machine.transition(state, None);
        prop_assert_eq!(machine.status_text().is_none(), state == AiState::Idle);
    }
}
