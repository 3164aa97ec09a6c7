//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across arbitrary event sequences.

use super::state::*;
use super::transition::*;
use super::*;
use crate::llm::GenerationOptions;
use proptest::prelude::*;
use std::time::Duration;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context() -> ConvContext {
    ConvContext::new("test-session", Duration::from_millis(2000))
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_options() -> impl Strategy<Value = GenerationOptions> {
    (10u32..=8192, 0u32..=200).prop_map(|(max_output_tokens, top_k)| GenerationOptions {
        max_output_tokens,
        top_k,
        ..Default::default()
    })
}

fn arb_settings() -> impl Strategy<Value = SessionSettings> {
    (arb_options(), any::<bool>(), any::<bool>()).prop_map(
        |(options, mirror_enabled, tts_enabled)| SessionSettings {
            options,
            mirror_enabled,
            tts_enabled,
        },
    )
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        arb_settings().prop_map(|settings| Event::SettingsChanged { settings }),
        ("(물|불|바람|흙|하늘)( [가-힣]{1,5}){0,2}|[ ]{0,3}", arb_settings())
            .prop_map(|(text, settings)| Event::UserMessage { text, settings }),
        Just(Event::StartSoliloquy),
        Just(Event::StopSoliloquy),
        (0u64..4).prop_map(|epoch| Event::SoliloquyTick { epoch }),
        "[가-힣 ]{1,20}".prop_map(|text| Event::GenerationComplete { text }),
        "[a-z ]{1,20}".prop_map(|message| Event::GenerationFailed { message }),
    ]
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Every message appended is logged by the same transition
    #[test]
    fn appends_always_logged(events in prop::collection::vec(arb_event(), 0..40)) {
        let ctx = test_context();
        let mut state = ConvState::default();
        for event in events {
            if let Ok(result) = transition(&state, &ctx, event) {
                let appends = result
                    .effects
                    .iter()
                    .filter(|e| matches!(e, Effect::AppendMessage { .. }))
                    .count();
                let logs = result
                    .effects
                    .iter()
                    .filter(|e| matches!(e, Effect::WriteLog { .. }))
                    .count();
                prop_assert_eq!(logs, usize::from(appends > 0));
                state = result.new_state;
            }
        }
    }

    /// At most one generation is requested per transition, and only when
    /// nothing else is in flight
    #[test]
    fn single_generation_in_flight(events in prop::collection::vec(arb_event(), 0..40)) {
        let ctx = test_context();
        let mut state = ConvState::default();
        for event in events {
            let was_working = state.is_working();
            if let Ok(result) = transition(&state, &ctx, event) {
                let requests = result
                    .effects
                    .iter()
                    .filter(|e| matches!(e, Effect::RequestGeneration { .. }))
                    .count();
                prop_assert!(requests <= 1);
                if requests == 1 {
                    prop_assert!(!was_working);
                    prop_assert!(result.new_state.is_working());
                }
                state = result.new_state;
            }
        }
    }

    /// Ticks are only scheduled while the soliloquy is running
    #[test]
    fn ticks_only_while_active(events in prop::collection::vec(arb_event(), 0..40)) {
        let ctx = test_context();
        let mut state = ConvState::default();
        for event in events {
            if let Ok(result) = transition(&state, &ctx, event) {
                let ticks = result
                    .effects
                    .iter()
                    .any(|e| matches!(e, Effect::ScheduleSoliloquyTick { .. }));
                if ticks {
                    prop_assert!(result.new_state.soliloquy_running());
                }
                state = result.new_state;
            }
        }
    }

    /// Every scheduled tick belongs to the current cycle, and ticks from any
    /// other cycle change nothing
    #[test]
    fn ticks_bound_to_current_epoch(events in prop::collection::vec(arb_event(), 0..40)) {
        let ctx = test_context();
        let mut state = ConvState::default();
        for event in events {
            let stale = matches!(
                event,
                Event::SoliloquyTick { epoch } if epoch != state.soliloquy_epoch
            );
            if let Ok(result) = transition(&state, &ctx, event) {
                if stale {
                    prop_assert_eq!(&result.new_state, &state);
                    prop_assert!(result.effects.is_empty());
                }
                for effect in &result.effects {
                    if let Effect::ScheduleSoliloquyTick { epoch, .. } = effect {
                        prop_assert_eq!(*epoch, result.new_state.soliloquy_epoch);
                    }
                }
                state = result.new_state;
            }
        }
    }

    /// Start and stop are idempotent from any reachable state
    #[test]
    fn start_stop_idempotent(events in prop::collection::vec(arb_event(), 0..20)) {
        let ctx = test_context();
        let mut state = ConvState::default();
        for event in events {
            if let Ok(result) = transition(&state, &ctx, event) {
                state = result.new_state;
            }
        }

        let started = transition(&state, &ctx, Event::StartSoliloquy).unwrap().new_state;
        let again = transition(&started, &ctx, Event::StartSoliloquy).unwrap();
        prop_assert_eq!(&again.new_state, &started);
        prop_assert!(again.effects.is_empty());

        let stopped = transition(&started, &ctx, Event::StopSoliloquy).unwrap().new_state;
        prop_assert_eq!(stopped.mode, Mode::Idle);
        let again = transition(&stopped, &ctx, Event::StopSoliloquy).unwrap();
        prop_assert_eq!(&again.new_state, &stopped);
        prop_assert!(again.effects.is_empty());
    }

    /// User messages keep their relative order with their replies
    #[test]
    fn user_then_assistant(
        text in "(물|불|바람) [가-힣]{1,8}",
        reply in "[가-힣]{1,10}",
        settings in arb_settings(),
    ) {
        let ctx = test_context();
        let pending = transition(
            &ConvState::default(),
            &ctx,
            Event::UserMessage { text: text.clone(), settings },
        ).unwrap().new_state;
        let done = transition(&pending, &ctx, Event::GenerationComplete { text: reply }).unwrap();

        let roles: Vec<Role> = done
            .effects
            .iter()
            .filter_map(|e| match e {
                Effect::AppendMessage { message } => Some(message.role),
                _ => None,
            })
            .collect();
        prop_assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }
}
