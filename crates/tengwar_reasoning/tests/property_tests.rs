//! Property-based tests for the directive parser and thought pacing.

use proptest::prelude::*;
use tengwar_core::config::DaemonConfig;
use tengwar_core::EmotionalState;
use tengwar_reasoning::directive::{parse, ToolDirective};
use tengwar_reasoning::scheduler::ThoughtScheduler;

fn fragment() -> impl Strategy<Value = String> {
    prop_oneof![
        "\\PC{0,20}",
        Just("[READ:a.tw]".to_string()),
        Just("[LIST:src]".to_string()),
        Just("[GIT_STATUS]".to_string()),
        Just("[GIT_PUSH]".to_string()),
        Just("[GIT_COMMIT:msg]".to_string()),
        Just("[WRITE:f.md]\nbody [READ:x]\n[/WRITE]".to_string()),
        Just("[TENGWAR:(map sqr [1 2 3])]".to_string()),
        Just("```tengwar\n(+ 1 2)\n```".to_string()),
        Just("[EXEC:(".to_string()),
        Just("]".to_string()),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Spans are in textual order, disjoint, and slice cleanly.
    #[test]
    fn spans_ordered_and_disjoint(parts in prop::collection::vec(fragment(), 0..12)) {
        let text = parts.concat();
        let parsed = parse(&text);
        let mut last_end = 0;
        for d in &parsed {
            prop_assert!(d.span.start >= last_end);
            prop_assert!(d.span.start < d.span.end);
            prop_assert!(text.get(d.span.clone()).is_some());
            last_end = d.span.end;
        }
    }

    /// Text without brackets or fences has no directives.
    #[test]
    fn plain_text_has_no_directives(s in "[^\\[`]{0,300}") {
        prop_assert!(parse(&s).is_empty());
    }

    /// Every recognized directive in a concatenation is found, in order.
    #[test]
    fn simple_directives_all_found(n in 0usize..10) {
        let text = (0..n).map(|i| format!("x [READ:f{}.tw] y", i)).collect::<String>();
        let parsed = parse(&text);
        prop_assert_eq!(parsed.len(), n);
        for (i, d) in parsed.iter().enumerate() {
            prop_assert_eq!(&d.directive, &ToolDirective::ReadFile { path: format!("f{}.tw", i) });
        }
    }

    /// Paced intervals stay within [min, max + jitter] for any emotional state.
    #[test]
    fn interval_within_bounds(exc in 0.0f32..=1.0, cur in 0.0f32..=1.0) {
        let s = ThoughtScheduler::from_config(&DaemonConfig::default());
        let mut state = EmotionalState::default();
        state.excitement = exc;
        state.curiosity = cur;
        let d = s.next_interval(&state);
        prop_assert!(d >= s.min_interval);
        prop_assert!(d <= s.max_interval + s.jitter);
    }

    /// Backoff never decreases with more failures and never exceeds the cap.
    #[test]
    fn backoff_monotonic(k in 1u32..64) {
        let s = ThoughtScheduler::from_config(&DaemonConfig::default());
        prop_assert!(s.backoff(k) <= s.backoff(k + 1));
        prop_assert!(s.backoff(k) <= s.max_backoff);
    }
}
