//! Property tests for routing, validation and rate limiting.
//!
//! These check cross-module invariants over generated routes, schemas and
//! request sequences.

use std::sync::Arc;
use std::time::Duration;

use invocation_core::middleware::{RateDecision, RateLimitConfig, RateLimiter};
use invocation_core::validation::Schema;
use invocation_core::{Body, ManualClock, Params, PathPattern, RequestContext, Response, Router};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

// Strategy: a path segment that is never empty
fn arb_segment() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,6}").unwrap()
}

// Strategy: a pattern segment, literal or capture
fn arb_pattern_segment() -> impl Strategy<Value = (bool, String)> {
    (any::<bool>(), arb_segment())
}

fn build_pattern(segments: &[(bool, String)]) -> String {
    segments
        .iter()
        .enumerate()
        .map(|(i, (capture, name))| {
            if *capture {
                format!("/:{name}{i}")
            } else {
                format!("/{name}")
            }
        })
        .collect()
}

fn route_index(res: &Response) -> u64 {
    match &res.body {
        Body::Json(v) => v["data"].as_u64().unwrap(),
        other => panic!("expected json body, got {other:?}"),
    }
}

// Strategy: a value that passes or fails `required|string|min:3`
fn arb_field_value() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        Just(None),
        Just(Some(Value::Null)),
        any::<i32>().prop_map(|n| Some(json!(n))),
        prop::string::string_regex("[a-z]{0,6}").unwrap().prop_map(|s| Some(json!(s))),
    ]
}

fn expected_message(field: &str, value: &Option<Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => Some(format!("{field} is required")),
        Some(Value::String(s)) if s.is_empty() => Some(format!("{field} is required")),
        Some(Value::String(s)) if s.chars().count() < 3 => {
            Some(format!("{field} must be at least 3 characters"))
        }
        Some(Value::String(_)) => None,
        Some(_) => Some(format!("{field} must be a string")),
    }
}

proptest! {
    /// Property: dispatch picks the first registered route that matches
    ///
    /// Every generated route is registered in order; dispatching a path
    /// built to match route `target` must land on the lowest-index route
    /// whose pattern also matches it.
    #[test]
    fn proptest_dispatch_is_first_match(
        patterns in prop::collection::vec(prop::collection::vec(arb_pattern_segment(), 1..4), 1..6),
        target in any::<prop::sample::Index>(),
        fill in arb_segment(),
    ) {
        let patterns: Vec<String> = patterns.iter().map(|p| build_pattern(p)).collect();
        let mut router = Router::new();
        for (i, pattern) in patterns.iter().enumerate() {
            router
                .get(pattern, move |_: &mut RequestContext, _: &Params| {
                    Ok(Response::success(json!(i)))
                })
                .unwrap();
        }

        let target = target.index(patterns.len());
        let path: String = patterns[target]
            .split('/')
            .skip(1)
            .map(|seg| if seg.starts_with(':') { format!("/{fill}") } else { format!("/{seg}") })
            .collect();

        let expected = patterns
            .iter()
            .position(|p| PathPattern::parse(p).unwrap().matches(&path).is_some())
            .unwrap();

        let mut ctx = RequestContext::new("GET", path.clone());
        let res = router.dispatch(&mut ctx).unwrap();
        prop_assert_eq!(route_index(&res), expected as u64);
        prop_assert!(expected <= target);
    }

    /// Property: a request matching no route yields 404
    #[test]
    fn proptest_unmatched_method_is_not_found(
        segments in prop::collection::vec(arb_segment(), 1..4),
    ) {
        let path: String = segments.iter().map(|s| format!("/{s}")).collect();
        let mut router = Router::new();
        router
            .get(&path, |_: &mut RequestContext, _: &Params| Ok(Response::empty()))
            .unwrap();

        let mut ctx = RequestContext::new("POST", path);
        prop_assert_eq!(router.dispatch(&mut ctx).unwrap_err().status(), 404);
    }

    /// Property: the aggregated error has exactly the failing fields, each
    /// with the message of its first failing rule
    #[test]
    fn proptest_validation_reports_first_failure_per_field(
        values in prop::collection::vec(arb_field_value(), 1..6),
    ) {
        let fields: Vec<String> = (0..values.len()).map(|i| format!("f{i}")).collect();
        let schema = Schema::parse(fields.iter().map(|f| (f.clone(), "required|string|min:3"))).unwrap();

        let mut data = Map::new();
        for (field, value) in fields.iter().zip(&values) {
            if let Some(v) = value {
                data.insert(field.clone(), v.clone());
            }
        }

        let errors = schema.check(&Value::Object(data));
        for (field, value) in fields.iter().zip(&values) {
            let reported = errors.messages(field).map(<[String]>::to_vec);
            let expected = expected_message(field, value).map(|m| vec![m]);
            prop_assert_eq!(reported, expected);
        }
    }

    /// Property: within one window at most `max` requests are allowed, and
    /// denials never raise the stored count above `max`
    #[test]
    fn proptest_fixed_window_never_exceeds_max(
        max in 1u32..10,
        calls in 1usize..40,
        step_secs in 0u64..5,
    ) {
        let clock = ManualClock::new();
        let limiter = RateLimiter::with_clock(
            RateLimitConfig { max_requests: max, window_minutes: 60 },
            Arc::new(clock.clone()),
        );

        let mut allowed = 0u32;
        for _ in 0..calls {
            if matches!(limiter.check("p"), RateDecision::Allowed { .. }) {
                allowed += 1;
            }
            clock.advance(Duration::from_secs(step_secs));
        }

        prop_assert_eq!(allowed, max.min(calls as u32));
        prop_assert!(limiter.current_count("p") <= max);
    }
}
