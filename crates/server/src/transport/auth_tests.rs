// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::{HeaderMap, HeaderValue};

use super::{constant_time_eq, validate_admin, validate_bearer, ADMIN_TOKEN_HEADER};
use crate::config::AdminPolicy;
use crate::error::ApiError;

fn headers(name: &'static str, value: &'static str) -> HeaderMap {
    let mut map = HeaderMap::new();
    map.insert(name, HeaderValue::from_static(value));
    map
}

#[test]
fn constant_time_eq_matches_equality() {
    assert!(constant_time_eq("secret", "secret"));
    assert!(!constant_time_eq("secret", "secreT"));
    assert!(!constant_time_eq("secret", "secret1"));
    assert!(constant_time_eq("", ""));
}

#[yare::parameterized(
    correct = { Some("s3cret"), Ok(()) },
    wrong = { Some("nope"), Err(ApiError::Unauthorized) },
    missing = { None, Err(ApiError::Unauthorized) },
)]
fn admin_token_policy(presented: Option<&'static str>, expected: Result<(), ApiError>) {
    let map = presented.map(|v| headers(ADMIN_TOKEN_HEADER, v)).unwrap_or_default();
    assert_eq!(validate_admin(&map, &AdminPolicy::Token("s3cret".to_owned())), expected);
}

#[test]
fn closed_policy_refuses_even_with_header() {
    let map = headers(ADMIN_TOKEN_HEADER, "anything");
    assert_eq!(validate_admin(&map, &AdminPolicy::Closed), Err(ApiError::NotConfigured));
    assert_eq!(validate_admin(&HeaderMap::new(), &AdminPolicy::Open), Ok(()));
}

#[test]
fn bearer_disabled_without_expected_token() {
    assert_eq!(validate_bearer(&HeaderMap::new(), None), Ok(()));
    assert_eq!(validate_bearer(&HeaderMap::new(), Some("")), Ok(()));
}

#[test]
fn bearer_checks_scheme_and_value() {
    let ok = headers("authorization", "Bearer tok");
    assert_eq!(validate_bearer(&ok, Some("tok")), Ok(()));

    let wrong = headers("authorization", "Bearer other");
    assert_eq!(validate_bearer(&wrong, Some("tok")), Err(ApiError::Unauthorized));

    let basic = headers("authorization", "Basic tok");
    assert_eq!(validate_bearer(&basic, Some("tok")), Err(ApiError::Unauthorized));
}
