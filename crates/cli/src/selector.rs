//! `-l` label selector terms, kubectl-style.

use std::collections::BTreeSet;

use anyhow::{bail, Result};
use keel_core::LabelMatcher;

/// Parse one term: `k=v`, `k==v`, `k!=v`, `k`, `!k`, `k in (a,b)`, `k notin (a,b)`.
pub fn parse_term(term: &str) -> Result<(String, LabelMatcher)> {
    let term = term.trim();
    if term.is_empty() {
        bail!("empty label selector");
    }
    if let Some((key, op, set)) = split_set_term(term) {
        let values = parse_set(set.trim(), term)?;
        let key = valid_key(key, term)?;
        return Ok(match op {
            SetOp::In => (key, LabelMatcher::In(values)),
            SetOp::NotIn => (key, LabelMatcher::NotIn(values)),
        });
    }
    if let Some((key, value)) = term.split_once("!=") {
        return Ok((valid_key(key, term)?, LabelMatcher::NotEquals(value.trim().to_string())));
    }
    if let Some((key, value)) = term.split_once('=') {
        let value = value.strip_prefix('=').unwrap_or(value);
        return Ok((valid_key(key, term)?, LabelMatcher::Equals(value.trim().to_string())));
    }
    if let Some(key) = term.strip_prefix('!') {
        return Ok((valid_key(key, term)?, LabelMatcher::DoesNotExist));
    }
    Ok((valid_key(term, term)?, LabelMatcher::Exists))
}

enum SetOp { In, NotIn }

/// `key in (..)` / `key notin (..)`; anything else is left to the equality and existence forms.
fn split_set_term(term: &str) -> Option<(&str, SetOp, &str)> {
    let (key, rest) = term.split_once(char::is_whitespace)?;
    let rest = rest.trim_start();
    let (op, set) = match rest.strip_prefix("notin") {
        Some(set) => (SetOp::NotIn, set),
        None => (SetOp::In, rest.strip_prefix("in")?),
    };
    set.starts_with(|c: char| c.is_whitespace() || c == '(').then_some((key, op, set))
}

fn valid_key(key: &str, term: &str) -> Result<String> {
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        bail!("invalid label key in selector: {}", term);
    }
    Ok(key.to_string())
}

fn parse_set(raw: &str, term: &str) -> Result<BTreeSet<String>> {
    let Some(inner) = raw.strip_prefix('(').and_then(|r| r.strip_suffix(')')) else {
        bail!("expected (a,b,...) in label selector: {}", term);
    };
    Ok(inner.split(',').map(str::trim).filter(|v| !v.is_empty()).map(str::to_string).collect())
}
