// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message names: `$.<segment>(.<segment>)*`, optionally wildcarded with a
//! trailing `.*` or `.%`. See `spec.md` §3 "Message name" and §4.2 "Name
//! matching".
//!
//! Names are reference-counted, matching the teacher's message-store design
//! note in `spec.md` §9 ("Names are a separate reference-counted string
//! type").

use std::sync::Arc;

use crate::error::KbusError;

pub const MIN_NAME_LEN: usize = 3;
pub const MAX_NAME_LEN: usize = 1000;

/// How specific a binding pattern is, used to pick the replier when several
/// replier bindings match the same sent name. Ord is significant: higher
/// values win.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Specificity {
    StarWildcard,
    PercentWildcard,
    Exact,
}

/// A reference-counted message name or binding pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name(Arc<str>);

enum WildcardKind {
    None,
    Star,
    Percent,
}

impl Name {
    /// Parse and validate `raw` as a binding pattern: may be wildcarded.
    pub fn parse_for_bind(raw: &str) -> Result<Self, KbusError> {
        Self::validate(raw, true)?;
        Ok(Name(Arc::from(raw)))
    }

    /// Parse and validate `raw` as a name suitable for `send`: must not be
    /// wildcarded.
    pub fn parse_for_send(raw: &str) -> Result<Self, KbusError> {
        Self::validate(raw, false)?;
        Ok(Name(Arc::from(raw)))
    }

    fn validate(raw: &str, allow_wildcard: bool) -> Result<(), KbusError> {
        if raw.len() > MAX_NAME_LEN {
            return Err(KbusError::NameTooLong);
        }
        if raw.len() < MIN_NAME_LEN {
            return Err(KbusError::BadName);
        }
        let (prefix, kind) = split_wildcard(raw);
        if !allow_wildcard && !matches!(kind, WildcardKind::None) {
            return Err(KbusError::BadName);
        }
        if !prefix_is_valid(prefix) {
            return Err(KbusError::BadName);
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str { &self.0 }

    pub fn is_wildcard(&self) -> bool { !matches!(split_wildcard(&self.0).1, WildcardKind::None) }

    pub fn specificity(&self) -> Specificity {
        match split_wildcard(&self.0).1 {
            WildcardKind::None => Specificity::Exact,
            WildcardKind::Percent => Specificity::PercentWildcard,
            WildcardKind::Star => Specificity::StarWildcard,
        }
    }

    /// `self` is treated as a binding pattern; `candidate` is a concrete,
    /// non-wildcard message name. Exact patterns match byte-for-byte;
    /// `prefix.*` matches any name beginning with `prefix.` (one or more
    /// further bytes, dots unrestricted); `prefix.%` matches only names with
    /// no further dot after the prefix.
    pub fn matches(&self, candidate: &Name) -> bool {
        let (prefix, kind) = split_wildcard(&self.0);
        match kind {
            WildcardKind::None => self.0.as_ref() == candidate.0.as_ref(),
            WildcardKind::Star | WildcardKind::Percent => {
                let search = format!("{prefix}.");
                let Some(rest) = candidate.0.strip_prefix(search.as_str()) else {
                    return false;
                };
                if rest.is_empty() {
                    return false;
                }
                match kind {
                    WildcardKind::Star => true,
                    WildcardKind::Percent => !rest.contains('.'),
                    WildcardKind::None => unreachable!(),
                }
            }
        }
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) }
}

fn split_wildcard(raw: &str) -> (&str, WildcardKind) {
    if let Some(prefix) = raw.strip_suffix(".*") {
        (prefix, WildcardKind::Star)
    } else if let Some(prefix) = raw.strip_suffix(".%") {
        (prefix, WildcardKind::Percent)
    } else {
        (raw, WildcardKind::None)
    }
}

/// `prefix` is either the bare `$` (the universal wildcard base) or a full
/// `$.<segment>(.<segment>)*` name.
fn prefix_is_valid(prefix: &str) -> bool {
    if prefix == "$" {
        return true;
    }
    let Some(rest) = prefix.strip_prefix("$.") else {
        return false;
    };
    if rest.is_empty() {
        return false;
    }
    rest.split('.').all(|segment| !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_alphanumeric()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_and_unprefixed_names() {
        assert_eq!(Name::parse_for_send("$.").unwrap_err(), KbusError::BadName);
        assert_eq!(Name::parse_for_send("Foo.Bar").unwrap_err(), KbusError::BadName);
        assert_eq!(Name::parse_for_send("$A").unwrap_err(), KbusError::BadName);
    }

    #[test]
    fn accepts_minimal_name() {
        assert!(Name::parse_for_send("$.A").is_ok());
    }

    #[test]
    fn rejects_oversized_name() {
        let raw = format!("$.{}", "a".repeat(MAX_NAME_LEN));
        assert_eq!(Name::parse_for_send(&raw).unwrap_err(), KbusError::NameTooLong);
    }

    #[test]
    fn send_rejects_wildcards() {
        assert_eq!(Name::parse_for_send("$.Foo.*").unwrap_err(), KbusError::BadName);
        assert_eq!(Name::parse_for_send("$.Foo.%").unwrap_err(), KbusError::BadName);
    }

    #[test]
    fn bind_accepts_universal_wildcard() {
        let pat = Name::parse_for_bind("$.*").unwrap();
        assert!(pat.is_wildcard());
        let name = Name::parse_for_send("$.Foo.Bar").unwrap();
        assert!(pat.matches(&name));
    }

    #[test]
    fn star_matches_any_further_dots_percent_does_not() {
        let star = Name::parse_for_bind("$.Foo.*").unwrap();
        let percent = Name::parse_for_bind("$.Foo.%").unwrap();
        let one_level = Name::parse_for_send("$.Foo.Bar").unwrap();
        let two_level = Name::parse_for_send("$.Foo.Bar.Baz").unwrap();

        assert!(star.matches(&one_level));
        assert!(star.matches(&two_level));
        assert!(percent.matches(&one_level));
        assert!(!percent.matches(&two_level));
    }

    #[test]
    fn wildcard_requires_at_least_one_more_byte() {
        let star = Name::parse_for_bind("$.Foo.*").unwrap();
        let exact = Name::parse_for_send("$.Foo").unwrap();
        assert!(!star.matches(&exact));
    }

    #[test]
    fn specificity_orders_exact_over_percent_over_star() {
        assert!(Specificity::Exact > Specificity::PercentWildcard);
        assert!(Specificity::PercentWildcard > Specificity::StarWildcard);
    }
}
