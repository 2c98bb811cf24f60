//! Phone address normalization and comparison
//!
//! Record stores, the address book and the carrier all format numbers
//! differently ("(919) 555-0123", "+19195550123", "9195550123"). Comparison
//! therefore works on digits only and accepts a suffix match, so a locally
//! stored 10-digit number equals its E.164 form.

use std::collections::BTreeSet;

/// Minimum digit count before a free-text string is trusted as a phone number
pub const MIN_PHONE_DIGITS: usize = 7;

/// Strip everything but ASCII digits
pub fn normalize(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Loose equality between two addresses
///
/// Suffix matching can produce false positives for very short numbers;
/// callers matching free text should check [`looks_like_phone_number`]
/// first. Addresses without digits (short-code names, emails) never match.
pub fn addresses_match(a: &str, b: &str) -> bool {
    normalized_match(&normalize(a), &normalize(b))
}

fn normalized_match(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || a.ends_with(b) || b.ends_with(a)
}

/// Whether `text` carries enough digits to be matched as a phone number
pub fn looks_like_phone_number(text: &str) -> bool {
    normalize(text).len() >= MIN_PHONE_DIGITS
}

/// The device owner's own numbers, normalized
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelfNumbers {
    numbers: BTreeSet<String>,
}

impl SelfNumbers {
    /// Build from raw numbers, dropping blanks and entries without digits
    pub fn new<I, S>(numbers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let numbers = numbers
            .into_iter()
            .map(|n| normalize(n.as_ref()))
            .filter(|n| !n.is_empty())
            .collect();
        Self { numbers }
    }

    /// Union platform-reported numbers with a configured fallback
    ///
    /// Some devices refuse to disclose their own number, so the fallback is
    /// always added when present.
    pub fn discover(reported: Vec<String>, fallback: Option<&str>) -> Self {
        Self::new(reported.iter().map(String::as_str).chain(fallback))
    }

    /// Whether `address` belongs to the device owner
    pub fn is_self(&self, address: &str) -> bool {
        let normalized = normalize(address);
        self.numbers
            .iter()
            .any(|own| normalized_match(&normalized, own))
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }
}
