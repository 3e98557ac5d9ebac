//! PII redaction applied to every ticket before any remote capability sees it.
//!
//! Patterns run in a fixed order (email, phone, payment card, national id)
//! and each match is replaced by a bracketed placeholder. Placeholders never
//! match any pattern, and [`redact`] iterates to a fixed point, so
//! `redact(redact(x)) == redact(x)` for every input.

use std::borrow::Cow;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}\b")
        .expect("EMAIL regex should compile")
});

// `+` country code with or without separators, ten-digit national form with
// an optional separated prefix, 11 to 13 bare digits (country code glued to
// the national number), or a seven-digit local number with a separator.
static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?:\+\d{1,3}[\-. ]*\(?\d{3}\)?[\-. ]*\d{3}[\-. ]*\d{4}",
        r"|(?:\b\d{1,3}[\-. ])?\(?\b\d{3}\)?[\-. ]*\d{3}[\-. ]*\d{4}",
        r"|\b\d{11,13}",
        r"|\b\d{3}[\-. ]\d{4})\b",
    ))
    .expect("PHONE regex should compile")
});

static PAYMENT_CARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\d{4}[\- ]){3}\d{4}\b|\b\d{16}\b")
        .expect("PAYMENT_CARD regex should compile")
});

static NATIONAL_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("NATIONAL_ID regex should compile")
});

/// Categories of personally identifying information the redactor removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiCategory {
    Email,
    Phone,
    PaymentCard,
    NationalId,
}

impl PiiCategory {
    /// Application order.
    pub const ALL: [PiiCategory; 4] = [
        PiiCategory::Email,
        PiiCategory::Phone,
        PiiCategory::PaymentCard,
        PiiCategory::NationalId,
    ];

    pub fn placeholder(self) -> &'static str {
        match self {
            Self::Email => "[EMAIL_REDACTED]",
            Self::Phone => "[PHONE_REDACTED]",
            Self::PaymentCard => "[CREDIT_CARD_REDACTED]",
            Self::NationalId => "[NATIONAL_ID_REDACTED]",
        }
    }

    fn pattern(self) -> &'static Regex {
        match self {
            Self::Email => &EMAIL,
            Self::Phone => &PHONE,
            Self::PaymentCard => &PAYMENT_CARD,
            Self::NationalId => &NATIONAL_ID,
        }
    }
}

impl fmt::Display for PiiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Email => write!(f, "email"),
            Self::Phone => write!(f, "phone"),
            Self::PaymentCard => write!(f, "payment_card"),
            Self::NationalId => write!(f, "national_id"),
        }
    }
}

/// What a redaction pass found. Counts only; matched text is never kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionSummary {
    pub matches: Vec<(PiiCategory, usize)>,
}

impl RedactionSummary {
    pub fn found_any(&self) -> bool {
        self.matches.iter().any(|(_, n)| *n > 0)
    }

    pub fn total(&self) -> usize {
        self.matches.iter().map(|(_, n)| n).sum()
    }

    pub fn count(&self, category: PiiCategory) -> usize {
        self.matches
            .iter()
            .filter(|(c, _)| *c == category)
            .map(|(_, n)| n)
            .sum()
    }
}

fn redact_pass(text: &str, summary: &mut RedactionSummary) -> String {
    let mut current = text.to_string();
    for category in PiiCategory::ALL {
        let pattern = category.pattern();
        let hits = pattern.find_iter(&current).count();
        if hits == 0 {
            continue;
        }
        current = pattern
            .replace_all(&current, category.placeholder())
            .into_owned();
        match summary.matches.iter_mut().find(|(c, _)| *c == category) {
            Some((_, n)) => *n += hits,
            None => summary.matches.push((category, hits)),
        }
    }
    current
}

fn redact_with_summary(text: &str) -> (Cow<'_, str>, RedactionSummary) {
    let mut summary = RedactionSummary::default();
    if text.is_empty() {
        return (Cow::Borrowed(text), summary);
    }
    let mut current = redact_pass(text, &mut summary);
    if !summary.found_any() {
        return (Cow::Borrowed(text), summary);
    }
    // Every replacement strictly removes digits or '@', so this terminates.
    loop {
        let before = summary.total();
        let next = redact_pass(&current, &mut summary);
        if summary.total() == before {
            break;
        }
        current = next;
    }
    (Cow::Owned(current), summary)
}

/// Replace every recognised PII span with its placeholder.
///
/// Pure and total: empty input and input without PII are returned borrowed
/// and unchanged.
pub fn redact(text: &str) -> Cow<'_, str> {
    redact_with_summary(text).0
}

/// Report what [`redact`] would replace without building the output for callers.
pub fn scan(text: &str) -> RedactionSummary {
    redact_with_summary(text).1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_email() {
        assert_eq!(
            redact("Contact bob.smith+help@example.co.uk today"),
            "Contact [EMAIL_REDACTED] today"
        );
    }

    #[test]
    fn redacts_phone_formats() {
        assert_eq!(redact("call 555-123-4567"), "call [PHONE_REDACTED]");
        assert_eq!(redact("call (555) 123-4567 now"), "call [PHONE_REDACTED] now");
        assert_eq!(redact("call +1 555 123 4567"), "call [PHONE_REDACTED]");
        assert_eq!(redact("desk 555-0199"), "desk [PHONE_REDACTED]");
    }

    #[test]
    fn redacts_phone_with_compact_country_code() {
        assert_eq!(redact("call +15551234567 now"), "call [PHONE_REDACTED] now");
        assert_eq!(redact("call 15551234567 now"), "call [PHONE_REDACTED] now");
        assert_eq!(redact("call +33612345678 now"), "call [PHONE_REDACTED] now");
        assert_eq!(redact("call +1(555)123-4567"), "call [PHONE_REDACTED]");
        assert_eq!(scan("call +15551234567 now").count(PiiCategory::Phone), 1);
    }

    #[test]
    fn redacts_payment_cards() {
        assert_eq!(
            redact("card 4111 1111 1111 1111 declined"),
            "card [CREDIT_CARD_REDACTED] declined"
        );
        assert_eq!(
            redact("card 4111-1111-1111-1111"),
            "card [CREDIT_CARD_REDACTED]"
        );
        assert_eq!(redact("card 4111111111111111"), "card [CREDIT_CARD_REDACTED]");
    }

    #[test]
    fn redacts_national_id() {
        assert_eq!(redact("ssn 123-45-6789"), "ssn [NATIONAL_ID_REDACTED]");
    }

    #[test]
    fn redacts_mixed_text() {
        let input = "I am jane@example.com, phone 555-123-4567, card 4111 1111 1111 1111, id 123-45-6789.";
        let out = redact(input);
        assert_eq!(
            out,
            "I am [EMAIL_REDACTED], phone [PHONE_REDACTED], card [CREDIT_CARD_REDACTED], id [NATIONAL_ID_REDACTED]."
        );
        let summary = scan(input);
        assert_eq!(summary.total(), 4);
        assert_eq!(summary.count(PiiCategory::Email), 1);
        assert_eq!(summary.count(PiiCategory::NationalId), 1);
    }

    #[test]
    fn redaction_is_idempotent() {
        let inputs = [
            "mail a@b.io and x@y.com",
            "numbers 555-123-4567 4111111111111111 123-45-6789",
            "intl +15551234567 and 15551234567",
            "no pii at all",
            "",
        ];
        for input in inputs {
            let once = redact(input).into_owned();
            let twice = redact(&once).into_owned();
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn clean_text_is_borrowed_unchanged() {
        let text = "My password reset link does not work";
        assert!(matches!(redact(text), Cow::Borrowed(t) if t == text));
        assert!(!scan(text).found_any());
    }

    #[test]
    fn empty_input_is_unchanged() {
        assert_eq!(redact(""), "");
        assert_eq!(scan("").total(), 0);
    }

    #[test]
    fn placeholders_never_rematch() {
        for category in PiiCategory::ALL {
            assert!(!scan(category.placeholder()).found_any());
        }
    }

    #[test]
    fn short_numbers_are_left_alone() {
        assert_eq!(redact("error 404 on page 12"), "error 404 on page 12");
    }
}
