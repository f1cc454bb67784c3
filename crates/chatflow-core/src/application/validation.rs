//! Question answer validation
//!
//! Fixed-format matching for the validator kinds a question node may
//! configure. `None` passes everything through.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::flow_graph::AnswerValidation;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern"));

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9 ().-]{6,19}$").expect("valid phone pattern"));

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^\s]+\.[^\s]+$").expect("valid url pattern"));

/// Check an answer against the configured validator
pub fn validate_answer(validation: AnswerValidation, raw: &str) -> bool {
    let answer = raw.trim();
    match validation {
        AnswerValidation::None => true,
        AnswerValidation::Email => EMAIL_RE.is_match(answer),
        AnswerValidation::PhoneNumber => PHONE_RE.is_match(answer),
        AnswerValidation::Url => URL_RE.is_match(answer),
    }
}
