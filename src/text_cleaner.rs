//! # Text Cleaner Module
//!
//! Deterministic normalization and artifact repair for recognized text.
//!
//! Passes, applied in order:
//!
//! 1. Collapse whitespace runs to a single space and trim
//! 2. Strip characters outside the allow-list (word characters and common punctuation)
//! 3. Collapse repeated terminal punctuation (`..`, `,,`, `!!`, `??`) to one
//! 4. Repair digit-for-letter confusions (`0`→`o`, `1`→`l`, `5`→`s`) inside words
//! 5. Lowercase mostly-uppercase tokens carrying stray lowercase letters
//!
//! Cleaning is total: if anything goes wrong internally the input is returned
//! unchanged, since slightly dirty text is more useful downstream than none.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{trace, warn};

use crate::ocr_config::CleanerConfig;

lazy_static! {
    static ref WHITESPACE_RUN: Regex =
        Regex::new(r"\s+").expect("Invalid whitespace regex pattern");
    static ref DISALLOWED_CHARS: Regex =
        Regex::new(r#"[^\w\s.,!?@#$%^&*()\-+=:;"']"#).expect("Invalid allow-list regex pattern");
    static ref REPEATED_PUNCTUATION: [(Regex, &'static str); 4] = [
        (Regex::new(r"\.{2,}").expect("Invalid period regex pattern"), "."),
        (Regex::new(r",{2,}").expect("Invalid comma regex pattern"), ","),
        (Regex::new(r"!{2,}").expect("Invalid exclamation regex pattern"), "!"),
        (Regex::new(r"\?{2,}").expect("Invalid question regex pattern"), "?"),
    ];
}

/// Digit-for-letter confusions repaired when surrounded by letters
const DIGIT_CONFUSIONS: [(char, char); 3] = [('0', 'o'), ('1', 'l'), ('5', 's')];

/// Minimum alphabetic length of a token considered for caps normalization
const CAPS_NOISE_MIN_LETTERS: usize = 3;

/// Text cleaner with configurable passes
#[derive(Debug, Clone, Default)]
pub struct TextCleaner {
    config: CleanerConfig,
}

impl TextCleaner {
    /// Create a cleaner with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cleaner with custom configuration
    pub fn with_config(config: CleanerConfig) -> Self {
        Self { config }
    }

    /// Clean recognized text. Never fails; returns the input on internal failure.
    pub fn clean(&self, text: &str) -> String {
        match std::panic::catch_unwind(|| self.apply_passes(text)) {
            Ok(cleaned) => {
                if cleaned != text {
                    trace!("Cleaned text: '{}' -> '{}'", text, cleaned);
                }
                cleaned
            }
            Err(_) => {
                warn!("Text cleaning failed internally, returning input unchanged");
                text.to_string()
            }
        }
    }

    fn apply_passes(&self, text: &str) -> String {
        let mut cleaned = collapse_whitespace(text);
        cleaned = strip_disallowed(&cleaned);
        cleaned = collapse_repeated_punctuation(&cleaned);
        if self.config.fix_digit_confusions {
            cleaned = fix_digit_confusions(&cleaned);
        }
        if self.config.normalize_caps_noise {
            cleaned = normalize_caps_noise(&cleaned);
        }
        // Stripping can leave doubled spaces behind
        collapse_whitespace(&cleaned)
    }
}

/// Clean text with the default cleaner configuration
///
/// # Examples
/// ```
/// use chat_ocr::text_cleaner::clean_text;
///
/// assert_eq!(clean_text("  Hey   how are you??  "), "Hey how are you?");
/// ```
pub fn clean_text(text: &str) -> String {
    TextCleaner::new().clean(text)
}

/// Pass 1: collapse whitespace runs to a single space and trim the ends
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text, " ").trim().to_string()
}

/// Pass 2: drop characters outside the allow-list
pub fn strip_disallowed(text: &str) -> String {
    DISALLOWED_CHARS.replace_all(text, "").into_owned()
}

/// Pass 3: collapse runs of the same terminal punctuation
pub fn collapse_repeated_punctuation(text: &str) -> String {
    let mut result = text.to_string();
    for (pattern, replacement) in REPEATED_PUNCTUATION.iter() {
        result = pattern.replace_all(&result, *replacement).into_owned();
    }
    result
}

/// Pass 4: repair digits that sit between two letters
pub fn fix_digit_confusions(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut result = String::with_capacity(text.len());

    for (i, &c) in chars.iter().enumerate() {
        let replacement = DIGIT_CONFUSIONS
            .iter()
            .find(|(digit, _)| *digit == c)
            .map(|(_, letter)| *letter);

        match replacement {
            Some(letter)
                if i > 0
                    && chars[i - 1].is_alphabetic()
                    && chars.get(i + 1).is_some_and(|next| next.is_alphabetic()) =>
            {
                result.push(letter);
            }
            _ => result.push(c),
        }
    }

    result
}

/// Pass 5: lowercase tokens that are mostly uppercase with some lowercase noise
pub fn normalize_caps_noise(text: &str) -> String {
    text.split(' ')
        .map(|token| {
            if is_caps_noise(token) {
                token.to_lowercase()
            } else {
                token.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_caps_noise(token: &str) -> bool {
    let upper = token.chars().filter(|c| c.is_uppercase()).count();
    let lower = token.chars().filter(|c| c.is_lowercase()).count();
    let letters = token.chars().filter(|c| c.is_alphabetic()).count();

    letters >= CAPS_NOISE_MIN_LETTERS && lower > 0 && upper > lower
}
