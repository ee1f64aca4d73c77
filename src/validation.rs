//! Meaningfulness gate for raw provider text
//!
//! Decides whether recognized text is substantive enough to accept. The gate
//! runs on the *raw* provider output: cleaning strips symbols and can make
//! noise look shorter and tidier than it really is.

/// Minimum number of non-whitespace characters
pub const MIN_NON_WHITESPACE_CHARS: usize = 5;
/// Minimum length of the longest run of consecutive alphabetic characters
pub const MIN_ALPHABETIC_RUN: usize = 2;
/// Alphanumeric share of non-whitespace characters that must be exceeded
pub const MIN_ALPHANUMERIC_RATIO: f32 = 0.7;

/// Why a piece of text failed the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    TooShort,
    NoAlphabeticRun,
    MostlyNoise,
}

/// Measured properties of a text and the gate verdict
#[derive(Debug, Clone, PartialEq)]
pub struct TextAssessment {
    pub non_whitespace_chars: usize,
    pub longest_alphabetic_run: usize,
    pub alphanumeric_ratio: f32,
    pub rejection: Option<Rejection>,
}

impl TextAssessment {
    pub fn is_meaningful(&self) -> bool {
        self.rejection.is_none()
    }
}

/// Measure a text against the gate rules
///
/// # Examples
/// ```
/// use chat_ocr::validation::{assess_text, Rejection};
///
/// let assessment = assess_text("!!?? ..");
/// assert_eq!(assessment.rejection, Some(Rejection::NoAlphabeticRun));
/// ```
pub fn assess_text(text: &str) -> TextAssessment {
    let mut non_whitespace = 0usize;
    let mut alphanumeric = 0usize;
    let mut longest_run = 0usize;
    let mut current_run = 0usize;

    for c in text.chars() {
        if c.is_alphabetic() {
            current_run += 1;
            longest_run = longest_run.max(current_run);
        } else {
            current_run = 0;
        }
        if c.is_whitespace() {
            continue;
        }
        non_whitespace += 1;
        if c.is_alphanumeric() {
            alphanumeric += 1;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let ratio = if non_whitespace == 0 {
        0.0
    } else {
        alphanumeric as f32 / non_whitespace as f32
    };

    let rejection = if non_whitespace < MIN_NON_WHITESPACE_CHARS {
        Some(Rejection::TooShort)
    } else if longest_run < MIN_ALPHABETIC_RUN {
        Some(Rejection::NoAlphabeticRun)
    } else if ratio <= MIN_ALPHANUMERIC_RATIO {
        Some(Rejection::MostlyNoise)
    } else {
        None
    };

    TextAssessment {
        non_whitespace_chars: non_whitespace,
        longest_alphabetic_run: longest_run,
        alphanumeric_ratio: ratio,
        rejection,
    }
}

/// Whether raw recognized text is substantive enough to accept
///
/// # Examples
/// ```
/// use chat_ocr::validation::is_meaningful;
///
/// assert!(!is_meaningful(""));
/// assert!(!is_meaningful("abcd"));
/// assert!(is_meaningful("Hello there"));
/// ```
pub fn is_meaningful(text: &str) -> bool {
    assess_text(text).is_meaningful()
}
