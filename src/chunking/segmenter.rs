//! Sentence boundary detection seam.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use crate::types::RagstoreError;

/// How the source text should be prepared before segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentMode {
    #[default]
    Plain,
    /// PDF-extracted text: repair hyphenated line wraps and unwrap hard line
    /// breaks before segmenting.
    Pdf,
}

/// Language-aware sentence boundary detector.
///
/// Implementations may fail on unsupported input; callers fall back to plain
/// token-window chunking when that happens.
pub trait SentenceSegmenter: Send + Sync {
    /// Splits `text` into ordered sentence-like units.
    fn segment(
        &self,
        text: &str,
        language: &str,
        mode: SegmentMode,
    ) -> Result<Vec<String>, RagstoreError>;
}

// "exam-\nple" -> "example"
static HYPHEN_WRAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w)-\r?\n(\w)").expect("hyphen wrap pattern"));
// Hard line wraps inside a paragraph become spaces.
static LINE_WRAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\S)\r?\n(\S)").expect("line wrap pattern"));

/// UAX#29 sentence segmentation.
///
/// The Unicode rules are language-agnostic; the language code is still
/// validated so malformed metadata surfaces as a segmentation error and
/// triggers the token-window fallback rather than silently mis-segmenting.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeSegmenter;

impl SentenceSegmenter for UnicodeSegmenter {
    fn segment(
        &self,
        text: &str,
        language: &str,
        mode: SegmentMode,
    ) -> Result<Vec<String>, RagstoreError> {
        if !language.is_empty()
            && (language.len() != 2 || !language.chars().all(|c| c.is_ascii_alphabetic()))
        {
            return Err(RagstoreError::Segmentation(format!(
                "unsupported language code '{language}'"
            )));
        }

        let prepared: Cow<'_, str> = match mode {
            SegmentMode::Plain => Cow::Borrowed(text),
            SegmentMode::Pdf => {
                let dehyphenated = HYPHEN_WRAP.replace_all(text, "$1$2");
                Cow::Owned(LINE_WRAP.replace_all(&dehyphenated, "$1 $2").into_owned())
            }
        };

        Ok(prepared
            .as_ref()
            .unicode_sentences()
            .map(|sentence| sentence.trim().to_string())
            .filter(|sentence| !sentence.is_empty())
            .collect())
    }
}
