use unicode_segmentation::UnicodeSegmentation;

use crate::StoreError;

/// Splits text into lowercased lexical tokens for BM25 scoring.
pub trait TextSegmenter: Send + Sync {
    fn segment(&self, text: &str) -> Vec<String>;
    fn name(&self) -> &'static str;
}

/// UAX #29 word boundaries. Whitespace scripts split into words; Han
/// ideographs and hiragana fall apart into single characters, katakana runs
/// stay whole. Use a morphological segmenter for CJK corpora.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeSegmenter;

impl TextSegmenter for UnicodeSegmenter {
    fn segment(&self, text: &str) -> Vec<String> {
        text.unicode_words().map(str::to_lowercase).collect()
    }

    fn name(&self) -> &'static str { "unicode" }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmenterKind {
    #[default]
    Unicode,
    /// Japanese morphological analysis (IPADIC); needs the `lindera` feature.
    Lindera,
    /// Chinese word segmentation (CC-CEDICT); needs the `lindera` feature.
    Chinese,
}

impl SegmenterKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unicode" => Some(Self::Unicode),
            "lindera" | "japanese" => Some(Self::Lindera),
            "lindera-zh" | "chinese" => Some(Self::Chinese),
            _ => None,
        }
    }
}

/// Build the segmenter for `kind`. The dictionary-backed kinds fall back to
/// Unicode when the `lindera` feature is off.
pub fn build_segmenter(kind: SegmenterKind) -> Result<Box<dyn TextSegmenter>, StoreError> {
    match kind {
        SegmenterKind::Unicode => Ok(Box::new(UnicodeSegmenter)),
        #[cfg(feature = "lindera")]
        SegmenterKind::Lindera => Ok(Box::new(lindera_impl::LinderaSegmenter::japanese()?)),
        #[cfg(feature = "lindera")]
        SegmenterKind::Chinese => Ok(Box::new(lindera_impl::LinderaSegmenter::chinese()?)),
        #[cfg(not(feature = "lindera"))]
        SegmenterKind::Lindera | SegmenterKind::Chinese => {
            tracing::warn!(kind = ?kind, "dictionary segmenter requested without the `lindera` feature; using unicode");
            Ok(Box::new(UnicodeSegmenter))
        }
    }
}

#[cfg(feature = "lindera")]
pub use lindera_impl::LinderaSegmenter;

#[cfg(feature = "lindera")]
mod lindera_impl {
    use std::borrow::Cow;

    use lindera::dictionary::load_dictionary;
    use lindera::mode::Mode;
    use lindera::segmenter::Segmenter;

    use super::TextSegmenter;
    use crate::StoreError;

    /// Morphological segmentation with an embedded Lindera dictionary.
    pub struct LinderaSegmenter {
        segmenter: Segmenter,
        name: &'static str,
    }

    impl LinderaSegmenter {
        /// Japanese, IPADIC.
        pub fn japanese() -> Result<Self, StoreError> {
            Self::with_dictionary("embedded://ipadic", "lindera")
        }

        /// Simplified and traditional Chinese, CC-CEDICT.
        pub fn chinese() -> Result<Self, StoreError> {
            Self::with_dictionary("embedded://cc-cedict", "lindera-zh")
        }

        fn with_dictionary(uri: &str, name: &'static str) -> Result<Self, StoreError> {
            let dictionary =
                load_dictionary(uri).map_err(|e| StoreError::Segmenter(format!("load {uri}: {e}")))?;
            Ok(Self { segmenter: Segmenter::new(Mode::Normal, dictionary, None), name })
        }
    }

    impl TextSegmenter for LinderaSegmenter {
        fn segment(&self, text: &str) -> Vec<String> {
            match self.segmenter.segment(Cow::Borrowed(text)) {
                Ok(tokens) => tokens
                    .iter()
                    .map(|t| t.surface.trim().to_lowercase())
                    .filter(|t| t.chars().any(char::is_alphanumeric))
                    .collect(),
                Err(e) => {
                    tracing::warn!(error = %e, "lindera segmentation failed; falling back to unicode words");
                    super::UnicodeSegmenter.segment(text)
                }
            }
        }

        fn name(&self) -> &'static str { self.name }
    }
}
