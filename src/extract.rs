//! Text extraction for non-plain-text uploads.
//!
//! PDF and DOCX extraction engines live outside this crate; they plug in
//! through [`TextExtractor`] keyed by content type. Extraction may fail
//! catastrophically on oversized or malformed input, which aborts that one
//! file's ingestion with an error distinct from a normal skip.

use std::collections::HashMap;
use std::sync::Arc;

use crate::types::KbError;

/// `binary -> text` contract for one document format.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, data: &[u8]) -> Result<String, KbError>;
}

/// Extractor for text-native formats; invalid UTF-8 sequences are replaced
/// rather than rejected.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, data: &[u8]) -> Result<String, KbError> {
        Ok(String::from_utf8_lossy(data).into_owned())
    }
}

/// Content types handled by [`PlainTextExtractor`] out of the box.
const PLAIN_TEXT_TYPES: [&str; 2] = ["text/plain", "text/markdown"];

/// Registry mapping content types to extractors.
///
/// Unregistered content types are rejected during upload validation, so the
/// set of registered types doubles as the upload allow-list.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    /// Registry with the plain-text formats pre-registered.
    pub fn new() -> Self {
        let mut registry = Self::default();
        let plain: Arc<dyn TextExtractor> = Arc::new(PlainTextExtractor);
        for content_type in PLAIN_TEXT_TYPES {
            registry.extractors.insert(content_type.to_string(), Arc::clone(&plain));
        }
        registry
    }

    /// Register an extractor for a content type, replacing any existing one.
    pub fn register(&mut self, content_type: impl Into<String>, extractor: Arc<dyn TextExtractor>) {
        self.extractors.insert(content_type.into(), extractor);
    }

    pub fn supports(&self, content_type: &str) -> bool {
        self.extractors.contains_key(content_type)
    }

    pub fn get(&self, content_type: &str) -> Option<&Arc<dyn TextExtractor>> {
        self.extractors.get(content_type)
    }

    /// Whether the content type streams through the chunker without an
    /// extraction pass.
    pub fn is_plain_text(content_type: &str) -> bool {
        PLAIN_TEXT_TYPES.contains(&content_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_supports_plain_text_by_default() {
        let registry = ExtractorRegistry::new();
        assert!(registry.supports("text/plain"));
        assert!(registry.supports("text/markdown"));
        assert!(!registry.supports("application/pdf"));
    }

    #[test]
    fn plain_text_extractor_replaces_invalid_utf8() {
        let text = PlainTextExtractor.extract(b"ok \xff bytes").unwrap();
        assert!(text.starts_with("ok "));
        assert!(text.contains('\u{fffd}'));
    }

    struct FailingExtractor;

    impl TextExtractor for FailingExtractor {
        fn extract(&self, _data: &[u8]) -> Result<String, KbError> {
            Err(KbError::Extraction("document too large for extractor".into()))
        }
    }

    #[test]
    fn registered_extractor_is_looked_up_by_content_type() {
        let mut registry = ExtractorRegistry::new();
        registry.register("application/pdf", Arc::new(FailingExtractor));
        assert!(registry.supports("application/pdf"));
        let err = registry
            .get("application/pdf")
            .unwrap()
            .extract(b"%PDF-")
            .unwrap_err();
        assert!(matches!(err, KbError::Extraction(_)));
    }
}
