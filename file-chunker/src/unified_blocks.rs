/// A raw text block produced by a reader: one per page (PDF) or page section (DOCX).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnifiedBlock {
    pub text: String,
    /// 1-based page number, when known.
    pub page: Option<u32>,
}

impl UnifiedBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), page: None }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}
