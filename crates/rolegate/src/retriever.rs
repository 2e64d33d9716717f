//! Candidate retrieval seam.

use rolegate_types::{Document, RoleId};

/// Supplies ranked candidate documents for a query.
///
/// Implementations own ranking; the evaluator only removes documents and
/// never reorders them. The role id is passed so a retriever can narrow its
/// search, but access decisions are always re-checked by the filter.
pub trait Retriever: Send + Sync {
    fn retrieve(&self, query: &str, role_id: &RoleId) -> Vec<Document>;
}

impl<F> Retriever for F
where
    F: Fn(&str, &RoleId) -> Vec<Document> + Send + Sync,
{
    fn retrieve(&self, query: &str, role_id: &RoleId) -> Vec<Document> {
        self(query, role_id)
    }
}

/// Returns a fixed candidate list for every query.
///
/// Used by the CLI when documents come from a file.
#[derive(Debug, Clone, Default)]
pub struct StaticRetriever {
    documents: Vec<Document>,
}

impl StaticRetriever {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }
}

impl Retriever for StaticRetriever {
    fn retrieve(&self, _query: &str, _role_id: &RoleId) -> Vec<Document> {
        self.documents.clone()
    }
}
