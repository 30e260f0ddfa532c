use futures::future::BoxFuture;

use tandem_core::error::Result;
use tandem_core::traits::Summarizer;
use tandem_core::types::{Artifact, Part};

/// Summarizer that joins collected results line by line.
///
/// Text parts are used as-is; data parts are rendered as compact JSON.
#[derive(Debug, Clone, Default)]
pub struct ConcatSummarizer;

impl ConcatSummarizer {
    pub fn new() -> Self {
        Self
    }

    fn render(artifact: &Artifact) -> String {
        artifact
            .parts
            .iter()
            .map(|part| match part {
                Part::Text { text } => text.clone(),
                Part::Data { data } => data.to_string(),
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

impl Summarizer for ConcatSummarizer {
    fn summarize(&self, results: &[Artifact]) -> BoxFuture<'_, Result<String>> {
        let summary = results
            .iter()
            .map(Self::render)
            .filter(|line| !line.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        Box::pin(async move { Ok(summary) })
    }
}
