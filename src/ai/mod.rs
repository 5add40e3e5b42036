mod pipeline;
mod summarizer;

pub use pipeline::{PipelineSettings, SummaryPipeline};
pub use summarizer::{ClaudeSummarizer, SummaryService};

#[cfg(test)]
pub use summarizer::SummaryRequest;
