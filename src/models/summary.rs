use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStatus {
    #[default]
    Pending,
    Done,
    Failed,
}

impl SummaryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStatus::Pending => "pending",
            SummaryStatus::Done => "done",
            SummaryStatus::Failed => "failed",
        }
    }

    /// Unrecognized values read back as pending so the article gets
    /// summarized again.
    pub fn parse(s: &str) -> Self {
        match s {
            "done" => SummaryStatus::Done,
            "failed" => SummaryStatus::Failed,
            _ => SummaryStatus::Pending,
        }
    }
}
