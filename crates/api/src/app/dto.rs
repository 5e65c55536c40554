use serde::Serialize;

use agencyhub_infra::jobs::ProcessSummary;

/// Body of a completed processing run.
#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub success: bool,
    #[serde(flatten)]
    pub summary: ProcessSummary,
}

impl From<ProcessSummary> for ProcessResponse {
    fn from(summary: ProcessSummary) -> Self {
        Self {
            success: true,
            summary,
        }
    }
}
