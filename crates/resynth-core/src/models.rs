//! Row types for the three ledger tables.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{analysis_results, requests, search_results};

/// Lifecycle state of a research request.
///
/// Transitions: `pending -> searching -> processing_search -> analyzing ->
/// processing_analysis -> completed`, with `failed` reachable from
/// `processing_search` or `processing_analysis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Searching,
    ProcessingSearch,
    Analyzing,
    ProcessingAnalysis,
    Completed,
    Failed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Searching => "searching",
            RequestStatus::ProcessingSearch => "processing_search",
            RequestStatus::Analyzing => "analyzing",
            RequestStatus::ProcessingAnalysis => "processing_analysis",
            RequestStatus::Completed => "completed",
            RequestStatus::Failed => "failed",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(RequestStatus::Pending),
            "searching" => Some(RequestStatus::Searching),
            "processing_search" => Some(RequestStatus::ProcessingSearch),
            "analyzing" => Some(RequestStatus::Analyzing),
            "processing_analysis" => Some(RequestStatus::ProcessingAnalysis),
            "completed" => Some(RequestStatus::Completed),
            "failed" => Some(RequestStatus::Failed),
            _ => None,
        }
    }

    /// Whether a row in this status is eligible for a worker to claim.
    pub fn is_claimable_for(&self, stage: Stage) -> bool {
        match stage {
            Stage::Search => matches!(self, RequestStatus::Searching),
            Stage::Analysis => matches!(self, RequestStatus::Analyzing),
        }
    }

    /// Whether moving from `self` to `to` is a legal lifecycle transition.
    pub fn permits_transition_to(&self, to: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, to),
            (Pending, Searching)
                | (Searching, ProcessingSearch)
                | (ProcessingSearch, Analyzing)
                | (ProcessingSearch, Failed)
                | (Analyzing, ProcessingAnalysis)
                | (ProcessingAnalysis, Completed)
                | (ProcessingAnalysis, Failed)
        )
    }
}

/// Which stage worker is asking about claimability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Search,
    Analysis,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = requests)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Request {
    pub id: Uuid,
    pub topic: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl Request {
    pub fn status(&self) -> RequestStatus {
        RequestStatus::from_str(&self.status).unwrap_or(RequestStatus::Failed)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = requests)]
pub struct NewRequest<'a> {
    pub id: Uuid,
    pub topic: &'a str,
    pub status: &'a str,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = search_results)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SearchResult {
    pub id: i32,
    pub request_id: Uuid,
    pub url: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = search_results)]
pub struct NewSearchResult {
    pub request_id: Uuid,
    pub url: String,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = analysis_results)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AnalysisResult {
    pub id: i32,
    pub request_id: Uuid,
    pub summary: String,
    pub tokens_used: Option<i32>,
    pub inference_time_ms: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = analysis_results)]
pub struct NewAnalysisResult {
    pub request_id: Uuid,
    pub summary: String,
    pub tokens_used: Option<i32>,
    pub inference_time_ms: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_its_string_form() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Searching,
            RequestStatus::ProcessingSearch,
            RequestStatus::Analyzing,
            RequestStatus::ProcessingAnalysis,
            RequestStatus::Completed,
            RequestStatus::Failed,
        ] {
            let s = status.as_str();
            assert_eq!(RequestStatus::from_str(s), Some(status));
        }
    }

    #[test]
    fn only_the_documented_edges_are_legal_transitions() {
        assert!(RequestStatus::Pending.permits_transition_to(RequestStatus::Searching));
        assert!(!RequestStatus::Pending.permits_transition_to(RequestStatus::Completed));
        assert!(RequestStatus::ProcessingSearch.permits_transition_to(RequestStatus::Failed));
        assert!(!RequestStatus::Completed.permits_transition_to(RequestStatus::Pending));
    }

    #[test]
    fn claimability_is_scoped_to_its_stage() {
        assert!(RequestStatus::Searching.is_claimable_for(Stage::Search));
        assert!(!RequestStatus::Searching.is_claimable_for(Stage::Analysis));
        assert!(RequestStatus::Analyzing.is_claimable_for(Stage::Analysis));
    }
}
