//! Query decomposition
//!
//! A [`QueryPlanner`] turns a free-form travel request into the structured
//! searches the dispatcher runs.

mod openai;

pub use openai::OpenAiPlanner;

use crate::errors::SearchError;
use crate::search::SearchSpec;
use async_trait::async_trait;

/// Breaks a travel request into searches
#[async_trait]
pub trait QueryPlanner: Send + Sync {
    /// Decompose `query`.
    ///
    /// Any failure is a [`SearchError::Decomposition`]; an empty list is a
    /// valid answer.
    async fn breakdown(&self, query: &str) -> Result<Vec<SearchSpec>, SearchError>;
}

/// Planner that always answers with the same searches
#[cfg(test)]
pub(crate) struct FixedPlanner(pub Result<Vec<SearchSpec>, String>);

#[cfg(test)]
#[async_trait]
impl QueryPlanner for FixedPlanner {
    async fn breakdown(&self, _query: &str) -> Result<Vec<SearchSpec>, SearchError> {
        self.0.clone().map_err(SearchError::Decomposition)
    }
}
