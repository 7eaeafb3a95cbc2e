//! Tentative-entity review.
//!
//! Discovery never commits its findings directly: new entities are flagged
//! `CREATED`, vanished ones `DELETED`. A reviewer then approves or rejects a
//! batch, and [`plan`] decides per entity whether the flag is cleared or the
//! row is deleted. The store applies a plan inside one transaction.

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewResult {
    Approve,
    Reject,
}

impl ReviewResult {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewResult::Approve => "approve",
            ReviewResult::Reject => "reject",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "approve" | "approved" => Some(ReviewResult::Approve),
            "reject" | "rejected" => Some(ReviewResult::Reject),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TentativeStatus {
    Created,
    Deleted,
}

impl TentativeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TentativeStatus::Created => "CREATED",
            TentativeStatus::Deleted => "DELETED",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "CREATED" => Some(TentativeStatus::Created),
            "DELETED" => Some(TentativeStatus::Deleted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Property,
    DataSource,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Property => "property",
            EntityKind::DataSource => "data_source",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "property" | "properties" => Some(EntityKind::Property),
            "data_source" | "data-source" | "data_sources" => Some(EntityKind::DataSource),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Clear the tentative flag; the entity becomes committed.
    Commit,
    /// Remove the entity.
    Delete,
}

/// Effect of one review decision on one entity. `None` for committed
/// entities, which a review leaves untouched.
pub fn transition(flag: Option<TentativeStatus>, result: ReviewResult) -> Option<Transition> {
    match (flag?, result) {
        (TentativeStatus::Created, ReviewResult::Approve) => Some(Transition::Commit),
        (TentativeStatus::Created, ReviewResult::Reject) => Some(Transition::Delete),
        (TentativeStatus::Deleted, ReviewResult::Approve) => Some(Transition::Delete),
        (TentativeStatus::Deleted, ReviewResult::Reject) => Some(Transition::Commit),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewPlan {
    pub commit: Vec<String>,
    pub delete: Vec<String>,
}

impl ReviewPlan {
    pub fn is_empty(&self) -> bool {
        self.commit.is_empty() && self.delete.is_empty()
    }
}

/// Partition a batch of `(id, tentative flag)` pairs by their transition.
pub fn plan<'a, I>(entities: I, result: ReviewResult) -> ReviewPlan
where
    I: IntoIterator<Item = (&'a str, Option<TentativeStatus>)>,
{
    let mut plan = ReviewPlan::default();
    for (id, flag) in entities {
        match transition(flag, result) {
            Some(Transition::Commit) => plan.commit.push(id.to_string()),
            Some(Transition::Delete) => plan.delete.push(id.to_string()),
            None => {}
        }
    }
    plan
}
