use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Numeric identity of a submitted grant application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub u64);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a reviewer, oversight officer, or administrator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role resolved by the identity collaborator. Governs eligibility only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "applicant")]
    Applicant,
    #[serde(rename = "reviewer_1")]
    Reviewer1,
    #[serde(rename = "reviewer_2")]
    Reviewer2,
    #[serde(rename = "technical_reviewer")]
    TechnicalReviewer,
    #[serde(rename = "oversight")]
    Oversight,
    #[serde(rename = "admin")]
    Admin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Applicant => "applicant",
            Role::Reviewer1 => "reviewer_1",
            Role::Reviewer2 => "reviewer_2",
            Role::TechnicalReviewer => "technical_reviewer",
            Role::Oversight => "oversight",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Caller context passed explicitly into every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: ActorId::new(id),
            role,
        }
    }
}

/// Funding track; each track has its own disjoint rubric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    Foundation,
    Acceleration,
}

impl Track {
    pub const fn label(self) -> &'static str {
        match self {
            Track::Foundation => "foundation",
            Track::Acceleration => "acceleration",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "foundation" => Some(Track::Foundation),
            "acceleration" => Some(Track::Acceleration),
            _ => None,
        }
    }
}

/// Lifecycle of an application through the blind double review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    /// No review submitted yet.
    #[serde(alias = "under_review")]
    Submitted,
    PendingSeniorReview,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::PendingSeniorReview => "pending_senior_review",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, ApplicationStatus::Approved | ApplicationStatus::Rejected)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Identity and lifecycle of one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub track: Track,
    pub status: ApplicationStatus,
    pub submitted_at: DateTime<Utc>,
}

/// One scored rubric criterion, as entered by a reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub criterion_id: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_comment: Option<String>,
}

impl CriterionScore {
    pub fn new(criterion_id: impl Into<String>, score: f64) -> Self {
        Self {
            criterion_id: criterion_id.into(),
            score,
            reviewer_comment: None,
        }
    }
}

/// Round half away from zero to one decimal place.
pub fn round1dp(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
