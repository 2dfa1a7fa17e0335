use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::super::domain::{round1dp, CriterionScore, Track};
use super::rubric::Rubric;

/// Subtotal for one rubric category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: String,
    pub subtotal: f64,
    pub max_points: f64,
}

/// Category subtotals and grand total for a score sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub track: Track,
    pub categories: Vec<CategoryTotal>,
    pub total: f64,
    pub max_total: f64,
}

impl ScoreBreakdown {
    pub fn passes(&self, threshold: f64) -> bool {
        self.total >= threshold
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ScoringError {
    #[error("criterion `{criterion_id}` scored {score}, allowed range is 0..={max_points}")]
    ScoreOutOfBounds {
        criterion_id: String,
        score: f64,
        max_points: f64,
    },
    #[error("criterion `{criterion_id}` is not part of the {track} rubric")]
    UnknownCriterion {
        criterion_id: String,
        track: &'static str,
    },
    #[error("criterion `{0}` was scored more than once")]
    DuplicateCriterion(String),
    #[error("criterion `{0}` has not been scored")]
    MissingCriterion(String),
    #[error("total score {total} falls outside {min}..={max}")]
    TotalOutOfBounds { total: f64, min: f64, max: f64 },
}

/// Sum a score sheet against the rubric of its track.
///
/// Scores are never clamped: a value above its criterion maximum is a caller bug and is
/// reported as [`ScoringError::ScoreOutOfBounds`]. Criteria absent from the sheet count as zero.
pub fn aggregate(rubric: &Rubric, scores: &[CriterionScore]) -> Result<ScoreBreakdown, ScoringError> {
    let mut seen = HashSet::new();
    for entry in scores {
        let (_, criterion) =
            rubric
                .criterion(&entry.criterion_id)
                .ok_or_else(|| ScoringError::UnknownCriterion {
                    criterion_id: entry.criterion_id.clone(),
                    track: rubric.track.label(),
                })?;

        if !entry.score.is_finite() || entry.score < 0.0 || entry.score > criterion.max_points {
            return Err(ScoringError::ScoreOutOfBounds {
                criterion_id: entry.criterion_id.clone(),
                score: entry.score,
                max_points: criterion.max_points,
            });
        }

        if !seen.insert(entry.criterion_id.as_str()) {
            return Err(ScoringError::DuplicateCriterion(entry.criterion_id.clone()));
        }
    }

    let categories: Vec<CategoryTotal> = rubric
        .categories
        .iter()
        .map(|category| {
            let subtotal = category
                .criteria
                .iter()
                .filter_map(|criterion| {
                    scores
                        .iter()
                        .find(|entry| entry.criterion_id == criterion.id)
                        .map(|entry| entry.score)
                })
                .sum::<f64>();
            CategoryTotal {
                category: category.name.clone(),
                subtotal: round1dp(subtotal),
                max_points: category.criteria.iter().map(|c| c.max_points).sum(),
            }
        })
        .collect();

    let total = round1dp(scores.iter().map(|entry| entry.score).sum());

    Ok(ScoreBreakdown {
        track: rubric.track,
        categories,
        total,
        max_total: rubric.max_total(),
    })
}

/// Fail on the first rubric criterion (in rubric order) that the sheet leaves unscored.
pub fn ensure_complete(rubric: &Rubric, scores: &[CriterionScore]) -> Result<(), ScoringError> {
    match rubric
        .criteria()
        .find(|(_, criterion)| !scores.iter().any(|entry| entry.criterion_id == criterion.id))
    {
        Some((_, missing)) => Err(ScoringError::MissingCriterion(missing.id.clone())),
        None => Ok(()),
    }
}
