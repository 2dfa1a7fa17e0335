use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::super::domain::Track;

/// A scoreable line in the rubric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: String,
    pub label: String,
    pub max_points: f64,
}

/// Ordered group of criteria reported as one subtotal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricCategory {
    pub name: String,
    pub criteria: Vec<Criterion>,
}

/// The full rubric for a single track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    pub track: Track,
    pub categories: Vec<RubricCategory>,
}

impl Rubric {
    pub fn max_total(&self) -> f64 {
        self.criteria().map(|(_, criterion)| criterion.max_points).sum()
    }

    pub fn criteria(&self) -> impl Iterator<Item = (&RubricCategory, &Criterion)> {
        self.categories
            .iter()
            .flat_map(|category| category.criteria.iter().map(move |c| (category, c)))
    }

    pub fn criterion(&self, id: &str) -> Option<(&RubricCategory, &Criterion)> {
        self.criteria().find(|(_, criterion)| criterion.id == id)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RubricError {
    #[error("no rubric configured for the {0} track")]
    MissingTrack(&'static str),
    #[error("more than one rubric configured for the {0} track")]
    DuplicateTrack(&'static str),
    #[error("rubric for the {0} track has no criteria")]
    EmptyTrack(&'static str),
    #[error("criterion `{0}` appears more than once across the rubric set")]
    DuplicateCriterion(String),
    #[error("criterion `{criterion_id}` has non-positive max points {max_points}")]
    InvalidMaxPoints { criterion_id: String, max_points: f64 },
}

/// Both track rubrics. Criterion ids are unique across tracks so a score sheet can never be
/// applied to the wrong track by accident.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RubricConfig {
    foundation: Rubric,
    acceleration: Rubric,
}

impl RubricConfig {
    pub fn new(rubrics: Vec<Rubric>) -> Result<Self, RubricError> {
        let mut foundation = None;
        let mut acceleration = None;
        let mut seen = HashSet::new();

        for rubric in rubrics {
            if rubric.criteria().next().is_none() {
                return Err(RubricError::EmptyTrack(rubric.track.label()));
            }
            for (_, criterion) in rubric.criteria() {
                if !criterion.max_points.is_finite() || criterion.max_points <= 0.0 {
                    return Err(RubricError::InvalidMaxPoints {
                        criterion_id: criterion.id.clone(),
                        max_points: criterion.max_points,
                    });
                }
                if !seen.insert(criterion.id.clone()) {
                    return Err(RubricError::DuplicateCriterion(criterion.id.clone()));
                }
            }
            let slot = match rubric.track {
                Track::Foundation => &mut foundation,
                Track::Acceleration => &mut acceleration,
            };
            if slot.is_some() {
                return Err(RubricError::DuplicateTrack(rubric.track.label()));
            }
            *slot = Some(rubric);
        }

        Ok(Self {
            foundation: foundation
                .ok_or(RubricError::MissingTrack(Track::Foundation.label()))?,
            acceleration: acceleration
                .ok_or(RubricError::MissingTrack(Track::Acceleration.label()))?,
        })
    }

    pub fn for_track(&self, track: Track) -> &Rubric {
        match track {
            Track::Foundation => &self.foundation,
            Track::Acceleration => &self.acceleration,
        }
    }
}
