use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use super::super::domain::Track;
use super::rubric::{Criterion, Rubric, RubricCategory, RubricConfig, RubricError};

#[derive(Debug)]
pub enum RubricImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    UnknownTrack { line: usize, value: String },
    Rubric(RubricError),
}

impl std::fmt::Display for RubricImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RubricImportError::Io(err) => write!(f, "failed to read rubric export: {}", err),
            RubricImportError::Csv(err) => write!(f, "invalid rubric CSV data: {}", err),
            RubricImportError::UnknownTrack { line, value } => {
                write!(f, "line {}: unknown track '{}'", line, value)
            }
            RubricImportError::Rubric(err) => write!(f, "rubric rejected: {}", err),
        }
    }
}

impl std::error::Error for RubricImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RubricImportError::Io(err) => Some(err),
            RubricImportError::Csv(err) => Some(err),
            RubricImportError::UnknownTrack { .. } => None,
            RubricImportError::Rubric(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for RubricImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for RubricImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<RubricError> for RubricImportError {
    fn from(err: RubricError) -> Self {
        Self::Rubric(err)
    }
}

#[derive(Debug, Deserialize)]
struct RubricRow {
    #[serde(rename = "Track")]
    track: String,
    #[serde(rename = "Category")]
    category: String,
    #[serde(rename = "Criterion ID")]
    criterion_id: String,
    #[serde(rename = "Criterion")]
    label: String,
    #[serde(rename = "Max Points")]
    max_points: f64,
}

/// Loads rubric configuration from a spreadsheet export. Row order defines category and
/// criterion order.
pub struct RubricImporter;

impl RubricImporter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<RubricConfig, RubricImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<RubricConfig, RubricImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut rubrics: Vec<Rubric> = Vec::new();

        for (index, row) in csv_reader.deserialize::<RubricRow>().enumerate() {
            let row = row?;
            // header is line 1
            let line = index + 2;
            let track = Track::parse(&row.track).ok_or_else(|| RubricImportError::UnknownTrack {
                line,
                value: row.track.clone(),
            })?;

            let rubric = match rubrics.iter_mut().position(|r| r.track == track) {
                Some(position) => &mut rubrics[position],
                None => {
                    rubrics.push(Rubric {
                        track,
                        categories: Vec::new(),
                    });
                    let last = rubrics.len() - 1;
                    &mut rubrics[last]
                }
            };

            let category = match rubric
                .categories
                .iter()
                .position(|category| category.name == row.category)
            {
                Some(position) => &mut rubric.categories[position],
                None => {
                    rubric.categories.push(RubricCategory {
                        name: row.category.clone(),
                        criteria: Vec::new(),
                    });
                    let last = rubric.categories.len() - 1;
                    &mut rubric.categories[last]
                }
            };

            category.criteria.push(Criterion {
                id: row.criterion_id,
                label: row.label,
                max_points: row.max_points,
            });
        }

        Ok(RubricConfig::new(rubrics)?)
    }
}
