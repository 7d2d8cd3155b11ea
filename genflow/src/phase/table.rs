//! Phase descriptors and validated phase tables.

use std::collections::HashSet;

use thiserror::Error;

/// One named slice of a job's progress range.
///
/// A phase covers `start..end` of the 0..100 progress scale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseDescriptor {
    /// Stable key, matched against per-phase reports from the backend.
    pub key: String,

    /// Human-readable title.
    pub title: String,

    pub description: String,

    /// Inclusive lower bound.
    pub start: u8,

    /// Exclusive upper bound.
    pub end: u8,
}

impl PhaseDescriptor {
    pub fn new(
        key: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        start: u8,
        end: u8,
    ) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            description: description.into(),
            start,
            end,
        }
    }

    /// Returns true if `progress` falls within `start..end`.
    #[inline]
    pub fn contains(&self, progress: u8) -> bool {
        self.start <= progress && progress < self.end
    }
}

/// Reasons a phase table is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhaseTableError {
    #[error("Phase table is empty")]
    Empty,

    #[error("Duplicate phase key '{0}'")]
    DuplicateKey(String),

    #[error("First phase must start at 0 (starts at {0})")]
    DoesNotStartAtZero(u8),

    #[error("Phase '{key}' has an empty range {start}..{end}")]
    EmptyRange { key: String, start: u8, end: u8 },

    #[error("Phase '{key}' starts at {start} but the previous phase ends at {previous_end}")]
    Gap {
        key: String,
        start: u8,
        previous_end: u8,
    },

    #[error("Last phase must end at 100 (ends at {0})")]
    DoesNotEndAtHundred(u8),
}

/// Ordered, contiguous set of phases covering 0..100.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTable {
    phases: Vec<PhaseDescriptor>,
}

impl PhaseTable {
    /// Validate and build a table.
    pub fn new(phases: Vec<PhaseDescriptor>) -> Result<Self, PhaseTableError> {
        let first = phases.first().ok_or(PhaseTableError::Empty)?;
        if first.start != 0 {
            return Err(PhaseTableError::DoesNotStartAtZero(first.start));
        }

        let mut keys = HashSet::new();
        let mut previous_end = 0u8;
        for phase in &phases {
            if !keys.insert(phase.key.as_str()) {
                return Err(PhaseTableError::DuplicateKey(phase.key.clone()));
            }
            if phase.start >= phase.end {
                return Err(PhaseTableError::EmptyRange {
                    key: phase.key.clone(),
                    start: phase.start,
                    end: phase.end,
                });
            }
            if phase.start != previous_end {
                return Err(PhaseTableError::Gap {
                    key: phase.key.clone(),
                    start: phase.start,
                    previous_end,
                });
            }
            previous_end = phase.end;
        }

        if previous_end != 100 {
            return Err(PhaseTableError::DoesNotEndAtHundred(previous_end));
        }

        Ok(Self { phases })
    }

    /// The five-phase content generation pipeline.
    pub fn content_pipeline() -> Self {
        Self {
            phases: vec![
                PhaseDescriptor::new(
                    "keyword_research",
                    "Keyword research",
                    "Expanding the topic into ranked search keywords",
                    0,
                    20,
                ),
                PhaseDescriptor::new(
                    "content_outline",
                    "Content outline",
                    "Structuring headings and sections around the keywords",
                    20,
                    35,
                ),
                PhaseDescriptor::new(
                    "text_generation",
                    "Text generation",
                    "Writing the body text for every outlined section",
                    35,
                    60,
                ),
                PhaseDescriptor::new(
                    "image_generation",
                    "Image generation",
                    "Producing illustrations for the article",
                    60,
                    85,
                ),
                PhaseDescriptor::new(
                    "assembly",
                    "Assembly",
                    "Combining text and images into the final document",
                    85,
                    100,
                ),
            ],
        }
    }

    pub fn phases(&self) -> &[PhaseDescriptor] {
        &self.phases
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// Always false for a validated table.
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&PhaseDescriptor> {
        self.phases.iter().find(|p| p.key == key)
    }

    /// Index of the phase containing `progress` (clamped); the last phase at 100.
    pub fn index_at(&self, progress: i32) -> usize {
        let progress = progress.clamp(0, 100) as u8;
        self.phases
            .iter()
            .position(|p| p.contains(progress))
            .unwrap_or(self.phases.len().saturating_sub(1))
    }

    /// Phase containing `progress` (clamped); the last phase at 100.
    pub fn phase_at(&self, progress: i32) -> Option<&PhaseDescriptor> {
        self.phases.get(self.index_at(progress))
    }
}

impl Default for PhaseTable {
    fn default() -> Self {
        Self::content_pipeline()
    }
}
