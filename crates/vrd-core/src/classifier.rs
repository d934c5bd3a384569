//! Score-to-verdict classification.
//!
//! | score           | status      | confidence |
//! |-----------------|-------------|------------|
//! | ≥ duplicateHigh | `duplicate` | `high`     |
//! | ≥ duplicateProbable | `duplicate` | `medium` |
//! | ≥ similar       | `similar`   | `medium`   |
//! | ≥ weaklyRelated | `similar`   | `low`      |
//! | below           | `new`       | `high`     |
//!
//! Lower bounds are inclusive, so every score falls in exactly one band.
//! Weakly related matches are reported as `similar` with `low` confidence
//! and are never promoted to `duplicate`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DUPLICATE_HIGH_THRESHOLD, DEFAULT_DUPLICATE_PROBABLE_THRESHOLD,
    DEFAULT_SIMILAR_THRESHOLD, DEFAULT_WEAKLY_RELATED_THRESHOLD,
};
use crate::errors::{VrdError, VrdResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    Duplicate,
    Similar,
    New,
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate => write!(f, "duplicate"),
            Self::Similar => write!(f, "similar"),
            Self::New => write!(f, "new"),
        }
    }
}

/// Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Band lower bounds. Must be strictly decreasing within [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassifierThresholds {
    pub duplicate_high: f32,
    pub duplicate_probable: f32,
    pub similar: f32,
    pub weakly_related: f32,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            duplicate_high: DEFAULT_DUPLICATE_HIGH_THRESHOLD,
            duplicate_probable: DEFAULT_DUPLICATE_PROBABLE_THRESHOLD,
            similar: DEFAULT_SIMILAR_THRESHOLD,
            weakly_related: DEFAULT_WEAKLY_RELATED_THRESHOLD,
        }
    }
}

impl ClassifierThresholds {
    /// Validate the thresholds.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` if a threshold is outside [0, 1] or the bands
    /// are not strictly decreasing.
    ///
    /// # Warnings
    ///
    /// - `duplicateHigh < 0.8`: high-confidence duplicates become easy to reach
    pub fn validate(&self) -> VrdResult<Vec<String>> {
        let named = [
            ("duplicateHigh", self.duplicate_high),
            ("duplicateProbable", self.duplicate_probable),
            ("similar", self.similar),
            ("weaklyRelated", self.weakly_related),
        ];

        for (name, value) in named {
            if !(0.0..=1.0).contains(&value) {
                return Err(VrdError::InvalidConfiguration {
                    message: format!("classifier.{} = {} is outside [0, 1]", name, value),
                    hint: "Thresholds are reranker scores and must lie in [0, 1]".to_string(),
                });
            }
        }
        for pair in named.windows(2) {
            let ((upper, hi), (lower, lo)) = (pair[0], pair[1]);
            if hi <= lo {
                return Err(VrdError::InvalidConfiguration {
                    message: format!(
                        "classifier.{} ({}) must be greater than classifier.{} ({})",
                        upper, hi, lower, lo
                    ),
                    hint: "Use strictly decreasing thresholds (default: 0.90, 0.70, 0.50, 0.30)"
                        .to_string(),
                });
            }
        }

        let mut warnings = Vec::new();
        if self.duplicate_high < 0.8 {
            warnings.push(format!(
                "classifier.duplicateHigh={} is low; high-confidence duplicates may be false positives",
                self.duplicate_high
            ));
        }
        Ok(warnings)
    }

    /// Whether a best score is decisive enough to stop searching.
    pub fn is_decisive(&self, score: f32) -> bool {
        score >= self.duplicate_high || score < self.weakly_related
    }

    /// Map a relevance score to a status and confidence.
    ///
    /// NaN is treated as no evidence and classifies as new.
    pub fn classify(&self, score: f32) -> (VerdictStatus, Confidence) {
        if score >= self.duplicate_high {
            (VerdictStatus::Duplicate, Confidence::High)
        } else if score >= self.duplicate_probable {
            (VerdictStatus::Duplicate, Confidence::Medium)
        } else if score >= self.similar {
            (VerdictStatus::Similar, Confidence::Medium)
        } else if score >= self.weakly_related {
            (VerdictStatus::Similar, Confidence::Low)
        } else {
            (VerdictStatus::New, Confidence::High)
        }
    }
}

/// Classify with the default thresholds.
pub fn classify(score: f32) -> (VerdictStatus, Confidence) {
    ClassifierThresholds::default().classify(score)
}
