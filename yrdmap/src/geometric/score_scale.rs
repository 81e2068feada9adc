use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::MapError;

/// One step of the scale: every score below `upper` (and above the previous
/// step) gets `color`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleStep {
    pub upper: f64,
    pub color: String,
}

impl ScaleStep {
    pub fn new(upper: f64, color: &str) -> Self {
        ScaleStep {
            upper,
            color: color.to_string(),
        }
    }
}

/// A half-open score interval `[lower, upper)` bound to a fill color
#[derive(Debug, Clone, PartialEq)]
pub struct ColorBucket {
    pub index: usize,
    pub lower: f64,
    pub upper: f64,
    pub color: String,
}

impl ColorBucket {
    pub fn contains(&self, score: f64) -> bool {
        score >= self.lower && score < self.upper
    }
}

/// What to do with a score the scale has no bucket for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfRangePolicy {
    /// Fill with the fallback color (white), the historical map output
    #[default]
    Fallback,
    /// Use the nearest bucket
    Clamp,
    /// Fail the run
    Reject,
}

/// Fill chosen for one city
#[derive(Debug, Clone, PartialEq)]
pub struct FillColor {
    pub color: String,
    /// Index of the bucket the color comes from, `None` for the fallback color
    pub bucket: Option<usize>,
}

/// Ordered score -> color table shared by the classifier and the colorbar.
///
/// Buckets are contiguous: bucket `i` covers `[bound(i), steps[i].upper)`
/// where `bound(0)` is `lower_bound` and `bound(i)` is `steps[i - 1].upper`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreScale {
    buckets: Vec<ColorBucket>,
    policy: OutOfRangePolicy,
    fallback_color: String,
}

impl ScoreScale {
    /// Build a scale from a lower bound and ascending `(upper, color)` steps
    pub fn new(lower_bound: f64, steps: &[ScaleStep]) -> Result<Self, MapError> {
        if steps.is_empty() {
            return Err(MapError::InvalidScale("no steps given".to_string()));
        }
        if !lower_bound.is_finite() {
            return Err(MapError::InvalidScale(format!(
                "lower bound {} is not finite",
                lower_bound
            )));
        }

        let mut buckets = Vec::with_capacity(steps.len());
        let mut lower = lower_bound;
        for (index, step) in steps.iter().enumerate() {
            if !step.upper.is_finite() || step.upper <= lower {
                return Err(MapError::InvalidScale(format!(
                    "bound {} of step {} must be greater than {}",
                    step.upper, index, lower
                )));
            }
            if step.color.trim().is_empty() {
                return Err(MapError::InvalidScale(format!(
                    "step {} has an empty color",
                    index
                )));
            }
            buckets.push(ColorBucket {
                index,
                lower,
                upper: step.upper,
                color: step.color.clone(),
            });
            lower = step.upper;
        }

        Ok(ScoreScale {
            buckets,
            policy: OutOfRangePolicy::default(),
            fallback_color: "white".to_string(),
        })
    }

    /// The nine-bucket YRD accuracy scale, 0 to 100 percent
    pub fn yrd_default() -> Self {
        let mut lower = 0.0;
        let buckets = default_steps()
            .into_iter()
            .enumerate()
            .map(|(index, step)| {
                let bucket = ColorBucket {
                    index,
                    lower,
                    upper: step.upper,
                    color: step.color,
                };
                lower = step.upper;
                bucket
            })
            .collect();

        ScoreScale {
            buckets,
            policy: OutOfRangePolicy::default(),
            fallback_color: "white".to_string(),
        }
    }

    pub fn with_policy(mut self, policy: OutOfRangePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_fallback_color(mut self, color: &str) -> Self {
        self.fallback_color = color.to_string();
        self
    }

    pub fn policy(&self) -> OutOfRangePolicy {
        self.policy
    }

    pub fn fallback_color(&self) -> &str {
        &self.fallback_color
    }

    pub fn buckets(&self) -> &[ColorBucket] {
        &self.buckets
    }

    pub fn lower_bound(&self) -> f64 {
        self.buckets[0].lower
    }

    pub fn upper_bound(&self) -> f64 {
        self.buckets[self.buckets.len() - 1].upper
    }

    /// All bucket edges in ascending order, as drawn on the colorbar ticks
    pub fn bounds(&self) -> Vec<f64> {
        let mut bounds = vec![self.lower_bound()];
        bounds.extend(self.buckets.iter().map(|b| b.upper));
        bounds
    }

    /// Find the bucket for a score by ascending threshold comparison.
    ///
    /// The first bucket whose upper bound exceeds the score wins, so scores
    /// under the lower bound land in the first bucket. Scores at or above
    /// the last bound, and NaN, have no bucket.
    pub fn classify(&self, score: f64) -> Option<&ColorBucket> {
        self.buckets.iter().find(|bucket| score < bucket.upper)
    }

    /// Pick the fill color for a city's score, applying the out-of-range policy
    pub fn resolve_fill(&self, city: &str, score: f64) -> Result<FillColor, MapError> {
        if score < self.lower_bound() {
            warn!(
                "Score {} of {} is below the scale lower bound {}",
                score,
                city,
                self.lower_bound()
            );
        }

        if let Some(bucket) = self.classify(score) {
            return Ok(FillColor {
                color: bucket.color.clone(),
                bucket: Some(bucket.index),
            });
        }

        match self.policy {
            OutOfRangePolicy::Fallback => {
                warn!(
                    "Score {} of {} has no bucket, filling with {}",
                    score, city, self.fallback_color
                );
                Ok(FillColor {
                    color: self.fallback_color.clone(),
                    bucket: None,
                })
            }
            OutOfRangePolicy::Clamp if score.is_finite() => {
                let last = &self.buckets[self.buckets.len() - 1];
                warn!(
                    "Score {} of {} clamped into [{}, {})",
                    score, city, last.lower, last.upper
                );
                Ok(FillColor {
                    color: last.color.clone(),
                    bucket: Some(last.index),
                })
            }
            OutOfRangePolicy::Clamp => {
                warn!(
                    "Score of {} is not a number, filling with {}",
                    city, self.fallback_color
                );
                Ok(FillColor {
                    color: self.fallback_color.clone(),
                    bucket: None,
                })
            }
            OutOfRangePolicy::Reject => Err(MapError::ScoreOutOfRange {
                city: city.to_string(),
                score,
                lower: self.lower_bound(),
                upper: self.upper_bound(),
            }),
        }
    }
}

impl Default for ScoreScale {
    fn default() -> Self {
        ScoreScale::yrd_default()
    }
}

/// Steps of the YRD accuracy scale
pub fn default_steps() -> Vec<ScaleStep> {
    vec![
        ScaleStep::new(20.0, "gray"),
        ScaleStep::new(30.0, "darkred"),
        ScaleStep::new(40.0, "red"),
        ScaleStep::new(50.0, "tomato"),
        ScaleStep::new(60.0, "lightsalmon"),
        ScaleStep::new(70.0, "cyan"),
        ScaleStep::new(80.0, "deepskyblue"),
        ScaleStep::new(90.0, "blue"),
        ScaleStep::new(100.0, "darkblue"),
    ]
}
