//! Match results as recorded set by set.

use serde::{Deserialize, Serialize};

/// Points of both teams in one set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetScore {
    pub team1_points: i64,
    pub team2_points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoreError {
    #[error("a match result needs at least one set")]
    Empty,
    #[error("a match result needs an even number of scores, got {0}")]
    OddLength(usize),
    #[error("scores must not be negative, got {0}")]
    Negative(i64),
}

/// Pair a flat `[t1, t2, t1, t2, ...]` score list into sets.
pub fn pair_scores(scores: &[i64]) -> Result<Vec<SetScore>, ScoreError> {
    if scores.is_empty() {
        return Err(ScoreError::Empty);
    }
    if scores.len() % 2 != 0 {
        return Err(ScoreError::OddLength(scores.len()));
    }
    if let Some(&negative) = scores.iter().find(|s| **s < 0) {
        return Err(ScoreError::Negative(negative));
    }

    Ok(scores
        .chunks_exact(2)
        .map(|pair| SetScore {
            team1_points: pair[0],
            team2_points: pair[1],
        })
        .collect())
}
