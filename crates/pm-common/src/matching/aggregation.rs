use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::{QuestionId, SkillId};

pub const MIN_ANSWER_VALUE: i32 = 1;
pub const MAX_ANSWER_VALUE: i32 = 5;

/// One decoded answer of an assessment submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentAnswer {
    pub skill_id: SkillId,
    pub question_id: QuestionId,
    pub value: i32,
}

impl AssessmentAnswer {
    pub fn new(skill_id: SkillId, question_id: QuestionId, value: i32) -> Self {
        Self {
            skill_id,
            question_id,
            value,
        }
    }
}

/// Mean answer value of one skill, in [1.0, 5.0] with 2 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkillScore {
    pub skill_id: SkillId,
    pub score: f64,
}

/// All stored skill scores of one student, keyed by skill.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkillScores {
    scores: BTreeMap<SkillId, f64>,
}

impl SkillScores {
    pub fn from_scores(scores: impl IntoIterator<Item = SkillScore>) -> Self {
        Self {
            scores: scores
                .into_iter()
                .map(|s| (s.skill_id, s.score))
                .collect(),
        }
    }

    pub fn get(&self, skill_id: SkillId) -> Option<f64> {
        self.scores.get(&skill_id).copied()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = SkillScore> + '_ {
        self.scores.iter().map(|(skill_id, score)| SkillScore {
            skill_id: *skill_id,
            score: *score,
        })
    }
}

#[derive(Default)]
struct Tally {
    sum: i64,
    count: i64,
}

/// Reduce one submission's answers to a mean score per skill.
///
/// Every value is range-checked before anything is averaged, and a question
/// answered twice is rejected so the result never depends on answer order.
/// Skills without answers produce no score. Output is ordered by skill id.
pub fn aggregate_answers(answers: &[AssessmentAnswer]) -> Result<Vec<SkillScore>, EngineError> {
    if let Some(bad) = answers
        .iter()
        .find(|a| !(MIN_ANSWER_VALUE..=MAX_ANSWER_VALUE).contains(&a.value))
    {
        return Err(EngineError::InvalidAnswerValue {
            skill_id: bad.skill_id,
            question_id: bad.question_id,
            value: bad.value,
        });
    }

    let mut seen = BTreeSet::new();
    let mut tallies: BTreeMap<SkillId, Tally> = BTreeMap::new();

    for answer in answers {
        if !seen.insert((answer.skill_id, answer.question_id)) {
            return Err(EngineError::DuplicateAnswer {
                skill_id: answer.skill_id,
                question_id: answer.question_id,
            });
        }

        let tally = tallies.entry(answer.skill_id).or_default();
        tally.sum += i64::from(answer.value);
        tally.count += 1;
    }

    Ok(tallies
        .into_iter()
        .map(|(skill_id, tally)| SkillScore {
            skill_id,
            score: mean_half_up(tally.sum, tally.count),
        })
        .collect())
}

// floor(100 * sum / count + 0.5) in integers, so x.xx5 always rounds up.
fn mean_half_up(sum: i64, count: i64) -> f64 {
    let hundredths = (200 * sum + count) / (2 * count);
    hundredths as f64 / 100.0
}
