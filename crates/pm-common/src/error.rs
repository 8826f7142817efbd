use thiserror::Error;

use crate::store::StoreError;
use crate::{InternshipId, QuestionId, SkillId, StudentId};

/// Errors surfaced by the matching engine to its immediate caller.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("answer value {value} out of range 1..=5 (skill {skill_id}, question {question_id})")]
    InvalidAnswerValue {
        skill_id: SkillId,
        question_id: QuestionId,
        value: i32,
    },
    #[error("question {question_id} of skill {skill_id} answered more than once")]
    DuplicateAnswer {
        skill_id: SkillId,
        question_id: QuestionId,
    },
    #[error("student not found: {0}")]
    StudentNotFound(StudentId),
    #[error("internship not found: {0}")]
    InternshipNotFound(InternshipId),
    #[error("invalid ranking: {0}")]
    InvalidRanking(String),
    #[error("persistence failed for student {student_id}: {source}")]
    PersistenceFailure {
        student_id: StudentId,
        #[source]
        source: StoreError,
    },
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl EngineError {
    /// True for caller mistakes (bad answers, unknown ids) as opposed to
    /// storage-side failures.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidAnswerValue { .. }
                | EngineError::DuplicateAnswer { .. }
                | EngineError::StudentNotFound(_)
                | EngineError::InternshipNotFound(_)
                | EngineError::InvalidRanking(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_input_errors() {
        assert!(EngineError::StudentNotFound(1).is_input_error());
        assert!(
            EngineError::InvalidAnswerValue {
                skill_id: 1,
                question_id: 2,
                value: 9
            }
            .is_input_error()
        );

        let storage = EngineError::PersistenceFailure {
            student_id: 1,
            source: StoreError::Conflict("rank collision".into()),
        };
        assert!(!storage.is_input_error());
        assert!(storage.to_string().contains("student 1"));
    }
}
