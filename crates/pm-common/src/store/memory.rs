use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{MatchingStore, StoreError, StoredMatch, to_stored_matches};
use crate::matching::aggregation::{SkillScore, SkillScores};
use crate::matching::criteria::{Criteria, GroupWeightRow, SkillWeightRow};
use crate::matching::ranking::RankedMatch;
use crate::{GroupId, InternshipId, SkillId, StudentId};

#[derive(Debug, Default)]
struct State {
    students: BTreeMap<StudentId, bool>,
    internships: BTreeMap<InternshipId, bool>,
    skill_groups: BTreeMap<SkillId, GroupId>,
    skill_scores: BTreeMap<(StudentId, SkillId), f64>,
    group_weights: BTreeMap<(InternshipId, GroupId), i32>,
    skill_weights: BTreeMap<(InternshipId, SkillId), i32>,
    matches: BTreeMap<StudentId, Vec<StoredMatch>>,
    rejected_match_writes: BTreeSet<StudentId>,
}

/// Process-local `MatchingStore`.
///
/// Every write runs under one lock, so a replace is either fully applied or
/// not at all, and writes for the same student never interleave.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_student(&self, student_id: StudentId) -> &Self {
        self.write().students.entry(student_id).or_insert(false);
        self
    }

    pub fn add_internship(&self, internship_id: InternshipId, active: bool) -> &Self {
        self.write().internships.insert(internship_id, active);
        self
    }

    pub fn add_skill(&self, skill_id: SkillId, group_id: GroupId) -> &Self {
        self.write().skill_groups.insert(skill_id, group_id);
        self
    }

    pub fn set_group_weight(
        &self,
        internship_id: InternshipId,
        group_id: GroupId,
        weight: i32,
    ) -> &Self {
        self.write()
            .group_weights
            .insert((internship_id, group_id), weight);
        self
    }

    pub fn set_skill_weight(
        &self,
        internship_id: InternshipId,
        skill_id: SkillId,
        weight: i32,
    ) -> &Self {
        self.write()
            .skill_weights
            .insert((internship_id, skill_id), weight);
        self
    }

    /// Make every following match write for the student fail, as an aborted
    /// transaction would.
    #[cfg(any(test, feature = "test-util"))]
    pub fn reject_match_writes(&self, student_id: StudentId, reject: bool) -> &Self {
        let mut state = self.write();
        if reject {
            state.rejected_match_writes.insert(student_id);
        } else {
            state.rejected_match_writes.remove(&student_id);
        }
        self
    }

    pub fn is_submitted(&self, student_id: StudentId) -> bool {
        self.read().students.get(&student_id).copied().unwrap_or(false)
    }

    fn criteria_for(state: &State, internship_id: InternshipId) -> Criteria {
        let group_rows: Vec<GroupWeightRow> = state
            .group_weights
            .range((internship_id, GroupId::MIN)..=(internship_id, GroupId::MAX))
            .map(|(&(_, group_id), &weight)| (group_id, weight))
            .collect();

        let skill_rows: Vec<SkillWeightRow> = state
            .skill_weights
            .range((internship_id, SkillId::MIN)..=(internship_id, SkillId::MAX))
            .filter_map(|(&(_, skill_id), &weight)| {
                state
                    .skill_groups
                    .get(&skill_id)
                    .map(|&group_id| (skill_id, group_id, weight))
            })
            .collect();

        Criteria::from_rows(internship_id, &group_rows, &skill_rows)
    }
}

impl MatchingStore for InMemoryStore {
    async fn student_exists(&self, student_id: StudentId) -> Result<bool, StoreError> {
        Ok(self.read().students.contains_key(&student_id))
    }

    async fn internship_exists(&self, internship_id: InternshipId) -> Result<bool, StoreError> {
        Ok(self.read().internships.contains_key(&internship_id))
    }

    async fn load_skill_scores(&self, student_id: StudentId) -> Result<SkillScores, StoreError> {
        let state = self.read();
        Ok(SkillScores::from_scores(
            state
                .skill_scores
                .range((student_id, SkillId::MIN)..=(student_id, SkillId::MAX))
                .map(|(&(_, skill_id), &score)| SkillScore { skill_id, score }),
        ))
    }

    async fn replace_skill_scores(
        &self,
        student_id: StudentId,
        scores: &[SkillScore],
    ) -> Result<(), StoreError> {
        let mut state = self.write();
        if !state.students.contains_key(&student_id) {
            return Err(StoreError::Conflict(format!("unknown student {student_id}")));
        }
        if let Some(unknown) = scores
            .iter()
            .find(|s| !state.skill_groups.contains_key(&s.skill_id))
        {
            return Err(StoreError::Conflict(format!(
                "unknown skill {}",
                unknown.skill_id
            )));
        }

        state.skill_scores.retain(|(owner, _), _| *owner != student_id);
        for score in scores {
            state
                .skill_scores
                .insert((student_id, score.skill_id), score.score);
        }
        state.students.insert(student_id, true);
        Ok(())
    }

    async fn load_criteria(&self, internship_id: InternshipId) -> Result<Criteria, StoreError> {
        Ok(Self::criteria_for(&self.read(), internship_id))
    }

    async fn active_criteria(&self) -> Result<Vec<Criteria>, StoreError> {
        let state = self.read();
        Ok(state
            .internships
            .iter()
            .filter(|(_, active)| **active)
            .map(|(&internship_id, _)| Self::criteria_for(&state, internship_id))
            .collect())
    }

    async fn submitted_student_ids(&self) -> Result<Vec<StudentId>, StoreError> {
        Ok(self
            .read()
            .students
            .iter()
            .filter(|(_, submitted)| **submitted)
            .map(|(&id, _)| id)
            .collect())
    }

    async fn replace_matches(
        &self,
        student_id: StudentId,
        matches: &[RankedMatch],
    ) -> Result<(), StoreError> {
        let mut state = self.write();
        if state.rejected_match_writes.contains(&student_id) {
            return Err(StoreError::Conflict(format!(
                "match write rejected for student {student_id}"
            )));
        }
        if !state.students.contains_key(&student_id) {
            return Err(StoreError::Conflict(format!("unknown student {student_id}")));
        }

        let mut seen = BTreeSet::new();
        for m in matches {
            if !state.internships.contains_key(&m.internship_id) {
                return Err(StoreError::Conflict(format!(
                    "unknown internship {}",
                    m.internship_id
                )));
            }
            if !seen.insert(m.internship_id) {
                return Err(StoreError::Conflict(format!(
                    "internship {} listed twice",
                    m.internship_id
                )));
            }
        }

        state
            .matches
            .insert(student_id, to_stored_matches(student_id, matches));
        Ok(())
    }

    async fn load_matches(&self, student_id: StudentId) -> Result<Vec<StoredMatch>, StoreError> {
        Ok(self
            .read()
            .matches
            .get(&student_id)
            .cloned()
            .unwrap_or_default())
    }
}
