use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::{GroupId, InternshipId, SkillId};

pub const MAX_WEIGHT: i32 = 100;

/// Weight of one skill inside its group, as entered by the employer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkillCriteria {
    pub skill_id: SkillId,
    pub weight: u8,
}

/// One skill group of an internship's criteria.
///
/// `weight` is `None` when no group weight row exists; such a group still
/// carries its skill rows so the audit can report them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupCriteria {
    pub group_id: GroupId,
    pub weight: Option<u8>,
    pub skills: Vec<SkillCriteria>,
}

/// Two-level weight hierarchy of one internship.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Criteria {
    pub internship_id: InternshipId,
    pub groups: Vec<GroupCriteria>,
}

/// Flat group weight row: (group, weight).
pub type GroupWeightRow = (GroupId, i32);
/// Flat skill weight row: (skill, owning group, weight).
pub type SkillWeightRow = (SkillId, GroupId, i32);

impl Criteria {
    pub fn empty(internship_id: InternshipId) -> Self {
        Self {
            internship_id,
            groups: Vec::new(),
        }
    }

    /// Build the hierarchy from the flat `group_weights` / `skill_weights`
    /// rows. Weights outside 0..=100 are clamped.
    pub fn from_rows(
        internship_id: InternshipId,
        group_rows: &[GroupWeightRow],
        skill_rows: &[SkillWeightRow],
    ) -> Self {
        let mut groups: BTreeMap<GroupId, GroupCriteria> = BTreeMap::new();

        for &(group_id, weight) in group_rows {
            let group = groups.entry(group_id).or_insert_with(|| GroupCriteria {
                group_id,
                weight: None,
                skills: Vec::new(),
            });
            group.weight = Some(clamp_weight(internship_id, weight));
        }

        for &(skill_id, group_id, weight) in skill_rows {
            let group = groups.entry(group_id).or_insert_with(|| GroupCriteria {
                group_id,
                weight: None,
                skills: Vec::new(),
            });
            group.skills.push(SkillCriteria {
                skill_id,
                weight: clamp_weight(internship_id, weight),
            });
        }

        let mut groups: Vec<_> = groups.into_values().collect();
        for group in &mut groups {
            group.skills.sort_by_key(|s| s.skill_id);
        }

        Self {
            internship_id,
            groups,
        }
    }
}

fn clamp_weight(internship_id: InternshipId, weight: i32) -> u8 {
    if !(0..=MAX_WEIGHT).contains(&weight) {
        warn!(internship_id, weight, "criteria weight out of range; clamping");
    }
    weight.clamp(0, MAX_WEIGHT) as u8
}

pub(crate) fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Exact `numer / denom` share of the evaluation weight, kept reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeightShare {
    numer: u128,
    denom: u128,
}

impl WeightShare {
    fn new(numer: u128, denom: u128) -> Self {
        let divisor = gcd(numer, denom).max(1);
        Self {
            numer: numer / divisor,
            denom: denom / divisor,
        }
    }

    pub fn numer(&self) -> u128 {
        self.numer
    }

    pub fn denom(&self) -> u128 {
        self.denom
    }

    pub fn as_f64(&self) -> f64 {
        self.numer as f64 / self.denom as f64
    }

    fn plus(self, other: Self) -> Self {
        Self::new(
            self.numer * other.denom + other.numer * self.denom,
            self.denom * other.denom,
        )
    }
}

/// Each weighted skill's share of an internship's total evaluation weight.
/// Shares sum to at most 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EffectiveWeights {
    weights: BTreeMap<SkillId, WeightShare>,
}

impl EffectiveWeights {
    pub fn get(&self, skill_id: SkillId) -> f64 {
        self.share(skill_id).map_or(0.0, |share| share.as_f64())
    }

    pub fn share(&self, skill_id: SkillId) -> Option<WeightShare> {
        self.weights.get(&skill_id).copied()
    }

    pub fn total(&self) -> f64 {
        self.weights.values().map(WeightShare::as_f64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SkillId, WeightShare)> + '_ {
        self.weights.iter().map(|(skill, share)| (*skill, *share))
    }
}

/// Flatten the criteria into effective weights.
///
/// Group shares divide by the sum of configured group weights, skill shares by
/// the sum of configured skill weights inside the group, so totals that miss
/// 100 are normalized rather than rejected. A missing weight and a zero weight
/// are treated the same: the skill is left out of the mapping.
pub fn resolve_effective_weights(criteria: &Criteria) -> EffectiveWeights {
    let group_total: u32 = criteria
        .groups
        .iter()
        .filter_map(|g| g.weight)
        .map(u32::from)
        .sum();

    let mut weights: BTreeMap<SkillId, WeightShare> = BTreeMap::new();
    if group_total == 0 {
        return EffectiveWeights { weights };
    }

    for group in &criteria.groups {
        let Some(group_weight) = group.weight.filter(|w| *w > 0) else {
            continue;
        };
        let skill_total: u32 = group.skills.iter().map(|s| u32::from(s.weight)).sum();
        if skill_total == 0 {
            continue;
        }

        for skill in group.skills.iter().filter(|s| s.weight > 0) {
            let share = WeightShare::new(
                u128::from(group_weight) * u128::from(skill.weight),
                u128::from(group_total) * u128::from(skill_total),
            );
            weights
                .entry(skill.skill_id)
                .and_modify(|existing| *existing = existing.plus(share))
                .or_insert(share);
        }
    }

    EffectiveWeights { weights }
}

/// Data-entry findings on an internship's criteria. None of them block
/// scoring; they mirror the "must total 100%" hints of the criteria form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CriteriaIssue {
    NoGroupWeights,
    GroupTotalNot100 { total: u32 },
    SkillTotalNot100 { group_id: GroupId, total: u32 },
    GroupWithoutWeightedSkills { group_id: GroupId },
    SkillsInUnweightedGroup { group_id: GroupId },
}

pub fn audit_criteria(criteria: &Criteria) -> Vec<CriteriaIssue> {
    let mut issues = Vec::new();

    let weighted: Vec<_> = criteria
        .groups
        .iter()
        .filter(|g| g.weight.is_some_and(|w| w > 0))
        .collect();
    let group_total: u32 = weighted
        .iter()
        .filter_map(|g| g.weight)
        .map(u32::from)
        .sum();

    if weighted.is_empty() {
        issues.push(CriteriaIssue::NoGroupWeights);
    } else if group_total != 100 {
        issues.push(CriteriaIssue::GroupTotalNot100 { total: group_total });
    }

    for group in &criteria.groups {
        let skill_total: u32 = group.skills.iter().map(|s| u32::from(s.weight)).sum();
        let group_weighted = group.weight.is_some_and(|w| w > 0);

        match (group_weighted, skill_total) {
            (true, 0) => issues.push(CriteriaIssue::GroupWithoutWeightedSkills {
                group_id: group.group_id,
            }),
            (true, total) if total != 100 => issues.push(CriteriaIssue::SkillTotalNot100 {
                group_id: group.group_id,
                total,
            }),
            (false, total) if total > 0 => issues.push(CriteriaIssue::SkillsInUnweightedGroup {
                group_id: group.group_id,
            }),
            _ => {}
        }
    }

    issues
}
