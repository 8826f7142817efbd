pub mod aggregation;
pub mod criteria;
pub mod pipeline;
pub mod ranking;
pub mod scoring;

pub use aggregation::{AssessmentAnswer, SkillScore, SkillScores, aggregate_answers};
pub use criteria::{
    Criteria, CriteriaIssue, EffectiveWeights, GroupCriteria, SkillCriteria, WeightShare,
    audit_criteria, resolve_effective_weights,
};
pub use ranking::{RankedMatch, rank_internships};
pub use scoring::{CompatibilityBreakdown, compatibility, compatibility_breakdown, round2};
