use serde::Serialize;

use super::aggregation::SkillScores;
use super::criteria::{EffectiveWeights, WeightShare, gcd};
use crate::SkillId;

pub const MAX_SKILL_SCORE: f64 = 5.0;

const MAX_POINTS_HUNDREDTHS: u128 = 10_000;

/// Round to 2 decimals, halves up. A scaled value within float noise of a
/// `.5` boundary counts as the boundary.
pub fn round2(value: f64) -> f64 {
    let scaled = value * 100.0;
    let nudge = scaled.abs().max(1.0) * 4.0 * f64::EPSILON;
    (scaled + nudge + 0.5).floor() / 100.0
}

/// Stored scores carry 2 decimals; read them back as integer hundredths.
fn score_hundredths(score: f64) -> u128 {
    (score.clamp(0.0, MAX_SKILL_SCORE) * 100.0).round() as u128
}

/// Non-negative fraction for summing contributions without binary rounding.
#[derive(Debug, Clone, Copy)]
struct Exact {
    numer: u128,
    denom: u128,
}

impl Exact {
    const ZERO: Self = Self { numer: 0, denom: 1 };

    /// `share * (score / 5)` in hundredths of a percentage point, which is
    /// `20 * share * score_hundredths`.
    fn contribution(share: WeightShare, score: Option<f64>) -> Option<Self> {
        let Some(score) = score else {
            return Some(Self::ZERO);
        };
        let numer = share
            .numer()
            .checked_mul(20)?
            .checked_mul(score_hundredths(score))?;
        Some(Self::reduced(numer, share.denom()))
    }

    fn reduced(numer: u128, denom: u128) -> Self {
        let divisor = gcd(numer, denom).max(1);
        Self {
            numer: numer / divisor,
            denom: denom / divisor,
        }
    }

    fn checked_add(self, other: Self) -> Option<Self> {
        let common = gcd(self.denom, other.denom).max(1);
        let denom = (self.denom / common).checked_mul(other.denom)?;
        let numer = self
            .numer
            .checked_mul(other.denom / common)?
            .checked_add(other.numer.checked_mul(self.denom / common)?)?;
        Some(Self::reduced(numer, denom))
    }

    fn round_half_up(self) -> u128 {
        let whole = self.numer / self.denom;
        let rest = self.numer % self.denom;
        if rest >= self.denom - rest { whole + 1 } else { whole }
    }
}

fn hundredths_to_percent(hundredths: u128) -> f64 {
    hundredths.min(MAX_POINTS_HUNDREDTHS) as f64 / 100.0
}

/// Compatibility percentage between one student and one internship.
///
/// `100 * Σ effective_weight * (score / 5)`, clamped to [0, 100] and rounded
/// half-up to 2 decimals from the exact value. A weighted skill the student
/// has no score for contributes nothing.
pub fn compatibility(scores: &SkillScores, weights: &EffectiveWeights) -> f64 {
    let exact = weights.iter().try_fold(Exact::ZERO, |total, (skill_id, share)| {
        total.checked_add(Exact::contribution(share, scores.get(skill_id))?)
    });

    match exact {
        Some(total) => hundredths_to_percent(total.round_half_up()),
        None => approximate(scores, weights),
    }
}

// Only reached when the exact sum overflows u128.
fn approximate(scores: &SkillScores, weights: &EffectiveWeights) -> f64 {
    let percent: f64 = weights
        .iter()
        .map(|(skill_id, share)| float_points(share, scores.get(skill_id)))
        .sum();
    if !percent.is_finite() {
        return 0.0;
    }
    round2(percent.clamp(0.0, 100.0))
}

fn float_points(share: WeightShare, score: Option<f64>) -> f64 {
    score.map_or(0.0, |score| {
        share.as_f64() * score_hundredths(score) as f64 / 5.0
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkillContribution {
    pub skill_id: SkillId,
    pub effective_weight: f64,
    pub score: Option<f64>,
    /// Percentage points this skill adds to the total.
    pub points: f64,
}

/// Per-skill view of a compatibility score for review screens.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompatibilityBreakdown {
    pub total: f64,
    pub skills: Vec<SkillContribution>,
}

pub fn compatibility_breakdown(
    scores: &SkillScores,
    weights: &EffectiveWeights,
) -> CompatibilityBreakdown {
    let skills: Vec<_> = weights
        .iter()
        .map(|(skill_id, share)| {
            let score = scores.get(skill_id);
            let points = match Exact::contribution(share, score) {
                Some(exact) => hundredths_to_percent(exact.round_half_up()),
                None => round2(float_points(share, score)),
            };
            SkillContribution {
                skill_id,
                effective_weight: share.as_f64(),
                score,
                points,
            }
        })
        .collect();

    CompatibilityBreakdown {
        total: compatibility(scores, weights),
        skills,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::aggregation::SkillScore;
    use crate::matching::criteria::{Criteria, resolve_effective_weights};

    const LANG: i64 = 10;
    const JAVA: i64 = 1;
    const SQL: i64 = 2;

    fn scores(pairs: &[(i64, f64)]) -> SkillScores {
        SkillScores::from_scores(pairs.iter().map(|&(skill_id, score)| SkillScore {
            skill_id,
            score,
        }))
    }

    fn java_sql_weights() -> EffectiveWeights {
        resolve_effective_weights(&Criteria::from_rows(
            1,
            &[(LANG, 100)],
            &[(JAVA, LANG, 70), (SQL, LANG, 30)],
        ))
    }

    #[test]
    fn combines_weights_and_scores() {
        let result = compatibility(&scores(&[(JAVA, 5.0), (SQL, 3.0)]), &java_sql_weights());
        assert_eq!(result, 88.0);
    }

    #[test]
    fn missing_scores_count_as_zero() {
        let result = compatibility(&scores(&[(JAVA, 5.0)]), &java_sql_weights());
        assert_eq!(result, 70.0);

        assert_eq!(compatibility(&SkillScores::default(), &java_sql_weights()), 0.0);
    }

    #[test]
    fn no_criteria_scores_zero() {
        let result = compatibility(&scores(&[(JAVA, 5.0)]), &EffectiveWeights::default());
        assert_eq!(result, 0.0);
    }

    #[test]
    fn stays_within_bounds() {
        let perfect = compatibility(&scores(&[(JAVA, 5.0), (SQL, 5.0)]), &java_sql_weights());
        assert_eq!(perfect, 100.0);

        // Corrupt stored scores are clamped rather than pushing past 100.
        let inflated = compatibility(&scores(&[(JAVA, 50.0), (SQL, 5.0)]), &java_sql_weights());
        assert_eq!(inflated, 100.0);

        let minimum = compatibility(&scores(&[(JAVA, 1.0), (SQL, 1.0)]), &java_sql_weights());
        assert_eq!(minimum, 20.0);
    }

    #[test]
    fn rounds_to_two_decimals() {
        // 100 * (0.7 * 4.33 / 5) = 60.62
        let result = compatibility(&scores(&[(JAVA, 4.33)]), &java_sql_weights());
        assert_eq!(result, 60.62);
        assert_eq!(round2(12.345_1), 12.35);
        assert_eq!(round2(2.975), 2.98);
    }

    #[test]
    fn exact_halves_round_up() {
        // Weights 10 and 70 leave the only weighted skill an exact 1/8 share.
        let weights = resolve_effective_weights(&Criteria::from_rows(
            1,
            &[(LANG, 10), (20, 70)],
            &[(JAVA, LANG, 100)],
        ));

        for (score, expected) in [(1.19, 2.98), (1.39, 3.48), (1.41, 3.53), (3.0, 7.5)] {
            assert_eq!(
                compatibility(&scores(&[(JAVA, score)]), &weights),
                expected,
                "score {score}"
            );
        }

        for hundredths in 100..=500_u32 {
            let score = f64::from(hundredths) / 100.0;
            // 100 * (1/8) * (score / 5) = hundredths / 40 percent, rounded half-up.
            let expected = f64::from((hundredths * 10 + 2) / 4) / 100.0;
            assert_eq!(
                compatibility(&scores(&[(JAVA, score)]), &weights),
                expected,
                "score {score}"
            );
        }
    }

    #[test]
    fn equal_exact_values_produce_equal_scores() {
        // Swapped skill weights over equal scores: the same exact total.
        let a = java_sql_weights();
        let b = resolve_effective_weights(&Criteria::from_rows(
            2,
            &[(LANG, 100)],
            &[(JAVA, LANG, 30), (SQL, LANG, 70)],
        ));
        let student = scores(&[(JAVA, 3.0), (SQL, 3.0)]);

        assert_eq!(compatibility(&student, &a), compatibility(&student, &b));
        assert_eq!(compatibility(&student, &a), 60.0);
    }

    #[test]
    fn breakdown_lists_each_weighted_skill() {
        let breakdown =
            compatibility_breakdown(&scores(&[(JAVA, 5.0), (SQL, 3.0)]), &java_sql_weights());

        assert_eq!(breakdown.total, 88.0);
        assert_eq!(breakdown.skills.len(), 2);
        assert_eq!(breakdown.skills[0].skill_id, JAVA);
        assert_eq!(breakdown.skills[0].points, 70.0);
        assert_eq!(breakdown.skills[1].points, 18.0);
        assert_eq!(breakdown.skills[1].score, Some(3.0));
    }
}
