use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::aggregation::SkillScores;
use super::criteria::EffectiveWeights;
use super::scoring::compatibility;
use crate::InternshipId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankedMatch {
    pub internship_id: InternshipId,
    pub score: f64,
}

/// Score descending, then internship id ascending.
pub fn match_order(a: &RankedMatch, b: &RankedMatch) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.internship_id.cmp(&b.internship_id))
}

/// Score every candidate internship and keep the best `k`.
///
/// Fewer than `k` candidates yields all of them; a student without scores
/// still gets a fully ordered list.
pub fn rank_internships(
    scores: &SkillScores,
    candidates: &[(InternshipId, EffectiveWeights)],
    k: usize,
) -> Vec<RankedMatch> {
    let mut ranked: Vec<_> = candidates
        .iter()
        .map(|(internship_id, weights)| RankedMatch {
            internship_id: *internship_id,
            score: compatibility(scores, weights),
        })
        .collect();

    ranked.sort_by(match_order);
    ranked.truncate(k);
    ranked
}
