use std::collections::BTreeMap;

use deadpool_postgres::GenericClient;
use tokio_postgres::Error as PgError;

use crate::db::util::TimedClientExt;
use crate::matching::criteria::{Criteria, GroupWeightRow, SkillWeightRow};
use crate::InternshipId;

#[derive(Default)]
struct WeightRows {
    groups: Vec<GroupWeightRow>,
    skills: Vec<SkillWeightRow>,
}

/// Load the criteria of every listed internship with two queries. Ids with
/// no weight rows still get an (empty) entry, in input order.
pub async fn fetch_criteria_for(
    client: &impl GenericClient,
    internship_ids: &[InternshipId],
) -> Result<Vec<Criteria>, PgError> {
    if internship_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut rows: BTreeMap<InternshipId, WeightRows> = BTreeMap::new();

    let group_rows = client
        .timed_query(
            "SELECT internship_id, group_id, weight
             FROM placement.group_weights
             WHERE internship_id = ANY($1)",
            &[&internship_ids],
            "fetch_group_weights",
        )
        .await?;
    for row in &group_rows {
        rows.entry(row.get("internship_id"))
            .or_default()
            .groups
            .push((row.get("group_id"), row.get("weight")));
    }

    let skill_rows = client
        .timed_query(
            "SELECT sw.internship_id, sw.skill_id, s.group_id, sw.weight
             FROM placement.skill_weights sw
             JOIN placement.skills s ON s.id = sw.skill_id
             WHERE sw.internship_id = ANY($1)",
            &[&internship_ids],
            "fetch_skill_weights",
        )
        .await?;
    for row in &skill_rows {
        rows.entry(row.get("internship_id"))
            .or_default()
            .skills
            .push((row.get("skill_id"), row.get("group_id"), row.get("weight")));
    }

    Ok(internship_ids
        .iter()
        .map(|&internship_id| match rows.get(&internship_id) {
            Some(found) => Criteria::from_rows(internship_id, &found.groups, &found.skills),
            None => Criteria::empty(internship_id),
        })
        .collect())
}

pub async fn fetch_criteria(
    client: &impl GenericClient,
    internship_id: InternshipId,
) -> Result<Criteria, PgError> {
    let mut criteria = fetch_criteria_for(client, &[internship_id]).await?;
    Ok(criteria
        .pop()
        .unwrap_or_else(|| Criteria::empty(internship_id)))
}
