//! Group initiative aggregation
//!
//! A finalized group acts on one integer initiative, the ceiling of its
//! members' mean roll. Members keep their relative order inside that bucket
//! through a hundredths stagger: with `n` members the top-ranked one gets
//! `+0.0n` and the lowest `+0.01`.
//!
//! Canonical order within a group is initiative descending, then tiebreak
//! descending, stable for equal pairs.

use crate::core::config::InitiativeSettings;
use crate::core::types::{round_hundredths, Member, MemberId, MemberUpdate};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;

/// One member's input to aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct InitiativeEntry {
    pub member: MemberId,
    pub name: String,
    pub initiative: f64,
    pub tiebreak: f64,
}

impl InitiativeEntry {
    /// Entry for a member with a finite initiative
    pub fn from_member(member: &Member, default_tiebreak: f64) -> Option<Self> {
        let initiative = member.initiative.filter(|v| v.is_finite())?;
        Some(Self {
            member: member.id.clone(),
            name: member.name.clone(),
            initiative,
            tiebreak: member.tiebreak.unwrap_or(default_tiebreak),
        })
    }
}

/// Value written back to one member
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub member: MemberId,
    pub initiative: f64,
    pub sort: i64,
}

/// Result of aggregating one group
#[derive(Debug, Clone, PartialEq)]
pub struct GroupOrder {
    /// Representative initiative stored on the group
    pub group_value: f64,
    /// Inputs in canonical order
    pub ranked: Vec<InitiativeEntry>,
    /// Per-member values, same order as `ranked`
    pub assignments: Vec<Assignment>,
}

impl GroupOrder {
    pub fn updates(&self) -> Vec<MemberUpdate> {
        self.assignments
            .iter()
            .map(|a| MemberUpdate::initiative(a.member.clone(), a.initiative).with_sort(a.sort))
            .collect()
    }

    /// Stagger offset of each member in hundredths, canonical order
    pub fn offsets(&self) -> Vec<i64> {
        self.assignments
            .iter()
            .map(|a| ((a.initiative - self.group_value) * 100.0).round() as i64)
            .collect()
    }
}

/// Sort entries into canonical order (stable)
pub fn canonical_order(entries: &mut [InitiativeEntry]) {
    entries.sort_by_key(|e| {
        (
            Reverse(OrderedFloat(e.initiative)),
            Reverse(OrderedFloat(e.tiebreak)),
        )
    });
}

/// Ceiling of the mean initiative, `None` for no entries
pub fn group_value(entries: &[InitiativeEntry]) -> Option<f64> {
    if entries.is_empty() {
        return None;
    }
    let sum: f64 = entries.iter().map(|e| e.initiative).sum();
    Some((sum / entries.len() as f64).ceil())
}

/// Initiative for the member `rank_from_bottom` places above the lowest (1-based)
pub fn staggered(group_value: f64, rank_from_bottom: usize) -> f64 {
    round_hundredths(group_value + rank_from_bottom as f64 * 0.01)
}

/// Aggregate a group's rolls into its representative value and stagger
///
/// `lowest_sort` is the smallest ordering key currently in the encounter;
/// the group's keys start `sort_margin` below it.
pub fn aggregate(
    entries: &[InitiativeEntry],
    lowest_sort: i64,
    settings: &InitiativeSettings,
) -> Option<GroupOrder> {
    let value = group_value(entries)?;

    let mut ranked = entries.to_vec();
    canonical_order(&mut ranked);

    let base_sort = lowest_sort - settings.sort_margin;
    let n = ranked.len();
    let assignments = ranked
        .iter()
        .enumerate()
        .map(|(idx, entry)| Assignment {
            member: entry.member.clone(),
            initiative: staggered(value, n - idx),
            sort: base_sort + idx as i64 * settings.sort_stride,
        })
        .collect();

    Some(GroupOrder {
        group_value: value,
        ranked,
        assignments,
    })
}

/// Are these initiatives exactly the stagger of `group_value` for their count?
///
/// A settled group holds `{g+0.01, .., g+0.0n}` with every rank used once.
pub fn is_settled(group_value: f64, entries: &[InitiativeEntry]) -> bool {
    if entries.is_empty() || !group_value.is_finite() {
        return false;
    }
    let n = entries.len() as i64;
    let mut ranks: Vec<i64> = Vec::with_capacity(entries.len());
    for entry in entries {
        let raw = (entry.initiative - group_value) * 100.0;
        let rank = raw.round();
        if (raw - rank).abs() > 1e-6 || rank < 1.0 || rank > n as f64 {
            return false;
        }
        ranks.push(rank as i64);
    }
    ranks.sort_unstable();
    ranks.into_iter().eq(1..=n)
}

/// Stagger of `group_value` for these members in canonical order
pub fn restagger(group_value: f64, entries: &[InitiativeEntry]) -> Vec<(MemberId, f64)> {
    let mut ranked = entries.to_vec();
    canonical_order(&mut ranked);

    let n = ranked.len();
    ranked
        .into_iter()
        .enumerate()
        .map(|(idx, entry)| (entry.member, staggered(group_value, n - idx)))
        .collect()
}

/// Stagger for a newcomer joining a finalized group
///
/// Existing members keep canonical order above the newcomer, who takes the
/// lowest slot. The returned values are the full stagger for `existing.len() + 1`
/// members, newcomer last.
pub fn stagger_with_newcomer(
    group_value: f64,
    existing: &[InitiativeEntry],
    newcomer: &MemberId,
) -> Vec<(MemberId, f64)> {
    let mut values: Vec<(MemberId, f64)> = restagger(group_value, existing)
        .into_iter()
        .map(|(member, value)| (member, round_hundredths(value + 0.01)))
        .collect();
    values.push((newcomer.clone(), staggered(group_value, 1)));
    values
}
