//! Session timing: matched subsequence per session, then mean/median per
//! transition

use std::collections::BTreeMap;
use waypoint_core::UtcDateTime;
use waypoint_query::{HitKind, NormalizedHit, ValuePattern};

use crate::types::{EntryMode, TimingResult};

/// `from_step` of the whole-funnel record
pub const TOTAL_STEP: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingRecord {
    pub from_step: i64,
    pub to_step: i64,
    pub diff_seconds: f64,
}

/// Timestamps of the matched hits, one per step reached.
///
/// Step 0 anchors on the first pageview matching it. In strict mode each
/// later step must be the very next pageview; in loose mode it is the first
/// matching pageview after the previous match. Matching stops at the first
/// unmet step.
pub fn match_session(
    hits: &[NormalizedHit],
    steps: &[ValuePattern],
    mode: EntryMode,
) -> Vec<UtcDateTime> {
    let pageviews: Vec<&NormalizedHit> = hits
        .iter()
        .filter(|hit| hit.kind == HitKind::Pageview)
        .collect();

    let Some((first, rest)) = steps.split_first() else {
        return Vec::new();
    };
    let Some(mut last_matched) = pageviews
        .iter()
        .position(|hit| first.matches(&hit.path_or_name))
    else {
        return Vec::new();
    };

    let mut matched = vec![pageviews[last_matched].timestamp];
    for step in rest {
        let next = match mode {
            EntryMode::Strict => Some(last_matched + 1)
                .filter(|&i| pageviews.get(i).is_some_and(|hit| step.matches(&hit.path_or_name))),
            EntryMode::Loose => (last_matched + 1..pageviews.len())
                .find(|&i| step.matches(&pageviews[i].path_or_name)),
        };
        match next {
            Some(position) => {
                last_matched = position;
                matched.push(pageviews[position].timestamp);
            }
            None => break,
        }
    }

    matched
}

fn seconds_between(from: UtcDateTime, to: UtcDateTime) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

/// Transition records for one session, plus the total when every step matched
pub fn session_records(
    hits: &[NormalizedHit],
    steps: &[ValuePattern],
    mode: EntryMode,
) -> Vec<TimingRecord> {
    let matched = match_session(hits, steps, mode);

    let mut records: Vec<TimingRecord> = matched
        .windows(2)
        .enumerate()
        .map(|(from, pair)| TimingRecord {
            from_step: from as i64,
            to_step: from as i64 + 1,
            diff_seconds: seconds_between(pair[0], pair[1]),
        })
        .collect();

    if !steps.is_empty() && matched.len() == steps.len() {
        if let (Some(first), Some(last)) = (matched.first(), matched.last()) {
            records.push(TimingRecord {
                from_step: TOTAL_STEP,
                to_step: steps.len() as i64 - 1,
                diff_seconds: seconds_between(*first, *last),
            });
        }
    }

    records
}

/// Nearest-rank percentile of sorted values: the value at rank ceil(p·n)
fn nearest_rank(sorted: &[f64], percentile: f64) -> f64 {
    let rank = (percentile * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Groups records by `(from_step, to_step)`. Transitions come first in
/// `from_step` order, the total row last. Groups without records do not
/// appear.
pub fn aggregate(records: impl IntoIterator<Item = TimingRecord>) -> Vec<TimingResult> {
    let mut groups: BTreeMap<(bool, i64, i64), Vec<f64>> = BTreeMap::new();
    for record in records {
        groups
            .entry((record.from_step == TOTAL_STEP, record.from_step, record.to_step))
            .or_default()
            .push(record.diff_seconds);
    }

    groups
        .into_iter()
        .map(|((_, from_step, to_step), mut values)| {
            values.sort_by(f64::total_cmp);
            let sample_count = values.len();
            TimingResult {
                from_step,
                to_step,
                avg_seconds: values.iter().sum::<f64>() / sample_count as f64,
                median_seconds: nearest_rank(&values, 0.5),
                sample_count: sample_count as u64,
            }
        })
        .collect()
}
