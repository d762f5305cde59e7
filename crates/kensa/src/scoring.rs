//! Diagnose result prediction from configured point tables.

use crate::labels::LABEL_PREFIX;
use crate::scenario::{Answers, AnswerPoints, DiagnoseType, LeadParams, PointValue, ThresholdTable};
use std::collections::BTreeMap;

fn picks(answers: &Answers) -> [(u8, Vec<&str>); 3] {
    [
        (1, vec![answers.q1.as_str()]),
        (2, vec![answers.q2.as_str()]),
        (3, answers.q3.labels()),
    ]
}

fn table(points: &AnswerPoints, question: u8) -> &BTreeMap<String, PointValue> {
    match question {
        1 => &points.q1,
        2 => &points.q2,
        _ => &points.q3,
    }
}

/// Result label for an outcome key (`A` -> `結果A`)
#[must_use]
pub fn result_label(key: &str) -> String {
    if key.starts_with(LABEL_PREFIX) {
        key.to_string()
    } else {
        format!("{LABEL_PREFIX}{key}")
    }
}

// =============================================================================
// AXIS MODE
// =============================================================================

/// Sum of scalar points over every picked answer; unknown answers score zero
#[must_use]
pub fn axis_total(answers: &Answers, points: &AnswerPoints) -> i64 {
    picks(answers)
        .iter()
        .flat_map(|(q, labels)| labels.iter().map(move |l| (*q, *l)))
        .map(|(q, label)| match table(points, q).get(label) {
            Some(PointValue::Scalar(n)) => *n,
            _ => 0,
        })
        .sum()
}

/// First bucket (in table order) whose inclusive range holds the total
#[must_use]
pub fn axis_result(total: i64, thresholds: &ThresholdTable) -> Option<String> {
    thresholds
        .buckets()
        .iter()
        .find(|(_, low, high)| (*low..=*high).contains(&total))
        .map(|(label, _, _)| result_label(label))
}

// =============================================================================
// ADDITIVE MODE
// =============================================================================

/// Per-outcome sums; every tie-break key starts at zero
#[must_use]
pub fn additive_totals(
    answers: &Answers,
    points: &AnswerPoints,
    tie_breaker: &[String],
) -> BTreeMap<String, i64> {
    let mut totals: BTreeMap<String, i64> = tie_breaker.iter().map(|k| (k.clone(), 0)).collect();
    for (q, labels) in picks(answers) {
        for label in labels {
            if let Some(PointValue::Vector(rule)) = table(points, q).get(label) {
                for (key, n) in rule {
                    *totals.entry(key.clone()).or_insert(0) += n;
                }
            }
        }
    }
    totals
}

/// Highest total wins; ties go to the earliest key in `tie_breaker`, then to
/// the lexicographically smallest key
#[must_use]
pub fn additive_result(totals: &BTreeMap<String, i64>, tie_breaker: &[String]) -> Option<String> {
    let max = totals.values().copied().max()?;
    let leaders: Vec<&String> = totals
        .iter()
        .filter(|(_, v)| **v == max)
        .map(|(k, _)| k)
        .collect();
    tie_breaker
        .iter()
        .find(|k| leaders.contains(k))
        .or_else(|| leaders.first().copied())
        .map(|k| result_label(k))
}

// =============================================================================
// EXPECTATION
// =============================================================================

/// Expected result label, or `None` when no scoring tables are configured
#[must_use]
pub fn expected_result(params: &LeadParams) -> Option<String> {
    let answers = params.answers.as_ref()?;
    let points = params.answer_points.as_ref()?;
    match params.diagnose_type? {
        DiagnoseType::AxisPoint => {
            let total = axis_total(answers, points);
            let label = axis_result(total, params.axis_thresholds.as_ref()?);
            tracing::debug!(total, expected = ?label, "axis score");
            label
        }
        DiagnoseType::Additive => {
            let order = params.tie_breaker();
            let totals = additive_totals(answers, points, &order);
            let label = additive_result(&totals, &order);
            tracing::debug!(?totals, expected = ?label, "additive score");
            label
        }
    }
}
