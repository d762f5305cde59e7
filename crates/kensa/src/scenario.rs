//! Scenario model
//!
//! A scenario file is an ordered YAML list of records. Each record names one
//! piece of content to verify plus the lead gate and replay rules it is
//! expected to enforce. Records are parsed into typed values and validated
//! up front, so malformed input fails before any browser is launched.
//!
//! ```yaml
//! - id: gacha_line_3
//!   content_type: gacha
//!   name: LINE gate, three draws
//!   url: https://example.com/g/abc
//!   lead_type: line
//!   draw_count: 3
//!   lead_params:
//!     reuse_policy: used_after_n
//!     reuse_allowed_times: 2
//! ```

use crate::result::{KensaError, KensaResult};
use crate::selectors;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

/// Keys every scenario record must carry
pub const REQUIRED_KEYS: [&str; 5] = ["id", "content_type", "name", "url", "lead_type"];

/// Highest draw count the draw-count screen offers
pub const MAX_DRAW_COUNT: u32 = 10;

// =============================================================================
// ENUMERATIONS
// =============================================================================

/// Kind of marketing content under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Card-draw content
    Gacha,
    /// Three-question quiz with a scored result
    Diagnose,
    /// Survey content (no verification flow exists)
    Survey,
}

impl ContentType {
    /// Label of the start control on this content's Top screen
    #[must_use]
    pub const fn start_text(self) -> &'static str {
        match self {
            Self::Diagnose => selectors::diagnose::START_TEXT,
            Self::Gacha | Self::Survey => selectors::gacha::START_GACHA_TEXT,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Gacha => "gacha",
            Self::Diagnose => "diagnose",
            Self::Survey => "survey",
        };
        write!(f, "{s}")
    }
}

/// Lead-capture gate in front of the content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadType {
    /// No gate
    None,
    /// LINE OAuth consent
    Line,
    /// SNS follow gate
    Sns,
    /// First-party form
    Form,
    /// Embedded third-party form in an iframe
    EmbedForm,
}

impl fmt::Display for LeadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Line => "line",
            Self::Sns => "sns",
            Self::Form => "form",
            Self::EmbedForm => "embed_form",
        };
        write!(f, "{s}")
    }
}

/// Gacha sub-mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GachaMode {
    /// Draw-count selection, then card reveal
    #[default]
    Bulk,
    /// One start button, straight to the result
    Single,
}

/// Replay rule enforced after a completed play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReusePolicy {
    /// Replay with the same identity shows the used notice
    MustUsed,
    /// Replay with the same identity proceeds
    MustReusable,
    /// N more plays proceed, the next shows the used notice
    UsedAfterN,
    /// Either outcome is accepted
    #[default]
    Either,
}

/// Which "already used" notice the content shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsedToastType {
    /// Daily limit notice
    #[default]
    Multi,
    /// One-time notice
    Once,
}

/// Point in the diagnose flow where the lead gate appears
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadTiming {
    /// Right after the start button
    #[default]
    BeforeStart,
    /// Right after the result button
    BeforeResult,
}

/// Scoring mode of a diagnose quiz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnoseType {
    /// One summed axis bucketed by thresholds
    AxisPoint,
    /// Per-outcome point vectors, highest wins
    Additive,
}

// =============================================================================
// DIAGNOSE PARAMETERS
// =============================================================================

/// A single or multi-select answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    /// One label
    One(String),
    /// Several labels (multi-select question)
    Many(Vec<String>),
}

impl Answer {
    /// Answer labels in click order
    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        match self {
            Self::One(s) => vec![s.as_str()],
            Self::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }

    /// Whether the answer is multi-select
    #[must_use]
    pub const fn is_multi(&self) -> bool {
        matches!(self, Self::Many(_))
    }
}

/// Quiz answers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answers {
    /// First question
    pub q1: String,
    /// Second question
    pub q2: String,
    /// Third question, possibly multi-select
    pub q3: Answer,
}

/// Branch expectations for questions two and three
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BranchExpected {
    /// Text that must appear on question two
    pub q2_text: Option<String>,
    /// Text that must appear on question three
    pub q3_text: Option<String>,
    /// Question three must be multi-select
    pub q3_multi: bool,
}

/// Points awarded for one answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointValue {
    /// Axis mode
    Scalar(i64),
    /// Additive mode, outcome key to points
    Vector(BTreeMap<String, i64>),
}

/// Point tables per question
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerPoints {
    /// First question
    pub q1: BTreeMap<String, PointValue>,
    /// Second question
    pub q2: BTreeMap<String, PointValue>,
    /// Third question
    pub q3: BTreeMap<String, PointValue>,
}

impl AnswerPoints {
    fn values(&self) -> impl Iterator<Item = &PointValue> {
        self.q1.values().chain(self.q2.values()).chain(self.q3.values())
    }
}

/// Ordered axis buckets, `label -> [low, high]`, first inclusive match wins
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThresholdTable(Vec<(String, i64, i64)>);

impl ThresholdTable {
    /// Build a table from ordered buckets
    #[must_use]
    pub fn new(buckets: Vec<(String, i64, i64)>) -> Self {
        Self(buckets)
    }

    /// Buckets in declaration order
    #[must_use]
    pub fn buckets(&self) -> &[(String, i64, i64)] {
        &self.0
    }

    /// Whether the table has no buckets
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for ThresholdTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = ThresholdTable;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of label to [low, high]")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut buckets = Vec::new();
                while let Some((label, (low, high))) = map.next_entry::<String, (i64, i64)>()? {
                    buckets.push((label, low, high));
                }
                Ok(ThresholdTable(buckets))
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

impl Serialize for ThresholdTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, low, high) in &self.0 {
            map.serialize_entry(label, &[low, high])?;
        }
        map.end()
    }
}

// =============================================================================
// LEAD PARAMS
// =============================================================================

/// Optional per-scenario knobs; absence means the default policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadParams {
    /// Gacha sub-mode
    pub gacha_mode: GachaMode,
    /// Replay rule
    pub reuse_policy: ReusePolicy,
    /// N for `used_after_n`
    pub reuse_allowed_times: Option<u32>,
    /// Start button label on Top
    pub top_start_text: Option<String>,
    /// Which used notice to expect
    pub used_toast_type: UsedToastType,
    /// Exact draw-count option set
    pub draw_counts_expected: Option<Vec<u32>>,
    /// Options outside the expected set must be absent
    pub draw_counts_strict: bool,
    /// Run the paid purchase detour
    pub paid_gacha: bool,
    /// Quantity to purchase
    pub purchase_draw_count: Option<u32>,
    /// Diagnose lead phase
    pub lead_timing: LeadTiming,
    /// Quiz answers
    pub answers: Option<Answers>,
    /// Branch assertions
    pub branch_expected: BranchExpected,
    /// Scoring mode
    pub diagnose_type: Option<DiagnoseType>,
    /// Scoring tables
    pub answer_points: Option<AnswerPoints>,
    /// Axis buckets
    pub axis_thresholds: Option<ThresholdTable>,
    /// Additive tie-break order
    pub tie_breaker: Option<Vec<String>>,
    /// Keys this version does not understand
    #[serde(flatten, skip_serializing)]
    pub unknown: BTreeMap<String, serde_yaml_ng::Value>,
}

impl LeadParams {
    /// Start button label on Top
    #[must_use]
    pub fn top_start_text(&self) -> &str {
        self.top_start_text
            .as_deref()
            .unwrap_or(selectors::gacha::START_GACHA_TEXT)
    }

    /// Quantity to purchase in the paid detour
    #[must_use]
    pub fn purchase_draw_count(&self, draw_count: Option<u32>) -> u32 {
        self.purchase_draw_count.or(draw_count).unwrap_or(5)
    }

    /// Tie-break order for additive scoring
    #[must_use]
    pub fn tie_breaker(&self) -> Vec<String> {
        match &self.tie_breaker {
            Some(order) if !order.is_empty() => order.clone(),
            _ => ["A", "B", "C"].iter().map(|s| (*s).to_string()).collect(),
        }
    }

    fn validate(&self, id: &str) -> KensaResult<()> {
        if self.reuse_policy == ReusePolicy::UsedAfterN
            && self.reuse_allowed_times.unwrap_or(0) == 0
        {
            return Err(invalid(
                id,
                "reuse_policy used_after_n requires reuse_allowed_times >= 1",
            ));
        }
        if let Some(n) = self.purchase_draw_count {
            check_draw_count(id, "purchase_draw_count", n)?;
        }
        for n in self.draw_counts_expected.iter().flatten() {
            check_draw_count(id, "draw_counts_expected", *n)?;
        }
        if let Some(text) = &self.top_start_text {
            if text.trim().is_empty() {
                return Err(invalid(id, "top_start_text must not be empty"));
            }
        }

        match (self.diagnose_type, &self.answer_points) {
            (Some(DiagnoseType::AxisPoint), Some(points)) => {
                if self.axis_thresholds.as_ref().map_or(true, ThresholdTable::is_empty) {
                    return Err(invalid(
                        id,
                        "axis_point scoring with answer_points requires axis_thresholds",
                    ));
                }
                if points.values().any(|v| matches!(v, PointValue::Vector(_))) {
                    return Err(invalid(id, "axis_point answer_points must be integers"));
                }
            }
            (Some(DiagnoseType::Additive), Some(points)) => {
                if points.values().any(|v| matches!(v, PointValue::Scalar(_))) {
                    return Err(invalid(
                        id,
                        "additive answer_points must map outcomes to points",
                    ));
                }
            }
            _ => {}
        }

        for key in self.unknown.keys() {
            tracing::warn!(scenario = id, key = %key, "ignoring unknown lead_params key");
        }
        Ok(())
    }
}

// =============================================================================
// SCENARIO
// =============================================================================

/// One piece of content to verify
#[derive(Debug, Clone, Serialize)]
pub struct Scenario {
    /// Unique id within a run
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Content kind
    pub content_type: ContentType,
    /// Entry URL (a per-run user identifier is injected at run time)
    pub url: String,
    /// Lead gate kind
    pub lead_type: LeadType,
    /// Number of draws (gacha only)
    pub draw_count: Option<u32>,
    /// Optional knobs
    pub lead_params: LeadParams,
}

#[derive(Debug, Deserialize)]
struct ScenarioRecord {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    content_type: ContentType,
    name: String,
    url: String,
    lead_type: LeadType,
    #[serde(default)]
    draw_count: Option<u32>,
    #[serde(default)]
    lead_params: Option<serde_yaml_ng::Value>,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Int(i64),
    }
    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Text(s) => s,
        Scalar::Int(n) => n.to_string(),
    })
}

impl Scenario {
    fn from_value(index: usize, row: &serde_yaml_ng::Value) -> KensaResult<Self> {
        let label = format!("#{}", index + 1);
        let map = row
            .as_mapping()
            .ok_or_else(|| invalid(&label, "each scenario must be a mapping"))?;
        for key in REQUIRED_KEYS {
            if !map.contains_key(key) {
                return Err(invalid(&label, &format!("missing key '{key}'")));
            }
        }

        let record: ScenarioRecord = serde_yaml_ng::from_value(row.clone())
            .map_err(|e| invalid(&label, &e.to_string()))?;
        let id = record.id;

        let mut lead_params: LeadParams = match record.lead_params {
            None | Some(serde_yaml_ng::Value::Null) => LeadParams::default(),
            Some(value @ serde_yaml_ng::Value::Mapping(_)) => {
                serde_yaml_ng::from_value(value).map_err(|e| invalid(&id, &e.to_string()))?
            }
            Some(_) => return Err(invalid(&id, "lead_params must be a mapping")),
        };
        lead_params
            .top_start_text
            .get_or_insert_with(|| record.content_type.start_text().to_string());

        let scenario = Self {
            id,
            name: record.name,
            content_type: record.content_type,
            url: record.url,
            lead_type: record.lead_type,
            draw_count: record.draw_count,
            lead_params,
        };
        scenario.validate()?;
        Ok(scenario)
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> KensaResult<()> {
        if self.id.trim().is_empty() {
            return Err(KensaError::invalid_scenario("scenario id must not be empty"));
        }
        url::Url::parse(&self.url)
            .map_err(|e| invalid(&self.id, &format!("url '{}' is invalid: {e}", self.url)))?;

        match (self.content_type, self.draw_count) {
            (ContentType::Gacha, None) => {
                return Err(invalid(&self.id, "gacha scenario requires draw_count"));
            }
            (ContentType::Gacha, Some(n)) => check_draw_count(&self.id, "draw_count", n)?,
            (other, Some(_)) => {
                return Err(invalid(
                    &self.id,
                    &format!("draw_count is only valid for gacha, not {other}"),
                ));
            }
            _ => {}
        }

        if self.content_type == ContentType::Diagnose && self.lead_params.answers.is_none() {
            return Err(invalid(&self.id, "diagnose scenario requires lead_params.answers"));
        }

        self.lead_params.validate(&self.id)
    }
}

fn check_draw_count(id: &str, key: &str, n: u32) -> KensaResult<()> {
    if (1..=MAX_DRAW_COUNT).contains(&n) {
        Ok(())
    } else {
        Err(invalid(
            id,
            &format!("{key} must be between 1 and {MAX_DRAW_COUNT}, got {n}"),
        ))
    }
}

fn invalid(id: &str, message: &str) -> KensaError {
    KensaError::invalid_scenario(format!("scenario {id}: {message}"))
}

// =============================================================================
// LOADING
// =============================================================================

/// Parse a scenario list from YAML text
pub fn parse_scenarios(yaml: &str) -> KensaResult<Vec<Scenario>> {
    let raw: serde_yaml_ng::Value = serde_yaml_ng::from_str(yaml)?;
    let rows = raw
        .as_sequence()
        .ok_or_else(|| KensaError::invalid_scenario("scenario file must be a list"))?;

    let mut seen = HashSet::new();
    let mut scenarios = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let scenario = Scenario::from_value(index, row)?;
        if !seen.insert(scenario.id.clone()) {
            return Err(invalid(&scenario.id, "duplicate scenario id"));
        }
        scenarios.push(scenario);
    }
    Ok(scenarios)
}

/// Load and validate a scenario file
pub fn load_scenarios(path: &Path) -> KensaResult<Vec<Scenario>> {
    if !path.exists() {
        return Err(KensaError::invalid_scenario(format!(
            "scenario file not found: {}",
            path.display()
        )));
    }
    let text = std::fs::read_to_string(path)?;
    let scenarios = parse_scenarios(&text)?;
    tracing::info!(path = %path.display(), count = scenarios.len(), "loaded scenarios");
    Ok(scenarios)
}
