//! Kensa: scenario-driven end-to-end verification of marketing content
//!
//! Kensa (Japanese: "inspection") drives gacha and diagnose pages through a
//! browser session and checks draw mechanics, lead-capture gates, reuse
//! policy and diagnose scoring against a declarative scenario list.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        KENSA Architecture                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌─────────────────────┐    │
//! │   │ Scenario   │    │ Runner     │    │ Flow (gacha /       │    │
//! │   │ (YAML)     │───►│ (session,  │───►│ diagnose) + lead    │    │
//! │   │            │    │  trace)    │    │ gate + detector     │    │
//! │   └────────────┘    └────────────┘    └──────────┬──────────┘    │
//! │                                                  ▼               │
//! │                     pass / fail / skip  ◄──  BrowserSession      │
//! │                     + artifacts              (CDP or mock)       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

mod artifacts;
/// Chromium session over CDP
#[cfg(feature = "browser")]
#[allow(clippy::missing_errors_doc, clippy::cast_possible_truncation)]
pub mod cdp;
mod config;
mod context;
mod driver;
mod flow;
mod identity;
mod labels;
/// Lead-capture gates (LINE, SNS, form, embedded form)
#[allow(clippy::missing_errors_doc)]
pub mod lead;
/// Scriptable in-memory session used by tests and demos
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
pub mod mock;
mod result;
#[allow(clippy::missing_errors_doc, clippy::cast_possible_truncation)]
mod runner;
mod scenario;
mod scoring;
/// Screen-state detection
#[allow(clippy::missing_errors_doc)]
pub mod screen;
/// Page vocabulary of the content UI
pub mod selectors;
#[allow(clippy::cast_possible_truncation)]
mod trace;

pub use artifacts::{sanitize_id, Artifacts, LAST_CONDITION, MAX_ID_CHARS};
pub use config::{
    Credentials, FormData, HarnessConfig, LoginPair, Timeouts, DEFAULT_ARTIFACT_DIR, DEFAULT_POLL_INTERVAL_MS,
};
pub use context::{safe_click_on, RunContext};
pub use driver::{BrowserSession, ClickOptions, ElementInfo, PageId, Selector};
pub use flow::{
    attempt_start, check_reuse_policy, consume_all, extract_details, extract_links, link_coverage_violation,
    open_links, play_again, proceed_screens, purchase_if_paid, run_diagnose, run_gacha, unique_names, Attempt,
    CardResult, DetailItem, LinkItem,
};
pub use identity::{entry_url, fresh_user_id, with_random_user_id, with_user_id, USER_ID_KEY, USER_ID_PREFIX};
pub use labels::{extract_result_name, find_label_in_text, is_result_label, pick_result_name, KNOWN_LABELS};
pub use result::{KensaError, KensaResult};
pub use runner::{dispatch, run_scenario, run_suite, RunOutcome, ScenarioReport, SessionFactory, SuiteReport};
pub use scenario::{
    load_scenarios, parse_scenarios, Answer, AnswerPoints, Answers, BranchExpected, ContentType, DiagnoseType,
    GachaMode, LeadParams, LeadTiming, LeadType, PointValue, ReusePolicy, Scenario, ThresholdTable, UsedToastType,
    MAX_DRAW_COUNT, REQUIRED_KEYS,
};
pub use scoring::{additive_result, additive_totals, axis_result, axis_total, expected_result, result_label};
pub use trace::{RecordingSession, StepEvent, StepRecorder, StepStatus, TraceArchive, TraceMetadata};

#[cfg(feature = "browser")]
pub use cdp::{CdpOptions, CdpSession, CdpSessionFactory};
