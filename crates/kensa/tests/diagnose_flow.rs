//! End-to-end diagnose runs against a scripted quiz
//!
//! `Quiz` shows three questions (the third multi-select), the confirm
//! screen and a single result block whose label is fixed per test, so the
//! scored expectation can be checked both ways.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use kensa::mock::{MockApp, MockEvent, MockNode, MockPage, MockSession, MockWorld};
use kensa::selectors::{diagnose, gacha};
use kensa::{
    expected_result, parse_scenarios, run_scenario, BrowserSession, HarnessConfig, KensaResult, RunOutcome,
    Scenario, ScenarioReport, SessionFactory,
};
use std::collections::BTreeSet;
use tempfile::TempDir;

const OPTIONS: [&str; 3] = ["選択肢A", "選択肢B", "選択肢C"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Top,
    Question(u8),
    Confirm,
    Result,
}

#[derive(Clone)]
struct Quiz {
    /// Result key shown after the confirm screen
    shows: &'static str,
    /// Third question renders as single-select
    single_q3: bool,
    view: View,
    picks: Vec<String>,
    used: bool,
    modal: bool,
    toast: bool,
    consumed: BTreeSet<String>,
}

impl Quiz {
    fn showing(shows: &'static str) -> Self {
        Self {
            shows,
            single_q3: false,
            view: View::Top,
            picks: Vec::new(),
            used: false,
            modal: false,
            toast: false,
            consumed: BTreeSet::new(),
        }
    }

    fn question(&self, n: u8) -> MockNode {
        let mut body = MockNode::new("body").children([
            MockNode::div().text(diagnose::QUESTION_LABEL_TEXT),
            MockNode::div().text(n.to_string()),
            MockNode::img(format!("https://cdn.example/q{n}.png"), "question image"),
            MockNode::div().text(format!("Q{n}. 質問{n}")),
        ]);
        let multi = n == 3 && !self.single_q3;
        if multi {
            body = body.child(MockNode::div().text(diagnose::MULTI_LABEL_TEXT));
        }
        body = body.children(
            OPTIONS.map(|o| MockNode::new("label").text(o).on_click(format!("pick:{o}"))),
        );
        if multi {
            body = body.child(MockNode::button(diagnose::NEXT_TEXT).on_click("next"));
        }
        body
    }

    fn result(&self) -> MockNode {
        let name = format!("結果{}", self.shows);
        let control = if self.used {
            MockNode::button(gacha::USED_TEXT).disabled(true)
        } else {
            MockNode::button(gacha::USE_TEXT).on_click("use")
        };
        let mut body = MockNode::new("body").children([
            MockNode::div().class("css-1z13ymv").children([
                MockNode::div().class("css-1xhi066").child(
                    MockNode::img(format!("https://cdn.example/result-{}.png", self.shows), name.clone())
                        .class("chakra-image"),
                ),
                MockNode::div().class("css-1cmdo0c").text(name.clone()),
                MockNode::div().class("MuiBox-root").children([
                    MockNode::new("span")
                        .attr("style", "white-space: pre-wrap;")
                        .text("あなたにぴったりのタイプです"),
                    MockNode::img("https://cdn.example/desc.png", "").class("richEditorTheme__image"),
                ]),
                control,
            ]),
            MockNode::div().class("css-1uom0pk").children([
                MockNode::new("span")
                    .attr("style", "white-space: pre-wrap;")
                    .text("おすすめ"),
                MockNode::img("https://cdn.example/item.png", "").class("richEditorTheme__image"),
                MockNode::link("https://shop.example/item")
                    .attr("target", "_blank")
                    .text("詳しく見る"),
            ]),
            MockNode::button(gacha::PLAY_AGAIN_TEXT).on_click("again"),
        ]);
        if self.modal {
            body = body.child(
                MockNode::div()
                    .attr("data-scope", "dialog")
                    .attr("data-part", "content")
                    .attr("role", "dialog")
                    .children([
                        MockNode::new("p").text(gacha::MODAL_MESSAGE),
                        MockNode::new("p").text(name),
                        MockNode::button(gacha::MODAL_BACK_TEXT).on_click("back"),
                        MockNode::button(gacha::MODAL_USE_TEXT).on_click("confirm"),
                    ]),
            );
        }
        body
    }
}

fn user_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == kensa::USER_ID_KEY)
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or_default()
}

impl MockApp for Quiz {
    fn render(&mut self, page: &MockPage) -> MockNode {
        if page.url.starts_with("https://shop.example") {
            return MockNode::new("body").text("shop");
        }
        match self.view {
            View::Top => {
                let mut body = MockNode::new("body");
                if self.toast {
                    body = body.child(
                        MockNode::div()
                            .attr("data-scope", "toast")
                            .attr("data-part", "title")
                            .text(gacha::TOAST_USED_DAILY),
                    );
                }
                body.child(MockNode::button(diagnose::START_TEXT).on_click("start"))
            }
            View::Question(n) => self.question(n),
            View::Confirm => MockNode::new("body").children([
                MockNode::div().text(diagnose::RESULT_CONFIRM_TEXT),
                MockNode::button(diagnose::RESULT_TEXT).on_click("result"),
                MockNode::button(diagnose::BACK_TO_ANSWERS_TEXT),
            ]),
            View::Result => self.result(),
        }
    }

    fn handle(&mut self, event: &MockEvent, world: &mut MockWorld<'_>) {
        let MockEvent::Click { action } = event else {
            if matches!(event, MockEvent::Navigate { .. }) {
                self.view = View::Top;
                self.toast = false;
                self.modal = false;
            }
            return;
        };
        match (action.as_str(), self.view) {
            ("start", _) if self.consumed.contains(&user_of(world.url())) => self.toast = true,
            ("start", _) => {
                self.picks.clear();
                self.view = View::Question(1);
            }
            (pick, View::Question(n)) if pick.starts_with("pick:") => {
                self.picks.push(pick.trim_start_matches("pick:").to_string());
                let multi = n == 3 && !self.single_q3;
                if n < 3 {
                    self.view = View::Question(n + 1);
                } else if !multi {
                    self.view = View::Confirm;
                }
            }
            ("next", View::Question(3)) => self.view = View::Confirm,
            ("result", _) => {
                self.view = View::Result;
                self.used = false;
            }
            ("use", _) => self.modal = true,
            ("back", _) => self.modal = false,
            ("confirm", _) => {
                self.modal = false;
                self.used = true;
                self.consumed.insert(user_of(world.url()));
            }
            ("again", _) => self.view = View::Top,
            _ => {}
        }
    }
}

struct QuizFactory(Quiz);

#[async_trait]
impl SessionFactory for QuizFactory {
    async fn create(&self, _scenario: &Scenario) -> KensaResult<Box<dyn BrowserSession>> {
        Ok(Box::new(MockSession::new(self.0.clone())))
    }
}

/// Axis scoring: 10 + 5 + 1 + 2 = 18 lands in bucket B
const SCORED: &str = r"
- id: d1
  content_type: diagnose
  name: scored quiz
  url: https://example.com/d/1
  lead_type: none
  lead_params:
    top_start_text: 診断を始める
    answers: { q1: 選択肢A, q2: 選択肢B, q3: [選択肢A, 選択肢C] }
    branch_expected: { q2_text: 質問2, q3_text: 質問3, q3_multi: true }
    diagnose_type: axis_point
    answer_points:
      q1: { 選択肢A: 10, 選択肢B: 20 }
      q2: { 選択肢A: 0, 選択肢B: 5 }
      q3: { 選択肢A: 1, 選択肢C: 2 }
    axis_thresholds: { A: [0, 9], B: [10, 19], C: [20, 100] }
";

fn scenario(yaml: &str) -> Scenario {
    parse_scenarios(yaml).unwrap().remove(0)
}

async fn run(quiz: Quiz, yaml: &str) -> ScenarioReport {
    let dir = TempDir::new().unwrap();
    let config = HarnessConfig::new().with_artifact_dir(dir.path());
    run_scenario(&QuizFactory(quiz), &scenario(yaml), &config).await
}

fn failed_condition(report: &ScenarioReport) -> Option<String> {
    match &report.outcome {
        RunOutcome::Failed { condition, .. } => condition.clone(),
        _ => None,
    }
}

#[test]
fn test_scored_expectation() {
    let sc = scenario(SCORED);
    assert_eq!(expected_result(&sc.lead_params).as_deref(), Some("結果B"));
}

#[tokio::test(start_paused = true)]
async fn test_diagnose_passes_when_result_matches_score() {
    let report = run(Quiz::showing("B"), SCORED).await;
    assert_eq!(report.outcome, RunOutcome::Passed, "{report:?}");
    assert!(report.trace.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_diagnose_axis_mismatch() {
    let report = run(Quiz::showing("A"), SCORED).await;
    assert_eq!(
        failed_condition(&report).as_deref(),
        Some("diagnose_axis_result_mismatch_actual_結果A_expected_結果B")
    );
}

#[tokio::test(start_paused = true)]
async fn test_unscored_diagnose_accepts_any_result() {
    let yaml = r"
- id: d2
  content_type: diagnose
  name: plain quiz
  url: https://example.com/d/2
  lead_type: none
  lead_params:
    answers: { q1: 選択肢B, q2: 選択肢C, q3: 選択肢A }
";
    let quiz = Quiz {
        single_q3: true,
        ..Quiz::showing("C")
    };
    let report = run(quiz, yaml).await;
    assert_eq!(report.outcome, RunOutcome::Passed, "{report:?}");
}

#[tokio::test(start_paused = true)]
async fn test_expected_multi_select_missing() {
    let quiz = Quiz {
        single_q3: true,
        ..Quiz::showing("B")
    };
    let report = run(quiz, SCORED).await;
    assert_eq!(
        failed_condition(&report).as_deref(),
        Some("diagnose_branch_q3_should_be_multi")
    );
}

#[tokio::test(start_paused = true)]
async fn test_unknown_answer_label() {
    let yaml = SCORED.replace("q1: 選択肢A,", "q1: 選択肢Z,");
    let report = run(Quiz::showing("B"), &yaml).await;
    assert_eq!(
        failed_condition(&report).as_deref(),
        Some("diagnose_single_answer_not_found_選択肢Z")
    );
}

#[tokio::test(start_paused = true)]
async fn test_branch_text_mismatch() {
    let yaml = SCORED.replace("q2_text: 質問2", "q2_text: 別の質問");
    let report = run(Quiz::showing("B"), &yaml).await;
    assert_eq!(failed_condition(&report).as_deref(), Some("diagnose_branch_q2_mismatch"));
}
