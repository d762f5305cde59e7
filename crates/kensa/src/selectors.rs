//! Page vocabulary: marker texts and structural selectors of the content UI.

use crate::driver::Selector;

/// Dialog container shared by every modal in the content
pub const DIALOG: &str = "[data-scope='dialog'][data-part='content'][role='dialog']";

/// Toast title element
pub const TOAST_TITLE: &str = "[data-scope='toast'][data-part='title']";

/// Numbers the draw-count screen can offer
pub const DRAW_NUMBERS: std::ops::RangeInclusive<u32> = 1..=10;

/// Top, draw, reveal and result screens of the gacha
pub mod gacha {
    use super::Selector;

    pub const START_GACHA_TEXT: &str = "ガチャを回す";
    pub const DRAW_START_TEXT: &str = "スタート";
    pub const SINGLE_START_TEXT: &str = "抽選スタート";

    pub const CARD_IMAGE: &str = "img.chakra-image[alt^='結果']";
    pub const DOT_BUTTONS: &str = "div.css-k008qs button";
    pub const TOP_THUMBS: &str = "img.chakra-image.css-9qpbgg[alt^='結果']";
    pub const CARD_TAP_NEXT_TEXT: &str = "タップで次へ";
    pub const CARD_SKIP_TEXT: &str = "スキップ";

    pub const DETAIL_BLOCK_SINGLE: &str = "div.css-1z13ymv";
    pub const DETAIL_NAME_SINGLE: &str = "div.css-1cmdo0c";
    pub const DETAIL_NAME_MULTI: &str = "div.css-1r7lvp9";
    pub const DETAIL_IMAGE_WRAP: &str = "div.css-1xhi066";
    pub const DETAIL_RESULT_IMAGE: &str = "img.chakra-image[alt^='結果']";
    pub const DETAIL_DESC_TEXT: &str = "div.MuiBox-root span[style*='white-space: pre-wrap']";
    pub const DETAIL_DESC_IMAGE: &str = "div.MuiBox-root img.richEditorTheme__image";

    pub const USE_TEXT: &str = "今すぐつかう";
    pub const USED_TEXT: &str = "使用済み";

    pub const MODAL_MESSAGE: &str =
        "一度ご利用いただくと元に戻すことはできません。対象にお間違いがないかご確認ください。";
    pub const MODAL_USE_TEXT: &str = "つかう";
    pub const MODAL_BACK_TEXT: &str = "戻る";

    pub const LINK_ITEM: &str = "div.css-1uom0pk";
    pub const LINK_DESC_TEXT: &str = "span[style*='white-space: pre-wrap']";
    pub const LINK_DESC_IMAGE: &str = "img.richEditorTheme__image";
    pub const LINK_ANCHOR: &str = "a[target='_blank'][href]";
    pub const LINK_BUTTON_TEXT: &str = "div.css-1r7lvp9";

    pub const PLAY_AGAIN_TEXT: &str = "もう一度あそぶ";

    pub const TOAST_USED_DAILY: &str = "本日はご利用済みです";
    pub const TOAST_USED_ONCE: &str = "ご利用済みです";

    /// Button (or button-like element) carrying a label
    #[must_use]
    pub fn button_with_text(text: &str) -> Selector {
        Selector::any([
            Selector::css("button").has_text(text),
            Selector::css("[role='button']").has_text(text),
        ])
    }

    /// One result detail block per drawn item
    #[must_use]
    pub fn detail_blocks(draw_count: u32) -> Selector {
        if draw_count == 1 {
            Selector::css(DETAIL_BLOCK_SINGLE)
        } else {
            Selector::css("div.chakra-stack")
                .has_child(Selector::css(DETAIL_IMAGE_WRAP))
                .has_child(Selector::any([
                    Selector::css("button").has_text(USE_TEXT),
                    Selector::css("button").has_text(USED_TEXT),
                ]))
        }
    }

    /// Active use control
    #[must_use]
    pub fn use_button() -> Selector {
        button_with_text(USE_TEXT)
    }

    /// Consumed control
    #[must_use]
    pub fn used_button() -> Selector {
        button_with_text(USED_TEXT)
    }

    /// Consumption confirmation dialog
    #[must_use]
    pub fn use_modal() -> Selector {
        Selector::css(super::DIALOG)
    }

    /// Play-again control on the result screen
    #[must_use]
    pub fn play_again() -> Selector {
        Selector::css("button").has_text(PLAY_AGAIN_TEXT)
    }
}

/// Paid purchase screens
pub mod paid {
    pub const CONFIRM_TITLE_TEXT: &str = "購入内容の確認";
    pub const MEMBER_LOGIN_TITLE_TEXT: &str = "会員登録済みの方はこちら";

    /// `(label, amount)` line items on the confirmation screen
    pub const PRICE_LINES: [(&str, &str, &str); 3] = [
        ("購入価格", "500円", "paid_price_missing_500"),
        ("消費税", "50円", "paid_tax_missing_50"),
        ("支払い金額", "550円", "paid_total_missing_550"),
    ];

    pub const QUANTITY_SELECT: &str = "[data-scope='select'] select";
    pub const TERMS_CHECKBOX: &str = "[data-scope='checkbox'][data-part='control']";
    pub const BUY_TEXT: &str = "ガチャを購入する";

    pub const MEMBER_EMAIL: &str = "input[name='email']";
    pub const MEMBER_PASSWORD: &str = "input[name='password']";
    pub const LOGIN_TEXT: &str = "ログイン";

    /// Draw-count button carrying a numeric value
    #[must_use]
    pub fn count_button(n: u32) -> String {
        format!("button[value='{n}']")
    }
}

/// LINE consent modal and OAuth pages
pub mod line {
    pub const MODAL_TEXT: &str = "本コンテンツのご利用にはLINE連携が必要です。";
    pub const LOGIN_TRIGGER_TEXT: &str = "LINEでログイン";
    pub const LOGIN_TRIGGER_IMAGE: &str = "img[alt='LINEでログイン']";
    pub const LOGIN_SUBMIT: &str = "div.login-button button[type='submit']";
    pub const LOGIN_TEXT: &str = "ログイン";
    pub const FORM_ID_INPUT: &str = "input[name='tid']";
    pub const FORM_PASSWORD_INPUT: &str = "input[name='tpasswd']";

    /// Hosts that belong to the LINE login service
    pub const DOMAINS: [&str; 2] = ["access.line.me", "line.me"];

    /// Whether an address belongs to LINE
    #[must_use]
    pub fn is_line_domain(url: &str) -> bool {
        let url = url.to_lowercase();
        DOMAINS.iter().any(|d| url.contains(d))
    }
}

/// SNS follow gate
pub mod sns {
    pub const MODAL_TEXT: &str = "ご利用いただくには以下のリンクへのアクセスが必要です。";
    pub const ACCOUNT_LINKS: &str = "a[target='_blank'][href]";
    pub const CHECK_GRAY: &str = "svg[data-testid='CheckCircleIcon'][class*='css-l0elaw']";
    pub const CHECK_GREEN: &str = "svg[data-testid='CheckCircleIcon'][class*='css-qy6vmb']";
    pub const CTA: &str = "a[role='button']";
    pub const CTA_TEXT: &str = "ガチャを回す";
    pub const CTA_DISABLED_CLASS: &str = "Mui-disabled";

    /// Minimum number of accounts the gate must list
    pub const MIN_ACCOUNTS: usize = 3;
}

/// First-party lead form
pub mod form {
    pub const HEADING_TEXT_PRIMARY: &str = "お客様情報の入力";
    pub const HEADING_TEXT_SECONDARY: &str = "以下の項目をご入力ください";
    pub const SUBMIT_TEXT: &str = "送信して開始";
    pub const REQUIRED_BADGE_TEXT: &str = "必須";
    pub const REQUIRED_ERROR_TEXT: &str = "必須です";

    pub const FORM_CONTROL: &str = "div.MuiFormControl-root";
    pub const TEXT_INPUT: &str = "input.chakra-input";
    pub const EMAIL_LABEL: &str = "メールアドレス";
    pub const TEXT_LABEL: &str = "テキスト";
    pub const PHONE_LABEL: &str = "電話番号";
    pub const PHONE_PARTS: [&str; 3] = [
        "input[name='mobilePhoneId']",
        "input[name='carrierNumber']",
        "input[name='identifierNumber']",
    ];

    pub const RADIO_GROUP: &str = "[data-scope='radio-group'][role='radiogroup']";
    pub const RADIO_ITEM: &str = "[data-scope='radio-group'][data-part='item']";
    pub const CHECKBOX_ROOT: &str = "[data-scope='checkbox'][data-part='root']";
    pub const SELECT_ROOT: &str = "[data-scope='select'][data-part='root']";
    pub const SELECT: &str = "[data-scope='select'] select";
    pub const FILE_UPLOAD_ROOT: &str = "[data-scope='file-upload'][data-part='root']";
}

/// Embedded third-party form
pub mod embed {
    pub const IFRAME: &str = "iframe.hs-form-iframe, iframe#hs-form-iframe-0";
    pub const SUBMIT: &str = "input[type='submit'][value='送信'], input.hs-button[type='submit']";
    pub const REQUIRED_ERROR_TEXT: &str = "この必須項目を入力してください。";
    pub const CAPTCHA_TEXTS: [&str; 2] = [
        "CAPTCHAの検証に失敗しました。もう一度お試しください。",
        "This reCAPTCHA is for testing purposes only. Please report to the site admin if you are seeing this.",
    ];

    /// `(field name, value)` pairs filled into the embedded form
    pub const FIELDS: [(&str, &str); 4] = [
        ("firstname", "姓テスト"),
        ("lastname", "名テスト"),
        ("phone", "08012345678"),
        ("company", "テスト株式会社"),
    ];
}

/// Diagnose quiz screens
pub mod diagnose {
    pub const START_TEXT: &str = "診断を始める";
    pub const QUESTION_LABEL_TEXT: &str = "QUESTION";
    pub const QUESTION_IMAGE: &str = "img[alt='question image']";
    pub const FIRST_QUESTION_TEXT: &str = "Q1";
    pub const MULTI_LABEL_TEXT: &str = "（複数回答可）";
    pub const NEXT_TEXT: &str = "次へ";
    pub const RESULT_CONFIRM_TEXT: &str = "回答お疲れ様でした。";
    pub const RESULT_TEXT: &str = "診断結果を確認する";
    pub const BACK_TO_ANSWERS_TEXT: &str = "回答選択に戻る";
    pub const ANSWER_LABEL: &str = "label";
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::driver::BrowserSession;
    use crate::mock::{MockApp, MockNode, MockPage, MockSession};

    #[test]
    fn test_line_domain_detection() {
        assert!(line::is_line_domain("https://access.line.me/oauth2/v2.1/login"));
        assert!(line::is_line_domain("https://LINE.me/R/ti/p"));
        assert!(!line::is_line_domain("https://example.com/g/1"));
    }

    #[test]
    fn test_detail_block_shape_depends_on_count() {
        assert_eq!(
            gacha::detail_blocks(1),
            Selector::css(gacha::DETAIL_BLOCK_SINGLE)
        );
        assert!(matches!(gacha::detail_blocks(3), Selector::Has { direct: true, .. }));
    }

    #[test]
    fn test_count_button_selector() {
        assert_eq!(paid::count_button(5), "button[value='5']");
    }

    /// One matching element and one near miss per attribute-operator selector
    struct Vocabulary;

    impl MockApp for Vocabulary {
        fn render(&mut self, _page: &MockPage) -> MockNode {
            let check = |class: &str| {
                MockNode::new("svg")
                    .attr("data-testid", "CheckCircleIcon")
                    .class(class)
            };
            let desc = |style: &str| MockNode::new("span").attr("style", style).text("説明");
            MockNode::new("body").children([
                MockNode::img("https://cdn.example/a.png", "結果A").class("chakra-image css-9qpbgg"),
                MockNode::img("https://cdn.example/p.png", "景品").class("chakra-image css-9qpbgg"),
                MockNode::div()
                    .class("MuiBox-root")
                    .children([desc("white-space: pre-wrap;"), desc("white-space: normal;")]),
                check("MuiSvgIcon-root css-qy6vmb"),
                check("MuiSvgIcon-root css-l0elaw"),
                check("MuiSvgIcon-root css-l0elaw"),
                MockNode::new("svg").attr("data-testid", "OtherIcon").class("css-qy6vmb"),
            ])
        }
    }

    #[tokio::test]
    async fn test_attribute_operator_selectors_against_mock_dom() {
        let mut session = MockSession::new(Vocabulary);
        let page = session.main_page();
        let cases = [
            (gacha::CARD_IMAGE, 1),
            (gacha::TOP_THUMBS, 1),
            (gacha::DETAIL_RESULT_IMAGE, 1),
            (gacha::DETAIL_DESC_TEXT, 1),
            (gacha::LINK_DESC_TEXT, 1),
            (sns::CHECK_GREEN, 1),
            (sns::CHECK_GRAY, 2),
        ];
        for (css, expected) in cases {
            let count = session.count(&page, &Selector::css(css)).await.unwrap();
            assert_eq!(count, expected, "{css}");
        }
    }
}
