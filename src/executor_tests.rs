use super::*;
use crate::testing::{FakePage, FakeResolver};
use serde_json::json;

fn executor(resolver: FakeResolver) -> (CommandExecutor, Arc<FakeResolver>) {
    let resolver = Arc::new(resolver);
    let config = ExecutorConfig {
        scroll_backoff: Duration::ZERO,
        scroll_backoff_cap: Duration::ZERO,
        ..ExecutorConfig::default()
    };
    (CommandExecutor::new(resolver.clone(), config), resolver)
}

fn city_tag() -> TagDescriptor {
    TagDescriptor::new("div")
        .with_attr("id", "city")
        .with_attr("description", "City of birth")
}

#[tokio::test]
async fn fill_text_sets_value_directly() {
    let (exec, _) = executor(FakeResolver::default());
    let page = FakePage::new().with_present(&["#email"]);
    let cmd = Command::FillText {
        work_id: "w".into(),
        selector: "#email".into(),
        value: "a@b.c".into(),
    };

    assert_eq!(exec.execute(&page, &cmd).await.unwrap(), Outcome::Done);
    assert_eq!(page.value_of("#email").as_deref(), Some("a@b.c"));
    assert!(page.clicks().is_empty());
}

#[tokio::test]
async fn fill_text_fails_when_selector_never_attaches() {
    let (exec, _) = executor(FakeResolver::default());
    let page = FakePage::new();
    let err = exec.fill_text(&page, "#missing", "x").await.unwrap_err();
    assert!(matches!(err, BridgeError::Timeout(_)));
}

#[tokio::test]
async fn checkbox_fill_is_idempotent() {
    let (exec, _) = executor(FakeResolver::default());
    let page = FakePage::new().with_present(&["#agree"]);
    let cmd = Command::FillCheckbox {
        work_id: "w".into(),
        selector: "#agree".into(),
    };

    assert_eq!(exec.execute(&page, &cmd).await.unwrap(), Outcome::Done);
    assert_eq!(exec.execute(&page, &cmd).await.unwrap(), Outcome::AlreadyChecked);
    assert_eq!(page.clicks(), vec!["#agree".to_string()]);
    assert!(page.is_currently_checked("#agree"));
}

#[tokio::test]
async fn checked_checkbox_is_left_alone() {
    let (exec, _) = executor(FakeResolver::default());
    let page = FakePage::new().with_present(&["#news"]).with_checked("#news");
    assert_eq!(
        exec.fill_checkbox(&page, "#news").await.unwrap(),
        Outcome::AlreadyChecked
    );
    assert!(page.clicks().is_empty());
}

#[tokio::test]
async fn radio_clicks_directly_when_visible() {
    let (exec, _) = executor(FakeResolver::default());
    let page = FakePage::new().with_present(&["#yes"]);
    let cmd = Command::FillRadio {
        work_id: "w".into(),
        selector: "#yes".into(),
    };
    exec.execute(&page, &cmd).await.unwrap();
    assert_eq!(page.clicks(), vec!["#yes".to_string()]);
    assert!(!page.actions().iter().any(|a| a.contains("probe:")));
}

#[tokio::test]
async fn scrolls_one_viewport_at_a_time_until_found() {
    let (exec, _) = executor(FakeResolver::default());
    let page = FakePage::new()
        .with_page_height(2000.0, 500.0)
        .with_revealed_at("#far", 1000.0);

    exec.scroll_and_click(&page, "#far").await.unwrap();

    let scrolls: Vec<String> = page
        .actions()
        .into_iter()
        .filter(|a| a.contains(":scroll:"))
        .collect();
    assert_eq!(scrolls, vec!["page:scroll:500", "page:scroll:1000"]);
    assert_eq!(page.clicks(), vec!["#far".to_string()]);
}

#[tokio::test]
async fn exhausting_scroll_range_is_selector_not_found() {
    let (exec, _) = executor(FakeResolver::default());
    let page = FakePage::new().with_page_height(2000.0, 500.0);

    let err = exec.scroll_and_click(&page, "#nowhere").await.unwrap_err();
    assert!(matches!(err, BridgeError::SelectorNotFound(ref s) if s == "#nowhere"));

    let actions = page.actions();
    assert!(actions.contains(&"page:scroll:1500".to_string()));
    assert!(!actions.contains(&"page:scroll:2000".to_string()));
    assert!(page.clicks().is_empty());
}

#[tokio::test]
async fn scroll_search_is_bounded_by_step_limit() {
    let resolver = Arc::new(FakeResolver::default());
    let config = ExecutorConfig {
        scroll_max_steps: 2,
        scroll_backoff: Duration::ZERO,
        scroll_backoff_cap: Duration::ZERO,
        ..ExecutorConfig::default()
    };
    let exec = CommandExecutor::new(resolver, config);
    let page = FakePage::new().with_page_height(1_000_000.0, 500.0);

    let err = exec.scroll_and_click(&page, "#deep").await.unwrap_err();
    assert!(matches!(err, BridgeError::SelectorNotFound(_)));
    let probes = page.actions().iter().filter(|a| a.contains(":probe:")).count();
    assert_eq!(probes, 2);
}

#[tokio::test]
async fn dropdown_unsuccessful_ends_without_second_click() {
    let (exec, resolver) = executor(FakeResolver::answering(Decision::Unsuccessful));
    let page = FakePage::new()
        .with_present(&[r#"div[id="city"]"#])
        .with_text_snapshot(&["City"])
        .with_text_snapshot(&["City", "Oslo", "Bergen"])
        .with_html("<ul><li>Oslo</li><li>Bergen</li></ul>");

    let outcome = exec
        .click_dropdown_and_select(&page, "w1", &city_tag())
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::NoSelection);
    assert_eq!(page.clicks(), vec![r#"div[id="city"]"#.to_string()]);

    let requests = resolver.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].options, vec!["Oslo".to_string(), "Bergen".to_string()]);
    assert_eq!(requests[0].work_id, "w1");
    assert_eq!(requests[0].description, json!("City of birth"));
    assert_eq!(
        requests[0].new_html.as_deref(),
        Some("<ul><li>Oslo</li><li>Bergen</li></ul>")
    );
}

#[tokio::test]
async fn dropdown_selects_backend_choice() {
    let choice = TagDescriptor::new("li").with_attr("id", "opt-bergen");
    let (exec, _) = executor(FakeResolver::answering(Decision::Select(choice)));
    let page = FakePage::new()
        .with_present(&[r#"div[id="city"]"#, r#"li[id="opt-bergen"]"#])
        .with_text_snapshot(&["City"])
        .with_text_snapshot(&["City", "Oslo", "Bergen"])
        .with_html("<ul></ul>");

    let cmd = Command::ClickDropdownAndSelect {
        work_id: "w1".into(),
        tag: city_tag(),
    };
    assert_eq!(exec.execute(&page, &cmd).await.unwrap(), Outcome::Done);
    assert_eq!(
        page.clicks(),
        vec![
            r#"div[id="city"]"#.to_string(),
            r#"li[id="opt-bergen"]"#.to_string()
        ]
    );
}

#[tokio::test]
async fn dropdown_with_failed_snapshot_sends_no_options() {
    let (exec, resolver) = executor(FakeResolver::answering(Decision::Unsuccessful));
    let page = FakePage::new()
        .with_present(&[r#"div[id="city"]"#])
        .with_failed_text_snapshot()
        .with_text_snapshot(&["City", "Oslo"]);

    let outcome = exec
        .click_dropdown_and_select(&page, "w1", &city_tag())
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::NoSelection);

    let requests = resolver.requests();
    assert!(requests[0].options.is_empty());
    assert!(requests[0].new_html.is_none());
}

#[tokio::test]
async fn dropdown_backend_failure_aborts_command() {
    let (exec, _) = executor(FakeResolver::failing(BridgeError::Backend("connection refused".into())));
    let page = FakePage::new()
        .with_present(&[r#"div[id="city"]"#])
        .with_text_snapshot(&["City"])
        .with_text_snapshot(&["City", "Oslo"]);

    let err = exec
        .click_dropdown_and_select(&page, "w1", &city_tag())
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Backend(_)));
    assert_eq!(page.clicks().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropdown_decision_times_out() {
    let resolver = Arc::new(
        FakeResolver::answering(Decision::Unsuccessful).with_delay(Duration::from_secs(600)),
    );
    let config = ExecutorConfig {
        decision_timeout: Duration::from_secs(5),
        scroll_backoff: Duration::ZERO,
        scroll_backoff_cap: Duration::ZERO,
        ..ExecutorConfig::default()
    };
    let exec = CommandExecutor::new(resolver, config);
    let page = FakePage::new()
        .with_present(&[r#"div[id="city"]"#])
        .with_text_snapshot(&["City"])
        .with_text_snapshot(&["City", "Oslo"]);

    let err = exec
        .click_dropdown_and_select(&page, "w1", &city_tag())
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Timeout(_)));
    assert_eq!(page.clicks().len(), 1);
}

#[tokio::test]
async fn select_by_value_reports_applied_values() {
    let (exec, _) = executor(FakeResolver::default());
    let page = FakePage::new()
        .with_present(&[r#"select[name="country"]"#])
        .with_options(&["se", "no"]);
    let tag = TagDescriptor::new("select")
        .with_attr("name", "country")
        .with_attr("select_option_value", json!(["se", "xx"]));
    let cmd = Command::SelectByValue {
        work_id: "w".into(),
        selector: build_selector(&tag),
        tag,
    };

    assert_eq!(
        exec.execute(&page, &cmd).await.unwrap(),
        Outcome::Selected(vec!["se".to_string()])
    );
}

#[tokio::test]
async fn end_process_is_not_a_dom_command() {
    let (exec, _) = executor(FakeResolver::default());
    let page = FakePage::new();
    let cmd = Command::EndProcess {
        work_id: "w".into(),
        error: None,
        details: None,
    };
    assert_eq!(exec.execute(&page, &cmd).await.unwrap(), Outcome::Done);
    assert!(page.actions().is_empty());
}
