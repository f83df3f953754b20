//! Engine behaviour against a scripted UI session.

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{fast_config, token, Element, ScriptedDriver, ScriptedRecognizer};
use invsync_lib::driver::{Locator, PointerAction, UiAction};
use invsync_lib::errors::InvsyncError;
use invsync_lib::event_bus::{AutomationEvent, EventBus};
use invsync_lib::executor::{ActionRequest, InteractionEngine, StrategyKind};
use invsync_lib::perception::{RecognitionTarget, ScreenImage, SnapshotStore};

fn save_button() -> Locator {
    Locator::css("#save")
}

fn engine(driver: &Arc<ScriptedDriver>, recognizer: &Arc<ScriptedRecognizer>, retries: u32) -> InteractionEngine {
    InteractionEngine::new(driver.clone(), fast_config(retries)).with_recognizer(recognizer.clone())
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<AutomationEvent>) -> Vec<AutomationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn structural_path_wins_when_element_is_present() {
    let driver = Arc::new(ScriptedDriver::new().with_element(&save_button(), "save", Element::button()));
    let recognizer = Arc::new(ScriptedRecognizer::new(vec![token("Save", 10.0, 10.0)]));

    let outcome = engine(&driver, &recognizer, 2)
        .execute(&ActionRequest::click("Save", save_button()).with_fallback(RecognitionTarget::text("Save")))
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.strategy, StrategyKind::Structural);
    assert_eq!(outcome.retries, 0);
    assert_eq!(driver.dispatch_count(), 1);
    assert_eq!(recognizer.call_count(), 0);
}

#[tokio::test]
async fn recognition_rescues_missing_element() {
    let driver = Arc::new(ScriptedDriver::new());
    let recognizer = Arc::new(ScriptedRecognizer::new(vec![
        token("Vehicle", 20.0, 40.0),
        token("Save", 400.0, 300.0),
    ]));

    let outcome = engine(&driver, &recognizer, 2)
        .execute(&ActionRequest::click("Save", save_button()).with_fallback(RecognitionTarget::text("save")))
        .await
        .unwrap();

    assert_eq!(outcome.strategy, StrategyKind::Recognition);
    assert_eq!(outcome.retries, 0);
    assert_eq!(driver.pointer_actions(), vec![PointerAction::Click { x: 430.0, y: 310.0 }]);
    assert_eq!(driver.dispatch_count(), 0);
}

#[tokio::test]
async fn exhausted_action_fails_once_after_retries_plus_one_passes() {
    let driver = Arc::new(ScriptedDriver::new());
    let recognizer = Arc::new(ScriptedRecognizer::empty());
    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();

    let err = engine(&driver, &recognizer, 2)
        .with_event_bus(bus)
        .execute(&ActionRequest::click("Save", save_button()).with_fallback(RecognitionTarget::text("Save")))
        .await
        .unwrap_err();

    assert_eq!(err.attempts, 3);
    assert_eq!(err.kind, "click");
    assert_eq!(err.target, "Save");
    assert_eq!(err.reasons.len(), 6, "one reason per strategy per pass: {:?}", err.reasons);
    assert!(err.snapshot.is_some(), "final failure carries an in-memory snapshot");
    assert_eq!(recognizer.call_count(), 3);

    let events = drain(&mut rx);
    let recognition_attempts = events
        .iter()
        .filter(|e| matches!(e, AutomationEvent::ActionAttempted { strategy: StrategyKind::Recognition, .. }))
        .count();
    assert_eq!(recognition_attempts, 3);
    let completed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            AutomationEvent::ActionCompleted { outcome, snapshot, .. } => Some((outcome, snapshot)),
            _ => None,
        })
        .collect();
    assert_eq!(completed.len(), 1);
    assert!(!completed[0].0.success);
    assert_eq!(completed[0].0.strategy, StrategyKind::None);
    assert!(completed[0].1.as_ref().and_then(|s| s.base64.as_ref()).is_some());
}

#[tokio::test]
async fn request_retry_override_applies() {
    let driver = Arc::new(ScriptedDriver::new());
    let recognizer = Arc::new(ScriptedRecognizer::empty());

    let err = engine(&driver, &recognizer, 3)
        .execute(
            &ActionRequest::click("Save", save_button())
                .with_fallback(RecognitionTarget::text("Save"))
                .with_retries(0)
                .with_timeout(Duration::from_millis(10)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.attempts, 1);
    assert_eq!(recognizer.call_count(), 1);
}

#[tokio::test]
async fn already_true_verifier_succeeds_on_first_structural_attempt() {
    let driver = Arc::new(ScriptedDriver::new().with_element(&save_button(), "save", Element::button()));
    let recognizer = Arc::new(ScriptedRecognizer::new(vec![token("Save", 10.0, 10.0)]));
    let engine = engine(&driver, &recognizer, 2);
    let request = ActionRequest::click("Save", save_button())
        .with_fallback(RecognitionTarget::text("Save"))
        .with_verify(|| async { Ok(true) });

    for _ in 0..2 {
        let outcome = engine.execute(&request).await.unwrap();
        assert_eq!(outcome.strategy, StrategyKind::Structural);
        assert_eq!(outcome.retries, 0);
    }
    assert_eq!(recognizer.call_count(), 0);
}

#[tokio::test]
async fn false_verification_is_retried() {
    let driver = Arc::new(ScriptedDriver::new().with_element(&save_button(), "save", Element::button()));
    let recognizer = Arc::new(ScriptedRecognizer::empty());
    let checks = Arc::new(AtomicUsize::new(0));
    let counter = checks.clone();

    let outcome = engine(&driver, &recognizer, 2)
        .execute(&ActionRequest::click("Save", save_button()).with_verify(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(n >= 1) }
        }))
        .await
        .unwrap();

    assert_eq!(outcome.strategy, StrategyKind::Structural);
    assert_eq!(outcome.retries, 1);
    assert_eq!(checks.load(Ordering::SeqCst), 2);
    assert_eq!(driver.dispatch_count(), 2);
}

#[tokio::test]
async fn raising_verifier_counts_as_failed_attempt() {
    let driver = Arc::new(ScriptedDriver::new().with_element(&save_button(), "save", Element::button()));
    let recognizer = Arc::new(ScriptedRecognizer::empty());
    let checks = Arc::new(AtomicUsize::new(0));
    let counter = checks.clone();

    let outcome = engine(&driver, &recognizer, 2)
        .execute(&ActionRequest::click("Save", save_button()).with_verify(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(InvsyncError::Verification("toast not rendered".into()))
                } else {
                    Ok(true)
                }
            }
        }))
        .await
        .unwrap();
    assert_eq!(outcome.retries, 1);

    let err = engine(&driver, &recognizer, 1)
        .execute(
            &ActionRequest::click("Save", save_button())
                .with_verify(|| async { Err(InvsyncError::Verification("still broken".into())) }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.attempts, 2);
    assert!(err.message.contains("still broken"), "{}", err.message);
}

#[tokio::test]
async fn disabled_element_is_not_actionable() {
    let driver = Arc::new(ScriptedDriver::new().with_element(&save_button(), "save", Element::button().disabled()));
    let recognizer = Arc::new(ScriptedRecognizer::empty());

    let err = engine(&driver, &recognizer, 0)
        .execute(&ActionRequest::click("Save", save_button()))
        .await
        .unwrap_err();
    assert!(err.message.contains("not actionable"), "{}", err.message);
    assert_eq!(driver.dispatch_count(), 0);
}

#[tokio::test]
async fn detached_element_waits_between_settle_windows() {
    let driver = Arc::new(ScriptedDriver::new().with_element(&save_button(), "save", Element::button().detached()));
    let mut config = fast_config(0);
    config.interaction.timeout_ms = 50;
    let engine = InteractionEngine::new(driver.clone(), config);

    let done = AtomicBool::new(false);
    let ticks = AtomicUsize::new(0);
    let ticker = async {
        while !done.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(1)).await;
            ticks.fetch_add(1, Ordering::SeqCst);
        }
    };
    let attempt = async {
        let result = engine.execute(&ActionRequest::click("Save", save_button())).await;
        done.store(true, Ordering::SeqCst);
        result
    };
    let (result, ()) = tokio::join!(attempt, ticker);

    let err = result.unwrap_err();
    assert!(err.message.contains("never settled"), "{}", err.message);
    assert!(ticks.load(Ordering::SeqCst) >= 5, "sibling task starved");
    let reads = driver.bounds_calls.load(Ordering::SeqCst);
    assert!(reads > 0 && reads < 500, "{reads} bounds reads in one 50ms attempt");
    assert_eq!(driver.dispatch_count(), 0);
}

#[tokio::test]
async fn typed_value_is_read_back() {
    let price = Locator::css("input[name=price]");
    let driver = Arc::new(ScriptedDriver::new().with_element(&price, "price", Element::input("")));
    let recognizer = Arc::new(ScriptedRecognizer::empty());

    let outcome = engine(&driver, &recognizer, 0)
        .type_text("Price", price, "18995")
        .await
        .unwrap();
    assert_eq!(outcome.strategy, StrategyKind::Structural);
    assert_eq!(driver.element("price").unwrap().value.as_deref(), Some("18995"));
}

#[tokio::test]
async fn overwritten_input_fails_completion_check() {
    let price = Locator::css("input[name=price]");
    let driver = Arc::new(ScriptedDriver::new().with_element(&price, "price", Element::input("").sticky("0")));
    let recognizer = Arc::new(ScriptedRecognizer::empty());

    let err = engine(&driver, &recognizer, 1)
        .type_text("Price", price, "18995")
        .await
        .unwrap_err();
    assert_eq!(err.kind, "type");
    assert_eq!(err.attempts, 2);
    assert!(err.message.contains("completion check failed"), "{}", err.message);
}

#[tokio::test]
async fn option_selected_by_visible_label() {
    let color = Locator::role("combobox", Some("Exterior color"));
    let driver = Arc::new(ScriptedDriver::new().with_element(
        &color,
        "color",
        Element::select(&[("c-01", "Black"), ("c-02", "Deep Red")]),
    ));
    let recognizer = Arc::new(ScriptedRecognizer::empty());

    let outcome = engine(&driver, &recognizer, 0)
        .select_option("Exterior color", color, "deep red")
        .await
        .unwrap();
    assert!(outcome.success);
    let element = driver.element("color").unwrap();
    assert_eq!(element.value.as_deref(), Some("c-02"));
}

#[tokio::test]
async fn missing_option_fails_selection() {
    let color = Locator::role("combobox", Some("Exterior color"));
    let driver = Arc::new(ScriptedDriver::new().with_element(&color, "color", Element::select(&[("c-01", "Black")])));
    let recognizer = Arc::new(ScriptedRecognizer::empty());

    let err = engine(&driver, &recognizer, 0)
        .select_option("Exterior color", color, "Silver")
        .await
        .unwrap_err();
    assert_eq!(err.kind, "select");
}

#[tokio::test]
async fn fuzzy_label_picks_closest_element() {
    let driver = Arc::new(
        ScriptedDriver::new()
            .with_labeled("nav", "Navigation", Element::button())
            .with_labeled("seats", "Htd Seats", Element::button()),
    );
    let recognizer = Arc::new(ScriptedRecognizer::empty());

    engine(&driver, &recognizer, 0)
        .click("Heated seats checkbox", Locator::fuzzy_label("Heated Seats", Some("checkbox")))
        .await
        .unwrap();

    let dispatched = driver.dispatched.lock().unwrap().clone();
    assert_eq!(dispatched, vec![("seats".to_string(), UiAction::Click)]);
}

#[tokio::test]
async fn recognition_select_opens_control_then_clicks_option() {
    let driver = Arc::new(ScriptedDriver::new());
    let recognizer = Arc::new(ScriptedRecognizer::new(vec![
        token("Color", 200.0, 100.0),
        token("Black", 200.0, 140.0),
        token("Red", 200.0, 170.0),
    ]));

    let outcome = engine(&driver, &recognizer, 0)
        .execute(
            &ActionRequest::select_option("Exterior color", Locator::css("#color"), "Red")
                .with_fallback(RecognitionTarget::exact_text("Color")),
        )
        .await
        .unwrap();

    assert_eq!(outcome.strategy, StrategyKind::Recognition);
    assert_eq!(
        driver.pointer_actions(),
        vec![
            PointerAction::Click { x: 230.0, y: 110.0 },
            PointerAction::Click { x: 230.0, y: 180.0 },
        ]
    );
}

#[tokio::test]
async fn recognition_typing_checks_focused_value() {
    let driver = Arc::new(ScriptedDriver::new());
    driver.set_focused(Some("stale"));
    let recognizer = Arc::new(ScriptedRecognizer::new(vec![token("Mileage", 50.0, 50.0)]));

    let err = engine(&driver, &recognizer, 0)
        .execute(
            &ActionRequest::type_text("Mileage", Locator::css("#miles"), "42000")
                .with_fallback(RecognitionTarget::text("Mileage")),
        )
        .await
        .unwrap_err();
    assert!(err.message.contains("completion check failed"), "{}", err.message);
    assert!(driver.pointer_actions().contains(&PointerAction::TypeText {
        text: "42000".into(),
        clear_first: true
    }));
}

#[tokio::test]
async fn flaky_recognizer_is_retried_within_one_pass() {
    let driver = Arc::new(ScriptedDriver::new());
    let recognizer = Arc::new(ScriptedRecognizer::new(vec![token("Save", 10.0, 10.0)]).failing_first(1));
    let mut config = fast_config(0);
    config.interaction.recognition_retry = invsync_lib::RetryPolicy::new(1, 1, 1, 1.0);

    let outcome = InteractionEngine::new(driver.clone(), config)
        .with_recognizer(recognizer.clone())
        .execute(&ActionRequest::click("Save", save_button()).with_fallback(RecognitionTarget::text("Save")))
        .await
        .unwrap();
    assert_eq!(outcome.strategy, StrategyKind::Recognition);
    assert_eq!(recognizer.call_count(), 2);
}

#[tokio::test]
async fn image_template_fallback_clicks_marker() {
    let mut screen = image::RgbaImage::from_pixel(200, 120, image::Rgba([250, 250, 250, 255]));
    for y in 0..12 {
        for x in 0..20 {
            let shade = if (x * y) % 4 == 0 { 10 } else { 180 };
            screen.put_pixel(90 + x, 60 + y, image::Rgba([shade, 90, 30, 255]));
        }
    }
    let template = image::imageops::crop_imm(&screen, 90, 60, 20, 12).to_image();
    let driver = Arc::new(ScriptedDriver::new().with_screen(ScreenImage::from_rgba(&screen).unwrap()));
    let recognizer = Arc::new(ScriptedRecognizer::empty());

    let outcome = engine(&driver, &recognizer, 0)
        .execute(
            &ActionRequest::click("Save icon", Locator::css(".icon-save"))
                .with_fallback(RecognitionTarget::image(ScreenImage::from_rgba(&template).unwrap(), 0.9)),
        )
        .await
        .unwrap();
    assert_eq!(outcome.strategy, StrategyKind::Recognition);
    assert_eq!(driver.pointer_actions(), vec![PointerAction::Click { x: 100.0, y: 66.0 }]);
}

#[tokio::test]
async fn failure_snapshots_are_written_per_attempt() {
    let tmp = tempfile::tempdir().unwrap();
    let screen = ScreenImage::from_rgba(&image::RgbaImage::new(8, 8)).unwrap();
    let driver = Arc::new(ScriptedDriver::new().with_screen(screen));
    let recognizer = Arc::new(ScriptedRecognizer::empty());

    let err = engine(&driver, &recognizer, 2)
        .with_snapshot_store(SnapshotStore::new(tmp.path()))
        .click("Save", save_button())
        .await
        .unwrap_err();

    let path = err.snapshot_path().expect("final snapshot persisted").to_path_buf();
    assert!(path.exists());
    assert!(err.to_string().contains(&path.display().to_string()));
    let files = std::fs::read_dir(tmp.path()).unwrap().count();
    assert_eq!(files, 3, "two attempt snapshots plus the final one");
}

#[tokio::test]
async fn screenshot_outage_does_not_mask_failure() {
    let driver = Arc::new(ScriptedDriver::new().without_screenshots());
    let recognizer = Arc::new(ScriptedRecognizer::new(vec![token("Save", 10.0, 10.0)]));

    let err = engine(&driver, &recognizer, 0)
        .execute(&ActionRequest::click("Save", save_button()).with_fallback(RecognitionTarget::text("Save")))
        .await
        .unwrap_err();
    assert!(err.snapshot.is_none());
    assert!(err.message.contains("recognition failed"), "{}", err.message);
}
