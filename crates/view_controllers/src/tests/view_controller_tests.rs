use super::*;
use crate::test_support::{navigator, settle, StubView};
use nav_core::Segment;
use serde_json::json;

fn recording(controller: &ViewController, events: &[&'static str]) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for event in events {
        let seen = Arc::clone(&seen);
        controller.events().on(
            event,
            Handler::sync(move |ev: nav_core::Event<Value>| {
                seen.lock().push(format!("{}:{}", ev.name, ev.data));
                Ok(())
            }),
        );
    }
    seen
}

#[tokio::test]
async fn enter_opens_then_renders_and_leave_closes() {
    let nav = navigator();
    let view = StubView::new();
    let controller = Arc::new(ViewController::new(view.clone(), ViewOptions::new("home")));
    let seen = recording(&controller, &["beforeEnter", "enter", "beforeLeave", "leave"]);
    nav.register_controller(controller.clone());
    settle(&nav).await;
    nav.add_route("other", LifecycleHandlers::new(), None)
        .expect("other route");

    nav.navigate(Segment::new("home").with_data(json!({ "n": 1 })))
        .await
        .expect("enter");
    nav.navigate(Destination::absolute("home").with_data(json!({ "n": 2 })))
        .await
        .expect("modify");
    assert_eq!(controller.data(), json!({ "n": 2 }));

    nav.navigate(Destination::absolute("other")).await.expect("leave");
    assert_eq!(view.calls(), vec!["open", "render", "close"]);
    assert_eq!(
        *seen.lock(),
        vec![
            r#"beforeEnter:{"n":1}"#,
            r#"enter:{"n":1}"#,
            r#"beforeEnter:{"n":2}"#,
            r#"enter:{"n":2}"#,
            "beforeLeave:null",
            "leave:null",
        ]
    );
}

#[tokio::test]
async fn stacked_view_is_hidden_until_unstacked() {
    let nav = navigator();
    let view = StubView::new();
    let controller = Arc::new(ViewController::new(view.clone(), ViewOptions::new("list")));
    nav.register_controller(controller.clone());
    settle(&nav).await;
    nav.add_route("detail", LifecycleHandlers::new(), None)
        .expect("detail route");

    nav.navigate("list").await.expect("list");
    nav.navigate("detail").await.expect("detail");
    nav.navigate(Destination::Parent).await.expect("parent");
    assert_eq!(view.calls(), vec!["open", "hide", "show"]);
}

#[tokio::test]
async fn entering_without_data_renders_the_default_data() {
    let nav = navigator();
    let view = StubView::new();
    let mut options = ViewOptions::new("home");
    options.default_data = Some(json!({ "title": "Home" }));
    let controller = Arc::new(ViewController::new(view.clone(), options));
    nav.register_controller(controller.clone());
    settle(&nav).await;

    nav.navigate("home").await.expect("enter");
    assert_eq!(view.bound_data(), json!({ "title": "Home" }));
}

#[tokio::test]
async fn refresh_reuses_the_last_enter_data() {
    let nav = navigator();
    let view = StubView::new();
    let controller = Arc::new(ViewController::new(view.clone(), ViewOptions::new("home")));
    let seen = recording(&controller, &["beforeRefresh", "refresh"]);
    nav.register_controller(controller.clone());
    settle(&nav).await;

    nav.navigate(Segment::new("home").with_data(json!("first")))
        .await
        .expect("enter");
    *view.bound.lock() = Value::Null;
    controller.refresh(None).await.expect("refresh");
    assert_eq!(view.bound_data(), json!("first"));

    controller
        .refresh(Some(json!("second")))
        .await
        .expect("refresh with data");
    assert_eq!(view.bound_data(), json!("second"));
    assert_eq!(seen.lock().len(), 4);
}

#[tokio::test]
async fn initializer_adds_the_route_and_announces_the_view() {
    let nav = navigator();
    let controller = Arc::new(ViewController::new(StubView::new(), ViewOptions::new("home")));
    let seen = recording(&controller, &["initView"]);
    nav.register_controller(controller.clone());
    settle(&nav).await;

    assert!(nav.route("home").is_some());
    assert_eq!(*seen.lock(), vec!["initView:null"]);
}

#[tokio::test]
async fn no_routing_keeps_the_route_out_of_the_table() {
    let nav = navigator();
    let mut options = ViewOptions::new("hidden");
    options.no_routing = true;
    let controller = Arc::new(ViewController::new(StubView::new(), options));
    nav.register_controller(controller.clone());
    settle(&nav).await;

    assert!(nav.route("hidden").is_none());
    assert!(controller.context().is_ok());
}

#[tokio::test]
async fn detached_controller_has_no_database_or_navigation() {
    let controller = ViewController::new(StubView::new(), ViewOptions::new("home"));
    assert!(controller.context().is_err());
    assert!(controller.database().is_none());
    assert!(controller.schema().await.expect("schema").is_empty());
    assert!(controller.require_database("search").is_err());
    assert!(!controller.is_on_top());

    let err = controller.navigate("home").await.expect_err("detached");
    assert_eq!(err.to_string(), NavigationError::Detached.to_string());
}
