use super::*;
use anyhow::anyhow;
use serde_json::json;
use std::time::Duration;

type Log = Arc<Mutex<Vec<String>>>;

fn data_suffix(data: &Value) -> String {
    if data.is_null() {
        String::new()
    } else {
        format!("={data}")
    }
}

fn recording(log: &Log, name: &str) -> LifecycleHandlers {
    let entry = |phase: &'static str| {
        let log = Arc::clone(log);
        let name = name.to_string();
        move |detail: String| log.lock().push(format!("{phase}:{name}{detail}"))
    };
    let (enter, leave, stack, unstack, modify) = (
        entry("enter"),
        entry("leave"),
        entry("stack"),
        entry("unstack"),
        entry("modify"),
    );
    LifecycleHandlers::new()
        .enter(Handler::sync(move |data: Value| {
            enter(data_suffix(&data));
            Ok(())
        }))
        .leave(Handler::sync(move |()| {
            leave(String::new());
            Ok(())
        }))
        .stack(Handler::sync(move |()| {
            stack(String::new());
            Ok(())
        }))
        .unstack(Handler::sync(move |data: Value| {
            unstack(data_suffix(&data));
            Ok(())
        }))
        .modify(Handler::sync(move |data: Value| {
            modify(data_suffix(&data));
            Ok(())
        }))
}

#[derive(Default)]
struct CollectingSink {
    reports: Mutex<Vec<String>>,
}

impl ErrorSink for CollectingSink {
    fn report(&self, error: &NavigationError) {
        self.reports.lock().push(error.to_string());
    }
}

struct Harness {
    nav: Arc<Navigator>,
    store: Arc<MemoryPositionStore>,
    log: Log,
    sink: Arc<CollectingSink>,
}

impl Harness {
    fn new(routes: &[&str]) -> Self {
        let store = MemoryPositionStore::new();
        let nav = Navigator::new(store.clone());
        let sink = Arc::new(CollectingSink::default());
        nav.set_error_sink(sink.clone());
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        for route in routes {
            nav.add_route(route, recording(&log, route), None)
                .expect("add route");
        }
        Self {
            nav,
            store,
            log,
            sink,
        }
    }

    async fn goto(&self, position: &str) -> Result<TransitionOutcome, NavigationError> {
        self.store.write(position);
        self.nav.on_navigate().await
    }

    fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.lock())
    }
}

#[tokio::test]
async fn first_navigation_enters_and_stacks_every_route() {
    let h = Harness::new(&["", "list", "form"]);

    let outcome = h.goto("#list#form$3").await.expect("navigate");

    assert_eq!(
        h.take_log(),
        vec!["enter:", "stack:", "enter:list", "stack:list", "enter:form=3"]
    );
    let change = outcome.change().expect("completed");
    assert_eq!(shared::protocol::route_names(&change.current), vec!["", "list", "form"]);
    assert_eq!(h.nav.state(), EngineState::Idle);
}

#[tokio::test]
async fn phases_run_leave_enter_stack_modify() {
    let h = Harness::new(&["a", "x", "b", "d"]);
    h.goto("#a$1#x#b").await.expect("seed");
    h.take_log();

    h.goto("#a$2#b#d").await.expect("navigate");

    assert_eq!(
        h.take_log(),
        vec!["leave:x", "enter:d", "stack:b", "modify:a=2"]
    );
}

#[tokio::test]
async fn one_transition_runs_every_phase_in_order() {
    let h = Harness::new(&["m", "x", "u", "t", "z"]);
    h.goto("#m$1#x#u#t").await.expect("seed");
    h.take_log();

    let outcome = h.goto("#m$2#t#z#u").await.expect("navigate");

    assert_eq!(
        h.take_log(),
        vec!["leave:x", "enter:z", "stack:t", "unstack:u", "modify:m=2"]
    );
    let change = outcome.change().expect("completed");
    assert_eq!(shared::protocol::route_names(&change.removed), vec!["x"]);
    assert_eq!(shared::protocol::route_names(&change.added), vec!["z"]);
    assert_eq!(shared::protocol::route_names(&change.stacked), vec!["t"]);
    assert_eq!(shared::protocol::route_names(&change.unstacked), vec!["u"]);
    assert_eq!(shared::protocol::route_names(&change.modified), vec!["m"]);
}

#[tokio::test]
async fn parent_pops_the_top_route() {
    let h = Harness::new(&["list", "form"]);
    h.nav.navigate("list").await.expect("list");
    h.nav.navigate("form").await.expect("form");
    assert_eq!(h.nav.position(), "#list#form");
    h.take_log();

    h.nav.navigate(Destination::Parent).await.expect("parent");

    assert_eq!(h.nav.position(), "#list");
    assert_eq!(h.take_log(), vec!["leave:form", "unstack:list"]);
}

#[tokio::test]
async fn same_position_reruns_without_changes() {
    let h = Harness::new(&["a"]);
    h.nav.navigate("a").await.expect("first");
    h.take_log();

    let outcome = h.nav.navigate("a").await.expect("again");

    assert!(h.take_log().is_empty());
    let change = outcome.change().expect("completed");
    assert!(change.added.is_empty() && change.removed.is_empty());
    assert_eq!(h.store.history(), vec!["".to_string(), "#a".to_string()]);
}

#[tokio::test]
async fn halted_route_is_never_left() {
    let h = Harness::new(&["a", "b"]);
    h.nav
        .add_interceptor("b", Handler::with_completion(|_, completion| drop(completion)));
    h.goto("#a").await.expect("a");

    let outcome = h.goto("#a#b").await.expect("halted");
    assert_eq!(outcome, TransitionOutcome::Halted);

    h.goto("#a").await.expect("back to a");
    assert_eq!(h.take_log(), vec!["enter:a", "unstack:a"]);
}

#[tokio::test]
async fn interceptor_error_aborts_and_is_reported() {
    let h = Harness::new(&["a"]);
    h.nav
        .add_interceptor("", Handler::sync(|_| Err(anyhow!("denied"))));

    let err = h.goto("#a").await.expect_err("intercepted");

    assert!(matches!(err, NavigationError::Interceptor { ref message, .. } if message == "denied"));
    assert!(h.take_log().is_empty());
    assert_eq!(h.sink.reports.lock().len(), 1);
}

#[tokio::test]
async fn interceptors_see_their_route() {
    let h = Harness::new(&["a", "b"]);
    let seen: Arc<Mutex<Vec<InterceptContext>>> = Arc::new(Mutex::new(Vec::new()));
    for scope in ["", "a", "zzz"] {
        let seen = Arc::clone(&seen);
        h.nav.add_interceptor(
            scope,
            Handler::sync(move |context: InterceptContext| {
                seen.lock().push(context);
                Ok(())
            }),
        );
    }

    h.goto("#a$5#b").await.expect("navigate");

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].route, "b");
    assert_eq!(seen[0].position, "#a$5#b");
    assert_eq!(seen[0].routes.len(), 2);
    assert_eq!(seen[1].route, "a");
    assert_eq!(seen[1].data, json!(5));
}

#[tokio::test]
async fn failing_handler_stops_later_phases() {
    let h = Harness::new(&["a"]);
    h.nav
        .add_route(
            "b",
            LifecycleHandlers::new().enter(Handler::sync(|_| Err(anyhow!("broken view")))),
            None,
        )
        .expect("route b");

    let err = h.goto("#a#b").await.expect_err("enter fails");

    match err {
        NavigationError::Lifecycle {
            route,
            phase,
            message,
        } => {
            assert_eq!(route, "b");
            assert_eq!(phase, LifecyclePhase::Enter);
            assert_eq!(message, "broken view");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.take_log(), vec!["enter:a", "stack:a"]);
}

#[tokio::test]
async fn dropped_lifecycle_completion_is_an_error() {
    let h = Harness::new(&[]);
    h.nav
        .add_route(
            "a",
            LifecycleHandlers::new().enter(Handler::with_completion(|_, completion| drop(completion))),
            None,
        )
        .expect("route");

    let err = h.goto("#a").await.expect_err("dropped");
    assert!(err.to_string().contains("completion dropped"));
}

#[tokio::test]
async fn unknown_position_reports_no_route() {
    let h = Harness::new(&["a"]);
    h.goto("#a").await.expect("a");

    assert_eq!(
        h.goto("#zzz").await.expect("no route"),
        TransitionOutcome::NoRoute
    );
    assert_eq!(h.sink.reports.lock().len(), 1);
    assert_eq!(h.nav.active_routes().len(), 1);

    assert_eq!(h.goto("").await.expect("empty"), TransitionOutcome::NoRoute);
    assert_eq!(h.sink.reports.lock().len(), 1);
}

#[tokio::test]
async fn route_changed_is_emitted_after_each_transition() {
    let h = Harness::new(&["a"]);
    let changes: Arc<Mutex<Vec<RouteChange>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&changes);
    h.nav.events().on(
        ROUTE_CHANGED,
        Handler::sync(move |event: Event<RouteChange>| {
            sink.lock().push(event.data);
            Ok(())
        }),
    );

    h.goto("#a$7").await.expect("navigate");

    let changes = changes.lock();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].added[0].route, "a");
    assert_eq!(changes[0].added[0].data, json!(7));
}

#[tokio::test]
async fn malformed_patterns_are_rejected() {
    let h = Harness::new(&[]);
    for pattern in ["a#b", "/abs", "£anon"] {
        let err = h
            .nav
            .add_route(pattern, LifecycleHandlers::new(), None)
            .expect_err("malformed");
        assert!(matches!(err, NavigationError::MalformedPattern { .. }));
    }
    assert!(h.nav.routes().is_empty());
}

#[tokio::test]
async fn suspension_forces_a_route_until_resumed() {
    let h = Harness::new(&["", "home", "login"]);
    let intercepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&intercepted);
    h.nav.add_interceptor(
        "",
        Handler::sync(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );
    h.goto("#home").await.expect("home");
    assert_eq!(intercepted.load(Ordering::SeqCst), 1);
    h.take_log();

    h.nav
        .suspend_navigation("login", None, None)
        .await
        .expect("suspend");
    assert_eq!(h.nav.is_suspended(), Suspension::Route("login".into()));
    assert_eq!(h.nav.state(), EngineState::Suspended);
    assert_eq!(intercepted.load(Ordering::SeqCst), 1);
    assert_eq!(h.take_log(), vec!["leave:", "leave:home", "enter:login"]);

    h.nav.navigate("home").await.expect("navigation while suspended");
    assert_eq!(h.nav.active_routes()[0].route, "login");
    h.take_log();

    h.store.write("#home");
    h.nav.resume_navigation(None).await.expect("resume");
    assert_eq!(h.nav.is_suspended(), Suspension::None);
    assert_eq!(h.nav.position(), "#home");
    assert_eq!(
        h.take_log(),
        vec!["leave:login", "enter:", "stack:", "enter:home"]
    );
}

#[tokio::test]
async fn ephemeral_suspension_reports_its_route() {
    let h = Harness::new(&["home"]);
    h.goto("#home").await.expect("home");

    h.nav
        .suspend_navigation("splash", Some(recording(&h.log, "splash").into()), None)
        .await
        .expect("suspend");
    assert_eq!(h.nav.is_suspended(), Suspension::Route("splash".into()));

    h.nav
        .resume_navigation(Some(Destination::absolute("home")))
        .await
        .expect("resume");
    assert_eq!(
        h.take_log(),
        vec!["enter:home", "leave:home", "enter:splash", "leave:splash", "enter:home"]
    );
}

#[tokio::test]
async fn suspension_on_an_empty_name_is_unnamed() {
    let h = Harness::new(&["home"]);
    h.goto("#home").await.expect("home");

    h.nav
        .suspend_navigation("", Some(LifecycleHandlers::new().into()), None)
        .await
        .expect("suspend");

    assert_eq!(h.nav.is_suspended(), Suspension::Unnamed);
    assert_eq!(h.nav.state(), EngineState::Suspended);
}

#[tokio::test]
async fn resume_prefers_the_saved_position_over_the_default() {
    let h = Harness::new(&["a", "b"]);
    h.goto("#a").await.expect("a");
    h.nav
        .suspend_navigation("login", Some(recording(&h.log, "login").into()), None)
        .await
        .expect("suspend");
    h.take_log();

    h.nav
        .resume_navigation(Some(Destination::absolute("b")))
        .await
        .expect("resume");

    assert_eq!(h.nav.position(), "#a");
    assert_eq!(h.take_log(), vec!["leave:login", "enter:a"]);
}

#[tokio::test]
async fn resume_without_suspension_runs_the_default() {
    let h = Harness::new(&["a", "b"]);
    h.goto("#a").await.expect("a");
    h.take_log();

    h.nav
        .resume_navigation(Some(Destination::route("b")))
        .await
        .expect("resume");

    assert_eq!(h.nav.position(), "#a#b");
    assert_eq!(h.take_log(), vec!["enter:b", "stack:a"]);
}

#[tokio::test]
async fn external_changes_drive_transitions() {
    let h = Harness::new(&["a"]);
    let listener = h.nav.spawn_position_listener();

    h.store.push_external("#a$1");

    tokio::time::timeout(Duration::from_secs(2), async {
        while h.log.lock().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("listener navigated");
    assert_eq!(h.take_log(), vec!["enter:a=1"]);
    listener.abort();
}

#[tokio::test(start_paused = true)]
async fn slow_handlers_trip_the_watchdog() {
    let h = Harness::new(&[]);
    h.nav
        .add_route(
            "slow",
            LifecycleHandlers::new().enter(Handler::with_completion(|_, completion| {
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(7)).await;
                    completion.done();
                });
            })),
            None,
        )
        .expect("route");

    let outcome = h.goto("#slow").await.expect("navigate");

    assert!(outcome.change().is_some());
    assert_eq!(h.nav.slow_callbacks(), 1);
}
