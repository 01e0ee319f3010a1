mod common;

use std::sync::Arc;

use common::{builder, ms, push, Calls, Demo, DemoModel};
use pretty_assertions::assert_eq;
use statekeeper_core::{
    deps, ActionError, AdvancedSyncAction, AsyncAction, ConfigError, DerivedField, Outcome,
    StoreEvent, SyncAction,
};
use tokio::time::sleep;
use tokio_test::{assert_pending, assert_ready, task};

fn visible() -> DerivedField<DemoModel> {
    DerivedField::<DemoModel>::new("visible", |state, _, _| {
        state
            .values
            .iter()
            .filter(|v| v.contains(state.filter.as_str()))
            .cloned()
            .collect::<Vec<String>>()
    })
    .depends_on(|state, _| deps![state.filter.clone(), state.values.clone()])
}

fn visible_count() -> DerivedField<DemoModel> {
    DerivedField::<DemoModel>::new("visible_count", |_, _, derived| {
        derived
            .get::<Vec<String>>("visible")
            .map_or(0, |values| values.len())
    })
    .depends_on_derived(["visible"])
}

fn label() -> DerivedField<DemoModel> {
    DerivedField::<DemoModel>::new("label", |state, prefix, _| format!("{prefix}{}", state.str))
        .depends_on(|state, prefix| deps![prefix.clone(), state.str.clone()])
}

fn reducers() -> Vec<(&'static str, SyncAction<DemoModel>)> {
    vec![
        (
            "add",
            SyncAction::<DemoModel>::new(|state, args| push(state, args)),
        ),
        (
            "setFilter",
            SyncAction::<DemoModel>::new(|state, args| Demo {
                filter: args.clone(),
                ..state.clone()
            }),
        ),
        (
            "touch",
            SyncAction::<DemoModel>::new(|state, _| Demo {
                other: state.other + 1,
                ..state.clone()
            }),
        ),
    ]
}

fn store_with_derived() -> statekeeper_core::Store<DemoModel> {
    let mut b = builder()
        .derived(visible_count())
        .derived(visible())
        .derived(label());
    for (name, action) in reducers() {
        b = b.action(name, action);
    }
    b.build().unwrap()
}

#[tokio::test]
async fn derived_value_is_reference_stable_across_unrelated_changes() {
    let store = store_with_derived();
    store.dispatch("add", "apple".to_string()).await.unwrap();
    store.dispatch("add", "banana".to_string()).await.unwrap();

    let before = store.derived::<Vec<String>>("visible").unwrap();
    let count_before = store.derived::<usize>("visible_count").unwrap();
    store.dispatch("touch", String::new()).await.unwrap();

    let after = store.derived::<Vec<String>>("visible").unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert!(Arc::ptr_eq(
        &count_before,
        &store.derived::<usize>("visible_count").unwrap()
    ));

    store.dispatch("setFilter", "an".to_string()).await.unwrap();
    let filtered = store.derived::<Vec<String>>("visible").unwrap();
    assert!(!Arc::ptr_eq(&before, &filtered));
    assert_eq!(*filtered, vec!["banana".to_string()]);
    assert_eq!(store.derived::<usize>("visible_count").as_deref(), Some(&1));
}

#[tokio::test]
async fn props_feed_derived_fields() {
    let store = store_with_derived();
    assert_eq!(store.derived::<String>("label").as_deref().map(String::as_str), Some("init"));

    let version = store.version();
    store.set_props("todo: ".to_string());
    assert_eq!(*store.get_props(), "todo: ");
    assert_eq!(
        store.derived::<String>("label").as_deref().map(String::as_str),
        Some("todo: init")
    );
    assert!(store.version() > version);
}

#[test]
fn cyclic_derived_fields_are_rejected() {
    let err = builder()
        .derived(DerivedField::<DemoModel>::new("a", |_, _, _| 1_u32).depends_on_derived(["b"]))
        .derived(DerivedField::<DemoModel>::new("b", |_, _, _| 2_u32).depends_on_derived(["a"]))
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::CircularDependency(_)));
}

#[test]
fn unknown_derived_dependency_is_rejected() {
    let err = builder()
        .derived(visible_count())
        .build()
        .unwrap_err();
    assert_eq!(
        err,
        ConfigError::DependencyNotFound {
            field: "visible_count".to_string(),
            missing_dep: "visible".to_string(),
        }
    );
}

#[tokio::test]
async fn listeners_run_until_unsubscribed() {
    let store = store_with_derived();
    let seen = Calls::default();
    let counter = seen.clone();
    let subscription = store.subscribe(move |_| {
        counter.hit();
    });

    store.dispatch("add", "a".to_string()).await.unwrap();
    store.dispatch("touch", String::new()).await.unwrap();
    assert_eq!(seen.count(), 2);

    assert!(subscription.unsubscribe());
    store.dispatch("touch", String::new()).await.unwrap();
    assert_eq!(seen.count(), 2);
}

#[tokio::test]
async fn listeners_receive_the_committed_snapshot() {
    let store = store_with_derived();
    let snapshots = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = snapshots.clone();
    let _subscription = store.subscribe(move |state| sink.lock().unwrap().push(state.values.len()));

    store.dispatch("add", "a".to_string()).await.unwrap();
    store.dispatch("add", "b".to_string()).await.unwrap();
    assert_eq!(*snapshots.lock().unwrap(), vec![1, 2]);
}

#[tokio::test]
async fn dropping_the_subscription_removes_the_listener() {
    let store = store_with_derived();
    let seen = Calls::default();
    let counter = seen.clone();
    let subscription = store.subscribe(move |_| {
        counter.hit();
    });

    store.dispatch("touch", String::new()).await.unwrap();
    drop(subscription);
    store.dispatch("touch", String::new()).await.unwrap();
    assert_eq!(seen.count(), 1);
}

#[tokio::test]
async fn listener_dispatch_is_delivered_after_the_current_change() {
    let store = store_with_derived();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handle = store.clone();
    let _subscription = store.subscribe(move |state| {
        if state.other == 1 {
            let _ = handle.dispatch("touch", String::new());
        }
        sink.lock().unwrap().push(state.other);
    });

    store.dispatch("touch", String::new()).await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn listeners_see_concurrent_commits_in_order() {
    let store = store_with_derived();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _subscription = store.subscribe(move |state| sink.lock().unwrap().push(state.other));

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..2_000 {
                    store.dispatch("touch", String::new()).await.unwrap();
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let seen = seen.lock().unwrap();
    assert_eq!(*seen, (1..=8_000).collect::<Vec<u32>>());
}

#[tokio::test]
async fn unknown_action_is_reported() {
    let store = store_with_derived();
    let err = store.dispatch("missing", String::new()).await.unwrap_err();
    assert!(matches!(err, ActionError::UnknownAction(ref name) if name == "missing"));
}

#[tokio::test]
async fn sync_dispatch_is_ready_immediately() {
    let store = store_with_derived();
    let mut pending = task::spawn(store.dispatch("add", "a".to_string()));
    let outcome = assert_ready!(pending.poll());
    assert!(matches!(outcome, Ok(Outcome::Applied)));
    assert_eq!(store.get_state().values, vec!["a"]);
}

#[tokio::test(start_paused = true)]
async fn async_dispatch_stays_pending_until_the_call_settles() {
    let action = AsyncAction::<DemoModel>::new(|ctx| async move {
        sleep(ms(50)).await;
        Ok(ctx.args)
    });
    let store = builder().action("load", action).build().unwrap();

    let mut pending = task::spawn(store.dispatch("load", "x".to_string()));
    assert_pending!(pending.poll());

    sleep(ms(60)).await;
    assert!(pending.is_woken());
    let outcome = assert_ready!(pending.poll());
    assert_eq!(outcome.unwrap().into_output().as_deref(), Some("x"));
}

#[tokio::test(start_paused = true)]
async fn debounced_side_effect_runs_once_with_latest_args() {
    let runs = Calls::default();
    let counter = runs.clone();
    let search = AdvancedSyncAction::<DemoModel>::new(|state, args| Demo {
        str: args.clone(),
        ..state.clone()
    })
    .side_effect(ms(100), move |store, args| {
        counter.hit();
        let _ = store.dispatch("setStr2", args.clone());
    });
    let store = builder()
        .action("search", search)
        .action(
            "setStr2",
            SyncAction::<DemoModel>::new(|state, args| Demo {
                str2: args.clone(),
                ..state.clone()
            }),
        )
        .build()
        .unwrap();

    for query in ["a", "ab", "abc"] {
        store.dispatch("search", query.to_string()).await.unwrap();
        sleep(ms(30)).await;
    }
    assert_eq!(store.get_state().str, "abc");
    assert_eq!(runs.count(), 0);

    sleep(ms(200)).await;
    assert_eq!(runs.count(), 1);
    assert_eq!(store.get_state().str2, "abc");
}

#[tokio::test]
async fn zero_debounce_runs_side_effect_inline() {
    let runs = Calls::default();
    let counter = runs.clone();
    let action = AdvancedSyncAction::<DemoModel>::new(|state, args| push(state, args))
        .side_effect(std::time::Duration::ZERO, move |_, _| {
            counter.hit();
        });
    let store = builder().action("add", action).build().unwrap();

    store.dispatch("add", "a".to_string()).await.unwrap();
    store.dispatch("add", "b".to_string()).await.unwrap();
    assert_eq!(runs.count(), 2);
}

#[test]
fn debounced_side_effect_runs_inline_without_a_runtime() {
    let runs = Calls::default();
    let counter = runs.clone();
    let action = AdvancedSyncAction::<DemoModel>::new(|state, args| push(state, args))
        .side_effect(ms(100), move |_, _| {
            counter.hit();
        });
    let store = builder().action("add", action).build().unwrap();

    let _ = store.dispatch("add", "a".to_string());
    assert_eq!(runs.count(), 1);
    assert_eq!(store.get_state().values, vec!["a"]);
}

#[tokio::test]
async fn events_describe_each_commit() {
    let store = store_with_derived();
    let mut events = store.events();

    store.dispatch("add", "a".to_string()).await.unwrap();
    let event = events.try_recv().unwrap();
    match &event {
        StoreEvent::Committed {
            action,
            instance,
            version,
            ..
        } => {
            assert_eq!(action, "add");
            assert_eq!(instance, statekeeper_core::DEFAULT_INSTANCE);
            assert_eq!(*version, store.version());
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
    assert_eq!(json["type"], "committed");
    assert_eq!(json["kind"], "sync");
}

#[tokio::test]
async fn mount_hooks_receive_the_store() {
    let mounted = Calls::default();
    let unmounted = Calls::default();
    let (m, u) = (mounted.clone(), unmounted.clone());
    let store = builder()
        .on_mount(move |store| {
            assert!(store.get_state().values.is_empty());
            m.hit();
        })
        .on_unmount(move |_| {
            u.hit();
        })
        .build()
        .unwrap();

    store.mount();
    assert_eq!((mounted.count(), unmounted.count()), (1, 0));
    store.unmount();
    assert_eq!((mounted.count(), unmounted.count()), (1, 1));
}

#[test]
fn stores_are_independent() {
    let a = builder().build().unwrap();
    let b = builder().build().unwrap();
    assert_ne!(a.id(), b.id());
    assert_eq!(a.clone().id(), a.id());
}
