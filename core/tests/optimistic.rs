mod common;

use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use common::{builder, initial, ms, push, Demo, DemoModel};
use pretty_assertions::assert_eq;
use statekeeper_core::{AsyncAction, Outcome, StoreEvent, SyncAction};
use tokio::time::sleep;

fn failing_save() -> AsyncAction<DemoModel> {
    AsyncAction::<DemoModel>::new(|_| async {
        sleep(ms(50)).await;
        Err::<String, _>(anyhow!("server down"))
    })
    .optimistic(|state, args| Demo {
        str: args.clone(),
        ..state.clone()
    })
}

fn set_str2() -> SyncAction<DemoModel> {
    SyncAction::<DemoModel>::new(|state, args| Demo {
        str2: args.clone(),
        ..state.clone()
    })
}

#[tokio::test(start_paused = true)]
async fn failed_optimistic_call_keeps_concurrent_commits() {
    let store = builder()
        .action("save", failing_save().on_error(|state, _, _| state.clone()))
        .action("setStr2", set_str2())
        .build()
        .unwrap();
    let mut events = store.events();

    let pending = store.dispatch("save", "opti".to_string());
    assert_eq!(store.get_state().str, "opti");
    assert!(store.is_recording());
    // Optimistic calls do not show as loading.
    assert!(!store.get_loading_state("save").loading);

    store
        .dispatch("setStr2", "text".to_string())
        .await
        .unwrap();
    assert_eq!(store.get_state().str2, "text");

    assert!(matches!(pending.await.unwrap(), Outcome::Failed(_)));
    assert_eq!(
        *store.get_state(),
        Demo {
            str: "init".to_string(),
            str2: "text".to_string(),
            ..Demo::default()
        }
    );
    assert!(!store.is_recording());
    assert_eq!(store.history_len(), 0);
    assert!(store.get_loading_state("save").error.is_some());

    let mut rolled_back = false;
    while let Ok(event) = events.try_recv() {
        if let StoreEvent::RolledBack { action, replayed, .. } = event {
            assert_eq!(action, "save");
            // The sync commit and the error effect are replayed.
            assert_eq!(replayed, 2);
            rolled_back = true;
        }
    }
    assert!(rolled_back);
}

#[tokio::test(start_paused = true)]
async fn successful_optimistic_call_keeps_its_effect() {
    let action = AsyncAction::<DemoModel>::new(|ctx| async move {
        sleep(ms(10)).await;
        Ok(format!("{}!", ctx.args))
    })
    .optimistic(|state, args| Demo {
        str: args.clone(),
        ..state.clone()
    })
    .on_success(|state, value, _| Demo {
        str2: value.clone(),
        ..state.clone()
    });
    let store = builder().action("save", action).build().unwrap();

    let outcome = store
        .dispatch("save", "opti".to_string())
        .await
        .unwrap();
    assert_eq!(outcome.into_output().as_deref(), Some("opti!"));
    assert_eq!(store.get_state().str, "opti");
    assert_eq!(store.get_state().str2, "opti!");
    assert!(!store.is_recording());
}

#[tokio::test(start_paused = true)]
async fn nested_optimistic_calls_roll_back_independently() {
    let first = AsyncAction::<DemoModel>::new(|_| async {
        sleep(ms(40)).await;
        Err::<String, _>(anyhow!("first failed"))
    })
    .optimistic(|state, _| push(state, "1"));

    let second = AsyncAction::<DemoModel>::new(|_| async {
        sleep(ms(20)).await;
        Ok("2ok".to_string())
    })
    .optimistic(|state, _| push(state, "2"))
    .on_success(|state, value, _| push(state, value));

    let store = builder()
        .action("first", first)
        .action("second", second)
        .action(
            "noise",
            SyncAction::<DemoModel>::new(|state, args| push(state, args)),
        )
        .build()
        .unwrap();

    let first = store.dispatch("first", String::new());
    store.dispatch("noise", "x".to_string()).await.unwrap();
    let second = store.dispatch("second", String::new());
    assert_eq!(store.get_state().values, vec!["1", "x", "2"]);
    assert_eq!(store.pending_optimistic(), 2);

    assert!(second.await.unwrap().is_done());
    assert_eq!(store.get_state().values, vec!["1", "x", "2", "2ok"]);
    assert_eq!(store.pending_optimistic(), 1);

    // No error effect or message: the failure rejects the caller.
    assert!(first.await.is_err());
    assert_eq!(store.get_state().values, vec!["x", "2", "2ok"]);
    assert!(!store.is_recording());
}

#[tokio::test(start_paused = true)]
async fn failure_report_sees_state_before_rollback() {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();
    let store = builder()
        .action("save", failing_save())
        .on_unhandled_error(move |report| {
            sink.lock()
                .unwrap()
                .push((report.state.str.clone(), report.handled, report.args.clone()));
        })
        .build()
        .unwrap();

    let err = store
        .dispatch("save", "opti".to_string())
        .await
        .unwrap_err();
    assert_eq!(
        err.call_error().map(ToString::to_string).as_deref(),
        Some("server down")
    );
    assert_eq!(*store.get_state(), initial());
    assert_eq!(
        *reports.lock().unwrap(),
        vec![("opti".to_string(), false, "opti".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn snapshot_function_is_used_for_optimistic_entries() {
    let copies = common::Calls::default();
    let counter = copies.clone();
    let store = builder()
        .snapshot_with(move |state| {
            counter.hit();
            state.clone()
        })
        .action("save", failing_save().on_error(|state, _, _| state.clone()))
        .build()
        .unwrap();

    let _ = store.dispatch("save", "opti".to_string()).await.unwrap();
    assert_eq!(copies.count(), 1);
    assert_eq!(store.get_state().str, "init");
}

#[tokio::test(start_paused = true)]
async fn aborted_call_settling_late_keeps_its_successors_effect() {
    // "a" ignores its abort signal and settles after "b".
    let action = AsyncAction::<DemoModel>::new(|ctx| async move {
        let delay = if ctx.args == "a" { ms(50) } else { ms(10) };
        sleep(delay).await;
        Ok(ctx.args)
    })
    .abortable()
    .optimistic(|state, args| Demo {
        str: args.clone(),
        ..state.clone()
    });
    let store = builder().action("save", action).build().unwrap();

    let a = store.dispatch("save", "a".to_string());
    let b = store.dispatch("save", "b".to_string());
    assert!(store.abort("save", None));
    assert_eq!(store.get_state().str, "b");
    assert_eq!(store.pending_optimistic(), 2);

    assert!(b.await.unwrap().is_done());
    assert_eq!(store.get_state().str, "b");

    assert!(matches!(a.await.unwrap(), Outcome::Aborted));
    assert_eq!(store.get_state().str, "b");
    assert_eq!(store.pending_optimistic(), 0);
    assert!(!store.is_recording());
}
