//! Todo list with an optimistic "save" that the server rejects.
//!
//! Run with `RUST_LOG=statekeeper_core=debug` to see every commit.

use std::time::Duration;

use anyhow::{anyhow, Result};
use statekeeper_core::config::load_default;
use statekeeper_core::{
    deps, AsyncAction, DerivedField, Model, Outcome, Store, StoreEvent, SyncAction,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Default)]
struct Todos {
    items: Vec<String>,
    filter: String,
    status: String,
}

struct TodoModel;

impl Model for TodoModel {
    type State = Todos;
    type Props = ();
    type Args = String;
    type Output = String;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let save = AsyncAction::<TodoModel>::new(|ctx| async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        if ctx.args.contains("forbidden") {
            Err(anyhow!("server refused '{}'", ctx.args))
        } else {
            Ok(ctx.args)
        }
    })
    .optimistic(|state, item| {
        let mut next = state.clone();
        next.items.push(item.clone());
        next
    })
    .on_error(|state, failure, item| Todos {
        status: format!("could not save {item}: {}", failure.error),
        ..state.clone()
    });

    let store = Store::<TodoModel>::builder(())
        .config(load_default()?)
        .initial_state(Todos::default)
        .action("save", save)
        .action(
            "setStatus",
            SyncAction::<TodoModel>::new(|state, status| Todos {
                status: status.clone(),
                ..state.clone()
            }),
        )
        .derived(
            DerivedField::<TodoModel>::new("visible", |state, _, _| {
                state
                    .items
                    .iter()
                    .filter(|item| item.contains(state.filter.as_str()))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .depends_on(|state, _| deps![state.filter.clone(), state.items.clone()]),
        )
        .on_unhandled_error(|report| {
            tracing::error!(action = %report.action, error = %report.error, "call failed");
        })
        .build()?;

    let mut events = store.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let StoreEvent::RolledBack { action, replayed, .. } = &event {
                println!("rolled back {action}, replayed {replayed} later effects");
            }
        }
    });

    let good = store.dispatch("save", "buy milk".to_string());
    let bad = store.dispatch("save", "forbidden fruit".to_string());
    store.dispatch("setStatus", "typing...".to_string()).await?;
    println!("optimistic items: {:?}", store.get_state().items);

    for pending in [good, bad] {
        match pending.await? {
            Outcome::Done(item) => println!("saved {item}"),
            Outcome::Failed(err) => println!("handled failure: {err}"),
            other => println!("settled: {other:?}"),
        }
    }

    let state = store.get_state();
    println!("final items: {:?}", state.items);
    println!("status: {}", state.status);
    println!(
        "visible: {:?}",
        store.derived::<Vec<String>>("visible").unwrap_or_default()
    );
    Ok(())
}
