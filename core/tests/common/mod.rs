#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use statekeeper_core::{Model, Store, StoreBuilder};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Demo {
    pub str: String,
    pub str2: String,
    pub values: Vec<String>,
    pub filter: String,
    pub other: u32,
}

pub struct DemoModel;

impl Model for DemoModel {
    type State = Demo;
    /// Label prefix.
    type Props = String;
    type Args = String;
    type Output = String;
}

pub fn initial() -> Demo {
    Demo {
        str: "init".to_string(),
        ..Demo::default()
    }
}

pub fn builder() -> StoreBuilder<DemoModel> {
    Store::<DemoModel>::builder(String::new()).initial_state(initial)
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

pub fn push(state: &Demo, value: &str) -> Demo {
    let mut next = state.clone();
    next.values.push(value.to_string());
    next
}

/// Shared invocation counter for call functions.
#[derive(Clone, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
    pub fn hit(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Latency used by the call fixtures: "v1" is the slowest, later values
/// finish faster.
pub fn latency(value: &str) -> Duration {
    match value {
        "v1" => ms(40),
        "v2" => ms(10),
        "v3" => ms(30),
        _ => ms(5),
    }
}
