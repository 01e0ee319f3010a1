use tokio::runtime::Handle;
use tracing::{trace, warn};

use crate::action::{AdvancedSyncAction, ArgsOf, Model, Outcome, OutputOf, Pending, SyncAction};
use crate::conflict::DEFAULT_INSTANCE;
use crate::history::EffectKind;
use crate::store::Store;
use crate::util::lock;

use super::bind;

pub(crate) fn dispatch_sync<M: Model>(
    store: &Store<M>,
    name: &str,
    action: &SyncAction<M>,
    args: ArgsOf<M>,
) -> Pending<OutputOf<M>> {
    store.commit(
        name,
        DEFAULT_INSTANCE,
        None,
        EffectKind::Sync,
        &args,
        bind::<M>(&action.reduce, &args),
    );
    Pending::ready(Ok(Outcome::Applied))
}

/// Commits the transform, then runs or schedules the side effect.
///
/// Each call bumps the action's debounce ticket; a scheduled side effect
/// only runs if its ticket is still the latest when the window closes.
pub(crate) fn dispatch_advanced<M: Model>(
    store: &Store<M>,
    name: &str,
    action: &AdvancedSyncAction<M>,
    args: ArgsOf<M>,
) -> Pending<OutputOf<M>> {
    store.commit(
        name,
        DEFAULT_INSTANCE,
        None,
        EffectKind::Sync,
        &args,
        bind::<M>(&action.reduce, &args),
    );

    let Some(effect) = action.side_effect.clone() else {
        return Pending::ready(Ok(Outcome::Applied));
    };

    if action.debounce.is_zero() {
        effect(store, &args);
        return Pending::ready(Ok(Outcome::Applied));
    }

    let Ok(runtime) = Handle::try_current() else {
        warn!(store = %store.id(), action = name, "no runtime for debounce; running side effect now");
        effect(store, &args);
        return Pending::ready(Ok(Outcome::Applied));
    };

    let ticket = {
        let mut tickets = lock(&store.inner.debounce);
        let ticket = tickets.entry(name.to_string()).or_insert(0);
        *ticket += 1;
        *ticket
    };

    let store = store.clone();
    let name = name.to_string();
    let debounce = action.debounce;
    runtime.spawn(async move {
        tokio::time::sleep(debounce).await;
        let latest = lock(&store.inner.debounce).get(&name).copied();
        if latest == Some(ticket) {
            effect(&store, &args);
        } else {
            trace!(store = %store.id(), action = %name, ticket, "side effect superseded");
        }
    });

    Pending::ready(Ok(Outcome::Applied))
}
