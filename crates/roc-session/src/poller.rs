//! Fixed-interval fan-out across the four poll sources. Each cycle issues all
//! requests concurrently and waits for every one to settle; a slow or failing
//! source never delays or cancels the others.

use crate::transport::Transport;
use roc_core::wire::{CategoryStatsBody, ConnectedBody, ServerTimeBody, UsersBody};
use roc_core::{reconcile, RawSnapshot, ViewModel};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::debug;

pub const USERS_PATH: &str = "/admin/users";
pub const CONNECTED_PATH: &str = "/admin/connected_users";
pub const SERVER_TIME_PATH: &str = "/admin/server_time";
pub const CATEGORY_STATS_PATH: &str = "/admin/raza_stats";

/// One poll cycle. A source either yields a fully decoded payload or `None`;
/// there is no partial decode and no exception path.
pub async fn poll_once(transport: &Transport) -> RawSnapshot {
    let (users, connected, server_time, categories) = tokio::join!(
        transport.fetch_json::<UsersBody>(USERS_PATH),
        transport.fetch_json::<ConnectedBody>(CONNECTED_PATH),
        transport.fetch_json::<ServerTimeBody>(SERVER_TIME_PATH),
        transport.fetch_json::<CategoryStatsBody>(CATEGORY_STATS_PATH),
    );
    RawSnapshot {
        users: users.map(|body| body.users),
        connected: connected.map(|body| body.users),
        server_time: server_time.map(|body| body.server_time),
        categories: categories.map(CategoryStatsBody::into_counts),
    }
}

/// Poll loop: one immediate cycle, then one per interval. Cycles are
/// coalesced, never overlapped: the loop awaits each fan-out before the next
/// tick, and `Delay` keeps a slow cycle from bunching up the ones after it.
/// Reconciliation for cycle *k* therefore only ever sees cycle *k*'s data.
/// Exits when the receiving side is gone (session stopped: settle-and-drop).
pub async fn run(transport: Arc<Transport>, interval: Duration, views: mpsc::Sender<ViewModel>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let snapshot = poll_once(&transport).await;
        debug!(
            event = "poll_cycle",
            users = snapshot.users.as_ref().map(Vec::len),
            connected = snapshot.connected.as_ref().map(Vec::len),
            has_time = snapshot.server_time.is_some(),
            categories = snapshot.categories.as_ref().map(Vec::len),
        );
        let view = reconcile(&snapshot);
        if views.send(view).await.is_err() {
            break;
        }
    }
}
