//! Command and event handlers for the Desk
//!
//! Replies go back on oneshot channels; a caller that stopped waiting
//! is not an error.

use super::{Desk, DeskCommand, RECENT_FAILURES_CAP};
use crate::services::sync_worker::SyncFailure;
use chrono::Utc;
use tracing::warn;

impl Desk {
    pub(crate) fn handle_command(&mut self, cmd: DeskCommand) {
        let store = &mut self.store;
        match cmd {
            DeskCommand::SignIn { operator, reply } => {
                store.sign_in(operator);
                let _ = reply.send(());
            }
            DeskCommand::SignOut { reply } => {
                store.sign_out();
                let _ = reply.send(());
            }
            DeskCommand::Scan { code, route_id, manual, reply } => {
                let _ = reply.send(store.process_scan(&code, route_id.as_deref(), manual));
            }
            DeskCommand::AssignRoute { operator_id, route_id, reply } => {
                let _ = reply.send(store.assign_route(&operator_id, route_id.as_deref()));
            }
            DeskCommand::ImportPackages { entries, reply } => {
                let _ = reply.send(store.import_packages(&entries));
            }
            DeskCommand::ImportRoutes { routes, reply } => {
                let _ = reply.send(store.import_routes(routes));
            }
            DeskCommand::AddRoute { route, reply } => {
                let _ = reply.send(store.add_route(route));
            }
            DeskCommand::UpdateRoute { route, reply } => {
                let _ = reply.send(store.update_route(route));
            }
            DeskCommand::RemoveRoute { route_id, reply } => {
                let _ = reply.send(store.remove_route(&route_id));
            }
            DeskCommand::SetRouteCompleted { route_id, completed, reply } => {
                let _ = reply.send(store.set_route_completed(&route_id, completed));
            }
            DeskCommand::AddUser { user, reply } => {
                let _ = reply.send(store.add_user(user));
            }
            DeskCommand::UpdateUser { user, reply } => {
                let _ = reply.send(store.update_user(user));
            }
            DeskCommand::RemoveUser { user_id, reply } => {
                let _ = reply.send(store.remove_user(&user_id));
            }
            DeskCommand::ClearDaily { reply } => {
                store.clear_daily_data();
                let _ = reply.send(());
            }
            DeskCommand::Routes { reply } => {
                let _ = reply.send(store.routes().all().to_vec());
            }
            DeskCommand::Users { reply } => {
                let _ = reply.send(store.users().all().to_vec());
            }
            DeskCommand::RecentScans { limit, reply } => {
                let _ = reply.send(store.log().iter().take(limit).cloned().collect());
            }
            DeskCommand::Progress { reply } => {
                let _ = reply.send(store.all_route_progress());
            }
            DeskCommand::Dashboard { reply } => {
                let _ = reply.send(store.dashboard(Utc::now()));
            }
            DeskCommand::Operators { reply } => {
                let _ = reply.send(store.operator_stats(Utc::now()));
            }
            DeskCommand::RouteReport { route_id, reply } => {
                let _ = reply.send(store.route_report(&route_id));
            }
            DeskCommand::RecentFailures { reply } => {
                let _ = reply.send(self.recent_failures.iter().cloned().collect());
            }
        }
    }

    /// Keep a durable write failure for the supervisor view
    ///
    /// The worker already logged and counted it; local state stays as is.
    pub(crate) fn handle_sync_failure(&mut self, failure: SyncFailure) {
        warn!(
            operation = %failure.operation,
            subject = %failure.subject.as_deref().unwrap_or("-"),
            "sync_failure_recorded"
        );
        if self.recent_failures.len() == RECENT_FAILURES_CAP {
            self.recent_failures.pop_front();
        }
        self.recent_failures.push_back(failure);
    }
}
