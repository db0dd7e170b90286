//! Line-oriented operator console
//!
//! Each input line is either a command or a bare tracking code to scan
//! against the selected route.

use crate::domain::types::{Operator, Role, Route, User};
use crate::io::text_import::{parse_packages, parse_routes, route_report_file_name};
use crate::services::desk::DeskHandle;
use crate::services::error::DeskError;
use anyhow::Context;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const HELP: &str = "\
commands:
  login <id> [name]          sign in as an operator
  logout                     sign out
  route <id>|none            select the route to scan against
  manual on|off              accept codes missing from the reference list
  routes                     list routes
  progress                   progress per route
  stats                      shift dashboard
  operators                  per-operator statistics
  recent [n]                 newest scans
  failures                   durable writes that did not land
  import <file>              load packages (code, cep per line)
  import-routes <file>       load routes (name;prefixes;category per line)
  add-route <name>;<prefixes>;<category>
  edit-route <id> <name>;<prefixes>;<category>
  remove-route <id>
  export <route-id> [file]   write the route report as CSV
  complete <route-id>        mark a route completed
  reopen <route-id>          mark a route open
  users                      list staff
  add-user <id> <login> <operator|supervisor> <name>
  deactivate <user-id>       mark a user inactive
  remove-user <user-id>
  clear                      end of shift: drop packages and scans, reopen routes
  help | quit
anything else is scanned as a tracking code";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Login { id: String, name: Option<String> },
    Logout,
    SelectRoute(Option<String>),
    Manual(bool),
    Routes,
    Progress,
    Stats,
    Operators,
    Recent(usize),
    Failures,
    Import(PathBuf),
    ImportRoutes(PathBuf),
    AddRoute(String),
    EditRoute { id: String, definition: String },
    RemoveRoute(String),
    Export { route_id: String, file: Option<PathBuf> },
    Complete(String),
    Reopen(String),
    Users,
    AddUser { id: String, login: String, role: Role, name: String },
    Deactivate(String),
    RemoveUser(String),
    Clear,
    Help,
    Quit,
    Scan(String),
    Empty,
}

/// Why a command line could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("usage: {0}")]
pub struct UsageError(&'static str);

fn required<'a>(arg: Option<&'a str>, usage: &'static str) -> Result<&'a str, UsageError> {
    arg.map(str::trim).filter(|a| !a.is_empty()).ok_or(UsageError(usage))
}

/// Parse one input line
pub fn parse_line(line: &str) -> Result<ConsoleCommand, UsageError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ConsoleCommand::Empty);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, Some(rest.trim())),
        None => (line, None),
    };

    let cmd = match word {
        "login" => {
            let rest = required(rest, "login <id> [name]")?;
            let (id, name) = match rest.split_once(char::is_whitespace) {
                Some((id, name)) => (id, Some(name.trim().to_string())),
                None => (rest, None),
            };
            ConsoleCommand::Login { id: id.to_string(), name }
        }
        "logout" => ConsoleCommand::Logout,
        "route" => match required(rest, "route <id>|none")? {
            "none" => ConsoleCommand::SelectRoute(None),
            id => ConsoleCommand::SelectRoute(Some(id.to_string())),
        },
        "manual" => match required(rest, "manual on|off")? {
            "on" => ConsoleCommand::Manual(true),
            "off" => ConsoleCommand::Manual(false),
            _ => return Err(UsageError("manual on|off")),
        },
        "routes" => ConsoleCommand::Routes,
        "progress" => ConsoleCommand::Progress,
        "stats" => ConsoleCommand::Stats,
        "operators" => ConsoleCommand::Operators,
        "recent" => match rest.filter(|r| !r.is_empty()) {
            Some(n) => ConsoleCommand::Recent(n.parse().map_err(|_| UsageError("recent [n]"))?),
            None => ConsoleCommand::Recent(10),
        },
        "failures" => ConsoleCommand::Failures,
        "import" => ConsoleCommand::Import(required(rest, "import <file>")?.into()),
        "import-routes" => ConsoleCommand::ImportRoutes(required(rest, "import-routes <file>")?.into()),
        "add-route" => {
            ConsoleCommand::AddRoute(required(rest, "add-route <name>;<prefixes>;<category>")?.to_string())
        }
        "edit-route" => {
            const USAGE: &str = "edit-route <id> <name>;<prefixes>;<category>";
            let rest = required(rest, USAGE)?;
            let (id, definition) = rest.split_once(char::is_whitespace).ok_or(UsageError(USAGE))?;
            ConsoleCommand::EditRoute { id: id.to_string(), definition: definition.trim().to_string() }
        }
        "remove-route" => ConsoleCommand::RemoveRoute(required(rest, "remove-route <id>")?.to_string()),
        "export" => {
            let rest = required(rest, "export <route-id> [file]")?;
            match rest.split_once(char::is_whitespace) {
                Some((id, file)) => {
                    ConsoleCommand::Export { route_id: id.to_string(), file: Some(file.trim().into()) }
                }
                None => ConsoleCommand::Export { route_id: rest.to_string(), file: None },
            }
        }
        "complete" => ConsoleCommand::Complete(required(rest, "complete <route-id>")?.to_string()),
        "reopen" => ConsoleCommand::Reopen(required(rest, "reopen <route-id>")?.to_string()),
        "users" => ConsoleCommand::Users,
        "add-user" => {
            const USAGE: &str = "add-user <id> <login> <operator|supervisor> <name>";
            let mut parts = required(rest, USAGE)?.splitn(4, char::is_whitespace).map(str::trim);
            let (Some(id), Some(login), Some(role), Some(name)) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                return Err(UsageError(USAGE));
            };
            let role = match role.to_ascii_lowercase().as_str() {
                "operator" => Role::Operator,
                "supervisor" => Role::Supervisor,
                _ => return Err(UsageError(USAGE)),
            };
            ConsoleCommand::AddUser { id: id.to_string(), login: login.to_string(), role, name: name.to_string() }
        }
        "deactivate" => ConsoleCommand::Deactivate(required(rest, "deactivate <user-id>")?.to_string()),
        "remove-user" => ConsoleCommand::RemoveUser(required(rest, "remove-user <user-id>")?.to_string()),
        "clear" => ConsoleCommand::Clear,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        _ => ConsoleCommand::Scan(line.to_string()),
    };
    Ok(cmd)
}

/// What the input loop should do after a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue(String),
    Quit,
}

/// Console session: who is signed in, which route, manual mode
pub struct Console {
    desk: DeskHandle,
    operator: Option<Operator>,
    route_id: Option<String>,
    manual: bool,
}

impl Console {
    pub fn new(desk: DeskHandle) -> Self {
        Self { desk, operator: None, route_id: None, manual: false }
    }

    pub fn selected_route(&self) -> Option<&str> {
        self.route_id.as_deref()
    }

    /// Parse and run one line; errors become output text
    pub async fn handle_line(&mut self, line: &str) -> anyhow::Result<Flow> {
        match parse_line(line) {
            Ok(ConsoleCommand::Quit) => Ok(Flow::Quit),
            Ok(cmd) => match self.execute(cmd).await {
                Ok(text) => Ok(Flow::Continue(text)),
                Err(e) => match e.downcast_ref::<DeskError>() {
                    Some(DeskError::Closed) => Err(e),
                    _ => Ok(Flow::Continue(format!("error: {:#}", e))),
                },
            },
            Err(usage) => Ok(Flow::Continue(usage.to_string())),
        }
    }

    pub async fn execute(&mut self, cmd: ConsoleCommand) -> anyhow::Result<String> {
        let out = match cmd {
            ConsoleCommand::Empty => String::new(),
            ConsoleCommand::Help => HELP.to_string(),
            ConsoleCommand::Quit => "bye".to_string(),
            ConsoleCommand::Login { id, name } => self.login(id, name).await?,
            ConsoleCommand::Logout => {
                self.desk.sign_out().await?;
                self.operator = None;
                self.route_id = None;
                "signed out".to_string()
            }
            ConsoleCommand::SelectRoute(route_id) => self.select_route(route_id).await?,
            ConsoleCommand::Manual(on) => {
                self.manual = on;
                format!("manual mode {}", if on { "on" } else { "off" })
            }
            ConsoleCommand::Routes => {
                let routes = self.desk.routes().await?;
                let mut out = String::new();
                for r in &routes {
                    let prefixes = if r.prefixes.is_empty() { "*".to_string() } else { r.prefixes.join(",") };
                    let state = if r.completed { "completed" } else { "open" };
                    let _ = writeln!(out, "{}  {} [{}] {} ({})", r.id, r.name, r.category, prefixes, state);
                }
                if routes.is_empty() {
                    out.push_str("no routes");
                }
                out.trim_end().to_string()
            }
            ConsoleCommand::Progress => {
                let mut out = String::new();
                for p in self.desk.progress().await? {
                    let _ = writeln!(
                        out,
                        "{} [{}] {}/{}{}",
                        p.route_name,
                        p.category,
                        p.scanned,
                        p.expected,
                        if p.completed { " completed" } else { "" }
                    );
                }
                out.trim_end().to_string()
            }
            ConsoleCommand::Stats => {
                let d = self.desk.dashboard().await?;
                let busiest = d
                    .scans_by_hour
                    .iter()
                    .enumerate()
                    .max_by_key(|(_, n)| **n)
                    .filter(|(_, n)| **n > 0)
                    .map(|(h, n)| format!("{:02}h ({})", h, n))
                    .unwrap_or_else(|| "-".to_string());
                format!(
                    "total {} accepted {} errors {} manual {} online {} completion {:.1}% busiest {}",
                    d.total, d.accepted, d.errors, d.manual, d.operators_online, d.completion_pct, busiest
                )
            }
            ConsoleCommand::Operators => {
                let mut out = String::new();
                for s in self.desk.operators().await? {
                    let last = s
                        .last_active
                        .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
                        .unwrap_or_else(|| "-".to_string());
                    let _ = writeln!(
                        out,
                        "{} route {} total {} ok {} {}/min last {}",
                        s.name,
                        s.current_route.as_deref().unwrap_or("-"),
                        s.total_scans,
                        s.successful_scans,
                        s.scans_per_minute,
                        last
                    );
                }
                out.trim_end().to_string()
            }
            ConsoleCommand::Recent(limit) => {
                let mut out = String::new();
                for r in self.desk.recent_scans(limit).await? {
                    let when = r.created_at.with_timezone(&chrono::Local).format("%H:%M:%S");
                    let _ = writeln!(out, "{} {} {} {} {}", when, r.tracking_code, r.status, r.route_name, r.operator_name);
                }
                out.trim_end().to_string()
            }
            ConsoleCommand::Failures => {
                let mut out = String::new();
                for f in self.desk.recent_failures().await? {
                    let _ = writeln!(
                        out,
                        "{} {} {}: {}",
                        f.at.to_rfc3339(),
                        f.operation,
                        f.subject.as_deref().unwrap_or("-"),
                        f.error
                    );
                }
                if out.is_empty() {
                    out.push_str("no sync failures");
                }
                out.trim_end().to_string()
            }
            ConsoleCommand::Import(path) => {
                let text = read_file(&path).await?;
                let entries = parse_packages(&text)?;
                let summary = self.desk.import_packages(entries).await?;
                format!("imported {} packages ({} new) in {} chunks", summary.rows, summary.added, summary.chunks)
            }
            ConsoleCommand::ImportRoutes(path) => {
                let text = read_file(&path).await?;
                let imported = self.desk.import_routes(parse_routes(&text)?).await?;
                format!("imported {} routes", imported.len())
            }
            ConsoleCommand::AddRoute(definition) => {
                let route = parse_single_route(&definition)?;
                let route = self.desk.add_route(route).await?;
                format!("route {} added ({})", route.name, route.id)
            }
            ConsoleCommand::EditRoute { id, definition } => {
                let mut route = parse_single_route(&definition)?;
                let existing = self.find_route(&id).await?;
                route.id = existing.id;
                route.completed = existing.completed;
                let route = self.desk.update_route(route).await?;
                format!("route {} updated", route.name)
            }
            ConsoleCommand::RemoveRoute(id) => {
                let removed = self.desk.remove_route(&id).await?;
                if self.route_id.as_deref() == Some(id.as_str()) {
                    self.route_id = None;
                }
                format!("route {} removed", removed.name)
            }
            ConsoleCommand::Export { route_id, file } => {
                let route = self.find_route(&route_id).await?;
                let csv = self.desk.route_report(&route_id).await?;
                let path = file.unwrap_or_else(|| route_report_file_name(&route.name).into());
                tokio::fs::write(&path, csv)
                    .await
                    .with_context(|| format!("failed to write {}", path.display()))?;
                format!("report written to {}", path.display())
            }
            ConsoleCommand::Complete(id) => {
                let route = self.desk.set_route_completed(&id, true).await?;
                if self.route_id.as_deref() == Some(id.as_str()) {
                    self.route_id = None;
                }
                format!("route {} completed", route.name)
            }
            ConsoleCommand::Reopen(id) => {
                let route = self.desk.set_route_completed(&id, false).await?;
                format!("route {} reopened", route.name)
            }
            ConsoleCommand::Users => {
                let mut out = String::new();
                for u in self.desk.users().await? {
                    let _ = writeln!(
                        out,
                        "{}  {} ({}) {:?}{}",
                        u.id,
                        u.name,
                        u.login,
                        u.role,
                        if u.active { "" } else { " inactive" }
                    );
                }
                out.trim_end().to_string()
            }
            ConsoleCommand::AddUser { id, login, role, name } => {
                self.desk.add_user(User { id: id.clone(), name, login, role, active: true }).await?;
                format!("user {} added", id)
            }
            ConsoleCommand::Deactivate(id) => {
                let users = self.desk.users().await?;
                let mut user = users
                    .into_iter()
                    .find(|u| u.id == id)
                    .ok_or_else(|| anyhow::anyhow!("user not found: {}", id))?;
                user.active = false;
                self.desk.update_user(user).await?;
                format!("user {} deactivated", id)
            }
            ConsoleCommand::RemoveUser(id) => {
                let removed = self.desk.remove_user(&id).await?;
                format!("user {} removed", removed.name)
            }
            ConsoleCommand::Clear => {
                self.desk.clear_daily().await?;
                "daily data cleared".to_string()
            }
            ConsoleCommand::Scan(code) => {
                let verdict = self.desk.scan(&code, self.route_id.as_deref(), self.manual).await?;
                format!("{} {}", verdict.status, verdict.message)
            }
        };
        Ok(out)
    }

    async fn login(&mut self, id: String, name: Option<String>) -> anyhow::Result<String> {
        let known = self.desk.users().await?.into_iter().find(|u| u.id == id);
        let operator = match (name, known) {
            (Some(name), _) => Operator::new(&id, &name),
            (None, Some(user)) => Operator::from(&user),
            (None, None) => Operator::new(&id, &id),
        };
        self.desk.sign_in(operator.clone()).await?;
        let reply = format!("signed in as {}", operator.name);
        self.operator = Some(operator);
        Ok(reply)
    }

    async fn select_route(&mut self, route_id: Option<String>) -> anyhow::Result<String> {
        let Some(operator) = self.operator.as_ref() else {
            anyhow::bail!("not logged in");
        };
        self.desk.assign_route(&operator.id, route_id.as_deref()).await?;
        let label = match route_id.as_deref() {
            Some(id) => self.find_route(id).await?.name,
            None => "none".to_string(),
        };
        self.route_id = route_id;
        Ok(format!("route {}", label))
    }

    async fn find_route(&self, id: &str) -> anyhow::Result<Route> {
        self.desk
            .routes()
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow::anyhow!("route not found: {}", id))
    }
}

fn parse_single_route(definition: &str) -> anyhow::Result<Route> {
    let mut routes = parse_routes(definition)?;
    anyhow::ensure!(routes.len() == 1, "expected one route definition");
    Ok(routes.remove(0))
}

async fn read_file(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::metrics::Metrics;
    use crate::io::feedback::RecordingFeedback;
    use crate::io::sync_channel::{create_sync_channel, SyncQueues};
    use crate::services::desk::{create_desk_channel, Desk};
    use crate::services::store::ScanStore;
    use std::sync::Arc;
    use tokio::sync::broadcast;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_line("login 7 Ana Maria").unwrap(),
            ConsoleCommand::Login { id: "7".into(), name: Some("Ana Maria".into()) }
        );
        assert_eq!(parse_line("login 7").unwrap(), ConsoleCommand::Login { id: "7".into(), name: None });
        assert_eq!(parse_line("route none").unwrap(), ConsoleCommand::SelectRoute(None));
        assert_eq!(parse_line("route r1").unwrap(), ConsoleCommand::SelectRoute(Some("r1".into())));
        assert_eq!(parse_line("manual on").unwrap(), ConsoleCommand::Manual(true));
        assert_eq!(parse_line("recent").unwrap(), ConsoleCommand::Recent(10));
        assert_eq!(parse_line("recent 3").unwrap(), ConsoleCommand::Recent(3));
        assert_eq!(
            parse_line("export r1").unwrap(),
            ConsoleCommand::Export { route_id: "r1".into(), file: None }
        );
        assert_eq!(
            parse_line("add-user 9 bia operator Bia Souza").unwrap(),
            ConsoleCommand::AddUser {
                id: "9".into(),
                login: "bia".into(),
                role: Role::Operator,
                name: "Bia Souza".into()
            }
        );
        assert_eq!(parse_line("   ").unwrap(), ConsoleCommand::Empty);
        assert_eq!(parse_line(" BR123 ").unwrap(), ConsoleCommand::Scan("BR123".into()));
    }

    #[test]
    fn test_parse_usage_errors() {
        assert!(parse_line("login").is_err());
        assert!(parse_line("manual maybe").is_err());
        assert!(parse_line("recent lots").is_err());
        assert!(parse_line("edit-route r1").is_err());
        assert!(parse_line("add-user 9 bia admin Bia").is_err());
    }

    async fn console() -> (Console, SyncQueues, broadcast::Sender<crate::domain::scan::ScanRecord>) {
        let metrics = Arc::new(Metrics::new());
        let (sync, queues, failure_rx) = create_sync_channel(256, metrics.clone());
        let store = ScanStore::new(sync, Box::new(RecordingFeedback::new()), metrics.clone(), 1000);
        let mut desk = Desk::new(store, metrics, 60);
        let (handle, cmd_rx) = create_desk_channel(16);
        let (feed_tx, feed_rx) = broadcast::channel(16);
        tokio::spawn(async move {
            desk.run(cmd_rx, feed_rx, failure_rx).await;
        });
        (Console::new(handle), queues, feed_tx)
    }

    async fn run(console: &mut Console, line: &str) -> String {
        match console.handle_line(line).await.unwrap() {
            Flow::Continue(text) => text,
            Flow::Quit => "<quit>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_console_scan_session() {
        let (mut console, _queues, _feed) = console().await;

        assert_eq!(run(&mut console, "route r1").await, "error: not logged in");
        assert!(run(&mut console, "add-route Mutum;369, 3695;B").await.starts_with("route Mutum added"));
        let routes = console.desk.routes().await.unwrap();
        let id = routes[0].id.clone();
        assert_eq!(routes[0].prefixes, vec!["369".to_string(), "3695".to_string()]);

        assert_eq!(run(&mut console, "login 1 Ana").await, "signed in as Ana");
        assert_eq!(run(&mut console, "BR1").await, "error: no route selected");
        assert_eq!(run(&mut console, &format!("route {}", id)).await, "route Mutum");
        assert_eq!(console.selected_route(), Some(id.as_str()));

        assert_eq!(run(&mut console, "BR1").await, "ERROR_NOT_FOUND not found");
        assert_eq!(run(&mut console, "manual on").await, "manual mode on");
        assert_eq!(run(&mut console, "BR2").await, "MANUAL added manually");
        assert_eq!(run(&mut console, "BR2").await, "ERROR_DUPLICATE duplicate package");
        assert_eq!(run(&mut console, "XX9").await, "ERROR_INVALID code must start with BR");

        assert!(run(&mut console, "progress").await.starts_with("Mutum [B] 1/0"));
        assert!(run(&mut console, "stats").await.starts_with("total 3 accepted 1"));

        assert_eq!(run(&mut console, &format!("complete {}", id)).await, "route Mutum completed");
        assert_eq!(console.selected_route(), None);
        assert_eq!(run(&mut console, "BR3").await, "error: no route selected");
        assert_eq!(run(&mut console, &format!("route {}", id)).await, "error: route Mutum is completed");
        assert_eq!(run(&mut console, "clear").await, "daily data cleared");
        assert!(run(&mut console, "routes").await.contains("(open)"));
        assert_eq!(run(&mut console, "quit").await, "<quit>");
    }

    #[tokio::test]
    async fn test_console_import_and_export() {
        let (mut console, _queues, _feed) = console().await;
        let dir = tempfile::tempdir().unwrap();

        let routes_file = dir.path().join("routes.txt");
        std::fs::write(&routes_file, "Centro;;\n").unwrap();
        let packages_file = dir.path().join("packages.txt");
        std::fs::write(&packages_file, "BR1, 36955000\nBR2\t29100000\n").unwrap();

        assert_eq!(run(&mut console, &format!("import-routes {}", routes_file.display())).await, "imported 1 routes");
        assert_eq!(
            run(&mut console, &format!("import {}", packages_file.display())).await,
            "imported 2 packages (2 new) in 1 chunks"
        );
        assert!(run(&mut console, "import /no/such/file").await.starts_with("error: failed to read"));

        let id = console.desk.routes().await.unwrap()[0].id.clone();
        run(&mut console, "login 1 Ana").await;
        run(&mut console, &format!("route {}", id)).await;
        assert_eq!(run(&mut console, "BR1").await, "SUCCESS success");

        let report = dir.path().join("report.csv");
        let out = run(&mut console, &format!("export {} {}", id, report.display())).await;
        assert!(out.starts_with("report written to"));
        let csv = std::fs::read_to_string(&report).unwrap();
        assert!(csv.starts_with("Data Hora,Operador,Codigo Rastreio,Status\n"));
        assert!(csv.contains(",Ana,BR1,SUCCESS"));
    }

    #[tokio::test]
    async fn test_console_user_commands() {
        let (mut console, _queues, _feed) = console().await;

        assert_eq!(run(&mut console, "add-user 9 bia operator Bia Souza").await, "user 9 added");
        assert_eq!(run(&mut console, "login 9").await, "signed in as Bia Souza");
        assert_eq!(run(&mut console, "deactivate 9").await, "user 9 deactivated");
        assert!(run(&mut console, "users").await.contains("inactive"));
        assert_eq!(run(&mut console, "remove-user 9").await, "user Bia Souza removed");
        assert_eq!(run(&mut console, "remove-user 9").await, "error: user not found: 9");
    }
}
