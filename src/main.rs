use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use chrono::Local;
use clap::{ArgGroup, Parser, Subcommand};
use tokio::sync::mpsc;

mod app;
mod coordinator;
mod error;
mod exchange;
mod filter;
mod intent;
mod logging;
mod models;
mod remote;
mod render;
mod scheduler;
mod settings;
mod storage;
mod store;
mod ui;

use crate::app::Dashboard;
use crate::coordinator::{MutationCoordinator, MutationState, Navigator, Submitted, TerminalNavigator};
use crate::error::ValidationError;
use crate::filter::FilterState;
use crate::models::{Remarks, SortKey, StudentDraft, ViewMode};
use crate::remote::{DashboardService, HttpService};
use crate::render::DashboardView;
use crate::settings::{SaveOutcome, Settings, SettingsReconciler};
use crate::storage::{KeyValueStore, SqliteStore};
use crate::store::DataStore;

const DEFAULT_SERVER: &str = "http://127.0.0.1:5000";
const SERVER_ENV: &str = "HOMEWORK_DASHBOARD_URL";

#[derive(Parser)]
#[command(name = "homework-dashboard")]
#[command(about = "Terminal dashboard for student homework repositories and phase scores", long_about = None)]
struct Cli {
    /// Dashboard service base URL [env: HOMEWORK_DASHBOARD_URL]
    #[arg(long, global = true)]
    server: Option<String>,
    /// Device-local state database
    #[arg(long, global = true)]
    state: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive dashboard with periodic refresh
    Watch {
        #[arg(long, value_enum)]
        view: Option<ViewMode>,
    },
    /// Print the student list once
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        updated_only: bool,
        #[arg(long, value_enum)]
        view: Option<ViewMode>,
    },
    /// Ask the service to check repositories now, then list
    Check,
    /// Set one phase score (phase is 1-based)
    Score {
        name: String,
        phase: usize,
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
    /// Open a student's repository and mark it viewed
    View { name: String },
    /// Add a student
    Add { name: String, repo: String },
    /// Rename a student or change the repository
    Update {
        old_name: String,
        name: String,
        repo: String,
    },
    /// Delete a student
    Delete { name: String },
    /// Bulk import students
    #[command(group(
        ArgGroup::new("source")
            .args(["file", "text"])
            .required(true)
            .multiple(false)
    ))]
    Import {
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        text: Option<String>,
    },
    /// Save the score sheet as CSV
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Ranked view with podium
    Leaderboard {
        #[arg(long, value_enum, default_value_t = SortKey::AvgScore)]
        sort: SortKey,
        #[arg(long)]
        search: Option<String>,
    },
    /// Detail report for one student
    Details { name: String },
    /// Save remarks and tags for a student
    Remark {
        name: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        text: String,
    },
    /// Show, change or reset dashboard settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    Set(SettingsChanges),
    /// Forget settings stored on this device
    Reset,
}

#[derive(clap::Args)]
struct SettingsChanges {
    #[arg(long)]
    refresh_seconds: Option<u64>,
    #[arg(long)]
    poll_seconds: Option<u64>,
    #[arg(long)]
    instructor_name: Option<String>,
    #[arg(long)]
    instructor_email: Option<String>,
    #[arg(long)]
    notify_updates: Option<bool>,
    #[arg(long)]
    sound_enabled: Option<bool>,
    #[arg(long, value_enum)]
    default_view: Option<ViewMode>,
    #[arg(long)]
    items_per_page: Option<usize>,
    #[arg(long)]
    show_viewed_students: Option<bool>,
    #[arg(long)]
    github_token: Option<String>,
}

impl SettingsChanges {
    fn apply_to(self, settings: &mut Settings) {
        if let Some(value) = self.refresh_seconds {
            settings.client_refresh_seconds = value;
        }
        if let Some(value) = self.poll_seconds {
            settings.server_poll_interval_seconds = value;
        }
        if let Some(value) = self.instructor_name {
            settings.instructor_name = value;
        }
        if let Some(value) = self.instructor_email {
            settings.instructor_email = value;
        }
        if let Some(value) = self.notify_updates {
            settings.notify_updates = value;
        }
        if let Some(value) = self.sound_enabled {
            settings.sound_enabled = value;
        }
        if let Some(value) = self.default_view {
            settings.default_view = value;
        }
        if let Some(value) = self.items_per_page {
            settings.items_per_page = value;
        }
        if let Some(value) = self.show_viewed_students {
            settings.show_viewed_students = value;
        }
        if let Some(value) = self.github_token {
            settings.github_token = value;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();

    let server = cli
        .server
        .or_else(|| std::env::var(SERVER_ENV).ok())
        .unwrap_or_else(|| DEFAULT_SERVER.to_string());
    let service: Arc<dyn DashboardService> =
        Arc::new(HttpService::new(&server).context("invalid --server value")?);

    let state_path = match cli.state {
        Some(path) => path,
        None => default_state_path()?,
    };
    if let Some(parent) = state_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let storage: Arc<dyn KeyValueStore> = Arc::new(
        SqliteStore::open(&state_path)
            .await
            .with_context(|| format!("failed to open local state at {}", state_path.display()))?,
    );
    let reconciler = SettingsReconciler::new(Arc::clone(&service), storage);
    let navigator: Arc<dyn Navigator> = Arc::new(TerminalNavigator);

    match cli.command.unwrap_or(Commands::Watch { view: None }) {
        Commands::Watch { view } => {
            let loaded = reconciler.load().await;
            let (events, receiver) = mpsc::unbounded_channel();
            let mut dashboard = Dashboard::new(service, reconciler, navigator, events, loaded);
            if let Some(view) = view {
                dashboard.set_mode(view);
            }
            dashboard.run(receiver).await?;
        }
        Commands::List {
            search,
            updated_only,
            view,
        } => {
            let settings = reconciler.load().await.effective;
            let store = load_store(service.as_ref()).await?;
            let filter = FilterState {
                search_query: search.unwrap_or_default(),
                show_updated_only: updated_only,
            };
            print_list(&store, &filter, view.unwrap_or(settings.default_view));
        }
        Commands::Check => {
            service
                .trigger_check()
                .await
                .context("failed to trigger repository check")?;
            println!("✓ 检查完成");
            let store = load_store(service.as_ref()).await?;
            print_list(&store, &FilterState::default(), ViewMode::Table);
        }
        Commands::Score { name, phase, value } => {
            let mut store = load_store(service.as_ref()).await?;
            if store.get(&name).is_none() {
                bail!("学员不存在：{name}");
            }
            let Some(phase) = phase.checked_sub(1) else {
                bail!("阶段编号必须在 1-5 之间");
            };
            let mut coordinator = MutationCoordinator::new(service, navigator);
            let submitted = coordinator.edit_score(&mut store, &name, phase, &value);
            run_mutation(&mut coordinator, &mut store, submitted).await?;
        }
        Commands::View { name } => {
            let mut store = load_store(service.as_ref()).await?;
            let mut coordinator = MutationCoordinator::new(service, navigator);
            let submitted = coordinator.acknowledge_view(&store, &name);
            run_mutation(&mut coordinator, &mut store, submitted).await?;
        }
        Commands::Add { name, repo } => {
            let mut store = DataStore::new();
            let mut coordinator = MutationCoordinator::new(service, navigator);
            let submitted = coordinator.add_student(StudentDraft::new(&name, &repo));
            run_mutation(&mut coordinator, &mut store, submitted).await?;
        }
        Commands::Update {
            old_name,
            name,
            repo,
        } => {
            let mut store = DataStore::new();
            let mut coordinator = MutationCoordinator::new(service, navigator);
            let submitted = coordinator.update_student(&old_name, StudentDraft::new(&name, &repo));
            run_mutation(&mut coordinator, &mut store, submitted).await?;
        }
        Commands::Delete { name } => {
            let mut store = DataStore::new();
            let mut coordinator = MutationCoordinator::new(service, navigator);
            let submitted = coordinator.delete_student(&name);
            run_mutation(&mut coordinator, &mut store, submitted).await?;
        }
        Commands::Import { file, text } => {
            let text = match (file, text) {
                (Some(path), _) => exchange::read_import_file(&path)?,
                (None, Some(text)) => text,
                (None, None) => String::new(),
            };
            let mut store = DataStore::new();
            let mut coordinator = MutationCoordinator::new(service, navigator);
            let submitted = coordinator.import_students(&text);
            run_mutation(&mut coordinator, &mut store, submitted).await?;
        }
        Commands::Export { out } => {
            let artifact = service
                .export_csv()
                .await
                .context("failed to download export")?;
            let path = out.unwrap_or_else(|| {
                PathBuf::from(exchange::export_file_name(Local::now().date_naive()))
            });
            let rows = exchange::save_export(&artifact, &path)?;
            println!("✓ 已导出 {rows} 名学员到 {}", path.display());
        }
        Commands::Leaderboard { sort, search } => {
            let entries = service
                .leaderboard(sort)
                .await
                .context("failed to load leaderboard")?;
            let query = search.unwrap_or_default().trim().to_lowercase();
            let visible: Vec<_> = entries
                .iter()
                .filter(|entry| {
                    query.is_empty() || filter::matches_query(&entry.name, &entry.repo, &query)
                })
                .collect();
            print!("{}", render::render_leaderboard(&visible, sort));
        }
        Commands::Details { name } => {
            let details = service
                .student_details(&name)
                .await
                .with_context(|| format!("failed to load details for {name}"))?;
            print!("{}", render::render_details(&details));
        }
        Commands::Remark { name, tags, text } => {
            let remarks = save_remark(service.as_ref(), &name, &text, &tags).await?;
            if remarks.tags.is_empty() {
                println!("✓ 备注已保存");
            } else {
                println!("✓ 备注已保存 · #{}", remarks.tags.join(" #"));
            }
        }
        Commands::Settings { action } => {
            let loaded = reconciler.load().await;
            if let Some(err) = &loaded.server_error {
                eprintln!("⚠ 无法读取服务器设置：{}", err.user_message());
            }
            let current = loaded.effective;
            match action {
                SettingsAction::Show => print!("{}", render::render_settings(&current)),
                SettingsAction::Set(changes) => {
                    let mut desired = current.clone();
                    changes.apply_to(&mut desired);
                    let outcome = reconciler
                        .save(&current, &desired)
                        .await
                        .map_err(|err| anyhow!(err.user_message()))?;
                    println!("{}", outcome.message());
                    match &outcome {
                        SaveOutcome::Saved(settings) | SaveOutcome::Partial { effective: settings, .. } => {
                            print!("{}", render::render_settings(settings));
                        }
                        SaveOutcome::Failed { .. } => bail!("settings were not saved"),
                    }
                }
                SettingsAction::Reset => {
                    let settings = reconciler
                        .reset_local(&current)
                        .await
                        .context("failed to clear local settings")?;
                    println!("✓ 本地设置已重置");
                    print!("{}", render::render_settings(&settings));
                }
            }
        }
    }

    Ok(())
}

fn default_state_path() -> anyhow::Result<PathBuf> {
    let base = dirs::data_local_dir().context("no local data directory found; pass --state")?;
    Ok(base.join("homework-dashboard").join("local.db"))
}

async fn load_store(service: &dyn DashboardService) -> anyhow::Result<DataStore> {
    let snapshot = service
        .list_students()
        .await
        .context("failed to load students")?;
    let mut store = DataStore::new();
    store
        .load(snapshot)
        .context("service returned an inconsistent student list")?;
    Ok(store)
}

async fn save_remark(
    service: &dyn DashboardService,
    name: &str,
    text: &str,
    tags: &[String],
) -> anyhow::Result<Remarks> {
    let remarks = Remarks::new(text, tags);
    if remarks.text.is_empty() && remarks.tags.is_empty() {
        bail!("备注内容为空");
    }
    service
        .save_remarks(name, &remarks)
        .await
        .with_context(|| format!("failed to save remarks for {name}"))?;
    Ok(remarks)
}

fn print_list(store: &DataStore, filter: &FilterState, mode: ViewMode) {
    let rows = filter::apply(store.records(), filter);
    let rendered = render::render_dashboard(&DashboardView {
        store,
        rows: &rows,
        filter,
        mode,
        page: 0,
        per_page: rows.len().max(1),
        notice: None,
        tooltip: None,
        modal: None,
    });
    print!("{}", rendered.text);
}

async fn run_mutation(
    coordinator: &mut MutationCoordinator,
    store: &mut DataStore,
    submitted: Result<Submitted, ValidationError>,
) -> anyhow::Result<()> {
    let submitted = submitted.map_err(|err| anyhow!(err.user_message()))?;
    let Some(settlement) = coordinator.complete(store, submitted).await else {
        return Ok(());
    };
    match settlement.state {
        MutationState::Rejected => Err(anyhow!(settlement.notice.text)),
        MutationState::Applied | MutationState::InFlight => {
            println!("{}", render::notice_line(&settlement.notice));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RejectReason, RemoteError};
    use crate::remote::fake::FakeService;

    #[tokio::test]
    async fn remark_is_saved_with_clean_tags() {
        let service = FakeService::default();
        let tags = vec!["#进步".to_string(), "认真".to_string()];
        let saved = save_remark(&service, "Alice", " 按时提交 ", &tags).await.unwrap();

        assert_eq!(service.remarks("Alice"), Some(saved));
        assert_eq!(service.remarks("Alice").unwrap().tags, ["进步", "认真"]);
        assert_eq!(service.calls(), ["remarks Alice"]);
    }

    #[tokio::test]
    async fn empty_remark_is_not_sent() {
        let service = FakeService::default();
        assert!(save_remark(&service, "Alice", "  ", &[]).await.is_err());
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn rejected_remark_reports_failure() {
        let service = FakeService::default();
        service.fail(
            "remarks",
            RemoteError::Rejected {
                status: 500,
                reason: RejectReason::Other(String::new()),
            },
        );
        assert!(save_remark(&service, "Alice", "ok", &[]).await.is_err());
        assert_eq!(service.remarks("Alice"), None);
    }
}
