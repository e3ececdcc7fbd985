use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::coordinator::{Completion, MutationCoordinator, Navigator, Submitted};
use crate::error::{RemoteError, ValidationError};
use crate::filter::{self, FilterState};
use crate::intent::{self, Intent, HELP};
use crate::models::{StudentDraft, StudentRecord, ViewMode};
use crate::remote::DashboardService;
use crate::render::{self, DashboardView, RenderedView};
use crate::scheduler::RefreshScheduler;
use crate::settings::{LoadedSettings, SaveOutcome, Settings, SettingsReconciler};
use crate::store::{DataStore, ReloadOutcome, ReloadTicket};
use crate::ui::{BadgeTip, Modal, ModalController, Notice, StatusLine, Tooltip};

const HELP_DURATION: Duration = Duration::from_secs(15);

/// Everything that can wake the event loop.
#[derive(Debug, Clone)]
pub enum AppEvent {
    Tick,
    Input(String),
    InputClosed,
    Reloaded {
        ticket: ReloadTicket,
        result: Result<Vec<StudentRecord>, RemoteError>,
    },
    Checked(Result<(), RemoteError>),
    Settled(Completion),
    SettingsSaved {
        notice: Notice,
        effective: Option<Settings>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Interactive dashboard state. Only the event loop owns it, so every
/// write to the store happens on one task.
pub struct Dashboard {
    service: Arc<dyn DashboardService>,
    reconciler: SettingsReconciler,
    settings: Settings,
    store: DataStore,
    filter: FilterState,
    mode: ViewMode,
    page: usize,
    rows: Vec<String>,
    coordinator: MutationCoordinator,
    scheduler: RefreshScheduler<AppEvent>,
    tooltip: Tooltip,
    modal: ModalController,
    status: StatusLine,
    events: UnboundedSender<AppEvent>,
}

impl Dashboard {
    pub fn new(
        service: Arc<dyn DashboardService>,
        reconciler: SettingsReconciler,
        navigator: Arc<dyn Navigator>,
        events: UnboundedSender<AppEvent>,
        loaded: LoadedSettings,
    ) -> Self {
        let LoadedSettings {
            effective,
            server_error,
        } = loaded;

        let mut dashboard = Self {
            coordinator: MutationCoordinator::new(Arc::clone(&service), navigator),
            scheduler: RefreshScheduler::new(events.clone(), AppEvent::Tick),
            service,
            reconciler,
            filter: FilterState {
                search_query: String::new(),
                show_updated_only: !effective.show_viewed_students,
            },
            mode: effective.default_view,
            settings: effective,
            store: DataStore::new(),
            page: 0,
            rows: Vec::new(),
            tooltip: Tooltip::default(),
            modal: ModalController::default(),
            status: StatusLine::default(),
            events,
        };
        let seconds = dashboard.settings.client_refresh_seconds;
        dashboard.scheduler.set_seconds(seconds);
        if let Some(err) = server_error {
            let text = format!("无法读取服务器设置（{}），使用本地设置", err.user_message());
            dashboard.status.show(Notice::error(text), Instant::now());
        }
        dashboard
    }

    pub fn set_mode(&mut self, mode: ViewMode) {
        self.mode = mode;
    }

    pub fn reload(&mut self) -> ReloadTicket {
        let ticket = self.store.begin_reload();
        debug!(?ticket, "reload issued");
        let service = Arc::clone(&self.service);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = service.list_students().await;
            let _ = events.send(AppEvent::Reloaded { ticket, result });
        });
        ticket
    }

    /// Out-of-band check; the refresh timer keeps its phase.
    fn check_now(&mut self, now: Instant) {
        self.status.show(Notice::info("正在检查更新..."), now);
        let service = Arc::clone(&self.service);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = service.trigger_check().await;
            let _ = events.send(AppEvent::Checked(result));
        });
    }

    fn spawn_mutation(&self, submitted: Submitted) {
        debug!(id = %submitted.id, "request spawned");
        let events = self.events.clone();
        tokio::spawn(async move {
            let completion = submitted.request.await;
            let _ = events.send(AppEvent::Settled(completion));
        });
    }

    fn submit(&mut self, submitted: Result<Submitted, ValidationError>, now: Instant) {
        match submitted {
            Ok(submitted) => self.spawn_mutation(submitted),
            Err(err) => {
                debug!(error = %err, "input rejected before request");
                self.status.show(Notice::error(err.user_message()), now);
            }
        }
    }

    fn save_refresh_interval(&mut self, seconds: u64, now: Instant) {
        let mut desired = self.settings.clone();
        desired.client_refresh_seconds = seconds;
        if let Err(err) = desired.validate() {
            self.status.show(Notice::error(err.user_message()), now);
            return;
        }

        let reconciler = self.reconciler.clone();
        let current = self.settings.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = match reconciler.save(&current, &desired).await {
                Ok(outcome) => {
                    let notice = match &outcome {
                        SaveOutcome::Saved(_) => Notice::success(outcome.message()),
                        SaveOutcome::Partial { .. } | SaveOutcome::Failed { .. } => {
                            Notice::error(outcome.message())
                        }
                    };
                    AppEvent::SettingsSaved {
                        notice,
                        effective: outcome.effective().cloned(),
                    }
                }
                Err(err) => AppEvent::SettingsSaved {
                    notice: Notice::error(err.user_message()),
                    effective: None,
                },
            };
            let _ = events.send(event);
        });
    }

    fn apply_settings(&mut self, settings: Settings) {
        let period = Duration::from_secs(settings.client_refresh_seconds);
        if self.scheduler.period() != Some(period) || !self.scheduler.is_running() {
            self.scheduler.set_period(period);
        }
        self.settings = settings;
    }

    pub fn handle(&mut self, event: AppEvent, now: Instant) -> Flow {
        match event {
            AppEvent::Tick => {
                debug!("refresh timer fired");
                self.reload();
            }
            AppEvent::Input(line) => {
                let modal_open = self.modal.visible().is_some();
                match intent::parse(&line, &self.rows, modal_open) {
                    Ok(Some(intent)) => return self.dispatch(intent, now),
                    Ok(None) => {}
                    Err(err) => self.status.show(Notice::error(err.to_string()), now),
                }
            }
            AppEvent::InputClosed => return Flow::Quit,
            AppEvent::Reloaded { ticket, result } => self.apply_reload(ticket, result, now),
            AppEvent::Checked(Ok(())) => {
                self.status.show(Notice::success("✓ 检查完成"), now);
                self.reload();
            }
            AppEvent::Checked(Err(err)) => {
                warn!(error = %err, "check failed");
                self.status.show(Notice::error(err.user_message()), now);
            }
            AppEvent::Settled(completion) => {
                let settled = self
                    .coordinator
                    .settle(&mut self.store, completion, Utc::now());
                if let Some(settlement) = settled {
                    debug!(
                        id = %settlement.id,
                        in_flight = self.coordinator.in_flight(),
                        "mutation settled"
                    );
                    self.status.show(settlement.notice, now);
                    if settlement.reload {
                        self.reload();
                    }
                }
            }
            AppEvent::SettingsSaved { notice, effective } => {
                self.status.show(notice, now);
                if let Some(settings) = effective {
                    self.apply_settings(settings);
                }
            }
        }
        Flow::Continue
    }

    fn apply_reload(
        &mut self,
        ticket: ReloadTicket,
        result: Result<Vec<StudentRecord>, RemoteError>,
        now: Instant,
    ) {
        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(?ticket, error = %err, "reload failed");
                self.status.show(Notice::error(err.user_message()), now);
                return;
            }
        };
        match self.store.complete_reload(ticket, snapshot) {
            Ok(ReloadOutcome::Applied) => {}
            Ok(ReloadOutcome::Stale) => debug!(?ticket, "stale reload dropped"),
            Err(err) => {
                warn!(error = %err, "snapshot rejected");
                self.status.show(Notice::error(format!("数据异常：{err}")), now);
            }
        }
    }

    pub fn dispatch(&mut self, intent: Intent, now: Instant) -> Flow {
        match intent {
            Intent::EditScore { name, phase, raw } => {
                let submitted = self.coordinator.edit_score(&mut self.store, &name, phase, &raw);
                self.submit(submitted, now);
            }
            Intent::AcknowledgeView { name } => {
                let submitted = self.coordinator.acknowledge_view(&self.store, &name);
                self.submit(submitted, now);
            }
            Intent::ShowBadges { name } => {
                if let Some(record) = self.store.get(&name) {
                    self.tooltip.open(BadgeTip {
                        student: record.name.clone(),
                        badges: record.badges.clone(),
                    });
                }
            }
            Intent::CloseTooltip => self.tooltip.close(now),
            Intent::RequestDelete { name } => {
                self.tooltip.close(now);
                self.modal.open(Modal::ConfirmDelete { name });
            }
            Intent::ConfirmDelete => {
                let target = match self.modal.visible() {
                    Some(Modal::ConfirmDelete { name }) => Some(name.clone()),
                    None => None,
                };
                self.modal.close(now);
                if let Some(name) = target {
                    let submitted = self.coordinator.delete_student(&name);
                    self.submit(submitted, now);
                }
            }
            Intent::CancelDelete => self.modal.close(now),
            Intent::AddStudent { name, repo } => {
                let submitted = self.coordinator.add_student(StudentDraft::new(&name, &repo));
                self.submit(submitted, now);
            }
            Intent::UpdateStudent {
                old_name,
                name,
                repo,
            } => {
                let submitted = self
                    .coordinator
                    .update_student(&old_name, StudentDraft::new(&name, &repo));
                self.submit(submitted, now);
            }
            Intent::Search(query) => {
                self.filter.search_query = query;
                self.page = 0;
            }
            Intent::ToggleUpdatedOnly => {
                self.filter.show_updated_only = !self.filter.show_updated_only;
                self.page = 0;
            }
            Intent::ToggleView => self.mode = self.mode.toggled(),
            Intent::NextPage => self.page += 1,
            Intent::PreviousPage => self.page = self.page.saturating_sub(1),
            Intent::CheckNow => self.check_now(now),
            Intent::Reload => {
                self.reload();
            }
            Intent::SetRefreshSeconds(seconds) => self.save_refresh_interval(seconds, now),
            Intent::Help => self
                .status
                .show(Notice::info(HELP).lasting(HELP_DURATION), now),
            Intent::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    /// Draws the current state and remembers which names the numbered
    /// rows stand for.
    pub fn frame(&mut self, now: Instant) -> RenderedView {
        let rendered = {
            let visible = filter::apply(self.store.records(), &self.filter);
            render::render_dashboard(&DashboardView {
                store: &self.store,
                rows: &visible,
                filter: &self.filter,
                mode: self.mode,
                page: self.page,
                per_page: self.settings.items_per_page,
                notice: self.status.current(now),
                tooltip: self.tooltip.visible(),
                modal: self.modal.visible(),
            })
        };
        self.page = rendered.page.index;
        self.rows = rendered.rows.clone();
        rendered
    }

    /// Structural removal of closed overlays and expired notices.
    pub fn sweep(&mut self, now: Instant) {
        self.tooltip.sweep(now);
        self.modal.sweep(now);
        self.status.sweep(now);
    }

    fn next_deadline(&self) -> Option<Instant> {
        [
            self.tooltip.pending_removal(),
            self.modal.pending_removal(),
            self.status.expires_at(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub async fn run(mut self, mut events: UnboundedReceiver<AppEvent>) -> anyhow::Result<()> {
        spawn_input_reader(self.events.clone());
        self.reload();
        self.redraw(Instant::now())?;

        loop {
            let deadline = self.next_deadline();
            let event = tokio::select! {
                event = events.recv() => match event {
                    Some(event) => Some(event),
                    None => break,
                },
                _ = wait_until(deadline) => None,
            };
            let now = Instant::now();
            if let Some(event) = event {
                if self.handle(event, now) == Flow::Quit {
                    break;
                }
            }
            self.sweep(now);
            self.redraw(now)?;
        }

        self.scheduler.cancel();
        info!("dashboard closed");
        Ok(())
    }

    fn redraw(&mut self, now: Instant) -> anyhow::Result<()> {
        let rendered = self.frame(now);
        let mut stdout = std::io::stdout().lock();
        write!(stdout, "\x1b[2J\x1b[H{}> ", rendered.text)?;
        stdout.flush()?;
        Ok(())
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn spawn_input_reader(events: UnboundedSender<AppEvent>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if events.send(AppEvent::Input(line)).is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "stdin read failed");
                    break;
                }
            }
        }
        let _ = events.send(AppEvent::InputClosed);
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;
    use tokio::sync::mpsc::unbounded_channel;

    use super::*;
    use crate::logging;
    use crate::remote::fake::FakeService;
    use crate::storage::MemoryStore;
    use crate::ui::NoticeLevel;

    #[derive(Default)]
    struct Opened(Mutex<Vec<String>>);

    impl Navigator for Opened {
        fn open(&self, url: &str) {
            self.0.lock().unwrap().push(url.to_string());
        }
    }

    struct Harness {
        service: Arc<FakeService>,
        dashboard: Dashboard,
        events: UnboundedReceiver<AppEvent>,
    }

    impl Harness {
        /// Handles the next event produced by a spawned request.
        async fn pump(&mut self) -> AppEvent {
            let event = self.events.recv().await.unwrap();
            self.dashboard.handle(event.clone(), Instant::now());
            event
        }

        fn input(&mut self, line: &str) -> Flow {
            self.dashboard.frame(Instant::now());
            self.dashboard
                .handle(AppEvent::Input(line.to_string()), Instant::now())
        }

        fn notice(&self) -> Option<Notice> {
            self.dashboard.status.current(Instant::now()).cloned()
        }
    }

    fn roster() -> Vec<StudentRecord> {
        let mut alice = StudentRecord::new("Alice", "https://github.com/alice/hw")
            .with_scores([80, 70, 90, 60, 100]);
        alice.updated_since_view = true;
        let bob = StudentRecord::new("Bob", "https://github.com/bob/hw");
        vec![alice, bob]
    }

    async fn harness_with(server_settings: serde_json::Value) -> Harness {
        logging::init_test();
        let service = Arc::new(FakeService::with_students(roster()));
        service.set_settings(server_settings);
        let storage = Arc::new(MemoryStore::default());
        let reconciler = SettingsReconciler::new(service.clone(), storage);
        let loaded = reconciler.load().await;
        let (tx, rx) = unbounded_channel();
        let dashboard = Dashboard::new(
            service.clone(),
            reconciler,
            Arc::new(Opened::default()),
            tx,
            loaded,
        );
        Harness {
            service,
            dashboard,
            events: rx,
        }
    }

    async fn loaded_harness() -> Harness {
        let mut h = harness_with(json!({})).await;
        h.dashboard.reload();
        h.pump().await;
        h
    }

    #[tokio::test]
    async fn startup_applies_effective_settings() {
        let h = harness_with(json!({ "client_refresh_seconds": 90 })).await;
        assert_eq!(
            h.dashboard.scheduler.period(),
            Some(Duration::from_secs(90))
        );
        assert_eq!(h.dashboard.mode, ViewMode::Card);
        assert!(!h.dashboard.filter.show_updated_only);
    }

    #[tokio::test]
    async fn reload_fills_store_and_frame_rows() {
        let mut h = loaded_harness().await;
        let frame = h.dashboard.frame(Instant::now());
        assert_eq!(frame.rows, ["Alice", "Bob"]);
        assert_eq!(h.service.calls(), ["get_settings", "list"]);
    }

    #[tokio::test]
    async fn tick_triggers_reload() {
        let mut h = loaded_harness().await;
        h.service.set_students(vec![roster().remove(1)]);
        h.dashboard.handle(AppEvent::Tick, Instant::now());
        h.pump().await;
        assert!(h.dashboard.store.get("Alice").is_none());
    }

    #[tokio::test]
    async fn score_input_is_clamped_and_saved() {
        let mut h = loaded_harness().await;
        h.input("s 1 2 150");
        assert!(matches!(h.pump().await, AppEvent::Settled(_)));

        let alice = h.dashboard.store.get("Alice").unwrap();
        assert_eq!(alice.scores, [80, 100, 90, 60, 100]);
        assert_eq!(alice.avg_score, 86.0);
        assert_eq!(h.notice().unwrap().text, "✓ Alice 的阶段2评分已保存");
    }

    #[tokio::test]
    async fn updated_only_toggle_narrows_rows() {
        let mut h = loaded_harness().await;
        h.input("u");
        assert_eq!(h.dashboard.frame(Instant::now()).rows, ["Alice"]);
        h.input("u");
        h.input("/ bob");
        assert_eq!(h.dashboard.frame(Instant::now()).rows, ["Bob"]);
    }

    #[tokio::test]
    async fn delete_waits_for_confirmation() {
        let mut h = loaded_harness().await;
        h.input("d 2");
        assert!(h.dashboard.modal.visible().is_some());
        assert!(!h.service.calls().iter().any(|c| c.starts_with("delete")));

        h.input("y");
        assert!(h.dashboard.modal.visible().is_none());
        h.pump().await;
        assert_eq!(h.notice().unwrap().text, "✓ 学员已删除");
        h.pump().await;
        assert!(h.dashboard.store.get("Bob").is_none());
    }

    #[tokio::test]
    async fn cancelled_delete_sends_nothing() {
        let mut h = loaded_harness().await;
        h.input("d 1");
        h.input("n");
        assert!(h.dashboard.modal.visible().is_none());
        assert!(h.dashboard.modal.mounted().is_some());
        assert!(!h.service.calls().iter().any(|c| c.starts_with("delete")));
    }

    #[tokio::test]
    async fn failed_reload_keeps_snapshot_and_notifies() {
        let mut h = loaded_harness().await;
        h.service
            .fail("list", RemoteError::Transport("connection refused".into()));
        h.input("r");
        h.pump().await;

        assert_eq!(h.dashboard.store.records().len(), 2);
        let notice = h.notice().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.text, "网络错误");

        h.service.recover("list");
        h.input("r");
        h.pump().await;
        assert_eq!(h.dashboard.store.records().len(), 2);
    }

    #[tokio::test]
    async fn stale_reload_is_not_applied() {
        let mut h = loaded_harness().await;
        let older = h.dashboard.store.begin_reload();
        let newer = h.dashboard.store.begin_reload();
        let now = Instant::now();

        h.dashboard.handle(
            AppEvent::Reloaded {
                ticket: newer,
                result: Ok(vec![StudentRecord::new("Carol", "https://github.com/carol/hw")]),
            },
            now,
        );
        h.dashboard.handle(
            AppEvent::Reloaded {
                ticket: older,
                result: Ok(roster()),
            },
            now,
        );
        assert!(h.dashboard.store.get("Carol").is_some());
        assert!(h.dashboard.store.get("Alice").is_none());
    }

    #[tokio::test]
    async fn check_now_reloads_after_acknowledgement() {
        let mut h = loaded_harness().await;
        h.input("c");
        h.pump().await;
        h.pump().await;
        assert_eq!(h.service.calls(), ["get_settings", "list", "check", "list"]);
        assert_eq!(h.dashboard.scheduler.period(), Some(Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn check_now_keeps_timer_phase() {
        let started = Instant::now();
        let mut h = loaded_harness().await;
        tokio::time::advance(Duration::from_secs(30)).await;

        h.input("c");
        assert!(matches!(h.pump().await, AppEvent::Checked(Ok(()))));
        assert!(matches!(h.pump().await, AppEvent::Reloaded { .. }));

        assert!(matches!(h.events.recv().await, Some(AppEvent::Tick)));
        let fired = started.elapsed();
        assert!(fired >= Duration::from_secs(60), "tick at {fired:?}");
        assert!(fired < Duration::from_secs(61), "tick at {fired:?}");
    }

    #[tokio::test]
    async fn refresh_interval_change_restarts_timer() {
        let mut h = loaded_harness().await;
        h.input("t 120");
        assert!(matches!(h.pump().await, AppEvent::SettingsSaved { .. }));
        assert_eq!(
            h.dashboard.scheduler.period(),
            Some(Duration::from_secs(120))
        );
        assert_eq!(h.notice().unwrap().level, NoticeLevel::Success);

        h.input("t 0");
        assert_eq!(h.notice().unwrap().text, "刷新间隔必须大于0");
    }

    #[tokio::test]
    async fn badge_tooltip_opens_and_closes() {
        let mut h = loaded_harness().await;
        h.input("i 1");
        assert_eq!(h.dashboard.tooltip.visible().unwrap().student, "Alice");
        h.input("x");
        assert!(h.dashboard.tooltip.visible().is_none());
        h.dashboard.sweep(Instant::now() + Duration::from_secs(1));
        assert!(h.dashboard.tooltip.mounted().is_none());
    }

    #[tokio::test]
    async fn bad_input_is_reported_not_fatal() {
        let mut h = loaded_harness().await;
        assert_eq!(h.input("s 9 1 50"), Flow::Continue);
        assert_eq!(h.notice().unwrap().text, "当前页没有第 9 行");
        assert_eq!(h.input("q"), Flow::Quit);
    }
}
