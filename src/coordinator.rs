use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{student_error_message, RemoteError, StudentOperation, ValidationError};
use crate::models::{ImportSummary, StudentDraft, MAX_SCORE, PHASE_COUNT, PHASE_LABELS};
use crate::remote::DashboardService;
use crate::store::{DataStore, DraftState, ScoreDraft};
use crate::ui::Notice;

/// Opens a repository link for the user.
pub trait Navigator: Send + Sync {
    fn open(&self, url: &str);
}

pub struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn open(&self, url: &str) {
        info!(%url, "opening repository");
        eprintln!("↗ {url}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    EditScore { name: String, phase: usize, score: u8 },
    AcknowledgeView { name: String },
    AddStudent(StudentDraft),
    UpdateStudent { old_name: String, draft: StudentDraft },
    DeleteStudent { name: String },
    ImportStudents { text: String },
}

impl Mutation {
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::EditScore { .. } => "edit_score",
            Mutation::AcknowledgeView { .. } => "acknowledge_view",
            Mutation::AddStudent(_) => "add_student",
            Mutation::UpdateStudent { .. } => "update_student",
            Mutation::DeleteStudent { .. } => "delete_student",
            Mutation::ImportStudents { .. } => "import_students",
        }
    }

    async fn send(&self, service: &dyn DashboardService) -> Result<Ack, RemoteError> {
        match self {
            Mutation::EditScore { name, phase, score } => {
                service.set_score(name, *phase, *score).await?;
            }
            Mutation::AcknowledgeView { name } => service.mark_viewed(name).await?,
            Mutation::AddStudent(draft) => service.add_student(draft).await?,
            Mutation::UpdateStudent { old_name, draft } => {
                service.update_student(old_name, draft).await?;
            }
            Mutation::DeleteStudent { name } => service.delete_student(name).await?,
            Mutation::ImportStudents { text } => {
                return Ok(Ack::Imported(service.import_students(text).await?));
            }
        }
        Ok(Ack::Done)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Done,
    Imported(ImportSummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    InFlight,
    Applied,
    Rejected,
}

#[derive(Debug, Clone)]
pub struct PendingMutation {
    pub id: Uuid,
    pub mutation: Mutation,
    pub state: MutationState,
}

/// Result of a request, carried back to the event loop.
#[derive(Debug, Clone)]
pub struct Completion {
    pub id: Uuid,
    pub result: Result<Ack, RemoteError>,
}

pub struct Submitted {
    pub id: Uuid,
    pub request: BoxFuture<'static, Completion>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub id: Uuid,
    pub state: MutationState,
    pub notice: Notice,
    /// A full reload is required to observe the effect.
    pub reload: bool,
}

/// Reads the leading integer of `raw` and saturates it into 0..=100.
/// Anything after the digits, such as a fractional part, is ignored.
pub fn clamp_score(raw: &str) -> Result<u8, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Missing("score"));
    }
    let (negative, unsigned) = match trimmed.as_bytes()[0] {
        b'-' => (true, &trimmed[1..]),
        b'+' => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits_end = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    let digits = &unsigned[..digits_end];
    if digits.is_empty() {
        return Err(ValidationError::NotANumber(trimmed.to_string()));
    }
    if negative {
        return Ok(0);
    }
    // Only overflow can fail here; it saturates like any other large value.
    Ok(digits
        .parse::<u64>()
        .map_or(MAX_SCORE, |value| value.min(u64::from(MAX_SCORE)) as u8))
}

pub struct MutationCoordinator {
    service: Arc<dyn DashboardService>,
    navigator: Arc<dyn Navigator>,
    pending: HashMap<Uuid, PendingMutation>,
}

impl MutationCoordinator {
    pub fn new(service: Arc<dyn DashboardService>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            service,
            navigator,
            pending: HashMap::new(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Clamps and submits a score. The typed value is shown as a draft
    /// until the service confirms it.
    pub fn edit_score(
        &mut self,
        store: &mut DataStore,
        name: &str,
        phase: usize,
        raw: &str,
    ) -> Result<Submitted, ValidationError> {
        if phase >= PHASE_COUNT {
            return Err(ValidationError::PhaseOutOfRange(phase));
        }
        let score = clamp_score(raw)?;
        store.set_draft(
            name,
            phase,
            ScoreDraft {
                value: score,
                state: DraftState::Saving,
            },
        );
        Ok(self.submit(Mutation::EditScore {
            name: name.to_string(),
            phase,
            score,
        }))
    }

    /// Opens the repository link first, whatever the request does later.
    pub fn acknowledge_view(
        &mut self,
        store: &DataStore,
        name: &str,
    ) -> Result<Submitted, ValidationError> {
        let record = store
            .get(name)
            .ok_or_else(|| ValidationError::UnknownStudent(name.to_string()))?;
        self.navigator.open(&record.repo);
        Ok(self.submit(Mutation::AcknowledgeView {
            name: name.to_string(),
        }))
    }

    pub fn add_student(&mut self, draft: StudentDraft) -> Result<Submitted, ValidationError> {
        validate_draft(&draft)?;
        Ok(self.submit(Mutation::AddStudent(draft)))
    }

    pub fn update_student(
        &mut self,
        old_name: &str,
        draft: StudentDraft,
    ) -> Result<Submitted, ValidationError> {
        validate_draft(&draft)?;
        if old_name.trim().is_empty() {
            return Err(ValidationError::Missing("name"));
        }
        Ok(self.submit(Mutation::UpdateStudent {
            old_name: old_name.trim().to_string(),
            draft,
        }))
    }

    pub fn delete_student(&mut self, name: &str) -> Result<Submitted, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::Missing("name"));
        }
        Ok(self.submit(Mutation::DeleteStudent {
            name: name.to_string(),
        }))
    }

    pub fn import_students(&mut self, text: &str) -> Result<Submitted, ValidationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::Missing("text"));
        }
        Ok(self.submit(Mutation::ImportStudents {
            text: text.to_string(),
        }))
    }

    fn submit(&mut self, mutation: Mutation) -> Submitted {
        let id = Uuid::new_v4();
        debug!(%id, kind = mutation.kind(), "mutation in flight");
        self.pending.insert(
            id,
            PendingMutation {
                id,
                mutation: mutation.clone(),
                state: MutationState::InFlight,
            },
        );
        let service = Arc::clone(&self.service);
        let request = async move {
            let result = mutation.send(service.as_ref()).await;
            Completion { id, result }
        }
        .boxed();
        Submitted { id, request }
    }

    /// Awaits a submitted request in place and settles it.
    pub async fn complete(
        &mut self,
        store: &mut DataStore,
        submitted: Submitted,
    ) -> Option<Settlement> {
        let completion = submitted.request.await;
        self.settle(store, completion, Utc::now())
    }

    /// Moves a mutation to applied or rejected and reconciles local state.
    /// Unknown ids (already settled) are ignored.
    pub fn settle(
        &mut self,
        store: &mut DataStore,
        completion: Completion,
        now: DateTime<Utc>,
    ) -> Option<Settlement> {
        let Some(mut pending) = self.pending.remove(&completion.id) else {
            warn!(id = %completion.id, "completion for unknown mutation");
            return None;
        };
        let kind = pending.mutation.kind();

        let (notice, reload) = match completion.result {
            Ok(ack) => {
                pending.state = MutationState::Applied;
                info!(id = %pending.id, kind, "mutation applied");
                apply(store, &pending.mutation, ack, now)
            }
            Err(err) => {
                pending.state = MutationState::Rejected;
                warn!(id = %pending.id, kind, error = %err, "mutation rejected");
                reject(store, &pending.mutation, &err)
            }
        };
        Some(Settlement {
            id: pending.id,
            state: pending.state,
            notice,
            reload,
        })
    }
}

fn validate_draft(draft: &StudentDraft) -> Result<(), ValidationError> {
    if draft.name.is_empty() {
        return Err(ValidationError::Missing("name"));
    }
    if draft.repo.is_empty() {
        return Err(ValidationError::Missing("repo"));
    }
    Ok(())
}

fn apply(store: &mut DataStore, mutation: &Mutation, ack: Ack, now: DateTime<Utc>) -> (Notice, bool) {
    match mutation {
        Mutation::EditScore { name, phase, score } => {
            store.clear_draft(name, *phase);
            if let Some(record) = store.get_mut(name) {
                record.set_score(*phase, *score);
            }
            let text = format!("✓ {name} 的{}评分已保存", PHASE_LABELS[*phase]);
            (Notice::success(text).lasting(Duration::from_secs(2)), false)
        }
        Mutation::AcknowledgeView { name } => {
            if let Some(record) = store.get_mut(name) {
                record.updated_since_view = false;
                record.last_viewed_at = Some(now);
            }
            (Notice::info(format!("已查看 {name}")), false)
        }
        Mutation::AddStudent(_) => (Notice::success(StudentOperation::Add.success_message()), true),
        Mutation::UpdateStudent { .. } => {
            (Notice::success(StudentOperation::Update.success_message()), true)
        }
        Mutation::DeleteStudent { .. } => {
            (Notice::success(StudentOperation::Delete.success_message()), true)
        }
        Mutation::ImportStudents { .. } => {
            let summary = match ack {
                Ack::Imported(summary) => summary,
                Ack::Done => ImportSummary::default(),
            };
            let text = format!(
                "✓ 导入完成：新增 {} 个，更新 {} 个，跳过 {} 个",
                summary.added, summary.updated, summary.skipped
            );
            (Notice::success(text), true)
        }
    }
}

fn reject(store: &mut DataStore, mutation: &Mutation, err: &RemoteError) -> (Notice, bool) {
    match mutation {
        Mutation::EditScore { name, phase, score } => {
            store.set_draft(
                name,
                *phase,
                ScoreDraft {
                    value: *score,
                    state: DraftState::Unsaved,
                },
            );
            (Notice::error("✗ 评分保存失败"), false)
        }
        Mutation::AcknowledgeView { .. } => {
            let text = format!("✗ 标记查看失败：{}", err.user_message());
            (Notice::error(text), false)
        }
        Mutation::AddStudent(_) => (
            Notice::error(student_error_message(StudentOperation::Add, err)),
            false,
        ),
        Mutation::UpdateStudent { .. } => (
            Notice::error(student_error_message(StudentOperation::Update, err)),
            false,
        ),
        Mutation::DeleteStudent { .. } => (
            Notice::error(student_error_message(StudentOperation::Delete, err)),
            false,
        ),
        Mutation::ImportStudents { .. } => {
            let text = match err {
                RemoteError::Transport(_) => "网络错误",
                RemoteError::Rejected { .. } | RemoteError::Decode(_) => "导入失败，请检查格式",
            };
            (Notice::error(text), false)
        }
    }
}
