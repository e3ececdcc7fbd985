use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PHASE_COUNT: usize = 5;
pub const PHASE_LABELS: [&str; PHASE_COUNT] = ["阶段1", "阶段2", "阶段3", "阶段4", "阶段5"];
pub const MAX_SCORE: u8 = 100;

/// One row of the canonical snapshot returned by `GET /api/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub name: String,
    pub repo: String,
    #[serde(default)]
    pub last_known_pushed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_viewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_since_view: bool,
    #[serde(default)]
    pub scores: [u8; PHASE_COUNT],
    #[serde(default)]
    pub avg_score: f64,
    #[serde(default)]
    pub commits_count: CommitsCount,
    #[serde(default)]
    pub badges: Vec<Badge>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl StudentRecord {
    pub fn new(name: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repo: repo.into(),
            last_known_pushed_at: None,
            last_viewed_at: None,
            updated_since_view: false,
            scores: [0; PHASE_COUNT],
            avg_score: 0.0,
            commits_count: CommitsCount::Pending,
            badges: Vec::new(),
            avatar_url: None,
        }
    }

    #[cfg(test)]
    pub fn with_scores(mut self, scores: [u8; PHASE_COUNT]) -> Self {
        self.scores = scores;
        self.recompute_average();
        self
    }

    pub fn set_score(&mut self, phase: usize, score: u8) {
        self.scores[phase] = score.min(MAX_SCORE);
        self.recompute_average();
    }

    pub fn recompute_average(&mut self) {
        self.avg_score = mean(&self.scores);
    }

    pub fn total_score(&self) -> u32 {
        self.scores.iter().map(|s| u32::from(*s)).sum()
    }
}

pub fn mean(scores: &[u8; PHASE_COUNT]) -> f64 {
    let total: u32 = scores.iter().map(|s| u32::from(*s)).sum();
    f64::from(total) / PHASE_COUNT as f64
}

/// Commit counter as reported by the service: absent while the first
/// scrape is pending, `-1` while a failed scrape is being retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<i64>", into = "Option<i64>")]
pub enum CommitsCount {
    #[default]
    Pending,
    Retrying,
    Resolved(u64),
}

impl From<Option<i64>> for CommitsCount {
    fn from(value: Option<i64>) -> Self {
        match value {
            None => CommitsCount::Pending,
            Some(n) if n < 0 => CommitsCount::Retrying,
            Some(n) => CommitsCount::Resolved(n as u64),
        }
    }
}

impl From<CommitsCount> for Option<i64> {
    fn from(value: CommitsCount) -> Self {
        match value {
            CommitsCount::Pending => None,
            CommitsCount::Retrying => Some(-1),
            CommitsCount::Resolved(n) => Some(n as i64),
        }
    }
}

impl CommitsCount {
    pub fn resolved(self) -> u64 {
        match self {
            CommitsCount::Resolved(n) => n,
            CommitsCount::Pending | CommitsCount::Retrying => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub icon: String,
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Card,
    Table,
}

impl ViewMode {
    pub fn toggled(self) -> Self {
        match self {
            ViewMode::Card => ViewMode::Table,
            ViewMode::Table => ViewMode::Card,
        }
    }
}

/// Name/repo pair sent by add and update requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentDraft {
    pub name: String,
    pub repo: String,
}

impl StudentDraft {
    pub fn new(name: &str, repo: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            repo: repo.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct ImportSummary {
    pub added: u32,
    pub updated: u32,
    pub skipped: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SortKey {
    #[default]
    #[value(name = "avg")]
    AvgScore,
    #[value(name = "total")]
    TotalScore,
    #[value(name = "commits")]
    CommitsCount,
}

impl SortKey {
    pub fn as_param(self) -> &'static str {
        match self {
            SortKey::AvgScore => "avg_score",
            SortKey::TotalScore => "total_score",
            SortKey::CommitsCount => "commits_count",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortKey::AvgScore => "按平均分排序",
            SortKey::TotalScore => "按总分排序",
            SortKey::CommitsCount => "按提交数排序",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub name: String,
    pub repo: String,
    #[serde(default)]
    pub scores: [u8; PHASE_COUNT],
    #[serde(default)]
    pub avg_score: f64,
    #[serde(default)]
    pub total_score: u32,
    #[serde(default)]
    pub commits_count: CommitsCount,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub badges: Vec<Badge>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StudentDetails {
    pub student: StudentProfile,
    #[serde(default)]
    pub commits: Vec<CommitEntry>,
    #[serde(default)]
    pub commit_frequency: Vec<DailyCommits>,
    #[serde(default)]
    pub score_trend: Vec<PhaseScore>,
    #[serde(default)]
    pub score_history: Vec<ScoreChange>,
    #[serde(default)]
    pub remarks: Remarks,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StudentProfile {
    pub name: String,
    pub repo: String,
    #[serde(default)]
    pub scores: [u8; PHASE_COUNT],
    #[serde(default)]
    pub avg_score: f64,
    #[serde(default)]
    pub commits_count: CommitsCount,
    #[serde(default)]
    pub last_pushed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_viewed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub badges: Vec<Badge>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommitEntry {
    pub sha: String,
    pub message: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DailyCommits {
    pub date: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PhaseScore {
    pub phase: String,
    pub score: u8,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoreChange {
    pub timestamp: DateTime<Utc>,
    pub phase: usize,
    pub old_score: u8,
    pub new_score: u8,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Remarks {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Remarks {
    /// Tags are stored without a leading `#`; blank and repeated tags are dropped.
    pub fn new(text: &str, tags: &[String]) -> Self {
        let mut cleaned: Vec<String> = Vec::with_capacity(tags.len());
        for tag in tags {
            let tag = tag.trim().trim_start_matches('#').trim();
            if !tag.is_empty() && !cleaned.iter().any(|seen| seen == tag) {
                cleaned.push(tag.to_string());
            }
        }
        Self {
            text: text.trim().to_string(),
            tags: cleaned,
            updated_at: None,
        }
    }
}
