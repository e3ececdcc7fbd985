use std::fmt;

use thiserror::Error;

/// Failure of a request against the dashboard service.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// No usable response: connection refused, reset, timed out.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The service answered and refused the write.
    #[error("request rejected with status {status}: {reason}")]
    Rejected { status: u16, reason: RejectReason },

    #[error("malformed response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

impl RemoteError {
    pub fn reason(&self) -> Option<&RejectReason> {
        match self {
            RemoteError::Rejected { reason, .. } => Some(reason),
            RemoteError::Transport(_) | RemoteError::Decode(_) => None,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            RemoteError::Transport(_) => "网络错误",
            RemoteError::Rejected { .. } | RemoteError::Decode(_) => "操作失败",
        }
    }
}

/// Business-rule rejection codes the student endpoints can return.
/// Anything outside the closed set lands in `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    NameExists,
    RepoExists,
    NotFound,
    Other(String),
}

impl RejectReason {
    pub fn from_code(code: &str) -> Self {
        match code {
            "name exists" => RejectReason::NameExists,
            "repo exists" => RejectReason::RepoExists,
            "not found" => RejectReason::NotFound,
            other => RejectReason::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            RejectReason::NameExists => "name exists",
            RejectReason::RepoExists => "repo exists",
            RejectReason::NotFound => "not found",
            RejectReason::Other(code) => code,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudentOperation {
    Add,
    Update,
    Delete,
}

impl StudentOperation {
    pub fn success_message(self) -> &'static str {
        match self {
            StudentOperation::Add => "✓ 学员已添加",
            StudentOperation::Update => "✓ 学员信息已更新",
            StudentOperation::Delete => "✓ 学员已删除",
        }
    }

    fn fallback_message(self) -> &'static str {
        match self {
            StudentOperation::Add | StudentOperation::Update => "操作失败",
            StudentOperation::Delete => "删除失败",
        }
    }
}

pub fn student_error_message(operation: StudentOperation, err: &RemoteError) -> &'static str {
    if let RemoteError::Transport(_) = err {
        return "网络错误";
    }
    match err.reason() {
        Some(RejectReason::NameExists) => "姓名已存在",
        Some(RejectReason::RepoExists) => "仓库已存在",
        Some(RejectReason::NotFound) => "学员不存在",
        Some(RejectReason::Other(_)) | None => operation.fallback_message(),
    }
}

/// Input problems caught before any request is issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required input: {0}")]
    Missing(&'static str),

    #[error("score does not start with a number: {0:?}")]
    NotANumber(String),

    #[error("phase index {0} is out of range")]
    PhaseOutOfRange(usize),

    #[error("no student named {0:?} in the current snapshot")]
    UnknownStudent(String),

    #[error("refresh interval must be at least one second")]
    ZeroInterval,
}

impl ValidationError {
    pub fn user_message(&self) -> String {
        match self {
            ValidationError::Missing("name") | ValidationError::Missing("repo") => {
                "请填写姓名和仓库链接".to_string()
            }
            ValidationError::Missing("text") => "请输入要导入的内容".to_string(),
            ValidationError::Missing(field) => format!("缺少必填项：{field}"),
            ValidationError::NotANumber(raw) => format!("无效的分数：{raw}"),
            ValidationError::PhaseOutOfRange(index) => format!("阶段编号无效：{}", index + 1),
            ValidationError::UnknownStudent(name) => format!("学员不存在：{name}"),
            ValidationError::ZeroInterval => "刷新间隔必须大于0".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("local database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("local value is not valid JSON: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("snapshot contains {0:?} more than once")]
    DuplicateName(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(code: &str) -> RemoteError {
        RemoteError::Rejected {
            status: 409,
            reason: RejectReason::from_code(code),
        }
    }

    #[test]
    fn closed_codes_map_to_distinct_messages() {
        let op = StudentOperation::Add;
        assert_eq!(student_error_message(op, &rejected("name exists")), "姓名已存在");
        assert_eq!(student_error_message(op, &rejected("repo exists")), "仓库已存在");
        assert_eq!(student_error_message(op, &rejected("not found")), "学员不存在");
    }

    #[test]
    fn unknown_code_falls_back_per_operation() {
        let err = rejected("missing name or repo");
        assert_eq!(
            err.reason(),
            Some(&RejectReason::Other("missing name or repo".to_string()))
        );
        assert_eq!(student_error_message(StudentOperation::Add, &err), "操作失败");
        assert_eq!(student_error_message(StudentOperation::Delete, &err), "删除失败");
    }

    #[test]
    fn transport_failure_is_network_error() {
        let err = RemoteError::Transport("connection refused".to_string());
        assert_eq!(student_error_message(StudentOperation::Update, &err), "网络错误");
        assert_eq!(err.user_message(), "网络错误");
    }
}
