use thiserror::Error;

/// What the user asked the dashboard to do. Student rows are already
/// resolved from on-screen numbers to names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    EditScore { name: String, phase: usize, raw: String },
    AcknowledgeView { name: String },
    ShowBadges { name: String },
    CloseTooltip,
    RequestDelete { name: String },
    ConfirmDelete,
    CancelDelete,
    AddStudent { name: String, repo: String },
    UpdateStudent { old_name: String, name: String, repo: String },
    Search(String),
    ToggleUpdatedOnly,
    ToggleView,
    NextPage,
    PreviousPage,
    CheckNow,
    Reload,
    SetRefreshSeconds(u64),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("未知命令：{0}（输入 h 查看帮助）")]
    Unknown(String),

    #[error("用法：{0}")]
    Usage(&'static str),

    #[error("当前页没有第 {0} 行")]
    NoSuchRow(usize),

    #[error("请输入 y 确认删除，或 n 取消")]
    AwaitingConfirmation,
}

pub const HELP: &str = "\
s 行 阶段 分数   修改评分
v 行             查看仓库并标记已查看
i 行 / x         显示 / 关闭徽章
d 行             删除学员（需确认）
a 姓名 仓库      添加学员
e 行 姓名 仓库   编辑学员
/ 关键字         搜索（留空清除）
u                切换仅显示有更新
m                切换卡片 / 表格
n / p            下一页 / 上一页
c                立即检查
r                重新加载
t 秒             设置刷新间隔
q                退出";

/// Parses one input line. `rows` are the names behind the numbered rows
/// of the frame currently on screen.
pub fn parse(line: &str, rows: &[String], modal_open: bool) -> Result<Option<Intent>, InputError> {
    let line = line.trim();
    if modal_open {
        return match line {
            "y" | "Y" | "yes" => Ok(Some(Intent::ConfirmDelete)),
            "n" | "N" | "no" => Ok(Some(Intent::CancelDelete)),
            _ => Err(InputError::AwaitingConfirmation),
        };
    }
    if line.is_empty() {
        return Ok(None);
    }
    if let Some(query) = line.strip_prefix('/') {
        return Ok(Some(Intent::Search(query.trim().to_string())));
    }

    let mut words = line.split_whitespace();
    let command = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();

    let intent = match (command, args.as_slice()) {
        ("s", [row, phase, value]) => {
            let phase = phase
                .parse::<usize>()
                .ok()
                .and_then(|phase| phase.checked_sub(1))
                .ok_or(InputError::Usage("s 行 阶段(1-5) 分数"))?;
            Intent::EditScore {
                name: resolve(rows, row)?,
                phase,
                raw: (*value).to_string(),
            }
        }
        ("s", _) => return Err(InputError::Usage("s 行 阶段(1-5) 分数")),
        ("v", [row]) => Intent::AcknowledgeView {
            name: resolve(rows, row)?,
        },
        ("i", [row]) => Intent::ShowBadges {
            name: resolve(rows, row)?,
        },
        ("d", [row]) => Intent::RequestDelete {
            name: resolve(rows, row)?,
        },
        ("v" | "i" | "d", _) => return Err(InputError::Usage("v|i|d 行")),
        ("x", []) => Intent::CloseTooltip,
        ("a", [name @ .., repo]) if !name.is_empty() => Intent::AddStudent {
            name: name.join(" "),
            repo: (*repo).to_string(),
        },
        ("a", _) => return Err(InputError::Usage("a 姓名 仓库")),
        ("e", [row, name @ .., repo]) if !name.is_empty() => Intent::UpdateStudent {
            old_name: resolve(rows, row)?,
            name: name.join(" "),
            repo: (*repo).to_string(),
        },
        ("e", _) => return Err(InputError::Usage("e 行 姓名 仓库")),
        ("t", [seconds]) => Intent::SetRefreshSeconds(
            seconds
                .parse()
                .map_err(|_| InputError::Usage("t 秒"))?,
        ),
        ("t", _) => return Err(InputError::Usage("t 秒")),
        ("u", []) => Intent::ToggleUpdatedOnly,
        ("m", []) => Intent::ToggleView,
        ("n", []) => Intent::NextPage,
        ("p", []) => Intent::PreviousPage,
        ("c", []) => Intent::CheckNow,
        ("r", []) => Intent::Reload,
        ("h" | "?", []) => Intent::Help,
        ("q" | "quit" | "exit", []) => Intent::Quit,
        _ => return Err(InputError::Unknown(line.to_string())),
    };
    Ok(Some(intent))
}

fn resolve(rows: &[String], row: &str) -> Result<String, InputError> {
    let number: usize = row.parse().map_err(|_| InputError::Usage("行号为数字"))?;
    number
        .checked_sub(1)
        .and_then(|index| rows.get(index))
        .cloned()
        .ok_or(InputError::NoSuchRow(number))
}
