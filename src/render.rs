use std::fmt::Write;

use chrono::{DateTime, Local, TimeZone, Utc};
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use reqwest::Url;

use crate::filter::FilterState;
use crate::models::{
    Badge, CommitsCount, LeaderboardEntry, SortKey, StudentDetails, StudentRecord, ViewMode,
    PHASE_COUNT, PHASE_LABELS,
};
use crate::settings::Settings;
use crate::store::{DataStore, DraftState};
use crate::ui::{BadgeTip, Modal, Notice, NoticeLevel};

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const MAX_BADGE_ICONS: usize = 3;

/// Everything one dashboard frame is drawn from. The renderer only reads.
pub struct DashboardView<'a> {
    pub store: &'a DataStore,
    pub rows: &'a [&'a StudentRecord],
    pub filter: &'a FilterState,
    pub mode: ViewMode,
    pub page: usize,
    pub per_page: usize,
    pub notice: Option<&'a Notice>,
    pub tooltip: Option<&'a BadgeTip>,
    pub modal: Option<&'a Modal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub index: usize,
    pub count: usize,
    pub total: usize,
    pub start: usize,
    pub end: usize,
}

pub fn page_info(total: usize, page: usize, per_page: usize) -> PageInfo {
    let per_page = per_page.max(1);
    let count = total.div_ceil(per_page).max(1);
    let index = page.min(count - 1);
    let start = (index * per_page).min(total);
    let end = (start + per_page).min(total);
    PageInfo {
        index,
        count,
        total,
        start,
        end,
    }
}

/// A drawn frame plus the student names behind its numbered rows, so
/// row numbers typed by the user resolve to identities.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedView {
    pub text: String,
    pub rows: Vec<String>,
    pub page: PageInfo,
}

pub fn render_dashboard(view: &DashboardView<'_>) -> RenderedView {
    let page = page_info(view.rows.len(), view.page, view.per_page);
    let visible = &view.rows[page.start..page.end];

    let mut output = String::new();
    write_header(&mut output, view);

    if visible.is_empty() {
        let _ = writeln!(output, "📭 暂无学员数据");
    } else {
        match view.mode {
            ViewMode::Card => write_cards(&mut output, view.store, visible, page.start),
            ViewMode::Table => write_table(&mut output, view.store, visible, page.start),
        }
    }

    if page.count > 1 {
        let _ = writeln!(
            output,
            "第 {}/{} 页 · 共 {} 条",
            page.index + 1,
            page.count,
            page.total
        );
    }
    if let Some(tip) = view.tooltip {
        write_tooltip(&mut output, tip);
    }
    if let Some(Modal::ConfirmDelete { name }) = view.modal {
        let _ = writeln!(output, "⚠️  确定要删除学员 {name} 吗？此操作不可恢复 (y/n)");
    }
    if let Some(notice) = view.notice {
        let _ = writeln!(output, "{}", notice_line(notice));
    }

    RenderedView {
        text: output,
        rows: visible.iter().map(|record| record.name.clone()).collect(),
        page,
    }
}

fn write_header(output: &mut String, view: &DashboardView<'_>) {
    let stats = view.store.stats();
    let loaded = view
        .store
        .loaded_at()
        .map(|at| at.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    let _ = writeln!(output, "📚 学员作业看板");
    let _ = writeln!(
        output,
        "学员总数 {} · 有更新 {} · 平均分 {:.1} · 最后加载 {}",
        stats.total, stats.updated, stats.class_average, loaded
    );

    let mut filters = Vec::new();
    if view.filter.show_updated_only {
        filters.push("仅显示有更新".to_string());
    }
    let query = view.filter.search_query.trim();
    if !query.is_empty() {
        filters.push(format!("搜索 \"{query}\""));
    }
    let mode = match view.mode {
        ViewMode::Card => "卡片",
        ViewMode::Table => "表格",
    };
    if !view.filter.is_active() {
        let _ = writeln!(output, "视图 {mode}");
    } else {
        let _ = writeln!(output, "视图 {mode} · {}", filters.join(" · "));
    }
    let _ = writeln!(output);
}

fn write_cards(output: &mut String, store: &DataStore, rows: &[&StudentRecord], offset: usize) {
    for (position, record) in rows.iter().enumerate() {
        let _ = writeln!(
            output,
            "[{}] {}  {}",
            offset + position + 1,
            record.name,
            status_badge(record.updated_since_view)
        );
        let _ = writeln!(output, "    🔗 {}", repo_path(&record.repo));
        let _ = writeln!(
            output,
            "    最后更新 {} · 最后查看 {}",
            format_timestamp(record.last_known_pushed_at),
            format_timestamp(record.last_viewed_at)
        );
        let scores: Vec<String> = (0..PHASE_COUNT)
            .map(|phase| format!("{} {}", PHASE_LABELS[phase], score_cell(store, record, phase)))
            .collect();
        let _ = writeln!(
            output,
            "    五阶段评分 {:.1} | {}",
            record.avg_score,
            scores.join(" | ")
        );
        let icons = badge_icons(&record.badges);
        if icons.is_empty() {
            let _ = writeln!(output, "    提交 {}", commits_label(record.commits_count));
        } else {
            let _ = writeln!(
                output,
                "    提交 {} · 徽章 {icons}",
                commits_label(record.commits_count)
            );
        }
        let _ = writeln!(output);
    }
}

fn write_table(output: &mut String, store: &DataStore, rows: &[&StudentRecord], offset: usize) {
    let mut table = Table::new();
    let mut header = vec![
        header_cell("#"),
        header_cell("姓名"),
        header_cell("状态"),
        header_cell("最后更新"),
        header_cell("最后查看"),
    ];
    header.extend(PHASE_LABELS.iter().map(|label| header_cell(label)));
    header.push(header_cell("平均分"));
    header.push(header_cell("提交"));
    table.set_header(header);
    apply_table_style(&mut table);

    for (position, record) in rows.iter().enumerate() {
        let mut cells = vec![
            Cell::new(offset + position + 1),
            Cell::new(&record.name).add_attribute(Attribute::Bold),
            status_cell(record.updated_since_view),
            Cell::new(format_timestamp(record.last_known_pushed_at)),
            Cell::new(format_timestamp(record.last_viewed_at)),
        ];
        cells.extend(
            (0..PHASE_COUNT).map(|phase| {
                Cell::new(score_cell(store, record, phase)).set_alignment(CellAlignment::Right)
            }),
        );
        cells.push(
            Cell::new(format!("{:.1}", record.avg_score))
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Right),
        );
        cells.push(Cell::new(commits_label(record.commits_count)));
        table.add_row(cells);
    }
    let _ = writeln!(output, "{table}");
}

fn write_tooltip(output: &mut String, tip: &BadgeTip) {
    if tip.badges.is_empty() {
        let _ = writeln!(output, "🏅 {} 暂无徽章", tip.student);
        return;
    }
    let _ = writeln!(output, "🏅 {} 的徽章", tip.student);
    for badge in &tip.badges {
        let _ = writeln!(
            output,
            "   {} {} ({}) {}",
            badge.icon, badge.name, badge.level, badge.desc
        );
    }
}

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label).add_attribute(Attribute::Bold)
}

fn status_cell(updated: bool) -> Cell {
    let cell = Cell::new(status_badge(updated));
    if updated {
        cell.fg(Color::Yellow)
    } else {
        cell.fg(Color::Green)
    }
}

pub fn status_badge(updated: bool) -> &'static str {
    if updated {
        "📌 已更新"
    } else {
        "✓ 无更新"
    }
}

/// `~` marks a score still being saved, `*` one the service refused.
pub fn score_cell(store: &DataStore, record: &StudentRecord, phase: usize) -> String {
    match store.draft(&record.name, phase) {
        Some(draft) => match draft.state {
            DraftState::Saving => format!("~{}", draft.value),
            DraftState::Unsaved => format!("{}*", draft.value),
        },
        None => record.scores[phase].to_string(),
    }
}

pub fn commits_label(count: CommitsCount) -> String {
    match count {
        CommitsCount::Pending => "⏳ 抓取中".to_string(),
        CommitsCount::Retrying => "⏳ 重试中".to_string(),
        CommitsCount::Resolved(n) => format!("🔥 {n}"),
    }
}

pub fn badge_icons(badges: &[Badge]) -> String {
    badges
        .iter()
        .take(MAX_BADGE_ICONS)
        .map(|badge| badge.icon.as_str())
        .collect()
}

/// Repository URL shortened to its path, `owner/name`.
pub fn repo_path(repo: &str) -> String {
    match Url::parse(repo) {
        Ok(url) => url.path().trim_start_matches('/').to_string(),
        Err(_) => repo.to_string(),
    }
}

pub fn format_timestamp(at: Option<DateTime<Utc>>) -> String {
    format_timestamp_in(at, &Local)
}

fn format_timestamp_in<Tz: TimeZone>(at: Option<DateTime<Utc>>, zone: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    match at {
        Some(at) => at.with_timezone(zone).format("%m-%d %H:%M").to_string(),
        None => "-".to_string(),
    }
}

pub fn notice_line(notice: &Notice) -> String {
    match notice.level {
        NoticeLevel::Info => format!("ℹ️  {}", notice.text),
        NoticeLevel::Success | NoticeLevel::Error => notice.text.clone(),
    }
}

pub fn render_leaderboard(entries: &[&LeaderboardEntry], sort: SortKey) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "🏆 排行榜 · {}", sort.label());

    if entries.is_empty() {
        let _ = writeln!(output, "暂无数据");
        return output;
    }

    for (medal, entry) in ["🥇", "🥈", "🥉"].iter().zip(entries.iter()) {
        let _ = writeln!(
            output,
            "{medal} {}  {}  🔥 {}",
            entry.name,
            leaderboard_score(entry, sort),
            entry.commits_count.resolved()
        );
    }
    let _ = writeln!(output);

    let mut table = Table::new();
    let mut header = vec![header_cell("排名"), header_cell("姓名")];
    header.extend(PHASE_LABELS.iter().map(|label| header_cell(label)));
    header.extend([
        header_cell("总分"),
        header_cell("平均分"),
        header_cell("提交"),
        header_cell("徽章"),
    ]);
    table.set_header(header);
    apply_table_style(&mut table);

    for entry in entries {
        let rank = match entry.rank {
            1 => "🥇".to_string(),
            2 => "🥈".to_string(),
            3 => "🥉".to_string(),
            n => n.to_string(),
        };
        let mut cells = vec![Cell::new(rank), Cell::new(&entry.name)];
        cells.extend(
            entry
                .scores
                .iter()
                .map(|score| Cell::new(score).set_alignment(CellAlignment::Right)),
        );
        cells.push(Cell::new(entry.total_score).set_alignment(CellAlignment::Right));
        cells.push(
            Cell::new(format!("{:.1}", entry.avg_score))
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Right),
        );
        cells.push(Cell::new(commits_label(entry.commits_count)));
        cells.push(Cell::new(badge_icons(&entry.badges)));
        table.add_row(cells);
    }
    let _ = writeln!(output, "{table}");

    let total_commits: u64 = entries.iter().map(|e| e.commits_count.resolved()).sum();
    let _ = writeln!(
        output,
        "共 {} 名学员 · 总提交 {}",
        entries.len(),
        total_commits
    );
    output
}

fn leaderboard_score(entry: &LeaderboardEntry, sort: SortKey) -> String {
    match sort {
        SortKey::AvgScore => format!("{:.1}", entry.avg_score),
        SortKey::TotalScore => entry.total_score.to_string(),
        SortKey::CommitsCount => entry.commits_count.resolved().to_string(),
    }
}

/// One character per value, scaled against the largest.
pub fn sparkline(values: &[u32]) -> String {
    let max = values.iter().copied().max().unwrap_or(0);
    values
        .iter()
        .map(|&value| {
            if max == 0 {
                SPARK_LEVELS[0]
            } else {
                let level = (value as usize * (SPARK_LEVELS.len() - 1)) / max as usize;
                SPARK_LEVELS[level]
            }
        })
        .collect()
}

pub fn render_details(details: &StudentDetails) -> String {
    let student = &details.student;
    let mut output = String::new();

    let _ = writeln!(output, "# {}", student.name);
    let _ = writeln!(output, "🔗 {}", student.repo);
    if let Some(avatar) = &student.avatar_url {
        let _ = writeln!(output, "👤 {avatar}");
    }
    let _ = writeln!(
        output,
        "平均分 {:.1} · 提交 {} · 最后推送 {} · 最后查看 {}",
        student.avg_score,
        commits_label(student.commits_count),
        format_timestamp(student.last_pushed),
        format_timestamp(student.last_viewed)
    );

    if !student.badges.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## 徽章");
        for badge in &student.badges {
            let _ = writeln!(output, "- {} {}: {}", badge.icon, badge.name, badge.desc);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## 成绩趋势");
    if details.score_trend.is_empty() {
        for (label, score) in PHASE_LABELS.iter().zip(student.scores.iter()) {
            let _ = writeln!(output, "{label} {score:>3} {}", score_bar(*score));
        }
    } else {
        for point in &details.score_trend {
            let _ = writeln!(output, "{} {:>3} {}", point.phase, point.score, score_bar(point.score));
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## 提交频率");
    if details.commit_frequency.is_empty() {
        let _ = writeln!(output, "暂无提交记录");
    } else {
        let counts: Vec<u32> = details.commit_frequency.iter().map(|d| d.count).collect();
        let first = &details.commit_frequency[0].date;
        let last = &details.commit_frequency[details.commit_frequency.len() - 1].date;
        let _ = writeln!(output, "{first} {} {last}", sparkline(&counts));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## 最近提交");
    if details.commits.is_empty() {
        let _ = writeln!(output, "暂无提交记录");
    } else {
        for commit in details.commits.iter().take(10) {
            let sha: String = commit.sha.chars().take(7).collect();
            let message = commit.message.lines().next().unwrap_or_default();
            let _ = writeln!(output, "- {sha} {message} ({}, {})", commit.author, commit.date);
        }
    }

    if !details.score_history.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## 评分历史");
        for change in &details.score_history {
            let label = PHASE_LABELS.get(change.phase).copied().unwrap_or("?");
            let _ = writeln!(
                output,
                "- {} {label}: {} → {}",
                format_timestamp(Some(change.timestamp)),
                change.old_score,
                change.new_score
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## 备注");
    let remarks = &details.remarks;
    if remarks.text.is_empty() && remarks.tags.is_empty() {
        let _ = writeln!(output, "暂无备注");
    } else {
        if !remarks.tags.is_empty() {
            let tags: Vec<String> = remarks.tags.iter().map(|tag| format!("#{tag}")).collect();
            let _ = writeln!(output, "{}", tags.join(" "));
        }
        if !remarks.text.is_empty() {
            let _ = writeln!(output, "{}", remarks.text);
        }
        if let Some(updated) = remarks.updated_at {
            let _ = writeln!(output, "更新于 {}", format_timestamp(Some(updated)));
        }
    }
    output
}

fn score_bar(score: u8) -> String {
    "█".repeat(usize::from(score) / 10)
}

pub fn render_settings(settings: &Settings) -> String {
    let mut table = Table::new();
    table.set_header(vec![header_cell("设置"), header_cell("值")]);
    apply_table_style(&mut table);

    let token = if settings.github_token.is_empty() {
        "未设置"
    } else {
        "已设置"
    };
    let view = match settings.default_view {
        ViewMode::Card => "card",
        ViewMode::Table => "table",
    };
    let rows: [(&str, String); 10] = [
        ("client_refresh_seconds", settings.client_refresh_seconds.to_string()),
        (
            "server_poll_interval_seconds",
            settings.server_poll_interval_seconds.to_string(),
        ),
        ("instructor_name", settings.instructor_name.clone()),
        ("instructor_email", settings.instructor_email.clone()),
        ("notify_updates", settings.notify_updates.to_string()),
        ("sound_enabled", settings.sound_enabled.to_string()),
        ("default_view", view.to_string()),
        ("items_per_page", settings.items_per_page.to_string()),
        ("show_viewed_students", settings.show_viewed_students.to_string()),
        ("github_token", token.to_string()),
    ];
    for (key, value) in rows {
        table.add_row(vec![Cell::new(key), Cell::new(value)]);
    }
    format!("{table}\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DailyCommits, Remarks, StudentProfile};
    use crate::store::ScoreDraft;

    fn badge(icon: &str) -> Badge {
        Badge {
            icon: icon.into(),
            name: format!("badge {icon}"),
            desc: "desc".into(),
            level: "gold".into(),
        }
    }

    fn store_with(records: Vec<StudentRecord>) -> DataStore {
        let mut store = DataStore::new();
        store.load(records).unwrap();
        store
    }

    fn frame<'a>(
        store: &'a DataStore,
        rows: &'a [&'a StudentRecord],
        filter: &'a FilterState,
        mode: ViewMode,
        page: usize,
        per_page: usize,
    ) -> DashboardView<'a> {
        DashboardView {
            store,
            rows,
            filter,
            mode,
            page,
            per_page,
            notice: None,
            tooltip: None,
            modal: None,
        }
    }

    #[test]
    fn paging_clamps_to_last_page() {
        assert_eq!(
            page_info(45, 7, 20),
            PageInfo {
                index: 2,
                count: 3,
                total: 45,
                start: 40,
                end: 45
            }
        );
        let empty = page_info(0, 3, 20);
        assert_eq!((empty.count, empty.start, empty.end), (1, 0, 0));
        assert_eq!(page_info(5, 0, 0).end, 1);
    }

    #[test]
    fn card_frame_lists_rows_in_order() {
        let mut alice = StudentRecord::new("Alice", "https://github.com/alice/hw")
            .with_scores([80, 70, 90, 60, 100]);
        alice.updated_since_view = true;
        alice.commits_count = CommitsCount::Resolved(12);
        alice.badges = vec![badge("🔥"), badge("⭐"), badge("🏅"), badge("🎯")];
        let bob = StudentRecord::new("Bob", "https://github.com/bob/hw");
        let store = store_with(vec![alice, bob]);
        let rows: Vec<&StudentRecord> = store.records().iter().collect();
        let filter = FilterState::default();

        let rendered = render_dashboard(&frame(&store, &rows, &filter, ViewMode::Card, 0, 20));
        assert_eq!(rendered.rows, ["Alice", "Bob"]);
        assert!(rendered.text.contains("[1] Alice  📌 已更新"));
        assert!(rendered.text.contains("[2] Bob  ✓ 无更新"));
        assert!(rendered.text.contains("🔗 alice/hw"));
        assert!(rendered.text.contains("五阶段评分 80.0"));
        assert!(rendered.text.contains("🔥 12 · 徽章 🔥⭐🏅"));
        assert!(!rendered.text.contains("🎯"));
        assert!(rendered.text.contains("⏳ 抓取中"));
    }

    #[test]
    fn second_page_numbers_continue() {
        let records: Vec<StudentRecord> = (0..5)
            .map(|i| StudentRecord::new(format!("s{i}"), format!("https://github.com/s{i}/hw")))
            .collect();
        let store = store_with(records);
        let rows: Vec<&StudentRecord> = store.records().iter().collect();
        let filter = FilterState::default();

        let rendered = render_dashboard(&frame(&store, &rows, &filter, ViewMode::Card, 1, 2));
        assert_eq!(rendered.rows, ["s2", "s3"]);
        assert!(rendered.text.contains("[3] s2"));
        assert!(rendered.text.contains("第 2/3 页 · 共 5 条"));
    }

    #[test]
    fn table_frame_marks_drafts() {
        let alice = StudentRecord::new("Alice", "https://github.com/alice/hw")
            .with_scores([80, 70, 90, 60, 100]);
        let mut store = store_with(vec![alice]);
        store.set_draft(
            "Alice",
            1,
            ScoreDraft {
                value: 100,
                state: DraftState::Unsaved,
            },
        );
        store.set_draft(
            "Alice",
            2,
            ScoreDraft {
                value: 55,
                state: DraftState::Saving,
            },
        );
        let rows: Vec<&StudentRecord> = store.records().iter().collect();
        let filter = FilterState::default();

        let rendered = render_dashboard(&frame(&store, &rows, &filter, ViewMode::Table, 0, 20));
        assert!(rendered.text.contains("100*"));
        assert!(rendered.text.contains("~55"));
        assert!(rendered.text.contains("姓名"));
        assert!(rendered.text.contains("视图 表格"));
    }

    #[test]
    fn empty_filtered_view_shows_empty_state() {
        let store = store_with(vec![StudentRecord::new("Bob", "https://github.com/bob/hw")]);
        let rows: Vec<&StudentRecord> = Vec::new();
        let filter = FilterState {
            search_query: "zzz".into(),
            show_updated_only: true,
        };

        let rendered = render_dashboard(&frame(&store, &rows, &filter, ViewMode::Card, 0, 20));
        assert!(rendered.rows.is_empty());
        assert!(rendered.text.contains("📭 暂无学员数据"));
        assert!(rendered.text.contains("仅显示有更新 · 搜索 \"zzz\""));
        assert!(rendered.text.contains("学员总数 1 · 有更新 0"));
    }

    #[test]
    fn overlays_and_notice_are_drawn() {
        let store = store_with(vec![StudentRecord::new("Bob", "https://github.com/bob/hw")]);
        let rows: Vec<&StudentRecord> = store.records().iter().collect();
        let filter = FilterState::default();
        let tip = BadgeTip {
            student: "Bob".into(),
            badges: vec![badge("⭐")],
        };
        let modal = Modal::ConfirmDelete { name: "Bob".into() };
        let notice = Notice::error("网络错误");
        let mut view = frame(&store, &rows, &filter, ViewMode::Card, 0, 20);
        view.tooltip = Some(&tip);
        view.modal = Some(&modal);
        view.notice = Some(&notice);

        let text = render_dashboard(&view).text;
        assert!(text.contains("🏅 Bob 的徽章"));
        assert!(text.contains("⭐ badge ⭐ (gold) desc"));
        assert!(text.contains("确定要删除学员 Bob 吗"));
        assert!(text.ends_with("网络错误\n"));
    }

    #[test]
    fn commits_labels_cover_tri_state() {
        assert_eq!(commits_label(CommitsCount::Pending), "⏳ 抓取中");
        assert_eq!(commits_label(CommitsCount::Retrying), "⏳ 重试中");
        assert_eq!(commits_label(CommitsCount::Resolved(0)), "🔥 0");
    }

    #[test]
    fn repo_path_falls_back_to_raw_text() {
        assert_eq!(repo_path("https://github.com/alice/hw"), "alice/hw");
        assert_eq!(repo_path("not a url"), "not a url");
    }

    #[test]
    fn timestamps_format_month_day_time() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        assert_eq!(format_timestamp_in(Some(at), &Utc), "03-09 14:05");
        assert_eq!(format_timestamp(None), "-");
    }

    #[test]
    fn sparkline_scales_to_max() {
        assert_eq!(sparkline(&[0, 7, 14]), "▁▄█");
        assert_eq!(sparkline(&[0, 0]), "▁▁");
        assert_eq!(sparkline(&[]), "");
    }

    #[test]
    fn leaderboard_has_podium_and_totals() {
        let entry = |rank: u32, name: &str, avg: f64, commits: u64| LeaderboardEntry {
            rank,
            name: name.into(),
            repo: format!("https://github.com/{name}/hw"),
            scores: [90; PHASE_COUNT],
            avg_score: avg,
            total_score: 450,
            commits_count: CommitsCount::Resolved(commits),
            avatar_url: None,
            badges: vec![badge("🔥")],
        };
        let entries = [
            entry(1, "Alice", 95.0, 30),
            entry(2, "Bob", 90.0, 20),
            entry(3, "Carol", 85.5, 10),
            entry(4, "Dan", 80.0, 5),
        ];
        let refs: Vec<&LeaderboardEntry> = entries.iter().collect();

        let text = render_leaderboard(&refs, SortKey::AvgScore);
        assert!(text.contains("按平均分排序"));
        assert!(text.contains("🥇 Alice  95.0  🔥 30"));
        assert!(text.contains("🥉 Carol  85.5  🔥 10"));
        assert!(!text.contains("Dan  80.0"));
        assert!(text.contains("共 4 名学员 · 总提交 65"));

        let text = render_leaderboard(&refs, SortKey::CommitsCount);
        assert!(text.contains("🥈 Bob  20  🔥 20"));
    }

    #[test]
    fn details_report_sections() {
        let details = StudentDetails {
            student: StudentProfile {
                name: "Alice".into(),
                repo: "https://github.com/alice/hw".into(),
                scores: [80, 70, 90, 60, 100],
                avg_score: 80.0,
                commits_count: CommitsCount::Retrying,
                last_pushed: None,
                last_viewed: None,
                avatar_url: None,
                badges: vec![],
            },
            commits: vec![],
            commit_frequency: vec![
                DailyCommits {
                    date: "2024-03-01".into(),
                    count: 0,
                },
                DailyCommits {
                    date: "2024-03-02".into(),
                    count: 4,
                },
            ],
            score_trend: vec![],
            score_history: vec![],
            remarks: Remarks {
                text: "进步明显".into(),
                tags: vec!["认真".into()],
                updated_at: None,
            },
        };

        let text = render_details(&details);
        assert!(text.starts_with("# Alice\n"));
        assert!(text.contains("⏳ 重试中"));
        assert!(text.contains("阶段5 100 ██████████"));
        assert!(text.contains("2024-03-01 ▁█ 2024-03-02"));
        assert!(text.contains("#认真\n进步明显"));
    }

    #[test]
    fn settings_table_hides_token() {
        let settings = Settings {
            github_token: "ghp_secret".into(),
            ..Settings::default()
        };
        let text = render_settings(&settings);
        assert!(text.contains("已设置"));
        assert!(!text.contains("ghp_secret"));
    }
}
