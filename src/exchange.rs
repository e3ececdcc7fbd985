use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{info, warn};

const BOM: char = '\u{feff}';

pub fn export_file_name(date: NaiveDate) -> String {
    format!("students_scores_{}.csv", date.format("%Y-%m-%d"))
}

/// Checks that the exported artifact parses as CSV, then writes it with
/// a BOM so spreadsheet tools detect UTF-8. Returns the data row count.
pub fn save_export(artifact: &str, path: &Path) -> anyhow::Result<usize> {
    let body = artifact.trim_start_matches(BOM);
    let mut reader = csv::Reader::from_reader(body.as_bytes());
    let mut rows = 0usize;
    for record in reader.records() {
        record.with_context(|| format!("export artifact is not valid CSV near row {}", rows + 1))?;
        rows += 1;
    }

    std::fs::write(path, format!("{BOM}{body}"))
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), rows, "export saved");
    Ok(rows)
}

/// Turns a CSV file with name and repo columns into the line-per-student
/// text the import endpoint accepts. Rows missing either field are dropped.
pub fn read_import_file(path: &Path) -> anyhow::Result<String> {
    #[derive(Deserialize)]
    struct ImportRow {
        #[serde(alias = "姓名")]
        name: String,
        #[serde(alias = "仓库链接", alias = "仓库")]
        repo: String,
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(raw.trim_start_matches(BOM).as_bytes());

    let mut lines = Vec::new();
    for (index, result) in reader.deserialize::<ImportRow>().enumerate() {
        let row = result.with_context(|| format!("invalid row {} in {}", index + 1, path.display()))?;
        if row.name.is_empty() || row.repo.is_empty() {
            warn!(row = index + 1, "skipping import row with empty field");
            continue;
        }
        lines.push(format!("{},{}", row.name, row.repo));
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn export_name_uses_iso_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(export_file_name(date), "students_scores_2024-03-09.csv");
    }

    #[test]
    fn export_is_validated_and_written_with_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let artifact = "姓名,仓库链接,平均分\nAlice,https://github.com/alice/hw,80.0\nBob,https://github.com/bob/hw,0.0\n";

        let rows = save_export(artifact, &path).unwrap();
        assert_eq!(rows, 2);
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with(BOM));
        assert_eq!(written.trim_start_matches(BOM), artifact);
    }

    #[test]
    fn ragged_export_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        assert!(save_export("a,b\n1,2,3\n", &path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn import_file_accepts_chinese_headers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{BOM}姓名,仓库链接\n张伟 , https://github.com/zw/hw\n,https://github.com/nobody/hw\nBob,https://github.com/bob/hw\n"
        )
        .unwrap();

        let text = read_import_file(file.path()).unwrap();
        assert_eq!(
            text,
            "张伟,https://github.com/zw/hw\nBob,https://github.com/bob/hw"
        );
    }

    #[test]
    fn import_file_with_english_headers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "name,repo\nAlice,https://github.com/alice/hw\n").unwrap();
        assert_eq!(
            read_import_file(file.path()).unwrap(),
            "Alice,https://github.com/alice/hw"
        );
    }
}
