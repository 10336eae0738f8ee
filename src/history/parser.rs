//! VCSのログテキストを変更セットの列に変換するモジュール
//!
//! 入力は次のレコードの繰り返しです：
//!
//! ```text
//! START_HEADER
//! <コミットハッシュ>
//! <コミッター名>
//! <日時（ISO-8601）>
//! <空白区切りの親ハッシュ（空の場合あり）>
//! <コメント（1行以上）>
//! END_HEADER
//! <変更項目の行>*
//! ```
//!
//! 変更項目の行はタブ区切りで、先頭がステータス（`A`, `M`, `D`, `DD`, `T`,
//! `R<類似度>`, `C<類似度>`）、続いてパスです。

use super::codec::{decode_escaped_path, decode_misencoded_utf8};
use super::error::HistoryError;
use super::graph::CommitGraph;
use super::model::{ChangeItem, ChangeKind, ChangeSet, ChangeSetHistory, WorkItem};
use chrono::{DateTime, FixedOffset};
use regex::Regex;
use std::path::PathBuf;
use tracing::debug;

pub const START_HEADER: &str = "START_HEADER";
pub const END_HEADER: &str = "END_HEADER";

/// リポジトリ相対のパスをローカルのファイルシステム上のパスに変換する
pub trait PathMapping: Sync {
    fn map_to_local_path(&self, server_path: &str) -> String;
}

impl<F> PathMapping for F
where
    F: Fn(&str) -> String + Sync,
{
    fn map_to_local_path(&self, server_path: &str) -> String {
        self(server_path)
    }
}

/// 作業ディレクトリを基点にパスを解決する `PathMapping`
#[derive(Debug, Clone)]
pub struct WorkdirMapping {
    root: PathBuf,
}

impl WorkdirMapping {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl PathMapping for WorkdirMapping {
    fn map_to_local_path(&self, server_path: &str) -> String {
        server_path
            .split('/')
            .fold(self.root.clone(), |path, segment| path.join(segment))
            .to_string_lossy()
            .into_owned()
    }
}

/// パーサーの動作設定
///
/// # フィールド
///
/// - `work_item_pattern`: コメントから作業項目を抽出する正規表現。キャプチャグループが
///   ある場合は最初のグループ、ない場合はマッチ全体を作業項目とします
/// - `repair_author_encoding`: コミッター名の文字化けを修復するかどうか
#[derive(Debug, Clone, Default)]
pub struct ParserOptions {
    pub work_item_pattern: Option<Regex>,
    pub repair_author_encoding: bool,
}

impl ParserOptions {
    /// 正規表現の文字列から設定を作成します。空文字列は抽出なしとして扱います
    ///
    /// # エラー
    ///
    /// 正規表現が不正な場合は `InvalidPattern` を返します。
    pub fn new(
        work_item_pattern: Option<&str>,
        repair_author_encoding: bool,
    ) -> Result<Self, HistoryError> {
        let work_item_pattern = work_item_pattern
            .filter(|pattern| !pattern.is_empty())
            .map(Regex::new)
            .transpose()
            .map_err(|e| HistoryError::InvalidPattern(e.to_string()))?;

        Ok(Self {
            work_item_pattern,
            repair_author_encoding,
        })
    }
}

pub struct LogParser<'m> {
    mapping: &'m dyn PathMapping,
    options: ParserOptions,
}

impl<'m> LogParser<'m> {
    pub fn new(mapping: &'m dyn PathMapping, options: ParserOptions) -> Self {
        Self { mapping, options }
    }

    /// ログテキストを解析し、日付の降順に並んだ履歴を返します
    ///
    /// # 引数
    ///
    /// - `log`: ログコマンドの出力
    /// - `graph`: 指定した場合、各コミットとその親の辺をグラフに追加します
    ///
    /// # 戻り値
    ///
    /// `START_HEADER` が1つも含まれない入力に対しては空の履歴を返します。
    /// 単一ファイルのログ問い合わせでは、VCSが何も出力しないことがあるためです。
    ///
    /// # エラー
    ///
    /// 書式に従わないレコードや未知のステータスがある場合は `Format` を返します。
    pub fn parse(
        &self,
        log: &str,
        mut graph: Option<&mut CommitGraph>,
    ) -> Result<ChangeSetHistory, HistoryError> {
        let lines: Vec<&str> = log.lines().collect();

        let Some(first) = lines.iter().position(|line| *line == START_HEADER) else {
            return Ok(ChangeSetHistory::default());
        };
        if let Some(stray) = lines[..first].iter().position(|line| !line.trim().is_empty()) {
            return Err(HistoryError::format(stray + 1, "text before first record"));
        }

        let mut change_sets = Vec::new();
        let mut cursor = first;
        while cursor < lines.len() {
            let (change_set, parents, next) = self.parse_record(&lines, cursor)?;
            if let Some(graph) = graph.as_mut() {
                graph.add_edge(&change_set.id, &parents);
            }
            change_sets.push(change_set);
            cursor = next;
        }

        debug!(change_sets = change_sets.len(), "parsed log");
        Ok(ChangeSetHistory::new(change_sets))
    }

    /// `start` 行目の `START_HEADER` から始まるレコードを1つ解析します
    ///
    /// 変更セット、親ハッシュ、次のレコードの開始位置を返します。
    fn parse_record(
        &self,
        lines: &[&str],
        start: usize,
    ) -> Result<(ChangeSet, Vec<String>, usize), HistoryError> {
        let field = |offset: usize, name: &str| header_field(lines, start + offset, name);

        let hash = field(1, "commit hash")?.trim();
        if hash.is_empty() {
            return Err(HistoryError::format(start + 2, "empty commit hash"));
        }
        let committer = field(2, "committer")?;
        let date = parse_date(field(3, "date")?.trim())
            .ok_or_else(|| HistoryError::format(start + 4, "invalid date"))?;
        let parents: Vec<String> = field(4, "parent hashes")?
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let comment_start = start + 5;
        let end = lines[comment_start.min(lines.len())..]
            .iter()
            .position(|line| *line == END_HEADER || *line == START_HEADER)
            .map(|offset| comment_start + offset)
            .filter(|&i| lines[i] == END_HEADER)
            .ok_or_else(|| HistoryError::format(start + 1, "missing END_HEADER"))?;
        let comment = lines[comment_start..end].join("\n").trim_end().to_string();

        let mut items = Vec::new();
        let mut cursor = end + 1;
        while cursor < lines.len() && lines[cursor] != START_HEADER {
            let line = lines[cursor];
            if !line.trim().is_empty() {
                items.push(self.parse_item(line, cursor + 1)?);
            }
            cursor += 1;
        }

        let committer = if self.options.repair_author_encoding {
            decode_misencoded_utf8(committer)
        } else {
            committer.to_string()
        };

        let change_set = ChangeSet {
            id: hash.to_string(),
            committer,
            date,
            work_items: self.extract_work_items(&comment),
            comment,
            items,
        };
        Ok((change_set, parents, cursor))
    }

    fn parse_item(&self, line: &str, line_no: usize) -> Result<ChangeItem, HistoryError> {
        let fields: Vec<&str> = line.split('\t').collect();
        let status = fields[0].trim();

        let kind = match status {
            s if s.starts_with('R') => ChangeKind::Rename,
            s if s.starts_with('C') => ChangeKind::Copy,
            "A" => ChangeKind::Add,
            "D" | "DD" => ChangeKind::Delete,
            "M" => ChangeKind::Edit,
            "T" => ChangeKind::TypeChanged,
            other => {
                return Err(HistoryError::format(
                    line_no,
                    format!("unknown status '{}'", other),
                ))
            }
        };

        let (server_path, from_server_path) = if kind.has_source() {
            if fields.len() != 3 {
                return Err(HistoryError::format(
                    line_no,
                    format!("{} expects a source and a destination path", status),
                ));
            }
            (
                decode_escaped_path(fields[2]),
                Some(decode_escaped_path(fields[1])),
            )
        } else {
            if !(2..=3).contains(&fields.len()) {
                return Err(HistoryError::format(
                    line_no,
                    format!("{} expects a single path", status),
                ));
            }
            (decode_escaped_path(fields[1]), None)
        };

        let local_path = self.mapping.map_to_local_path(&server_path);
        ChangeItem::new(kind, server_path, from_server_path, local_path)
    }

    fn extract_work_items(&self, comment: &str) -> Vec<WorkItem> {
        let Some(pattern) = &self.options.work_item_pattern else {
            return Vec::new();
        };

        pattern
            .captures_iter(comment)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
            .map(|m| WorkItem(m.as_str().to_string()))
            .collect()
    }
}

fn header_field<'a>(
    lines: &[&'a str],
    index: usize,
    name: &str,
) -> Result<&'a str, HistoryError> {
    match lines.get(index) {
        Some(&line) if line != START_HEADER && line != END_HEADER => Ok(line),
        _ => Err(HistoryError::format(index + 1, format!("missing {}", name))),
    }
}

fn parse_date(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S %z"))
        .ok()
}
