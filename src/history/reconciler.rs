//! ファイルごとの履歴を統合し、系譜ごとに一意なIDを持つ履歴を再構築するモジュール
//!
//! Gitのファイル単位のログ（`--follow`）は簡略化された履歴しか返さず、あいまいな
//! 箇所で追跡をやめることもあります。そこで次の手順で全体の履歴を組み立てます：
//!
//! 1. リポジトリ全体のログから完全なコミットグラフを構築
//! 2. 現在追跡されているファイルを列挙
//! 3. ファイルごとのログを並列に取得し、ファイルごとに新しいIDを割り当てて
//!    コミットハッシュをキーとする変更セットの表に統合
//! 4. 同じ変更セット内で同じパスに複数のIDが現れる箇所（共有された履歴）を検出
//! 5. 検出したIDを、そのコミットと全祖先から削除
//! 6. 同じパスが重複する変更セットが残っていないことを検証

use super::error::HistoryError;
use super::graph::CommitGraph;
use super::model::{ChangeKind, ChangeSet, ChangeSetHistory, Id, IdSource};
use super::parser::{LogParser, ParserOptions, PathMapping};
use super::progress::ProgressSink;
use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

/// ログテキストの取得元
///
/// 実装はGitコマンドを呼び出すもの（`GitRepository`）のほか、テスト用の
/// メモリ上のものがあります。ワーカーから同時に呼び出されます。
pub trait LogSource: Sync {
    /// リポジトリ全体のログ
    fn full_log(&self) -> Result<String, HistoryError>;

    /// 1ファイルの移動を追跡したログ
    fn file_log(&self, server_path: &str) -> Result<String, HistoryError>;

    /// 現在追跡されているファイルのリポジトリ相対パス
    fn tracked_files(&self) -> Result<Vec<String>, HistoryError>;
}

/// コミットハッシュから変更セットへの表。ワーカー間で共有されます
#[derive(Debug, Default)]
pub struct SharedChangeSets {
    inner: Mutex<IndexMap<String, ChangeSet>>,
}

impl SharedChangeSets {
    pub fn new() -> Self {
        Self::default()
    }

    /// 変更セットの項目を表に追加します
    ///
    /// コミットが初めて現れた場合は `change_set` を新しい項目として登録し、
    /// 既に存在する場合はその項目の一覧に追加します。
    pub fn merge(&self, change_set: ChangeSet) {
        let mut table = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match table.get_mut(&change_set.id) {
            Some(existing) => existing.items.extend(change_set.items),
            None => {
                table.insert(change_set.id.clone(), change_set);
            }
        }
    }

    pub fn into_inner(self) -> IndexMap<String, ChangeSet> {
        self.inner.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

/// 再構築の結果
#[derive(Debug, Clone, Default)]
pub struct ReconciledHistory {
    pub history: ChangeSetHistory,
    pub warnings: Vec<String>,
}

pub struct HistoryReconciler<'a> {
    source: &'a dyn LogSource,
    mapping: &'a dyn PathMapping,
    options: ParserOptions,
    ids: IdSource,
    threads: usize,
}

impl<'a> HistoryReconciler<'a> {
    pub fn new(
        source: &'a dyn LogSource,
        mapping: &'a dyn PathMapping,
        options: ParserOptions,
    ) -> Self {
        Self {
            source,
            mapping,
            options,
            ids: IdSource::Uuid,
            threads: 0,
        }
    }

    pub fn with_ids(mut self, ids: IdSource) -> Self {
        self.ids = ids;
        self
    }

    /// ワーカースレッド数を指定します。0の場合はrayonの既定値を使います
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// 履歴を再構築します
    ///
    /// # 引数
    ///
    /// - `progress`: ファイルごとの処理が終わるたびに進捗が通知されます
    ///
    /// # エラー
    ///
    /// 以下の場合にエラーを返します：
    /// - ログの取得またはファイル一覧の取得に失敗
    /// - ログの書式が不正
    /// - 共有された履歴を削除した後も同じパスの重複が残っている（`InvariantViolation`）
    pub fn reconcile(
        &self,
        progress: &dyn ProgressSink,
    ) -> Result<ReconciledHistory, HistoryError> {
        let parser = LogParser::new(self.mapping, self.options.clone());

        let mut graph = CommitGraph::new();
        parser.parse(&self.source.full_log()?, Some(&mut graph))?;
        info!(commits = graph.len(), "built commit graph");

        let files = self.source.tracked_files()?;
        let shared = SharedChangeSets::new();
        let current_paths = self.collect_file_histories(&files, &shared, progress)?;

        let mut change_sets = shared.into_inner();
        let mut warnings = Vec::new();
        remove_shared_history(&mut change_sets, &graph, &current_paths, &mut warnings);
        verify_unique_paths(&change_sets)?;

        let change_sets = change_sets
            .into_values()
            .filter(|cs| !cs.items.is_empty())
            .map(|mut cs| {
                cs.items
                    .sort_by(|a, b| a.server_path().cmp(b.server_path()));
                cs
            })
            .collect();

        Ok(ReconciledHistory {
            history: ChangeSetHistory::new(change_sets),
            warnings,
        })
    }

    /// 全ファイルの履歴を並列に取得して表に統合します
    ///
    /// # 戻り値
    ///
    /// 各ファイルに割り当てたIDと、そのファイルの現在のパスの対応
    fn collect_file_histories(
        &self,
        files: &[String],
        shared: &SharedChangeSets,
        progress: &dyn ProgressSink,
    ) -> Result<HashMap<Id, String>, HistoryError> {
        let done = AtomicUsize::new(0);
        let total = files.len();

        let collect = || {
            files
                .par_iter()
                .enumerate()
                .map(|(n, path)| -> Result<(Id, String), HistoryError> {
                    let id = self.ids.nth_id(n as u64);
                    self.collect_file(path, &id, shared)?;

                    let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                    progress.report(&format!("Rebuilding history {}/{}", finished, total));
                    Ok((id, path.clone()))
                })
                .collect::<Result<HashMap<_, _>, _>>()
        };

        if self.threads == 0 {
            return collect();
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| HistoryError::InvalidArgument(e.to_string()))?;
        pool.install(collect)
    }

    /// 1ファイルの系譜を新しい順にたどり、各変更を表に追加します
    fn collect_file(
        &self,
        path: &str,
        id: &Id,
        shared: &SharedChangeSets,
    ) -> Result<(), HistoryError> {
        let parser = LogParser::new(self.mapping, self.options.clone());
        let history = parser.parse(&self.source.file_log(path)?, None)?;

        let mut following = path.to_string();
        for mut change_set in history {
            let Some(position) = change_set
                .items
                .iter()
                .position(|item| item.server_path() == following)
            else {
                continue;
            };
            let mut item = change_set.items.swap_remove(position);

            let kind = item.kind();
            match kind {
                // 削除より古い履歴は、同じパスにあった別のファイルのもの
                ChangeKind::Delete => break,
                // コピーより古い履歴はコピー元の系譜に属する
                ChangeKind::Copy => item.demote_to_add(),
                ChangeKind::Rename => {
                    following = item.from_server_path().unwrap_or_default().to_string();
                }
                _ => {}
            }

            item.set_id(id.clone());
            change_set.items = vec![item];
            shared.merge(change_set);

            if matches!(kind, ChangeKind::Add | ChangeKind::Copy) {
                break;
            }
        }

        debug!(path, "collected file history");
        Ok(())
    }
}

/// 同じ変更セット内で同じパスに複数のIDが現れる箇所を検出し、共有された履歴を削除します
///
/// 衝突したIDのうち、現在のパスが衝突したパスと一致するものがちょうど1つだけ
/// ある場合、そのIDは本来の系譜として残します。該当するIDがない場合は、衝突した
/// パスから最も新しく移動したIDを残し、それより古い移動はコピーとみなします。
/// それ以外のIDは、衝突したコミットとその全祖先から削除し、移動元を失った移動は
/// 追加に変えます。残すIDを決められない場合はすべて削除し、警告を記録します。
///
/// # 引数
///
/// - `change_sets`: コミットハッシュをキーとする変更セットの表
/// - `graph`: リポジトリ全体のコミットグラフ
/// - `current_paths`: 各IDの現在のパス
/// - `warnings`: 警告の追加先
pub fn remove_shared_history(
    change_sets: &mut IndexMap<String, ChangeSet>,
    graph: &CommitGraph,
    current_paths: &HashMap<Id, String>,
    warnings: &mut Vec<String>,
) {
    let mut removals: IndexMap<Id, Vec<(String, String)>> = IndexMap::new();

    for (hash, change_set) in change_sets.iter() {
        let mut by_path: IndexMap<&str, Vec<&Id>> = IndexMap::new();
        for item in &change_set.items {
            if let Some(id) = item.id() {
                let ids = by_path.entry(item.server_path()).or_default();
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }

        for (path, ids) in by_path.into_iter().filter(|(_, ids)| ids.len() > 1) {
            let owners: Vec<&Id> = ids
                .iter()
                .copied()
                .filter(|id| current_paths.get(*id).is_some_and(|p| p == path))
                .collect();
            let survivor = match owners[..] {
                [owner] => Some(owner),
                _ => newest_rename_out(change_sets, &ids, path),
            };

            let message = match survivor {
                Some(_) if owners.len() == 1 => None,
                Some(id) => Some(format!(
                    "history of '{}' at {} is kept for lineage {} that moved it last; the other {} are treated as copies",
                    path,
                    hash,
                    id,
                    ids.len() - 1
                )),
                None => Some(format!(
                    "history of '{}' at {} is shared by {} lineages and none can be kept",
                    path,
                    hash,
                    ids.len()
                )),
            };
            if let Some(message) = message {
                warn!("{}", message);
                warnings.push(message);
            }

            for id in ids.into_iter().filter(|id| Some(*id) != survivor) {
                removals
                    .entry(id.clone())
                    .or_default()
                    .push((hash.clone(), path.to_string()));
            }
        }
    }

    for (id, starts) in removals {
        let mut removed = 0;
        let mut visited: HashSet<&str> = HashSet::new();

        // 完全なグラフに存在しないコミットでも、起点そのものからは削除する
        let ancestors = graph.ancestors(starts.iter().map(|(hash, _)| hash.as_str()));
        let hashes = starts
            .iter()
            .map(|(hash, _)| hash.as_str())
            .chain(ancestors.into_iter().map(|i| graph.node(i).hash()));

        for hash in hashes {
            if !visited.insert(hash) {
                continue;
            }
            if let Some(change_set) = change_sets.get_mut(hash) {
                let before = change_set.items.len();
                change_set.items.retain(|item| item.id() != Some(&id));
                removed += before - change_set.items.len();
            }
        }

        // 移動元の履歴を失った移動は、その系譜の始まりとなる追加として扱う
        for change_set in change_sets.values_mut() {
            for item in change_set.items.iter_mut().filter(|item| {
                item.id() == Some(&id)
                    && item.kind() == ChangeKind::Rename
                    && starts
                        .iter()
                        .any(|(_, path)| item.from_server_path() == Some(path.as_str()))
            }) {
                item.demote_to_add();
            }
        }
        debug!(%id, removed, "removed shared history");
    }
}

/// 衝突したパスから最も新しく移動した系譜を返します
///
/// 別の系譜がまだそのパスを使っている間に行われた移動は、実際にはコピーです。
/// 最も新しい移動が1つに決まらない場合は `None` を返します。
fn newest_rename_out<'a>(
    change_sets: &IndexMap<String, ChangeSet>,
    ids: &[&'a Id],
    path: &str,
) -> Option<&'a Id> {
    let mut renamed: Vec<(DateTime<FixedOffset>, &'a Id)> = ids
        .iter()
        .filter_map(|&id| {
            change_sets
                .values()
                .filter(|cs| {
                    cs.items.iter().any(|item| {
                        item.id() == Some(id)
                            && item.kind() == ChangeKind::Rename
                            && item.from_server_path() == Some(path)
                    })
                })
                .map(|cs| cs.date)
                .max()
                .map(|date| (date, id))
        })
        .collect();
    renamed.sort_by(|a, b| b.0.cmp(&a.0));

    match renamed[..] {
        [(_, id)] => Some(id),
        [(newest, id), (next, _), ..] if newest > next => Some(id),
        _ => None,
    }
}

/// 同じパスの項目を複数含む変更セットがないことを検証します
///
/// # エラー
///
/// 重複が残っている場合は `InvariantViolation` を返します。共有された履歴の
/// 削除が不完全であることを示すため、回復を試みてはいけません。
pub fn verify_unique_paths(
    change_sets: &IndexMap<String, ChangeSet>,
) -> Result<(), HistoryError> {
    for (hash, change_set) in change_sets {
        if let Some(path) = change_set.duplicate_server_path() {
            let message = format!("'{}' appears more than once in {}", path, hash);
            error!("{}", message);
            return Err(HistoryError::InvariantViolation(message));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::model::ChangeItem;
    use crate::history::progress::NoProgress;
    use chrono::DateTime;

    /// メモリ上のログを返す `LogSource`
    struct FakeSource {
        full: String,
        files: Vec<(String, String)>,
    }

    impl LogSource for FakeSource {
        fn full_log(&self) -> Result<String, HistoryError> {
            Ok(self.full.clone())
        }

        fn file_log(&self, server_path: &str) -> Result<String, HistoryError> {
            self.files
                .iter()
                .find(|(path, _)| path == server_path)
                .map(|(_, log)| log.clone())
                .ok_or_else(|| HistoryError::Vcs(format!("no log for {}", server_path)))
        }

        fn tracked_files(&self) -> Result<Vec<String>, HistoryError> {
            Ok(self.files.iter().map(|(path, _)| path.clone()).collect())
        }
    }

    fn record(hash: &str, day: u32, parents: &str, items: &[&str]) -> String {
        format!(
            "START_HEADER\n{}\ndev\n2024-01-{:02}T00:00:00Z\n{}\ncommit {}\nEND_HEADER\n{}\n",
            hash,
            day,
            parents,
            hash,
            items.join("\n")
        )
    }

    fn identity(path: &str) -> String {
        path.to_string()
    }

    fn reconcile(source: &FakeSource) -> ReconciledHistory {
        HistoryReconciler::new(source, &identity, ParserOptions::default())
            .with_ids(IdSource::Sequential(1))
            .with_threads(2)
            .reconcile(&NoProgress)
            .unwrap()
    }

    #[test]
    fn test_add_rename_edit_is_one_lineage() {
        let full = [
            record("c3", 3, "c2", &["M\tA_renamed.txt"]),
            record("c2", 2, "c1", &["R100\tA.txt\tA_renamed.txt"]),
            record("c1", 1, "", &["A\tA.txt"]),
        ]
        .concat();
        let source = FakeSource {
            full: full.clone(),
            files: vec![("A_renamed.txt".to_string(), full)],
        };

        let result = reconcile(&source);
        let history = result.history;
        assert_eq!(history.len(), 3);

        let kinds: Vec<_> = history.iter().rev().map(|cs| cs.items[0].kind()).collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Add, ChangeKind::Rename, ChangeKind::Edit]
        );
        let ids: HashSet<_> = history.iter().map(|cs| cs.items[0].id().cloned()).collect();
        assert_eq!(ids.len(), 1);

        let files = history.tracked_files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].server_path, "A_renamed.txt");
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_files_touched_by_same_commit_are_merged() {
        let full = [
            record("c2", 2, "c1", &["M\ta.rs", "M\tb.rs"]),
            record("c1", 1, "", &["A\ta.rs", "A\tb.rs"]),
        ]
        .concat();
        let source = FakeSource {
            full,
            files: vec![
                (
                    "a.rs".to_string(),
                    [
                        record("c2", 2, "c1", &["M\ta.rs"]),
                        record("c1", 1, "", &["A\ta.rs"]),
                    ]
                    .concat(),
                ),
                (
                    "b.rs".to_string(),
                    [
                        record("c2", 2, "c1", &["M\tb.rs"]),
                        record("c1", 1, "", &["A\tb.rs"]),
                    ]
                    .concat(),
                ),
            ],
        };

        let history = reconcile(&source).history;
        assert_eq!(history.len(), 2);
        for change_set in history.iter() {
            let paths: Vec<_> = change_set.items.iter().map(|i| i.server_path()).collect();
            assert_eq!(paths, vec!["a.rs", "b.rs"]);
            assert_ne!(change_set.items[0].id(), change_set.items[1].id());
        }
    }

    #[test]
    fn test_copy_detected_as_rename_keeps_original_lineage() {
        let full = [
            record("c4", 4, "c3", &["M\tA"]),
            record("c3", 3, "c2", &["A\tB"]),
            record("c2", 2, "c1", &["M\tA"]),
            record("c1", 1, "", &["A\tA"]),
        ]
        .concat();
        let source = FakeSource {
            full,
            files: vec![
                (
                    "A".to_string(),
                    [
                        record("c4", 4, "c3", &["M\tA"]),
                        record("c2", 2, "c1", &["M\tA"]),
                        record("c1", 1, "", &["A\tA"]),
                    ]
                    .concat(),
                ),
                (
                    "B".to_string(),
                    [
                        record("c3", 3, "c2", &["R090\tA\tB"]),
                        record("c2", 2, "c1", &["M\tA"]),
                        record("c1", 1, "", &["A\tA"]),
                    ]
                    .concat(),
                ),
            ],
        };

        let history = reconcile(&source).history;
        let lineage_of_a = Id::Numeric(1);
        let lineage_of_b = Id::Numeric(2);

        for change_set in history.iter() {
            assert_eq!(change_set.duplicate_server_path(), None);
            for item in &change_set.items {
                let expected = if item.server_path() == "A" {
                    &lineage_of_a
                } else {
                    &lineage_of_b
                };
                assert_eq!(item.id(), Some(expected), "commit {}", change_set.id);
            }
        }
        assert_eq!(history.len(), 4);
    }

    #[test]
    fn test_delete_stops_following_and_copy_becomes_add() {
        let full = [
            record("c4", 4, "c3", &["M\tp"]),
            record("c3", 3, "c2", &["A\tp"]),
            record("c2", 2, "c1", &["D\tp"]),
            record("c1", 1, "", &["A\tp", "A\tsrc"]),
        ]
        .concat();
        let source = FakeSource {
            full: full.clone(),
            files: vec![
                ("p".to_string(), full),
                (
                    "q".to_string(),
                    record("c5", 5, "c4", &["C100\tsrc\tq"]),
                ),
            ],
        };

        let history = reconcile(&source).history;
        let ids: Vec<_> = history.iter().map(|cs| cs.id.as_str()).collect();
        assert_eq!(ids, vec!["c5", "c4", "c3"]);

        let copied = &history.change_sets()[0].items[0];
        assert_eq!(copied.kind(), ChangeKind::Add);
        assert_eq!(copied.from_server_path(), None);
    }

    #[test]
    fn test_empty_file_log_is_not_an_error() {
        let source = FakeSource {
            full: record("c1", 1, "", &["A\tx"]),
            files: vec![("x".to_string(), String::new())],
        };
        assert!(reconcile(&source).history.is_empty());
    }

    fn shared_change_set(hash: &str, items: &[(u64, &str)]) -> ChangeSet {
        ChangeSet {
            id: hash.to_string(),
            committer: "dev".to_string(),
            date: DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap(),
            comment: String::new(),
            work_items: vec![],
            items: items
                .iter()
                .map(|(id, path)| {
                    let mut item = ChangeItem::new(ChangeKind::Edit, *path, None, *path).unwrap();
                    item.set_id(Id::Numeric(*id));
                    item
                })
                .collect(),
        }
    }

    #[test]
    fn test_shared_history_is_removed_from_all_ancestors() {
        let mut graph = CommitGraph::new();
        graph.add_edge("child", &["parent"]);
        graph.add_edge("parent", &["root"]);
        graph.add_edge("root", &[] as &[&str]);

        let mut change_sets: IndexMap<String, ChangeSet> = [
            shared_change_set("child", &[(1, "p"), (2, "p"), (3, "other")]),
            shared_change_set("parent", &[(1, "p"), (2, "p")]),
        ]
        .into_iter()
        .map(|cs| (cs.id.clone(), cs))
        .collect();

        let mut warnings = Vec::new();
        remove_shared_history(&mut change_sets, &graph, &HashMap::new(), &mut warnings);

        for change_set in change_sets.values() {
            assert!(change_set
                .items
                .iter()
                .all(|item| !matches!(item.id(), Some(Id::Numeric(1 | 2)))));
        }
        assert_eq!(change_sets["child"].items.len(), 1);
        assert!(!warnings.is_empty());
        assert!(verify_unique_paths(&change_sets).is_ok());
    }

    #[test]
    fn test_shared_history_walks_commits_missing_from_file_logs() {
        // mid は簡略化されたファイルのログに現れないが、完全なグラフには存在する
        let mut graph = CommitGraph::new();
        graph.add_edge("top", &["mid"]);
        graph.add_edge("mid", &["bottom"]);

        let mut change_sets: IndexMap<String, ChangeSet> = [
            shared_change_set("top", &[(1, "p"), (2, "p")]),
            shared_change_set("bottom", &[(2, "p")]),
        ]
        .into_iter()
        .map(|cs| (cs.id.clone(), cs))
        .collect();

        let current_paths = HashMap::from([(Id::Numeric(1), "p".to_string())]);
        let mut warnings = Vec::new();
        remove_shared_history(&mut change_sets, &graph, &current_paths, &mut warnings);

        assert_eq!(change_sets["top"].items.len(), 1);
        assert_eq!(change_sets["top"].items[0].id(), Some(&Id::Numeric(1)));
        assert!(change_sets["bottom"].items.is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_shared_origin_is_kept_for_lineage_that_moved_last() {
        let full = [
            record("c3", 3, "c2", &["R100\tA.txt\tA2.txt"]),
            record("c2", 2, "c1", &["C100\tA.txt\tB.txt"]),
            record("c1", 1, "", &["A\tA.txt"]),
        ]
        .concat();
        let source = FakeSource {
            full,
            files: vec![
                (
                    "A2.txt".to_string(),
                    [
                        record("c3", 3, "c2", &["R100\tA.txt\tA2.txt"]),
                        record("c1", 1, "", &["A\tA.txt"]),
                    ]
                    .concat(),
                ),
                (
                    "B.txt".to_string(),
                    [
                        record("c2", 2, "c1", &["R100\tA.txt\tB.txt"]),
                        record("c1", 1, "", &["A\tA.txt"]),
                    ]
                    .concat(),
                ),
            ],
        };

        let result = reconcile(&source);
        let history = result.history;
        assert_eq!(history.len(), 3);

        let origin = history.iter().find(|cs| cs.id == "c1").unwrap();
        assert_eq!(origin.items.len(), 1);
        assert_eq!(origin.items[0].kind(), ChangeKind::Add);
        assert_eq!(origin.items[0].id(), Some(&Id::Numeric(1)));

        let copy = history.iter().find(|cs| cs.id == "c2").unwrap();
        assert_eq!(copy.items[0].kind(), ChangeKind::Add);
        assert_eq!(copy.items[0].from_server_path(), None);
        assert_eq!(copy.items[0].id(), Some(&Id::Numeric(2)));

        let files = history.tracked_files();
        let paths: Vec<_> = files.iter().map(|f| f.server_path.as_str()).collect();
        assert_eq!(paths, vec!["A2.txt", "B.txt"]);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_verify_unique_paths_fails_loudly() {
        let change_sets: IndexMap<String, ChangeSet> =
            [shared_change_set("c", &[(1, "p"), (2, "p")])]
                .into_iter()
                .map(|cs| (cs.id.clone(), cs))
                .collect();

        assert!(matches!(
            verify_unique_paths(&change_sets),
            Err(HistoryError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_shared_change_sets_merge() {
        let shared = SharedChangeSets::new();
        shared.merge(shared_change_set("c", &[(1, "a")]));
        shared.merge(shared_change_set("c", &[(2, "b")]));
        shared.merge(shared_change_set("d", &[(1, "a")]));

        let table = shared.into_inner();
        assert_eq!(table.len(), 2);
        assert_eq!(table["c"].items.len(), 2);
    }
}
