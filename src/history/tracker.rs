//! ファイルの移動を追跡し、各変更項目に系譜のIDを割り当てるモジュール
//!
//! 変更セットは新しいものから古いものへ（パーサーが出力する順に）処理します。
//! 状態として「このパスを現在占めている系譜のID」を保持し、古い変更セットは
//! その対応を引き継ぎます。1つの変更セットは次の3段階で処理されます：
//!
//! 1. 開始: 変更セット内の曖昧な操作（削除とコピーの組、コピーの分岐）を正規化
//! 2. 項目ごとの解決: 種類に応じてIDを割り当て、対応表を更新
//! 3. 終了: 保留していた移動をまとめて適用
//!
//! 正規化や降格を行った場合は警告を記録します。これらはエラーではありません。

use super::model::{ChangeItem, ChangeKind, ChangeSet, ChangeSetHistory, Id, IdSource};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// パスに対する系譜の割り当て
#[derive(Debug, Clone)]
struct Claim {
    id: Id,
    /// 割り当てが行われた変更セットの通し番号
    since: usize,
}

#[derive(Debug, Clone)]
struct PendingMove {
    to: String,
    from: String,
    id: Id,
}

/// 変更セットを新しい順に受け取り、変更項目にIDを割り当てる状態機械
///
/// # フィールド
///
/// - `ids`: 新しい系譜に割り当てるIDの払い出し元
/// - `claims`: パスごとの現在の系譜
/// - `change_set_no`: 処理中の変更セットの通し番号（1始まり）
/// - `pending_moves`: 変更セットの終了時に適用する移動
/// - `set_paths`: 処理中の変更セットに現れるパス
/// - `warnings`: 適用したヒューリスティックの記録
#[derive(Debug, Default)]
pub struct MovementTracker {
    ids: IdSource,
    claims: HashMap<String, Claim>,
    change_set_no: usize,
    pending_moves: Vec<PendingMove>,
    set_paths: HashSet<String>,
    warnings: Vec<String>,
}

impl MovementTracker {
    pub fn new(ids: IdSource) -> Self {
        Self {
            ids,
            ..Self::default()
        }
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<String> {
        self.warnings
    }

    /// 指定したパスを現在占めている系譜のID
    pub fn current_id(&self, server_path: &str) -> Option<&Id> {
        self.claims.get(server_path).map(|claim| &claim.id)
    }

    /// 履歴全体を新しい順に処理します
    pub fn apply_history(&mut self, history: &mut ChangeSetHistory) {
        for change_set in history.iter_mut() {
            self.apply(change_set);
        }
    }

    /// 1つの変更セットを処理します
    ///
    /// 削除とコピーの組を移動にまとめる処理とコピーの分岐の降格を行った後、
    /// 各項目にIDを割り当てます。移動にまとめられた削除の項目には、その移動と
    /// 同じIDが割り当てられます。
    pub fn apply(&mut self, change_set: &mut ChangeSet) {
        self.begin_change_set();
        self.set_paths = change_set
            .items
            .iter()
            .map(|item| item.server_path().to_string())
            .collect();

        let paired_deletes = self.disambiguate(change_set);

        for (index, item) in change_set.items.iter_mut().enumerate() {
            if !paired_deletes.contains_key(&index) {
                self.track(item);
            }
        }

        for (delete, rename) in paired_deletes {
            let renamed = &change_set.items[rename];
            match (renamed.kind(), renamed.id().cloned()) {
                (ChangeKind::Rename, Some(id)) => change_set.items[delete].set_id(id),
                _ => self.track(&mut change_set.items[delete]),
            }
        }

        self.end_change_set();
    }

    pub fn begin_change_set(&mut self) {
        self.change_set_no += 1;
        self.pending_moves.clear();
        self.set_paths.clear();
    }

    /// 変更項目1つにIDを割り当て、パスと系譜の対応を更新します
    pub fn track(&mut self, item: &mut ChangeItem) {
        if item.kind() == ChangeKind::Rename && self.is_claimed_elsewhere(item) {
            self.record_warning(format!(
                "'{}' is still edited after it was renamed to '{}'; treating the rename as an add",
                item.from_server_path().unwrap_or_default(),
                item.server_path()
            ));
            item.demote_to_add();
        }

        let path = item.server_path().to_string();
        match item.kind() {
            ChangeKind::Add | ChangeKind::Copy => {
                // 追加より古い履歴にこのパスの続きは存在しない
                let id = self.resolve(&path);
                self.claims.remove(&path);
                item.set_id(id);
            }
            ChangeKind::Edit | ChangeKind::TypeChanged | ChangeKind::None => {
                let id = self.resolve(&path);
                item.set_id(id);
            }
            ChangeKind::Delete => {
                // 削除より新しい時点でこのパスを占めていたファイルは無関係
                self.claims.remove(&path);
                let id = self.resolve(&path);
                item.set_id(id);
            }
            ChangeKind::Rename => {
                let id = self.resolve(&path);
                let from = item.from_server_path().unwrap_or_default().to_string();
                self.pending_moves.push(PendingMove {
                    to: path,
                    from,
                    id: id.clone(),
                });
                item.set_id(id);
            }
        }
    }

    /// 保留していた移動を一括で適用します
    ///
    /// 同じ変更セット内の移動同士が干渉しないよう、移動先の割り当てをすべて
    /// 外してから移動元に割り当てます。
    pub fn end_change_set(&mut self) {
        let moves = std::mem::take(&mut self.pending_moves);
        for pending in &moves {
            self.claims.remove(&pending.to);
        }
        for pending in moves {
            self.claims.insert(
                pending.from,
                Claim {
                    id: pending.id,
                    since: self.change_set_no,
                },
            );
        }
    }

    fn resolve(&mut self, path: &str) -> Id {
        if let Some(claim) = self.claims.get(path) {
            return claim.id.clone();
        }
        let id = self.ids.next_id();
        self.claims.insert(
            path.to_string(),
            Claim {
                id: id.clone(),
                since: self.change_set_no,
            },
        );
        id
    }

    /// 移動元のパスが、より新しい変更セットで別の系譜に使われ続けているかどうか
    fn is_claimed_elsewhere(&self, item: &ChangeItem) -> bool {
        let Some(from) = item.from_server_path() else {
            return false;
        };
        if from == item.server_path() || self.set_paths.contains(from) {
            return false;
        }
        self.claims
            .get(from)
            .is_some_and(|claim| claim.since < self.change_set_no)
    }

    /// 変更セット内の曖昧な操作を正規化します
    ///
    /// # 戻り値
    ///
    /// 移動にまとめた削除項目の位置から、対応する移動項目の位置への対応
    fn disambiguate(&mut self, change_set: &mut ChangeSet) -> HashMap<usize, usize> {
        let items = &mut change_set.items;

        let mut deleted: HashMap<String, usize> = HashMap::new();
        let mut by_source: IndexMap<String, Vec<usize>> = IndexMap::new();
        for (index, item) in items.iter().enumerate() {
            match (item.kind(), item.from_server_path()) {
                (ChangeKind::Delete, _) => {
                    deleted.entry(item.server_path().to_string()).or_insert(index);
                }
                (ChangeKind::Rename | ChangeKind::Copy, Some(from)) => {
                    by_source.entry(from.to_string()).or_default().push(index);
                }
                _ => {}
            }
        }

        let mut paired = HashMap::new();
        for (from, group) in by_source {
            let deleted_at = deleted.get(&from).copied();

            if let [only] = group[..] {
                if items[only].kind() == ChangeKind::Copy {
                    let Some(delete) = deleted_at else { continue };
                    items[only].convert_copy_to_rename();
                    self.record_warning(format!(
                        "delete of '{}' and copy to '{}' collapsed into a rename",
                        from,
                        items[only].server_path()
                    ));
                    paired.insert(delete, only);
                } else if let Some(delete) = deleted_at {
                    paired.insert(delete, only);
                }
                continue;
            }

            let candidates: Vec<usize> = group
                .iter()
                .copied()
                .filter(|&i| items[i].kind() == ChangeKind::Rename || deleted_at.is_some())
                .collect();
            if candidates.is_empty() {
                // 元のファイルが残っているコピーの分岐は、それぞれ独立した追加として扱われる
                continue;
            }

            let chosen = candidates
                .iter()
                .copied()
                .find(|&i| file_name(items[i].server_path()) == file_name(&from))
                .unwrap_or(candidates[0]);
            if items[chosen].kind() == ChangeKind::Copy {
                items[chosen].convert_copy_to_rename();
            }
            if let Some(delete) = deleted_at {
                paired.insert(delete, chosen);
            }

            for &other in group.iter().filter(|&&i| i != chosen) {
                items[other].demote_to_add();
                self.record_warning(format!(
                    "'{}' is copied to several paths; '{}' continues its history and '{}' is treated as an add",
                    from,
                    items[chosen].server_path(),
                    items[other].server_path()
                ));
            }
        }

        paired
    }

    fn record_warning(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
