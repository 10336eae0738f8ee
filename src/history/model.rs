//! 変更履歴を表現するデータ構造と、そのシリアライズを担当するモジュール
//!
//! キャッシュファイルのスキーマは以下の通りです（フィールド名はPascalCase）：
//!
//! - 変更セット: `Id`, `Committer`, `Date`（ISO-8601）, `Comment`, `WorkItems`, `Items`
//! - 変更項目: `Id`, `Kind`（列挙子名の文字列）, `ServerPath`, `FromServerPath`（null可）, `LocalPath`

use super::error::HistoryError;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// ファイル系譜の識別子
///
/// リビジョン番号を持つVCS向けの数値IDと、UUIDなどの文字列IDの2種類があります。
/// 種類が異なるIDは値が同じに見えても等しくなりません。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Numeric(u64),
    Text(String),
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Numeric(n) => write!(f, "{}", n),
            Id::Text(s) => write!(f, "{}", s),
        }
    }
}

/// 新しいIDの払い出し方法
#[derive(Debug, Clone, Default)]
pub enum IdSource {
    /// UUID v4の文字列ID
    #[default]
    Uuid,
    /// 指定した値から始まる連番の数値ID
    Sequential(u64),
}

impl IdSource {
    pub fn next_id(&mut self) -> Id {
        match self {
            IdSource::Uuid => Id::Text(uuid::Uuid::new_v4().to_string()),
            IdSource::Sequential(next) => {
                let id = *next;
                *next += 1;
                Id::Numeric(id)
            }
        }
    }

    /// 状態を変更せずに `n` 番目のIDを返します
    ///
    /// 並列処理のワーカーがそれぞれの担当番号からIDを得るために使います。
    /// `Uuid` の場合は `n` に関係なく新しいIDを返します。
    pub fn nth_id(&self, n: u64) -> Id {
        match self {
            IdSource::Uuid => Id::Text(uuid::Uuid::new_v4().to_string()),
            IdSource::Sequential(start) => Id::Numeric(start + n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Add,
    Edit,
    Delete,
    Rename,
    Copy,
    TypeChanged,
    None,
}

impl ChangeKind {
    /// 移動元パスを持つ種類かどうか
    pub fn has_source(self) -> bool {
        matches!(self, ChangeKind::Rename | ChangeKind::Copy)
    }
}

/// 変更セット内の1ファイルに対する操作
///
/// `from_server_path` は種類が `Rename` または `Copy` のときに限り設定されます。
/// この不変条件はコンストラクタとデシリアライズの両方で検証されます。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", try_from = "RawChangeItem")]
pub struct ChangeItem {
    id: Option<Id>,
    kind: ChangeKind,
    server_path: String,
    from_server_path: Option<String>,
    local_path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawChangeItem {
    id: Option<Id>,
    kind: ChangeKind,
    server_path: String,
    from_server_path: Option<String>,
    local_path: String,
}

impl TryFrom<RawChangeItem> for ChangeItem {
    type Error = HistoryError;

    fn try_from(raw: RawChangeItem) -> Result<Self, Self::Error> {
        let mut item = ChangeItem::new(
            raw.kind,
            raw.server_path,
            raw.from_server_path,
            raw.local_path,
        )?;
        item.id = raw.id;
        Ok(item)
    }
}

impl ChangeItem {
    /// 新しい変更項目を作成します
    ///
    /// # エラー
    ///
    /// 移動元パスの有無が種類と矛盾する場合は `InvalidArgument` を返します。
    pub fn new(
        kind: ChangeKind,
        server_path: impl Into<String>,
        from_server_path: Option<String>,
        local_path: impl Into<String>,
    ) -> Result<Self, HistoryError> {
        let server_path = server_path.into();
        if kind.has_source() != from_server_path.is_some() {
            return Err(HistoryError::InvalidArgument(format!(
                "{:?} of '{}' {} a source path",
                kind,
                server_path,
                if from_server_path.is_some() {
                    "must not have"
                } else {
                    "requires"
                }
            )));
        }

        Ok(Self {
            id: None,
            kind,
            server_path,
            from_server_path,
            local_path: local_path.into(),
        })
    }

    pub fn id(&self) -> Option<&Id> {
        self.id.as_ref()
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn server_path(&self) -> &str {
        &self.server_path
    }

    pub fn from_server_path(&self) -> Option<&str> {
        self.from_server_path.as_deref()
    }

    pub fn local_path(&self) -> &str {
        &self.local_path
    }

    pub fn set_id(&mut self, id: Id) {
        self.id = Some(id);
    }

    /// コピーを同一系譜の移動として扱うように変換します
    pub(crate) fn convert_copy_to_rename(&mut self) {
        debug_assert_eq!(self.kind, ChangeKind::Copy);
        self.kind = ChangeKind::Rename;
    }

    /// 系譜の起点として扱うため、種類を `Add` にして移動元を捨てます
    pub(crate) fn demote_to_add(&mut self) {
        self.kind = ChangeKind::Add;
        self.from_server_path = None;
    }
}

/// コミットメッセージから抽出されたチケット番号などの作業項目
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItem(pub String);

/// 1つのコミット（リビジョン）とそのファイル操作の一覧
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChangeSet {
    pub id: String,
    pub committer: String,
    pub date: DateTime<FixedOffset>,
    pub comment: String,
    pub work_items: Vec<WorkItem>,
    pub items: Vec<ChangeItem>,
}

impl ChangeSet {
    /// 同じ `ServerPath` を持つ項目が複数存在する場合、そのパスを返します
    pub fn duplicate_server_path(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        self.items
            .iter()
            .map(ChangeItem::server_path)
            .find(|path| !seen.insert(*path))
    }
}

/// 日付の降順（新しいものが先頭）に並んだ変更セットの列
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSetHistory {
    change_sets: Vec<ChangeSet>,
}

/// 履歴の先頭時点で存在しているファイルとその最終的な名前
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrackedFile {
    pub id: Id,
    pub server_path: String,
    pub local_path: String,
}

impl ChangeSetHistory {
    /// 変更セットを日付の降順に並べ替えて履歴を作成します
    ///
    /// 同じ日付の変更セットは入力順を保ちます。
    pub fn new(mut change_sets: Vec<ChangeSet>) -> Self {
        change_sets.sort_by(|a, b| b.date.cmp(&a.date));
        Self { change_sets }
    }

    pub fn len(&self) -> usize {
        self.change_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.change_sets.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChangeSet> {
        self.change_sets.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, ChangeSet> {
        self.change_sets.iter_mut()
    }

    pub fn change_sets(&self) -> &[ChangeSet] {
        &self.change_sets
    }

    pub fn into_change_sets(self) -> Vec<ChangeSet> {
        self.change_sets
    }

    /// 現在も存在するファイルの一覧を、系譜ごとの最新の名前で返します
    ///
    /// 新しい変更セットから順に走査し、各IDが最初に現れた項目でそのIDの現在の
    /// パスを決定します。最初に現れた項目が `Delete` のIDは既に存在しません。
    pub fn tracked_files(&self) -> Vec<TrackedFile> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for item in self.change_sets.iter().flat_map(|cs| cs.items.iter()) {
            let Some(id) = item.id() else { continue };
            if !seen.insert(id.clone()) {
                continue;
            }
            if item.kind() != ChangeKind::Delete {
                files.push(TrackedFile {
                    id: id.clone(),
                    server_path: item.server_path().to_string(),
                    local_path: item.local_path().to_string(),
                });
            }
        }

        files.sort_by(|a, b| a.server_path.cmp(&b.server_path));
        files
    }
}

impl IntoIterator for ChangeSetHistory {
    type Item = ChangeSet;
    type IntoIter = std::vec::IntoIter<ChangeSet>;

    fn into_iter(self) -> Self::IntoIter {
        self.change_sets.into_iter()
    }
}
