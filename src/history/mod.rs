//! ファイル単位の変更履歴を再構築する中核となるモジュール
//!
//! このモジュールは、VCSのログからファイルごとの系譜を復元するために必要な
//! コンポーネントを提供します。再構築は以下の流れで行われます：
//!
//! 1. ログテキストの解析（変更セットとコミットグラフの構築）
//! 2. リネーム・コピー・削除をまたいだファイル識別子の割り当て
//! 3. ファイルごとの履歴の並列収集と統合
//! 4. 複数の系譜が共有している古い履歴の削除
//!
//! # 主要なコンポーネント
//!
//! - `HistoryAnalyzer`: 再構築とキャッシュの読み書きを制御する構造体
//! - `LogParser`: ログテキストを `ChangeSetHistory` に変換するパーサー
//! - `CommitGraph`: 親子関係と最小共通祖先の問い合わせを提供するグラフ
//! - `MovementTracker`: 全体のログからファイル識別子を割り当てる追跡器
//! - `HistoryReconciler`: ファイルごとのログを統合する再構築器

mod codec;
mod config;
mod error;
mod git;
mod graph;
mod model;
mod parser;
mod progress;
mod provider;
mod reconciler;
mod tracker;

pub use codec::{decode_escaped_path, decode_misencoded_utf8};
pub use config::{HistoryConfig, ProviderKind, DEFAULT_CACHE_DIR};
pub use error::HistoryError;
pub use git::{GitRepository, PathFilter};
pub use graph::{CommitGraph, CommitNode, NodeIndex};
pub use model::{
    ChangeItem, ChangeKind, ChangeSet, ChangeSetHistory, Id, IdSource, TrackedFile, WorkItem,
};
pub use parser::{
    LogParser, ParserOptions, PathMapping, WorkdirMapping, END_HEADER, START_HEADER,
};
pub use progress::{NoProgress, ProgressSink};
pub use provider::{read_history, HistoryProvider, HistoryReport, Provider, CACHE_FILE};
pub use reconciler::{
    remove_shared_history, verify_unique_paths, HistoryReconciler, LogSource, ReconciledHistory,
    SharedChangeSets,
};
pub use tracker::MovementTracker;

/// 履歴の再構築を実行するメインの構造体
///
/// この構造体は、設定に従ってプロバイダーを選択し、
/// 再構築した履歴をキャッシュに保存・読み込みします。
///
/// # フィールド
///
/// - `provider`: 設定された取得方法のプロバイダー
pub struct HistoryAnalyzer {
    provider: Provider,
}

impl HistoryAnalyzer {
    /// 新しいHistoryAnalyzerインスタンスを作成します
    ///
    /// # 引数
    ///
    /// - `config`: 対象リポジトリ、取得方法、フィルターなどの設定
    ///
    /// # エラー
    ///
    /// 以下の場合にエラーを返します：
    /// - 指定されたパスが有効なGitリポジトリでない
    /// - パターンが無効な正規表現として解釈できない
    pub fn new(config: &HistoryConfig) -> Result<Self, HistoryError> {
        Ok(Self {
            provider: Provider::from_config(config)?,
        })
    }

    pub fn with_provider(provider: Provider) -> Self {
        Self { provider }
    }

    /// 履歴を再構築し、キャッシュを更新します
    ///
    /// # 戻り値
    ///
    /// 保存した変更セットの数と、再構築中に記録された警告を返します。
    pub fn rebuild(&mut self, progress: &dyn ProgressSink) -> Result<HistoryReport, HistoryError> {
        self.provider.initialize()?;
        self.provider.update_cache(progress)
    }

    pub fn load_cached(&self) -> Result<ChangeSetHistory, HistoryError> {
        self.provider.query_change_set_history()
    }

    /// キャッシュされた履歴から、現在も存在するファイルの一覧を返します
    pub fn tracked_files(&self) -> Result<Vec<TrackedFile>, HistoryError> {
        Ok(self.load_cached()?.tracked_files())
    }
}
