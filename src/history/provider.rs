//! 履歴の取得方法を切り替えるプロバイダー層
//!
//! どちらの取得方法でも、再構築した履歴は `<cache>/history.json` に保存され、
//! 以降の問い合わせはこのファイルから読み戻されます。

use super::config::{HistoryConfig, ProviderKind};
use super::error::HistoryError;
use super::git::GitRepository;
use super::model::{ChangeSetHistory, IdSource};
use super::parser::{LogParser, ParserOptions, PathMapping, WorkdirMapping};
use super::progress::ProgressSink;
use super::reconciler::{HistoryReconciler, LogSource};
use super::tracker::MovementTracker;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// キャッシュファイル名
pub const CACHE_FILE: &str = "history.json";

/// キャッシュ更新の結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryReport {
    pub change_sets: usize,
    pub warnings: Vec<String>,
}

pub trait HistoryProvider {
    /// キャッシュディレクトリを準備します
    fn initialize(&mut self) -> Result<(), HistoryError>;

    /// VCSから履歴を再構築し、キャッシュに保存します
    fn update_cache(&mut self, progress: &dyn ProgressSink)
        -> Result<HistoryReport, HistoryError>;

    /// キャッシュに保存された履歴を読み込みます
    fn query_change_set_history(&self) -> Result<ChangeSetHistory, HistoryError>;
}

/// `ProviderKind` に応じて履歴を再構築するプロバイダー
///
/// # フィールド
///
/// - `kind`: 履歴の取得方法
/// - `source`: ログの取得元
/// - `mapping`: リポジトリ内パスからローカルパスへの変換
/// - `options`: ログ解析の設定
/// - `cache_dir`: キャッシュの保存先
/// - `ids`: 識別子の生成方法
/// - `threads`: ファイルごとの収集に使うスレッド数
pub struct Provider {
    kind: ProviderKind,
    source: Box<dyn LogSource>,
    mapping: Box<dyn PathMapping>,
    options: ParserOptions,
    cache_dir: PathBuf,
    ids: IdSource,
    threads: usize,
}

impl Provider {
    pub fn new(
        kind: ProviderKind,
        source: Box<dyn LogSource>,
        mapping: Box<dyn PathMapping>,
        options: ParserOptions,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            kind,
            source,
            mapping,
            options,
            cache_dir: cache_dir.into(),
            ids: IdSource::Uuid,
            threads: 0,
        }
    }

    /// 設定からGitリポジトリを開き、プロバイダーを作成します
    ///
    /// # エラー
    ///
    /// 以下の場合にエラーを返します：
    /// - 指定されたパスが有効なGitリポジトリでない
    /// - globパターンまたは作業項目の正規表現が不正
    pub fn from_config(config: &HistoryConfig) -> Result<Self, HistoryError> {
        let repo = GitRepository::open(&config.repo, config.path_filter()?)?;
        let mapping = WorkdirMapping::new(repo.workdir());

        Ok(Self::new(
            config.provider,
            Box::new(repo),
            Box::new(mapping),
            config.parser_options()?,
            config.cache_dir(),
        )
        .with_threads(config.threads))
    }

    pub fn with_ids(mut self, ids: IdSource) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn cache_file(&self) -> PathBuf {
        self.cache_dir.join(CACHE_FILE)
    }

    fn rebuild(
        &self,
        progress: &dyn ProgressSink,
    ) -> Result<(ChangeSetHistory, Vec<String>), HistoryError> {
        match self.kind {
            ProviderKind::Git => {
                progress.report("Reading log");
                let parser = LogParser::new(self.mapping.as_ref(), self.options.clone());
                let mut history = parser.parse(&self.source.full_log()?, None)?;

                progress.report("Tracking file movements");
                let mut tracker = MovementTracker::new(self.ids.clone());
                tracker.apply_history(&mut history);
                Ok((history, tracker.into_warnings()))
            }
            ProviderKind::GitPerFile => {
                let reconciled = HistoryReconciler::new(
                    self.source.as_ref(),
                    self.mapping.as_ref(),
                    self.options.clone(),
                )
                .with_ids(self.ids.clone())
                .with_threads(self.threads)
                .reconcile(progress)?;
                Ok((reconciled.history, reconciled.warnings))
            }
        }
    }
}

impl HistoryProvider for Provider {
    fn initialize(&mut self) -> Result<(), HistoryError> {
        std::fs::create_dir_all(&self.cache_dir)?;
        info!(cache_dir = %self.cache_dir.display(), "initialized cache");
        Ok(())
    }

    fn update_cache(
        &mut self,
        progress: &dyn ProgressSink,
    ) -> Result<HistoryReport, HistoryError> {
        let (history, warnings) = self.rebuild(progress)?;
        write_history(&self.cache_file(), &history)?;
        info!(
            change_sets = history.len(),
            warnings = warnings.len(),
            "updated history cache"
        );

        Ok(HistoryReport {
            change_sets: history.len(),
            warnings,
        })
    }

    fn query_change_set_history(&self) -> Result<ChangeSetHistory, HistoryError> {
        read_history(&self.cache_file())
    }
}

fn write_history(path: &Path, history: &ChangeSetHistory) -> Result<(), HistoryError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, history)?;
    writer.flush()?;
    Ok(())
}

/// キャッシュファイルから履歴を読み込みます
pub fn read_history(path: &Path) -> Result<ChangeSetHistory, HistoryError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
