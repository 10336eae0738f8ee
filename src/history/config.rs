//! 履歴の再構築に関する設定

use super::error::HistoryError;
use super::git::PathFilter;
use super::parser::ParserOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// キャッシュディレクトリを明示しなかった場合にリポジトリ直下に作られるディレクトリ名
pub const DEFAULT_CACHE_DIR: &str = ".history-tracker";

/// 履歴の取得方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// 全体のログを1回だけ解析し、移動の追跡で識別子を割り当てる
    Git,
    /// ファイルごとにログをたどり、共有された履歴を取り除いてマージする
    #[default]
    GitPerFile,
}

/// 設定ファイル（JSON）とコマンドライン引数から組み立てられる設定
///
/// # フィールド
///
/// - `repo`: 対象のGitリポジトリパス
/// - `cache_dir`: キャッシュの保存先（省略時は `<repo>/.history-tracker`）
/// - `provider`: 履歴の取得方法
/// - `work_item_pattern`: コミットメッセージから作業項目を抽出する正規表現
/// - `include_patterns` / `exclude_patterns`: 追跡対象ファイルのglobパターン
/// - `threads`: ワーカースレッド数（0はrayonの既定値）
/// - `repair_author_encoding`: コミッター名の文字化けを修復するかどうか
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub repo: PathBuf,
    pub cache_dir: Option<PathBuf>,
    pub provider: ProviderKind,
    pub work_item_pattern: Option<String>,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub threads: usize,
    pub repair_author_encoding: bool,
}

impl HistoryConfig {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            ..Self::default()
        }
    }

    /// JSON形式の設定ファイルを読み込みます。省略されたキーは既定値になります
    ///
    /// # エラー
    ///
    /// ファイルが読めない場合は `Io`、JSONとして解釈できない場合は `Json` を返します。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.repo.join(DEFAULT_CACHE_DIR))
    }

    pub fn parser_options(&self) -> Result<ParserOptions, HistoryError> {
        ParserOptions::new(
            self.work_item_pattern.as_deref(),
            self.repair_author_encoding,
        )
    }

    pub fn path_filter(&self) -> Result<PathFilter, HistoryError> {
        PathFilter::new(&self.include_patterns, &self.exclude_patterns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cache_dir_is_inside_repository() {
        let config = HistoryConfig::new("/work/repo");
        assert_eq!(
            config.cache_dir(),
            PathBuf::from("/work/repo/.history-tracker")
        );

        let config = HistoryConfig {
            cache_dir: Some(PathBuf::from("/tmp/cache")),
            ..HistoryConfig::new("/work/repo")
        };
        assert_eq!(config.cache_dir(), PathBuf::from("/tmp/cache"));
    }

    #[test]
    fn test_from_file_fills_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r##"{ "repo": "/work/repo", "provider": "git", "work_item_pattern": "#(\\d+)" }"##,
        )
        .unwrap();

        let config = HistoryConfig::from_file(&path).unwrap();
        assert_eq!(config.repo, PathBuf::from("/work/repo"));
        assert_eq!(config.provider, ProviderKind::Git);
        assert_eq!(config.work_item_pattern.as_deref(), Some("#(\\d+)"));
        assert_eq!(config.threads, 0);
        assert!(config.include_patterns.is_empty());
        assert!(!config.repair_author_encoding);
    }

    #[test]
    fn test_from_file_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ repo: ").unwrap();

        assert!(matches!(
            HistoryConfig::from_file(&path),
            Err(HistoryError::Json(_))
        ));
    }

    #[test]
    fn test_parser_options_from_config() {
        let config = HistoryConfig {
            work_item_pattern: Some("#(\\d+)".to_string()),
            repair_author_encoding: true,
            ..HistoryConfig::default()
        };
        let options = config.parser_options().unwrap();
        assert!(options.work_item_pattern.is_some());
        assert!(options.repair_author_encoding);

        let config = HistoryConfig {
            work_item_pattern: Some("(".to_string()),
            ..HistoryConfig::default()
        };
        assert!(matches!(
            config.parser_options(),
            Err(HistoryError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_provider_kind_names() {
        assert_eq!(
            serde_json::to_string(&ProviderKind::GitPerFile).unwrap(),
            "\"git-per-file\""
        );
        assert_eq!(ProviderKind::default(), ProviderKind::GitPerFile);
    }
}
