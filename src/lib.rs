//! バージョン管理システムのファイル単位の変更履歴を再構築するツール
//!
//! このクレートは、Gitリポジトリのログを解析し、リネーム・コピー・削除・
//! マージをまたいでファイルごとの系譜を復元するための機能を提供します。
//! 各ファイルの系譜には安定した識別子が割り当てられ、最終的な名前とともに
//! 問い合わせることができます。
//!
//! # 主な機能
//!
//! - ログテキストの解析とパス・文字コードの復号
//! - コミットグラフの構築と最小共通祖先の問い合わせ
//! - 全体のログからのファイル移動の追跡
//! - ファイルごとのログの並列収集と、共有された履歴の削除
//! - 再構築した履歴のJSONキャッシュ
//!
//! # 使用例
//!
//! ```no_run
//! use history_tracker::{HistoryAnalyzer, HistoryConfig, NoProgress};
//!
//! let config = HistoryConfig::new("path/to/repo");
//! let mut analyzer = HistoryAnalyzer::new(&config).unwrap();
//!
//! let report = analyzer.rebuild(&NoProgress).unwrap();
//! let files = analyzer.tracked_files().unwrap();
//! ```

pub mod history;
pub use history::{
    ChangeSetHistory, HistoryAnalyzer, HistoryConfig, HistoryError, NoProgress, ProviderKind,
};
