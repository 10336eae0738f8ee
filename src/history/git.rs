//! Gitリポジトリとの対話を担当するモジュール
//!
//! このモジュールは、libgit2を使用してリポジトリを開き、追跡されているファイルを
//! 列挙します。ログテキストは `git log` コマンドの出力から取得します。libgit2には
//! `--follow` に相当する機能がないためです。

use super::error::HistoryError;
use super::parser::{END_HEADER, START_HEADER};
use super::reconciler::LogSource;
use git2::Repository;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// 分析対象とするファイルを決めるパターンの組
///
/// # フィールド
///
/// - `include_patterns`: 分析対象とするファイルパターン（空の場合はすべて対象）
/// - `exclude_patterns`: 分析から除外するファイルパターン
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include_patterns: Vec<Regex>,
    exclude_patterns: Vec<Regex>,
}

impl PathFilter {
    /// globパターンからフィルターを作成します
    ///
    /// # エラー
    ///
    /// パターンを正規表現に変換できない場合は `InvalidPattern` を返します。
    pub fn new(
        include_patterns: &[String],
        exclude_patterns: &[String],
    ) -> Result<Self, HistoryError> {
        Ok(Self {
            include_patterns: compile_globs(include_patterns)?,
            exclude_patterns: compile_globs(exclude_patterns)?,
        })
    }

    /// 指定されたファイルパスが分析対象に含まれるかどうかを判定します
    pub fn matches(&self, file_path: &str) -> bool {
        if self
            .exclude_patterns
            .iter()
            .any(|pattern| pattern.is_match(file_path))
        {
            return false;
        }

        if self.include_patterns.is_empty() {
            return true;
        }

        self.include_patterns
            .iter()
            .any(|pattern| pattern.is_match(file_path))
    }
}

fn compile_globs(patterns: &[String]) -> Result<Vec<Regex>, HistoryError> {
    patterns
        .iter()
        .map(|p| Regex::new(&glob_to_regex(p)))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| HistoryError::InvalidPattern(e.to_string()))
}

/// Gitリポジトリへのアクセスを管理する構造体
///
/// # フィールド
///
/// - `repo`: libgit2のリポジトリハンドル（ワーカー間で共有するためロックで保護）
/// - `workdir`: 作業ディレクトリ（gitコマンドの実行場所）
/// - `filter`: 追跡対象のファイルを絞り込むフィルター
pub struct GitRepository {
    repo: Mutex<Repository>,
    workdir: PathBuf,
    filter: PathFilter,
}

impl GitRepository {
    /// 指定されたパスのGitリポジトリをオープンします
    ///
    /// # エラー
    ///
    /// 以下の場合にエラーを返します：
    /// - リポジトリのオープンに失敗
    /// - 作業ディレクトリを持たないベアリポジトリ
    pub fn open(path: impl AsRef<Path>, filter: PathFilter) -> Result<Self, HistoryError> {
        let repo = Repository::open(path)?;
        let workdir = repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or(HistoryError::InvalidRepository)?;

        Ok(Self {
            repo: Mutex::new(repo),
            workdir,
            filter,
        })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn run_log(&self, extra_args: &[&str]) -> Result<String, HistoryError> {
        let format = format!(
            "--pretty=format:{}%n%H%n%cn%n%cd%n%P%n%B%n{}",
            START_HEADER, END_HEADER
        );

        let output = Command::new("git")
            .args(["-c", "core.quotepath=true", "log", "--no-color"])
            .arg(format)
            .args(["--date=iso-strict", "--name-status", "-M", "-C"])
            .args(extra_args)
            .current_dir(&self.workdir)
            .output()?;

        if !output.status.success() {
            return Err(HistoryError::Vcs(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl LogSource for GitRepository {
    fn full_log(&self) -> Result<String, HistoryError> {
        self.run_log(&[])
    }

    fn file_log(&self, server_path: &str) -> Result<String, HistoryError> {
        self.run_log(&["--follow", "--", server_path])
    }

    fn tracked_files(&self) -> Result<Vec<String>, HistoryError> {
        let index = self
            .repo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .index()?;

        let mut files: Vec<String> = index
            .iter()
            .filter_map(|entry| String::from_utf8(entry.path).ok())
            .filter(|path| self.filter.matches(path))
            .collect();
        // 競合中のエントリはステージごとに重複する
        files.dedup();

        debug!(files = files.len(), "enumerated tracked files");
        Ok(files)
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let mut regex = String::new();
    regex.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next(); // 2つ目の'*'を消費
                                  // **の後のスラッシュをチェック
                    if chars.peek() == Some(&'/') {
                        chars.next(); // '/'を消費
                        regex.push_str("(.*/)?"); // 0個以上のディレクトリにマッチ
                    } else {
                        regex.push_str(".*"); // スラッシュがない場合は単純に.*
                    }
                } else {
                    regex.push_str("[^/]*"); // 単一の*は現在のディレクトリ内のみマッチ
                }
            }
            '?' => regex.push_str("[^/]"),
            '.' => regex.push_str("\\."),
            '/' => regex.push('/'),
            c if c.is_alphanumeric() => regex.push(c),
            _ => regex.push_str(&regex::escape(&c.to_string())),
        }
    }

    regex.push('$');
    regex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_to_regex() {
        let test_cases = [
            ("*.py", "^[^/]*\\.py$"),
            ("src/*.rs", "^src/[^/]*\\.rs$"),
            ("**/*.js", "^(.*/)?[^/]*\\.js$"),
            ("src/**/*.ts", "^src/(.*/)?[^/]*\\.ts$"),
            ("doc/?.md", "^doc/[^/]\\.md$"),
            ("test/**", "^test/.*$"),
            ("**.txt", "^.*\\.txt$"),
        ];

        for (input, expected) in test_cases {
            let result = glob_to_regex(input);
            assert_eq!(
                result, expected,
                "Pattern '{}' should convert to '{}', but got '{}'",
                input, expected, result
            );
        }
    }

    #[test]
    fn test_path_filter() {
        let filter = PathFilter::new(
            &["**/*.rs".to_string(), "src/*.toml".to_string()],
            &["target/**".to_string()],
        )
        .unwrap();

        assert!(filter.matches("main.rs"));
        assert!(filter.matches("src/main.rs"));
        assert!(filter.matches("src/config.toml"));
        assert!(!filter.matches("src/main.py"));
        assert!(!filter.matches("target/debug/main.rs"));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = PathFilter::default();
        assert!(filter.matches("anything/at/all.bin"));
    }

    #[test]
    fn test_open_rejects_missing_repository() {
        let dir = tempfile::tempdir().unwrap();
        let result = GitRepository::open(dir.path().join("missing"), PathFilter::default());
        assert!(matches!(result, Err(HistoryError::GitError(_))));
    }

    #[test]
    fn test_tracked_files_from_index() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "pub fn f() {}\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "notes\n").unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new("src/lib.rs")).unwrap();
        index.add_path(Path::new("notes.txt")).unwrap();
        index.write().unwrap();

        let filter = PathFilter::new(&["**/*.rs".to_string()], &[]).unwrap();
        let git = GitRepository::open(dir.path(), filter).unwrap();
        assert_eq!(git.tracked_files().unwrap(), vec!["src/lib.rs".to_string()]);
    }
}
