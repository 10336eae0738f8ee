//! 進捗の通知先

use indicatif::ProgressBar;

/// 人が読める進捗メッセージを受け取る通知先
///
/// 通知は一方向で、受け取り側の処理を待つことはありません。複数のワーカーから
/// 同時に呼び出されます。
pub trait ProgressSink: Sync {
    fn report(&self, message: &str);
}

/// 何もしない通知先
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _message: &str) {}
}

impl ProgressSink for ProgressBar {
    fn report(&self, message: &str) {
        self.set_message(message.to_string());
        self.tick();
    }
}
