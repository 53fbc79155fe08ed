//! # エラー分類
//!
//! | エラー | 影響範囲 | 扱い |
//! |---|---|---|
//! | [`QueryError`] | 実行全体 | 致命的。送信は 1 件も行わない |
//! | [`RenderError`] | 受信者 1 人 | スキップとして記録し次へ進む |
//! | [`SendError::Transient`] | 受信者 1 人 | 上限まで再試行し、尽きたら失敗 |
//! | [`SendError::Permanent`] | 受信者 1 人 | 再試行せず即失敗 |
//! | [`UploadError`] | データベース 1 つ | 送信と同じ分類で再試行 |
//! | [`DumpError`] | データベース 1 つ | そのデータベースだけ失敗 |
//!
//! 致命的エラー以外はすべてサマリーに記録され、プロセス境界までは伝播しない。

use std::path::PathBuf;

use thiserror::Error;

use crate::{recipient::RecipientField, retry::Transience};

/// 受信者の選択に失敗
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// データベースに接続できない
    #[error("データベースに接続できません: {0}")]
    Connection(String),

    /// クエリが拒否された（構文エラー、権限不足、型の不一致など）
    #[error("クエリが拒否されました: {0}")]
    Rejected(String),
}

/// メッセージの描画に失敗
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// テンプレートが必須とする属性が受信者に無い
    #[error("必須属性 {0} がありません")]
    MissingField(RecipientField),

    /// テンプレートエンジンのエラー
    #[error("テンプレートの描画に失敗: {0}")]
    Template(String),
}

/// メール送信に失敗
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// タイムアウト、レート制限、5xx、接続失敗
    #[error("一時的な送信エラー: {0}")]
    Transient(String),

    /// 不正な宛先、内容の拒否など。再試行しても結果は変わらない
    #[error("恒久的な送信エラー: {0}")]
    Permanent(String),
}

impl Transience for SendError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// バックアップのアップロードに失敗
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("一時的なアップロードエラー: {0}")]
    Transient(String),

    #[error("恒久的なアップロードエラー: {0}")]
    Permanent(String),
}

impl Transience for UploadError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// データベースのダンプに失敗
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DumpError {
    /// ダンプコマンドを起動できない
    #[error("ダンプコマンドを起動できません: {0}")]
    Spawn(String),

    /// ダンプコマンドが異常終了した
    #[error("ダンプコマンドが異常終了しました (code={code:?}): {stderr}")]
    Exited { code: Option<i32>, stderr: String },

    /// 出力ファイルが空
    #[error("ダンプファイルが空です: {}", .0.display())]
    EmptyOutput(PathBuf),

    /// 出力ファイルを読めない
    #[error("ダンプファイルを読めません: {}: {message}", .path.display())]
    Unreadable { path: PathBuf, message: String },
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_一時的エラーだけが再試行対象() {
        assert!(SendError::Transient("timeout".into()).is_transient());
        assert!(!SendError::Permanent("invalid address".into()).is_transient());
        assert!(UploadError::Transient("503".into()).is_transient());
        assert!(!UploadError::Permanent("403".into()).is_transient());
    }

    #[test]
    fn test_描画エラーは欠けている属性名を含む() {
        let error = RenderError::MissingField(RecipientField::Balance);

        assert_eq!(error.to_string(), "必須属性 balance がありません");
    }

    #[test]
    fn test_ダンプエラーはファイルパスを含む() {
        let error = DumpError::EmptyOutput(PathBuf::from("/backups/ihundred.dump"));

        assert!(error.to_string().contains("/backups/ihundred.dump"));
    }
}
