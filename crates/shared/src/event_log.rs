//! # ビジネスイベントログとエラーコンテキスト
//!
//! ジョブの実行結果を CI のログから `jq` で追えるよう、フィールド名と値を揃える。
//!
//! ## ビジネスイベント
//!
//! [`log_business_event!`] で出力する。`event.kind = "business_event"` が自動付与され、
//! `jq 'select(.["event.kind"] == "business_event")'` で絞り込める。
//!
//! ## フィールド命名規約
//!
//! ドット記法（`event.category`、`job.kind`、`run.id`）を使う。
//! JSON 出力ではフラットなキーになる。

/// ビジネスイベントを構造化ログとして出力する。
///
/// ## 必須フィールド（慣例）
///
/// - `event.category`: [`event::category`] の定数
/// - `event.action`: [`event::action`] の定数
/// - `event.result`: [`event::result`] の定数
///
/// ## 推奨フィールド
///
/// - `event.entity_type`: [`event::entity_type`] の定数
/// - `event.entity_id`: 受信者 ID やデータベース名
#[macro_export]
macro_rules! log_business_event {
    ($($args:tt)*) => {
        ::tracing::info!(
            event.kind = "business_event",
            $($args)*
        )
    };
}

/// イベントフィールドの定数
pub mod event {
    pub mod category {
        pub const NOTIFICATION: &str = "notification";
        pub const BACKUP: &str = "backup";
        pub const JOB: &str = "job";
    }

    pub mod action {
        // 通知
        pub const NOTIFICATION_SENT: &str = "notification.sent";
        pub const NOTIFICATION_FAILED: &str = "notification.failed";
        pub const NOTIFICATION_SKIPPED: &str = "notification.skipped";

        // バックアップ
        pub const BACKUP_DUMPED: &str = "backup.dumped";
        pub const BACKUP_UPLOADED: &str = "backup.uploaded";
        pub const BACKUP_FAILED: &str = "backup.failed";
        pub const BACKUP_PRUNED: &str = "backup.pruned";

        // ジョブ
        pub const JOB_COMPLETED: &str = "job.completed";
    }

    pub mod entity_type {
        pub const RECIPIENT: &str = "recipient";
        pub const DATABASE: &str = "database";
        pub const RUN: &str = "run";
    }

    pub mod result {
        pub const SUCCESS: &str = "success";
        pub const FAILURE: &str = "failure";
        pub const SKIPPED: &str = "skipped";
        /// 一部だけ成功
        pub const PARTIAL: &str = "partial";
    }
}

/// エラーコンテキストフィールドの定数
///
/// `tracing::error!` に `error.category` と `error.kind` を直接付ける。
pub mod error {
    pub mod category {
        /// DB、ローカルファイル
        pub const INFRASTRUCTURE: &str = "infrastructure";
        /// メール送信、クラウドストレージ
        pub const EXTERNAL_SERVICE: &str = "external_service";
        pub const CONFIGURATION: &str = "configuration";
    }

    pub mod kind {
        pub const DATABASE: &str = "database";
        pub const MAIL_TRANSPORT: &str = "mail_transport";
        pub const BLOB_STORAGE: &str = "blob_storage";
        pub const DUMP: &str = "dump";
        pub const FILESYSTEM: &str = "filesystem";
        pub const TEMPLATE: &str = "template";
    }
}

#[cfg(test)]
mod tests {
    use super::event;

    #[test]
    fn test_サブスクライバ無しでもマクロを呼び出せる() {
        crate::log_business_event!(
            event.category = event::category::JOB,
            event.action = event::action::JOB_COMPLETED,
            event.result = event::result::SUCCESS,
            "ジョブ完了"
        );
    }
}
