//! # IHundred 共有ユーティリティ
//!
//! すべてのクレートから使うログ関連のユーティリティ。
//! ビジネスロジックは置かない。

pub mod event_log;
pub mod observability;
