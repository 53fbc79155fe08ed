//! # ジョブの終了ステータス
//!
//! | コード | 意味 |
//! |---|---|
//! | 0 | すべて成功（スキップは成功扱い） |
//! | 1 | 再試行しても解消しなかった失敗が残った |
//! | 2 | 致命的エラー（設定不備、受信者選択の失敗など） |

use std::process::ExitCode;

use ihundred_domain::{backup::BackupRunSummary, delivery::RunSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobExit {
    Success,
    Unresolved,
    Fatal,
}

impl JobExit {
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Unresolved => 1,
            Self::Fatal => 2,
        }
    }

    pub fn from_run(summary: &RunSummary) -> Self {
        if summary.has_failures() {
            Self::Unresolved
        } else {
            Self::Success
        }
    }

    /// 対象があって 1 件も成功しなかった場合は致命的エラー
    pub fn from_backup(summary: &BackupRunSummary) -> Self {
        if !summary.has_failures() {
            Self::Success
        } else if summary.done_count() == 0 {
            Self::Fatal
        } else {
            Self::Unresolved
        }
    }
}

impl From<JobExit> for ExitCode {
    fn from(exit: JobExit) -> Self {
        ExitCode::from(exit.code())
    }
}
