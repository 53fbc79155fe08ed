//! # 受信者
//!
//! 選択クエリが返す 1 行を表すスナップショット。実行中は読み取り専用で、
//! テンプレート差し込みに必要な属性だけを保持する。
//!
//! | 型 | 意味 |
//! |---|---|
//! | [`RecipientId`] | 実行内で受信者を一意に識別するキー（学籍番号、検証者メール、学科コード） |
//! | [`Recipient`] | 宛先アドレスと差し込み属性 |
//! | [`RecipientField`] | テンプレートが必須とする属性の名前 |
//! | [`VerifierStatistics`] | 検証者の処理状況（保留日数など） |
//! | [`RosterEntry`] | 職員宛てメールに一覧表示する学生 1 人分 |

use serde::{Deserialize, Serialize};

/// 受信者 ID
///
/// ジョブ種別ごとに意味が異なる（学生なら学籍番号、検証者ならメールアドレス、
/// 学科担当者なら学科コード）。実行内の冪等性チェックはこの値で行う。
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[display("{_0}")]
#[serde(transparent)]
pub struct RecipientId(String);

impl RecipientId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// テンプレートが必須とする受信者属性
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RecipientField {
    Name,
    Balance,
    PendingActivities,
    Department,
    Batch,
    /// 学生一覧が 1 行以上ある
    Roster,
}

impl RecipientField {
    /// 受信者がこの属性を持っているか
    pub fn is_present(self, recipient: &Recipient) -> bool {
        match self {
            Self::Name => recipient.name.as_deref().is_some_and(|v| !v.trim().is_empty()),
            Self::Balance => recipient.balance.is_some(),
            Self::PendingActivities => recipient.pending_activities.is_some(),
            Self::Department => recipient
                .department
                .as_deref()
                .is_some_and(|v| !v.trim().is_empty()),
            Self::Batch => recipient.batch.as_deref().is_some_and(|v| !v.trim().is_empty()),
            Self::Roster => !recipient.roster.is_empty(),
        }
    }
}

/// 検証者の処理状況
///
/// `VerifierStastics` ビューの 1 行。保留中アクティビティの催促メールに差し込む。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifierStatistics {
    pub total_activities: i64,
    pub avg_pending_days: f64,
    pub max_pending_days: f64,
}

/// 学生一覧の 1 行
///
/// 学科担当者・学科長・検証者宛てのメールに表で載せる。
/// 列はジョブによって使うものが異なるため、すべて任意項目にしている。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub enrollment_no:      Option<String>,
    pub name:               Option<String>,
    pub email:              Option<String>,
    pub department:         Option<String>,
    pub batch:              Option<String>,
    pub points:             Option<i64>,
    pub pending_activities: Option<i64>,
    /// アカウントの承認状態（`pending` / `verified`）
    pub status:             Option<String>,
}

impl RosterEntry {
    /// 承認待ちのアカウントか
    pub fn is_pending_approval(&self) -> bool {
        self.status.as_deref() == Some("pending")
    }

    /// 承認済みで検証者の割り当てを待っているか
    pub fn is_pending_allocation(&self) -> bool {
        self.status.as_deref() == Some("verified")
    }
}

/// 受信者
///
/// `email` が空の行も保持する（学科担当者が未登録の学科など）。
/// 宛先のない受信者は送信せずにスキップとして記録される。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recipient {
    pub id:                 RecipientId,
    pub email:              String,
    pub name:               Option<String>,
    /// 獲得済みアクティビティポイント
    pub balance:            Option<i64>,
    /// 保留中アクティビティ件数（検証者宛ては担当分、学科担当者宛ては未割り当て学生数）
    pub pending_activities: Option<i64>,
    pub department:         Option<String>,
    pub batch:              Option<String>,
    pub final_year:         bool,
    pub statistics:         Option<VerifierStatistics>,
    /// 職員宛てメールで一覧にする学生（学生宛てでは空）
    pub roster:             Vec<RosterEntry>,
}

impl Recipient {
    /// 必須の識別子と宛先だけを持つ受信者を作成する
    pub fn new(id: RecipientId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            name: None,
            balance: None,
            pending_activities: None,
            department: None,
            batch: None,
            final_year: false,
            statistics: None,
            roster: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_balance(mut self, balance: i64) -> Self {
        self.balance = Some(balance);
        self
    }

    pub fn with_pending_activities(mut self, count: i64) -> Self {
        self.pending_activities = Some(count);
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn with_batch(mut self, batch: impl Into<String>) -> Self {
        self.batch = Some(batch.into());
        self
    }

    pub fn with_final_year(mut self, final_year: bool) -> Self {
        self.final_year = final_year;
        self
    }

    pub fn with_statistics(mut self, statistics: VerifierStatistics) -> Self {
        self.statistics = Some(statistics);
        self
    }

    pub fn with_roster(mut self, roster: Vec<RosterEntry>) -> Self {
        self.roster = roster;
        self
    }

    /// 送信可能な宛先を持っているか
    pub fn has_address(&self) -> bool {
        !self.email.trim().is_empty()
    }

    /// 表示名（未設定なら既定値）
    pub fn display_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(fallback)
    }
}
