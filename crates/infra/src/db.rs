//! # PostgreSQL 接続管理
//!
//! ジョブは 1 回の実行で数本のクエリを順に発行するだけなので、
//! 接続は 1 本のプールで十分。プールは実行の終わりに必ず閉じる。
//!
//! 接続は遅延確立する（[`create_pool`] は接続しない）。接続できない場合は
//! 最初のクエリが失敗し、その実行は受信者選択の致命的エラーとして終わる。
//!
//! ```rust,ignore
//! use ihundred_infra::db;
//!
//! let options = db::connect_options("localhost", 5432, "ihundred", "jobs", "secret");
//! let pool = db::create_pool(options);
//! // ... クエリ
//! pool.close().await;
//! ```

use std::time::Duration;

use sqlx::{
    PgPool,
    postgres::{PgConnectOptions, PgPoolOptions},
};

/// 接続パラメータを組み立てる
///
/// パスワードに記号が含まれても壊れないよう、URL 文字列ではなく
/// オプションを個別に設定する。
pub fn connect_options(
    host: &str,
    port: u16,
    database: &str,
    user: &str,
    password: &str,
) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(host)
        .port(port)
        .database(database)
        .username(user)
        .password(password)
        .application_name("ihundred-jobs")
}

/// 遅延接続のプールを作成する
pub fn create_pool(options: PgConnectOptions) -> PgPool {
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect_lazy_with(options)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_接続オプションに各パラメータが入る() {
        let options = connect_options("db.internal", 6543, "ihundred", "jobs", "p@ss:word");

        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_database(), Some("ihundred"));
        assert_eq!(options.get_username(), "jobs");
    }

    #[tokio::test]
    async fn test_プール作成時には接続しない() {
        let options = connect_options("127.0.0.1", 1, "none", "none", "none");

        let pool = create_pool(options);

        assert_eq!(pool.size(), 0);
        pool.close().await;
    }
}
