//! # データベースダンプ
//!
//! `pg_dump` をカスタム形式（`-F c`）で起動し、ローカルファイルに書き出す。
//! パスワードはコマンドライン引数ではなく `PGPASSWORD` で渡す。

use std::{
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use ihundred_domain::DumpError;
use tokio::process::Command;

/// ダンプトレイト
#[async_trait]
pub trait DatabaseDumper: Send + Sync {
    /// `database` を `output` に書き出す
    ///
    /// 出力ファイルの中身の検証（空でないか）は呼び出し側が行う。
    async fn dump(&self, database: &str, output: &Path) -> Result<(), DumpError>;
}

/// `pg_dump` による実装
#[derive(Clone)]
pub struct PgDumpDumper {
    program:  PathBuf,
    host:     String,
    port:     u16,
    user:     String,
    password: String,
}

impl PgDumpDumper {
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            program: PathBuf::from("pg_dump"),
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
        }
    }

    /// 実行ファイルを差し替える（バージョン違いの `pg_dump` を使う場合など）
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    fn args(&self, database: &str, output: &Path) -> Vec<OsString> {
        vec![
            "-h".into(),
            self.host.clone().into(),
            "-p".into(),
            self.port.to_string().into(),
            "-U".into(),
            self.user.clone().into(),
            "-F".into(),
            "c".into(),
            "-b".into(),
            "--no-password".into(),
            "-f".into(),
            output.as_os_str().to_owned(),
            database.into(),
        ]
    }
}

impl fmt::Debug for PgDumpDumper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgDumpDumper")
            .field("program", &self.program)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl DatabaseDumper for PgDumpDumper {
    async fn dump(&self, database: &str, output: &Path) -> Result<(), DumpError> {
        tracing::debug!(database, output = %output.display(), "pg_dump を起動します");

        let result = Command::new(&self.program)
            .args(self.args(database, output))
            .env("PGPASSWORD", &self.password)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DumpError::Spawn(format!("{}: {e}", self.program.display())))?;

        if result.status.success() {
            return Ok(());
        }

        Err(DumpError::Exited {
            code:   result.status.code(),
            stderr: last_lines(&String::from_utf8_lossy(&result.stderr), 5),
        })
    }
}

/// 末尾 `n` 行だけを残す（pg_dump のエラーは最後に出る）
fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}
