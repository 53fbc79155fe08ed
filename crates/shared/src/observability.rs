//! # Observability 基盤
//!
//! トレーシングの初期化とログ出力形式の切り替え。
//! すべてのジョブバイナリが起動直後に [`init_tracing`] を 1 回だけ呼ぶ。
//! CI では `LOG_FORMAT=json` を設定して JSON で出力する。

/// ログ出力形式
///
/// 値が未設定または不正な場合は [`Pretty`](LogFormat::Pretty) にフォールバックする。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON 形式（CI 向け）
    Json,
    /// 人間が読みやすい形式（ローカル実行向け）
    #[default]
    Pretty,
}

impl LogFormat {
    /// 文字列からログ形式をパースする
    ///
    /// 不正な値の場合は stderr に警告を出してフォールバックする。
    /// この時点ではまだサブスクライバが無いので `tracing` は使えない。
    pub fn parse(s: &str) -> Self {
        match s {
            "json" => Self::Json,
            "pretty" => Self::Pretty,
            other => {
                eprintln!("WARNING: unknown LOG_FORMAT={other:?}, falling back to pretty");
                Self::Pretty
            }
        }
    }

    /// 環境変数 `LOG_FORMAT` から読み取る
    pub fn from_env() -> Self {
        std::env::var("LOG_FORMAT")
            .map(|val| Self::parse(&val))
            .unwrap_or_default()
    }
}

/// トレーシング初期化設定
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// ジョブ名（初期化ログの `job.name` に出力）
    pub job_name:   String,
    pub log_format: LogFormat,
}

impl TracingConfig {
    pub fn new(job_name: impl Into<String>, log_format: LogFormat) -> Self {
        Self {
            job_name: job_name.into(),
            log_format,
        }
    }

    pub fn from_env(job_name: impl Into<String>) -> Self {
        Self::new(job_name, LogFormat::from_env())
    }
}

/// トレーシングを初期化する
///
/// `RUST_LOG` でログレベルを制御する。未設定なら `"info,ihundred=debug"`。
///
/// `tracing_error::ErrorLayer` を登録するので、infra 層のエラーが
/// 生成時点のスパン（`job_run` など）を `SpanTrace` として保持できる。
#[cfg(feature = "observability")]
pub fn init_tracing(config: &TracingConfig) {
    use tracing_subscriber::{Layer as _, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,ihundred=debug".into());

    let fmt_layer = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_target(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(tracing_error::ErrorLayer::default())
        .init();

    tracing::debug!(job.name = %config.job_name, "トレーシングを初期化しました");
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_jsonとprettyを認識する() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
    }

    #[test]
    fn test_不正な値はprettyにフォールバックする() {
        assert_eq!(LogFormat::parse(""), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Pretty);
    }

    #[test]
    fn test_設定にジョブ名と形式が入る() {
        let config = TracingConfig::new("backup", LogFormat::Json);

        assert_eq!(config.job_name, "backup");
        assert_eq!(config.log_format, LogFormat::Json);
    }
}
