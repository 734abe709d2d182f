use std::fmt;
use std::fmt::Write;
use std::path::PathBuf;

use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{format::FmtSpan, time::FormatTime, Layer as FmtLayer};
use tracing_subscriber::{prelude::*, registry::Registry, reload, EnvFilter};

mod fanout;

use self::fanout::FanOut;
use super::app_config::config;
use super::error::Result;

pub mod prelude {
    pub use tracing::{debug, error, info, trace, warn};
    pub use tracing::{debug_span, error_span, info_span, trace_span, warn_span};
    pub use tracing::{event, field::Empty, instrument, span};
}

pub fn setup() -> Result<GlobalLoggingContext> {
    GlobalLoggingContext::new()
}

/// Keeps the log writers alive, hold it in main until exit
pub struct GlobalLoggingContext {
    worker_guards: Vec<WorkerGuard>,
    reload_handle: reload::Handle<FanOut<Registry>, Registry>,
}

impl GlobalLoggingContext {
    /// Install the subscriber with the built-in defaults, before any config is read
    pub fn new() -> Result<Self> {
        let (layer, handle) = reload::Layer::new(FanOut::empty());
        Registry::default().with(layer).try_init()?;

        let mut ctx = GlobalLoggingContext {
            worker_guards: vec![],
            reload_handle: handle,
        };
        ctx.reconfigure_with(LoggingConfig::default(), false)?;

        Ok(ctx)
    }

    /// Rebuild the outputs from the `logging` table of the global config.
    ///
    /// `produces_output` is set by commands writing their result to stdout,
    /// auto-switching terminal outputs then move to stderr.
    pub fn reconfigure(&mut self, produces_output: bool) -> Result<()> {
        let cfg: LoggingConfig = config().get("logging")?;
        self.reconfigure_with(cfg, produces_output)
    }

    fn reconfigure_with(&mut self, cfg: LoggingConfig, produces_output: bool) -> Result<()> {
        let mut guards = vec![];
        let branches: Vec<_> = cfg
            .outputs
            .iter()
            .filter(|output| output.enabled)
            .map(|output| {
                let (branch, guard) = output.to_layer(&cfg.filter, produces_output);
                guards.push(guard);
                branch
            })
            .collect();

        self.reload_handle.reload(FanOut::new(branches))?;
        // old writers flush on drop, only once nothing routes to them anymore
        self.worker_guards = guards;

        Ok(())
    }
}

struct ISOTimeFormat;

impl FormatTime for ISOTimeFormat {
    fn format_time(&self, w: &mut dyn Write) -> fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

// ====== Config to Layer ======

impl LoggingOutput {
    /// A filter and a formatter for this output
    fn to_layer(&self, global_filter: &FilterConfig, produces_output: bool) -> (FanOut<Registry>, WorkerGuard) {
        let span_events = self
            .span_events
            .iter()
            .fold(FmtSpan::NONE, |f, e| f | FmtSpan::from(*e));
        let (writer, guard) = self.target.to_writer(produces_output);

        let mut branch = FanOut::empty();
        branch.push(self.filter.with_default(global_filter).to_env_filter());
        branch.push(
            FmtLayer::default()
                .with_ansi(self.target.supports_color())
                .with_target(false)
                .with_span_events(span_events)
                .with_timer(ISOTimeFormat)
                .with_writer(writer),
        );
        (branch, guard)
    }
}

impl FilterConfig {
    pub fn to_env_filter(&self) -> EnvFilter {
        let filter = match &self.from_env {
            Some(env) => EnvFilter::from_env(env),
            None => EnvFilter::default(),
        };

        match &self.directives {
            Some(dirs) => dirs
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .filter_map(|s| match s.trim().parse() {
                    Ok(d) => Some(d),
                    Err(err) => {
                        eprintln!("ignoring log directive `{}`: {}", s, err);
                        None
                    }
                })
                .fold(filter, |f, dir| f.add_directive(dir)),
            None => filter,
        }
    }

    /// Fill unset fields from `default`
    pub fn with_default(&self, default: &FilterConfig) -> FilterConfig {
        Self {
            directives: self.directives.clone().or_else(|| default.directives.clone()),
            from_env: self.from_env.clone().or_else(|| default.from_env.clone()),
        }
    }
}

impl LoggingTarget {
    pub fn supports_color(&self) -> bool {
        matches!(self, LoggingTarget::Term(_))
    }

    /// Where the lines end up: stdout yields to stderr when the command itself
    /// writes to stdout and the output is allowed to switch
    pub fn uses_stdout(&self, produces_output: bool) -> bool {
        match self {
            LoggingTarget::Term(term) => match term.name {
                TermTarget::Stdout => !term.auto_switch || !produces_output,
                TermTarget::Stderr => false,
            },
            LoggingTarget::File(_) => false,
        }
    }

    pub fn to_writer(&self, produces_output: bool) -> (NonBlocking, WorkerGuard) {
        let builder = NonBlockingBuilder::default().lossy(false);
        match self {
            LoggingTarget::Term(_) if self.uses_stdout(produces_output) => builder.finish(std::io::stdout()),
            LoggingTarget::Term(_) => builder.finish(std::io::stderr()),
            LoggingTarget::File(file) => {
                builder.finish(RollingFileAppender::new(Rotation::NEVER, &file.directory, &file.name))
            }
        }
    }
}

impl From<SpanEvent> for FmtSpan {
    fn from(e: SpanEvent) -> Self {
        match e {
            SpanEvent::New => FmtSpan::NEW,
            SpanEvent::Enter => FmtSpan::ENTER,
            SpanEvent::Exit => FmtSpan::EXIT,
            SpanEvent::Close => FmtSpan::CLOSE,
            SpanEvent::Active => FmtSpan::ACTIVE,
            SpanEvent::Full => FmtSpan::FULL,
        }
    }
}

// ====== Logging Config ======

#[derive(Debug, serde::Deserialize)]
struct LoggingConfig {
    filter: FilterConfig,
    #[serde(default)]
    outputs: Vec<LoggingOutput>,
}

#[derive(Debug, PartialEq, serde::Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    directives: Option<String>,
    #[serde(default, deserialize_with = "deserialize_filter_from_env")]
    from_env: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct LoggingOutput {
    enabled: bool,
    #[serde(default)]
    span_events: Vec<SpanEvent>,
    #[serde(default = "FilterConfig::empty")]
    filter: FilterConfig,
    target: LoggingTarget,
}

#[derive(Copy, Clone, Debug, serde::Deserialize)]
enum SpanEvent {
    New,
    Enter,
    Exit,
    Close,
    Active,
    Full,
}

#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "lowercase")]
pub enum LoggingTarget {
    Term(TermOutput),
    File(FileOutput),
}

#[derive(Debug, serde::Deserialize)]
pub struct TermOutput {
    name: TermTarget,
    #[serde(default)]
    auto_switch: bool,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
enum TermTarget {
    Stdout,
    Stderr,
}

#[derive(Debug, serde::Deserialize)]
pub struct FileOutput {
    directory: PathBuf,
    name: PathBuf,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            directives: Some("info".into()),
            from_env: Some("RUST_LOG".into()),
        }
    }
}

impl FilterConfig {
    pub fn empty() -> Self {
        Self {
            directives: None,
            from_env: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: Default::default(),
            outputs: vec![LoggingOutput {
                enabled: true,
                span_events: vec![],
                filter: FilterConfig::empty(),
                target: LoggingTarget::Term(TermOutput {
                    name: TermTarget::Stdout,
                    auto_switch: true,
                }),
            }],
        }
    }
}

// ====== serde helpers ======

/// Deserialize `false` to `None`, `true` to `Some("RUST_LOG")`, and a string to itself
fn deserialize_filter_from_env<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct VisitFromEnv;

    impl<'de> serde::de::Visitor<'de> for VisitFromEnv {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a bool or the name of an environment variable")
        }

        fn visit_bool<E>(self, value: bool) -> std::result::Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(if value { Some("RUST_LOG".into()) } else { None })
        }

        fn visit_str<E>(self, value: &str) -> std::result::Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Some(value.to_owned()))
        }
    }

    deserializer.deserialize_any(VisitFromEnv)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(directives: Option<&str>, from_env: Option<&str>) -> FilterConfig {
        FilterConfig {
            directives: directives.map(Into::into),
            from_env: from_env.map(Into::into),
        }
    }

    #[test]
    fn output_filter_falls_back_per_field() {
        let global = filter(Some("info"), Some("RUST_LOG"));

        assert_eq!(FilterConfig::empty().with_default(&global), global);
        assert_eq!(
            filter(Some("debug"), None).with_default(&global),
            filter(Some("debug"), Some("RUST_LOG"))
        );
        assert_eq!(
            filter(None, Some("QUEUESIM_LOG")).with_default(&global),
            filter(Some("info"), Some("QUEUESIM_LOG"))
        );
    }

    #[test]
    fn from_env_accepts_bool_or_name() {
        let on: FilterConfig = serde_json::from_str(r#"{"from_env": true}"#).unwrap();
        assert_eq!(on, filter(None, Some("RUST_LOG")));

        let off: FilterConfig = serde_json::from_str(r#"{"directives": "warn", "from_env": false}"#).unwrap();
        assert_eq!(off, filter(Some("warn"), None));

        let named: FilterConfig = serde_json::from_str(r#"{"from_env": "MY_LOG"}"#).unwrap();
        assert_eq!(named, filter(None, Some("MY_LOG")));
    }

    #[test]
    fn stdout_switches_away_when_the_command_prints() {
        let switching = LoggingTarget::Term(TermOutput {
            name: TermTarget::Stdout,
            auto_switch: true,
        });
        assert!(switching.uses_stdout(false));
        assert!(!switching.uses_stdout(true));

        let pinned = LoggingTarget::Term(TermOutput {
            name: TermTarget::Stdout,
            auto_switch: false,
        });
        assert!(pinned.uses_stdout(true));

        let stderr = LoggingTarget::Term(TermOutput {
            name: TermTarget::Stderr,
            auto_switch: true,
        });
        assert!(!stderr.uses_stdout(false));
    }

    #[test]
    fn default_config_parses() {
        let mut app = crate::utils::app_config::AppConfig::new();
        app.setup().unwrap();
        let cfg: LoggingConfig = app.get("logging").unwrap();
        assert!(!cfg.outputs.is_empty());
        assert!(cfg.outputs[0].target.supports_color());
    }
}
