//! Boots an ECDS runtime, exercises the class registry and the default
//! dispatcher once, then shuts everything down.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use ecds_bus::{Service, ShutdownPolicy};
use ecds_object::{Object, Ref};
use ecds_runtime::{logging, register_test_class, LogLevel, Runtime, RuntimeConfig, TEST_CLASS_NAME};
use log::info;

/// Event carrying the launcher's greeting text.
const GREETING_EVENT: u32 = 0x0000_0100;

#[derive(Parser, Debug)]
#[command(author, version, about = "Start an ECDS runtime", long_about = None)]
struct Cli {
    /// Log threshold; overrides ECDS_LOG.
    #[arg(long, value_enum)]
    log_level: Option<LogLevelArg>,

    /// What the dispatcher does with queued messages on shutdown; overrides
    /// ECDS_SHUTDOWN.
    #[arg(long, value_enum)]
    shutdown: Option<ShutdownArg>,

    /// Text posted through the default dispatcher.
    #[arg(long, default_value = "hello from ecds")]
    greeting: String,

    /// Seconds to wait for the dispatcher to go idle.
    #[arg(long, default_value_t = 5)]
    flush_timeout: u64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevelArg {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Fatal => LogLevel::Fatal,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ShutdownArg {
    /// Discard undelivered messages.
    Drop,
    /// Deliver everything queued before stopping.
    Drain,
}

impl From<ShutdownArg> for ShutdownPolicy {
    fn from(arg: ShutdownArg) -> Self {
        match arg {
            ShutdownArg::Drop => ShutdownPolicy::Drop,
            ShutdownArg::Drain => ShutdownPolicy::Drain,
        }
    }
}

impl Cli {
    /// Applies the command-line overrides on top of `base`.
    fn config(&self, base: RuntimeConfig) -> RuntimeConfig {
        let mut config = base;
        if let Some(level) = self.log_level {
            config = config.log_level(level.into());
        }
        if let Some(policy) = self.shutdown {
            config = config.shutdown_policy(policy.into());
        }
        config
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let base = RuntimeConfig::from_env().context("invalid runtime environment")?;
    let config = cli.config(base);
    logging::init(config.log_level);

    let runtime = match Runtime::new(config) {
        Ok(runtime) => runtime,
        Err(err) => logging::fatal(format!("unable to start runtime: {err}")),
    };

    smoke_test_class(&runtime)?;
    greet(&runtime, &cli.greeting, Duration::from_secs(cli.flush_timeout))?;

    runtime.shutdown();
    Ok(())
}

fn smoke_test_class(runtime: &Runtime) -> Result<()> {
    let uid = register_test_class(runtime.classes())?;
    let object = runtime
        .construct(TEST_CLASS_NAME, None)
        .with_context(|| format!("failed to construct {TEST_CLASS_NAME}"))?;
    info!("constructed {} (class {uid:#010X})", object.name());
    drop(object);
    Ok(())
}

fn greet(runtime: &Runtime, text: &str, timeout: Duration) -> Result<()> {
    let service = greeter(runtime)?;
    runtime.attach(GREETING_EVENT, &service)?;
    runtime
        .post_event(GREETING_EVENT, None, text.as_bytes())
        .context("failed to post greeting")?;
    if !runtime.flush(timeout) {
        bail!("dispatcher did not go idle within {timeout:?}");
    }
    let metrics = runtime.dispatcher().metrics();
    info!(
        "dispatcher {}: {} posted, {} delivered",
        runtime.dispatcher().dispatcher_name(),
        metrics.posted,
        metrics.delivered
    );
    Ok(())
}

fn greeter(runtime: &Runtime) -> Result<Ref<Service>> {
    let service = Service::new(runtime.manager(), Some("ecds-greeter"))?;
    service.add_handler(GREETING_EVENT, |_, message, data| {
        println!("{}", String::from_utf8_lossy(data.as_bytes()));
        info!("greeting {} delivered", message.uid());
    });
    Ok(service)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_environment() {
        let cli = Cli::parse_from(["ecds-launcher", "--log-level", "debug", "--shutdown", "drain"]);
        let base = RuntimeConfig::default().shutdown_policy(ShutdownPolicy::Drop);
        let config = cli.config(base);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.dispatcher.shutdown_policy, ShutdownPolicy::Drain);
    }

    #[test]
    fn missing_flags_keep_environment() {
        let cli = Cli::parse_from(["ecds-launcher"]);
        let base = RuntimeConfig::default().log_level(LogLevel::Warn);
        let config = cli.config(base);
        assert_eq!(config.log_level, LogLevel::Warn);
        assert_eq!(config.dispatcher.shutdown_policy, ShutdownPolicy::Drop);
        assert_eq!(cli.greeting, "hello from ecds");
    }

    #[test]
    fn greeting_reaches_the_service() {
        let runtime = Runtime::new(RuntimeConfig::default()).expect("runtime");
        greet(&runtime, "hi", Duration::from_secs(5)).expect("greet");
        assert_eq!(runtime.dispatcher().metrics().delivered, 1);
        smoke_test_class(&runtime).expect("test class");
    }
}
