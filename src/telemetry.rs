//! Log subscriber setup and the process-wide panic hook.

use std::backtrace::Backtrace;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Env;

const DEFAULT_FILTER: &str = "event_planner=debug,tower_http=info,axum=info";

/// init_tracing
///
/// Installs the global subscriber. `RUST_LOG` takes priority over the default filter.
/// Local runs get the pretty formatter, production gets one JSON object per line.
pub fn init_tracing(env: Env) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    match env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }
}

/// install_panic_hook
///
/// Routes every panic through `tracing` at the point it happens, with its location and
/// a captured backtrace. The request-level recovery stage only sees the payload, so the
/// stack trace has to be taken here.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let message = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        tracing::error!(
            panic = %message,
            location = %location,
            backtrace = %Backtrace::force_capture(),
            "panic"
        );
    }));
}
