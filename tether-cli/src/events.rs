//! Diagnostic tracing setup.

use std::collections::HashSet;
use std::fmt::Display;

use tracing_subscriber::{
    Layer, Registry, filter::Targets, layer::SubscriberExt, reload::Handle,
    util::SubscriberInitExt,
};

use crate::error::CliError;

/// Type of event to trace.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, clap::ValueEnum, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraceEvent {
    /// Traces process creation, exit, and termination.
    #[clap(name = "process")]
    Process,
    /// Traces bytes moving through the stdin and stdout pipes.
    #[clap(name = "pipes")]
    Pipes,
    /// Traces signal delivery.
    #[clap(name = "signals")]
    Signals,
}

impl Display for TraceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Process => write!(f, "process"),
            Self::Pipes => write!(f, "pipes"),
            Self::Signals => write!(f, "signals"),
        }
    }
}

impl TraceEvent {
    const fn target(self) -> &'static str {
        match self {
            Self::Process => tether_core::trace_categories::PROCESS,
            Self::Pipes => tether_core::trace_categories::PIPES,
            Self::Signals => tether_core::trace_categories::SIGNALS,
        }
    }
}

/// Tracks which trace events are enabled and owns the handle used to change them.
#[derive(Default)]
pub struct TraceEventConfig {
    enabled_trace_events: HashSet<TraceEvent>,
    handle: Option<Handle<Targets, Registry>>,
}

impl TraceEventConfig {
    /// Installs the global subscriber, writing to stderr.
    ///
    /// # Arguments
    ///
    /// * `enabled_debug_events` - Events to trace at debug level from the start.
    pub fn init(enabled_debug_events: &[TraceEvent]) -> Self {
        let mut config = Self {
            enabled_trace_events: enabled_debug_events.iter().copied().collect(),
            ..Default::default()
        };

        let filter = config.compose_filter();

        // Reloadable, so the config file can enable more events once it is read.
        let (reload_filter, handle) = tracing_subscriber::reload::Layer::new(filter);

        let layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .without_time()
            .with_target(false)
            .with_filter(reload_filter);

        if tracing_subscriber::registry()
            .with(layer)
            .try_init()
            .is_ok()
        {
            config.handle = Some(handle);
        } else {
            // Something went wrong; proceed on anyway but complain audibly.
            eprintln!("warning: failed to initialize tracing.");
        }

        config
    }

    fn compose_filter(&self) -> Targets {
        let filter = Targets::new().with_default(tracing_subscriber::filter::LevelFilter::INFO);

        filter.with_targets(
            self.enabled_trace_events
                .iter()
                .map(|event| (event.target(), tracing::Level::DEBUG)),
        )
    }

    /// Enables tracing of an additional event.
    pub fn enable(&mut self, event: TraceEvent) -> Result<(), CliError> {
        // Don't bother to reload config if nothing has changed.
        if !self.enabled_trace_events.insert(event) {
            return Ok(());
        }

        self.reload_filter()
    }

    fn reload_filter(&self) -> Result<(), CliError> {
        let handle = self
            .handle
            .as_ref()
            .ok_or(CliError::Tracing("tracing not initialized"))?;

        handle
            .reload(self.compose_filter())
            .map_err(|_err| CliError::Tracing("failed to enable tracing events"))
    }
}
