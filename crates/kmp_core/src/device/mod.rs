//! Compute backend selection.
//!
//! The backend is chosen once and cached for the process. Jobs read the
//! cached [`DeviceContext`]; [`DeviceSelector::reset`] forces a re-probe.
//!
//! Stages that run on the accelerator use [`run_with_fallback`]: one attempt
//! on the selected backend and, if that was the accelerator and it failed,
//! one more on the general-purpose processor.

mod probe;

use std::fmt::Display;

use parking_lot::Mutex;

pub use probe::{CommandProbe, DeviceProbe, ProbeOutcome, StaticProbe};

use crate::models::{Backend, DevicePreference};

/// Backend shared by every job in the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceContext {
    pub backend: Backend,
}

impl DeviceContext {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    pub fn is_accelerated(&self) -> bool {
        self.backend == Backend::Accelerated
    }
}

#[derive(Debug, Default)]
struct SelectorState {
    cached: Option<DeviceContext>,
    pending_warning: Option<String>,
}

/// Chooses and caches the compute backend.
pub struct DeviceSelector {
    probe: Box<dyn DeviceProbe>,
    preference: DevicePreference,
    state: Mutex<SelectorState>,
}

impl DeviceSelector {
    pub fn new(probe: Box<dyn DeviceProbe>, preference: DevicePreference) -> Self {
        Self {
            probe,
            preference,
            state: Mutex::new(SelectorState::default()),
        }
    }

    /// Selector with the production probe command.
    pub fn from_command(command: &str, preference: DevicePreference) -> Self {
        Self::new(Box::new(CommandProbe::new(command)), preference)
    }

    /// Return the cached backend, probing on first use.
    ///
    /// Never fails: a missing or broken accelerator selects
    /// [`Backend::General`].
    pub fn select(&self) -> DeviceContext {
        let mut state = self.state.lock();
        if let Some(context) = state.cached {
            return context;
        }

        let backend = match self.preference {
            DevicePreference::Accelerated => Backend::Accelerated,
            DevicePreference::General => Backend::General,
            DevicePreference::Auto => match self.probe.probe() {
                ProbeOutcome::Available(name) => {
                    tracing::debug!(device = %name, "Accelerator found");
                    Backend::Accelerated
                }
                ProbeOutcome::Absent => Backend::General,
                ProbeOutcome::Failed(reason) => {
                    tracing::warn!("Device probe failed, using general processor: {}", reason);
                    state.pending_warning = Some(format!("Device probe failed: {}", reason));
                    Backend::General
                }
            },
        };

        tracing::info!("Compute backend: {}", backend);
        let context = DeviceContext::new(backend);
        state.cached = Some(context);
        context
    }

    /// Take the probe warning raised by the last fresh selection, if any.
    pub fn take_warning(&self) -> Option<String> {
        self.state.lock().pending_warning.take()
    }

    /// Forget the cached backend; the next [`select`](Self::select) re-probes.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.cached = None;
        state.pending_warning = None;
    }

    /// Cached backend without probing.
    pub fn cached(&self) -> Option<DeviceContext> {
        self.state.lock().cached
    }
}

/// Run `attempt` on the selected backend, retrying once on the general
/// processor if the accelerator attempt fails.
///
/// `on_fallback` receives the accelerator error before the retry.
pub fn run_with_fallback<T, E, F>(
    context: DeviceContext,
    mut attempt: F,
    on_fallback: impl FnOnce(&E),
) -> Result<T, E>
where
    F: FnMut(Backend) -> Result<T, E>,
    E: Display,
{
    match attempt(context.backend) {
        Ok(value) => Ok(value),
        Err(e) if context.is_accelerated() => {
            tracing::warn!("Accelerated run failed, retrying on general processor: {}", e);
            on_fallback(&e);
            attempt(Backend::General)
        }
        Err(e) => Err(e),
    }
}
