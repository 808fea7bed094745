use eprof::engine::progress::{Progress, ProgressCallback};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const SPINNER_TICK_MS: u64 = 80;

struct BarState {
    pb: ProgressBar,
    phase: &'static str,
}

/// Renders engine progress events as a single spinner / bar on stderr.
///
/// Sweeps report one increment per evaluated height, so the bar length is the total
/// number of energy evaluations across every method.
#[derive(Clone)]
pub struct CliProgressHandler {
    state: Arc<Mutex<BarState>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    fn with_draw_target(target: ProgressDrawTarget) -> Self {
        let pb = ProgressBar::new(0)
            .with_style(Self::spinner_style())
            .with_message("Initializing...");
        pb.set_draw_target(target);
        pb.finish_and_clear();

        Self {
            state: Arc::new(Mutex::new(BarState { pb, phase: "" })),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let state = self.state.clone();

        Box::new(move |progress: Progress| {
            let Ok(mut guard) = state.lock() else {
                warn!("Progress bar mutex was poisoned. Cannot update progress.");
                return;
            };
            let BarState { pb, phase } = &mut *guard;

            match progress {
                Progress::PhaseStart { name } => {
                    *phase = name;
                    pb.reset();
                    pb.set_length(0);
                    pb.set_style(Self::spinner_style());
                    pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
                    pb.set_message(name);
                }
                Progress::PhaseFinish => {
                    pb.disable_steady_tick();
                    pb.finish_with_message(format!("✓ {phase}"));
                }
                Progress::TaskStart { total_steps } => {
                    pb.disable_steady_tick();
                    pb.reset();
                    pb.set_length(total_steps);
                    pb.set_position(0);
                    pb.set_style(Self::bar_style());
                    pb.set_message(format!("{phase} energies"));
                }
                Progress::TaskIncrement => {
                    pb.inc(1);
                }
                Progress::TaskFinish => {
                    let length = pb.length().unwrap_or(0);
                    if pb.position() < length {
                        pb.set_position(length);
                    }
                    pb.finish();
                }
                Progress::Message(msg) => {
                    pb.println(format!("  {msg}"));
                }
            }
        })
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template("{msg:<20} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .with_key(
                "eta",
                |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                    let _ = write!(w, "{:.0}s", state.eta().as_secs_f64());
                },
            )
            .progress_chars("##-")
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn hidden() -> CliProgressHandler {
        CliProgressHandler::with_draw_target(ProgressDrawTarget::hidden())
    }

    #[test]
    fn handler_initializes_in_a_clean_state() {
        let handler = hidden();
        let state = handler.state.lock().unwrap();
        assert_eq!(state.pb.length(), Some(0));
        assert!(state.pb.is_finished());
        assert_eq!(state.phase, "");
    }

    #[test]
    fn sampling_phase_drives_the_bar() {
        let handler = hidden();
        let callback = handler.get_callback();

        callback(Progress::PhaseStart { name: "Sampling" });
        {
            let state = handler.state.lock().unwrap();
            assert_eq!(state.pb.message(), "Sampling");
            assert_eq!(state.phase, "Sampling");
            assert!(!state.pb.is_finished());
        }

        callback(Progress::TaskStart { total_steps: 46 });
        {
            let state = handler.state.lock().unwrap();
            assert_eq!(state.pb.length(), Some(46));
            assert_eq!(state.pb.position(), 0);
            assert_eq!(state.pb.message(), "Sampling energies");
        }

        callback(Progress::TaskIncrement);
        callback(Progress::TaskIncrement);
        assert_eq!(handler.state.lock().unwrap().pb.position(), 2);

        callback(Progress::TaskFinish);
        {
            let state = handler.state.lock().unwrap();
            assert!(state.pb.is_finished());
            assert_eq!(state.pb.position(), 46);
        }

        callback(Progress::PhaseFinish);
        assert_eq!(handler.state.lock().unwrap().pb.message(), "✓ Sampling");
    }

    #[test]
    fn messages_do_not_disturb_the_bar() {
        let handler = hidden();
        let callback = handler.get_callback();
        callback(Progress::PhaseStart { name: "Setup" });
        callback(Progress::Message("Estimated time: ~16 min (ML only)".to_string()));
        let state = handler.state.lock().unwrap();
        assert_eq!(state.pb.message(), "Setup");
    }

    #[test]
    fn callback_is_thread_safe() {
        let handler = hidden();
        let callback = handler.get_callback();

        thread::spawn(move || {
            callback(Progress::PhaseStart { name: "Saving" });
            callback(Progress::TaskIncrement);
            callback(Progress::PhaseFinish);
        })
        .join()
        .unwrap();

        let state = handler.state.lock().unwrap();
        assert!(state.pb.is_finished());
        assert_eq!(state.pb.message(), "✓ Saving");
    }
}
