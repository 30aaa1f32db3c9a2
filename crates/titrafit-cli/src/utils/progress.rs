use indicatif::{ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use titrafit::engine::progress::{Progress, ProgressCallback};
use tracing::warn;

const SPINNER_TICK_MS: u64 = 100;
const IDLE_LABEL: &str = "titrafit";

struct BarState {
    pb: ProgressBar,
    /// Job currently running, used as the bar prefix.
    phase: &'static str,
    warnings: usize,
}

/// Renders one analysis job at a time: a spinner while the job prepares its
/// refits, then a bar counting finished refits.
#[derive(Clone)]
pub struct CliProgressHandler {
    state: Arc<Mutex<BarState>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    pub fn hidden() -> Self {
        Self::with_draw_target(ProgressDrawTarget::hidden())
    }

    fn with_draw_target(target: ProgressDrawTarget) -> Self {
        let pb = ProgressBar::with_draw_target(Some(0), target)
            .with_style(Self::preparing_style())
            .with_prefix(IDLE_LABEL);
        pb.finish_and_clear();

        Self {
            state: Arc::new(Mutex::new(BarState {
                pb,
                phase: IDLE_LABEL,
                warnings: 0,
            })),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let shared = self.state.clone();

        Box::new(move |progress: Progress| {
            let Ok(mut state) = shared.lock() else {
                warn!("Progress state mutex was poisoned; dropping a progress event.");
                return;
            };
            state.apply(progress);
        })
    }

    fn preparing_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
    }

    fn refit_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{prefix:>18.bold} [{bar:32.green/white}] {pos}/{len} fits {rate} eta {eta_s}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .with_key("rate", |state: &ProgressState, w: &mut dyn std::fmt::Write| {
            let _ = write!(w, "({:.1}/s)", state.per_sec());
        })
        .with_key("eta_s", |state: &ProgressState, w: &mut dyn std::fmt::Write| {
            let _ = write!(w, "{:.0}s", state.eta().as_secs_f64());
        })
        .progress_chars("=> ")
    }
}

impl BarState {
    fn apply(&mut self, progress: Progress) {
        match progress {
            Progress::PhaseStart { name } => {
                self.phase = name;
                self.warnings = 0;
                self.pb.reset();
                self.pb.set_length(0);
                self.pb.set_style(CliProgressHandler::preparing_style());
                self.pb.set_prefix(name);
                self.pb.set_message("preparing refits");
                self.pb
                    .enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
            }
            Progress::TaskStart { total_steps } => {
                self.pb.disable_steady_tick();
                self.pb.reset();
                self.pb.set_style(CliProgressHandler::refit_style());
                self.pb.set_prefix(self.phase);
                self.pb.set_length(total_steps);
                self.pb.set_position(0);
            }
            Progress::TaskIncrement => self.pb.inc(1),
            Progress::TaskFinish => {
                // Interrupted jobs stop short; keep the count they reached.
                self.pb.abandon();
            }
            Progress::PhaseFinish => {
                self.pb.disable_steady_tick();
                self.pb.set_style(CliProgressHandler::preparing_style());
                if self.warnings > 0 {
                    self.pb.println(format!(
                        "  {}: {} warning(s) reported",
                        self.phase, self.warnings
                    ));
                }
                self.pb.finish_with_message("✓ Done");
            }
            Progress::Message(msg) => {
                if self.pb.is_finished() {
                    self.pb.set_message(msg);
                } else {
                    self.pb.println(format!("  {}", msg));
                }
            }
            Progress::Warning(msg) => {
                self.warnings += 1;
                self.pb.println(format!("  ⚠ {}", msg));
            }
        }
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

    #[test]
    fn handler_initializes_in_a_clean_state() {
        let handler = CliProgressHandler::hidden();
        let state = handler.state.lock().unwrap();
        assert_eq!(state.pb.length(), Some(0));
        assert!(state.pb.is_finished());
        assert_eq!(state.phase, IDLE_LABEL);
    }

    #[test]
    fn callback_follows_a_job_through_its_refits() {
        let handler = CliProgressHandler::hidden();
        let callback = handler.get_callback();

        callback(Progress::PhaseStart { name: "Monte Carlo" });
        {
            let state = handler.state.lock().unwrap();
            assert_eq!(state.pb.message(), "preparing refits");
            assert_eq!(state.pb.prefix(), "Monte Carlo");
            assert!(!state.pb.is_finished());
            assert_eq!(state.pb.length(), Some(0));
        }

        callback(Progress::TaskStart { total_steps: 100 });
        {
            let state = handler.state.lock().unwrap();
            assert_eq!(state.pb.length(), Some(100));
            assert_eq!(state.pb.position(), 0);
            assert_eq!(state.pb.prefix(), "Monte Carlo");
        }

        callback(Progress::TaskIncrement);
        callback(Progress::TaskIncrement);
        {
            let state = handler.state.lock().unwrap();
            assert_eq!(state.pb.position(), 2);
        }

        callback(Progress::TaskFinish);
        {
            let state = handler.state.lock().unwrap();
            assert!(state.pb.is_finished());
            assert_eq!(state.pb.position(), 2);
        }

        callback(Progress::Warning("cross-validation: nothing to do".to_string()));
        assert_eq!(handler.state.lock().unwrap().warnings, 1);
        callback(Progress::PhaseFinish);
        {
            let state = handler.state.lock().unwrap();
            assert_eq!(state.pb.message(), "✓ Done");
        }
    }

    #[test]
    fn next_job_starts_with_a_fresh_warning_count() {
        let handler = CliProgressHandler::hidden();
        let callback = handler.get_callback();

        callback(Progress::PhaseStart { name: "Grid Search" });
        callback(Progress::Warning("lg K: grid point did not converge".to_string()));
        callback(Progress::PhaseFinish);
        callback(Progress::PhaseStart { name: "Reduction Analysis" });

        let state = handler.state.lock().unwrap();
        assert_eq!(state.warnings, 0);
        assert_eq!(state.phase, "Reduction Analysis");
    }

    #[test]
    fn callback_is_thread_safe() {
        let handler = CliProgressHandler::hidden();
        let callback = handler.get_callback();

        thread::spawn(move || {
            callback(Progress::PhaseStart {
                name: "Thread Test",
            });
            callback(Progress::TaskIncrement);
            callback(Progress::PhaseFinish);
        })
        .join()
        .unwrap();

        let state = handler.state.lock().unwrap();
        assert!(state.pb.is_finished());
        assert_eq!(state.pb.message(), "✓ Done");
    }
}
