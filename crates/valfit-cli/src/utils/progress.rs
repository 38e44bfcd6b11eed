use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use valfit::engine::progress::{Progress, ProgressCallback};

const SPINNER_TICK_MS: u64 = 80;

/// Renders pipeline progress events on stderr: a spinner per phase, a bar per task.
#[derive(Clone)]
pub struct CliProgressHandler {
    pb: ProgressBar,
    phases: Arc<AtomicUsize>,
}

impl CliProgressHandler {
    pub fn new(hidden: bool) -> Self {
        let target = if hidden {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stderr()
        };
        let pb = ProgressBar::with_draw_target(Some(0), target).with_style(Self::spinner_style());
        pb.finish_and_clear();
        Self {
            pb,
            phases: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let pb = self.pb.clone();
        let phases = self.phases.clone();

        Box::new(move |progress: Progress| match progress {
            Progress::PhaseStart { name } => {
                let index = phases.fetch_add(1, Ordering::Relaxed) + 1;
                pb.reset();
                pb.set_length(0);
                pb.set_style(Self::spinner_style());
                pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
                pb.set_message(format!("[{}] {}", index, name));
            }
            Progress::PhaseFinish => {
                pb.disable_steady_tick();
                let message = pb.message();
                pb.finish_with_message(format!("{} ✓", message));
            }
            Progress::TaskStart { total_steps } => {
                pb.disable_steady_tick();
                pb.reset();
                pb.set_length(total_steps);
                pb.set_position(0);
                pb.set_style(Self::bar_style());
            }
            Progress::TaskIncrement => pb.inc(1),
            Progress::TaskFinish => {
                let length = pb.length().unwrap_or(0);
                if pb.position() < length {
                    pb.set_position(length);
                }
                pb.finish();
            }
            Progress::Message(msg) => pb.println(format!("  {}", msg)),
        })
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template("{msg:<28} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn handler_starts_finished_and_empty() {
        let handler = CliProgressHandler::new(true);
        assert_eq!(handler.pb.length(), Some(0));
        assert!(handler.pb.is_finished());
    }

    #[test]
    fn phases_are_numbered_and_tasks_complete() {
        let handler = CliProgressHandler::new(true);
        let callback = handler.get_callback();

        callback(Progress::PhaseStart { name: "Loading Inputs" });
        callback(Progress::PhaseFinish);
        callback(Progress::PhaseStart {
            name: "Curating Datasets",
        });
        assert_eq!(handler.pb.message(), "[2] Curating Datasets");
        assert!(!handler.pb.is_finished());

        callback(Progress::TaskStart { total_steps: 40 });
        assert_eq!(handler.pb.length(), Some(40));
        callback(Progress::TaskIncrement);
        assert_eq!(handler.pb.position(), 1);
        callback(Progress::TaskFinish);
        assert_eq!(handler.pb.position(), 40);
        assert!(handler.pb.is_finished());

        callback(Progress::PhaseFinish);
        assert_eq!(handler.pb.message(), "[2] Curating Datasets ✓");
    }

    #[test]
    fn callback_can_be_sent_to_another_thread() {
        let handler = CliProgressHandler::new(true);
        let callback = handler.get_callback();
        thread::spawn(move || {
            callback(Progress::PhaseStart { name: "Modified Seminario" });
            callback(Progress::TaskStart { total_steps: 2 });
            callback(Progress::TaskIncrement);
            callback(Progress::TaskIncrement);
        })
        .join()
        .unwrap();
        assert_eq!(handler.pb.position(), 2);
    }
}
