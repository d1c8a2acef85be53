use chemtraj::analysis::{Progress, ProgressCallback};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

const TICK: Duration = Duration::from_millis(120);

/// Draws trajectory progress on stderr.
///
/// Streamed inputs rarely know their length, so the bar starts as a frame
/// counter and only switches to a bounded bar when a total is announced.
#[derive(Clone)]
pub struct CliProgressHandler {
    bar: ProgressBar,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        Self::drawing_to(ProgressDrawTarget::stderr())
    }

    fn drawing_to(target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(None, target);
        Self { bar }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let bar = self.bar.clone();
        Box::new(move |event| apply(&bar, event))
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn apply(bar: &ProgressBar, event: Progress) {
    match event {
        Progress::Started { task, total } => {
            bar.reset();
            bar.set_message(task);
            match total {
                Some(total) => {
                    bar.set_length(total);
                    bar.set_style(bounded_style());
                }
                None => {
                    bar.unset_length();
                    bar.set_style(counter_style());
                    bar.enable_steady_tick(TICK);
                }
            }
        }
        Progress::Frames(n) => bar.inc(n),
        Progress::Finished { frames } => {
            bar.disable_steady_tick();
            bar.set_position(frames);
            bar.finish_with_message(format!("✓ {frames} frame(s)"));
        }
        Progress::Message(msg) if bar.is_finished() => bar.set_message(msg),
        Progress::Message(msg) => bar.println(format!("  {msg}")),
    }
}

fn counter_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg} {human_pos} frames [{elapsed}, {per_sec}]")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bounded_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg:<12} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn hidden() -> CliProgressHandler {
        CliProgressHandler::drawing_to(ProgressDrawTarget::hidden())
    }

    #[test]
    fn unknown_length_counts_frames() {
        let handler = hidden();
        let callback = handler.get_callback();

        callback(Progress::Started {
            task: "RMSD",
            total: None,
        });
        callback(Progress::Frames(4));
        callback(Progress::Frames(2));

        assert_eq!(handler.bar.length(), None);
        assert_eq!(handler.bar.position(), 6);
        assert_eq!(handler.bar.message(), "RMSD");
        assert!(!handler.bar.is_finished());
    }

    #[test]
    fn known_length_becomes_a_bar_and_finishes_full() {
        let handler = hidden();
        let callback = handler.get_callback();

        callback(Progress::Started {
            task: "Converting",
            total: Some(10),
        });
        callback(Progress::Frames(3));
        assert_eq!(handler.bar.length(), Some(10));

        callback(Progress::Finished { frames: 10 });
        assert!(handler.bar.is_finished());
        assert_eq!(handler.bar.position(), 10);
        assert_eq!(handler.bar.message(), "✓ 10 frame(s)");
    }

    #[test]
    fn restarting_resets_the_count() {
        let handler = hidden();
        let callback = handler.get_callback();

        callback(Progress::Started {
            task: "first",
            total: None,
        });
        callback(Progress::Frames(5));
        callback(Progress::Finished { frames: 5 });
        callback(Progress::Started {
            task: "second",
            total: None,
        });

        assert_eq!(handler.bar.position(), 0);
        assert_eq!(handler.bar.message(), "second");
    }

    #[test]
    fn events_can_come_from_worker_threads() {
        let handler = hidden();
        let callback = handler.get_callback();

        thread::spawn(move || {
            callback(Progress::Started {
                task: "RDF",
                total: None,
            });
            callback(Progress::Frames(1));
            callback(Progress::Finished { frames: 1 });
        })
        .join()
        .unwrap();

        assert!(handler.bar.is_finished());
        assert_eq!(handler.bar.position(), 1);
    }
}
