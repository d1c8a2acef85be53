/// Events emitted while a consumer walks a trajectory.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    /// `total` is `None` for streams whose frame count is unknown up front.
    Started {
        task: &'static str,
        total: Option<u64>,
    },
    /// Frames completed since the previous event.
    Frames(u64),
    Finished {
        frames: u64,
    },
    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

/// Optional sink for [`Progress`] events; silent when built with [`ProgressReporter::new`].
#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }

    pub(crate) fn frames(&self, count: u64) {
        if count > 0 {
            self.report(Progress::Frames(count));
        }
    }
}
