#[derive(Debug, Clone)]
pub enum Progress {
    PhaseStart { name: &'static str },
    PhaseFinish,

    /// A sweep over `total_steps` height points is starting.
    TaskStart { total_steps: u64 },
    TaskIncrement,
    TaskFinish,

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

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
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn reporter_without_callback_is_silent() {
        ProgressReporter::new().report(Progress::PhaseFinish);
    }

    #[test]
    fn reporter_forwards_events_to_callback() {
        let seen = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::TaskStart { total_steps } = event {
                seen.lock().unwrap().push(total_steps);
            }
        }));
        reporter.report(Progress::TaskStart { total_steps: 31 });
        reporter.report(Progress::TaskIncrement);
        drop(reporter);
        assert_eq!(seen.into_inner().unwrap(), vec![31]);
    }
}
