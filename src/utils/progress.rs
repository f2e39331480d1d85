//! Build progress reporting that becomes a no-op when the `progress` feature
//! is disabled or the caller did not ask for it

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};
#[cfg(feature = "progress")]
use std::time::Duration;

/// Spinner shown while a volume is enumerated
pub struct BuildProgress {
    #[cfg(feature = "progress")]
    bar: Option<ProgressBar>,
}

impl BuildProgress {
    /// A spinner on stderr when `visible`, otherwise nothing
    pub fn new(visible: bool) -> Self {
        #[cfg(feature = "progress")]
        {
            let bar = visible.then(|| {
                let pb = ProgressBar::new_spinner();
                if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
                    pb.set_style(style);
                }
                pb.enable_steady_tick(Duration::from_millis(100));
                pb
            });
            Self { bar }
        }
        #[cfg(not(feature = "progress"))]
        {
            let _ = visible;
            Self {}
        }
    }

    pub fn hidden() -> Self {
        Self::new(false)
    }

    /// Update the spinner every 4096 entries
    pub fn entries(&self, root: &str, count: usize) {
        #[cfg(feature = "progress")]
        if let Some(pb) = &self.bar
            && count % 4096 == 0
        {
            pb.set_message(format!("Scanning {root}: {count} entries"));
        }
        #[cfg(not(feature = "progress"))]
        let _ = (root, count);
    }

    pub fn stage(&self, msg: &str) {
        #[cfg(feature = "progress")]
        if let Some(pb) = &self.bar {
            pb.set_message(msg.to_string());
        }
        #[cfg(not(feature = "progress"))]
        let _ = msg;
    }

    pub fn finish(&self, msg: &str) {
        #[cfg(feature = "progress")]
        if let Some(pb) = &self.bar {
            pb.finish_with_message(msg.to_string());
        }
        #[cfg(not(feature = "progress"))]
        let _ = msg;
    }
}
