// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.

use std::time::{Duration, Instant};

/// Logs how long a phase took at trace level, either on drop or when
/// [`ScopeTimer::finish`] hands the duration back to the caller.
pub struct ScopeTimer<'a> {
    name: &'a str,
    start_time: Instant,
    reported: bool,
}

impl<'a> ScopeTimer<'a> {
    pub fn new(name: &'a str) -> Self {
        Self {
            name,
            start_time: Instant::now(),
            reported: false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn finish(mut self) -> Duration {
        let elapsed = self.start_time.elapsed();
        self.report(elapsed);
        elapsed
    }

    fn report(&mut self, elapsed: Duration) {
        self.reported = true;
        log::trace!("{} took {:.2?}", self.name, elapsed);
    }
}

impl Drop for ScopeTimer<'_> {
    fn drop(&mut self) {
        if !self.reported {
            let elapsed = self.start_time.elapsed();
            self.report(elapsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_returns_monotonic_duration() {
        let timer = ScopeTimer::new("test phase");
        let early = timer.elapsed();
        let total = timer.finish();
        assert!(total >= early);
    }
}
