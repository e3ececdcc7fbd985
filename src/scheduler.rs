use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Owns the single repeating refresh timer. Each tick sends a clone of
/// `message` into the event loop; the loop decides what a tick does.
pub struct RefreshScheduler<T> {
    sender: UnboundedSender<T>,
    message: T,
    period: Option<Duration>,
    timer: Option<JoinHandle<()>>,
}

impl<T: Clone + Send + 'static> RefreshScheduler<T> {
    pub fn new(sender: UnboundedSender<T>, message: T) -> Self {
        Self {
            sender,
            message,
            period: None,
            timer: None,
        }
    }

    /// Replaces the running timer. The new one starts a full period from
    /// now; elapsed time on the old one is not carried over.
    pub fn set_period(&mut self, period: Duration) {
        self.cancel();
        let period = period.max(Duration::from_secs(1));
        let sender = self.sender.clone();
        let message = self.message.clone();
        let handle = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if sender.send(message.clone()).is_err() {
                    break;
                }
            }
        });
        self.timer = Some(handle);
        self.period = Some(period);
        info!(seconds = period.as_secs(), "refresh timer started");
    }

    pub fn set_seconds(&mut self, seconds: u64) {
        self.set_period(Duration::from_secs(seconds));
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.timer.as_ref().is_some_and(|timer| !timer.is_finished())
    }

    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
            debug!("refresh timer cancelled");
        }
        self.period = None;
    }
}

impl<T> Drop for RefreshScheduler<T> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::unbounded_channel;

    use super::*;

    fn assert_after(elapsed: Duration, seconds: u64) {
        let expected = Duration::from_secs(seconds);
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_secs(1),
            "expected ~{seconds}s, got {elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_at_configured_period() {
        let (tx, mut rx) = unbounded_channel();
        let mut scheduler = RefreshScheduler::new(tx, "tick");
        let start = Instant::now();
        scheduler.set_seconds(90);

        assert_eq!(rx.recv().await, Some("tick"));
        assert_after(start.elapsed(), 90);
        assert_eq!(rx.recv().await, Some("tick"));
        assert_after(start.elapsed(), 180);
        assert!(scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn changing_period_replaces_old_timer() {
        let (tx, mut rx) = unbounded_channel();
        let mut scheduler = RefreshScheduler::new(tx, ());
        let start = Instant::now();
        scheduler.set_seconds(45);
        scheduler.set_seconds(100);

        rx.recv().await;
        assert_after(start.elapsed(), 100);
        assert_eq!(scheduler.period(), Some(Duration::from_secs(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_does_not_carry_elapsed_time() {
        let (tx, mut rx) = unbounded_channel();
        let mut scheduler = RefreshScheduler::new(tx, ());
        scheduler.set_seconds(60);
        tokio::time::sleep(Duration::from_secs(50)).await;

        let restarted = Instant::now();
        scheduler.set_seconds(60);
        rx.recv().await;
        assert_after(restarted.elapsed(), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_ticks() {
        let (tx, mut rx) = unbounded_channel();
        let mut scheduler = RefreshScheduler::new(tx, ());
        scheduler.set_seconds(10);
        scheduler.cancel();
        assert!(!scheduler.is_running());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }
}
