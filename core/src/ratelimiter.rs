use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;

/// Token bucket used to pace outbound probes.
///
/// Tokens refill in a background task which exits once every clone of the
/// limiter has been dropped. Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct RateLimiter {
    sem: Arc<Semaphore>,
}

impl RateLimiter {
    pub fn new(tokens_per_sec: u32) -> Self {
        let per_sec = tokens_per_sec.max(1);
        let burst = per_sec as usize;
        let sem = Arc::new(Semaphore::new(burst));
        let weak: Weak<Semaphore> = Arc::downgrade(&sem);
        let period = Duration::from_micros(1_000_000 / u64::from(per_sec));
        tokio::spawn(async move {
            let mut t = tokio::time::interval(period);
            t.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                t.tick().await;
                let Some(sem) = weak.upgrade() else { break };
                if sem.available_permits() < burst {
                    sem.add_permits(1);
                }
            }
        });
        RateLimiter { sem }
    }

    /// Wait for one token and consume it.
    pub async fn acquire(&self) {
        if let Ok(permit) = self.sem.acquire().await {
            permit.forget();
        }
    }
}
