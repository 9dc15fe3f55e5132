use crate::config::Limits;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Outcome of a rate-limit check. Exceeding a window never errors; the
/// router turns a denial into a user-facing message and a security event.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Decision {
    Allowed,
    Denied { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

#[derive(Default)]
struct CustomerWindows {
    messages: VecDeque<Instant>,
    orders: VecDeque<Instant>,
    cooldown_until: Option<Instant>,
}

/// Per-customer sliding windows for messages and order placements, plus an
/// error-triggered cooldown. Windows reset by wall-clock expiry only.
pub struct RateLimiter {
    limits: Limits,
    state: Mutex<HashMap<String, CustomerWindows>>,
}

impl RateLimiter {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            state: Mutex::new(HashMap::new()),
        }
    }

    pub async fn check_message(&self, customer_id: &str) -> Decision {
        self.check_message_at(customer_id, Instant::now()).await
    }

    pub async fn check_order(&self, customer_id: &str) -> Decision {
        self.check_order_at(customer_id, Instant::now()).await
    }

    pub async fn set_error_cooldown(&self, customer_id: &str) {
        let mut state = self.state.lock().await;
        let windows = state.entry(customer_id.to_string()).or_default();
        windows.cooldown_until =
            Some(Instant::now() + Duration::from_secs(self.limits.error_cooldown_secs));
    }

    pub async fn is_in_cooldown(&self, customer_id: &str) -> bool {
        self.is_in_cooldown_at(customer_id, Instant::now()).await
    }

    async fn is_in_cooldown_at(&self, customer_id: &str, now: Instant) -> bool {
        let state = self.state.lock().await;
        state
            .get(customer_id)
            .and_then(|windows| windows.cooldown_until)
            .is_some_and(|until| until > now)
    }

    async fn check_message_at(&self, customer_id: &str, now: Instant) -> Decision {
        let window = Duration::from_secs(self.limits.message_window_secs);
        let limit = self.limits.messages_per_window;
        let mut state = self.state.lock().await;
        let windows = state.entry(customer_id.to_string()).or_default();
        Self::slide(&mut windows.messages, now, window, limit, "messages")
    }

    async fn check_order_at(&self, customer_id: &str, now: Instant) -> Decision {
        let window = Duration::from_secs(self.limits.order_window_secs);
        let limit = self.limits.orders_per_window;
        let mut state = self.state.lock().await;
        let windows = state.entry(customer_id.to_string()).or_default();
        Self::slide(&mut windows.orders, now, window, limit, "orders")
    }

    fn slide(
        events: &mut VecDeque<Instant>,
        now: Instant,
        window: Duration,
        limit: u32,
        what: &str,
    ) -> Decision {
        while let Some(&oldest) = events.front() {
            if now.duration_since(oldest) >= window {
                events.pop_front();
            } else {
                break;
            }
        }
        if events.len() >= limit as usize {
            return Decision::Denied {
                reason: format!("too many {what} within {}s", window.as_secs()),
            };
        }
        events.push_back(now);
        Decision::Allowed
    }
}
