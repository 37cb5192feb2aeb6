use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use actix_rt::time::{sleep_until, Instant, Sleep};

pub(crate) enum HeartbeatAction {
    None,
    Heartbeat,
    Close,
}

/// Connection heartbeat.
///
/// A heartbeat frame is due when nothing was written for one interval, the
/// peer is considered dead after two intervals without any inbound frame.
pub(crate) struct Heartbeat {
    expire_local: Instant,
    expire_remote: Instant,
    interval: Duration,
    timeout: Duration,
    delay: Pin<Box<Sleep>>,
}

impl Heartbeat {
    pub(crate) fn new(interval: Duration) -> Self {
        let now = Instant::now();

        Heartbeat {
            expire_local: now,
            expire_remote: now,
            interval,
            timeout: interval * 2,
            delay: Box::pin(sleep_until(now + interval)),
        }
    }

    /// Frames were written to the transport
    pub(crate) fn update_local(&mut self, update: bool) {
        if update {
            self.expire_local = Instant::now();
        }
    }

    /// Frames were received from the peer
    pub(crate) fn update_remote(&mut self, update: bool) {
        if update {
            self.expire_remote = Instant::now();
        }
    }

    fn next_expire(&self) -> Instant {
        let t1 = self.expire_local + self.interval;
        let t2 = self.expire_remote + self.timeout;
        if t1 < t2 {
            t1
        } else {
            t2
        }
    }

    pub(crate) fn poll(&mut self, cx: &mut Context) -> HeartbeatAction {
        match self.delay.as_mut().poll(cx) {
            Poll::Ready(_) => {
                let mut act = HeartbeatAction::None;
                let now = Instant::now();
                if now >= self.expire_remote + self.timeout {
                    return HeartbeatAction::Close;
                }
                if now >= self.expire_local + self.interval {
                    act = HeartbeatAction::Heartbeat;
                    self.expire_local = now;
                }
                let next = self.next_expire();
                self.delay.as_mut().reset(next);
                let _ = self.delay.as_mut().poll(cx);
                act
            }
            Poll::Pending => HeartbeatAction::None,
        }
    }
}
