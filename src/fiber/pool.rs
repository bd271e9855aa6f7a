//! A pool of concurrently running fibers.
//!
//! [`Pool`] separates submission from execution: [`task`](Pool::task)
//! queues a fiber, the single long-lived [`run`](Pool::run) consumer
//! launches queued fibers and parks while there is nothing to do.
//! [`stop`](Pool::stop) lets `run` return once every launched fiber has
//! finished.

use crate::fiber::{self, Ivar};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

type PoolFiber = Pin<Box<dyn Future<Output = ()>>>;

struct PoolInner {
    queue: VecDeque<PoolFiber>,
    running: usize,
    stopped: bool,
    /// Parked `run` consumer, woken by `task`, `stop`, and completions.
    waiting: Option<Ivar<()>>,
}

impl PoolInner {
    fn wake(&mut self) -> Option<Ivar<()>> {
        self.waiting.take()
    }
}

/// A fiber pool. Cloning shares the pool.
#[derive(Clone)]
pub struct Pool {
    inner: Rc<RefCell<PoolInner>>,
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl Pool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(PoolInner {
                queue: VecDeque::new(),
                running: 0,
                stopped: false,
                waiting: None,
            })),
        }
    }

    /// Queues a fiber for the pool to run.
    ///
    /// # Panics
    ///
    /// Panics if the pool has been stopped.
    pub fn task(&self, fiber: impl Future<Output = ()> + 'static) {
        let wake = {
            let mut inner = self.inner.borrow_mut();
            assert!(!inner.stopped, "Pool::task: task submitted to stopped pool");
            inner.queue.push_back(Box::pin(fiber));
            inner.wake()
        };
        if let Some(ivar) = wake {
            ivar.fill(());
        }
    }

    /// The single consumer: launches queued fibers until the pool is
    /// stopped and every launched fiber has finished.
    pub async fn run(&self) {
        loop {
            enum Step {
                Launch(PoolFiber),
                Park(Ivar<()>),
                Finished,
            }
            let step = {
                let mut inner = self.inner.borrow_mut();
                if let Some(fiber) = inner.queue.pop_front() {
                    inner.running += 1;
                    Step::Launch(fiber)
                } else if inner.stopped && inner.running == 0 {
                    Step::Finished
                } else {
                    let ivar = Ivar::new();
                    inner.waiting = Some(ivar.clone());
                    Step::Park(ivar)
                }
            };
            match step {
                Step::Launch(fiber) => {
                    let pool = self.clone();
                    fiber::spawn(async move {
                        fiber.await;
                        let wake = {
                            let mut inner = pool.inner.borrow_mut();
                            inner.running -= 1;
                            inner.wake()
                        };
                        if let Some(ivar) = wake {
                            ivar.fill(());
                        }
                    });
                }
                Step::Park(ivar) => ivar.read().await,
                Step::Finished => return,
            }
        }
    }

    /// Stops the pool: no further submissions; `run` returns after the
    /// queue drains and running fibers finish.
    pub fn stop(&self) {
        let wake = {
            let mut inner = self.inner.borrow_mut();
            inner.stopped = true;
            inner.wake()
        };
        if let Some(ivar) = wake {
            ivar.fill(());
        }
    }
}
