//! The cooperative task engine.
//!
//! Fibers are futures driven by a single-threaded executor pinned to the
//! loop thread. A fiber suspends by awaiting an [`Ivar`]; the event loop
//! resolves ivars in batches of [`Fill`]s handed to the executor by the
//! `iterate` callback whenever no fiber is runnable.
//!
//! User code is never preempted: between two suspension points a fiber
//! owns the thread.

pub mod ivar;
pub mod mutex;
pub mod pool;

pub use ivar::Ivar;

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

/// A promise paired with its value: "resolve this ivar on delivery".
///
/// Fills are applied by the executor on the loop thread. Application is
/// first-fill-wins: a fill whose promise was already resolved (a completion
/// racing a cancellation) is dropped.
pub struct Fill(Box<dyn FnOnce() + Send>);

impl Fill {
    /// Pairs `ivar` with `value`.
    pub fn new<T: Send + 'static>(ivar: &Ivar<T>, value: T) -> Self {
        let ivar = ivar.clone();
        Self(Box::new(move || {
            ivar.try_fill(value);
        }))
    }

    /// Resolves the promise.
    pub fn run(self) {
        (self.0)();
    }
}

type TaskFuture = Pin<Box<dyn Future<Output = ()>>>;

#[derive(Default)]
struct ReadyQueue {
    ids: parking_lot::Mutex<VecDeque<u64>>,
}

impl ReadyQueue {
    fn push(&self, id: u64) {
        self.ids.lock().push_back(id);
    }

    fn pop(&self) -> Option<u64> {
        self.ids.lock().pop_front()
    }
}

struct TaskWaker {
    id: u64,
    ready: Arc<ReadyQueue>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.ready.push(self.id);
    }
}

#[derive(Clone)]
struct Spawner {
    pending: Rc<RefCell<Vec<(u64, TaskFuture)>>>,
    ready: Arc<ReadyQueue>,
    next_id: Rc<Cell<u64>>,
}

impl Spawner {
    fn spawn(&self, future: impl Future<Output = ()> + 'static) {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.pending.borrow_mut().push((id, Box::pin(future)));
        self.ready.push(id);
    }
}

thread_local! {
    static SPAWNER: RefCell<Option<Spawner>> = const { RefCell::new(None) };
}

/// Adds a concurrent fiber to the running executor.
///
/// The fiber runs until completion or until the executor's body finishes,
/// whichever comes first.
///
/// # Panics
///
/// Panics outside [`run`].
pub fn spawn(future: impl Future<Output = ()> + 'static) {
    SPAWNER.with(|slot| {
        slot.borrow()
            .as_ref()
            .expect("fiber::spawn called outside a run")
            .spawn(future);
    });
}

/// Resets the thread-local spawner even when `run` unwinds.
struct SpawnerGuard;

impl Drop for SpawnerGuard {
    fn drop(&mut self) {
        SPAWNER.with(|slot| slot.borrow_mut().take());
    }
}

const MAIN_TASK: u64 = 0;

/// Drives `body` and every spawned fiber to quiescence, demanding fills
/// from `iterate` whenever no fiber is runnable.
///
/// `iterate` must return a non-empty batch; it is expected to fail fatally
/// itself when no fill can ever be produced (deadlock). Returns as soon as
/// `body` completes; other fibers still pending are dropped.
///
/// # Panics
///
/// Panics on nested use, or if `iterate` returns an empty batch.
pub fn run<T, F, I>(body: F, mut iterate: I) -> T
where
    T: 'static,
    F: Future<Output = T> + 'static,
    I: FnMut() -> Vec<Fill>,
{
    let spawner = Spawner {
        pending: Rc::new(RefCell::new(Vec::new())),
        ready: Arc::new(ReadyQueue::default()),
        next_id: Rc::new(Cell::new(MAIN_TASK + 1)),
    };
    SPAWNER.with(|slot| {
        let mut slot = slot.borrow_mut();
        assert!(slot.is_none(), "fiber::run: nested run on one thread");
        *slot = Some(spawner.clone());
    });
    let _guard = SpawnerGuard;

    let result: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
    let result_slot = Rc::clone(&result);
    let mut tasks: HashMap<u64, TaskFuture> = HashMap::new();
    tasks.insert(
        MAIN_TASK,
        Box::pin(async move {
            let value = body.await;
            *result_slot.borrow_mut() = Some(value);
        }),
    );
    spawner.ready.push(MAIN_TASK);

    loop {
        loop {
            // Adopt fibers spawned since the last poll.
            for (id, future) in spawner.pending.borrow_mut().drain(..) {
                tasks.insert(id, future);
            }
            let Some(id) = spawner.ready.pop() else { break };
            let Some(future) = tasks.get_mut(&id) else {
                // Stale wake for a completed fiber.
                continue;
            };
            let waker = Waker::from(Arc::new(TaskWaker {
                id,
                ready: Arc::clone(&spawner.ready),
            }));
            let mut cx = Context::from_waker(&waker);
            if future.as_mut().poll(&mut cx).is_ready() {
                tasks.remove(&id);
                if id == MAIN_TASK {
                    break;
                }
            }
        }

        if let Some(value) = result.borrow_mut().take() {
            return value;
        }

        let fills = iterate();
        assert!(!fills.is_empty(), "iterate returned no fills");
        for fill in fills {
            fill.run();
        }
    }
}

/// Runs two futures concurrently and returns both results.
///
/// Both sides are polled from the calling fiber; neither needs `Send`.
pub fn join<FA, FB>(a: FA, b: FB) -> Join<FA, FB>
where
    FA: Future,
    FB: Future,
{
    Join {
        a: JoinSide::Run(Box::pin(a)),
        b: JoinSide::Run(Box::pin(b)),
    }
}

enum JoinSide<F: Future> {
    Run(Pin<Box<F>>),
    Done(Option<F::Output>),
}

impl<F: Future> JoinSide<F> {
    fn poll_side(&mut self, cx: &mut Context<'_>) -> bool {
        if let JoinSide::Run(future) = self {
            match future.as_mut().poll(cx) {
                Poll::Ready(value) => *self = JoinSide::Done(Some(value)),
                Poll::Pending => return false,
            }
        }
        true
    }

    fn take(&mut self) -> F::Output {
        match self {
            JoinSide::Done(value) => value.take().expect("join output taken once"),
            JoinSide::Run(_) => unreachable!("join side still running"),
        }
    }
}

/// Future returned by [`join`].
pub struct Join<FA: Future, FB: Future> {
    a: JoinSide<FA>,
    b: JoinSide<FB>,
}

// The inner futures are boxed; the sides themselves are plain state.
impl<FA: Future, FB: Future> Unpin for Join<FA, FB> {}

impl<FA: Future, FB: Future> Future for Join<FA, FB> {
    type Output = (FA::Output, FB::Output);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let a_done = this.a.poll_side(cx);
        let b_done = this.b.poll_side(cx);
        if a_done && b_done {
            Poll::Ready((this.a.take(), this.b.take()))
        } else {
            Poll::Pending
        }
    }
}
