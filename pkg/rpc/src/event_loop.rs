use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// The contract the core assumes (§4.3): a collaborator that serially
/// executes submitted tasks on a single goroutine. This is a reference
/// implementation of that contract — an embedder is free to supply its
/// own, as long as it preserves the same serial-execution guarantee.
///
/// `submit` takes a plain `FnOnce()`, not a `Send` one: the core's own
/// state (`RPCState`, half-streams) is `Rc`-based and never crosses
/// threads by design (§5), so a task queue that required `Send` could
/// never actually carry the closures this crate needs to hand it. This
/// reference loop is therefore confined to one thread, same as the core
/// it serializes access to — a multi-threaded embedder's own collaborator
/// would bridge onto this thread before ever calling `submit`.
#[derive(Clone)]
pub struct EventLoop {
    queue: Rc<RefCell<VecDeque<Box<dyn FnOnce()>>>>,
}

impl EventLoop {
    pub fn new() -> Self {
        EventLoop {
            queue: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    /// Enqueues `task` for serial execution at the next `run`/`run_once`.
    /// Producers crossing into the core from outside the loop go through
    /// here rather than touching half-stream/`RPCState` fields directly
    /// (§4.3) — `Channel::call` uses this for cancellation/deadline
    /// delivery, so firing a `CancellationToken` enqueues a task instead of
    /// mutating the call's state inline; it takes effect only once this
    /// loop actually runs it, which is the "no preemption, cancellation
    /// takes effect at the next scheduling boundary" property from §5.
    pub fn submit(&self, task: impl FnOnce() + 'static) {
        self.queue.borrow_mut().push_back(Box::new(task));
    }

    /// Drains tasks, strictly in submission order, stopping once the queue
    /// is empty. Tasks may re-entrantly `submit` more work; the queue
    /// borrow is released before a task runs, so that's safe. `should_stop`
    /// is polled once the queue empties — a single-threaded reference loop
    /// has no way to wait for work that isn't already queued, so it
    /// returns either way, but the poll lets a caller's predicate still
    /// observe (and react to) why draining ended.
    pub fn run(&self, should_stop: impl Fn() -> bool) {
        loop {
            let task = self.queue.borrow_mut().pop_front();
            match task {
                Some(task) => task(),
                None => {
                    should_stop();
                    return;
                }
            }
        }
    }

    /// Runs whatever is currently queued, without waiting for more.
    pub fn run_once(&self) {
        loop {
            let task = self.queue.borrow_mut().pop_front();
            match task {
                Some(task) => task(),
                None => return,
            }
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

/// The caller's cancellation signal, the single source of truth for
/// aborting a call in progress (§5). Callback-style rather than
/// `Future`-based, matching the core's own waiter design (§9).
///
/// Deliberately not `Send`/`Sync`-bound: `cb` captures the `Rc`-based core
/// state (`RPCState`, half-streams) that §5 requires stay single-threaded.
/// A token whose underlying signal originates off-thread (a real timer, a
/// cross-thread cancel button) is responsible for bouncing onto the
/// event-loop thread before it ever touches this interface.
pub trait CancellationToken {
    fn is_cancelled(&self) -> bool;

    /// Registers `cb` to run when cancellation fires. If already
    /// cancelled, implementations should invoke `cb` promptly.
    fn on_cancelled(&self, cb: Box<dyn FnOnce()>);

    /// Which context error this token's firing should translate to (§4.6).
    /// A plain cancel button returns `Canceled`; a token backed by a
    /// deadline timer returns `DeadlineExceeded` instead (§4.3). Defaults
    /// to `Canceled` since that's the common case.
    fn context_error(&self) -> crate::status::ContextError {
        crate::status::ContextError::Canceled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_run_in_submission_order() {
        let el = EventLoop::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..5 {
            let order = order.clone();
            el.submit(move || order.borrow_mut().push(i));
        }
        el.run_once();
        assert_eq!(*order.borrow(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn run_stops_when_should_stop_and_queue_empty() {
        let el = EventLoop::new();
        let count = Rc::new(RefCell::new(0));
        let c = count.clone();
        el.submit(move || {
            *c.borrow_mut() += 1;
        });
        el.run(|| true);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn a_task_may_reentrantly_submit_more_work() {
        let el = EventLoop::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let el2 = el.clone();
        let s = seen.clone();
        el.submit(move || {
            s.borrow_mut().push(1);
            let s2 = s.clone();
            el2.submit(move || s2.borrow_mut().push(2));
        });
        el.run_once();
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }
}
