use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::TimeBudget;

/// Outcome of one resumption of a [`Step`].
#[derive(Debug)]
pub enum Progress<V> {
    /// The step gave control back: either its time budget ran out or it is
    /// waiting on I/O. It will be resumed on a later call.
    Yielded,
    /// The step is finished and can be discarded.
    Done,
    /// The step is finished and produced a terminal value. The queue keeps
    /// the most recent terminal value and hands it to the completion
    /// callback, so the last enqueued step decides what an import returns.
    DoneWith(V),
}

/// A resumable unit of import work.
///
/// A step is an explicit state machine rather than a language generator:
/// all of its suspension state lives in the implementing type, and
/// [`resume`](Step::resume) runs until it finishes, blocks on I/O, or the
/// shared [`TimeBudget`] is exhausted. Steps run strictly one at a time;
/// `cx` is the import-wide mutable context they accumulate results into.
pub trait Step<Cx, V, E> {
    fn resume(&mut self, cx: &mut Cx, budget: &TimeBudget) -> Result<Progress<V>, E>;

    /// Short name used in diagnostics.
    fn label(&self) -> &'static str {
        "step"
    }
}

/// Adapts a closure into a [`Step`]. A wrapper type rather than a blanket
/// impl, so concrete step types can implement [`Step`] without coherence
/// conflicts.
pub struct FnStep<F>(pub F);

impl<Cx, V, E, F> Step<Cx, V, E> for FnStep<F>
where
    F: FnMut(&mut Cx, &TimeBudget) -> Result<Progress<V>, E>,
{
    fn resume(&mut self, cx: &mut Cx, budget: &TimeBudget) -> Result<Progress<V>, E> {
        (self.0)(cx, budget)
    }
}

/// Execution state of a [`TaskQueue`]. `Running` is the only non-terminal
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Running,
    Completed,
    Aborted,
    Failed,
}

impl QueueState {
    pub fn is_terminal(self) -> bool {
        self != QueueState::Running
    }
}

type CompletedFn<Cx, V> = Box<dyn FnOnce(&mut Cx, Option<V>)>;
type AbortedFn<Cx> = Box<dyn FnMut(&mut Cx)>;
type FailedFn<Cx, E> = Box<dyn FnMut(&mut Cx, &E)>;

/// An ordered queue of resumable steps plus its execution state machine.
///
/// The driving loop (a host's per-frame update, or an editor polling hook)
/// calls [`advance`](TaskQueue::advance) repeatedly. Each call restarts the
/// queue's [`TimeBudget`] and resumes the front step; when a step finishes
/// the next one starts immediately within the same call if budget remains,
/// so scheduling ticks are not wasted on bookkeeping-only returns.
///
/// Failure of a step transitions the queue to [`QueueState::Failed`], runs
/// the failure callbacks, clears the remaining work and, unless
/// [`suppress_failures`](TaskQueue::suppress_failures) was requested,
/// returns the error to the caller.
pub struct TaskQueue<Cx, V, E> {
    steps: VecDeque<Box<dyn Step<Cx, V, E>>>,
    state: QueueState,
    budget: TimeBudget,
    longest_resume: Duration,
    last_value: Option<V>,
    propagate_failures: bool,
    on_completed: Option<CompletedFn<Cx, V>>,
    on_aborted: Vec<AbortedFn<Cx>>,
    on_failed: Vec<FailedFn<Cx, E>>,
}

impl<Cx, V, E> TaskQueue<Cx, V, E> {
    pub fn new(budget: TimeBudget) -> Self {
        Self {
            steps: VecDeque::new(),
            state: QueueState::Running,
            budget,
            longest_resume: Duration::ZERO,
            last_value: None,
            propagate_failures: true,
            on_completed: None,
            on_aborted: Vec::new(),
            on_failed: Vec::new(),
        }
    }

    /// Appends a step to the back of the queue.
    pub fn push_back(&mut self, step: impl Step<Cx, V, E> + 'static) {
        self.steps.push_back(Box::new(step));
    }

    /// Inserts a step at the front of the queue, ahead of all pending work.
    /// Multi-file imports use this to interleave per-file steps with shared
    /// setup and teardown.
    pub fn push_front(&mut self, step: impl Step<Cx, V, E> + 'static) {
        self.steps.push_front(Box::new(step));
    }

    /// Registers the completion callback, invoked exactly once with the
    /// terminal value of the last step to report one.
    pub fn on_completed(&mut self, f: impl FnOnce(&mut Cx, Option<V>) + 'static) {
        self.on_completed = Some(Box::new(f));
    }

    /// Registers an abort callback. Collaborators register cleanup here so
    /// partially created host objects are released; callbacks must tolerate
    /// being called before any object was created.
    pub fn on_aborted(&mut self, f: impl FnMut(&mut Cx) + 'static) {
        self.on_aborted.push(Box::new(f));
    }

    /// Registers a failure callback, invoked before the error propagates.
    pub fn on_failed(&mut self, f: impl FnMut(&mut Cx, &E) + 'static) {
        self.on_failed.push(Box::new(f));
    }

    /// Keeps step failures out of [`advance`](TaskQueue::advance)'s return
    /// value; the failure callbacks become the only error channel.
    pub fn suppress_failures(&mut self) {
        self.propagate_failures = false;
    }

    pub fn state(&self) -> QueueState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state.is_terminal()
    }

    /// Longest single step resumption observed so far. Diagnostic only.
    pub fn longest_resume(&self) -> Duration {
        self.longest_resume
    }

    pub fn pending_steps(&self) -> usize {
        self.steps.len()
    }

    /// Drives the queue until the front step yields, the queue drains, a
    /// step fails, or the queue was already in a terminal state (a no-op).
    ///
    /// The front step is always resumed at least once per call, even when
    /// the budget is already exhausted, so a zero budget still makes
    /// progress one resumption at a time.
    pub fn advance(&mut self, cx: &mut Cx) -> Result<QueueState, E> {
        if self.state.is_terminal() {
            return Ok(self.state);
        }
        self.budget.restart();
        loop {
            let Some(front) = self.steps.front_mut() else {
                self.complete(cx);
                return Ok(self.state);
            };
            let started = Instant::now();
            let progress = front.resume(cx, &self.budget);
            let took = started.elapsed();
            if took > self.longest_resume {
                self.longest_resume = took;
            }
            match progress {
                Ok(Progress::Yielded) => return Ok(QueueState::Running),
                Ok(Progress::Done) => {
                    self.steps.pop_front();
                }
                Ok(Progress::DoneWith(value)) => {
                    self.steps.pop_front();
                    self.last_value = Some(value);
                }
                Err(error) => return self.fail(cx, error),
            }
            if self.steps.is_empty() {
                self.complete(cx);
                return Ok(self.state);
            }
            if self.budget.exhausted() {
                return Ok(QueueState::Running);
            }
        }
    }

    /// Aborts the queue: pending steps are dropped and the abort callbacks
    /// run exactly once. A no-op once the queue is in any terminal state,
    /// so aborting twice, or after completion, does nothing.
    pub fn abort(&mut self, cx: &mut Cx) {
        if self.state.is_terminal() {
            return;
        }
        self.state = QueueState::Aborted;
        self.steps.clear();
        self.on_completed = None;
        for callback in &mut self.on_aborted {
            callback(cx);
        }
    }

    fn complete(&mut self, cx: &mut Cx) {
        self.state = QueueState::Completed;
        if let Some(callback) = self.on_completed.take() {
            callback(cx, self.last_value.take());
        }
    }

    fn fail(&mut self, cx: &mut Cx, error: E) -> Result<QueueState, E> {
        debug!("import step failed, clearing {} pending steps", self.steps.len());
        self.state = QueueState::Failed;
        self.steps.clear();
        self.on_completed = None;
        for callback in &mut self.on_failed {
            callback(cx, &error);
        }
        if self.propagate_failures {
            Err(error)
        } else {
            Ok(QueueState::Failed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log {
        entries: Vec<&'static str>,
        completed: Vec<Option<u32>>,
        aborted: u32,
        failed: u32,
    }

    fn yielding_step(
        name: &'static str,
        yields: usize,
        value: Option<u32>,
    ) -> impl Step<Log, u32, String> {
        let mut remaining = yields;
        FnStep(move |cx: &mut Log, _budget: &TimeBudget| {
            cx.entries.push(name);
            if remaining > 0 {
                remaining -= 1;
                Ok(Progress::Yielded)
            } else {
                Ok(match value {
                    Some(v) => Progress::DoneWith(v),
                    None => Progress::Done,
                })
            }
        })
    }

    fn queue() -> TaskQueue<Log, u32, String> {
        TaskQueue::new(TimeBudget::new(Duration::from_secs(60)))
    }

    #[test]
    fn steps_run_in_enqueue_order_and_complete_once() {
        let mut q = queue();
        q.push_back(yielding_step("a", 2, None));
        q.push_back(yielding_step("b", 0, None));
        q.push_back(yielding_step("c", 0, Some(7)));
        q.on_completed(|cx, value| cx.completed.push(value));

        let mut cx = Log::default();
        // A yields twice, so two advances return with A still at the front.
        assert_eq!(q.advance(&mut cx).unwrap(), QueueState::Running);
        assert_eq!(q.advance(&mut cx).unwrap(), QueueState::Running);
        assert_eq!(cx.entries, ["a", "a"]);
        // The third advance finishes A and, with budget to spare, runs B and
        // C in the same call.
        assert_eq!(q.advance(&mut cx).unwrap(), QueueState::Completed);
        assert_eq!(cx.entries, ["a", "a", "a", "b", "c"]);
        assert_eq!(cx.completed, [Some(7)]);

        // Further advances are no-ops.
        assert_eq!(q.advance(&mut cx).unwrap(), QueueState::Completed);
        assert_eq!(cx.completed, [Some(7)]);
    }

    #[test]
    fn completion_value_comes_from_the_last_step() {
        let mut q = queue();
        q.push_back(yielding_step("a", 0, Some(1)));
        q.push_back(yielding_step("b", 0, None));
        q.on_completed(|cx, value| cx.completed.push(value));

        let mut cx = Log::default();
        q.advance(&mut cx).unwrap();
        // B reported no value, so the retained value is A's.
        assert_eq!(cx.completed, [Some(1)]);
    }

    #[test]
    fn push_front_takes_priority() {
        let mut q = queue();
        q.push_back(yielding_step("b", 0, None));
        q.push_front(yielding_step("a", 0, None));

        let mut cx = Log::default();
        q.advance(&mut cx).unwrap();
        assert_eq!(cx.entries, ["a", "b"]);
    }

    #[test]
    fn abort_is_idempotent_and_a_noop_after_completion() {
        let mut q = queue();
        q.push_back(yielding_step("a", 5, None));
        q.on_aborted(|cx| cx.aborted += 1);

        let mut cx = Log::default();
        q.advance(&mut cx).unwrap();
        q.abort(&mut cx);
        q.abort(&mut cx);
        assert_eq!(cx.aborted, 1);
        assert_eq!(q.state(), QueueState::Aborted);
        assert_eq!(q.pending_steps(), 0);

        let mut done = queue();
        done.push_back(yielding_step("a", 0, None));
        done.on_aborted(|cx| cx.aborted += 1);
        let mut cx = Log::default();
        done.advance(&mut cx).unwrap();
        assert_eq!(done.state(), QueueState::Completed);
        done.abort(&mut cx);
        assert_eq!(cx.aborted, 0);
        assert_eq!(done.state(), QueueState::Completed);
    }

    #[test]
    fn failure_clears_the_queue_and_propagates() {
        let mut q = queue();
        q.push_back(FnStep(|_: &mut Log, _: &TimeBudget| {
            Err::<Progress<u32>, _>("boom".to_string())
        }));
        q.push_back(yielding_step("never", 0, None));
        q.on_failed(|cx, _| cx.failed += 1);
        q.on_completed(|cx, value| cx.completed.push(value));

        let mut cx = Log::default();
        assert_eq!(q.advance(&mut cx).unwrap_err(), "boom");
        assert_eq!(q.state(), QueueState::Failed);
        assert_eq!(cx.failed, 1);
        assert!(cx.entries.is_empty());
        assert!(cx.completed.is_empty());
    }

    #[test]
    fn suppressed_failure_still_fires_callbacks() {
        let mut q = queue();
        q.suppress_failures();
        q.push_back(FnStep(|_: &mut Log, _: &TimeBudget| {
            Err::<Progress<u32>, _>("boom".to_string())
        }));
        q.on_failed(|cx, _| cx.failed += 1);

        let mut cx = Log::default();
        assert_eq!(q.advance(&mut cx).unwrap(), QueueState::Failed);
        assert_eq!(cx.failed, 1);
    }

    #[test]
    fn zero_budget_still_resumes_the_front_step_once() {
        let mut q: TaskQueue<Log, u32, String> = TaskQueue::new(TimeBudget::new(Duration::ZERO));
        q.push_back(yielding_step("a", 0, None));
        q.push_back(yielding_step("b", 0, None));

        let mut cx = Log::default();
        // A completes; B must wait for the next call because the budget is
        // already exhausted.
        assert_eq!(q.advance(&mut cx).unwrap(), QueueState::Running);
        assert_eq!(cx.entries, ["a"]);
        assert_eq!(q.advance(&mut cx).unwrap(), QueueState::Completed);
        assert_eq!(cx.entries, ["a", "b"]);
    }

    #[test]
    fn longest_resume_is_recorded() {
        let mut q = queue();
        q.push_back(FnStep(|cx: &mut Log, _: &TimeBudget| {
            cx.entries.push("slow");
            std::thread::sleep(Duration::from_millis(2));
            Ok(Progress::Done)
        }));
        let mut cx = Log::default();
        q.advance(&mut cx).unwrap();
        assert!(q.longest_resume() >= Duration::from_millis(2));
    }
}
