use crate::{Progress, Step, TimeBudget};

type MemberDoneFn<Cx, V> = Box<dyn FnOnce(&mut Cx, Option<V>)>;

struct Member<Cx, V, E> {
    step: Box<dyn Step<Cx, V, E>>,
    on_done: Option<MemberDoneFn<Cx, V>>,
    done: bool,
}

/// A set of same-shaped steps progressed round-robin.
///
/// Driving N slow decodes through the queue one at a time would serialize
/// them; an interleaved set instead resumes the next not-yet-finished
/// member on every turn, so all members creep forward together. Each
/// member's completion callback fires immediately with its terminal value
/// (not batched), and the set as a whole finishes only when every member
/// has.
///
/// The set is itself a [`Step`], so nesting needs no scheduler support: the
/// queue resumes the set, the set resumes its members.
pub struct InterleavedSet<Cx, V, E> {
    members: Vec<Member<Cx, V, E>>,
    cursor: usize,
    remaining: usize,
}

impl<Cx, V, E> Default for InterleavedSet<Cx, V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Cx, V, E> InterleavedSet<Cx, V, E> {
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
            cursor: 0,
            remaining: 0,
        }
    }

    /// Adds a member with a callback that fires exactly once, as soon as
    /// the member finishes.
    pub fn push(
        &mut self,
        step: impl Step<Cx, V, E> + 'static,
        on_done: impl FnOnce(&mut Cx, Option<V>) + 'static,
    ) {
        self.members.push(Member {
            step: Box::new(step),
            on_done: Some(Box::new(on_done)),
            done: false,
        });
        self.remaining += 1;
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Number of members that have not finished yet.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Resumes the next unfinished member in rotation. Returns `true` if
    /// any member was resumed, `false` once all members are done.
    pub fn advance_one(&mut self, cx: &mut Cx, budget: &TimeBudget) -> Result<bool, E> {
        if self.remaining == 0 {
            return Ok(false);
        }
        let len = self.members.len();
        // Wrap at most once past every member to find the next live one.
        for _ in 0..len {
            let index = self.cursor % len;
            self.cursor = (self.cursor + 1) % len;
            let member = &mut self.members[index];
            if member.done {
                continue;
            }
            match member.step.resume(cx, budget)? {
                Progress::Yielded => return Ok(true),
                Progress::Done => {
                    Self::finish(member, cx, None);
                    self.remaining -= 1;
                    return Ok(true);
                }
                Progress::DoneWith(value) => {
                    Self::finish(member, cx, Some(value));
                    self.remaining -= 1;
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn finish(member: &mut Member<Cx, V, E>, cx: &mut Cx, value: Option<V>) {
        member.done = true;
        if let Some(callback) = member.on_done.take() {
            callback(cx, value);
        }
    }
}

impl<Cx, V, E> Step<Cx, V, E> for InterleavedSet<Cx, V, E> {
    fn resume(&mut self, cx: &mut Cx, budget: &TimeBudget) -> Result<Progress<V>, E> {
        while self.remaining > 0 {
            self.advance_one(cx, budget)?;
            if self.remaining > 0 && budget.exhausted() {
                return Ok(Progress::Yielded);
            }
        }
        Ok(Progress::Done)
    }

    fn label(&self) -> &'static str {
        "interleaved-set"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FnStep;
    use std::time::Duration;

    #[derive(Default)]
    struct Trace {
        resumes: Vec<usize>,
        finished: Vec<(usize, Option<u32>)>,
    }

    fn member(id: usize, yields: usize, value: u32) -> impl Step<Trace, u32, String> {
        let mut remaining = yields;
        FnStep(move |cx: &mut Trace, _: &TimeBudget| {
            cx.resumes.push(id);
            if remaining > 0 {
                remaining -= 1;
                Ok(Progress::Yielded)
            } else {
                Ok(Progress::DoneWith(value))
            }
        })
    }

    #[test]
    fn members_advance_round_robin() {
        let mut set = InterleavedSet::new();
        for id in 0..3 {
            set.push(member(id, 1, id as u32), move |cx: &mut Trace, value| {
                cx.finished.push((id, value));
            });
        }

        let mut cx = Trace::default();
        let budget = TimeBudget::new(Duration::from_secs(60));
        while set.remaining() > 0 {
            assert!(set.advance_one(&mut cx, &budget).unwrap());
        }
        assert!(!set.advance_one(&mut cx, &budget).unwrap());

        // One yield each, then one finishing resume each, in rotation.
        assert_eq!(cx.resumes, [0, 1, 2, 0, 1, 2]);
        assert_eq!(cx.finished, [(0, Some(0)), (1, Some(1)), (2, Some(2))]);
    }

    #[test]
    fn acts_as_a_step_and_finishes_when_all_members_do() {
        let mut set = InterleavedSet::new();
        for id in 0..2 {
            set.push(member(id, 2, 9), move |cx: &mut Trace, _| {
                cx.finished.push((id, None));
            });
        }

        let mut cx = Trace::default();
        let budget = TimeBudget::new(Duration::from_secs(60));
        match set.resume(&mut cx, &budget).unwrap() {
            Progress::Done => {}
            other => panic!("expected Done, got {other:?}"),
        }
        assert_eq!(cx.finished.len(), 2);
        assert_eq!(set.remaining(), 0);
    }

    #[test]
    fn exhausted_budget_yields_between_rounds() {
        let mut set = InterleavedSet::new();
        set.push(member(0, 3, 0), |_: &mut Trace, _| {});

        let mut cx = Trace::default();
        let budget = TimeBudget::new(Duration::ZERO);
        // Each resume makes exactly one round of progress, then yields.
        for _ in 0..3 {
            match set.resume(&mut cx, &budget).unwrap() {
                Progress::Yielded => {}
                other => panic!("expected Yielded, got {other:?}"),
            }
        }
        match set.resume(&mut cx, &budget).unwrap() {
            Progress::Done => {}
            other => panic!("expected Done, got {other:?}"),
        }
        assert_eq!(cx.resumes, [0, 0, 0, 0]);
    }
}
