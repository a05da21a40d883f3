//! Property tests for the per-agent queue manager.
//!
//! Random operation sequences are replayed against `TaskQueueManager` and a
//! plain model of what should be pending, checking dequeue order and the
//! bookkeeping counters after every step.

use proptest::prelude::*;
use uuid::Uuid;

use agent_dispatch::tasks::{Instruction, Priority, TaskQueueManager, TaskResult, TaskStatus};

#[derive(Debug, Clone)]
enum Op {
    Add(Priority),
    Start,
    Complete,
    Fail,
    /// Abort the n-th task ever added (modulo), whatever state it is in.
    Abort(usize),
}

fn arb_priority() -> impl Strategy<Value = Priority> {
    prop_oneof![Just(Priority::High), Just(Priority::Normal), Just(Priority::Low)]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => arb_priority().prop_map(Op::Add),
        3 => Just(Op::Start),
        1 => Just(Op::Complete),
        1 => Just(Op::Fail),
        1 => any::<usize>().prop_map(Op::Abort),
    ]
}

/// Expected next task: oldest among the highest non-empty priority.
fn expected_next(pending: &[(Uuid, Priority)]) -> Option<Uuid> {
    let top = pending.iter().map(|(_, p)| *p).max()?;
    pending.iter().find(|(_, p)| *p == top).map(|(id, _)| *id)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_queue_matches_model(ops in prop::collection::vec(arb_op(), 1..80)) {
        let mut manager = TaskQueueManager::new();
        let mut pending: Vec<(Uuid, Priority)> = Vec::new();
        let mut active: Option<Uuid> = None;
        let mut added: Vec<Uuid> = Vec::new();
        let mut completed = 0usize;
        let mut failed = 0usize;

        for op in ops {
            match op {
                Op::Add(priority) => {
                    let task = manager.add_task(Instruction::new("t").with_priority(priority));
                    prop_assert_eq!(task.status, TaskStatus::Pending);
                    pending.push((task.id, priority));
                    added.push(task.id);
                }
                Op::Start => {
                    let started = manager.start_next_task().map(|t| t.id);
                    if active.is_some() {
                        prop_assert_eq!(started, None);
                    } else {
                        prop_assert_eq!(started, expected_next(&pending));
                        if let Some(id) = started {
                            pending.retain(|(p, _)| *p != id);
                            active = Some(id);
                        }
                    }
                }
                Op::Complete => {
                    let done = manager.complete_active_task(TaskResult::new("ok"));
                    prop_assert_eq!(done.as_ref().map(|t| t.id), active);
                    if let Some(task) = done {
                        prop_assert_eq!(task.status, TaskStatus::Completed);
                        completed += 1;
                    }
                    active = None;
                }
                Op::Fail => {
                    let done = manager.fail_active_task("nope");
                    prop_assert_eq!(done.as_ref().map(|t| t.id), active);
                    if done.is_some() {
                        failed += 1;
                    }
                    active = None;
                }
                Op::Abort(n) => {
                    if added.is_empty() {
                        prop_assert!(!manager.abort_task(Uuid::new_v4()));
                        continue;
                    }
                    let id = added[n % added.len()];
                    let expect = active == Some(id) || pending.iter().any(|(p, _)| *p == id);
                    prop_assert_eq!(manager.abort_task(id), expect);
                    if expect {
                        pending.retain(|(p, _)| *p != id);
                        if active == Some(id) {
                            active = None;
                        }
                        failed += 1;
                    }
                }
            }

            let state = manager.queue_state();
            prop_assert!(state.active <= 1);
            prop_assert_eq!(state.active_task.as_ref().map(|t| t.id), active);
            prop_assert_eq!(state.pending, pending.len());
            prop_assert_eq!(state.completed, completed);
            prop_assert_eq!(state.failed, failed);
            prop_assert_eq!(state.total, state.pending + state.active + state.completed + state.failed);
            let d = state.priority_distribution;
            prop_assert_eq!(d.high + d.normal + d.low, state.pending);
            prop_assert_eq!(manager.stats().added_count as usize, added.len());
        }
    }

    #[test]
    fn prop_fifo_within_priority(priorities in prop::collection::vec(arb_priority(), 0..40)) {
        let mut manager = TaskQueueManager::new();
        let ids: Vec<(Uuid, Priority)> = priorities
            .iter()
            .map(|p| {
                let task = manager.add_task(Instruction::new("t").with_priority(*p));
                (task.id, *p)
            })
            .collect();

        let mut drained = Vec::new();
        while let Some(task) = manager.start_next_task() {
            drained.push(task.id);
            manager.complete_active_task(TaskResult::default());
        }

        let mut expected = Vec::new();
        for level in Priority::ALL {
            expected.extend(ids.iter().filter(|(_, p)| *p == level).map(|(id, _)| *id));
        }
        prop_assert_eq!(drained, expected);
    }
}
