// tests/core_properties.rs

use std::collections::HashSet;

use proptest::prelude::*;
use taskctl::{SchedulerCore, TaskId, TaskKind, TaskResult, TaskSpec, TaskState, task_fn};

#[derive(Debug, Clone)]
struct GenTask {
    priority: u32,
    kind: TaskKind,
    deps: Vec<usize>,
}

// Task N may only depend on tasks 0..N-1, which keeps the graph acyclic.
fn task_graph_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<GenTask>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            (
                0u32..5,
                any::<bool>(),
                proptest::collection::vec(any::<usize>(), 0..3),
            ),
            num_tasks,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, (priority, off_main, potential_deps))| {
                    let mut deps: Vec<usize> = Vec::new();
                    if i > 0 {
                        for dep in potential_deps {
                            let dep = dep % i;
                            if !deps.contains(&dep) {
                                deps.push(dep);
                            }
                        }
                    }
                    GenTask {
                        priority,
                        kind: if off_main {
                            TaskKind::OffMainThreadOnly
                        } else {
                            TaskKind::MainThreadOnly
                        },
                        deps,
                    }
                })
                .collect()
        })
    })
}

fn submit(core: &mut SchedulerCore, tasks: &[GenTask]) -> Vec<TaskId> {
    let mut ids: Vec<TaskId> = Vec::with_capacity(tasks.len());
    for (i, task) in tasks.iter().enumerate() {
        let body = task_fn(format!("t{i}"), |_cx| TaskResult::Complete);
        let mut spec = TaskSpec::new(task.kind, task.priority, body);
        for dep in &task.deps {
            spec = spec.depends_on(ids[*dep]);
        }
        ids.push(core.add_task(spec));
        core.assert_consistent();
    }
    ids
}

proptest! {
    #[test]
    fn test_main_thread_runs_respect_dependencies(
        tasks in task_graph_strategy(12).prop_map(|mut tasks| {
            for task in tasks.iter_mut() {
                task.kind = TaskKind::MainThreadOnly;
            }
            tasks
        })
    ) {
        let mut core = SchedulerCore::new();
        let ids = submit(&mut core, &tasks);
        let mut completed: HashSet<TaskId> = HashSet::new();

        while let Some(ticket) = core.start_main_thread_run() {
            core.assert_consistent();
            let index = ids.iter().position(|id| *id == ticket.id).expect("known task");
            for dep in &tasks[index].deps {
                prop_assert!(completed.contains(&ids[*dep]), "t{index} started before t{dep}");
            }
            completed.insert(ticket.id);
            let _ = core.finish_main_thread_run(ticket, TaskResult::Complete);
            core.assert_consistent();
        }

        prop_assert_eq!(completed.len(), tasks.len());
        prop_assert_eq!(core.live_task_count(), 0);
        for id in &ids {
            prop_assert_eq!(core.task_state(*id), TaskState::Completed);
        }
    }

    #[test]
    fn test_independent_tasks_run_in_priority_then_insertion_order(
        priorities in proptest::collection::vec(0u32..5, 1..20)
    ) {
        let mut core = SchedulerCore::new();
        let tasks: Vec<GenTask> = priorities
            .iter()
            .map(|p| GenTask { priority: *p, kind: TaskKind::MainThreadOnly, deps: vec![] })
            .collect();
        let ids = submit(&mut core, &tasks);

        let mut expected: Vec<usize> = (0..tasks.len()).collect();
        expected.sort_by_key(|i| priorities[*i]);

        let mut order = Vec::new();
        while let Some(ticket) = core.start_main_thread_run() {
            order.push(ids.iter().position(|id| *id == ticket.id).expect("known task"));
            let _ = core.finish_main_thread_run(ticket, TaskResult::Complete);
        }
        prop_assert_eq!(order, expected);
    }

    #[test]
    fn test_mixed_graph_drains_on_main_thread_and_pool(
        tasks in task_graph_strategy(16),
        workers in 1usize..4,
        yield_mask in proptest::collection::vec(any::<bool>(), 16),
    ) {
        let mut core = SchedulerCore::new();
        core.attach_workers(workers);
        let ids = submit(&mut core, &tasks);

        let mut completed: HashSet<TaskId> = HashSet::new();
        // Each task may yield once before completing.
        let mut yielded: HashSet<TaskId> = HashSet::new();
        let mut outcome = |id: TaskId, index: usize| {
            if yield_mask[index] && yielded.insert(id) {
                TaskResult::Incomplete
            } else {
                TaskResult::Complete
            }
        };

        loop {
            let mut progressed = false;

            for worker in 0..workers {
                if let Some(ticket) = core.start_worker_run(worker) {
                    let index = ids.iter().position(|id| *id == ticket.id).expect("known task");
                    prop_assert_eq!(tasks[index].kind, TaskKind::OffMainThreadOnly);
                    for dep in &tasks[index].deps {
                        prop_assert!(completed.contains(&ids[*dep]));
                    }
                    let result = outcome(ticket.id, index);
                    if result == TaskResult::Complete {
                        completed.insert(ticket.id);
                    }
                    let _ = core.finish_worker_run(worker, ticket, result);
                    progressed = true;
                }
            }

            if let Some(ticket) = core.start_main_thread_run() {
                let index = ids.iter().position(|id| *id == ticket.id).expect("known task");
                prop_assert_eq!(tasks[index].kind, TaskKind::MainThreadOnly);
                for dep in &tasks[index].deps {
                    prop_assert!(completed.contains(&ids[*dep]));
                }
                let result = outcome(ticket.id, index);
                if result == TaskResult::Complete {
                    completed.insert(ticket.id);
                }
                let _ = core.finish_main_thread_run(ticket, result);
                progressed = true;
            }

            core.assert_consistent();
            if !progressed {
                break;
            }
        }

        prop_assert_eq!(completed.len(), tasks.len());
        prop_assert_eq!(core.live_task_count(), 0);
        prop_assert_eq!(core.idle_thread_count(), workers);
    }
}
