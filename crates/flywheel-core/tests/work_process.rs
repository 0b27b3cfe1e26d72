
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use flywheel_core::workflow::WorkflowStateUpdating;
use flywheel_core::{Clock, ErrorKind, EventRecord, EventSink, FlywheelError, Id, OutboxDispatcher, StateCategory,
                    Store, Transition, UnitOfWork, WorkProcessEngine, WorkStateTransitionBrief};
use test_support::*;

fn brief(work: i64, flow: Id, from: &str, to: &str) -> WorkStateTransitionBrief {
    WorkStateTransitionBrief::new(Id(work), flow, from, to)
}

#[test]
fn transition_happy_path_moves_work_and_opens_next_step() {
    let fx = Fixture::new();
    let flow = fx.create_basic_workflow().workflow.id;
    fx.seed_work(1, flow, "PENDING", StateCategory::InBacklog);
    let now = fx.clock.now();

    let log = fx.engine.transition(&brief(1, flow, "PENDING", "DOING"), &member()).expect("transition");
    assert_eq!((log.from_state.as_str(), log.to_state.as_str()), ("PENDING", "DOING"));
    assert_eq!(log.create_time, now);
    assert_eq!(log.creator_id, Id(42));

    let work = fx.work(1);
    assert_eq!(work.state_name, "DOING");
    assert_eq!(work.state_category, StateCategory::InProcess);
    assert_eq!(work.state_begin_time, Some(now));
    assert_eq!(work.process_begin_time, Some(now));
    assert_eq!(work.process_end_time, None);

    let steps = fx.steps(1);
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].state_name, "PENDING");
    assert_eq!(steps[0].end_time, Some(now));
    assert_eq!(steps[0].next_state_name.as_deref(), Some("DOING"));
    assert_eq!(steps[0].next_state_category, Some(StateCategory::InProcess));
    assert_eq!(steps[1].state_name, "DOING");
    assert!(steps[1].is_open());
    assert_eq!(steps[1].creator_name, "alice");
    assert_single_open_step(&fx, 1);

    let logs = fx.store.run(|uow| uow.list_transition_logs(Id(1))).expect("logs");
    assert_eq!(logs, vec![log]);
}

#[test]
fn transition_to_done_closes_history_without_new_step() {
    let fx = Fixture::new();
    let flow = fx.create_basic_workflow().workflow.id;
    fx.seed_work(1, flow, "PENDING", StateCategory::InBacklog);
    fx.engine.transition(&brief(1, flow, "PENDING", "DOING"), &member()).expect("to doing");
    fx.tick();
    let done_at = fx.clock.now();

    fx.engine.transition(&brief(1, flow, "DOING", "DONE"), &member()).expect("to done");
    let work = fx.work(1);
    assert_eq!(work.state_category, StateCategory::Done);
    assert_eq!(work.process_end_time, Some(done_at));
    assert!(work.process_begin_time < Some(done_at));

    let steps = fx.steps(1);
    assert_eq!(steps.len(), 2, "no step is opened for DONE");
    assert!(steps.iter().all(|s| !s.is_open()));
    assert_eq!(steps[1].next_state_name.as_deref(), Some("DONE"));
    assert_single_open_step(&fx, 1);
}

#[test]
fn reopening_clears_process_end_time_and_opens_step() {
    let fx = Fixture::new();
    let flow = fx.create_basic_workflow().workflow.id;
    fx.workflows
      .add_transitions(flow, &[Transition::between("DONE", "DOING")], &manager())
      .expect("allow reopen");
    fx.seed_work(1, flow, "DONE", StateCategory::Done);
    fx.store
      .run(|uow| uow.set_work_process_end(Id(1), Some(fx.clock.now())))
      .expect("mark finished");
    fx.tick();

    fx.engine.transition(&brief(1, flow, "DONE", "DOING"), &member()).expect("reopen");
    let work = fx.work(1);
    assert_eq!(work.process_end_time, None);
    assert_eq!(work.process_begin_time, Some(fx.clock.now()));
    let steps = fx.steps(1);
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].state_name, "DOING");
    assert_single_open_step(&fx, 1);
}

#[test]
fn invalid_transition_changes_nothing() {
    let fx = Fixture::new();
    let flow = fx.create_basic_workflow().workflow.id;
    let before = fx.seed_work(1, flow, "PENDING", StateCategory::InBacklog);

    let err = fx.engine.transition(&brief(1, flow, "PENDING", "DONE"), &member()).unwrap_err();
    assert_eq!(err,
               FlywheelError::InvalidTransition { from: "PENDING".into(),
                                                  to: "DONE".into() });
    assert_eq!(fx.work(1), before);
    assert_eq!(fx.steps(1).len(), 1);
    let outbox = fx.store.run(|uow| uow.pending_outbox(10)).expect("outbox");
    assert!(outbox.is_empty());
}

#[test]
fn state_machine_is_checked_before_work_authorization() {
    let fx = Fixture::new();
    let flow = fx.create_basic_workflow().workflow.id;
    fx.seed_work(1, flow, "PENDING", StateCategory::InBacklog);

    // sin rol en el proyecto el detalle del workflow ya lo rechaza
    let err = fx.engine.transition(&brief(1, flow, "PENDING", "DOING"), &outsider()).unwrap_err();
    assert_eq!(err, FlywheelError::Forbidden);

    // transición inválida gana aunque el work no exista
    let err = fx.engine.transition(&brief(404, flow, "PENDING", "DONE"), &member()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    let err = fx.engine.transition(&brief(404, flow, "PENDING", "DOING"), &member()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn archived_work_cannot_transition() {
    let fx = Fixture::new();
    let flow = fx.create_basic_workflow().workflow.id;
    let mut work = fx.seed_work(1, flow, "PENDING", StateCategory::InBacklog);
    work.id = Id(2);
    work.archive_time = Some(fx.clock.now());
    fx.store.run(|uow| uow.insert_work(&work)).expect("archived work");

    let err = fx.engine.transition(&brief(2, flow, "PENDING", "DOING"), &member()).unwrap_err();
    assert_eq!(err, FlywheelError::ArchiveStatusInvalid);
    assert_eq!(fx.work(2).state_name, "PENDING");
}

#[test]
fn stale_from_state_is_an_affected_row_mismatch() {
    let fx = Fixture::new();
    let flow = fx.create_basic_workflow().workflow.id;
    fx.seed_work(1, flow, "DOING", StateCategory::InProcess);

    let err = fx.engine.transition(&brief(1, flow, "PENDING", "DOING"), &member()).unwrap_err();
    assert_eq!(err, FlywheelError::AffectedRowMismatch { expected: 1, actual: 0 });
    assert_eq!(err.to_string(), "expected affected row is 1, but actual is 0");
}

#[test]
fn work_of_another_workflow_is_rejected() {
    let fx = Fixture::new();
    let flow = fx.create_basic_workflow().workflow.id;
    let other = fx.create_basic_workflow().workflow.id;
    fx.seed_work(1, other, "PENDING", StateCategory::InBacklog);

    let err = fx.engine.transition(&brief(1, flow, "PENDING", "DOING"), &member()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadParam);
}

#[test]
fn concurrent_transitions_from_same_state_succeed_once() {
    let fx = Arc::new(Fixture::new());
    let flow = fx.create_basic_workflow().workflow.id;
    fx.seed_work(1, flow, "PENDING", StateCategory::InBacklog);

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2).map(|_| {
                                    let fx = fx.clone();
                                    let barrier = barrier.clone();
                                    thread::spawn(move || {
                                        barrier.wait();
                                        fx.engine.transition(&brief(1, flow, "PENDING", "DOING"), &member())
                                    })
                                })
                                .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().expect("thread")).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1, "results: {results:?}");
    let failure = results.into_iter().find_map(|r| r.err()).expect("one failure");
    assert_eq!(failure, FlywheelError::AffectedRowMismatch { expected: 1, actual: 0 });
    assert_eq!(fx.steps(1).len(), 2);
    assert_single_open_step(&fx, 1);
}

#[test]
fn rename_cascades_into_transitions_works_and_steps() {
    let fx = Fixture::new();
    let flow = fx.create_basic_workflow().workflow.id;
    fx.seed_work(1, flow, "PENDING", StateCategory::InBacklog);
    fx.seed_work(2, flow, "PENDING", StateCategory::InBacklog);
    fx.engine.transition(&brief(1, flow, "PENDING", "DOING"), &member()).expect("w1 doing");
    fx.tick();
    fx.engine.transition(&brief(2, flow, "PENDING", "DOING"), &member()).expect("w2 doing");
    fx.tick();
    fx.engine.transition(&brief(2, flow, "DOING", "DONE"), &member()).expect("w2 done");

    let updating = WorkflowStateUpdating { origin_name: "DOING".into(),
                                           name: "IN_PROGRESS".into(),
                                           order: 10002 };
    fx.workflows.update_state(flow, &updating, &manager()).expect("rename");

    let detail = fx.workflows.detail(flow, &member()).expect("detail");
    assert!(detail.state_machine.find_state("DOING").is_none());
    assert_eq!(detail.state_machine.find_state("IN_PROGRESS").map(|s| s.category),
               Some(StateCategory::InProcess));
    assert_eq!(detail.state_machine.transitions,
               vec![Transition::new("PENDING -> DOING", "PENDING", "IN_PROGRESS"),
                    Transition::new("DOING -> DONE", "IN_PROGRESS", "DONE")]);

    let w1 = fx.work(1);
    assert_eq!((w1.state_name.as_str(), w1.state_category), ("IN_PROGRESS", StateCategory::InProcess));
    for work_id in [1, 2] {
        for step in fx.steps(work_id) {
            assert_ne!(step.state_name, "DOING");
            assert_ne!(step.next_state_name.as_deref(), Some("DOING"));
        }
    }
    let w2_steps = fx.steps(2);
    assert_eq!(w2_steps[0].next_state_name.as_deref(), Some("IN_PROGRESS"));
    assert_eq!(w2_steps[0].next_state_category, Some(StateCategory::InProcess));
    assert_eq!(w2_steps[1].state_category, StateCategory::InProcess);

    // el work sigue operando con el nombre nuevo
    fx.tick();
    fx.engine.transition(&brief(1, flow, "IN_PROGRESS", "DONE"), &member()).expect("done after rename");
    assert_single_open_step(&fx, 1);
}

#[test]
fn process_steps_are_listed_in_begin_order() {
    let fx = Fixture::new();
    let flow = fx.create_basic_workflow().workflow.id;
    fx.workflows
      .add_transitions(flow, &[Transition::between("DOING", "PENDING")], &manager())
      .expect("allow back");
    fx.seed_work(1, flow, "PENDING", StateCategory::InBacklog);
    let path = [("PENDING", "DOING"), ("DOING", "PENDING"), ("PENDING", "DOING")];
    for (from, to) in path {
        fx.engine.transition(&brief(1, flow, from, to), &member()).expect("transition");
        fx.tick();
    }

    let steps = fx.engine.query_process_steps(Id(1), &member()).expect("steps");
    assert_eq!(steps.len(), path.len() + 1);
    assert!(steps.windows(2).all(|w| w[0].begin_time < w[1].begin_time));
    let names: Vec<&str> = steps.iter().map(|s| s.state_name.as_str()).collect();
    assert_eq!(names, vec!["PENDING", "DOING", "PENDING", "DOING"]);
    assert_single_open_step(&fx, 1);
}

#[test]
fn process_steps_of_unknown_or_hidden_work_are_empty() {
    let fx = Fixture::new();
    let flow = fx.create_basic_workflow().workflow.id;
    fx.seed_work(1, flow, "PENDING", StateCategory::InBacklog);

    assert!(fx.engine.query_process_steps(Id(404), &member()).expect("unknown").is_empty());
    assert!(fx.engine.query_process_steps(Id(1), &outsider()).expect("hidden").is_empty());
    assert_eq!(fx.engine.query_process_steps(Id(1), &member()).expect("visible").len(), 1);
}

#[test]
fn missing_open_step_is_tolerated() {
    let fx = Fixture::new();
    let flow = fx.create_basic_workflow().workflow.id;
    let mut work = fx.seed_work(1, flow, "PENDING", StateCategory::InBacklog);
    work.id = Id(2);
    fx.store.run(|uow| uow.insert_work(&work)).expect("work without history");

    fx.engine.transition(&brief(2, flow, "PENDING", "DOING"), &member()).expect("transition");
    let steps = fx.steps(2);
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].state_name, "DOING");
}

#[test]
fn transition_event_lands_in_outbox_and_is_dispatched_once() {
    let fx = Fixture::new();
    let flow = fx.create_basic_workflow().workflow.id;
    fx.seed_work(1, flow, "PENDING", StateCategory::InBacklog);
    fx.engine.transition(&brief(1, flow, "PENDING", "DOING"), &member()).expect("transition");

    let dispatcher = OutboxDispatcher::new(fx.store.clone(), fx.clock.clone());
    let seen: Mutex<Vec<EventRecord>> = Mutex::new(Vec::new());
    let failing = |_: &EventRecord| -> Result<(), FlywheelError> { Err(FlywheelError::Internal("bus down".into())) };
    assert!(dispatcher.drain(&failing, 10).is_err());

    let collect = |e: &EventRecord| -> Result<(), FlywheelError> {
        seen.lock().expect("lock").push(e.clone());
        Ok(())
    };
    assert_eq!(dispatcher.drain(&collect, 10).expect("drain"), 1);
    assert_eq!(dispatcher.drain(&collect, 10).expect("drain again"), 0);

    let seen = seen.into_inner().expect("events");
    assert_eq!(seen.len(), 1);
    let event = &seen[0];
    assert_eq!(event.source_id, Id(1));
    assert_eq!(event.source_type, "WORK");
    assert_eq!(event.category, "PropertyUpdated");
    assert_eq!(event.creator_name, "alice");
    let prop = &event.updated_properties[0];
    assert_eq!((prop.property_name.as_str(), prop.old_value.as_str(), prop.new_value.as_str()),
               ("StateName", "PENDING", "DOING"));
}

#[test]
fn handler_writing_back_into_the_drained_store_fails_cleanly() {
    let fx = Fixture::new();
    let flow = fx.create_basic_workflow().workflow.id;
    fx.seed_work(1, flow, "PENDING", StateCategory::InBacklog);
    fx.engine.transition(&brief(1, flow, "PENDING", "DOING"), &member()).expect("transition");

    let dispatcher = OutboxDispatcher::new(fx.store.clone(), fx.clock.clone());
    let writer = |e: &EventRecord| -> Result<(), FlywheelError> {
        fx.store.run(|uow| uow.list_transition_logs(e.source_id)).map(|_| ())
    };
    let err = dispatcher.drain(&writer, 10).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);

    let pending = fx.store.run(|uow| uow.pending_outbox(10)).expect("outbox");
    assert_eq!(pending.len(), 1, "event stays pending after the failed drain");
}

struct RejectingSink;

impl EventSink for RejectingSink {
    fn emit(&self, _uow: &mut dyn UnitOfWork, _event: &EventRecord) -> Result<(), FlywheelError> {
        Err(FlywheelError::EventSink("sink unavailable".into()))
    }
}

#[test]
fn sink_failure_rolls_back_the_whole_transition() {
    let fx = Fixture::new();
    let flow = fx.create_basic_workflow().workflow.id;
    let before = fx.seed_work(1, flow, "PENDING", StateCategory::InBacklog);
    let engine = WorkProcessEngine::new(fx.workflows.clone(), RejectingSink, fx.ids.clone(), fx.clock.clone());

    let err = engine.transition(&brief(1, flow, "PENDING", "DOING"), &member()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(fx.work(1), before);
    assert_eq!(fx.steps(1).len(), 1);
    assert!(fx.store.run(|uow| uow.list_transition_logs(Id(1))).expect("logs").is_empty());
}
