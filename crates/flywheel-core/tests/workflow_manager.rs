
use flywheel_core::workflow::{StateCreating, StateOrderRangeUpdating, WorkflowBaseUpdating, WorkflowQuery,
                              WorkflowStateUpdating};
use flywheel_core::{ErrorKind, FlywheelError, Id, ProcessStep, State, StateCategory, StateMachine, Store, Transition};
use test_support::*;

#[test]
fn create_restamps_orders_and_detail_round_trips() {
    let fx = Fixture::new();
    let created = fx.create_basic_workflow();

    let orders: Vec<i32> = created.state_machine.states.iter().map(|s| s.order).collect();
    assert_eq!(orders, vec![10001, 10002, 10003]);

    let detail = fx.workflows.detail(created.workflow.id, &member()).expect("detail");
    assert_eq!(detail, created);
    let mut expected = basic_machine();
    expected.restamp_orders(10000);
    assert_eq!(detail.state_machine, expected);
}

#[test]
fn create_without_role_is_forbidden_and_writes_nothing() {
    let fx = Fixture::new();
    let err = fx.workflows.create(&basic_creation(), &outsider()).unwrap_err();
    assert_eq!(err, FlywheelError::Forbidden);

    let found = fx.workflows.query(&WorkflowQuery::default(), &session(&["member_1", "member_2"])).expect("query");
    assert!(found.is_empty(), "no workflow rows expected: {found:?}");
}

#[test]
fn create_rejects_machine_with_unknown_endpoint() {
    let fx = Fixture::new();
    let mut creation = basic_creation();
    creation.state_machine.transitions.push(Transition::between("DOING", "REVIEW"));
    let err = fx.workflows.create(&creation, &member()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownState);
}

#[test]
fn detail_requires_role_and_existing_workflow() {
    let fx = Fixture::new();
    let wf = fx.create_basic_workflow();
    assert_eq!(fx.workflows.detail(wf.workflow.id, &outsider()).unwrap_err(), FlywheelError::Forbidden);
    assert_eq!(fx.workflows.detail(Id(404), &member()).unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn detail_reports_corrupted_transition_as_state_invalid() {
    let fx = Fixture::new();
    let wf = fx.create_basic_workflow();
    fx.store
      .run(|uow| {
          uow.insert_transition(&flywheel_core::model::WorkflowTransitionRecord { workflow_id: wf.workflow.id,
                                                                                  name: "ghost".into(),
                                                                                  from_state: "DONE".into(),
                                                                                  to_state: "GHOST".into(),
                                                                                  create_time: wf.workflow.create_time })
      })
      .expect("corrupt");
    let err = fx.workflows.detail(wf.workflow.id, &member()).unwrap_err();
    assert_eq!(err, FlywheelError::StateInvalid("GHOST".into()));
}

#[test]
fn query_is_scoped_to_visible_projects() {
    let fx = Fixture::new();
    fx.create_basic_workflow();
    let mut other = basic_creation();
    other.name = "Other board".into();
    other.project_id = Id(2);
    fx.workflows.create(&other, &session(&["member_2"])).expect("create other");

    let visible = fx.workflows.query(&WorkflowQuery::default(), &member()).expect("query");
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].name, "wf1");

    let both = session(&["member_1", "manager_2"]);
    let by_name = fx.workflows
                    .query(&WorkflowQuery { project_id: None,
                                            name: Some("BOARD".into()) },
                           &both)
                    .expect("query by name");
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].project_id, Id(2));

    let by_project = fx.workflows
                       .query(&WorkflowQuery { project_id: Some(Id(1)),
                                               name: None },
                              &both)
                       .expect("query by project");
    assert_eq!(by_project.len(), 1);
    assert_eq!(by_project[0].project_id, Id(1));
}

#[test]
fn query_without_visible_projects_returns_empty() {
    let fx = Fixture::new();
    fx.create_basic_workflow();
    let nobody = session(&["admin"]);
    let found = fx.workflows.query(&WorkflowQuery::default(), &nobody).expect("query");
    assert!(found.is_empty());
}

#[test]
fn update_base_requires_manager_and_returns_fresh_row() {
    let fx = Fixture::new();
    let wf = fx.create_basic_workflow();
    let updating = WorkflowBaseUpdating { name: "renamed".into(),
                                          theme_color: "#000".into(),
                                          theme_icon: "star".into() };
    assert_eq!(fx.workflows.update_base(wf.workflow.id, &updating, &member()).unwrap_err(),
               FlywheelError::Forbidden);

    let updated = fx.workflows.update_base(wf.workflow.id, &updating, &manager()).expect("update");
    assert_eq!(updated.name, "renamed");
    assert_eq!(updated.theme_color, "#000");
    assert_eq!(updated.theme_icon, "star");
    assert_eq!(updated.create_time, wf.workflow.create_time);
}

#[test]
fn delete_blocked_while_a_work_references_the_workflow() {
    let fx = Fixture::new();
    let wf = fx.create_basic_workflow();
    fx.seed_work(1, wf.workflow.id, "PENDING", StateCategory::InBacklog);

    let err = fx.workflows.delete(wf.workflow.id, &manager()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WorkflowReferenced);
    assert!(fx.workflows.detail(wf.workflow.id, &member()).is_ok(), "workflow must survive");
}

#[test]
fn delete_blocked_by_process_steps_alone() {
    let fx = Fixture::new();
    let wf = fx.create_basic_workflow();
    // historial huérfano: ningún work apunta ya al workflow
    let step = ProcessStep { work_id: Id(99),
                             flow_id: wf.workflow.id,
                             state_name: "DOING".into(),
                             state_category: StateCategory::InProcess,
                             begin_time: wf.workflow.create_time,
                             end_time: None,
                             next_state_name: None,
                             next_state_category: None,
                             creator_id: Id(7),
                             creator_name: "seed".into() };
    fx.store.run(|uow| uow.insert_process_step(&step)).expect("orphan step");

    let err = fx.workflows.delete(wf.workflow.id, &manager()).unwrap_err();
    assert_eq!(err, FlywheelError::WorkflowReferenced(wf.workflow.id.to_string()));
}

#[test]
fn delete_removes_workflow_states_and_transitions() {
    let fx = Fixture::new();
    let wf = fx.create_basic_workflow();
    assert_eq!(fx.workflows.delete(wf.workflow.id, &member()).unwrap_err(), FlywheelError::Forbidden);
    fx.workflows.delete(wf.workflow.id, &manager()).expect("delete");

    assert_eq!(fx.workflows.detail(wf.workflow.id, &member()).unwrap_err().kind(), ErrorKind::NotFound);
    let (states, transitions) = fx.store
                                  .run(|uow| {
                                      Ok((uow.list_states(wf.workflow.id)?, uow.list_transitions(wf.workflow.id)?))
                                  })
                                  .expect("leftovers");
    assert!(states.is_empty());
    assert!(transitions.is_empty());
}

#[test]
fn add_transitions_is_all_or_nothing() {
    let fx = Fixture::new();
    let wf = fx.create_basic_workflow();
    let id = wf.workflow.id;

    let batch = vec![Transition::between("DONE", "DOING"), Transition::between("PENDING", "NOPE")];
    let err = fx.workflows.add_transitions(id, &batch, &manager()).unwrap_err();
    assert_eq!(err, FlywheelError::UnknownState("NOPE".into()));
    let detail = fx.workflows.detail(id, &member()).expect("detail");
    assert_eq!(detail.state_machine.transitions.len(), 2, "first insert must be rolled back");

    let dup = vec![Transition::between("PENDING", "DOING")];
    let err = fx.workflows.add_transitions(id, &dup, &manager()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransitionExisted);

    assert_eq!(fx.workflows.add_transitions(id, &batch[..1], &member()).unwrap_err(), FlywheelError::Forbidden);
    fx.workflows.add_transitions(id, &batch[..1], &manager()).expect("add");
    let detail = fx.workflows.detail(id, &member()).expect("detail");
    assert_eq!(detail.state_machine.available_transitions("DONE", "DOING").len(), 1);
}

#[test]
fn remove_transitions_matches_exact_names() {
    let fx = Fixture::new();
    let mut creation = basic_creation();
    creation.state_machine = StateMachine::new(vec![State::new("A_1", StateCategory::InBacklog),
                                                    State::new("AB1", StateCategory::InBacklog),
                                                    State::new("Z", StateCategory::Done)],
                                               vec![Transition::between("A_1", "Z"), Transition::between("AB1", "Z")]);
    let wf = fx.workflows.create(&creation, &manager()).expect("create");

    fx.workflows
      .remove_transitions(wf.workflow.id, &[Transition::between("A_1", "Z")], &manager())
      .expect("remove");
    let detail = fx.workflows.detail(wf.workflow.id, &member()).expect("detail");
    assert_eq!(detail.state_machine.transitions, vec![Transition::between("AB1", "Z")]);
}

#[test]
fn create_state_inserts_state_then_transitions() {
    let fx = Fixture::new();
    let wf = fx.create_basic_workflow();
    let creating = StateCreating { name: "REVIEW".into(),
                                   category: StateCategory::InProcess,
                                   order: 10002,
                                   transitions: vec![Transition::between("DOING", "REVIEW"),
                                                     Transition::between("REVIEW", "DONE")] };
    assert_eq!(fx.workflows.create_state(wf.workflow.id, &creating, &outsider()).unwrap_err(),
               FlywheelError::Forbidden);
    fx.workflows.create_state(wf.workflow.id, &creating, &member()).expect("create state");

    let detail = fx.workflows.detail(wf.workflow.id, &member()).expect("detail");
    let names: Vec<&str> = detail.state_machine.states.iter().map(|s| s.name.as_str()).collect();
    // empate en 10002: DOING se insertó antes
    assert_eq!(names, vec!["PENDING", "DOING", "REVIEW", "DONE"]);
    assert_eq!(detail.state_machine.next_states("REVIEW")[0].name, "DONE");

    let err = fx.workflows.create_state(wf.workflow.id, &creating, &member()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateExisted);
}

#[test]
fn create_state_with_bad_transition_rolls_back_the_state() {
    let fx = Fixture::new();
    let wf = fx.create_basic_workflow();
    let creating = StateCreating { name: "QA".into(),
                                   category: StateCategory::InProcess,
                                   order: 1,
                                   transitions: vec![Transition::between("QA", "MISSING")] };
    let err = fx.workflows.create_state(wf.workflow.id, &creating, &member()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownState);
    let detail = fx.workflows.detail(wf.workflow.id, &member()).expect("detail");
    assert!(detail.state_machine.find_state("QA").is_none());
}

#[test]
fn update_state_rejects_existing_target_and_missing_origin() {
    let fx = Fixture::new();
    let wf = fx.create_basic_workflow();
    let id = wf.workflow.id;
    let rename = |origin: &str, name: &str| WorkflowStateUpdating { origin_name: origin.into(),
                                                                    name: name.into(),
                                                                    order: 1 };

    assert_eq!(fx.workflows.update_state(id, &rename("DOING", "X"), &member()).unwrap_err(),
               FlywheelError::Forbidden);
    assert_eq!(fx.workflows.update_state(id, &rename("DOING", "DONE"), &manager()).unwrap_err().kind(),
               ErrorKind::StateExisted);
    assert_eq!(fx.workflows.update_state(id, &rename("NOPE", "X"), &manager()).unwrap_err().kind(),
               ErrorKind::NotFound);
}

#[test]
fn update_state_to_same_name_only_reorders() {
    let fx = Fixture::new();
    let wf = fx.create_basic_workflow();
    let updating = WorkflowStateUpdating { origin_name: "DONE".into(),
                                           name: "DONE".into(),
                                           order: 1 };
    fx.workflows.update_state(wf.workflow.id, &updating, &manager()).expect("same name");
    let detail = fx.workflows.detail(wf.workflow.id, &member()).expect("detail");
    assert_eq!(detail.state_machine.states[0], State::new("DONE", StateCategory::Done).with_order(1));
    assert_eq!(detail.state_machine.transitions.len(), 2);
}

#[test]
fn range_orders_update_each_state_exactly_once() {
    let fx = Fixture::new();
    let wf = fx.create_basic_workflow();
    let id = wf.workflow.id;
    let entry = |state: &str, new_order: i32| StateOrderRangeUpdating { state: state.into(),
                                                                        new_order };

    fx.workflows.update_state_range_orders(id, &[], &outsider()).expect("empty list is a no-op");
    assert_eq!(fx.workflows.update_state_range_orders(id, &[entry("DONE", -5)], &outsider()).unwrap_err(),
               FlywheelError::Forbidden);

    fx.workflows
      .update_state_range_orders(id, &[entry("DONE", -5), entry("PENDING", 20000)], &member())
      .expect("reorder");
    let names: Vec<String> = fx.workflows
                               .detail(id, &member())
                               .expect("detail")
                               .state_machine
                               .states
                               .into_iter()
                               .map(|s| s.name)
                               .collect();
    assert_eq!(names, vec!["DONE", "DOING", "PENDING"]);

    let err = fx.workflows
                .update_state_range_orders(id, &[entry("DOING", 1), entry("GHOST", 2)], &member())
                .unwrap_err();
    assert_eq!(err, FlywheelError::AffectedRowMismatch { expected: 1, actual: 0 });
    let doing = fx.workflows.detail(id, &member()).expect("detail");
    assert_eq!(doing.state_machine.find_state("DOING").map(|s| s.order), Some(10002));
}
