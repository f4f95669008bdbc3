use super::*;

fn transition(identifier: &str, transition: Transition) -> CaseCommand {
    CaseCommand::MakePlanItemTransition {
        identifier: identifier.to_string(),
        transition,
    }
}

#[tokio::test]
async fn test_transition_by_name_checks_permission() {
    let mut harness = sequence_case().await;
    let before = harness.events.len();
    for user_id in ["eve", "bob"] {
        let err = harness
            .send(user_id, transition("Assess", Transition::Complete))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::TransitionDenied { .. }), "{}", err);
        assert!(err.message().contains("permission"), "{}", err);
    }
    assert_eq!(harness.state("Assess"), State::Active);
    assert_eq!(harness.state("Approve"), State::Available);
    assert_eq!(harness.events.len(), before);

    harness
        .send("alice", transition("Assess", Transition::Complete))
        .await
        .expect("clerk completes by name");
    assert_eq!(harness.state("Assess"), State::Completed);
}

#[tokio::test]
async fn test_case_plan_by_name_needs_an_owner() {
    let mut harness = sequence_case().await;
    let err = harness
        .send("bob", transition("Claim handling", Transition::Terminate))
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::TransitionDenied { .. }));
    assert_eq!(harness.case_plan_state(), State::Active);
}

#[tokio::test]
async fn test_repeated_member_cannot_drop_the_owner() {
    let mut harness = sequence_case().await;
    let err = harness
        .send(
            "alice",
            CaseCommand::SetCaseTeam {
                members: vec![Member::user("alice").owner().with_role("clerk"), Member::user("alice")],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::CaseTeam { .. }));
    assert!(harness.case.team().is_owner(&user("alice")));
    assert_eq!(harness.case.team().owner_count(), 1);

    let mut fresh = Harness::new();
    let err = fresh
        .send(
            "alice",
            CaseCommand::StartCase {
                definition: "sequence".to_string(),
                input: Value::Null,
                team: vec![Member::user("alice").owner(), Member::user("alice")],
                parent: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::CaseTeam { .. }));
    assert!(fresh.events.is_empty());
}

#[tokio::test]
async fn test_owner_assigns_and_enrolls_assignee() {
    let mut harness = sequence_case().await;
    let assess = harness.item("Assess").id;
    let events = harness
        .send(
            "alice",
            CaseCommand::AssignTask {
                task_id: assess.clone(),
                assignee: "carol".to_string(),
            },
        )
        .await
        .expect("assign");
    assert!(events.contains(&CaseEvent::HumanTaskAssigned {
        plan_item_id: assess.clone(),
        assignee: "carol".to_string(),
    }));
    assert_eq!(harness.item("Assess").assignee.as_deref(), Some("carol"));
    assert!(harness.case.team().roles_of(&user("carol")).contains("clerk"));

    // Only the assignee completes, even for another clerk.
    let err = harness
        .send(
            "alice",
            CaseCommand::CompleteHumanTask {
                task_id: assess.clone(),
                output: Value::Null,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::TransitionDenied { .. }));
    let err = harness
        .send("alice", transition("Assess", Transition::Complete))
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::TransitionDenied { .. }));
    assert_eq!(harness.state("Assess"), State::Active);

    harness
        .send(
            "carol",
            CaseCommand::CompleteHumanTask {
                task_id: assess,
                output: Value::Null,
            },
        )
        .await
        .expect("assignee completes");
    assert_eq!(harness.state("Assess"), State::Completed);
}

#[tokio::test]
async fn test_member_assignment_needs_a_qualified_assignee() {
    let mut harness = sequence_case().await;
    harness
        .send(
            "alice",
            CaseCommand::SetCaseTeamUser {
                user_id: "dan".to_string(),
                roles: ["clerk".to_string()].into_iter().collect(),
                owner: false,
            },
        )
        .await
        .expect("dan joins");
    let assess = harness.item("Assess").id;
    let assign = |assignee: &str| CaseCommand::AssignTask {
        task_id: assess.clone(),
        assignee: assignee.to_string(),
    };

    let err = harness.send("dan", assign("zed")).await.unwrap_err();
    assert_eq!(err.message(), "There is no case team member with id 'zed'");
    let err = harness.send("dan", assign("bob")).await.unwrap_err();
    assert!(matches!(err, CommandError::Authorization { .. }));
    assert!(harness.item("Assess").assignee.is_none());

    harness.send("dan", assign("alice")).await.expect("owner is a valid assignee");
    assert_eq!(harness.item("Assess").assignee.as_deref(), Some("alice"));
    let events = harness.send("dan", assign("alice")).await.expect("same assignee");
    assert!(events.iter().all(|e| !matches!(e, CaseEvent::HumanTaskAssigned { .. })));

    let err = harness.send("eve", assign("dan")).await.unwrap_err();
    assert_eq!(err, CommandError::unauthorized("User eve is not part of the case team"));
}

#[tokio::test]
async fn test_claim_and_revoke() {
    let mut harness = sequence_case().await;
    let assess = harness.item("Assess").id;
    let claim = CaseCommand::ClaimTask { task_id: assess.clone() };
    let revoke = CaseCommand::RevokeTask { task_id: assess.clone() };

    let err = harness.send("bob", claim.clone()).await.unwrap_err();
    assert!(matches!(err, CommandError::TransitionDenied { .. }));
    assert!(err.message().contains("clerk"), "{}", err);

    let err = harness.send("alice", revoke.clone()).await.unwrap_err();
    assert_eq!(err.message(), "Task 'Assess' is not assigned");

    let events = harness.send("alice", claim.clone()).await.expect("claim");
    assert!(events.contains(&CaseEvent::HumanTaskClaimed {
        plan_item_id: assess.clone(),
        assignee: "alice".to_string(),
    }));
    let err = harness.send("bob", revoke.clone()).await.unwrap_err();
    assert!(matches!(err, CommandError::Authorization { .. }));

    harness.send("alice", revoke).await.expect("revoke");
    assert!(harness.item("Assess").assignee.is_none());

    harness
        .send(
            "alice",
            CaseCommand::CompleteHumanTask {
                task_id: assess.clone(),
                output: Value::Null,
            },
        )
        .await
        .expect("unassigned task completes");
    let err = harness.send("alice", claim).await.unwrap_err();
    assert!(err.message().contains("in state Completed"), "{}", err);
}

#[tokio::test]
async fn test_claimed_task_cannot_be_claimed_by_another_member() {
    let mut harness = sequence_case().await;
    harness
        .send(
            "alice",
            CaseCommand::SetCaseTeamUser {
                user_id: "dan".to_string(),
                roles: ["clerk".to_string()].into_iter().collect(),
                owner: false,
            },
        )
        .await
        .expect("dan joins");
    let assess = harness.item("Assess").id;
    harness
        .send("dan", CaseCommand::ClaimTask { task_id: assess.clone() })
        .await
        .expect("claim");
    let err = harness
        .send("alice", CaseCommand::ClaimTask { task_id: assess.clone() })
        .await
        .unwrap_err();
    assert_eq!(err.message(), "Cannot claim task 'Assess' because it is assigned to 'dan'");

    // An owner can take it back and hand it on.
    harness
        .send("alice", CaseCommand::RevokeTask { task_id: assess.clone() })
        .await
        .expect("owner revokes");
    harness
        .send("alice", CaseCommand::ClaimTask { task_id: assess })
        .await
        .expect("owner claims");
    assert_eq!(harness.item("Assess").assignee.as_deref(), Some("alice"));

    let mut replayed = Case::default();
    for event in harness.events.clone() {
        replayed.apply(event);
    }
    assert_eq!(replayed.plan().by_name("Assess")[0].assignee.as_deref(), Some("alice"));
}
