use super::*;
use crate::actormodel::message::CommandMetadata;

fn message(user: &str, command: ConsentGroupCommand) -> ConsentGroupMessage {
    ModelCommand::new(
        CommandMetadata::new("group-1", "acme", UserIdentity::new(user)),
        command,
    )
}

async fn run(
    group: &mut ConsentGroup,
    user: &str,
    command: ConsentGroupCommand,
) -> Result<Vec<ConsentGroupEvent>, CommandError> {
    let events = group.handle(message(user, command), &EngineServices::default()).await?;
    for event in events.clone() {
        group.apply(event);
    }
    Ok(events)
}

async fn created() -> ConsentGroup {
    let mut group = ConsentGroup::default();
    run(
        &mut group,
        "alice",
        ConsentGroupCommand::CreateConsentGroup {
            members: vec![ConsentGroupMember::new("alice").owner(), ConsentGroupMember::new("bob")],
        },
    )
    .await
    .expect("create");
    group
}

#[tokio::test]
async fn test_create_records_tenant_and_members() {
    let group = created().await;
    assert!(group.exists());
    assert_eq!(group.tenant(), Some(&TenantId::from("acme")));
    assert_eq!(group.members().count(), 2);
    assert!(group.is_owner(&UserIdentity::new("alice")));
    assert!(!group.is_owner(&UserIdentity::new("bob")));
}

#[tokio::test]
async fn test_create_requires_owner() {
    let mut group = ConsentGroup::default();
    let err = run(
        &mut group,
        "alice",
        ConsentGroupCommand::CreateConsentGroup {
            members: vec![ConsentGroupMember::new("alice")],
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.message(), NEEDS_OWNER);
}

#[tokio::test]
async fn test_non_owner_cannot_change_members() {
    let mut group = created().await;
    let err = run(
        &mut group,
        "bob",
        ConsentGroupCommand::SetConsentGroupMember {
            member: ConsentGroupMember::new("carol"),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CommandError::Authorization { .. }));
}

#[tokio::test]
async fn test_set_member_adds_then_changes() {
    let mut group = created().await;
    let events = run(
        &mut group,
        "alice",
        ConsentGroupCommand::SetConsentGroupMember {
            member: ConsentGroupMember::new("carol"),
        },
    )
    .await
    .expect("add");
    assert!(matches!(events.as_slice(), [ConsentGroupEvent::ConsentGroupMemberAdded { .. }]));

    let mut promoted = ConsentGroupMember::new("carol").owner();
    promoted.roles.insert("reviewer".to_string());
    let events = run(
        &mut group,
        "alice",
        ConsentGroupCommand::SetConsentGroupMember { member: promoted.clone() },
    )
    .await
    .expect("change");
    assert!(matches!(events.as_slice(), [ConsentGroupEvent::ConsentGroupMemberChanged { .. }]));
    assert_eq!(group.member("carol"), Some(&promoted));

    let events = run(
        &mut group,
        "alice",
        ConsentGroupCommand::SetConsentGroupMember { member: promoted },
    )
    .await
    .expect("unchanged");
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_last_owner_cannot_leave_or_be_demoted() {
    let mut group = created().await;
    let err = run(
        &mut group,
        "alice",
        ConsentGroupCommand::RemoveConsentGroupMember {
            user_id: "alice".to_string(),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.message(), NEEDS_OWNER);

    let err = run(
        &mut group,
        "alice",
        ConsentGroupCommand::SetConsentGroupMember {
            member: ConsentGroupMember::new("alice"),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.message(), NEEDS_OWNER);
}

#[tokio::test]
async fn test_remove_unknown_member_fails() {
    let mut group = created().await;
    let err = run(
        &mut group,
        "alice",
        ConsentGroupCommand::RemoveConsentGroupMember {
            user_id: "zed".to_string(),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.message(), "The consent group has no member 'zed'");

    run(
        &mut group,
        "alice",
        ConsentGroupCommand::RemoveConsentGroupMember {
            user_id: "bob".to_string(),
        },
    )
    .await
    .expect("remove bob");
    assert!(group.member("bob").is_none());
}
