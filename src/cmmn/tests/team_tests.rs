use super::*;

fn definition() -> CaseDefinition {
    serde_yaml::from_str(
        r#"
name: team
roles: [clerk, approver]
plan:
  id: plan
  name: Plan
  type: Stage
"#,
    )
    .expect("definition parses")
}

fn team() -> CaseTeam {
    let mut team = CaseTeam::default();
    team.put(Member::user("alice").owner());
    team.put(Member::user("bob").with_role("clerk"));
    team.put(Member {
        key: MemberKey::Group("finance".to_string()),
        case_roles: ["approver".to_string()].into_iter().collect(),
        owner: false,
    });
    team
}

#[test]
fn test_membership_through_user_group_and_tenant_role() {
    let mut team = team();
    team.put(Member {
        key: MemberKey::TenantRole("auditor".to_string()),
        case_roles: BTreeSet::new(),
        owner: false,
    });
    let carol = UserIdentity::new("carol").with_group("finance");
    let dave = UserIdentity::new("dave").with_tenant_role("auditor");
    assert!(team.is_member(&carol));
    assert!(team.is_member(&dave));
    assert!(!team.is_member(&UserIdentity::new("eve")));
    assert!(team.is_owner(&UserIdentity::new("alice")));
    assert!(!team.is_owner(&carol));
    assert_eq!(team.roles_of(&carol), ["approver".to_string()].into_iter().collect());
}

#[test]
fn test_any_role_check() {
    let team = team();
    let bob = UserIdentity::new("bob");
    let wanted: BTreeSet<String> = ["approver".to_string()].into_iter().collect();
    assert!(!team.has_any_role(&bob, &wanted));
    assert!(team.has_any_role(&bob, &BTreeSet::new()));
    assert!(team.has_any_role(&UserIdentity::new("x").with_group("finance"), &wanted));
}

#[test]
fn test_owner_cannot_be_removed_or_demoted_last() {
    let team = team();
    let key = MemberKey::User("alice".to_string());
    let err = team.validate_remove(&key).unwrap_err();
    assert_eq!(err, CommandError::team("The case team needs to have at least one owner"));
    assert!(team.validate_set(&Member::user("alice"), &definition()).is_err());
    assert!(team.validate_set(&Member::user("bob").owner(), &definition()).is_ok());
}

#[test]
fn test_unknown_member_and_role() {
    let team = team();
    let err = team.validate_remove(&MemberKey::User("zed".to_string())).unwrap_err();
    assert_eq!(err.message(), "The case team has no user 'zed'");
    let err = team
        .validate_set(&Member::user("bob").with_role("janitor"), &definition())
        .unwrap_err();
    assert_eq!(err.message(), "Role 'janitor' is not defined in the case definition");
}

#[test]
fn test_new_team_validation() {
    let definition = definition();
    assert_eq!(
        CaseTeam::validate_new_team(&[], &definition).unwrap_err().message(),
        "The new case team cannot be empty"
    );
    assert_eq!(
        CaseTeam::validate_new_team(&[Member::user("bob")], &definition)
            .unwrap_err()
            .message(),
        "The new case team must have owners"
    );
    CaseTeam::validate_new_team(&[Member::user("bob").owner().with_role("clerk")], &definition).expect("valid");
}

#[test]
fn test_new_team_rejects_repeated_member() {
    let definition = definition();
    // The second entry would overwrite the only owner.
    let err = CaseTeam::validate_new_team(&[Member::user("alice").owner(), Member::user("alice")], &definition)
        .unwrap_err();
    assert!(matches!(err, CommandError::CaseTeam { .. }));
    assert_eq!(err.message(), "The new case team lists user 'alice' more than once");

    CaseTeam::validate_new_team(
        &[
            Member::user("alice").owner(),
            Member {
                key: MemberKey::Group("alice".to_string()),
                case_roles: Default::default(),
                owner: false,
            },
        ],
        &definition,
    )
    .expect("same id under another kind is a different member");
}

#[test]
fn test_member_serializes_with_kind_and_id() {
    let json = serde_json::to_value(Member::user("alice").owner()).expect("json");
    assert_eq!(json["key"]["kind"], "user");
    assert_eq!(json["key"]["id"], "alice");
}
