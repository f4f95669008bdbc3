use super::*;
use crate::actormodel::event::{ActorEvent, EventMetadata};
use crate::actormodel::message::{CommandMetadata, KernelCommand, ModelCommand, RequestModelActor};
use crate::actormodel::types::{MessageId, TimestampUtc, UserIdentity};
use crate::board::BoardCommand;
use crate::cmmn::CaseCommand;
use crate::tenant::TenantEvent;
use crate::timerservice::TimerCommand;

fn stored(manifest: &str, payload: Value) -> StoredEvent {
    StoredEvent {
        actor_id: ActorId::from("acme"),
        sequence: 1,
        recorded_at: TimestampUtc::now(),
        manifest: manifest.to_string(),
        payload,
        metadata: Default::default(),
    }
}

fn event_metadata() -> EventMetadata {
    EventMetadata::from(&CommandMetadata::new("acme", "acme", UserIdentity::new("alice")))
}

#[test]
fn test_engine_registries_build_without_collisions() {
    let registries = EngineRegistries::build().expect("registries");
    assert_eq!(registries.catalog.owner("StartCase"), Some(ActorType::Case));
    assert_eq!(registries.catalog.owner("CreateTenant"), Some(ActorType::Tenant));
    assert_eq!(registries.catalog.owner("SetTimer"), Some(ActorType::TimerService));
    assert_eq!(registries.catalog.owner("AddColumn"), Some(ActorType::Board));
    assert_eq!(registries.catalog.owner("StartProcess"), Some(ActorType::ProcessTask));
    assert_eq!(
        registries.catalog.owner("SetConsentGroupMember"),
        Some(ActorType::ConsentGroup)
    );
    assert_eq!(registries.catalog.owner("Nonsense"), None);
    assert!(registries.case.events.contains("ActorRequestStored"));
    assert!(registries.case.events.contains("PlanItemTransitioned"));
    assert!(!registries.tenant.events.contains("PlanItemTransitioned"));
}

#[test]
fn test_catalog_rejects_duplicate_manifest() {
    let mut catalog = MessageCatalog::default();
    catalog.register(ActorType::Case, &["StartCase"]).expect("first");
    let err = catalog.register(ActorType::Board, &["StartCase"]).unwrap_err();
    assert!(matches!(err, SerializationError::DuplicateManifest { .. }));
}

#[test]
fn test_route_plain_command() {
    let registries = EngineRegistries::build().expect("registries");
    let command = ModelCommand::new(
        CommandMetadata::new("board-7", "acme", UserIdentity::new("alice")),
        BoardCommand::RemoveColumn {
            column_id: "todo".to_string(),
        },
    );
    let wrapper = command.wrap().expect("wrap");
    assert_eq!(
        registries.catalog.route(&wrapper).expect("route"),
        (ActorType::Board, ActorId::from("board-7"))
    );
}

#[test]
fn test_route_request_uses_inner_command() {
    let registries = EngineRegistries::build().expect("registries");
    let inner = ModelCommand::new(
        CommandMetadata::new("timer-service", "system", UserIdentity::new("alice")),
        TimerCommand::CancelTimer {
            timer_id: "t1".to_string(),
        },
    );
    let request = RequestModelActor {
        source_actor: ActorId::from("case-1"),
        source_type: ActorType::Case,
        command: inner.wrap().expect("wrap inner"),
    };
    let wrapper = ManifestWrapper::wrap(&request).expect("wrap request");
    assert_eq!(wrapper.manifest, REQUEST_MANIFEST);
    assert_eq!(
        registries.catalog.route(&wrapper).expect("route"),
        (ActorType::TimerService, ActorId::from("timer-service"))
    );
}

#[test]
fn test_route_debug_switch_by_actor_type() {
    let registries = EngineRegistries::build().expect("registries");
    let switch = ModelCommand::new(
        CommandMetadata::new("case-1", "acme", UserIdentity::new("alice")),
        KernelCommand::SwitchDebugMode {
            actor_type: ActorType::Case,
            enabled: true,
        },
    );
    let wrapper = switch.wrap().expect("wrap");
    assert_eq!(
        registries.catalog.route(&wrapper).expect("route"),
        (ActorType::Case, ActorId::from("case-1"))
    );
}

#[test]
fn test_route_failures() {
    let registries = EngineRegistries::build().expect("registries");
    let unknown = ManifestWrapper {
        manifest: "LaunchRocket".to_string(),
        content: Value::Null,
    };
    assert!(matches!(
        registries.catalog.route(&unknown),
        Err(SerializationError::UnknownManifest { .. })
    ));

    let anonymous = ManifestWrapper {
        manifest: "StartCase".to_string(),
        content: Value::Map(Default::default()),
    };
    assert!(matches!(
        registries.catalog.route(&anonymous),
        Err(SerializationError::Decode { .. })
    ));
}

#[test]
fn test_family_decodes_commands() {
    let registries = EngineRegistries::build().expect("registries");
    let command = ModelCommand::new(
        CommandMetadata::new("case-1", "acme", UserIdentity::new("alice")),
        CaseCommand::GetDiscretionaryItems,
    );
    let decoded = registries
        .case
        .commands
        .decode_wrapper(command.wrap().expect("wrap"))
        .expect("decode");
    assert_eq!(decoded, command);
}

#[test]
fn test_decode_event_checks_manifest() {
    let registries = EngineRegistries::build().expect("registries");
    let event: FamilyEvent<Tenant> = JournalEvent::model(event_metadata(), TenantEvent::TenantDisabled);
    let payload = Value::from_serde(&event).expect("encode");

    let decoded = registries
        .tenant
        .decode_event(&stored("TenantDisabled", payload.clone()))
        .expect("decode");
    assert_eq!(decoded, event);

    let err = registries
        .tenant
        .decode_event(&stored("TenantEnabled", payload))
        .unwrap_err();
    assert_eq!(
        err,
        SerializationError::Decode {
            manifest: "TenantEnabled".to_string(),
            message: "record contains a TenantDisabled event".to_string(),
        }
    );
}

#[test]
fn test_decode_kernel_event() {
    let registries = EngineRegistries::build().expect("registries");
    let event: FamilyEvent<Tenant> = JournalEvent::actor(
        event_metadata(),
        ActorEvent::ActorRequestExecuted {
            message_id: MessageId::from("m-1"),
        },
    );
    let payload = Value::from_serde(&event).expect("encode");
    let decoded = registries
        .tenant
        .decode_event(&stored("ActorRequestExecuted", payload))
        .expect("decode");
    assert_eq!(decoded, event);
}

#[path = "registry_round_trip_tests.rs"]
mod round_trip;
