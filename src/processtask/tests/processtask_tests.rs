use super::*;
use crate::actormodel::types::{ActorId, UserIdentity};
use crate::serialization::decode_serde;

struct Doubler;

impl implementation::ProcessImplementation for Doubler {
    fn run(&self, input: &Value) -> Result<Value, String> {
        let n = input.get("n").and_then(Value::as_f64).ok_or("n is required")?;
        Ok(Value::Map(ValueMap::new().with("n", n * 2.0)))
    }
}

fn parent() -> ParentLink {
    ParentLink {
        case_id: ActorId::from("case-1"),
        task_id: "task-7".to_string(),
    }
}

fn start(process: &str, input: Value) -> ProcessMessage {
    ModelCommand::new(
        CommandMetadata::new("task-7", "acme", UserIdentity::new("alice")),
        ProcessCommand::StartProcess {
            process: process.to_string(),
            input,
            parent: parent(),
        },
    )
}

async fn started(services: &EngineServices, command: ProcessMessage) -> (ProcessTask, Vec<ProcessEvent>) {
    let mut task = ProcessTask::default();
    let events = task.handle(command, services).await.expect("start");
    for event in events.clone() {
        task.apply(event);
    }
    (task, events)
}

fn callback(task: &ProcessTask, events: &[ProcessEvent], services: &EngineServices) -> ModelCommand<CaseCommand> {
    let metadata = CommandMetadata::new("task-7", "acme", UserIdentity::new("alice"));
    let requests = task.outgoing_requests(&metadata, events, services);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].target, ActorId::from("case-1"));
    decode_serde(requests[0].command.content.clone()).expect("case command")
}

#[tokio::test]
async fn test_process_completes_and_reports_output() {
    let services =
        EngineServices::default().with_processes(implementation::ProcessRegistry::new().register("double", Doubler));
    let input = Value::Map(ValueMap::new().with("n", 21i64));
    let (task, events) = started(&services, start("double", input)).await;

    assert_eq!(task.status(), ProcessStatus::Completed);
    assert_eq!(task.output().get("n").and_then(Value::as_f64), Some(42.0));
    assert!(task.exists());

    let command = callback(&task, &events, &services);
    assert!(matches!(command.command, CaseCommand::CompleteTask { ref task_id, .. } if task_id == "task-7"));
}

#[tokio::test]
async fn test_failing_process_reports_failure() {
    let services = EngineServices::default();
    let input = Value::Map(ValueMap::new().with("reason", "ledger offline"));
    let (task, events) = started(&services, start("fail", input)).await;
    assert_eq!(task.status(), ProcessStatus::Failed);

    let command = callback(&task, &events, &services);
    match command.command {
        CaseCommand::FailTask { output, .. } => {
            assert_eq!(output.get("error").and_then(Value::as_str), Some("ledger offline"));
        }
        other => panic!("unexpected callback {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_process_fails_instead_of_rejecting() {
    let services = EngineServices::default();
    let (task, events) = started(&services, start("missing", Value::Null)).await;
    assert_eq!(task.status(), ProcessStatus::Failed);
    assert!(events.contains(&ProcessEvent::ProcessFailed {
        error: "No process implementation named 'missing'".to_string(),
    }));
}

#[tokio::test]
async fn test_terminate_after_completion_is_a_no_op() {
    let services = EngineServices::default();
    let (task, _) = started(&services, start("echo", Value::from("hi"))).await;
    assert_eq!(task.output(), &Value::from("hi"));
    let terminate = ModelCommand::new(
        CommandMetadata::new("task-7", "acme", UserIdentity::new("alice")),
        ProcessCommand::TerminateProcess,
    );
    assert!(task.handle(terminate, &services).await.expect("terminate").is_empty());
}

#[test]
fn test_registry_builtins() {
    let registry = implementation::ProcessRegistry::with_builtins();
    assert_eq!(registry.names(), vec!["echo".to_string(), "fail".to_string()]);
    assert!(registry.get("echo").is_some());
    assert!(registry.get("other").is_none());
}
