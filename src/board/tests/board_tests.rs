use super::*;
use crate::actormodel::message::CommandMetadata;
use crate::actormodel::types::UserIdentity;

fn message(user: &str, command: BoardCommand) -> BoardMessage {
    ModelCommand::new(
        CommandMetadata::new("board-1", "acme", UserIdentity::new(user)),
        command,
    )
}

async fn run(board: &mut Board, user: &str, command: BoardCommand) -> Result<Vec<BoardEvent>, CommandError> {
    let events = board.handle(message(user, command), &EngineServices::default()).await?;
    for event in events.clone() {
        board.apply(event);
    }
    Ok(events)
}

async fn created() -> Board {
    let mut board = Board::default();
    run(&mut board, "alice", BoardCommand::CreateBoard { title: "Intake".to_string() })
        .await
        .expect("create");
    board
}

#[tokio::test]
async fn test_create_board_records_owner() {
    let board = created().await;
    assert!(board.exists());
    assert_eq!(board.title(), "Intake");
    assert_eq!(board.owner(), Some("alice"));
}

#[tokio::test]
async fn test_create_board_requires_title() {
    let mut board = Board::default();
    let err = run(&mut board, "alice", BoardCommand::CreateBoard { title: "  ".to_string() })
        .await
        .unwrap_err();
    assert_eq!(err, CommandError::invalid("A board needs a title"));
    assert!(!board.exists());
}

#[tokio::test]
async fn test_only_owner_changes_board() {
    let mut board = created().await;
    let err = run(&mut board, "bob", BoardCommand::UpdateBoard { title: "Mine".to_string() })
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::Authorization { .. }));
    assert_eq!(board.title(), "Intake");
}

#[tokio::test]
async fn test_same_title_is_no_change() {
    let mut board = created().await;
    let events = run(&mut board, "alice", BoardCommand::UpdateBoard { title: "Intake".to_string() })
        .await
        .expect("update");
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_columns_are_added_and_removed() {
    let mut board = created().await;
    let add = |id: &str| BoardCommand::AddColumn {
        column_id: id.to_string(),
        title: id.to_uppercase(),
        role: Some("clerk".to_string()),
    };
    run(&mut board, "alice", add("todo")).await.expect("todo");
    run(&mut board, "alice", add("done")).await.expect("done");

    let err = run(&mut board, "alice", add("todo")).await.unwrap_err();
    assert_eq!(err.message(), "Column 'todo' already exists");

    run(&mut board, "alice", BoardCommand::RemoveColumn { column_id: "todo".to_string() })
        .await
        .expect("remove");
    let ids: Vec<&str> = board.columns().iter().map(|c| c.column_id.as_str()).collect();
    assert_eq!(ids, vec!["done"]);

    let err = run(&mut board, "alice", BoardCommand::RemoveColumn { column_id: "todo".to_string() })
        .await
        .unwrap_err();
    assert_eq!(err.message(), "Board has no column 'todo'");
}
