//! Task Store.
//!
//! Tasks reference their board by id. Status changes are plain field writes
//! (last write wins); comments go through the store's atomic array append so
//! two people commenting at once never lose one another's comment.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use teamboard_shared::constants::{BOARDS, TASKS};
use teamboard_shared::{BoardId, Identity, TaskId, TaskStatus};
use teamboard_store::{to_fields, CollectionPath, DocPath, DocumentStore, Filter};

use crate::dnd::StatusSink;
use crate::error::{CoreError, Result};
use crate::live::Live;
use crate::policy::require_member;
use crate::records::{decode, now_millis, object, Board, Comment, Task};

/// A board's tasks split into its three columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardColumns {
    pub todo: Vec<Task>,
    pub progress: Vec<Task>,
    pub done: Vec<Task>,
}

impl BoardColumns {
    pub fn column(&self, status: TaskStatus) -> &[Task] {
        match status {
            TaskStatus::Todo => &self.todo,
            TaskStatus::Progress => &self.progress,
            TaskStatus::Done => &self.done,
        }
    }
}

/// Partition `tasks` by status, oldest first within each column.
pub fn columns(tasks: &[Task]) -> BoardColumns {
    let mut sorted: Vec<&Task> = tasks.iter().collect();
    sorted.sort_by(|a, b| by_creation(a, b));

    let mut cols = BoardColumns::default();
    for task in sorted {
        let column = match task.status {
            TaskStatus::Todo => &mut cols.todo,
            TaskStatus::Progress => &mut cols.progress,
            TaskStatus::Done => &mut cols.done,
        };
        column.push(task.clone());
    }
    cols
}

fn by_creation(a: &Task, b: &Task) -> std::cmp::Ordering {
    a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
}

pub struct TaskStore<S> {
    store: Arc<S>,
    tasks: CollectionPath,
    boards: CollectionPath,
}

impl<S> Clone for TaskStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            tasks: self.tasks.clone(),
            boards: self.boards.clone(),
        }
    }
}

impl<S: DocumentStore> TaskStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            tasks: CollectionPath::new(TASKS),
            boards: CollectionPath::new(BOARDS),
        }
    }

    fn path(&self, id: &TaskId) -> DocPath {
        self.tasks.doc(id.as_str())
    }

    async fn board(&self, id: &BoardId) -> Result<Board> {
        let path = self.boards.doc(id.as_str());
        let doc = self
            .store
            .get_document(&path)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("board {id}")))?;
        decode(&doc, &path)
    }

    /// Add a task to a board `actor` belongs to. New tasks start in `todo`.
    pub async fn create_task(&self, actor: &Identity, board_id: &BoardId, text: &str) -> Result<Task> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CoreError::validation("Task text cannot be empty"));
        }
        let board = self.board(board_id).await?;
        require_member(&board, actor, "add tasks")?;

        let mut task = Task {
            id: TaskId::new(String::new()),
            text: text.to_string(),
            status: TaskStatus::Todo,
            board_id: board_id.clone(),
            creator_id: actor.user_id.clone(),
            created_at: now_millis(),
            comments: Vec::new(),
        };
        let fields = to_fields(&task).map_err(|e| CoreError::corrupt(&self.tasks, e))?;
        task.id = TaskId::new(self.store.create_document(&self.tasks, fields).await?);

        info!(task_id = %task.id, board_id = %board_id, "Task created");
        Ok(task)
    }

    pub async fn get_task(&self, id: &TaskId) -> Result<Task> {
        let path = self.path(id);
        let doc = self
            .store
            .get_document(&path)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("task {id}")))?;
        decode(&doc, &path)
    }

    /// Move a task to any column. Setting the current status again is
    /// harmless.
    pub async fn set_status(&self, id: &TaskId, status: TaskStatus) -> Result<()> {
        self.store
            .update_document(&self.path(id), object(json!({ "status": status }))?)
            .await?;
        info!(task_id = %id, %status, "Task status changed");
        Ok(())
    }

    /// Append a comment as `actor`, who must be a member of the task's board.
    pub async fn append_comment(&self, actor: &Identity, id: &TaskId, text: &str) -> Result<Comment> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CoreError::validation("Comment cannot be empty"));
        }
        let task = self.get_task(id).await?;
        let board = self.board(&task.board_id).await?;
        require_member(&board, actor, "comment on its tasks")?;

        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            author_id: actor.user_id.clone(),
            author_email: actor.email.clone(),
            created_at: now_millis(),
        };
        let element =
            serde_json::to_value(&comment).map_err(|e| CoreError::corrupt(self.path(id), e))?;
        self.store
            .append_to_array(&self.path(id), "comments", element)
            .await?;

        info!(task_id = %id, author = %actor.user_id, "Comment added");
        Ok(comment)
    }

    /// Unconditional; deleting a task that is already gone succeeds.
    pub async fn delete_task(&self, id: &TaskId) -> Result<()> {
        self.store.delete_document(&self.path(id)).await?;
        info!(task_id = %id, "Task deleted");
        Ok(())
    }

    /// Live tasks of one board, oldest first.
    pub async fn subscribe_board_tasks(&self, board_id: &BoardId) -> Result<Live<Task>> {
        let sub = self
            .store
            .subscribe(&self.tasks, Filter::eq("boardId", board_id.as_str()))
            .await?;
        Ok(Live::new(sub).ordered(by_creation))
    }

    /// Live tasks `actor` created, across every board. Feeds the summary,
    /// calendar and all-tasks views.
    pub async fn subscribe_created_by(&self, actor: &Identity) -> Result<Live<Task>> {
        let sub = self
            .store
            .subscribe(&self.tasks, Filter::eq("creatorId", actor.user_id.as_str()))
            .await?;
        Ok(Live::new(sub).ordered(by_creation))
    }
}

#[async_trait]
impl<S: DocumentStore> StatusSink for TaskStore<S> {
    async fn set_status(&self, task: &TaskId, status: TaskStatus) -> Result<()> {
        TaskStore::set_status(self, task, status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boards::BoardStore;
    use crate::directory::Directory;
    use crate::error::ErrorKind;
    use teamboard_store::MemoryStore;

    struct Fixture {
        tasks: TaskStore<MemoryStore>,
        board: Board,
        alice: Identity,
        bob: Identity,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let boards = BoardStore::new(store.clone(), Directory::new(store.clone()));
        let alice = Identity::new("u1", "alice@x.io");
        let bob = Identity::new("u2", "bob@x.io");
        let board = boards.create_board(&alice, "Sprint 1").await.unwrap();
        Fixture {
            tasks: TaskStore::new(store),
            board,
            alice,
            bob,
        }
    }

    #[tokio::test]
    async fn test_new_task_starts_in_todo() {
        let f = fixture().await;
        let task = f.tasks.create_task(&f.alice, &f.board.id, " Write spec ").await.unwrap();
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.text, "Write spec");
        assert!(task.comments.is_empty());
        assert_eq!(f.tasks.get_task(&task.id).await.unwrap(), task);
    }

    #[tokio::test]
    async fn test_create_task_validation_and_membership() {
        let f = fixture().await;
        let err = f.tasks.create_task(&f.alice, &f.board.id, "  ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = f.tasks.create_task(&f.bob, &f.board.id, "x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let err = f
            .tasks
            .create_task(&f.alice, &BoardId::from("missing"), "x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_any_transition_is_allowed() {
        let f = fixture().await;
        let task = f.tasks.create_task(&f.alice, &f.board.id, "x").await.unwrap();
        for status in [TaskStatus::Done, TaskStatus::Todo, TaskStatus::Progress, TaskStatus::Progress] {
            f.tasks.set_status(&task.id, status).await.unwrap();
            assert_eq!(f.tasks.get_task(&task.id).await.unwrap().status, status);
        }
    }

    #[tokio::test]
    async fn test_set_status_on_missing_task() {
        let f = fixture().await;
        let err = f
            .tasks
            .set_status(&TaskId::from("gone"), TaskStatus::Done)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_identical_comments_are_kept() {
        let f = fixture().await;
        let task = f.tasks.create_task(&f.alice, &f.board.id, "x").await.unwrap();
        f.tasks.append_comment(&f.alice, &task.id, "+1").await.unwrap();
        f.tasks.append_comment(&f.alice, &task.id, "+1").await.unwrap();

        let task = f.tasks.get_task(&task.id).await.unwrap();
        assert_eq!(task.comments.len(), 2);
        assert_eq!(task.comments[0].author_email, "alice@x.io");
    }

    #[tokio::test]
    async fn test_outsider_cannot_comment() {
        let f = fixture().await;
        let task = f.tasks.create_task(&f.alice, &f.board.id, "x").await.unwrap();
        let err = f.tasks.append_comment(&f.bob, &task.id, "hi").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        let err = f.tasks.append_comment(&f.alice, &task.id, " ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_delete_task_is_unconditional() {
        let f = fixture().await;
        let task = f.tasks.create_task(&f.alice, &f.board.id, "x").await.unwrap();
        f.tasks.delete_task(&task.id).await.unwrap();
        f.tasks.delete_task(&task.id).await.unwrap();
        assert_eq!(
            f.tasks.get_task(&task.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_columns_partition() {
        let f = fixture().await;
        let a = f.tasks.create_task(&f.alice, &f.board.id, "a").await.unwrap();
        let b = f.tasks.create_task(&f.alice, &f.board.id, "b").await.unwrap();
        f.tasks.set_status(&b.id, TaskStatus::Done).await.unwrap();

        let mut live = f.tasks.subscribe_board_tasks(&f.board.id).await.unwrap();
        let cols = columns(&live.next_records().await.unwrap().unwrap());
        assert_eq!(cols.column(TaskStatus::Todo)[0].id, a.id);
        assert!(cols.progress.is_empty());
        assert_eq!(cols.done[0].id, b.id);
    }

    #[tokio::test]
    async fn test_status_sink_commits_through_store() {
        let f = fixture().await;
        let task = f.tasks.create_task(&f.alice, &f.board.id, "x").await.unwrap();
        let sink: &dyn StatusSink = &f.tasks;
        sink.set_status(&task.id, TaskStatus::Progress).await.unwrap();
        assert_eq!(
            f.tasks.get_task(&task.id).await.unwrap().status,
            TaskStatus::Progress
        );
    }
}
