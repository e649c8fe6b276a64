//! Board Membership Store.
//!
//! Boards carry a member id list; every membership change is an atomic array
//! union/remove so concurrent invites never overwrite each other.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use teamboard_shared::constants::{BOARDS, DELETE_CONFIRMATION, TASKS};
use teamboard_shared::identity::normalize_email;
use teamboard_shared::{BoardId, Identity, UserId};
use teamboard_store::{CollectionPath, DocPath, DocumentStore, Filter};

use crate::directory::{Directory, Teammate};
use crate::error::{CoreError, Result};
use crate::live::Live;
use crate::policy::{require_member, require_owner};
use crate::records::{decode, now_millis, object, Board};

pub struct BoardStore<S> {
    store: Arc<S>,
    directory: Directory<S>,
    boards: CollectionPath,
    tasks: CollectionPath,
}

impl<S> Clone for BoardStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            directory: self.directory.clone(),
            boards: self.boards.clone(),
            tasks: self.tasks.clone(),
        }
    }
}

impl<S: DocumentStore> BoardStore<S> {
    pub fn new(store: Arc<S>, directory: Directory<S>) -> Self {
        Self {
            store,
            directory,
            boards: CollectionPath::new(BOARDS),
            tasks: CollectionPath::new(TASKS),
        }
    }

    fn path(&self, id: &BoardId) -> DocPath {
        self.boards.doc(id.as_str())
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Create a board owned by `actor`, who is also its only member.
    pub async fn create_board(&self, actor: &Identity, name: &str) -> Result<Board> {
        let name = non_empty_name(name)?;
        let created_at = now_millis();
        let id = self
            .store
            .create_document(
                &self.boards,
                object(json!({
                    "name": name,
                    "ownerId": actor.user_id,
                    "members": [actor.user_id],
                    "createdAt": created_at,
                }))?,
            )
            .await?;

        info!(board_id = %id, owner = %actor.user_id, "Board created");

        Ok(Board {
            id: BoardId::new(id),
            name,
            owner_id: actor.user_id.clone(),
            members: vec![actor.user_id.clone()],
            created_at,
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub async fn get_board(&self, id: &BoardId) -> Result<Board> {
        let path = self.path(id);
        let doc = self
            .store
            .get_document(&path)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("board {id}")))?;
        decode(&doc, &path)
    }

    /// Live list of the boards `actor` belongs to, oldest first.
    pub async fn subscribe_boards(&self, actor: &Identity) -> Result<Live<Board>> {
        let sub = self
            .store
            .subscribe(
                &self.boards,
                Filter::array_contains("members", actor.user_id.as_str()),
            )
            .await?;
        Ok(Live::new(sub).ordered(|a, b| {
            a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
        }))
    }

    /// Emails of the board's members, `(unknown)` where a profile is missing.
    pub async fn teammates(&self, board: &Board) -> Vec<Teammate> {
        self.directory.teammates(&board.members).await
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Any member may rename a board.
    pub async fn rename_board(&self, actor: &Identity, id: &BoardId, new_name: &str) -> Result<()> {
        let name = non_empty_name(new_name)?;
        let board = self.get_board(id).await?;
        require_member(&board, actor, "rename it")?;

        self.store
            .update_document(&self.path(id), object(json!({ "name": name }))?)
            .await?;
        info!(board_id = %id, by = %actor.user_id, "Board renamed");
        Ok(())
    }

    /// Invite a registered user by email. Idempotent: inviting an existing
    /// member leaves the member list unchanged. Returns the invited user id.
    pub async fn add_member(&self, actor: &Identity, id: &BoardId, email: &str) -> Result<UserId> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(CoreError::validation("Enter an email address to invite"));
        }
        let board = self.get_board(id).await?;
        require_member(&board, actor, "invite teammates")?;

        let profile = self
            .directory
            .find_by_email(&email)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("no user with email {email}")))?;

        self.store
            .append_to_array(
                &self.path(id),
                "members",
                Value::String(profile.user_id.to_string()),
            )
            .await?;
        info!(board_id = %id, member = %profile.user_id, "Member added");
        Ok(profile.user_id)
    }

    /// Owner-only. The owner cannot remove themselves this way.
    pub async fn remove_member(&self, actor: &Identity, id: &BoardId, member: &UserId) -> Result<()> {
        let board = self.get_board(id).await?;
        require_owner(&board, actor, "remove members")?;
        if member == &actor.user_id {
            return Err(CoreError::validation("The owner cannot remove themselves"));
        }

        self.store
            .remove_from_array(&self.path(id), "members", Value::String(member.to_string()))
            .await?;
        info!(board_id = %id, member = %member, "Member removed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Owner-only, and `confirmation` must case-insensitively equal
    /// `"delete"`.
    ///
    /// Deletes every task of the board first, then the board itself. If that
    /// stops part-way the error is [`CoreError::Incomplete`]; calling again
    /// finishes the job.
    pub async fn delete_board(&self, actor: &Identity, id: &BoardId, confirmation: &str) -> Result<()> {
        let board = self.get_board(id).await?;
        require_owner(&board, actor, "delete it")?;
        if !confirmation.trim().eq_ignore_ascii_case(DELETE_CONFIRMATION) {
            return Err(CoreError::validation(format!(
                "Type \"{DELETE_CONFIRMATION}\" to confirm"
            )));
        }

        let tasks = self
            .store
            .query(&self.tasks, &Filter::eq("boardId", id.as_str()))
            .await?;

        let mut completed = 0;
        for task in &tasks {
            if let Err(e) = self.store.delete_document(&self.tasks.doc(&task.id)).await {
                return Err(incomplete(completed, tasks.len() - completed, id, e));
            }
            completed += 1;
        }

        if let Err(e) = self.store.delete_document(&self.path(id)).await {
            return Err(incomplete(completed, 0, id, e));
        }

        info!(board_id = %id, tasks = completed, "Board deleted");
        Ok(())
    }
}

fn incomplete(completed: usize, tasks_left: usize, board: &BoardId, source: teamboard_store::StoreError) -> CoreError {
    if completed == 0 {
        return CoreError::from(source);
    }
    warn!(board_id = %board, completed, tasks_left, error = %source, "Board deletion stopped part-way");
    let remaining = if tasks_left > 0 {
        format!("{tasks_left} task(s) and {BOARDS}/{board}")
    } else {
        format!("{BOARDS}/{board}")
    };
    CoreError::Incomplete {
        operation: "delete board",
        completed,
        remaining,
        source,
    }
}

fn non_empty_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::validation("Board name cannot be empty"));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use teamboard_store::MemoryStore;

    struct Fixture {
        boards: BoardStore<MemoryStore>,
        store: Arc<MemoryStore>,
        alice: Identity,
        bob: Identity,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let directory = Directory::new(store.clone());
        let alice = Identity::new("u1", "alice@x.io");
        let bob = Identity::new("u2", "bob@x.io");
        directory.upsert_profile(&alice).await.unwrap();
        directory.upsert_profile(&bob).await.unwrap();
        Fixture {
            boards: BoardStore::new(store.clone(), directory),
            store,
            alice,
            bob,
        }
    }

    #[tokio::test]
    async fn test_create_board_trims_and_validates() {
        let f = fixture().await;
        let board = f.boards.create_board(&f.alice, "  Sprint 1 ").await.unwrap();
        assert_eq!(board.name, "Sprint 1");
        assert_eq!(board.members, vec![f.alice.user_id.clone()]);
        assert_eq!(f.boards.get_board(&board.id).await.unwrap(), board);

        let err = f.boards.create_board(&f.alice, "   ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_add_member_unknown_email() {
        let f = fixture().await;
        let board = f.boards.create_board(&f.alice, "B").await.unwrap();
        let err = f
            .boards
            .add_member(&f.alice, &board.id, "carol@x.io")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_non_member_cannot_rename_or_invite() {
        let f = fixture().await;
        let board = f.boards.create_board(&f.alice, "B").await.unwrap();

        let err = f.boards.rename_board(&f.bob, &board.id, "Mine").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        let err = f
            .boards
            .add_member(&f.bob, &board.id, "bob@x.io")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_member_may_rename() {
        let f = fixture().await;
        let board = f.boards.create_board(&f.alice, "B").await.unwrap();
        f.boards.add_member(&f.alice, &board.id, "bob@x.io").await.unwrap();

        f.boards.rename_board(&f.bob, &board.id, " Renamed ").await.unwrap();
        assert_eq!(f.boards.get_board(&board.id).await.unwrap().name, "Renamed");
    }

    #[tokio::test]
    async fn test_owner_cannot_remove_self() {
        let f = fixture().await;
        let board = f.boards.create_board(&f.alice, "B").await.unwrap();
        let err = f
            .boards
            .remove_member(&f.alice, &board.id, &f.alice.user_id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_delete_requires_confirmation_and_owner() {
        let f = fixture().await;
        let board = f.boards.create_board(&f.alice, "B").await.unwrap();
        f.boards.add_member(&f.alice, &board.id, "bob@x.io").await.unwrap();

        let err = f
            .boards
            .delete_board(&f.bob, &board.id, "delete")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let err = f
            .boards
            .delete_board(&f.alice, &board.id, "remove")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        f.boards.delete_board(&f.alice, &board.id, " DELETE ").await.unwrap();
        assert_eq!(
            f.boards.get_board(&board.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_delete_cascades_to_tasks() {
        let f = fixture().await;
        let keep = f.boards.create_board(&f.alice, "Keep").await.unwrap();
        let doomed = f.boards.create_board(&f.alice, "Doomed").await.unwrap();
        let tasks = CollectionPath::new(TASKS);
        for board in [&keep, &doomed, &doomed] {
            f.store
                .create_document(
                    &tasks,
                    object(json!({ "boardId": board.id, "text": "x", "status": "todo" })).unwrap(),
                )
                .await
                .unwrap();
        }

        f.boards.delete_board(&f.alice, &doomed.id, "delete").await.unwrap();

        let left = f.store.query(&tasks, &Filter::All).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].fields["boardId"], keep.id.as_str());
    }

    #[tokio::test]
    async fn test_subscribe_boards_only_lists_memberships() {
        let f = fixture().await;
        let mut live = f.boards.subscribe_boards(&f.bob).await.unwrap();
        assert!(live.next_records().await.unwrap().unwrap().is_empty());

        let board = f.boards.create_board(&f.alice, "Shared").await.unwrap();
        f.boards.create_board(&f.alice, "Private").await.unwrap();
        f.boards.add_member(&f.alice, &board.id, "bob@x.io").await.unwrap();

        // Deliveries may coalesce; wait until the invite shows up.
        loop {
            let boards = live.next_records().await.unwrap().unwrap();
            if !boards.is_empty() {
                assert_eq!(boards.len(), 1);
                assert_eq!(boards[0].name, "Shared");
                break;
            }
        }
    }
}
