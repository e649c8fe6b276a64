//! Who may do what to a board.
//!
//! The services consult this before every guarded write, so a caller that
//! skips the UI cannot bypass the owner/member rules.

use teamboard_shared::Identity;

use crate::error::{CoreError, Result};
use crate::records::{Board, CalendarTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    Member,
}

impl Role {
    pub fn of(board: &Board, actor: &Identity) -> Option<Role> {
        if board.is_owner(&actor.user_id) {
            Some(Role::Owner)
        } else if board.is_member(&actor.user_id) {
            Some(Role::Member)
        } else {
            None
        }
    }
}

pub(crate) fn require_member(board: &Board, actor: &Identity, action: &str) -> Result<Role> {
    Role::of(board, actor).ok_or_else(|| {
        CoreError::Unauthorized(format!("only members of \"{}\" may {action}", board.name))
    })
}

pub(crate) fn require_owner(board: &Board, actor: &Identity, action: &str) -> Result<()> {
    match Role::of(board, actor) {
        Some(Role::Owner) => Ok(()),
        _ => Err(CoreError::Unauthorized(format!(
            "only the owner of \"{}\" may {action}",
            board.name
        ))),
    }
}

pub(crate) fn require_target_owner(target: &CalendarTarget, actor: &Identity) -> Result<()> {
    if target.owner_id == actor.user_id {
        Ok(())
    } else {
        Err(CoreError::Unauthorized(
            "calendar targets can only be changed by their owner".into(),
        ))
    }
}
