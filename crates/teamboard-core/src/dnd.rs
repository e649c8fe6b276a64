//! Drag-and-Drop Reconciler.
//!
//! Turns a pointer drag over the status columns into at most one status
//! write. Nothing is persisted until the drop, and a drop on the column the
//! task already sits in writes nothing.

use async_trait::async_trait;
use tracing::debug;

use teamboard_shared::{TaskId, TaskStatus};

use crate::error::Result;
use crate::records::Task;

/// Where a drop commits. Implemented by [`TaskStore`](crate::tasks::TaskStore).
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn set_status(&self, task: &TaskId, status: TaskStatus) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragState {
    Idle,
    Dragging {
        task: TaskId,
        from: TaskStatus,
    },
    Hovering {
        task: TaskId,
        from: TaskStatus,
        target: TaskStatus,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    /// One status write was issued.
    Moved {
        task: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
    /// Dropped on the task's own column.
    Unchanged,
    /// Released outside any column, or nothing was being dragged.
    Cancelled,
}

#[derive(Debug)]
pub struct DragReconciler {
    state: DragState,
}

impl Default for DragReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl DragReconciler {
    pub fn new() -> Self {
        Self {
            state: DragState::Idle,
        }
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    /// Pick up `task`. Starting a new drag abandons any previous one.
    pub fn start(&mut self, task: &Task) {
        self.state = DragState::Dragging {
            task: task.id.clone(),
            from: task.status,
        };
    }

    /// The pointer entered the column for `target`.
    pub fn hover(&mut self, target: TaskStatus) {
        self.state = match std::mem::replace(&mut self.state, DragState::Idle) {
            DragState::Dragging { task, from } | DragState::Hovering { task, from, .. } => {
                DragState::Hovering { task, from, target }
            }
            DragState::Idle => DragState::Idle,
        };
    }

    /// The pointer left every column.
    pub fn leave(&mut self) {
        if let DragState::Hovering { task, from, .. } =
            std::mem::replace(&mut self.state, DragState::Idle)
        {
            self.state = DragState::Dragging { task, from };
        }
    }

    pub fn cancel(&mut self) {
        self.state = DragState::Idle;
    }

    /// Release the pointer. Always returns to `Idle`.
    ///
    /// The write is unconditional: another client may have moved the task in
    /// the meantime, and the last write wins.
    pub async fn release<K: StatusSink + ?Sized>(&mut self, sink: &K) -> Result<DropOutcome> {
        match std::mem::replace(&mut self.state, DragState::Idle) {
            DragState::Hovering { task, from, target } if target != from => {
                sink.set_status(&task, target).await?;
                debug!(task_id = %task, %from, to = %target, "Task dropped on new column");
                Ok(DropOutcome::Moved {
                    task,
                    from,
                    to: target,
                })
            }
            DragState::Hovering { .. } => Ok(DropOutcome::Unchanged),
            DragState::Dragging { .. } | DragState::Idle => Ok(DropOutcome::Cancelled),
        }
    }

    /// Hover over `target` and release in one step.
    pub async fn drop_on<K: StatusSink + ?Sized>(
        &mut self,
        target: TaskStatus,
        sink: &K,
    ) -> Result<DropOutcome> {
        self.hover(target);
        self.release(sink).await
    }
}
