//! Snapshot / apply / commit-or-revert for local-first mutations.
//!
//! The slot is changed immediately so the view reflects the action, the
//! remote call runs, and on failure the slot is restored to exactly the
//! snapshot taken before the change.

use std::future::Future;

use super::ids::{PostId, UserId};
use super::post::{LikeState, Post};
use crate::backend::BackendError;
use crate::error::ActionError;

/// A pending optimistic change holding the pre-change snapshot.
#[derive(Debug)]
#[must_use = "an optimistic change must be committed or reverted"]
pub struct Transaction<S> {
    snapshot: S,
}

impl<S: Clone> Transaction<S> {
    /// Snapshot `slot`, then apply `change` to it.
    pub fn apply(slot: &mut S, change: impl FnOnce(&mut S)) -> Self {
        let snapshot = slot.clone();
        change(slot);
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &S {
        &self.snapshot
    }

    /// Keep the change.
    pub fn commit(self) {}

    /// Restore `slot` to the snapshot.
    pub fn revert(self, slot: &mut S) {
        *slot = self.snapshot;
    }
}

// ============================================================================
// Likes
// ============================================================================

/// Remote side of a like toggle: create or delete the (post, viewer) edge.
pub trait LikeEdges {
    fn create_like(
        &self,
        post: &PostId,
        viewer: &UserId,
    ) -> impl Future<Output = Result<(), BackendError>>;

    fn delete_like(
        &self,
        post: &PostId,
        viewer: &UserId,
    ) -> impl Future<Output = Result<(), BackendError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeAction {
    Like,
    Unlike,
}

impl LikeAction {
    /// The edge change that turns `before` into its toggled state.
    pub fn for_state(before: &LikeState) -> Self {
        if before.viewer_has_liked {
            LikeAction::Unlike
        } else {
            LikeAction::Like
        }
    }

    pub async fn send<R: LikeEdges>(
        self,
        remote: &R,
        post: &PostId,
        viewer: &UserId,
    ) -> Result<(), BackendError> {
        match self {
            LikeAction::Like => remote.create_like(post, viewer).await,
            LikeAction::Unlike => remote.delete_like(post, viewer).await,
        }
    }
}

/// A like toggle applied locally and waiting for the remote result.
///
/// Holds everything needed to issue the remote call from a background task
/// and to undo the local change once the result is back.
#[derive(Debug)]
#[must_use = "a pending like must be finished with the remote outcome"]
pub struct PendingLike {
    pub post_id: PostId,
    pub viewer: UserId,
    pub action: LikeAction,
    tx: Transaction<LikeState>,
}

impl PendingLike {
    /// Flip the like state of `post` for `viewer`.
    ///
    /// Fails with `Unauthenticated` and leaves `post` unchanged when there is
    /// no viewer.
    pub fn begin(post: &mut Post, viewer: Option<&UserId>) -> Result<Self, ActionError> {
        let viewer = viewer.ok_or(ActionError::Unauthenticated)?.clone();
        let action = LikeAction::for_state(&post.likes);
        let tx = Transaction::apply(&mut post.likes, LikeState::toggle);

        tracing::debug!(post_id = %post.id, ?action, "Optimistic like applied");
        Ok(Self {
            post_id: post.id.clone(),
            viewer,
            action,
            tx,
        })
    }

    /// The like state before the toggle.
    pub fn snapshot(&self) -> LikeState {
        *self.tx.snapshot()
    }

    /// Settle the toggle. `post` is the current copy of the post, if it is
    /// still loaded; on failure its like fields return to the snapshot.
    pub fn finish(
        self,
        post: Option<&mut Post>,
        outcome: Result<(), BackendError>,
    ) -> Result<(), ActionError> {
        match (outcome, post) {
            (Ok(()), _) => {
                self.tx.commit();
                Ok(())
            }
            (Err(e), Some(post)) => {
                tracing::warn!(post_id = %self.post_id, error = %e, "Like failed, reverting");
                self.tx.revert(&mut post.likes);
                Err(ActionError::Remote(e))
            }
            (Err(e), None) => {
                tracing::warn!(post_id = %self.post_id, error = %e, "Like failed for a post no longer loaded");
                Err(ActionError::Remote(e))
            }
        }
    }
}

/// Toggle the viewer's like on `post`: local flip, remote edge change, revert on failure.
pub async fn toggle_like<R: LikeEdges>(
    post: &mut Post,
    viewer: Option<&UserId>,
    remote: &R,
) -> Result<(), ActionError> {
    let pending = PendingLike::begin(post, viewer)?;
    let outcome = pending
        .action
        .send(remote, &pending.post_id, &pending.viewer)
        .await;
    pending.finish(Some(post), outcome)
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::cell::RefCell;

    /// Records edge calls and fails them when `fail` is set.
    #[derive(Default)]
    pub struct RecordingEdges {
        pub fail: bool,
        pub calls: RefCell<Vec<(LikeAction, String)>>,
    }

    impl RecordingEdges {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn record(&self, action: LikeAction, post: &PostId) -> Result<(), BackendError> {
            self.calls.borrow_mut().push((action, post.to_string()));
            if self.fail {
                Err(BackendError::HttpStatus {
                    status: 500,
                    message: "edge write failed".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    impl LikeEdges for RecordingEdges {
        async fn create_like(&self, post: &PostId, _viewer: &UserId) -> Result<(), BackendError> {
            self.record(LikeAction::Like, post)
        }

        async fn delete_like(&self, post: &PostId, _viewer: &UserId) -> Result<(), BackendError> {
            self.record(LikeAction::Unlike, post)
        }
    }
}
