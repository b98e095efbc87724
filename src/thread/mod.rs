//! Headless comment-thread engine.
//!
//! State lives in [`arena::ThreadTree`] and is driven by [`root::CommentThreadRoot`].
//! Network work is split into a request half (`begin*`) and an apply half
//! (`finish*`/`apply`) so a UI can run the request on another task.

pub mod arena;
pub mod composer;
pub mod fetcher;
pub mod reactions;
pub mod root;

pub use arena::{ListOwner, NodeId, RepliesState, ThreadRow, ThreadTree};
pub use composer::{ComposerView, ReplyComposer, SubmitBlocked};
pub use reactions::{ReactionController, ReactionSummary};
pub use root::{CommentThreadRoot, ScrollPosition, ThreadMode};

use crate::remote::PostId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Non-blocking message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }
}

/// Events a thread hands to its single subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadEvent {
    /// Replies of `post` cannot open inline; show them in an escalated view.
    MaxNestingReached { post: PostId },
    ViewAll { post: PostId },
    ReplyPosted {
        parent: PostId,
        post: PostId,
        content: String,
    },
    Notice(Notice),
}
