use std::sync::Arc;

use crate::{
    config::ThreadSettings,
    remote::{PostId, RemoteContentClient, Session},
    thread::ThreadMode,
};

/// Everything the UI needs to open a thread.
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<dyn RemoteContentClient>,
    pub session: Option<Session>,
    pub settings: ThreadSettings,
    pub post: PostId,
    pub mode: ThreadMode,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("session", &self.session)
            .field("settings", &self.settings)
            .field("post", &self.post)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
