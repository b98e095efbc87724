use std::sync::Arc;

use tracing::info;

use crate::{
    config::ThreadSettings,
    errors::AppError,
    remote::{PostId, RemoteContentClient, snapshot::SnapshotClient},
    thread::ThreadMode,
    ui::{self, AppState},
};

pub mod cli;
pub mod state;

pub struct App {
    state: AppState,
}

impl App {
    pub async fn new(cli: cli::Cli) -> Result<Self, AppError> {
        let args = cli.args;
        let mode = ThreadMode::from(args.mode);
        let settings = apply_overrides(
            ThreadSettings::load(args.config.as_deref())?,
            mode,
            args.max_nesting,
        )?;
        let snapshot = args
            .snapshot
            .ok_or_else(|| anyhow::anyhow!("a thread snapshot is required"))?;
        let post = args
            .post_id
            .map(PostId::new)
            .ok_or_else(|| anyhow::anyhow!("a post id is required"))?;
        let client: Arc<dyn RemoteContentClient> = Arc::new(SnapshotClient::load(&snapshot)?);
        let session = client.current_session().await?;
        info!(
            %post,
            ?mode,
            logged_in = session.is_some(),
            "Opening thread"
        );
        Ok(Self {
            state: AppState {
                client,
                session,
                settings,
                post,
                mode,
            },
        })
    }

    pub async fn run(&mut self) -> Result<(), AppError> {
        ui::run(self.state.clone()).await
    }
}

/// `--max-nesting` only replaces the limit of the mode being opened.
fn apply_overrides(
    mut settings: ThreadSettings,
    mode: ThreadMode,
    max_nesting: Option<u32>,
) -> Result<ThreadSettings, AppError> {
    let Some(limit) = max_nesting else {
        return Ok(settings);
    };
    if limit == 0 {
        return Err(anyhow::anyhow!("--max-nesting must be at least 1").into());
    }
    match mode {
        ThreadMode::Preview => settings.max_nesting_preview = limit,
        ThreadMode::Full => settings.max_nesting_full = limit,
    }
    Ok(settings)
}
