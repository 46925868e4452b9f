use std::sync::Arc;

use courier_core::config::{AppConfig, ConfigError};
use courier_core::UserDirectory;
use courier_slack::api::{SlackApiClient, UpstreamError};
use courier_slack::commands::CommandDispatcher;
use courier_slack::rtm::{NoopRtmTransport, ReconnectPolicy, RtmRunner};
use thiserror::Error;
use tracing::info;

use crate::fortune::SystemFortuneSource;

pub struct Application {
    pub client: SlackApiClient,
    pub directory: Arc<UserDirectory>,
    pub runner: RtmRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("membership listing failed: {0}")]
    MembershipLoad(#[source] UpstreamError),
}

/// Builds the full application, fatal on any failure: a bot without its
/// credential, its directory, or its stream has nothing to do.
pub async fn bootstrap(config: &AppConfig) -> Result<Application, BootstrapError> {
    info!("starting application bootstrap");

    let token = config.load_bot_token()?;
    let client = SlackApiClient::new(token);

    let members = client.list_members().await.map_err(BootstrapError::MembershipLoad)?;
    let directory = Arc::new(UserDirectory::from_members(members));
    info!(member_count = directory.len(), "user directory loaded");

    let dispatcher = CommandDispatcher::new(
        Arc::new(client.clone()),
        Arc::new(SystemFortuneSource::default()),
    );
    let runner = RtmRunner::new(
        Arc::new(NoopRtmTransport),
        Arc::clone(&directory),
        dispatcher,
        ReconnectPolicy::default(),
    );
    info!(transport_mode = "noop", "rtm transport initialized");

    Ok(Application { client, directory, runner })
}
