use anyhow::{Context, Result};
use clap::Parser;
use interview_rtc_lib::logger::{self, LogConfig, LogLevel};
use interview_rtc_lib::peer::ServerConfig;
use interview_rtc_lib::{Identity, SessionConfig, SessionController, SessionId, SessionStatus};
use std::io::IsTerminal;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "interview-rtc")]
#[command(about = "Join an interview session: capture, signal and connect the peer transport")]
struct Cli {
    /// Interview session id
    session_id: String,

    /// Signaling base url (ws, wss, http or https)
    #[arg(long, env = "INTERVIEW_WS_URL")]
    base_url: Option<String>,

    /// JSON session config; flags and environment override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// ICE server url, repeatable. Replaces the configured list.
    #[arg(long = "ice-server")]
    ice_servers: Vec<String>,

    /// Username for TURN urls given with --ice-server
    #[arg(long, requires = "ice_credential")]
    ice_username: Option<String>,

    /// Credential for TURN urls given with --ice-server
    #[arg(long, requires = "ice_username")]
    ice_credential: Option<String>,

    /// Bearer identity of the candidate
    #[arg(long, env = "INTERVIEW_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Refuse to start without --token
    #[arg(long)]
    require_auth: bool,

    /// error, warn, info, debug or trace
    #[arg(long)]
    log_level: Option<LogLevel>,
}

impl Cli {
    fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => SessionConfig::default(),
        }
        .with_env_overrides();

        if let Some(base) = &self.base_url {
            config.signaling_base = base.clone();
        }
        if !self.ice_servers.is_empty() {
            config.ice_servers = self
                .ice_servers
                .iter()
                .map(|url| self.ice_server(url))
                .collect();
        }
        if self.require_auth {
            config.require_identity = true;
        }
        Ok(config)
    }

    fn ice_server(&self, url: &str) -> ServerConfig {
        let mut server = ServerConfig::stun(url);
        if url.starts_with("turn:") || url.starts_with("turns:") {
            server.r#type = "turn".into();
            server.username = self.ice_username.clone();
            server.credential = self.ice_credential.clone();
        }
        server
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logger::init(&LogConfig {
        level: cli.log_level.unwrap_or_default(),
        ansi: std::io::stderr().is_terminal(),
    })?;

    let config = cli.session_config()?;
    let session_id = SessionId::new(&cli.session_id)?;
    let mut controller =
        SessionController::new(session_id, config).context("invalid session configuration")?;
    if let Some(token) = &cli.token {
        controller = controller.with_identity(Identity::new(token.as_str()));
    }
    println!("connecting to {}", controller.endpoint());

    let mut handle = controller.start();
    let mut last = SessionStatus::Idle;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("cancelling");
                handle.cancel();
            }
            status = handle.next_status() => {
                let Some(status) = status else { break };
                println!("{status}");
                if status.is_terminal() {
                    last = status;
                    break;
                }
            }
        }
    }

    match last {
        SessionStatus::Failed(reason) => anyhow::bail!("session failed: {reason}"),
        _ => Ok(()),
    }
}
