#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use osiris_lite::jobs::{JobConfig, JobError, Jobs, KillOutcome};
use osiris_lite::remote::{Connector, RemoteSession, Settings, SettingsOverrides, SshConfig};

#[derive(Parser, Debug)]
#[command(name = "osiris-lite", version)]
#[command(about = "Build and run container jobs on a remote host over SSH", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every subcommand; each falls back to its environment variable.
#[derive(Args, Debug)]
struct GlobalArgs {
    /// SSH host alias [env: OSIRIS_REMOTE]
    #[arg(short, long, global = true)]
    remote: Option<String>,

    /// Password for password authentication [env: OSIRIS_REMOTE_PASSWORD]
    #[arg(short, long, global = true)]
    password: Option<String>,

    /// Project directory on the remote host [env: OSIRIS_REMOTE_PATH]
    #[arg(long, global = true)]
    remote_path: Option<String>,

    /// Docker image name [env: OSIRIS_IMAGE]
    #[arg(long, global = true)]
    image: Option<String>,

    /// Container name prefix [env: OSIRIS_CONTAINER]
    #[arg(long, global = true)]
    container: Option<String>,

    /// Dockerfile path relative to the remote path [env: OSIRIS_DOCKERFILE]
    #[arg(short, long, global = true)]
    dockerfile: Option<String>,

    /// SSH client config file [env: OSIRIS_SSH_CONFIG]
    #[arg(long, global = true)]
    ssh_config: Option<String>,

    /// Connection timeout in seconds [env: SSH_CONNECT_TIMEOUT]
    #[arg(long, global = true, value_name = "SECONDS")]
    timeout: Option<u64>,
}

impl GlobalArgs {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            remote: self.remote.clone(),
            password: self.password.clone(),
            remote_path: self.remote_path.clone(),
            image: self.image.clone(),
            container: self.container.clone(),
            dockerfile: self.dockerfile.clone(),
            ssh_config: self.ssh_config.clone(),
            connect_timeout_secs: self.timeout,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the image and run a command in a new container
    Run {
        /// Command to run inside the container
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Show running containers, fuzzer processes and host resources
    Status {
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Stop containers: `kill all` or `kill <container_id>`
    Kill { target: Option<String> },
    /// Follow a container's logs (defaults to the first running container)
    Logs { container_id: Option<String> },
}

const KILL_USAGE: &str = "Use 'kill all' or 'kill <container_id>'";

/// A subcommand that needs a remote session.
#[derive(Debug, PartialEq, Eq)]
enum Action {
    Run(String),
    Status { json: bool },
    KillAll,
    KillContainer(String),
    Logs(Option<String>),
}

impl Commands {
    /// `None` when the invocation is answered locally with a usage hint.
    fn into_action(self) -> Option<Action> {
        let action = match self {
            Commands::Run { command } => Action::Run(command.join(" ")),
            Commands::Status { json } => Action::Status { json },
            Commands::Kill { target } => match target? {
                target if target == "all" => Action::KillAll,
                container_id => Action::KillContainer(container_id),
            },
            Commands::Logs { container_id } => Action::Logs(container_id),
        };
        Some(action)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Logs go to stderr so streamed remote output on stdout stays clean
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let Some(action) = cli.command.into_action() else {
        println!("{KILL_USAGE}");
        return Ok(());
    };

    let settings = Settings::resolve(&cli.global.overrides())?;
    debug!(?settings, "resolved settings");

    let ssh_config = SshConfig::load(&settings.ssh_config_path)?;
    let connector = Connector::new(&ssh_config, settings.connect_timeout);

    let mut session =
        RemoteSession::open(&connector, &settings.remote, settings.password.as_deref())
            .await
            .map_err(|e| format!("failed to connect to remote: {e}"))?;

    let result = dispatch(&session, &settings, action).await;
    session.close().await;

    if let Err(e) = &result {
        error!(error = %e, "command failed");
    }
    result
}

async fn dispatch(
    session: &RemoteSession,
    settings: &Settings,
    action: Action,
) -> Result<(), Box<dyn std::error::Error>> {
    let jobs = Jobs::new(session, JobConfig::from(settings));

    match action {
        Action::Run(command) => {
            println!("Running: {command}");

            match jobs.run(&command).await {
                Ok(_) => println!("\nCommand completed successfully"),
                Err(e @ JobError::BuildFailed { .. }) => {
                    if let Some(output) = e.output() {
                        eprintln!("Docker build output:\n{output}");
                    }
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Action::Status { json: true } => {
            let status = jobs.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Action::Status { json: false } => {
            println!("Checking status on remote server...");
            print!("{}", jobs.status().await?.render());
        }
        Action::KillAll => {
            println!("Killing all jobs...");
            jobs.kill_all().await?;
            println!("All jobs killed.");
        }
        Action::KillContainer(container_id) => {
            println!("Killing container: {container_id}");
            match jobs.kill_container(&container_id).await? {
                KillOutcome::Stopped => println!("Killed container: {container_id}"),
                KillOutcome::NotFound => println!("Container {container_id} does not exist"),
            }
        }
        Action::Logs(container_id) => {
            println!("Connecting to logs... (Press Ctrl+C to disconnect)");
            jobs.logs(container_id.as_deref()).await?;
        }
    }

    Ok(())
}
