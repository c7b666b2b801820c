//! Command-line front end: run the `svninfo` step locally, serve it from an
//! agent, or call an agent.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use svninfo::{
    Agent, AgentOptions, ClientOptions, FilePath, Inspector, RemoteChannel, StepArgs, StepContext,
    StepRegistry, StepValue, SvnInfoError, TransportOptions, WorkingCopyInfo,
};

#[derive(Debug, Parser)]
#[command(name = "svninfo", version, about = "Provides some data from svn info as a map.")]
struct Cli {
    /// Subversion command-line client to run.
    #[arg(long, global = true, env = "SVNINFO_SVN", default_value = "svn")]
    svn: PathBuf,

    /// Seconds allowed for one `svn info` run.
    #[arg(long, global = true, env = "SVNINFO_TIMEOUT", default_value_t = 60)]
    timeout: u64,

    /// More logging (-v debug, -vv trace); `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Query a working copy in this process.
    Local {
        /// Workspace root the path is resolved against.
        #[arg(long, default_value = ".")]
        workspace: PathBuf,
        /// Print a JSON object instead of KEY=VALUE lines.
        #[arg(long)]
        json: bool,
        /// Workspace-relative path of the working copy.
        path: String,
    },
    /// Serve queries for the workspaces on this machine.
    Agent {
        /// Address to listen on.
        #[arg(long, env = "SVNINFO_LISTEN", default_value = "127.0.0.1:7711")]
        listen: String,
        /// Only allow paths below this directory.
        #[arg(long)]
        boundary: Option<PathBuf>,
    },
    /// Query a working copy through an agent.
    Remote {
        /// Agent address (`host:port`).
        #[arg(long, env = "SVNINFO_AGENT")]
        agent: String,
        /// Workspace root as seen by the agent.
        #[arg(long)]
        workspace: PathBuf,
        /// Print a JSON object instead of KEY=VALUE lines.
        #[arg(long)]
        json: bool,
        /// Workspace-relative path of the working copy.
        path: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "svninfo=debug",
        _ => "svninfo=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> svninfo::Result<()> {
    let client = ClientOptions::new()
        .with_svn_binary(cli.svn)
        .with_timeout(Duration::from_secs(cli.timeout));
    let inspector = Inspector::from_options(client);
    let registry = StepRegistry::with_builtin_steps();

    match cli.command {
        Command::Local {
            workspace,
            json,
            path,
        } => {
            let workspace = std::path::absolute(&workspace)?;
            let context = StepContext::new().with_workspace(FilePath::local(workspace, inspector));
            let value = invoke_svninfo(&registry, &context, path).await?;
            print_value(&value, json)
        }
        Command::Agent { listen, boundary } => {
            let mut options = AgentOptions::new();
            if let Some(boundary) = boundary {
                options = options.with_boundary(std::path::absolute(&boundary)?);
            }
            let listener = Agent::bind(&listen).await?;
            eprintln!("svninfo agent listening on {}", listener.local_addr()?);
            Agent::new(inspector, options).serve(listener).await
        }
        Command::Remote {
            agent,
            workspace,
            json,
            path,
        } => {
            let transport = TransportOptions::default()
                .with_read_timeout(Duration::from_secs(cli.timeout.saturating_add(30)));
            let channel = RemoteChannel::new(agent).with_transport(transport);
            let context = StepContext::new().with_workspace(FilePath::remote(workspace, channel));
            let value = invoke_svninfo(&registry, &context, path).await?;
            print_value(&value, json)
        }
    }
}

async fn invoke_svninfo(
    registry: &StepRegistry,
    context: &StepContext,
    path: String,
) -> svninfo::Result<StepValue> {
    let args = StepArgs::new().with("path", path);
    registry.invoke("svninfo", &args, context).await
}

fn print_value(value: &StepValue, json: bool) -> svninfo::Result<()> {
    let entries = value
        .as_map()
        .ok_or_else(|| SvnInfoError::Protocol("svninfo did not return a map".into()))?;
    if json {
        let info = WorkingCopyInfo::from_pairs(entries.iter().map(|(k, v)| (k, v.clone())))?;
        let text = serde_json::to_string_pretty(&info)
            .map_err(|err| SvnInfoError::Protocol(format!("failed to encode JSON: {err}")))?;
        println!("{text}");
    } else {
        for (key, value) in entries {
            println!("{key}={value}");
        }
    }
    Ok(())
}
