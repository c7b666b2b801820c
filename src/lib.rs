//! Subversion working-copy info as a pipeline step.
//!
//! This crate provides the `svninfo` step: given a path inside a build
//! workspace, it asks a Subversion client for the working copy's metadata and
//! returns it as an ordered map with six keys (`REVISION`, `URL`, `CHECKSUM`,
//! `REPOSITORY_UUID`, `LAST_AUTHOR`, `LAST_CHANGE_REVISION`). It does **not**
//! read working-copy files itself; the query is delegated to the `svn`
//! command-line client (or any [`ClientManager`]).
//!
//! The query runs in whichever process owns the workspace. A [`FilePath`] is
//! either local or bound to an [`Agent`] reachable over TCP.
//!
//! ## Getting started
//!
//! ```rust,no_run
//! use svninfo::{FilePath, Inspector, StepArgs, StepContext, StepRegistry};
//!
//! fn main() -> svninfo::Result<()> {
//!     let rt = tokio::runtime::Builder::new_current_thread()
//!         .enable_all()
//!         .build()?;
//!
//!     rt.block_on(async {
//!         let registry = StepRegistry::with_builtin_steps();
//!         let context = StepContext::new()
//!             .with_workspace(FilePath::local("/var/ci/workspace", Inspector::default()));
//!         let args = StepArgs::new().with("path", "checkout");
//!         let value = registry.invoke("svninfo", &args, &context).await?;
//!         println!("{value:?}");
//!         Ok(())
//!     })
//! }
//! ```
//!
//! ## Features
//!
//! - `serde`: enables `Serialize`/`Deserialize` for public data types.
//! - `cli` (default): builds the `svninfo` binary.

#![deny(unsafe_code)]

mod agent;
mod channel;
mod error;
mod info;
mod inspect;
mod options;
mod path;
mod proto;
mod step;
mod wc;

pub use agent::{Agent, AgentHandle};
pub use channel::{Channel, FilePath, RemoteChannel, RemoteSession};
pub use error::{BoxError, QueryFailure, RemoteCause, RemoteError, SvnInfoError};
/// Convenience alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, SvnInfoError>;
pub use info::{InfoKey, WorkingCopyInfo};
pub use inspect::Inspector;
pub use options::{AgentOptions, ClientOptions, TransportOptions};
/// Low-level wire-protocol types.
pub mod raw {
    pub use crate::proto::Item;
}
pub use step::{
    ArgValue, ContextKind, StepArgs, StepContext, StepDescriptor, StepFuture, StepRegistry,
    StepValue, SvninfoDescriptor, SvninfoStep,
};
pub use wc::{
    ClientError, ClientManager, InfoFuture, SvnCliClient, SvnCliManager, WcClient, WcEntry,
    parse_info_xml,
};
