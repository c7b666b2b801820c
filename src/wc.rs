//! Working-copy clients.
//!
//! A [`ClientManager`] hands out one [`WcClient`] handle per query. Handles own
//! whatever the query needs (a scratch configuration directory, a child
//! process) and release it when dropped, on success and failure alike.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tokio::process::Command;
use tracing::debug;

use crate::{ClientOptions, WorkingCopyInfo};

/// Boxed future returned by [`WcClient::info`].
pub type InfoFuture<'a> = Pin<Box<dyn Future<Output = Result<WcEntry, ClientError>> + Send + 'a>>;

/// Working-copy metadata as reported by a client, before normalization.
///
/// Fields the client did not report are `None`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WcEntry {
    /// Repository URL.
    pub url: Option<String>,
    /// Working revision.
    pub revision: Option<u64>,
    /// Node kind (`file`, `directory`, ...).
    pub kind: Option<String>,
    /// Pristine text checksum; files only.
    pub checksum: Option<String>,
    /// Repository UUID.
    pub repository_uuid: Option<String>,
    /// Author of the last committed change.
    pub last_changed_author: Option<String>,
    /// Revision of the last committed change.
    pub last_changed_rev: Option<u64>,
}

impl WcEntry {
    /// Normalizes the entry into the six-key map.
    ///
    /// `URL`, `Revision` and `Repository UUID` are required. A missing checksum
    /// or author becomes an empty string and a missing last changed revision
    /// becomes `0`.
    pub fn into_info(self) -> Result<WorkingCopyInfo, ClientError> {
        let revision = self.revision.ok_or(ClientError::MissingField("Revision"))?;
        let url = self.url.ok_or(ClientError::MissingField("URL"))?;
        let uuid = self
            .repository_uuid
            .ok_or(ClientError::MissingField("Repository UUID"))?;
        Ok(WorkingCopyInfo::new(
            revision,
            url,
            self.checksum.unwrap_or_default(),
            uuid,
            self.last_changed_author.unwrap_or_default(),
            self.last_changed_rev.unwrap_or(0),
        ))
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
/// Why a client could not produce a [`WcEntry`].
pub enum ClientError {
    /// The client program could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// Program that was run.
        program: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The client did not finish within the configured timeout.
    #[error("svn info timed out after {0:?}")]
    TimedOut(Duration),
    /// The client exited unsuccessfully.
    #[error("svn info exited with {status}: {stderr}")]
    Failed {
        /// Exit status of the client.
        status: ExitStatus,
        /// Trimmed standard error output.
        stderr: String,
    },
    /// The client output did not contain a required field.
    #[error("svn info output has no {0} field")]
    MissingField(&'static str),
    /// The client output is not well-formed XML.
    #[error("svn info output is not valid XML: {0}")]
    Xml(String),
    /// A numeric field could not be parsed.
    #[error("svn info field {field} is not a revision number: {value:?}")]
    InvalidNumber {
        /// Field label.
        field: &'static str,
        /// Raw value.
        value: String,
    },
    /// Any other I/O error, such as failing to create the scratch directory.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A failure from a custom client.
    #[error("{0}")]
    Other(String),
}

/// A handle to a Subversion client, valid for the queries of one invocation.
///
/// Resources held by the handle are released on drop.
pub trait WcClient: Send {
    /// Queries the working copy at `path` at its WORKING state.
    fn info<'a>(&'a mut self, path: &'a Path) -> InfoFuture<'a>;
}

/// Creates [`WcClient`] handles.
pub trait ClientManager: Send + Sync + std::fmt::Debug {
    /// Acquires a new client handle.
    fn open(&self) -> Result<Box<dyn WcClient>, ClientError>;
}

/// A [`ClientManager`] that runs the `svn` command-line client.
#[derive(Clone, Debug, Default)]
pub struct SvnCliManager {
    options: ClientOptions,
}

impl SvnCliManager {
    /// Creates a manager from client options.
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }

    /// Returns the configured options.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Acquires a concrete client handle.
    pub fn open_cli(&self) -> Result<SvnCliClient, ClientError> {
        let config_dir = if self.options.isolated_config {
            Some(
                tempfile::Builder::new()
                    .prefix("svninfo-config-")
                    .tempdir()?,
            )
        } else {
            None
        };
        Ok(SvnCliClient {
            options: self.options.clone(),
            config_dir,
        })
    }
}

impl ClientManager for SvnCliManager {
    fn open(&self) -> Result<Box<dyn WcClient>, ClientError> {
        Ok(Box::new(self.open_cli()?))
    }
}

/// One `svn` command-line client handle.
///
/// The scratch configuration directory is deleted and any still-running child
/// process is killed when the handle is dropped.
#[derive(Debug)]
pub struct SvnCliClient {
    options: ClientOptions,
    config_dir: Option<tempfile::TempDir>,
}

impl SvnCliClient {
    /// Location of the private configuration directory, if any.
    pub fn config_dir(&self) -> Option<&Path> {
        self.config_dir.as_ref().map(|dir| dir.path())
    }

    fn command(&self, path: &Path) -> Command {
        let mut cmd = Command::new(&self.options.svn_binary);
        cmd.args(["info", "--xml", "--non-interactive"]);
        if let Some(dir) = self.config_dir() {
            cmd.arg("--config-dir").arg(dir);
        }
        for (key, value) in &self.options.env {
            cmd.env(key, value);
        }
        // The trailing `@` is an empty peg revision, so an `@` inside the path
        // stays part of the path.
        let mut target = path.as_os_str().to_os_string();
        target.push("@");
        cmd.arg("--")
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl WcClient for SvnCliClient {
    fn info<'a>(&'a mut self, path: &'a Path) -> InfoFuture<'a> {
        Box::pin(async move {
            let program = self.options.svn_binary.display().to_string();
            debug!(program = %program, path = %path.display(), "running svn info");
            let output = tokio::time::timeout(self.options.timeout, self.command(path).output())
                .await
                .map_err(|_| ClientError::TimedOut(self.options.timeout))?
                .map_err(|source| ClientError::Spawn { program, source })?;
            if !output.status.success() {
                return Err(ClientError::Failed {
                    status: output.status,
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
            parse_info_xml(&String::from_utf8_lossy(&output.stdout))
        })
    }
}

impl Drop for SvnCliClient {
    fn drop(&mut self) {
        if let Some(dir) = self.config_dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(err) = dir.close() {
                debug!(path = %path.display(), error = %err, "failed to remove svn config dir");
            }
        }
    }
}

#[derive(Clone, Copy)]
enum TextField {
    Url,
    Checksum,
    RepositoryUuid,
    Author,
}

impl TextField {
    /// Picks the field for the innermost open elements, `stack` being the
    /// element path from the root.
    fn for_stack(stack: &[Vec<u8>]) -> Option<Self> {
        let tail: Vec<&[u8]> = stack.iter().rev().take(3).map(Vec::as_slice).collect();
        match tail.as_slice() {
            [b"url", b"entry", ..] => Some(Self::Url),
            [b"checksum", b"wc-info", b"entry"] => Some(Self::Checksum),
            [b"uuid", b"repository", b"entry"] => Some(Self::RepositoryUuid),
            [b"author", b"commit", b"entry"] => Some(Self::Author),
            _ => None,
        }
    }

    fn store(self, entry: &mut WcEntry, value: String) {
        let slot = match self {
            Self::Url => &mut entry.url,
            Self::Checksum => &mut entry.checksum,
            Self::RepositoryUuid => &mut entry.repository_uuid,
            Self::Author => &mut entry.last_changed_author,
        };
        *slot = Some(value);
    }
}

/// Parses the output of `svn info --xml` for a single target.
///
/// Only the first `<entry>` is read. Values come from fixed element paths, so
/// free text such as a lock comment never lands in another field.
pub fn parse_info_xml(text: &str) -> Result<WcEntry, ClientError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut entry = WcEntry::default();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut value = String::new();
    let mut seen_entry = false;
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(start) => {
                if read_attributes(&start, &stack, &mut entry, &mut seen_entry)? {
                    break;
                }
                stack.push(start.name().as_ref().to_vec());
                value.clear();
            }
            Event::Empty(start) => {
                if read_attributes(&start, &stack, &mut entry, &mut seen_entry)? {
                    break;
                }
            }
            Event::Text(text) => value.push_str(&text.unescape().map_err(xml_error)?),
            Event::End(_) => {
                if let Some(field) = TextField::for_stack(&stack) {
                    field.store(&mut entry, std::mem::take(&mut value));
                }
                if stack.pop().as_deref() == Some(b"entry".as_slice()) {
                    break;
                }
                value.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(entry)
}

/// Records the attributes of `<entry>` and its `<commit>`. Returns `true` when
/// a second entry starts.
fn read_attributes(
    start: &BytesStart<'_>,
    stack: &[Vec<u8>],
    entry: &mut WcEntry,
    seen_entry: &mut bool,
) -> Result<bool, ClientError> {
    let parent = stack.last().map(Vec::as_slice);
    match start.name().as_ref() {
        b"entry" => {
            if *seen_entry {
                return Ok(true);
            }
            *seen_entry = true;
            entry.revision = revision_attr(start, "Revision")?;
            entry.kind = attr(start, "kind")?;
        }
        b"commit" if parent == Some(b"entry".as_slice()) => {
            entry.last_changed_rev = revision_attr(start, "Last Changed Rev")?;
        }
        _ => {}
    }
    Ok(false)
}

fn attr(start: &BytesStart<'_>, name: &str) -> Result<Option<String>, ClientError> {
    match start.try_get_attribute(name).map_err(xml_error)? {
        Some(attr) => Ok(Some(attr.unescape_value().map_err(xml_error)?.into_owned())),
        None => Ok(None),
    }
}

fn revision_attr(start: &BytesStart<'_>, field: &'static str) -> Result<Option<u64>, ClientError> {
    attr(start, "revision")?
        .map(|value| parse_rev(field, &value))
        .transpose()
}

fn xml_error(err: impl std::fmt::Display) -> ClientError {
    ClientError::Xml(err.to_string())
}

fn parse_rev(field: &'static str, value: &str) -> Result<u64, ClientError> {
    value.parse::<u64>().map_err(|_| ClientError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use proptest::prelude::*;
    use std::ffi::OsStr;

    const FILE_INFO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<info>
<entry
   path="trunk/README"
   revision="42"
   kind="file">
<url>https://example.org/repo/trunk/README</url>
<relative-url>^/trunk/README</relative-url>
<repository>
<root>https://example.org/repo</root>
<uuid>11111111-2222-3333-4444-555555555555</uuid>
</repository>
<wc-info>
<wcroot-abspath>/ws/wc</wcroot-abspath>
<schedule>normal</schedule>
<depth>infinity</depth>
<text-updated>2019-03-01T10:05:00.000000Z</text-updated>
<checksum>abc123</checksum>
</wc-info>
<commit
   revision="40">
<author>alice</author>
<date>2019-03-01T10:00:00.000000Z</date>
</commit>
</entry>
</info>
"#;

    const DIR_INFO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<info>
<entry
   path="."
   revision="7"
   kind="dir">
<url>svn://example.org/repo/trunk</url>
<repository>
<root>svn://example.org/repo</root>
<uuid>11111111-2222-3333-4444-555555555555</uuid>
</repository>
<wc-info>
<wcroot-abspath>/ws/wc</wcroot-abspath>
<schedule>normal</schedule>
<depth>infinity</depth>
</wc-info>
<commit
   revision="7">
<author>bob</author>
<date>2019-03-01T10:00:00.000000Z</date>
</commit>
</entry>
</info>
"#;

    fn minimal(revision: &str, last: &str) -> String {
        format!(
            r#"<info><entry revision="{revision}" kind="file">
<url>svn://h/r</url>
<repository><uuid>u</uuid></repository>
<commit revision="{last}"><author>a</author></commit>
</entry></info>"#
        )
    }

    #[test]
    fn parses_file_info() {
        let entry = parse_info_xml(FILE_INFO).unwrap();
        assert_eq!(entry.kind.as_deref(), Some("file"));
        let info = entry.into_info().unwrap();
        assert_eq!(
            info,
            WorkingCopyInfo::new(
                42,
                "https://example.org/repo/trunk/README",
                "abc123",
                "11111111-2222-3333-4444-555555555555",
                "alice",
                40,
            )
        );
    }

    #[test]
    fn directory_has_empty_checksum() {
        let info = parse_info_xml(DIR_INFO).unwrap().into_info().unwrap();
        assert_eq!(info.checksum(), "");
        assert_eq!(info.revision(), "7");
        assert_eq!(info.last_author(), "bob");
    }

    #[test]
    fn uncommitted_node_defaults_author_and_last_rev() {
        let text = r#"<info><entry revision="0" kind="file">
<url>https://example.org/repo/trunk/new.txt</url>
<repository><uuid>11111111-2222-3333-4444-555555555555</uuid></repository>
<wc-info><schedule>add</schedule></wc-info>
</entry></info>"#;
        let info = parse_info_xml(text).unwrap().into_info().unwrap();
        assert_eq!(info.last_author(), "");
        assert_eq!(info.last_change_revision(), "0");
        assert_eq!(info.revision(), "0");
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let text =
            r#"<info><entry revision="3"><url>https://example.org/repo</url></entry></info>"#;
        let err = parse_info_xml(text).unwrap().into_info().unwrap_err();
        assert!(matches!(err, ClientError::MissingField("Repository UUID")));
    }

    #[test]
    fn negative_revision_is_rejected() {
        let err = parse_info_xml(&minimal("-1", "3")).unwrap_err();
        assert!(matches!(
            err,
            ClientError::InvalidNumber {
                field: "Revision",
                ..
            }
        ));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        let err = parse_info_xml(r#"<info><entry revision="1"></info>"#).unwrap_err();
        assert!(matches!(err, ClientError::Xml(_)));
    }

    #[test]
    fn only_first_entry_is_used() {
        let second = FILE_INFO
            .trim_start_matches(r#"<?xml version="1.0" encoding="UTF-8"?>"#)
            .replace("<info>", "")
            .replace("</info>", "");
        let text = DIR_INFO.replace("</info>", &format!("{second}</info>"));
        let entry = parse_info_xml(&text).unwrap();
        assert_eq!(entry.revision, Some(7));
        assert_eq!(entry.checksum, None);
        assert_eq!(entry.last_changed_author.as_deref(), Some("bob"));
    }

    #[test]
    fn lock_comment_does_not_override_fields() {
        let lock = "<lock>
<token>opaquelocktoken:1</token>
<owner>mallory</owner>
<comment>Revision: 9999
Last Changed Author: mallory
&lt;author&gt;mallory&lt;/author&gt;</comment>
<created>2019-03-02T00:00:00.000000Z</created>
</lock>
</entry>";
        let text = FILE_INFO.replace("</entry>", lock);
        let info = parse_info_xml(&text).unwrap().into_info().unwrap();
        assert_eq!(info.revision(), "42");
        assert_eq!(info.last_author(), "alice");
        assert_eq!(info.checksum(), "abc123");
    }

    #[test]
    fn non_ascii_and_escaped_values_are_decoded() {
        let text = FILE_INFO
            .replace("<author>alice</author>", "<author>jürgen</author>")
            .replace(
                "<url>https://example.org/repo/trunk/README</url>",
                "<url>https://example.org/repo/%C3%9Cbersicht/a&amp;b</url>",
            );
        let info = parse_info_xml(&text).unwrap().into_info().unwrap();
        assert_eq!(info.last_author(), "jürgen");
        assert_eq!(info.url(), "https://example.org/repo/%C3%9Cbersicht/a&b");
    }

    #[test]
    fn command_escapes_peg_revision_and_keeps_locale() {
        let manager = SvnCliManager::new(ClientOptions::new().with_env("SVN_EDITOR", "true"));
        let client = manager.open_cli().unwrap();
        let cmd = client.command(Path::new("/ws/Übersicht/node_modules/@scope/icon@2x.png"));
        let cmd = cmd.as_std();

        assert_eq!(cmd.get_program(), OsStr::new("svn"));
        let args: Vec<&OsStr> = cmd.get_args().collect();
        assert_eq!(&args[..3], ["info", "--xml", "--non-interactive"]);
        assert_eq!(args[3], "--config-dir");
        assert_eq!(args[4], client.config_dir().unwrap().as_os_str());
        assert_eq!(
            &args[5..],
            ["--", "/ws/Übersicht/node_modules/@scope/icon@2x.png@"]
        );

        let envs: Vec<_> = cmd.get_envs().collect();
        assert_eq!(envs, [(OsStr::new("SVN_EDITOR"), Some(OsStr::new("true")))]);
    }

    #[test]
    fn isolated_config_dir_is_removed_on_drop() {
        let manager = SvnCliManager::new(ClientOptions::new());
        let client = manager.open_cli().unwrap();
        let dir = client.config_dir().unwrap().to_path_buf();
        assert!(dir.is_dir());
        drop(client);
        assert!(!dir.exists());

        let shared = SvnCliManager::new(ClientOptions::new().with_isolated_config(false));
        assert!(shared.open_cli().unwrap().config_dir().is_none());
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let manager = SvnCliManager::new(
            ClientOptions::new().with_svn_binary("/nonexistent/svninfo-test/svn"),
        );
        let mut client = manager.open().unwrap();
        let err = rt.block_on(client.info(Path::new("/tmp"))).unwrap_err();
        assert!(matches!(err, ClientError::Spawn { .. }));
    }

    proptest! {
        #[test]
        fn revisions_render_as_decimal(rev in any::<u64>(), last in any::<u64>()) {
            let text = minimal(&rev.to_string(), &last.to_string());
            let info = parse_info_xml(&text).unwrap().into_info().unwrap();
            prop_assert_eq!(info.revision(), rev.to_string());
            prop_assert_eq!(info.last_change_revision(), last.to_string());
            prop_assert!(info.revision().bytes().all(|b| b.is_ascii_digit()));
        }
    }
}
