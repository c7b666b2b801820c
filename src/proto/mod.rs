//! The agent wire protocol.
//!
//! Items use the `svnserve` token syntax, one item per line:
//!
//! ```text
//! agent:  ( success ( 1 1 ( svninfo ) ) )                 greeting
//! client: ( svninfo ( 9:/ws/trunk ) )                     request
//! agent:  ( success ( ( 8:REVISION 2:42 ) ... ) )          six pairs, in order
//! agent:  ( failure ( ( 1 <message> <path> ) ) )           error tuple
//! ```

pub(crate) mod conn;
mod item;

use std::path::PathBuf;

pub use item::Item;
pub(crate) use item::encode_item;

use crate::{QueryFailure, RemoteCause, RemoteError, SvnInfoError, WorkingCopyInfo};

pub(crate) const PROTOCOL_VERSION: u64 = 1;
pub(crate) const CMD_SVNINFO: &str = "svninfo";

/// Failure codes carried in the first element of an error tuple.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FailureCode {
    Query = 1,
    InvalidRequest = 2,
    OutsideBoundary = 3,
}

impl FailureCode {
    pub(crate) fn as_u64(self) -> u64 {
        self as u64
    }

    fn from_u64(code: u64) -> Option<Self> {
        match code {
            1 => Some(Self::Query),
            2 => Some(Self::InvalidRequest),
            3 => Some(Self::OutsideBoundary),
            _ => None,
        }
    }
}

/// A decoded client request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Request {
    SvnInfo { path: PathBuf },
}

pub(crate) fn greeting_params() -> Vec<Item> {
    vec![
        Item::Number(PROTOCOL_VERSION),
        Item::Number(PROTOCOL_VERSION),
        Item::List(vec![Item::word(CMD_SVNINFO)]),
    ]
}

pub(crate) fn check_greeting(params: &[Item]) -> Result<(), SvnInfoError> {
    if params.len() < 3 {
        return Err(SvnInfoError::Protocol("greeting params too short".into()));
    }
    let minver = params[0]
        .as_u64()
        .ok_or_else(|| SvnInfoError::Protocol("invalid greeting minver".into()))?;
    let maxver = params[1]
        .as_u64()
        .ok_or_else(|| SvnInfoError::Protocol("invalid greeting maxver".into()))?;
    if !(minver <= PROTOCOL_VERSION && PROTOCOL_VERSION <= maxver) {
        return Err(SvnInfoError::Protocol(format!(
            "agent does not support protocol v{PROTOCOL_VERSION} (min={minver}, max={maxver})"
        )));
    }
    let has_command = params[2]
        .as_list()
        .is_some_and(|cmds| cmds.iter().any(|c| c.as_word() == Some(CMD_SVNINFO)));
    if !has_command {
        return Err(SvnInfoError::Protocol(format!(
            "agent does not offer the {CMD_SVNINFO} command"
        )));
    }
    Ok(())
}

pub(crate) fn svninfo_request(path: &str) -> Item {
    Item::List(vec![
        Item::word(CMD_SVNINFO),
        Item::List(vec![Item::string(path)]),
    ])
}

pub(crate) fn parse_request(item: &Item) -> Result<Request, SvnInfoError> {
    let parts = item
        .as_list()
        .ok_or_else(|| SvnInfoError::Protocol("request not a list".into()))?;
    let command = parts
        .first()
        .and_then(Item::as_word)
        .ok_or_else(|| SvnInfoError::Protocol("request has no command word".into()))?;
    let params = parts.get(1).and_then(Item::as_list).unwrap_or_default();
    match command {
        CMD_SVNINFO => {
            let path = params
                .first()
                .and_then(Item::as_str)
                .ok_or_else(|| SvnInfoError::Protocol("svninfo expects a UTF-8 path".into()))?;
            Ok(Request::SvnInfo {
                path: PathBuf::from(path),
            })
        }
        other => Err(SvnInfoError::Protocol(format!("unknown command: {other}"))),
    }
}

pub(crate) fn info_params(info: &WorkingCopyInfo) -> Vec<Item> {
    info.iter()
        .map(|(key, value)| Item::List(vec![Item::string(key.as_str()), Item::string(value)]))
        .collect()
}

pub(crate) fn parse_info(params: &[Item]) -> Result<WorkingCopyInfo, SvnInfoError> {
    let mut pairs = Vec::with_capacity(params.len());
    for param in params {
        let pair = param
            .as_list()
            .filter(|pair| pair.len() == 2)
            .ok_or_else(|| SvnInfoError::Protocol("info entry is not a pair".into()))?;
        let key = pair[0]
            .as_str()
            .ok_or_else(|| SvnInfoError::Protocol("info key is not a string".into()))?;
        let value = pair[1]
            .to_lossy_string()
            .ok_or_else(|| SvnInfoError::Protocol("info value is not a string".into()))?;
        pairs.push((key, value));
    }
    WorkingCopyInfo::from_pairs(pairs)
}

/// Maps an agent-side error to `(code, message, path)`.
pub(crate) fn failure_for(err: &SvnInfoError) -> (FailureCode, String, String) {
    match err {
        SvnInfoError::Query(failure) => (
            FailureCode::Query,
            failure.cause().to_string(),
            failure.path().display().to_string(),
        ),
        SvnInfoError::InvalidPath(message) => {
            (FailureCode::OutsideBoundary, message.clone(), String::new())
        }
        other => (FailureCode::InvalidRequest, other.to_string(), String::new()),
    }
}

/// Rebuilds the error an agent reported, so callers see what a local call
/// would have raised.
pub(crate) fn parse_failure(errors: &[Item]) -> SvnInfoError {
    let Some(tuple) = errors.first().and_then(Item::as_list) else {
        return SvnInfoError::Protocol("failure response without error tuple".into());
    };
    let code = tuple.first().and_then(Item::as_u64).unwrap_or(0);
    let message = tuple
        .get(1)
        .and_then(Item::to_lossy_string)
        .unwrap_or_default();
    let path = tuple
        .get(2)
        .and_then(Item::to_lossy_string)
        .unwrap_or_default();
    match FailureCode::from_u64(code) {
        Some(FailureCode::Query) => {
            QueryFailure::new(PathBuf::from(path), RemoteCause(message)).into()
        }
        Some(FailureCode::OutsideBoundary) => SvnInfoError::InvalidPath(message),
        Some(FailureCode::InvalidRequest) => {
            SvnInfoError::Protocol(format!("agent rejected request: {message}"))
        }
        None => SvnInfoError::Remote(RemoteError { code, message }),
    }
}
