//! The working-copy info map returned by the `svninfo` step.

use std::fmt::{Display, Formatter};

use crate::SvnInfoError;

/// One of the six keys of a [`WorkingCopyInfo`], in map order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InfoKey {
    /// Working revision of the node.
    Revision,
    /// Repository URL of the node.
    Url,
    /// Checksum of the pristine text (empty for directories).
    Checksum,
    /// UUID of the repository.
    RepositoryUuid,
    /// Author of the last change.
    LastAuthor,
    /// Revision of the last change.
    LastChangeRevision,
}

impl InfoKey {
    /// All keys, in map order.
    pub const ALL: [InfoKey; 6] = [
        InfoKey::Revision,
        InfoKey::Url,
        InfoKey::Checksum,
        InfoKey::RepositoryUuid,
        InfoKey::LastAuthor,
        InfoKey::LastChangeRevision,
    ];

    /// Returns the map key as seen by pipeline scripts.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Revision => "REVISION",
            Self::Url => "URL",
            Self::Checksum => "CHECKSUM",
            Self::RepositoryUuid => "REPOSITORY_UUID",
            Self::LastAuthor => "LAST_AUTHOR",
            Self::LastChangeRevision => "LAST_CHANGE_REVISION",
        }
    }

    /// Parses a map key name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl Display for InfoKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Working-copy metadata for one path.
///
/// Always holds exactly the six [`InfoKey`] entries; iteration follows
/// [`InfoKey::ALL`]. Values cannot be changed once built.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(deny_unknown_fields))]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WorkingCopyInfo {
    #[cfg_attr(feature = "serde", serde(rename = "REVISION"))]
    revision: String,
    #[cfg_attr(feature = "serde", serde(rename = "URL"))]
    url: String,
    #[cfg_attr(feature = "serde", serde(rename = "CHECKSUM"))]
    checksum: String,
    #[cfg_attr(feature = "serde", serde(rename = "REPOSITORY_UUID"))]
    repository_uuid: String,
    #[cfg_attr(feature = "serde", serde(rename = "LAST_AUTHOR"))]
    last_author: String,
    #[cfg_attr(feature = "serde", serde(rename = "LAST_CHANGE_REVISION"))]
    last_change_revision: String,
}

impl WorkingCopyInfo {
    /// Builds the map; revision numbers are rendered as decimal strings.
    pub fn new(
        revision: u64,
        url: impl Into<String>,
        checksum: impl Into<String>,
        repository_uuid: impl Into<String>,
        last_author: impl Into<String>,
        last_change_revision: u64,
    ) -> Self {
        Self {
            revision: revision.to_string(),
            url: url.into(),
            checksum: checksum.into(),
            repository_uuid: repository_uuid.into(),
            last_author: last_author.into(),
            last_change_revision: last_change_revision.to_string(),
        }
    }

    /// Rebuilds the map from `(key, value)` pairs.
    ///
    /// Every key must appear exactly once and the revision values must be
    /// decimal numbers; pair order does not matter.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, SvnInfoError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut values: [Option<String>; 6] = Default::default();
        for (name, value) in pairs {
            let name = name.as_ref();
            let key = InfoKey::from_name(name)
                .ok_or_else(|| SvnInfoError::Protocol(format!("unknown info key: {name}")))?;
            let slot = &mut values[key.index()];
            if slot.is_some() {
                return Err(SvnInfoError::Protocol(format!("duplicate info key: {name}")));
            }
            *slot = Some(value.into());
        }

        let [revision, url, checksum, repository_uuid, last_author, last_change_revision] =
            values;
        let take = |value: Option<String>, key: InfoKey| {
            value.ok_or_else(|| SvnInfoError::Protocol(format!("missing info key: {key}")))
        };
        let info = Self {
            revision: take(revision, InfoKey::Revision)?,
            url: take(url, InfoKey::Url)?,
            checksum: take(checksum, InfoKey::Checksum)?,
            repository_uuid: take(repository_uuid, InfoKey::RepositoryUuid)?,
            last_author: take(last_author, InfoKey::LastAuthor)?,
            last_change_revision: take(last_change_revision, InfoKey::LastChangeRevision)?,
        };
        for key in [InfoKey::Revision, InfoKey::LastChangeRevision] {
            let value = info.get(key);
            if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
                return Err(SvnInfoError::Protocol(format!(
                    "{key} is not a revision number: {value:?}"
                )));
            }
        }
        Ok(info)
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: InfoKey) -> &str {
        match key {
            InfoKey::Revision => &self.revision,
            InfoKey::Url => &self.url,
            InfoKey::Checksum => &self.checksum,
            InfoKey::RepositoryUuid => &self.repository_uuid,
            InfoKey::LastAuthor => &self.last_author,
            InfoKey::LastChangeRevision => &self.last_change_revision,
        }
    }

    /// Returns the value stored under a key name such as `"URL"`.
    pub fn get_by_name(&self, name: &str) -> Option<&str> {
        InfoKey::from_name(name).map(|key| self.get(key))
    }

    /// Iterates over `(key, value)` in map order.
    pub fn iter(&self) -> impl Iterator<Item = (InfoKey, &str)> + '_ {
        InfoKey::ALL.into_iter().map(move |key| (key, self.get(key)))
    }

    /// Number of entries (always six).
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        InfoKey::ALL.len()
    }

    /// Returns the entries as an ordered list of owned pairs.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.iter()
            .map(|(key, value)| (key.as_str().to_string(), value.to_string()))
            .collect()
    }

    /// The working revision.
    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// The repository URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The pristine checksum, or an empty string.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// The repository UUID.
    pub fn repository_uuid(&self) -> &str {
        &self.repository_uuid
    }

    /// The last author, or an empty string.
    pub fn last_author(&self) -> &str {
        &self.last_author
    }

    /// The last changed revision.
    pub fn last_change_revision(&self) -> &str {
        &self.last_change_revision
    }
}

impl Display for WorkingCopyInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (key, value) in self.iter() {
            writeln!(f, "{key}={value}")?;
        }
        Ok(())
    }
}
