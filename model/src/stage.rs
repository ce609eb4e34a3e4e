use crate::error::{self, Result};
use serde::{Deserialize, Serialize};
use snafu::ensure;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// The name of one step of a test pipeline, e.g. `setup_ami` or `teardown`. The same name is used
/// to run a stage and to skip it.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageName(String);

impl StageName {
    pub fn new<S: Into<String>>(name: S) -> Result<Self> {
        let name = name.into();
        ensure!(!name.trim().is_empty(), error::EmptyStageNameSnafu);
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for StageName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for StageName {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for StageName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// The skip configuration handed to a pipeline when it is constructed. A stage that is marked
/// skipped is not executed at all, which is how a partially completed run is resumed: the stages
/// that already ran are skipped and the later stages load what the earlier ones persisted.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkipStages(BTreeMap<StageName, bool>);

impl SkipStages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `stage` as skipped (`true`) or explicitly not skipped (`false`).
    pub fn set(&mut self, stage: StageName, skip: bool) -> &mut Self {
        self.0.insert(stage, skip);
        self
    }

    pub fn skip(mut self, stage: StageName) -> Self {
        self.set(stage, true);
        self
    }

    pub fn is_skipped(&self, stage: &StageName) -> bool {
        self.0.get(stage).copied().unwrap_or(false)
    }

    /// `true` if at least one stage is skipped, i.e. this run is resuming an earlier one.
    pub fn any(&self) -> bool {
        self.0.values().any(|skipped| *skipped)
    }

    /// The names of all skipped stages.
    pub fn skipped(&self) -> impl Iterator<Item = &StageName> {
        self.0
            .iter()
            .filter(|(_, skipped)| **skipped)
            .map(|(name, _)| name)
    }

    /// Parses a comma-separated list of stage names, e.g. `setup_ami,deploy_to_aws`. Empty entries
    /// are ignored.
    pub fn from_list(list: &str) -> Result<Self> {
        let mut skip = Self::new();
        for name in list.split(',').map(str::trim).filter(|name| !name.is_empty()) {
            skip.set(StageName::new(name)?, true);
        }
        Ok(skip)
    }
}

impl FromIterator<StageName> for SkipStages {
    fn from_iter<T: IntoIterator<Item = StageName>>(iter: T) -> Self {
        Self(iter.into_iter().map(|name| (name, true)).collect())
    }
}

impl Extend<StageName> for SkipStages {
    fn extend<T: IntoIterator<Item = StageName>>(&mut self, iter: T) {
        self.0.extend(iter.into_iter().map(|name| (name, true)))
    }
}

#[cfg(test)]
mod test {
    use super::{SkipStages, StageName};

    fn name(s: &str) -> StageName {
        StageName::new(s).unwrap()
    }

    #[test]
    fn empty_stage_name_is_rejected() {
        assert!(StageName::new("").is_err());
        assert!(StageName::new("  ").is_err());
        assert!("setup_ami".parse::<StageName>().is_ok());
    }

    #[test]
    fn skip_list_parsing() {
        let skip = SkipStages::from_list("setup_ami, deploy_to_aws,,").unwrap();
        assert!(skip.is_skipped(&name("setup_ami")));
        assert!(skip.is_skipped(&name("deploy_to_aws")));
        assert!(!skip.is_skipped(&name("validate")));
        assert!(skip.any());
        assert_eq!(skip.skipped().count(), 2);
    }

    #[test]
    fn explicit_false_is_not_skipped() {
        let mut skip = SkipStages::new();
        skip.set(name("teardown"), false);
        assert!(!skip.is_skipped(&name("teardown")));
        assert!(!skip.any());
    }
}
