use crate::schema::{DateWindow, Fact};
use crate::utils::MonthKey;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Which branches feed the derived views.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BranchSelection {
    /// Every fact, including facts without a branch.
    #[default]
    All,
    /// Only facts whose branch is one of these identifiers.
    Only(BTreeSet<String>),
}

impl BranchSelection {
    /// Builds an explicit selection. Nothing selected means everything.
    pub fn explicit<I, S>(branches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = branches
            .into_iter()
            .map(|b| {
                let branch: String = b.into();
                branch.trim().to_string()
            })
            .filter(|b| !b.is_empty())
            .collect();

        if set.is_empty() {
            BranchSelection::All
        } else {
            BranchSelection::Only(set)
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, BranchSelection::All)
    }

    pub fn matches(&self, branch: Option<&str>) -> bool {
        match self {
            BranchSelection::All => true,
            BranchSelection::Only(set) => branch.map(|b| set.contains(b)).unwrap_or(false),
        }
    }

    /// Drops branches that are not in `available`, falling back to `All`.
    pub fn retain_available(&self, available: &[String]) -> Self {
        match self {
            BranchSelection::All => BranchSelection::All,
            BranchSelection::Only(set) => BranchSelection::explicit(
                set.iter()
                    .filter(|b| available.contains(*b))
                    .cloned()
                    .collect::<Vec<_>>(),
            ),
        }
    }
}

pub fn matches_branch(fact: &Fact, selection: &BranchSelection) -> bool {
    selection.matches(fact.branch.as_deref())
}

/// `true` when `window` is absent or invalid, otherwise inclusive containment.
pub fn in_window(key: MonthKey, window: Option<&DateWindow>) -> bool {
    window.map(|w| w.contains(key)).unwrap_or(true)
}

/// Static lookup of named branch groups (regions and the like).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct BranchGroups {
    pub groups: BTreeMap<String, Vec<String>>,
}

impl BranchGroups {
    pub fn new(groups: BTreeMap<String, Vec<String>>) -> Self {
        Self { groups }
    }

    pub fn insert<I, S>(&mut self, name: impl Into<String>, branches: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .insert(name.into(), branches.into_iter().map(Into::into).collect());
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Union of the branches of the named groups. Unknown names are ignored.
    pub fn selection_for(&self, names: &[&str]) -> BranchSelection {
        let branches: Vec<&String> = names
            .iter()
            .filter_map(|name| self.groups.get(*name))
            .flatten()
            .collect();
        BranchSelection::explicit(branches.into_iter().cloned())
    }
}
