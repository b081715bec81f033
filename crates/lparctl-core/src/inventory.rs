//! Live partition enumeration and console type detection.
//!
//! The table's record count comes from two independent listings of the live
//! partitions: a count and a full id listing. They are taken back to back and
//! must agree; a mismatch means partitions changed underneath us.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::exec::{Execute, parse_leading_int};

/// Probe whose exit status tells an HMC from an IVM
pub const DETECT_COMMAND: &str = "lshmc -V";

/// Placeholder in inventory command templates
pub const SCOPE_PLACEHOLDER: &str = "{scope}";

/// `grep -c` exits 1 on zero matches; `|| true` keeps the "0" usable.
pub const DEFAULT_COUNT_COMMAND: &str =
    "lssyscfg -r lpar{scope} -F lpar_id,state |grep -c '^[0-9][0-9]*' || true";

pub const DEFAULT_LIST_COMMAND: &str = "lssyscfg -r lpar{scope} -F lpar_id,state | sed -e 's/,.*$//'";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemType {
    /// Hardware Management Console, managing several systems
    Hmc,
    /// Integrated Virtualization Manager, managing only its own system
    Ivm,
}

impl SystemType {
    /// Runs [`DETECT_COMMAND`]: exit 0 means HMC, anything else IVM.
    pub fn detect<E: Execute + ?Sized>(exec: &mut E) -> Result<Self> {
        let probe = exec.execute(DETECT_COMMAND)?;
        let system = if probe.success() { Self::Hmc } else { Self::Ivm };
        debug!(%system, exit_code = probe.exit_code, "detected console type");
        Ok(system)
    }

    /// Managed-system selector for console commands.
    ///
    /// HMC commands need `-m <system>`; an IVM only manages itself.
    pub fn scope_flag(self, managed_system: Option<&str>) -> String {
        match (self, managed_system) {
            (Self::Hmc, Some(ms)) if !ms.is_empty() => format!(" -m {ms}"),
            _ => String::new(),
        }
    }
}

impl fmt::Display for SystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hmc => write!(f, "hmc"),
            Self::Ivm => write!(f, "ivm"),
        }
    }
}

/// Result of the two live partition enumerations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveIds {
    pub counted: usize,
    pub listed: Vec<i32>,
}

impl LiveIds {
    /// The listed ids, provided both enumerations agree on how many there are.
    pub fn reconcile(&self) -> Result<&[i32]> {
        if self.counted != self.listed.len() {
            return Err(Error::Consistency {
                counted: self.counted,
                listed: self.listed.len(),
            });
        }
        Ok(&self.listed)
    }
}

/// Command templates used to enumerate partitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inventory {
    pub count_command: String,
    pub list_command: String,
}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            count_command: DEFAULT_COUNT_COMMAND.to_string(),
            list_command: DEFAULT_LIST_COMMAND.to_string(),
        }
    }
}

impl Inventory {
    pub fn new(count_command: impl Into<String>, list_command: impl Into<String>) -> Self {
        Self {
            count_command: count_command.into(),
            list_command: list_command.into(),
        }
    }

    pub fn live_ids<E: Execute + ?Sized>(
        &self,
        exec: &mut E,
        system: SystemType,
        managed_system: Option<&str>,
    ) -> Result<LiveIds> {
        let scope = system.scope_flag(managed_system);
        let count_command = self.count_command.replace(SCOPE_PLACEHOLDER, &scope);
        let list_command = self.list_command.replace(SCOPE_PLACEHOLDER, &scope);

        let counted = exec.execute_expect_int(&count_command)?;
        let counted = usize::try_from(counted)
            .map_err(|_| Error::parse(format!("negative partition count {counted}")))?;

        let listing = exec.execute(&list_command)?;
        if !listing.success() {
            return Err(Error::parse(format!(
                "partition listing exited with status {}",
                listing.exit_code
            )));
        }
        let listed = parse_id_list(&listing.text())?;
        debug!(counted, listed = listed.len(), "enumerated live partitions");
        Ok(LiveIds { counted, listed })
    }
}

/// One leading integer per line; blank lines are skipped.
pub fn parse_id_list(text: &str) -> Result<Vec<i32>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            parse_leading_int(line)
                .map(|(id, _)| id)
                .ok_or_else(|| Error::parse(format!("not a partition id: '{line}'")))
        })
        .collect()
}
