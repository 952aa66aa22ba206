use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Numeric node identifier (`fit07` is node 7).
pub type NodeId = u32;

/// Why a node was excluded from the rest of a run.
///
/// The discriminants are the ordinals used for report grouping: they are
/// contiguous per report column and must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Reason {
    WontTurnOn = 1,
    WontTurnOff = 2,
    WontReset = 3,
    WontSsh = 4,
    CantCheckImage = 5,
    DidNotLoad = 6,
}

impl Reason {
    pub const ALL: [Reason; 6] = [
        Reason::WontTurnOn,
        Reason::WontTurnOff,
        Reason::WontReset,
        Reason::WontSsh,
        Reason::CantCheckImage,
        Reason::DidNotLoad,
    ];

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// The single place where reasons are grouped into report columns.
    pub fn report_column(self) -> ReportColumn {
        match self {
            Reason::WontTurnOn | Reason::WontTurnOff | Reason::WontReset => ReportColumn::Power,
            Reason::WontSsh | Reason::CantCheckImage => ReportColumn::Load,
            Reason::DidNotLoad => ReportColumn::Image,
        }
    }

    /// Column index (0, 1 or 2) in the outgoing mail.
    pub fn mail_column(self) -> usize {
        self.report_column().index()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Reason::WontTurnOn => "WONT_TURN_ON",
            Reason::WontTurnOff => "WONT_TURN_OFF",
            Reason::WontReset => "WONT_RESET",
            Reason::WontSsh => "WONT_SSH",
            Reason::CantCheckImage => "CANT_CHECK_IMAGE",
            Reason::DidNotLoad => "DID_NOT_LOAD",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three columns of the summary report, left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReportColumn {
    /// Power cycling (on / reset / off).
    Power,
    /// Image load, observed through ssh reachability.
    Load,
    /// Image correctness (the "zombie" column: node up with a stale image).
    Image,
}

impl ReportColumn {
    pub const ALL: [ReportColumn; 3] = [ReportColumn::Power, ReportColumn::Load, ReportColumn::Image];

    pub fn index(self) -> usize {
        match self {
            ReportColumn::Power => 0,
            ReportColumn::Load => 1,
            ReportColumn::Image => 2,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ReportColumn::Power => "start",
            ReportColumn::Load => "load",
            ReportColumn::Image => "zombie",
        }
    }
}

/// Power action sent to a node's control board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerMode {
    On,
    Reset,
    Off,
}

impl PowerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PowerMode::On => "on",
            PowerMode::Reset => "reset",
            PowerMode::Off => "off",
        }
    }

    /// Reason recorded when a node does not honour this action.
    pub fn failure_reason(self) -> Reason {
        match self {
            PowerMode::On => Reason::WontTurnOn,
            PowerMode::Reset => Reason::WontReset,
            PowerMode::Off => Reason::WontTurnOff,
        }
    }

    /// Whether the node is expected to be powered once the action is done.
    pub fn expects_powered(self) -> bool {
        !matches!(self, PowerMode::Off)
    }
}

impl fmt::Display for PowerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "on" => Ok(PowerMode::On),
            "reset" => Ok(PowerMode::Reset),
            "off" => Ok(PowerMode::Off),
            other => Err(format!(
                "invalid power mode: {other} (expected \"on\", \"reset\" or \"off\")"
            )),
        }
    }
}

/// Who holds the testbed lease right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseOwner {
    /// No lease is active.
    Nobody,
    /// The active lease belongs to our designated principal.
    Us,
    /// Somebody else holds the testbed; carries their principal.
    Other(String),
}

/// How per-node failures affect the overall run status.
///
/// - `Succeed`: a run that went through all phases is a success, whatever
///   ended up in the failure map (default, matches historical behaviour).
/// - `Fail`: a run with at least one excluded node reports failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeFailurePolicy {
    Succeed,
    Fail,
}

impl Default for NodeFailurePolicy {
    fn default() -> Self {
        NodeFailurePolicy::Succeed
    }
}

impl FromStr for NodeFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "succeed" => Ok(NodeFailurePolicy::Succeed),
            "fail" => Ok(NodeFailurePolicy::Fail),
            other => Err(format!(
                "invalid on_node_failure: {other} (expected \"succeed\" or \"fail\")"
            )),
        }
    }
}
