//! 單一標的的同步狀態機
//!
//! `Pending -> Resolving -> {NoWorkNeeded | Fetching} -> {Stored | NoData | Failed}`，
//! 批次中止或取消時尚未開始的標的直接進入 `Skipped`。

use crate::sync::error::SyncError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Pending,
    Resolving,
    NoWorkNeeded,
    Fetching,
    Stored,
    NoData,
    Failed,
    Skipped,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Pending => "pending",
            SyncPhase::Resolving => "resolving",
            SyncPhase::NoWorkNeeded => "no_work_needed",
            SyncPhase::Fetching => "fetching",
            SyncPhase::Stored => "stored",
            SyncPhase::NoData => "no_data",
            SyncPhase::Failed => "failed",
            SyncPhase::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncPhase::NoWorkNeeded
                | SyncPhase::Stored
                | SyncPhase::NoData
                | SyncPhase::Failed
                | SyncPhase::Skipped
        )
    }

    pub fn can_transition_to(&self, next: SyncPhase) -> bool {
        use SyncPhase::*;
        matches!(
            (self, next),
            (Pending, Resolving)
                | (Pending, Skipped)
                | (Pending, Failed)
                | (Resolving, NoWorkNeeded)
                | (Resolving, Fetching)
                | (Resolving, Failed)
                | (Fetching, Stored)
                | (Fetching, NoData)
                | (Fetching, Failed)
        )
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 追蹤一個標的經過的階段
#[derive(Debug, Clone)]
pub struct InstrumentProgress {
    phase: SyncPhase,
    history: Vec<SyncPhase>,
}

impl Default for InstrumentProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentProgress {
    pub fn new() -> Self {
        Self {
            phase: SyncPhase::Pending,
            history: vec![SyncPhase::Pending],
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn history(&self) -> &[SyncPhase] {
        &self.history
    }

    pub fn advance(&mut self, next: SyncPhase) -> Result<(), SyncError> {
        if !self.phase.can_transition_to(next) {
            return Err(SyncError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        self.history.push(next);
        Ok(())
    }

    /// 以失敗結束；已在終態時維持原狀
    pub fn fail(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = SyncPhase::Failed;
            self.history.push(SyncPhase::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_happy_path() {
        let mut progress = InstrumentProgress::new();
        progress.advance(SyncPhase::Resolving).unwrap();
        progress.advance(SyncPhase::Fetching).unwrap();
        progress.advance(SyncPhase::Stored).unwrap();
        assert!(progress.phase().is_terminal());
        assert_eq!(
            progress.history(),
            &[
                SyncPhase::Pending,
                SyncPhase::Resolving,
                SyncPhase::Fetching,
                SyncPhase::Stored
            ]
        );
    }

    #[test]
    fn test_terminal_states_do_not_move() {
        let mut progress = InstrumentProgress::new();
        progress.advance(SyncPhase::Resolving).unwrap();
        progress.advance(SyncPhase::NoWorkNeeded).unwrap();
        let err = progress.advance(SyncPhase::Fetching).unwrap_err();
        assert_matches!(
            err,
            SyncError::InvalidTransition {
                from: SyncPhase::NoWorkNeeded,
                to: SyncPhase::Fetching
            }
        );
        progress.fail();
        assert_eq!(progress.phase(), SyncPhase::NoWorkNeeded);
    }

    #[test]
    fn test_cannot_skip_resolution() {
        let mut progress = InstrumentProgress::new();
        assert!(progress.advance(SyncPhase::Fetching).is_err());
        progress.fail();
        assert_eq!(progress.phase(), SyncPhase::Failed);
    }
}
