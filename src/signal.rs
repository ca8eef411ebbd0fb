//! Signal-driven cancellation.
//!
//! Two independent OS signals (SIGINT, SIGHUP) are each mapped to a
//! [`SignalAction`] policy chosen on the command line. Delivery only sets
//! an atomic flag; [`SignalBridge::check`] translates pending flags into a
//! [`CancellationRequest`] when the solver polls at an iteration boundary.
//! Nothing is ever acted on inside the handler itself.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::engine::{CancellationPoll, CancellationRequest};
use crate::error::Result;

/// Policy for one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalAction {
    /// Halt at the next iteration boundary.
    #[default]
    Stop,
    /// Persist a checkpoint at the next iteration boundary, then halt.
    Snapshot,
    /// Ignore the signal.
    None,
}

impl FromStr for SignalAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "stop" => Ok(Self::Stop),
            "snapshot" => Ok(Self::Snapshot),
            "none" => Ok(Self::None),
            _ => Err(format!(
                "Unknown signal action '{s}'. Valid actions: stop, snapshot, none"
            )),
        }
    }
}

impl SignalAction {
    fn request(self) -> CancellationRequest {
        match self {
            Self::Stop => CancellationRequest::Stop,
            Self::Snapshot => CancellationRequest::SnapshotAndStop,
            Self::None => CancellationRequest::None,
        }
    }
}

/// Bridges asynchronous signal delivery to the cooperative poll.
pub struct SignalBridge {
    sigint: Pending,
    sighup: Pending,
}

struct Pending {
    flag: Arc<AtomicBool>,
    action: SignalAction,
}

impl Pending {
    /// Consume the flag if set. One signal, one request.
    fn take(&self) -> Option<CancellationRequest> {
        if self.flag.swap(false, Ordering::AcqRel) {
            Some(self.action.request())
        } else {
            None
        }
    }
}

impl SignalBridge {
    /// Install OS handlers for both signals. Signals whose policy is
    /// `none` are left at their default disposition.
    pub fn install(sigint: SignalAction, sighup: SignalAction) -> Result<Self> {
        let bridge = Self::with_flags(
            Arc::new(AtomicBool::new(false)),
            sigint,
            Arc::new(AtomicBool::new(false)),
            sighup,
        );
        if sigint != SignalAction::None {
            signal_hook::flag::register(signal_hook::consts::SIGINT, bridge.sigint.flag.clone())?;
        }
        if sighup != SignalAction::None {
            signal_hook::flag::register(signal_hook::consts::SIGHUP, bridge.sighup.flag.clone())?;
        }
        Ok(bridge)
    }

    /// Build from caller-owned flags without touching OS signal state.
    /// Production goes through [`SignalBridge::install`]; tests set the
    /// flags directly.
    pub fn with_flags(
        sigint_flag: Arc<AtomicBool>,
        sigint: SignalAction,
        sighup_flag: Arc<AtomicBool>,
        sighup: SignalAction,
    ) -> Self {
        Self {
            sigint: Pending {
                flag: sigint_flag,
                action: sigint,
            },
            sighup: Pending {
                flag: sighup_flag,
                action: sighup,
            },
        }
    }

    /// Translate pending signals into a request. SIGHUP is consulted
    /// before SIGINT when both are pending; each pending flag is consumed
    /// exactly once.
    pub fn check(&self) -> CancellationRequest {
        if let Some(request) = self.sighup.take() {
            return request;
        }
        if let Some(request) = self.sigint.take() {
            return request;
        }
        CancellationRequest::None
    }

    /// Package the bridge as the poll the solver calls at iteration
    /// boundaries.
    pub fn into_poll(self) -> CancellationPoll {
        Box::new(move || self.check())
    }
}
