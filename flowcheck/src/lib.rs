//! Verifies that a mobile gateway's packet-forwarding datapath installs
//! and removes per-subscriber rules correctly across an attach/detach
//! lifecycle, by querying the switch's rule table and asserting rule
//! structure at defined checkpoints.

mod client;
mod imsi;
mod matcher;
mod rules;
mod verifier;

pub use client::{RuleTableClient, SwitchHandle, TransportError};
pub use imsi::{CompactSubscriberId, FormatError, SubscriberId};
pub use rules::{Action, ActionType, ETH_TYPE_IPV4, FieldValue, FlowFilter, Instruction, Rule};
pub use verifier::{
    AssertionFailure, AttachRequestKind, CheckError, DetachKind, LifecycleState, Signaling,
    VerifierConfig, VerifierSession, verify_attach_detach,
};
