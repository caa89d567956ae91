//! End-to-end lifecycle verification: sample the rule table at defined
//! checkpoints around a subscriber attach/detach transition and assert the
//! per-subscriber rule invariants.

use crate::client::{RuleTableClient, SwitchHandle, TransportError};
use crate::imsi::{CompactSubscriberId, FormatError, SubscriberId};
use crate::rules::{ActionType, ETH_TYPE_IPV4, FieldValue, FlowFilter, Rule};
use slog::{Logger, info, o};
use std::net::Ipv4Addr;
use thiserror::Error;

/// An expected rule-table invariant that did not hold. Each variant
/// carries the expected and observed values for diagnosis.
#[derive(Debug, Error)]
pub enum AssertionFailure {
    #[error("expected {expected} rule(s) matching {filter}, found {actual}")]
    RuleCount {
        filter: String,
        expected: usize,
        actual: usize,
    },
    #[error("rule has no match on {field}")]
    MissingMatchField { field: String },
    #[error("rule match {field} is {actual:?}, expected {expected:?}")]
    FieldMismatch {
        field: String,
        expected: FieldValue,
        actual: Option<FieldValue>,
    },
    #[error("rule has no {kind:?} action on {field}")]
    MissingAction { field: String, kind: ActionType },
    #[error("metadata action value {0:?} is not an integer")]
    NonNumericMetadata(FieldValue),
    #[error("rule metadata decodes to {actual}, expected {expected}")]
    SubscriberMismatch {
        expected: SubscriberId,
        actual: SubscriberId,
    },
}

/// Any way a lifecycle check can fail. The first failure aborts the
/// remaining checkpoints; signaling errors pass through unchanged.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Assertion(#[from] AssertionFailure),
    #[error("signaling procedure failed: {0}")]
    Signaling(#[source] anyhow::Error),
}

/// How an attach is requested from the signaling stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachRequestKind {
    /// Full end-to-end attach, blocking until the attach-accept indication.
    EndToEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachKind {
    Normal,
    SwitchOff,
}

/// The external signaling stack that drives attach/detach procedures. The
/// verifier never drives signaling itself - it only samples rule-table
/// state between these calls. Errors (timeouts, rejects) are the stack's
/// own and propagate unchanged.
pub trait Signaling {
    /// Trigger an attach and block until the accept indication, or until
    /// the stack's own timeout fires.
    fn attach(&mut self, ue_id: u32, kind: AttachRequestKind) -> anyhow::Result<()>;

    /// Trigger a detach. `wait_for_completion` blocks until the stack has
    /// seen the procedure through.
    fn detach(&mut self, ue_id: u32, kind: DetachKind, wait_for_completion: bool)
    -> anyhow::Result<()>;

    /// Address allocated to the subscriber's data session.
    fn ue_ip(&self, ue_id: u32) -> anyhow::Result<Ipv4Addr>;
}

/// Where the subscriber is in the attach/detach lifecycle. Transitions are
/// driven entirely by the signaling collaborator; the verifier tracks this
/// only to label its checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Attaching,
    Attached,
    Detaching,
}

/// Pipeline constants for the datapath under test.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    // Pipeline stage holding the subscriber uplink/downlink rules.
    pub table_id: u8,
    // OpenFlow port the GTP tunnel interface is attached to.
    pub gtp_port: u32,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        VerifierConfig {
            table_id: 0,
            gtp_port: 32768,
        }
    }
}

/// A verification session against one switch. Construct it explicitly,
/// pass it by reference into checks and drop it when done - there is no
/// ambient fixture state.
///
/// Each checkpoint samples the rule table with a single fetch immediately
/// after the signaling trigger, assuming the forwarding engine has already
/// applied the change. A count mismatch is a hard failure, never a retry.
pub struct VerifierSession {
    client: RuleTableClient,
    switch: SwitchHandle,
    config: VerifierConfig,
    logger: Logger,
}

impl VerifierSession {
    /// Connect to the rule-table source and bind to the first switch it
    /// reports.
    pub fn connect(
        base_url: &str,
        config: VerifierConfig,
        logger: &Logger,
    ) -> Result<Self, CheckError> {
        let logger = logger.new(o!("verifier" => 1));
        let client = RuleTableClient::new(base_url, &logger)?;
        let switch = client.discover_switch()?;
        info!(logger, "Verifying switch {switch}"; "table" => config.table_id);
        Ok(VerifierSession {
            client,
            switch,
            config,
            logger,
        })
    }

    pub fn switch(&self) -> SwitchHandle {
        self.switch
    }

    pub fn fetch(&self, filter: &FlowFilter) -> Result<Vec<Rule>, TransportError> {
        self.client.fetch(self.switch, filter)
    }

    /// Exactly one default (priority 0) rule in the subscriber table and
    /// no subscriber uplink/downlink rules.
    pub fn check_baseline(&self) -> Result<(), CheckError> {
        info!(self.logger, "Checking for default table {} rule", self.config.table_id);
        let default_filter = FlowFilter::table(self.config.table_id).with_priority(0);
        self.expect_rule_count(&default_filter, 1)?;
        self.expect_rule_count(&self.uplink_filter(), 0)?;
        Ok(())
    }

    /// Exactly one uplink rule on the GTP ingress port, matching on a
    /// tunnel id and stamping the subscriber's compact id into metadata.
    pub fn check_uplink(&self, imsi: &SubscriberId) -> Result<(), CheckError> {
        info!(self.logger, "Checking for uplink rule"; "imsi" => %imsi);
        let rules = self.expect_rule_count(&self.uplink_filter(), 1)?;
        let rule = &rules[0];
        if !rule.has_match_field("tunnel_id") {
            return Err(AssertionFailure::MissingMatchField {
                field: "tunnel_id".to_string(),
            }
            .into());
        }
        check_subscriber_metadata(rule, imsi)
    }

    /// Exactly one downlink rule for the subscriber's allocated address,
    /// carrying a tunnel-id SET_FIELD action and the same compact id in
    /// metadata.
    pub fn check_downlink(&self, imsi: &SubscriberId, ue_ip: Ipv4Addr) -> Result<(), CheckError> {
        info!(self.logger, "Checking for downlink rule"; "imsi" => %imsi, "ue_ip" => %ue_ip);
        let rules = self.expect_rule_count(&self.downlink_filter(ue_ip), 1)?;
        let rule = &rules[0];
        let expected = FieldValue::from(ue_ip);
        if !rule.field_equals("ipv4_dst", &expected) {
            return Err(AssertionFailure::FieldMismatch {
                field: "ipv4_dst".to_string(),
                expected,
                actual: rule.match_field("ipv4_dst").cloned(),
            }
            .into());
        }
        if !rule.has_action("tunnel_id", ActionType::SetField) {
            return Err(AssertionFailure::MissingAction {
                field: "tunnel_id".to_string(),
                kind: ActionType::SetField,
            }
            .into());
        }
        check_subscriber_metadata(rule, imsi)
    }

    fn uplink_filter(&self) -> FlowFilter {
        FlowFilter::table(self.config.table_id)
            .with_match("in_port", u64::from(self.config.gtp_port))
    }

    fn downlink_filter(&self, ue_ip: Ipv4Addr) -> FlowFilter {
        FlowFilter::table(self.config.table_id)
            .with_match("nw_dst", ue_ip)
            .with_match("eth_type", ETH_TYPE_IPV4)
    }

    fn expect_rule_count(
        &self,
        filter: &FlowFilter,
        expected: usize,
    ) -> Result<Vec<Rule>, CheckError> {
        let rules = self.fetch(filter)?;
        if rules.len() != expected {
            return Err(AssertionFailure::RuleCount {
                filter: format!("{filter:?}"),
                expected,
                actual: rules.len(),
            }
            .into());
        }
        Ok(rules)
    }

    fn enter(&self, state: LifecycleState) {
        info!(self.logger, "Lifecycle state"; "state" => ?state);
    }
}

/// The metadata action must decode back to the subscriber that attached.
fn check_subscriber_metadata(rule: &Rule, imsi: &SubscriberId) -> Result<(), CheckError> {
    let Some(action) = rule.find_action(|a| a.field == "metadata") else {
        return Err(AssertionFailure::MissingAction {
            field: "metadata".to_string(),
            kind: ActionType::SetField,
        }
        .into());
    };
    let FieldValue::Int(value) = &action.value else {
        return Err(AssertionFailure::NonNumericMetadata(action.value.clone()).into());
    };
    let decoded = CompactSubscriberId::from(*value).decode()?;
    if decoded != *imsi {
        return Err(AssertionFailure::SubscriberMismatch {
            expected: imsi.clone(),
            actual: decoded,
        }
        .into());
    }
    Ok(())
}

/// Run the full checkpoint table around one attach/detach cycle, stopping
/// at the first failing checkpoint.
pub fn verify_attach_detach<S: Signaling>(
    session: &VerifierSession,
    signaling: &mut S,
    ue_id: u32,
    imsi: &SubscriberId,
) -> Result<(), CheckError> {
    session.enter(LifecycleState::Idle);
    session.check_baseline()?;

    session.enter(LifecycleState::Attaching);
    signaling
        .attach(ue_id, AttachRequestKind::EndToEnd)
        .map_err(CheckError::Signaling)?;

    session.enter(LifecycleState::Attached);
    session.check_uplink(imsi)?;
    let ue_ip = signaling.ue_ip(ue_id).map_err(CheckError::Signaling)?;
    session.check_downlink(imsi, ue_ip)?;

    session.enter(LifecycleState::Detaching);
    signaling
        .detach(ue_id, DetachKind::Normal, true)
        .map_err(CheckError::Signaling)?;

    session.enter(LifecycleState::Idle);
    session.check_baseline()
}
