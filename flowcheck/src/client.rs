//! Read-only client for the switch's REST rule-table interface.

use crate::rules::{FlowFilter, Rule};
use slog::{Logger, debug, o};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("rule-table request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rule-table source returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("rule-table source reports no switches")]
    NoSwitch,
    #[error("malformed rule-table response: {0}")]
    Malformed(String),
}

/// Datapath id of one switch instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwitchHandle(pub u64);

impl fmt::Display for SwitchHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

pub struct RuleTableClient {
    http: reqwest::blocking::Client,
    base_url: String,
    logger: Logger,
}

impl RuleTableClient {
    pub fn new(base_url: &str, logger: &Logger) -> Result<Self, TransportError> {
        Ok(RuleTableClient {
            http: reqwest::blocking::Client::builder().build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            logger: logger.new(o!("rule-table" => 1)),
        })
    }

    /// First switch reported by the source.
    pub fn discover_switch(&self) -> Result<SwitchHandle, TransportError> {
        let response = self
            .http
            .get(format!("{}/stats/switches", self.base_url))
            .send()?;
        if !response.status().is_success() {
            return Err(TransportError::Status(response.status()));
        }
        let dpids: Vec<u64> = response.json()?;
        let dpid = *dpids.first().ok_or(TransportError::NoSwitch)?;
        debug!(self.logger, "Discovered switch {dpid}");
        Ok(SwitchHandle(dpid))
    }

    /// One fetch of the rules matching `filter` on `switch`. The result
    /// order is whatever the source reports and is not stable across
    /// calls. Failures are not retried here.
    pub fn fetch(
        &self,
        switch: SwitchHandle,
        filter: &FlowFilter,
    ) -> Result<Vec<Rule>, TransportError> {
        let response = self
            .http
            .post(format!("{}/stats/flow/{switch}", self.base_url))
            .json(filter)
            .send()?;
        if !response.status().is_success() {
            return Err(TransportError::Status(response.status()));
        }
        let mut by_switch: HashMap<String, Vec<Rule>> = response.json()?;
        let rules = by_switch.remove(&switch.to_string()).ok_or_else(|| {
            TransportError::Malformed(format!("response has no entry for switch {switch}"))
        })?;
        debug!(self.logger, "Fetched {} rule(s)", rules.len(); "filter" => ?filter);
        Ok(rules)
    }
}
