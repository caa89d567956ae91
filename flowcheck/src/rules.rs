//! Typed forwarding-rule schema matching the JSON wire shape reported by
//! the switch's control plane, plus the fetch filter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Ethertype value for IPv4 as it appears in rule matches.
pub const ETH_TYPE_IPV4: u64 = 2048;

/// A match-field or action value as it appears on the wire: small integers
/// for ports, ethertypes and tunnel ids, dotted-decimal strings for
/// addresses. Address comparison is on the canonical string form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(u64),
    Str(String),
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<Ipv4Addr> for FieldValue {
    fn from(value: Ipv4Addr) -> Self {
        FieldValue::Str(value.to_string())
    }
}

/// Action kinds used by the subscriber rule schema. Anything else fails
/// deserialization at the client boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    SetField,
    Output,
    GotoTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub field: String,
    #[serde(rename = "type")]
    pub kind: ActionType,
    pub value: FieldValue,
}

/// One instruction group. The subscriber rule schema only ever populates
/// the first group of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// One forwarding entry as reported by the rule-table source. A field
/// absent from `match_fields` means "don't care".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub table_id: u8,
    pub priority: u16,
    #[serde(rename = "match", default)]
    pub match_fields: BTreeMap<String, FieldValue>,
    #[serde(default)]
    pub instructions: Vec<Instruction>,
}

// The control plane accepts legacy OpenFlow 1.0 field names in filters but
// reports rule matches under OXM names.
fn canonical_field(name: &str) -> &str {
    match name {
        "nw_src" => "ipv4_src",
        "nw_dst" => "ipv4_dst",
        "dl_src" => "eth_src",
        "dl_dst" => "eth_dst",
        "dl_type" => "eth_type",
        "nw_proto" => "ip_proto",
        other => other,
    }
}

/// Restricts a rule-table fetch. Serialized as the request body; the
/// source applies the same superset semantics server side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_id: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
    #[serde(rename = "match", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_fields: BTreeMap<String, FieldValue>,
}

impl FlowFilter {
    /// Restrict to one pipeline stage.
    pub fn table(table_id: u8) -> Self {
        FlowFilter {
            table_id: Some(table_id),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_match(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.match_fields.insert(field.to_string(), value.into());
        self
    }

    /// True if the rule satisfies every restriction in this filter: exact
    /// table/priority, and a rule match mapping that is a superset of the
    /// filter's. Filter keys may use legacy OpenFlow 1.0 names.
    pub fn matches(&self, rule: &Rule) -> bool {
        if self.table_id.is_some_and(|t| t != rule.table_id) {
            return false;
        }
        if self.priority.is_some_and(|p| p != rule.priority) {
            return false;
        }
        self.match_fields
            .iter()
            .all(|(name, value)| rule.match_fields.get(canonical_field(name)) == Some(value))
    }
}
