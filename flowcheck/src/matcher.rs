//! Structural predicates over a fetched rule. Every operation is total:
//! missing fields and actions come back as false/None, never an error, so
//! callers can compose boolean assertions.

use crate::rules::{Action, ActionType, FieldValue, Rule};

impl Rule {
    pub fn has_match_field(&self, field: &str) -> bool {
        self.match_fields.contains_key(field)
    }

    pub fn match_field(&self, field: &str) -> Option<&FieldValue> {
        self.match_fields.get(field)
    }

    /// Exact equality against the wire value; address fields compare on
    /// their canonical string form.
    pub fn field_equals(&self, field: &str, expected: &FieldValue) -> bool {
        self.match_fields.get(field) == Some(expected)
    }

    /// First action in the first instruction group satisfying the
    /// predicate. Later instruction groups are outside the subscriber rule
    /// schema and are deliberately not scanned.
    pub fn find_action(&self, mut predicate: impl FnMut(&Action) -> bool) -> Option<&Action> {
        self.instructions.first()?.actions.iter().find(|a| predicate(a))
    }

    pub fn has_action(&self, field: &str, kind: ActionType) -> bool {
        self.find_action(|a| a.field == field && a.kind == kind)
            .is_some()
    }
}
