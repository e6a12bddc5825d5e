//! Rule documents and rule validation

use super::parse_documents;
use crate::error::{DslError, EngineError};
use crate::types::Rule;

pub const MAX_RULE_ID_LEN: usize = 100;
pub const MAX_PRIORITY: u8 = 100;
pub const MAX_COOLDOWN_DAYS: u32 = 30;
pub const MAX_PER_DAY: u32 = 10;

/// Problems found in a rule definition
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("rule id must not be blank")]
    BlankId,

    #[error("rule id is {0} characters long (max 100)")]
    IdTooLong(usize),

    #[error("category must not be blank")]
    BlankCategory,

    #[error("priority {0} is out of range 0-100")]
    PriorityOutOfRange(u8),

    #[error("severity {0} is out of range 1-3")]
    SeverityOutOfRange(u8),

    #[error("cooldown_days {0} is out of range 0-30")]
    CooldownOutOfRange(u32),

    #[error("max_per_day {0} is out of range 0-10")]
    MaxPerDayOutOfRange(u32),

    #[error("rule has no messages")]
    NoMessages,

    #[error("message {0} has blank text")]
    BlankMessage(u32),

    #[error("message {id} has weight {weight} (min 1)")]
    ZeroWeight { id: u32, weight: u32 },

    #[error("invalid logic: {0}")]
    InvalidLogic(DslError),
}

impl Rule {
    /// Every problem with this rule, in field order
    pub fn validation_errors(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let id = self.id.trim();
        if id.is_empty() {
            errors.push(ValidationError::BlankId);
        } else if id.chars().count() > MAX_RULE_ID_LEN {
            errors.push(ValidationError::IdTooLong(id.chars().count()));
        }
        if self.category.trim().is_empty() {
            errors.push(ValidationError::BlankCategory);
        }
        if self.priority > MAX_PRIORITY {
            errors.push(ValidationError::PriorityOutOfRange(self.priority));
        }
        if !(1..=3).contains(&self.severity) {
            errors.push(ValidationError::SeverityOutOfRange(self.severity));
        }
        if self.cooldown_days > MAX_COOLDOWN_DAYS {
            errors.push(ValidationError::CooldownOutOfRange(self.cooldown_days));
        }
        if self.max_per_day > MAX_PER_DAY {
            errors.push(ValidationError::MaxPerDayOutOfRange(self.max_per_day));
        }

        if self.messages.is_empty() {
            errors.push(ValidationError::NoMessages);
        }
        for message in &self.messages {
            if message.text.trim().is_empty() {
                errors.push(ValidationError::BlankMessage(message.id));
            }
            if message.weight < 1 {
                errors.push(ValidationError::ZeroWeight {
                    id: message.id,
                    weight: message.weight,
                });
            }
        }

        if let Err(e) = self.condition() {
            errors.push(ValidationError::InvalidLogic(e));
        }

        errors
    }

    /// First problem with this rule, if any
    pub fn validate(&self) -> Result<(), EngineError> {
        match self.validation_errors().into_iter().next() {
            None => Ok(()),
            Some(e) => Err(EngineError::InvalidRule {
                rule_id: self.id.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Parses rule documents
pub struct RuleLoader;

impl RuleLoader {
    /// Parse a JSON array or NDJSON rule document
    pub fn parse(input: &str) -> Result<Vec<Rule>, EngineError> {
        let rules: Vec<Rule> = parse_documents(input)?;
        tracing::debug!(rules = rules.len(), "parsed rule document");
        Ok(rules)
    }

    /// Parse and reject the document if any rule is invalid
    pub fn parse_valid(input: &str) -> Result<Vec<Rule>, EngineError> {
        let rules = Self::parse(input)?;
        for rule in &rules {
            rule.validate()?;
        }
        Ok(rules)
    }
}
