//! Transformer composition: many rules → one flat record.
//!
//! [`RuleSet`] is the shared composition contract. It works over any
//! [`Rule`] type, so JSON rules ([`ExtractionRule`]) and document rules
//! (CSS selectors, in the `shelf` crate) compose the same way:
//!
//! - output keys are unique, checked once when the set is built;
//! - every rule is applied, even when earlier ones resolve to `null`;
//! - the result holds exactly the set's output keys, in rule order.
//!
//! [`Transformer`] is the capability the ingestion step holds. One
//! implementation exists per source type.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::ExtractionError;
use crate::extract::ExtractionRule;
use crate::models::{FlatRecord, RawRecord};

/// A single declarative field rule over some input shape.
pub trait Rule {
    type Input: ?Sized;

    fn output_key(&self) -> &str;

    fn evaluate(&self, input: &Self::Input) -> Result<Value, ExtractionError>;
}

impl Rule for ExtractionRule {
    type Input = Value;

    fn output_key(&self) -> &str {
        &self.output_key
    }

    fn evaluate(&self, input: &Value) -> Result<Value, ExtractionError> {
        ExtractionRule::evaluate(self, input)
    }
}

/// An ordered table of rules with unique output keys.
#[derive(Debug, Clone)]
pub struct RuleSet<R> {
    rules: Vec<R>,
}

impl<R: Rule> RuleSet<R> {
    pub fn new(rules: Vec<R>) -> Result<Self, ExtractionError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.output_key().to_string()) {
                return Err(ExtractionError::DuplicateKey(rule.output_key().to_string()));
            }
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[R] {
        &self.rules
    }

    pub fn output_keys(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.output_key().to_string()).collect()
    }

    /// Apply every rule. The first rule error aborts the record.
    pub fn apply(&self, input: &R::Input) -> Result<FlatRecord, ExtractionError> {
        let mut out = FlatRecord::new();
        for rule in &self.rules {
            out.insert(rule.output_key().to_string(), rule.evaluate(input)?);
        }
        Ok(out)
    }
}

/// Converts one raw record of a given source type into a [`FlatRecord`].
pub trait Transformer: Send + Sync {
    /// Source type this transformer reads (e.g. `"product_api"`).
    fn name(&self) -> &str;

    /// The exact key set of every record this transformer returns.
    fn output_keys(&self) -> Vec<String>;

    fn transform(&self, raw: &RawRecord) -> Result<FlatRecord, ExtractionError>;
}

/// A transformer over JSON records driven entirely by a rule table.
#[derive(Debug, Clone)]
pub struct JsonTransformer {
    name: String,
    rules: RuleSet<ExtractionRule>,
}

impl JsonTransformer {
    pub fn new(name: &str, rules: Vec<ExtractionRule>) -> Result<Self, ExtractionError> {
        Ok(Self {
            name: name.to_string(),
            rules: RuleSet::new(rules)?,
        })
    }

    pub fn rules(&self) -> &[ExtractionRule] {
        self.rules.rules()
    }
}

impl Transformer for JsonTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_keys(&self) -> Vec<String> {
        self.rules.output_keys()
    }

    fn transform(&self, raw: &RawRecord) -> Result<FlatRecord, ExtractionError> {
        match raw {
            RawRecord::Json(value) => self.rules.apply(value),
            other => Err(ExtractionError::WrongShape {
                transformer: self.name.clone(),
                found: other.kind(),
            }),
        }
    }
}
