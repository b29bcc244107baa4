// Copyright 2025 Cowboy AI, LLC.

//! Identity of the processor function that emitted a signal

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// `{context, processor, function}` triple naming a pipeline participant
///
/// Used both as the identity carried by a signal and as a wait filter, where
/// an empty field is a wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FunctionInfo {
    /// Bounded context of the processor
    pub context_name: String,
    /// Processor name, e.g. a projection or saga type
    pub processor_name: String,
    /// Function name inside the processor
    pub name: String,
}

impl FunctionInfo {
    /// Create a fully named function
    pub fn new(
        context_name: impl Into<String>,
        processor_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            context_name: context_name.into(),
            processor_name: processor_name.into(),
            name: name.into(),
        }
    }

    /// Filter matching any function
    pub fn any() -> Self {
        Self::default()
    }

    /// Filter matching every function of a context
    pub fn context(context_name: impl Into<String>) -> Self {
        Self::new(context_name, "", "")
    }

    /// Filter matching every function of a processor
    pub fn processor(context_name: impl Into<String>, processor_name: impl Into<String>) -> Self {
        Self::new(context_name, processor_name, "")
    }

    /// Whether every field is a wildcard
    pub fn is_any(&self) -> bool {
        self.context_name.is_empty() && self.processor_name.is_empty() && self.name.is_empty()
    }

    /// Whether `function` satisfies this filter
    pub fn matches(&self, function: &FunctionInfo) -> bool {
        fn field(filter: &str, value: &str) -> bool {
            filter.is_empty() || filter == value
        }
        field(&self.context_name, &function.context_name)
            && field(&self.processor_name, &function.processor_name)
            && field(&self.name, &function.name)
    }
}

impl Display for FunctionInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.context_name, self.processor_name, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_matching() {
        let emitted = FunctionInfo::new("sales", "OrderSummary", "on_created");

        assert!(FunctionInfo::any().matches(&emitted));
        assert!(FunctionInfo::context("sales").matches(&emitted));
        assert!(FunctionInfo::processor("sales", "OrderSummary").matches(&emitted));
        assert!(emitted.matches(&emitted));

        assert!(!FunctionInfo::context("billing").matches(&emitted));
        assert!(!FunctionInfo::new("sales", "OrderSummary", "on_paid").matches(&emitted));
    }

    #[test]
    fn test_is_any() {
        assert!(FunctionInfo::any().is_any());
        assert!(!FunctionInfo::context("sales").is_any());
    }
}
