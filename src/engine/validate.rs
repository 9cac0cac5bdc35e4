//! Deny-list validation of generated source.
//!
//! This is a textual scan, not an analysis: each rule is a regex plus the
//! message reported when it matches. It is advisory and makes no promise
//! about code it does not flag.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::engine::ValidationResult;

/// Rules applied when `validation.rules` is absent from config.yaml.
pub const DEFAULT_RULES: &[(&str, &str)] = &[
    (r"\bos\.system\s*\(", "disallowed call: os.system"),
    (
        r"\bos\.(popen|fork|exec\w*|spawn\w*)\s*\(",
        "disallowed call: os process control",
    ),
    (r"\bsubprocess\b", "disallowed module: subprocess"),
    (r"(?m)(^|[^\w.])eval\s*\(", "disallowed call: eval"),
    (r"(?m)(^|[^\w.])exec\s*\(", "disallowed call: exec"),
    (r"\b__import__\s*\(", "disallowed call: __import__"),
    (
        r"\bos\.(remove|unlink|rmdir|removedirs)\s*\(",
        "disallowed call: os file deletion",
    ),
    (r"\bshutil\.rmtree\s*\(", "disallowed call: shutil.rmtree"),
    (r"\bctypes\b", "disallowed module: ctypes"),
    (r"\bpty\.spawn\s*\(", "disallowed call: pty.spawn"),
];

/// One deny-list entry as written in config.yaml.
///
/// validation:
///   rules:
///     - pattern: '\bos\.system\s*\('
///       message: "disallowed call: os.system"
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleConfig {
    pub pattern: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pattern: Regex,
    message: String,
}

impl Rule {
    pub fn new(pattern: &str, message: impl Into<String>) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .with_context(|| format!("Invalid deny-list pattern: {}", pattern))?;

        Ok(Self {
            pattern,
            message: message.into(),
        })
    }

    pub fn matches(&self, code: &str) -> bool {
        self.pattern.is_match(code)
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Ordered set of rules. Issues are reported in this order.
#[derive(Debug, Clone)]
pub struct DenyList {
    rules: Vec<Rule>,
}

impl DenyList {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn from_config(rules: &[RuleConfig]) -> Result<Self> {
        let rules = rules
            .iter()
            .enumerate()
            .map(|(idx, r)| {
                Rule::new(&r.pattern, r.message.clone())
                    .with_context(|| format!("validation.rules[{}]", idx))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(rules))
    }

    pub fn defaults() -> Result<Self> {
        let rules = DEFAULT_RULES
            .iter()
            .map(|(pattern, message)| Rule::new(pattern, *message))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(rules))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Validator {
    deny_list: DenyList,
}

impl Validator {
    pub fn new(deny_list: DenyList) -> Self {
        Self { deny_list }
    }

    /// Scan `code` against every rule. Each rule contributes at most one issue.
    pub fn validate(&self, code: &str) -> ValidationResult {
        let mut result = ValidationResult::ok();

        for rule in &self.deny_list.rules {
            if rule.matches(code) {
                tracing::debug!(issue = rule.message(), "deny-list rule matched");
                result.push_issue(rule.message());
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> Validator {
        Validator::new(DenyList::defaults().unwrap())
    }

    #[test]
    fn defaults_compile() {
        let list = DenyList::defaults().unwrap();
        assert_eq!(list.len(), DEFAULT_RULES.len());
    }

    #[test]
    fn clean_code_is_valid() {
        let result = validator().validate("print(\"hello\")\n");
        assert!(result.valid);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn os_system_reports_single_issue() {
        let result = validator().validate("import os; os.system(\"rm -rf /\")");
        assert!(!result.valid);
        assert_eq!(result.issues, vec!["disallowed call: os.system".to_string()]);
    }

    #[test]
    fn issues_follow_rule_order() {
        let code = "x = exec('1')\ny = eval('2')\nimport subprocess\n";
        let result = validator().validate(code);
        assert_eq!(
            result.issues,
            vec![
                "disallowed module: subprocess".to_string(),
                "disallowed call: eval".to_string(),
                "disallowed call: exec".to_string(),
            ]
        );
    }

    #[test]
    fn method_named_eval_is_not_flagged() {
        let result = validator().validate("model.eval()\nliteral_eval_value = 3\n");
        assert!(result.valid, "unexpected issues: {:?}", result.issues);
    }

    #[test]
    fn eval_at_line_start_is_flagged() {
        let result = validator().validate("x = 1\neval('x')\n");
        assert_eq!(result.issues, vec!["disallowed call: eval".to_string()]);
    }

    #[test]
    fn file_deletion_is_flagged() {
        let result = validator().validate("import shutil\nshutil.rmtree('/tmp/x')\n");
        assert_eq!(result.issues, vec!["disallowed call: shutil.rmtree".to_string()]);

        let result = validator().validate("import os\nos.remove('a.txt')\n");
        assert_eq!(
            result.issues,
            vec!["disallowed call: os file deletion".to_string()]
        );
    }

    #[test]
    fn configured_rules_replace_defaults() {
        let list = DenyList::from_config(&[RuleConfig {
            pattern: r"\bsocket\b".to_string(),
            message: "disallowed module: socket".to_string(),
        }])
        .unwrap();
        let v = Validator::new(list);

        assert!(v.validate("import os; os.system('ls')").valid);
        assert_eq!(
            v.validate("import socket").issues,
            vec!["disallowed module: socket".to_string()]
        );
    }

    #[test]
    fn invalid_rule_names_its_index() {
        let err = DenyList::from_config(&[
            RuleConfig {
                pattern: "ok".to_string(),
                message: "ok".to_string(),
            },
            RuleConfig {
                pattern: "(unclosed".to_string(),
                message: "broken".to_string(),
            },
        ])
        .unwrap_err();

        assert!(format!("{:#}", err).contains("validation.rules[1]"));
    }

    #[test]
    fn empty_deny_list_accepts_everything() {
        let v = Validator::new(DenyList::new(Vec::new()));
        assert!(v.validate("import os; os.system('ls')").valid);
    }
}
