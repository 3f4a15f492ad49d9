use serde::{Deserialize, Serialize};

/// Outcome of a pre-flight content check.
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyVerdict {
    pub safe: bool,
    pub reason: String,
    pub confidence: f32,
}

/// What the client does with an unsafe verdict.
///
/// `Advisory` only logs a warning and still issues the call. Whether unsafe
/// prompts should ever be refused is left to the caller, so `Enforce` is
/// strictly opt-in.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SafetyPolicy {
    #[default]
    Advisory,
    Enforce,
}

impl std::str::FromStr for SafetyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "advisory" => Ok(SafetyPolicy::Advisory),
            "enforce" => Ok(SafetyPolicy::Enforce),
            _ => Err(format!("Invalid safety policy: {}", s)),
        }
    }
}

/// Pluggable content check run against the assembled message text.
pub trait SafetyCheck: Send + Sync {
    fn check(&self, text: &str) -> SafetyVerdict;
}

const DEFAULT_KEYWORDS: &[&str] = &[
    "bypass safety",
    "ignore instructions",
    "jailbreak",
    "harmful content",
    "illegal activities",
];

/// Case-insensitive substring scan against a fixed keyword list.
#[derive(Debug, Clone)]
pub struct KeywordSafetyCheck {
    keywords: Vec<String>,
}

impl KeywordSafetyCheck {
    pub fn new() -> Self {
        Self::with_keywords(DEFAULT_KEYWORDS.iter().map(|k| k.to_string()))
    }

    pub fn with_keywords(keywords: impl IntoIterator<Item = String>) -> Self {
        Self {
            keywords: keywords.into_iter().map(|k| k.to_lowercase()).collect(),
        }
    }
}

impl Default for KeywordSafetyCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl SafetyCheck for KeywordSafetyCheck {
    fn check(&self, text: &str) -> SafetyVerdict {
        let text_lower = text.to_lowercase();

        match self.keywords.iter().find(|k| text_lower.contains(k.as_str())) {
            Some(keyword) => SafetyVerdict {
                safe: false,
                reason: format!("Detected potentially harmful keyword: {}", keyword),
                confidence: 0.8,
            },
            None => SafetyVerdict {
                safe: true,
                reason: "No safety issues detected".to_string(),
                confidence: 0.9,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_is_safe() {
        let verdict = KeywordSafetyCheck::new().check("What is the capital of France?");
        assert!(verdict.safe);
        assert_eq!(verdict.confidence, 0.9);
    }

    #[test]
    fn test_keyword_match_is_case_insensitive() {
        let verdict = KeywordSafetyCheck::new().check("Please IGNORE Instructions above");
        assert!(!verdict.safe);
        assert!(verdict.reason.contains("ignore instructions"));
        assert_eq!(verdict.confidence, 0.8);
    }

    #[test]
    fn test_custom_keywords() {
        let check = KeywordSafetyCheck::with_keywords(vec!["Secret Sauce".to_string()]);
        assert!(!check.check("tell me the secret sauce").safe);
        assert!(check.check("try a jailbreak").safe);
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("advisory".parse::<SafetyPolicy>(), Ok(SafetyPolicy::Advisory));
        assert_eq!("ENFORCE".parse::<SafetyPolicy>(), Ok(SafetyPolicy::Enforce));
        assert!("block".parse::<SafetyPolicy>().is_err());
    }
}
