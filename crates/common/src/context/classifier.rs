//! Query Classifier - decides between generalist retrieval and the specialist path
//!
//! Classification is an ordered rule table evaluated top to bottom; the first
//! rule that produces evidence decides the route. Stages:
//! - Keyword containment against curated domain terms
//! - Token extraction (alphanumeric runs of 2-8 chars, stop words removed)
//! - Code-shape matching on the extracted tokens
//! - Verification of shaped tokens against the lookup table
//! - Role + access context heuristic for unverified mixed-shape tokens
//!
//! The only I/O is the read-only key check against the lookup table.

use super::lookup::EntityLookup;
use crate::config::ClassifierConfig;
use crate::errors::{AppError, Result};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Terms that route straight to the specialist path
pub const DEFAULT_DOMAIN_TERMS: &[&str] = &[
    "transaction code",
    "tcode",
    "t-code",
    "authorization object",
    "auth object",
    "pfcg",
    "composite role",
    "derived role",
    "segregation of duties",
    "sod conflict",
];

/// Role or position vocabulary
pub const DEFAULT_ROLE_TERMS: &[&str] = &[
    "role", "roles", "position", "job", "manager", "clerk", "accountant", "buyer", "approver",
];

/// Access or permission vocabulary
pub const DEFAULT_ACCESS_TERMS: &[&str] = &[
    "access",
    "permission",
    "permissions",
    "authorization",
    "authorisation",
    "privilege",
    "privileges",
    "rights",
    "grant",
];

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "in", "on", "at", "to", "for",
    "of", "with", "by", "from", "and", "or", "but", "not", "this", "that", "these", "those", "it",
    "its", "as", "do", "does", "did", "has", "have", "had", "can", "could", "will", "would",
    "should", "may", "might", "what", "which", "who", "how", "why", "when", "where", "i", "me",
    "my", "we", "our", "you", "your", "please", "need", "want", "get", "about", "into",
];

/// Fixed code shapes a candidate token may take
const CODE_SHAPES: &[(&str, &str)] = &[
    // SY01, FI10
    ("two_letters_two_digits", r"^[A-Za-z]{2}[0-9]{2}$"),
    // SU1, PFCG01, MM0100
    ("letters_then_digits", r"^[A-Za-z]{2,4}[0-9]{1,4}$"),
    // ME21N, VA01X
    ("letters_digits_suffix", r"^[A-Za-z]{2,4}[0-9]{1,3}[A-Za-z]$"),
];

const MIN_TOKEN_LEN: usize = 2;
const MAX_TOKEN_LEN: usize = 8;

/// Route label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Aggregated unstructured retrieval
    Generalist,
    /// Structured exact lookup
    Specialist,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Generalist => "generalist",
            Route::Specialist => "specialist",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn score(&self) -> f32 {
        match self {
            Confidence::Low => 0.3,
            Confidence::Medium => 0.6,
            Confidence::High => 0.9,
        }
    }
}

/// How a rule looks for evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    /// Case-insensitive substring match on domain terms
    DomainKeyword,
    /// Tokens matching a code shape
    CodeShape,
    /// Role term + access term + a mixed letter/digit token
    RoleAccessContext,
}

/// One row of the rule table
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub matcher: Matcher,
    /// Evidence must exist as a lookup key to count
    pub requires_verification: bool,
    pub confidence: Confidence,
}

/// Evaluated top to bottom, first match wins
pub const RULES: &[Rule] = &[
    Rule {
        name: "domain_keyword",
        matcher: Matcher::DomainKeyword,
        requires_verification: false,
        confidence: Confidence::High,
    },
    Rule {
        name: "verified_code",
        matcher: Matcher::CodeShape,
        requires_verification: true,
        confidence: Confidence::High,
    },
    Rule {
        name: "role_access_context",
        matcher: Matcher::RoleAccessContext,
        requires_verification: false,
        confidence: Confidence::Medium,
    },
];

/// Classifier output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub route: Route,
    pub confidence: Confidence,

    /// Matched evidence of the deciding rule, in query order
    pub evidence: Vec<String>,

    /// Deciding rule; None for the generalist default
    pub rule: Option<String>,

    /// Shaped tokens verified against the lookup table, upper-cased
    pub verified_codes: Vec<String>,
}

/// Everything the rules look at, computed once per query
struct QueryAnalysis {
    lowered: String,
    words: HashSet<String>,
    tokens: Vec<String>,
    shaped: Vec<String>,
    verified: Vec<String>,
}

pub struct QueryClassifier {
    domain_terms: Vec<String>,
    role_terms: Vec<String>,
    access_terms: Vec<String>,
    shapes: Vec<(&'static str, Regex)>,
    stop_words: HashSet<&'static str>,
}

impl QueryClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let shapes = CODE_SHAPES
            .iter()
            .map(|(name, pattern)| {
                Regex::new(pattern)
                    .map(|re| (*name, re))
                    .map_err(|e| AppError::Configuration {
                        message: format!("Invalid code shape {}: {}", name, e),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let lower = |terms: &[String]| -> Vec<String> {
            terms
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect()
        };

        Ok(Self {
            domain_terms: lower(&config.domain_terms),
            role_terms: lower(&config.role_terms),
            access_terms: lower(&config.access_terms),
            shapes,
            stop_words: STOP_WORDS.iter().copied().collect(),
        })
    }

    /// Classify a raw query. Deterministic for identical input.
    pub fn classify(&self, query: &str, lookup: &dyn EntityLookup) -> ClassificationResult {
        let analysis = self.analyze(query, lookup);

        for rule in RULES {
            let evidence = self.evaluate(rule, &analysis);
            if !evidence.is_empty() {
                return ClassificationResult {
                    route: Route::Specialist,
                    confidence: rule.confidence,
                    evidence,
                    rule: Some(rule.name.to_string()),
                    verified_codes: analysis.verified,
                };
            }
        }

        ClassificationResult {
            route: Route::Generalist,
            confidence: Confidence::Low,
            evidence: Vec::new(),
            rule: None,
            verified_codes: analysis.verified,
        }
    }

    /// Candidate tokens: alphanumeric runs of 2-8 chars that are not stop words
    pub fn extract_tokens(&self, query: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        query
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| (MIN_TOKEN_LEN..=MAX_TOKEN_LEN).contains(&t.len()))
            .filter(|t| !self.stop_words.contains(t.to_lowercase().as_str()))
            .filter(|t| seen.insert(t.to_uppercase()))
            .map(str::to_string)
            .collect()
    }

    /// Name of the first code shape the token matches
    pub fn code_shape(&self, token: &str) -> Option<&'static str> {
        self.shapes
            .iter()
            .find(|(_, re)| re.is_match(token))
            .map(|(name, _)| *name)
    }

    fn analyze(&self, query: &str, lookup: &dyn EntityLookup) -> QueryAnalysis {
        let lowered = query.to_lowercase();
        let words = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();
        let tokens = self.extract_tokens(query);
        let shaped: Vec<String> = tokens
            .iter()
            .filter(|t| self.code_shape(t).is_some())
            .map(|t| t.to_uppercase())
            .collect();
        let verified = shaped
            .iter()
            .filter(|code| lookup.contains(code))
            .cloned()
            .collect();

        QueryAnalysis {
            lowered,
            words,
            tokens,
            shaped,
            verified,
        }
    }

    fn evaluate(&self, rule: &Rule, analysis: &QueryAnalysis) -> Vec<String> {
        match rule.matcher {
            Matcher::DomainKeyword => {
                let mut hits: Vec<(usize, &String)> = self
                    .domain_terms
                    .iter()
                    .filter_map(|term| analysis.lowered.find(term.as_str()).map(|pos| (pos, term)))
                    .collect();
                hits.sort();
                hits.into_iter().map(|(_, term)| term.clone()).collect()
            }
            Matcher::CodeShape => {
                if rule.requires_verification {
                    analysis.verified.clone()
                } else {
                    analysis.shaped.clone()
                }
            }
            Matcher::RoleAccessContext => {
                let role = self.role_terms.iter().find(|t| analysis.words.contains(*t));
                let access = self.access_terms.iter().find(|t| analysis.words.contains(*t));
                let mixed: Vec<String> = analysis
                    .tokens
                    .iter()
                    .filter(|t| is_mixed_shape(t))
                    .map(|t| t.to_uppercase())
                    .collect();

                match (role, access) {
                    (Some(role), Some(access)) if !mixed.is_empty() => {
                        let mut evidence = vec![role.clone(), access.clone()];
                        evidence.extend(mixed);
                        evidence
                    }
                    _ => Vec::new(),
                }
            }
        }
    }
}

/// Token contains both letters and digits
fn is_mixed_shape(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_alphabetic()) && token.chars().any(|c| c.is_ascii_digit())
}
