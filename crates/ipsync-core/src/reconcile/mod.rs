// # Text Reconciler
//
// Rewrites dependent configuration files so they carry the current public
// address.
//
// ## Semantics
//
// For one target file, rules are applied in order against the *current*
// content: a later rule sees the edits of the earlier ones. Every rule
// replaces all non-overlapping matches of its pattern with its rendered
// template, inserted verbatim. Each rule fires exactly once per pass; a
// replacement that happens to match an earlier pattern is not re-processed.
//
// A rule that matches nothing fails the whole file with `Error::NoMatch`.
// The file is only written after every rule succeeded, and then through a
// temp-file-and-rename so a crash never leaves a half-edited file.

use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::address::PublicAddress;
use crate::atomic::write_atomic;
use crate::error::{Error, Result};

/// Placeholder in a replacement template that stands for the new address
pub const NEW_ADDRESS_PLACEHOLDER: &str = "{new}";

/// A (pattern, replacement-template) pair
///
/// Patterns should anchor on structure (a field name, a keyword) rather
/// than on a specific address, so the rule keeps matching after it has been
/// applied once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawRule", into = "RawRule")]
pub struct SubstitutionRule {
    pattern: Regex,
    template: String,
}

/// Serialized form of a [`SubstitutionRule`]
#[derive(Serialize, Deserialize)]
struct RawRule {
    pattern: String,
    template: String,
}

impl SubstitutionRule {
    /// Create a rule, compiling its pattern
    ///
    /// # Errors
    ///
    /// `Error::Config` if the pattern is not a valid regular expression.
    pub fn new(pattern: &str, template: impl Into<String>) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::config(format!("Invalid pattern `{}`: {}", pattern, e)))?;

        Ok(Self {
            pattern,
            template: template.into(),
        })
    }

    /// Source text of the pattern
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Replacement template
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Render the template for the given address
    pub fn render(&self, address: &PublicAddress) -> String {
        self.template.replace(NEW_ADDRESS_PLACEHOLDER, &address.to_string())
    }
}

impl TryFrom<RawRule> for SubstitutionRule {
    type Error = Error;

    fn try_from(raw: RawRule) -> Result<Self> {
        Self::new(&raw.pattern, raw.template)
    }
}

impl From<SubstitutionRule> for RawRule {
    fn from(rule: SubstitutionRule) -> Self {
        Self {
            pattern: rule.pattern.as_str().to_string(),
            template: rule.template,
        }
    }
}

/// A file whose content must track the public address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetFile {
    /// Path of the file
    pub path: PathBuf,
    /// Rules applied in order
    pub rules: Vec<SubstitutionRule>,
}

impl TargetFile {
    /// Create a target file
    pub fn new(path: impl Into<PathBuf>, rules: Vec<SubstitutionRule>) -> Self {
        Self {
            path: path.into(),
            rules,
        }
    }
}

/// Outcome of reconciling one target file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// File that was reconciled
    pub path: PathBuf,
    /// Number of spans each rule replaced, in rule order
    pub matches: Vec<usize>,
    /// Whether the content differed and the file was rewritten
    pub changed: bool,
}

/// Applies substitution rules to target files
#[derive(Debug, Default, Clone)]
pub struct TextReconciler;

impl TextReconciler {
    /// Create a reconciler
    pub fn new() -> Self {
        Self
    }

    /// Rewrite a target file for the new address
    ///
    /// Reads the file, applies every rule in order and replaces the file
    /// atomically. Content that comes out byte-identical is not rewritten.
    ///
    /// # Errors
    ///
    /// - `Error::NoMatch`: a rule matched nothing (the file is left untouched)
    /// - `Error::Io`: the file could not be read or replaced
    pub async fn apply_rules(
        &self,
        target: &TargetFile,
        address: &PublicAddress,
    ) -> Result<ReconcileReport> {
        let original = fs::read_to_string(&target.path).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read {}: {}", target.path.display(), e),
            ))
        })?;

        let (content, matches) = self.rewrite(&target.path, &target.rules, &original, address)?;
        let changed = content != original;

        if changed {
            write_atomic(&target.path, content.as_bytes())
                .await
                .map_err(|e| {
                    Error::Io(std::io::Error::new(
                        e.kind(),
                        format!("Failed to replace {}: {}", target.path.display(), e),
                    ))
                })?;
            debug!(path = %target.path.display(), ?matches, "Target file rewritten");
        } else {
            debug!(path = %target.path.display(), "Target file already up to date");
        }

        Ok(ReconcileReport {
            path: target.path.clone(),
            matches,
            changed,
        })
    }

    /// Apply rules to in-memory content
    ///
    /// Pure function behind [`TextReconciler::apply_rules`]; `path` is only
    /// used for error reporting.
    pub fn rewrite(
        &self,
        path: &Path,
        rules: &[SubstitutionRule],
        content: &str,
        address: &PublicAddress,
    ) -> Result<(String, Vec<usize>)> {
        let mut current = content.to_string();
        let mut matches = Vec::with_capacity(rules.len());

        for rule in rules {
            let count = rule.pattern.find_iter(&current).count();
            if count == 0 {
                return Err(Error::no_match(path, rule.pattern()));
            }

            let rendered = rule.render(address);
            current = rule
                .pattern
                .replace_all(&current, NoExpand(&rendered))
                .into_owned();
            matches.push(count);
        }

        Ok((current, matches))
    }
}
