//! Normalized vulnerability report model.
//!
//! A [`NormalizedReport`] is the structured form produced by the external
//! normalizer. Its identifier is a BLAKE3 hash of the canonical JSON of every
//! content field, so identical content always maps to the same [`ReportId`].
//!
//! Artifact `content` is carried verbatim through every stage: it is hashed,
//! embedded, indexed and shown to the reranker exactly as normalized.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::PASSAGE_MAX_STEPS;
use crate::errors::{VrdError, VrdResult};

// ============================================================================
// ReportId
// ============================================================================

/// Content-hash identifier of a report (lowercase hex BLAKE3).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(String);

impl ReportId {
    /// Wrap an existing identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Hash the content fields of a report.
    pub fn for_content(report: &NormalizedReport) -> Self {
        let canonical = serde_json::to_vec(&ContentView::from(report))
            .unwrap_or_else(|_| report.embedding_text().into_bytes());
        Self(blake3::hash(&canonical).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ReportId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<ReportId> for vrd_db::vector::VectorId {
    fn from(id: ReportId) -> Self {
        vrd_db::vector::VectorId(id.0)
    }
}

impl From<vrd_db::vector::VectorId> for ReportId {
    fn from(id: vrd_db::vector::VectorId) -> Self {
        Self(id.0)
    }
}

// ============================================================================
// Enumerations
// ============================================================================

/// Closed set of vulnerability classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VulnerabilityCategory {
    SqlInjection,
    CommandInjection,
    /// Injection classes without a dedicated variant (LDAP, XPath, template...).
    Injection,
    Xss,
    Ssrf,
    Rce,
    AuthBypass,
    /// Broken authorization, including IDOR.
    Idor,
    RaceCondition,
    Redos,
    Deserialization,
    PathTraversal,
    OpenRedirect,
    Other,
}

impl VulnerabilityCategory {
    /// Human-readable label used in embedding text, passages and queries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::SqlInjection => "SQL Injection",
            Self::CommandInjection => "Command Injection",
            Self::Injection => "Injection",
            Self::Xss => "Cross-Site Scripting",
            Self::Ssrf => "Server-Side Request Forgery",
            Self::Rce => "Remote Code Execution",
            Self::AuthBypass => "Authentication Bypass",
            Self::Idor => "Insecure Direct Object Reference",
            Self::RaceCondition => "Race Condition",
            Self::Redos => "Regular Expression Denial of Service",
            Self::Deserialization => "Insecure Deserialization",
            Self::PathTraversal => "Path Traversal",
            Self::OpenRedirect => "Open Redirect",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for VulnerabilityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for VulnerabilityCategory {
    type Err = VrdError;

    /// Lenient parse of the labels external normalizers tend to emit.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();

        let category = match key.as_str() {
            "sqlinjection" | "sqli" => Self::SqlInjection,
            "commandinjection" | "osinjection" | "oscommandinjection" => Self::CommandInjection,
            "injection" | "ldapinjection" | "xpathinjection" | "templateinjection" | "ssti" => {
                Self::Injection
            }
            "xss" | "crosssitescripting" | "crosssitescriptingxss" | "storedxss"
            | "reflectedxss" | "domxss" => Self::Xss,
            "ssrf" | "serversiderequestforgery" => Self::Ssrf,
            "rce" | "remotecodeexecution" | "codeexecution" => Self::Rce,
            "authbypass" | "authenticationbypass" => Self::AuthBypass,
            "idor" | "insecuredirectobjectreference" | "brokenaccesscontrol" | "authorization"
            | "authorizationidor" => Self::Idor,
            "racecondition" | "toctou" => Self::RaceCondition,
            "redos" | "regularexpressiondenialofservice" => Self::Redos,
            "deserialization" | "insecuredeserialization" => Self::Deserialization,
            "pathtraversal" | "directorytraversal" => Self::PathTraversal,
            "openredirect" => Self::OpenRedirect,
            "other" => Self::Other,
            _ => {
                return Err(VrdError::malformed(format!(
                    "unknown vulnerability category '{}'",
                    s
                )))
            }
        };
        Ok(category)
    }
}

/// Severity, ordered `Info < Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

impl FromStr for Severity {
    type Err = VrdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "info" | "informational" | "none" => Ok(Self::Info),
            "low" => Ok(Self::Low),
            "medium" | "moderate" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(VrdError::malformed(format!("unknown severity '{}'", other))),
        }
    }
}

/// Kind of technical artifact attached to a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Payload,
    Request,
    Response,
    Code,
    Exploit,
    Log,
    #[default]
    Other,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Payload => "payload",
            Self::Request => "request",
            Self::Response => "response",
            Self::Code => "code",
            Self::Exploit => "exploit",
            Self::Log => "log",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Report structs
// ============================================================================

/// A payload, request, snippet or log excerpt, kept byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalArtifact {
    pub kind: ArtifactKind,
    /// Source-language tag (`http`, `sql`, `python`...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub content: String,
    #[serde(default)]
    pub description: String,
}

impl TechnicalArtifact {
    pub fn new(kind: ArtifactKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            language: None,
            content: content.into(),
            description: String::new(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Optional references attached by the reporter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cves: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hunter_notes: Option<String>,
}

/// Structured vulnerability report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedReport {
    /// Content hash; see [`ReportId::for_content`].
    pub id: ReportId,
    pub title: String,
    pub summary: String,
    pub category: VulnerabilityCategory,
    pub severity: Severity,
    /// Free-text locator such as an endpoint path or module name.
    pub affected_component: String,
    #[serde(default)]
    pub reproduction_steps: Vec<String>,
    #[serde(default)]
    pub artifacts: Vec<TechnicalArtifact>,
    #[serde(default)]
    pub technologies: BTreeSet<String>,
    #[serde(default)]
    pub impact: String,
    #[serde(default)]
    pub remediation: String,
    #[serde(default)]
    pub metadata: ReportMetadata,
}

/// Borrowed view of everything except the id, serialized for hashing.
#[derive(Serialize, PartialEq)]
struct ContentView<'a> {
    title: &'a str,
    summary: &'a str,
    category: VulnerabilityCategory,
    severity: Severity,
    affected_component: &'a str,
    reproduction_steps: &'a [String],
    artifacts: &'a [TechnicalArtifact],
    technologies: &'a BTreeSet<String>,
    impact: &'a str,
    remediation: &'a str,
    metadata: &'a ReportMetadata,
}

impl<'a> From<&'a NormalizedReport> for ContentView<'a> {
    fn from(r: &'a NormalizedReport) -> Self {
        Self {
            title: &r.title,
            summary: &r.summary,
            category: r.category,
            severity: r.severity,
            affected_component: &r.affected_component,
            reproduction_steps: &r.reproduction_steps,
            artifacts: &r.artifacts,
            technologies: &r.technologies,
            impact: &r.impact,
            remediation: &r.remediation,
            metadata: &r.metadata,
        }
    }
}

impl NormalizedReport {
    /// Start building a report from its required fields.
    pub fn builder(
        title: impl Into<String>,
        summary: impl Into<String>,
        category: VulnerabilityCategory,
        affected_component: impl Into<String>,
    ) -> ReportBuilder {
        ReportBuilder {
            report: NormalizedReport {
                id: ReportId::new(""),
                title: title.into(),
                summary: summary.into(),
                category,
                severity: Severity::default(),
                affected_component: affected_component.into(),
                reproduction_steps: Vec::new(),
                artifacts: Vec::new(),
                technologies: BTreeSet::new(),
                impact: String::new(),
                remediation: String::new(),
                metadata: ReportMetadata::default(),
            },
        }
    }

    /// The hash the current content would produce.
    pub fn content_hash(&self) -> ReportId {
        ReportId::for_content(self)
    }

    /// Replace `id` with the hash of the current content.
    pub fn with_recomputed_id(mut self) -> Self {
        self.id = self.content_hash();
        self
    }

    /// Two reports carry the same content, ignoring their ids.
    pub fn same_content(&self, other: &NormalizedReport) -> bool {
        ContentView::from(self) == ContentView::from(other)
    }

    /// Structural validation performed before ingest or scan.
    pub fn validate(&self) -> VrdResult<()> {
        if self.id.is_empty() {
            return Err(VrdError::malformed("report has no identifier"));
        }
        if self.title.trim().is_empty() {
            return Err(VrdError::malformed("title is empty"));
        }
        if self.summary.trim().is_empty() {
            return Err(VrdError::malformed("summary is empty"));
        }
        if self.affected_component.trim().is_empty() {
            return Err(VrdError::malformed("affected component is empty"));
        }
        if let Some(pos) = self.artifacts.iter().position(|a| a.content.is_empty()) {
            return Err(VrdError::malformed(format!(
                "artifact #{} has empty content",
                pos + 1
            )));
        }
        Ok(())
    }

    /// Canonical text handed to the embedder.
    ///
    /// Labelled sections separated by blank lines; empty optional sections
    /// are omitted. Artifacts appear in full as `kind: content`.
    pub fn embedding_text(&self) -> String {
        let mut parts = vec![
            format!("Title: {}", self.title),
            format!("Summary: {}", self.summary),
            format!("Vulnerability Type: {}", self.category),
            format!("Severity: {}", self.severity),
            format!("Affected Component: {}", self.affected_component),
        ];
        if !self.reproduction_steps.is_empty() {
            parts.push(format!(
                "Reproduction Steps: {}",
                self.reproduction_steps.join(" | ")
            ));
        }
        if !self.artifacts.is_empty() {
            let artifacts = self
                .artifacts
                .iter()
                .map(|a| format!("{}: {}", a.kind, a.content))
                .collect::<Vec<_>>()
                .join("\n");
            parts.push(format!("Technical Artifacts:\n{}", artifacts));
        }
        if !self.technologies.is_empty() {
            parts.push(format!(
                "Technologies: {}",
                self.technologies.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        if !self.impact.is_empty() {
            parts.push(format!("Impact: {}", self.impact));
        }
        if !self.remediation.is_empty() {
            parts.push(format!("Remediation: {}", self.remediation));
        }
        parts.join("\n\n")
    }

    /// Candidate representation scored by the reranker against a query.
    pub fn passage_text(&self) -> String {
        let mut parts = vec![
            self.title.clone(),
            format!("{} in {}", self.category, self.affected_component),
            self.summary.clone(),
        ];
        if !self.reproduction_steps.is_empty() {
            let steps = self
                .reproduction_steps
                .iter()
                .take(PASSAGE_MAX_STEPS)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join("; ");
            parts.push(format!("Steps: {}", steps));
        }
        if !self.artifacts.is_empty() {
            let artifacts = self
                .artifacts
                .iter()
                .map(|a| a.content.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            parts.push(format!("Artifacts: {}", artifacts));
        }
        parts.join(" | ")
    }
}

/// Builder for [`NormalizedReport`]; `build` computes the content hash.
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    report: NormalizedReport,
}

impl ReportBuilder {
    pub fn severity(mut self, severity: Severity) -> Self {
        self.report.severity = severity;
        self
    }

    pub fn step(mut self, step: impl Into<String>) -> Self {
        self.report.reproduction_steps.push(step.into());
        self
    }

    pub fn steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.report
            .reproduction_steps
            .extend(steps.into_iter().map(Into::into));
        self
    }

    pub fn artifact(mut self, artifact: TechnicalArtifact) -> Self {
        self.report.artifacts.push(artifact);
        self
    }

    pub fn technology(mut self, technology: impl Into<String>) -> Self {
        self.report.technologies.insert(technology.into());
        self
    }

    pub fn impact(mut self, impact: impl Into<String>) -> Self {
        self.report.impact = impact.into();
        self
    }

    pub fn remediation(mut self, remediation: impl Into<String>) -> Self {
        self.report.remediation = remediation.into();
        self
    }

    pub fn cve(mut self, cve: impl Into<String>) -> Self {
        self.report.metadata.cves.push(cve.into());
        self
    }

    pub fn reference(mut self, url: impl Into<String>) -> Self {
        self.report.metadata.references.push(url.into());
        self
    }

    pub fn hunter_notes(mut self, notes: impl Into<String>) -> Self {
        self.report.metadata.hunter_notes = Some(notes.into());
        self
    }

    pub fn build(self) -> NormalizedReport {
        self.report.with_recomputed_id()
    }
}
