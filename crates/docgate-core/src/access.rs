//! Per-chunk access check applied after retrieval
//!
//! Runs regardless of any partition filtering the index already did. A chunk
//! survives only if its partition is readable by the role and its optional
//! role allow-list names the role. Anything unparseable is denied.

use crate::audit::{AuditAction, AuditContext, AuditDecision, AuditEvent};
use crate::rbac::{normalize_role, EffectivePermissionSet};
use crate::retrieval::Candidate;
use serde::Serialize;

/// Per-request record of which chunk ids were granted or denied
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccessReport {
    pub granted: Vec<String>,
    pub denied: Vec<String>,
    /// Chunk id and parse failure; always also a denial
    pub malformed: Vec<(String, String)>,
}

impl AccessReport {
    pub fn checked(&self) -> usize {
        self.granted.len() + self.denied.len() + self.malformed.len()
    }

    /// Audit events for this report; ids only
    pub fn audit_events(&self, ctx: &AuditContext) -> Vec<AuditEvent> {
        let mut events = Vec::new();
        if !self.granted.is_empty() {
            events.push(
                ctx.event(AuditAction::AccessCheck, AuditDecision::Granted)
                    .with_chunks(self.granted.iter().cloned()),
            );
        }
        if !self.denied.is_empty() {
            events.push(
                ctx.event(AuditAction::AccessCheck, AuditDecision::Denied)
                    .with_chunks(self.denied.iter().cloned()),
            );
        }
        for (id, reason) in &self.malformed {
            events.push(
                ctx.event(AuditAction::AccessCheck, AuditDecision::MalformedMetadata)
                    .with_chunks([id.clone()])
                    .with_detail(reason.clone()),
            );
        }
        events
    }
}

/// Candidates that passed plus the decisions taken
#[derive(Debug, Clone)]
pub struct AccessOutcome {
    pub candidates: Vec<Candidate>,
    pub report: AccessReport,
}

/// Stateless deny-by-default chunk filter
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessFilter;

/// Verdict for a single chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Granted,
    Denied,
    Malformed(String),
}

impl AccessFilter {
    pub fn new() -> Self {
        Self
    }

    /// Decide one candidate
    pub fn check(
        &self,
        candidate: &Candidate,
        permissions: &EffectivePermissionSet,
        role: &str,
    ) -> AccessDecision {
        let parsed = match candidate.chunk.access.parse() {
            Ok(parsed) => parsed,
            Err(reason) => return AccessDecision::Malformed(reason),
        };

        if !permissions.allows(&parsed.partition) {
            return AccessDecision::Denied;
        }

        if parsed.permitted_roles.is_empty() {
            return AccessDecision::Granted;
        }

        let role = normalize_role(role);
        if !role.is_empty() && parsed.permitted_roles.contains(&role) {
            AccessDecision::Granted
        } else {
            AccessDecision::Denied
        }
    }

    /// Keep the candidates `role` may read, preserving their order
    pub fn filter(
        &self,
        candidates: Vec<Candidate>,
        permissions: &EffectivePermissionSet,
        role: &str,
    ) -> AccessOutcome {
        let mut report = AccessReport::default();
        let mut kept = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            match self.check(&candidate, permissions, role) {
                AccessDecision::Granted => {
                    report.granted.push(candidate.chunk.id.clone());
                    kept.push(candidate);
                }
                AccessDecision::Denied => {
                    report.denied.push(candidate.chunk.id.clone());
                }
                AccessDecision::Malformed(reason) => {
                    tracing::warn!(
                        chunk_id = %candidate.chunk.id,
                        "Denying chunk with malformed access metadata: {}",
                        reason
                    );
                    report.malformed.push((candidate.chunk.id.clone(), reason));
                }
            }
        }

        tracing::debug!(
            role,
            granted = report.granted.len(),
            denied = report.denied.len(),
            malformed = report.malformed.len(),
            "Access filter applied"
        );

        AccessOutcome {
            candidates: kept,
            report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::{PartitionKey, RoleResolver};
    use crate::retrieval::{AccessMetadata, Chunk};

    fn candidate(id: &str, department: &str, classification: &str, roles: Option<&str>) -> Candidate {
        Candidate::new(
            Chunk {
                id: id.to_string(),
                text: format!("text {}", id),
                embedding_ref: None,
                access: AccessMetadata {
                    department: department.to_string(),
                    classification: classification.to_string(),
                    permitted_roles: roles.map(str::to_string),
                },
                source_document: "doc.md".to_string(),
                source_offset: None,
            },
            0.8,
        )
    }

    #[test]
    fn test_partition_gate() {
        let resolver = RoleResolver::builtin().unwrap();
        let perms = resolver.resolve("finance_employee");
        let outcome = AccessFilter::new().filter(
            vec![
                candidate("fin", "finance", "internal", None),
                candidate("hr", "hr", "internal", None),
                candidate("fin-conf", "finance", "confidential", None),
            ],
            &perms,
            "finance_employee",
        );
        let ids: Vec<&str> = outcome.candidates.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["fin"]);
        assert_eq!(outcome.report.denied, vec!["hr", "fin-conf"]);
    }

    #[test]
    fn test_allow_list_narrows() {
        let resolver = RoleResolver::builtin().unwrap();
        let perms = resolver.resolve("finance_manager");
        let filter = AccessFilter::new();

        let listed = candidate("a", "finance", "internal", Some("finance_manager,c_level"));
        let unlisted = candidate("b", "finance", "internal", Some("c_level"));
        assert_eq!(filter.check(&listed, &perms, "finance_manager"), AccessDecision::Granted);
        assert_eq!(filter.check(&unlisted, &perms, "finance_manager"), AccessDecision::Denied);
    }

    #[test]
    fn test_allow_list_never_widens() {
        let resolver = RoleResolver::builtin().unwrap();
        let perms = resolver.resolve("intern");
        let chunk = candidate("x", "finance", "internal", Some("intern"));
        assert_eq!(AccessFilter::new().check(&chunk, &perms, "intern"), AccessDecision::Denied);
    }

    #[test]
    fn test_malformed_is_denied() {
        let resolver = RoleResolver::builtin().unwrap();
        let perms = resolver.resolve("admin");
        let outcome = AccessFilter::new().filter(
            vec![
                candidate("bad-class", "finance", "secret-ish", None),
                candidate("bad-roles", "finance", "internal", Some("admin,,")),
                candidate("ok", "finance", "internal", None),
            ],
            &perms,
            "admin",
        );
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.report.malformed.len(), 2);
        assert_eq!(outcome.report.checked(), 3);
    }

    #[test]
    fn test_empty_permissions_deny_everything() {
        let perms = EffectivePermissionSet::default();
        let outcome = AccessFilter::new().filter(
            vec![candidate("p", "general", "public", None)],
            &perms,
            "ghost",
        );
        assert!(outcome.candidates.is_empty());
        assert_eq!(outcome.report.denied, vec!["p"]);
    }

    #[test]
    fn test_audit_events_carry_ids_only() {
        let mut perms = EffectivePermissionSet::default();
        perms
            .accessible_partitions
            .insert(PartitionKey::parse("general", "public").unwrap());
        let outcome = AccessFilter::new().filter(
            vec![
                candidate("g", "general", "public", None),
                candidate("f", "finance", "internal", None),
                candidate("m", "general", "nope", None),
            ],
            &perms,
            "intern",
        );
        let ctx = AuditContext {
            correlation_id: "c".to_string(),
            username: "u".to_string(),
            role: "intern".to_string(),
            query: "q".to_string(),
        };
        let events = outcome.report.audit_events(&ctx);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].decision, AuditDecision::Granted);
        assert_eq!(events[1].chunk_ids_touched, vec!["f"]);
        assert_eq!(events[2].decision, AuditDecision::MalformedMetadata);
        assert!(events.iter().all(|e| !e
            .chunk_ids_touched
            .iter()
            .any(|id| id.starts_with("text "))));
    }
}
