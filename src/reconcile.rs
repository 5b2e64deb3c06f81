//! Apply a list of ingress rules to one security group, one request per rule.
//!
//! A rule the group already has is skipped. Any other failure stops the run:
//! later rules are not attempted and earlier ones stay applied.

use std::io::Write;

use colored::*;

use crate::aws::SecurityGroupService;
use crate::error::{Result, SgError};
use crate::rules::IngressRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    Added,
    Duplicate,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: usize,
    pub duplicates: usize,
}

impl ReconcileReport {
    pub fn attempted(&self) -> usize {
        self.added + self.duplicates
    }

    fn record(&mut self, outcome: RuleOutcome) {
        match outcome {
            RuleOutcome::Added => self.added += 1,
            RuleOutcome::Duplicate => self.duplicates += 1,
        }
    }
}

/// Authorize a single rule, folding the duplicate condition into an outcome.
pub fn apply_rule<S>(service: &S, group_id: &str, rule: &IngressRule) -> Result<RuleOutcome>
where
    S: SecurityGroupService + ?Sized,
{
    match service.authorize_ingress(group_id, rule) {
        Ok(()) => Ok(RuleOutcome::Added),
        Err(e) if e.is_duplicate() => Ok(RuleOutcome::Duplicate),
        Err(error) => Err(SgError::RemoteMutation {
            group_id: group_id.to_string(),
            address: rule.address.clone(),
            description: rule.description.clone(),
            error,
        }),
    }
}

fn label(text: &str, color: Color, enabled: bool) -> ColoredString {
    if enabled {
        text.color(color)
    } else {
        text.normal()
    }
}

/// Apply `rules` to `group_id` in order, writing one progress line per rule
/// to `progress`. `color` says whether `progress` is a terminal.
pub fn apply_rules<S, W>(
    service: &S,
    group_id: &str,
    rules: &[IngressRule],
    progress: &mut W,
    color: bool,
) -> Result<ReconcileReport>
where
    S: SecurityGroupService + ?Sized,
    W: Write + ?Sized,
{
    let mut report = ReconcileReport::default();

    for rule in rules {
        let outcome = apply_rule(service, group_id, rule)?;
        match outcome {
            RuleOutcome::Added => {
                log::debug!("{group_id}: added {} {}/{}", rule.address, rule.protocol, rule.port);
                writeln!(
                    progress,
                    "{} {} {}",
                    label("Added Ingress Rule: ", Color::Green, color),
                    rule.address,
                    rule.port
                )?;
            }
            RuleOutcome::Duplicate => {
                log::debug!("{group_id}: {} {}/{} already present", rule.address, rule.protocol, rule.port);
                writeln!(
                    progress,
                    "{} {}",
                    label("Ignore Duplicated Ingress Rule: ", Color::Yellow, color),
                    rule.address
                )?;
            }
        }
        report.record(outcome);
    }

    log::info!(
        "{group_id}: {} rule(s) sent, {} added, {} already present",
        report.attempted(),
        report.added,
        report.duplicates
    );
    Ok(report)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::aws::{ServiceError, DUPLICATE_PERMISSION};
    use serde_json::{json, Value};
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// In-memory stand-in for EC2 that records every authorize call.
    #[derive(Default)]
    pub(crate) struct FakeService {
        pub calls: RefCell<Vec<(String, IngressRule)>>,
        /// Error code to return for the n-th (0-based) authorize call
        pub fail_at: HashMap<usize, &'static str>,
        /// Rules every group already has; matched on address, port and protocol
        pub existing: Vec<IngressRule>,
        /// Error code for describe calls
        pub describe_error: Option<&'static str>,
    }

    impl FakeService {
        pub fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl SecurityGroupService for FakeService {
        fn describe_security_groups(&self, group_ids: &[String]) -> std::result::Result<Value, ServiceError> {
            if let Some(code) = self.describe_error {
                return Err(ServiceError::Api {
                    code: code.to_string(),
                    message: format!("The security group '{}' does not exist", group_ids.join(",")),
                });
            }
            let groups: Vec<Value> = group_ids
                .iter()
                .map(|id| json!({"GroupId": id, "GroupName": format!("{id}-name"), "IpPermissions": []}))
                .collect();
            Ok(json!({ "SecurityGroups": groups }))
        }

        fn authorize_ingress(&self, group_id: &str, rule: &IngressRule) -> std::result::Result<(), ServiceError> {
            let index = self.call_count();
            self.calls.borrow_mut().push((group_id.to_string(), rule.clone()));

            if let Some(code) = self.fail_at.get(&index) {
                return Err(ServiceError::Api {
                    code: code.to_string(),
                    message: "scripted failure".to_string(),
                });
            }
            let installed = self.existing.iter().any(|r| {
                r.address == rule.address && r.port == rule.port && r.protocol == rule.protocol
            });
            if installed {
                return Err(ServiceError::Api {
                    code: DUPLICATE_PERMISSION.to_string(),
                    message: "the specified rule already exists".to_string(),
                });
            }
            Ok(())
        }
    }

    fn sample_rules(n: usize) -> Vec<IngressRule> {
        (1..=n)
            .map(|i| IngressRule::new(format!("10.0.0.{i}/32"), 22, "tcp", format!("host-{i}")))
            .collect()
    }

    #[test]
    fn test_one_call_per_rule() {
        let service = FakeService::default();
        let rules = sample_rules(3);
        let mut progress = Vec::new();

        let report = apply_rules(&service, "sg-111", &rules, &mut progress, false).unwrap();

        assert_eq!(report, ReconcileReport { added: 3, duplicates: 0 });
        let calls = service.calls.borrow();
        assert_eq!(calls.len(), 3);
        for ((group, sent), expected) in calls.iter().zip(&rules) {
            assert_eq!(group, "sg-111");
            assert_eq!(sent, expected);
        }

        let text = String::from_utf8(progress).unwrap();
        assert_eq!(text.matches("Added Ingress Rule:").count(), 3);
        assert!(text.contains("10.0.0.2/32 22"));
    }

    #[test]
    fn test_duplicates_are_not_fatal() {
        let rules = sample_rules(2);
        let service = FakeService {
            existing: rules.clone(),
            ..Default::default()
        };
        let mut progress = Vec::new();

        let report = apply_rules(&service, "sg-111", &rules, &mut progress, false).unwrap();

        assert_eq!(report, ReconcileReport { added: 0, duplicates: 2 });
        assert_eq!(report.attempted(), 2);
        let text = String::from_utf8(progress).unwrap();
        assert_eq!(text.matches("Ignore Duplicated Ingress Rule:").count(), 2);
    }

    #[test]
    fn test_first_fatal_error_stops_the_loop() {
        let rules = sample_rules(5);
        let service = FakeService {
            fail_at: HashMap::from([(2, "RequestLimitExceeded")]),
            ..Default::default()
        };
        let mut progress = Vec::new();

        let err = apply_rules(&service, "sg-111", &rules, &mut progress, false).unwrap_err();

        // rule 3 of 5 failed: exactly three calls, none after it
        assert_eq!(service.call_count(), 3);
        match err {
            SgError::RemoteMutation { group_id, address, error, .. } => {
                assert_eq!(group_id, "sg-111");
                assert_eq!(address, "10.0.0.3/32");
                assert_eq!(error.code(), Some("RequestLimitExceeded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let text = String::from_utf8(progress).unwrap();
        assert_eq!(text.matches("Added Ingress Rule:").count(), 2);
    }

    #[test]
    fn test_empty_rule_list() {
        let service = FakeService::default();
        let report = apply_rules(&service, "sg-111", &[], &mut Vec::new(), false).unwrap();
        assert_eq!(report.attempted(), 0);
        assert_eq!(service.call_count(), 0);
    }

    #[test]
    fn test_apply_rule_outcomes() {
        let rule = IngressRule::new("10.0.0.1/32", 443, "tcp", "office");
        let service = FakeService {
            existing: vec![rule.clone()],
            ..Default::default()
        };
        assert_eq!(apply_rule(&service, "sg-1", &rule).unwrap(), RuleOutcome::Duplicate);

        let other = IngressRule::new("10.0.0.1/32", 80, "tcp", "office");
        assert_eq!(apply_rule(&service, "sg-1", &other).unwrap(), RuleOutcome::Added);

        let udp = IngressRule::new("10.0.0.1/32", 443, "udp", "office");
        assert_eq!(apply_rule(&service, "sg-1", &udp).unwrap(), RuleOutcome::Added);
    }

    #[test]
    fn test_new_description_on_installed_rule_is_duplicate() {
        let service = FakeService {
            existing: vec![IngressRule::new("10.0.0.1/32", 22, "tcp", "office")],
            ..Default::default()
        };
        let renamed = IngressRule::new("10.0.0.1/32", 22, "tcp", "office-renamed");
        assert_eq!(apply_rule(&service, "sg-1", &renamed).unwrap(), RuleOutcome::Duplicate);

        let mut progress = Vec::new();
        let report = apply_rules(&service, "sg-1", &[renamed], &mut progress, false).unwrap();
        assert_eq!(report, ReconcileReport { added: 0, duplicates: 1 });
        let text = String::from_utf8(progress).unwrap();
        assert_eq!(text, "Ignore Duplicated Ingress Rule:  10.0.0.1/32\n");
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_progress_write_failure_is_an_error() {
        let service = FakeService::default();
        let err = apply_rules(&service, "sg-1", &sample_rules(2), &mut BrokenPipe, false).unwrap_err();
        assert!(matches!(err, SgError::Io(_)));
        // the first rule was already sent when its progress line failed
        assert_eq!(service.call_count(), 1);
    }

    #[test]
    fn test_plain_progress_without_color() {
        let service = FakeService::default();
        let mut progress = Vec::new();
        apply_rules(&service, "sg-1", &sample_rules(1), &mut progress, false).unwrap();
        let text = String::from_utf8(progress).unwrap();
        assert!(!text.contains('\x1b'), "{text:?}");
        assert_eq!(text, "Added Ingress Rule:  10.0.0.1/32 22\n");
    }
}
