//! Inbound run requests.

use crate::errors::EngineError;
use crate::identity::Identity;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// A request to run exactly one of a test case, a suite, or a plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RunRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_case: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_overrides: Option<EnvironmentOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_inputs: Option<BTreeMap<String, Json>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_overrides: Option<BTreeMap<String, NodeOverride>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentOverrides {
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeOverride {
    #[serde(default)]
    pub inputs: BTreeMap<String, Json>,
}

/// Validated run target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTarget {
    Case(Identity),
    Suite(Identity),
    Plan(Identity),
}

impl RunRequest {
    pub fn for_case(identity: impl Into<String>) -> RunRequest {
        RunRequest {
            test_case: Some(identity.into()),
            ..RunRequest::default()
        }
    }

    pub fn for_suite(identity: impl Into<String>) -> RunRequest {
        RunRequest {
            suite: Some(identity.into()),
            ..RunRequest::default()
        }
    }

    pub fn for_plan(identity: impl Into<String>) -> RunRequest {
        RunRequest {
            plan: Some(identity.into()),
            ..RunRequest::default()
        }
    }

    pub fn env_overrides(&self) -> Option<&BTreeMap<String, String>> {
        self.environment_overrides.as_ref().map(|o| &o.env)
    }

    /// Enforce target exclusivity and the per-target constraints, then parse
    /// the target identity.
    pub fn validate(&self) -> Result<RunTarget, EngineError> {
        let set = [
            self.test_case.is_some(),
            self.suite.is_some(),
            self.plan.is_some(),
        ]
        .iter()
        .filter(|b| **b)
        .count();
        if set != 1 {
            return Err(EngineError::run_request_invalid(
                "exactly one of testCase, suite, plan must be set",
            ));
        }

        if let Some(case) = &self.test_case {
            if self.node_overrides.is_some() {
                return Err(EngineError::run_request_invalid(
                    "nodeOverrides is only valid for suite requests",
                ));
            }
            return Ok(RunTarget::Case(Identity::parse(case)?));
        }
        if let Some(suite) = &self.suite {
            if self.case_inputs.is_some() {
                return Err(EngineError::run_request_invalid(
                    "caseInputs is only valid for testCase requests",
                ));
            }
            return Ok(RunTarget::Suite(Identity::parse(suite)?));
        }
        let plan = self.plan.as_ref().expect("one target is set");
        if self.case_inputs.is_some() || self.node_overrides.is_some() {
            return Err(EngineError::run_request_invalid(
                "plan requests accept no caseInputs or nodeOverrides",
            ));
        }
        Ok(RunTarget::Plan(Identity::parse(plan)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use serde_json::json;

    #[test]
    fn exactly_one_target_is_required() {
        assert!(RunRequest::default().validate().is_err());
        let both = RunRequest {
            test_case: Some("a@1".into()),
            suite: Some("b@1".into()),
            ..RunRequest::default()
        };
        assert_eq!(
            both.validate().unwrap_err().kind,
            ErrorKind::RunRequestInvalid
        );
    }

    #[test]
    fn case_request_rejects_node_overrides() {
        let mut req = RunRequest::for_case("demo@1.0.0");
        req.node_overrides = Some(BTreeMap::new());
        assert!(req.validate().is_err());
    }

    #[test]
    fn suite_request_rejects_case_inputs() {
        let mut req = RunRequest::for_suite("smoke@2.0");
        req.case_inputs = Some(BTreeMap::new());
        assert!(req.validate().is_err());
    }

    #[test]
    fn plan_request_rejects_all_input_forms() {
        let mut req = RunRequest::for_plan("nightly@1");
        req.case_inputs = Some(BTreeMap::new());
        assert!(req.validate().is_err());
        let mut req = RunRequest::for_plan("nightly@1");
        req.node_overrides = Some(BTreeMap::new());
        assert!(req.validate().is_err());
    }

    #[test]
    fn malformed_identity_is_rejected() {
        assert_eq!(
            RunRequest::for_case("not an id").validate().unwrap_err().kind,
            ErrorKind::IdentityInvalid
        );
    }

    #[test]
    fn deserializes_from_the_wire_shape() {
        let req: RunRequest = serde_json::from_value(json!({
            "suite": "smoke@2.0",
            "environmentOverrides": {"env": {"K": "V"}},
            "nodeOverrides": {"a": {"inputs": {"count": 2}}}
        }))
        .unwrap();
        assert!(matches!(req.validate().unwrap(), RunTarget::Suite(_)));
        assert_eq!(req.env_overrides().unwrap()["K"], "V");
        assert_eq!(req.node_overrides.unwrap()["a"].inputs["count"], json!(2));
    }

    #[test]
    fn unknown_properties_are_rejected() {
        let result: Result<RunRequest, _> =
            serde_json::from_value(json!({"suite": "s@1", "parallel": true}));
        assert!(result.is_err());
    }
}
