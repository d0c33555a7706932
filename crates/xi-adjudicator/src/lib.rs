//! Ensemble Adjudicator (spec §4.3): parallel model fan-out, strict claim
//! extraction, canonical-key grouping, and majority-intersection
//! adjudication with principled halt.
//!
//! The bounded fan-out is grounded in `deepseek-subagent::SubagentManager`'s
//! chunk-then-join pattern, expressed with `std::thread::scope` rather than
//! `thread::spawn` + manual joins, since backends are borrowed rather than
//! owned. `rayon` was in the teacher's workspace dependency table but
//! unused by any teacher crate; it is dropped here rather than introduced
//! for the first time on xi's behalf (see DESIGN.md).

use std::collections::{BTreeMap, BTreeSet};

use xi_core::{Claim, ClaimGroup};

mod resource;

pub use resource::{resource_throttle, scaled_worker_count};
pub use xi_core::AdjudicationResult;

/// A local model backend the Ensemble Adjudicator can fan out to. One
/// implementation per backend transport; xi itself stays transport-agnostic.
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, prompt: &str) -> Result<String, String>;
    /// Secondary extraction call: must return a JSON array of
    /// `{claim, confidence, type}` objects as raw text.
    fn extract_claims(&self, response: &str) -> Result<String, String>;
}

struct GenerationOutcome {
    agent: String,
    response: String,
    success: bool,
}

/// Run the full adjudication protocol against `backends` for `prompt`.
/// `max_concurrency` bounds the worker pool (spec §5: typically ≤ 5).
pub fn adjudicate(backends: &[Box<dyn ModelBackend>], prompt: &str, max_concurrency: usize) -> AdjudicationResult {
    let generations = generate_all(backends, prompt, max_concurrency);
    let successful: Vec<&GenerationOutcome> = generations.iter().filter(|g| g.success).collect();

    if successful.is_empty() {
        return AdjudicationResult::Halt {
            reason: "All models failed".to_string(),
            disagreements: Vec::new(),
            raw: Vec::new(),
        };
    }

    let mut raw_claims = Vec::new();
    for outcome in &successful {
        if let Some(backend) = backends.iter().find(|b| b.name() == outcome.agent) {
            raw_claims.extend(extract_claims_for_agent(backend.as_ref(), &outcome.response));
        }
    }

    let groups = group_claims(&raw_claims);
    let threshold = majority_threshold(successful.len());
    let (intersection, minority): (Vec<ClaimGroup>, Vec<ClaimGroup>) =
        groups.into_iter().partition(|group| group.agents.len() >= threshold);

    if intersection.is_empty() {
        return AdjudicationResult::Halt {
            reason: "No claim reached majority".to_string(),
            disagreements: minority,
            raw: raw_claims,
        };
    }

    let all_groups: Vec<&ClaimGroup> = intersection.iter().chain(minority.iter()).collect();
    if has_contradiction(&intersection, &all_groups) {
        return AdjudicationResult::Halt {
            reason: "Contradictory claims in intersection".to_string(),
            disagreements: minority,
            raw: raw_claims,
        };
    }

    let confidence = intersection.iter().map(|group| group.mean_confidence).sum::<f64>() / intersection.len() as f64;

    AdjudicationResult::Adjudicated {
        intersection,
        minority,
        confidence,
    }
}

fn generate_all(backends: &[Box<dyn ModelBackend>], prompt: &str, max_concurrency: usize) -> Vec<GenerationOutcome> {
    let chunk_size = max_concurrency.max(1);
    let mut outcomes = Vec::with_capacity(backends.len());

    for chunk in backends.chunks(chunk_size) {
        std::thread::scope(|scope| {
            let handles: Vec<_> = chunk
                .iter()
                .map(|backend| {
                    scope.spawn(move || match backend.generate(prompt) {
                        Ok(response) => GenerationOutcome {
                            agent: backend.name().to_string(),
                            response,
                            success: true,
                        },
                        Err(_) => GenerationOutcome {
                            agent: backend.name().to_string(),
                            response: String::new(),
                            success: false,
                        },
                    })
                })
                .collect();
            for handle in handles {
                if let Ok(outcome) = handle.join() {
                    outcomes.push(outcome);
                }
            }
        });
    }

    outcomes
}

/// Strict extraction: any non-array output, or any array element that
/// isn't an object with a string `claim` field, voids the entire
/// extraction for this agent. No tolerant parsing, no regex scraping.
fn extract_claims_for_agent(backend: &dyn ModelBackend, response: &str) -> Vec<Claim> {
    let Ok(raw) = backend.extract_claims(response) else {
        return Vec::new();
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) else {
        return Vec::new();
    };
    let Some(array) = value.as_array() else {
        return Vec::new();
    };

    let mut claims = Vec::with_capacity(array.len());
    for item in array {
        let Some(obj) = item.as_object() else {
            return Vec::new();
        };
        let Some(text) = obj.get("claim").and_then(|v| v.as_str()) else {
            return Vec::new();
        };
        let confidence = obj
            .get("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(1.0)
            .clamp(0.0, 1.0);
        let kind = obj
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("assertion")
            .to_string();
        claims.push(Claim {
            text: text.to_string(),
            kind,
            confidence,
            agent: backend.name().to_string(),
        });
    }
    claims
}

fn canonical_key(text: &str) -> String {
    let lowered = text.to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| ".,;:!?\"'-".contains(c))
        .to_string()
}

fn group_claims(claims: &[Claim]) -> Vec<ClaimGroup> {
    let mut groups: BTreeMap<String, (BTreeSet<String>, Vec<f64>)> = BTreeMap::new();
    for claim in claims {
        let key = canonical_key(&claim.text);
        let entry = groups.entry(key).or_default();
        entry.0.insert(claim.agent.clone());
        entry.1.push(claim.confidence);
    }

    groups
        .into_iter()
        .map(|(canonical, (agents, confidences))| {
            let mean_confidence = confidences.iter().sum::<f64>() / confidences.len() as f64;
            ClaimGroup {
                canonical,
                frequency: confidences.len(),
                agents,
                mean_confidence,
            }
        })
        .collect()
}

fn majority_threshold(successful_agents: usize) -> usize {
    successful_agents / 2 + 1
}

fn has_contradiction(promoted: &[ClaimGroup], all_groups: &[&ClaimGroup]) -> bool {
    promoted.iter().any(|p| {
        all_groups
            .iter()
            .any(|q| q.canonical != p.canonical && is_contradiction_pair(&p.canonical, &q.canonical))
    })
}

fn is_contradiction_pair(p: &str, q: &str) -> bool {
    if q == format!("not {p}") {
        return true;
    }
    if let Some(tail) = p.strip_prefix("not ") {
        if tail == q {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeBackend {
        name: String,
        response: &'static str,
        claims_json: &'static str,
    }

    impl ModelBackend for FakeBackend {
        fn name(&self) -> &str {
            &self.name
        }
        fn generate(&self, _prompt: &str) -> Result<String, String> {
            Ok(self.response.to_string())
        }
        fn extract_claims(&self, _response: &str) -> Result<String, String> {
            Ok(self.claims_json.to_string())
        }
    }

    fn backend(name: &str, claims_json: &'static str) -> Box<dyn ModelBackend> {
        Box::new(FakeBackend {
            name: name.to_string(),
            response: "irrelevant",
            claims_json,
        })
    }

    #[test]
    fn majority_agreement_produces_adjudicated_result() {
        let backends = vec![
            backend("a", r#"[{"claim": "the build is green", "confidence": 0.9, "type": "fact"}]"#),
            backend("b", r#"[{"claim": "The Build Is Green.", "confidence": 0.8, "type": "fact"}]"#),
            backend("c", r#"[{"claim": "tests pass", "confidence": 0.7, "type": "fact"}]"#),
        ];
        let result = adjudicate(&backends, "is the build green", 5);
        match result {
            AdjudicationResult::Adjudicated { intersection, .. } => {
                assert_eq!(intersection.len(), 1);
                assert_eq!(intersection[0].canonical, "the build is green");
                assert_eq!(intersection[0].agents.len(), 2);
            }
            other => panic!("expected Adjudicated, got {other:?}"),
        }
    }

    #[test]
    fn contradictory_majority_and_minority_claims_force_halt() {
        let backends = vec![
            backend("a", r#"[{"claim": "tests pass"}]"#),
            backend("b", r#"[{"claim": "tests pass"}]"#),
            backend("c", r#"[{"claim": "not tests pass"}]"#),
        ];
        let result = adjudicate(&backends, "do tests pass", 5);
        assert!(matches!(result, AdjudicationResult::Halt { .. }));
    }

    #[test]
    fn malformed_extractor_output_is_rejected_not_tolerated() {
        let backends = vec![backend("a", "not a json array at all")];
        let result = adjudicate(&backends, "anything", 5);
        match result {
            AdjudicationResult::Halt { raw, .. } => assert!(raw.is_empty()),
            other => panic!("expected Halt, got {other:?}"),
        }
    }

    #[test]
    fn no_majority_claim_halts_with_minority_disagreements() {
        let backends = vec![
            backend("a", r#"[{"claim": "option one"}]"#),
            backend("b", r#"[{"claim": "option two"}]"#),
            backend("c", r#"[{"claim": "option three"}]"#),
        ];
        let result = adjudicate(&backends, "which option", 5);
        match result {
            AdjudicationResult::Halt { disagreements, .. } => assert_eq!(disagreements.len(), 3),
            other => panic!("expected Halt, got {other:?}"),
        }
    }

    #[test]
    fn majority_threshold_matches_floor_n_over_2_plus_1() {
        assert_eq!(majority_threshold(3), 2);
        assert_eq!(majority_threshold(4), 3);
        assert_eq!(majority_threshold(5), 3);
        assert_eq!(majority_threshold(1), 1);
    }

    #[test]
    fn canonical_key_casefolds_and_strips_punctuation() {
        assert_eq!(canonical_key("  The Build  Is Green.  "), "the build is green");
        assert_eq!(canonical_key("\"Done!\""), "done");
    }
}
