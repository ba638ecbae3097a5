//! Accessibility matcher.
//!
//! Finds the snapshot node a natural-language prompt refers to and turns it
//! into a [`SelectorResult`] that later actions can resolve. Matching is a
//! pure read over the supplied tree: no I/O, no shared state.

use selectorfinder_core::{MatchError, MatchStrategy};
use serde::{Deserialize, Serialize};

use super::snapshot::AXNode;

/// A matched node together with how strongly it matched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored<'a> {
    pub node: &'a AXNode,
    pub confidence: f64,
}

/// The answer handed back to the caller of `get_selector`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorResult {
    pub selector: String,
    pub description: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl SelectorResult {
    /// Build the result for a matched node. `prefix` is the resolver's
    /// locator scheme and is prepended verbatim to the node's ref.
    pub fn from_node(node: &AXNode, prefix: &str, confidence: f64) -> Result<Self, MatchError> {
        let description = if !node.name.is_empty() {
            node.name.clone()
        } else {
            node.role.clone()
        };

        let ref_id = node
            .ref_id
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| MatchError::Unreferenced {
                description: description.clone(),
            })?;

        Ok(Self {
            selector: format!("{}{}", prefix, ref_id),
            description,
            role: node.role.clone(),
            confidence: Some(confidence),
        })
    }
}

fn check_inputs<'a>(root: Option<&'a AXNode>, prompt: &str) -> Result<&'a AXNode, MatchError> {
    if prompt.trim().is_empty() {
        return Err(MatchError::EmptyPrompt);
    }
    root.ok_or(MatchError::EmptySnapshot)
}

/// First node in pre-order whose lowercased name or role contains the
/// lowercased prompt.
///
/// Earlier and shallower nodes win over later or deeper ones; that ordering
/// is the tie-break policy.
pub fn find_match<'a>(root: Option<&'a AXNode>, prompt: &str) -> Result<&'a AXNode, MatchError> {
    let root = check_inputs(root, prompt)?;
    let needle = prompt.to_lowercase();

    root.iter()
        .find(|node| {
            node.name.to_lowercase().contains(&needle) || node.role.to_lowercase().contains(&needle)
        })
        .ok_or_else(|| MatchError::NoMatch {
            prompt: prompt.to_string(),
        })
}

/// Split a prompt into distinct lowercase alphanumeric tokens, keeping
/// first-seen order.
fn tokenize(prompt: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for token in prompt
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
    {
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens
}

/// Fraction of `tokens` found in the node's name or role.
fn token_score(node: &AXNode, tokens: &[String]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let name = node.name.to_lowercase();
    let role = node.role.to_lowercase();
    let hits = tokens
        .iter()
        .filter(|t| name.contains(t.as_str()) || role.contains(t.as_str()))
        .count();
    hits as f64 / tokens.len() as f64
}

/// Node with the highest token-overlap score; ties go to the earlier node
/// in pre-order. A tree where every score is zero is a `NoMatch`.
pub fn find_best_match<'a>(root: Option<&'a AXNode>, prompt: &str) -> Result<Scored<'a>, MatchError> {
    let root = check_inputs(root, prompt)?;
    let tokens = tokenize(prompt);

    let mut best: Option<Scored<'a>> = None;
    for node in root.iter() {
        let confidence = token_score(node, &tokens);
        if confidence <= 0.0 {
            continue;
        }
        if best.map_or(true, |b| confidence > b.confidence) {
            best = Some(Scored { node, confidence });
            if confidence >= 1.0 {
                break;
            }
        }
    }

    best.ok_or_else(|| MatchError::NoMatch {
        prompt: prompt.to_string(),
    })
}

/// Run the chosen strategy and build the selector for the winning node.
pub fn select(
    root: Option<&AXNode>,
    prompt: &str,
    strategy: MatchStrategy,
    prefix: &str,
) -> Result<SelectorResult, MatchError> {
    let scored = match strategy {
        MatchStrategy::FirstMatch => Scored {
            node: find_match(root, prompt)?,
            confidence: 1.0,
        },
        MatchStrategy::TokenOverlap => find_best_match(root, prompt)?,
    };
    SelectorResult::from_node(scored.node, prefix, scored.confidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_tree() -> AXNode {
        AXNode::new("document", "").with_children(vec![
            AXNode::new("button", "Submit").with_ref("s1e4"),
        ])
    }

    #[test]
    fn test_preorder_precedence_ignores_depth() {
        // A is deep but earlier in pre-order; B is shallow but later.
        let tree = AXNode::new("document", "").with_ref("s1e1").with_children(vec![
            AXNode::new("group", "").with_ref("s1e2").with_children(vec![
                AXNode::new("list", "").with_ref("s1e3").with_children(vec![
                    AXNode::new("link", "Save draft").with_ref("s1e4"),
                ]),
            ]),
            AXNode::new("button", "Save").with_ref("s1e5"),
        ]);
        let found = find_match(Some(&tree), "save").unwrap();
        assert_eq!(found.ref_id.as_deref(), Some("s1e4"));
    }

    #[test]
    fn test_parent_wins_over_matching_child() {
        let tree = AXNode::new("navigation", "Main menu").with_ref("p").with_children(vec![
            AXNode::new("link", "Menu item").with_ref("c"),
        ]);
        let found = find_match(Some(&tree), "menu").unwrap();
        assert_eq!(found.ref_id.as_deref(), Some("p"));
    }

    #[test]
    fn test_role_or_name_matches() {
        let tree = AXNode::new("document", "").with_children(vec![
            AXNode::new("textbox", "Email").with_ref("a"),
            AXNode::new("heading", "Search results").with_ref("b"),
        ]);
        // role only
        assert_eq!(find_match(Some(&tree), "textbox").unwrap().ref_id.as_deref(), Some("a"));
        // name only
        assert_eq!(find_match(Some(&tree), "results").unwrap().ref_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_case_insensitive() {
        let tree = AXNode::new("document", "").with_children(vec![
            AXNode::new("button", "submit button").with_ref("x"),
        ]);
        assert_eq!(find_match(Some(&tree), "Submit").unwrap().ref_id.as_deref(), Some("x"));
        assert_eq!(find_match(Some(&tree), "BUTTON").unwrap().ref_id.as_deref(), Some("x"));
    }

    #[test]
    fn test_no_match_never_returns_root() {
        let err = find_match(Some(&scenario_tree()), "cancel").unwrap_err();
        assert_eq!(err, MatchError::NoMatch { prompt: "cancel".to_string() });
        assert!(err.to_string().contains("cancel"));
    }

    #[test]
    fn test_empty_prompt_rejected_before_traversal() {
        // Every node would match an empty needle.
        let tree = scenario_tree();
        assert_eq!(find_match(Some(&tree), ""), Err(MatchError::EmptyPrompt));
        assert_eq!(find_match(Some(&tree), "   "), Err(MatchError::EmptyPrompt));
        // Checked before the snapshot is even looked at.
        assert_eq!(find_match(None, " \t"), Err(MatchError::EmptyPrompt));
        assert_eq!(find_best_match(Some(&tree), "  ").unwrap_err(), MatchError::EmptyPrompt);
    }

    #[test]
    fn test_missing_snapshot() {
        assert_eq!(find_match(None, "submit"), Err(MatchError::EmptySnapshot));
        assert_eq!(
            select(None, "submit", MatchStrategy::FirstMatch, "aria-ref=").unwrap_err(),
            MatchError::EmptySnapshot
        );
    }

    #[test]
    fn test_idempotent() {
        let tree = scenario_tree();
        let first = select(Some(&tree), "submit", MatchStrategy::FirstMatch, "aria-ref=");
        let second = select(Some(&tree), "submit", MatchStrategy::FirstMatch, "aria-ref=");
        assert_eq!(first, second);
        assert_eq!(
            find_match(Some(&tree), "cancel"),
            find_match(Some(&tree), "cancel")
        );
    }

    #[test]
    fn test_first_match_selector_result() {
        let tree = scenario_tree();
        let result = select(Some(&tree), "submit", MatchStrategy::FirstMatch, "aria-ref=").unwrap();
        assert_eq!(
            result,
            SelectorResult {
                selector: "aria-ref=s1e4".to_string(),
                description: "Submit".to_string(),
                role: "button".to_string(),
                confidence: Some(1.0),
            }
        );
    }

    #[test]
    fn test_multi_word_prompt_first_match_needs_whole_phrase() {
        let tree = scenario_tree();
        assert!(matches!(
            find_match(Some(&tree), "submit button"),
            Err(MatchError::NoMatch { .. })
        ));
    }

    #[test]
    fn test_token_overlap_scenario() {
        let tree = scenario_tree();
        let result = select(Some(&tree), "submit button", MatchStrategy::TokenOverlap, "aria-ref=").unwrap();
        assert_eq!(result.selector, "aria-ref=s1e4");
        assert_eq!(result.description, "Submit");
        assert_eq!(result.role, "button");
        assert_eq!(result.confidence, Some(1.0));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "selector": "aria-ref=s1e4",
                "description": "Submit",
                "role": "button",
                "confidence": 1.0
            })
        );
    }

    #[test]
    fn test_token_overlap_prefers_higher_score_then_order() {
        let tree = AXNode::new("document", "").with_children(vec![
            AXNode::new("button", "Log in").with_ref("a"),
            AXNode::new("textbox", "Email address").with_ref("b"),
            AXNode::new("textbox", "Email").with_ref("c"),
        ]);
        let best = find_best_match(Some(&tree), "email input textbox").unwrap();
        assert_eq!(best.node.ref_id.as_deref(), Some("b"));
        assert!((best.confidence - 2.0 / 3.0).abs() < 1e-9);

        let err = find_best_match(Some(&tree), "checkout").unwrap_err();
        assert_eq!(err, MatchError::NoMatch { prompt: "checkout".to_string() });
    }

    #[test]
    fn test_token_overlap_punctuation_only_prompt_is_no_match() {
        let tree = scenario_tree();
        let err = find_best_match(Some(&tree), "!!").unwrap_err();
        assert!(matches!(err, MatchError::NoMatch { .. }));
    }

    #[test]
    fn test_description_falls_back_to_role() {
        let node = AXNode::new("checkbox", "").with_ref("r1");
        let result = SelectorResult::from_node(&node, "aria-ref=", 1.0).unwrap();
        assert_eq!(result.description, "checkbox");

        let bare = AXNode::default().with_ref("r2");
        assert_eq!(SelectorResult::from_node(&bare, "aria-ref=", 1.0).unwrap().description, "");
    }

    #[test]
    fn test_unreferenced_node_is_an_error() {
        let node = AXNode::new("button", "Go");
        let err = SelectorResult::from_node(&node, "aria-ref=", 1.0).unwrap_err();
        assert_eq!(err, MatchError::Unreferenced { description: "Go".to_string() });
    }

    #[test]
    fn test_prefix_is_opaque() {
        let tree = scenario_tree();
        let result = select(Some(&tree), "submit", MatchStrategy::FirstMatch, "ref:").unwrap();
        assert_eq!(result.selector, "ref:s1e4");
    }

    #[test]
    fn test_deep_tree_does_not_overflow() {
        let mut node = AXNode::new("button", "Deep target").with_ref("leaf");
        for i in 0..50_000 {
            node = AXNode::new("group", "").with_ref(&format!("g{}", i)).with_children(vec![node]);
        }
        let found = find_match(Some(&node), "deep target").unwrap();
        assert_eq!(found.ref_id.as_deref(), Some("leaf"));

        // AXNode drops recursively; take the chain apart one level at a time.
        let mut stack = vec![node];
        while let Some(mut n) = stack.pop() {
            stack.append(&mut n.children);
        }
    }
}
