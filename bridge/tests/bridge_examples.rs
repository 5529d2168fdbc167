//! End-to-end bridge behaviour on small checkpoint-style mappings.

use state_bridge::{
    bridge, bridge_with, parse_rules, plan, BridgeError, BridgeOptions, ExprError, RenameStatus,
    StateDict,
};

fn dict<V: Clone>(entries: &[(&str, V)]) -> StateDict<V> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn plain_capture_rename() {
    let sd = dict(&[("layer.3.weight", "X")]);
    let out = bridge(&sd, "layer.{n}.weight, block.{n}.w", false, true).unwrap();
    assert_eq!(out, dict(&[("block.3.w", "X")]));
}

#[test]
fn arithmetic_rename() {
    let sd = dict(&[("layer.3.weight", "X")]);
    let out = bridge(&sd, "layer.{n}.weight, block.{(n+1)}.w", false, true).unwrap();
    assert_eq!(out, dict(&[("block.4.w", "X")]));
}

#[test]
fn reverse_with_arithmetic_is_rejected() {
    let sd = dict(&[("block.4.w", "X")]);
    let err = bridge(&sd, "layer.{n}.weight, block.{(n+1)}.w", true, true).unwrap_err();
    assert!(matches!(err, BridgeError::Configuration { line: Some(1), .. }));
}

#[test]
fn reverse_restores_original_keys() {
    let rules = "model.layers.{i}.self_attn.q_proj.weight, blk.{i}.attn_q.weight\n\
                 model.layers.{i}.mlp.up_proj.weight, blk.{i}.ffn_up.weight";
    let sd = dict(&[
        ("model.layers.0.self_attn.q_proj.weight", 0),
        ("model.layers.0.mlp.up_proj.weight", 1),
        ("model.layers.11.self_attn.q_proj.weight", 2),
        ("lm_head.weight", 3),
    ]);
    let forward = bridge(&sd, rules, false, true).unwrap();
    assert!(forward.contains_key("blk.11.attn_q.weight"));
    let back = bridge(&forward, rules, true, true).unwrap();
    assert_eq!(
        back.keys().collect::<Vec<_>>(),
        sd.keys().collect::<Vec<_>>()
    );
}

#[test]
fn collision_detection_toggle() {
    let sd = dict(&[("a.0.w", 1), ("a.1.w", 2)]);
    assert_eq!(
        bridge(&sd, "a.{n}.w, a.w", false, true).unwrap_err(),
        BridgeError::Collision { key: "a.w".into() }
    );
    assert_eq!(
        bridge(&sd, "a.{n}.w, a.w", false, false).unwrap(),
        dict(&[("a.w", 2)])
    );
}

#[test]
fn layer_renumbering_shift() {
    // Insert a new block at index 0 by shifting every existing block up.
    let sd = dict(&[("blocks.0.norm", 'a'), ("blocks.1.norm", 'b'), ("embed", 'c')]);
    let out = bridge(&sd, "blocks.{n}.norm, blocks.{(n + 1)}.norm", false, true).unwrap();
    assert_eq!(
        out,
        dict(&[("blocks.1.norm", 'a'), ("blocks.2.norm", 'b'), ("embed", 'c')])
    );
}

#[test]
fn interleaved_heads_with_floor_division_and_modulo() {
    let sd = dict(&[("h.5", 0), ("h.6", 1)]);
    let out = bridge(&sd, "h.{k}, g.{(k // 2)}.{(k % 2)}", false, true).unwrap();
    assert_eq!(out, dict(&[("g.2.1", 0), ("g.3.0", 1)]));
}

#[test]
fn arithmetic_outside_whitelist_fails_at_the_key() {
    let sd = dict(&[("untouched", 0), ("l.2", 1)]);
    let err = bridge(&sd, "l.{n}, l.{(n ** 2)}", false, true).unwrap_err();
    match err {
        BridgeError::Expression {
            key,
            expression,
            source,
            ..
        } => {
            assert_eq!(key, "l.2");
            assert_eq!(expression, "(2 ** 2)");
            assert!(matches!(source, ExprError::Invalid { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn whole_key_matching_option() {
    let sd = dict(&[("encoder.layer.1", 0), ("layer.1", 1)]);
    let options = BridgeOptions::default().anchored(true);
    let out = bridge_with(&sd, "layer.{n}, block.{n}", &options).unwrap();
    assert_eq!(out, dict(&[("encoder.layer.1", 0), ("block.1", 1)]));
}

#[test]
fn dry_run_plan_lists_every_key() {
    let sd = dict(&[("a.0.w", ()), ("b", ()), ("a.1.w", ())]);
    let rules = parse_rules("a.{n}.w, a.w", false).unwrap();
    let report = plan(sd.keys(), &rules).unwrap();
    assert_eq!(report.entries.len(), 3);
    assert_eq!(report.entries[0].renamed, "a.w");
    assert_eq!(report.entries[1].status, RenameStatus::Unchanged);
    assert_eq!(report.entries[2].status, RenameStatus::Collision);
}
