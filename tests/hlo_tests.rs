//! Graph file loading tests

use gpu_emission::LoweringError;
use gpu_emission::hlo::{
    FusionKind, HloOpcode, PrimitiveType, Shape, load_computation, parse_computation,
};
use gpu_emission::libcall::{
    DnnConvKind, LibraryCallKind, implemented_as_library_call, is_vector_reduction,
    library_call_kind,
};
use pretty_assertions::assert_eq;

const GEMM_WITH_BIAS: &str = r#"
{
  "name": "entry",
  "instructions": [
    { "name": "a", "op": { "kind": "parameter", "number": 0 },
      "shape": { "element_type": "f32", "dimensions": [16, 32] } },
    { "name": "b", "op": { "kind": "parameter", "number": 1 },
      "shape": { "element_type": "f32", "dimensions": [32, 8] } },
    { "name": "bias", "op": { "kind": "parameter", "number": 2 },
      "shape": { "element_type": "f32", "dimensions": [16, 8] } },
    { "name": "fusion",
      "op": { "kind": "fusion", "fusion_kind": "output", "body": {
        "name": "fused",
        "instructions": [
          { "name": "p0", "op": { "kind": "parameter", "number": 0 },
            "shape": { "element_type": "f32", "dimensions": [16, 32] } },
          { "name": "p1", "op": { "kind": "parameter", "number": 1 },
            "shape": { "element_type": "f32", "dimensions": [32, 8] } },
          { "name": "p2", "op": { "kind": "parameter", "number": 2 },
            "shape": { "element_type": "f32", "dimensions": [16, 8] } },
          { "name": "dot", "op": { "kind": "dot", "lhs_contracting_dimensions": [1],
                                   "rhs_contracting_dimensions": [0] },
            "shape": { "element_type": "f32", "dimensions": [16, 8] },
            "operands": ["p0", "p1"] },
          { "name": "add", "op": { "kind": "add" },
            "shape": { "element_type": "f32", "dimensions": [16, 8] },
            "operands": ["dot", "p2"] }
        ]
      } },
      "shape": { "element_type": "f32", "dimensions": [16, 8] },
      "operands": ["a", "b", "bias"] }
  ]
}
"#;

fn single(op: &str, shape: &str) -> String {
    format!(
        r#"{{ "name": "entry", "instructions": [
            {{ "name": "x", "op": {{ "kind": "parameter", "number": 0 }},
               "shape": {{ "element_type": "f32", "dimensions": [4, 8] }} }},
            {{ "name": "y", "op": {op}, "shape": {shape}, "operands": ["x"] }}
        ] }}"#
    )
}

// ==================== Loading ====================

#[test]
fn test_fusion_body_is_loaded() {
    let comp = parse_computation(GEMM_WITH_BIAS).unwrap();
    assert_eq!(comp.name, "entry");
    assert_eq!(comp.len(), 4);

    let fusion = comp.root().unwrap();
    assert_eq!(fusion.name(), "fusion");
    assert_eq!(fusion.fusion_kind(), Some(FusionKind::Output));
    assert_eq!(fusion.operand_count(), 3);

    let fused_root = fusion.fused_expression_root().unwrap();
    assert_eq!(fused_root.opcode(), HloOpcode::Add);
    let dot = fused_root.operand(0).unwrap();
    assert_eq!(dot.opcode(), HloOpcode::Dot);
    assert_eq!(dot.shape(), &Shape::new(PrimitiveType::F32, vec![16, 8]));
    // Batch dimensions default to none
    assert_eq!(dot.dot_dimension_numbers().unwrap().batch_dimensions_size(), 0);
}

#[test]
fn test_loaded_fusion_is_a_gemm() {
    let comp = parse_computation(GEMM_WITH_BIAS).unwrap();
    let fusion = comp.root().unwrap();
    assert_eq!(library_call_kind(fusion), Some(LibraryCallKind::Gemm));
    assert!(implemented_as_library_call(fusion));
    for param in comp.instructions().filter(|i| i.opcode() == HloOpcode::Parameter) {
        assert!(!implemented_as_library_call(param));
    }
}

#[test]
fn test_explicit_root() {
    let source = r#"{ "name": "entry", "root": "a", "instructions": [
        { "name": "a", "op": { "kind": "parameter", "number": 0 },
          "shape": { "element_type": "s32", "dimensions": [] } },
        { "name": "b", "op": { "kind": "constant" },
          "shape": { "element_type": "s32", "dimensions": [] } }
    ] }"#;
    let comp = parse_computation(source).unwrap();
    assert_eq!(comp.root().unwrap().name(), "a");
    assert!(comp.find("b").is_some());
}

#[test]
fn test_custom_call_is_classified() {
    let source = single(
        r#"{ "kind": "custom-call", "target": "__cudnn$convBackwardFilter" }"#,
        r#"{ "element_type": "f32", "dimensions": [4, 8] }"#,
    );
    let comp = parse_computation(&source).unwrap();
    let call = comp.root().unwrap();
    assert_eq!(call.custom_call_target(), Some("__cudnn$convBackwardFilter"));
    assert_eq!(
        library_call_kind(call),
        Some(LibraryCallKind::Convolution(DnnConvKind::BackwardFilter))
    );
}

#[test]
fn test_plain_convolution_is_a_kernel() {
    let source = single(
        r#"{ "kind": "convolution" }"#,
        r#"{ "element_type": "f32", "dimensions": [4, 8] }"#,
    );
    let comp = parse_computation(&source).unwrap();
    assert_eq!(library_call_kind(comp.root().unwrap()), None);
}

#[test]
fn test_reduce_with_layout() {
    // Input [4, 8] stored column-major; keeping dimension 1 alone is
    // always consecutive
    let source = r#"{ "name": "entry", "instructions": [
        { "name": "x", "op": { "kind": "parameter", "number": 0 },
          "shape": { "element_type": "f32", "dimensions": [4, 8], "minor_to_major": [0, 1] } },
        { "name": "r", "op": { "kind": "reduce", "dimensions": [0] },
          "shape": { "element_type": "f32", "dimensions": [8] },
          "operands": ["x"] }
    ] }"#;
    let comp = parse_computation(source).unwrap();
    let reduce = comp.root().unwrap();
    assert_eq!(reduce.reduce_dimensions(), Some(&[0usize][..]));
    assert_eq!(reduce.operand(0).unwrap().shape().layout.minor_to_major, vec![0, 1]);
    assert!(is_vector_reduction(reduce));
}

// ==================== Errors ====================

#[test]
fn test_duplicate_instruction() {
    let source = r#"{ "name": "entry", "instructions": [
        { "name": "a", "op": { "kind": "constant" },
          "shape": { "element_type": "f32", "dimensions": [] } },
        { "name": "a", "op": { "kind": "constant" },
          "shape": { "element_type": "f32", "dimensions": [] } }
    ] }"#;
    match parse_computation(source).unwrap_err() {
        LoweringError::DuplicateInstruction { name } => assert_eq!(name, "a"),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_operands_must_come_first() {
    let source = r#"{ "name": "entry", "instructions": [
        { "name": "sum", "op": { "kind": "add" },
          "shape": { "element_type": "f32", "dimensions": [] },
          "operands": ["a", "a"] },
        { "name": "a", "op": { "kind": "constant" },
          "shape": { "element_type": "f32", "dimensions": [] } }
    ] }"#;
    match parse_computation(source).unwrap_err() {
        LoweringError::UnknownOperand { node, operand } => {
            assert_eq!(node, "sum");
            assert_eq!(operand, "a");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_unknown_root() {
    let source = r#"{ "name": "entry", "root": "nope", "instructions": [
        { "name": "a", "op": { "kind": "constant" },
          "shape": { "element_type": "f32", "dimensions": [] } }
    ] }"#;
    assert!(matches!(
        parse_computation(source),
        Err(LoweringError::UnknownOperand { .. })
    ));
}

#[test]
fn test_empty_computation_has_no_root() {
    let err = parse_computation(r#"{ "name": "empty", "instructions": [] }"#).unwrap_err();
    match err {
        LoweringError::MissingRoot { computation } => assert_eq!(computation, "empty"),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_empty_fusion_body_is_rejected() {
    let source = single(
        r#"{ "kind": "fusion", "fusion_kind": "loop", "body": { "name": "fused", "instructions": [] } }"#,
        r#"{ "element_type": "f32", "dimensions": [4, 8] }"#,
    );
    assert!(matches!(
        parse_computation(&source),
        Err(LoweringError::MissingRoot { .. })
    ));
}

#[test]
fn test_layout_must_be_a_permutation() {
    for layout in ["[0, 0]", "[0]", "[1, 2]"] {
        let source = format!(
            r#"{{ "name": "entry", "instructions": [
                {{ "name": "x", "op": {{ "kind": "parameter", "number": 0 }},
                   "shape": {{ "element_type": "f32", "dimensions": [4, 8],
                               "minor_to_major": {layout} }} }}
            ] }}"#
        );
        assert!(
            matches!(
                parse_computation(&source),
                Err(LoweringError::MalformedInstruction { .. })
            ),
            "{}",
            layout
        );
    }
}

fn dot_graph(dot_op: &str, operands: &str) -> String {
    format!(
        r#"{{ "name": "entry", "instructions": [
            {{ "name": "a", "op": {{ "kind": "parameter", "number": 0 }},
               "shape": {{ "element_type": "f32", "dimensions": [16, 32] }} }},
            {{ "name": "b", "op": {{ "kind": "parameter", "number": 1 }},
               "shape": {{ "element_type": "f32", "dimensions": [32, 8] }} }},
            {{ "name": "dot", "op": {dot_op},
               "shape": {{ "element_type": "f32", "dimensions": [16, 8] }},
               "operands": {operands} }}
        ] }}"#
    )
}

#[test]
fn test_dot_dimension_numbers_are_checked() {
    let cases = [
        // No contracting dimension
        (
            r#"{ "kind": "dot", "lhs_contracting_dimensions": [],
                 "rhs_contracting_dimensions": [0] }"#,
            r#"["a", "b"]"#,
        ),
        // Two contracting dimensions
        (
            r#"{ "kind": "dot", "lhs_contracting_dimensions": [1],
                 "rhs_contracting_dimensions": [0, 1] }"#,
            r#"["a", "b"]"#,
        ),
        // Contracting dimension past the rank
        (
            r#"{ "kind": "dot", "lhs_contracting_dimensions": [2],
                 "rhs_contracting_dimensions": [0] }"#,
            r#"["a", "b"]"#,
        ),
        // Batch lists of different lengths
        (
            r#"{ "kind": "dot", "lhs_batch_dimensions": [0], "rhs_batch_dimensions": [],
                 "lhs_contracting_dimensions": [1], "rhs_contracting_dimensions": [0] }"#,
            r#"["a", "b"]"#,
        ),
        // Batch dimension past the rank
        (
            r#"{ "kind": "dot", "lhs_batch_dimensions": [5], "rhs_batch_dimensions": [0],
                 "lhs_contracting_dimensions": [1], "rhs_contracting_dimensions": [0] }"#,
            r#"["a", "b"]"#,
        ),
        // One operand
        (
            r#"{ "kind": "dot", "lhs_contracting_dimensions": [1],
                 "rhs_contracting_dimensions": [0] }"#,
            r#"["a"]"#,
        ),
    ];
    for (dot_op, operands) in cases {
        match parse_computation(&dot_graph(dot_op, operands)) {
            Err(LoweringError::MalformedInstruction { node, .. }) => assert_eq!(node, "dot"),
            other => panic!("{} accepted: {:?}", dot_op, other.map(|c| c.len())),
        }
    }
}

#[test]
fn test_well_formed_dot_is_a_gemm() {
    let source = dot_graph(
        r#"{ "kind": "dot", "lhs_contracting_dimensions": [1], "rhs_contracting_dimensions": [0] }"#,
        r#"["a", "b"]"#,
    );
    let comp = parse_computation(&source).unwrap();
    assert_eq!(library_call_kind(comp.root().unwrap()), Some(LibraryCallKind::Gemm));
}

#[test]
fn test_malformed_json() {
    for source in [
        "",
        "{",
        r#"{ "name": "entry" }"#,
        single(r#"{ "kind": "sort" }"#, r#"{ "element_type": "f32", "dimensions": [] }"#).as_str(),
        single(r#"{ "kind": "add" }"#, r#"{ "element_type": "f31", "dimensions": [] }"#).as_str(),
    ] {
        assert!(
            matches!(parse_computation(source), Err(LoweringError::GraphParse(_))),
            "{}",
            source
        );
    }
}

#[test]
fn test_load_from_file() {
    let path = std::env::temp_dir().join(format!("gpuemit-graph-{}.json", std::process::id()));
    std::fs::write(&path, GEMM_WITH_BIAS).unwrap();
    let loaded = load_computation(&path);
    std::fs::remove_file(&path).unwrap();
    assert_eq!(loaded.unwrap().len(), 4);

    assert!(matches!(
        load_computation(&path),
        Err(LoweringError::Read { .. })
    ));
}
