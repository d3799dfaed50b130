use std::io::Write;

use phpvm_core::ast::build::*;
use phpvm_core::ast::{from_json, to_json, AstNodeKind, BinaryOperator as B};

#[test]
fn trees_survive_a_json_round_trip_through_a_file() {
    let tree = script(vec![
        func("add", vec![param("a"), param_default("b", int(1))], vec![ret(bin(var("a"), B::Add, var("b")))]).at_line(2),
        echo(call("add", vec![int(41)])).at_line(5),
    ]);
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(to_json(&tree).expect("serialize").as_bytes()).expect("write");
    let text = std::fs::read_to_string(file.path()).expect("read back");
    let back = from_json(&text).expect("deserialize");
    assert_eq!(back, tree);
}

#[test]
fn parser_output_with_optional_fields_omitted() {
    let src = r#"{
        "node": "Script",
        "body": [
            { "node": "Echo", "args": [ { "node": "String", "value": "hi" } ], "location": { "file": "x.php", "line": 3, "column": 1 } }
        ]
    }"#;
    let tree = from_json(src).expect("parse");
    let AstNodeKind::Script { body } = &tree.kind else { panic!("not a script: {}", tree) };
    assert_eq!(body.len(), 1);
    assert_eq!(body[0].line(), 3);
}

#[test]
fn unknown_node_kinds_are_rejected() {
    assert!(from_json(r#"{ "node": "Teleport" }"#).is_err());
}

#[test]
fn nodes_serialize_flat_with_the_tag_beside_their_fields() {
    let tree = script(vec![echo(string("hi")).at_line(4)]);
    let json: serde_json::Value = serde_json::from_str(&to_json(&tree).expect("serialize")).expect("valid json");
    assert_eq!(json["node"], "Script");
    assert!(json.get("kind").is_none(), "{}", json);
    let stmt = &json["body"][0];
    assert_eq!(stmt["node"], "Echo");
    assert_eq!(stmt["location"]["line"], 4);
    assert_eq!(stmt["args"][0]["value"], "hi");
}
