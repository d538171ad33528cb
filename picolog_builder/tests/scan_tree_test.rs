//! 扫描整棵源码树的集成测试：临时目录里摆一个小工程，
//! 扫描出的工件要能定位每个站点并解析类型闭包。

use std::fs;
use std::path::PathBuf;

use serde_json::json;

use picolog_builder::meta::{build_artifact, ByteOrder, SiteKind};
use picolog_builder::scanner;

struct TestTree {
    root: PathBuf,
}

impl TestTree {
    fn new(name: &str) -> Self {
        let root = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(&root).unwrap();
        Self { root }
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

impl Drop for TestTree {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

#[test]
fn test_scan_project_tree() {
    let tree = TestTree::new("picolog_builder_scan_tree");
    tree.write(
        "examples/hello_cpp/hello.cpp",
        "#include <cstdio>\n\
         \n\
         #include <picolog.h>\n\
         \n\
         int main() {\n\
         \x20   printf(\"hi\\n\");\n\
         \x20   LOG(INFO, \"hello world binary\");\n\
         }\n",
    );
    tree.write(
        "src/tasks.cpp",
        "void task() {\n\
         \x20   ENTER(DEBUG, \"TASK_LOOP\");\n\
         \x20   RECORD_AND_LOG_VALUE(INFO, \"LOOP_COUNT\", uint64_t, i, \"task: ${LOOP_COUNT}\");\n\
         \x20   EXIT(DEBUG, \"TASK_LOOP\");\n\
         }\n",
    );
    tree.write("README.md", "LOG(INFO, \"not scanned, wrong extension\");\n");

    let extensions: Vec<String> = [".c", ".cc", ".cpp", ".h", ".hpp"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let entries =
        scanner::scan_tree(&[tree.root.clone()], &[tree.root.clone()], &extensions).unwrap();
    assert_eq!(entries.len(), 4);

    let artifact = build_artifact(entries, serde_json::Map::new(), ByteOrder::Little).unwrap();

    // 站点 ID = crc32("相对路径:行号")，路径相对于 root
    let hello_id = crc32fast::hash(b"examples/hello_cpp/hello.cpp:7");
    let index = artifact.index();
    let hello = index.get(&hello_id).expect("hello site missing");
    assert_eq!(hello.source_file, "examples/hello_cpp/hello.cpp");
    assert_eq!(hello.source_line, 7);
    assert_eq!(hello.level, 20);
    assert_eq!(hello.msg.as_deref(), Some("hello world binary"));

    let loop_id = crc32fast::hash(b"src/tasks.cpp:3");
    let loop_site = index.get(&loop_id).expect("loop site missing");
    assert_eq!(loop_site.kind, SiteKind::Value);
    assert_eq!(loop_site.value_type.as_deref(), Some("Q"));

    // 工件按 id 排序
    let ids: Vec<u32> = artifact.entries.iter().map(|e| e.id).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[test]
fn test_scan_with_custom_types() {
    let tree = TestTree::new("picolog_builder_scan_types");
    tree.write(
        "custom_type.cpp",
        "int main() {\n\
         \x20   RECORD_AND_LOG_VALUE(INFO, \"test_rect\", Rect, r, \"rectangle: ${test_rect}\");\n\
         }\n",
    );

    let defs = match json!({
        "Point": {"x": "f", "y": "f", "dummy": "2i"},
        "Rect": {"pos": "Point", "size": "Point", "padding": "10x", "str": "10s", "bytes": "10s"},
        "Orphan": "8B"
    }) {
        serde_json::Value::Object(m) => m,
        _ => unreachable!(),
    };

    let entries = scanner::scan_tree(
        &[tree.root.clone()],
        &[tree.root.clone()],
        &[".cpp".to_string()],
    )
    .unwrap();
    let artifact = build_artifact(entries, defs, ByteOrder::Little).unwrap();

    assert_eq!(artifact.entries.len(), 1);
    assert_eq!(artifact.entries[0].value_type.as_deref(), Some("Rect"));
    // 类型表裁剪到引用闭包
    assert!(artifact.type_defs.contains_key("Rect"));
    assert!(artifact.type_defs.contains_key("Point"));
    assert!(!artifact.type_defs.contains_key("Orphan"));
}

#[test]
fn test_unresolved_site_type_is_fatal() {
    let tree = TestTree::new("picolog_builder_scan_unresolved");
    tree.write(
        "a.cpp",
        "RECORD_VALUE(INFO, \"v\", NoSuchType, value);\n",
    );

    let entries = scanner::scan_tree(
        &[tree.root.clone()],
        &[tree.root.clone()],
        &[".cpp".to_string()],
    )
    .unwrap();
    let result = build_artifact(entries, serde_json::Map::new(), ByteOrder::Little);
    assert!(result.is_err());
}

#[test]
fn test_artifact_save_and_load_roundtrip() {
    let tree = TestTree::new("picolog_builder_artifact_roundtrip");
    tree.write("a.cpp", "LOG(WARN, \"roundtrip\");\n");

    let entries = scanner::scan_tree(
        &[tree.root.clone()],
        &[tree.root.clone()],
        &[".cpp".to_string()],
    )
    .unwrap();
    let artifact = build_artifact(entries, serde_json::Map::new(), ByteOrder::Little).unwrap();

    let path = tree.root.join("meta.json");
    artifact.save(&path).unwrap();
    let loaded = picolog_builder::Artifact::load(&path).unwrap();
    assert_eq!(loaded.entries, artifact.entries);
    assert_eq!(loaded.byte_order, ByteOrder::Little);
}
