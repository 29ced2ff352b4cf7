use std::path::Path;
use std::process::{Command, Output};

const SERVICE: &str = r#"package com.shop;

import org.apache.dubbo.config.annotation.DubboReference;
import com.shop.remote.InventoryClient;

public class OrderService {
    @DubboReference
    private InventoryClient inventoryClient;

    public void place(Order order) {
        inventoryClient.reserve(order);
    }

    public void audit() {}
}

class Order {
    private int amount;

    public int getAmount() { return amount; }
}
"#;

const UTIL: &str = r#"package com.shop.util;

public class Clock {
    public long now() { return System.currentTimeMillis(); }
}
"#;

fn seed_repo(root: &Path) {
    let pkg = root.join("app/src/com/shop");
    std::fs::create_dir_all(&pkg).unwrap();
    std::fs::write(pkg.join("OrderService.java"), SERVICE).unwrap();
    let util = root.join("app/src/com/shop/util");
    std::fs::create_dir_all(&util).unwrap();
    std::fs::write(util.join("Clock.java"), UTIL).unwrap();
}

fn run(root: &Path, args: &[&str]) -> Output {
    let bin = env!("CARGO_BIN_EXE_depslice");
    Command::new(bin)
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .expect("spawn depslice")
}

fn stdout_of(out: &Output) -> String {
    assert!(
        out.status.success(),
        "exit {:?}, stderr: {}",
        out.status.code(),
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).into_owned()
}

#[test]
fn calls_reports_classified_tree() {
    let dir = tempfile::tempdir().unwrap();
    seed_repo(dir.path());

    let out = run(
        dir.path(),
        &[
            "calls",
            "app/src/com/shop/OrderService.java",
            "--at",
            "OrderService#place(Order)",
        ],
    );
    let v: serde_json::Value = serde_json::from_str(&stdout_of(&out)).expect("calls emits json");
    assert_eq!(
        v.get("flags").and_then(|f| f.get("rpc")).and_then(|b| b.as_bool()),
        Some(true),
        "reserve() through a @DubboReference field should flag rpc"
    );
}

#[test]
fn slice_prints_a_minimized_file() {
    let dir = tempfile::tempdir().unwrap();
    seed_repo(dir.path());

    let out = run(
        dir.path(),
        &[
            "slice",
            "app/src/com/shop/OrderService.java",
            "--at",
            "OrderService#place(Order)",
        ],
    );
    let text = stdout_of(&out);
    assert!(text.contains("public void place(Order order)"));
    assert!(!text.contains("audit"));
    assert!(text.contains("import org.apache.dubbo.config.annotation.DubboReference;"));
}

#[test]
fn session_survives_add_show_remove_render() {
    let dir = tempfile::tempdir().unwrap();
    seed_repo(dir.path());

    // Add a whole file and one method, each in its own process.
    stdout_of(&run(dir.path(), &["add", "app/src/com/shop/util/Clock.java"]));
    stdout_of(&run(
        dir.path(),
        &[
            "add",
            "app/src/com/shop/OrderService.java",
            "OrderService#place(Order)",
        ],
    ));

    let shown = stdout_of(&run(dir.path(), &["show"]));
    let v: serde_json::Value = serde_json::from_str(&shown).expect("show emits json");
    let files: Vec<&str> = v["modules"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|m| m["packages"].as_array().unwrap())
        .flat_map(|p| p["files"].as_array().unwrap())
        .map(|f| f["filePath"].as_str().unwrap())
        .collect();
    assert!(files.contains(&"app/src/com/shop/util/Clock.java"));
    assert!(files.contains(&"app/src/com/shop/OrderService.java"));

    let rendered = stdout_of(&run(dir.path(), &["render"]));
    assert!(rendered.contains("public long now()"));
    assert!(rendered.contains("public void place(Order order)"));
    assert!(!rendered.contains("audit"));
    assert!(dir.path().join(".depslice/context.md").exists());

    // Removing the file drops it from the next render.
    stdout_of(&run(dir.path(), &["remove", "app/src/com/shop/util/Clock.java"]));
    let rendered = stdout_of(&run(dir.path(), &["render"]));
    assert!(!rendered.contains("Clock"));
    assert!(rendered.contains("place"));
}
