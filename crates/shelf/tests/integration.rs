use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

fn shelf_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("shelf");
    path
}

/// Upstream catalog: `items` products served `size` per page, in id order.
#[derive(Clone, Default)]
struct Stub {
    items: Arc<AtomicUsize>,
    fail_page: Arc<AtomicU32>,
}

impl Stub {
    fn with_items(n: usize) -> Self {
        let stub = Stub::default();
        stub.items.store(n, Ordering::SeqCst);
        stub
    }
}

async fn graphql(State(stub): State<Stub>, Json(body): Json<Value>) -> Response {
    let page = body["variables"]["page"].as_u64().unwrap_or(0) as usize;
    let size = body["variables"]["size"].as_u64().unwrap_or(0) as usize;
    if page as u32 == stub.fail_page.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "upstream down").into_response();
    }
    let total = stub.items.load(Ordering::SeqCst);
    let start = (page.saturating_sub(1) * size).min(total);
    let end = (start + size).min(total);
    let items: Vec<Value> = (start..end)
        .map(|i| {
            json!({
                "id": format!("p{}", i),
                "name": format!("Product {}", i),
                "active": "1",
                "rec_need": "0",
                "price": { "regularPrice": { "amount": { "value": format!("{}.50", i + 10) } } },
                "lekforms_url": format!("Forms||/forms/{}", i),
            })
        })
        .collect();
    Json(json!({ "data": { "productDetail": { "items": items } } })).into_response()
}

async fn listing(Query(q): Query<std::collections::HashMap<String, String>>) -> Html<String> {
    let body = match q.get("page").map(String::as_str) {
        Some("1") => {
            r#"<div class="product"><a href="/p/a">A</a></div>
               <div class="product"><a href="/p/b">B</a></div>"#
        }
        _ => "<p>end of catalog</p>",
    };
    Html(body.to_string())
}

async fn product(UrlPath(id): UrlPath<String>) -> Html<String> {
    Html(format!(
        r#"<div class="product-title"><h1>Drug {}</h1></div>
           <link itemprop="price" content="99.00">
           <img class="js-main-item-photo" src="/img/{}.jpg">"#,
        id, id
    ))
}

fn start_stub(stub: Stub) -> String {
    let (tx, rx) = std::sync::mpsc::channel::<SocketAddr>();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async move {
            let app = Router::new()
                .route("/graphql", post(graphql))
                .route("/catalog", get(listing))
                .route("/p/{id}", get(product))
                .with_state(stub);
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });
    format!("http://{}", rx.recv().unwrap())
}

fn setup_test_env(stub: Stub) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let base = start_stub(stub);

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(
        config_dir.join("product.graphql"),
        "query Products($page: Int, $size: Int) { productDetail(page: $page, size: $size) { items { id } } }",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/shelf.sqlite"

[sources.api]
kind = "graphql"
url = "{base}/graphql"
query_file = "product.graphql"
page_size = 2
delay_ms = 0

[sources.flat]
kind = "graphql"
url = "{base}/graphql"
query = "{{ productDetail {{ items {{ id }} }} }}"
page_size = 2
delay_ms = 0
store = "transformed"

[sources.pages]
kind = "html"
listing_url = "{base}/catalog?page={{page}}"
link_selector = ".product a"
delay_ms = 0
store = "transformed"
"#,
        root = root.display(),
        base = base,
    );

    let config_path = config_dir.join("shelf.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_shelf(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    run_shelf_logged(config_path, args, "warn")
}

fn run_shelf_logged(config_path: &Path, args: &[&str], log: &str) -> (String, String, bool) {
    let binary = shelf_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", log)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run shelf binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env(Stub::default());

    let (stdout, stderr, success) = run_shelf(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let (_, _, success) = run_shelf(&config_path, &["init"]);
    assert!(success, "Second init failed (not idempotent)");
}

#[test]
fn test_sources_lists_configured_sources() {
    let (_tmp, config_path) = setup_test_env(Stub::default());
    let (stdout, _, success) = run_shelf(&config_path, &["sources"]);
    assert!(success);
    assert!(stdout.contains("api"));
    assert!(stdout.contains("records_flat"));
    assert!(stdout.contains("html"));
}

#[test]
fn test_sync_until_empty_page() {
    let (_tmp, config_path) = setup_test_env(Stub::with_items(5));

    let (stdout, stderr, success) =
        run_shelf(&config_path, &["sync", "api", "--progress", "human"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("pages ingested: 3"));
    assert!(stdout.contains("added: 5"));
    assert!(stdout.contains("stopped: exhausted"));
    assert!(stdout.contains("checkpoint: page 3"));
    assert!(stderr.contains("page: 1/625  added: 2/2"));
    assert!(stderr.contains("page: 3/625  added: 2/2"));
}

#[test]
fn test_progress_line_is_logged_without_a_terminal() {
    let (_tmp, config_path) = setup_test_env(Stub::with_items(3));

    let (stdout, stderr, success) = run_shelf_logged(&config_path, &["sync", "api"], "info");
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stderr.contains("page: 1/625  added: 2/2"), "stderr={}", stderr);
    assert!(stderr.contains("page: 2/625  added: 2/2"), "stderr={}", stderr);
}

#[test]
fn test_resync_adds_only_new_items() {
    let stub = Stub::with_items(5);
    let (_tmp, config_path) = setup_test_env(stub.clone());

    run_shelf(&config_path, &["sync", "api"]);
    let (stdout, _, success) = run_shelf(&config_path, &["sync", "api"]);
    assert!(success);
    assert!(stdout.contains("items seen: 5"));
    assert!(stdout.contains("added: 0"));

    stub.items.store(7, Ordering::SeqCst);
    let (stdout, _, success) = run_shelf(&config_path, &["sync", "api"]);
    assert!(success);
    assert!(stdout.contains("added: 2"));
}

#[test]
fn test_page_limit_stops_the_run() {
    let (_tmp, config_path) = setup_test_env(Stub::with_items(10));
    let (stdout, _, success) = run_shelf(&config_path, &["sync", "api", "--page-limit", "2"]);
    assert!(success);
    assert!(stdout.contains("pages ingested: 2"));
    assert!(stdout.contains("added: 4"));
    assert!(stdout.contains("stopped: page limit reached"));
}

#[test]
fn test_failed_page_is_named_and_resume_continues_there() {
    let stub = Stub::with_items(6);
    stub.fail_page.store(2, Ordering::SeqCst);
    let (_tmp, config_path) = setup_test_env(stub.clone());

    let (stdout, stderr, success) = run_shelf(&config_path, &["sync", "api"]);
    assert!(!success, "sync should fail: stdout={}", stdout);
    assert!(stderr.contains("page 2:"), "stderr={}", stderr);

    stub.fail_page.store(0, Ordering::SeqCst);
    let (stdout, stderr, success) = run_shelf(&config_path, &["sync", "api", "--resume"]);
    assert!(success, "resume failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("first page: 2"));
    assert!(stdout.contains("added: 4"));
}

#[test]
fn test_dry_run_writes_nothing() {
    let (_tmp, config_path) = setup_test_env(Stub::with_items(3));
    let (stdout, _, success) = run_shelf(&config_path, &["sync", "api", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("(dry-run)"));
    assert!(stdout.contains("added: 3"));

    let (_, _, found) = run_shelf(&config_path, &["get", "api", "p0"]);
    assert!(!found, "dry run must not store records");
}

#[test]
fn test_get_raw_and_transformed_records() {
    let (_tmp, config_path) = setup_test_env(Stub::with_items(2));
    run_shelf(&config_path, &["sync", "api"]);
    run_shelf(&config_path, &["sync", "flat"]);

    let (stdout, stderr, success) = run_shelf(&config_path, &["get", "api", "p1"]);
    assert!(success, "get failed: stderr={}", stderr);
    let raw: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(raw["title"], "Product 1");
    assert_eq!(raw["price"], 11.5);
    assert_eq!(raw["payload"]["lekforms_url"], "Forms||/forms/1");

    let (stdout, _, success) = run_shelf(&config_path, &["get", "flat", "p1"]);
    assert!(success);
    let flat: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(flat["payload"]["price"], 11.5);
    assert_eq!(flat["payload"]["is_active"], true);
    assert_eq!(flat["payload"]["is_receipt"], false);
    assert_eq!(flat["payload"]["forms_url"], "/forms/1");
    assert_eq!(flat["payload"]["categories"], Value::Null);
}

#[test]
fn test_html_source_keys_by_page_url() {
    let (_tmp, config_path) = setup_test_env(Stub::default());
    let (stdout, stderr, success) = run_shelf(&config_path, &["sync", "pages"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("added: 2"));

    let (sources, _, _) = run_shelf(&config_path, &["sources"]);
    let base = sources
        .lines()
        .find_map(|l| l.trim().strip_prefix("listing: "))
        .and_then(|url| url.strip_suffix("/catalog?page={page}"))
        .unwrap()
        .to_string();

    let url = format!("{}/p/b", base);
    let (stdout, stderr, success) = run_shelf(&config_path, &["get", "pages", &url]);
    assert!(success, "get failed: stderr={}", stderr);
    let record: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(record["title"], "Drug b");
    assert_eq!(record["payload"]["price"], 99.0);
    assert_eq!(record["payload"]["images"][0]["size_1"], "/img/b.jpg");
}

#[test]
fn test_export_writes_one_file_per_record() {
    let (tmp, config_path) = setup_test_env(Stub::with_items(3));
    run_shelf(&config_path, &["sync", "flat"]);

    let out = tmp.path().join("results");
    let (stdout, stderr, success) =
        run_shelf(&config_path, &["export", "flat", "--dir", out.to_str().unwrap()]);
    assert!(success, "export failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stderr.contains("Exported 3 records"));

    let mut files: Vec<String> = fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    files.sort();
    assert_eq!(files, vec!["p0.json", "p1.json", "p2.json"]);

    let record: Value =
        serde_json::from_str(&fs::read_to_string(out.join("p2.json")).unwrap()).unwrap();
    assert_eq!(record["id"], "p2");
    assert_eq!(record["price"], 12.5);
}

#[test]
fn test_stats_after_sync() {
    let (_tmp, config_path) = setup_test_env(Stub::with_items(3));
    run_shelf(&config_path, &["sync", "api"]);
    let (stdout, _, success) = run_shelf(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Records:     3"));
    assert!(stdout.contains("api"));
}

#[test]
fn test_unknown_source_fails() {
    let (_tmp, config_path) = setup_test_env(Stub::default());
    let (_, stderr, success) = run_shelf(&config_path, &["sync", "nope"]);
    assert!(!success);
    assert!(stderr.contains("unknown source"));
}
