#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! MCP Server Integration Tests
//!
//! Drives a full JSON-RPC session over an in-memory pipe: handshake, tool
//! discovery, tool calls, and shutdown on EOF.

use std::fs;
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::time::Duration;

use semantic_db::commands::Services;
use semantic_db::config::Config;
use semantic_db::embeddings::Embedder;
use semantic_db::sync::{SYNCED_STATUS, SourcePuller, SyncController};
use semantic_db::mcp::{
    CallToolParams, ConnectionState, McpServer, ToolContent, ToolHandler, collection_server,
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, ReadHalf, WriteHalf};
use tokio::io::{DuplexStream, duplex, split};

/// Embeds text by its length and vowel count
struct ShapeEmbedder;

impl Embedder for ShapeEmbedder {
    fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let vowels = text.chars().filter(|c| "aeiou".contains(*c)).count();
                vec![text.len() as f32, vowels as f32]
            })
            .collect())
    }
}

fn setup_test_environment() -> (TempDir, Services) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let mut config = Config::load(temp_dir.path()).expect("defaults load");
    config.source.collections = [("behaviours".to_string(), "behaviours.json".into())]
        .into_iter()
        .collect();
    fs::create_dir_all(config.data_dir()).expect("should create data dir");
    fs::write(
        config.data_dir().join("behaviours.json"),
        json!([
            { "Name": "Patrol", "Description": "walk between points" },
            { "Name": "Guard", "Description": "stand still and watch the gate" },
            { "Name": "Flee", "Description": "run" }
        ])
        .to_string(),
    )
    .expect("should write source");

    let services = Services::with_embedder(config, Arc::new(ShapeEmbedder));
    assert!(services.controller.reload().is_complete());
    (temp_dir, services)
}

async fn build_server(services: &Services) -> Arc<McpServer> {
    Arc::new(
        collection_server(
            Arc::clone(&services.search),
            Arc::clone(&services.registry),
            Arc::clone(&services.controller),
        )
        .await,
    )
}

struct Client {
    writer: WriteHalf<DuplexStream>,
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
}

impl Client {
    async fn send(&mut self, message: Value) {
        let mut line = message.to_string();
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .await
            .expect("should write request");
    }

    async fn receive(&mut self) -> Value {
        let line = self
            .lines
            .next_line()
            .await
            .expect("should read reply")
            .expect("server replied before closing");
        serde_json::from_str(&line).expect("reply is JSON")
    }

    async fn call(&mut self, id: i64, method: &str, params: Value) -> Value {
        self.send(json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }))
            .await;
        let reply = self.receive().await;
        assert_eq!(reply["id"], id);
        reply
    }
}

fn connect(server: Arc<McpServer>) -> (Client, tokio::task::JoinHandle<anyhow::Result<()>>) {
    let (client_side, server_side) = duplex(64 * 1024);
    let (server_read, server_write) = split(server_side);
    let handle = tokio::spawn(server.serve(BufReader::new(server_read), server_write));

    let (client_read, client_write) = split(client_side);
    let client = Client {
        writer: client_write,
        lines: BufReader::new(client_read).lines(),
    };
    (client, handle)
}

fn tool_text(reply: &Value) -> Value {
    let text = reply["result"]["content"][0]["text"]
        .as_str()
        .expect("tool result has text");
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[tokio::test]
async fn full_session_over_a_pipe() {
    let (_temp_dir, services) = setup_test_environment();
    let server = build_server(&services).await;
    let (mut client, handle) = connect(Arc::clone(&server));

    let reply = client
        .call(
            1,
            "initialize",
            json!({
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": { "name": "integration-test", "version": "0.0.1" }
            }),
        )
        .await;
    assert_eq!(reply["result"]["serverInfo"]["name"], "semantic-db");
    client
        .send(json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .await;

    let reply = client.call(2, "tools/list", json!({})).await;
    assert_eq!(reply["result"]["tools"].as_array().map(Vec::len), Some(5));

    let reply = client
        .call(
            3,
            "tools/call",
            json!({
                "name": "search",
                "arguments": { "collection": "behaviours", "query": "walk around", "top_k": 2 }
            }),
        )
        .await;
    assert_eq!(reply["result"]["isError"], false);
    let names: Vec<String> = tool_text(&reply)["results"]
        .as_array()
        .expect("results array")
        .iter()
        .filter_map(|record| record["Name"].as_str().map(str::to_string))
        .collect();
    assert_eq!(names, vec!["Patrol", "Flee"]);

    let reply = client
        .call(4, "tools/call", json!({ "name": "reload", "arguments": {} }))
        .await;
    assert_eq!(tool_text(&reply)["status"], "reloaded");

    assert_eq!(server.connection_state().await, ConnectionState::Ready);

    drop(client);
    handle
        .await
        .expect("server task should not panic")
        .expect("server exits cleanly on EOF");
    assert_eq!(server.connection_state().await, ConnectionState::Closed);
}

#[tokio::test]
async fn tool_handlers_are_usable_directly() {
    let (_temp_dir, services) = setup_test_environment();
    let handler = semantic_db::mcp::SearchHandler::new(Arc::clone(&services.search));

    let params = CallToolParams {
        name: "search".to_string(),
        arguments: Some(
            [
                ("collection".to_string(), json!("behaviours")),
                ("query".to_string(), json!("run")),
                ("top_k".to_string(), json!(1)),
            ]
            .into_iter()
            .collect(),
        ),
    };
    let result = handler.handle(params).await.expect("handler succeeds");

    assert_eq!(result.is_error, Some(false));
    let ToolContent::Text { text } = &result.content[0];
    let payload: Value = serde_json::from_str(text).expect("payload is JSON");
    assert_eq!(payload["results"][0]["Name"], "Flee");
}

#[tokio::test]
async fn core_errors_are_tool_errors() {
    let (_temp_dir, services) = setup_test_environment();
    let server = build_server(&services).await;
    let (mut client, _handle) = connect(server);

    let reply = client
        .call(
            9,
            "tools/call",
            json!({
                "name": "list_records",
                "arguments": { "collection": "abilities" }
            }),
        )
        .await;

    assert_eq!(reply["result"]["isError"], true);
    assert_eq!(
        tool_text(&reply),
        Value::String("Collection not found: abilities".to_string())
    );
}

/// Blocks every pull until the test opens the gate
struct GatedPuller {
    gate: Mutex<mpsc::Receiver<()>>,
}

impl SourcePuller for GatedPuller {
    fn pull(&self) -> anyhow::Result<()> {
        let gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        gate.recv_timeout(Duration::from_secs(10))?;
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn searches_are_answered_while_a_sync_is_running() {
    let (_temp_dir, services) = setup_test_environment();
    let (open_gate, gate) = mpsc::channel();
    let controller = Arc::new(SyncController::new(
        Arc::clone(&services.registry),
        services.loader.clone(),
        services.config.collection_sources(),
        Arc::new(GatedPuller {
            gate: Mutex::new(gate),
        }),
    ));
    let server = Arc::new(
        collection_server(
            Arc::clone(&services.search),
            Arc::clone(&services.registry),
            controller,
        )
        .await,
    );
    let (mut client, handle) = connect(server);

    client
        .send(json!({
            "jsonrpc": "2.0", "id": 1, "method": "tools/call",
            "params": { "name": "sync", "arguments": {} }
        }))
        .await;
    client
        .send(json!({
            "jsonrpc": "2.0", "id": 2, "method": "tools/call",
            "params": {
                "name": "search",
                "arguments": { "collection": "behaviours", "query": "run", "top_k": 1 }
            }
        }))
        .await;

    let first = client.receive().await;
    assert_eq!(first["id"], 2, "search must not wait behind the pull");
    assert_eq!(tool_text(&first)["results"][0]["Name"], "Flee");

    open_gate.send(()).expect("puller is waiting");
    let second = client.receive().await;
    assert_eq!(second["id"], 1);
    assert_eq!(tool_text(&second)["status"], SYNCED_STATUS);

    drop(client);
    handle
        .await
        .expect("server task should not panic")
        .expect("server exits cleanly on EOF");
}

#[tokio::test]
async fn calls_in_flight_at_eof_are_still_answered() {
    let (_temp_dir, services) = setup_test_environment();
    let server = build_server(&services).await;

    let input = [
        json!({
            "jsonrpc": "2.0", "id": 1, "method": "tools/call",
            "params": { "name": "reload", "arguments": {} }
        }),
        json!({ "jsonrpc": "2.0", "id": 2, "method": "ping" }),
    ]
    .map(|message| message.to_string())
    .join("\n");

    let mut output = Vec::new();
    server
        .serve(input.as_bytes(), &mut output)
        .await
        .expect("serve succeeds");

    let mut ids: Vec<i64> = String::from_utf8(output)
        .expect("output is UTF-8")
        .lines()
        .map(|line| {
            let reply: Value = serde_json::from_str(line).expect("each line is JSON");
            reply["id"].as_i64().expect("numeric id")
        })
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);
}
