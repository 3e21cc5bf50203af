//! MCP Protocol Implementation Tests
//!
//! Tool definitions, request routing and tool results against an in-memory
//! registry.

#[cfg(test)]
mod tool_definition_tests {
    use crate::mcp::tools::*;

    #[test]
    fn search_tool_definition() {
        let tool = SearchHandler::tool_definition();
        assert_eq!(tool.name, "search");

        let schema = tool.input_schema;
        let properties = schema["properties"].as_object().expect("has properties");
        assert!(properties.contains_key("collection"));
        assert!(properties.contains_key("query"));
        assert!(properties.contains_key("top_k"));
        assert_eq!(schema["properties"]["top_k"]["type"], "integer");

        let required = schema["required"].as_array().expect("has required array");
        assert_eq!(required.len(), 2);
        assert_eq!(required[0], "collection");
        assert_eq!(required[1], "query");
    }

    #[test]
    fn list_records_tool_definition() {
        let tool = ListRecordsHandler::tool_definition();
        assert_eq!(tool.name, "list_records");

        let required = tool.input_schema["required"]
            .as_array()
            .expect("has required array");
        assert_eq!(required.len(), 1);
        assert_eq!(required[0], "collection");
    }

    #[test]
    fn parameterless_tool_definitions() {
        for tool in [
            ListCollectionsHandler::tool_definition(),
            ReloadHandler::tool_definition(),
            SyncHandler::tool_definition(),
        ] {
            let properties = tool.input_schema["properties"]
                .as_object()
                .expect("has properties");
            assert!(properties.is_empty(), "{} takes no arguments", tool.name);
            assert!(tool.description.is_some());
        }
    }
}

#[cfg(test)]
mod server_tests {
    use std::fs;
    use std::sync::Arc;

    use serde_json::{Value, json};
    use tempfile::TempDir;

    use crate::collection::{CollectionLoader, CollectionSource};
    use crate::embeddings::Embedder;
    use crate::embeddings::test_support::LetterEmbedder;
    use crate::mcp::protocol::{JsonRpcMessage, MCP_VERSION, error_codes, mcp_error_codes};
    use crate::mcp::{ConnectionState, McpServer, collection_server};
    use crate::registry::CollectionRegistry;
    use crate::search::SearchService;
    use crate::sync::{SourcePuller, SyncController};

    struct Puller(bool);

    impl SourcePuller for Puller {
        fn pull(&self) -> anyhow::Result<()> {
            if self.0 {
                Ok(())
            } else {
                anyhow::bail!("remote rejected the pull")
            }
        }
    }

    async fn server(pull_succeeds: bool) -> (McpServer, TempDir) {
        let dir = TempDir::new().expect("should create temp dir");
        let path = dir.path().join("abilities.json");
        fs::write(
            &path,
            json!([
                { "Name": "Fireball", "Description": "hurl a ball of fire" },
                { "Name": "Frost Nova", "Description": "freeze nearby enemies" },
                { "Name": "Untitled" },
                { "Name": "Blink", "Description": "teleport a short distance" }
            ])
            .to_string(),
        )
        .expect("should write source");

        let registry = Arc::new(CollectionRegistry::new());
        let embedder: Arc<dyn Embedder> = Arc::new(LetterEmbedder::new(8));
        let controller = Arc::new(SyncController::new(
            Arc::clone(&registry),
            CollectionLoader::new(Arc::clone(&embedder)),
            vec![CollectionSource::new("abilities", path)],
            Arc::new(Puller(pull_succeeds)),
        ));
        assert!(controller.reload().is_complete());
        let service = Arc::new(SearchService::new(Arc::clone(&registry), embedder, 3));

        (collection_server(service, registry, controller).await, dir)
    }

    async fn request(server: &McpServer, method: &str, params: Value) -> Value {
        let line = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        let reply = server
            .handle_line(&line.to_string())
            .await
            .expect("requests always get a reply");
        serde_json::to_value(reply).expect("reply serializes")
    }

    async fn call_tool(server: &McpServer, name: &str, arguments: Value) -> (bool, Value) {
        let reply = request(
            server,
            "tools/call",
            json!({ "name": name, "arguments": arguments }),
        )
        .await;
        let result = &reply["result"];
        let text = result["content"][0]["text"]
            .as_str()
            .expect("tool results carry text");
        let is_error = result["isError"].as_bool().unwrap_or(false);
        let payload = serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.into()));
        (is_error, payload)
    }

    #[tokio::test]
    async fn initialize_handshake() {
        let (server, _dir) = server(true).await;
        assert_eq!(server.connection_state().await, ConnectionState::Uninitialized);

        let reply = request(
            &server,
            "initialize",
            json!({
                "protocolVersion": MCP_VERSION,
                "capabilities": {},
                "clientInfo": { "name": "test-client", "version": "1.0.0" }
            }),
        )
        .await;
        assert_eq!(reply["result"]["protocolVersion"], MCP_VERSION);
        assert_eq!(reply["result"]["serverInfo"]["name"], "semantic-db");
        assert!(reply["result"]["capabilities"]["tools"].is_object());
        assert_eq!(server.connection_state().await, ConnectionState::Initializing);

        let notification = json!({ "jsonrpc": "2.0", "method": "initialized" });
        assert!(server.handle_line(&notification.to_string()).await.is_none());
        assert_eq!(server.connection_state().await, ConnectionState::Ready);
    }

    #[tokio::test]
    async fn unsupported_protocol_version() {
        let (server, _dir) = server(true).await;
        let reply = request(
            &server,
            "initialize",
            json!({
                "protocolVersion": "1999-01-01",
                "capabilities": {},
                "clientInfo": { "name": "test-client", "version": "1.0.0" }
            }),
        )
        .await;
        assert_eq!(
            reply["error"]["code"],
            mcp_error_codes::INVALID_PROTOCOL_VERSION
        );
    }

    #[tokio::test]
    async fn tools_are_listed_by_name() {
        let (server, _dir) = server(true).await;
        let reply = request(&server, "tools/list", json!({})).await;

        let names: Vec<&str> = reply["result"]["tools"]
            .as_array()
            .expect("tools array")
            .iter()
            .filter_map(|tool| tool["name"].as_str())
            .collect();
        assert_eq!(
            names,
            vec!["list_collections", "list_records", "reload", "search", "sync"]
        );
    }

    #[tokio::test]
    async fn search_returns_records_verbatim() {
        let (server, _dir) = server(true).await;
        let (is_error, payload) = call_tool(
            &server,
            "search",
            json!({ "collection": "abilities", "query": "ball of fire", "top_k": 1 }),
        )
        .await;

        assert!(!is_error);
        assert_eq!(
            payload,
            json!({ "results": [{ "Name": "Fireball", "Description": "hurl a ball of fire" }] })
        );
    }

    #[tokio::test]
    async fn search_uses_default_top_k() {
        let (server, _dir) = server(true).await;
        let (_, payload) = call_tool(
            &server,
            "search",
            json!({ "collection": "abilities", "query": "fire" }),
        )
        .await;
        assert_eq!(payload["results"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn non_positive_top_k_returns_nothing() {
        let (server, _dir) = server(true).await;
        for top_k in [0, -4] {
            let (is_error, payload) = call_tool(
                &server,
                "search",
                json!({ "collection": "abilities", "query": "fire", "top_k": top_k }),
            )
            .await;
            assert!(!is_error);
            assert_eq!(payload, json!({ "results": [] }));
        }
    }

    #[tokio::test]
    async fn unknown_collection_is_a_tool_error() {
        let (server, _dir) = server(true).await;
        let (is_error, payload) = call_tool(
            &server,
            "search",
            json!({ "collection": "spells", "query": "fire" }),
        )
        .await;

        assert!(is_error);
        assert_eq!(payload, Value::String("Collection not found: spells".into()));
    }

    #[tokio::test]
    async fn missing_argument_is_invalid_params() {
        let (server, _dir) = server(true).await;
        let reply = request(
            &server,
            "tools/call",
            json!({ "name": "search", "arguments": { "collection": "abilities" } }),
        )
        .await;

        assert_eq!(reply["error"]["code"], error_codes::INVALID_PARAMS);
        assert!(
            reply["error"]["message"]
                .as_str()
                .is_some_and(|m| m.contains("query"))
        );
    }

    #[tokio::test]
    async fn unknown_tool_and_method() {
        let (server, _dir) = server(true).await;

        let reply = request(&server, "tools/call", json!({ "name": "search_docs" })).await;
        assert_eq!(reply["error"]["code"], mcp_error_codes::TOOL_NOT_FOUND);

        let reply = request(&server, "resources/list", json!({})).await;
        assert_eq!(reply["error"]["code"], error_codes::METHOD_NOT_FOUND);
        assert_eq!(reply["id"], 1);
    }

    #[tokio::test]
    async fn malformed_messages() {
        let (server, _dir) = server(true).await;

        let reply = server.handle_line("{ not json").await.expect("reply");
        let JsonRpcMessage::ErrorResponse(error) = reply else {
            panic!("expected an error response");
        };
        assert_eq!(error.error.code, error_codes::PARSE_ERROR);
        assert!(error.id.is_none());

        let reply = server
            .handle_line(r#"{"jsonrpc": "1.0", "id": 7, "method": "ping"}"#)
            .await
            .expect("reply");
        let reply = serde_json::to_value(reply).expect("reply serializes");
        assert_eq!(reply["error"]["code"], error_codes::INVALID_REQUEST);
        assert_eq!(reply["id"], 7);
    }

    #[tokio::test]
    async fn list_tools_report_collections() {
        let (server, _dir) = server(true).await;

        let (_, payload) = call_tool(&server, "list_collections", json!({})).await;
        let collections = payload["collections"].as_array().expect("collections");
        assert_eq!(collections.len(), 1);
        assert_eq!(collections[0]["name"], "abilities");
        assert_eq!(collections[0]["records"], 3);
        assert_eq!(collections[0]["skipped"], 1);
        assert_eq!(collections[0]["dimension"], 8);

        let (_, payload) = call_tool(
            &server,
            "list_records",
            json!({ "collection": "abilities" }),
        )
        .await;
        let names: Vec<&str> = payload["records"]
            .as_array()
            .expect("records")
            .iter()
            .filter_map(|record| record["Name"].as_str())
            .collect();
        assert_eq!(names, vec!["Fireball", "Frost Nova", "Blink"]);
    }

    #[tokio::test]
    async fn reload_and_sync_report_status() {
        let (server, _dir) = server(true).await;

        let (is_error, payload) = call_tool(&server, "reload", json!({})).await;
        assert!(!is_error);
        assert_eq!(payload["status"], "reloaded");
        assert_eq!(payload["collections"]["abilities"]["status"], "loaded");

        let (is_error, payload) = call_tool(&server, "sync", json!({})).await;
        assert!(!is_error);
        assert_eq!(payload["status"], "updated and reloaded from Git");
    }

    #[tokio::test]
    async fn failed_sync_reports_error() {
        let (server, _dir) = server(false).await;

        let (is_error, payload) = call_tool(&server, "sync", json!({})).await;
        assert!(is_error);
        assert!(
            payload["error"]
                .as_str()
                .is_some_and(|m| m.contains("remote rejected the pull"))
        );
    }

    #[tokio::test]
    async fn serve_answers_each_request_line() {
        let (server, _dir) = server(true).await;
        let input = [
            json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }).to_string(),
            String::new(),
            json!({ "jsonrpc": "2.0", "method": "notifications/cancelled" }).to_string(),
            json!({ "jsonrpc": "2.0", "id": "two", "method": "tools/list" }).to_string(),
        ]
        .join("\n");

        let server = Arc::new(server);
        let mut output = Vec::new();
        Arc::clone(&server)
            .serve(input.as_bytes(), &mut output)
            .await
            .expect("serve succeeds");

        let replies: Vec<Value> = String::from_utf8(output)
            .expect("output is UTF-8")
            .lines()
            .map(|line| serde_json::from_str(line).expect("each line is JSON"))
            .collect();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["id"], 1);
        assert_eq!(replies[0]["result"], json!({}));
        assert_eq!(replies[1]["id"], "two");
        assert_eq!(server.connection_state().await, ConnectionState::Closed);
    }
}
