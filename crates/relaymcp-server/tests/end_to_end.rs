//! Client/server behaviour over the in-memory and TCP transports

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use relaymcp_client::{Client, ClientConfig};
use relaymcp_core::types::{ContentItem, Resource, Tool, ToolOutput};
use relaymcp_core::{ErrorCode, McpResult};
use relaymcp_server::{BackendConfig, RoutingRules, Server, ServerConfig};
use relaymcp_transport::{
    ChannelTransport, MessageContext, TcpClientTransport, TcpServerTransport, Transport,
    TransportConfig,
};

fn serve(server: &Server) -> Client {
    let (client_end, server_end) = ChannelTransport::pair(TransportConfig::default());
    server.start(Arc::new(server_end)).unwrap();
    let client = Client::new(
        Arc::new(client_end),
        ClientConfig::default().with_request_timeout_ms(2_000),
    );
    client.connect().unwrap();
    client
}

fn counting_resource_server(config: ServerConfig) -> (Server, Arc<AtomicUsize>) {
    let server = Server::new(config).unwrap();
    let reads = Arc::new(AtomicUsize::new(0));
    server.add_resource(Resource::new("example://alpha").with_name("Alpha"));
    let counter = Arc::clone(&reads);
    server.set_resource_handler(move |uri: &str| -> McpResult<Vec<ContentItem>> {
        counter.fetch_add(1, Ordering::SeqCst);
        match uri {
            "example://alpha" => Ok(vec![ContentItem::text("A")]),
            _ => Err(relaymcp_core::McpError::new(
                ErrorCode::ResourceNotFound,
                "Resource not found",
            )),
        }
    });
    (server, reads)
}

#[test]
fn test_read_resource_is_cached() {
    let (server, reads) = counting_resource_server(
        ServerConfig::builder()
            .access(vec!["example://*".into()], vec!["*".into()])
            .build(),
    );
    let client = serve(&server);
    let params = json!({"uri": "example://alpha"});

    let first = client.send_request("read_resource", Some(&params)).unwrap();
    assert_eq!(first, r#"{"contents":[{"uri":"example://alpha","text":"A"}]}"#);
    assert_eq!(reads.load(Ordering::SeqCst), 1);

    let second = client.send_request("read_resource", Some(&params)).unwrap();
    assert_eq!(second, first);
    assert_eq!(reads.load(Ordering::SeqCst), 1);
    assert_eq!(server.cache().len(), 1);

    client.stop();
    server.shutdown(Some(Duration::from_secs(1)));
}

#[test]
fn test_resource_outside_access_patterns() {
    let (server, reads) = counting_resource_server(
        ServerConfig::builder()
            .access(vec!["public://*".into()], vec!["*".into()])
            .build(),
    );
    let client = serve(&server);

    let err = client.read_resource("example://alpha").unwrap_err();
    assert_eq!(err.code, ErrorCode::Forbidden);
    assert_eq!(err.message, "Access denied to resource");
    assert_eq!(reads.load(Ordering::SeqCst), 0);

    client.stop();
    server.shutdown(None);
}

#[test]
fn test_tool_outside_access_patterns() {
    let server = Server::new(
        ServerConfig::builder()
            .access(vec!["*".into()], vec!["safe_*".into()])
            .build(),
    )
    .unwrap();
    server.add_tool(Tool::new("safe_echo"));
    server.add_tool(Tool::new("delete_all"));
    server.set_tool_handler(|_name: &str, args: &Value| -> McpResult<ToolOutput> {
        Ok(ToolOutput::success(vec![ContentItem::json(args)]))
    });
    let client = serve(&server);

    let err = client.call_tool("delete_all", None).unwrap_err();
    assert_eq!(err.code, ErrorCode::Forbidden);
    assert_eq!(err.message, "Access denied to tool");

    let output = client.call_tool("safe_echo", Some(&json!({"n": 1}))).unwrap();
    assert!(!output.is_error);
    assert_eq!(output.content[0].as_text(), r#"{"n":1}"#);

    client.stop();
    server.shutdown(None);
}

#[test]
fn test_batch_over_tcp() {
    let server = Server::new(ServerConfig::default()).unwrap();
    let transport = Arc::new(
        TcpServerTransport::bind("127.0.0.1:0", TransportConfig::default()).unwrap(),
    );
    let addr = transport.local_addr();
    server.start(transport).unwrap();

    let batch = r#"[{"jsonrpc":"2.0","id":1,"method":"ping","params":{}},{"jsonrpc":"2.0","method":"notify"},{"jsonrpc":"2.0","id":2,"method":"unknown","params":{}}]"#;
    let reply = raw_exchange(addr, batch);
    assert_eq!(
        reply,
        r#"[{"jsonrpc":"2.0","id":1,"result":{"message":"pong"}},{"jsonrpc":"2.0","id":2,"error":{"code":-32601,"message":"Method not found"}}]"#
    );

    assert!(server.shutdown(Some(Duration::from_secs(2))));
}

/// Send one framed payload and read one framed reply
fn raw_exchange(addr: std::net::SocketAddr, payload: &str) -> String {
    use std::io::{Read, Write};

    let mut stream = std::net::TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    stream
        .write_all(&(payload.len() as u32).to_be_bytes())
        .unwrap();
    stream.write_all(payload.as_bytes()).unwrap();

    let mut header = [0u8; 4];
    stream.read_exact(&mut header).unwrap();
    let mut body = vec![0u8; u32::from_be_bytes(header) as usize];
    stream.read_exact(&mut body).unwrap();
    String::from_utf8(body).unwrap()
}

#[test]
fn test_api_key_over_channel() {
    let server = Server::new(ServerConfig::builder().api_key("s3cret").build()).unwrap();
    server.add_tool(Tool::new("echo"));
    let client = serve(&server);

    // ping is answered without credentials
    assert_eq!(client.ping().unwrap(), "pong");

    let err = client.send_request("list_tools", None).unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidRequest);
    assert_eq!(err.message, "Authentication failed");

    let tools = client
        .send_request("list_tools", Some(&json!({"apiKey": "s3cret"})))
        .unwrap();
    let tools: Value = serde_json::from_str(&tools).unwrap();
    assert_eq!(tools["tools"][0]["name"], "echo");

    let err = client
        .send_request("list_tools", Some(&json!({"apiKey": "wrong"})))
        .unwrap_err();
    assert_eq!(err.message, "Authentication failed");

    client.stop();
    server.shutdown(None);
}

#[test]
fn test_rate_limit_over_channel() {
    let server = Server::new(ServerConfig::builder().rate_limit(60, 3).build()).unwrap();
    let client = serve(&server);

    for _ in 0..3 {
        assert_eq!(client.ping().unwrap(), "pong");
    }
    let err = client.ping().unwrap_err();
    assert_eq!(err.code, ErrorCode::TooManyRequests);
    assert_eq!(err.message, "Too many requests");

    client.stop();
    server.shutdown(None);
}

#[test]
fn test_oversized_payload_rejected() {
    let server = Server::new(ServerConfig::builder().max_message_size(128).build()).unwrap();
    let params = json!({"padding": "x".repeat(200)});
    let payload = relaymcp_core::jsonrpc::format_request(11, "ping", Some(&params));
    let reply = server
        .handle_message(payload.as_bytes(), &MessageContext::default())
        .unwrap();
    let reply: Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(reply["id"], 11);
    assert_eq!(reply["error"]["code"], -32600);
}

#[test]
fn test_metrics_round_trip() {
    let server = Server::new(ServerConfig::default()).unwrap();
    let client = serve(&server);

    client.ping().unwrap();
    client.ping().unwrap();
    let metrics = client.get_performance_metrics().unwrap();
    assert_eq!(metrics["requests"]["total"], 2);
    assert!(metrics["throughput"]["bytes_received"].as_u64().unwrap() > 0);

    client.reset_performance_metrics().unwrap();
    assert_eq!(server.metrics_json()["requests"]["total"], 1);

    client.stop();
    server.shutdown(None);
}

#[test]
fn test_gateway_forwards_to_backend() {
    // Backend answers tools locally over TCP
    let backend = Server::new(ServerConfig::builder().name("backend").build()).unwrap();
    backend.add_tool(Tool::new("remote_sum"));
    backend.set_tool_handler(|name: &str, args: &Value| -> McpResult<ToolOutput> {
        let sum = args["a"].as_i64().unwrap_or(0) + args["b"].as_i64().unwrap_or(0);
        Ok(ToolOutput::success(vec![ContentItem::text(format!("{name}={sum}"))]))
    });
    let backend_transport = Arc::new(
        TcpServerTransport::bind("127.0.0.1:0", TransportConfig::default()).unwrap(),
    );
    let backend_addr = backend_transport.local_addr();
    backend.start(backend_transport).unwrap();

    let front = Server::new(
        ServerConfig::builder()
            .name("front")
            .gateway(vec![BackendConfig {
                name: "sums".into(),
                address: backend_addr.to_string(),
                timeout_ms: 2_000,
                routing: RoutingRules {
                    tool_names: vec!["remote_sum".into()],
                    ..RoutingRules::default()
                },
            }])
            .build(),
    )
    .unwrap();
    front.add_tool(Tool::new("local"));
    let client = serve(&front);

    let output = client
        .call_tool("remote_sum", Some(&json!({"a": 2, "b": 3})))
        .unwrap();
    assert_eq!(output.content[0].as_text(), "remote_sum=5");

    // Unrouted methods stay local
    let tools = client.list_tools().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "local");

    client.stop();
    front.shutdown(Some(Duration::from_secs(2)));
    backend.shutdown(Some(Duration::from_secs(2)));
}

#[test]
fn test_gateway_unreachable_backend() {
    // Bind then drop to get a port with no listener
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let front = Server::new(
        ServerConfig::builder()
            .gateway(vec![BackendConfig {
                name: "gone".into(),
                address: addr.to_string(),
                timeout_ms: 200,
                routing: RoutingRules {
                    resource_prefixes: vec!["remote://".into()],
                    ..RoutingRules::default()
                },
            }])
            .build(),
    )
    .unwrap();
    let client = serve(&front);

    let err = client.read_resource("remote://x").unwrap_err();
    assert_eq!(err.code, ErrorCode::InternalError);
    assert_eq!(err.message, "Gateway failed to get backend connection.");

    client.stop();
    front.shutdown(None);
}

#[test]
fn test_tcp_client_against_server() {
    let server = Server::new(ServerConfig::default()).unwrap();
    server.add_resource(Resource::new("example://one"));
    let transport = Arc::new(
        TcpServerTransport::bind("127.0.0.1:0", TransportConfig::default()).unwrap(),
    );
    let addr = transport.local_addr();
    server.start(transport).unwrap();

    let client_transport: Arc<dyn Transport> = Arc::new(TcpClientTransport::new(
        addr.to_string(),
        TransportConfig::default().with_connect_timeout(Duration::from_secs(2)),
    ));
    let client = Client::new(client_transport, ClientConfig::default());
    client.connect().unwrap();

    assert_eq!(client.ping().unwrap(), "pong");
    let resources = client.list_resources().unwrap();
    assert_eq!(resources[0].uri, "example://one");

    client.stop();
    assert!(server.shutdown(Some(Duration::from_secs(2))));
}
