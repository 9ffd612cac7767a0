//! Integration tests for the WIPcoin API endpoints
//!
//! These tests drive the router in-process and check status codes and JSON
//! shapes for client and peer-facing routes.

use axum_test::TestServer;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wipcoin::api::build_api_router;
use wipcoin::blockchain::{Block, Blockchain};
use wipcoin::crypto::{KeyPair, Secp256k1Signer};
use wipcoin::miner::search_proof;
use wipcoin::network::HttpTransport;
use wipcoin::node::Node;
use wipcoin::persistence::InMemoryPersistence;
use wipcoin::transaction::Transfer;

fn server_for(wallet: Option<KeyPair>) -> (TestServer, Arc<Node>) {
    let transport = Arc::new(HttpTransport::new(Duration::from_millis(200)).expect("Failed to build transport"));
    let node = Arc::new(
        Node::new(wallet, transport, Arc::new(InMemoryPersistence::new())).expect("Failed to create node"),
    );
    let server = TestServer::new(build_api_router(node.clone())).expect("Failed to create test server");
    (server, node)
}

fn mined_chain(length: usize) -> Blockchain {
    let mut chain = Blockchain::new();
    while chain.len() < length {
        let job = chain.mining_job();
        let proof = search_proof(&job.transfers, &job.endorsements, &job.previous_hash);
        chain
            .commit_mined(job, proof, "remote-miner", &Secp256k1Signer)
            .unwrap();
    }
    chain
}

#[tokio::test]
async fn test_query_endpoints() {
    let (server, _) = server_for(None);

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["blocks"], 1);
    assert_eq!(json["resolutionNeeded"], false);
    assert!(json["timestamp"].is_string());

    let response = server.get("/chain").await;
    assert_eq!(response.status_code(), 200);
    let chain: Vec<Block> = response.json();
    assert_eq!(chain, vec![Block::genesis()]);

    let response = server.get("/chain").await;
    let json: Value = response.json();
    assert_eq!(json[0]["previousHash"], "");
    assert_eq!(json[0]["proof"], 100);

    let response = server.get("/balance/somebody").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["identity"], "somebody");
    assert_eq!(json["balance"], 0.0);

    let response = server.get("/transactions").await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>(), json!([]));

    let response = server.get("/endorsements").await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>(), json!([]));
}

#[tokio::test]
async fn test_node_without_key_cannot_mine_or_sign() {
    let (server, _) = server_for(None);

    let response = server.post("/mine").await;
    assert_eq!(response.status_code(), 400);
    assert!(response.json::<Value>()["error"].is_string());

    let response = server.get("/balance").await;
    assert_eq!(response.status_code(), 400);

    let response = server
        .post("/transaction")
        .json(&json!({"recipient": "bob", "amount": 1.0}))
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_mine_and_transact() {
    let alice = KeyPair::generate().unwrap();
    let (server, node) = server_for(Some(alice.clone()));

    let response = server.post("/mine").await;
    assert_eq!(response.status_code(), 201);
    let block: Block = response.json();
    assert_eq!(block.index, 1);
    assert_eq!(block.transfers.len(), 1);

    let response = server
        .post("/transaction")
        .json(&json!({"recipient": "bob", "amount": 4.0}))
        .await;
    assert_eq!(response.status_code(), 201);
    let transfer: Transfer = response.json();
    assert_eq!(transfer.sender, alice.identity());

    let response = server
        .post("/endorsement")
        .json(&json!({
            "recipient": "carol",
            "placeId": "6f1c2d1e-2f6b-4d2a-9a53-0a3d4c5b6e7f",
            "message": "best coffee in town",
            "amount": 1.5
        }))
        .await;
    assert_eq!(response.status_code(), 201);

    let response = server.get("/balance").await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>()["balance"], 4.5);

    let response = server
        .post("/transaction")
        .json(&json!({"recipient": "bob", "amount": 100.0}))
        .await;
    assert_eq!(response.status_code(), 400);
    assert_eq!(node.pending_transfers().await.len(), 1);

    let response = server.get("/transactions").await;
    assert_eq!(response.json::<Vec<Transfer>>().len(), 1);
}

#[tokio::test]
async fn test_broadcast_routes() {
    let alice = KeyPair::generate().unwrap();
    let (server, node) = server_for(None);
    let remote = mined_chain(3);

    let response = server
        .post("/broadcast-block")
        .json(&json!({"block": remote.blocks[2]}))
        .await;
    assert_eq!(response.status_code(), 200);
    assert!(node.needs_resolution());

    let response = server
        .post("/broadcast-block")
        .json(&json!({"block": remote.blocks[1]}))
        .await;
    assert_eq!(response.status_code(), 201);

    let response = server
        .post("/broadcast-block")
        .json(&json!({"block": remote.blocks[1]}))
        .await;
    assert_eq!(response.status_code(), 409);

    let mut forged = remote.blocks[2].clone();
    forged.previous_hash = "ab".repeat(32);
    let response = server
        .post("/broadcast-block")
        .json(&json!({"block": forged}))
        .await;
    assert_eq!(response.status_code(), 409);
    assert_eq!(node.export_chain().await.len(), 2);

    // alice has no funds on this node
    let unfunded = Transfer::new(alice.identity(), "bob".to_string(), String::new(), 1.0)
        .sign(&alice)
        .unwrap();
    let response = server.post("/broadcast-transaction").json(&unfunded).await;
    assert_eq!(response.status_code(), 400);

    let zero = Transfer::new(alice.identity(), "bob".to_string(), String::new(), 0.0)
        .sign(&alice)
        .unwrap();
    let response = server.post("/broadcast-transaction").json(&zero).await;
    assert_eq!(response.status_code(), 201);
    assert_eq!(node.pending_transfers().await, vec![zero]);
}

#[tokio::test]
async fn test_mining_blocked_while_resolution_needed() {
    let (server, node) = server_for(Some(KeyPair::generate().unwrap()));
    let remote = mined_chain(4);

    server
        .post("/broadcast-block")
        .json(&json!({"block": remote.blocks[3]}))
        .await;
    assert!(node.needs_resolution());

    let response = server.post("/mine").await;
    assert_eq!(response.status_code(), 409);

    let response = server.post("/resolve-conflicts").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["replaced"], false);
    assert_eq!(json["length"], 1);

    let response = server.post("/mine").await;
    assert_eq!(response.status_code(), 201);
}

#[tokio::test]
async fn test_peer_management() {
    let (server, _) = server_for(None);

    let response = server.post("/node").json(&json!({"node": "127.0.0.1:5001"})).await;
    assert_eq!(response.status_code(), 201);
    let response = server.post("/node").json(&json!({"node": "127.0.0.1:5001"})).await;
    assert_eq!(response.status_code(), 200);
    let response = server.post("/node").json(&json!({"node": "  "})).await;
    assert_eq!(response.status_code(), 400);

    let response = server.get("/nodes").await;
    assert_eq!(response.json::<Value>(), json!({"nodes": ["127.0.0.1:5001"]}));

    let response = server.delete("/node/127.0.0.1:5001").await;
    assert_eq!(response.status_code(), 200);
    let response = server.delete("/node/127.0.0.1:5001").await;
    assert_eq!(response.status_code(), 404);

    let response = server.get("/nodes").await;
    assert_eq!(response.json::<Value>(), json!({"nodes": []}));
}
