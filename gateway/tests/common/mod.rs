use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use toolwire_core::config::ClientConfig;
use toolwire_core::{Dispatcher, DuplicatePolicy, PlanExecutor, RunStore, ToolClient, ToolRegistry};
use toolwire_gateway::{app, AppState};
use toolwire_tools::{register_all, TaskBoard};

pub struct TestServer {
    pub client: ToolClient,
    pub board: TaskBoard,
    pub registry: Arc<ToolRegistry>,
    handle: JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Serves the full catalogue on an ephemeral port.
pub async fn spawn(store: Arc<dyn RunStore>) -> TestServer {
    let board = TaskBoard::new();
    let registry = Arc::new(ToolRegistry::new(DuplicatePolicy::Strict));
    assert!(register_all(&registry, board.clone()).is_clean());

    let dispatcher = Dispatcher::new(Arc::clone(&registry), PlanExecutor::new(store));
    let router = app(AppState::new(dispatcher));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let client = ToolClient::new(ClientConfig::new(format!("http://{}", addr))).unwrap();
    TestServer {
        client,
        board,
        registry,
        handle,
    }
}
