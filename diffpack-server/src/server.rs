use std::net::SocketAddr;

use tracing::info;

use crate::api::create_router;

/// Owns the listening address; the pipeline itself is stateless, so
/// there is no shared state behind the router.
pub struct DiffServer {
    addr: SocketAddr,
}

impl DiffServer {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub async fn serve(self) -> anyhow::Result<()> {
        let app = create_router();

        info!("server listening on {}", self.addr);
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
