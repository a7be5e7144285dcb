use std::net::SocketAddr;

use anyhow::{Context, Result};
use colored::Colorize;

use diffpack_server::DiffServer;

pub async fn run(host: String, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid bind address {host}:{port}"))?;

    eprintln!("{} http://{addr}", "serving on".green().bold());
    DiffServer::new(addr).serve().await
}
