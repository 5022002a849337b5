use crate::context::Context;
use crate::routes::{routing_table, Handler};
use anyhow::{anyhow, Context as _, Result};
use heapmesh_common::arena::InternalAllocator;
use heapmesh_common::error::Error;
use heapmesh_common::protocol::{Progress, Request, Response, MAX_REQUEST_LEN};
use heapmesh_common::router::RoutingTable;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

const READ_CHUNK: usize = 4096;

enum Inbound {
    Request(Request),
    Rejected(Error),
    Closed,
}

pub struct Server {
    listener: TcpListener,
    routes: Arc<RoutingTable<Handler>>,
    ctx: Arc<Context>,
}

impl Server {
    pub async fn bind(ctx: Arc<Context>) -> Result<Self> {
        let bind_addr = ctx.config.bind_addr();
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("failed to bind {}", bind_addr))?;

        Ok(Server {
            listener,
            routes: Arc::new(routing_table(ctx.clone())),
            ctx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts until the lifecycle stops. Accept and send faults end the loop
    /// with an error.
    ///
    /// Unless `concurrent` is set, each connection is handled to completion
    /// before the next one is accepted.
    pub async fn serve(self) -> Result<()> {
        info!("start listening on {}", self.local_addr()?);

        let (fault_tx, mut fault_rx) = mpsc::unbounded_channel::<anyhow::Error>();

        loop {
            let (client, client_addr) = tokio::select! {
                accepted = self.listener.accept() => accepted.context("failed to accept")?,
                Some(e) = fault_rx.recv() => return Err(e),
                _ = self.ctx.lifecycle.stopped() => break,
            };

            let routes = self.routes.clone();
            let ctx = self.ctx.clone();
            let task =
                tokio::spawn(async move { handle(client, client_addr, &routes, &ctx).await });

            if self.ctx.config.concurrent {
                let fault_tx = fault_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = flatten(task.await) {
                        let _ = fault_tx.send(e);
                    }
                });
            } else {
                flatten(task.await)?;
            }
        }

        info!("server stopped");

        Ok(())
    }
}

fn flatten(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    joined.map_err(|e| anyhow!("connection handler failed: {}", e))?
}

async fn handle(
    mut client: TcpStream,
    client_addr: SocketAddr,
    routes: &RoutingTable<Handler>,
    ctx: &Context,
) -> Result<()> {
    let inbound = match read_request(&mut client, ctx.arena.as_ref()).await {
        Ok(inbound) => inbound,
        Err(e) => {
            warn!("{} - read failed: {}", client_addr.ip(), e);
            return Ok(());
        }
    };

    let (response, request) = match inbound {
        Inbound::Request(req) => {
            let (handler, args) = routes.route(req.path());
            (handler(args, &req), Some(req))
        }
        Inbound::Rejected(e) => {
            warn!("{} - {}", client_addr.ip(), e);
            (Response::from_error(&e), None)
        }
        Inbound::Closed => {
            debug!("{} closed without sending a request", client_addr.ip());
            return Ok(());
        }
    };

    let mut buf = ctx.arena.buffer(response.size());
    response.write_to(&mut buf);

    if let Err(e) = client.write_all(&buf).await {
        if is_peer_fault(e.kind()) {
            warn!("{} - send failed: {}", client_addr.ip(), e);
            return Ok(());
        }
        return Err(e).context("failed to send");
    }

    match &request {
        Some(req) => info!(
            "{} {} - HTTP {} - {} {}",
            req.method,
            req.uri,
            response.status_code,
            client_addr.ip(),
            req.header("User-Agent").unwrap_or_default()
        ),
        None => info!(
            "- - HTTP {} - {}",
            response.status_code,
            client_addr.ip()
        ),
    }

    if let Err(e) = client.shutdown().await {
        debug!("{} - shutdown: {}", client_addr.ip(), e);
    }

    Ok(())
}

/// Reads until the head and announced body have arrived or the peer closes.
async fn read_request(
    client: &mut TcpStream,
    arena: &dyn InternalAllocator,
) -> std::io::Result<Inbound> {
    let mut buf = arena.buffer(READ_CHUNK);

    loop {
        if buf.len() > MAX_REQUEST_LEN {
            return Ok(Inbound::Rejected(Error::RequestTooLarge {
                limit: MAX_REQUEST_LEN,
            }));
        }

        buf.reserve(READ_CHUNK);
        let n = client.read_buf(&mut buf).await?;

        if n == 0 {
            if buf.is_empty() {
                return Ok(Inbound::Closed);
            }
            break;
        }

        match Progress::scan(&buf) {
            Ok(progress) if progress.is_done(buf.len()) => break,
            Ok(_) => {}
            Err(e) => return Ok(Inbound::Rejected(e)),
        }
    }

    Ok(match Request::parse(&buf) {
        Ok(req) => Inbound::Request(req),
        Err(e) => Inbound::Rejected(e),
    })
}

/// Send failures caused by the peer going away rather than by this host.
fn is_peer_fault(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
    )
}
