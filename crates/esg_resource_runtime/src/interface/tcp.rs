use std::io;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{error, info, trace, trace_span, Instrument};

use crate::interface::message::{pack, receive, receive_raw, ErrorReply, Reply, Request, Response};
use crate::runtime::Runtime;

pub async fn run(listen: SocketAddr, runtime: Runtime) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to listen on {listen}"))?;
    serve(listener, runtime).await
}

/// Accepts connections until the listener fails, handling each on its own
/// task.
pub async fn serve(listener: TcpListener, runtime: Runtime) -> Result<()> {
    info!("listening on {}", listener.local_addr()?);

    loop {
        let (stream, remote) = listener.accept().await?;
        trace!("connection incoming");
        let fut = handle_connection(runtime.clone(), stream);
        tokio::spawn(
            async move {
                if let Err(e) = fut.await {
                    error!("connection failed: {reason}", reason = e.to_string())
                }
            }
            .instrument(trace_span!("connection", %remote)),
        );
    }
}

async fn handle_connection(runtime: Runtime, mut stream: TcpStream) -> Result<()> {
    let (mut recv, mut send) = stream.split();

    // Each frame sent by the client is one request.
    loop {
        let buffer = match receive_raw(&mut recv).await {
            Ok(buffer) => buffer,
            Err(err) if is_closed(&err) => {
                trace!("connection closed");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let reply = match serde_json::from_slice::<Request>(&buffer) {
            Ok(req) => handle_request(&runtime, req),
            Err(err) => Err(ErrorReply::invalid_request(err.to_string())),
        };
        send_frame(&mut send, &reply).await?;
    }
}

fn handle_request(runtime: &Runtime, req: Request) -> Reply {
    let result = match req {
        Request::Apply { event } => runtime.apply(&event).map(Response::Snapshot),
        Request::Reset {
            campaign,
            sub_key,
            seed,
        } => runtime
            .reset(&campaign, sub_key.as_deref(), seed)
            .map(|()| Response::Reset),
        Request::Regenerate { campaign } => {
            runtime.regenerate(&campaign).map(|()| Response::Reset)
        }
        Request::Summary { campaigns } if campaigns.is_empty() => {
            runtime.summarize_all().map(Response::Snapshot)
        }
        Request::Summary { campaigns } => runtime
            .summarize(campaigns.as_slice())
            .map(Response::Snapshot),
        Request::Get { campaign, sub_key } => runtime
            .get(&campaign, sub_key.as_deref())
            .map(Response::Counters),
        Request::Rank { campaigns, metric } => {
            runtime.rank(campaigns.as_slice(), &metric).map(Response::Ranking)
        }
        Request::Campaigns => Ok(Response::Campaigns(runtime.campaigns())),
    };

    result.map_err(|err| ErrorReply::from(&err))
}

async fn send_frame<W>(send: &mut W, reply: &Reply) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let [size, body] = pack(reply)?;
    send.write_all(&size).await?;
    send.write_all(&body).await?;
    send.flush().await?;
    Ok(())
}

fn is_closed(err: &anyhow::Error) -> bool {
    err.downcast_ref::<io::Error>().map_or(false, |err| {
        matches!(
            err.kind(),
            io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionReset
        )
    })
}

/// A connection to a runtime.
pub struct Client {
    stream: TcpStream,
}

impl Client {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .context("failed to connect to runtime")?;
        Ok(Client { stream })
    }

    /// Sends a request and waits for its reply.
    pub async fn request(&mut self, req: &Request) -> Result<Reply> {
        let [size, body] = pack(req)?;
        self.stream.write_all(&size).await?;
        self.stream.write_all(&body).await?;
        receive(&mut self.stream)
            .await
            .context("failed to receive reply")
    }
}
