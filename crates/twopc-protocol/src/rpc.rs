//! One request, one response, over a length-delimited TCP stream.

use twopc_utils::codec;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::spawn;
use tokio::sync::Semaphore;
use tokio::time;

use anyhow::{anyhow, ensure, Context as _, Result};
use tracing::{debug, error};
use wgp::Working;

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcRequest<A> {
    pub rpc_id: u64,
    pub args: A,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse<O> {
    pub rpc_id: u64,
    pub output: O,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcClientConfig {
    pub max_frame_length: usize,
    /// Bound on connect, send and receive together, in microseconds.
    pub request_timeout_us: u64,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            max_frame_length: 1 << 20, // 1 MiB
            request_timeout_us: 1_000_000,
        }
    }
}

impl RpcClientConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_micros(self.request_timeout_us)
    }
}

static NEXT_RPC_ID: AtomicU64 = AtomicU64::new(1);

/// Resolves `remote_addr`, connects, sends `args`, waits for the matching
/// response.
///
/// The whole exchange, name resolution included, is bounded by the
/// configured request timeout.
#[inline]
pub async fn call<R, A, O>(remote_addr: R, args: &A, config: &RpcClientConfig) -> Result<O>
where
    R: ToSocketAddrs + fmt::Debug + Send + Sync,
    A: Serialize + Sync,
    O: DeserializeOwned,
{
    let limit = config.request_timeout();
    match time::timeout(limit, call_inner(&remote_addr, args, config.max_frame_length)).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("rpc to {remote_addr:?} timed out after {limit:?}")),
    }
}

async fn call_inner<R, A, O>(remote_addr: &R, args: &A, max_frame_length: usize) -> Result<O>
where
    R: ToSocketAddrs + fmt::Debug + Send + Sync,
    A: Serialize + Sync,
    O: DeserializeOwned,
{
    let stream = TcpStream::connect(remote_addr)
        .await
        .with_context(|| format!("failed to connect to remote addr {remote_addr:?}"))?;

    let (reader, writer) = stream.into_split();
    let mut remote_rx = codec::bytes_stream(reader, max_frame_length);
    let mut remote_tx = codec::bytes_sink(writer, max_frame_length);

    let rpc_id = NEXT_RPC_ID.fetch_add(1, Ordering::Relaxed);
    let bytes = codec::serialize(&RpcRequest { rpc_id, args })?;
    remote_tx.send(bytes).await.context("remote tx error")?;

    let bytes = match remote_rx.next().await {
        Some(result) => result.context("remote rx error")?,
        None => return Err(anyhow!("rpc failed: no response")),
    };
    let res: RpcResponse<O> = codec::deserialize_owned(&bytes)?;
    ensure!(res.rpc_id == rpc_id, "unexpected rpc id {}, expected {rpc_id}", res.rpc_id);
    Ok(res.output)
}

pub trait Service<A: Send + 'static>: Send + Sync + 'static {
    type Output: Send + 'static;

    fn call(self: &Arc<Self>, args: A) -> impl Future<Output = Result<Self::Output>> + Send;

    fn needs_stop(&self) -> bool;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcServerConfig {
    pub max_frame_length: usize,
    pub max_task_num: usize,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self { max_frame_length: 1 << 20, max_task_num: 1024 }
    }
}

/// Accepts connections until the service asks to stop.
///
/// Requests on one connection are answered in order.
#[inline]
pub async fn serve<S, A>(
    service: Arc<S>,
    listener: TcpListener,
    config: RpcServerConfig,
    working: Working,
) -> Result<()>
where
    S: Service<A>,
    A: DeserializeOwned + Send + 'static,
    <S as Service<A>>::Output: Serialize + Send + 'static,
{
    let max_frame_length = config.max_frame_length;
    let limit = Arc::new(Semaphore::new(config.max_task_num));

    loop {
        if service.needs_stop() {
            break;
        }

        let (tcp, peer) = listener.accept().await.inspect_err(|err| error!(?err, "tcp accept error"))?;

        if service.needs_stop() {
            break;
        }

        let permit = match Arc::clone(&limit).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let service = Arc::clone(&service);
        let working = working.clone();
        spawn(async move {
            let (reader, writer) = tcp.into_split();
            let mut remote_rx = codec::bytes_stream(reader, max_frame_length);
            let mut remote_tx = codec::bytes_sink(writer, max_frame_length);

            while let Some(result) = remote_rx.next().await {
                if service.needs_stop() {
                    debug!("drop rpc request because of waiting shutdown");
                    break;
                }

                let bytes = match result {
                    Ok(x) => x,
                    Err(err) => {
                        error!(?err, ?peer, "remote rx error");
                        break;
                    }
                };

                let req = match codec::deserialize_owned::<RpcRequest<A>>(&bytes) {
                    Ok(req) => req,
                    Err(err) => {
                        error!(?err, ?peer, "codec deserialize error");
                        break;
                    }
                };

                let output = match service.call(req.args).await {
                    Ok(output) => output,
                    Err(err) => {
                        error!(?err, ?peer, "service call failed");
                        break;
                    }
                };

                let res = RpcResponse { rpc_id: req.rpc_id, output };
                let bytes = match codec::serialize(&res) {
                    Ok(x) => x,
                    Err(err) => {
                        error!(?err, "codec serialize error");
                        break;
                    }
                };
                if let Err(err) = remote_tx.send(bytes).await {
                    error!(?err, ?peer, "remote tx error");
                    break;
                }
            }

            drop(working);
            drop(permit);
        });
    }

    Ok(())
}
