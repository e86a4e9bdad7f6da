use async_trait::async_trait;
use futures::channel::oneshot;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tracing::debug;

use crate::node::Node;
use crate::request::{Receiver as myReceiver, Request, Response, Sender as mySender};
use crate::util::{RequestError, Result};

type Envelope<Req, Res> = (Req, oneshot::Sender<Result<Res>>);

/// Client end of a request channel. Requests are served by a node running on
/// the network worker; each response travels back on its own oneshot.
pub struct ChannelSender<Req: Request, Res: Response> {
    req_tx: Sender<Envelope<Req, Res>>,
}

pub struct ChannelReceiver<Req: Request, Res: Response, N: Node> {
    req_rx: Receiver<Envelope<Req, Res>>,
    node: Arc<N>,
}

/// Serves `node` on the runtime behind `handle` and returns the sending end.
pub fn new_channel_connect<Req, Res, N>(
    handle: &Handle,
    node: Arc<N>,
    depth: usize,
) -> ChannelSender<Req, Res>
where
    Req: Request + 'static,
    Res: Response + 'static,
    N: Node<Req = Req, Res = Res> + Sync + Send + 'static,
{
    let (req_tx, req_rx) = channel(depth.max(1));
    let rx = ChannelReceiver { req_rx, node };
    handle.spawn(myReceiver::collect_req(rx));
    ChannelSender { req_tx }
}

impl<Req: Request, Res: Response> Clone for ChannelSender<Req, Res> {
    fn clone(&self) -> Self {
        Self {
            req_tx: self.req_tx.clone(),
        }
    }
}

#[async_trait]
impl<Req, Res> mySender for ChannelSender<Req, Res>
where
    Req: Request + 'static,
    Res: Response + 'static,
{
    type Req = Req;
    type Res = Res;

    async fn send(&self, req: Self::Req) -> Result<Res> {
        let (res_tx, res_rx) = oneshot::channel();
        self.req_tx
            .send((req, res_tx))
            .await
            .map_err(|e| RequestError::SendError(e.to_string()))?;
        res_rx.await.map_err(|_| RequestError::ResponseDropped)?
    }
}

#[async_trait]
impl<Req, Res, N: Node<Req = Req, Res = Res>> myReceiver for ChannelReceiver<Req, Res, N>
where
    Req: Request + 'static,
    Res: Response + 'static,
    N: Node + Sync + Send + 'static,
{
    type Req = Req;
    type Res = Res;
    type N = N;

    async fn collect_req(mut self) {
        while let Some((req, res_tx)) = self.req_rx.recv().await {
            let node = self.node.clone();
            tokio::spawn(async move {
                let res = node.process(req).await;
                // The caller may have given up waiting.
                let _ = res_tx.send(res);
            });
        }
        debug!("request channel drained");
    }
}
