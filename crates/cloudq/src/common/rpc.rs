//! Request/reply plumbing between a service facade and its consumer task.

use std::fmt::{Debug, Formatter};
use tokio::sync::{mpsc, oneshot};

/// One-shot slot through which the consumer task answers a request.
#[must_use = "a dropped reply token leaves the requester waiting forever"]
pub struct ReplyToken<T> {
    sender: oneshot::Sender<T>,
}

impl<T> Debug for ReplyToken<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("ReplyToken")
    }
}

impl<T> ReplyToken<T> {
    pub fn reply(self, response: T) {
        if self.sender.send(response).is_err() {
            log::warn!("Request was abandoned before the reply arrived");
        }
    }
}

/// Builds a reply token, hands it to `enqueue` (which should push a message
/// carrying it onto the service channel) and returns the receiving end. The
/// returned future resolves once the consumer replies through the token.
pub fn request<F, Response, M>(enqueue: F) -> oneshot::Receiver<Response>
where
    F: FnOnce(ReplyToken<Response>) -> Result<(), mpsc::error::SendError<M>>,
    M: Debug,
{
    let (tx, rx) = oneshot::channel::<Response>();
    if let Err(error) = enqueue(ReplyToken { sender: tx }) {
        log::warn!("Service request could not be enqueued: {error:?}");
    }
    rx
}

pub type ServiceSender<M> = mpsc::UnboundedSender<M>;
pub type ServiceReceiver<M> = mpsc::UnboundedReceiver<M>;

pub fn service_channel<M>() -> (ServiceSender<M>, ServiceReceiver<M>) {
    mpsc::unbounded_channel()
}
