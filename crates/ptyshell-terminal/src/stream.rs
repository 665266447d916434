use futures::Stream;
use ptyshell_types::{OutputEvent, PtyHandle};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Ordered output of one pseudo-terminal process.
///
/// Yields `Data` chunks in the order the process produced them, then exactly
/// one `Exit`, then ends. A finished stream cannot be restarted; respawn to
/// get a new handle and a new stream.
#[derive(Debug)]
pub struct OutputStream {
    handle: PtyHandle,
    rx: mpsc::UnboundedReceiver<OutputEvent>,
}

impl OutputStream {
    pub fn new(handle: PtyHandle, rx: mpsc::UnboundedReceiver<OutputEvent>) -> Self {
        Self { handle, rx }
    }

    /// Channel pair for a backend: the sender goes to the producer
    pub fn channel(handle: PtyHandle) -> (mpsc::UnboundedSender<OutputEvent>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self::new(handle, rx))
    }

    pub fn handle(&self) -> PtyHandle {
        self.handle
    }

    /// Next event, or `None` once the exit event has been consumed
    pub async fn recv(&mut self) -> Option<OutputEvent> {
        self.rx.recv().await
    }
}

impl Stream for OutputStream {
    type Item = OutputEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_events_arrive_in_order_then_end() {
        let (tx, mut stream) = OutputStream::channel(PtyHandle(7));
        tx.send(OutputEvent::Data(b"one".to_vec())).unwrap();
        tx.send(OutputEvent::Data(b"two".to_vec())).unwrap();
        tx.send(OutputEvent::Exit(0)).unwrap();
        drop(tx);

        assert_eq!(stream.handle(), PtyHandle(7));
        assert_eq!(stream.recv().await, Some(OutputEvent::Data(b"one".to_vec())));
        let rest: Vec<_> = (&mut stream).collect().await;
        assert_eq!(rest, vec![OutputEvent::Data(b"two".to_vec()), OutputEvent::Exit(0)]);
        assert_eq!(stream.next().await, None);
    }

    #[test]
    fn test_pending_until_the_process_writes() {
        let (tx, stream) = OutputStream::channel(PtyHandle(1));
        let mut stream = tokio_test::task::spawn(stream);

        tokio_test::assert_pending!(stream.poll_next());
        tx.send(OutputEvent::Data(b"$ ".to_vec())).unwrap();
        assert!(stream.is_woken());
        tokio_test::assert_ready_eq!(stream.poll_next(), Some(OutputEvent::Data(b"$ ".to_vec())));
    }
}
