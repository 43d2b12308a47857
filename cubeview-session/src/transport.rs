//! Outbound request channel.

use std::sync::mpsc::Sender;

use cubeview_protocol::Request;

use crate::error::{Error, Result};

/// Sends requests to the server. Each view slot has its own connection.
pub trait Transport {
    /// Queue `request` on the connection of `slot`.
    ///
    /// # Errors
    /// Returns [`Error::Transport`] when the connection is gone.
    fn send(&mut self, slot: usize, request: &Request) -> Result<()>;
}

/// Transport that forwards the request text over a channel, for a socket
/// writer running on another thread.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: Sender<(usize, String)>,
}

impl ChannelTransport {
    #[must_use]
    pub fn new(tx: Sender<(usize, String)>) -> Self {
        Self { tx }
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, slot: usize, request: &Request) -> Result<()> {
        self.tx
            .send((slot, request.to_string()))
            .map_err(|e| Error::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn test_channel_transport() {
        let (tx, rx) = channel();
        let mut transport = ChannelTransport::new(tx);
        transport.send(1, &Request::EndVideo).unwrap();
        assert_eq!(rx.recv().unwrap(), (1, "[end_video]".to_string()));
        drop(rx);
        assert!(matches!(
            transport.send(0, &Request::EndVideo),
            Err(Error::Transport(_))
        ));
    }
}
