//! A communication channel used to send/receive messages to/from other parties.

use std::{fmt, future::Future, time::Duration};

use futures::future::try_join_all;
use serde::{Serialize, de::DeserializeOwned};
use tokio::{
    sync::{
        Mutex,
        mpsc::{Receiver, Sender, channel, error::SendError},
    },
    time::timeout,
};
use tracing::trace;

/// Errors related to sending / receiving / (de-)serializing messages.
#[derive(Debug)]
pub struct Error {
    /// The protocol phase during which the error occurred.
    pub phase: String,
    /// The specific error that was raised.
    pub reason: ErrorKind,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel error during '{}': {:?}", self.phase, self.reason)
    }
}

impl std::error::Error for Error {}

/// The specific error that occurred when trying to send / receive a message.
#[derive(Debug)]
pub enum ErrorKind {
    /// The (serialized) message could not be received over the channel.
    RecvError(String),
    /// The (serialized) message could not be sent over the channel.
    SendError(String),
    /// The message could not be serialized (before sending it out).
    SerdeError(String),
    /// The message is a Vec, but not of the expected length.
    InvalidLength {
        /// The number of elements the protocol expected.
        expected: usize,
        /// The number of elements that were actually received.
        actual: usize,
    },
}

/// A communication channel used to send/receive messages to/from another party.
///
/// Messages between any two parties must be delivered in order. The preprocessing protocols are
/// symmetric, so every party sends and receives the same sequence of phases.
pub trait Channel: Send + Sync {
    /// The error that can occur sending messages over the channel.
    type SendError: fmt::Debug;
    /// The error that can occur receiving messages over the channel.
    type RecvError: fmt::Debug;

    /// Sends a message to the party with the given index (must be between `0..participants`).
    fn send_bytes_to(
        &self,
        party: usize,
        msg: Vec<u8>,
    ) -> impl Future<Output = Result<(), Self::SendError>> + Send;

    /// Awaits a response from the party with the given index (must be between `0..participants`).
    fn recv_bytes_from(
        &self,
        party: usize,
    ) -> impl Future<Output = Result<Vec<u8>, Self::RecvError>> + Send;
}

/// Serializes and sends an MPC message to the other party.
pub(crate) async fn send_to<S: Serialize + Sync>(
    channel: &impl Channel,
    party: usize,
    phase: &str,
    msg: &[S],
) -> Result<(), Error> {
    let msg = bincode::serialize(msg).map_err(|e| Error {
        phase: format!("sending {phase}"),
        reason: ErrorKind::SerdeError(format!("{e:?}")),
    })?;
    trace!(party, phase, bytes = msg.len(), "send");
    channel.send_bytes_to(party, msg).await.map_err(|e| Error {
        phase: phase.to_string(),
        reason: ErrorKind::SendError(format!("{e:?}")),
    })
}

/// Receives and deserializes an MPC message from the other party.
pub(crate) async fn recv_from<T: DeserializeOwned>(
    channel: &impl Channel,
    party: usize,
    phase: &str,
) -> Result<Vec<T>, Error> {
    let msg = channel.recv_bytes_from(party).await.map_err(|e| Error {
        phase: phase.to_string(),
        reason: ErrorKind::RecvError(format!("{e:?}")),
    })?;
    bincode::deserialize(&msg).map_err(|e| Error {
        phase: format!("receiving {phase}"),
        reason: ErrorKind::SerdeError(format!("{e:?}")),
    })
}

/// Receives and deserializes a Vec from the other party (while checking the length).
pub(crate) async fn recv_vec_from<T: DeserializeOwned>(
    channel: &impl Channel,
    party: usize,
    phase: &str,
    len: usize,
) -> Result<Vec<T>, Error> {
    let v: Vec<T> = recv_from(channel, party, phase).await?;
    if v.len() == len {
        Ok(v)
    } else {
        Err(Error {
            phase: phase.to_string(),
            reason: ErrorKind::InvalidLength {
                expected: len,
                actual: v.len(),
            },
        })
    }
}

/// Sends `data[k]` to every party `k != i` and receives one message from every party `k != i`.
///
/// The received messages must have the same length as the messages sent to that party. The entry
/// for the own index `i` is returned empty.
pub(crate) async fn scatter<T: Serialize + DeserializeOwned + Sync>(
    channel: &impl Channel,
    i: usize,
    phase: &str,
    data: &[Vec<T>],
) -> Result<Vec<Vec<T>>, Error> {
    let n = data.len();
    let send = try_join_all(
        (0..n)
            .filter(|k| *k != i)
            .map(async |k| send_to(channel, k, phase, &data[k]).await),
    );
    let recv = try_join_all((0..n).map(async |k| {
        if k == i {
            Ok(vec![])
        } else {
            recv_vec_from(channel, k, phase, data[k].len()).await
        }
    }));
    let (_, received) = futures::try_join!(send, recv)?;
    Ok(received)
}

/// Sends the same vector to all other parties and collects their vectors (without any guarantee
/// that the other parties sent the same vector to everyone, see [`crate::coins::broadcast`]).
///
/// The own vector is placed at index `i` of the result.
pub(crate) async fn unverified_broadcast<T: Clone + Serialize + DeserializeOwned + Sync>(
    channel: &impl Channel,
    i: usize,
    n: usize,
    phase: &str,
    data: &[T],
) -> Result<Vec<Vec<T>>, Error> {
    let send = try_join_all(
        (0..n)
            .filter(|k| *k != i)
            .map(async |k| send_to(channel, k, phase, data).await),
    );
    let recv = try_join_all((0..n).map(async |k| {
        if k == i {
            Ok(data.to_vec())
        } else {
            recv_vec_from(channel, k, phase, data.len()).await
        }
    }));
    let (_, received) = futures::try_join!(send, recv)?;
    Ok(received)
}

/// A simple in-process channel using [`Sender`] and [`Receiver`].
#[derive(Debug)]
pub struct SimpleChannel {
    s: Vec<Option<Sender<Vec<u8>>>>,
    r: Vec<Option<Mutex<Receiver<Vec<u8>>>>>,
}

impl SimpleChannel {
    /// Creates channels for N parties to communicate with each other.
    pub fn channels(parties: usize) -> Vec<Self> {
        let buffer_capacity = 1024;
        let mut channels = vec![];
        for _ in 0..parties {
            let mut s = vec![];
            let mut r = vec![];
            for _ in 0..parties {
                s.push(None);
                r.push(None);
            }
            channels.push(SimpleChannel { s, r });
        }
        for a in 0..parties {
            for b in 0..parties {
                if a == b {
                    continue;
                }
                let (send_a_to_b, recv_a_to_b) = channel(buffer_capacity);
                channels[a].s[b] = Some(send_a_to_b);
                channels[b].r[a] = Some(Mutex::new(recv_a_to_b));
            }
        }
        channels
    }
}

#[derive(Debug)]
/// The error raised by `recv` calls of a [`SimpleChannel`].
pub enum AsyncRecvError {
    /// The channel has been closed.
    Closed,
    /// No message was received before the timeout.
    TimeoutElapsed,
    /// There is no connection to the given party.
    UnknownParty(usize),
}

#[derive(Debug)]
/// The error raised by `send` calls of a [`SimpleChannel`].
pub enum AsyncSendError {
    /// The receiving side has been dropped.
    Closed(SendError<Vec<u8>>),
    /// There is no connection to the given party.
    UnknownParty(usize),
}

impl Channel for SimpleChannel {
    type SendError = AsyncSendError;
    type RecvError = AsyncRecvError;

    async fn send_bytes_to(&self, p: usize, msg: Vec<u8>) -> Result<(), AsyncSendError> {
        let Some(Some(sender)) = self.s.get(p) else {
            return Err(AsyncSendError::UnknownParty(p));
        };
        sender.send(msg).await.map_err(AsyncSendError::Closed)
    }

    async fn recv_bytes_from(&self, p: usize) -> Result<Vec<u8>, AsyncRecvError> {
        let Some(Some(receiver)) = self.r.get(p) else {
            return Err(AsyncRecvError::UnknownParty(p));
        };
        let mut receiver = receiver.lock().await;
        match timeout(Duration::from_secs(10 * 60), receiver.recv()).await {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(AsyncRecvError::Closed),
            Err(_) => Err(AsyncRecvError::TimeoutElapsed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scatter_delivers_per_party_messages() -> Result<(), Error> {
        let channels = SimpleChannel::channels(3);
        let results = try_join_all(channels.iter().enumerate().map(async |(i, ch)| {
            let data: Vec<Vec<u32>> = (0..3).map(|k| vec![(10 * i + k) as u32; 2]).collect();
            scatter(ch, i, "test scatter", &data).await
        }))
        .await?;
        for (i, received) in results.iter().enumerate() {
            for (k, msg) in received.iter().enumerate() {
                if k == i {
                    assert!(msg.is_empty());
                } else {
                    assert_eq!(msg, &vec![(10 * k + i) as u32; 2]);
                }
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn recv_vec_rejects_wrong_length() {
        let channels = SimpleChannel::channels(2);
        send_to(&channels[0], 1, "len", &[1u8, 2, 3]).await.unwrap();
        let err = recv_vec_from::<u8>(&channels[1], 0, "len", 2)
            .await
            .unwrap_err();
        assert!(matches!(
            err.reason,
            ErrorKind::InvalidLength {
                expected: 2,
                actual: 3
            }
        ));
    }
}
