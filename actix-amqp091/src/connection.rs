use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use actix_codec::{AsyncRead, AsyncWrite, Framed};
use amqp091_codec::protocol::{
    reply_code, ChannelCloseOk, ConnectionClose, ConnectionCloseOk, ConnectionTune, Method,
    ProtocolHeader,
};
use amqp091_codec::types::FieldTable;
use amqp091_codec::{AmqpCodec, AmqpCodecError, AmqpFrame, Buffer, Encode, Frame};
use bytes::Bytes;
use futures::channel::oneshot;
use futures::task::AtomicWaker;
use futures::{Sink, StreamExt};
use fxhash::FxHashMap;

use crate::cell::Cell;
use crate::channel::{run_effect, ChannelInner, Effect};
use crate::errors::{AmqpError, CloseReason};
use crate::hb::{Heartbeat, HeartbeatAction};
use crate::Configuration;

pub(crate) type ReplyTx = oneshot::Sender<Result<Method, AmqpError>>;
pub(crate) type ReplyRx = oneshot::Receiver<Result<Method, AmqpError>>;

/// Pending synchronous request, completed by the first matching method
/// on its channel.
struct AwaitEntry {
    channel_id: u16,
    replies: &'static [(u16, u16)],
    tx: ReplyTx,
}

impl AwaitEntry {
    fn matches(&self, channel_id: u16, method: &Method) -> bool {
        let id = (method.class_id(), method.method_id());
        self.channel_id == channel_id && self.replies.iter().any(|r| *r == id)
    }
}

/// Negotiated connection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Tune {
    pub(crate) channel_max: u16,
    pub(crate) frame_max: u32,
    pub(crate) heartbeat: u16,
}

impl Tune {
    /// Combine local limits with the broker's `connection.tune`.
    pub(crate) fn negotiate(config: &Configuration, remote: &ConnectionTune) -> Tune {
        fn limit<T: PartialOrd + Default + Copy>(local: T, remote: T) -> T {
            let zero = T::default();
            if local != zero && (remote == zero || local < remote) {
                local
            } else {
                remote
            }
        }

        let local_hb = config.heartbeat.as_secs() as u16;
        let heartbeat = if local_hb == 0 || remote.heartbeat == 0 {
            std::cmp::max(local_hb, remote.heartbeat)
        } else {
            std::cmp::min(local_hb, remote.heartbeat)
        };
        let channel_max = match limit(config.channel_max, remote.channel_max) {
            0 => u16::MAX,
            n => n,
        };

        Tune {
            channel_max,
            frame_max: limit(config.frame_max, remote.frame_max),
            heartbeat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Handshake,
    Open,
    Closing,
    Closed,
}

pub(crate) struct ConnectionInner {
    pub(crate) config: Configuration,
    pub(crate) tune: Tune,
    pending_tune: Option<Tune>,
    pub(crate) server_properties: FieldTable,
    write_queue: VecDeque<Bytes>,
    write_size: usize,
    write_task: AtomicWaker,
    drain_waiters: Vec<oneshot::Sender<()>>,
    awaits: VecDeque<AwaitEntry>,
    pub(crate) channels: FxHashMap<u16, ChannelInner>,
    next_channel: u16,
    error: Option<AmqpError>,
    state: State,
    blocked: bool,
}

impl ConnectionInner {
    pub(crate) fn new(config: Configuration) -> ConnectionInner {
        ConnectionInner {
            config,
            tune: Tune::default(),
            pending_tune: None,
            server_properties: FieldTable::default(),
            write_queue: VecDeque::new(),
            write_size: 0,
            write_task: AtomicWaker::new(),
            drain_waiters: Vec::new(),
            awaits: VecDeque::new(),
            channels: FxHashMap::default(),
            next_channel: 1,
            error: None,
            state: State::Handshake,
            blocked: false,
        }
    }

    /// Fail with the connection error, if there is one
    pub(crate) fn check(&self) -> Result<(), AmqpError> {
        match self.error {
            Some(ref err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.error.is_none() && self.state == State::Open
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    pub(crate) fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub(crate) fn set_closing(&mut self) {
        self.state = State::Closing;
    }

    /// Channel usable for new operations
    pub(crate) fn channel_mut(&mut self, id: u16) -> Result<&mut ChannelInner, AmqpError> {
        self.check()?;
        match self.channels.get_mut(&id) {
            Some(channel) => {
                channel.check()?;
                Ok(channel)
            }
            None => Err(AmqpError::channel_exception(format!(
                "Channel #{} is closed.",
                id
            ))),
        }
    }

    /// Lowest free channel id starting after the last allocated one.
    pub(crate) fn allocate_channel(&mut self) -> Result<u16, AmqpError> {
        let max = match self.tune.channel_max {
            0 => u16::MAX,
            n => n,
        };
        let start = if self.next_channel == 0 || self.next_channel > max {
            1
        } else {
            self.next_channel
        };

        let free = (start..=max)
            .chain(1..start)
            .find(|id| !self.channels.contains_key(id));
        match free {
            Some(id) => {
                self.next_channel = id.wrapping_add(1);
                Ok(id)
            }
            None => Err(AmqpError::TooManyChannels),
        }
    }

    pub(crate) fn set_tune(&mut self, tune: Tune) {
        self.tune = tune;
        self.pending_tune = Some(tune);
        self.write_task.wake();
    }

    pub(crate) fn post_protocol_header(&mut self) {
        let mut buf = Buffer::with_capacity(8);
        // fixed eight byte header, encoding cannot fail
        let _ = ProtocolHeader::default().encode(&mut buf);
        self.post_bytes(buf.freeze());
    }

    /// Encode frame and append it to the write queue.
    pub(crate) fn post_frame(&mut self, frame: AmqpFrame) -> Result<(), AmqpError> {
        trace!("outgoing: {:?}", frame);
        let mut buf = Buffer::with_capacity(frame.encoded_size());
        frame.encode(&mut buf)?;
        self.post_bytes(buf.freeze());
        Ok(())
    }

    /// Append pre-encoded frames, written out as one unit.
    pub(crate) fn post_bytes(&mut self, bytes: Bytes) {
        self.write_size += bytes.len();
        self.write_queue.push_back(bytes);
        self.write_task.wake();
    }

    /// Receiver resolved once queued outbound data drops below the write
    /// buffer limit, `None` if there is room already.
    pub(crate) fn drain_waiter(&mut self) -> Option<oneshot::Receiver<()>> {
        if self.write_size < self.config.write_buffer {
            None
        } else {
            let (tx, rx) = oneshot::channel();
            self.drain_waiters.push(tx);
            Some(rx)
        }
    }

    fn pop_write(&mut self) -> Option<Bytes> {
        let item = self.write_queue.pop_front()?;
        self.write_size -= item.len();
        if self.write_size < self.config.write_buffer {
            for tx in self.drain_waiters.drain(..) {
                let _ = tx.send(());
            }
        }
        Some(item)
    }

    /// Register await entry for one of `replies` on `channel_id`.
    pub(crate) fn expect(&mut self, channel_id: u16, replies: &'static [(u16, u16)]) -> ReplyRx {
        let (tx, rx) = oneshot::channel();
        if let Some(ref err) = self.error {
            let _ = tx.send(Err(err.clone()));
        } else {
            self.awaits.push_back(AwaitEntry {
                channel_id,
                replies,
                tx,
            });
        }
        rx
    }

    /// Fail every waiter on every channel.
    pub(crate) fn set_error(&mut self, err: AmqpError) {
        for entry in self.awaits.drain(..) {
            let _ = entry.tx.send(Err(err.clone()));
        }
        for (_, mut channel) in self.channels.drain() {
            channel.fail(err.clone());
        }
        self.drain_waiters.clear();
        if self.error.is_none() {
            self.error = Some(err);
        }
        self.write_task.wake();
    }

    /// Stop processing and close the transport once the write queue is flushed.
    pub(crate) fn terminate(&mut self, err: AmqpError) {
        self.set_error(err);
        self.state = State::Closed;
    }

    /// Disconnect because the peer broke the protocol.
    fn violation(&mut self, reason: CloseReason) {
        self.violation_with(reason.clone(), AmqpError::ProtocolViolation(reason))
    }

    fn violation_with(&mut self, reason: CloseReason, err: AmqpError) {
        error!("protocol violation, disconnecting: {}", reason);
        if let Err(e) = self.post_frame(AmqpFrame::new(
            0,
            Method::from(reason.to_connection_close()),
        )) {
            error!("can not encode connection.close: {}", e);
        }
        self.terminate(err);
    }

    fn fail_channel_waiters(&mut self, channel_id: u16, err: &AmqpError) {
        let (failed, kept): (VecDeque<_>, VecDeque<_>) = self
            .awaits
            .drain(..)
            .partition(|entry| entry.channel_id == channel_id);
        self.awaits = kept;
        for entry in failed {
            let _ = entry.tx.send(Err(err.clone()));
        }
    }

    /// Forget channel after close-ok, its id can be allocated again.
    fn remove_channel(&mut self, channel_id: u16) {
        self.channels.remove(&channel_id);
        let err = AmqpError::channel_exception(format!("Channel #{} is closed.", channel_id));
        self.fail_channel_waiters(channel_id, &err);
    }

    fn remote_close(&mut self, close: ConnectionClose) {
        let reason = CloseReason::from(&close);
        warn!("connection closed by broker: {}", reason);
        if let Err(e) = self.post_frame(AmqpFrame::new(0, Method::from(ConnectionCloseOk {}))) {
            error!("can not encode connection.close-ok: {}", e);
        }
        self.terminate(AmqpError::RemoteClose(reason));
    }

    fn remote_channel_close(
        &mut self,
        channel_id: u16,
        close: &Method,
        reason: CloseReason,
    ) -> Result<Option<Effect>, CloseReason> {
        let mut channel = match self.channels.remove(&channel_id) {
            Some(channel) => channel,
            None => {
                return Err(CloseReason::new(
                    reply_code::CHANNEL_ERROR,
                    format!("Received channel.close on closed channel #{}.", channel_id),
                )
                .for_method(close))
            }
        };
        warn!("channel #{} closed by broker: {}", channel_id, reason);

        self.post_frame(AmqpFrame::new(channel_id, Method::from(ChannelCloseOk {})))
            .map_err(|e| CloseReason::new(reply_code::INTERNAL_ERROR, e.to_string()))?;

        let err = AmqpError::RemoteClose(reason);
        self.fail_channel_waiters(channel_id, &err);
        channel.fail(err);
        Ok(None)
    }

    /// Bookkeeping for a method that completed an await entry.
    fn on_reply(&mut self, channel_id: u16, method: &Method) {
        match method {
            Method::ConnectionOpenOk(_) => self.state = State::Open,
            Method::ConnectionCloseOk(_) => {
                self.terminate(AmqpError::Disconnected);
            }
            _ => {
                if let Some(channel) = self.channels.get_mut(&channel_id) {
                    channel.on_reply(method);
                }
            }
        }
    }

    fn handle_connection_method(&mut self, method: Method) -> Result<Option<Effect>, CloseReason> {
        match method {
            Method::ConnectionBlocked(blocked) => {
                warn!("connection blocked by broker: {}", blocked.reason);
                self.blocked = true;
                Ok(None)
            }
            Method::ConnectionUnblocked(_) => {
                info!("connection unblocked by broker");
                self.blocked = false;
                Ok(None)
            }
            method => Err(CloseReason::new(
                reply_code::UNEXPECTED_FRAME,
                format!("Unexpected method {} on channel #0.", method.name()),
            )
            .for_method(&method)),
        }
    }

    /// Route one inbound frame: await entries first, then connection or
    /// channel handling.
    pub(crate) fn handle_frame(&mut self, frame: AmqpFrame) -> Result<Option<Effect>, CloseReason> {
        if self.state == State::Closed {
            trace!("connection is closed, dropping frame: {:?}", frame);
            return Ok(None);
        }
        let (channel_id, frame) = frame.into_parts();

        match frame {
            Frame::Method(Method::ConnectionClose(close)) if channel_id == 0 => {
                self.remote_close(close);
                Ok(None)
            }
            Frame::Method(Method::ChannelClose(close)) if channel_id != 0 => {
                let reason = CloseReason::from(&close).on_channel(channel_id);
                self.remote_channel_close(channel_id, &Method::ChannelClose(close), reason)
            }
            Frame::Method(method) => {
                if let Some(idx) = self
                    .awaits
                    .iter()
                    .position(|entry| entry.matches(channel_id, &method))
                {
                    if let Some(entry) = self.awaits.remove(idx) {
                        self.on_reply(channel_id, &method);
                        let _ = entry.tx.send(Ok(method));
                    }
                    return Ok(None);
                }

                if channel_id == 0 {
                    self.handle_connection_method(method)
                } else {
                    self.channel_frame(channel_id, Frame::Method(method))
                }
            }
            Frame::Heartbeat if channel_id == 0 => Ok(None),
            Frame::Heartbeat => Err(CloseReason::new(
                reply_code::UNEXPECTED_FRAME,
                format!("Got heartbeat on non-zero channel #{}.", channel_id),
            )),
            frame => {
                if channel_id == 0 {
                    Err(CloseReason::new(
                        reply_code::UNEXPECTED_FRAME,
                        format!("Received frame #{} on channel #0.", frame.frame_type()),
                    ))
                } else {
                    self.channel_frame(channel_id, frame)
                }
            }
        }
    }

    fn channel_frame(&mut self, channel_id: u16, frame: Frame) -> Result<Option<Effect>, CloseReason> {
        let channel = match self.channels.get_mut(&channel_id) {
            Some(channel) => channel,
            None => {
                return Err(CloseReason::new(
                    reply_code::CHANNEL_ERROR,
                    format!(
                        "Received frame #{} on closed channel #{}.",
                        frame.frame_type(),
                        channel_id
                    ),
                ))
            }
        };
        let res = channel
            .handle_frame(frame)
            .map_err(|reason| reason.on_channel(channel_id));
        if channel.is_closed() {
            self.remove_channel(channel_id);
        }
        res
    }
}

/// Wait for the reply registered with `ConnectionInner::expect`.
pub(crate) async fn wait(rx: ReplyRx) -> Result<Method, AmqpError> {
    match rx.await {
        Ok(res) => res,
        Err(_) => Err(AmqpError::Disconnected),
    }
}

/// Decode frames from the transport, dispatch them, flush the write queue
/// and drive the heartbeat.
///
/// Resolves when the transport is closed or the connection is terminated.
pub(crate) struct Connection<T> {
    inner: Cell<ConnectionInner>,
    framed: Framed<T, AmqpCodec>,
    hb: Option<Heartbeat>,
}

impl<T: AsyncRead + AsyncWrite + Unpin> Connection<T> {
    pub(crate) fn new(framed: Framed<T, AmqpCodec>, inner: Cell<ConnectionInner>) -> Connection<T> {
        Connection {
            inner,
            framed,
            hb: None,
        }
    }

    fn apply_tune(&mut self) {
        let tune = self.inner.get_mut().pending_tune.take();
        if let Some(tune) = tune {
            if tune.frame_max != 0 {
                self.framed.codec_mut().max_size(tune.frame_max as usize);
            }
            if tune.heartbeat != 0 {
                trace!("starting heartbeat, interval {}s", tune.heartbeat);
                self.hb = Some(Heartbeat::new(Duration::from_secs(u64::from(
                    tune.heartbeat,
                ))));
            }
        }
    }

    fn poll_heartbeat(&mut self, cx: &mut Context) -> Result<(), AmqpError> {
        let act = match self.hb {
            Some(ref mut hb) => hb.poll(cx),
            None => return Ok(()),
        };

        match act {
            HeartbeatAction::None => Ok(()),
            HeartbeatAction::Close => {
                warn!("heartbeat timeout, closing connection");
                self.inner.get_mut().terminate(AmqpError::Timeout);
                Err(AmqpError::Timeout)
            }
            HeartbeatAction::Heartbeat => {
                trace!("sending heartbeat");
                let callback = {
                    let mut inner = self.inner.get_mut();
                    inner.post_frame(AmqpFrame::heartbeat())?;
                    inner.config.heartbeat_callback.clone()
                };
                if let Some(callback) = callback {
                    callback();
                }
                Ok(())
            }
        }
    }

    fn poll_incoming(&mut self, cx: &mut Context) -> Poll<Result<(), AmqpError>> {
        let mut update = false;

        loop {
            if self.inner.get_ref().is_closed() {
                break;
            }

            match self.framed.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(frame))) => {
                    trace!("incoming: {:?}", frame);
                    update = true;
                    dispatch(&self.inner, frame);
                }
                Poll::Ready(Some(Err(e))) => {
                    trace!("error reading: {:?}", e);
                    let mut inner = self.inner.get_mut();
                    match e {
                        AmqpCodecError::Io(_) | AmqpCodecError::ProtocolVersionMismatch(_) => {
                            inner.terminate(e.clone().into());
                            return Poll::Ready(Err(e.into()));
                        }
                        AmqpCodecError::ParseError(ref err) => {
                            let code = match err {
                                amqp091_codec::AmqpParseError::InvalidClass(_)
                                | amqp091_codec::AmqpParseError::InvalidMethod(_, _) => {
                                    reply_code::COMMAND_INVALID
                                }
                                _ => reply_code::FRAME_ERROR,
                            };
                            inner.violation_with(CloseReason::new(code, e.to_string()), e.into());
                        }
                        _ => {
                            inner.violation_with(
                                CloseReason::new(reply_code::FRAME_ERROR, e.to_string()),
                                e.into(),
                            );
                        }
                    }
                    break;
                }
                Poll::Ready(None) => {
                    trace!("transport is closed");
                    self.inner.get_mut().terminate(AmqpError::Disconnected);
                    return Poll::Ready(Ok(()));
                }
                Poll::Pending => break,
            }
        }

        if let Some(ref mut hb) = self.hb {
            hb.update_remote(update);
        }
        Poll::Pending
    }

    /// Write queued frames, returns `true` once everything is flushed.
    fn poll_outgoing(&mut self, cx: &mut Context) -> Result<bool, AmqpError> {
        let mut update = false;

        loop {
            if self.inner.get_ref().write_queue.is_empty() {
                break;
            }
            match Sink::<Bytes>::poll_ready(Pin::new(&mut self.framed), cx) {
                Poll::Ready(Ok(())) => {
                    let item = self.inner.get_mut().pop_write();
                    if let Some(item) = item {
                        update = true;
                        if let Err(e) = Sink::<Bytes>::start_send(Pin::new(&mut self.framed), item) {
                            return Err(self.write_error(e));
                        }
                    }
                }
                Poll::Ready(Err(e)) => return Err(self.write_error(e)),
                Poll::Pending => break,
            }
        }

        let flushed = match Sink::<Bytes>::poll_flush(Pin::new(&mut self.framed), cx) {
            Poll::Ready(Ok(())) => self.inner.get_ref().write_queue.is_empty(),
            Poll::Ready(Err(e)) => return Err(self.write_error(e)),
            Poll::Pending => false,
        };

        if let Some(ref mut hb) = self.hb {
            hb.update_local(update);
        }
        Ok(flushed)
    }

    fn write_error(&mut self, e: AmqpCodecError) -> AmqpError {
        trace!("error sending data: {}", e);
        let err = AmqpError::from(e);
        self.inner.get_mut().terminate(err.clone());
        err
    }

    fn result(&self) -> Result<(), AmqpError> {
        match self.inner.get_ref().error {
            Some(AmqpError::Disconnected) | Some(AmqpError::RemoteClose(_)) | None => Ok(()),
            Some(ref err) => Err(err.clone()),
        }
    }
}

/// Handle one frame, user callbacks run after the connection state is released.
fn dispatch(cell: &Cell<ConnectionInner>, frame: AmqpFrame) {
    let channel_id = frame.channel_id();
    let effect = {
        let mut inner = cell.get_mut();
        match inner.handle_frame(frame) {
            Ok(Some(effect)) => effect,
            Ok(None) => return,
            Err(reason) => {
                inner.violation(reason);
                return;
            }
        }
    };
    run_effect(cell, channel_id, effect);
}

impl<T> Drop for Connection<T> {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.try_get_mut() {
            inner.terminate(AmqpError::Disconnected);
        }
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> Future for Connection<T> {
    type Output = Result<(), AmqpError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let this = &mut *self;
        this.inner.get_ref().write_task.register(cx.waker());
        this.apply_tune();

        if let Err(e) = this.poll_heartbeat(cx) {
            return Poll::Ready(Err(e));
        }

        if let Poll::Ready(res) = this.poll_incoming(cx) {
            return Poll::Ready(res);
        }

        match this.poll_outgoing(cx) {
            Ok(true) if this.inner.get_ref().is_closed() => Poll::Ready(this.result()),
            Ok(_) => Poll::Pending,
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}
