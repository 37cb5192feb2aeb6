use std::collections::VecDeque;
use std::convert::TryFrom;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use amqp091_codec::protocol::{
    reply_code, BasicAck, BasicCancel, BasicCancelOk, BasicConsume, BasicConsumeOk, BasicDeliver,
    BasicGet, BasicGetOk, BasicNack, BasicProperties, BasicPublish, BasicQos, BasicQosOk,
    BasicRecover, BasicRecoverOk, BasicReject, BasicReturn, ChannelClose, ChannelFlow,
    ChannelFlowOk, ConfirmSelect, ConfirmSelectOk, ContentHeader, ExchangeBind, ExchangeBindOk,
    ExchangeDeclare, ExchangeDeclareOk, ExchangeDelete, ExchangeDeleteOk, ExchangeUnbind,
    ExchangeUnbindOk, Method, QueueBind, QueueBindOk, QueueDeclare, QueueDeclareOk, QueueDelete,
    QueueDeleteOk, QueuePurge, QueuePurgeOk, QueueUnbind, QueueUnbindOk, TxCommit, TxCommitOk,
    TxRollback, TxRollbackOk, TxSelect, TxSelectOk,
};
use amqp091_codec::types::FieldTable;
use amqp091_codec::{AmqpFrame, Buffer, Encode, Frame, FRAME_OVERHEAD};
use bytes::{Bytes, BytesMut};
use bytestring::ByteString;
use futures::channel::oneshot;
use futures::future::{join_all, LocalBoxFuture};
use fxhash::FxHashMap;
use slab::Slab;
use uuid::Uuid;

use crate::cell::{Cell, WeakCell};
use crate::connection::{wait, ConnectionInner, ReplyRx};
use crate::errors::{AmqpError, CloseReason};
use crate::message::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Waiting for methods
    Ready,
    /// Got a content method, waiting for its header frame
    AwaitingHeader,
    /// Got the header frame, waiting for body frames
    AwaitingBody,
    /// Client sent `channel.close`, waiting for close-ok
    Closing,
    Closed,
    /// Broker broke the protocol on this channel
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Regular,
    /// `tx.select` succeeded
    Transactional,
    /// `confirm.select` succeeded, publishes get delivery tags
    Confirm,
}

/// Publisher confirm received in confirm mode.
#[derive(Debug, Clone, PartialEq)]
pub enum Confirmation {
    Ack(BasicAck),
    Nack(BasicNack),
}

impl Confirmation {
    pub fn delivery_tag(&self) -> u64 {
        match self {
            Confirmation::Ack(ack) => ack.delivery_tag,
            Confirmation::Nack(nack) => nack.delivery_tag,
        }
    }

    /// Confirms every tag up to and including `delivery_tag`
    pub fn multiple(&self) -> bool {
        match self {
            Confirmation::Ack(ack) => ack.multiple,
            Confirmation::Nack(nack) => nack.multiple,
        }
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Confirmation::Ack(_))
    }
}

/// Handle returned by listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

/// Result of a consumer callback.
///
/// A deferred outcome keeps its delivery counted against the consumer's
/// concurrency until the future resolves.
pub enum Outcome {
    Done,
    Deferred(LocalBoxFuture<'static, ()>),
}

impl Outcome {
    pub fn deferred<F, E>(fut: F) -> Self
    where
        F: Future<Output = Result<(), E>> + 'static,
        E: fmt::Display,
    {
        Outcome::Deferred(Box::pin(async move {
            if let Err(e) = fut.await {
                error!("consumer callback failed: {}", e);
            }
        }))
    }
}

impl From<()> for Outcome {
    fn from(_: ()) -> Self {
        Outcome::Done
    }
}

impl<E: fmt::Display> From<Result<(), E>> for Outcome {
    fn from(res: Result<(), E>) -> Self {
        if let Err(e) = res {
            error!("consumer callback failed: {}", e);
        }
        Outcome::Done
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Outcome::Done => write!(f, "Outcome::Done"),
            Outcome::Deferred(_) => write!(f, "Outcome::Deferred"),
        }
    }
}

type ConsumerCallback = Rc<dyn Fn(Message, Channel) -> Outcome>;
type ReturnListener = Rc<dyn Fn(&Message, &BasicReturn)>;
type AckListener = Rc<dyn Fn(&Confirmation)>;

pub(crate) struct Consumer {
    callback: ConsumerCallback,
    concurrency: usize,
    in_flight: usize,
    queue: VecDeque<Message>,
}

impl Consumer {
    pub(crate) fn new(callback: ConsumerCallback, concurrency: usize) -> Self {
        Consumer {
            callback,
            concurrency,
            in_flight: 0,
            queue: VecDeque::new(),
        }
    }
}

/// Content method waiting for its header and body.
enum Stash {
    Deliver(BasicDeliver),
    Return(BasicReturn),
    Get(BasicGetOk),
}

/// Work that has to run after the connection state is released.
#[derive(Debug)]
pub(crate) enum Effect {
    /// Message queued for consumer
    Deliver(ByteString),
    Return(Message, BasicReturn),
    Confirm(Confirmation),
    /// Method the client has to answer with
    Reply(Method),
}

/// Per channel protocol state.
pub(crate) struct ChannelInner {
    id: u16,
    state: ChannelState,
    mode: ChannelMode,
    stash: Option<Stash>,
    header: Option<ContentHeader>,
    body_remaining: u64,
    body: BytesMut,
    consumers: FxHashMap<ByteString, Consumer>,
    pending_consumers: VecDeque<Consumer>,
    return_listeners: Slab<ReturnListener>,
    ack_listeners: Slab<AckListener>,
    delivery_tag: u64,
    get_waiter: Option<oneshot::Sender<Result<Message, AmqpError>>>,
    close_waiters: Vec<oneshot::Sender<Result<(), AmqpError>>>,
}

impl ChannelInner {
    pub(crate) fn new(id: u16) -> ChannelInner {
        ChannelInner {
            id,
            state: ChannelState::Ready,
            mode: ChannelMode::Regular,
            stash: None,
            header: None,
            body_remaining: 0,
            body: BytesMut::new(),
            consumers: FxHashMap::default(),
            pending_consumers: VecDeque::new(),
            return_listeners: Slab::new(),
            ack_listeners: Slab::new(),
            delivery_tag: 0,
            get_waiter: None,
            close_waiters: Vec::new(),
        }
    }

    /// Channel accepts new operations
    pub(crate) fn check(&self) -> Result<(), AmqpError> {
        match self.state {
            ChannelState::Closing => Err(AmqpError::channel_exception(format!(
                "Channel #{} is closing.",
                self.id
            ))),
            ChannelState::Closed => Err(AmqpError::channel_exception(format!(
                "Channel #{} is closed.",
                self.id
            ))),
            ChannelState::Error => Err(AmqpError::channel_exception(format!(
                "Channel #{} is in error state.",
                self.id
            ))),
            _ => Ok(()),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state == ChannelState::Closed
    }

    /// Connection or channel failed, release everything waiting on it.
    pub(crate) fn fail(&mut self, err: AmqpError) {
        if self.state != ChannelState::Error {
            self.state = ChannelState::Closed;
        }
        if let Some(tx) = self.get_waiter.take() {
            let _ = tx.send(Err(err.clone()));
        }
        for tx in self.close_waiters.drain(..) {
            let _ = tx.send(Err(err.clone()));
        }
        self.release();
    }

    fn release(&mut self) {
        self.stash = None;
        self.header = None;
        self.body.clear();
        self.consumers.clear();
        self.pending_consumers.clear();
        self.return_listeners.clear();
        self.ack_listeners.clear();
    }

    fn closed(&mut self) {
        self.state = ChannelState::Closed;
        if let Some(tx) = self.get_waiter.take() {
            let _ = tx.send(Err(AmqpError::channel_exception(format!(
                "Channel #{} is closed.",
                self.id
            ))));
        }
        for tx in self.close_waiters.drain(..) {
            let _ = tx.send(Ok(()));
        }
        self.release();
    }

    /// Bookkeeping for a reply that completed an await entry.
    pub(crate) fn on_reply(&mut self, method: &Method) {
        match method {
            Method::BasicGetOk(ok) => {
                if self.state == ChannelState::Ready {
                    self.stash = Some(Stash::Get(ok.clone()));
                    self.state = ChannelState::AwaitingHeader;
                }
            }
            Method::BasicGetEmpty(_) => {
                self.get_waiter = None;
            }
            Method::BasicConsumeOk(ok) => match self.pending_consumers.pop_front() {
                Some(consumer) => {
                    self.consumers.insert(ok.consumer_tag.clone(), consumer);
                }
                None => warn!(
                    "channel #{}: consume-ok without pending consumer: {}",
                    self.id, ok.consumer_tag
                ),
            },
            Method::BasicCancelOk(ok) => {
                self.consumers.remove(&ok.consumer_tag);
            }
            Method::TxSelectOk(_) => self.mode = ChannelMode::Transactional,
            Method::ConfirmSelectOk(_) => self.mode = ChannelMode::Confirm,
            _ => (),
        }
    }

    /// Advance the state machine with one inbound frame.
    pub(crate) fn handle_frame(&mut self, frame: Frame) -> Result<Option<Effect>, CloseReason> {
        if self.state == ChannelState::Error {
            return Err(CloseReason::new(
                reply_code::CHANNEL_ERROR,
                format!("Channel #{} is in error state.", self.id),
            ));
        }

        if let Frame::Method(Method::ChannelCloseOk(_)) = frame {
            self.closed();
            return Ok(None);
        }

        let res = match self.state {
            ChannelState::Closing => {
                trace!("channel #{} is closing, dropping frame: {:?}", self.id, frame);
                Ok(None)
            }
            ChannelState::Ready => self.on_ready(frame),
            ChannelState::AwaitingHeader => self.on_awaiting_header(frame),
            ChannelState::AwaitingBody => self.on_awaiting_body(frame),
            ChannelState::Closed | ChannelState::Error => Err(CloseReason::new(
                reply_code::CHANNEL_ERROR,
                format!("Received frame on closed channel #{}.", self.id),
            )),
        };

        if res.is_err() {
            self.state = ChannelState::Error;
        }
        res
    }

    fn on_ready(&mut self, frame: Frame) -> Result<Option<Effect>, CloseReason> {
        match frame {
            Frame::Method(Method::BasicDeliver(deliver)) => {
                self.stash = Some(Stash::Deliver(deliver));
                self.state = ChannelState::AwaitingHeader;
                Ok(None)
            }
            Frame::Method(Method::BasicReturn(ret)) => {
                self.stash = Some(Stash::Return(ret));
                self.state = ChannelState::AwaitingHeader;
                Ok(None)
            }
            Frame::Method(Method::BasicAck(ack)) => Ok(Some(Effect::Confirm(Confirmation::Ack(ack)))),
            Frame::Method(Method::BasicNack(nack)) => {
                Ok(Some(Effect::Confirm(Confirmation::Nack(nack))))
            }
            Frame::Method(Method::ChannelFlow(flow)) => {
                Ok(Some(Effect::Reply(Method::from(ChannelFlowOk {
                    active: flow.active,
                }))))
            }
            Frame::Method(Method::BasicCancel(cancel)) => {
                warn!(
                    "channel #{}: consumer {} cancelled by broker",
                    self.id, cancel.consumer_tag
                );
                self.consumers.remove(&cancel.consumer_tag);
                if cancel.no_wait {
                    Ok(None)
                } else {
                    Ok(Some(Effect::Reply(Method::from(BasicCancelOk {
                        consumer_tag: cancel.consumer_tag,
                    }))))
                }
            }
            Frame::Method(method) => {
                warn!("channel #{}: unhandled method {}", self.id, method.name());
                Ok(None)
            }
            Frame::Header(_) => Err(unexpected("Got header frame, expected method frame.")),
            Frame::Body(_) => Err(unexpected("Got body frame, expected method frame.")),
            Frame::Heartbeat => Err(unexpected("Got heartbeat on non-zero channel.")),
        }
    }

    fn on_awaiting_header(&mut self, frame: Frame) -> Result<Option<Effect>, CloseReason> {
        match frame {
            Frame::Header(header) => {
                self.body_remaining = header.body_size;
                self.body.reserve(header.body_size as usize);
                self.header = Some(header);
                if self.body_remaining == 0 {
                    Ok(self.complete())
                } else {
                    self.state = ChannelState::AwaitingBody;
                    Ok(None)
                }
            }
            Frame::Method(_) => Err(unexpected("Got method frame, expected header frame.")),
            Frame::Body(_) => Err(unexpected("Got body frame, expected header frame.")),
            Frame::Heartbeat => Err(unexpected("Got heartbeat on non-zero channel.")),
        }
    }

    fn on_awaiting_body(&mut self, frame: Frame) -> Result<Option<Effect>, CloseReason> {
        match frame {
            Frame::Body(chunk) => {
                let len = chunk.len() as u64;
                if len > self.body_remaining {
                    return Err(CloseReason::new(
                        reply_code::SYNTAX_ERROR,
                        format!(
                            "Body overflow, received {} more bytes.",
                            len - self.body_remaining
                        ),
                    ));
                }
                self.body_remaining -= len;
                self.body.extend_from_slice(&chunk);
                if self.body_remaining == 0 {
                    Ok(self.complete())
                } else {
                    Ok(None)
                }
            }
            Frame::Method(_) => Err(unexpected("Got method frame, expected body frame.")),
            Frame::Header(_) => Err(unexpected("Got header frame, expected content frame.")),
            Frame::Heartbeat => Err(unexpected("Got heartbeat on non-zero channel.")),
        }
    }

    /// Assemble message from the stashed method, header and body.
    fn complete(&mut self) -> Option<Effect> {
        self.state = ChannelState::Ready;
        self.body_remaining = 0;
        let content = self.body.split().freeze();
        let header = self.header.take()?;

        match self.stash.take()? {
            Stash::Deliver(deliver) => {
                let tag = deliver.consumer_tag.clone();
                match self.consumers.get_mut(&tag) {
                    Some(consumer) => {
                        consumer
                            .queue
                            .push_back(Message::delivered(deliver, header, content));
                        Some(Effect::Deliver(tag))
                    }
                    None => {
                        warn!("channel #{}: delivery for unknown consumer {}", self.id, tag);
                        None
                    }
                }
            }
            Stash::Return(ret) => {
                let message = Message::returned(&ret, header, content);
                Some(Effect::Return(message, ret))
            }
            Stash::Get(get_ok) => {
                let message = Message::fetched(get_ok, header, content);
                match self.get_waiter.take() {
                    Some(tx) => {
                        let _ = tx.send(Ok(message));
                    }
                    None => warn!("channel #{}: get-ok without waiter", self.id),
                }
                None
            }
        }
    }
}

fn unexpected(text: &'static str) -> CloseReason {
    CloseReason::new(reply_code::UNEXPECTED_FRAME, text)
}

/// Run the effect of an inbound frame, no connection borrow is held.
pub(crate) fn run_effect(cell: &Cell<ConnectionInner>, channel_id: u16, effect: Effect) {
    match effect {
        Effect::Deliver(tag) => deliver(cell, channel_id, tag),
        Effect::Return(message, ret) => {
            let listeners: Vec<ReturnListener> = match cell.get_ref().channels.get(&channel_id) {
                Some(channel) => channel.return_listeners.iter().map(|(_, l)| l.clone()).collect(),
                None => return,
            };
            if listeners.is_empty() {
                warn!(
                    "channel #{}: message returned with {} {}, no return listener",
                    channel_id, ret.reply_code, ret.reply_text
                );
            }
            for listener in listeners {
                listener(&message, &ret);
            }
        }
        Effect::Confirm(confirmation) => {
            let listeners: Vec<AckListener> = match cell.get_ref().channels.get(&channel_id) {
                Some(channel) => channel.ack_listeners.iter().map(|(_, l)| l.clone()).collect(),
                None => return,
            };
            for listener in listeners {
                listener(&confirmation);
            }
        }
        Effect::Reply(method) => {
            if let Err(e) = cell.get_mut().post_frame(AmqpFrame::new(channel_id, method)) {
                error!("channel #{}: can not send reply: {}", channel_id, e);
            }
        }
    }
}

/// Hand queued messages to the consumer while its concurrency allows.
fn deliver(cell: &Cell<ConnectionInner>, channel_id: u16, tag: ByteString) {
    loop {
        let (callback, message) = {
            let mut inner = cell.get_mut();
            let consumer = match inner
                .channels
                .get_mut(&channel_id)
                .and_then(|ch| ch.consumers.get_mut(&tag))
            {
                Some(consumer) => consumer,
                None => return,
            };
            if consumer.in_flight >= consumer.concurrency {
                return;
            }
            let message = match consumer.queue.pop_front() {
                Some(message) => message,
                None => return,
            };
            consumer.in_flight += 1;
            (consumer.callback.clone(), message)
        };

        match callback(message, Channel::new(channel_id, cell.downgrade())) {
            Outcome::Done => release(cell, channel_id, &tag),
            Outcome::Deferred(fut) => {
                let conn = cell.downgrade();
                let tag = tag.clone();
                actix_rt::spawn(async move {
                    fut.await;
                    if let Some(cell) = conn.upgrade() {
                        release(&cell, channel_id, &tag);
                        deliver(&cell, channel_id, tag);
                    }
                });
            }
        }
    }
}

fn release(cell: &Cell<ConnectionInner>, channel_id: u16, tag: &ByteString) {
    if let Some(consumer) = cell
        .get_mut()
        .channels
        .get_mut(&channel_id)
        .and_then(|ch| ch.consumers.get_mut(tag))
    {
        consumer.in_flight = consumer.in_flight.saturating_sub(1);
    }
}

fn reply<T>(method: Method) -> Result<T, AmqpError>
where
    T: TryFrom<Method, Error = Method>,
{
    T::try_from(method).map_err(|m| AmqpError::unexpected(&m))
}

/// Channel handle.
///
/// Handles are cheap to clone, every operation goes through the shared
/// connection state.
#[derive(Clone)]
pub struct Channel {
    id: u16,
    conn: WeakCell<ConnectionInner>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Channel").field("id", &self.id).finish()
    }
}

impl Channel {
    pub(crate) fn new(id: u16, conn: WeakCell<ConnectionInner>) -> Channel {
        Channel { id, conn }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    fn connection(&self) -> Result<Cell<ConnectionInner>, AmqpError> {
        self.conn.upgrade().ok_or(AmqpError::Disconnected)
    }

    pub fn state(&self) -> ChannelState {
        let cell = match self.conn.upgrade() {
            Some(cell) => cell,
            None => return ChannelState::Closed,
        };
        let state = cell
            .get_ref()
            .channels
            .get(&self.id)
            .map(|ch| ch.state)
            .unwrap_or(ChannelState::Closed);
        state
    }

    pub fn mode(&self) -> ChannelMode {
        let cell = match self.conn.upgrade() {
            Some(cell) => cell,
            None => return ChannelMode::Regular,
        };
        let mode = cell
            .get_ref()
            .channels
            .get(&self.id)
            .map(|ch| ch.mode)
            .unwrap_or(ChannelMode::Regular);
        mode
    }

    fn require_mode(&self, mode: ChannelMode, text: &'static str) -> Result<(), AmqpError> {
        if self.mode() == mode {
            Ok(())
        } else {
            Err(AmqpError::channel_exception(text))
        }
    }

    /// Send method without waiting for a reply
    fn send<M: Into<Method>>(&self, method: M) -> Result<(), AmqpError> {
        let cell = self.connection()?;
        let mut inner = cell.get_mut();
        inner.channel_mut(self.id)?;
        inner.post_frame(AmqpFrame::new(self.id, method.into()))
    }

    fn request(&self, method: Method) -> Result<ReplyRx, AmqpError> {
        let cell = self.connection()?;
        let mut inner = cell.get_mut();
        inner.channel_mut(self.id)?;
        let replies = method.info().replies;
        inner.post_frame(AmqpFrame::new(self.id, method))?;
        Ok(inner.expect(self.id, replies))
    }

    /// Send synchronous method and wait for its reply
    async fn call<M: Into<Method>>(&self, method: M) -> Result<Method, AmqpError> {
        let rx = self.request(method.into())?;
        wait(rx).await
    }

    pub async fn exchange_declare(&self, args: ExchangeDeclare) -> Result<(), AmqpError> {
        if args.no_wait {
            self.send(args)
        } else {
            let _: ExchangeDeclareOk = reply(self.call(args).await?)?;
            Ok(())
        }
    }

    pub async fn exchange_delete(&self, args: ExchangeDelete) -> Result<(), AmqpError> {
        if args.no_wait {
            self.send(args)
        } else {
            let _: ExchangeDeleteOk = reply(self.call(args).await?)?;
            Ok(())
        }
    }

    pub async fn exchange_bind(&self, args: ExchangeBind) -> Result<(), AmqpError> {
        if args.no_wait {
            self.send(args)
        } else {
            let _: ExchangeBindOk = reply(self.call(args).await?)?;
            Ok(())
        }
    }

    pub async fn exchange_unbind(&self, args: ExchangeUnbind) -> Result<(), AmqpError> {
        if args.no_wait {
            self.send(args)
        } else {
            let _: ExchangeUnbindOk = reply(self.call(args).await?)?;
            Ok(())
        }
    }

    /// Declare queue, with `no_wait` the reply is synthesized from the request.
    pub async fn queue_declare(&self, args: QueueDeclare) -> Result<QueueDeclareOk, AmqpError> {
        if args.no_wait {
            let queue = args.queue.clone();
            self.send(args)?;
            Ok(QueueDeclareOk {
                queue,
                message_count: 0,
                consumer_count: 0,
            })
        } else {
            reply(self.call(args).await?)
        }
    }

    pub async fn queue_bind(&self, args: QueueBind) -> Result<(), AmqpError> {
        if args.no_wait {
            self.send(args)
        } else {
            let _: QueueBindOk = reply(self.call(args).await?)?;
            Ok(())
        }
    }

    pub async fn queue_unbind(&self, args: QueueUnbind) -> Result<(), AmqpError> {
        let _: QueueUnbindOk = reply(self.call(args).await?)?;
        Ok(())
    }

    /// Purge queue, returns number of purged messages.
    pub async fn queue_purge(&self, args: QueuePurge) -> Result<u32, AmqpError> {
        if args.no_wait {
            self.send(args).map(|_| 0)
        } else {
            let ok: QueuePurgeOk = reply(self.call(args).await?)?;
            Ok(ok.message_count)
        }
    }

    /// Delete queue, returns number of deleted messages.
    pub async fn queue_delete(&self, args: QueueDelete) -> Result<u32, AmqpError> {
        if args.no_wait {
            self.send(args).map(|_| 0)
        } else {
            let ok: QueueDeleteOk = reply(self.call(args).await?)?;
            Ok(ok.message_count)
        }
    }

    pub async fn qos(
        &self,
        prefetch_size: u32,
        prefetch_count: u16,
        global: bool,
    ) -> Result<(), AmqpError> {
        let _: BasicQosOk = reply(
            self.call(BasicQos {
                prefetch_size,
                prefetch_count,
                global,
            })
            .await?,
        )?;
        Ok(())
    }

    /// Start consumer, returns its consumer tag.
    ///
    /// At most `concurrency` callbacks run at the same time, further
    /// deliveries are queued until a deferred outcome resolves.
    pub async fn consume<F, R>(
        &self,
        mut args: BasicConsume,
        concurrency: usize,
        callback: F,
    ) -> Result<ByteString, AmqpError>
    where
        F: Fn(Message, Channel) -> R + 'static,
        R: Into<Outcome>,
    {
        if concurrency == 0 {
            return Err(AmqpError::channel_exception(
                "Consumer concurrency must be greater than zero.",
            ));
        }
        let callback: ConsumerCallback =
            Rc::new(move |msg: Message, ch: Channel| -> Outcome { callback(msg, ch).into() });
        let consumer = Consumer::new(callback, concurrency);

        if args.no_wait {
            if args.consumer_tag.is_empty() {
                args.consumer_tag = format!("amq.ctag-{}", Uuid::new_v4().simple()).into();
            }
            let tag = args.consumer_tag.clone();

            let cell = self.connection()?;
            let mut inner = cell.get_mut();
            inner.channel_mut(self.id)?;
            inner.post_frame(AmqpFrame::new(self.id, Method::from(args)))?;
            inner.channel_mut(self.id)?.consumers.insert(tag.clone(), consumer);
            Ok(tag)
        } else {
            let rx = {
                let cell = self.connection()?;
                let mut inner = cell.get_mut();
                inner.channel_mut(self.id)?;
                inner.post_frame(AmqpFrame::new(self.id, Method::from(args)))?;
                inner
                    .channel_mut(self.id)?
                    .pending_consumers
                    .push_back(consumer);
                inner.expect(self.id, BasicConsume::INFO.replies)
            };
            let ok: BasicConsumeOk = reply(wait(rx).await?)?;
            Ok(ok.consumer_tag)
        }
    }

    pub async fn cancel(&self, consumer_tag: ByteString, no_wait: bool) -> Result<(), AmqpError> {
        let args = BasicCancel {
            consumer_tag: consumer_tag.clone(),
            no_wait,
        };
        if no_wait {
            let cell = self.connection()?;
            let mut inner = cell.get_mut();
            inner.channel_mut(self.id)?;
            inner.post_frame(AmqpFrame::new(self.id, Method::from(args)))?;
            inner.channel_mut(self.id)?.consumers.remove(&consumer_tag);
            Ok(())
        } else {
            let _: BasicCancelOk = reply(self.call(args).await?)?;
            Ok(())
        }
    }

    /// Wait until the connection write buffer has room.
    async fn writable(&self) -> Result<(), AmqpError> {
        loop {
            let rx = {
                let cell = self.connection()?;
                let mut inner = cell.get_mut();
                inner.channel_mut(self.id)?;
                match inner.drain_waiter() {
                    Some(rx) => rx,
                    None => return Ok(()),
                }
            };
            trace!("channel #{}: write buffer is full, waiting", self.id);
            let _ = rx.await;
        }
    }

    /// Publish message.
    ///
    /// `headers` carries both content properties and custom headers. The
    /// method, header and body frames are queued as one unit. Waits while
    /// the connection write buffer is full. In confirm mode the delivery
    /// tag of the message is returned.
    pub async fn publish<B: Into<Bytes>>(
        &self,
        args: BasicPublish,
        headers: FieldTable,
        body: B,
    ) -> Result<Option<u64>, AmqpError> {
        let body = body.into();
        self.writable().await?;

        let cell = self.connection()?;
        let mut inner = cell.get_mut();
        let frame_max = inner.tune.frame_max as usize;
        inner.channel_mut(self.id)?;

        let mut frames = vec![
            AmqpFrame::new(self.id, Method::from(args)),
            AmqpFrame::new(
                self.id,
                ContentHeader::new(body.len() as u64, BasicProperties::from_table(headers)),
            ),
        ];
        let chunk = if frame_max > FRAME_OVERHEAD {
            frame_max - FRAME_OVERHEAD
        } else {
            body.len()
        };
        let mut offset = 0;
        while offset < body.len() {
            let end = std::cmp::min(offset + chunk, body.len());
            frames.push(AmqpFrame::new(self.id, Frame::Body(body.slice(offset..end))));
            offset = end;
        }

        let size = frames.iter().map(|f| f.encoded_size()).sum();
        let mut buf = Buffer::with_capacity(size);
        for frame in &frames {
            frame.encode(&mut buf)?;
        }
        inner.post_bytes(buf.freeze());

        let channel = inner.channel_mut(self.id)?;
        if channel.mode == ChannelMode::Confirm {
            channel.delivery_tag += 1;
            Ok(Some(channel.delivery_tag))
        } else {
            Ok(None)
        }
    }

    /// Fetch one message, `None` if the queue is empty.
    pub async fn get(&self, queue: ByteString, no_ack: bool) -> Result<Option<Message>, AmqpError> {
        let (reply_rx, message_rx) = {
            let cell = self.connection()?;
            let mut inner = cell.get_mut();
            if inner.channel_mut(self.id)?.get_waiter.is_some() {
                return Err(AmqpError::channel_exception(format!(
                    "Another basic.get is in progress on channel #{}.",
                    self.id
                )));
            }
            inner.post_frame(AmqpFrame::new(
                self.id,
                Method::from(BasicGet {
                    queue,
                    no_ack,
                    ..Default::default()
                }),
            ))?;
            let (tx, rx) = oneshot::channel();
            inner.channel_mut(self.id)?.get_waiter = Some(tx);
            (inner.expect(self.id, BasicGet::INFO.replies), rx)
        };

        match wait(reply_rx).await? {
            Method::BasicGetOk(_) => match message_rx.await {
                Ok(res) => res.map(Some),
                Err(_) => Err(AmqpError::Disconnected),
            },
            Method::BasicGetEmpty(_) => Ok(None),
            method => Err(AmqpError::unexpected(&method)),
        }
    }

    pub fn ack(&self, delivery_tag: u64, multiple: bool) -> Result<(), AmqpError> {
        self.send(BasicAck {
            delivery_tag,
            multiple,
        })
    }

    pub fn nack(&self, delivery_tag: u64, multiple: bool, requeue: bool) -> Result<(), AmqpError> {
        self.send(BasicNack {
            delivery_tag,
            multiple,
            requeue,
        })
    }

    pub fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), AmqpError> {
        self.send(BasicReject {
            delivery_tag,
            requeue,
        })
    }

    pub async fn recover(&self, requeue: bool) -> Result<(), AmqpError> {
        let _: BasicRecoverOk = reply(self.call(BasicRecover { requeue }).await?)?;
        Ok(())
    }

    /// Ask the broker to pause or resume deliveries, returns the flow state.
    pub async fn flow(&self, active: bool) -> Result<bool, AmqpError> {
        let ok: ChannelFlowOk = reply(self.call(ChannelFlow { active }).await?)?;
        Ok(ok.active)
    }

    pub async fn tx_select(&self) -> Result<(), AmqpError> {
        self.require_mode(
            ChannelMode::Regular,
            "Channel not in regular mode, cannot change to transactional mode.",
        )?;
        let _: TxSelectOk = reply(self.call(TxSelect {}).await?)?;
        Ok(())
    }

    pub async fn tx_commit(&self) -> Result<(), AmqpError> {
        self.require_mode(
            ChannelMode::Transactional,
            "Channel not in transactional mode, cannot call 'tx.commit'.",
        )?;
        let _: TxCommitOk = reply(self.call(TxCommit {}).await?)?;
        Ok(())
    }

    pub async fn tx_rollback(&self) -> Result<(), AmqpError> {
        self.require_mode(
            ChannelMode::Transactional,
            "Channel not in transactional mode, cannot call 'tx.rollback'.",
        )?;
        let _: TxRollbackOk = reply(self.call(TxRollback {}).await?)?;
        Ok(())
    }

    /// Put channel into confirm mode, publishes are numbered from 1.
    pub async fn confirm_select(&self, no_wait: bool) -> Result<(), AmqpError> {
        self.require_mode(
            ChannelMode::Regular,
            "Channel not in regular mode, cannot change to confirm mode.",
        )?;
        if no_wait {
            let cell = self.connection()?;
            let mut inner = cell.get_mut();
            inner.channel_mut(self.id)?;
            inner.post_frame(AmqpFrame::new(
                self.id,
                Method::from(ConfirmSelect { no_wait }),
            ))?;
            inner.channel_mut(self.id)?.mode = ChannelMode::Confirm;
            Ok(())
        } else {
            let _: ConfirmSelectOk = reply(self.call(ConfirmSelect { no_wait }).await?)?;
            Ok(())
        }
    }

    /// Close channel and wait for close-ok.
    ///
    /// Closing a channel that is already closing waits for the same close-ok.
    pub async fn close<T: Into<ByteString>>(&self, reply_code: u16, reply_text: T) -> Result<(), AmqpError> {
        let rx = {
            let cell = self.connection()?;
            let mut inner = cell.get_mut();
            inner.check()?;
            let state = inner.channels.get(&self.id).map(|ch| ch.state);
            let (tx, rx) = oneshot::channel();
            match state {
                None | Some(ChannelState::Closed) | Some(ChannelState::Error) => {
                    return Err(AmqpError::channel_exception(format!(
                        "Trying to close already closed channel #{}.",
                        self.id
                    )))
                }
                Some(ChannelState::Closing) => (),
                Some(_) => {
                    inner.post_frame(AmqpFrame::new(
                        self.id,
                        Method::from(ChannelClose {
                            reply_code,
                            reply_text: reply_text.into(),
                            class_id: 0,
                            method_id: 0,
                        }),
                    ))?;
                }
            }
            if let Some(channel) = inner.channels.get_mut(&self.id) {
                channel.state = ChannelState::Closing;
                channel.close_waiters.push(tx);
            }
            rx
        };

        match rx.await {
            Ok(res) => res,
            Err(_) => Err(AmqpError::Disconnected),
        }
    }

    /// Register listener for messages returned by the broker
    pub fn add_return_listener<F>(&self, listener: F) -> Result<ListenerId, AmqpError>
    where
        F: Fn(&Message, &BasicReturn) + 'static,
    {
        let cell = self.connection()?;
        let mut inner = cell.get_mut();
        let channel = inner.channel_mut(self.id)?;
        Ok(ListenerId(channel.return_listeners.insert(Rc::new(listener))))
    }

    pub fn remove_return_listener(&self, id: ListenerId) -> bool {
        self.with_channel(|ch| ch.return_listeners.try_remove(id.0).is_some())
    }

    /// Register listener for publisher confirms, the channel must be in
    /// confirm mode.
    pub fn add_ack_listener<F>(&self, listener: F) -> Result<ListenerId, AmqpError>
    where
        F: Fn(&Confirmation) + 'static,
    {
        let cell = self.connection()?;
        let mut inner = cell.get_mut();
        let channel = inner.channel_mut(self.id)?;
        if channel.mode != ChannelMode::Confirm {
            return Err(AmqpError::channel_exception(
                "Ack/nack listener can be added when channel in confirm mode.",
            ));
        }
        Ok(ListenerId(channel.ack_listeners.insert(Rc::new(listener))))
    }

    pub fn remove_ack_listener(&self, id: ListenerId) -> bool {
        self.with_channel(|ch| ch.ack_listeners.try_remove(id.0).is_some())
    }

    fn with_channel<F: FnOnce(&mut ChannelInner) -> bool>(&self, f: F) -> bool {
        let cell = match self.conn.upgrade() {
            Some(cell) => cell,
            None => return false,
        };
        let mut inner = cell.get_mut();
        let res = match inner.channels.get_mut(&self.id) {
            Some(channel) => f(channel),
            None => false,
        };
        res
    }
}

/// Close every channel, errors are logged.
pub(crate) async fn close_all(channels: Vec<Channel>, reply_code: u16, reply_text: ByteString) {
    let results = join_all(
        channels
            .iter()
            .map(|ch| ch.close(reply_code, reply_text.clone())),
    )
    .await;
    for (ch, res) in channels.iter().zip(results) {
        if let Err(e) = res {
            warn!("channel #{} close failed: {}", ch.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use amqp091_codec::protocol::{BasicGetEmpty, ChannelCloseOk};

    use super::*;

    fn channel_with_consumer(tag: &'static str) -> ChannelInner {
        let mut channel = ChannelInner::new(1);
        channel.consumers.insert(
            ByteString::from_static(tag),
            Consumer::new(Rc::new(|_: Message, _: Channel| Outcome::Done), 1),
        );
        channel
    }

    fn deliver(tag: &'static str, delivery_tag: u64) -> Frame {
        Frame::Method(Method::from(BasicDeliver {
            consumer_tag: ByteString::from_static(tag),
            delivery_tag,
            redelivered: false,
            exchange: "".into(),
            routing_key: "q".into(),
        }))
    }

    fn header(body_size: u64) -> Frame {
        Frame::Header(ContentHeader::new(body_size, BasicProperties::default()))
    }

    fn body(data: &'static [u8]) -> Frame {
        Frame::Body(Bytes::from_static(data))
    }

    #[test]
    fn test_reassembly() {
        let mut channel = channel_with_consumer("ctag");

        assert!(channel.handle_frame(deliver("ctag", 1)).unwrap().is_none());
        assert_eq!(channel.state, ChannelState::AwaitingHeader);
        assert!(channel.handle_frame(header(5)).unwrap().is_none());
        assert_eq!(channel.state, ChannelState::AwaitingBody);
        assert!(channel.handle_frame(body(b"hel")).unwrap().is_none());

        match channel.handle_frame(body(b"lo")).unwrap() {
            Some(Effect::Deliver(tag)) => assert_eq!(tag, "ctag"),
            res => panic!("unexpected result: {:?}", res),
        }
        assert_eq!(channel.state, ChannelState::Ready);

        let consumer = &channel.consumers[&ByteString::from_static("ctag")];
        assert_eq!(consumer.queue.len(), 1);
        assert_eq!(consumer.queue[0].content, &b"hello"[..]);
        assert_eq!(consumer.queue[0].delivery_tag, Some(1));
    }

    #[test]
    fn test_zero_body() {
        let mut channel = channel_with_consumer("ctag");

        assert!(channel.handle_frame(deliver("ctag", 1)).unwrap().is_none());
        match channel.handle_frame(header(0)).unwrap() {
            Some(Effect::Deliver(_)) => (),
            res => panic!("unexpected result: {:?}", res),
        }
        assert_eq!(channel.state, ChannelState::Ready);
    }

    #[test]
    fn test_unknown_consumer() {
        let mut channel = ChannelInner::new(1);
        assert!(channel.handle_frame(deliver("other", 1)).unwrap().is_none());
        assert!(channel.handle_frame(header(1)).unwrap().is_none());
        assert!(channel.handle_frame(body(b"x")).unwrap().is_none());
        assert_eq!(channel.state, ChannelState::Ready);
    }

    #[test]
    fn test_body_overflow() {
        let mut channel = channel_with_consumer("ctag");

        channel.handle_frame(deliver("ctag", 1)).unwrap();
        channel.handle_frame(header(3)).unwrap();
        let reason = channel.handle_frame(body(b"hello")).unwrap_err();
        assert_eq!(reason.reply_code, reply_code::SYNTAX_ERROR);
        assert_eq!(reason.reply_text, "Body overflow, received 2 more bytes.");
        assert_eq!(channel.state, ChannelState::Error);

        // error state is terminal
        assert!(channel.handle_frame(deliver("ctag", 2)).is_err());
        assert_eq!(channel.state, ChannelState::Error);
    }

    #[test]
    fn test_unexpected_frames() {
        let mut channel = ChannelInner::new(1);
        let reason = channel.handle_frame(body(b"x")).unwrap_err();
        assert_eq!(reason.reply_code, reply_code::UNEXPECTED_FRAME);
        assert_eq!(reason.reply_text, "Got body frame, expected method frame.");

        let mut channel = channel_with_consumer("ctag");
        channel.handle_frame(deliver("ctag", 1)).unwrap();
        let reason = channel.handle_frame(deliver("ctag", 2)).unwrap_err();
        assert_eq!(reason.reply_text, "Got method frame, expected header frame.");

        let mut channel = channel_with_consumer("ctag");
        channel.handle_frame(deliver("ctag", 1)).unwrap();
        channel.handle_frame(header(2)).unwrap();
        let reason = channel.handle_frame(header(2)).unwrap_err();
        assert_eq!(reason.reply_text, "Got header frame, expected content frame.");

        let mut channel = ChannelInner::new(1);
        let reason = channel.handle_frame(Frame::Heartbeat).unwrap_err();
        assert_eq!(reason.reply_text, "Got heartbeat on non-zero channel.");
    }

    #[test]
    fn test_closing_drops_frames() {
        let mut channel = channel_with_consumer("ctag");
        let (tx, mut rx) = oneshot::channel();
        channel.state = ChannelState::Closing;
        channel.close_waiters.push(tx);

        assert!(channel.handle_frame(deliver("ctag", 1)).unwrap().is_none());
        assert!(channel.handle_frame(header(2)).unwrap().is_none());
        assert!(channel.handle_frame(body(b"hi")).unwrap().is_none());
        assert_eq!(channel.state, ChannelState::Closing);

        assert!(channel
            .handle_frame(Frame::Method(Method::from(ChannelCloseOk {})))
            .unwrap()
            .is_none());
        assert!(channel.is_closed());
        assert!(channel.consumers.is_empty());
        assert!(rx.try_recv().unwrap().unwrap().is_ok());
    }

    #[test]
    fn test_confirms_and_flow() {
        let mut channel = ChannelInner::new(1);
        let ack = Frame::Method(Method::from(BasicAck {
            delivery_tag: 1,
            multiple: false,
        }));
        match channel.handle_frame(ack).unwrap() {
            Some(Effect::Confirm(c)) => {
                assert!(c.is_ack());
                assert_eq!(c.delivery_tag(), 1);
            }
            res => panic!("unexpected result: {:?}", res),
        }

        let flow = Frame::Method(Method::from(ChannelFlow { active: false }));
        match channel.handle_frame(flow).unwrap() {
            Some(Effect::Reply(Method::ChannelFlowOk(ok))) => assert!(!ok.active),
            res => panic!("unexpected result: {:?}", res),
        }
    }

    #[test]
    fn test_get_reply() {
        let mut channel = ChannelInner::new(1);
        let (tx, mut rx) = oneshot::channel();
        channel.get_waiter = Some(tx);

        channel.on_reply(&Method::from(BasicGetOk {
            delivery_tag: 7,
            redelivered: true,
            exchange: "".into(),
            routing_key: "q".into(),
            message_count: 3,
        }));
        assert_eq!(channel.state, ChannelState::AwaitingHeader);
        channel.handle_frame(header(2)).unwrap();
        assert!(channel.handle_frame(body(b"ok")).unwrap().is_none());

        let message = rx.try_recv().unwrap().unwrap().unwrap();
        assert_eq!(message.delivery_tag, Some(7));
        assert_eq!(message.message_count, Some(3));
        assert!(message.redelivered);
        assert_eq!(message.content, &b"ok"[..]);

        let (tx, _rx) = oneshot::channel();
        channel.get_waiter = Some(tx);
        channel.on_reply(&Method::from(BasicGetEmpty {
            cluster_id: "".into(),
        }));
        assert!(channel.get_waiter.is_none());
        assert_eq!(channel.state, ChannelState::Ready);
    }

    #[test]
    fn test_mode_replies() {
        let mut channel = ChannelInner::new(1);
        channel.on_reply(&Method::from(ConfirmSelectOk {}));
        assert_eq!(channel.mode, ChannelMode::Confirm);

        channel
            .pending_consumers
            .push_back(Consumer::new(Rc::new(|_: Message, _: Channel| Outcome::Done), 2));
        channel.on_reply(&Method::from(BasicConsumeOk {
            consumer_tag: "amq.ctag-1".into(),
        }));
        assert!(channel.pending_consumers.is_empty());
        assert!(channel.consumers.contains_key("amq.ctag-1"));

        channel.on_reply(&Method::from(BasicCancelOk {
            consumer_tag: "amq.ctag-1".into(),
        }));
        assert!(channel.consumers.is_empty());
    }
}
