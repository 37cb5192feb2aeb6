use std::convert::TryFrom;

use actix_codec::{AsyncRead, AsyncWrite, Framed};
use actix_rt::net::TcpStream;
use amqp091_codec::protocol::{
    ChannelOpen, ChannelOpenOk, ConnectionClose, ConnectionOpen, ConnectionOpenOk,
    ConnectionStart, ConnectionStartOk, ConnectionTune, ConnectionTuneOk, Method,
};
use amqp091_codec::types::FieldTable;
use amqp091_codec::{AmqpCodec, AmqpFrame};
use bytestring::ByteString;

use crate::cell::Cell;
use crate::channel::{close_all, Channel, ChannelInner};
use crate::connection::{wait, Connection, ConnectionInner, ReplyRx, Tune};
use crate::errors::AmqpError;
use crate::Configuration;

const CONNECTION_START: &[(u16, u16)] = &[(10, 10)];
const CONNECTION_TUNE: &[(u16, u16)] = &[(10, 30)];

fn reply<T>(method: Method) -> Result<T, AmqpError>
where
    T: TryFrom<Method, Error = Method>,
{
    T::try_from(method).map_err(|m| AmqpError::unexpected(&m))
}

/// Amqp 0-9-1 client.
///
/// The connection runs as a separate task on the current arbiter, the
/// client and its channels share its state.
#[derive(Clone)]
pub struct Client {
    inner: Cell<ConnectionInner>,
}

impl Client {
    /// Open tcp connection to the configured broker and run the handshake
    pub async fn connect_tcp(config: Configuration) -> Result<Client, AmqpError> {
        config.validate()?;
        let addr = (config.host.clone(), config.port);
        trace!("connecting to {}:{}", addr.0, addr.1);

        let io = match actix_rt::time::timeout(config.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(io)) => io,
            Ok(Err(e)) => return Err(AmqpError::Codec(e.into())),
            Err(_) => return Err(AmqpError::Timeout),
        };
        Client::connect(io, config).await
    }

    /// Run the handshake over an established transport
    pub async fn connect<T>(io: T, config: Configuration) -> Result<Client, AmqpError>
    where
        T: AsyncRead + AsyncWrite + Unpin + 'static,
    {
        config.validate()?;
        let timeout = config.timeout;

        let inner = Cell::new(ConnectionInner::new(config));
        let start = {
            let mut conn = inner.get_mut();
            conn.post_protocol_header();
            conn.expect(0, CONNECTION_START)
        };

        let connection = Connection::new(Framed::new(io, AmqpCodec::new()), inner.clone());
        actix_rt::spawn(async move {
            match connection.await {
                Ok(()) => trace!("connection is closed"),
                Err(e) => error!("connection failed: {}", e),
            }
        });

        let client = Client { inner };
        match actix_rt::time::timeout(timeout, client.handshake(start)).await {
            Ok(Ok(())) => Ok(client),
            Ok(Err(e)) => {
                client.inner.get_mut().terminate(e.clone());
                Err(e)
            }
            Err(_) => {
                warn!("handshake timeout");
                client.inner.get_mut().terminate(AmqpError::Timeout);
                Err(AmqpError::Timeout)
            }
        }
    }

    async fn handshake(&self, start: ReplyRx) -> Result<(), AmqpError> {
        let start: ConnectionStart = reply(wait(start).await?)?;
        trace!(
            "connection.start, version {}.{}",
            start.version_major,
            start.version_minor
        );

        let tune = {
            let mut inner = self.inner.get_mut();
            let mechanism = inner.config.mechanism;
            if !mechanism.is_offered(&start.mechanisms) {
                return Err(AmqpError::UnsupportedMechanism);
            }
            let start_ok = ConnectionStartOk {
                client_properties: inner.config.start_ok_properties(),
                mechanism: ByteString::from_static(mechanism.name()),
                response: mechanism.response(&inner.config.user, &inner.config.password)?,
                locale: ByteString::from_static("en_US"),
            };
            inner.server_properties = start.server_properties;
            inner.post_frame(AmqpFrame::new(0, Method::from(start_ok)))?;
            inner.expect(0, CONNECTION_TUNE)
        };

        let remote: ConnectionTune = reply(wait(tune).await?)?;
        let open = {
            let mut inner = self.inner.get_mut();
            let tune = Tune::negotiate(&inner.config, &remote);
            trace!("negotiated {:?}", tune);

            inner.post_frame(AmqpFrame::new(
                0,
                Method::from(ConnectionTuneOk {
                    channel_max: tune.channel_max,
                    frame_max: tune.frame_max,
                    heartbeat: tune.heartbeat,
                }),
            ))?;
            inner.set_tune(tune);

            let open = ConnectionOpen {
                virtual_host: inner.config.vhost.clone(),
                ..Default::default()
            };
            inner.post_frame(AmqpFrame::new(0, Method::from(open)))?;
            inner.expect(0, ConnectionOpen::INFO.replies)
        };

        let _: ConnectionOpenOk = reply(wait(open).await?)?;
        trace!("connection is open");
        Ok(())
    }

    /// Open new channel
    pub async fn channel(&self) -> Result<Channel, AmqpError> {
        let (id, rx) = {
            let mut inner = self.inner.get_mut();
            inner.check()?;
            let id = inner.allocate_channel()?;
            inner.channels.insert(id, ChannelInner::new(id));
            if let Err(e) = inner.post_frame(AmqpFrame::new(id, Method::from(ChannelOpen::default()))) {
                inner.channels.remove(&id);
                return Err(e);
            }
            (id, inner.expect(id, ChannelOpen::INFO.replies))
        };

        let _: ChannelOpenOk = reply(wait(rx).await?)?;
        trace!("channel #{} is open", id);
        Ok(Channel::new(id, self.inner.downgrade()))
    }

    /// Close all channels, then the connection.
    ///
    /// Does nothing if the connection is already closed.
    pub async fn disconnect<T: Into<ByteString>>(
        &self,
        reply_code: u16,
        reply_text: T,
    ) -> Result<(), AmqpError> {
        let reply_text = reply_text.into();
        let channels: Vec<Channel> = {
            let inner = self.inner.get_ref();
            if inner.is_closed() || inner.check().is_err() {
                return Ok(());
            }
            inner
                .channels
                .keys()
                .map(|id| Channel::new(*id, self.inner.downgrade()))
                .collect()
        };
        close_all(channels, reply_code, reply_text.clone()).await;

        let rx = {
            let mut inner = self.inner.get_mut();
            if inner.is_closed() || inner.check().is_err() {
                return Ok(());
            }
            inner.post_frame(AmqpFrame::new(
                0,
                Method::from(ConnectionClose {
                    reply_code,
                    reply_text,
                    class_id: 0,
                    method_id: 0,
                }),
            ))?;
            inner.set_closing();
            inner.expect(0, ConnectionClose::INFO.replies)
        };
        wait(rx).await.map(|_| ())
    }

    /// Handshake is complete and the connection is not closed
    pub fn is_connected(&self) -> bool {
        self.inner.get_ref().is_open()
    }

    /// Broker sent `connection.blocked`
    pub fn is_blocked(&self) -> bool {
        self.inner.get_ref().is_blocked()
    }

    /// Negotiated frame size
    pub fn frame_max(&self) -> u32 {
        self.inner.get_ref().tune.frame_max
    }

    pub fn channel_max(&self) -> u16 {
        self.inner.get_ref().tune.channel_max
    }

    /// Negotiated heartbeat interval in seconds
    pub fn heartbeat(&self) -> u16 {
        self.inner.get_ref().tune.heartbeat
    }

    pub fn server_properties(&self) -> FieldTable {
        self.inner.get_ref().server_properties.clone()
    }
}
