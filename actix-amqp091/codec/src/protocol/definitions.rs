use bytestring::ByteString;

use super::{Argument, ArgumentInfo, ArgumentReader, ArgumentWriter, MethodInfo};
use crate::errors::{AmqpCodecError, AmqpParseError};
use crate::types::{FieldTable, LongString, ShortString};

define_methods! {
    ConnectionStart(10, 10, "connection.start")
        content: false, replies: [(10, 11)]
    {
        version_major: u8 = 0,
        version_minor: u8 = 9,
        server_properties: FieldTable,
        mechanisms: LongString,
        locales: LongString,
    }

    ConnectionStartOk(10, 11, "connection.start-ok")
        content: false, replies: []
    {
        client_properties: FieldTable,
        mechanism: ShortString = ByteString::from_static("AMQPLAIN"),
        response: LongString,
        locale: ShortString = ByteString::from_static("en_US"),
    }

    ConnectionSecure(10, 20, "connection.secure")
        content: false, replies: [(10, 21)]
    {
        challenge: LongString,
    }

    ConnectionSecureOk(10, 21, "connection.secure-ok")
        content: false, replies: []
    {
        response: LongString,
    }

    ConnectionTune(10, 30, "connection.tune")
        content: false, replies: [(10, 31)]
    {
        channel_max: u16,
        frame_max: u32,
        heartbeat: u16,
    }

    ConnectionTuneOk(10, 31, "connection.tune-ok")
        content: false, replies: []
    {
        channel_max: u16,
        frame_max: u32,
        heartbeat: u16,
    }

    ConnectionOpen(10, 40, "connection.open")
        content: false, replies: [(10, 41)]
    {
        virtual_host: ShortString = ByteString::from_static("/"),
        capabilities: ShortString,
        insist: bool,
    }

    ConnectionOpenOk(10, 41, "connection.open-ok")
        content: false, replies: []
    {
        known_hosts: ShortString,
    }

    ConnectionClose(10, 50, "connection.close")
        content: false, replies: [(10, 51)]
    {
        reply_code: u16,
        reply_text: ShortString,
        class_id: u16,
        method_id: u16,
    }

    ConnectionCloseOk(10, 51, "connection.close-ok")
        content: false, replies: []
    {}

    /// Broker stopped reading from this connection, RabbitMQ extension.
    ConnectionBlocked(10, 60, "connection.blocked")
        content: false, replies: []
    {
        reason: ShortString,
    }

    ConnectionUnblocked(10, 61, "connection.unblocked")
        content: false, replies: []
    {}

    ChannelOpen(20, 10, "channel.open")
        content: false, replies: [(20, 11)]
    {
        out_of_band: ShortString,
    }

    ChannelOpenOk(20, 11, "channel.open-ok")
        content: false, replies: []
    {
        channel_id: LongString,
    }

    ChannelFlow(20, 20, "channel.flow")
        content: false, replies: [(20, 21)]
    {
        active: bool,
    }

    ChannelFlowOk(20, 21, "channel.flow-ok")
        content: false, replies: []
    {
        active: bool,
    }

    ChannelClose(20, 40, "channel.close")
        content: false, replies: [(20, 41)]
    {
        reply_code: u16,
        reply_text: ShortString,
        class_id: u16,
        method_id: u16,
    }

    ChannelCloseOk(20, 41, "channel.close-ok")
        content: false, replies: []
    {}

    AccessRequest(30, 10, "access.request")
        content: false, replies: [(30, 11)]
    {
        realm: ShortString = ByteString::from_static("/data"),
        exclusive: bool,
        passive: bool,
        active: bool,
        write: bool,
        read: bool,
    }

    AccessRequestOk(30, 11, "access.request-ok")
        content: false, replies: []
    {
        reserved_1: u16,
    }

    ExchangeDeclare(40, 10, "exchange.declare")
        content: false, replies: [(40, 11)]
    {
        reserved_1: u16,
        exchange: ShortString,
        exchange_type: ShortString = ByteString::from_static("direct"),
        passive: bool,
        durable: bool,
        auto_delete: bool,
        internal: bool,
        no_wait: bool,
        arguments: FieldTable,
    }

    ExchangeDeclareOk(40, 11, "exchange.declare-ok")
        content: false, replies: []
    {}

    ExchangeDelete(40, 20, "exchange.delete")
        content: false, replies: [(40, 21)]
    {
        reserved_1: u16,
        exchange: ShortString,
        if_unused: bool,
        no_wait: bool,
    }

    ExchangeDeleteOk(40, 21, "exchange.delete-ok")
        content: false, replies: []
    {}

    ExchangeBind(40, 30, "exchange.bind")
        content: false, replies: [(40, 31)]
    {
        reserved_1: u16,
        destination: ShortString,
        source: ShortString,
        routing_key: ShortString,
        no_wait: bool,
        arguments: FieldTable,
    }

    ExchangeBindOk(40, 31, "exchange.bind-ok")
        content: false, replies: []
    {}

    ExchangeUnbind(40, 40, "exchange.unbind")
        content: false, replies: [(40, 51)]
    {
        reserved_1: u16,
        destination: ShortString,
        source: ShortString,
        routing_key: ShortString,
        no_wait: bool,
        arguments: FieldTable,
    }

    ExchangeUnbindOk(40, 51, "exchange.unbind-ok")
        content: false, replies: []
    {}

    QueueDeclare(50, 10, "queue.declare")
        content: false, replies: [(50, 11)]
    {
        reserved_1: u16,
        queue: ShortString,
        passive: bool,
        durable: bool,
        exclusive: bool,
        auto_delete: bool,
        no_wait: bool,
        arguments: FieldTable,
    }

    QueueDeclareOk(50, 11, "queue.declare-ok")
        content: false, replies: []
    {
        queue: ShortString,
        message_count: u32,
        consumer_count: u32,
    }

    QueueBind(50, 20, "queue.bind")
        content: false, replies: [(50, 21)]
    {
        reserved_1: u16,
        queue: ShortString,
        exchange: ShortString,
        routing_key: ShortString,
        no_wait: bool,
        arguments: FieldTable,
    }

    QueueBindOk(50, 21, "queue.bind-ok")
        content: false, replies: []
    {}

    QueuePurge(50, 30, "queue.purge")
        content: false, replies: [(50, 31)]
    {
        reserved_1: u16,
        queue: ShortString,
        no_wait: bool,
    }

    QueuePurgeOk(50, 31, "queue.purge-ok")
        content: false, replies: []
    {
        message_count: u32,
    }

    QueueDelete(50, 40, "queue.delete")
        content: false, replies: [(50, 41)]
    {
        reserved_1: u16,
        queue: ShortString,
        if_unused: bool,
        if_empty: bool,
        no_wait: bool,
    }

    QueueDeleteOk(50, 41, "queue.delete-ok")
        content: false, replies: []
    {
        message_count: u32,
    }

    QueueUnbind(50, 50, "queue.unbind")
        content: false, replies: [(50, 51)]
    {
        reserved_1: u16,
        queue: ShortString,
        exchange: ShortString,
        routing_key: ShortString,
        arguments: FieldTable,
    }

    QueueUnbindOk(50, 51, "queue.unbind-ok")
        content: false, replies: []
    {}

    BasicQos(60, 10, "basic.qos")
        content: false, replies: [(60, 11)]
    {
        prefetch_size: u32,
        prefetch_count: u16,
        global: bool,
    }

    BasicQosOk(60, 11, "basic.qos-ok")
        content: false, replies: []
    {}

    BasicConsume(60, 20, "basic.consume")
        content: false, replies: [(60, 21)]
    {
        reserved_1: u16,
        queue: ShortString,
        consumer_tag: ShortString,
        no_local: bool,
        no_ack: bool,
        exclusive: bool,
        no_wait: bool,
        arguments: FieldTable,
    }

    BasicConsumeOk(60, 21, "basic.consume-ok")
        content: false, replies: []
    {
        consumer_tag: ShortString,
    }

    BasicCancel(60, 30, "basic.cancel")
        content: false, replies: [(60, 31)]
    {
        consumer_tag: ShortString,
        no_wait: bool,
    }

    BasicCancelOk(60, 31, "basic.cancel-ok")
        content: false, replies: []
    {
        consumer_tag: ShortString,
    }

    BasicPublish(60, 40, "basic.publish")
        content: true, replies: []
    {
        reserved_1: u16,
        exchange: ShortString,
        routing_key: ShortString,
        mandatory: bool,
        immediate: bool,
    }

    BasicReturn(60, 50, "basic.return")
        content: true, replies: []
    {
        reply_code: u16,
        reply_text: ShortString,
        exchange: ShortString,
        routing_key: ShortString,
    }

    BasicDeliver(60, 60, "basic.deliver")
        content: true, replies: []
    {
        consumer_tag: ShortString,
        delivery_tag: u64,
        redelivered: bool,
        exchange: ShortString,
        routing_key: ShortString,
    }

    BasicGet(60, 70, "basic.get")
        content: false, replies: [(60, 71), (60, 72)]
    {
        reserved_1: u16,
        queue: ShortString,
        no_ack: bool,
    }

    BasicGetOk(60, 71, "basic.get-ok")
        content: true, replies: []
    {
        delivery_tag: u64,
        redelivered: bool,
        exchange: ShortString,
        routing_key: ShortString,
        message_count: u32,
    }

    BasicGetEmpty(60, 72, "basic.get-empty")
        content: false, replies: []
    {
        cluster_id: ShortString,
    }

    BasicAck(60, 80, "basic.ack")
        content: false, replies: []
    {
        delivery_tag: u64,
        multiple: bool,
    }

    BasicReject(60, 90, "basic.reject")
        content: false, replies: []
    {
        delivery_tag: u64,
        requeue: bool = true,
    }

    BasicRecoverAsync(60, 100, "basic.recover-async")
        content: false, replies: []
    {
        requeue: bool,
    }

    BasicRecover(60, 110, "basic.recover")
        content: false, replies: [(60, 111)]
    {
        requeue: bool,
    }

    BasicRecoverOk(60, 111, "basic.recover-ok")
        content: false, replies: []
    {}

    BasicNack(60, 120, "basic.nack")
        content: false, replies: []
    {
        delivery_tag: u64,
        multiple: bool,
        requeue: bool = true,
    }

    ConfirmSelect(85, 10, "confirm.select")
        content: false, replies: [(85, 11)]
    {
        no_wait: bool,
    }

    ConfirmSelectOk(85, 11, "confirm.select-ok")
        content: false, replies: []
    {}

    TxSelect(90, 10, "tx.select")
        content: false, replies: [(90, 11)]
    {}

    TxSelectOk(90, 11, "tx.select-ok")
        content: false, replies: []
    {}

    TxCommit(90, 20, "tx.commit")
        content: false, replies: [(90, 21)]
    {}

    TxCommitOk(90, 21, "tx.commit-ok")
        content: false, replies: []
    {}

    TxRollback(90, 30, "tx.rollback")
        content: false, replies: [(90, 31)]
    {}

    TxRollbackOk(90, 31, "tx.rollback-ok")
        content: false, replies: []
    {}
}
