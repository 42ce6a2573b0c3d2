//! End-to-end protocol scenarios driven through a recording transport

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{body_frame, connected_channel, feed, header_frame, method_frame, open_connection};

use siderite_amqp::channel::{ChannelState, QueueDeclareOptions, PublishOptions};
use siderite_amqp::connection::ConnectionState;
use siderite_amqp::frames::{FramePayload, FRAME_END};
use siderite_amqp::Error;
use siderite_amqp_types::methods::{
    basic, channel as channel_methods, connection as connection_methods, queue as queue_methods,
    Method,
};
use siderite_amqp_types::primitives::FieldTable;
use siderite_amqp_types::properties::BasicProperties;

#[test]
fn handshake_byte_for_byte() {
    let (connection, recorder) = open_connection();
    assert_eq!(connection.state(), ConnectionState::Handshake);

    feed(
        &connection,
        &method_frame(
            0,
            connection_methods::Start {
                version_major: 0,
                version_minor: 9,
                server_properties: Default::default(),
                mechanisms: "PLAIN EXTERNAL".into(),
                locales: "en_US".into(),
            },
        ),
    );
    let frames = recorder.take_frames();
    assert_eq!(frames.len(), 1);
    let FramePayload::Method(Method::ConnectionStartOk(start_ok)) = &frames[0].payload else {
        panic!("expected connection.start-ok");
    };
    assert_eq!(start_ok.mechanism, "PLAIN");
    assert_eq!(start_ok.response.as_bytes(), b"\x00guest\x00guest");

    feed(
        &connection,
        &method_frame(
            0,
            connection_methods::Tune {
                channel_max: 2047,
                frame_max: 131_072,
                heartbeat: 60,
            },
        ),
    );
    let frames = recorder.take_frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(
        frames[0].payload,
        FramePayload::Method(Method::ConnectionTuneOk(connection_methods::TuneOk {
            channel_max: 2047,
            frame_max: 131_072,
            heartbeat: 60,
        }))
    );
    let FramePayload::Method(Method::ConnectionOpen(open)) = &frames[1].payload else {
        panic!("expected connection.open");
    };
    assert_eq!(open.virtual_host, "/");
    assert_eq!(connection.channel_max(), 2047);
    assert_eq!(connection.frame_max(), 131_072);
    assert_eq!(connection.heartbeat_interval(), 60);

    feed(
        &connection,
        &method_frame(0, connection_methods::OpenOk::default()),
    );
    assert_eq!(connection.state(), ConnectionState::Connected);
    assert_eq!(recorder.events(), vec!["connected".to_owned()]);
}

#[test]
fn handshake_fails_without_a_common_mechanism() {
    let recorder = Rc::new(common::Recorder::default());
    let transport = common::MockTransport::new(Rc::clone(&recorder));
    let connection = siderite_amqp::Connection::open(
        Box::new(transport),
        siderite_amqp::SaslProfile::External,
        "/",
    )
    .unwrap();
    recorder.take_sent();

    let result = connection.ingest(&method_frame(
        0,
        connection_methods::Start {
            version_major: 0,
            version_minor: 9,
            server_properties: Default::default(),
            mechanisms: "PLAIN AMQPLAIN".into(),
            locales: "en_US".into(),
        },
    ));
    assert!(matches!(result, Err(Error::HandshakeFailed(_))));
    assert_eq!(connection.state(), ConnectionState::Closed);
    let events = recorder.events();
    assert!(events[0].starts_with("error: handshake failed"));
    assert_eq!(events[1], "closed");
}

#[test]
fn declare_resolves_with_the_brokers_counts() {
    let (connection, channel, recorder) = connected_channel(131_072);

    let declared = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&declared);
    let _deferred = channel
        .queue_declare(
            "q",
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::new(),
        )
        .on_success(move |ok| *slot.borrow_mut() = Some(ok.clone()));

    let frames = recorder.take_frames();
    let FramePayload::Method(Method::QueueDeclare(request)) = &frames[0].payload else {
        panic!("expected queue.declare");
    };
    assert_eq!(request.queue, "q");
    assert!(request.durable);
    assert!(!request.passive);

    feed(
        &connection,
        &method_frame(
            channel.id(),
            queue_methods::DeclareOk {
                queue: "q".try_into().unwrap(),
                message_count: 0,
                consumer_count: 0,
            },
        ),
    );
    let declared = declared.borrow_mut().take().expect("declare not resolved");
    assert_eq!(declared.queue, "q");
    assert_eq!(declared.message_count, 0);
    assert_eq!(declared.consumer_count, 0);
}

#[test]
fn large_publish_fragments_at_frame_max_minus_eight() {
    let (_connection, channel, recorder) = connected_channel(4096);

    let body = vec![0x42u8; 10_000];
    channel
        .publish("", "q", &body, BasicProperties::default(), PublishOptions::default())
        .unwrap();

    let frames = recorder.take_frames();
    assert_eq!(frames.len(), 5);
    assert!(matches!(
        &frames[0].payload,
        FramePayload::Method(Method::BasicPublish(_))
    ));
    let FramePayload::Header(header) = &frames[1].payload else {
        panic!("expected a content header");
    };
    assert_eq!(header.body_size, 10_000);

    let sizes: Vec<usize> = frames[2..]
        .iter()
        .map(|frame| match &frame.payload {
            FramePayload::Body(chunk) => chunk.len(),
            other => panic!("expected a body frame, got {other:?}"),
        })
        .collect();
    assert_eq!(sizes, vec![4088, 4088, 1824]);
}

#[test]
fn replies_resolve_in_request_order() {
    let (connection, channel, _recorder) = connected_channel(131_072);

    let log = Rc::new(RefCell::new(Vec::new()));
    let l1 = Rc::clone(&log);
    let l2 = Rc::clone(&log);
    let l3 = Rc::clone(&log);
    let _d1 = channel
        .queue_declare("q", QueueDeclareOptions::default(), FieldTable::new())
        .on_success(move |_| l1.borrow_mut().push("declare"));
    let _d2 = channel
        .queue_bind("q", "logs", "#", false, FieldTable::new())
        .on_success(move |_| l2.borrow_mut().push("bind"));
    let _d3 = channel
        .queue_purge("q", false)
        .on_success(move |_| l3.borrow_mut().push("purge"));

    feed(
        &connection,
        &method_frame(channel.id(), queue_methods::DeclareOk::default()),
    );
    feed(
        &connection,
        &method_frame(channel.id(), queue_methods::BindOk),
    );
    feed(
        &connection,
        &method_frame(channel.id(), queue_methods::PurgeOk { message_count: 3 }),
    );
    assert_eq!(*log.borrow(), vec!["declare", "bind", "purge"]);
}

#[test]
fn mismatched_reply_fails_the_channel_but_not_the_connection() {
    let (connection, channel, _recorder) = connected_channel(131_072);

    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&errors);
    channel.on_error(move |message| sink.borrow_mut().push(message.to_owned()));

    let rejected = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&rejected);
    let _deferred = channel
        .queue_declare("q", QueueDeclareOptions::default(), FieldTable::new())
        .on_error(move |message| sink.borrow_mut().push(message.to_owned()));

    // the broker answers with the wrong reply
    feed(
        &connection,
        &method_frame(channel.id(), queue_methods::PurgeOk { message_count: 0 }),
    );

    assert_eq!(channel.state(), ChannelState::Closed);
    assert_eq!(connection.state(), ConnectionState::Connected);
    assert_eq!(errors.borrow().len(), 1);
    assert_eq!(rejected.borrow().len(), 1);
}

#[test]
fn streaming_delivery_truncates_the_oversize_tail() {
    let (connection, channel, _recorder) = connected_channel(131_072);

    let log = Rc::new(RefCell::new(Vec::new()));
    let (l1, l2, l3, l4) = (
        Rc::clone(&log),
        Rc::clone(&log),
        Rc::clone(&log),
        Rc::clone(&log),
    );
    let _consumer = channel
        .consume("q", "", Default::default(), FieldTable::new())
        .on_begin(move |_| l1.borrow_mut().push("begin".to_owned()))
        .on_headers(move |_, size| l2.borrow_mut().push(format!("headers {size}")))
        .on_data(move |chunk| {
            l3.borrow_mut()
                .push(format!("data {}", String::from_utf8_lossy(chunk)))
        })
        .on_complete(move |_| l4.borrow_mut().push("complete".to_owned()));

    feed(
        &connection,
        &method_frame(
            channel.id(),
            basic::ConsumeOk {
                consumer_tag: "ctag-1".try_into().unwrap(),
            },
        ),
    );
    feed(
        &connection,
        &method_frame(
            channel.id(),
            basic::Deliver {
                consumer_tag: "ctag-1".try_into().unwrap(),
                delivery_tag: 1,
                redelivered: false,
                exchange: Default::default(),
                routing_key: "q".try_into().unwrap(),
            },
        ),
    );
    feed(&connection, &header_frame(channel.id(), 9));
    feed(&connection, &body_frame(channel.id(), b"hello "));
    feed(&connection, &body_frame(channel.id(), b"world"));

    assert_eq!(
        *log.borrow(),
        vec![
            "begin".to_owned(),
            "headers 9".to_owned(),
            "data hello ".to_owned(),
            "data wor".to_owned(),
            "complete".to_owned(),
        ]
    );
}

#[test]
fn whole_message_delivery_reassembles_the_body() {
    let (connection, channel, _recorder) = connected_channel(131_072);

    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&received);
    let _consumer = channel
        .consume("q", "", Default::default(), FieldTable::new())
        .on_message(move |message, delivery| {
            sink.borrow_mut()
                .push((message.body.to_vec(), delivery.delivery_tag));
        });

    feed(
        &connection,
        &method_frame(
            channel.id(),
            basic::ConsumeOk {
                consumer_tag: "ctag-1".try_into().unwrap(),
            },
        ),
    );
    feed(
        &connection,
        &method_frame(
            channel.id(),
            basic::Deliver {
                consumer_tag: "ctag-1".try_into().unwrap(),
                delivery_tag: 7,
                redelivered: false,
                exchange: Default::default(),
                routing_key: "q".try_into().unwrap(),
            },
        ),
    );
    feed(&connection, &header_frame(channel.id(), 11));
    feed(&connection, &body_frame(channel.id(), b"hello "));
    feed(&connection, &body_frame(channel.id(), b"world"));

    assert_eq!(*received.borrow(), vec![(b"hello world".to_vec(), 7)]);
}

#[test]
fn get_resolves_message_or_empty() {
    let (connection, channel, _recorder) = connected_channel(131_072);

    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let _get = channel.get("q", false).on_message(move |message, delivery| {
        sink.borrow_mut().push(format!(
            "message {} tag {} left {}",
            String::from_utf8_lossy(&message.body),
            delivery.delivery_tag,
            delivery.message_count.unwrap_or(0)
        ));
    });
    feed(
        &connection,
        &method_frame(
            channel.id(),
            basic::GetOk {
                delivery_tag: 3,
                redelivered: false,
                exchange: Default::default(),
                routing_key: "q".try_into().unwrap(),
                message_count: 2,
            },
        ),
    );
    feed(&connection, &header_frame(channel.id(), 2));
    feed(&connection, &body_frame(channel.id(), b"ok"));

    let sink = Rc::clone(&log);
    let _get = channel
        .get("q", false)
        .on_empty(move || sink.borrow_mut().push("empty".to_owned()));
    feed(
        &connection,
        &method_frame(channel.id(), basic::GetEmpty::default()),
    );

    assert_eq!(
        *log.borrow(),
        vec!["message ok tag 3 left 2".to_owned(), "empty".to_owned()]
    );
}

#[test]
fn returned_messages_reach_the_channel_return_handler() {
    let (connection, channel, _recorder) = connected_channel(131_072);

    let returned = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&returned);
    channel.on_returned(move |message| {
        sink.borrow_mut().push((
            message.reply_code,
            message.reply_text.to_string(),
            message.message.body.to_vec(),
        ));
    });

    channel
        .publish(
            "",
            "nowhere",
            b"lost",
            BasicProperties::default(),
            PublishOptions {
                mandatory: true,
                immediate: false,
            },
        )
        .unwrap();

    feed(
        &connection,
        &method_frame(
            channel.id(),
            basic::Return {
                reply_code: 312,
                reply_text: "NO_ROUTE".try_into().unwrap(),
                exchange: Default::default(),
                routing_key: "nowhere".try_into().unwrap(),
            },
        ),
    );
    feed(&connection, &header_frame(channel.id(), 4));
    feed(&connection, &body_frame(channel.id(), b"lost"));

    assert_eq!(
        *returned.borrow(),
        vec![(312, "NO_ROUTE".to_owned(), b"lost".to_vec())]
    );
}

#[test]
fn heartbeat_emits_a_type_eight_frame() {
    let (connection, _channel, recorder) = connected_channel(131_072);
    connection.heartbeat().unwrap();
    assert_eq!(recorder.take_sent(), vec![8, 0, 0, 0, 0, 0, 0, FRAME_END]);
}

#[test]
fn pre_connected_sends_flush_in_order_after_open_ok() {
    let (connection, recorder) = open_connection();

    // channel.open issued before the handshake completed is queued
    let channel = connection.open_channel().unwrap();
    assert_eq!(channel.id(), 1);
    assert!(recorder.take_frames().is_empty());

    feed(
        &connection,
        &method_frame(
            0,
            connection_methods::Start {
                version_major: 0,
                version_minor: 9,
                server_properties: Default::default(),
                mechanisms: "PLAIN".into(),
                locales: "en_US".into(),
            },
        ),
    );
    feed(
        &connection,
        &method_frame(
            0,
            connection_methods::Tune {
                channel_max: 0,
                frame_max: 131_072,
                heartbeat: 0,
            },
        ),
    );
    // discard start-ok, tune-ok and connection.open
    recorder.take_sent();

    feed(
        &connection,
        &method_frame(0, connection_methods::OpenOk::default()),
    );
    let frames = recorder.take_frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].channel, 1);
    assert!(matches!(
        &frames[0].payload,
        FramePayload::Method(Method::ChannelOpen(_))
    ));
}

#[test]
fn corrupt_sentinel_fails_the_connection() {
    let (connection, channel, recorder) = connected_channel(131_072);

    let rejected = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&rejected);
    let _deferred = channel
        .queue_declare("q", QueueDeclareOptions::default(), FieldTable::new())
        .on_error(move |message| sink.borrow_mut().push(message.to_owned()));
    recorder.take_sent();

    let mut bytes = method_frame(channel.id(), queue_methods::DeclareOk::default());
    let last = bytes.len() - 1;
    bytes[last] = 0x00;
    let result = connection.ingest(&bytes);
    assert!(matches!(
        result,
        Err(Error::Frame(siderite_amqp::frames::Error::Framing))
    ));
    assert_eq!(connection.state(), ConnectionState::Closed);
    assert_eq!(rejected.borrow().len(), 1);
    let events = recorder.events();
    assert!(events.iter().any(|event| event.starts_with("error:")));
    assert!(events.contains(&"closed".to_owned()));
}

#[test]
fn peer_close_relays_the_reply_verbatim() {
    let (connection, channel, recorder) = connected_channel(131_072);

    let rejected = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&rejected);
    let _deferred = channel
        .queue_declare("q", QueueDeclareOptions::default(), FieldTable::new())
        .on_error(move |message| sink.borrow_mut().push(message.to_owned()));
    recorder.take_sent();

    feed(
        &connection,
        &method_frame(
            0,
            connection_methods::Close {
                reply_code: 320,
                reply_text: "CONNECTION_FORCED - shutting down".try_into().unwrap(),
                class_id: 0,
                method_id: 0,
            },
        ),
    );

    assert_eq!(connection.state(), ConnectionState::Closed);
    let frames = recorder.take_frames();
    assert!(frames.iter().any(|frame| matches!(
        &frame.payload,
        FramePayload::Method(Method::ConnectionCloseOk(_))
    )));
    assert_eq!(rejected.borrow().len(), 1);
    assert!(rejected.borrow()[0].contains("320"));
    assert!(recorder
        .events()
        .iter()
        .any(|event| event.contains("CONNECTION_FORCED")));
}

#[test]
fn closing_channel_rejects_further_commands() {
    let (connection, channel, _recorder) = connected_channel(131_072);

    let closed = Rc::new(RefCell::new(false));
    let flag = Rc::clone(&closed);
    let _close = channel.close().on_success(move |_| *flag.borrow_mut() = true);
    assert_eq!(channel.state(), ChannelState::Closing);

    let rejected = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&rejected);
    let _declare = channel
        .queue_declare("q", QueueDeclareOptions::default(), FieldTable::new())
        .on_error(move |message| sink.borrow_mut().push(message.to_owned()));
    assert_eq!(rejected.borrow().len(), 1);

    feed(
        &connection,
        &method_frame(channel.id(), channel_methods::CloseOk),
    );
    assert!(*closed.borrow());
    assert_eq!(channel.state(), ChannelState::Closed);
    assert_eq!(connection.state(), ConnectionState::Connected);
}

#[test]
fn delivery_for_an_unknown_consumer_fails_the_channel() {
    let (connection, channel, _recorder) = connected_channel(131_072);

    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&errors);
    channel.on_error(move |message| sink.borrow_mut().push(message.to_owned()));

    feed(
        &connection,
        &method_frame(
            channel.id(),
            basic::Deliver {
                consumer_tag: "ghost".try_into().unwrap(),
                delivery_tag: 1,
                redelivered: false,
                exchange: Default::default(),
                routing_key: "q".try_into().unwrap(),
            },
        ),
    );
    assert_eq!(channel.state(), ChannelState::Closed);
    assert_eq!(connection.state(), ConnectionState::Connected);
    assert!(errors.borrow()[0].contains("unknown consumer tag"));
}

#[test]
fn broker_cancel_notifies_the_consumer() {
    let (connection, channel, _recorder) = connected_channel(131_072);

    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&errors);
    let _consumer = channel
        .consume("q", "", Default::default(), FieldTable::new())
        .on_error(move |message| sink.borrow_mut().push(message.to_owned()));
    feed(
        &connection,
        &method_frame(
            channel.id(),
            basic::ConsumeOk {
                consumer_tag: "ctag-9".try_into().unwrap(),
            },
        ),
    );
    feed(
        &connection,
        &method_frame(
            channel.id(),
            basic::Cancel {
                consumer_tag: "ctag-9".try_into().unwrap(),
                nowait: true,
            },
        ),
    );
    assert_eq!(
        *errors.borrow(),
        vec!["consumer cancelled by the broker".to_owned()]
    );
    // the channel itself is unaffected
    assert_eq!(channel.state(), ChannelState::Connected);
}

#[test]
fn blocked_and_unblocked_reach_the_transport() {
    let (connection, _channel, recorder) = connected_channel(131_072);
    feed(
        &connection,
        &method_frame(
            0,
            connection_methods::Blocked {
                reason: "memory".try_into().unwrap(),
            },
        ),
    );
    feed(
        &connection,
        &method_frame(0, connection_methods::Unblocked),
    );
    assert_eq!(
        recorder.events(),
        vec!["blocked: memory".to_owned(), "unblocked".to_owned()]
    );
}

#[test]
fn nowait_requests_resolve_immediately() {
    let (_connection, channel, recorder) = connected_channel(131_072);

    let resolved = Rc::new(RefCell::new(false));
    let flag = Rc::clone(&resolved);
    let _deferred = channel
        .queue_declare(
            "q",
            QueueDeclareOptions {
                nowait: true,
                ..Default::default()
            },
            FieldTable::new(),
        )
        .on_success(move |_| *flag.borrow_mut() = true);

    assert!(*resolved.borrow());
    // the frame still went out
    let frames = recorder.take_frames();
    assert!(matches!(
        &frames[0].payload,
        FramePayload::Method(Method::QueueDeclare(declare)) if declare.nowait
    ));
}
