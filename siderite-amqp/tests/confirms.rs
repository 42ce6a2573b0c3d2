//! Publisher-confirm scenarios: cumulative acks, windowing, re-entrant
//! teardown

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{connected_channel, feed, method_frame};

use siderite_amqp::channel::{ChannelState, PublishOptions};
use siderite_amqp::confirm::{Reliable, Tagger, Throttle};
use siderite_amqp::connection::ConnectionState;
use siderite_amqp::frames::FramePayload;
use siderite_amqp_types::methods::{basic, confirm as confirm_methods, Method};
use siderite_amqp_types::properties::BasicProperties;

fn publish_args() -> (BasicProperties, PublishOptions) {
    (BasicProperties::default(), PublishOptions::default())
}

#[test]
fn tagger_selects_confirm_mode_and_numbers_from_one() {
    let (connection, channel, recorder) = connected_channel(131_072);
    let channel_id = channel.id();
    let mut tagger = Tagger::new(channel);

    let frames = recorder.take_frames();
    assert!(matches!(
        &frames[0].payload,
        FramePayload::Method(Method::ConfirmSelect(_))
    ));
    feed(
        &connection,
        &method_frame(channel_id, confirm_methods::SelectOk),
    );

    let (properties, options) = publish_args();
    let first = tagger
        .publish("", "q", b"one", properties.clone(), options)
        .unwrap();
    let second = tagger.publish("", "q", b"two", properties, options).unwrap();
    assert_eq!(first, 1);
    assert_eq!(second, 2);
    assert_eq!(tagger.unacknowledged(), 2);

    feed(
        &connection,
        &method_frame(
            channel_id,
            basic::Ack {
                delivery_tag: 2,
                multiple: true,
            },
        ),
    );
    assert_eq!(tagger.unacknowledged(), 0);
}

#[test]
fn cumulative_ack_resolves_in_ascending_order() {
    let (connection, channel, _recorder) = connected_channel(131_072);
    let channel_id = channel.id();
    let mut reliable = Reliable::new(Tagger::new(channel));
    feed(
        &connection,
        &method_frame(channel_id, confirm_methods::SelectOk),
    );

    let log = Rc::new(RefCell::new(Vec::new()));
    for body in [b"m1", b"m2", b"m3", b"m4"] {
        let (properties, options) = publish_args();
        let sink = Rc::clone(&log);
        let publication = reliable.publish("", "q", body, properties, options).unwrap();
        let id = publication.id();
        let _publication = publication.on_ack(move || sink.borrow_mut().push(id));
    }

    feed(
        &connection,
        &method_frame(
            channel_id,
            basic::Ack {
                delivery_tag: 3,
                multiple: true,
            },
        ),
    );
    feed(
        &connection,
        &method_frame(
            channel_id,
            basic::Ack {
                delivery_tag: 4,
                multiple: false,
            },
        ),
    );

    assert_eq!(*log.borrow(), vec![1, 2, 3, 4]);
    assert_eq!(reliable.tracked(), 0);
}

#[test]
fn nack_handler_may_destroy_the_channel() {
    let (connection, channel, recorder) = connected_channel(131_072);
    let channel_id = channel.id();
    let reliable = Reliable::new(Tagger::new(channel));
    feed(
        &connection,
        &method_frame(channel_id, confirm_methods::SelectOk),
    );

    let slot: Rc<RefCell<Option<Reliable>>> = Rc::new(RefCell::new(Some(reliable)));
    let log = Rc::new(RefCell::new(Vec::new()));

    {
        let mut holder = slot.borrow_mut();
        let reliable = holder.as_mut().unwrap();
        let (properties, options) = publish_args();
        let sink = Rc::clone(&log);
        let destroyer = Rc::clone(&slot);
        let _publication = reliable
            .publish("", "q", b"doomed", properties, options)
            .unwrap()
            .on_nack(move || {
                sink.borrow_mut().push("nack".to_owned());
                // dropping the wrapper here releases the last channel
                // handle: the channel is torn down mid-fan-out
                destroyer.borrow_mut().take();
            });
    }
    recorder.take_sent();

    feed(
        &connection,
        &method_frame(
            channel_id,
            basic::Nack {
                delivery_tag: 1,
                multiple: false,
                requeue: false,
            },
        ),
    );

    // the handler ran exactly once and the wrapper is gone
    assert_eq!(*log.borrow(), vec!["nack".to_owned()]);
    assert!(slot.borrow().is_none());
    assert_eq!(connection.state(), ConnectionState::Connected);

    // the destroyed channel told the broker and left a tombstone; a
    // stray confirm for it is swallowed silently
    let frames = recorder.take_frames();
    assert!(frames.iter().any(|frame| matches!(
        &frame.payload,
        FramePayload::Method(Method::ChannelClose(_))
    )));
    feed(
        &connection,
        &method_frame(
            channel_id,
            basic::Ack {
                delivery_tag: 1,
                multiple: false,
            },
        ),
    );
    assert_eq!(connection.state(), ConnectionState::Connected);
}

#[test]
fn throttle_bounds_the_outstanding_window() {
    let (connection, channel, recorder) = connected_channel(131_072);
    let channel_id = channel.id();
    let mut throttle = Throttle::new(channel, 2);
    feed(
        &connection,
        &method_frame(channel_id, confirm_methods::SelectOk),
    );
    recorder.take_sent();

    for key in ["m1", "m2", "m3", "m4"] {
        let (properties, options) = publish_args();
        throttle.publish("", key, b"x", properties, options).unwrap();
    }
    assert_eq!(throttle.unacknowledged(), 2);
    assert_eq!(throttle.queued(), 2);

    let routing_keys = |frames: &[siderite_amqp::frames::Frame]| -> Vec<String> {
        frames
            .iter()
            .filter_map(|frame| match &frame.payload {
                FramePayload::Method(Method::BasicPublish(publish)) => {
                    Some(publish.routing_key.to_string())
                }
                _ => None,
            })
            .collect()
    };

    // only the first two publications went out
    let sent = recorder.take_frames();
    assert_eq!(routing_keys(&sent), vec!["m1", "m2"]);

    // one confirm frees one slot; the queue drains in id order
    feed(
        &connection,
        &method_frame(
            channel_id,
            basic::Ack {
                delivery_tag: 1,
                multiple: false,
            },
        ),
    );
    assert_eq!(routing_keys(&recorder.take_frames()), vec!["m3"]);
    assert_eq!(throttle.unacknowledged(), 2);
    assert_eq!(throttle.queued(), 1);

    // a cumulative confirm releases the rest
    feed(
        &connection,
        &method_frame(
            channel_id,
            basic::Ack {
                delivery_tag: 3,
                multiple: true,
            },
        ),
    );
    assert_eq!(routing_keys(&recorder.take_frames()), vec!["m4"]);
    assert_eq!(throttle.queued(), 0);
}

#[test]
fn handlers_resolve_before_freed_slots_admit_queued_publishes() {
    let (connection, channel, recorder) = connected_channel(131_072);
    let channel_id = channel.id();
    let mut reliable = Reliable::new(Throttle::new(channel, 1));
    feed(
        &connection,
        &method_frame(channel_id, confirm_methods::SelectOk),
    );

    let (properties, options) = publish_args();
    let sent_at_ack_time = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&sent_at_ack_time);
    let probe = Rc::clone(&recorder);
    let _first = reliable
        .publish("", "held-back-probe", b"x", properties.clone(), options)
        .unwrap()
        .on_ack(move || {
            // the second publication must still be held back while the
            // ack handler runs
            let sent = probe.sent.borrow();
            let released = sent
                .windows(b"second".len())
                .any(|window| window == b"second");
            *sink.borrow_mut() = Some(released);
        });
    let _second = reliable
        .publish("", "second", b"y", properties, options)
        .unwrap();
    recorder.take_sent();

    feed(
        &connection,
        &method_frame(
            channel_id,
            basic::Ack {
                delivery_tag: 1,
                multiple: false,
            },
        ),
    );

    assert_eq!(*sent_at_ack_time.borrow(), Some(false));
    // after the handler returned, the freed slot released it
    let sent = recorder.take_sent();
    assert!(sent.windows(b"second".len()).any(|w| w == b"second"));
}

#[test]
fn ack_without_confirm_mode_is_a_channel_error() {
    let (connection, channel, _recorder) = connected_channel(131_072);
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&errors);
    channel.on_error(move |message| sink.borrow_mut().push(message.to_owned()));

    feed(
        &connection,
        &method_frame(
            channel.id(),
            basic::Ack {
                delivery_tag: 1,
                multiple: false,
            },
        ),
    );
    assert_eq!(channel.state(), ChannelState::Closed);
    assert_eq!(connection.state(), ConnectionState::Connected);
    assert!(errors.borrow()[0].contains("confirm"));
}

#[test]
fn outstanding_publications_are_lost_on_connection_failure() {
    let (connection, channel, _recorder) = connected_channel(131_072);
    let channel_id = channel.id();
    let mut reliable = Reliable::new(Tagger::new(channel));
    feed(
        &connection,
        &method_frame(channel_id, confirm_methods::SelectOk),
    );

    let log = Rc::new(RefCell::new(Vec::new()));
    let (properties, options) = publish_args();
    let sink = Rc::clone(&log);
    let _publication = reliable
        .publish("", "q", b"x", properties, options)
        .unwrap()
        .on_lost(move |reason| sink.borrow_mut().push(reason.to_owned()));

    // an unparseable frame kills the whole connection
    let garbage = [0x07u8, 0, 0, 0, 0, 0, 0, 0xCE];
    assert!(connection.ingest(&garbage).is_err());
    assert_eq!(connection.state(), ConnectionState::Closed);

    assert_eq!(log.borrow().len(), 1);
    assert!(log.borrow()[0].contains("unknown frame type"));
}
