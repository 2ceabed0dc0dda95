use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use super::caching::CachingPublisher;
use super::pubsub_client::{Client, ClientEvent, ClientEvents};
use crate::codec::{PayloadEncoding, Value};
use crate::transport::{
    Connection, ConnectionEvent, ForwardedSubscriptionRequest, Message, MulticastData,
    NotificationRequest, SubscriptionRequest, UnicastData,
};
use crate::utils::error::{DecodeError, TransportError};

fn client(encoding: PayloadEncoding) -> (Client, UnboundedReceiver<Message>) {
    let (conn, rx) = Connection::detached(0);
    (Client::from_connection(conn, encoding), rx)
}

fn drain(rx: &mut UnboundedReceiver<Message>) -> Vec<Message> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

fn fields(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn test_client_requests() {
    let (client, mut rx) = client(PayloadEncoding::Binary);

    client.add_subscription("X").unwrap();
    client.remove_subscription("X").unwrap();
    client.add_notification("^X").unwrap();
    client.remove_notification("^X").unwrap();

    assert_eq!(
        drain(&mut rx),
        vec![
            Message::from(SubscriptionRequest {
                topic: "X".to_string(),
                is_add: true
            }),
            Message::from(SubscriptionRequest {
                topic: "X".to_string(),
                is_add: false
            }),
            Message::from(NotificationRequest {
                pattern: "^X".to_string(),
                is_add: true
            }),
            Message::from(NotificationRequest {
                pattern: "^X".to_string(),
                is_add: false
            }),
        ]
    );
}

#[test]
fn test_publish_and_send_encode_payload() {
    let (client, mut rx) = client(PayloadEncoding::Binary);
    let value = Value::from(42i32);

    client.publish("X", true, &value).unwrap();
    client.send(7, "X", false, &value).unwrap();
    client.publish("X", false, &Value::Null).unwrap();

    assert_eq!(
        drain(&mut rx),
        vec![
            Message::from(MulticastData {
                topic: "X".to_string(),
                is_image: true,
                data: value.to_bytes().unwrap(),
            }),
            Message::from(UnicastData {
                client_id: 7,
                topic: "X".to_string(),
                is_image: false,
                data: value.to_bytes().unwrap(),
            }),
            Message::from(MulticastData {
                topic: "X".to_string(),
                is_image: false,
                data: Bytes::new(),
            }),
        ]
    );
}

#[test]
fn test_requests_after_close_fail() {
    let (client, _rx) = client(PayloadEncoding::Binary);
    client.close();
    assert!(client.is_closed());
    assert!(matches!(
        client.add_subscription("X"),
        Err(TransportError::Disconnected)
    ));
}

#[tokio::test]
async fn test_events_are_decoded_in_order() {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut events = ClientEvents::new(rx, PayloadEncoding::Binary);
    let value = Value::from("hello");

    let incoming: Vec<Message> = vec![
        MulticastData {
            topic: "X".to_string(),
            is_image: true,
            data: value.to_bytes().unwrap(),
        }
        .into(),
        SubscriptionRequest {
            topic: "ignored".to_string(),
            is_add: true,
        }
        .into(),
        ForwardedSubscriptionRequest {
            client_id: 3,
            topic: "X".to_string(),
            is_add: false,
        }
        .into(),
        UnicastData {
            client_id: 0,
            topic: "X".to_string(),
            is_image: false,
            data: Bytes::new(),
        }
        .into(),
    ];
    for message in incoming {
        tx.send(ConnectionEvent::Received { id: 0, message }).unwrap();
    }
    tx.send(ConnectionEvent::Closed {
        id: 0,
        abnormal: false,
    })
    .unwrap();

    assert_eq!(
        events.recv().await,
        Some(ClientEvent::Data {
            topic: "X".to_string(),
            data: value,
            is_image: true
        })
    );
    assert_eq!(
        events.recv().await,
        Some(ClientEvent::ForwardedSubscription {
            client_id: 3,
            topic: "X".to_string(),
            is_add: false
        })
    );
    assert_eq!(
        events.recv().await,
        Some(ClientEvent::Data {
            topic: "X".to_string(),
            data: Value::Null,
            is_image: false
        })
    );
    assert_eq!(
        events.recv().await,
        Some(ClientEvent::Closed { abnormal: false })
    );
    assert_eq!(events.recv().await, None);
}

#[tokio::test]
async fn test_fault_is_abnormal_close() {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut events = ClientEvents::new(rx, PayloadEncoding::Binary);

    tx.send(ConnectionEvent::Faulted {
        id: 0,
        error: DecodeError::UnknownMessageType(9).into(),
    })
    .unwrap();

    assert_eq!(
        events.recv().await,
        Some(ClientEvent::Closed { abnormal: true })
    );
    assert_eq!(events.recv().await, None);
}

#[tokio::test]
async fn test_lost_reader_is_abnormal_close() {
    let (tx, rx) = mpsc::unbounded_channel::<ConnectionEvent>();
    let mut events = ClientEvents::new(rx, PayloadEncoding::Json);
    drop(tx);

    assert_eq!(
        events.recv().await,
        Some(ClientEvent::Closed { abnormal: true })
    );
    assert_eq!(events.recv().await, None);
}

#[tokio::test]
async fn test_caching_publisher_multicasts_without_subscribers() {
    let (client, mut rx) = client(PayloadEncoding::Binary);
    let (_tx, events_rx) = mpsc::unbounded_channel();
    let (publisher, _events) =
        CachingPublisher::new(client, ClientEvents::new(events_rx, PayloadEncoding::Binary));

    let delta = fields(&[("bid", Value::Double(100.5))]);
    publisher.publish("LSE.VOD", delta.clone()).unwrap();

    assert_eq!(
        drain(&mut rx),
        vec![Message::from(MulticastData {
            topic: "LSE.VOD".to_string(),
            is_image: false,
            data: Value::Map(delta.clone()).to_bytes().unwrap(),
        })]
    );
    assert_eq!(publisher.image("LSE.VOD"), Some(delta));
}

#[tokio::test]
async fn test_caching_publisher_sends_image_to_new_subscriber_once() {
    let (client, mut rx) = client(PayloadEncoding::Binary);
    let (_tx, events_rx) = mpsc::unbounded_channel();
    let (publisher, _events) =
        CachingPublisher::new(client, ClientEvents::new(events_rx, PayloadEncoding::Binary));

    publisher
        .publish("LSE.VOD", fields(&[("bid", Value::Double(100.5))]))
        .unwrap();
    publisher
        .publish("LSE.VOD", fields(&[("ask", Value::Double(101.0))]))
        .unwrap();
    drain(&mut rx);

    publisher.on_forwarded_subscription(7, "LSE.VOD", true);
    publisher.on_forwarded_subscription(7, "LSE.VOD", true);

    let image = fields(&[("bid", Value::Double(100.5)), ("ask", Value::Double(101.0))]);
    assert_eq!(
        drain(&mut rx),
        vec![Message::from(UnicastData {
            client_id: 7,
            topic: "LSE.VOD".to_string(),
            is_image: true,
            data: Value::Map(image).to_bytes().unwrap(),
        })]
    );
    assert_eq!(publisher.known_clients("LSE.VOD"), vec![7]);

    // everyone has the image, so updates go out as a multicast again
    let delta = fields(&[("bid", Value::Double(100.75))]);
    publisher.publish("LSE.VOD", delta.clone()).unwrap();
    assert_eq!(
        drain(&mut rx),
        vec![Message::from(MulticastData {
            topic: "LSE.VOD".to_string(),
            is_image: false,
            data: Value::Map(delta).to_bytes().unwrap(),
        })]
    );
}

#[tokio::test]
async fn test_caching_publisher_forgets_departed_subscriber() {
    let (client, mut rx) = client(PayloadEncoding::Binary);
    let (_tx, events_rx) = mpsc::unbounded_channel();
    let (publisher, _events) =
        CachingPublisher::new(client, ClientEvents::new(events_rx, PayloadEncoding::Binary));

    // a subscription before any data still gets an (empty) image
    publisher.on_forwarded_subscription(3, "NYSE.IBM", true);
    assert_eq!(drain(&mut rx).len(), 1);
    assert_eq!(publisher.known_clients("NYSE.IBM"), vec![3]);

    publisher.on_forwarded_subscription(3, "NYSE.IBM", false);
    assert!(publisher.known_clients("NYSE.IBM").is_empty());
    assert_eq!(publisher.image("NYSE.IBM"), None);

    // a topic with data outlives its subscribers
    publisher
        .publish("LSE.VOD", fields(&[("bid", Value::Int32(1))]))
        .unwrap();
    publisher.on_forwarded_subscription(4, "LSE.VOD", true);
    publisher.on_forwarded_subscription(4, "LSE.VOD", false);
    assert!(publisher.image("LSE.VOD").is_some());
}

#[tokio::test]
async fn test_caching_publisher_pump_answers_notices_and_passes_data() {
    let (client, mut rx) = client(PayloadEncoding::Binary);
    let (tx, events_rx) = mpsc::unbounded_channel();
    let (publisher, mut events) =
        CachingPublisher::new(client, ClientEvents::new(events_rx, PayloadEncoding::Binary));
    publisher
        .publish("X", fields(&[("v", Value::Int64(1))]))
        .unwrap();
    drain(&mut rx);

    tx.send(ConnectionEvent::Received {
        id: 0,
        message: ForwardedSubscriptionRequest {
            client_id: 11,
            topic: "X".to_string(),
            is_add: true,
        }
        .into(),
    })
    .unwrap();
    tx.send(ConnectionEvent::Received {
        id: 0,
        message: MulticastData {
            topic: "Y".to_string(),
            is_image: false,
            data: Bytes::new(),
        }
        .into(),
    })
    .unwrap();
    tx.send(ConnectionEvent::Closed {
        id: 0,
        abnormal: false,
    })
    .unwrap();

    assert_eq!(
        events.recv().await,
        Some(ClientEvent::Data {
            topic: "Y".to_string(),
            data: Value::Null,
            is_image: false
        })
    );
    assert_eq!(
        events.recv().await,
        Some(ClientEvent::Closed { abnormal: false })
    );

    // the notice was handled before the data that followed it
    match drain(&mut rx).as_slice() {
        [Message::UnicastData(image)] => {
            assert_eq!(image.client_id, 11);
            assert!(image.is_image);
        }
        other => panic!("unexpected messages {other:?}"),
    }
}
