//! A minimal relay that stores events in memory and answers `REQ`s from
//! them. Behaviour is switchable per test.

use futures::{SinkExt, StreamExt};
use nostr::Event;
use nostr_client::{ClientMessage, Filter, RelayMessage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// How the relay answers `EVENT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    Accept,
    Reject,
    /// Never answer
    Ignore,
}

#[derive(Debug, Clone, Copy)]
pub struct Behavior {
    pub ack: AckMode,
    /// Send EOSE after the stored events
    pub eose: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            ack: AckMode::Accept,
            eose: true,
        }
    }
}

struct Shared {
    behavior: Behavior,
    stored: Mutex<Vec<Event>>,
    live: broadcast::Sender<Event>,
    reqs: AtomicUsize,
    closes: AtomicUsize,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

pub struct MockRelay {
    pub url: String,
    shared: Arc<Shared>,
}

impl MockRelay {
    pub async fn start() -> Self {
        Self::start_with(Behavior::default()).await
    }

    pub async fn start_with(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (live, _) = broadcast::channel(1024);
        let shared = Arc::new(Shared {
            behavior,
            stored: Mutex::new(Vec::new()),
            live,
            reqs: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            tasks: Mutex::new(Vec::new()),
        });

        let accept_shared = Arc::clone(&shared);
        let accept_loop = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let conn = tokio::spawn(serve(stream, Arc::clone(&accept_shared)));
                accept_shared.tasks.lock().unwrap().push(conn);
            }
        });
        shared.tasks.lock().unwrap().push(accept_loop);

        Self { url, shared }
    }

    /// Address of a port nothing listens on.
    pub async fn unreachable_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);
        url
    }

    /// Preload an event as if it had been published earlier.
    pub fn store(&self, event: Event) {
        self.shared.stored.lock().unwrap().push(event);
    }

    /// Deliver an event to every open matching subscription without storing
    /// it.
    pub fn push(&self, event: Event) {
        let _ = self.shared.live.send(event);
    }

    pub fn stored(&self) -> Vec<Event> {
        self.shared.stored.lock().unwrap().clone()
    }

    pub fn req_count(&self) -> usize {
        self.shared.reqs.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }
}

impl Drop for MockRelay {
    fn drop(&mut self) {
        for task in self.shared.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }
}

async fn serve(stream: TcpStream, shared: Arc<Shared>) {
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let (mut sink, mut source) = ws.split();
    let mut live = shared.live.subscribe();
    let mut subscriptions: HashMap<String, Vec<Filter>> = HashMap::new();

    loop {
        let mut replies = Vec::new();
        tokio::select! {
            frame = source.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };
                match ClientMessage::from_json(text.as_str()) {
                    Ok(msg) => handle(&shared, &mut subscriptions, msg, &mut replies),
                    Err(e) => replies.push(RelayMessage::Notice { message: e.to_string() }),
                }
            }
            Ok(event) = live.recv() => {
                for (subscription_id, filters) in &subscriptions {
                    if filters.iter().any(|f| f.matches(&event)) {
                        replies.push(RelayMessage::Event {
                            subscription_id: subscription_id.clone(),
                            event: event.clone(),
                        });
                    }
                }
            }
        }

        for reply in replies {
            if sink.send(Message::Text(reply.to_json().into())).await.is_err() {
                return;
            }
        }
    }
}

fn handle(
    shared: &Shared,
    subscriptions: &mut HashMap<String, Vec<Filter>>,
    msg: ClientMessage,
    replies: &mut Vec<RelayMessage>,
) {
    match msg {
        ClientMessage::Event(event) => match shared.behavior.ack {
            AckMode::Accept => {
                replies.push(RelayMessage::Ok {
                    event_id: event.id.clone(),
                    accepted: true,
                    message: String::new(),
                });
                shared.stored.lock().unwrap().push(event.clone());
                let _ = shared.live.send(event);
            }
            AckMode::Reject => replies.push(RelayMessage::Ok {
                event_id: event.id,
                accepted: false,
                message: "blocked: test relay".into(),
            }),
            AckMode::Ignore => {}
        },
        ClientMessage::Req {
            subscription_id,
            filters,
        } => {
            shared.reqs.fetch_add(1, Ordering::SeqCst);
            for event in shared.stored.lock().unwrap().iter() {
                if filters.iter().any(|f| f.matches(event)) {
                    replies.push(RelayMessage::Event {
                        subscription_id: subscription_id.clone(),
                        event: event.clone(),
                    });
                }
            }
            if shared.behavior.eose {
                replies.push(RelayMessage::Eose {
                    subscription_id: subscription_id.clone(),
                });
            }
            subscriptions.insert(subscription_id, filters);
        }
        ClientMessage::Close { subscription_id } => {
            shared.closes.fetch_add(1, Ordering::SeqCst);
            subscriptions.remove(&subscription_id);
        }
        ClientMessage::Auth(_) => {}
    }
}
