//! The sample broker: server side of distributed verification.
//!
//! The verifying process listens for worker clients; each registered client
//! streams path samples for the property currently being verified. The
//! broker buffers samples per client and serves the verifier in strict
//! round-robin client order: a connected client whose sample has not
//! arrived yet holds its turn, so a fast worker cannot bias the sample
//! stream, which would invalidate the statistical test when workers differ
//! in speed in a value-dependent way. Only disconnected clients leave the
//! schedule. With no clients connected the broker simulates locally, so
//! verification always makes progress.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use tracing::{debug, info, warn};

use stratus_verify::{SampleSource, VerifyError, VerifyResult};

use crate::wire::{ClientMsg, ServerMsg};
use crate::NetError;

/// No campaign in progress.
const IDLE: i32 = -1;

#[derive(Debug)]
pub(crate) enum NetEvent {
    Registered { id: i16 },
    Sample { id: i16, value: u64 },
    Disconnected { id: i16 },
}

/// Round-robin sample scheduling, independent of any transport.
#[derive(Debug, Default)]
pub(crate) struct RoundRobin {
    buffers: HashMap<i16, VecDeque<u64>>,
    schedule: VecDeque<i16>,
}

impl RoundRobin {
    pub(crate) fn register(&mut self, id: i16) {
        if self.buffers.insert(id, VecDeque::new()).is_none() {
            self.schedule.push_back(id);
        }
    }

    pub(crate) fn push(&mut self, id: i16, value: u64) {
        if let Some(buffer) = self.buffers.get_mut(&id) {
            buffer.push_back(value);
        }
    }

    pub(crate) fn drop_client(&mut self, id: i16) {
        self.buffers.remove(&id);
        self.schedule.retain(|&c| c != id);
    }

    /// Discards buffered samples from a finished campaign.
    pub(crate) fn clear(&mut self) {
        for buffer in self.buffers.values_mut() {
            buffer.clear();
        }
    }

    /// The scheduled client's next sample. The schedule advances only when
    /// a sample is actually served: a connected client whose sample is
    /// still in flight keeps its turn, so relative worker speed cannot
    /// reorder sample usage. Dropped clients leave the schedule entirely.
    pub(crate) fn take(&mut self) -> Turn {
        let Some(&id) = self.schedule.front() else {
            return Turn::Idle;
        };
        match self.buffers.get_mut(&id).and_then(VecDeque::pop_front) {
            Some(value) => {
                self.schedule.rotate_left(1);
                Turn::Sample { id, value }
            }
            None => Turn::Wait { id },
        }
    }
}

/// Outcome of consulting the round-robin schedule.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Turn {
    /// A buffered sample from the client whose turn it is.
    Sample { id: i16, value: u64 },
    /// The scheduled client is connected but has not delivered yet; the
    /// caller must wait for it rather than serve another client.
    Wait { id: i16 },
    /// No clients are registered.
    Idle,
}

/// Writer halves of the client connections, shared with the accept thread.
struct Registry {
    writers: HashMap<i16, TcpStream>,
    next_id: i16,
}

struct Shared {
    registry: Mutex<Registry>,
    /// Property index of the campaign in progress, or [`IDLE`].
    current: AtomicI32,
    /// Tells the accept thread to exit on its next wakeup.
    shutdown: AtomicBool,
}

impl Shared {
    /// Sends a message to every connected client. Write failures only drop
    /// the writer; the reader thread reports the disconnect.
    fn broadcast(&self, msg: ServerMsg) {
        let encoded = msg.encode();
        let mut registry = match self.registry.lock() {
            Ok(registry) => registry,
            Err(poisoned) => poisoned.into_inner(),
        };
        registry.writers.retain(|id, stream| {
            match stream.write_all(&encoded) {
                Ok(()) => true,
                Err(err) => {
                    debug!(client = id, error = %err, "dropping unreachable client");
                    false
                }
            }
        });
    }
}

/// A [`SampleSource`] fed by remote workers over TCP.
pub struct SampleBroker {
    shared: Arc<Shared>,
    events: Receiver<NetEvent>,
    robin: RoundRobin,
    addr: SocketAddr,
    accept: Option<JoinHandle<()>>,
}

impl SampleBroker {
    /// Binds `addr` and starts accepting clients in a background thread.
    pub fn serve(addr: &str) -> Result<SampleBroker, NetError> {
        let listener = TcpListener::bind(addr)?;
        let local = listener.local_addr()?;
        let shared = Arc::new(Shared {
            registry: Mutex::new(Registry {
                writers: HashMap::new(),
                next_id: 0,
            }),
            current: AtomicI32::new(IDLE),
            shutdown: AtomicBool::new(false),
        });
        let (tx, rx) = crossbeam_channel::unbounded();
        let accept = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || accept_loop(listener, shared, tx))
        };
        info!(addr = %local, "sample broker listening");
        Ok(SampleBroker {
            shared,
            events: rx,
            robin: RoundRobin::default(),
            addr: local,
            accept: Some(accept),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    fn handle_event(&mut self, event: NetEvent) {
        match event {
            NetEvent::Registered { id } => {
                info!(client = id, "client registered");
                self.robin.register(id);
            }
            NetEvent::Sample { id, value } => self.robin.push(id, value),
            NetEvent::Disconnected { id } => {
                debug!(client = id, "client disconnected");
                self.robin.drop_client(id);
            }
        }
    }

    fn drain_events(&mut self) -> VerifyResult<()> {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.handle_event(event),
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => {
                    return Err(VerifyError::Source("accept thread gone".into()))
                }
            }
        }
    }
}

impl SampleSource for SampleBroker {
    fn start(&mut self, property_index: usize) -> VerifyResult<()> {
        self.robin.clear();
        self.shared
            .current
            .store(property_index as i32, Ordering::SeqCst);
        self.shared.broadcast(ServerMsg::Start {
            property: property_index as i32,
        });
        Ok(())
    }

    fn stop(&mut self) -> VerifyResult<()> {
        self.shared.current.store(IDLE, Ordering::SeqCst);
        self.shared.broadcast(ServerMsg::Stop);
        Ok(())
    }

    fn next_sample(
        &mut self,
        local: &mut dyn FnMut() -> VerifyResult<bool>,
    ) -> VerifyResult<bool> {
        loop {
            self.drain_events()?;
            match self.robin.take() {
                Turn::Sample { id, value } => {
                    debug!(client = id, value, "serving remote sample");
                    return Ok(value != 0);
                }
                Turn::Wait { .. } => {
                    // Hold the scheduled client's turn until its sample
                    // lands or it disconnects. Serving another client here
                    // would let worker speed reorder sample usage.
                    let event = self
                        .events
                        .recv()
                        .map_err(|_| VerifyError::Source("accept thread gone".into()))?;
                    self.handle_event(event);
                }
                // No clients connected: simulate here so verification
                // makes progress without workers.
                Turn::Idle => return local(),
            }
        }
    }
}

impl Drop for SampleBroker {
    fn drop(&mut self) {
        self.shared.broadcast(ServerMsg::Quit);
        self.shared.shutdown.store(true, Ordering::SeqCst);
        // Wake the acceptor so it observes the flag and closes the
        // listener before drop returns.
        let _ = TcpStream::connect(self.addr);
        if let Some(accept) = self.accept.take() {
            let _ = accept.join();
        }
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<Shared>, events: Sender<NetEvent>) {
    for stream in listener.incoming() {
        if shared.shutdown.load(Ordering::SeqCst) {
            return;
        }
        let mut stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "accept failed");
                continue;
            }
        };
        let id = {
            let mut registry = match shared.registry.lock() {
                Ok(registry) => registry,
                Err(poisoned) => poisoned.into_inner(),
            };
            let id = registry.next_id;
            registry.next_id += 1;
            match stream.try_clone() {
                Ok(writer) => {
                    registry.writers.insert(id, writer);
                }
                Err(err) => {
                    warn!(error = %err, "cannot clone client stream");
                    continue;
                }
            }
            id
        };
        let greeting = ServerMsg::Register {
            client_id: i32::from(id),
        };
        if greeting.write_to(&mut stream).is_err() {
            continue;
        }
        // A campaign may already be running; late joiners start sampling
        // immediately.
        let current = shared.current.load(Ordering::SeqCst);
        if current != IDLE {
            let _ = ServerMsg::Start { property: current }.write_to(&mut stream);
        }
        let events = events.clone();
        thread::spawn(move || {
            reader_loop(stream, id, &events);
        });
    }
}

fn reader_loop(mut stream: TcpStream, id: i16, events: &Sender<NetEvent>) {
    loop {
        match ClientMsg::read_from(&mut stream) {
            Ok(ClientMsg::Register) => {
                if events.send(NetEvent::Registered { id }).is_err() {
                    return;
                }
            }
            Ok(ClientMsg::Sample { value, .. }) => {
                if events.send(NetEvent::Sample { id, value }).is_err() {
                    return;
                }
            }
            Err(err) => {
                debug!(client = id, error = %err, "client stream closed");
                let _ = events.send(NetEvent::Disconnected { id });
                return;
            }
        }
    }
}
