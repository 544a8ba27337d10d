//! Bus local sobre UDP.
//!
//! Cada worker lê requisições de um clone do mesmo socket e chama o
//! [`PropertyHandler`] compartilhado, então get/set chegam ao dispatcher de
//! forma concorrente. Uma thread separada entrega os eventos de mudança aos
//! assinantes.

use crate::subscriptions::SubscriberTable;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use datamodel_core::notify::ChangeRecord;
use datamodel_core::protocol::{
    BusRequest, BusResponse, MAX_UDP_PAYLOAD, decode_request, encode_response,
};
use datamodel_core::{PropertyHandler, StatusCode, SubscriptionAction};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Intervalo de checagem do sinal de parada.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct UdpBus {
    socket: UdpSocket,
    handler: Arc<dyn PropertyHandler>,
    subscribers: Arc<SubscriberTable>,
    running: Arc<AtomicBool>,
}

impl UdpBus {
    pub fn bind(
        addr: &str,
        handler: Arc<dyn PropertyHandler>,
        running: Arc<AtomicBool>,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        Ok(Self {
            socket,
            handler,
            subscribers: Arc::new(SubscriberTable::new()),
            running,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Atende requisições até `running` virar `false`.
    pub fn serve(self, workers: usize, events: Receiver<ChangeRecord>) -> io::Result<()> {
        let mut threads = Vec::with_capacity(workers + 1);

        for id in 0..workers.max(1) {
            let socket = self.socket.try_clone()?;
            let handler = Arc::clone(&self.handler);
            let subscribers = Arc::clone(&self.subscribers);
            let running = Arc::clone(&self.running);
            threads.push(
                std::thread::Builder::new()
                    .name(format!("bus-worker-{id}"))
                    .spawn(move || worker_loop(&socket, handler.as_ref(), &subscribers, &running))?,
            );
        }

        {
            let socket = self.socket.try_clone()?;
            let subscribers = Arc::clone(&self.subscribers);
            let running = Arc::clone(&self.running);
            threads.push(
                std::thread::Builder::new()
                    .name("bus-events".into())
                    .spawn(move || delivery_loop(&socket, &events, &subscribers, &running))?,
            );
        }

        for thread in threads {
            if thread.join().is_err() {
                error!("Thread do bus terminou com pânico");
            }
        }
        Ok(())
    }
}

fn worker_loop(
    socket: &UdpSocket,
    handler: &dyn PropertyHandler,
    subscribers: &SubscriberTable,
    running: &AtomicBool,
) {
    let mut buf = vec![0u8; MAX_UDP_PAYLOAD];
    while running.load(Ordering::SeqCst) {
        let (size, source) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(ref e)
                if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock =>
            {
                continue;
            }
            Err(e) => {
                error!("Erro no socket do bus: {e}");
                continue;
            }
        };

        let response = match decode_request(&buf[..size]) {
            Ok(request) => {
                debug!("← {source}: {request:?}");
                handle_request(handler, subscribers, request, source)
            }
            Err(e) => {
                debug!("Pacote inválido de {source}: {e}");
                BusResponse::Error {
                    status: StatusCode::BadRequest,
                    message: e.to_string(),
                }
            }
        };

        send(socket, &response, source);
    }
}

/// Traduz uma requisição em chamadas ao handler.
pub fn handle_request(
    handler: &dyn PropertyHandler,
    subscribers: &SubscriberTable,
    request: BusRequest,
    source: SocketAddr,
) -> BusResponse {
    let result = match request {
        BusRequest::Get { name } => handler.get(&name).map(BusResponse::Value),
        BusRequest::Set { name, value } => handler.set(&name, value).map(|()| BusResponse::Ack),
        BusRequest::Subscribe { name, filter } => handler
            .subscription_changed(&name, SubscriptionAction::Subscribe, filter.as_deref())
            .map(|()| {
                if subscribers.add(&name, source) {
                    debug!("{source} inscrito em {name} ({} assinaturas)", subscribers.count());
                }
                BusResponse::Ack
            }),
        BusRequest::Unsubscribe { name } => handler
            .subscription_changed(&name, SubscriptionAction::Unsubscribe, None)
            .map(|()| {
                subscribers.remove(&name, source);
                BusResponse::Ack
            }),
        BusRequest::List => Ok(BusResponse::Elements(handler.elements())),
    };

    result.unwrap_or_else(BusResponse::from)
}

fn delivery_loop(
    socket: &UdpSocket,
    events: &Receiver<ChangeRecord>,
    subscribers: &SubscriberTable,
    running: &AtomicBool,
) {
    while running.load(Ordering::SeqCst) {
        let record = match events.recv_timeout(POLL_INTERVAL) {
            Ok(record) => record,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                info!("Canal de eventos fechado");
                break;
            }
        };

        let targets = subscribers.targets(&record.name);
        if targets.is_empty() {
            continue;
        }
        let event = BusResponse::Event(record);
        for target in targets {
            send(socket, &event, target);
        }
    }
}

fn send(socket: &UdpSocket, response: &BusResponse, target: SocketAddr) {
    match encode_response(response) {
        Ok(frame) => {
            if let Err(e) = socket.send_to(&frame, target) {
                warn!("Erro ao enviar resposta para {target}: {e}");
            }
        }
        Err(e) => error!("Erro ao serializar resposta: {e}"),
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
