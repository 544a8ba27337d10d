//! Conexão UDP com o provider.

use anyhow::{Context, bail};
use datamodel_core::notify::ChangeRecord;
use datamodel_core::protocol::{
    BusRequest, BusResponse, MAX_UDP_PAYLOAD, decode_response, encode_request,
};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::debug;

pub struct BusClient {
    socket: UdpSocket,
    provider: SocketAddr,
    buf: Vec<u8>,
}

impl BusClient {
    pub fn connect(provider: &str, timeout: Duration) -> anyhow::Result<Self> {
        let provider: SocketAddr = provider
            .parse()
            .with_context(|| format!("Endereço do provider inválido: {provider}"))?;
        let local = if provider.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).context("Falha ao criar socket UDP")?;
        socket.set_read_timeout(Some(timeout))?;
        Ok(Self {
            socket,
            provider,
            buf: vec![0u8; MAX_UDP_PAYLOAD],
        })
    }

    /// Envia a requisição e espera a resposta correspondente.
    ///
    /// Eventos que chegarem antes da resposta são descartados.
    pub fn request(&mut self, request: &BusRequest) -> anyhow::Result<BusResponse> {
        let frame = encode_request(request)?;
        self.socket
            .send_to(&frame, self.provider)
            .with_context(|| format!("Erro ao enviar para {}", self.provider))?;

        loop {
            let Some(response) = self.receive()? else {
                bail!("Sem resposta de {} (timeout)", self.provider);
            };
            match response {
                BusResponse::Event(record) => debug!("Evento fora de ordem ignorado: {record}"),
                BusResponse::Error { status, message } => bail!("{status:?}: {message}"),
                other => return Ok(other),
            }
        }
    }

    /// Próximo evento de mudança; `None` em timeout.
    pub fn next_event(&mut self) -> anyhow::Result<Option<ChangeRecord>> {
        match self.receive()? {
            Some(BusResponse::Event(record)) => Ok(Some(record)),
            Some(other) => {
                debug!("Resposta inesperada durante watch: {other:?}");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn receive(&mut self) -> anyhow::Result<Option<BusResponse>> {
        loop {
            match self.socket.recv_from(&mut self.buf) {
                Ok((size, source)) => {
                    if source != self.provider {
                        debug!("Ignorando pacote de {source}");
                        continue;
                    }
                    return Ok(Some(decode_response(&self.buf[..size])?));
                }
                Err(ref e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    return Ok(None);
                }
                Err(e) => return Err(e).context("Erro ao receber do provider"),
            }
        }
    }
}
