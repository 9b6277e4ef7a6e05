use std::time::Duration;

use mdc_proto::packet::Packet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no mote reachable: {0}")]
    Unavailable(String),
    #[error("serial io")]
    Io(#[from] std::io::Error),
    #[error("serial port")]
    Serial(#[from] tokio_serial::Error),
}

/// Packet channel to the agent's sniffer mote.
///
/// `receive` must return within roughly `timeout`; callers depend on it to
/// keep their retry clock running.
pub trait Transport: Send {
    fn send(&mut self, packet: &Packet, am_type: u8) -> Result<(), TransportError>;

    fn receive(&mut self, timeout: Duration) -> Result<Option<Packet>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, packet: &Packet, am_type: u8) -> Result<(), TransportError> {
        (**self).send(packet, am_type)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Packet>, TransportError> {
        (**self).receive(timeout)
    }
}
