//! The minimal single-threaded reactor that drives the Controller's two
//! entry points from live UDP traffic (SPEC_FULL.md, "reactor"). Not part
//! of the Controller itself — the spec only names `tick`/`on_datagram` as
//! entry points and treats whatever drives them as external — but a crate
//! needs one concrete driver to actually run. One `UdpSocket`, one timer
//! armed to the Controller's requested deadline, dispatched through a
//! single `tokio::select!`, mirroring `datamesh::network_actor`'s
//! single-worker-select-loop shape generalized from message-passing to
//! heartbeat-and-packet dispatch.

use crate::controller::Controller;
use crate::error::DhtResult;
use crate::message::Datagram;
use std::time::Instant;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::time::sleep_until;

const MAX_DATAGRAM_SIZE: usize = 4096;

pub struct Reactor {
    socket: UdpSocket,
    controller: Controller,
}

impl Reactor {
    pub async fn bind(listen_port: u16, controller: Controller) -> DhtResult<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", listen_port)).await?;
        tracing::info!(port = listen_port, "reactor bound");
        Ok(Reactor { socket, controller })
    }

    pub fn controller_mut(&mut self) -> &mut Controller {
        &mut self.controller
    }

    /// Sends whatever the Controller handed back from the call that
    /// triggered them, in order (spec.md §5).
    pub async fn send_all(&self, datagrams: Vec<Datagram>) -> DhtResult<()> {
        for dg in datagrams {
            if let Err(e) = self.socket.send_to(&dg.data, dg.addr).await {
                tracing::warn!(addr = %dg.addr, error = %e, "failed to send datagram");
            }
        }
        Ok(())
    }

    /// Runs until Ctrl-C, then performs an orderly shutdown.
    pub async fn run(mut self) -> DhtResult<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let (first_deadline, initial) = self.controller.tick(Instant::now());
        self.send_all(initial).await?;
        let mut deadline = tokio::time::Instant::from_std(first_deadline);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("received shutdown signal");
                    self.controller.on_stop();
                    return Ok(());
                }
                _ = sleep_until(deadline) => {
                    let (next, datagrams) = self.controller.tick(Instant::now());
                    deadline = tokio::time::Instant::from_std(next);
                    self.send_all(datagrams).await?;
                }
                recv = self.socket.recv_from(&mut buf) => {
                    let (len, addr) = recv?;
                    let datagram = Datagram { addr, data: buf[..len].to_vec() };
                    let datagrams = self.controller.on_datagram(datagram);
                    self.send_all(datagrams).await?;
                }
            }
        }
    }

    /// Runs the same loop as [`Self::run`], but also exits as soon as
    /// `done` fires — used to drive one bounded `get_peers` call from the
    /// CLI instead of the long-running service (SPEC_FULL's `get-peers`
    /// subcommand). Still performs the orderly shutdown on the way out.
    pub async fn run_until(mut self, mut done: oneshot::Receiver<()>) -> DhtResult<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let (first_deadline, initial) = self.controller.tick(Instant::now());
        self.send_all(initial).await?;
        let mut deadline = tokio::time::Instant::from_std(first_deadline);

        loop {
            tokio::select! {
                _ = &mut done => {
                    self.controller.on_stop();
                    return Ok(());
                }
                _ = tokio::signal::ctrl_c() => {
                    self.controller.on_stop();
                    return Ok(());
                }
                _ = sleep_until(deadline) => {
                    let (next, datagrams) = self.controller.tick(Instant::now());
                    deadline = tokio::time::Instant::from_std(next);
                    self.send_all(datagrams).await?;
                }
                recv = self.socket.recv_from(&mut buf) => {
                    let (len, addr) = recv?;
                    let datagram = Datagram { addr, data: buf[..len].to_vec() };
                    let datagrams = self.controller.on_datagram(datagram);
                    self.send_all(datagrams).await?;
                }
            }
        }
    }
}
