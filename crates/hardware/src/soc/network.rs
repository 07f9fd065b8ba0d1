//! On-chip network.
//!
//! The network carries a request from a source node to a destination node and
//! the response back. Each leg costs a fixed latency plus one cycle per bus
//! beat and draws the configured dynamic power while it is in flight. Messages
//! from one source node are carried one at a time.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;

use futures::future::LocalBoxFuture;

use crate::common::bits::div_ceil;
use crate::config::NetworkConfig;
use crate::core::energy::EnergyCounter;
use crate::sim::{Event, Kernel, SimContext};
use crate::stats::EnergyReporter;

/// Route and size of one request/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkPayload {
    /// Node sending the request.
    pub src_id: usize,
    /// Node serving the request.
    pub dst_id: usize,
    /// Bytes carried to the destination.
    pub request_size_byte: usize,
    /// Bytes carried back to the source.
    pub response_size_byte: usize,
}

/// Transport between chip nodes.
pub trait Network {
    /// Carries the request of `payload`, runs `serve` at the destination and
    /// carries the response back. Resolves to the bytes `serve` produced.
    fn transport<'a>(
        &'a self,
        payload: NetworkPayload,
        serve: LocalBoxFuture<'a, Vec<u8>>,
    ) -> LocalBoxFuture<'a, Vec<u8>>;

    /// Energy spent moving messages.
    fn energy_reporter(&self, running_time_ns: f64) -> EnergyReporter;
}

/// Uniform-latency network with one port per node.
pub struct SimpleNetwork {
    config: NetworkConfig,
    period_ns: f64,
    kernel: Kernel,
    energy: EnergyCounter,
    busy_sources: RefCell<BTreeSet<usize>>,
    released: Event,
}

impl fmt::Debug for SimpleNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleNetwork")
            .field("config", &self.config)
            .field("busy_sources", &self.busy_sources.borrow())
            .finish_non_exhaustive()
    }
}

impl SimpleNetwork {
    /// Creates an idle network.
    pub fn new(ctx: &SimContext, config: &NetworkConfig) -> Self {
        Self {
            config: config.clone(),
            period_ns: ctx.period_ns(),
            kernel: ctx.kernel().clone(),
            energy: EnergyCounter::default(),
            busy_sources: RefCell::new(BTreeSet::new()),
            released: ctx.kernel().event("network.released"),
        }
    }

    /// Time one leg carrying `size_byte` bytes takes.
    pub fn leg_latency_ns(&self, size_byte: usize) -> f64 {
        let beats = div_ceil(size_byte, self.config.bus_width_byte);
        (f64::from(self.config.latency_cycle) + beats as f64) * self.period_ns
    }

    async fn leg(&self, src_id: usize, dst_id: usize, size_byte: usize) {
        let latency = self.leg_latency_ns(size_byte);
        self.energy.add_dynamic_energy(latency, self.config.dynamic_power_mw);
        tracing::trace!(src_id, dst_id, size_byte, latency, "network leg");
        if latency > 0.0 {
            self.kernel.wait_ns(latency).await;
        }
    }

    async fn acquire(&self, src_id: usize) {
        loop {
            let released = self.released.wait();
            if self.busy_sources.borrow_mut().insert(src_id) {
                return;
            }
            released.await;
        }
    }

    fn release(&self, src_id: usize) {
        let _ = self.busy_sources.borrow_mut().remove(&src_id);
        self.released.notify();
    }
}

impl Network for SimpleNetwork {
    fn transport<'a>(
        &'a self,
        payload: NetworkPayload,
        serve: LocalBoxFuture<'a, Vec<u8>>,
    ) -> LocalBoxFuture<'a, Vec<u8>> {
        Box::pin(async move {
            self.acquire(payload.src_id).await;
            self.leg(payload.src_id, payload.dst_id, payload.request_size_byte)
                .await;
            let response = serve.await;
            self.leg(payload.dst_id, payload.src_id, payload.response_size_byte)
                .await;
            self.release(payload.src_id);
            response
        })
    }

    fn energy_reporter(&self, running_time_ns: f64) -> EnergyReporter {
        EnergyReporter::from_counter(&self.energy, running_time_ns)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::config::SimConfig;

    fn network(ctx: &SimContext) -> Rc<SimpleNetwork> {
        Rc::new(SimpleNetwork::new(
            ctx,
            &NetworkConfig {
                latency_cycle: 2,
                bus_width_byte: 4,
                dynamic_power_mw: 1.0,
            },
        ))
    }

    #[test]
    fn test_round_trip_latency() {
        let ctx = SimContext::new(&SimConfig::default());
        let net = network(&ctx);
        assert!((net.leg_latency_ns(9) - 5.0).abs() < 1e-9);
        assert!((net.leg_latency_ns(0) - 2.0).abs() < 1e-9);

        let done = Rc::new(RefCell::new(None));
        let (n, k, d) = (Rc::clone(&net), ctx.kernel().clone(), Rc::clone(&done));
        ctx.kernel().spawn("sender", async move {
            let payload = NetworkPayload {
                src_id: 0,
                dst_id: 1,
                request_size_byte: 1,
                response_size_byte: 8,
            };
            let data = n.transport(payload, Box::pin(async { vec![1, 2] })).await;
            *d.borrow_mut() = Some((data, k.now()));
        });
        let _ = ctx.kernel().run(Some(1_000_000));
        // request 2 + 1 cycles, response 2 + 2 cycles
        assert_eq!(*done.borrow(), Some((vec![1, 2], 7000)));
        assert!((net.energy_reporter(0.0).dynamic_energy_pj - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_same_source_is_serialized() {
        let ctx = SimContext::new(&SimConfig::default());
        let net = network(&ctx);
        let finished = Rc::new(RefCell::new(Vec::new()));
        for (name, src_id) in [("a", 0), ("b", 0), ("c", 1)] {
            let (n, k, f) = (Rc::clone(&net), ctx.kernel().clone(), Rc::clone(&finished));
            ctx.kernel().spawn(name, async move {
                let payload = NetworkPayload {
                    src_id,
                    dst_id: 2,
                    request_size_byte: 4,
                    response_size_byte: 4,
                };
                let _ = n.transport(payload, Box::pin(async { Vec::new() })).await;
                f.borrow_mut().push((name, k.now()));
            });
        }
        let _ = ctx.kernel().run(Some(1_000_000));
        assert_eq!(*finished.borrow(), vec![("a", 6000), ("c", 6000), ("b", 12000)]);
    }
}
