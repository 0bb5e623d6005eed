//! Host port allocation for port-addressed sandboxes.
//!
//! The pool hands out ports from a closed range using a circular next-fit scan: the search starts
//! just after the most recently allocated port and wraps around to the lower bound. Freed ports
//! are therefore reused as late as possible, which keeps a new sandbox from landing on a port a
//! torn-down listener may still be lingering on.
//!
//! The pool holds no persistent state. After a restart the set of used ports is rebuilt from the
//! ports the container runtime reports as published, see [`PortPool::resync`].

use std::collections::BTreeSet;

use crate::{TidepoolError, TidepoolResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A pool of host ports in `[lower, upper]`.
///
/// The pool itself is not synchronized; the lifecycle controller keeps it behind a single lock.
#[derive(Debug, Clone)]
pub struct PortPool {
    lower: u16,
    upper: u16,

    /// The most recently allocated port.
    last: Option<u16>,

    /// Ports currently handed out. Always a subset of `[lower, upper]`.
    used: BTreeSet<u16>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl PortPool {
    /// Creates an empty pool over `[lower, upper]`.
    pub fn new(lower: u16, upper: u16) -> TidepoolResult<Self> {
        if lower > upper {
            return Err(TidepoolError::InvalidPortRange { lower, upper });
        }

        Ok(Self {
            lower,
            upper,
            last: None,
            used: BTreeSet::new(),
        })
    }

    /// The lowest port in the pool.
    pub fn lower(&self) -> u16 {
        self.lower
    }

    /// The highest port in the pool.
    pub fn upper(&self) -> u16 {
        self.upper
    }

    /// Hands out the next free port after the last allocation, wrapping around once.
    ///
    /// Fails with [`TidepoolError::PortsExhausted`] when every port is in use. That is a capacity
    /// limit, not a transient condition: retrying only helps after a port has been released.
    pub fn allocate(&mut self) -> TidepoolResult<u16> {
        let start = match self.last {
            Some(last) if last < self.upper => last + 1,
            _ => self.lower,
        };

        let port = (start..=self.upper)
            .chain(self.lower..start)
            .find(|port| !self.used.contains(port))
            .ok_or(TidepoolError::PortsExhausted {
                lower: self.lower,
                upper: self.upper,
            })?;

        self.used.insert(port);
        self.last = Some(port);
        tracing::debug!("allocated port {}", port);

        Ok(port)
    }

    /// Returns a port to the pool. Releasing a port that is not in use does nothing.
    pub fn release(&mut self, port: u16) {
        if self.used.remove(&port) {
            tracing::debug!("released port {}", port);
        }
    }

    /// Replaces the used set with `ports`, the ports currently bound by sandboxes.
    ///
    /// Ports outside the range are ignored. The allocation cursor is kept.
    pub fn resync(&mut self, ports: impl IntoIterator<Item = u16>) {
        let (lower, upper) = (self.lower, self.upper);
        self.used = ports
            .into_iter()
            .filter(|port| {
                let in_range = (lower..=upper).contains(port);
                if !in_range {
                    tracing::debug!("ignoring port {} outside {}-{}", port, lower, upper);
                }
                in_range
            })
            .collect();

        tracing::info!("port pool resynced with {} ports in use", self.used.len());
    }

    /// Whether `port` is currently handed out.
    pub fn is_allocated(&self, port: u16) -> bool {
        self.used.contains(&port)
    }

    /// The ports currently handed out, in ascending order.
    pub fn allocated(&self) -> Vec<u16> {
        self.used.iter().copied().collect()
    }

    /// The number of ports currently handed out.
    pub fn allocated_count(&self) -> usize {
        self.used.len()
    }

    /// The number of ports still free.
    pub fn available_count(&self) -> usize {
        self.total_count() - self.used.len()
    }

    /// The size of the range.
    pub fn total_count(&self) -> usize {
        (self.upper - self.lower) as usize + 1
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
