// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//! Runtime gauges and their registration

use prometheus::{Gauge, Opts, Registry};
use tracing::debug;

use crate::error::Result;
use crate::types::RuntimeSample;

/// The five runtime gauges owned by a collector
///
/// Gauges are backed by atomics, so the sampling loop writes while scrapes
/// read without any extra locking. Clones share the same values.
#[derive(Clone)]
pub struct RuntimeGauges {
    /// Live threads
    threads: Gauge,
    /// Resident bytes
    heap_alloc: Gauge,
    /// Address space obtained from the OS
    heap_sys: Gauge,
    /// Cumulative reclamation pause time (ns)
    gc_pause_total_ns: Gauge,
    /// Completed reclamation cycles
    gc_completed_cycles: Gauge,
}

impl RuntimeGauges {
    /// Build the gauges under `namespace`
    pub fn new(namespace: &str) -> Result<Self> {
        Ok(Self {
            threads: gauge(
                namespace,
                "goroutines",
                "Number of live threads in the process",
            )?,
            heap_alloc: gauge(namespace, "heap_alloc", "Resident memory in bytes")?,
            heap_sys: gauge(
                namespace,
                "heap_sys",
                "Virtual memory obtained from the OS in bytes",
            )?,
            gc_pause_total_ns: gauge(
                namespace,
                "gc_pause_total_ns",
                "Cumulative reclamation pause time in nanoseconds",
            )?,
            gc_completed_cycles: gauge(
                namespace,
                "gc_completed_cycles",
                "Number of completed reclamation cycles",
            )?,
        })
    }

    /// Register every gauge into `registry`
    ///
    /// Fails with a registration error if any name is already taken.
    pub fn register(&self, registry: &Registry) -> Result<()> {
        for gauge in self.all() {
            registry.register(Box::new(gauge.clone()))?;
        }
        debug!("Registered {} runtime gauges", self.all().len());
        Ok(())
    }

    /// Overwrite every gauge with the values of `sample`
    pub fn record(&self, sample: &RuntimeSample) {
        self.threads.set(sample.threads as f64);
        self.heap_alloc.set(sample.heap_alloc as f64);
        self.heap_sys.set(sample.heap_sys as f64);
        self.gc_completed_cycles
            .set(sample.gc_completed_cycles as f64);
        self.gc_pause_total_ns.set(sample.gc_pause_total_ns as f64);
    }

    /// Read the gauges back as a sample
    pub fn snapshot(&self) -> RuntimeSample {
        RuntimeSample {
            threads: self.threads.get() as u64,
            heap_alloc: self.heap_alloc.get() as u64,
            heap_sys: self.heap_sys.get() as u64,
            gc_completed_cycles: self.gc_completed_cycles.get() as u64,
            gc_pause_total_ns: self.gc_pause_total_ns.get() as u64,
        }
    }

    fn all(&self) -> [&Gauge; 5] {
        [
            &self.threads,
            &self.heap_alloc,
            &self.heap_sys,
            &self.gc_pause_total_ns,
            &self.gc_completed_cycles,
        ]
    }
}

fn gauge(namespace: &str, name: &str, help: &str) -> Result<Gauge> {
    Ok(Gauge::with_opts(
        Opts::new(name, help).namespace(namespace),
    )?)
}
