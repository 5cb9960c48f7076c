//! Factories creating processors.
//!
//! A [ProcessorMetaSupplier] runs once on the control plane and produces a
//! [ProcessorSupplier] per cluster member. Each supplier then creates the
//! processors for its member.
use std::net::SocketAddr;

use crate::config::SerializableOptions;

use super::Processor;

/// Network address identifying a cluster member
pub type MemberAddress = SocketAddr;

/// Context given to a meta supplier on initialization
#[derive(Debug, Clone)]
pub struct MetaSupplierContext {
    /// Name of the vertex the supplier creates processors for
    pub vertex_name: String,
    /// Members in the cluster
    pub member_count: usize,
    /// Processors of the vertex on each member
    pub local_parallelism: usize,
    /// Options of the job
    pub options: SerializableOptions,
}

impl MetaSupplierContext {
    /// Processors of the vertex cluster wide
    pub fn total_parallelism(&self) -> usize {
        self.member_count * self.local_parallelism
    }
}

/// Context given to a member supplier on initialization
#[derive(Debug, Clone)]
pub struct SupplierContext {
    /// Name of the vertex
    pub vertex_name: String,
    /// Index of the member this supplier runs on
    pub member_index: usize,
    /// Members in the cluster
    pub member_count: usize,
    /// Processors this supplier will be asked to create
    pub local_parallelism: usize,
}

/// Creates one [ProcessorSupplier] per cluster member
pub trait ProcessorMetaSupplier {
    /// Supplier created for every member
    type Supplier: ProcessorSupplier;
    /// Error during initialization or supplier creation. Errors here abort
    /// the job before any processor runs.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Processors per member this vertex requires, `None` to use the job default
    fn preferred_local_parallelism(&self) -> Option<usize> {
        None
    }

    /// Called exactly once on the control plane before [ProcessorMetaSupplier::get]
    fn init(&mut self, _ctx: &MetaSupplierContext) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Create the supplier for `member`. `addresses` contains all members in a
    /// stable order identical for every call.
    fn get(
        &self,
        addresses: &[MemberAddress],
        member: &MemberAddress,
    ) -> Result<Self::Supplier, Self::Error>;
}

/// Creates the processors of a vertex on a single member
pub trait ProcessorSupplier: Send {
    /// Processor type created
    type Processor: Processor;

    /// Called once before [ProcessorSupplier::get]
    fn init(&mut self, _ctx: &SupplierContext) {}

    /// Create exactly `count` processors
    fn get(&mut self, count: usize) -> Vec<Self::Processor>;
}
