//! Splitting a bounded source and assigning its shards to members and workers.
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    config::{OptionsError, SerializableOptions},
    processor::{
        MemberAddress, MetaSupplierContext, ProcessorMetaSupplier, ProcessorSupplier,
        SupplierContext,
    },
};

use super::{BoundedSource, SourceError, SourceWorker};

/// Target size of a single shard such that every processor cluster wide gets
/// about one shard. Never less than one byte.
pub fn desired_shard_size(estimated_size_bytes: u64, total_parallelism: usize) -> u64 {
    let parallelism = (total_parallelism as u64).max(1);
    (estimated_size_bytes / parallelism).max(1)
}

/// Take every `count`-th element of `items`, starting at `index`.
/// Distributing a list by calling this for every index in `0..count` assigns each
/// element to exactly one index and spreads neighbouring elements, which often
/// have similar sizes, over different indices.
///
/// **PANIC:** if `count` is 0
pub fn round_robin_sub_list<T: Clone>(items: &[T], index: usize, count: usize) -> Vec<T> {
    items.iter().skip(index).step_by(count).cloned().collect()
}

/// Meta supplier of a bounded read.
///
/// On initialization the source is split into shards once. Every member then
/// receives a round-robin share of the shards, see [round_robin_sub_list].
#[derive(Debug)]
pub struct SourcePartitioner<S> {
    source: S,
    options: SerializableOptions,
    owner_id: String,
    shards: Option<Vec<S>>,
}

impl<S> SourcePartitioner<S>
where
    S: BoundedSource,
{
    /// Create a partitioner for `source`. The `owner_id` identifies the vertex
    /// and shows up in logs and metric keys.
    pub fn new(source: S, options: SerializableOptions, owner_id: impl Into<String>) -> Self {
        Self {
            source,
            options,
            owner_id: owner_id.into(),
            shards: None,
        }
    }

    /// Shards computed on initialization, `None` if not yet initialized
    pub fn shards(&self) -> Option<&[S]> {
        self.shards.as_deref()
    }
}

impl<S> ProcessorMetaSupplier for SourcePartitioner<S>
where
    S: BoundedSource,
{
    type Supplier = SourceSupplier<S>;
    type Error = PartitionError;

    fn init(&mut self, ctx: &MetaSupplierContext) -> Result<(), Self::Error> {
        let options = self.options.get()?;
        let estimated = self
            .source
            .estimated_size_bytes(&options)
            .map_err(PartitionError::Estimate)?;
        let desired = desired_shard_size(estimated, ctx.total_parallelism());
        let shards = self
            .source
            .split(desired, &options)
            .map_err(PartitionError::Split)?;
        info!(
            owner = %self.owner_id,
            estimated_bytes = estimated,
            desired_shard_bytes = desired,
            shards = shards.len(),
            "Split bounded source"
        );
        self.shards = Some(shards);
        Ok(())
    }

    fn get(
        &self,
        addresses: &[MemberAddress],
        member: &MemberAddress,
    ) -> Result<Self::Supplier, Self::Error> {
        let shards = self.shards.as_ref().ok_or(PartitionError::NotInitialized)?;
        let member_index = addresses
            .iter()
            .position(|x| x == member)
            .ok_or(PartitionError::UnknownMember(*member))?;
        let member_shards = round_robin_sub_list(shards, member_index, addresses.len());
        debug!(
            owner = %self.owner_id,
            ?member,
            shards = member_shards.len(),
            "Assigned shards to member"
        );
        Ok(SourceSupplier {
            shards: member_shards,
            options: self.options.clone(),
            owner_id: self.owner_id.clone(),
        })
    }
}

/// Creates the [SourceWorker]s of one member, distributing the member's shards
/// round robin over its workers
#[derive(Debug, Clone)]
pub struct SourceSupplier<S> {
    shards: Vec<S>,
    options: SerializableOptions,
    owner_id: String,
}

impl<S> SourceSupplier<S> {
    /// All shards assigned to this member
    pub fn shards(&self) -> &[S] {
        &self.shards
    }
}

impl<S> ProcessorSupplier for SourceSupplier<S>
where
    S: BoundedSource,
{
    type Processor = SourceWorker<S>;

    fn init(&mut self, ctx: &SupplierContext) {
        debug!(
            owner = %self.owner_id,
            member_index = ctx.member_index,
            local_parallelism = ctx.local_parallelism,
            "Creating source workers"
        );
    }

    fn get(&mut self, count: usize) -> Vec<Self::Processor> {
        (0..count)
            .map(|i| {
                SourceWorker::new(
                    round_robin_sub_list(&self.shards, i, count),
                    self.options.clone(),
                    self.owner_id.clone(),
                )
            })
            .collect()
    }
}

/// Failures partitioning a source. These abort the job before it starts.
#[derive(Debug, Error)]
pub enum PartitionError {
    /// The source could not estimate its size
    #[error("Error estimating source size")]
    Estimate(#[source] SourceError),
    /// The source could not split itself
    #[error("Error splitting source")]
    Split(#[source] SourceError),
    /// Shards were requested for a member outside the given addresses
    #[error("Member {0} is not part of the cluster")]
    UnknownMember(MemberAddress),
    /// Shards were requested before `init`
    #[error("Shards requested before the source was split")]
    NotInitialized,
    /// Options could not be decoded
    #[error(transparent)]
    Options(#[from] OptionsError),
}
