//! Vertices which must run as a single instance in the whole cluster.
use std::hash::{Hash, Hasher};

use seahash::SeaHasher;
use thiserror::Error;
use tracing::debug;

use super::{
    MemberAddress, Outbox, Processor, ProcessorContext, ProcessorError, ProcessorMetaSupplier,
    ProcessorSupplier, SupplierContext,
};

/// Select a value from a slice of choices by applying [rendezvous hashing](https://en.wikipedia.org/wiki/Rendezvous_hashing).
/// Rendezvous hashing ensures minimal shuffling when the set of options changes
/// at the cost of being O(n) with n == options.len().
///
/// Hashing uses [SeaHasher], so the selection is stable across processes and
/// every member arrives at the same choice.
///
/// Returns `None` if there are no options.
pub fn rendezvous_select<'a, V: Hash + ?Sized, T: Hash>(
    value: &V,
    options: &'a [T],
) -> Option<&'a T> {
    let mut hasher = SeaHasher::new();
    value.hash(&mut hasher);

    options
        .iter()
        .map(|x| {
            let mut h = hasher.clone();
            x.hash(&mut h);
            (h.finish(), x)
        })
        .max_by_key(|x| x.0)
        .map(|x| x.1)
}

/// Wrap a supplier so exactly one processor is created in the whole cluster.
/// The hosting member is chosen by [rendezvous_select] over `key`; all other
/// members get an idle processor which completes immediately.
pub fn force_total_parallelism_one<S>(
    supplier: S,
    key: impl Into<String>,
) -> ForceTotalParallelismOne<S> {
    ForceTotalParallelismOne {
        supplier,
        key: key.into(),
    }
}

/// Meta supplier created by [force_total_parallelism_one]
#[derive(Debug, Clone)]
pub struct ForceTotalParallelismOne<S> {
    supplier: S,
    key: String,
}

impl<S> ProcessorMetaSupplier for ForceTotalParallelismOne<S>
where
    S: ProcessorSupplier + Clone,
{
    type Supplier = SingletonSupplier<S>;
    type Error = SingletonError;

    fn preferred_local_parallelism(&self) -> Option<usize> {
        Some(1)
    }

    fn get(
        &self,
        addresses: &[MemberAddress],
        member: &MemberAddress,
    ) -> Result<Self::Supplier, Self::Error> {
        let chosen =
            rendezvous_select(self.key.as_str(), addresses).ok_or(SingletonError::NoMembers)?;
        let active = chosen == member;
        if active {
            debug!(key = %self.key, ?member, "Placing singleton processor");
        }
        Ok(SingletonSupplier {
            inner: self.supplier.clone(),
            active,
        })
    }
}

/// Failure placing a singleton processor
#[derive(Debug, Error)]
pub enum SingletonError {
    /// The address list was empty
    #[error("Cannot place a singleton processor in a cluster without members")]
    NoMembers,
}

/// Supplier which creates the single active processor on the chosen member
/// and idle processors everywhere else
#[derive(Debug, Clone)]
pub struct SingletonSupplier<S> {
    inner: S,
    active: bool,
}

impl<S> SingletonSupplier<S> {
    /// True if this supplier creates the active processor
    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl<S> ProcessorSupplier for SingletonSupplier<S>
where
    S: ProcessorSupplier,
{
    type Processor = SingletonProcessor<S::Processor>;

    fn init(&mut self, ctx: &SupplierContext) {
        if self.active {
            let ctx = SupplierContext {
                local_parallelism: 1,
                ..ctx.clone()
            };
            self.inner.init(&ctx);
        }
    }

    fn get(&mut self, count: usize) -> Vec<Self::Processor> {
        let mut active = if self.active && count > 0 {
            self.inner.get(1)
        } else {
            Vec::new()
        };
        let mut processors: Vec<_> = active.drain(..).map(SingletonProcessor::Active).collect();
        processors.resize_with(count, || SingletonProcessor::Idle);
        processors
    }
}

/// Either the one active processor of a vertex or an idle placeholder
#[derive(Debug)]
pub enum SingletonProcessor<P> {
    /// The single instance in the cluster doing actual work
    Active(P),
    /// Placeholder which never receives input
    Idle,
}

impl<P> SingletonProcessor<P> {
    /// True if this is the active instance
    pub fn is_active(&self) -> bool {
        matches!(self, SingletonProcessor::Active(_))
    }
}

impl<P> Processor for SingletonProcessor<P>
where
    P: Processor,
{
    type Input = P::Input;
    type Output = P::Output;

    fn init(&mut self, ctx: &ProcessorContext) -> Result<(), ProcessorError> {
        match self {
            SingletonProcessor::Active(p) => p.init(ctx),
            SingletonProcessor::Idle => Ok(()),
        }
    }

    fn process(&mut self, ordinal: usize, item: Self::Input) -> Result<(), ProcessorError> {
        match self {
            SingletonProcessor::Active(p) => p.process(ordinal, item),
            SingletonProcessor::Idle => Err(ProcessorError::UnexpectedInput),
        }
    }

    fn complete(&mut self, outbox: &mut Outbox<Self::Output>) -> Result<bool, ProcessorError> {
        match self {
            SingletonProcessor::Active(p) => p.complete(outbox),
            SingletonProcessor::Idle => Ok(true),
        }
    }

    fn close(&mut self) -> Result<(), ProcessorError> {
        match self {
            SingletonProcessor::Active(p) => p.close(),
            SingletonProcessor::Idle => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addresses(n: u16) -> Vec<MemberAddress> {
        (0..n)
            .map(|i| MemberAddress::from(([127, 0, 0, 1], 5701 + i)))
            .collect()
    }

    /// Supplier of processors which accept and emit nothing
    #[derive(Clone, Default)]
    struct UnitSupplier;

    struct UnitProcessor;
    impl Processor for UnitProcessor {
        type Input = ();
        type Output = ();

        fn process(&mut self, _ordinal: usize, _item: ()) -> Result<(), ProcessorError> {
            Ok(())
        }

        fn complete(&mut self, _outbox: &mut Outbox<()>) -> Result<bool, ProcessorError> {
            Ok(true)
        }
    }
    impl ProcessorSupplier for UnitSupplier {
        type Processor = UnitProcessor;

        fn get(&mut self, count: usize) -> Vec<Self::Processor> {
            (0..count).map(|_| UnitProcessor).collect()
        }
    }

    #[test]
    fn rendezvous_is_stable() {
        let options = addresses(5);
        let a = rendezvous_select("view-1", &options);
        let b = rendezvous_select("view-1", &options);
        assert_eq!(a, b);
        assert!(a.is_some());
    }

    #[test]
    fn rendezvous_empty() {
        let options: Vec<MemberAddress> = Vec::new();
        assert!(rendezvous_select("x", &options).is_none());
    }

    /// Exactly one member must host the active processor
    #[test]
    fn exactly_one_active_processor() {
        let members = addresses(4);
        let meta = force_total_parallelism_one(UnitSupplier, "my-view");
        assert_eq!(meta.preferred_local_parallelism(), Some(1));

        let mut active = 0;
        for m in members.iter() {
            let mut supplier = meta.get(&members, m).unwrap();
            let processors = supplier.get(1);
            assert_eq!(processors.len(), 1);
            active += processors.iter().filter(|p| p.is_active()).count();
        }
        assert_eq!(active, 1);
    }

    #[test]
    fn idle_processor_rejects_input() {
        let mut idle = SingletonProcessor::<UnitProcessor>::Idle;
        assert!(matches!(
            idle.process(0, ()),
            Err(ProcessorError::UnexpectedInput)
        ));
        assert!(idle.complete(&mut Outbox::new(1)).unwrap());
    }

    #[test]
    fn no_members() {
        let meta = force_total_parallelism_one(UnitSupplier, "my-view");
        let member = MemberAddress::from(([127, 0, 0, 1], 5701));
        assert!(matches!(
            meta.get(&[], &member),
            Err(SingletonError::NoMembers)
        ));
    }
}
