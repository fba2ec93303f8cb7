use crate::address::Address;
use std::{
    collections::{HashMap, HashSet},
    fmt,
};

/// Link-layer connectivity between hosts.
///
/// Evaluated by the *sending* host for every message it routes. A `false`
/// answer drops the message.
pub trait Reachability: Send + Sync + fmt::Debug {
    fn reachable(&self, from: Address, to: Address) -> bool;
}

/// Every host reaches every other host (default).
#[derive(Debug, Clone, Copy, Default)]
pub struct FullMesh;

/// Explicit per-host tunnel sets.
///
/// A host reaches only the addresses listed for it. A host without any
/// entry reaches nobody; a host always reaches itself.
#[derive(Debug, Clone, Default)]
pub struct Tunnels {
    tunnels: HashMap<Address, HashSet<Address>>,
}

/// Full mesh minus a set of blocked host pairs.
///
/// Partitions are directional - block both `(a, b)` and `(b, a)` for a
/// bidirectional partition, or use [`Partition::isolate`].
#[derive(Debug, Clone, Default)]
pub struct Partition {
    blocked: HashSet<(Address, Address)>,
}

impl Reachability for FullMesh {
    fn reachable(&self, _from: Address, _to: Address) -> bool {
        true
    }
}

impl Tunnels {
    pub fn new() -> Self {
        Self::default()
    }

    /// open a one-way tunnel `from -> to`
    pub fn open(&mut self, from: Address, to: Address) -> &mut Self {
        self.tunnels.entry(from).or_default().insert(to);
        self
    }

    /// open tunnels in both directions
    pub fn connect(&mut self, a: Address, b: Address) -> &mut Self {
        self.open(a, b).open(b, a)
    }
}

impl Reachability for Tunnels {
    fn reachable(&self, from: Address, to: Address) -> bool {
        from == to
            || self
                .tunnels
                .get(&from)
                .is_some_and(|tunnels| tunnels.contains(&to))
    }
}

impl Partition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(&mut self, from: Address, to: Address) -> &mut Self {
        self.blocked.insert((from, to));
        self
    }

    /// block traffic in both directions between `a` and `b`
    pub fn isolate(&mut self, a: Address, b: Address) -> &mut Self {
        self.block(a, b).block(b, a)
    }

    pub fn heal(&mut self, from: Address, to: Address) -> &mut Self {
        self.blocked.remove(&(from, to));
        self
    }
}

impl Reachability for Partition {
    fn reachable(&self, from: Address, to: Address) -> bool {
        !self.blocked.contains(&(from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: Address = Address::v4(10, 0, 0, 1);
    const B: Address = Address::v4(10, 0, 0, 2);
    const C: Address = Address::v4(10, 0, 0, 3);

    #[test]
    fn full_mesh() {
        assert!(FullMesh.reachable(A, B));
        assert!(FullMesh.reachable(B, A));
        assert!(FullMesh.reachable(A, A));
    }

    #[test]
    fn tunnels_are_one_way() {
        let mut tunnels = Tunnels::new();
        tunnels.open(A, B);

        assert!(tunnels.reachable(A, B));
        assert!(!tunnels.reachable(B, A));
        assert!(!tunnels.reachable(A, C));
        assert!(tunnels.reachable(C, C));
    }

    #[test]
    fn tunnels_connect() {
        let mut tunnels = Tunnels::new();
        tunnels.connect(A, B);

        assert!(tunnels.reachable(A, B));
        assert!(tunnels.reachable(B, A));
    }

    #[test]
    fn partition() {
        let mut partition = Partition::new();
        partition.block(A, B);

        assert!(!partition.reachable(A, B));
        assert!(partition.reachable(B, A));
        assert!(partition.reachable(A, C));

        partition.isolate(A, C);
        assert!(!partition.reachable(A, C));
        assert!(!partition.reachable(C, A));

        partition.heal(A, B);
        assert!(partition.reachable(A, B));
    }
}
