use std::ops::Range;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::SixDofErrors;

/// Hub states, always at the front of the packed state.
pub const POSITION: Range<usize> = 0..3;
pub const VELOCITY: Range<usize> = 3..6;
pub const ATTITUDE: Range<usize> = 6..9;
pub const RATE: Range<usize> = 9..12;
pub const HUB_DIMENSION: usize = 12;

/// Kinds of effector sub-blocks. Blocks are packed in this order, then by
/// effector registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StateKind {
    /// (Θ, Ω) per wheel
    WheelSpin,
    /// rotor phase per jittered wheel
    WheelJitter,
    /// (θ, θ̇)
    Hinge,
    /// (ρ, ρ̇) per particle
    Slosh,
    /// tank mass
    TankMass,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateBlock {
    pub kind: StateKind,
    pub effector: usize,
    pub range: Range<usize>,
}

/// Offsets of every effector sub-block into the packed state, frozen at initialization.
#[derive(Clone, Debug, Default)]
pub struct StateMap {
    blocks: Vec<StateBlock>,
    dimension: usize,
}

impl StateMap {
    /// Lays out `(effector, kind, width)` requests after the hub states.
    pub fn build<I>(requests: I) -> Result<Self, SixDofErrors>
    where
        I: IntoIterator<Item = (usize, StateKind, usize)>,
    {
        let mut requests: Vec<_> = requests.into_iter().filter(|r| r.2 > 0).collect();
        requests.sort_by_key(|&(effector, kind, _)| (kind, effector));

        let mut blocks = Vec::with_capacity(requests.len());
        let mut next = HUB_DIMENSION;
        for (effector, kind, width) in requests {
            let range = next..next + width;
            debug!("effector {effector} {kind:?} bound to states {range:?}");
            next = range.end;
            blocks.push(StateBlock {
                kind,
                effector,
                range,
            });
        }
        let map = Self {
            blocks,
            dimension: next,
        };
        map.validate()?;
        Ok(map)
    }

    /// Checks that no two blocks share a state and none reach into the hub.
    pub fn validate(&self) -> Result<(), SixDofErrors> {
        let mut ranges: Vec<Range<usize>> = Vec::with_capacity(self.blocks.len() + 1);
        ranges.push(0..HUB_DIMENSION);
        ranges.extend(self.blocks.iter().map(|b| b.range.clone()));
        ranges.sort_by_key(|r| r.start);
        for pair in ranges.windows(2) {
            if pair[1].start < pair[0].end {
                return Err(SixDofErrors::OverlappingStateSlices(
                    pair[0].start,
                    pair[0].end,
                    pair[1].start,
                    pair[1].end,
                ));
            }
        }
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn blocks(&self) -> &[StateBlock] {
        &self.blocks
    }

    pub fn block(&self, effector: usize, kind: StateKind) -> Option<&StateBlock> {
        self.blocks
            .iter()
            .find(|b| b.effector == effector && b.kind == kind)
    }

    /// Total width bound to one effector.
    pub fn effector_dimension(&self, effector: usize) -> usize {
        self.blocks
            .iter()
            .filter(|b| b.effector == effector)
            .map(|b| b.range.len())
            .sum()
    }
}

/// Read view of one effector's sub-blocks.
pub struct EffectorStates<'a> {
    x: &'a [f64],
    map: &'a StateMap,
    effector: usize,
}

impl<'a> EffectorStates<'a> {
    pub fn new(x: &'a [f64], map: &'a StateMap, effector: usize) -> Self {
        Self { x, map, effector }
    }

    /// The block of `kind`, empty when the effector has none.
    pub fn get(&self, kind: StateKind) -> &'a [f64] {
        self.map
            .block(self.effector, kind)
            .and_then(|b| self.x.get(b.range.clone()))
            .unwrap_or(&[])
    }

    /// Index of the first state of the block in the packed state.
    pub fn offset(&self, kind: StateKind) -> Option<usize> {
        self.map.block(self.effector, kind).map(|b| b.range.start)
    }
}

/// Write view of one effector's sub-blocks.
pub struct EffectorStatesMut<'a> {
    x: &'a mut [f64],
    map: &'a StateMap,
    effector: usize,
}

impl<'a> EffectorStatesMut<'a> {
    pub fn new(x: &'a mut [f64], map: &'a StateMap, effector: usize) -> Self {
        Self { x, map, effector }
    }

    pub fn get_mut(&mut self, kind: StateKind) -> &mut [f64] {
        match self.map.block(self.effector, kind) {
            Some(b) => self.x.get_mut(b.range.clone()).unwrap_or(&mut []),
            None => &mut [],
        }
    }
}
