use crate::Integrable;

/// Time history kept in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryResult<State: Integrable> {
    pub t: Vec<f64>,
    pub y: Vec<State>,
}

impl<State: Integrable> MemoryResult<State> {
    pub fn new(capacity: usize) -> Self {
        Self {
            t: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, t: f64, x: &State) {
        self.t.push(t);
        self.y.push(x.clone());
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn last(&self) -> Option<(f64, &State)> {
        Some((*self.t.last()?, self.y.last()?))
    }
}
