//! Content models as nondeterministic automata
//!
//! Particles are expanded into a Thompson-style NFA with epsilon edges.
//! The validator keeps the set of live states for each open element and
//! advances it one child element at a time.

use std::collections::HashSet;

use super::model::{ElementId, Wildcard};

/// Upper bound on automaton size for a single content model
const MAX_STATES: usize = 200_000;

/// `minOccurs`/`maxOccurs` of a particle; `max: None` is unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurs {
    pub min: u32,
    pub max: Option<u32>,
}

impl Occurs {
    pub const ONCE: Occurs = Occurs {
        min: 1,
        max: Some(1),
    };

    pub fn is_never(&self) -> bool {
        self.max == Some(0)
    }
}

/// What a single transition consumes
#[derive(Debug, Clone)]
pub enum Term {
    Element(ElementId),
    Wildcard(Wildcard),
}

/// A content model before compilation into an automaton
#[derive(Debug, Clone)]
pub enum Particle {
    Term { term: Term, occurs: Occurs },
    Sequence { items: Vec<Particle>, occurs: Occurs },
    Choice { items: Vec<Particle>, occurs: Occurs },
    All { items: Vec<Particle>, occurs: Occurs },
}

impl Particle {
    pub fn occurs(&self) -> Occurs {
        match self {
            Particle::Term { occurs, .. }
            | Particle::Sequence { occurs, .. }
            | Particle::Choice { occurs, .. }
            | Particle::All { occurs, .. } => *occurs,
        }
    }

    /// True when the particle can never consume an element
    pub fn is_empty(&self) -> bool {
        match self {
            Particle::Term { occurs, .. } => occurs.is_never(),
            Particle::Sequence { items, occurs }
            | Particle::Choice { items, occurs }
            | Particle::All { items, occurs } => {
                occurs.is_never() || items.iter().all(Particle::is_empty)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
struct State {
    epsilon: Vec<usize>,
    transitions: Vec<(usize, usize)>,
}

/// Live states of an automaton, sorted
pub type StateSet = Vec<usize>;

#[derive(Debug, Clone)]
pub struct Automaton {
    terms: Vec<Term>,
    states: Vec<State>,
    start: usize,
    accept: usize,
}

impl Automaton {
    /// Compile a particle; `xs:all` is only allowed at the top of a content model
    pub fn build(particle: &Particle) -> Result<Self, String> {
        let mut automaton = Automaton {
            terms: Vec::new(),
            states: vec![State::default()],
            start: 0,
            accept: 0,
        };
        let end = automaton.repeat(particle, 0)?;
        automaton.accept = end;
        Ok(automaton)
    }

    /// Accepts only the empty sequence
    pub fn empty() -> Self {
        Automaton {
            terms: Vec::new(),
            states: vec![State::default()],
            start: 0,
            accept: 0,
        }
    }

    fn add_state(&mut self) -> Result<usize, String> {
        if self.states.len() >= MAX_STATES {
            return Err("content model is too large".to_string());
        }
        self.states.push(State::default());
        Ok(self.states.len() - 1)
    }

    fn epsilon(&mut self, from: usize, to: usize) {
        self.states[from].epsilon.push(to);
    }

    /// Add `particle` with its occurrence range after `entry`, returning the exit state
    fn repeat(&mut self, particle: &Particle, entry: usize) -> Result<usize, String> {
        let occurs = particle.occurs();
        let mut current = entry;
        for _ in 0..occurs.min {
            current = self.once(particle, current)?;
        }

        match occurs.max {
            None => {
                let hub = self.add_state()?;
                self.epsilon(current, hub);
                let end = self.once(particle, hub)?;
                self.epsilon(end, hub);
                Ok(hub)
            }
            Some(max) => {
                let exit = self.add_state()?;
                self.epsilon(current, exit);
                for _ in occurs.min..max {
                    current = self.once(particle, current)?;
                    self.epsilon(current, exit);
                }
                Ok(exit)
            }
        }
    }

    /// Add a single occurrence of `particle` after `entry`
    fn once(&mut self, particle: &Particle, entry: usize) -> Result<usize, String> {
        match particle {
            Particle::Term { term, .. } => {
                let term_id = self.terms.len();
                self.terms.push(term.clone());
                let target = self.add_state()?;
                self.states[entry].transitions.push((term_id, target));
                Ok(target)
            }
            Particle::Sequence { items, .. } => {
                let mut current = entry;
                for item in items {
                    current = self.repeat(item, current)?;
                }
                Ok(current)
            }
            Particle::Choice { items, .. } => {
                let exit = self.add_state()?;
                for item in items {
                    let branch = self.add_state()?;
                    self.epsilon(entry, branch);
                    let end = self.repeat(item, branch)?;
                    self.epsilon(end, exit);
                }
                Ok(exit)
            }
            Particle::All { .. } => {
                Err("xs:all may only appear at the top of a content model".to_string())
            }
        }
    }

    fn closure(&self, seeds: impl IntoIterator<Item = usize>) -> StateSet {
        let mut seen = HashSet::new();
        let mut stack: Vec<usize> = Vec::new();
        for seed in seeds {
            if seen.insert(seed) {
                stack.push(seed);
            }
        }
        while let Some(state) = stack.pop() {
            for next in &self.states[state].epsilon {
                if seen.insert(*next) {
                    stack.push(*next);
                }
            }
        }

        let mut set: Vec<usize> = seen.into_iter().collect();
        set.sort_unstable();
        set
    }

    pub fn start(&self) -> StateSet {
        self.closure([self.start])
    }

    /// Advance on one child; returns the new state set and the term that
    /// matched, or `None` if no transition accepts the child
    pub fn step(
        &self,
        set: &StateSet,
        mut matches: impl FnMut(&Term) -> bool,
    ) -> Option<(StateSet, &Term)> {
        let mut matched: Option<usize> = None;
        let mut targets = Vec::new();

        for state in set {
            for (term_id, target) in &self.states[*state].transitions {
                let accepted = match matched {
                    Some(first) if first == *term_id => true,
                    _ => matches(&self.terms[*term_id]),
                };
                if accepted {
                    matched.get_or_insert(*term_id);
                    targets.push(*target);
                }
            }
        }

        let term_id = matched?;
        Some((self.closure(targets), &self.terms[term_id]))
    }

    pub fn accepts(&self, set: &StateSet) -> bool {
        set.binary_search(&self.accept).is_ok()
    }

    /// Terms that could be consumed next, in model order, without duplicates
    pub fn expected(&self, set: &StateSet) -> Vec<&Term> {
        let mut term_ids: Vec<usize> = set
            .iter()
            .flat_map(|state| self.states[*state].transitions.iter().map(|(t, _)| *t))
            .collect();
        term_ids.sort_unstable();
        term_ids.dedup();
        term_ids.into_iter().map(|id| &self.terms[id]).collect()
    }

    /// Every term of the model, in model order
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }
}
