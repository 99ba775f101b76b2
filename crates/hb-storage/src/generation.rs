//! In-memory shape of cache generations, shared by every store backend.

use hb_net::RequestKey;
use hb_net::Response;
use std::collections::HashMap;
use std::collections::VecDeque;

/// One named cache generation. Keys are kept in insertion order; overwriting
/// an existing key keeps its original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generation {
    order: VecDeque<RequestKey>,
    entries: HashMap<RequestKey, Response>,
}

impl Generation {
    pub fn insert(&mut self, key: RequestKey, response: Response) {
        if !self.entries.contains_key(&key) {
            self.order.push_back(key.clone());
        }
        self.entries.insert(key, response);
    }

    pub fn get(&self, key: &RequestKey) -> Option<&Response> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &RequestKey) -> bool {
        if self.entries.remove(key).is_none() {
            return false;
        }
        self.order.retain(|existing| existing != key);
        true
    }

    pub fn keys(&self) -> Vec<RequestKey> {
        self.order.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&RequestKey, &Response)> {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key).map(|response| (key, response)))
    }
}

/// All generations of one origin, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationSet {
    order: Vec<String>,
    generations: HashMap<String, Generation>,
}

impl GenerationSet {
    /// Returns the generation, creating it when absent.
    pub fn open(&mut self, name: &str) -> &mut Generation {
        if !self.generations.contains_key(name) {
            self.order.push(name.to_owned());
        }
        self.generations.entry(name.to_owned()).or_default()
    }

    pub fn get(&self, name: &str) -> Option<&Generation> {
        self.generations.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Generation> {
        self.generations.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.generations.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        if self.generations.remove(name).is_none() {
            return false;
        }
        self.order.retain(|existing| existing != name);
        true
    }

    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Generations in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Generation)> {
        self.order.iter().filter_map(|name| {
            self.generations
                .get(name)
                .map(|generation| (name.as_str(), generation))
        })
    }

    /// First match across generations, searched in creation order.
    pub fn find(&self, key: &RequestKey) -> Option<&Response> {
        self.iter().find_map(|(_, generation)| generation.get(key))
    }

    pub fn total_entries(&self) -> usize {
        self.generations.values().map(Generation::len).sum()
    }
}
