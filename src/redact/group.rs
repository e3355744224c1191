//! Partitioning resolved rows by owning plugin.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::model::{Plugin, PluginId};

/// Rows that belong to one plugin.
#[derive(Debug, Clone)]
pub struct PluginGroup<T> {
    pub plugin: Plugin,
    pub items: Vec<T>,
}

/// Group `(plugin, item)` pairs by plugin id. Groups come out in the order
/// their plugin was first seen; items keep their input order.
pub fn group_by_plugin<T>(pairs: impl IntoIterator<Item = (Plugin, T)>) -> Vec<PluginGroup<T>> {
    let mut index: HashMap<PluginId, usize> = HashMap::new();
    let mut groups: Vec<PluginGroup<T>> = Vec::new();
    for (plugin, item) in pairs {
        match index.get(&plugin.id) {
            Some(&i) => groups[i].items.push(item),
            None => {
                index.insert(plugin.id, groups.len());
                groups.push(PluginGroup {
                    plugin,
                    items: vec![item],
                });
            }
        }
    }
    groups
}

/// Drop repeated ids, keeping the first occurrence.
pub fn dedup<T: Copy + Eq + Hash>(ids: &[T]) -> Vec<T> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Requested ids absent from `found`, in request order.
pub fn missing<T: Copy + Eq + Hash>(requested: &[T], found: impl IntoIterator<Item = T>) -> Vec<T> {
    let found: HashSet<T> = found.into_iter().collect();
    requested
        .iter()
        .copied()
        .filter(|id| !found.contains(id))
        .collect()
}
